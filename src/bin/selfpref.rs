#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use selfpref_harness::experiments::{
    generate_logprob_results, generate_logprob_results_with_sources,
    generate_recognition_results, generate_score_results, LabelMode, LogprobRunOptions,
    RunOptions, SourcesRunOptions,
};
use selfpref_harness::gateway::{ProviderGateway, StderrUsageSink};
use selfpref_harness::judge::GatewayJudge;
use selfpref_harness::persist::save_json_atomic;
use selfpref_harness::prompts::JudgmentAxis;
use selfpref_harness::Dataset;

#[derive(Parser)]
#[command(name = "selfpref", version, about = "Self-preference bias experiment harness")]
struct Cli {
    /// Directory holding dataset subdirectories.
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ComparisonKind {
    /// "Which summary is better?"
    Better,
    /// "Which summary is worse?" (inverted tokens)
    Worse,
}

impl From<ComparisonKind> for JudgmentAxis {
    fn from(kind: ComparisonKind) -> Self {
        match kind {
            ComparisonKind::Better => JudgmentAxis::Comparison,
            ComparisonKind::Worse => JudgmentAxis::ComparisonWithWorse,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LabelModeArg {
    Truthful,
    Reversed,
    Randomized,
}

impl From<LabelModeArg> for LabelMode {
    fn from(mode: LabelModeArg) -> Self {
        match mode {
            LabelModeArg::Truthful => LabelMode::Truthful,
            LabelModeArg::Reversed => LabelMode::Reversed,
            LabelModeArg::Randomized => LabelMode::Randomized,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Detection + comparison logprob run with periodic checkpoints
    Logprob {
        /// Dataset name (e.g. cnn, xsum)
        dataset: String,
        /// Judge model id (fine-tune suffix preserved for API calls)
        model: String,
        #[arg(long, default_value_t = 0)]
        starting_idx: usize,
        #[arg(long, default_value_t = 20)]
        save_every: usize,
        #[arg(long, value_enum, default_value_t = ComparisonKind::Better)]
        comparison: ComparisonKind,
        /// Source models to compare against (defaults to the built-in list)
        #[arg(long, value_delimiter = ',')]
        sources: Option<Vec<String>>,
        /// Checkpoint/output path (derived from dataset and model when unset)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Labeled comparison run
    Sources {
        dataset: String,
        model: String,
        #[arg(long, value_enum, default_value_t = LabelModeArg::Truthful)]
        labels: LabelModeArg,
        #[arg(long, value_delimiter = ',')]
        sources: Option<Vec<String>>,
        #[arg(long)]
        out: PathBuf,
    },
    /// 1-5 quality-score distribution run
    Scores {
        dataset: String,
        model: String,
        #[arg(long, default_value_t = 0)]
        starting_idx: usize,
        #[arg(long, value_delimiter = ',')]
        sources: Option<Vec<String>>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Self-recognition run
    Recognition {
        dataset: String,
        model: String,
        #[arg(long, default_value_t = 0)]
        starting_idx: usize,
        #[arg(long, value_delimiter = ',')]
        sources: Option<Vec<String>>,
        #[arg(long)]
        out: PathBuf,
    },
}

fn run_options(starting_idx: usize, sources: Option<Vec<String>>) -> RunOptions {
    let mut opts = RunOptions {
        starting_idx,
        ..Default::default()
    };
    if let Some(sources) = sources {
        opts.sources = sources;
    }
    opts
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let gateway = Arc::new(ProviderGateway::from_env(Arc::new(StderrUsageSink))?);
    let judge = GatewayJudge::new(gateway);

    match cli.command {
        Commands::Logprob {
            dataset,
            model,
            starting_idx,
            save_every,
            comparison,
            sources,
            out,
        } => {
            let ds = Dataset::load(&cli.data_dir, &dataset)?;
            let mut opts = LogprobRunOptions {
                starting_idx,
                save_every,
                comparison_axis: comparison.into(),
                save_path: out,
                ..Default::default()
            };
            if let Some(sources) = sources {
                opts.sources = sources;
            }
            let results = generate_logprob_results(&judge, &ds, &model, &opts).await?;
            println!("{} records", results.len());
        }
        Commands::Sources {
            dataset,
            model,
            labels,
            sources,
            out,
        } => {
            let ds = Dataset::load(&cli.data_dir, &dataset)?;
            let mut opts = SourcesRunOptions {
                label_mode: labels.into(),
                ..Default::default()
            };
            if let Some(sources) = sources {
                opts.sources = sources;
            }
            let results =
                generate_logprob_results_with_sources(&judge, &ds, &model, &opts).await?;
            save_json_atomic(&out, &results)?;
            println!("{} records -> {}", results.len(), out.display());
        }
        Commands::Scores {
            dataset,
            model,
            starting_idx,
            sources,
            out,
        } => {
            let ds = Dataset::load(&cli.data_dir, &dataset)?;
            let opts = run_options(starting_idx, sources);
            let results = generate_score_results(&judge, &ds, &model, &opts).await?;
            save_json_atomic(&out, &results)?;
            println!("{} records -> {}", results.len(), out.display());
        }
        Commands::Recognition {
            dataset,
            model,
            starting_idx,
            sources,
            out,
        } => {
            let ds = Dataset::load(&cli.data_dir, &dataset)?;
            let opts = run_options(starting_idx, sources);
            let results = generate_recognition_results(&judge, &ds, &model, &opts).await?;
            save_json_atomic(&out, &results)?;
            println!("{} records -> {}", results.len(), out.display());
        }
    }

    Ok(())
}
