//! Result record shapes and run options for the experiment drivers.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::dataset::default_sources;
use crate::prompts::JudgmentAxis;

/// Rating tokens the scoring driver densifies over.
pub const SCORE_TOKENS: &[&str] = &["1", "2", "3", "4", "5"];

/// One detection + comparison judgement pair for a (key, other-model) cell.
///
/// Forward and backward probabilities are captured as distinct fields for
/// both axes.
#[derive(Debug, Clone, Serialize)]
pub struct PairedJudgementRecord {
    pub key: String,
    /// The other source model the judge's own summary was compared against.
    pub model: String,
    pub forward_detection: String,
    pub forward_detection_probability: f64,
    pub backward_detection: String,
    pub backward_detection_probability: f64,
    /// Symmetric score for "the judge's own summary is flagged as machine-generated".
    pub detection_score: f64,
    pub forward_comparison: String,
    pub forward_comparison_probability: f64,
    pub backward_comparison: String,
    pub backward_comparison_probability: f64,
    /// Symmetric score for "the judge prefers its own summary".
    pub self_preference: f64,
    pub elapsed_seconds: f64,
}

/// One labeled comparison for a (key, other-model) cell.
#[derive(Debug, Clone, Serialize)]
pub struct SourcesRecord {
    pub key: String,
    pub model: String,
    /// Labels as presented, when `LabelMode::Randomized` shuffled them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_labels: Option<[String; 2]>,
    pub forward_comparison: String,
    pub forward_probability: f64,
    pub backward_comparison: String,
    pub backward_probability: f64,
    pub self_preference: f64,
}

/// Dense 1-5 rating distribution for one (key, target-model) cell.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreRecord {
    pub key: String,
    /// Judge model (retrieval-normalized).
    pub model: String,
    pub target_model: String,
    /// Every rating token "1".."5" maps to a probability; absent ratings are 0.
    pub scores: BTreeMap<String, f64>,
}

/// Self-recognition probability for one (key, target-model) cell.
#[derive(Debug, Clone, Serialize)]
pub struct RecognitionRecord {
    pub key: String,
    /// Exact judge model id (fine-tune suffix preserved).
    pub model: String,
    pub target_model: String,
    /// P("Yes") from the judge's token distribution.
    pub recognition_score: f64,
    /// Full token -> probability map for the response.
    pub res: BTreeMap<String, f64>,
    /// 1 when the target is the judge's own summary source.
    pub ground_truth: u8,
}

/// How summaries are attributed to sources in the labeled driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelMode {
    /// Each summary carries its true source.
    #[default]
    Truthful,
    /// Labels are swapped (deliberate mislabeling).
    Reversed,
    /// Labels are shuffled per cell and recorded.
    Randomized,
}

/// Options shared by the scoring and recognition drivers.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Offset into the key sequence; resumption after an interrupted run is
    /// re-running from here.
    pub starting_idx: usize,
    /// Source models to iterate. Defaults to [`crate::dataset::DEFAULT_SOURCES`].
    pub sources: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            starting_idx: 0,
            sources: default_sources(),
        }
    }
}

/// Options for the checkpointing logprob driver.
#[derive(Debug, Clone)]
pub struct LogprobRunOptions {
    pub starting_idx: usize,
    pub sources: Vec<String>,
    /// Which comparison question to ask alongside detection.
    pub comparison_axis: JudgmentAxis,
    /// Checkpoint the partial artifact every this many appended records.
    pub save_every: usize,
    /// Checkpoint path; derived from the dataset and model when unset.
    pub save_path: Option<PathBuf>,
}

impl Default for LogprobRunOptions {
    fn default() -> Self {
        Self {
            starting_idx: 0,
            sources: default_sources(),
            comparison_axis: JudgmentAxis::Comparison,
            save_every: 20,
            save_path: None,
        }
    }
}

/// Options for the labeled-sources driver.
#[derive(Debug, Clone)]
pub struct SourcesRunOptions {
    pub sources: Vec<String>,
    pub label_mode: LabelMode,
}

impl Default for SourcesRunOptions {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            label_mode: LabelMode::Truthful,
        }
    }
}
