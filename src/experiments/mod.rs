//! Experiment drivers.
//!
//! Four orchestration routines, each iterating the dataset's keys and a
//! configurable set of source models, invoking the judge once or twice per
//! (key, other-model) cell, and appending one record per cell. Execution is
//! strictly sequential: one query pair at a time, its result consumed before
//! the next iteration begins. Provider failures propagate; the checkpointing
//! driver bounds data loss to the last `save_every` boundary.

mod records;

use std::time::Instant;

use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{info, warn};

use crate::dataset::{normalize_source_name, Dataset, DatasetError};
use crate::judge::{Judge, JudgeError};
use crate::persist::{autosave_path, save_json_atomic, PersistError};
use crate::prompts::JudgmentAxis;
use crate::scoring::{combined_preference, outcome_or_log};

pub use records::{
    LabelMode, LogprobRunOptions, PairedJudgementRecord, RecognitionRecord, RunOptions,
    ScoreRecord, SourcesRecord, SourcesRunOptions, SCORE_TOKENS,
};

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error(transparent)]
    Judge(#[from] JudgeError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

/// Detection + comparison over every (key, other-model) cell, with periodic
/// checkpoints and a running latency average.
///
/// For each cell the judge's own summary and the other source's summary are
/// compared twice per axis, once in each presentation order, and the two
/// outcomes are combined with [`combined_preference`]. Cells where the judge
/// answered with an unexpected token are skipped and logged, not scored.
pub async fn generate_logprob_results<J: Judge + ?Sized>(
    judge: &J,
    dataset: &Dataset,
    model: &str,
    opts: &LogprobRunOptions,
) -> Result<Vec<PairedJudgementRecord>, ExperimentError> {
    // The fine-tuning suffix matters for API calls, not for summary retrieval.
    let exact_model = model;
    let retrieval = normalize_source_name(model);
    let framing = opts.comparison_axis.framing();
    let save_every = opts.save_every.max(1);

    let save_path = opts
        .save_path
        .clone()
        .unwrap_or_else(|| autosave_path("temp_autosaves", &dataset.name, retrieval));

    let mut results: Vec<PairedJudgementRecord> = Vec::new();
    let mut time_log: Vec<f64> = Vec::new();

    info!(
        dataset = %dataset.name,
        model = exact_model,
        starting_idx = opts.starting_idx,
        "generating logprob results"
    );

    for key in dataset.keys().iter().skip(opts.starting_idx) {
        let article = dataset.article(key)?;
        let source_summary = dataset.summary(retrieval, key)?;

        for other in opts.sources.iter().filter(|s| s.as_str() != retrieval) {
            let start = Instant::now();
            let other_summary = dataset.summary(other, key)?;

            // Detection: which summary is machine-generated?
            let forward = judge
                .pairwise_choice(
                    source_summary,
                    other_summary,
                    article,
                    JudgmentAxis::Detection,
                    exact_model,
                )
                .await?;
            let backward = judge
                .pairwise_choice(
                    other_summary,
                    source_summary,
                    article,
                    JudgmentAxis::Detection,
                    exact_model,
                )
                .await?;

            let (Some(f_det), Some(b_det)) = (
                outcome_or_log(
                    &forward,
                    JudgmentAxis::Detection.framing(),
                    key,
                    exact_model,
                    other,
                ),
                outcome_or_log(
                    &backward,
                    JudgmentAxis::Detection.framing(),
                    key,
                    exact_model,
                    other,
                ),
            ) else {
                continue;
            };

            // Comparison: which summary is better (or worse, inverted)?
            let forward = judge
                .pairwise_choice(
                    source_summary,
                    other_summary,
                    article,
                    opts.comparison_axis,
                    exact_model,
                )
                .await?;
            let backward = judge
                .pairwise_choice(
                    other_summary,
                    source_summary,
                    article,
                    opts.comparison_axis,
                    exact_model,
                )
                .await?;

            let (Some(f_cmp), Some(b_cmp)) = (
                outcome_or_log(&forward, framing, key, exact_model, other),
                outcome_or_log(&backward, framing, key, exact_model, other),
            ) else {
                continue;
            };

            let elapsed_seconds = start.elapsed().as_secs_f64();
            time_log.push(elapsed_seconds);

            results.push(PairedJudgementRecord {
                key: key.clone(),
                model: other.clone(),
                forward_detection: f_det.choice.as_token().to_string(),
                forward_detection_probability: f_det.p_chosen(),
                backward_detection: b_det.choice.as_token().to_string(),
                backward_detection_probability: b_det.p_chosen(),
                detection_score: combined_preference(f_det, b_det),
                forward_comparison: f_cmp.choice.as_token().to_string(),
                forward_comparison_probability: f_cmp.p_sampled(framing),
                backward_comparison: b_cmp.choice.as_token().to_string(),
                backward_comparison_probability: b_cmp.p_sampled(framing),
                self_preference: combined_preference(f_cmp, b_cmp),
                elapsed_seconds,
            });

            if results.len() % save_every == 0 {
                save_json_atomic(&save_path, &results)?;
                info!(
                    saved = results.len(),
                    avg_item_seconds = mean(&time_log),
                    path = %save_path.display(),
                    "checkpoint"
                );
            }
        }
    }

    save_json_atomic(&save_path, &results)?;
    info!(
        total = results.len(),
        avg_item_seconds = mean(&time_log),
        path = %save_path.display(),
        "run complete"
    );

    Ok(results)
}

/// Labeled comparison over every (key, other-model) cell.
///
/// Each summary is attributed to a source in the prompt. `LabelMode` controls
/// whether the attribution is truthful, deliberately swapped, or shuffled per
/// cell (with the shuffle recorded).
pub async fn generate_logprob_results_with_sources<J: Judge + ?Sized>(
    judge: &J,
    dataset: &Dataset,
    model: &str,
    opts: &SourcesRunOptions,
) -> Result<Vec<SourcesRecord>, ExperimentError> {
    let exact_model = model;
    let retrieval = normalize_source_name(model);

    let mut results: Vec<SourcesRecord> = Vec::new();

    for key in dataset.keys() {
        let article = dataset.article(key)?;
        let source_summary = dataset.summary(retrieval, key)?;

        for other in opts.sources.iter().filter(|s| s.as_str() != retrieval) {
            let other_summary = dataset.summary(other, key)?;

            // Labels for the judge's own summary and the other one, in that order.
            let (own_label, other_label, random_labels) = match opts.label_mode {
                LabelMode::Truthful => (retrieval.to_string(), other.clone(), None),
                LabelMode::Reversed => (other.clone(), retrieval.to_string(), None),
                LabelMode::Randomized => {
                    let mut labels = [retrieval.to_string(), other.clone()];
                    labels.shuffle(&mut rand::thread_rng());
                    (labels[0].clone(), labels[1].clone(), Some(labels))
                }
            };

            let forward = judge
                .labeled_choice(
                    source_summary,
                    other_summary,
                    &own_label,
                    &other_label,
                    article,
                    exact_model,
                )
                .await?;
            let backward = judge
                .labeled_choice(
                    other_summary,
                    source_summary,
                    &other_label,
                    &own_label,
                    article,
                    exact_model,
                )
                .await?;

            let (Some(f), Some(b)) = (
                outcome_or_log(
                    &forward,
                    JudgmentAxis::Comparison.framing(),
                    key,
                    exact_model,
                    other,
                ),
                outcome_or_log(
                    &backward,
                    JudgmentAxis::Comparison.framing(),
                    key,
                    exact_model,
                    other,
                ),
            ) else {
                continue;
            };

            results.push(SourcesRecord {
                key: key.clone(),
                model: other.clone(),
                random_labels,
                forward_comparison: f.choice.as_token().to_string(),
                forward_probability: f.p_chosen(),
                backward_comparison: b.choice.as_token().to_string(),
                backward_probability: b.p_chosen(),
                self_preference: combined_preference(f, b),
            });
        }
    }

    Ok(results)
}

/// 1-5 quality-score distributions for every (key, target-model) cell.
///
/// The judge rates each target's summary once; the response distribution is
/// densified so every rating token "1".."5" is present, with absent ratings
/// at probability 0.
pub async fn generate_score_results<J: Judge + ?Sized>(
    judge: &J,
    dataset: &Dataset,
    model: &str,
    opts: &RunOptions,
) -> Result<Vec<ScoreRecord>, ExperimentError> {
    let exact_model = model;
    let retrieval = normalize_source_name(model);

    let mut results: Vec<ScoreRecord> = Vec::new();

    for key in dataset.keys().iter().skip(opts.starting_idx) {
        let article = dataset.article(key)?;
        for target_model in &opts.sources {
            let summary = dataset.summary(target_model, key)?;

            let dist = judge.quality_score(summary, article, exact_model).await?;

            let mut scores = std::collections::BTreeMap::new();
            for entry in dist.iter() {
                let token = entry.token.trim();
                if SCORE_TOKENS.contains(&token) {
                    scores.insert(token.to_string(), entry.prob());
                }
            }
            for score in SCORE_TOKENS {
                scores.entry(score.to_string()).or_insert(0.0);
            }

            results.push(ScoreRecord {
                key: key.clone(),
                model: retrieval.to_string(),
                target_model: target_model.clone(),
                scores,
            });
        }
    }

    Ok(results)
}

/// Self-recognition probabilities for every (key, target-model) cell.
///
/// Responses lacking a "Yes" token are logged with their context and skipped;
/// no record is appended for them.
pub async fn generate_recognition_results<J: Judge + ?Sized>(
    judge: &J,
    dataset: &Dataset,
    model: &str,
    opts: &RunOptions,
) -> Result<Vec<RecognitionRecord>, ExperimentError> {
    let exact_model = model;
    let retrieval = normalize_source_name(model);

    let mut results: Vec<RecognitionRecord> = Vec::new();

    for key in dataset.keys().iter().skip(opts.starting_idx) {
        let article = dataset.article(key)?;
        for target_model in &opts.sources {
            let summary = dataset.summary(target_model, key)?;

            let dist = judge.recognition(summary, article, exact_model).await?;
            let res = dist.to_prob_map();

            let Some(recognition_score) = res.get("Yes").copied() else {
                warn!(
                    key,
                    model = exact_model,
                    target = target_model.as_str(),
                    response = ?res,
                    "recognition response lacked a Yes token; skipping record"
                );
                continue;
            };

            results.push(RecognitionRecord {
                key: key.clone(),
                model: exact_model.to_string(),
                target_model: target_model.clone(),
                recognition_score,
                res,
                ground_truth: u8::from(retrieval == target_model.as_str()),
            });
        }
    }

    Ok(results)
}
