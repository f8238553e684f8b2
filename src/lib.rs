#![forbid(unsafe_code)]

//! # selfpref-harness
//!
//! Experiment pipeline measuring self-preference bias in LLM judges.
//!
//! Source models each produce a summary of the same reference article. A judge
//! model is then asked, pairwise, which summary is better and which one is
//! machine-generated, with the question repeated in both presentation orders.
//! The discrete choice tokens ("1"/"2") and their log-probabilities from the
//! two orderings are combined into one symmetric score per (key, model) pair,
//! which is robust to presentation-order bias. Additional drivers collect 1-5
//! quality-score distributions and self-recognition ("did you write this?")
//! probabilities.

pub mod dataset;
pub mod experiments;
pub mod gateway;
pub mod judge;
pub mod persist;
pub mod prompts;
pub mod scoring;

pub use dataset::{normalize_source_name, Dataset, DatasetError, DEFAULT_SOURCES};
pub use experiments::{
    generate_logprob_results, generate_logprob_results_with_sources,
    generate_recognition_results, generate_score_results, ExperimentError, LabelMode,
    LogprobRunOptions, PairedJudgementRecord, RecognitionRecord, RunOptions, ScoreRecord,
    SourcesRecord, SourcesRunOptions,
};
pub use gateway::{Attribution, ChatGateway, ProviderGateway, UsageSink};
pub use judge::{GatewayJudge, Judge, JudgeError, TokenDistribution};
pub use scoring::{combined_preference, Choice, ChoiceOutcome, QuestionFraming};
