use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use selfpref_harness::experiments::{
    generate_logprob_results, generate_logprob_results_with_sources,
    generate_recognition_results, generate_score_results, ExperimentError, LabelMode,
    LogprobRunOptions, RunOptions, SourcesRunOptions,
};
use selfpref_harness::judge::{Judge, JudgeError, TokenDistribution};
use selfpref_harness::prompts::JudgmentAxis;
use selfpref_harness::Dataset;

fn dist(pairs: &[(&str, f64)]) -> TokenDistribution {
    TokenDistribution::from_logprobs(
        pairs
            .iter()
            .map(|(t, p)| (t.to_string(), p.ln()))
            .collect(),
    )
}

/// Deterministic judge: in pairwise questions it always picks the summary
/// containing "good" (p=0.8 when presented first, p=0.7 when second), rates
/// quality with a fixed {4, 5} distribution, and recognizes only summaries
/// containing "own".
struct ScriptedJudge {
    pairwise_calls: Mutex<usize>,
    fail_after_pairwise: Option<usize>,
}

impl ScriptedJudge {
    fn new() -> Self {
        Self {
            pairwise_calls: Mutex::new(0),
            fail_after_pairwise: None,
        }
    }

    fn failing_after(calls: usize) -> Self {
        Self {
            pairwise_calls: Mutex::new(0),
            fail_after_pairwise: Some(calls),
        }
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn pairwise_choice(
        &self,
        first_summary: &str,
        _second_summary: &str,
        _article: &str,
        _axis: JudgmentAxis,
        _judge_model: &str,
    ) -> Result<TokenDistribution, JudgeError> {
        let mut calls = self.pairwise_calls.lock().unwrap();
        if let Some(limit) = self.fail_after_pairwise {
            if *calls >= limit {
                return Err(JudgeError::EmptyOutput);
            }
        }
        *calls += 1;

        if first_summary.contains("good") {
            Ok(dist(&[("1", 0.8), ("2", 0.2)]))
        } else {
            Ok(dist(&[("2", 0.7), ("1", 0.3)]))
        }
    }

    async fn labeled_choice(
        &self,
        first_summary: &str,
        _second_summary: &str,
        _first_label: &str,
        _second_label: &str,
        _article: &str,
        _judge_model: &str,
    ) -> Result<TokenDistribution, JudgeError> {
        if first_summary.contains("good") {
            Ok(dist(&[("1", 0.6), ("2", 0.4)]))
        } else {
            Ok(dist(&[("2", 0.6), ("1", 0.4)]))
        }
    }

    async fn quality_score(
        &self,
        _summary: &str,
        _article: &str,
        _judge_model: &str,
    ) -> Result<TokenDistribution, JudgeError> {
        // No mass on "3" at all; drivers must still densify it to 0.
        Ok(dist(&[("4", 0.55), ("5", 0.3), ("Excellent", 0.05)]))
    }

    async fn recognition(
        &self,
        summary: &str,
        _article: &str,
        _judge_model: &str,
    ) -> Result<TokenDistribution, JudgeError> {
        if summary.contains("own") {
            Ok(dist(&[("Yes", 0.73), ("No", 0.2)]))
        } else {
            Ok(dist(&[("No", 0.9), ("Maybe", 0.05)]))
        }
    }
}

fn two_by_two_dataset() -> Dataset {
    let articles = HashMap::from([
        ("k1".to_string(), "article one".to_string()),
        ("k2".to_string(), "article two".to_string()),
    ]);
    let responses = HashMap::from([
        (
            "gpt4".to_string(),
            HashMap::from([
                ("k1".to_string(), "good own summary k1".to_string()),
                ("k2".to_string(), "good own summary k2".to_string()),
            ]),
        ),
        (
            "human".to_string(),
            HashMap::from([
                ("k1".to_string(), "plain human summary k1".to_string()),
                ("k2".to_string(), "plain human summary k2".to_string()),
            ]),
        ),
    ]);
    Dataset::from_parts("toy", articles, responses)
}

fn sources() -> Vec<String> {
    vec!["gpt4".to_string(), "human".to_string()]
}

#[tokio::test]
async fn logprob_driver_combines_forward_and_backward() {
    let ds = two_by_two_dataset();
    let judge = ScriptedJudge::new();
    let dir = tempfile::tempdir().unwrap();
    let opts = LogprobRunOptions {
        sources: sources(),
        save_path: Some(dir.path().join("out.json")),
        ..Default::default()
    };

    let results = generate_logprob_results(&judge, &ds, "gpt4", &opts)
        .await
        .unwrap();

    // 2 keys x 1 other model
    assert_eq!(results.len(), 2);
    for r in &results {
        assert_eq!(r.model, "human");
        // Forward: own "good" summary first -> "1" at 0.8.
        // Backward: human summary first -> "2" at 0.7. Consistent pair.
        assert_eq!(r.forward_detection, "1");
        assert_eq!(r.backward_detection, "2");
        assert!((r.forward_detection_probability - 0.8).abs() < 1e-9);
        assert!((r.backward_detection_probability - 0.7).abs() < 1e-9);
        assert!((r.detection_score - 0.75).abs() < 1e-9);
        assert!((r.self_preference - 0.75).abs() < 1e-9);
        assert!(r.elapsed_seconds >= 0.0);
    }

    // Final artifact matches the returned records.
    let on_disk: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("out.json")).unwrap()).unwrap();
    assert_eq!(on_disk.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn worse_framing_inverts_recorded_tokens() {
    let ds = two_by_two_dataset();
    let judge = ScriptedJudge::new();
    let dir = tempfile::tempdir().unwrap();
    let opts = LogprobRunOptions {
        sources: sources(),
        comparison_axis: JudgmentAxis::ComparisonWithWorse,
        save_path: Some(dir.path().join("out.json")),
        ..Default::default()
    };

    let results = generate_logprob_results(&judge, &ds, "gpt4", &opts)
        .await
        .unwrap();

    for r in &results {
        // The judge still answers "1" forward / "2" backward, but under the
        // "worse" framing the recorded tokens are inverted...
        assert_eq!(r.forward_comparison, "2");
        assert_eq!(r.backward_comparison, "1");
        // ...while the recorded probabilities stay those of the sampled tokens.
        assert!((r.forward_comparison_probability - 0.8).abs() < 1e-9);
        assert!((r.backward_comparison_probability - 0.7).abs() < 1e-9);
        // ("2","1") row: P(forward=2) + P(backward=1) = 0.2 + 0.3.
        assert!((r.self_preference - 0.25).abs() < 1e-9);
        // Detection is unaffected by the comparison framing.
        assert!((r.detection_score - 0.75).abs() < 1e-9);
    }
}

#[tokio::test]
async fn checkpoint_preserves_records_up_to_last_boundary() {
    // 5 keys x 1 other = 5 cells, 4 pairwise calls per cell. Failing from the
    // 17th call onward completes exactly 4 records before the error.
    let mut articles = HashMap::new();
    let mut own = HashMap::new();
    let mut other = HashMap::new();
    for i in 0..5 {
        let key = format!("k{i}");
        articles.insert(key.clone(), format!("article {i}"));
        own.insert(key.clone(), format!("good own summary {i}"));
        other.insert(key.clone(), format!("plain human summary {i}"));
    }
    let ds = Dataset::from_parts(
        "toy",
        articles,
        HashMap::from([("gpt4".to_string(), own), ("human".to_string(), other)]),
    );

    let judge = ScriptedJudge::failing_after(16);
    let dir = tempfile::tempdir().unwrap();
    let save_path = dir.path().join("autosave.json");
    let opts = LogprobRunOptions {
        sources: sources(),
        save_every: 2,
        save_path: Some(save_path.clone()),
        ..Default::default()
    };

    let err = generate_logprob_results(&judge, &ds, "gpt4", &opts)
        .await
        .unwrap_err();
    assert!(matches!(err, ExperimentError::Judge(_)));

    // Checkpoints fired at 2 and 4 records; the artifact holds exactly the
    // records up to the last boundary.
    let on_disk: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&save_path).unwrap()).unwrap();
    assert_eq!(on_disk.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn score_driver_produces_dense_grid() {
    let ds = two_by_two_dataset();
    let judge = ScriptedJudge::new();
    let opts = RunOptions {
        sources: sources(),
        ..Default::default()
    };

    let results = generate_score_results(&judge, &ds, "gpt4", &opts)
        .await
        .unwrap();

    // 2 keys x 2 target models (scoring includes the judge's own source).
    assert_eq!(results.len(), 4);
    for r in &results {
        assert_eq!(r.model, "gpt4");
        assert_eq!(r.scores.len(), 5);
        for token in ["1", "2", "3", "4", "5"] {
            assert!(r.scores.contains_key(token), "missing rating {token}");
        }
        // Absent ratings default to zero; non-score tokens are dropped.
        assert_eq!(r.scores["3"], 0.0);
        let mass: f64 = r.scores.values().sum();
        assert!((mass - 0.85).abs() < 1e-9, "mass {mass}");
    }
}

#[tokio::test]
async fn score_driver_respects_starting_offset() {
    let ds = two_by_two_dataset();
    let judge = ScriptedJudge::new();
    let opts = RunOptions {
        starting_idx: 1,
        sources: sources(),
    };

    let results = generate_score_results(&judge, &ds, "gpt4", &opts)
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.key == "k2"));
}

#[tokio::test]
async fn recognition_driver_skips_missing_yes() {
    let ds = two_by_two_dataset();
    let judge = ScriptedJudge::new();
    let opts = RunOptions {
        sources: sources(),
        ..Default::default()
    };

    let results = generate_recognition_results(&judge, &ds, "gpt4", &opts)
        .await
        .unwrap();

    // The human summaries get a pure "No" response and are skipped; only the
    // judge's own summaries produce records.
    assert_eq!(results.len(), 2);
    for r in &results {
        assert_eq!(r.target_model, "gpt4");
        assert!((r.recognition_score - 0.73).abs() < 1e-9);
        assert_eq!(r.ground_truth, 1);
        assert!((r.res["No"] - 0.2).abs() < 1e-9);
    }
}

#[tokio::test]
async fn recognition_ground_truth_tracks_target() {
    struct AlwaysYes;

    #[async_trait]
    impl Judge for AlwaysYes {
        async fn pairwise_choice(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: JudgmentAxis,
            _: &str,
        ) -> Result<TokenDistribution, JudgeError> {
            unreachable!("recognition driver never asks pairwise questions")
        }

        async fn labeled_choice(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<TokenDistribution, JudgeError> {
            unreachable!()
        }

        async fn quality_score(
            &self,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<TokenDistribution, JudgeError> {
            unreachable!()
        }

        async fn recognition(
            &self,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<TokenDistribution, JudgeError> {
            Ok(dist(&[("Yes", 0.5), ("No", 0.5)]))
        }
    }

    let ds = two_by_two_dataset();
    let opts = RunOptions {
        sources: sources(),
        ..Default::default()
    };

    let results = generate_recognition_results(&AlwaysYes, &ds, "gpt4", &opts)
        .await
        .unwrap();

    assert_eq!(results.len(), 4);
    for r in &results {
        let expected = u8::from(r.target_model == "gpt4");
        assert_eq!(r.ground_truth, expected, "target {}", r.target_model);
    }
}

#[tokio::test]
async fn recognition_ground_truth_matches_fine_tune_bucket() {
    struct YesHalf;

    #[async_trait]
    impl Judge for YesHalf {
        async fn pairwise_choice(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: JudgmentAxis,
            _: &str,
        ) -> Result<TokenDistribution, JudgeError> {
            unreachable!()
        }

        async fn labeled_choice(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<TokenDistribution, JudgeError> {
            unreachable!()
        }

        async fn quality_score(
            &self,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<TokenDistribution, JudgeError> {
            unreachable!()
        }

        async fn recognition(
            &self,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<TokenDistribution, JudgeError> {
            Ok(dist(&[("Yes", 0.5), ("No", 0.5)]))
        }
    }

    let articles = HashMap::from([("k1".to_string(), "article one".to_string())]);
    let responses = HashMap::from([
        (
            "gpt35".to_string(),
            HashMap::from([("k1".to_string(), "base model summary".to_string())]),
        ),
        (
            "human".to_string(),
            HashMap::from([("k1".to_string(), "human summary".to_string())]),
        ),
    ]);
    let ds = Dataset::from_parts("toy", articles, responses);
    let opts = RunOptions {
        sources: vec!["gpt35".to_string(), "human".to_string()],
        ..Default::default()
    };

    // Fine-tuned judge id: ground truth marks the base model's summaries as
    // its own, while the record keeps the exact id.
    let results = generate_recognition_results(&YesHalf, &ds, "cnn_10_ft_gpt35", &opts)
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    for r in &results {
        assert_eq!(r.model, "cnn_10_ft_gpt35");
        assert_eq!(r.ground_truth, u8::from(r.target_model == "gpt35"));
    }
}

#[tokio::test]
async fn sources_driver_truthful_labels() {
    let ds = two_by_two_dataset();
    let judge = ScriptedJudge::new();
    let opts = SourcesRunOptions {
        sources: sources(),
        label_mode: LabelMode::Truthful,
    };

    let results = generate_logprob_results_with_sources(&judge, &ds, "gpt4", &opts)
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    for r in &results {
        assert!(r.random_labels.is_none());
        assert_eq!(r.forward_comparison, "1");
        assert_eq!(r.backward_comparison, "2");
        // Consistent pair: 0.5 * (0.6 + 0.6).
        assert!((r.self_preference - 0.6).abs() < 1e-9);
    }
}

#[tokio::test]
async fn sources_driver_records_randomized_labels() {
    let ds = two_by_two_dataset();
    let judge = ScriptedJudge::new();
    let opts = SourcesRunOptions {
        sources: sources(),
        label_mode: LabelMode::Randomized,
    };

    let results = generate_logprob_results_with_sources(&judge, &ds, "gpt4", &opts)
        .await
        .unwrap();

    for r in &results {
        let labels = r.random_labels.as_ref().expect("labels recorded");
        let mut sorted = labels.clone();
        sorted.sort();
        assert_eq!(sorted, ["gpt4".to_string(), "human".to_string()]);
    }
}

#[tokio::test]
async fn sources_driver_reversed_labels_swap_attribution() {
    struct LabelCapture {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Judge for LabelCapture {
        async fn pairwise_choice(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: JudgmentAxis,
            _: &str,
        ) -> Result<TokenDistribution, JudgeError> {
            unreachable!("labeled driver never asks unlabeled questions")
        }

        async fn labeled_choice(
            &self,
            first_summary: &str,
            _second_summary: &str,
            first_label: &str,
            second_label: &str,
            _article: &str,
            _judge_model: &str,
        ) -> Result<TokenDistribution, JudgeError> {
            self.calls
                .lock()
                .unwrap()
                .push((first_label.to_string(), second_label.to_string()));
            if first_summary.contains("good") {
                Ok(dist(&[("1", 0.6), ("2", 0.4)]))
            } else {
                Ok(dist(&[("2", 0.6), ("1", 0.4)]))
            }
        }

        async fn quality_score(
            &self,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<TokenDistribution, JudgeError> {
            unreachable!()
        }

        async fn recognition(
            &self,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<TokenDistribution, JudgeError> {
            unreachable!()
        }
    }

    let ds = two_by_two_dataset();
    let judge = LabelCapture {
        calls: Mutex::new(Vec::new()),
    };
    let opts = SourcesRunOptions {
        sources: sources(),
        label_mode: LabelMode::Reversed,
    };

    let results = generate_logprob_results_with_sources(&judge, &ds, "gpt4", &opts)
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    for r in &results {
        assert!(r.random_labels.is_none());
        assert!((r.self_preference - 0.6).abs() < 1e-9);
    }

    // Each cell asks forward then backward. Reversed mode attributes the
    // judge's own summary to the other source and vice versa, in both orders.
    let calls = judge.calls.lock().unwrap();
    assert_eq!(calls.len(), 4);
    for cell in calls.chunks(2) {
        assert_eq!(cell[0], ("human".to_string(), "gpt4".to_string()));
        assert_eq!(cell[1], ("gpt4".to_string(), "human".to_string()));
    }
}

#[tokio::test]
async fn logprob_driver_skips_unscorable_cells() {
    struct Unparseable;

    #[async_trait]
    impl Judge for Unparseable {
        async fn pairwise_choice(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: JudgmentAxis,
            _: &str,
        ) -> Result<TokenDistribution, JudgeError> {
            Ok(dist(&[("I", 0.9), ("1", 0.05)]))
        }

        async fn labeled_choice(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<TokenDistribution, JudgeError> {
            unreachable!()
        }

        async fn quality_score(
            &self,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<TokenDistribution, JudgeError> {
            unreachable!()
        }

        async fn recognition(
            &self,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<TokenDistribution, JudgeError> {
            unreachable!()
        }
    }

    let ds = two_by_two_dataset();
    let dir = tempfile::tempdir().unwrap();
    let opts = LogprobRunOptions {
        sources: sources(),
        save_path: Some(dir.path().join("out.json")),
        ..Default::default()
    };

    let results = generate_logprob_results(&Unparseable, &ds, "gpt4", &opts)
        .await
        .unwrap();

    // Every cell lacked an expected choice token: no records, no error.
    assert!(results.is_empty());
}
