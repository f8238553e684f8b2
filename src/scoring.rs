//! Symmetric combination of order-swapped pairwise judgements.
//!
//! A single pairwise question is asked twice: once with summary A presented
//! first ("forward") and once with A presented second ("backward"). Each query
//! yields a discrete choice token, "1" or "2", plus the probability the judge
//! assigned to each of the two tokens. The two outcomes are folded into one
//! score for "A wins" so that presentation-order bias cancels out.

use tracing::warn;

use crate::judge::TokenDistribution;

/// Discrete choice token in a pairwise question.
///
/// "1" means the first-presented summary was picked, "2" the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    First,
    Second,
}

impl Choice {
    /// Parse from the literal token text.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim() {
            "1" => Some(Choice::First),
            "2" => Some(Choice::Second),
            _ => None,
        }
    }

    pub fn as_token(&self) -> &'static str {
        match self {
            Choice::First => "1",
            Choice::Second => "2",
        }
    }

    /// Swap "1" and "2".
    pub fn invert(self) -> Self {
        match self {
            Choice::First => Choice::Second,
            Choice::Second => Choice::First,
        }
    }
}

/// How the pairwise question was framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionFraming {
    /// "Which summary is better?" (or "which is machine-generated?").
    Better,
    /// "Which summary is worse?" - choice tokens are inverted before the
    /// combination table so the score still measures preference for A.
    Worse,
}

/// One query's outcome: the chosen token and the probability of both tokens.
///
/// Both probabilities are kept because the combination table may reference the
/// probability of either token, not just the chosen one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChoiceOutcome {
    pub choice: Choice,
    /// P(token "1") under the judge's next-token distribution.
    pub p_first: f64,
    /// P(token "2") under the judge's next-token distribution.
    pub p_second: f64,
}

impl ChoiceOutcome {
    /// Build from the judge's token distribution.
    ///
    /// Returns `None` when the top token is neither "1" nor "2"; the caller
    /// must skip the record rather than fabricate a score. A missing
    /// non-chosen token defaults to probability 0.
    pub fn from_distribution(dist: &TokenDistribution) -> Option<Self> {
        let top = dist.top()?;
        let choice = Choice::from_token(&top.token)?;
        Some(Self {
            choice,
            p_first: dist.prob_of("1").unwrap_or(0.0),
            p_second: dist.prob_of("2").unwrap_or(0.0),
        })
    }

    /// Apply a question framing: the "worse" framing flips the choice token
    /// while the per-token probabilities stay attached to their tokens.
    pub fn with_framing(mut self, framing: QuestionFraming) -> Self {
        if framing == QuestionFraming::Worse {
            self.choice = self.choice.invert();
        }
        self
    }

    /// Probability of the token that was actually chosen.
    pub fn p_chosen(&self) -> f64 {
        match self.choice {
            Choice::First => self.p_first,
            Choice::Second => self.p_second,
        }
    }

    /// Probability of the token the judge actually sampled, undoing the
    /// framing inversion applied to `choice`. Records keep the sampled
    /// token's probability even when the recorded choice is inverted.
    pub fn p_sampled(&self, framing: QuestionFraming) -> f64 {
        match framing {
            QuestionFraming::Better => self.p_chosen(),
            QuestionFraming::Worse => match self.choice {
                Choice::First => self.p_second,
                Choice::Second => self.p_first,
            },
        }
    }
}

/// Combine forward and backward outcomes into one score for "A wins".
///
/// "1" forward and "2" backward both mean A was preferred (A's position swaps
/// between the two queries), so those probabilities corroborate each other.
/// The order-inconsistent cases ("1"/"1", "2"/"2") are averaged anyway rather
/// than discarded, treating an inconsistent repeat as weak evidence.
///
/// | forward | backward | score = 0.5 x (...)            |
/// |---------|----------|--------------------------------|
/// | "1"     | "2"      | P(forward=1) + P(backward=2)   |
/// | "2"     | "1"      | P(forward=2) + P(backward=1)   |
/// | "1"     | "1"      | P(forward=1) + P(backward=1)   |
/// | "2"     | "2"      | P(forward=2) + P(backward=2)   |
pub fn combined_preference(forward: ChoiceOutcome, backward: ChoiceOutcome) -> f64 {
    use Choice::{First, Second};
    match (forward.choice, backward.choice) {
        (First, Second) => 0.5 * (forward.p_first + backward.p_second),
        (Second, First) => 0.5 * (forward.p_second + backward.p_first),
        (First, First) => 0.5 * (forward.p_first + backward.p_first),
        (Second, Second) => 0.5 * (forward.p_second + backward.p_second),
    }
}

/// Extract a framed outcome from a distribution, logging when the judge did
/// not answer with an expected choice token.
pub fn outcome_or_log(
    dist: &TokenDistribution,
    framing: QuestionFraming,
    key: &str,
    model: &str,
    other: &str,
) -> Option<ChoiceOutcome> {
    match ChoiceOutcome::from_distribution(dist) {
        Some(outcome) => Some(outcome.with_framing(framing)),
        None => {
            warn!(
                key,
                model,
                other,
                top = dist.top().map(|t| t.token.as_str()).unwrap_or("<empty>"),
                "judge response had no expected choice token; skipping record"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::TokenDistribution;

    fn outcome(choice: Choice, p_first: f64, p_second: f64) -> ChoiceOutcome {
        ChoiceOutcome {
            choice,
            p_first,
            p_second,
        }
    }

    #[test]
    fn consistent_forward_first() {
        // forward="1" with P(1)=0.9, backward="2" with P(2)=0.8 => 0.85
        let f = outcome(Choice::First, 0.9, 0.1);
        let b = outcome(Choice::Second, 0.2, 0.8);
        let score = combined_preference(f, b);
        assert!((score - 0.85).abs() < 1e-12, "got {score}");
    }

    #[test]
    fn consistent_backward_first() {
        // forward="2", backward="1": P(forward=2) + P(backward=1)
        let f = outcome(Choice::Second, 0.3, 0.7);
        let b = outcome(Choice::First, 0.6, 0.4);
        let score = combined_preference(f, b);
        assert!((score - 0.5 * (0.7 + 0.6)).abs() < 1e-12);
    }

    #[test]
    fn inconsistent_both_first() {
        // forward="1", backward="1": P(forward=1) + P(backward=1)
        let f = outcome(Choice::First, 0.55, 0.45);
        let b = outcome(Choice::First, 0.52, 0.48);
        let score = combined_preference(f, b);
        assert!((score - 0.5 * (0.55 + 0.52)).abs() < 1e-12);
    }

    #[test]
    fn inconsistent_both_second() {
        // forward="2", backward="2": P(forward=2) + P(backward=2)
        let f = outcome(Choice::Second, 0.4, 0.6);
        let b = outcome(Choice::Second, 0.35, 0.65);
        let score = combined_preference(f, b);
        assert!((score - 0.5 * (0.6 + 0.65)).abs() < 1e-12);
    }

    #[test]
    fn worse_framing_is_complementary() {
        // With complementary token probabilities, scoring A-as-worse under the
        // inverted table equals 1 - scoring A-as-better under the direct one.
        let cases = [
            (Choice::First, Choice::Second),
            (Choice::Second, Choice::First),
            (Choice::First, Choice::First),
            (Choice::Second, Choice::Second),
        ];
        for (fc, bc) in cases {
            let f = outcome(fc, 0.7, 0.3);
            let b = outcome(bc, 0.45, 0.55);
            let direct = combined_preference(f, b);
            let inverted = combined_preference(
                f.with_framing(QuestionFraming::Worse),
                b.with_framing(QuestionFraming::Worse),
            );
            assert!(
                (direct + inverted - 1.0).abs() < 1e-12,
                "({fc:?},{bc:?}): direct={direct} inverted={inverted}"
            );
        }
    }

    #[test]
    fn sampled_probability_survives_worse_framing() {
        // Judge sampled "1" at 0.8; the worse framing records choice "2" but
        // the sampled token's probability.
        let raw = outcome(Choice::First, 0.8, 0.2);
        let framed = raw.with_framing(QuestionFraming::Worse);
        assert_eq!(framed.choice, Choice::Second);
        assert!((framed.p_sampled(QuestionFraming::Worse) - 0.8).abs() < 1e-12);
        assert!((raw.p_sampled(QuestionFraming::Better) - raw.p_chosen()).abs() < 1e-12);
    }

    #[test]
    fn better_framing_is_identity() {
        let f = outcome(Choice::First, 0.8, 0.2);
        assert_eq!(f.with_framing(QuestionFraming::Better), f);
    }

    #[test]
    fn outcome_from_distribution() {
        let dist = TokenDistribution::from_logprobs(vec![
            ("1".to_string(), (0.9f64).ln()),
            ("2".to_string(), (0.1f64).ln()),
        ]);
        let o = ChoiceOutcome::from_distribution(&dist).unwrap();
        assert_eq!(o.choice, Choice::First);
        assert!((o.p_first - 0.9).abs() < 1e-9);
        assert!((o.p_second - 0.1).abs() < 1e-9);
    }

    #[test]
    fn outcome_missing_other_token_defaults_to_zero() {
        let dist = TokenDistribution::from_logprobs(vec![("2".to_string(), (0.6f64).ln())]);
        let o = ChoiceOutcome::from_distribution(&dist).unwrap();
        assert_eq!(o.choice, Choice::Second);
        assert_eq!(o.p_first, 0.0);
        assert!((o.p_second - 0.6).abs() < 1e-9);
    }

    #[test]
    fn outcome_unexpected_top_token_is_none() {
        let dist = TokenDistribution::from_logprobs(vec![
            ("I".to_string(), (0.7f64).ln()),
            ("1".to_string(), (0.2f64).ln()),
        ]);
        assert!(ChoiceOutcome::from_distribution(&dist).is_none());
    }

    #[test]
    fn choice_token_round_trip() {
        assert_eq!(Choice::from_token("1"), Some(Choice::First));
        assert_eq!(Choice::from_token(" 2 "), Some(Choice::Second));
        assert_eq!(Choice::from_token("Yes"), None);
        assert_eq!(Choice::First.invert(), Choice::Second);
        assert_eq!(Choice::Second.invert().as_token(), "1");
    }
}
