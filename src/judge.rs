//! Model-invocation layer: one chat request per judgement, returning the
//! judge's next-token distribution over the answer tokens.
//!
//! Every question in the experiment is phrased so the answer is a single
//! token ("1"/"2", a score digit, or "Yes"/"No"). The request asks for
//! logprobs with a generous alternative count so the probability of the
//! non-chosen token is available to the combination rule.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::gateway::{Attribution, ChatGateway, ChatModel, ChatRequest, ChatResponse, ProviderError};
use crate::prompts::{self, JudgmentAxis};

/// Alternatives requested per output token position.
const TOP_LOGPROBS: u32 = 20;

/// Single-token answers only; a small cap keeps responses cheap.
const ANSWER_MAX_TOKENS: u32 = 4;

/// One token with its log-probability.
#[derive(Debug, Clone)]
pub struct TokenProb {
    pub token: String,
    pub logprob: f64,
}

impl TokenProb {
    /// Probability obtained by exponentiating the log-probability.
    pub fn prob(&self) -> f64 {
        self.logprob.exp()
    }
}

/// Ranked next-token distribution at the answer position.
///
/// Entries are sorted by descending log-probability; the first entry is the
/// token the judge actually produced.
#[derive(Debug, Clone)]
pub struct TokenDistribution {
    entries: Vec<TokenProb>,
}

impl TokenDistribution {
    /// Build from (token, logprob) pairs. Duplicate tokens (after trimming)
    /// keep their highest-probability entry.
    pub fn from_logprobs(pairs: Vec<(String, f64)>) -> Self {
        let mut entries: Vec<TokenProb> = Vec::with_capacity(pairs.len());
        for (token, logprob) in pairs {
            match entries
                .iter_mut()
                .find(|e| e.token.trim() == token.trim())
            {
                Some(existing) => {
                    if logprob > existing.logprob {
                        existing.logprob = logprob;
                    }
                }
                None => entries.push(TokenProb { token, logprob }),
            }
        }
        entries.sort_by(|a, b| b.logprob.total_cmp(&a.logprob));
        Self { entries }
    }

    /// Build from a chat response's first output token position.
    ///
    /// The produced token and its listed alternatives are merged into one
    /// ranked distribution.
    pub fn from_response(resp: &ChatResponse) -> Result<Self, JudgeError> {
        let logprobs = resp
            .output_logprobs
            .as_ref()
            .ok_or(JudgeError::MissingLogprobs)?;
        let first = logprobs.first().ok_or(JudgeError::EmptyOutput)?;

        let mut pairs = vec![(first.token.clone(), first.logprob)];
        for alt in &first.top_alternatives {
            pairs.push((alt.token.clone(), alt.logprob));
        }
        Ok(Self::from_logprobs(pairs))
    }

    /// Highest-probability entry.
    pub fn top(&self) -> Option<&TokenProb> {
        self.entries.first()
    }

    /// Probability of a specific token (trimmed match), if present.
    pub fn prob_of(&self, token: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.token.trim() == token)
            .map(TokenProb::prob)
    }

    /// Token -> probability map over all entries.
    pub fn to_prob_map(&self) -> BTreeMap<String, f64> {
        self.entries
            .iter()
            .map(|e| (e.token.trim().to_string(), e.prob()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TokenProb> {
        self.entries.iter()
    }
}

/// Errors from the judgement layer.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("provider returned no output logprobs; judgements need the token distribution")]
    MissingLogprobs,
    #[error("provider returned an empty output")]
    EmptyOutput,
}

/// The judgement operations the experiment drivers consume.
///
/// Implementations issue one chat request per call and return the ranked
/// token distribution at the answer position. Tests substitute deterministic
/// implementations.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Pairwise question over two summaries presented in the given order.
    async fn pairwise_choice(
        &self,
        first_summary: &str,
        second_summary: &str,
        article: &str,
        axis: JudgmentAxis,
        judge_model: &str,
    ) -> Result<TokenDistribution, JudgeError>;

    /// Pairwise comparison where each summary is attributed to a named source.
    async fn labeled_choice(
        &self,
        first_summary: &str,
        second_summary: &str,
        first_label: &str,
        second_label: &str,
        article: &str,
        judge_model: &str,
    ) -> Result<TokenDistribution, JudgeError>;

    /// 1-5 quality rating of a single summary.
    async fn quality_score(
        &self,
        summary: &str,
        article: &str,
        judge_model: &str,
    ) -> Result<TokenDistribution, JudgeError>;

    /// "Did you write this summary?" Yes/No question.
    async fn recognition(
        &self,
        summary: &str,
        article: &str,
        judge_model: &str,
    ) -> Result<TokenDistribution, JudgeError>;
}

/// Judge implementation over the provider gateway.
pub struct GatewayJudge<G: ChatGateway> {
    gateway: Arc<G>,
}

impl<G: ChatGateway> GatewayJudge<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    async fn ask(
        &self,
        system: String,
        user: String,
        judge_model: &str,
        caller: &'static str,
    ) -> Result<TokenDistribution, JudgeError> {
        let req = ChatRequest::new(
            ChatModel::openrouter(judge_model),
            prompts::to_messages(system, user),
            Attribution::new(caller),
        )
        .max_tokens(ANSWER_MAX_TOKENS)
        .with_logprobs(TOP_LOGPROBS);

        let resp = self.gateway.chat(req).await?;
        TokenDistribution::from_response(&resp)
    }
}

#[async_trait]
impl<G: ChatGateway> Judge for GatewayJudge<G> {
    async fn pairwise_choice(
        &self,
        first_summary: &str,
        second_summary: &str,
        article: &str,
        axis: JudgmentAxis,
        judge_model: &str,
    ) -> Result<TokenDistribution, JudgeError> {
        let (system, user) = prompts::render_pairwise(first_summary, second_summary, article, axis);
        self.ask(system, user, judge_model, "judge::pairwise").await
    }

    async fn labeled_choice(
        &self,
        first_summary: &str,
        second_summary: &str,
        first_label: &str,
        second_label: &str,
        article: &str,
        judge_model: &str,
    ) -> Result<TokenDistribution, JudgeError> {
        let (system, user) = prompts::render_labeled(
            first_summary,
            second_summary,
            first_label,
            second_label,
            article,
        );
        self.ask(system, user, judge_model, "judge::labeled").await
    }

    async fn quality_score(
        &self,
        summary: &str,
        article: &str,
        judge_model: &str,
    ) -> Result<TokenDistribution, JudgeError> {
        let (system, user) = prompts::render_score(summary, article);
        self.ask(system, user, judge_model, "judge::score").await
    }

    async fn recognition(
        &self,
        summary: &str,
        article: &str,
        judge_model: &str,
    ) -> Result<TokenDistribution, JudgeError> {
        let (system, user) = prompts::render_recognition(summary, article);
        self.ask(system, user, judge_model, "judge::recognition")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{FinishReason, TokenAlternative, TokenLogprob};
    use std::time::Duration;

    fn response_with_logprobs(tokens: Option<Vec<TokenLogprob>>) -> ChatResponse {
        ChatResponse {
            content: "1".to_string(),
            input_tokens: 10,
            output_tokens: 1,
            latency: Duration::from_millis(5),
            finish_reason: FinishReason::Stop,
            output_logprobs: tokens,
        }
    }

    #[test]
    fn distribution_from_response_merges_alternatives() {
        let resp = response_with_logprobs(Some(vec![TokenLogprob {
            token: "1".to_string(),
            logprob: (0.7f64).ln(),
            top_alternatives: vec![
                TokenAlternative {
                    token: "1".to_string(),
                    logprob: (0.7f64).ln(),
                },
                TokenAlternative {
                    token: "2".to_string(),
                    logprob: (0.25f64).ln(),
                },
            ],
        }]));

        let dist = TokenDistribution::from_response(&resp).unwrap();
        assert_eq!(dist.top().unwrap().token, "1");
        assert!((dist.prob_of("1").unwrap() - 0.7).abs() < 1e-9);
        assert!((dist.prob_of("2").unwrap() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn distribution_missing_logprobs_is_error() {
        let resp = response_with_logprobs(None);
        assert!(matches!(
            TokenDistribution::from_response(&resp),
            Err(JudgeError::MissingLogprobs)
        ));
    }

    #[test]
    fn distribution_empty_output_is_error() {
        let resp = response_with_logprobs(Some(vec![]));
        assert!(matches!(
            TokenDistribution::from_response(&resp),
            Err(JudgeError::EmptyOutput)
        ));
    }

    #[test]
    fn distribution_ranks_by_probability() {
        let dist = TokenDistribution::from_logprobs(vec![
            ("2".to_string(), (0.3f64).ln()),
            ("1".to_string(), (0.6f64).ln()),
            ("3".to_string(), (0.1f64).ln()),
        ]);
        assert_eq!(dist.top().unwrap().token, "1");
        let map = dist.to_prob_map();
        assert_eq!(map.len(), 3);
        assert!((map["2"] - 0.3).abs() < 1e-9);
    }

    #[test]
    fn prob_of_trims_token_whitespace() {
        let dist =
            TokenDistribution::from_logprobs(vec![(" Yes".to_string(), (0.73f64).ln())]);
        assert!((dist.prob_of("Yes").unwrap() - 0.73).abs() < 1e-9);
        assert!(dist.prob_of("No").is_none());
    }
}
