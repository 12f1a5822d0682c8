//! Response aggregation across the panel.
//!
//! The aggregator asks the oracle once per persona (sequentially or with a
//! bounded set of concurrent tasks) or once for the whole panel, and merges
//! the answers into a [`Turn`] with exactly one reply per registered persona.
//! It never touches the conversation log; appending is the caller's job.
//!
//! # Parallel fan-out
//!
//! ```text
//! prompts ──┬─ task 0 ─ oracle.answer ─┐
//!           ├─ task 1 ─ oracle.answer ─┤   slots[idx] = text
//!           └─ task N ─ oracle.answer ─┘   (completion order is irrelevant)
//!                                      ↓
//!                               Turn (registry order)
//! ```

use crate::conversation::{ConversationLog, PersonaReply, Turn, Utterance};
use crate::error::{PanelError, Result};
use crate::oracle::{Oracle, error_message, is_error_response};
use crate::persona::{Persona, PersonaRegistry};
use crate::prompt::PromptBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Reason recorded when a persona task ended without producing text.
pub const MISSING_TASK_RESPONSE: &str = "応答を取得できませんでした";
/// Reason recorded when a panel response, or one persona's entry in it, is not text.
pub const MALFORMED_PANEL_RESPONSE: &str = "応答の形式が不正です";
/// Reason recorded when a panel response omits a persona.
pub const MISSING_PERSONA_ANSWER: &str = "回答が含まれていません";

/// How per-persona oracle calls are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyMode {
    /// One call at a time, in registry order.
    Sequential,
    /// All calls issued concurrently, bounded by the persona count.
    #[default]
    Parallel,
}

impl FromStr for ConcurrencyMode {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            other => Err(PanelError::Config(format!(
                "unknown concurrency mode '{other}' (expected 'sequential' or 'parallel')"
            ))),
        }
    }
}

impl fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => f.write_str("sequential"),
            Self::Parallel => f.write_str("parallel"),
        }
    }
}

/// Whether the panel is asked persona by persona or in a single shared call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dispatch {
    #[default]
    PerPersona,
    Combined,
}

impl FromStr for Dispatch {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per_persona" | "per-persona" => Ok(Self::PerPersona),
            "combined" => Ok(Self::Combined),
            other => Err(PanelError::Config(format!(
                "unknown dispatch '{other}' (expected 'per_persona' or 'combined')"
            ))),
        }
    }
}

/// Collects one answer per persona and merges them into a [`Turn`].
pub struct ResponseAggregator {
    oracle: Arc<dyn Oracle>,
    prompts: PromptBuilder,
    mode: ConcurrencyMode,
    max_workers: Option<usize>,
}

impl ResponseAggregator {
    /// Creates an aggregator in parallel mode.
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            prompts: PromptBuilder::new(),
            mode: ConcurrencyMode::default(),
            max_workers: None,
        }
    }

    pub fn with_mode(mut self, mode: ConcurrencyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Caps concurrent oracle calls below the persona count.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    pub fn mode(&self) -> ConcurrencyMode {
        self.mode
    }

    pub fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    /// Runs the requested dispatch.
    pub async fn collect(
        &self,
        dispatch: Dispatch,
        utterance: &Utterance,
        registry: &PersonaRegistry,
        prior_log: &ConversationLog,
    ) -> Result<Turn> {
        match dispatch {
            Dispatch::PerPersona => self.collect_responses(utterance, registry, prior_log).await,
            Dispatch::Combined => self.collect_combined(utterance, registry, prior_log).await,
        }
    }

    /// Asks every persona individually and merges the answers.
    ///
    /// Uses the initial prompt when `prior_log` is empty and the continuation
    /// prompt otherwise. Oracle failures become error-marked replies; the only
    /// error returned is a prompt rendering failure, raised before any call.
    #[tracing::instrument(
        name = "aggregator.collect_responses",
        skip_all,
        fields(
            oracle = %self.oracle.name(),
            mode = %self.mode,
            personas = registry.len(),
            continuation = !prior_log.is_empty(),
        )
    )]
    pub async fn collect_responses(
        &self,
        utterance: &Utterance,
        registry: &PersonaRegistry,
        prior_log: &ConversationLog,
    ) -> Result<Turn> {
        let prompts = registry
            .iter()
            .map(|persona| self.prompt_for(utterance, persona, prior_log))
            .collect::<Result<Vec<_>>>()?;

        let responses = match self.mode {
            ConcurrencyMode::Sequential => self.answer_sequential(registry, prompts).await,
            ConcurrencyMode::Parallel => self.answer_parallel(registry, prompts).await,
        };

        let replies = registry
            .iter()
            .zip(responses)
            .map(|(persona, text)| PersonaReply::new(persona.name.clone(), text))
            .collect();

        Ok(finish_turn(utterance, replies))
    }

    /// Asks the whole panel in one oracle call.
    ///
    /// The response must be a JSON object keyed by persona name. Anything else
    /// gives every persona the same fixed error reply; a persona whose entry is
    /// missing or not a string fails alone, and unknown keys are ignored.
    #[tracing::instrument(
        name = "aggregator.collect_combined",
        skip_all,
        fields(
            oracle = %self.oracle.name(),
            personas = registry.len(),
            continuation = !prior_log.is_empty(),
        )
    )]
    pub async fn collect_combined(
        &self,
        utterance: &Utterance,
        registry: &PersonaRegistry,
        prior_log: &ConversationLog,
    ) -> Result<Turn> {
        let prompt = self
            .prompts
            .build_panel_prompt(utterance, registry, prior_log)?;
        let raw = self.oracle.answer(&prompt).await;
        Ok(finish_turn(utterance, parse_panel_response(&raw, registry)))
    }

    /// Summarizes the whole log through the oracle.
    #[tracing::instrument(
        name = "aggregator.summarize",
        skip_all,
        fields(oracle = %self.oracle.name(), turns = log.len())
    )]
    pub async fn summarize(&self, log: &ConversationLog) -> Result<String> {
        if log.is_empty() {
            return Err(PanelError::Precondition(
                "要約する会話がありません".to_string(),
            ));
        }
        let prompt = self.prompts.build_summary_prompt(log)?;
        Ok(self.oracle.answer(&prompt).await)
    }

    fn prompt_for(
        &self,
        utterance: &Utterance,
        persona: &Persona,
        prior_log: &ConversationLog,
    ) -> Result<String> {
        if prior_log.is_empty() {
            self.prompts.build_initial_prompt(utterance, persona)
        } else {
            self.prompts.build_continuation_prompt(utterance, persona, prior_log)
        }
    }

    async fn answer_sequential(
        &self,
        registry: &PersonaRegistry,
        prompts: Vec<String>,
    ) -> Vec<String> {
        let mut responses = Vec::with_capacity(prompts.len());
        for (persona, prompt) in registry.iter().zip(prompts) {
            let text = self.oracle.answer(&prompt).await;
            debug!(persona = %persona.name, "persona answered");
            responses.push(text);
        }
        responses
    }

    async fn answer_parallel(
        &self,
        registry: &PersonaRegistry,
        prompts: Vec<String>,
    ) -> Vec<String> {
        let permits = Arc::new(Semaphore::new(self.worker_limit(prompts.len())));
        let mut slots: Vec<Option<String>> = vec![None; prompts.len()];
        let mut pending = JoinSet::new();

        for (idx, (persona, prompt)) in registry.iter().zip(prompts).enumerate() {
            let oracle = Arc::clone(&self.oracle);
            let permits = Arc::clone(&permits);
            let name = persona.name.clone();

            pending.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let text = oracle.answer(&prompt).await;
                (idx, name, text)
            });
        }

        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok((idx, name, text)) => {
                    debug!(persona = %name, "persona answered");
                    slots[idx] = Some(text);
                }
                Err(err) => warn!(error = %err, "persona task did not complete"),
            }
        }

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| error_message(MISSING_TASK_RESPONSE)))
            .collect()
    }

    fn worker_limit(&self, tasks: usize) -> usize {
        let tasks = tasks.max(1);
        self.max_workers.map_or(tasks, |limit| limit.clamp(1, tasks))
    }
}

fn finish_turn(utterance: &Utterance, replies: Vec<PersonaReply>) -> Turn {
    let turn = Turn::new(utterance.as_str(), replies);
    for persona in turn.failed_personas() {
        warn!(persona = %persona, "persona answered with an error");
    }
    turn
}

/// Splits a combined panel response into per-persona replies.
fn parse_panel_response(raw: &str, registry: &PersonaRegistry) -> Vec<PersonaReply> {
    if is_error_response(raw) {
        return registry
            .iter()
            .map(|persona| PersonaReply::new(persona.name.clone(), raw.to_string()))
            .collect();
    }

    // Keys outside the registry are ignored, whatever their value.
    match serde_json::from_str::<HashMap<String, Value>>(raw.trim()) {
        Ok(answers) => registry
            .iter()
            .map(|persona| {
                let text = match answers.get(&persona.name) {
                    Some(Value::String(text)) => text.clone(),
                    Some(other) => {
                        warn!(persona = %persona.name, value = %other, "panel answer is not text");
                        error_message(MALFORMED_PANEL_RESPONSE)
                    }
                    None => error_message(MISSING_PERSONA_ANSWER),
                };
                PersonaReply::new(persona.name.clone(), text)
            })
            .collect(),
        Err(err) => {
            warn!(error = %err, "panel response is not a JSON object");
            let text = error_message(MALFORMED_PANEL_RESPONSE);
            registry
                .iter()
                .map(|persona| PersonaReply::new(persona.name.clone(), text.clone()))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::FnOracle;

    fn registry() -> PersonaRegistry {
        PersonaRegistry::new(vec![Persona::new("A", "role A"), Persona::new("B", "role B")])
            .unwrap()
    }

    fn silent_aggregator() -> ResponseAggregator {
        ResponseAggregator::new(Arc::new(FnOracle::new(|_prompt: String| async {
            String::new()
        })))
    }

    #[test]
    fn test_concurrency_mode_from_str() {
        assert_eq!("Sequential".parse::<ConcurrencyMode>().unwrap(), ConcurrencyMode::Sequential);
        assert_eq!(" parallel ".parse::<ConcurrencyMode>().unwrap(), ConcurrencyMode::Parallel);
        assert!("fast".parse::<ConcurrencyMode>().is_err());
        assert_eq!(ConcurrencyMode::default(), ConcurrencyMode::Parallel);
        assert_eq!(ConcurrencyMode::Sequential.to_string(), "sequential");
    }

    #[test]
    fn test_dispatch_from_str() {
        assert_eq!("combined".parse::<Dispatch>().unwrap(), Dispatch::Combined);
        assert_eq!("per-persona".parse::<Dispatch>().unwrap(), Dispatch::PerPersona);
        assert!("broadcast".parse::<Dispatch>().is_err());
    }

    #[test]
    fn test_worker_limit_defaults_to_task_count() {
        let aggregator = silent_aggregator();
        assert_eq!(aggregator.worker_limit(4), 4);
        assert_eq!(aggregator.worker_limit(0), 1);
    }

    #[test]
    fn test_worker_limit_is_clamped() {
        let aggregator = silent_aggregator().with_max_workers(2);
        assert_eq!(aggregator.worker_limit(4), 2);
        assert_eq!(aggregator.worker_limit(1), 1);

        let aggregator = silent_aggregator().with_max_workers(0);
        assert_eq!(aggregator.worker_limit(4), 1);
    }

    #[test]
    fn test_parse_panel_response() {
        let raw = r#"{"A": "answer a", "B": "answer b", "C": "x"}"#;
        let replies = parse_panel_response(raw, &registry());
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].persona, "A");
        assert_eq!(replies[0].text(), "answer a");
        assert_eq!(replies[1].text(), "answer b");
    }

    #[test]
    fn test_parse_panel_response_ignores_extra_keys() {
        let raw = r#"{"A": "a", "B": "b", "confidence": 0.9, "notes": {"tone": "calm"}}"#;
        let replies = parse_panel_response(raw, &registry());
        assert_eq!(replies[0].text(), "a");
        assert_eq!(replies[1].text(), "b");
        assert!(replies.iter().all(|r| !r.outcome.is_failed()));
    }

    #[test]
    fn test_parse_panel_response_non_text_answer_fails_alone() {
        let replies = parse_panel_response(r#"{"A": 1, "B": "answer b"}"#, &registry());
        assert_eq!(replies[0].text(), "エラー: 応答の形式が不正です");
        assert_eq!(replies[1].text(), "answer b");
        assert!(!replies[1].outcome.is_failed());
    }

    #[test]
    fn test_parse_panel_response_missing_key() {
        let replies = parse_panel_response(r#"{"B": "answer b"}"#, &registry());
        assert!(replies[0].outcome.is_failed());
        assert_eq!(replies[0].text(), "エラー: 回答が含まれていません");
        assert!(!replies[1].outcome.is_failed());
    }

    #[test]
    fn test_parse_panel_response_schema_mismatch() {
        for raw in ["not json", r#"["A", "B"]"#, r#""A""#] {
            let replies = parse_panel_response(raw, &registry());
            assert_eq!(replies.len(), 2);
            assert!(
                replies
                    .iter()
                    .all(|r| r.text() == "エラー: 応答の形式が不正です"),
                "raw: {raw}"
            );
        }
    }

    #[test]
    fn test_parse_panel_response_passes_oracle_error_through() {
        let replies = parse_panel_response("エラー: timeout", &registry());
        assert!(replies.iter().all(|r| r.text() == "エラー: timeout"));
    }

    #[tokio::test]
    async fn test_summarize_rejects_empty_log() {
        let err = silent_aggregator()
            .summarize(&ConversationLog::new())
            .await
            .unwrap_err();
        assert!(err.is_precondition());
    }
}
