//! A consultation session: one registry, one log, one aggregator.
//!
//! The session is the only owner of the [`ConversationLog`]. A submitted
//! utterance either fails validation (nothing is appended) or produces exactly
//! one complete [`Turn`] that is appended as a whole.

use crate::aggregator::{Dispatch, ResponseAggregator};
use crate::config::PanelConfig;
use crate::conversation::{ConversationLog, Turn, Utterance};
use crate::error::Result;
use crate::oracle::Oracle;
use crate::persona::PersonaRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Lifecycle of a session's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No turn has been recorded yet.
    Empty,
    /// At least one turn is recorded. Never returns to `Empty`.
    HasTurns,
}

pub struct Session {
    registry: PersonaRegistry,
    log: ConversationLog,
    aggregator: ResponseAggregator,
    dispatch: Dispatch,
}

impl Session {
    pub fn new(registry: PersonaRegistry, aggregator: ResponseAggregator) -> Self {
        Self {
            registry,
            log: ConversationLog::new(),
            aggregator,
            dispatch: Dispatch::default(),
        }
    }

    /// Builds a session from configuration and an oracle.
    pub fn from_config(config: &PanelConfig, oracle: Arc<dyn Oracle>) -> Result<Self> {
        let mut aggregator = ResponseAggregator::new(oracle).with_mode(config.concurrency);
        if let Some(max_workers) = config.max_workers {
            aggregator = aggregator.with_max_workers(max_workers);
        }
        Ok(Self::new(config.registry()?, aggregator).with_dispatch(config.dispatch))
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Validates the utterance, asks the panel and records the turn.
    ///
    /// # Errors
    ///
    /// Returns [`PanelError::Validation`](crate::PanelError::Validation) for a
    /// blank utterance, leaving the log untouched. Persona failures are not
    /// errors; they appear as error-marked replies in the returned turn.
    #[tracing::instrument(
        name = "session.submit",
        skip_all,
        fields(turn = self.log.len() + 1, dispatch = ?self.dispatch)
    )]
    pub async fn submit(&mut self, raw_utterance: &str) -> Result<&Turn> {
        let utterance = Utterance::parse(raw_utterance)?;

        let turn = self
            .aggregator
            .collect(self.dispatch, &utterance, &self.registry, &self.log)
            .await?;

        info!(
            replies = turn.replies.len(),
            failed = turn.failed_personas().len(),
            "turn recorded"
        );
        Ok(self.log.push(turn))
    }

    /// Asks the oracle to summarize the conversation so far.
    pub async fn summarize(&self) -> Result<String> {
        self.aggregator.summarize(&self.log).await
    }

    pub fn state(&self) -> SessionState {
        if self.log.is_empty() {
            SessionState::Empty
        } else {
            SessionState::HasTurns
        }
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn registry(&self) -> &PersonaRegistry {
        &self.registry
    }

    pub fn dispatch(&self) -> Dispatch {
        self.dispatch
    }

    pub fn turn_count(&self) -> usize {
        self.log.len()
    }

    /// Markdown export of every recorded turn.
    pub fn transcript_markdown(&self) -> String {
        self.log.to_markdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::FnOracle;
    use crate::persona::Persona;

    fn session() -> Session {
        let registry = PersonaRegistry::new(vec![
            Persona::new("A", "role of A"),
            Persona::new("B", "role of B"),
        ])
        .unwrap();
        let oracle = Arc::new(FnOracle::new(|prompt: String| async move {
            format!("len={}", prompt.chars().count())
        }));
        Session::new(registry, ResponseAggregator::new(oracle))
    }

    #[tokio::test]
    async fn test_submit_appends_one_turn() {
        let mut session = session();
        assert_eq!(session.state(), SessionState::Empty);

        let turn = session.submit("  hello  ").await.unwrap();
        assert_eq!(turn.user_utterance, "  hello  ");
        assert_eq!(turn.replies.len(), 2);

        assert_eq!(session.state(), SessionState::HasTurns);
        assert_eq!(session.turn_count(), 1);
    }

    #[tokio::test]
    async fn test_blank_submit_is_rejected_without_side_effects() {
        let mut session = session();
        let err = session.submit(" \n\t ").await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Validation error: メッセージが空です。");
        assert_eq!(session.state(), SessionState::Empty);
        assert!(session.log().is_empty());
    }

    #[tokio::test]
    async fn test_summarize_requires_turns() {
        let mut session = session();
        assert!(session.summarize().await.unwrap_err().is_precondition());

        session.submit("hello").await.unwrap();
        assert!(session.summarize().await.unwrap().starts_with("len="));
    }

    #[tokio::test]
    async fn test_state_stays_has_turns() {
        let mut session = session();
        session.submit("u1").await.unwrap();
        let _ = session.submit("").await;
        session.submit("u2").await.unwrap();
        assert_eq!(session.state(), SessionState::HasTurns);
        assert_eq!(session.turn_count(), 2);
    }

    #[tokio::test]
    async fn test_transcript_markdown() {
        let mut session = session();
        session.submit("hello").await.unwrap();

        let markdown = session.transcript_markdown();
        assert!(markdown.starts_with("# 相談記録\n"));
        assert!(markdown.contains("## 相談 1"));
        assert!(markdown.contains("**あなた**: hello"));
        let a = markdown.find("**A**").unwrap();
        let b = markdown.find("**B**").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_from_config() {
        let config = PanelConfig::default().with_dispatch(Dispatch::Combined);
        let oracle = Arc::new(FnOracle::new(|_prompt: String| async { String::new() }));
        let session = Session::from_config(&config, oracle).unwrap();
        assert_eq!(session.registry().len(), 4);
        assert_eq!(session.dispatch(), Dispatch::Combined);
    }
}
