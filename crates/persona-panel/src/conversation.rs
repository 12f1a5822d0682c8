//! Conversation data model: utterances, turns and the append-only log.

use crate::error::{PanelError, Result};
use crate::oracle::is_error_response;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Speaker label used for user lines in the rendered log.
pub const USER_SPEAKER: &str = "user";

/// A validated, non-blank user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Utterance(String);

impl Utterance {
    /// Rejects input that is empty or whitespace only.
    ///
    /// Accepted text is kept exactly as given, surrounding whitespace included.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
        let raw = raw.as_ref();
        if raw.trim().is_empty() {
            return Err(PanelError::Validation("メッセージが空です。".to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Utterance {
    type Error = PanelError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<Utterance> for String {
    fn from(value: Utterance) -> Self {
        value.0
    }
}

impl AsRef<str> for Utterance {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Utterance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of one persona invocation.
///
/// Both variants carry the exact display text; `Failed` text starts with the
/// error marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum ResponseOutcome {
    Ok(String),
    Failed(String),
}

impl ResponseOutcome {
    /// Classifies raw oracle output by its error marker.
    pub fn from_response(text: String) -> Self {
        if is_error_response(&text) {
            Self::Failed(text)
        } else {
            Self::Ok(text)
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Ok(text) | Self::Failed(text) => text,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// One persona's entry in a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaReply {
    pub persona: String,
    pub outcome: ResponseOutcome,
}

impl PersonaReply {
    pub fn new(persona: impl Into<String>, response: String) -> Self {
        Self {
            persona: persona.into(),
            outcome: ResponseOutcome::from_response(response),
        }
    }

    pub fn text(&self) -> &str {
        self.outcome.text()
    }
}

/// One exchange: a user utterance and exactly one reply per registered persona.
///
/// Replies are kept in registry order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub user_utterance: String,
    pub replies: Vec<PersonaReply>,
}

impl Turn {
    pub fn new(user_utterance: impl Into<String>, replies: Vec<PersonaReply>) -> Self {
        Self {
            user_utterance: user_utterance.into(),
            replies,
        }
    }

    /// The reply text for a persona, if present.
    pub fn response(&self, persona: &str) -> Option<&str> {
        self.replies
            .iter()
            .find(|reply| reply.persona == persona)
            .map(PersonaReply::text)
    }

    /// Keyed view of the replies.
    pub fn responses(&self) -> HashMap<String, String> {
        self.replies
            .iter()
            .map(|reply| (reply.persona.clone(), reply.text().to_string()))
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        self.replies.iter().any(|reply| reply.outcome.is_failed())
    }

    pub fn failed_personas(&self) -> Vec<&str> {
        self.replies
            .iter()
            .filter(|reply| reply.outcome.is_failed())
            .map(|reply| reply.persona.as_str())
            .collect()
    }

    fn render_into(&self, out: &mut String) {
        out.push_str(USER_SPEAKER);
        out.push_str(": ");
        out.push_str(&self.user_utterance);
        for reply in &self.replies {
            out.push('\n');
            out.push_str(&reply.persona);
            out.push_str(": ");
            out.push_str(reply.text());
        }
    }
}

/// Ordered, append-only history of turns for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationLog {
    turns: Vec<Turn>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a completed turn and returns it as stored.
    pub fn push(&mut self, turn: Turn) -> &Turn {
        let idx = self.turns.len();
        self.turns.push(turn);
        &self.turns[idx]
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Renders the log as `speaker: text` lines, turns separated by a blank line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (idx, turn) in self.turns.iter().enumerate() {
            if idx > 0 {
                out.push_str("\n\n");
            }
            turn.render_into(&mut out);
        }
        out
    }

    /// Markdown transcript for export.
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("# 相談記録\n");
        for (idx, turn) in self.turns.iter().enumerate() {
            out.push_str(&format!("\n## 相談 {}\n\n", idx + 1));
            out.push_str(&format!("**あなた**: {}\n", turn.user_utterance));
            for reply in &turn.replies {
                out.push_str(&format!("\n**{}**\n\n{}\n", reply.persona, reply.text()));
            }
        }
        out
    }
}
