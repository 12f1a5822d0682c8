//! 'persona-panel' - Ask one question to a panel of expert personas.
//!
//! A user utterance is sent to every persona on the panel (a psychiatrist, a
//! counselor, a mentalist and an internist by default). Each persona answers
//! through an [`Oracle`], and the answers are merged into a single [`Turn`] that
//! is appended to the session's [`ConversationLog`]. Later turns embed the whole
//! log so the panel keeps the conversation's context.
//!
//! Oracle failures never abort a turn: a persona whose call fails gets an
//! error-marked reply (`"エラー: ..."`) and the rest of the panel is unaffected.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use persona_panel::{GeminiOracle, PanelConfig, Session};
//! use std::sync::Arc;
//!
//! # async fn example() -> persona_panel::Result<()> {
//! let config = PanelConfig::from_env()?;
//! let oracle = Arc::new(config.gemini_oracle()?);
//! let mut session = Session::from_config(&config, oracle)?;
//!
//! let turn = session.submit("最近よく眠れません").await?;
//! for reply in &turn.replies {
//!     println!("{}: {}", reply.persona, reply.text());
//! }
//!
//! println!("{}", session.summarize().await?);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod config;
pub mod conversation;
pub mod error;
pub mod observability;
pub mod oracle;
pub mod persona;
pub mod prompt;
pub mod session;

pub use aggregator::{ConcurrencyMode, Dispatch, ResponseAggregator};
pub use config::PanelConfig;
pub use conversation::{ConversationLog, PersonaReply, ResponseOutcome, Turn, Utterance};
pub use error::{PanelError, Result};
pub use oracle::{FnOracle, GeminiOracle, Oracle, OracleError};
pub use persona::{Expert, Persona, PersonaRegistry};
pub use prompt::PromptBuilder;
pub use session::{Session, SessionState};
