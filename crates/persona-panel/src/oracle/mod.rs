//! The external text-generation capability the panel asks.
//!
//! An [`Oracle`] takes a finished prompt and returns text. It never fails from
//! the caller's point of view: any internal failure (timeout, HTTP status,
//! malformed payload) comes back as a short string starting with
//! [`ERROR_MARKER`], written in the same language as normal output.
//!
//! # Implementing an oracle
//!
//! ```rust,ignore
//! use persona_panel::oracle::{Oracle, error_message};
//!
//! struct CannedOracle;
//!
//! #[async_trait::async_trait]
//! impl Oracle for CannedOracle {
//!     async fn answer(&self, prompt: &str) -> String {
//!         if prompt.is_empty() {
//!             return error_message("empty prompt");
//!         }
//!         "よく眠れるといいですね。".to_string()
//!     }
//! }
//! ```

pub mod error;
pub mod gemini_api;

pub use error::OracleError;
pub use gemini_api::GeminiOracle;

use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;

/// Prefix carried by every error-marked oracle response.
pub const ERROR_MARKER: &str = "エラー";

/// Formats a user-visible failure string.
pub fn error_message(reason: impl Display) -> String {
    format!("{ERROR_MARKER}: {reason}")
}

/// Returns true if the text is an error-marked response.
pub fn is_error_response(text: &str) -> bool {
    text.starts_with(ERROR_MARKER)
}

/// Collaborator that turns a prompt into response text.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Returns the response for `prompt`, or an error-marked string.
    async fn answer(&self, prompt: &str) -> String;

    /// Returns the name of this oracle.
    ///
    /// By default, this returns the type name.
    fn name(&self) -> String {
        std::any::type_name::<Self>()
            .split("::")
            .last()
            .unwrap_or("UnknownOracle")
            .to_string()
    }
}

/// Adapts an async closure into an [`Oracle`].
///
/// ```rust,ignore
/// let oracle = FnOracle::new(|prompt: String| async move { format!("echo: {prompt}") });
/// ```
pub struct FnOracle<F> {
    func: F,
}

impl<F> FnOracle<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> Oracle for FnOracle<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = String> + Send,
{
    async fn answer(&self, prompt: &str) -> String {
        (self.func)(prompt.to_string()).await
    }

    fn name(&self) -> String {
        "FnOracle".to_string()
    }
}
