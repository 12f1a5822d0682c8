//! Failures inside an oracle call.
//!
//! These never leave the oracle: [`Oracle::answer`](super::Oracle::answer)
//! turns them into error-marked strings. Messages are Japanese so the marked
//! string reads like the rest of the output.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The request did not finish within the configured timeout.
    #[error("応答がタイムアウトしました")]
    Timeout,

    /// The request could not be sent or the body could not be read.
    #[error("通信に失敗しました ({0})")]
    Request(String),

    /// The API answered with a non-success status.
    #[error("APIがエラーを返しました (HTTP {status}: {message})")]
    Status { status: u16, message: String },

    /// The response body did not match the declared schema.
    #[error("応答の形式が不正です")]
    MalformedResponse,

    /// The response parsed but carried no text.
    #[error("応答にテキストが含まれていません")]
    EmptyResponse,
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(err.to_string())
        }
    }
}
