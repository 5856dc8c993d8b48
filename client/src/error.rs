use std::time::Duration;

use exosphere_types::RunId;

/// Errors surfaced by the client runtime.
///
/// Cancellation of the stream reader is deliberately absent: a cancelled
/// stream resolves normally. Only the awaiter reports cancellation as an
/// error, because it has no terminal snapshot to resolve with.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The awaiter exceeded its deadline without observing a terminal status.
    #[error("timed out waiting for run {run_id} to complete after {waited:?}")]
    Timeout { run_id: RunId, waited: Duration },

    /// The service answered with a non-success status.
    #[error("HTTP {status} {status_text}: {body}")]
    Api {
        status: u16,
        status_text: String,
        body: String,
    },

    /// Connection-level failure, including an abrupt drop mid-stream.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The stream broke protocol after a successful open.
    #[error("event stream fault: {0}")]
    Protocol(String),

    /// A success response carried a body that does not decode.
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// A cancellation token fired before the operation could finish.
    ///
    /// The stream reader intercepts this internally and resolves normally;
    /// callers only observe it from [`await_run`](crate::await_run).
    #[error("operation on run {run_id} was cancelled")]
    Cancelled { run_id: RunId },

    /// The client was constructed with unusable settings.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    pub(crate) fn api(status: reqwest::StatusCode, body: String) -> Self {
        Self::Api {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_owned(),
            body,
        }
    }
}
