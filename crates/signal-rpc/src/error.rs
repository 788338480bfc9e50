use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode request for '{method}': {source}")]
    Encode {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode '{method}' result: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    /// The backend answered with a JSON-RPC error object.
    #[error("signal-cli error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("'{method}' timed out after {}s", after.as_secs_f64())]
    Timeout { method: String, after: Duration },

    #[error("signal-cli exited: {0}")]
    ProcessExit(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("session is closed")]
    Closed,
}
