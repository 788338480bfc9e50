use signal_rpc::SignalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("membership directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("unexpected membership directory response: {0}")]
    DirectorySchema(String),

    #[error("group '{name}' not found (id {group_id})")]
    GroupNotFound { name: String, group_id: String },

    #[error("missing configuration: {0} is not set")]
    MissingConfig(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("signal-cli not found: set SIGNAL_CLI or add signal-cli to PATH")]
    SignalCliNotFound,

    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
