use crate::error::{Result, SyncError};
use crate::phone::redact_phone_number;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DIRECTORY_URL: &str = "https://www.myclubhouse.co.uk/brightonexplorers/api/v1";
pub const DEFAULT_SIGNAL_DATA_DIR: &str = "./.signal-cli-data";
pub const DEFAULT_GROUPS_FILE: &str = "groups.yaml";
const DEFAULT_RPC_TIMEOUT_SECS: u64 = 5;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Process-wide settings, read from the environment once at startup and
/// passed down explicitly.
///
/// Credentials are optional here so that commands which do not need them
/// (e.g. `events` never talks to Signal) can still run; the accessors
/// return [`SyncError::MissingConfig`] when a required value is absent.
#[derive(Debug, Clone)]
pub struct Config {
    signal_user: Option<String>,
    signal_cli: Option<PathBuf>,
    pub signal_data_dir: PathBuf,
    pub directory_url: String,
    directory_token: Option<String>,
    pub groups_path: PathBuf,
    pub rpc_timeout: Duration,
    /// Log personal data (phone numbers, message bodies).
    pub debug: bool,
    /// Compute and log changes without mutating anything.
    pub dry_run: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let rpc_timeout = match get("CLUBSYNC_RPC_TIMEOUT_SECS") {
            Some(v) => v.trim().parse::<u64>().map_err(|_| {
                SyncError::InvalidConfig(format!(
                    "CLUBSYNC_RPC_TIMEOUT_SECS must be a whole number of seconds, got '{v}'"
                ))
            })?,
            None => DEFAULT_RPC_TIMEOUT_SECS,
        };

        Ok(Self {
            signal_user: get("SIGNAL_USER").map(|v| v.trim().to_string()),
            signal_cli: get("SIGNAL_CLI").map(|v| PathBuf::from(v.trim())),
            signal_data_dir: get("SIGNAL_CLI_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SIGNAL_DATA_DIR)),
            directory_url: get("MYCLUBHOUSE_BASE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_DIRECTORY_URL.to_string()),
            directory_token: get("MYCLUBHOUSE_ACCESS_TOKEN"),
            groups_path: get("CLUBSYNC_GROUPS")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_GROUPS_FILE)),
            rpc_timeout: Duration::from_secs(rpc_timeout),
            debug: get("DEBUG").as_deref() == Some("true"),
            dry_run: get("DRY_RUN").as_deref() == Some("true"),
        })
    }

    pub fn signal_user(&self) -> Result<&str> {
        self.signal_user
            .as_deref()
            .ok_or(SyncError::MissingConfig("SIGNAL_USER"))
    }

    pub fn directory_token(&self) -> Result<&str> {
        self.directory_token
            .as_deref()
            .ok_or(SyncError::MissingConfig("MYCLUBHOUSE_ACCESS_TOKEN"))
    }

    /// `SIGNAL_CLI` if set, otherwise `signal-cli` from `PATH`.
    pub fn signal_cli(&self) -> Result<PathBuf> {
        match &self.signal_cli {
            Some(path) => Ok(path.clone()),
            None => which::which("signal-cli").map_err(|_| SyncError::SignalCliNotFound),
        }
    }

    /// Options for launching signal-cli with this configuration.
    pub fn signal_cli_options(&self) -> Result<signal_rpc::SignalCliOptions> {
        let account = self.signal_user()?;
        let mut opts = signal_rpc::SignalCliOptions::new(self.signal_cli()?, account);
        opts.data_dir = self.signal_data_dir.clone();
        opts.request_timeout = self.rpc_timeout;
        Ok(opts)
    }

    /// A phone number as it may appear in logs.
    pub fn show_number(&self, number: &str) -> String {
        if self.debug {
            number.to_string()
        } else {
            redact_phone_number(number)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
