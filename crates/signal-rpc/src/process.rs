use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::{Result, SignalError};

/// How to launch `signal-cli` in JSON-RPC mode.
#[derive(Debug, Clone)]
pub struct SignalCliOptions {
    /// Path to the `signal-cli` executable.
    pub binary: PathBuf,
    /// signal-cli's own credential and session store.
    pub data_dir: PathBuf,
    /// The service account number (`-a`).
    pub account: String,
    /// Bound on every individual request.
    pub request_timeout: Duration,
    /// Terminate the whole program if the subprocess dies while the session
    /// is still open.
    pub exit_is_fatal: bool,
}

impl SignalCliOptions {
    pub fn new(binary: impl Into<PathBuf>, account: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            data_dir: PathBuf::from("./.signal-cli-data"),
            account: account.into(),
            request_timeout: Duration::from_secs(5),
            exit_is_fatal: true,
        }
    }
}

// ─── SignalProcess ────────────────────────────────────────────────────────

/// A spawned `signal-cli … jsonRpc` child with its pipes split out.
///
/// Stderr is drained by a background task and forwarded to the log, so the
/// pipe never fills and blocks the child.
pub(crate) struct SignalProcess {
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
}

impl SignalProcess {
    pub(crate) fn spawn(opts: &SignalCliOptions) -> Result<Self> {
        Self::from_command(build_command(opts))
    }

    pub(crate) fn from_command(mut cmd: Command) -> Result<Self> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(SignalError::Io)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SignalError::Process("stdout not captured".into()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SignalError::Process("stdin not captured".into()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    tracing::warn!(target: "signal_cli", "{line}");
                }
            });
        }

        Ok(Self {
            child,
            stdin,
            stdout,
        })
    }
}

/// Human-readable exit reason.
pub(crate) fn describe_exit(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {code}");
    }
    match exit_signal(status) {
        Some(sig) => format!("signal {sig}"),
        None => "unknown exit status".to_string(),
    }
}

/// `true` when the child was stopped by SIGINT or SIGTERM, i.e. someone asked
/// it to shut down.
pub(crate) fn is_termination(status: &ExitStatus) -> bool {
    matches!(exit_signal(status), Some(2) | Some(15))
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

// ─── Command builder ──────────────────────────────────────────────────────

fn build_command(opts: &SignalCliOptions) -> Command {
    let mut cmd = Command::new(&opts.binary);
    cmd.args(command_args(opts));
    cmd
}

fn command_args(opts: &SignalCliOptions) -> Vec<String> {
    vec![
        "--config".into(),
        opts.data_dir.to_string_lossy().into_owned(),
        "-a".into(),
        opts.account.clone(),
        "--trust-new-identities".into(),
        "always".into(),
        "jsonRpc".into(),
        "--receive-mode".into(),
        "on-start".into(),
    ]
}
