pub mod events;
pub mod groups;
pub mod listen;
pub mod message;
pub mod sync;

use anyhow::Context;
use clubsync_core::config::Config;
use signal_rpc::SignalClient;
use std::future::Future;

/// Run one command's async body on a fresh runtime.
pub(crate) fn block_on<T>(fut: impl Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
    let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    rt.block_on(fut)
}

/// Start signal-cli for the configured account. Must be called inside the
/// runtime.
pub(crate) fn connect(config: &Config) -> anyhow::Result<SignalClient> {
    let opts = config.signal_cli_options()?;
    tracing::info!(
        account = %config.show_number(&opts.account),
        binary = %opts.binary.display(),
        "starting signal-cli"
    );
    SignalClient::spawn(&opts).context("failed to start signal-cli")
}
