use crate::cmd::{block_on, connect};
use crate::output::print_json;
use anyhow::{bail, Context};
use clubsync_core::{config::Config, phone::normalize_phone_number};

pub fn run(config: &Config, number: &str, text: &str, json: bool) -> anyhow::Result<()> {
    let recipient = normalize_phone_number(number);
    if recipient.is_empty() {
        bail!("'{number}' is not a usable phone number");
    }
    let shown = config.show_number(&recipient);

    if config.dry_run {
        tracing::info!(recipient = %shown, "dry run: message not sent");
        return Ok(());
    }

    let sent = block_on(async {
        let client = connect(config)?;
        let result = client.send_message(&recipient, text).await;
        client.close().await;
        result.context("failed to send message")
    })?;

    if json {
        #[derive(serde::Serialize)]
        struct Sent<'a> {
            recipient: &'a str,
            timestamp: Option<u64>,
        }
        return print_json(&Sent {
            recipient: &recipient,
            timestamp: sent.timestamp,
        });
    }
    println!("Sent to {shown}");
    Ok(())
}
