use crate::cmd::{block_on, connect};
use clubsync_core::{config::Config, receipts::ReceiptResponder};

pub fn run(config: &Config) -> anyhow::Result<()> {
    block_on(async {
        let client = connect(config)?;
        let mut events = client.session().subscribe();
        let responder = ReceiptResponder::new(client.clone(), config)?;
        println!("Listening for messages; press Ctrl-C to stop.");

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        if config.debug {
                            if let Some(text) = event
                                .envelope
                                .data_message
                                .as_ref()
                                .and_then(|d| d.message.as_deref())
                            {
                                tracing::debug!(from = ?event.envelope.sender(), text, "message received");
                            }
                        }
                        responder.handle(&event).await;
                    }
                    None => {
                        tracing::warn!("signal-cli stopped delivering messages");
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupted");
                    break;
                }
            }
        }

        client.close().await;
        Ok(())
    })
}
