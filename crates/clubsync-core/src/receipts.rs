use crate::config::Config;
use crate::error::Result;
use crate::messenger::Messenger;
use crate::phone::normalize_phone_number;
use futures::future::join_all;
use signal_rpc::{ReceiptKind, ReceiveEvent, SignalClient};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Answers inbound messages with read receipts.
///
/// A direct message is acknowledged to its sender. A group message is
/// acknowledged to every current member of the group except the account
/// itself, all receipts in flight at once. Failures are logged and dropped.
pub struct ReceiptResponder<M> {
    messenger: M,
    config: Config,
    account: String,
}

impl ReceiptResponder<SignalClient> {
    /// Acknowledge inbound messages in the background until the client's
    /// session is closed.
    pub fn attach(client: &SignalClient, config: &Config) -> Result<()> {
        let responder = Arc::new(Self::new(client.clone(), config)?);
        client.session().on_receive(move |event| {
            let responder = Arc::clone(&responder);
            async move {
                responder.handle(&event).await;
            }
        });
        Ok(())
    }
}

impl<M: Messenger> ReceiptResponder<M> {
    pub fn new(messenger: M, config: &Config) -> Result<Self> {
        Ok(Self {
            account: normalize_phone_number(config.signal_user()?),
            messenger,
            config: config.clone(),
        })
    }

    /// Returns the number of receipts delivered.
    pub async fn handle(&self, event: &ReceiveEvent) -> usize {
        let envelope = &event.envelope;
        let Some(data) = &envelope.data_message else {
            return 0;
        };
        let timestamp = if data.timestamp != 0 {
            data.timestamp
        } else {
            envelope.timestamp
        };

        let recipients = match &data.group_info {
            None => match envelope.sender() {
                Some(sender) if normalize_phone_number(sender) != self.account => {
                    vec![sender.to_string()]
                }
                _ => return 0,
            },
            Some(info) => self.group_recipients(&info.group_id).await,
        };
        if recipients.is_empty() {
            return 0;
        }

        if self.config.dry_run {
            tracing::info!(count = recipients.len(), timestamp, "dry run: would send read receipts");
            return 0;
        }

        let results = join_all(
            recipients
                .iter()
                .map(|r| self.messenger.send_receipt(r, timestamp, ReceiptKind::Read)),
        )
        .await;

        let mut delivered = 0;
        for (recipient, result) in recipients.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(
                    recipient = %self.config.show_number(recipient),
                    error = %e,
                    "failed to send read receipt"
                ),
            }
        }
        tracing::debug!(delivered, total = recipients.len(), timestamp, "read receipts sent");
        delivered
    }

    async fn group_recipients(&self, group_id: &str) -> Vec<String> {
        let groups = match self.messenger.list_groups().await {
            Ok(groups) => groups,
            Err(e) => {
                tracing::warn!(error = %e, "cannot list groups for read receipts");
                return Vec::new();
            }
        };
        let Some(group) = groups.iter().find(|g| g.id == group_id) else {
            tracing::warn!(group_id, "message from a group the account is not in");
            return Vec::new();
        };

        group
            .admins
            .iter()
            .chain(&group.members)
            .filter_map(|m| m.number.as_deref())
            .map(normalize_phone_number)
            .filter(|n| !n.is_empty() && *n != self.account)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
