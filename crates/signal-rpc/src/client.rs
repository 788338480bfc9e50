use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::batch::{batch_or_each, BatchOutcome};
use crate::process::SignalCliOptions;
use crate::session::RpcSession;
use crate::types::{
    Group, GroupPermissions, MemberStatus, ReceiptKind, SendResult, UpdateGroupResult,
};
use crate::Result;

/// Delays used to stay under signal-cli's server-side rate limits.
#[derive(Debug, Clone)]
pub struct Pacing {
    /// Numbers per `getUserStatus` call.
    pub status_batch_size: usize,
    pub status_batch_delay: Duration,
    /// Pause between single-number `updateGroup` calls after a batch failed.
    pub single_update_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            status_batch_size: 10,
            status_batch_delay: Duration::from_secs(3),
            single_update_delay: Duration::from_secs(1),
        }
    }
}

impl Pacing {
    /// No delays at all. For tests and fake backends.
    pub fn immediate() -> Self {
        Self {
            status_batch_delay: Duration::ZERO,
            single_update_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

// ─── SignalClient ─────────────────────────────────────────────────────────

/// Typed signal-cli operations on top of an [`RpcSession`]. Cheap to clone;
/// all clones share one session.
#[derive(Clone)]
pub struct SignalClient {
    session: Arc<RpcSession>,
    pacing: Pacing,
}

impl SignalClient {
    pub fn spawn(opts: &SignalCliOptions) -> Result<Self> {
        Ok(Self::new(RpcSession::spawn(opts)?, Pacing::default()))
    }

    pub fn new(session: RpcSession, pacing: Pacing) -> Self {
        Self {
            session: Arc::new(session),
            pacing,
        }
    }

    pub fn session(&self) -> &RpcSession {
        &self.session
    }

    pub async fn close(&self) {
        self.session.close().await;
    }

    /// Registration status for each number, in input order. Queried in small
    /// batches with a pause between them; a batch that fails yields `None`
    /// for each of its numbers.
    pub async fn get_user_status(&self, numbers: &[String]) -> Vec<Option<MemberStatus>> {
        let size = self.pacing.status_batch_size.max(1);
        let mut statuses = Vec::with_capacity(numbers.len());

        for (i, chunk) in numbers.chunks(size).enumerate() {
            if i > 0 && !self.pacing.status_batch_delay.is_zero() {
                tokio::time::sleep(self.pacing.status_batch_delay).await;
            }
            match self
                .session
                .call::<Vec<MemberStatus>>("getUserStatus", json!({ "recipient": chunk }))
                .await
            {
                Ok(reply) => statuses.extend(chunk.iter().map(|number| {
                    reply
                        .iter()
                        .find(|s| {
                            s.recipient == *number || s.number.as_deref() == Some(number.as_str())
                        })
                        .cloned()
                })),
                Err(e) => {
                    tracing::warn!(batch = i, count = chunk.len(), error = %e, "getUserStatus failed");
                    statuses.extend(chunk.iter().map(|_| None));
                }
            }
        }
        statuses
    }

    /// The subset of `numbers` that have a Signal account.
    pub async fn registered_numbers(&self, numbers: &[String]) -> Vec<String> {
        let statuses = self.get_user_status(numbers).await;
        numbers
            .iter()
            .zip(statuses)
            .filter(|(_, status)| status.as_ref().is_some_and(|s| s.is_registered))
            .map(|(number, _)| number.clone())
            .collect()
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        self.session.call("listGroups", Value::Null).await
    }

    pub async fn set_group_permissions(
        &self,
        group_id: &str,
        permissions: &GroupPermissions,
    ) -> Result<()> {
        let mut params = json!({ "groupId": group_id });
        if let (Value::Object(target), Ok(Value::Object(extra))) =
            (&mut params, serde_json::to_value(permissions))
        {
            target.extend(extra);
        }
        self.update_group(params).await
    }

    pub async fn reset_group_link(&self, group_id: &str) -> Result<()> {
        self.update_group(json!({ "groupId": group_id, "resetLink": true }))
            .await
    }

    pub async fn send_receipt(
        &self,
        recipient: &str,
        timestamp: u64,
        kind: ReceiptKind,
    ) -> Result<()> {
        self.session
            .request(
                "sendReceipt",
                json!({
                    "recipient": recipient,
                    "targetTimestamp": [timestamp],
                    "type": kind,
                }),
            )
            .await
            .map(|_| ())
    }

    /// Create a group with the registered subset of `admin_numbers` as its
    /// admins. Returns `None` without calling the backend if that subset is
    /// empty.
    pub async fn create_group(
        &self,
        name: &str,
        admin_numbers: &[String],
    ) -> Result<Option<UpdateGroupResult>> {
        let admins = self.registered_numbers(admin_numbers).await;
        if admins.is_empty() {
            tracing::warn!(group = name, "no valid numbers to create group with");
            return Ok(None);
        }
        self.session
            .call(
                "updateGroup",
                json!({ "name": name, "members": admins, "admin": admins }),
            )
            .await
            .map(Some)
    }

    /// Add members with one batched call, degrading to one call per number
    /// if the batch is rejected.
    pub async fn add_numbers_to_group(&self, group_id: &str, numbers: &[String]) -> BatchOutcome {
        if numbers.is_empty() {
            tracing::warn!(group_id, "no numbers to add");
            return BatchOutcome::default();
        }
        batch_or_each(
            numbers,
            |batch| self.update_group(json!({ "groupId": group_id, "members": batch })),
            |number| self.update_group(json!({ "groupId": group_id, "members": [number] })),
            self.pacing.single_update_delay,
        )
        .await
    }

    /// Remove members with a single batched call. A failure is logged and
    /// reported for every number; removals are not retried one by one since
    /// the backend rejects removing someone who is already gone.
    pub async fn remove_numbers_from_group(
        &self,
        group_id: &str,
        numbers: &[String],
    ) -> BatchOutcome {
        if numbers.is_empty() {
            tracing::warn!(group_id, "no numbers to remove");
            return BatchOutcome::default();
        }
        match self
            .update_group(json!({ "groupId": group_id, "removeMembers": numbers }))
            .await
        {
            Ok(()) => BatchOutcome::all_applied(numbers),
            Err(e) => {
                tracing::warn!(group_id, count = numbers.len(), error = %e, "failed to remove members");
                BatchOutcome::all_failed(numbers, &e.to_string())
            }
        }
    }

    pub async fn send_message(&self, recipient: &str, text: &str) -> Result<SendResult> {
        self.session
            .call("send", json!({ "recipient": [recipient], "message": text }))
            .await
    }

    async fn update_group(&self, params: Value) -> Result<()> {
        self.session.request("updateGroup", params).await.map(|_| ())
    }
}
