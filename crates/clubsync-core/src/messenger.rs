use signal_rpc::{BatchOutcome, Group, GroupPermissions, ReceiptKind, SignalClient};
use std::future::Future;

/// The messaging operations the reconciler and receipt responder need.
///
/// Implemented by [`SignalClient`]; tests substitute a recording double.
pub trait Messenger: Send + Sync {
    fn list_groups(&self) -> impl Future<Output = signal_rpc::Result<Vec<Group>>> + Send;

    /// The subset of `numbers` with a Signal account, in input order.
    fn registered_numbers(&self, numbers: &[String]) -> impl Future<Output = Vec<String>> + Send;

    fn set_group_permissions(
        &self,
        group_id: &str,
        permissions: &GroupPermissions,
    ) -> impl Future<Output = signal_rpc::Result<()>> + Send;

    fn add_numbers_to_group(
        &self,
        group_id: &str,
        numbers: &[String],
    ) -> impl Future<Output = BatchOutcome> + Send;

    fn remove_numbers_from_group(
        &self,
        group_id: &str,
        numbers: &[String],
    ) -> impl Future<Output = BatchOutcome> + Send;

    fn send_message(
        &self,
        recipient: &str,
        text: &str,
    ) -> impl Future<Output = signal_rpc::Result<()>> + Send;

    fn send_receipt(
        &self,
        recipient: &str,
        timestamp: u64,
        kind: ReceiptKind,
    ) -> impl Future<Output = signal_rpc::Result<()>> + Send;
}

impl Messenger for SignalClient {
    async fn list_groups(&self) -> signal_rpc::Result<Vec<Group>> {
        SignalClient::list_groups(self).await
    }

    async fn registered_numbers(&self, numbers: &[String]) -> Vec<String> {
        SignalClient::registered_numbers(self, numbers).await
    }

    async fn set_group_permissions(
        &self,
        group_id: &str,
        permissions: &GroupPermissions,
    ) -> signal_rpc::Result<()> {
        SignalClient::set_group_permissions(self, group_id, permissions).await
    }

    async fn add_numbers_to_group(&self, group_id: &str, numbers: &[String]) -> BatchOutcome {
        SignalClient::add_numbers_to_group(self, group_id, numbers).await
    }

    async fn remove_numbers_from_group(&self, group_id: &str, numbers: &[String]) -> BatchOutcome {
        SignalClient::remove_numbers_from_group(self, group_id, numbers).await
    }

    async fn send_message(&self, recipient: &str, text: &str) -> signal_rpc::Result<()> {
        SignalClient::send_message(self, recipient, text)
            .await
            .map(|_| ())
    }

    async fn send_receipt(
        &self,
        recipient: &str,
        timestamp: u64,
        kind: ReceiptKind,
    ) -> signal_rpc::Result<()> {
        SignalClient::send_receipt(self, recipient, timestamp, kind).await
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use signal_rpc::SignalError;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        ListGroups,
        RegisteredNumbers(Vec<String>),
        SetPermissions(String, GroupPermissions),
        Add(String, Vec<String>),
        Remove(String, Vec<String>),
        Message(String, String),
        Receipt(String, u64, ReceiptKind),
    }

    impl Call {
        pub fn is_mutation(&self) -> bool {
            !matches!(self, Call::ListGroups | Call::RegisteredNumbers(_))
        }
    }

    /// Answers from canned state and records every call. Clones share one
    /// call log.
    #[derive(Default, Clone)]
    pub struct FakeMessenger {
        pub groups: Vec<Group>,
        pub unregistered: HashSet<String>,
        pub fail_permissions: bool,
        pub fail_remove: bool,
        pub fail_receipts_to: HashSet<String>,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl FakeMessenger {
        pub fn with_groups(groups: Vec<Group>) -> Self {
            Self {
                groups,
                ..Default::default()
            }
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn mutations(&self) -> Vec<Call> {
            self.calls().into_iter().filter(Call::is_mutation).collect()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn rejected() -> SignalError {
            SignalError::Rpc {
                code: -1,
                message: "rejected".into(),
            }
        }
    }

    impl Messenger for FakeMessenger {
        async fn list_groups(&self) -> signal_rpc::Result<Vec<Group>> {
            self.record(Call::ListGroups);
            Ok(self.groups.clone())
        }

        async fn registered_numbers(&self, numbers: &[String]) -> Vec<String> {
            self.record(Call::RegisteredNumbers(numbers.to_vec()));
            numbers
                .iter()
                .filter(|n| !self.unregistered.contains(*n))
                .cloned()
                .collect()
        }

        async fn set_group_permissions(
            &self,
            group_id: &str,
            permissions: &GroupPermissions,
        ) -> signal_rpc::Result<()> {
            self.record(Call::SetPermissions(group_id.into(), permissions.clone()));
            if self.fail_permissions {
                return Err(Self::rejected());
            }
            Ok(())
        }

        async fn add_numbers_to_group(&self, group_id: &str, numbers: &[String]) -> BatchOutcome {
            self.record(Call::Add(group_id.into(), numbers.to_vec()));
            BatchOutcome::all_applied(numbers)
        }

        async fn remove_numbers_from_group(
            &self,
            group_id: &str,
            numbers: &[String],
        ) -> BatchOutcome {
            self.record(Call::Remove(group_id.into(), numbers.to_vec()));
            if self.fail_remove {
                return BatchOutcome::all_failed(numbers, "rejected");
            }
            BatchOutcome::all_applied(numbers)
        }

        async fn send_message(&self, recipient: &str, text: &str) -> signal_rpc::Result<()> {
            self.record(Call::Message(recipient.into(), text.into()));
            Ok(())
        }

        async fn send_receipt(
            &self,
            recipient: &str,
            timestamp: u64,
            kind: ReceiptKind,
        ) -> signal_rpc::Result<()> {
            self.record(Call::Receipt(recipient.into(), timestamp, kind));
            if self.fail_receipts_to.contains(recipient) {
                return Err(Self::rejected());
            }
            Ok(())
        }
    }
}
