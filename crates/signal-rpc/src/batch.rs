use std::future::Future;
use std::time::Duration;

use crate::Result;

/// What happened to each item of a batched mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub applied: Vec<String>,
    /// Items that could not be applied, with the reason.
    pub failed: Vec<(String, String)>,
}

impl BatchOutcome {
    pub fn all_applied(items: &[String]) -> Self {
        Self {
            applied: items.to_vec(),
            failed: Vec::new(),
        }
    }

    pub fn all_failed(items: &[String], reason: &str) -> Self {
        Self {
            applied: Vec::new(),
            failed: items
                .iter()
                .map(|i| (i.clone(), reason.to_string()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.failed.is_empty()
    }
}

/// Try `batch` with every item at once; if it fails, fall back to `each` one
/// item at a time, sleeping `pause` between calls. Individual failures are
/// recorded and do not stop the remaining items.
pub async fn batch_or_each<B, BF, E, EF>(
    items: &[String],
    batch: B,
    mut each: E,
    pause: Duration,
) -> BatchOutcome
where
    B: FnOnce(Vec<String>) -> BF,
    BF: Future<Output = Result<()>>,
    E: FnMut(String) -> EF,
    EF: Future<Output = Result<()>>,
{
    if items.is_empty() {
        return BatchOutcome::default();
    }

    let err = match batch(items.to_vec()).await {
        Ok(()) => return BatchOutcome::all_applied(items),
        Err(e) => e,
    };
    tracing::warn!(
        count = items.len(),
        error = %err,
        "batch call failed, retrying one at a time"
    );

    let mut outcome = BatchOutcome::default();
    for (i, item) in items.iter().enumerate() {
        if i > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        match each(item.clone()).await {
            Ok(()) => outcome.applied.push(item.clone()),
            Err(e) => {
                tracing::warn!(index = i, error = %e, "single call failed, continuing");
                outcome.failed.push((item.clone(), e.to_string()));
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SignalError;
    use std::sync::Mutex;

    fn items(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    fn rpc_err(msg: &str) -> SignalError {
        SignalError::Rpc {
            code: -1,
            message: msg.into(),
        }
    }

    #[tokio::test]
    async fn successful_batch_skips_fallback() {
        let singles = Mutex::new(0);
        let outcome = batch_or_each(
            &items(&["a", "b"]),
            |_| async { Ok::<(), SignalError>(()) },
            |_| {
                *singles.lock().unwrap() += 1;
                async { Ok::<(), SignalError>(()) }
            },
            Duration::ZERO,
        )
        .await;
        assert_eq!(outcome, BatchOutcome::all_applied(&items(&["a", "b"])));
        assert_eq!(*singles.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_batch_tries_every_item() {
        let attempted = Mutex::new(Vec::new());
        let outcome = batch_or_each(
            &items(&["a", "b", "c"]),
            |_| async { Err::<(), _>(rpc_err("batch rejected")) },
            |item| {
                attempted.lock().unwrap().push(item.clone());
                async move {
                    if item == "b" {
                        Err(rpc_err("not allowed"))
                    } else {
                        Ok(())
                    }
                }
            },
            Duration::ZERO,
        )
        .await;

        assert_eq!(*attempted.lock().unwrap(), items(&["a", "b", "c"]));
        assert_eq!(outcome.applied, items(&["a", "c"]));
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, "b");
        assert!(outcome.failed[0].1.contains("not allowed"));
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let calls = Mutex::new(0);
        let outcome = batch_or_each(
            &[],
            |_| {
                *calls.lock().unwrap() += 1;
                async { Ok::<(), SignalError>(()) }
            },
            |_| {
                *calls.lock().unwrap() += 1;
                async { Ok::<(), SignalError>(()) }
            },
            Duration::ZERO,
        )
        .await;
        assert!(outcome.is_empty());
        assert_eq!(*calls.lock().unwrap(), 0);
    }
}
