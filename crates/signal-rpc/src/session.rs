use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};

use crate::process::{describe_exit, is_termination, SignalCliOptions, SignalProcess};
use crate::types::{ReceiveEvent, RpcIncoming, RpcRequest};
use crate::{Result, SignalError};

type PendingTx = oneshot::Sender<Result<Value>>;

/// Upper bound on remembered timed-out ids; the oldest is forgotten first.
const MAX_ABANDONED: usize = 256;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Running,
    Closed,
}

// ─── RpcSession ───────────────────────────────────────────────────────────

/// A JSON-RPC session over a line-delimited transport, normally the
/// stdin/stdout of a `signal-cli jsonRpc` child.
///
/// A background task reads stdout for the whole lifetime of the session. It
/// resolves pending calls by id and pushes `receive` notifications to every
/// subscriber without waiting on them. Callers never see the raw stream.
pub struct RpcSession {
    writer: tokio::sync::Mutex<Writer>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    timeout: Duration,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
}

struct Shared {
    state: Mutex<SessionState>,
    pending: Mutex<HashMap<u64, PendingTx>>,
    /// Ids whose caller gave up; a late reply for one of these is expected.
    abandoned: Mutex<HashSet<u64>>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<ReceiveEvent>>>,
}

impl RpcSession {
    /// Launch `signal-cli` and start reading its output.
    pub fn spawn(opts: &SignalCliOptions) -> Result<Self> {
        tracing::info!(binary = %opts.binary.display(), "starting signal-cli");
        let process = SignalProcess::spawn(opts)?;
        Ok(Self::from_process(
            process,
            opts.request_timeout,
            opts.exit_is_fatal,
        ))
    }

    pub(crate) fn from_process(
        process: SignalProcess,
        timeout: Duration,
        exit_is_fatal: bool,
    ) -> Self {
        let SignalProcess {
            child,
            stdin,
            stdout,
        } = process;
        let session = Self::from_streams(stdout, stdin, timeout);

        let (kill_tx, kill_rx) = oneshot::channel();
        *lock(&session.kill_tx) = Some(kill_tx);
        tokio::spawn(watch_exit(
            child,
            kill_rx,
            Arc::clone(&session.shared),
            exit_is_fatal,
        ));
        session
    }

    /// Run the protocol over arbitrary streams. No child process is owned, so
    /// `close` only stops the session.
    pub fn from_streams<R, W>(reader: R, writer: W, timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState::Starting),
            pending: Mutex::new(HashMap::new()),
            abandoned: Mutex::new(HashSet::new()),
            listeners: Mutex::new(Vec::new()),
        });

        tokio::spawn(read_loop(reader, Arc::clone(&shared)));
        *lock(&shared.state) = SessionState::Running;

        Self {
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            shared,
            next_id: AtomicU64::new(1),
            timeout,
            kill_tx: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.shared.state)
    }

    /// Send one request and wait for its correlated reply, bounded by the
    /// session timeout. On timeout the id is abandoned; a reply that still
    /// turns up later is dropped.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        if self.state() == SessionState::Closed {
            return Err(SignalError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };
        let mut line = serde_json::to_vec(&request).map_err(|source| SignalError::Encode {
            method: method.to_string(),
            source,
        })?;
        line.push(b'\n');

        let (tx, rx) = oneshot::channel();
        lock(&self.shared.pending).insert(id, tx);
        tracing::debug!(method, id, "signal-cli request");
        tracing::trace!(params = %request.params, "signal-cli request params");

        if let Err(e) = self.write_line(&line).await {
            lock(&self.shared.pending).remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(SignalError::Closed),
            Err(_) => {
                self.shared.abandon(id);
                Err(SignalError::Timeout {
                    method: method.to_string(),
                    after: self.timeout,
                })
            }
        }
    }

    /// [`request`](Self::request) plus decoding of the `result` payload.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let value = self.request(method, params).await?;
        serde_json::from_value(value).map_err(|source| SignalError::Decode {
            method: method.to_string(),
            source,
        })
    }

    /// Register a receiver for `receive` notifications. Events arrive in the
    /// order signal-cli emitted them.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ReceiveEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.shared.listeners).push(tx);
        rx
    }

    /// Run `handler` for every `receive` notification on its own task. The
    /// read loop never waits for it; the handler owns its error handling.
    pub fn on_receive<F, Fut>(&self, handler: F)
    where
        F: Fn(ReceiveEvent) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler(event).await;
            }
        });
    }

    /// Deregister listeners, fail outstanding calls and stop the child.
    pub async fn close(&self) {
        {
            let mut state = lock(&self.shared.state);
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
        }
        lock(&self.shared.listeners).clear();
        lock(&self.shared.abandoned).clear();
        self.shared.fail_pending(|| SignalError::Closed);
        let _ = self.writer.lock().await.shutdown().await;
        if let Some(kill_tx) = lock(&self.kill_tx).take() {
            let _ = kill_tx.send(());
        }
        tracing::debug!("signal-cli session closed");
    }

    /// Each request is one complete line written under the writer lock, so
    /// concurrent callers never interleave partial lines.
    async fn write_line(&self, line: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl Shared {
    fn dispatch_line(&self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }

        let incoming: RpcIncoming = match serde_json::from_str(trimmed) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unparseable line from signal-cli");
                return;
            }
        };

        if incoming.method.as_deref() == Some("receive") {
            let params = incoming.params.unwrap_or(Value::Null);
            match serde_json::from_value::<ReceiveEvent>(params) {
                Ok(event) => self.publish(event),
                Err(e) => tracing::warn!(error = %e, "malformed receive notification"),
            }
            return;
        }

        let Some(id) = incoming.id.as_ref().and_then(Value::as_u64) else {
            tracing::debug!(method = ?incoming.method, "ignoring uncorrelated message");
            return;
        };

        let Some(tx) = lock(&self.pending).remove(&id) else {
            if lock(&self.abandoned).remove(&id) {
                tracing::debug!(id, "dropping late response for abandoned request");
            } else {
                tracing::warn!(id, "dropping response with unknown id");
            }
            return;
        };

        let outcome = match incoming.error {
            Some(err) => Err(SignalError::Rpc {
                code: err.code,
                message: err.message,
            }),
            None => Ok(incoming.result.unwrap_or(Value::Null)),
        };
        let _ = tx.send(outcome);
    }

    fn publish(&self, event: ReceiveEvent) {
        let mut listeners = lock(&self.listeners);
        listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn abandon(&self, id: u64) {
        if lock(&self.pending).remove(&id).is_none() {
            return;
        }
        let mut abandoned = lock(&self.abandoned);
        if abandoned.len() >= MAX_ABANDONED {
            if let Some(oldest) = abandoned.iter().min().copied() {
                abandoned.remove(&oldest);
            }
        }
        abandoned.insert(id);
    }

    fn fail_pending(&self, err: impl Fn() -> SignalError) {
        let drained: Vec<PendingTx> = lock(&self.pending).drain().map(|(_, tx)| tx).collect();
        for tx in drained {
            let _ = tx.send(Err(err()));
        }
    }

    fn is_closed(&self) -> bool {
        *lock(&self.state) == SessionState::Closed
    }
}

async fn read_loop<R: AsyncRead + Unpin>(reader: R, shared: Arc<Shared>) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => shared.dispatch_line(&line),
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read from signal-cli");
                break;
            }
        }
    }
    if !shared.is_closed() {
        shared.fail_pending(|| SignalError::ProcessExit("output stream closed".into()));
    }
}

async fn watch_exit(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    shared: Arc<Shared>,
    exit_is_fatal: bool,
) {
    tokio::select! {
        status = child.wait() => {
            if shared.is_closed() {
                return;
            }
            let (reason, fatal) = match status {
                Ok(s) => (describe_exit(&s), exit_is_fatal && !is_termination(&s)),
                Err(e) => (e.to_string(), exit_is_fatal),
            };
            *lock(&shared.state) = SessionState::Closed;
            lock(&shared.listeners).clear();
            shared.fail_pending(|| SignalError::ProcessExit(reason.clone()));
            tracing::error!(%reason, "signal-cli exited unexpectedly");
            if fatal {
                std::process::exit(1);
            }
        }
        _ = kill_rx => {
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "failed to stop signal-cli");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ─── Tests ────────────────────────────────────────────────────────────────
