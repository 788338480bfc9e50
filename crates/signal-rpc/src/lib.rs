//! `signal-rpc`: async driver for `signal-cli` running in `jsonRpc` mode.
//!
//! signal-cli exposes everything through JSON-RPC 2.0 messages, one per line,
//! on its stdin/stdout. This crate owns that subprocess and presents a typed
//! request/response API plus a subscription API for inbound messages.
//!
//! # Architecture
//!
//! ```text
//! SignalCliOptions
//!     │
//!     ▼
//! SignalProcess   ← spawns `signal-cli --config … -a … jsonRpc`
//!     │              stderr forwarded to tracing
//!     ▼
//! RpcSession      ← id → oneshot correlation table, per-call timeout,
//!     │              background read loop, `receive` fan-out
//!     ▼
//! SignalClient    ← listGroups / updateGroup / getUserStatus / send …
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use signal_rpc::{SignalCliOptions, SignalClient};
//!
//! let client = SignalClient::spawn(&SignalCliOptions::new("signal-cli", "+447700900000"))?;
//! for group in client.list_groups().await? {
//!     println!("{} ({} admins)", group.name, group.admins.len());
//! }
//! client.close().await;
//! ```

pub mod batch;
pub mod client;
pub mod error;
pub mod process;
pub mod session;
pub mod types;


pub use batch::{batch_or_each, BatchOutcome};
pub use client::{Pacing, SignalClient};
pub use error::SignalError;
pub use process::SignalCliOptions;
pub use session::{RpcSession, SessionState};
pub use types::{
    DataMessage, Envelope, Group, GroupInfo, GroupMember, GroupPermission, GroupPermissions,
    LinkState, MemberStatus, PermissionPolicy, ReceiptKind, ReceiveEvent, SendResult,
    UpdateGroupResult,
};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, SignalError>;
