pub mod config;
pub mod directory;
pub mod error;
pub mod groups;
pub mod member;
pub mod messenger;
pub mod phone;
pub mod receipts;
pub mod reconcile;

pub use error::{Result, SyncError};
