//! BucketBridge transfer core.
//!
//! This crate ties the storage adapters together:
//! - `config`: bridge configuration, failure policies and the token file
//! - `orchestrator`: sequential bulk transfers in both directions
//! - `session`: per-caller clients built from the caller's tokens

pub mod config;
pub mod orchestrator;
pub mod session;

pub use config::{
    read_token_file, write_token_file, BridgeConfig, FailurePolicy, TransferOptions,
    DEFAULT_UPLOAD_FOLDER,
};
pub use orchestrator::{
    ItemOutcome, ItemStatus, TransferOrchestrator, TransferRequest, TransferResult,
};
pub use session::Session;
