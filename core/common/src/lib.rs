//! Common types shared across the BucketBridge crates.
//!
//! This crate holds the error taxonomy and the strongly-typed records that
//! both storage adapters and the transfer orchestrator exchange, so that raw
//! provider responses never travel past the adapter boundary.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    BucketRef, FileRef, ObjectBody, ObjectRef, TokenSet, TransferDirection, FOLDER_MIME_TYPE,
    NATIVE_MIME_PREFIX,
};
