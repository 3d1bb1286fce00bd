//! Storage adapters for BucketBridge.
//!
//! This crate provides the two storage backends a transfer moves files
//! between, plus the credential plumbing each one needs:
//! - `s3`: object store adapter bound to federated (Cognito) credentials
//! - `gdrive`: Drive file tree adapter and Google token refresh
//! - `memory`: in-process backends implementing the same traits
//!
//! # Design Principles
//! - Typed boundary: provider responses are converted to common records immediately
//! - Per-call clients: credentialed clients are built from caller tokens, never shared
//! - Single attempt: no adapter retries on its own

pub mod gdrive;
pub mod memory;
pub mod s3;
pub mod store;

pub use gdrive::{DriveAuth, DriveClient, GoogleOAuthConfig, TokenRefresher};
pub use memory::{MemoryFileTree, MemoryObjectStore};
pub use s3::{FederationClient, FederationConfig, S3ObjectStore, S3Settings};
pub use store::{
    bucket_listing, collect_pages, BucketListing, FileTree, ObjectStore, LIST_BUCKETS_ERROR_MESSAGE,
    NO_BUCKETS_MESSAGE,
};
