//! Object store backed by S3.
//!
//! Requests are signed with temporary credentials obtained by exchanging a
//! Google identity token through a Cognito identity pool.

pub mod client;
pub mod federation;

pub use client::{S3ObjectStore, S3Settings};
pub use federation::{FederationClient, FederationConfig, GOOGLE_LOGIN_PROVIDER};
