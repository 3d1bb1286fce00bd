//! Google Drive file tree adapter for BucketBridge.
//!
//! This module provides:
//! - OAuth2 token refresh against the Google token endpoint
//! - Sign-in URL construction for obtaining tokens
//! - Export of Workspace-native documents to concrete formats
//! - The Drive implementation of the `FileTree` trait

pub mod auth;
pub mod client;
pub mod export;

pub use auth::{DriveAuth, GoogleOAuthConfig, TokenRefresher};
pub use client::DriveClient;
pub use export::{exported_content_type, export_target, DownloadMode};
