//! Records exchanged between the storage adapters and the orchestrator.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// MIME type marking a Drive item as a folder.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Prefix shared by all Workspace-native document types.
pub const NATIVE_MIME_PREFIX: &str = "application/vnd.google-apps.";

/// OAuth token record issued by the identity provider.
///
/// Owned by the session layer and handed to the core by value. Secret
/// material is wiped when the record is dropped.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct TokenSet {
    /// OpenID identity token, exchanged for federated storage credentials.
    pub id_token: String,
    /// Access token for the Drive API.
    pub access_token: String,
    /// Refresh token, absent when the provider did not grant offline access.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token expiry, in milliseconds since the Unix epoch.
    #[zeroize(skip)]
    pub access_token_expires_at_millis: i64,
}

impl TokenSet {
    /// Create a new token record.
    pub fn new(
        id_token: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        access_token_expires_at_millis: i64,
    ) -> Self {
        Self {
            id_token: id_token.into(),
            access_token: access_token.into(),
            refresh_token,
            access_token_expires_at_millis,
        }
    }

    /// Whether the access token has expired at `now_millis`.
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        now_millis > self.access_token_expires_at_millis
    }

    /// Whether the access token has expired now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }

    /// Expiry as a timestamp.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.access_token_expires_at_millis)
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("id_token", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "access_token_expires_at_millis",
                &self.access_token_expires_at_millis,
            )
            .finish()
    }
}

/// A bucket visible to the federated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRef {
    pub name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl BucketRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: None,
        }
    }
}

/// An object inside a bucket. Keys are unique within their bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub key: String,
    pub size: u64,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

/// Bytes of a fetched object together with the type the store reported.
#[derive(Debug, Clone)]
pub struct ObjectBody {
    pub bytes: Bytes,
    pub content_type: String,
}

impl ObjectBody {
    /// Content type used when the store does not report one.
    pub const DEFAULT_CONTENT_TYPE: &'static str = "application/octet-stream";

    pub fn new(bytes: impl Into<Bytes>, content_type: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| Self::DEFAULT_CONTENT_TYPE.to_string()),
        }
    }
}

/// A file or folder in the Drive tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// Parent folder IDs.
    #[serde(default)]
    pub parents: Vec<String>,
}

impl FileRef {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mime_type: mime_type.into(),
            parents: Vec::new(),
        }
    }

    /// Check if this is a folder.
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    /// Check if this is a Workspace-native document that must be exported.
    pub fn is_native(&self) -> bool {
        self.mime_type.starts_with(NATIVE_MIME_PREFIX)
    }

    /// Whether the record carries everything a transfer needs.
    pub fn is_complete(&self) -> bool {
        !self.id.is_empty() && !self.name.is_empty() && !self.mime_type.is_empty()
    }
}

/// Direction of a transfer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    /// Bucket to Drive.
    StoreToTree,
    /// Drive to bucket.
    TreeToStore,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferDirection::StoreToTree => write!(f, "s3->drive"),
            TransferDirection::TreeToStore => write!(f, "drive->s3"),
        }
    }
}
