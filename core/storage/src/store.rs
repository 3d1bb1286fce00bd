//! Storage backend traits shared by the transfer orchestrator.

use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use tracing::warn;

use bucketbridge_common::{BucketRef, FileRef, ObjectBody, ObjectRef, Result};

/// Flat key-value object store (an S3 bucket namespace).
///
/// Implementations perform a single attempt per call and convert provider
/// responses into common records before returning.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List all buckets visible to the caller.
    async fn list_buckets(&self) -> Result<Vec<BucketRef>>;

    /// List every object in a bucket, following continuation tokens.
    ///
    /// Order is not significant.
    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectRef>>;

    /// Make sure a bucket exists, creating it if the existence check reports it missing.
    ///
    /// # Errors
    /// - `Forbidden` if the existence check is denied
    /// - Any other check or creation failure
    async fn ensure_bucket_exists(&self, bucket: &str) -> Result<()>;

    /// Fetch an object's bytes and content type.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody>;

    /// Store bytes under a key with the given content type.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<()>;
}

/// Hierarchical file tree (a Drive account).
#[async_trait]
pub trait FileTree: Send + Sync {
    /// Find a non-trashed folder by exact name, creating it if none exists.
    ///
    /// Returns the folder ID. Two concurrent callers may both create a
    /// folder; nothing here reconciles that.
    async fn ensure_folder_exists(&self, name: &str) -> Result<String>;

    /// List every non-trashed, non-folder file owned by the caller.
    async fn list_owned_files(&self) -> Result<Vec<FileRef>>;

    /// Download a file, exporting native documents to a concrete format.
    ///
    /// # Errors
    /// - `UnsupportedType` for a native type without an export target
    async fn download_file(&self, file: &FileRef) -> Result<Bytes>;

    /// Create a file under a folder, returning its ID.
    async fn create_file(
        &self,
        name: &str,
        parent_id: &str,
        data: Bytes,
        mime_type: &str,
    ) -> Result<String>;
}

/// Drain a cursor-paginated listing into one ordered vector.
///
/// `fetch` receives the page token for the next page (`None` for the first)
/// and returns that page's items with the following token. Terminates when
/// a page comes back without a token.
pub async fn collect_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<(Vec<T>, Option<String>)>>,
{
    let mut all = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let (items, next) = fetch(page_token.take()).await?;
        all.extend(items);

        match next {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }

    Ok(all)
}

/// Result of listing buckets for presentation.
///
/// Distinguishes "no buckets" from a populated list; listing failures are
/// folded into a generic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketListing {
    Buckets(Vec<BucketRef>),
    Message(String),
}

/// Message when the caller has no buckets.
pub const NO_BUCKETS_MESSAGE: &str = "No buckets";
/// Message when listing failed for any reason.
pub const LIST_BUCKETS_ERROR_MESSAGE: &str = "Error listing buckets";

/// List buckets, mapping emptiness and failure to a message.
pub async fn bucket_listing<S: ObjectStore + ?Sized>(store: &S) -> BucketListing {
    match store.list_buckets().await {
        Ok(buckets) if buckets.is_empty() => BucketListing::Message(NO_BUCKETS_MESSAGE.to_string()),
        Ok(buckets) => BucketListing::Buckets(buckets),
        Err(e) => {
            warn!(error = %e, "Failed to list buckets");
            BucketListing::Message(LIST_BUCKETS_ERROR_MESSAGE.to_string())
        }
    }
}
