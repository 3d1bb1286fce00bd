//! In-memory storage backends for testing.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use bucketbridge_common::{
    BucketRef, Error, FileRef, ObjectBody, ObjectRef, Result, FOLDER_MIME_TYPE,
};

use crate::gdrive::export::export_target;
use crate::store::{FileTree, ObjectStore};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Buckets {
    buckets: BTreeMap<String, (DateTime<Utc>, BTreeMap<String, StoredObject>)>,
    denied: HashSet<String>,
}

/// In-memory object store.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    inner: RwLock<Buckets>,
}

impl MemoryObjectStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call against `bucket` fail with `Forbidden`.
    pub async fn deny_bucket(&self, bucket: &str) {
        self.inner.write().await.denied.insert(bucket.to_string());
    }

    /// Read back an object's bytes and content type.
    pub async fn object(&self, bucket: &str, key: &str) -> Option<(Bytes, String)> {
        let inner = self.inner.read().await;
        inner
            .buckets
            .get(bucket)
            .and_then(|(_, objects)| objects.get(key))
            .map(|o| (o.data.clone(), o.content_type.clone()))
    }

    fn check_access(inner: &Buckets, bucket: &str) -> Result<()> {
        if inner.denied.contains(bucket) {
            return Err(Error::Forbidden(format!("Access denied to bucket {}", bucket)));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_buckets(&self) -> Result<Vec<BucketRef>> {
        let inner = self.inner.read().await;
        Ok(inner
            .buckets
            .iter()
            .map(|(name, (created, _))| BucketRef {
                name: name.clone(),
                created_at: Some(*created),
            })
            .collect())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectRef>> {
        let inner = self.inner.read().await;
        Self::check_access(&inner, bucket)?;
        let (_, objects) = inner
            .buckets
            .get(bucket)
            .ok_or_else(|| Error::NotFound(format!("Bucket not found: {}", bucket)))?;

        Ok(objects
            .iter()
            .map(|(key, o)| ObjectRef {
                key: key.clone(),
                size: o.data.len() as u64,
                last_modified: Some(o.modified),
            })
            .collect())
    }

    async fn ensure_bucket_exists(&self, bucket: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        Self::check_access(&inner, bucket)?;
        inner
            .buckets
            .entry(bucket.to_string())
            .or_insert_with(|| (Utc::now(), BTreeMap::new()));
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        let inner = self.inner.read().await;
        Self::check_access(&inner, bucket)?;
        let object = inner
            .buckets
            .get(bucket)
            .and_then(|(_, objects)| objects.get(key))
            .ok_or_else(|| Error::NotFound(format!("Object not found: {}/{}", bucket, key)))?;

        Ok(ObjectBody::new(
            object.data.clone(),
            Some(object.content_type.clone()),
        ))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        Self::check_access(&inner, bucket)?;
        let (_, objects) = inner
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| Error::NotFound(format!("Bucket not found: {}", bucket)))?;

        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                modified: Utc::now(),
            },
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct TreeEntry {
    file: FileRef,
    data: Bytes,
    trashed: bool,
    owned: bool,
}

/// In-memory Drive tree.
///
/// Native documents are stored with the bytes their export would produce.
#[derive(Debug, Default)]
pub struct MemoryFileTree {
    entries: RwLock<Vec<TreeEntry>>,
}

impl MemoryFileTree {
    /// Create a new empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file owned by the caller.
    pub async fn insert(&self, file: FileRef, data: impl Into<Bytes>) {
        self.push(file, data.into(), true).await;
    }

    /// Add a file shared with, but not owned by, the caller.
    pub async fn insert_shared(&self, file: FileRef, data: impl Into<Bytes>) {
        self.push(file, data.into(), false).await;
    }

    /// Move a file to the trash.
    pub async fn trash(&self, id: &str) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.file.id == id) {
            entry.trashed = true;
        }
    }

    /// Files whose parents include `folder_id`, in creation order.
    pub async fn children(&self, folder_id: &str) -> Vec<(FileRef, Bytes)> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.file.parents.iter().any(|p| p == folder_id))
            .map(|e| (e.file.clone(), e.data.clone()))
            .collect()
    }

    async fn push(&self, file: FileRef, data: Bytes, owned: bool) {
        self.entries.write().await.push(TreeEntry {
            file,
            data,
            trashed: false,
            owned,
        });
    }
}

#[async_trait]
impl FileTree for MemoryFileTree {
    async fn ensure_folder_exists(&self, name: &str) -> Result<String> {
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries
            .iter()
            .find(|e| !e.trashed && e.file.is_folder() && e.file.name == name)
        {
            return Ok(existing.file.id.clone());
        }

        let id = Uuid::new_v4().to_string();
        entries.push(TreeEntry {
            file: FileRef::new(id.clone(), name, FOLDER_MIME_TYPE),
            data: Bytes::new(),
            trashed: false,
            owned: true,
        });
        Ok(id)
    }

    async fn list_owned_files(&self) -> Result<Vec<FileRef>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.owned && !e.trashed && !e.file.is_folder())
            .map(|e| e.file.clone())
            .collect())
    }

    async fn download_file(&self, file: &FileRef) -> Result<Bytes> {
        if file.is_native() && export_target(&file.mime_type).is_none() {
            return Err(Error::UnsupportedType(file.mime_type.clone()));
        }

        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.file.id == file.id)
            .map(|e| e.data.clone())
            .ok_or_else(|| Error::NotFound(format!("File not found: {}", file.id)))
    }

    async fn create_file(
        &self,
        name: &str,
        parent_id: &str,
        data: Bytes,
        mime_type: &str,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let mut file = FileRef::new(id.clone(), name, mime_type);
        file.parents.push(parent_id.to_string());
        self.push(file, data, true).await;
        Ok(id)
    }
}
