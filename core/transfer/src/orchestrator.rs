//! Bulk transfers between an object store and a file tree.

use tracing::{debug, error, info, warn};

use bucketbridge_common::{Error, FileRef, Result, TransferDirection};
use bucketbridge_storage::gdrive::exported_content_type;
use bucketbridge_storage::{FileTree, ObjectStore};

use crate::config::{FailurePolicy, TransferOptions, DEFAULT_UPLOAD_FOLDER};

/// Final state of one item in a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    /// Copied to the destination, with the new object key or file ID.
    Transferred(String),
    /// Attempted and failed.
    Failed(String),
    /// Not attempted.
    Skipped(String),
}

/// Outcome for one item, named by object key or file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub item: String,
    pub status: ItemStatus,
}

impl ItemOutcome {
    fn transferred(item: &str, destination: impl Into<String>) -> Self {
        Self {
            item: item.to_string(),
            status: ItemStatus::Transferred(destination.into()),
        }
    }

    fn failed(item: &str, err: &Error) -> Self {
        Self {
            item: item.to_string(),
            status: ItemStatus::Failed(err.to_string()),
        }
    }

    fn skipped(item: &str, reason: impl Into<String>) -> Self {
        Self {
            item: item.to_string(),
            status: ItemStatus::Skipped(reason.into()),
        }
    }
}

/// Result of a transfer run that reached the end of its item list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    pub direction: TransferDirection,
    /// One entry per input item, in input order.
    pub outcomes: Vec<ItemOutcome>,
}

impl TransferResult {
    fn new(direction: TransferDirection) -> Self {
        Self {
            direction,
            outcomes: Vec::new(),
        }
    }

    /// Whether any item failed.
    pub fn any_errored(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o.status, ItemStatus::Failed(_)))
    }

    /// Number of items copied.
    pub fn transferred(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ItemStatus::Transferred(_)))
            .count()
    }

    /// Items that failed.
    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ItemStatus::Failed(_)))
    }
}

/// A transfer to run: the source, the destination and the items to copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferRequest {
    /// Copy objects from `bucket` into the upload folder.
    ToDrive { bucket: String, keys: Vec<String> },
    /// Copy Drive files into `bucket`.
    ToS3 { bucket: String, files: Vec<FileRef> },
}

impl TransferRequest {
    pub fn direction(&self) -> TransferDirection {
        match self {
            TransferRequest::ToDrive { .. } => TransferDirection::StoreToTree,
            TransferRequest::ToS3 { .. } => TransferDirection::TreeToStore,
        }
    }
}

/// Moves files between an object store and a file tree.
///
/// Items are processed one at a time in input order. There is no rollback:
/// items copied before a failure stay copied.
pub struct TransferOrchestrator<S, T> {
    store: S,
    tree: T,
    upload_folder: String,
    options: TransferOptions,
}

impl<S: ObjectStore, T: FileTree> TransferOrchestrator<S, T> {
    /// Create an orchestrator with the default folder and policies.
    pub fn new(store: S, tree: T) -> Self {
        Self {
            store,
            tree,
            upload_folder: DEFAULT_UPLOAD_FOLDER.to_string(),
            options: TransferOptions::default(),
        }
    }

    /// Set the Drive folder that receives bucket objects.
    pub fn with_upload_folder(mut self, name: impl Into<String>) -> Self {
        self.upload_folder = name.into();
        self
    }

    /// Set the per-direction failure policies.
    pub fn with_options(mut self, options: TransferOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }

    /// Run a transfer request in its direction.
    pub async fn run(&self, request: &TransferRequest) -> Result<TransferResult> {
        match request {
            TransferRequest::ToDrive { bucket, keys } => self.bucket_to_drive(bucket, keys).await,
            TransferRequest::ToS3 { bucket, files } => self.drive_to_bucket(files, bucket).await,
        }
    }

    /// Copy Drive files into a bucket, keyed by file name.
    ///
    /// The bucket is ensured before any item is attempted. Native documents
    /// are stored in their export format with a matching content type.
    ///
    /// # Errors
    /// - Bucket ensure failure
    /// - The first item failure under `AbortOnError`
    /// - `Forbidden` or `Unauthorized` from any item
    pub async fn drive_to_bucket(&self, files: &[FileRef], bucket: &str) -> Result<TransferResult> {
        let direction = TransferDirection::TreeToStore;
        let policy = self.options.policy(direction);

        info!(bucket, count = files.len(), %direction, "Starting transfer");

        self.store.ensure_bucket_exists(bucket).await?;

        let mut result = TransferResult::new(direction);

        for file in files {
            if !file.is_complete() {
                warn!(file_id = %file.id, "Skipping file with incomplete metadata");
                result
                    .outcomes
                    .push(ItemOutcome::skipped(&file.name, "incomplete metadata"));
                continue;
            }

            match self.copy_file_to_bucket(file, bucket).await {
                Ok(()) => {
                    debug!(file_id = %file.id, key = %file.name, "Uploaded file");
                    result
                        .outcomes
                        .push(ItemOutcome::transferred(&file.name, &file.name));
                }
                Err(e) => {
                    error!(file_id = %file.id, error = %e, "Failed to upload file");
                    if Self::ends_run(policy, &e) {
                        return Err(e);
                    }
                    result.outcomes.push(ItemOutcome::failed(&file.name, &e));
                }
            }
        }

        Self::log_summary(&result);
        Ok(result)
    }

    /// Copy bucket objects into the upload folder, named by key.
    ///
    /// The folder is ensured once before any item is attempted.
    ///
    /// # Errors
    /// - Folder ensure failure
    /// - The first item failure under `AbortOnError`
    /// - `Forbidden` or `Unauthorized` from any item
    pub async fn bucket_to_drive(&self, bucket: &str, keys: &[String]) -> Result<TransferResult> {
        let direction = TransferDirection::StoreToTree;
        let policy = self.options.policy(direction);

        info!(bucket, count = keys.len(), %direction, "Starting transfer");

        let folder_id = self.tree.ensure_folder_exists(&self.upload_folder).await?;
        debug!(folder = %self.upload_folder, folder_id = %folder_id, "Upload folder ready");

        let mut result = TransferResult::new(direction);

        for key in keys {
            match self.copy_object_to_folder(bucket, key, &folder_id).await {
                Ok(file_id) => {
                    debug!(key = %key, file_id = %file_id, "Created file");
                    result.outcomes.push(ItemOutcome::transferred(key, file_id));
                }
                Err(e) => {
                    error!(key = %key, error = %e, "Failed to transfer object");
                    if Self::ends_run(policy, &e) {
                        return Err(e);
                    }
                    result.outcomes.push(ItemOutcome::failed(key, &e));
                }
            }
        }

        Self::log_summary(&result);
        Ok(result)
    }

    async fn copy_file_to_bucket(&self, file: &FileRef, bucket: &str) -> Result<()> {
        let content_type = exported_content_type(file)?;
        let data = self.tree.download_file(file).await?;
        self.store
            .put_object(bucket, &file.name, data, &content_type)
            .await
    }

    async fn copy_object_to_folder(&self, bucket: &str, key: &str, folder_id: &str) -> Result<String> {
        let body = self.store.get_object(bucket, key).await?;
        self.tree
            .create_file(key, folder_id, body.bytes, &body.content_type)
            .await
    }

    /// Whether a failed item ends the run.
    fn ends_run(policy: FailurePolicy, err: &Error) -> bool {
        match policy {
            FailurePolicy::AbortOnError => true,
            FailurePolicy::BestEffort => err.is_fatal(),
        }
    }

    fn log_summary(result: &TransferResult) {
        let failed = result.failures().count();
        if failed > 0 {
            warn!(
                direction = %result.direction,
                transferred = result.transferred(),
                failed,
                "Transfer completed with errors"
            );
        } else {
            info!(
                direction = %result.direction,
                transferred = result.transferred(),
                "Transfer completed"
            );
        }
    }
}
