//! Google Drive API client.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bucketbridge_common::{Error, FileRef, Result, FOLDER_MIME_TYPE};

use super::auth::DriveAuth;
use super::export::{download_mode, DownloadMode};
use crate::store::{collect_pages, FileTree};

/// Google Drive API base URL.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Google Drive upload API base URL.
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Page size requested when listing files.
const LIST_PAGE_SIZE: &str = "1000";

/// Query for files the caller owns, excluding folders and trash.
const OWNED_FILES_QUERY: &str =
    "trashed=false and 'me' in owners and mimeType != 'application/vnd.google-apps.folder'";

/// File record as returned by the API; every field is optional because the
/// response only carries what the `fields` projection asked for.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    parents: Vec<String>,
}

impl DriveFile {
    /// Convert to a common record; `None` if the API returned no id.
    fn into_file_ref(self) -> Option<FileRef> {
        let Some(id) = self.id else {
            warn!(name = ?self.name, "Skipping Drive file record without id");
            return None;
        };
        Some(FileRef {
            id,
            name: self.name.unwrap_or_default(),
            mime_type: self.mime_type.unwrap_or_default(),
            parents: self.parents,
        })
    }
}

/// Error body returned by the Drive API.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: ApiError,
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    reason: String,
}

/// 403 reasons that signal throttling or quota, not a permission denial.
const LIMIT_REASONS: [&str; 6] = [
    "userRateLimitExceeded",
    "rateLimitExceeded",
    "dailyLimitExceeded",
    "quotaExceeded",
    "storageQuotaExceeded",
    "sharingRateLimitExceeded",
];

/// Map a 403 body to `Network` for limit reasons, `Forbidden` otherwise.
fn classify_forbidden(body: String) -> Error {
    let parsed: ApiErrorBody = serde_json::from_str(&body).unwrap_or_default();
    let limited = parsed
        .error
        .errors
        .iter()
        .any(|e| LIMIT_REASONS.contains(&e.reason.as_str()));

    if limited {
        Error::Network(format!("Drive limit exceeded: {}", body))
    } else {
        Error::Forbidden(format!("Access denied: {}", body))
    }
}

/// Response from listing files.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Response from creating a file with `fields=id`.
#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

/// Escape a value for use inside a single-quoted Drive query literal.
pub fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Google Drive API client.
///
/// Built per call from the caller's tokens; shares nothing with other
/// clients.
pub struct DriveClient {
    http: Client,
    auth: DriveAuth,
    api_base: String,
    upload_base: String,
}

impl DriveClient {
    /// Create a new Drive client against the public API.
    pub fn new(auth: DriveAuth) -> Result<Self> {
        Self::with_endpoints(auth, DRIVE_API_BASE, DRIVE_UPLOAD_BASE)
    }

    /// Create a Drive client against explicit API and upload base URLs.
    pub fn with_endpoints(
        auth: DriveAuth,
        api_base: impl Into<String>,
        upload_base: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("BucketBridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            auth,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            upload_base: upload_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// Access-token source backing this client.
    pub fn auth(&self) -> &DriveAuth {
        &self.auth
    }

    /// Get authorization header.
    async fn auth_header(&self) -> Result<String> {
        let token = self.auth.access_token().await?;
        Ok(format!("Bearer {}", token))
    }

    /// Fetch one page of a `files.list` query.
    async fn list_page(
        &self,
        query: &str,
        fields: &str,
        page_token: Option<&str>,
    ) -> Result<FileListResponse> {
        let url = format!("{}/files", self.api_base);
        let auth = self.auth_header().await?;

        let mut request = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, auth)
            .query(&[
                ("q", query),
                ("fields", fields),
                ("spaces", "drive"),
                ("pageSize", LIST_PAGE_SIZE),
            ]);

        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to list files: {}", e)))?;

        self.handle_response(response).await
    }

    /// Create a folder at the root of the caller's Drive.
    async fn create_folder(&self, name: &str) -> Result<String> {
        let url = format!("{}/files", self.api_base);
        let auth = self.auth_header().await?;

        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE
        });

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, auth)
            .query(&[("fields", "id")])
            .json(&metadata)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to create folder: {}", e)))?;

        let created: CreatedFile = self.handle_response(response).await?;
        Ok(created.id)
    }

    /// Download raw bytes from `url` with optional query parameters.
    async fn fetch_bytes(&self, url: &str, query: &[(&str, &str)]) -> Result<Bytes> {
        let auth = self.auth_header().await?;

        let response = self
            .http
            .get(url)
            .header(header::AUTHORIZATION, auth)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to download file: {}", e)))?;

        let response = Self::check_status(response).await?;

        response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("Failed to read download response: {}", e)))
    }

    /// Map an error status to the common taxonomy, passing successes through.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => Error::NotFound(format!("Resource not found: {}", body)),
            StatusCode::UNAUTHORIZED => {
                Error::Unauthorized("Invalid or expired token".to_string())
            }
            StatusCode::FORBIDDEN => classify_forbidden(body),
            _ => Error::Network(format!("API error: {} - {}", status, body)),
        })
    }

    /// Handle API response with error checking.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Network(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl FileTree for DriveClient {
    async fn ensure_folder_exists(&self, name: &str) -> Result<String> {
        let query = format!(
            "name='{}' and mimeType='{}' and trashed=false",
            escape_query_value(name),
            FOLDER_MIME_TYPE
        );

        let existing = self.list_page(&query, "files(id, name)", None).await?;

        if let Some(folder) = existing.files.into_iter().find_map(|f| f.id) {
            debug!(folder = %name, id = %folder, "Destination folder exists");
            return Ok(folder);
        }

        let id = self.create_folder(name).await?;
        info!(folder = %name, id = %id, "Created destination folder");
        Ok(id)
    }

    async fn list_owned_files(&self) -> Result<Vec<FileRef>> {
        let pages = collect_pages(|token| async move {
            let page = self
                .list_page(
                    OWNED_FILES_QUERY,
                    "nextPageToken, files(id, name, mimeType, parents)",
                    token.as_deref(),
                )
                .await?;
            Ok((page.files, page.next_page_token))
        })
        .await?;

        let files: Vec<FileRef> = pages
            .into_iter()
            .filter_map(DriveFile::into_file_ref)
            .collect();

        debug!(count = files.len(), "Listed owned Drive files");
        Ok(files)
    }

    async fn download_file(&self, file: &FileRef) -> Result<Bytes> {
        match download_mode(file)? {
            DownloadMode::Export(target) => {
                debug!(file_id = %file.id, export_type = target, "Exporting native document");
                let url = format!("{}/files/{}/export", self.api_base, file.id);
                self.fetch_bytes(&url, &[("mimeType", target)]).await
            }
            DownloadMode::Raw => {
                let url = format!("{}/files/{}", self.api_base, file.id);
                self.fetch_bytes(&url, &[("alt", "media")]).await
            }
        }
    }

    async fn create_file(
        &self,
        name: &str,
        parent_id: &str,
        data: Bytes,
        mime_type: &str,
    ) -> Result<String> {
        let url = format!("{}/files", self.upload_base);
        let auth = self.auth_header().await?;

        let metadata = serde_json::json!({
            "name": name,
            "parents": [parent_id]
        });
        let metadata_json = serde_json::to_string(&metadata)?;

        // Build multipart request
        let boundary = format!("bucketbridge-{}", Uuid::new_v4().simple());
        let mut body = Vec::with_capacity(data.len() + metadata_json.len() + 256);

        // Metadata part
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.extend_from_slice(metadata_json.as_bytes());
        body.extend_from_slice(b"\r\n");

        // Data part
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
        body.extend_from_slice(&data);
        body.extend_from_slice(b"\r\n");

        // End boundary
        body.extend_from_slice(format!("--{}--", boundary).as_bytes());

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, auth)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to upload file: {}", e)))?;

        let created: CreatedFile = self.handle_response(response).await?;
        Ok(created.id)
    }
}
