//! Per-caller session: credentialed clients built from the caller's tokens.

use tokio::sync::RwLock;
use tracing::{debug, info};

use bucketbridge_common::{Error, FileRef, ObjectRef, Result, TokenSet};
use bucketbridge_storage::{
    bucket_listing, BucketListing, DriveAuth, DriveClient, FederationClient, FileTree,
    ObjectStore, S3ObjectStore, TokenRefresher,
};

use crate::config::BridgeConfig;
use crate::orchestrator::{TransferOrchestrator, TransferRequest, TransferResult};

/// An authenticated caller.
///
/// Clients are built per operation from this session's tokens, so nothing
/// credentialed outlives the call that needed it. Tokens are checked for
/// expiry every time a client is built.
pub struct Session {
    config: BridgeConfig,
    federation: FederationClient,
    refresher: TokenRefresher,
    tokens: RwLock<TokenSet>,
}

impl Session {
    /// Open a session, refreshing the tokens first if they have expired.
    ///
    /// A failed refresh is not an error: the stale tokens are kept and the
    /// first provider call reports `Unauthorized`.
    ///
    /// # Errors
    /// - `Unauthorized` if the identity or access token is missing
    /// - `Config` if the HTTP client cannot be built
    pub async fn new(config: BridgeConfig, tokens: TokenSet) -> Result<Self> {
        if tokens.id_token.is_empty() || tokens.access_token.is_empty() {
            return Err(Error::Unauthorized("no active session".to_string()));
        }

        let refresher = TokenRefresher::new(config.google.clone())?;
        let tokens = refresher.current(tokens).await;
        debug!(expires_at = ?tokens.expires_at(), "Session opened");

        Ok(Self {
            federation: FederationClient::new(config.federation.clone()),
            config,
            refresher,
            tokens: RwLock::new(tokens),
        })
    }

    /// Tokens in use, possibly refreshed since the session was opened.
    pub async fn tokens(&self) -> TokenSet {
        self.tokens.read().await.clone()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Current tokens, refreshed first if they have expired.
    pub async fn current_tokens(&self) -> TokenSet {
        let mut tokens = self.tokens.write().await;
        *tokens = self.refresher.current(tokens.clone()).await;
        tokens.clone()
    }

    /// Like [`Session::current_tokens`] with an explicit clock.
    pub async fn current_tokens_at(&self, now_millis: i64) -> TokenSet {
        let mut tokens = self.tokens.write().await;
        *tokens = self.refresher.current_at(tokens.clone(), now_millis).await;
        tokens.clone()
    }

    /// Object store bound to this caller's identity.
    pub async fn object_store(&self) -> S3ObjectStore {
        let tokens = self.current_tokens().await;
        self.federation.storage_client(&tokens.id_token)
    }

    /// Drive client bound to this caller's access token.
    pub async fn file_tree(&self) -> Result<DriveClient> {
        let tokens = self.current_tokens().await;
        let refresher = TokenRefresher::new(self.config.google.clone())?;
        DriveClient::new(DriveAuth::new(refresher, tokens))
    }

    async fn orchestrator(&self) -> Result<TransferOrchestrator<S3ObjectStore, DriveClient>> {
        let tree = self.file_tree().await?;
        Ok(TransferOrchestrator::new(self.object_store().await, tree)
            .with_upload_folder(self.config.upload_folder.clone())
            .with_options(self.config.options))
    }

    /// List buckets, with emptiness and failure folded into a message.
    pub async fn list_buckets(&self) -> BucketListing {
        bucket_listing(&self.object_store().await).await
    }

    /// List every object in a bucket.
    pub async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectRef>> {
        self.object_store().await.list_objects(bucket).await
    }

    /// List the caller's own non-folder Drive files.
    pub async fn list_drive_files(&self) -> Result<Vec<FileRef>> {
        self.file_tree().await?.list_owned_files().await
    }

    /// Run a transfer with fresh clients.
    pub async fn transfer(&self, request: &TransferRequest) -> Result<TransferResult> {
        info!(direction = %request.direction(), "Running transfer");
        self.orchestrator().await?.run(request).await
    }

    /// Copy bucket objects into the upload folder.
    pub async fn to_drive(&self, bucket: &str, keys: &[String]) -> Result<TransferResult> {
        self.transfer(&TransferRequest::ToDrive {
            bucket: bucket.to_string(),
            keys: keys.to_vec(),
        })
        .await
    }

    /// Copy Drive files into a bucket.
    pub async fn to_s3(&self, bucket: &str, files: &[FileRef]) -> Result<TransferResult> {
        self.transfer(&TransferRequest::ToS3 {
            bucket: bucket.to_string(),
            files: files.to_vec(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketbridge_storage::{FederationConfig, GoogleOAuthConfig};
    use httpmock::Method::POST;
    use httpmock::MockServer;

    fn config_with_token_url(token_url: String) -> BridgeConfig {
        let mut google = GoogleOAuthConfig::new("client", "secret");
        google.token_url = token_url;
        BridgeConfig::new(FederationConfig::new("us-east-1:pool", "us-east-1"), google)
    }

    #[tokio::test]
    async fn test_missing_tokens_is_unauthorized() {
        let config = config_with_token_url("http://127.0.0.1:9/token".to_string());

        for tokens in [
            TokenSet::new("", "access", None, i64::MAX),
            TokenSet::new("id", "", None, i64::MAX),
        ] {
            let err = Session::new(config.clone(), tokens).await.err();
            match err {
                Some(Error::Unauthorized(msg)) => assert_eq!(msg, "no active session"),
                other => panic!("unexpected result: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_fresh_tokens_are_kept() {
        let server = MockServer::start_async().await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200);
            })
            .await;

        let tokens = TokenSet::new("id", "access", Some("refresh".to_string()), i64::MAX);
        let session = Session::new(config_with_token_url(server.url("/token")), tokens.clone())
            .await
            .unwrap();

        assert_eq!(session.tokens().await, tokens);
        refresh.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_expired_tokens_are_refreshed_on_open() {
        let server = MockServer::start_async().await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/token")
                    .body_contains("grant_type=refresh_token");
                then.status(200).json_body(serde_json::json!({
                    "access_token": "new-access",
                    "id_token": "new-id",
                    "expires_in": 3600
                }));
            })
            .await;

        let tokens = TokenSet::new("old-id", "old-access", Some("refresh".to_string()), 0);
        let session = Session::new(config_with_token_url(server.url("/token")), tokens)
            .await
            .unwrap();

        refresh.assert_hits_async(1).await;
        let current = session.tokens().await;
        assert_eq!(current.id_token, "new-id");
        assert_eq!(current.access_token, "new-access");
        assert_eq!(current.refresh_token.as_deref(), Some("refresh"));
        assert!(!current.is_expired());
    }

    #[tokio::test]
    async fn test_tokens_expiring_mid_session_are_refreshed() {
        let server = MockServer::start_async().await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/token")
                    .body_contains("grant_type=refresh_token");
                then.status(200).json_body(serde_json::json!({
                    "access_token": "later-access",
                    "id_token": "later-id",
                    "expires_in": 3600
                }));
            })
            .await;

        let expires_at = chrono::Utc::now().timestamp_millis() + 60_000;
        let tokens = TokenSet::new("id", "access", Some("refresh".to_string()), expires_at);
        let session = Session::new(config_with_token_url(server.url("/token")), tokens.clone())
            .await
            .unwrap();
        refresh.assert_hits_async(0).await;

        let current = session.current_tokens_at(expires_at + 1).await;

        refresh.assert_hits_async(1).await;
        assert_eq!(current.id_token, "later-id");
        assert_eq!(session.tokens().await.access_token, "later-access");

        let again = session.current_tokens_at(expires_at + 2).await;
        assert_eq!(again, current);
        refresh.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_rejected_refresh_keeps_stale_tokens() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(400).body(r#"{"error":"invalid_grant"}"#);
            })
            .await;

        let tokens = TokenSet::new("old-id", "old-access", Some("revoked".to_string()), 0);
        let session = Session::new(config_with_token_url(server.url("/token")), tokens.clone())
            .await
            .unwrap();

        assert_eq!(session.tokens().await, tokens);
    }

    #[tokio::test]
    async fn test_clients_are_built_without_network() {
        let session = Session::new(
            config_with_token_url("http://127.0.0.1:9/token".to_string()),
            TokenSet::new("id", "access", None, i64::MAX),
        )
        .await
        .unwrap();

        assert_eq!(session.object_store().await.region(), "us-east-1");
        assert!(session.file_tree().await.is_ok());
        assert_eq!(session.config().upload_folder, "S3Upload");
    }
}
