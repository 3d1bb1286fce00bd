//! Federated credentials for the object store.
//!
//! A Google identity token is exchanged for temporary AWS credentials
//! through a Cognito identity pool. The exchange is deferred until the S3
//! client signs its first request, so building a storage client never fails.

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::future::ProvideCredentials as ProvideCredentialsFuture;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::Credentials;
use aws_sdk_cognitoidentity::error::DisplayErrorContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;
use tracing::debug;

use super::client::{S3ObjectStore, S3Settings};

/// Login provider key for Google-issued identity tokens.
pub const GOOGLE_LOGIN_PROVIDER: &str = "accounts.google.com";

/// Marker included in federation errors so S3 call failures caused by
/// credential resolution can be told apart from transport failures.
pub(crate) const FEDERATION_ERROR_MARKER: &str = "bucketbridge-federation";

/// Provider name attached to credentials produced by the exchange.
const CREDENTIALS_PROVIDER_NAME: &str = "cognito-identity-pool";

/// Identity pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Cognito identity pool ID (`<region>:<uuid>`).
    pub identity_pool_id: String,
    /// Region of the identity pool and of the buckets.
    pub region: String,
    /// Login provider the identity token was issued by.
    #[serde(default = "default_login_provider")]
    pub login_provider: String,
    /// Object store endpoint override for S3-compatible services.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Use path-style bucket addressing.
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_login_provider() -> String {
    GOOGLE_LOGIN_PROVIDER.to_string()
}

impl FederationConfig {
    /// Create a configuration for Google identities in `region`.
    pub fn new(identity_pool_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            identity_pool_id: identity_pool_id.into(),
            region: region.into(),
            login_provider: default_login_provider(),
            endpoint_url: None,
            force_path_style: false,
        }
    }

    fn s3_settings(&self) -> S3Settings {
        S3Settings {
            region: self.region.clone(),
            endpoint_url: self.endpoint_url.clone(),
            force_path_style: self.force_path_style,
        }
    }
}

/// Resolves AWS credentials from an identity token on demand.
struct FederatedCredentialsProvider {
    config: FederationConfig,
    id_token: String,
}

impl fmt::Debug for FederatedCredentialsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederatedCredentialsProvider")
            .field("identity_pool_id", &self.config.identity_pool_id)
            .field("region", &self.config.region)
            .field("id_token", &"[REDACTED]")
            .finish()
    }
}

impl FederatedCredentialsProvider {
    fn new(config: FederationConfig, id_token: String) -> Self {
        Self { config, id_token }
    }

    fn failure(step: &str, detail: impl fmt::Display) -> CredentialsError {
        CredentialsError::provider_error(format!(
            "{FEDERATION_ERROR_MARKER}: {step} failed: {detail}"
        ))
    }

    async fn exchange(&self) -> aws_credential_types::provider::Result {
        let cognito_config = aws_sdk_cognitoidentity::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.config.region.clone()))
            .build();
        let cognito = aws_sdk_cognitoidentity::Client::from_conf(cognito_config);

        let identity = cognito
            .get_id()
            .identity_pool_id(&self.config.identity_pool_id)
            .logins(&self.config.login_provider, &self.id_token)
            .send()
            .await
            .map_err(|e| Self::failure("GetId", DisplayErrorContext(&e)))?;

        let identity_id = identity
            .identity_id()
            .ok_or_else(|| Self::failure("GetId", "no identity id returned"))?;

        debug!(identity_id, "Resolved federated identity");

        let output = cognito
            .get_credentials_for_identity()
            .identity_id(identity_id)
            .logins(&self.config.login_provider, &self.id_token)
            .send()
            .await
            .map_err(|e| Self::failure("GetCredentialsForIdentity", DisplayErrorContext(&e)))?;

        let credentials = output
            .credentials()
            .ok_or_else(|| Self::failure("GetCredentialsForIdentity", "no credentials returned"))?;

        let access_key_id = credentials
            .access_key_id()
            .ok_or_else(|| Self::failure("GetCredentialsForIdentity", "missing access key"))?;
        let secret_key = credentials
            .secret_key()
            .ok_or_else(|| Self::failure("GetCredentialsForIdentity", "missing secret key"))?;
        let expiry = credentials
            .expiration()
            .and_then(|dt| SystemTime::try_from(*dt).ok());

        Ok(Credentials::new(
            access_key_id,
            secret_key,
            credentials.session_token().map(str::to_string),
            expiry,
            CREDENTIALS_PROVIDER_NAME,
        ))
    }
}

impl ProvideCredentials for FederatedCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> ProvideCredentialsFuture<'a>
    where
        Self: 'a,
    {
        ProvideCredentialsFuture::new(self.exchange())
    }
}

/// Builds object store clients bound to a caller's identity token.
///
/// Holds configuration only. Every call produces a fresh client with its own
/// credentials, so one caller's credentials never reach another's requests.
#[derive(Debug, Clone)]
pub struct FederationClient {
    config: FederationConfig,
}

impl FederationClient {
    /// Create a new federation client.
    pub fn new(config: FederationConfig) -> Self {
        Self { config }
    }

    /// Get the current configuration.
    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    /// Build a storage client for `id_token`.
    ///
    /// Performs no validation and no network I/O. An invalid or expired token
    /// surfaces as `Unauthorized` from the client's first call.
    pub fn storage_client(&self, id_token: &str) -> S3ObjectStore {
        let provider = FederatedCredentialsProvider::new(self.config.clone(), id_token.to_string());
        S3ObjectStore::new(self.config.s3_settings(), provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: FederationConfig = serde_json::from_str(
            r#"{"identity_pool_id":"us-east-1:abc","region":"us-east-1"}"#,
        )
        .unwrap();

        assert_eq!(config.login_provider, GOOGLE_LOGIN_PROVIDER);
        assert!(config.endpoint_url.is_none());
        assert!(!config.force_path_style);
    }

    #[test]
    fn test_provider_debug_redacts_token() {
        let provider = FederatedCredentialsProvider::new(
            FederationConfig::new("us-east-1:abc", "us-east-1"),
            "secret-id-token".to_string(),
        );
        let rendered = format!("{:?}", provider);
        assert!(!rendered.contains("secret-id-token"));
        assert!(rendered.contains("us-east-1:abc"));
    }

    #[test]
    fn test_failure_carries_marker() {
        let err = FederatedCredentialsProvider::failure("GetId", "NotAuthorizedException");
        let rendered = format!("{}", DisplayErrorContext(&err));
        assert!(rendered.contains(FEDERATION_ERROR_MARKER));
        assert!(rendered.contains("NotAuthorizedException"));
    }

    #[tokio::test]
    async fn test_storage_client_construction_is_lazy() {
        // Unroutable endpoint: construction must not touch the network.
        let mut config = FederationConfig::new("us-east-1:abc", "us-east-1");
        config.endpoint_url = Some("http://127.0.0.1:9".to_string());

        let client = FederationClient::new(config);
        let first = client.storage_client("token-a");
        let second = client.storage_client("token-b");

        assert_eq!(first.region(), "us-east-1");
        assert_eq!(second.region(), "us-east-1");
    }
}
