//! OAuth2 token refresh and sign-in URL construction for Google.

use chrono::Utc;
use oauth2::{basic::BasicClient, AuthUrl, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use bucketbridge_common::{Error, Result, TokenSet};

/// OAuth2 authorization endpoint.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// OAuth2 token endpoint.
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Redirect URL for the OAuth2 flow (localhost for desktop use).
const REDIRECT_URL: &str = "http://localhost:8080/callback";

/// Access token lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Scopes requested at sign-in: identity plus Drive read/write.
const SCOPES: [&str; 3] = [
    "openid",
    "email",
    "https://www.googleapis.com/auth/drive",
];

/// Google OAuth2 client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleOAuthConfig {
    /// Client ID.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Redirect URL registered for the client.
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,
    /// Token endpoint used for refresh exchanges.
    #[serde(default = "default_token_url")]
    pub token_url: String,
}

fn default_redirect_url() -> String {
    REDIRECT_URL.to_string()
}

fn default_token_url() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

impl GoogleOAuthConfig {
    /// Create a configuration with the default Google endpoints.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_url: default_redirect_url(),
            token_url: default_token_url(),
        }
    }

    /// Generate the sign-in URL for the user to visit.
    ///
    /// Returns the URL and a CSRF token that should be verified on callback.
    /// Offline access and a consent prompt are requested so the provider
    /// issues a refresh token.
    pub fn consent_url(&self) -> Result<(String, String)> {
        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(GOOGLE_AUTH_URL.to_string())
                    .map_err(|e| Error::Config(format!("Invalid auth URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(self.redirect_url.clone())
                    .map_err(|e| Error::Config(format!("Invalid redirect URL: {}", e)))?,
            );

        let (auth_url, csrf_token) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(SCOPES.iter().map(|s| Scope::new(s.to_string())))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        Ok((auth_url.to_string(), csrf_token.secret().clone()))
    }
}

/// Body returned by the token endpoint on a refresh grant.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    /// Lifetime of the new access token, in seconds.
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Exchanges refresh tokens at the provider's token endpoint.
///
/// Holds no token state; every call takes the record to refresh.
pub struct TokenRefresher {
    http: Client,
    config: GoogleOAuthConfig,
}

impl TokenRefresher {
    /// Create a new refresher.
    pub fn new(config: GoogleOAuthConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("BucketBridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get the current configuration.
    pub fn config(&self) -> &GoogleOAuthConfig {
        &self.config
    }

    /// Return a usable token record, refreshing it if expired.
    ///
    /// Fails open: if the refresh exchange fails for any reason the original
    /// record is returned unchanged and the failure is only logged.
    pub async fn current(&self, tokens: TokenSet) -> TokenSet {
        self.current_at(tokens, Utc::now().timestamp_millis()).await
    }

    /// Same as [`TokenRefresher::current`] with an explicit clock.
    pub async fn current_at(&self, tokens: TokenSet, now_millis: i64) -> TokenSet {
        if !tokens.is_expired_at(now_millis) {
            return tokens;
        }

        match self.refresh_at(&tokens, now_millis).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!(error = %e, "Token refresh failed, continuing with stale tokens");
                tokens
            }
        }
    }

    /// Exchange the record's refresh token for new tokens.
    ///
    /// # Errors
    /// - `Unauthorized` if the record has no refresh token or the endpoint rejects it
    /// - `Network` on transport failure
    /// - `Serialization` if the response body cannot be parsed
    pub async fn refresh(&self, tokens: &TokenSet) -> Result<TokenSet> {
        self.refresh_at(tokens, Utc::now().timestamp_millis()).await
    }

    async fn refresh_at(&self, tokens: &TokenSet, now_millis: i64) -> Result<TokenSet> {
        let refresh_token = tokens
            .refresh_token
            .as_deref()
            .ok_or_else(|| Error::Unauthorized("No refresh token available".to_string()))?;

        info!("Refreshing expired Google tokens");

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Token refresh request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Unauthorized(format!(
                "Token refresh rejected: {} - {}",
                status, body
            )));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Invalid token response: {}", e)))?;

        if body.id_token.is_none() {
            debug!("Token response carried no id_token, keeping the previous one");
        }

        let lifetime = body.expires_in.unwrap_or_else(|| {
            debug!("Token response carried no expires_in, assuming the default lifetime");
            DEFAULT_TOKEN_LIFETIME_SECS
        });
        let expires_at = now_millis + lifetime * 1000;

        Ok(TokenSet::new(
            body.id_token.unwrap_or_else(|| tokens.id_token.clone()),
            body.access_token
                .unwrap_or_else(|| tokens.access_token.clone()),
            // Refresh tokens may or may not be rotated
            body.refresh_token.or_else(|| tokens.refresh_token.clone()),
            expires_at,
        ))
    }
}

/// Access-token source for the Drive client.
///
/// Refreshes the access token with the stored refresh token when it has
/// expired. This is separate from the session-level identity refresh.
pub struct DriveAuth {
    refresher: Option<TokenRefresher>,
    tokens: RwLock<TokenSet>,
}

impl DriveAuth {
    /// Create an access-token source that can refresh itself.
    pub fn new(refresher: TokenRefresher, tokens: TokenSet) -> Self {
        Self {
            refresher: Some(refresher),
            tokens: RwLock::new(tokens),
        }
    }

    /// Create an access-token source that never refreshes.
    pub fn fixed(tokens: TokenSet) -> Self {
        Self {
            refresher: None,
            tokens: RwLock::new(tokens),
        }
    }

    /// Get an access token, refreshing first if it has expired.
    ///
    /// # Errors
    /// - Token refresh failed
    pub async fn access_token(&self) -> Result<String> {
        let tokens = self.tokens.read().await;

        let refresher = match &self.refresher {
            Some(refresher) if tokens.is_expired() && tokens.refresh_token.is_some() => refresher,
            _ => return Ok(tokens.access_token.clone()),
        };

        drop(tokens);

        let mut tokens = self.tokens.write().await;

        // Double-check after acquiring write lock
        if !tokens.is_expired() {
            return Ok(tokens.access_token.clone());
        }

        *tokens = refresher.refresh(&tokens).await?;

        Ok(tokens.access_token.clone())
    }

    /// Get the current tokens.
    pub async fn tokens(&self) -> TokenSet {
        self.tokens.read().await.clone()
    }
}
