//! Bridge configuration and token file handling.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use bucketbridge_common::{Error, Result, TokenSet, TransferDirection};
use bucketbridge_storage::{FederationConfig, GoogleOAuthConfig};

/// Drive folder that receives every bucket-to-Drive transfer.
pub const DEFAULT_UPLOAD_FOLDER: &str = "S3Upload";

/// Environment variables that override config file values.
///
/// Each entry is `(variable, section, field)`.
const ENV_OVERRIDES: [(&str, &str, &str); 4] = [
    ("COGNITO_REGION", "federation", "region"),
    ("COGNITO_IDENTITY_POOL_ID", "federation", "identity_pool_id"),
    ("GOOGLE_CLIENT_ID", "google", "client_id"),
    ("GOOGLE_CLIENT_SECRET", "google", "client_secret"),
];

/// What a transfer does when one item fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failed item and return its error.
    AbortOnError,
    /// Record the failure and continue with the next item.
    BestEffort,
}

/// Failure policy per transfer direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOptions {
    /// Policy for Drive to bucket transfers.
    #[serde(default = "default_tree_to_store")]
    pub tree_to_store: FailurePolicy,
    /// Policy for bucket to Drive transfers.
    #[serde(default = "default_store_to_tree")]
    pub store_to_tree: FailurePolicy,
}

fn default_tree_to_store() -> FailurePolicy {
    FailurePolicy::AbortOnError
}

fn default_store_to_tree() -> FailurePolicy {
    FailurePolicy::BestEffort
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            tree_to_store: default_tree_to_store(),
            store_to_tree: default_store_to_tree(),
        }
    }
}

impl TransferOptions {
    /// Apply the same policy to both directions.
    pub fn uniform(policy: FailurePolicy) -> Self {
        Self {
            tree_to_store: policy,
            store_to_tree: policy,
        }
    }

    /// Policy for a direction.
    pub fn policy(&self, direction: TransferDirection) -> FailurePolicy {
        match direction {
            TransferDirection::TreeToStore => self.tree_to_store,
            TransferDirection::StoreToTree => self.store_to_tree,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Identity pool used to obtain AWS credentials.
    pub federation: FederationConfig,
    /// Google OAuth client used for sign-in and refresh.
    pub google: GoogleOAuthConfig,
    /// Destination folder for bucket to Drive transfers.
    #[serde(default = "default_upload_folder")]
    pub upload_folder: String,
    /// Failure handling per direction.
    #[serde(default)]
    pub options: TransferOptions,
}

fn default_upload_folder() -> String {
    DEFAULT_UPLOAD_FOLDER.to_string()
}

impl BridgeConfig {
    /// Create a configuration with default folder and options.
    pub fn new(federation: FederationConfig, google: GoogleOAuthConfig) -> Self {
        Self {
            federation,
            google,
            upload_folder: default_upload_folder(),
            options: TransferOptions::default(),
        }
    }

    /// Load configuration from an optional JSON file and the process environment.
    ///
    /// Environment values override file values.
    ///
    /// # Errors
    /// - `Io` if the file cannot be read
    /// - `Config` if the file is malformed or a required value is missing
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// Same as [`BridgeConfig::load`] with an explicit variable lookup.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut root = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str(&raw).map_err(|e| {
                    Error::Config(format!("Invalid config file {}: {}", path.display(), e))
                })?
            }
            None => Value::Object(Map::new()),
        };

        for (variable, section, field) in ENV_OVERRIDES {
            if let Some(value) = lookup(variable).filter(|v| !v.is_empty()) {
                section_mut(&mut root, section)?.insert(field.to_string(), Value::String(value));
            }
        }

        for (variable, section, field) in ENV_OVERRIDES {
            let present = root
                .get(section)
                .and_then(|s| s.get(field))
                .and_then(Value::as_str)
                .is_some_and(|v| !v.is_empty());
            if !present {
                return Err(Error::Config(format!(
                    "Missing {}.{}: set {} or add it to the config file",
                    section, field, variable
                )));
            }
        }

        serde_json::from_value(root).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Write the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn section_mut<'a>(root: &'a mut Value, section: &str) -> Result<&'a mut Map<String, Value>> {
    let object = root
        .as_object_mut()
        .ok_or_else(|| Error::Config("Config root must be a JSON object".to_string()))?;

    object
        .entry(section)
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| Error::Config(format!("Config section {} must be an object", section)))
}

/// Read a token record written by [`write_token_file`].
///
/// # Errors
/// - `Io` if the file cannot be read
/// - `Serialization` if it is not a token record
pub fn read_token_file(path: &Path) -> Result<TokenSet> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Persist a token record as JSON.
pub fn write_token_file(path: &Path, tokens: &TokenSet) -> Result<()> {
    let json = serde_json::to_string_pretty(tokens)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const FULL_ENV: [(&str, &str); 4] = [
        ("COGNITO_REGION", "eu-west-1"),
        ("COGNITO_IDENTITY_POOL_ID", "eu-west-1:pool"),
        ("GOOGLE_CLIENT_ID", "client"),
        ("GOOGLE_CLIENT_SECRET", "secret"),
    ];

    #[test]
    fn test_load_from_env_only() {
        let config = BridgeConfig::load_with(None, env(&FULL_ENV)).unwrap();

        assert_eq!(config.federation.region, "eu-west-1");
        assert_eq!(config.federation.identity_pool_id, "eu-west-1:pool");
        assert_eq!(config.google.client_id, "client");
        assert_eq!(config.upload_folder, DEFAULT_UPLOAD_FOLDER);
        assert_eq!(config.options, TransferOptions::default());
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bridge.json");
        std::fs::write(
            &path,
            r#"{
                "federation": {"identity_pool_id": "us-east-1:file", "region": "us-east-1"},
                "google": {"client_id": "file-client", "client_secret": "file-secret"},
                "upload_folder": "Inbox",
                "options": {"tree_to_store": "best_effort"}
            }"#,
        )
        .unwrap();

        let config =
            BridgeConfig::load_with(Some(&path), env(&[("GOOGLE_CLIENT_ID", "env-client")]))
                .unwrap();

        assert_eq!(config.google.client_id, "env-client");
        assert_eq!(config.google.client_secret, "file-secret");
        assert_eq!(config.federation.identity_pool_id, "us-east-1:file");
        assert_eq!(config.upload_folder, "Inbox");
        assert_eq!(config.options.tree_to_store, FailurePolicy::BestEffort);
        assert_eq!(config.options.store_to_tree, FailurePolicy::BestEffort);
    }

    #[test]
    fn test_missing_value_is_config_error() {
        let err = BridgeConfig::load_with(None, env(&FULL_ENV[..3])).unwrap_err();
        match err {
            Error::Config(msg) => assert!(msg.contains("GOOGLE_CLIENT_SECRET")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_empty_env_value_does_not_override() {
        let mut pairs = FULL_ENV.to_vec();
        pairs[0] = ("COGNITO_REGION", "");
        let err = BridgeConfig::load_with(None, env(&pairs)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bridge.json");
        std::fs::write(&path, "not json").unwrap();

        let err = BridgeConfig::load_with(Some(&path), env(&FULL_ENV)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bridge.json");
        let mut config = BridgeConfig::new(
            FederationConfig::new("us-east-1:abc", "us-east-1"),
            GoogleOAuthConfig::new("client", "secret"),
        );
        config.options = TransferOptions::uniform(FailurePolicy::BestEffort);
        config.save(&path).unwrap();

        let loaded = BridgeConfig::load_with(Some(&path), env(&[])).unwrap();
        assert_eq!(loaded.options, config.options);
        assert_eq!(loaded.federation.identity_pool_id, "us-east-1:abc");
    }

    #[test]
    fn test_policy_per_direction() {
        let options = TransferOptions::default();
        assert_eq!(
            options.policy(TransferDirection::TreeToStore),
            FailurePolicy::AbortOnError
        );
        assert_eq!(
            options.policy(TransferDirection::StoreToTree),
            FailurePolicy::BestEffort
        );
    }

    #[test]
    fn test_token_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.json");
        let tokens = TokenSet::new("id", "access", Some("refresh".to_string()), 42);

        write_token_file(&path, &tokens).unwrap();
        let loaded = read_token_file(&path).unwrap();

        assert_eq!(loaded, tokens);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("accessTokenExpiresAtMillis"));
    }

    #[test]
    fn test_missing_token_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = read_token_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
