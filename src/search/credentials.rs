use crate::config::SearchConfig;
use crate::secrets::SecretStore;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Authentication mode for the search backend. Exactly one is active per client.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    None,
    ApiKeyPair { id: String, key: String },
    ApiKeySingle { key: String },
    BasicAuth { username: String, password: String },
}

impl Credentials {
    pub fn mode(&self) -> &'static str {
        match self {
            Credentials::None => "none",
            Credentials::ApiKeyPair { .. } => "api_key_pair",
            Credentials::ApiKeySingle { .. } => "api_key_single",
            Credentials::BasicAuth { .. } => "basic_auth",
        }
    }
}

// Never print secret material
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::BasicAuth { username, .. } => f
                .debug_struct("BasicAuth")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            other => write!(f, "Credentials({})", other.mode()),
        }
    }
}

/// Credentials supplied through the environment
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_key_id: Option<String>,
    pub api_key: Option<String>,
}

impl From<&SearchConfig> for EnvCredentials {
    fn from(config: &SearchConfig) -> Self {
        Self {
            username: config.username.clone(),
            password: config.password.clone(),
            api_key_id: config.api_key_id.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

/// Shape of the credentials secret; every key is optional
#[derive(Debug, Default, Deserialize)]
struct CredentialSecret {
    api_key_id: Option<String>,
    api_key: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Interpret a secret payload. Unrecognized or malformed payloads yield `None`.
pub fn parse_secret(payload: &[u8]) -> Option<Credentials> {
    let secret: CredentialSecret = match serde_json::from_slice(payload) {
        Ok(secret) => secret,
        Err(e) => {
            warn!("Search credentials secret is not a JSON object: {}", e);
            return None;
        }
    };

    match (
        present(secret.api_key_id),
        present(secret.api_key),
        present(secret.username),
        present(secret.password),
    ) {
        (Some(id), Some(key), _, _) => Some(Credentials::ApiKeyPair { id, key }),
        (None, Some(key), _, _) => Some(Credentials::ApiKeySingle { key }),
        (_, None, Some(username), Some(password)) => {
            Some(Credentials::BasicAuth { username, password })
        }
        _ => {
            warn!("Search credentials found but format not recognized");
            None
        }
    }
}

/// Picks the search backend's authentication mode.
///
/// Order: secret store (key pair, single key, username/password), then the
/// environment (key pair, single key, username/password), then no authentication.
pub struct CredentialResolver {
    secret_store: Option<Arc<dyn SecretStore>>,
    secret_name: String,
    env: EnvCredentials,
}

impl CredentialResolver {
    pub fn new(
        secret_store: Option<Arc<dyn SecretStore>>,
        secret_name: impl Into<String>,
        env: EnvCredentials,
    ) -> Self {
        Self {
            secret_store,
            secret_name: secret_name.into(),
            env,
        }
    }

    /// Resolver that only looks at the given environment values
    pub fn env_only(env: EnvCredentials) -> Self {
        Self::new(None, String::new(), env)
    }

    /// Never fails; the worst case is `Credentials::None`
    pub async fn resolve(&self) -> Credentials {
        if let Some(credentials) = self.from_secret_store().await {
            info!(
                "Using {} authentication for search backend (secret store)",
                credentials.mode()
            );
            return credentials;
        }

        let credentials = self.from_env();
        info!(
            "Using {} authentication for search backend (environment)",
            credentials.mode()
        );
        credentials
    }

    async fn from_secret_store(&self) -> Option<Credentials> {
        let Some(store) = &self.secret_store else {
            info!("No secret store configured, skipping search credentials lookup");
            return None;
        };

        match store.access_latest(&self.secret_name).await {
            Ok(Some(payload)) => parse_secret(&payload),
            Ok(None) => {
                info!("Secret {} not found", self.secret_name);
                None
            }
            Err(e) => {
                info!(
                    "Could not get search credentials from secret store: {}",
                    e.log_safe()
                );
                None
            }
        }
    }

    fn from_env(&self) -> Credentials {
        let env = self.env.clone();
        match (
            present(env.api_key_id),
            present(env.api_key),
            present(env.username),
            present(env.password),
        ) {
            (Some(id), Some(key), _, _) => Credentials::ApiKeyPair { id, key },
            (None, Some(key), _, _) => Credentials::ApiKeySingle { key },
            (_, None, Some(username), Some(password)) => {
                Credentials::BasicAuth { username, password }
            }
            _ => Credentials::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::MemorySecretStore;
    use crate::{Error, Result};
    use async_trait::async_trait;

    const SECRET: &str = "elasticsearch-credentials";

    fn env_basic() -> EnvCredentials {
        EnvCredentials {
            username: Some("elastic".to_string()),
            password: Some("changeme".to_string()),
            ..Default::default()
        }
    }

    fn resolver_with(secret: &str, env: EnvCredentials) -> CredentialResolver {
        let store = MemorySecretStore::new().with_secret(SECRET, secret);
        CredentialResolver::new(Some(Arc::new(store)), SECRET, env)
    }

    struct UnreachableStore;

    #[async_trait]
    impl SecretStore for UnreachableStore {
        async fn access_latest(&self, _name: &str) -> Result<Option<Vec<u8>>> {
            Err(Error::SecretStore("connection refused".to_string()))
        }
    }

    #[test]
    fn test_parse_secret_shapes() {
        assert_eq!(
            parse_secret(br#"{"api_key_id":"id","api_key":"key"}"#),
            Some(Credentials::ApiKeyPair {
                id: "id".to_string(),
                key: "key".to_string()
            })
        );
        assert_eq!(
            parse_secret(br#"{"api_key":"key"}"#),
            Some(Credentials::ApiKeySingle {
                key: "key".to_string()
            })
        );
        assert_eq!(
            parse_secret(br#"{"username":"u","password":"p"}"#),
            Some(Credentials::BasicAuth {
                username: "u".to_string(),
                password: "p".to_string()
            })
        );
        assert_eq!(parse_secret(br#"{"token":"abc"}"#), None);
        assert_eq!(parse_secret(br#"{"username":"u"}"#), None);
        assert_eq!(parse_secret(b"not json"), None);
    }

    #[tokio::test]
    async fn test_secret_key_pair_beats_env_basic_auth() {
        let resolver = resolver_with(r#"{"api_key_id":"id","api_key":"key"}"#, env_basic());
        let credentials = resolver.resolve().await;
        assert_eq!(credentials.mode(), "api_key_pair");
    }

    #[tokio::test]
    async fn test_unrecognized_secret_falls_back_to_env() {
        let resolver = resolver_with(r#"{"something":"else"}"#, env_basic());
        assert_eq!(resolver.resolve().await.mode(), "basic_auth");
    }

    #[tokio::test]
    async fn test_unreachable_store_falls_back_to_env() {
        let resolver = CredentialResolver::new(Some(Arc::new(UnreachableStore)), SECRET, env_basic());
        assert_eq!(resolver.resolve().await.mode(), "basic_auth");
    }

    #[tokio::test]
    async fn test_nothing_configured_resolves_to_none() {
        let resolver = CredentialResolver::env_only(EnvCredentials::default());
        assert_eq!(resolver.resolve().await, Credentials::None);

        // Half a basic-auth pair is not enough
        let resolver = CredentialResolver::env_only(EnvCredentials {
            username: Some("elastic".to_string()),
            ..Default::default()
        });
        assert_eq!(resolver.resolve().await, Credentials::None);
    }

    #[tokio::test]
    async fn test_env_api_key_precedes_env_basic_auth() {
        let mut env = env_basic();
        env.api_key = Some("encoded".to_string());
        let resolver = CredentialResolver::env_only(env);
        assert_eq!(resolver.resolve().await.mode(), "api_key_single");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let credentials = Credentials::BasicAuth {
            username: "elastic".to_string(),
            password: "hunter2".to_string(),
        };
        let printed = format!("{credentials:?}");
        assert!(printed.contains("elastic"));
        assert!(!printed.contains("hunter2"));

        let printed = format!(
            "{:?}",
            Credentials::ApiKeySingle {
                key: "topsecret".to_string()
            }
        );
        assert!(!printed.contains("topsecret"));
    }
}
