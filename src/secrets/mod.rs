// Secret store access for credentials that must not live in the environment

use crate::config::SecretsConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Fetch-latest-version access to named secrets
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Latest payload of `name`, or `None` when the secret does not exist
    async fn access_latest(&self, name: &str) -> Result<Option<Vec<u8>>>;
}

/// Build the configured secret store. Without a project there is nothing to query.
pub fn from_config(config: &SecretsConfig) -> Result<Option<Arc<dyn SecretStore>>> {
    match &config.project {
        Some(project) => {
            let store = GcpSecretManager::new(
                project.clone(),
                config.api_base_url.clone(),
                config.token_url.clone(),
            )?;
            Ok(Some(Arc::new(store)))
        }
        None => Ok(None),
    }
}

/// Google Cloud Secret Manager over its REST API.
///
/// Access tokens come from the instance metadata server, which is what Cloud Run
/// and GCE workloads expose to the default service account.
#[derive(Clone)]
pub struct GcpSecretManager {
    client: Client,
    project: String,
    api_base_url: String,
    token_url: String,
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct AccessSecretVersionResponse {
    payload: SecretPayload,
}

#[derive(Debug, Deserialize)]
struct SecretPayload {
    data: String,
}

impl GcpSecretManager {
    pub fn new(project: String, api_base_url: String, token_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::SecretStore(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            project,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            token_url,
        })
    }

    async fn access_token(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.token_url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| Error::SecretStore(format!("Token request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::SecretStore(format!(
                "Token request returned HTTP {}",
                response.status()
            )));
        }

        let token: AccessToken = response
            .json()
            .await
            .map_err(|e| Error::SecretStore(format!("Invalid token response: {e}")))?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl SecretStore for GcpSecretManager {
    async fn access_latest(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/v1/projects/{}/secrets/{}/versions/latest:access",
            self.api_base_url, self.project, name
        );
        debug!("Secret store request: GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await
            .map_err(|e| Error::SecretStore(format!("Secret request failed: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => {
                return Err(Error::SecretStore(format!(
                    "Secret request returned HTTP {status}"
                )));
            }
            _ => {}
        }

        let body: AccessSecretVersionResponse = response
            .json()
            .await
            .map_err(|e| Error::SecretStore(format!("Invalid secret response: {e}")))?;

        let data = STANDARD
            .decode(body.payload.data.as_bytes())
            .map_err(|e| Error::SecretStore(format!("Secret payload is not base64: {e}")))?;
        Ok(Some(data))
    }
}

/// In-process secret store, for local runs and tests
#[derive(Debug, Clone, Default)]
pub struct MemorySecretStore {
    secrets: HashMap<String, Vec<u8>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn access_latest(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.secrets.get(name).cloned())
    }
}
