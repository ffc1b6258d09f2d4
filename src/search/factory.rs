use crate::config::{SearchBackendKind, SearchConfig};
use crate::search::{
    backend::SearchBackend, credentials::CredentialResolver, elasticsearch::ElasticsearchClient,
    embedded::EmbeddedIndex,
};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info};

/// Lazily builds the process-wide search client.
///
/// At most one client is ever stored; concurrent first callers wait on the
/// same construction. A failed construction is not cached, so a later call
/// tries again.
pub struct SearchClientFactory {
    config: SearchConfig,
    resolver: CredentialResolver,
    client: OnceCell<Arc<dyn SearchBackend>>,
}

impl SearchClientFactory {
    pub fn new(config: SearchConfig, resolver: CredentialResolver) -> Self {
        Self {
            config,
            resolver,
            client: OnceCell::new(),
        }
    }

    /// Factory that always hands out `client`
    pub fn with_client(config: SearchConfig, client: Arc<dyn SearchBackend>) -> Self {
        Self {
            config,
            resolver: CredentialResolver::env_only(Default::default()),
            client: OnceCell::new_with(Some(client)),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.config.index_name
    }

    pub async fn get_client(&self) -> Result<Arc<dyn SearchBackend>> {
        self.client
            .get_or_try_init(|| self.build())
            .await
            .cloned()
    }

    async fn build(&self) -> Result<Arc<dyn SearchBackend>> {
        let client: Arc<dyn SearchBackend> = match self.config.backend {
            SearchBackendKind::Elasticsearch => {
                let credentials = self.resolver.resolve().await;
                let client =
                    ElasticsearchClient::new(&self.config.url, &credentials, self.config.timeout())
                        .map_err(|e| {
                            error!("Failed to create search client: {}", e.log_safe());
                            e
                        })?;
                info!(
                    "Search client created for {} using {} authentication",
                    self.config.url,
                    client.auth_mode()
                );
                Arc::new(client)
            }
            SearchBackendKind::Embedded => {
                let index = EmbeddedIndex::new(self.config.index_path.clone())
                    .map_err(|e| Error::ClientInit(e.log_safe()))?;
                Arc::new(index)
            }
        };

        Ok(client)
    }
}
