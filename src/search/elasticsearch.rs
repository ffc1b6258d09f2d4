use crate::search::{
    backend::SearchBackend,
    credentials::Credentials,
    document::{IndexMapping, SearchDocument, SearchHit, SearchHits, SearchRequest},
};
use crate::{Error, Result};
use async_trait::async_trait;
use opensearch::{
    auth::Credentials as TransportCredentials,
    http::{
        headers::{HeaderValue, AUTHORIZATION},
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
        StatusCode, Url,
    },
    indices::{IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts},
    DeleteParts, IndexParts, OpenSearch, SearchParts,
};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

/// Elasticsearch client over the `opensearch` transport
#[derive(Clone)]
pub struct ElasticsearchClient {
    client: OpenSearch,
    auth_mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct EsSearchResponse {
    hits: EsHits,
}

#[derive(Debug, Deserialize)]
struct EsHits {
    total: Option<EsTotal>,
    #[serde(default)]
    hits: Vec<EsHit>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EsTotal {
    Object { value: u64 },
    Count(u64),
}

#[derive(Debug, Deserialize)]
struct EsHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score")]
    score: Option<f32>,
    #[serde(rename = "_source")]
    source: SearchDocument,
}

fn with_credentials(
    builder: TransportBuilder,
    credentials: &Credentials,
) -> Result<TransportBuilder> {
    let builder = match credentials {
        Credentials::None => builder,
        Credentials::ApiKeyPair { id, key } => {
            builder.auth(TransportCredentials::ApiKey(id.clone(), key.clone()))
        }
        Credentials::ApiKeySingle { key } => {
            // Already encoded, sent as is
            let mut value = HeaderValue::from_str(&format!("ApiKey {key}")).map_err(|_| {
                Error::ClientInit("API key contains invalid header characters".to_string())
            })?;
            value.set_sensitive(true);
            builder.header(AUTHORIZATION, value)
        }
        Credentials::BasicAuth { username, password } => {
            builder.auth(TransportCredentials::Basic(username.clone(), password.clone()))
        }
    };
    Ok(builder)
}

impl ElasticsearchClient {
    /// Create a client for `url` using exactly one authentication mode
    pub fn new(url: &str, credentials: &Credentials, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::ClientInit(format!("Invalid search backend URL {url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::ClientInit(format!(
                "Unsupported search backend URL scheme: {}",
                parsed.scheme()
            )));
        }
        let host = parsed.host_str().unwrap_or("unknown host").to_string();

        let builder = TransportBuilder::new(SingleNodeConnectionPool::new(parsed))
            .timeout(timeout)
            .disable_proxy();
        let transport = with_credentials(builder, credentials)?
            .build()
            .map_err(|e| Error::ClientInit(format!("Failed to create search transport: {e}")))?;

        info!(
            "Initialized Elasticsearch client for {} with {} authentication",
            host,
            credentials.mode()
        );

        Ok(Self {
            client: OpenSearch::new(transport),
            auth_mode: credentials.mode(),
        })
    }

    pub fn auth_mode(&self) -> &'static str {
        self.auth_mode
    }

    /// Turn a non-success response into a search error carrying the backend's reason
    async fn error_from(response: Response, action: &str) -> Error {
        let status = response.status_code();
        let reason = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| {
                body["error"]["reason"]
                    .as_str()
                    .map(str::to_string)
                    .or_else(|| body["error"].as_str().map(str::to_string))
            })
            .unwrap_or_else(|| "Unknown error".to_string());
        error!("Elasticsearch {} failed: {} - {}", action, status, reason);
        Error::Search(format!("{action} failed with HTTP {status}: {reason}"))
    }
}

#[async_trait]
impl SearchBackend for ElasticsearchClient {
    fn kind(&self) -> &'static str {
        "elasticsearch"
    }

    async fn ping(&self) -> Result<bool> {
        let response = self
            .client
            .ping()
            .send()
            .await
            .map_err(Error::from_search_transport)?;

        debug!("Elasticsearch ping status: {}", response.status_code());
        Ok(response.status_code().is_success())
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(Error::from_search_transport)?;

        match response.status_code() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(Self::error_from(response, "index existence check").await),
        }
    }

    async fn create_index(&self, index: &str, mapping: &IndexMapping) -> Result<()> {
        info!("Creating index: {}", index);

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(mapping.to_json())
            .send()
            .await
            .map_err(Error::from_search_transport)?;

        let status = response.status_code();
        if status.is_success() {
            return Ok(());
        }

        if status == StatusCode::BAD_REQUEST {
            let body: Value = response
                .json()
                .await
                .map_err(Error::from_search_transport)?;
            if body["error"]["type"].as_str() == Some("resource_already_exists_exception") {
                debug!("Index {} already exists", index);
                return Ok(());
            }
            let reason = body["error"]["reason"].as_str().unwrap_or("Unknown error");
            return Err(Error::Search(format!("index creation failed: {reason}")));
        }

        Err(Self::error_from(response, "index creation").await)
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        info!("Deleting index: {}", index);

        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[index]))
            .send()
            .await
            .map_err(Error::from_search_transport)?;

        match response.status_code() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            _ => Err(Self::error_from(response, "index deletion").await),
        }
    }

    async fn upsert_document(&self, index: &str, id: &str, doc: &SearchDocument) -> Result<()> {
        let response = self
            .client
            .index(IndexParts::IndexId(index, id))
            .body(doc)
            .send()
            .await
            .map_err(Error::from_search_transport)?;

        if !response.status_code().is_success() {
            return Err(Self::error_from(response, "document indexing").await);
        }

        debug!("Indexed document {} in {}", id, index);
        Ok(())
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(DeleteParts::IndexId(index, id))
            .send()
            .await
            .map_err(Error::from_search_transport)?;

        match response.status_code() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => {
                debug!("Removed document {} from {}", id, index);
                Ok(())
            }
            _ => Err(Self::error_from(response, "document deletion").await),
        }
    }

    async fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchHits> {
        let body = request.to_json();
        debug!("Executing search with query: {}", body["query"]);

        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .body(body)
            .send()
            .await
            .map_err(Error::from_search_transport)?;

        if !response.status_code().is_success() {
            return Err(Self::error_from(response, "search").await);
        }

        let parsed: EsSearchResponse = response
            .json()
            .await
            .map_err(|e| Error::Search(format!("Failed to parse search response: {e}")))?;

        let hits: Vec<SearchHit> = parsed
            .hits
            .hits
            .into_iter()
            .map(|hit| SearchHit {
                id: hit.id,
                score: hit.score,
                source: hit.source,
            })
            .collect();

        let total = match parsed.hits.total {
            Some(EsTotal::Object { value }) | Some(EsTotal::Count(value)) => value,
            None => hits.len() as u64,
        };

        Ok(SearchHits { total, hits })
    }
}
