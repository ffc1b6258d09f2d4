use crate::search::document::{IndexMapping, SearchDocument, SearchHits, SearchRequest};
use crate::Result;
use async_trait::async_trait;

/// Operations the search subsystem needs from a full-text backend.
///
/// Every call is bounded by the backend's own timeout. Creating an index that
/// already exists, and deleting a document or index that does not, succeed.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Short name for logs
    fn kind(&self) -> &'static str;

    /// Connectivity check
    async fn ping(&self) -> Result<bool>;

    async fn index_exists(&self, index: &str) -> Result<bool>;

    async fn create_index(&self, index: &str, mapping: &IndexMapping) -> Result<()>;

    async fn delete_index(&self, index: &str) -> Result<()>;

    /// Insert or replace the document stored under `id`
    async fn upsert_document(&self, index: &str, id: &str, doc: &SearchDocument) -> Result<()>;

    async fn delete_document(&self, index: &str, id: &str) -> Result<()>;

    async fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchHits>;
}
