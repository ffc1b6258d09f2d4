// Search subsystem: credential resolution, client construction, index
// lifecycle, query building and the degrade-to-listing orchestration.

pub mod backend;
pub mod credentials;
pub mod document;
pub mod elasticsearch;
pub mod embedded;
pub mod factory;
pub mod lifecycle;
pub mod query;
pub mod service;

// Re-exports
pub use backend::SearchBackend;
pub use credentials::{CredentialResolver, Credentials, EnvCredentials};
pub use document::{IndexMapping, SearchDocument, SearchHit, SearchHits, SearchRequest, SortKey};
pub use elasticsearch::ElasticsearchClient;
pub use embedded::EmbeddedIndex;
pub use factory::SearchClientFactory;
pub use lifecycle::IndexManager;
pub use query::StructuredQuery;
pub use service::{BestEffort, ResultSource, SearchOutcome, SearchService};
