use crate::config::PaginationConfig;
use crate::db::{self, models::Recipe, DbPool};
use crate::search::{
    backend::SearchBackend,
    document::{SearchDocument, SearchHits, SearchRequest},
    factory::SearchClientFactory,
    lifecycle::IndexManager,
    query,
};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub const UNAVAILABLE_MESSAGE: &str = "Search service unavailable";
pub const FALLBACK_MESSAGE: &str = "Using basic listing";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Search,
    Fallback,
}

/// Search response; `error` and `fallback` are only set when degraded
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub items: Vec<Recipe>,
    pub total: u64,
    pub query: String,
    pub ingredients_filter: String,
    pub source: ResultSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

impl SearchOutcome {
    pub fn is_degraded(&self) -> bool {
        self.source == ResultSource::Fallback
    }
}

/// Outcome of an index side effect that follows a committed store write.
/// It never fails the write; callers log it and move on.
#[must_use = "index side effects must be logged"]
#[derive(Debug)]
pub struct BestEffort {
    operation: &'static str,
    recipe_id: i64,
    result: Result<()>,
}

impl BestEffort {
    fn new(operation: &'static str, recipe_id: i64, result: Result<()>) -> Self {
        Self {
            operation,
            recipe_id,
            result,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn log(self) {
        match self.result {
            Ok(()) => debug!("{} recipe {} in search index", self.operation, self.recipe_id),
            Err(e) => warn!(
                "Search index {} failed for recipe {}: {}",
                self.operation.to_lowercase(),
                self.recipe_id,
                e.log_safe()
            ),
        }
    }
}

/// Runs searches against the index and degrades to a plain store listing
/// whenever any stage of the search path fails.
pub struct SearchService {
    factory: Arc<SearchClientFactory>,
    index: Arc<IndexManager>,
    pool: DbPool,
    pagination: PaginationConfig,
}

impl SearchService {
    pub fn new(
        factory: Arc<SearchClientFactory>,
        index: Arc<IndexManager>,
        pool: DbPool,
        pagination: PaginationConfig,
    ) -> Self {
        Self {
            factory,
            index,
            pool,
            pagination,
        }
    }

    pub fn index_manager(&self) -> &Arc<IndexManager> {
        &self.index
    }

    /// Search by free text and ingredient filter. Only store failures are
    /// returned as errors; search failures produce a fallback listing.
    pub async fn search(&self, q: &str, ingredients: &str, limit: i64) -> Result<SearchOutcome> {
        let limit = self.pagination.clamp_limit(limit);

        match self.try_search(q, ingredients, limit).await {
            Ok(hits) => {
                let (items, total) = to_recipes(hits);
                Ok(SearchOutcome {
                    items,
                    total,
                    query: q.to_string(),
                    ingredients_filter: ingredients.to_string(),
                    source: ResultSource::Search,
                    error: None,
                    fallback: None,
                })
            }
            Err(e) => {
                warn!("Search degraded to listing: {}", e.log_safe());
                self.fallback(q, ingredients, limit).await
            }
        }
    }

    async fn try_search(&self, q: &str, ingredients: &str, limit: usize) -> Result<SearchHits> {
        let client = self.factory.get_client().await?;

        if !self.index.is_available().await {
            return Err(Error::IndexUnavailable(format!(
                "{} backend did not answer ping",
                client.kind()
            )));
        }

        self.index.ensure_index_after_ping(&client).await?;

        let request = SearchRequest::new(query::build(q, ingredients), limit);
        match client.search(self.index.index_name(), &request).await {
            Ok(hits) => Ok(hits),
            Err(e) => {
                // Index may have gone away since the last existence check
                self.index.invalidate().await;
                Err(e)
            }
        }
    }

    async fn fallback(&self, q: &str, ingredients: &str, limit: usize) -> Result<SearchOutcome> {
        let items = db::recipes::list_recipes(&self.pool, limit as i64).await?;

        Ok(SearchOutcome {
            total: items.len() as u64,
            items,
            query: q.to_string(),
            ingredients_filter: ingredients.to_string(),
            source: ResultSource::Fallback,
            error: Some(UNAVAILABLE_MESSAGE.to_string()),
            fallback: Some(FALLBACK_MESSAGE.to_string()),
        })
    }

    /// Index or replace one recipe's document
    pub async fn index_recipe(&self, recipe: &Recipe) -> BestEffort {
        let result = async {
            let client = self.factory.get_client().await?;
            self.index.ensure_index_on(&client).await?;
            client
                .upsert_document(
                    self.index.index_name(),
                    &recipe.id.to_string(),
                    &SearchDocument::from(recipe),
                )
                .await
        }
        .await;

        BestEffort::new("Indexed", recipe.id, result)
    }

    /// Drop one recipe's document
    pub async fn remove_recipe(&self, recipe_id: i64) -> BestEffort {
        let result = async {
            let client: Arc<dyn SearchBackend> = self.factory.get_client().await?;
            client
                .delete_document(self.index.index_name(), &recipe_id.to_string())
                .await
        }
        .await;

        BestEffort::new("Removed", recipe_id, result)
    }

    /// Full backfill; failures are reported, not degraded
    pub async fn reindex_all(&self) -> Result<usize> {
        self.index.reindex_all().await.map_err(|e| {
            error!("Reindex failed: {}", e.log_safe());
            e
        })
    }
}

/// Recipes from hits, with `total` reduced by any hit that had to be skipped
fn to_recipes(hits: SearchHits) -> (Vec<Recipe>, u64) {
    let mut skipped = 0u64;
    let items = hits
        .hits
        .into_iter()
        .filter_map(|hit| match hit.id.parse::<i64>() {
            Ok(id) => Some(hit.source.into_recipe(id, hit.score.unwrap_or_default())),
            Err(_) => {
                warn!("Skipping search hit with non-numeric id {}", hit.id);
                skipped += 1;
                None
            }
        })
        .collect();

    (items, hits.total.saturating_sub(skipped))
}
