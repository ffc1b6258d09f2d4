use crate::db::{self, DbPool};
use crate::search::{
    backend::SearchBackend,
    document::{IndexMapping, SearchDocument, SearchRequest},
    factory::SearchClientFactory,
};
use crate::{Error, Result};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Upper bound on documents inspected by one orphan sweep
const ORPHAN_SWEEP_LIMIT: usize = 10_000;

/// Guarantees the recipe index exists before it is used.
///
/// Existence is checked against the backend at most once per `ttl`; a failed
/// search calls [`IndexManager::invalidate`] so the next request checks again.
/// Creation and backfill run under one lock, so concurrent callers never
/// create the index twice.
pub struct IndexManager {
    factory: Arc<SearchClientFactory>,
    pool: DbPool,
    index_name: String,
    ttl: Duration,
    verified_at: Mutex<Option<Instant>>,
}

impl IndexManager {
    pub fn new(factory: Arc<SearchClientFactory>, pool: DbPool, ttl: Duration) -> Self {
        let index_name = factory.index_name().to_string();
        Self {
            factory,
            pool,
            index_name,
            ttl,
            verified_at: Mutex::new(None),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// True when a client can be built and the backend answers a ping
    pub async fn is_available(&self) -> bool {
        let client = match self.factory.get_client().await {
            Ok(client) => client,
            Err(e) => {
                warn!("Search client unavailable: {}", e.log_safe());
                return false;
            }
        };

        match client.ping().await {
            Ok(true) => true,
            Ok(false) => {
                warn!("Search backend ping failed");
                false
            }
            Err(e) => {
                warn!("Search backend ping error: {}", e.log_safe());
                false
            }
        }
    }

    /// Make sure the index exists, creating and backfilling it when missing
    pub async fn ensure_index(&self) -> Result<()> {
        let client = self.factory.get_client().await?;
        self.ensure_index_on(&client).await
    }

    /// [`IndexManager::ensure_index`] against an already obtained client
    pub async fn ensure_index_on(&self, client: &Arc<dyn SearchBackend>) -> Result<()> {
        self.ensure(client, true).await
    }

    /// Same as [`IndexManager::ensure_index_on`] for callers that have just
    /// pinged the backend themselves
    pub async fn ensure_index_after_ping(&self, client: &Arc<dyn SearchBackend>) -> Result<()> {
        self.ensure(client, false).await
    }

    async fn ensure(&self, client: &Arc<dyn SearchBackend>, ping: bool) -> Result<()> {
        let mut verified_at = self.verified_at.lock().await;
        if let Some(at) = *verified_at {
            if at.elapsed() < self.ttl {
                return Ok(());
            }
        }

        if ping && !client.ping().await.unwrap_or(false) {
            return Err(Error::IndexUnavailable(format!(
                "{} backend is not reachable",
                client.kind()
            )));
        }

        if !client.index_exists(&self.index_name).await? {
            info!("Index {} missing, creating it", self.index_name);
            client
                .create_index(&self.index_name, &IndexMapping::recipes())
                .await?;

            let indexed = self.backfill(client).await?;
            info!(
                "Created index {} and indexed {} existing recipes",
                self.index_name, indexed
            );
        }

        *verified_at = Some(Instant::now());
        Ok(())
    }

    /// Forget the last successful existence check
    pub async fn invalidate(&self) {
        *self.verified_at.lock().await = None;
    }

    /// Create the index if needed, index every stored recipe and drop
    /// documents whose recipe no longer exists. Returns the number indexed.
    pub async fn reindex_all(&self) -> Result<usize> {
        let client = self.factory.get_client().await?;
        self.invalidate().await;
        self.ensure_index_on(&client).await?;

        let indexed = self.backfill(&client).await?;
        let removed = self.sweep_orphans(&client).await?;

        info!(
            "Reindexed {} recipes into {} ({} orphans removed)",
            indexed, self.index_name, removed
        );
        Ok(indexed)
    }

    /// Stream every stored recipe into the index. Stops at the first failure.
    async fn backfill(&self, client: &Arc<dyn SearchBackend>) -> Result<usize> {
        let mut recipes = db::recipes::stream_recipes(&self.pool);
        let mut count = 0;

        while let Some(recipe) = recipes.next().await {
            let recipe = recipe?;
            client
                .upsert_document(
                    &self.index_name,
                    &recipe.id.to_string(),
                    &SearchDocument::from(&recipe),
                )
                .await
                .map_err(|e| {
                    error!("Failed to index recipe {}: {}", recipe.id, e.log_safe());
                    e
                })?;
            count += 1;
        }

        debug!("Backfilled {} recipes into {}", count, self.index_name);
        Ok(count)
    }

    async fn sweep_orphans(&self, client: &Arc<dyn SearchBackend>) -> Result<usize> {
        let stored: HashSet<String> = {
            let mut ids = HashSet::new();
            let mut recipes = db::recipes::stream_recipes(&self.pool);
            while let Some(recipe) = recipes.next().await {
                ids.insert(recipe?.id.to_string());
            }
            ids
        };

        let indexed = client
            .search(&self.index_name, &SearchRequest::match_all(ORPHAN_SWEEP_LIMIT))
            .await?;
        if indexed.total as usize > ORPHAN_SWEEP_LIMIT {
            warn!(
                "Index {} holds {} documents, orphan sweep only inspects {}",
                self.index_name, indexed.total, ORPHAN_SWEEP_LIMIT
            );
        }

        let mut removed = 0;
        for hit in indexed.hits.iter().filter(|hit| !stored.contains(&hit.id)) {
            // Recipes created after the snapshot are live, not orphans
            if self.is_stored(&hit.id).await? {
                debug!("Keeping document {} created during the sweep", hit.id);
                continue;
            }
            client.delete_document(&self.index_name, &hit.id).await?;
            removed += 1;
        }

        Ok(removed)
    }

    async fn is_stored(&self, doc_id: &str) -> Result<bool> {
        match doc_id.parse::<i64>() {
            Ok(id) => Ok(db::recipes::get_recipe(&self.pool, id).await?.is_some()),
            Err(_) => Ok(false),
        }
    }
}
