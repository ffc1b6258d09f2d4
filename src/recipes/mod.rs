// Recipe CRUD on top of the document store, with index side effects

use crate::config::PaginationConfig;
use crate::db::{
    self,
    models::{NewRecipe, Recipe, RecipePatch},
    DbPool,
};
use crate::search::{SearchOutcome, SearchService};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

const TITLE_REQUIRED: &str = "'title' is required and cannot be empty";
const NOTHING_TO_UPDATE: &str = "Nothing to update";
const NOT_FOUND: &str = "Recipe not found";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReindexSummary {
    pub message: String,
    pub count: usize,
}

/// The store is the system of record: its errors always propagate, while
/// index updates after a committed write are only logged.
pub struct RecipeService {
    pool: DbPool,
    search: Arc<SearchService>,
    pagination: PaginationConfig,
}

fn normalize_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::Validation(TITLE_REQUIRED.to_string()));
    }
    Ok(title.to_string())
}

impl RecipeService {
    pub fn new(pool: DbPool, search: Arc<SearchService>, pagination: PaginationConfig) -> Self {
        Self {
            pool,
            search,
            pagination,
        }
    }

    pub fn search_service(&self) -> &Arc<SearchService> {
        &self.search
    }

    pub async fn list(&self, limit: Option<i64>) -> Result<Vec<Recipe>> {
        let limit = self.pagination.resolve_limit(limit);
        db::recipes::list_recipes(&self.pool, limit as i64).await
    }

    pub async fn get(&self, id: i64) -> Result<Recipe> {
        db::recipes::get_recipe(&self.pool, id)
            .await?
            .ok_or_else(|| Error::NotFound(NOT_FOUND.to_string()))
    }

    pub async fn create(&self, input: NewRecipe) -> Result<Recipe> {
        let input = NewRecipe {
            title: normalize_title(&input.title)?,
            ..input
        };

        let recipe = db::recipes::create_recipe(&self.pool, &input).await?;
        info!("Created recipe {}", recipe.id);

        self.search.index_recipe(&recipe).await.log();
        Ok(recipe)
    }

    pub async fn update(&self, id: i64, patch: RecipePatch) -> Result<Recipe> {
        if patch.is_empty() {
            return Err(Error::Validation(NOTHING_TO_UPDATE.to_string()));
        }

        let patch = RecipePatch {
            title: patch.title.as_deref().map(normalize_title).transpose()?,
            ..patch
        };

        let recipe = db::recipes::update_recipe(&self.pool, id, &patch)
            .await?
            .ok_or_else(|| Error::NotFound(NOT_FOUND.to_string()))?;
        info!("Updated recipe {}", recipe.id);

        self.search.index_recipe(&recipe).await.log();
        Ok(recipe)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        if !db::recipes::delete_recipe(&self.pool, id).await? {
            return Err(Error::NotFound(NOT_FOUND.to_string()));
        }
        info!("Deleted recipe {}", id);

        self.search.remove_recipe(id).await.log();
        Ok(())
    }

    pub async fn search(
        &self,
        q: &str,
        ingredients: &str,
        limit: Option<i64>,
    ) -> Result<SearchOutcome> {
        let limit = limit.unwrap_or(self.pagination.default_limit as i64);
        self.search.search(q, ingredients, limit).await
    }

    pub async fn reindex(&self) -> Result<ReindexSummary> {
        let count = self.search.reindex_all().await?;
        Ok(ReindexSummary {
            message: format!("Reindexed {count} recipes"),
            count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::search::{EmbeddedIndex, IndexManager, SearchClientFactory};

    async fn service() -> RecipeService {
        let pool = db::init_memory_pool().await.unwrap();
        db::run_migrations(&pool).await.unwrap();

        let settings = Settings::for_local();
        let factory = Arc::new(SearchClientFactory::with_client(
            settings.search.clone(),
            Arc::new(EmbeddedIndex::in_memory()),
        ));
        let index = Arc::new(IndexManager::new(
            factory.clone(),
            pool.clone(),
            settings.search.index_check_ttl(),
        ));
        let search = Arc::new(SearchService::new(
            factory,
            index,
            pool.clone(),
            settings.pagination.clone(),
        ));
        RecipeService::new(pool, search, settings.pagination)
    }

    fn new_recipe(title: &str) -> NewRecipe {
        NewRecipe {
            title: title.to_string(),
            ingredients: vec!["tomato".to_string()],
            steps: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_trims_title_and_sets_timestamps() {
        let service = service().await;
        let recipe = service.create(new_recipe("  Tomato Soup ")).await.unwrap();
        assert_eq!(recipe.title, "Tomato Soup");
        assert_eq!(recipe.created_at, recipe.updated_at);
        assert!(recipe.score.is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_blank_title() {
        let service = service().await;
        let err = service.create(new_recipe("   ")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(msg) if msg == TITLE_REQUIRED));
    }

    #[tokio::test]
    async fn test_update_rules() {
        let service = service().await;
        let recipe = service.create(new_recipe("Soup")).await.unwrap();

        let err = service
            .update(recipe.id, RecipePatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(msg) if msg == NOTHING_TO_UPDATE));

        let blank = RecipePatch {
            title: Some(" ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service.update(recipe.id, blank).await.unwrap_err(),
            Error::Validation(_)
        ));

        let steps = RecipePatch {
            steps: Some(vec!["simmer".to_string()]),
            ..Default::default()
        };
        let updated = service.update(recipe.id, steps).await.unwrap();
        assert_eq!(updated.title, "Soup");
        assert_eq!(updated.steps, vec!["simmer"]);
        assert!(updated.updated_at >= updated.created_at);

        let missing = RecipePatch {
            title: Some("Stew".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service.update(9999, missing).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let service = service().await;
        let recipe = service.create(new_recipe("Soup")).await.unwrap();

        service.delete(recipe.id).await.unwrap();
        assert!(matches!(
            service.get(recipe.id).await.unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(matches!(
            service.delete(recipe.id).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_writes_are_visible_to_search() {
        let service = service().await;
        let soup = service.create(new_recipe("Tomato Soup")).await.unwrap();
        service.create(new_recipe("Pancakes")).await.unwrap();

        let outcome = service.search("soup", "", None).await.unwrap();
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].id, soup.id);

        service.delete(soup.id).await.unwrap();
        let outcome = service.search("soup", "", None).await.unwrap();
        assert!(outcome.items.is_empty());
    }

    #[tokio::test]
    async fn test_reindex_summary() {
        let service = service().await;
        service.create(new_recipe("One")).await.unwrap();
        service.create(new_recipe("Two")).await.unwrap();

        let summary = service.reindex().await.unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.message, "Reindexed 2 recipes");
    }
}
