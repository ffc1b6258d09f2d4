use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::debug;

use crate::{
    api::models::*,
    auth::UserDirectory,
    config::Settings,
    db::{models::Recipe, DbPool},
    recipes::{RecipeService, ReindexSummary},
    search::{
        CredentialResolver, EnvCredentials, IndexManager, SearchBackend, SearchClientFactory,
        SearchOutcome, SearchService,
    },
    secrets, Error, Result,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub recipes: Arc<RecipeService>,
    pub users: Arc<UserDirectory>,
    pub settings: Settings,
}

impl AppState {
    /// Wire the services from configuration. The search client itself is
    /// only built on first use.
    pub fn from_settings(settings: Settings, pool: DbPool) -> Result<Self> {
        let secret_store = secrets::from_config(&settings.secrets)?;

        let resolver = CredentialResolver::new(
            secret_store.clone(),
            settings.secrets.search_secret_name.clone(),
            EnvCredentials::from(&settings.search),
        );
        let factory = Arc::new(SearchClientFactory::new(settings.search.clone(), resolver));

        let users = Arc::new(UserDirectory::new(
            secret_store,
            settings.secrets.auth_secret_name.clone(),
            settings.auth.clone(),
        ));

        Ok(Self::assemble(settings, pool, factory, users))
    }

    /// State around an already constructed search backend
    pub fn with_search_backend(
        settings: Settings,
        pool: DbPool,
        backend: Arc<dyn SearchBackend>,
        users: UserDirectory,
    ) -> Self {
        let factory = Arc::new(SearchClientFactory::with_client(
            settings.search.clone(),
            backend,
        ));
        Self::assemble(settings, pool, factory, Arc::new(users))
    }

    fn assemble(
        settings: Settings,
        pool: DbPool,
        factory: Arc<SearchClientFactory>,
        users: Arc<UserDirectory>,
    ) -> Self {
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
        let recipes = Arc::new(RecipeService::new(
            pool,
            search,
            settings.pagination.clone(),
        ));

        Self {
            recipes,
            users,
            settings,
        }
    }
}

/// Unknown or non-numeric ids are both "not found"
fn parse_id(id: &str) -> Result<i64> {
    id.parse()
        .map_err(|_| Error::NotFound("Recipe not found".to_string()))
}

fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(value)| value).map_err(|rejection| {
        debug!("Rejected request body: {}", rejection.body_text());
        Error::Validation("Invalid JSON body".to_string())
    })
}

/// GET / - Liveness text
pub async fn root() -> &'static str {
    "Connected"
}

/// GET /health - Health check
pub async fn health_check() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// GET /recipes - Newest recipes first
pub async fn list_recipes(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<RecipeList>> {
    debug!("List recipes request: {:?}", params);
    let items = state.recipes.list(params.limit).await?;
    Ok(Json(RecipeList { items }))
}

/// GET /recipes/search - Full-text search, degrading to a plain listing
pub async fn search_recipes(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchOutcome>> {
    debug!("Search request: {:?}", params);

    let outcome = state
        .recipes
        .search(&params.q, &params.ingredients, params.limit)
        .await?;
    Ok(Json(outcome))
}

/// POST /recipes - Create a recipe
pub async fn create_recipe(
    State(state): State<AppState>,
    body: std::result::Result<Json<CreateRecipeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Recipe>)> {
    let request = json_body(body)?;
    let recipe = state.recipes.create(request.into()).await?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

/// GET /recipes/:id - Get one recipe
pub async fn get_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Recipe>> {
    debug!("Get recipe request: {}", id);
    let id = parse_id(&id)?;
    Ok(Json(state.recipes.get(id).await?))
}

/// PUT /recipes/:id - Partial update
pub async fn update_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: std::result::Result<Json<UpdateRecipeRequest>, JsonRejection>,
) -> Result<Json<Recipe>> {
    let id = parse_id(&id)?;
    let request = json_body(body)?;
    Ok(Json(state.recipes.update(id, request.into()).await?))
}

/// DELETE /recipes/:id - Delete a recipe
pub async fn delete_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let id = parse_id(&id)?;
    state.recipes.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /recipes/reindex - Rebuild the search index from the store
pub async fn reindex_recipes(State(state): State<AppState>) -> Result<Json<ReindexSummary>> {
    Ok(Json(state.recipes.reindex().await?))
}
