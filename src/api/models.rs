use crate::db::models::{NewRecipe, Recipe, RecipePatch};
use serde::{Deserialize, Serialize};

/// GET /recipes query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
}

/// GET /recipes/search query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub ingredients: String,
    pub limit: Option<i64>,
}

/// POST /recipes body. `title` is optional here so a missing title gets the
/// same validation message as a blank one.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRecipeRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
}

impl From<CreateRecipeRequest> for NewRecipe {
    fn from(request: CreateRecipeRequest) -> Self {
        NewRecipe {
            title: request.title.unwrap_or_default(),
            ingredients: request.ingredients,
            steps: request.steps,
        }
    }
}

/// PUT /recipes/:id body; any other fields (id, timestamps) are ignored
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRecipeRequest {
    pub title: Option<String>,
    pub ingredients: Option<Vec<String>>,
    pub steps: Option<Vec<String>>,
}

impl From<UpdateRecipeRequest> for RecipePatch {
    fn from(request: UpdateRecipeRequest) -> Self {
        RecipePatch {
            title: request.title,
            ingredients: request.ingredients,
            steps: request.steps,
        }
    }
}

/// GET /recipes response
#[derive(Debug, Clone, Serialize)]
pub struct RecipeList {
    pub items: Vec<Recipe>,
}
