use crate::db::{models::*, DbPool};
use crate::error::{Error, Result};
use chrono::Utc;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use sqlx::types::Json;

/// Create a new recipe. The store assigns the id and both timestamps.
pub async fn create_recipe(pool: &DbPool, new_recipe: &NewRecipe) -> Result<Recipe> {
    let now = Utc::now();

    let row = sqlx::query_as::<_, RecipeRow>(
        r#"
        INSERT INTO recipes (title, ingredients, steps, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&new_recipe.title)
    .bind(Json(&new_recipe.ingredients))
    .bind(Json(&new_recipe.steps))
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

/// Get recipe by ID
pub async fn get_recipe(pool: &DbPool, recipe_id: i64) -> Result<Option<Recipe>> {
    let row = sqlx::query_as::<_, RecipeRow>("SELECT * FROM recipes WHERE id = ?")
        .bind(recipe_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(Recipe::from))
}

/// List the newest recipes first
pub async fn list_recipes(pool: &DbPool, limit: i64) -> Result<Vec<Recipe>> {
    let rows = sqlx::query_as::<_, RecipeRow>(
        "SELECT * FROM recipes ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Recipe::from).collect())
}

/// Apply a partial update. Returns `None` when the recipe does not exist.
pub async fn update_recipe(
    pool: &DbPool,
    recipe_id: i64,
    patch: &RecipePatch,
) -> Result<Option<Recipe>> {
    let Some(existing) = get_recipe(pool, recipe_id).await? else {
        return Ok(None);
    };

    let title = patch.title.as_ref().unwrap_or(&existing.title);
    let ingredients = patch.ingredients.as_ref().unwrap_or(&existing.ingredients);
    let steps = patch.steps.as_ref().unwrap_or(&existing.steps);
    // updated_at never precedes created_at, even across clock adjustments
    let now = Utc::now().max(existing.created_at);

    let row = sqlx::query_as::<_, RecipeRow>(
        r#"
        UPDATE recipes
        SET title = ?, ingredients = ?, steps = ?, updated_at = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(title)
    .bind(Json(ingredients))
    .bind(Json(steps))
    .bind(now)
    .bind(recipe_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Recipe::from))
}

/// Delete recipe. Returns whether a row was removed.
pub async fn delete_recipe(pool: &DbPool, recipe_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM recipes WHERE id = ?")
        .bind(recipe_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Stream every recipe in the collection, oldest id first
pub fn stream_recipes(pool: &DbPool) -> BoxStream<'_, Result<Recipe>> {
    sqlx::query_as::<_, RecipeRow>("SELECT * FROM recipes ORDER BY id")
        .fetch(pool)
        .map_ok(Recipe::from)
        .map_err(Error::from)
        .boxed()
}

/// Count all recipes
pub async fn count_recipes(pool: &DbPool) -> Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes")
        .fetch_one(pool)
        .await?;
    Ok(count.0)
}
