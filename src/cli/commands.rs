use crate::api::handlers::AppState;
use crate::config::Settings;
use crate::db;
use crate::search::SearchOutcome;
use crate::Result;
use tracing::info;

/// Open the store, migrate it and wire the services
async fn local_state(settings: Settings) -> Result<AppState> {
    let pool = db::init_pool_with_config(&settings.database).await?;
    db::run_migrations(&pool).await?;
    AppState::from_settings(settings, pool)
}

/// Rebuild the search index from the store
pub async fn reindex(settings: Settings) -> Result<usize> {
    info!("Reindexing {} from {}", settings.search.index_name, settings.database.url);

    let state = local_state(settings).await?;
    let summary = state.recipes.reindex().await?;

    println!("\x1b[32m\u{2713}\x1b[0m {}", summary.message);
    Ok(summary.count)
}

/// Search recipes
pub async fn search(
    settings: Settings,
    query: &str,
    ingredients: &str,
    limit: Option<i64>,
    json: bool,
) -> Result<()> {
    let state = local_state(settings).await?;
    let outcome = state.recipes.search(query, ingredients, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_search_results(&outcome);
    }

    Ok(())
}

fn print_search_results(outcome: &SearchOutcome) {
    if let Some(error) = &outcome.error {
        println!("\x1b[33m!\x1b[0m {error}, showing latest recipes instead");
    }

    if outcome.items.is_empty() {
        println!("No recipes found");
        return;
    }

    println!("\nFound {} recipes:\n", outcome.total);
    println!("{:<6} {:<44} {:>7} {:<20}", "ID", "Title", "Score", "Ingredients");
    println!("{}", "-".repeat(80));

    for recipe in &outcome.items {
        let score = recipe
            .score
            .map(|s| format!("{s:.2}"))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<6} {:<44} {:>7} {:<20}",
            recipe.id,
            truncate(&recipe.title, 42),
            score,
            truncate(&recipe.ingredients.join(", "), 20)
        );
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Soup", 10), "Soup");
        assert_eq!(truncate("Tomato and basil soup", 10), "Tomato ...");
        assert_eq!(truncate("Crème brûlée deluxe", 8), "Crème...");
    }

    #[tokio::test]
    async fn test_reindex_against_local_settings() {
        let count = reindex(Settings::for_local()).await.unwrap();
        assert_eq!(count, 0);
    }
}
