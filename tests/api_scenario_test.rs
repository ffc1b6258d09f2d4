use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use recipe_catalog::api::{handlers::AppState, routes::create_router};
use recipe_catalog::auth::UserDirectory;
use recipe_catalog::config::Settings;
use recipe_catalog::db;
use recipe_catalog::search::EmbeddedIndex;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn app() -> Router {
    let pool = db::init_memory_pool()
        .await
        .expect("Failed to create in-memory database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let settings = Settings::for_local();
    let users = UserDirectory::new(None, "basic-auth", settings.auth.clone());
    let state = AppState::with_search_backend(
        settings,
        pool,
        Arc::new(EmbeddedIndex::in_memory()),
        users,
    );
    create_router(state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(
            header::AUTHORIZATION,
            format!("Basic {}", STANDARD.encode("test:test")),
        );

    let body = match body {
        Some(body) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_create_then_search_scenario() {
    let app = app().await;

    let (status, created) = send(
        &app,
        "POST",
        "/recipes",
        Some(json!({
            "title": "Tomato Soup",
            "ingredients": ["tomato", "cream"],
            "steps": ["boil", "blend"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created["id"].is_i64());
    assert_eq!(created["createdAt"], created["updatedAt"]);
    assert!(created.get("score").is_none());

    let (status, outcome) = send(&app, "GET", "/recipes/search?q=soup", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["source"], "search");
    assert_eq!(outcome["query"], "soup");
    assert_eq!(outcome["items"][0]["id"], created["id"]);
    assert!(outcome["items"][0]["score"].as_f64().unwrap() > 0.0);
    assert!(outcome["items"][0].get("searchable_text").is_none());

    // Exact title round trip
    let (_, outcome) = send(&app, "GET", "/recipes/search?q=Tomato%20Soup", None).await;
    assert_eq!(outcome["items"][0]["id"], created["id"]);
}

#[tokio::test]
async fn test_crud_lifecycle() {
    let app = app().await;

    let (_, created) = send(&app, "POST", "/recipes", Some(json!({"title": "Pancakes"}))).await;
    let uri = format!("/recipes/{}", created["id"]);

    let (status, fetched) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["title"], "Pancakes");
    assert_eq!(fetched["ingredients"], json!([]));

    let (status, _) = send(&app, "PUT", &uri, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, updated) = send(
        &app,
        "PUT",
        &uri,
        Some(json!({"ingredients": ["egg", "flour"], "createdAt": "1999-01-01T00:00:00Z"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["ingredients"], json!(["egg", "flour"]));
    assert_eq!(updated["createdAt"], created["createdAt"]);

    let (_, outcome) = send(&app, "GET", "/recipes/search?ingredients=Egg,%20flour", None).await;
    assert_eq!(outcome["items"][0]["id"], created["id"]);

    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Recipe not found");
}

#[tokio::test]
async fn test_list_clamps_limit_and_orders_newest_first() {
    let app = app().await;

    for title in ["First", "Second", "Third"] {
        send(&app, "POST", "/recipes", Some(json!({"title": title}))).await;
    }

    let (status, body) = send(&app, "GET", "/recipes?limit=0", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["title"], "Third");

    let (_, body) = send(&app, "GET", "/recipes", None).await;
    assert_eq!(body.as_object().unwrap().len(), 1);
    let titles: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Third", "Second", "First"]);
}

#[tokio::test]
async fn test_reindex_endpoint() {
    let app = app().await;

    send(&app, "POST", "/recipes", Some(json!({"title": "One"}))).await;
    send(&app, "POST", "/recipes", Some(json!({"title": "Two"}))).await;

    let (status, body) = send(&app, "POST", "/recipes/reindex", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Reindexed 2 recipes", "count": 2}));
}
