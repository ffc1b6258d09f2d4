use axum::http::{header, HeaderValue, Method};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    set_header::SetResponseHeaderLayer, trace::TraceLayer,
};

use crate::api::handlers::{self, AppState};
use crate::auth;

/// Create the router with all endpoints
pub fn create_router(state: AppState) -> Router {
    // Recipe routes - basic auth required
    let recipe_routes = Router::new()
        .route(
            "/recipes",
            get(handlers::list_recipes).post(handlers::create_recipe),
        )
        .route("/recipes/search", get(handlers::search_recipes))
        .route("/recipes/reindex", post(handlers::reindex_recipes))
        .route(
            "/recipes/:id",
            get(handlers::get_recipe)
                .put(handlers::update_recipe)
                .delete(handlers::delete_recipe),
        )
        .route_layer(middleware::from_fn_with_state(
            state.users.clone(),
            auth::require_basic_auth,
        ))
        .with_state(state.clone());

    // Liveness routes - public
    let health_routes = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check));

    Router::new()
        .merge(health_routes)
        .merge(recipe_routes)
        .layer(
            // Request body size limit - prevent memory exhaustion from large payloads
            RequestBodyLimitLayer::new(state.settings.server.max_request_body_size),
        )
        .layer(
            CorsLayer::new()
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
                .allow_origin(tower_http::cors::Any)
                .max_age(Duration::from_secs(3600)),
        )
        .layer(
            // Security headers
            SetResponseHeaderLayer::if_not_present(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ),
        )
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(
            // Compression
            CompressionLayer::new(),
        )
        .layer(
            // Tracing
            TraceLayer::new_for_http(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserDirectory;
    use crate::config::Settings;
    use crate::search::EmbeddedIndex;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tower::ServiceExt;

    // Helper to create test app state
    async fn create_test_app() -> Router {
        let pool = crate::db::init_memory_pool().await.unwrap();
        crate::db::run_migrations(&pool).await.unwrap();

        let users = UserDirectory::with_users(HashMap::from([(
            "chef".to_string(),
            "secret".to_string(),
        )]));
        let state = AppState::with_search_backend(
            Settings::for_local(),
            pool,
            Arc::new(EmbeddedIndex::in_memory()),
            users,
        );
        create_router(state)
    }

    fn authorized(builder: axum::http::request::Builder) -> axum::http::request::Builder {
        builder.header(
            header::AUTHORIZATION,
            format!("Basic {}", STANDARD.encode("chef:secret")),
        )
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_routes_are_public() {
        let app = create_test_app().await;

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_recipes_require_basic_auth() {
        let app = create_test_app().await;

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/recipes").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

        let response = app
            .oneshot(
                authorized(Request::builder().uri("/recipes"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let app = create_test_app().await;

        let response = app
            .oneshot(
                authorized(Request::builder().method("POST").uri("/recipes"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Invalid JSON body");
    }

    #[tokio::test]
    async fn test_missing_title_is_bad_request() {
        let app = create_test_app().await;

        let response = app
            .oneshot(
                authorized(Request::builder().method("POST").uri("/recipes"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"ingredients":["salt"]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"],
            "'title' is required and cannot be empty"
        );
    }

    #[tokio::test]
    async fn test_non_numeric_id_is_not_found() {
        let app = create_test_app().await;

        let response = app
            .oneshot(
                authorized(Request::builder().uri("/recipes/abc"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Recipe not found");
    }
}
