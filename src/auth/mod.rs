// HTTP basic authentication for the recipe API

use crate::config::AuthConfig;
use crate::secrets::SecretStore;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const DEV_USERNAME: &str = "test";
const DEV_PASSWORD: &str = "test";

/// Users allowed to call the API, loaded on first use.
///
/// Order: the auth secret (JSON object of user to password), then the
/// environment user, then the development user `test`/`test`.
pub struct UserDirectory {
    secret_store: Option<Arc<dyn SecretStore>>,
    secret_name: String,
    env: AuthConfig,
    users: OnceCell<HashMap<String, String>>,
}

impl UserDirectory {
    pub fn new(
        secret_store: Option<Arc<dyn SecretStore>>,
        secret_name: impl Into<String>,
        env: AuthConfig,
    ) -> Self {
        Self {
            secret_store,
            secret_name: secret_name.into(),
            env,
            users: OnceCell::new(),
        }
    }

    /// Directory with a fixed user list
    pub fn with_users(users: HashMap<String, String>) -> Self {
        Self {
            secret_store: None,
            secret_name: String::new(),
            env: AuthConfig::default(),
            users: OnceCell::new_with(Some(users)),
        }
    }

    pub async fn authenticate(&self, username: &str, password: &str) -> bool {
        self.users()
            .await
            .get(username)
            .is_some_and(|expected| expected == password)
    }

    async fn users(&self) -> &HashMap<String, String> {
        self.users.get_or_init(|| self.load()).await
    }

    async fn load(&self) -> HashMap<String, String> {
        if let Some(users) = self.from_secret_store().await {
            info!("Loaded {} API users from secret store", users.len());
            return users;
        }

        if let (Some(username), Some(password)) = (&self.env.username, &self.env.password) {
            info!("Using API user from environment");
            return HashMap::from([(username.clone(), password.clone())]);
        }

        warn!("No API users configured, falling back to development credentials");
        HashMap::from([(DEV_USERNAME.to_string(), DEV_PASSWORD.to_string())])
    }

    async fn from_secret_store(&self) -> Option<HashMap<String, String>> {
        let store = self.secret_store.as_ref()?;

        match store.access_latest(&self.secret_name).await {
            Ok(Some(payload)) => match serde_json::from_slice::<HashMap<String, String>>(&payload) {
                Ok(users) if !users.is_empty() => Some(users),
                Ok(_) => {
                    warn!("Secret {} holds no users", self.secret_name);
                    None
                }
                Err(_) => {
                    warn!("Secret {} is not a user map", self.secret_name);
                    None
                }
            },
            Ok(None) => {
                info!("Secret {} not found", self.secret_name);
                None
            }
            Err(e) => {
                warn!("Could not load API users: {}", e.log_safe());
                None
            }
        }
    }
}

/// Decode `Authorization: Basic base64(user:pass)`
pub fn parse_basic_header(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

fn unauthorized() -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Unauthorized" })),
    )
        .into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"recipes\""),
    );
    response
}

/// Reject requests without valid basic credentials
pub async fn require_basic_auth(
    State(users): State<Arc<UserDirectory>>,
    request: Request,
    next: Next,
) -> Response {
    match parse_basic_header(request.headers()) {
        Some((username, password)) if users.authenticate(&username, &password).await => {
            next.run(request).await
        }
        Some((username, _)) => {
            debug!("Rejected credentials for user {}", username);
            unauthorized()
        }
        None => unauthorized(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::MemorySecretStore;

    fn basic(user: &str, pass: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let token = STANDARD.encode(format!("{user}:{pass}"));
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_parse_basic_header() {
        assert_eq!(
            parse_basic_header(&basic("chef", "p:ss")),
            Some(("chef".to_string(), "p:ss".to_string()))
        );

        let mut bearer = HeaderMap::new();
        bearer.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(parse_basic_header(&bearer), None);
        assert_eq!(parse_basic_header(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_secret_store_users_win() {
        let store = MemorySecretStore::new().with_secret("basic-auth", r#"{"chef":"secret"}"#);
        let env = AuthConfig {
            username: Some("env".to_string()),
            password: Some("pw".to_string()),
        };
        let users = UserDirectory::new(Some(Arc::new(store)), "basic-auth", env);

        assert!(users.authenticate("chef", "secret").await);
        assert!(!users.authenticate("env", "pw").await);
        assert!(!users.authenticate("test", "test").await);
    }

    #[tokio::test]
    async fn test_malformed_secret_falls_back_to_env() {
        let store = MemorySecretStore::new().with_secret("basic-auth", "not json");
        let env = AuthConfig {
            username: Some("env".to_string()),
            password: Some("pw".to_string()),
        };
        let users = UserDirectory::new(Some(Arc::new(store)), "basic-auth", env);

        assert!(users.authenticate("env", "pw").await);
        assert!(!users.authenticate("env", "wrong").await);
    }

    #[tokio::test]
    async fn test_development_fallback() {
        let users = UserDirectory::new(None, "basic-auth", AuthConfig::default());
        assert!(users.authenticate("test", "test").await);
        assert!(!users.authenticate("test", "nope").await);
    }
}
