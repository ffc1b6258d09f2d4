use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub search: SearchConfig,
    pub secrets: SecretsConfig,
    pub auth: AuthConfig,
    pub pagination: PaginationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_request_body_size: usize,
}

/// Which search backend implementation to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackendKind {
    Elasticsearch,
    Embedded,
}

impl FromStr for SearchBackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "elasticsearch" | "es" => Ok(SearchBackendKind::Elasticsearch),
            "embedded" | "tantivy" => Ok(SearchBackendKind::Embedded),
            other => Err(Error::Config(format!("Unknown SEARCH_BACKEND: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub backend: SearchBackendKind,
    pub url: String,
    pub index_name: String,
    pub timeout_seconds: u64,
    pub index_check_ttl_seconds: u64,
    /// On-disk location for the embedded backend; `None` keeps it in memory
    pub index_path: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_key_id: Option<String>,
    pub api_key: Option<String>,
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn index_check_ttl(&self) -> Duration {
        Duration::from_secs(self.index_check_ttl_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Secret lookups only happen when a project is configured
    pub project: Option<String>,
    pub search_secret_name: String,
    pub auth_secret_name: String,
    pub api_base_url: String,
    pub token_url: String,
}

/// Environment-provided API user, consulted after the secret store
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub default_limit: usize,
    pub min_limit: usize,
    pub max_limit: usize,
}

impl PaginationConfig {
    /// Clamp a caller-supplied limit into `[min_limit, max_limit]`
    pub fn clamp_limit(&self, limit: i64) -> usize {
        let min = self.min_limit as i64;
        let max = self.max_limit as i64;
        limit.clamp(min, max) as usize
    }

    /// Clamp an optional limit, substituting the default when absent
    pub fn resolve_limit(&self, limit: Option<i64>) -> usize {
        self.clamp_limit(limit.unwrap_or(self.default_limit as i64))
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            min_limit: 1,
            max_limit: 200,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str, default: &str) -> Result<T> {
    env_or(key, default)
        .parse()
        .map_err(|_| Error::Config(format!("Invalid {key} value")))
}

impl Settings {
    /// Load settings from environment variables
    pub fn from_env() -> Result<Self> {
        let database_url = env_or("DATABASE_URL", "sqlite:./data/recipes.db");

        let host = env_or("HOST", "0.0.0.0");
        let port = env_parse("PORT", "8080")?;
        let max_request_body_size = env_parse("MAX_REQUEST_BODY_SIZE", "1048576")?;

        let max_connections = env_parse("DATABASE_MAX_CONNECTIONS", "10")?;
        let min_connections = env_parse("DATABASE_MIN_CONNECTIONS", "1")?;
        let connection_timeout_seconds = env_parse("DATABASE_CONNECTION_TIMEOUT", "30")?;
        let idle_timeout_seconds = env_parse("DATABASE_IDLE_TIMEOUT", "600")?;

        let backend = env_or("SEARCH_BACKEND", "elasticsearch").parse()?;
        let search_url = env_or("ELASTICSEARCH_URL", "http://localhost:9200");
        let index_name = env_or("SEARCH_INDEX", "recipes");
        let timeout_seconds = env_parse("SEARCH_TIMEOUT", "10")?;
        let index_check_ttl_seconds = env_parse("SEARCH_INDEX_CHECK_TTL", "60")?;
        let index_path = Some(env_or("SEARCH_INDEX_PATH", "./data/index").into());

        let secrets = SecretsConfig {
            project: env_opt("GOOGLE_CLOUD_PROJECT"),
            search_secret_name: env_or("SEARCH_SECRET_NAME", "elasticsearch-credentials"),
            auth_secret_name: env_or("AUTH_SECRET_NAME", "basic-auth"),
            api_base_url: env_or("SECRET_STORE_URL", "https://secretmanager.googleapis.com"),
            token_url: env_or(
                "SECRET_TOKEN_URL",
                "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token",
            ),
        };

        Ok(Settings {
            database: DatabaseConfig {
                url: database_url,
                max_connections,
                min_connections,
                connection_timeout_seconds,
                idle_timeout_seconds,
            },
            server: ServerConfig {
                host,
                port,
                max_request_body_size,
            },
            search: SearchConfig {
                backend,
                url: search_url,
                index_name,
                timeout_seconds,
                index_check_ttl_seconds,
                index_path,
                username: env_opt("ELASTICSEARCH_USERNAME"),
                password: env_opt("ELASTICSEARCH_PASSWORD"),
                api_key_id: env_opt("ELASTICSEARCH_API_KEY_ID"),
                api_key: env_opt("ELASTICSEARCH_API_KEY"),
            },
            secrets,
            auth: AuthConfig {
                username: env_opt("API_USERNAME"),
                password: env_opt("API_PASSWORD"),
            },
            pagination: PaginationConfig::default(),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Config("Port must be non-zero".to_string()));
        }

        if self.search.timeout_seconds == 0 {
            return Err(Error::Config("Search timeout must be non-zero".to_string()));
        }

        if self.search.index_name.trim().is_empty() {
            return Err(Error::Config("Search index name must not be empty".to_string()));
        }

        if self.pagination.min_limit == 0 || self.pagination.min_limit > self.pagination.max_limit {
            return Err(Error::Config("Invalid pagination bounds".to_string()));
        }

        Ok(())
    }

    /// Settings for tests and embedded runs: in-memory store, embedded search, no secrets
    pub fn for_local() -> Self {
        Settings {
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
                min_connections: 1,
                connection_timeout_seconds: 30,
                idle_timeout_seconds: 600,
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                max_request_body_size: 1_048_576,
            },
            search: SearchConfig {
                backend: SearchBackendKind::Embedded,
                url: "http://localhost:9200".to_string(),
                index_name: "recipes".to_string(),
                timeout_seconds: 10,
                index_check_ttl_seconds: 60,
                index_path: None,
                username: None,
                password: None,
                api_key_id: None,
                api_key: None,
            },
            secrets: SecretsConfig {
                project: None,
                search_secret_name: "elasticsearch-credentials".to_string(),
                auth_secret_name: "basic-auth".to_string(),
                api_base_url: "https://secretmanager.googleapis.com".to_string(),
                token_url: "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token".to_string(),
            },
            auth: AuthConfig::default(),
            pagination: PaginationConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::for_local();
        assert!(settings.validate().is_ok());

        settings.server.port = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::for_local();
        settings.search.timeout_seconds = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_clamp_limit() {
        let pagination = PaginationConfig::default();
        let cases = [(0, 1), (1, 1), (200, 200), (201, 200), (-5, 1)];
        for (input, expected) in cases {
            assert_eq!(pagination.clamp_limit(input), expected, "limit {input}");
        }
        assert_eq!(pagination.resolve_limit(None), 50);
        assert_eq!(pagination.resolve_limit(Some(75)), 75);
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!(
            "Elasticsearch".parse::<SearchBackendKind>().unwrap(),
            SearchBackendKind::Elasticsearch
        );
        assert_eq!(
            "embedded".parse::<SearchBackendKind>().unwrap(),
            SearchBackendKind::Embedded
        );
        assert!("solr".parse::<SearchBackendKind>().is_err());
    }
}
