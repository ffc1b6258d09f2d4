pub mod config;
pub mod db;
pub mod error;

// Secret store and search subsystem
pub mod secrets;
pub mod search;

// Recipe service
pub mod recipes;

// HTTP layer
pub mod api;
pub mod auth;

// CLI
pub mod cli;

// Re-exports
pub use config::Settings;
pub use error::{Error, Result};
