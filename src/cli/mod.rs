// Command-line interface

pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "recipe-catalog")]
#[command(about = "Recipe catalog API with full-text search", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long, env = "HOST")]
        host: Option<String>,
    },

    /// Run database migrations
    Migrate,

    /// Rebuild the search index from the recipe store
    Reindex,

    /// Search recipes using the configured backend
    Search {
        /// Free-text query
        #[arg(default_value = "")]
        query: String,

        /// Comma-separated ingredient filter
        #[arg(short, long, default_value = "")]
        ingredients: String,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<i64>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },
}
