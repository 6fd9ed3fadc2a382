//! Lab configuration loaded from environment variables.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Settings shared by every lab binary.
///
/// The labs use plain key-based auth on purpose: they are run in a
/// workshop setting. Production code should use a managed credential
/// instead of a long-lived API key.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub model: String,
    pub embeddings_model: String,
    pub database_url: String,
}

impl Config {
    /// Load configuration from the environment, reading `.env` first if
    /// present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            openai_api_key: env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY must be set")?,
            model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            embeddings_model: env::var("OPENAI_EMBEDDINGS_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:adventure_works.db?mode=rwc".to_string()),
        })
    }
}
