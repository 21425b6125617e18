use std::env;

use crate::error::AeoscopeError;

const DEFAULT_CLAUDE_MODEL: &str = "claude-haiku-4-5-20251001";

/// Pipeline configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Serper (Google SERP) API key.
    pub serper_api_key: String,
    /// Anthropic API key for the classification fallback model.
    pub anthropic_api_key: String,
    /// Model used for ambiguous-URL review. A small fast model is enough.
    pub claude_model: String,
}

impl Config {
    /// Load configuration, failing if a required credential is missing.
    /// A missing credential must stop the run before any work starts rather
    /// than surface as an all-error result set.
    pub fn load() -> Result<Self, AeoscopeError> {
        Ok(Self {
            serper_api_key: required_env("SERPER_API_KEY")?,
            anthropic_api_key: required_env("ANTHROPIC_API_KEY")?,
            claude_model: env::var("CLAUDE_MODEL")
                .unwrap_or_else(|_| DEFAULT_CLAUDE_MODEL.to_string()),
        })
    }
}

fn required_env(key: &str) -> Result<String, AeoscopeError> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AeoscopeError::Config(format!(
            "{key} environment variable is required"
        ))),
    }
}
