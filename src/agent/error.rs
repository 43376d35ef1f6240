//! Error types for the question-answering pipeline

use thiserror::Error;

/// Result type for agent setup operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Prefix carried by every provider failure when it is shown to the user
pub const PROVIDER_ERROR_PREFIX: &str = "LLM Error";

/// Errors raised while building or configuring the agent.
///
/// Stage failures (generation, execution, explanation) never surface as
/// `AgentError`; they are folded into the pipeline response instead.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(#[from] crate::database::DatabaseError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Config file error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl AgentError {
    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Configuration(msg) => {
                format!(
                    "Configuration issue: {msg}. Check your config file or environment variables."
                )
            }
            AgentError::Database(e) => {
                format!("Could not open the database: {e}. Check --database or database_url.")
            }
            AgentError::ConfigParse(e) => format!("Invalid config file: {e}"),
            _ => self.to_string(),
        }
    }
}

/// Failures of a single `complete` call against an LLM backend.
///
/// The display text always starts with [`PROVIDER_ERROR_PREFIX`] so that a
/// failure shown in place of an answer reads as one.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("LLM Error: no LLM provider configured. Set GOOGLE_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY")]
    NotConfigured,

    #[error("LLM Error: request failed: {0}")]
    Network(String),

    #[error("LLM Error: {provider} returned {status_code}: {message}")]
    Api {
        provider: &'static str,
        status_code: u16,
        message: String,
    },

    #[error("LLM Error: request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("LLM Error: invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout { timeout_secs }
        } else if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::InvalidResponse(err.to_string())
    }
}
