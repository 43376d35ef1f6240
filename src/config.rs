//! Configuration loaded from `~/.config/askql/config.toml`
//!
//! Precedence, lowest to highest: built-in defaults, config file, environment
//! (API keys), command-line flags.

use crate::agent::error::{AgentError, AgentResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// LLM backend kind, tried in declaration order when none is forced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Google,
    OpenAI,
    Anthropic,
}

impl BackendKind {
    /// Order used for credential-driven selection
    pub const SELECTION_ORDER: [BackendKind; 3] = [
        BackendKind::Google,
        BackendKind::OpenAI,
        BackendKind::Anthropic,
    ];

    /// Environment variable holding this backend's API key
    pub fn env_var(&self) -> &'static str {
        match self {
            BackendKind::Google => "GOOGLE_API_KEY",
            BackendKind::OpenAI => "OPENAI_API_KEY",
            BackendKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Google => write!(f, "google"),
            BackendKind::OpenAI => write!(f, "openai"),
            BackendKind::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "google" | "gemini" => Ok(BackendKind::Google),
            "openai" => Ok(BackendKind::OpenAI),
            "anthropic" | "claude" => Ok(BackendKind::Anthropic),
            other => Err(format!(
                "unknown provider '{other}' (expected google, openai or anthropic)"
            )),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub console_output: bool,
    pub file_output: bool,
    /// Relative paths are resolved against the config directory
    pub file_path: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            console_output: true,
            file_output: false,
            file_path: "askql.log".to_string(),
        }
    }
}

/// Settings for the question-answering agent
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// SQLite URL or file path
    pub database_url: String,

    /// Force a backend instead of probing credentials
    pub provider: Option<BackendKind>,

    // === Google Gemini ===
    /// Falls back to GOOGLE_API_KEY
    pub google_api_key: Option<String>,
    pub google_model: String,
    pub google_base_url: String,

    // === OpenAI ===
    /// Falls back to OPENAI_API_KEY
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,

    // === Anthropic ===
    /// Falls back to ANTHROPIC_API_KEY
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub anthropic_base_url: String,

    // === Generation Parameters ===
    /// Temperature (0.0 = deterministic, 1.0 = creative)
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,

    /// Rows kept from a result set before it is marked truncated
    pub max_rows: usize,

    pub logging: LoggingConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            database_url: "chinook.db".to_string(),
            provider: None,

            google_api_key: None,
            google_model: "gemini-2.5-flash".to_string(),
            google_base_url: "https://generativelanguage.googleapis.com".to_string(),

            openai_api_key: None,
            openai_model: "gpt-4o".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),

            anthropic_api_key: None,
            anthropic_model: "claude-sonnet-4-5-20250929".to_string(),
            anthropic_base_url: "https://api.anthropic.com".to_string(),

            temperature: 0.0,
            max_tokens: 4096,
            timeout_seconds: 60,
            max_rows: 1000,

            logging: LoggingConfig::default(),
        }
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("AgentConfig")
            .field("database_url", &self.database_url)
            .field("provider", &self.provider)
            .field("google_api_key", &redact(&self.google_api_key))
            .field("google_model", &self.google_model)
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_model", &self.openai_model)
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("anthropic_model", &self.anthropic_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_rows", &self.max_rows)
            .field("logging", &self.logging)
            .finish()
    }
}

impl AgentConfig {
    /// Load from an explicit file, or from the default location when it exists.
    pub fn load(path: Option<&Path>) -> AgentResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match get_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> AgentResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AgentError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// API key for a backend from the config, falling back to the environment
    pub fn api_key(&self, kind: BackendKind) -> Option<String> {
        self.api_key_with(kind, |var| std::env::var(var).ok())
    }

    pub(crate) fn api_key_with<F>(&self, kind: BackendKind, env: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let configured = match kind {
            BackendKind::Google => &self.google_api_key,
            BackendKind::OpenAI => &self.openai_api_key,
            BackendKind::Anthropic => &self.anthropic_api_key,
        };

        configured
            .clone()
            .or_else(|| env(kind.env_var()))
            .filter(|key| !key.trim().is_empty())
    }

    /// Validate configuration
    pub fn validate(&self) -> AgentResult<()> {
        let invalid = |msg: &str| Err(AgentError::Configuration(msg.to_string()));

        if self.database_url.trim().is_empty() {
            return invalid("database_url must not be empty");
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return invalid("temperature must be between 0.0 and 1.0");
        }
        if self.max_tokens == 0 {
            return invalid("max_tokens must be greater than 0");
        }
        if self.timeout_seconds == 0 {
            return invalid("timeout_seconds must be greater than 0");
        }
        if self.max_rows == 0 {
            return invalid("max_rows must be greater than 0");
        }

        Ok(())
    }

    /// Resolve the log file location
    pub fn log_file_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.logging.file_path);
        if path.is_absolute() {
            path
        } else {
            get_config_dir().unwrap_or_default().join(path)
        }
    }
}

/// `~/.config/askql`
pub fn get_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("askql"))
}

fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}
