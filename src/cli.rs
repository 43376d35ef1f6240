use crate::config::{AgentConfig, BackendKind};
use clap::Parser;
use std::path::PathBuf;

/// askql - Ask questions about a SQLite database in plain language
#[derive(Parser, Debug, Clone)]
#[command(name = "askql")]
#[command(version, long_about = None)]
#[command(about = "Ask questions about a SQLite database in plain language")]
#[command(arg_required_else_help = false)]
pub struct Args {
    /// SQLite database URL or file path
    ///
    /// Examples:
    ///   chinook.db
    ///   sqlite://data/chinook.db
    #[arg(short, long, value_name = "URL", env = "ASKQL_DATABASE")]
    pub database: Option<String>,

    /// Answer a single question and exit
    #[arg(short, long, value_name = "TEXT")]
    pub question: Option<String>,

    /// Print the response as JSON
    #[arg(long)]
    pub json: bool,

    /// Force an LLM backend instead of probing API keys
    #[arg(long, value_name = "google|openai|anthropic", env = "ASKQL_PROVIDER")]
    pub provider: Option<BackendKind>,

    /// Model name for the selected backend
    #[arg(short, long, env = "ASKQL_MODEL")]
    pub model: Option<String>,

    /// Maximum number of result rows passed to the model
    #[arg(long, value_name = "N")]
    pub max_rows: Option<usize>,

    /// Config file (defaults to ~/.config/askql/config.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Apply command-line overrides on top of the loaded configuration.
    ///
    /// `--model` applies to the forced backend, or to every backend when
    /// none is forced since the choice is only made later.
    pub fn apply_to(&self, config: &mut AgentConfig) {
        if let Some(database) = &self.database {
            config.database_url = database.clone();
        }
        if let Some(provider) = self.provider {
            config.provider = Some(provider);
        }
        if let Some(max_rows) = self.max_rows {
            config.max_rows = max_rows;
        }
        if let Some(model) = &self.model {
            match config.provider {
                Some(BackendKind::Google) => config.google_model = model.clone(),
                Some(BackendKind::OpenAI) => config.openai_model = model.clone(),
                Some(BackendKind::Anthropic) => config.anthropic_model = model.clone(),
                None => {
                    config.google_model = model.clone();
                    config.openai_model = model.clone();
                    config.anthropic_model = model.clone();
                }
            }
        }
    }
}
