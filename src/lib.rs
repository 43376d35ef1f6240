pub mod agent;
pub mod backslash_commands;
pub mod cli;
pub mod config;
pub mod database;
pub mod format;
pub mod logging;
pub mod prompt;

#[cfg(test)]
mod test_support;

pub use agent::{PipelineResponse, SqlAgent};
pub use config::AgentConfig;
