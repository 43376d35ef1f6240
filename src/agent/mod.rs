//! Natural-language question answering over a SQLite database
//!
//! A question goes through three stages, each run at most once:
//! generate SQL from the live schema, execute it, explain the result.
//! Refusals and provider failures at generation end the run early.

pub mod client;
pub mod error;
pub mod execution;
pub mod explanation;
pub mod generation;
pub mod prompt;
pub mod schema;

pub use client::{CompletionProvider, create_provider};
pub use error::{AgentError, AgentResult, ProviderError};
pub use execution::{ExecutionResult, SqlExecutor};
pub use generation::GeneratedQuery;
pub use schema::{SchemaIntrospector, SchemaText};

use crate::config::AgentConfig;
use crate::database::ConnectionFactory;
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where a pipeline run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Generating,
    Executing,
    Explaining,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Generating => write!(f, "generating"),
            PipelineStage::Executing => write!(f, "executing"),
            PipelineStage::Explaining => write!(f, "explaining"),
            PipelineStage::Done => write!(f, "done"),
        }
    }
}

/// Result of one question.
///
/// Either `error` is set and nothing downstream ran, or `sql`, `result` and
/// `answer` are filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineResponse {
    pub question: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sql: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub result: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The result was cut at `max_rows`
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl PipelineResponse {
    fn failed(question: &str, error: String) -> Self {
        Self {
            question: question.to_string(),
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Orchestrates generation, execution and explanation for one question at a time.
///
/// Built once per process. The provider and the connection pool are shared
/// by every run, and each run acquires its own connections.
pub struct SqlAgent {
    provider: Box<dyn CompletionProvider>,
    introspector: SchemaIntrospector,
    executor: SqlExecutor,
    connections: ConnectionFactory,
}

impl fmt::Debug for SqlAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlAgent")
            .field("provider", &self.provider.name())
            .field("database", &self.connections.database_name())
            .field("max_rows", &self.executor.max_rows())
            .finish()
    }
}

impl SqlAgent {
    /// Build the agent from configuration, selecting the provider from the
    /// available credentials.
    pub fn new(config: &AgentConfig) -> AgentResult<Self> {
        let provider = create_provider(config)?;
        Self::with_provider(config, provider)
    }

    /// Build the agent around an already constructed provider
    pub fn with_provider(
        config: &AgentConfig,
        provider: Box<dyn CompletionProvider>,
    ) -> AgentResult<Self> {
        let connections = ConnectionFactory::new(&config.database_url)?;
        info!(
            "Agent ready: database={}, provider={}",
            connections.database_name(),
            provider.name()
        );

        Ok(Self {
            provider,
            introspector: SchemaIntrospector::new(connections.clone()),
            executor: SqlExecutor::new(connections.clone(), config.max_rows),
            connections,
        })
    }

    /// `false` when no backend credential was found; [`run`](Self::run) would
    /// then fail at generation.
    pub fn is_configured(&self) -> bool {
        self.provider.is_configured()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn database_name(&self) -> &str {
        self.connections.database_name()
    }

    pub fn introspector(&self) -> &SchemaIntrospector {
        &self.introspector
    }

    /// Answer one question end to end.
    pub async fn run(&self, question: &str) -> PipelineResponse {
        let question = question.trim();
        if question.is_empty() {
            return PipelineResponse::failed(question, "Question must not be empty".to_string());
        }

        let started = Instant::now();
        let mut stage = PipelineStage::Generating;
        info!("Pipeline {}: {}", stage, question);

        let schema = self.introspector.describe_schema().await;
        if schema.is_unavailable() {
            warn!("Generating without a schema: {}", schema);
        }

        let stage_started = Instant::now();
        let generated =
            generation::generate_sql(self.provider.as_ref(), question, &schema.render()).await;
        debug!("Generation took {:?}", stage_started.elapsed());

        let sql = match generated {
            GeneratedQuery::Sql(sql) => sql,
            GeneratedQuery::CannotAnswer(text) => {
                stage = PipelineStage::Done;
                info!("Pipeline {} early: model could not answer", stage);
                return PipelineResponse::failed(question, text);
            }
            GeneratedQuery::ProviderFailed(e) => {
                stage = PipelineStage::Done;
                info!("Pipeline {} early: generation failed", stage);
                return PipelineResponse::failed(question, e.to_string());
            }
        };

        stage = PipelineStage::Executing;
        info!("Pipeline {}: {}", stage, sql);
        let stage_started = Instant::now();
        let execution = self.executor.execute_sql(&sql).await;
        debug!("Execution took {:?}", stage_started.elapsed());
        let result = execution.render();

        stage = PipelineStage::Explaining;
        info!("Pipeline {}", stage);
        let stage_started = Instant::now();
        let answer = explanation::explain(self.provider.as_ref(), question, &sql, &result).await;
        debug!("Explanation took {:?}", stage_started.elapsed());

        stage = PipelineStage::Done;
        info!("Pipeline {} in {:?}", stage, started.elapsed());

        PipelineResponse {
            question: question.to_string(),
            truncated: execution.is_truncated(),
            sql,
            result,
            answer,
            error: None,
        }
    }

    /// Release pooled connections
    pub async fn close(&self) {
        self.connections.close().await;
    }
}
