//! SQL generation stage

use crate::agent::client::CompletionProvider;
use crate::agent::error::ProviderError;
use crate::agent::prompt::{PromptTemplate, is_cannot_answer};
use tracing::{debug, warn};

/// Outcome of asking the model for SQL
#[derive(Debug)]
pub enum GeneratedQuery {
    /// Cleaned SQL text, not validated
    Sql(String),
    /// The model's refusal, kept verbatim
    CannotAnswer(String),
    /// The provider call failed
    ProviderFailed(ProviderError),
}

/// Ask the model for a query answering `question` against `schema_text`.
pub async fn generate_sql(
    provider: &dyn CompletionProvider,
    question: &str,
    schema_text: &str,
) -> GeneratedQuery {
    let prompt = PromptTemplate::generation(schema_text, question);
    debug!("Generation prompt: {} chars", prompt.len());

    let reply = match provider.complete(&prompt).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("SQL generation failed: {}", e);
            return GeneratedQuery::ProviderFailed(e);
        }
    };

    let sql = PromptTemplate::GENERATE_SQL.post_process(&reply);
    if is_cannot_answer(&sql) {
        debug!("Model declined to answer: {}", sql);
        GeneratedQuery::CannotAnswer(sql)
    } else {
        debug!("Generated SQL: {}", sql);
        GeneratedQuery::Sql(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedProvider;
    use rstest::rstest;

    #[tokio::test]
    async fn test_fenced_reply_is_cleaned() {
        let provider = ScriptedProvider::new(vec![Ok("```sql\nSELECT COUNT(*) FROM tracks\n```")]);

        let query = generate_sql(&provider, "How many tracks?", "Table: tracks\n").await;
        assert!(matches!(&query, GeneratedQuery::Sql(sql) if sql == "SELECT COUNT(*) FROM tracks"));

        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Table: tracks\n"));
        assert!(prompts[0].contains("\"How many tracks?\""));
    }

    #[tokio::test]
    async fn test_sentinel_becomes_cannot_answer() {
        let provider = ScriptedProvider::new(vec![Ok("ERROR: Cannot answer")]);

        let query = generate_sql(&provider, "What is the weather?", "").await;
        assert!(matches!(&query, GeneratedQuery::CannotAnswer(text) if text == "ERROR: Cannot answer"));
    }

    #[tokio::test]
    async fn test_provider_failure_is_captured() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Network(
            "connection reset".to_string(),
        ))]);

        let query = generate_sql(&provider, "How many tracks?", "").await;
        match query {
            GeneratedQuery::ProviderFailed(e) => assert!(e.to_string().starts_with("LLM Error")),
            other => panic!("expected a provider failure, got {other:?}"),
        }
    }

    #[rstest]
    #[case("```\nERROR: Cannot answer\n```")]
    #[case("```sql\nERROR: Cannot answer\n```")]
    #[case("  ERROR: Cannot answer  ")]
    #[tokio::test]
    async fn test_fenced_refusal_is_cannot_answer(#[case] reply: &str) {
        let provider = ScriptedProvider::new(vec![Ok(reply)]);

        let query = generate_sql(&provider, "What is the weather?", "").await;
        assert!(
            matches!(&query, GeneratedQuery::CannotAnswer(text) if text == "ERROR: Cannot answer"),
            "unexpected outcome: {query:?}"
        );
    }
}
