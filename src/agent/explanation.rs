//! Explanation stage: turns an executed query and its result into prose

use crate::agent::client::CompletionProvider;
use crate::agent::prompt::PromptTemplate;
use tracing::{debug, warn};

/// Ask the model for a plain-language answer.
///
/// A provider failure is returned as the answer text itself, so the caller
/// always has something to show.
pub async fn explain(
    provider: &dyn CompletionProvider,
    question: &str,
    query: &str,
    result_text: &str,
) -> String {
    let prompt = PromptTemplate::explanation(question, query, result_text);
    debug!("Explanation prompt: {} chars", prompt.len());

    match provider.complete(&prompt).await {
        Ok(reply) => PromptTemplate::EXPLAIN_RESULT.post_process(&reply),
        Err(e) => {
            warn!("Explanation failed: {}", e);
            e.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::error::ProviderError;
    use crate::test_support::ScriptedProvider;

    #[tokio::test]
    async fn test_reply_is_not_fence_stripped() {
        let provider = ScriptedProvider::new(vec![Ok("  Run this:\n```sql\nSELECT 1\n```\n")]);

        let answer = explain(&provider, "q", "SELECT 1", "Columns: 1\n(1,)\n").await;
        assert_eq!(answer, "Run this:\n```sql\nSELECT 1\n```");
    }

    #[tokio::test]
    async fn test_prompt_embeds_query_and_result() {
        let provider = ScriptedProvider::new(vec![Ok("There are 5 tracks.")]);

        let answer = explain(
            &provider,
            "How many tracks?",
            "SELECT COUNT(*) AS count FROM tracks",
            "Columns: count\n(5,)\n",
        )
        .await;
        assert_eq!(answer, "There are 5 tracks.");

        let prompts = provider.prompts();
        assert!(prompts[0].contains("SQL Query Executed: SELECT COUNT(*) AS count FROM tracks"));
        assert!(prompts[0].contains("Result Data:\nColumns: count\n(5,)\n"));
    }

    #[tokio::test]
    async fn test_provider_failure_becomes_answer() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Timeout { timeout_secs: 60 })]);

        let answer = explain(&provider, "q", "SELECT 1", "Columns: 1\n(1,)\n").await;
        assert_eq!(answer, "LLM Error: request timed out after 60s");
    }
}
