use crate::agent::SqlAgent;

/// One line of REPL input, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    Empty,
    Exit,
    Help,
    ListTables,
    DescribeTables(String),
    Unknown(String),
    Question(String),
}

/// Classify a line typed at the prompt.
///
/// Anything that is not an exit word or a backslash command is a question.
pub fn parse_input(input: &str) -> ReplInput {
    let input = input.trim();
    if input.is_empty() {
        return ReplInput::Empty;
    }

    if matches!(input.to_lowercase().as_str(), "exit" | "quit") {
        return ReplInput::Exit;
    }

    if !input.starts_with('\\') {
        return ReplInput::Question(input.to_string());
    }

    let mut parts = input.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or("");
    let args = parts.next().unwrap_or("").trim();

    match cmd {
        "\\q" => ReplInput::Exit,
        "\\h" | "\\?" => ReplInput::Help,
        "\\dt" => ReplInput::ListTables,
        "\\d" if args.is_empty() => ReplInput::ListTables,
        "\\d" => ReplInput::DescribeTables(args.to_string()),
        other => ReplInput::Unknown(other.to_string()),
    }
}

pub fn help_text() -> &'static str {
    "Type a question about your data, or one of:
  \\dt              List tables
  \\d TABLE[,...]   Describe tables
  \\h               Show this help
  \\q, exit, quit   Leave"
}

/// Run a catalog command and return the text to print
pub async fn run_catalog_command(input: &ReplInput, agent: &SqlAgent) -> Option<String> {
    let introspector = agent.introspector();
    match input {
        ReplInput::ListTables => Some(match introspector.list_tables().await {
            Ok(tables) if tables.is_empty() => "No tables found.".to_string(),
            Ok(tables) => tables.join("\n"),
            Err(e) => format!("Error listing tables: {e}"),
        }),
        ReplInput::DescribeTables(names) => Some(match introspector.describe_tables(names).await {
            Ok(text) => text.trim_end().to_string(),
            Err(e) => format!("Error describing tables: {e}"),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::test_support::{ScriptedProvider, music_database};
    use rstest::rstest;

    #[rstest]
    #[case("", ReplInput::Empty)]
    #[case("   ", ReplInput::Empty)]
    #[case("exit", ReplInput::Exit)]
    #[case("QUIT", ReplInput::Exit)]
    #[case("\\q", ReplInput::Exit)]
    #[case("\\h", ReplInput::Help)]
    #[case("\\dt", ReplInput::ListTables)]
    #[case("\\d", ReplInput::ListTables)]
    #[case("\\d tracks, albums", ReplInput::DescribeTables("tracks, albums".to_string()))]
    #[case("\\x", ReplInput::Unknown("\\x".to_string()))]
    #[case("  How many tracks? ", ReplInput::Question("How many tracks?".to_string()))]
    #[case("exit the building count", ReplInput::Question("exit the building count".to_string()))]
    fn test_parse_input(#[case] input: &str, #[case] expected: ReplInput) {
        assert_eq!(parse_input(input), expected);
    }

    #[tokio::test]
    async fn test_catalog_commands() {
        let db = music_database().await;
        let config = AgentConfig {
            database_url: db.path.clone(),
            ..AgentConfig::default()
        };
        let agent = SqlAgent::with_provider(&config, Box::new(ScriptedProvider::new(vec![]))).unwrap();

        let tables = run_catalog_command(&ReplInput::ListTables, &agent).await;
        assert_eq!(tables.as_deref(), Some("albums\nartists\ntracks"));

        let described =
            run_catalog_command(&ReplInput::DescribeTables("artists".to_string()), &agent).await;
        assert_eq!(
            described.as_deref(),
            Some("Table: artists\n  - ArtistId (INTEGER)\n  - Name (NVARCHAR(120))")
        );

        assert!(run_catalog_command(&ReplInput::Help, &agent).await.is_none());
    }
}
