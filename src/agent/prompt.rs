//! Prompt templates for the two model-facing stages

use regex::Regex;
use std::sync::LazyLock;

/// Reply the generation prompt asks for when the schema cannot answer
pub const CANNOT_ANSWER: &str = "ERROR: Cannot answer";

/// Any generated text starting with this is treated as a refusal
pub const SENTINEL_PREFIX: &str = "ERROR";

const FENCE: &str = "```";

// ``` with an optional one-word language tag, up to the end of that line
static FENCE_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^```[A-Za-z0-9_+.-]*[ \t]*(?:\r?\n|$)").expect("fence opener pattern is valid")
});

// First fenced block whose fences sit at the start of their lines
static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?sm)^```[A-Za-z0-9_+.-]*[ \t]*\r?\n(.*?)^[ \t]*```")
        .expect("fenced block pattern is valid")
});

// Tags accepted when the query follows on the opener's own line
const SQL_TAGS: &[&str] = &["sql", "sqlite", "sqlite3", "postgres", "postgresql", "mysql"];

const STATEMENT_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "REPLACE", "CREATE", "DROP", "ALTER",
    "PRAGMA", "EXPLAIN", "VALUES",
];

/// Pipeline stage that talks to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    GenerateSql,
    ExplainResult,
}

/// Builds the prompt for a stage and post-processes the model's reply
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    stage: Stage,
}

impl PromptTemplate {
    pub const GENERATE_SQL: PromptTemplate = PromptTemplate::new(Stage::GenerateSql);
    pub const EXPLAIN_RESULT: PromptTemplate = PromptTemplate::new(Stage::ExplainResult);

    pub const fn new(stage: Stage) -> Self {
        Self { stage }
    }

    /// Prompt asking for a single SQL statement answering `question`
    pub fn generation(schema: &str, question: &str) -> String {
        format!(
            r#"You are an expert SQL assistant. Given the following database schema:

{schema}

Write a SQL query to answer the user's question: "{question}"

Return ONLY the SQL query, nothing else. Do not wrap it in markdown code blocks.
If you cannot answer the question with the given schema, return "{CANNOT_ANSWER}"."#
        )
    }

    /// Prompt asking for a plain-language answer from an executed query
    pub fn explanation(question: &str, query: &str, result: &str) -> String {
        format!(
            r#"You are a helpful data analyst.
User Question: {question}
SQL Query Executed: {query}
Result Data:
{result}

Please provide a concise, natural language answer to the user's question based on the result."#
        )
    }

    /// Clean up a model reply for this stage.
    ///
    /// Generated SQL loses surrounding whitespace and markdown fences.
    /// Explanations are only trimmed.
    pub fn post_process(&self, reply: &str) -> String {
        match self.stage {
            Stage::GenerateSql => strip_code_fences(reply),
            Stage::ExplainResult => reply.trim().to_string(),
        }
    }
}

/// Remove markdown fences wrapped around a reply.
///
/// Strips one opener (with or without a language tag) and one closer per
/// pass, tolerating trailing whitespace and CRLF line ends. When prose
/// precedes a fenced block, the first block's body is kept. A reply that
/// already starts like a statement is never cut down to a block. Passes
/// repeat until nothing changes, so `strip_code_fences(strip_code_fences(x))`
/// equals `strip_code_fences(x)` for every input.
pub fn strip_code_fences(text: &str) -> String {
    let mut current = text.trim().to_string();
    loop {
        let next = strip_once(&current);
        // every change removes at least one fence, so this terminates
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_once(text: &str) -> String {
    let mut sql = text.trim();

    if sql.starts_with(FENCE) {
        sql = strip_opener(sql).trim_end();
        if let Some(stripped) = sql.strip_suffix(FENCE) {
            sql = stripped;
        }
        return sql.trim().to_string();
    }

    if let Some(stripped) = sql.strip_suffix(FENCE) {
        return stripped.trim().to_string();
    }

    if !starts_like_statement(sql) {
        if let Some(body) = FENCED_BLOCK.captures(sql).and_then(|c| c.get(1)) {
            return body.as_str().trim().to_string();
        }
    }

    sql.to_string()
}

/// Text after the opening fence and its language tag, if any
fn strip_opener(sql: &str) -> &str {
    if let Some(opener) = FENCE_OPENER.find(sql) {
        return &sql[opener.end()..];
    }

    // ```sql SELECT ... with the query on the opener's line
    let rest = &sql[FENCE.len()..];
    if let Some(tag_end) = rest.find([' ', '\t']) {
        let tag = &rest[..tag_end];
        if SQL_TAGS.iter().any(|known| known.eq_ignore_ascii_case(tag)) {
            return &rest[tag_end..];
        }
    }
    rest
}

fn starts_like_statement(text: &str) -> bool {
    let word: String = text
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    STATEMENT_KEYWORDS
        .iter()
        .any(|keyword| keyword.eq_ignore_ascii_case(&word))
}

/// Whether generated text is the model's refusal
pub fn is_cannot_answer(text: &str) -> bool {
    text.starts_with(SENTINEL_PREFIX)
}
