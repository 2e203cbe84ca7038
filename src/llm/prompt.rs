//! Prompt construction.
//!
//! The generation prompt embeds table and column metadata only — never
//! row data. The explanation prompt carries a bounded sample of the
//! executed result.

use crate::db::{QueryResult, Schema};

/// Maximum result rows embedded in the explanation prompt.
pub const SAMPLE_ROW_LIMIT: usize = 5;

/// System prompt template for SQL generation.
const GENERATION_TEMPLATE: &str = r#"You are a SQL assistant for a PostgreSQL database of credit-card transactions. Generate SQL queries that answer user questions.

DATABASE SCHEMA:
{schema}

INSTRUCTIONS:
- Generate exactly one read-only PostgreSQL SELECT query (WITH ... SELECT is allowed)
- Never generate INSERT, UPDATE, DELETE, DROP, or any other write statement
- Match table and column names to the schema exactly
- Use LIMIT when the question could match many rows
- If the question is not about the data, answer conversationally without SQL

OUTPUT FORMAT:
Return the SQL query wrapped in ```sql code blocks. Any explanation goes before or after the code block."#;

/// Builds the system prompt for the generation call.
pub fn generation_system_prompt(schema: &Schema) -> String {
    GENERATION_TEMPLATE.replace("{schema}", &schema.format_for_llm())
}

/// Builds the follow-up user message asking for a result explanation.
///
/// Mirrors the shape of the generation exchange: the executed statement's
/// outcome is summarized as columns, a row count, and at most
/// [`SAMPLE_ROW_LIMIT`] sample rows.
pub fn explanation_prompt(question: &str, result: &QueryResult) -> String {
    let mut prompt = String::from("The query was executed. Summarize the answer to the user's question in plain language, based only on these results.\n\n");

    prompt.push_str(&format!("Question: {question}\n"));
    prompt.push_str(&format!("Columns: {}\n", result.columns.join(", ")));
    prompt.push_str(&format!("Rows returned: {}", result.row_count));
    if result.truncated {
        prompt.push_str(" (truncated at the row cap)");
    }
    prompt.push('\n');

    let sample = result.sample_rows(SAMPLE_ROW_LIMIT);
    if !sample.is_empty() {
        prompt.push_str("Sample rows:\n");
        for row in sample {
            let cells = row
                .iter()
                .map(|v| v.to_display_string())
                .collect::<Vec<_>>()
                .join(", ");
            prompt.push_str(&format!("  [{cells}]\n"));
        }
    }

    prompt.push_str("\nKeep the summary to a few sentences. Do not include SQL.");
    prompt
}
