//! Database schema types.
//!
//! Table and column metadata only — the generator prompt embeds names and
//! types, never row data.

use serde::{Deserialize, Serialize};

/// The visible schema of the database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    /// All tables in the public schema.
    pub tables: Vec<Table>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Formats the schema for inclusion in an LLM system prompt.
    pub fn format_for_llm(&self) -> String {
        self.tables
            .iter()
            .map(|table| {
                let columns = table
                    .columns
                    .iter()
                    .map(|c| format!("  - {}: {}", c.name, c.data_type))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("Table: {}\n{}\n", table.name, columns)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A database table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Columns in ordinal order.
    pub columns: Vec<Column>,
}

/// A table column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Column data type as reported by the database.
    pub data_type: String,

    /// Whether the column accepts NULL.
    pub is_nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }
}
