//! Read-only statement gate.
//!
//! Candidate SQL arrives from an LLM and is untrusted by definition. The
//! validator layers a textual token scan (cheap, specific reasons) under a
//! full parse that must resolve to a single read-only SELECT, rejecting on
//! any ambiguity. Nothing the generation step claims about its own output
//! is consulted.

mod parser;
mod scan;

use scan::scan_statement;

/// Outcome of validating a candidate statement.
///
/// Rejection always carries a human-readable reason; there is no bare
/// false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The statement satisfies the read-only policy.
    Accepted,
    /// The statement was rejected; `reason` is surfaced to the caller.
    Rejected { reason: String },
}

impl Verdict {
    pub(crate) fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Returns true if the statement may be executed.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    /// Returns the rejection reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Accepted => None,
            Self::Rejected { reason } => Some(reason),
        }
    }
}

/// Default cap on candidate statement length, in bytes.
const DEFAULT_MAX_STATEMENT_LEN: usize = 8 * 1024;

/// Validator enforcing the single read-only SELECT policy.
#[derive(Debug, Clone)]
pub struct SqlValidator {
    max_statement_len: usize,
}

impl Default for SqlValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STATEMENT_LEN)
    }
}

impl SqlValidator {
    /// Creates a validator with the given statement length cap.
    pub fn new(max_statement_len: usize) -> Self {
        Self { max_statement_len }
    }

    /// Validates a candidate statement against the read-only policy.
    ///
    /// All checks must pass; the first failure wins and its reason is
    /// returned. Statements that cannot be parsed are rejected.
    pub fn validate(&self, candidate: &str) -> Verdict {
        let trimmed = candidate.trim();

        if trimmed.is_empty() {
            return Verdict::rejected("statement is empty");
        }

        if trimmed.len() > self.max_statement_len {
            return Verdict::rejected(format!(
                "statement exceeds the maximum length of {} bytes",
                self.max_statement_len
            ));
        }

        if let Err(reason) = scan_statement(trimmed) {
            return Verdict::rejected(reason);
        }

        if let Err(reason) = parser::check_read_only(trimmed) {
            return Verdict::rejected(reason);
        }

        Verdict::Accepted
    }
}

/// Convenience function to validate without building a validator.
pub fn validate_sql(sql: &str) -> Verdict {
    SqlValidator::default().validate(sql)
}
