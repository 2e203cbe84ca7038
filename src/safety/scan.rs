//! Textual statement scan.
//!
//! A conservative lexical pass over the candidate: word tokens are
//! collected outside of string and identifier literals, and checked
//! against the banned write keywords, the leading-keyword rule, and the
//! no-stacking rule. The scan does not skip comments, so a write keyword
//! hidden in a comment still rejects.

/// Keywords that must not appear as whole words outside literals.
const BANNED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "GRANT", "REVOKE", "CREATE",
    "EXEC", "CALL", "COPY", "ATTACH", "VACUUM",
];

/// Scans a trimmed statement; returns the rejection reason on failure.
pub(super) fn scan_statement(sql: &str) -> Result<(), String> {
    let body = strip_trailing_semicolon(sql);

    let mut chars = body.chars().peekable();
    let mut word = String::new();
    let mut first_word: Option<String> = None;

    // Quote state. Doubled quotes inside a literal are escapes.
    let mut in_single = false;
    let mut in_double = false;

    while let Some(c) = chars.next() {
        if in_single {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                } else {
                    in_single = false;
                }
            }
            continue;
        }
        if in_double {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                } else {
                    in_double = false;
                }
            }
            continue;
        }

        match c {
            '\'' => {
                flush_word(&mut word, &mut first_word)?;
                in_single = true;
            }
            '"' => {
                flush_word(&mut word, &mut first_word)?;
                in_double = true;
            }
            ';' => {
                flush_word(&mut word, &mut first_word)?;
                return Err("multiple statements are not allowed".to_string());
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                word.push(c);
            }
            _ => {
                flush_word(&mut word, &mut first_word)?;
            }
        }
    }
    flush_word(&mut word, &mut first_word)?;

    match first_word {
        Some(first) if first.eq_ignore_ascii_case("SELECT") || first.eq_ignore_ascii_case("WITH") => {
            Ok(())
        }
        Some(first) => Err(format!(
            "statement must begin with SELECT or WITH, not {}",
            first.to_uppercase()
        )),
        None => Err("statement is empty".to_string()),
    }
}

/// Checks a completed word token and records the first one seen.
fn flush_word(word: &mut String, first_word: &mut Option<String>) -> Result<(), String> {
    if word.is_empty() {
        return Ok(());
    }

    let token = std::mem::take(word);

    for keyword in BANNED_KEYWORDS {
        if token.eq_ignore_ascii_case(keyword) {
            return Err(format!("write keyword {keyword} is not permitted"));
        }
    }

    if first_word.is_none() {
        *first_word = Some(token);
    }

    Ok(())
}

/// Removes at most one trailing semicolon.
fn strip_trailing_semicolon(sql: &str) -> &str {
    let trimmed = sql.trim_end();
    trimmed.strip_suffix(';').map(str::trim_end).unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_select() {
        assert!(scan_statement("SELECT * FROM transactions").is_ok());
    }

    #[test]
    fn accepts_single_trailing_semicolon() {
        assert!(scan_statement("SELECT 1;").is_ok());
    }

    #[test]
    fn rejects_inner_semicolon() {
        let err = scan_statement("SELECT 1; SELECT 2").unwrap_err();
        assert!(err.contains("multiple statements"));
    }

    #[test]
    fn rejects_banned_word() {
        let err = scan_statement("SELECT 1 UNION DELETE FROM t").unwrap_err();
        assert!(err.contains("DELETE"));
    }

    #[test]
    fn skips_banned_word_in_single_quotes() {
        assert!(scan_statement("SELECT 'DROP TABLE x' AS label").is_ok());
    }

    #[test]
    fn skips_banned_word_in_double_quotes() {
        assert!(scan_statement("SELECT \"delete\" FROM t").is_ok());
    }

    #[test]
    fn handles_escaped_single_quote() {
        // The doubled quote stays inside the literal; DROP never becomes a
        // token.
        assert!(scan_statement("SELECT 'it''s a DROP' FROM t").is_ok());
    }

    #[test]
    fn rejects_banned_word_in_comment() {
        let err = scan_statement("SELECT 1 -- DROP TABLE t").unwrap_err();
        assert!(err.contains("DROP"));
    }

    #[test]
    fn rejects_non_select_lead() {
        let err = scan_statement("VACUUM").unwrap_err();
        // VACUUM is banned outright before the lead check.
        assert!(err.contains("VACUUM"));

        let err = scan_statement("EXPLAIN SELECT 1").unwrap_err();
        assert!(err.contains("must begin with SELECT"));
    }

    #[test]
    fn accepts_with_lead() {
        assert!(scan_statement("WITH a AS (SELECT 1) SELECT * FROM a").is_ok());
    }

    #[test]
    fn substring_of_banned_word_is_fine() {
        // "created_at" contains CREATE but is not the whole-word token.
        assert!(scan_statement("SELECT created_at FROM transactions").is_ok());
        assert!(scan_statement("SELECT updated, deleted FROM audit_view").is_ok());
    }
}
