//! Statement extraction from completion text.
//!
//! Completions may wrap SQL in markdown fences, prepend prose, or emit
//! bare SQL. Extraction prefers the first fenced code block; absent one,
//! it falls back to the first substring beginning at a standalone
//! `SELECT`/`WITH` keyword and ending at the final statement terminator
//! or end of text.

/// Result of extracting a statement from a completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    /// The SQL segment, as it appeared in the completion.
    pub sql: String,
    /// The completion with the SQL segment removed.
    pub commentary: String,
}

/// Extracts a SQL statement from completion text.
///
/// Returns `None` when no fenced block and no `SELECT`/`WITH` token is
/// present — the caller decides how to degrade.
pub fn extract_statement(completion: &str) -> Option<Extracted> {
    // Prefer an explicitly tagged block, then a bare fence.
    for lang in ["sql", ""] {
        if let Some(sql) = extract_code_block(completion, lang) {
            let sql = sql.trim();
            if !sql.is_empty() {
                return Some(Extracted {
                    sql: sql.to_string(),
                    commentary: remove_code_block(completion, lang).trim().to_string(),
                });
            }
        }
    }

    // No fence: take everything from the first SELECT/WITH keyword.
    let start = ["SELECT", "WITH"]
        .iter()
        .filter_map(|kw| find_keyword(completion, kw))
        .min()?;

    let tail = &completion[start..];
    let end = tail.rfind(';').map(|i| i + 1).unwrap_or(tail.len());

    Some(Extracted {
        sql: tail[..end].trim().to_string(),
        commentary: completion[..start].trim().to_string(),
    })
}

/// Finds the byte offset of `keyword` as a standalone word,
/// case-insensitively. ASCII lowercasing keeps byte offsets aligned with
/// the original text.
fn find_keyword(text: &str, keyword: &str) -> Option<usize> {
    let lower = text.to_ascii_lowercase();
    let needle = keyword.to_ascii_lowercase();
    let mut search_from = 0;

    while let Some(rel) = lower[search_from..].find(&needle) {
        let idx = search_from + rel;
        let before_ok = idx == 0
            || !lower[..idx]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        let after = idx + needle.len();
        let after_ok = after >= lower.len()
            || !lower[after..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');

        if before_ok && after_ok {
            return Some(idx);
        }
        search_from = idx + needle.len();
    }

    None
}

/// Extracts content from the first markdown code block with the given
/// language tag. Pass an empty `lang` to match untagged blocks.
fn extract_code_block(text: &str, lang: &str) -> Option<String> {
    let start_pattern = format!("```{lang}");

    let start_idx = text.find(&start_pattern)?;

    let content_start = text[start_idx + start_pattern.len()..]
        .find('\n')
        .map(|i| start_idx + start_pattern.len() + i + 1)?;

    // An untagged match must not actually be a tagged block.
    if lang.is_empty() {
        let after_fence = &text[start_idx + 3..content_start - 1];
        if !after_fence.trim().is_empty() {
            return None;
        }
    }

    let end_idx = text[content_start..].find("```")?;

    Some(text[content_start..content_start + end_idx].to_string())
}

/// Removes the first matching code block, returning the surrounding text.
fn remove_code_block(text: &str, lang: &str) -> String {
    let start_pattern = format!("```{lang}");

    let Some(start_idx) = text.find(&start_pattern) else {
        return text.to_string();
    };

    if lang.is_empty() {
        let after_fence_start = start_idx + 3;
        if let Some(newline_idx) = text[after_fence_start..].find('\n') {
            let after_fence = &text[after_fence_start..after_fence_start + newline_idx];
            if !after_fence.trim().is_empty() {
                return text.to_string();
            }
        }
    }

    let content_start = text[start_idx + start_pattern.len()..]
        .find('\n')
        .map(|i| start_idx + start_pattern.len() + i + 1);

    let Some(content_start) = content_start else {
        return text.to_string();
    };

    let Some(end_offset) = text[content_start..].find("```") else {
        return text.to_string();
    };

    let end_idx = content_start + end_offset + 3;

    let before = &text[..start_idx];
    let after = &text[end_idx..];

    format!("{}{}", before.trim_end(), after.trim_start())
}
