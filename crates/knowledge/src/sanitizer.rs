//! Query gate for model-generated SQL.
//!
//! Every generated query passes through [`Sanitizer::sanitize`] before it can
//! reach a store. The only way to obtain a [`SafeQuery`] is through the gate,
//! so `Store::execute_read_only` cannot be handed unchecked text.
//!
//! Normalization only ever removes a `SQL:` label with any prose in front of
//! it, a surrounding code fence, whitespace and one trailing `;`. A query that passed the gate starts
//! with `SELECT` and carries none of those, so sanitizing it again is a no-op.

use std::fmt;

use gamefi_core::AppError;
use regex_lite::Regex;
use thiserror::Error;

/// Reasons a generated query is refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SanitizeError {
    #[error("empty query")]
    Empty,

    #[error("multiple statements are not allowed")]
    MultipleStatements,

    #[error("disallowed keyword: {0}")]
    DisallowedKeyword(String),

    #[error("comment marker not allowed: {0}")]
    CommentMarker(String),

    #[error("query must start with {0}")]
    NotReadOnly(String),

    #[error("query has no FROM clause")]
    MissingFrom,

    #[error("invalid gate rules: {0}")]
    Rules(String),
}

impl From<SanitizeError> for AppError {
    fn from(err: SanitizeError) -> Self {
        match err {
            SanitizeError::Rules(msg) => AppError::Config(msg),
            other => AppError::UnsafeQuery(other.to_string()),
        }
    }
}

/// A query that passed the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeQuery(String);

impl SafeQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SafeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Allow-list grammar for the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizerRules {
    /// Label the generation format puts in front of the query
    pub prefix: String,

    /// Keyword the query must start with
    pub entry_keyword: String,

    /// Whole-word keywords that reject the query
    pub disallowed_keywords: Vec<String>,

    /// Substrings that reject the query
    pub disallowed_markers: Vec<String>,
}

impl Default for SanitizerRules {
    fn default() -> Self {
        Self {
            prefix: "SQL".to_string(),
            entry_keyword: "SELECT".to_string(),
            disallowed_keywords: [
                "DROP", "DELETE", "TRUNCATE", "ALTER", "CREATE", "INSERT", "UPDATE", "GRANT",
                "REVOKE", "EXEC", "EXECUTE",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
            disallowed_markers: ["--", "/*", "*/"].iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// Compiled query gate.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    rules: SanitizerRules,
    prefix: Regex,
    entry: Regex,
    from_clause: Regex,
    keywords: Option<Regex>,
}

impl Sanitizer {
    /// Compile the gate from its rules.
    pub fn new(rules: SanitizerRules) -> Result<Self, SanitizeError> {
        let compile =
            |pattern: &str| Regex::new(pattern).map_err(|e| SanitizeError::Rules(e.to_string()));

        let prefix = compile(&format!(
            r"(?i)\b{}:[ \t]*",
            regex_lite::escape(&rules.prefix)
        ))?;
        let entry = compile(&format!(r"(?i)^{}\b", regex_lite::escape(&rules.entry_keyword)))?;
        let from_clause = compile(r"(?i)\bfrom\b")?;

        let keywords = if rules.disallowed_keywords.is_empty() {
            None
        } else {
            let alternation = rules
                .disallowed_keywords
                .iter()
                .map(|k| regex_lite::escape(k))
                .collect::<Vec<_>>()
                .join("|");
            Some(compile(&format!(r"(?i)\b(?:{})\b", alternation))?)
        };

        Ok(Self {
            rules,
            prefix,
            entry,
            from_clause,
            keywords,
        })
    }

    pub fn rules(&self) -> &SanitizerRules {
        &self.rules
    }

    /// Validate and normalize a generated query.
    pub fn sanitize(&self, raw: &str) -> Result<SafeQuery, SanitizeError> {
        let candidate = self.normalize(raw);

        if candidate.is_empty() {
            return Err(SanitizeError::Empty);
        }

        if candidate.contains(';') {
            return Err(SanitizeError::MultipleStatements);
        }

        for marker in &self.rules.disallowed_markers {
            if candidate.contains(marker.as_str()) {
                return Err(SanitizeError::CommentMarker(marker.clone()));
            }
        }

        if let Some(ref keywords) = self.keywords {
            if let Some(m) = keywords.find(candidate) {
                return Err(SanitizeError::DisallowedKeyword(m.as_str().to_uppercase()));
            }
        }

        if !self.entry.is_match(candidate) {
            return Err(SanitizeError::NotReadOnly(self.rules.entry_keyword.clone()));
        }

        if !self.from_clause.is_match(candidate) {
            return Err(SanitizeError::MissingFrom);
        }

        Ok(SafeQuery(candidate.to_string()))
    }

    /// Strip the label and the prose before it, the code fence, whitespace
    /// and one trailing terminator.
    fn normalize<'a>(&self, raw: &'a str) -> &'a str {
        let mut text = raw.trim();

        if !self.entry.is_match(text) {
            if let Some(m) = self.prefix.find(text) {
                text = text[m.end()..].trim();
            }
            text = strip_fence(text);
        }

        let text = text.strip_suffix(';').unwrap_or(text);
        text.trim()
    }
}

/// Remove a surrounding Markdown code fence such as "```sql ... ```".
fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string on the opening line
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> Sanitizer {
        Sanitizer::new(SanitizerRules::default()).unwrap()
    }

    #[test]
    fn test_accepts_plain_select_unchanged() {
        let q = gate().sanitize("SELECT a FROM b").unwrap();
        assert_eq!(q.as_str(), "SELECT a FROM b");
    }

    #[test]
    fn test_preserves_case() {
        let q = gate().sanitize("select * from nft").unwrap();
        assert_eq!(q.as_str(), "select * from nft");
    }

    #[test]
    fn test_extracts_after_label_and_trailing_semicolon() {
        let q = gate()
            .sanitize("SQL: SELECT collection_slug, total_volume FROM collection_dynamic ORDER BY total_volume DESC LIMIT 5;")
            .unwrap();
        assert_eq!(
            q.as_str(),
            "SELECT collection_slug, total_volume FROM collection_dynamic ORDER BY total_volume DESC LIMIT 5"
        );
    }

    #[test]
    fn test_extracts_multiline_after_label() {
        let raw = "Here you go.\nsql:\nSELECT name\nFROM nft\nWHERE collection_slug = 'axie'\n";
        let q = gate().sanitize(raw).unwrap();
        assert_eq!(q.as_str(), "SELECT name\nFROM nft\nWHERE collection_slug = 'axie'");
    }

    #[test]
    fn test_extracts_after_label_mid_line() {
        let q = gate().sanitize("Here is the SQL: SELECT name FROM nft").unwrap();
        assert_eq!(q.as_str(), "SELECT name FROM nft");

        let q = gate()
            .sanitize("Sure, the query you need. sql:SELECT token_id FROM nft_listings;")
            .unwrap();
        assert_eq!(q.as_str(), "SELECT token_id FROM nft_listings");
    }

    #[test]
    fn test_label_inside_word_is_not_a_label() {
        let err = gate().sanitize("NoSQL: SELECT name FROM nft").unwrap_err();
        assert_eq!(err, SanitizeError::NotReadOnly("SELECT".to_string()));
    }

    #[test]
    fn test_strips_code_fence() {
        let raw = "SQL: ```sql\nSELECT token_id FROM nft_listings\n```";
        let q = gate().sanitize(raw).unwrap();
        assert_eq!(q.as_str(), "SELECT token_id FROM nft_listings");
    }

    #[test]
    fn test_rejects_chained_statement() {
        let err = gate().sanitize("SELECT * FROM t; DROP TABLE t").unwrap_err();
        assert_eq!(err, SanitizeError::MultipleStatements);
    }

    #[test]
    fn test_rejects_disallowed_keywords() {
        let gate = gate();
        for raw in [
            "SELECT * FROM t WHERE x IN (DELETE FROM t)",
            "select * from t union select * from pg_catalog.pg_user where 1=1 and exec",
            "SELECT drop FROM t",
            "UPDATE t SET a = 1",
        ] {
            assert!(
                matches!(gate.sanitize(raw), Err(SanitizeError::DisallowedKeyword(_))),
                "accepted: {}",
                raw
            );
        }
    }

    #[test]
    fn test_keyword_matching_uses_word_boundaries() {
        let q = gate()
            .sanitize("SELECT updated_at, created_date, is_deleted FROM collection")
            .unwrap();
        assert!(q.as_str().contains("updated_at"));
    }

    #[test]
    fn test_rejects_comment_markers() {
        let gate = gate();
        assert_eq!(
            gate.sanitize("SELECT a FROM b -- trailing").unwrap_err(),
            SanitizeError::CommentMarker("--".to_string())
        );
        assert!(matches!(
            gate.sanitize("SELECT a /* hidden */ FROM b"),
            Err(SanitizeError::CommentMarker(_))
        ));
    }

    #[test]
    fn test_requires_select_and_from() {
        let gate = gate();
        assert_eq!(
            gate.sanitize("WITH x AS (SELECT 1) SELECT * FROM x").unwrap_err(),
            SanitizeError::NotReadOnly("SELECT".to_string())
        );
        assert_eq!(gate.sanitize("SELECT 1").unwrap_err(), SanitizeError::MissingFrom);
        assert_eq!(gate.sanitize("ERROR").unwrap_err(), SanitizeError::NotReadOnly("SELECT".to_string()));
        assert_eq!(gate.sanitize("  ;  ").unwrap_err(), SanitizeError::Empty);
    }

    #[test]
    fn test_idempotent_on_accepted_queries() {
        let gate = gate();
        for raw in [
            "SELECT a FROM b",
            "SQL: select * from nft;",
            "```sql\nSELECT name FROM collection WHERE opensea_slug = 'pixels'\n```",
            "Sure!\nSQL: SELECT seller, price_val\nFROM nft_listings\nLIMIT 3;",
        ] {
            let once = gate.sanitize(raw).unwrap();
            let twice = gate.sanitize(once.as_str()).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_converts_to_unsafe_query_error() {
        let err: AppError = gate().sanitize("DROP TABLE nft").unwrap_err().into();
        assert!(matches!(err, AppError::UnsafeQuery(_)));
    }
}
