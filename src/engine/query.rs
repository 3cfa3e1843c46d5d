//! Validated search query wrapper.

use std::fmt;
use thiserror::Error;

/// Longest query (in characters, after trimming) any source is sent.
pub const MAX_QUERY_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Query is empty")]
    Empty,
    #[error("Query is too long ({len} characters, max {MAX_QUERY_CHARS})")]
    TooLong { len: usize },
}

/// Trimmed, non-empty query text of at most [`MAX_QUERY_CHARS`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchQuery {
    text: String,
}

impl SearchQuery {
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(QueryError::Empty);
        }
        let len = text.chars().count();
        if len > MAX_QUERY_CHARS {
            return Err(QueryError::TooLong { len });
        }
        Ok(Self {
            text: text.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl AsRef<str> for SearchQuery {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
