//! Shared structs: descriptors, results and the per-source outcome envelope.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Static description of one search source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    pub id: &'static str,
    #[serde(rename = "name")]
    pub display_name: &'static str,
    #[serde(rename = "icon")]
    pub icon_glyph: &'static str,
    pub login_url: &'static str,
    pub search_needs_login: bool,
    /// Web search page for this source; `%s` is replaced by the query.
    #[serde(rename = "webSearchUrl")]
    pub web_search_url_template: &'static str,
    /// Origin the auth probe inspects for cookies.
    #[serde(skip)]
    pub origin: &'static str,
    /// Cookie names that mark a signed-in session. Empty means any cookie counts.
    #[serde(skip)]
    pub session_cookies: &'static [&'static str],
}

impl SourceDescriptor {
    /// Expand the web search template for `query`.
    pub fn web_search_url(&self, query: &str) -> String {
        self.web_search_url_template
            .replacen("%s", &crate::engine::sources::text::encode_component(query), 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl SearchResult {
    pub fn new(title: impl Into<String>, url: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }
}

/// What a source returns on success: results plus an optional upper-bound hint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub results: Vec<SearchResult>,
    pub total_count: Option<u64>,
}

impl SearchPage {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Normalised result of one source for one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SourceOutcome {
    #[serde(rename_all = "camelCase")]
    Ok {
        results: Vec<SearchResult>,
        total_count: Option<u64>,
    },
    AuthRequired,
    Failed { message: String },
}

impl SourceOutcome {
    pub fn results(&self) -> &[SearchResult] {
        match self {
            SourceOutcome::Ok { results, .. } => results,
            _ => &[],
        }
    }

    pub fn needs_login(&self) -> bool {
        matches!(self, SourceOutcome::AuthRequired)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            SourceOutcome::Failed { message } => Some(message),
            _ => None,
        }
    }

    /// Short label for a sidebar badge: `"30+"` when the source reports more
    /// matches than it returned, `"30"` otherwise. `None` unless `Ok`.
    pub fn count_label(&self) -> Option<String> {
        match self {
            SourceOutcome::Ok { results, total_count } => {
                let shown = results.len();
                match total_count {
                    Some(total) if *total > shown as u64 => Some(format!("{}+", shown)),
                    _ => Some(shown.to_string()),
                }
            }
            _ => None,
        }
    }

    /// Long-form total, only when it adds information beyond the list length.
    pub fn total_hint(&self) -> Option<String> {
        match self {
            SourceOutcome::Ok {
                results,
                total_count: Some(total),
            } if *total > results.len() as u64 => Some(format!(
                "{} results in total",
                crate::engine::sources::text::group_thousands(*total)
            )),
            _ => None,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            SourceOutcome::Ok { .. } => "ok",
            SourceOutcome::AuthRequired => "auth_required",
            SourceOutcome::Failed { .. } => "failed",
        }
    }
}

impl From<SearchPage> for SourceOutcome {
    fn from(page: SearchPage) -> Self {
        SourceOutcome::Ok {
            results: page.results,
            total_count: page.total_count,
        }
    }
}

/// Flat view of an outcome for UI layers that expect `error`/`needsLogin` fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub source_id: String,
    pub results: Vec<SearchResult>,
    pub total_count: Option<u64>,
    pub error: Option<String>,
    pub needs_login: bool,
}

impl SourceReport {
    pub fn new(source_id: impl Into<String>, outcome: &SourceOutcome) -> Self {
        let total_count = match outcome {
            SourceOutcome::Ok { total_count, .. } => *total_count,
            _ => None,
        };
        Self {
            source_id: source_id.into(),
            results: outcome.results().to_vec(),
            total_count,
            error: outcome.error().map(str::to_string),
            needs_login: outcome.needs_login(),
        }
    }
}

/// Identifies one aggregate call; attached to every delivery event.
pub type QueryId = Uuid;

/// sourceId -> outcome for one query.
pub type AggregateResultMap = HashMap<String, SourceOutcome>;

/// Delivery event emitted as soon as a single source settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialResult {
    pub query_id: QueryId,
    pub source_id: String,
    pub outcome: SourceOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(n: usize, total: Option<u64>) -> SourceOutcome {
        SourceOutcome::Ok {
            results: (0..n)
                .map(|i| SearchResult::new(format!("r{}", i), format!("https://e.com/{}", i), ""))
                .collect(),
            total_count: total,
        }
    }

    #[test]
    fn count_label_marks_truncated_lists() {
        assert_eq!(ok(30, Some(150)).count_label().as_deref(), Some("30+"));
        assert_eq!(ok(30, None).count_label().as_deref(), Some("30"));
        assert_eq!(ok(30, Some(30)).count_label().as_deref(), Some("30"));
        assert_eq!(SourceOutcome::AuthRequired.count_label(), None);
    }

    #[test]
    fn total_hint_uses_thousands_separators() {
        assert_eq!(
            ok(2, Some(12_345)).total_hint().as_deref(),
            Some("12,345 results in total")
        );
        assert_eq!(ok(2, Some(2)).total_hint(), None);
    }

    #[test]
    fn report_keeps_error_and_login_exclusive() {
        let failed = SourceReport::new("github", &SourceOutcome::Failed { message: "HTTP 500".into() });
        assert_eq!(failed.error.as_deref(), Some("HTTP 500"));
        assert!(!failed.needs_login);
        assert!(failed.results.is_empty());

        let auth = SourceReport::new("linuxdo", &SourceOutcome::AuthRequired);
        assert!(auth.needs_login);
        assert!(auth.error.is_none());
    }

    #[test]
    fn outcome_serializes_tagged() {
        let json = serde_json::to_value(ok(1, Some(5))).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["totalCount"], 5);
        let json = serde_json::to_value(SourceOutcome::AuthRequired).unwrap();
        assert_eq!(json["status"], "authRequired");
    }
}
