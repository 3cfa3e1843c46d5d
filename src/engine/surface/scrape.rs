//! Bounded polling of a rendered page for result elements.
//!
//! States: `Idle -> AwaitingLoad -> Polling(1..=max_attempts) -> Resolved`.
//! Every failure path lands in `Resolved` with an empty list, and the whole
//! run is capped by `deadline_ms`.

use super::{LoadEvent, RenderSurface};
use crate::engine::sources::text::{truncate_chars, SNIPPET_CHARS};
use crate::engine::types::SearchResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Hard cap on one scrape, from spawn to resolution.
    pub deadline_ms: u64,
    /// Wait after load before the first poll.
    pub settle_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub max_results: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 15_000,
            settle_delay_ms: 2_000,
            poll_interval_ms: 1_500,
            max_attempts: 8,
            max_results: 10,
        }
    }
}

impl ScrapeConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeState {
    Idle,
    AwaitingLoad,
    Polling { attempt: u32 },
    Resolved(Vec<SearchResult>),
}

/// Result of a single extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll {
    NotYet,
    Found(Vec<SearchResult>),
}

/// Turn the extraction script's output into results.
///
/// Expects `null` (nothing rendered yet) or an array of
/// `{title, url, snippet}` objects. Entries without a url are dropped; the
/// title keeps only its first line.
pub fn parse_extraction(value: &Value, max_results: usize) -> Poll {
    let Some(entries) = value.as_array() else {
        return Poll::NotYet;
    };
    let results: Vec<SearchResult> = entries
        .iter()
        .take(max_results)
        .filter_map(|entry| {
            let url = entry.get("url").and_then(Value::as_str).filter(|u| !u.is_empty())?;
            let title = entry
                .get("title")
                .and_then(Value::as_str)
                .and_then(|t| t.lines().next())
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or("Tweet");
            let snippet = entry.get("snippet").and_then(Value::as_str).unwrap_or("");
            Some(SearchResult::new(title, url, truncate_chars(snippet, SNIPPET_CHARS)))
        })
        .collect();
    if results.is_empty() {
        Poll::NotYet
    } else {
        Poll::Found(results)
    }
}

pub struct Scraper<'a> {
    config: ScrapeConfig,
    url: String,
    script: &'a str,
    login_markers: &'a [&'a str],
    state: ScrapeState,
}

impl<'a> Scraper<'a> {
    /// `login_markers`: substrings of the final URL that mean "redirected to sign-in".
    pub fn new(url: impl Into<String>, script: &'a str, login_markers: &'a [&'a str], config: ScrapeConfig) -> Self {
        Self {
            config,
            url: url.into(),
            script,
            login_markers,
            state: ScrapeState::Idle,
        }
    }

    pub fn state(&self) -> &ScrapeState {
        &self.state
    }

    /// Perform one transition.
    pub async fn step(&mut self, surface: &mut dyn RenderSurface) {
        let next = match &self.state {
            ScrapeState::Idle => match surface.navigate(&self.url).await {
                Ok(()) => ScrapeState::AwaitingLoad,
                Err(e) => {
                    debug!(error = %e, "navigation refused");
                    ScrapeState::Resolved(Vec::new())
                }
            },
            ScrapeState::AwaitingLoad => match surface.wait_for_load().await {
                LoadEvent::Finished { url } if self.login_markers.iter().any(|m| url.contains(m)) => {
                    debug!(%url, "redirected to login, session is stale");
                    ScrapeState::Resolved(Vec::new())
                }
                LoadEvent::Finished { .. } => {
                    time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;
                    ScrapeState::Polling { attempt: 1 }
                }
                LoadEvent::Failed { reason } => {
                    debug!(%reason, "page failed to load");
                    ScrapeState::Resolved(Vec::new())
                }
            },
            ScrapeState::Polling { attempt } => {
                let attempt = *attempt;
                let poll = match surface.evaluate(self.script).await {
                    Ok(value) => parse_extraction(&value, self.config.max_results),
                    Err(e) => {
                        trace!(attempt, error = %e, "extraction failed");
                        Poll::NotYet
                    }
                };
                match poll {
                    Poll::Found(results) => ScrapeState::Resolved(results),
                    Poll::NotYet if attempt < self.config.max_attempts => {
                        time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
                        ScrapeState::Polling { attempt: attempt + 1 }
                    }
                    Poll::NotYet => {
                        debug!(attempts = attempt, "no results rendered");
                        ScrapeState::Resolved(Vec::new())
                    }
                }
            }
            ScrapeState::Resolved(_) => return,
        };
        self.state = next;
    }

    /// Drive to resolution, giving up with no results at the deadline.
    pub async fn run(mut self, surface: &mut dyn RenderSurface) -> Vec<SearchResult> {
        let deadline = self.config.deadline();
        let drive = async {
            loop {
                if let ScrapeState::Resolved(results) = &mut self.state {
                    return std::mem::take(results);
                }
                self.step(surface).await;
            }
        };
        match time::timeout(deadline, drive).await {
            Ok(results) => results,
            Err(_) => {
                debug!(deadline_ms = deadline.as_millis() as u64, "scrape deadline hit");
                Vec::new()
            }
        }
    }
}
