//! X (Twitter): no usable public API, so the search page is rendered in a
//! hidden surface that shares the user's X cookies and the DOM is polled.

use super::text::encode_component;
use super::{trim_base, Source, SourceError};
use crate::engine::auth::AuthProbe;
use crate::engine::catalog;
use crate::engine::credentials::CredentialStore;
use crate::engine::query::SearchQuery;
use crate::engine::surface::scrape::{ScrapeConfig, Scraper};
use crate::engine::surface::{SurfaceFactory, SurfaceHandle};
use crate::engine::types::{SearchPage, SourceDescriptor};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time;
use tracing::debug;

/// Final URLs that mean the session was rejected.
const LOGIN_MARKERS: &[&str] = &["/login", "/i/flow"];

/// Returns `null` until tweets are rendered, then `[{title, url, snippet}]`.
const EXTRACT_SCRIPT: &str = r#"(() => {
  const articles = document.querySelectorAll('article[data-testid="tweet"]');
  if (articles.length === 0) return null;
  const out = [];
  for (const article of articles) {
    const name = article.querySelector('[data-testid="User-Name"]');
    const link = article.querySelector('a[href*="/status/"]');
    const text = article.querySelector('[data-testid="tweetText"]');
    out.push({
      title: name ? name.innerText : '',
      url: link ? link.href : '',
      snippet: text ? text.innerText : '',
    });
  }
  return out;
})()"#;

pub struct XSource {
    probe: Arc<AuthProbe>,
    surfaces: Arc<dyn SurfaceFactory>,
    credentials: Arc<CredentialStore>,
    base: String,
    scrape: ScrapeConfig,
}

impl XSource {
    pub fn new(
        probe: Arc<AuthProbe>,
        surfaces: Arc<dyn SurfaceFactory>,
        credentials: Arc<CredentialStore>,
        base: &str,
        scrape: ScrapeConfig,
    ) -> Self {
        Self {
            probe,
            surfaces,
            credentials,
            base: trim_base(base),
            scrape,
        }
    }

    fn search_url(&self, query: &SearchQuery) -> String {
        format!(
            "{}/search?q={}&src=typed_query&f=top",
            self.base,
            encode_component(query.as_str())
        )
    }
}

#[async_trait]
impl Source for XSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &catalog::X
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, SourceError> {
        if !self.probe.has_session(self.id()) {
            return Err(SourceError::AuthRequired);
        }

        let context = self.credentials.context(self.id());
        let scraper = Scraper::new(
            self.search_url(query),
            EXTRACT_SCRIPT,
            LOGIN_MARKERS,
            self.scrape.clone(),
        );
        // Spawn and teardown count against the same deadline as the scrape.
        // On expiry the handle's Drop closes whatever surface was opened.
        let render = async {
            let surface = match self.surfaces.spawn(context).await {
                Ok(surface) => surface,
                Err(e) => {
                    debug!(error = %e, "could not open a render surface");
                    return Vec::new();
                }
            };
            let mut handle = SurfaceHandle::new(surface);
            let results = handle.scrape(scraper).await;
            handle.teardown().await;
            results
        };
        let deadline = self.scrape.deadline();
        let results = match time::timeout(deadline, render).await {
            Ok(results) => results,
            Err(_) => {
                debug!(deadline_ms = deadline.as_millis() as u64, "render deadline hit");
                Vec::new()
            }
        };

        Ok(SearchPage {
            results,
            total_count: None,
        })
    }
}
