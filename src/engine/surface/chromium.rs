//! Headless Chromium surfaces via chromiumoxide.

use super::{LoadEvent, RenderSurface, SurfaceError, SurfaceFactory};
use crate::engine::credentials::{CredentialContext, StoredCookie};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Overrides Chromium auto-detection.
pub const CHROMIUM_PATH_VAR: &str = "QUICKLAUNCH_CHROMIUM_PATH";

/// Launches one shared headless browser on first use; each surface is a tab.
pub struct ChromiumSurfaceFactory {
    user_agent: String,
    browser: OnceCell<Browser>,
}

impl ChromiumSurfaceFactory {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            browser: OnceCell::new(),
        }
    }

    async fn launch(&self) -> Result<Browser> {
        let mut builder = BrowserConfig::builder()
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg(format!("--user-agent={}", self.user_agent));
        if let Ok(path) = std::env::var(CHROMIUM_PATH_VAR) {
            builder = builder.chrome_executable(PathBuf::from(path));
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler event error");
                }
            }
        });

        debug!("headless browser launched");
        Ok(browser)
    }

    async fn open_page(&self, credentials: &CredentialContext) -> Result<Page> {
        let browser = self.browser.get_or_try_init(|| self.launch()).await?;
        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        let cookies: Vec<CookieParam> = credentials
            .live_cookies()
            .into_iter()
            .filter_map(|c| {
                let domain = if c.host_only { c.domain } else { format!(".{}", c.domain) };
                CookieParam::builder()
                    .name(c.name)
                    .value(c.value)
                    .domain(domain)
                    .path(c.path)
                    .secure(c.secure)
                    .build()
                    .ok()
            })
            .collect();
        if !cookies.is_empty() {
            page.set_cookies(cookies).await.context("failed to inject cookies")?;
        }
        Ok(page)
    }
}

#[async_trait]
impl SurfaceFactory for ChromiumSurfaceFactory {
    async fn spawn(&self, credentials: Arc<CredentialContext>) -> Result<Box<dyn RenderSurface>, SurfaceError> {
        match self.open_page(&credentials).await {
            Ok(page) => Ok(Box::new(ChromiumSurface {
                page: Some(page),
                target: None,
                credentials,
            })),
            Err(e) => {
                warn!(source = credentials.source_id(), error = %e, "render surface unavailable");
                Err(SurfaceError(e.to_string()))
            }
        }
    }
}

/// One hidden tab, bound to a source's cookie jar in both directions.
pub struct ChromiumSurface {
    page: Option<Page>,
    target: Option<String>,
    credentials: Arc<CredentialContext>,
}

impl ChromiumSurface {
    fn page(&self) -> Result<&Page, SurfaceError> {
        self.page
            .as_ref()
            .ok_or_else(|| SurfaceError("surface closed".to_string()))
    }
}

#[async_trait]
impl RenderSurface for ChromiumSurface {
    async fn navigate(&mut self, url: &str) -> Result<(), SurfaceError> {
        self.page()?;
        self.target = Some(url.to_string());
        Ok(())
    }

    async fn wait_for_load(&mut self) -> LoadEvent {
        let (Ok(page), Some(target)) = (self.page(), self.target.as_deref()) else {
            return LoadEvent::Failed {
                reason: "nothing to load".to_string(),
            };
        };
        if let Err(e) = page.goto(target).await {
            return LoadEvent::Failed { reason: e.to_string() };
        }
        let url = page
            .url()
            .await
            .unwrap_or_default()
            .map(|u| u.to_string())
            .unwrap_or_else(|| target.to_string());
        LoadEvent::Finished { url }
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, SurfaceError> {
        let result = self
            .page()?
            .evaluate(script)
            .await
            .map_err(|e| SurfaceError(e.to_string()))?;
        result
            .into_value()
            .map_err(|e| SurfaceError(format!("failed to convert JS result: {e:?}")))
    }

    /// Writes cookies the page set or rotated back to the jar, then closes the tab.
    async fn close(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };
        match page.get_cookies().await {
            Ok(cookies) => {
                debug!(source = self.credentials.source_id(), count = cookies.len(), "saving page cookies");
                self.credentials.store_many(cookies.into_iter().map(|c| {
                    let expires = (!c.session).then_some(c.expires);
                    StoredCookie::from_browser(c.name, c.value, &c.domain, c.path, c.secure, expires)
                }));
            }
            Err(e) => debug!(error = %e, "could not read page cookies"),
        }
        if let Err(e) = page.close().await {
            debug!(error = %e, "page close failed");
        }
    }
}
