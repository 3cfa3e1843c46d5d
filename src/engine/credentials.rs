//! Per-source isolated cookie storage.
//!
//! Every source gets its own [`CredentialContext`]. A context is created lazily
//! the first time it is asked for, mirrors its cookies to
//! `<profile>/credentials/<source>.json`, and is only emptied by [`CredentialStore::logout`].
//! Contexts double as reqwest cookie providers, so credentialed requests read
//! and write the same jar the auth probe inspects.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDateTime, TimeZone, Utc};
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Credential storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Credential file is corrupt: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    /// Lower-case, without a leading dot.
    pub domain: String,
    /// Set when the cookie had no `Domain` attribute: only the exact host gets it.
    pub host_only: bool,
    pub path: String,
    pub secure: bool,
    pub expires: Option<DateTime<Utc>>,
}

impl StoredCookie {
    /// Domain cookie valid for `domain` and its subdomains, path `/`, no expiry.
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: &str) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.trim_start_matches('.').to_ascii_lowercase(),
            host_only: false,
            path: "/".to_string(),
            secure: false,
            expires: None,
        }
    }

    /// A cookie read back from a browser profile. A leading dot on `domain`
    /// marks a domain cookie; `expires` is epoch seconds, `None` for session
    /// cookies.
    pub fn from_browser(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: &str,
        path: impl Into<String>,
        secure: bool,
        expires: Option<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.trim_start_matches('.').to_ascii_lowercase(),
            host_only: !domain.starts_with('.'),
            path: path.into(),
            secure,
            expires: expires.and_then(|secs| Utc.timestamp_opt(secs.trunc() as i64, 0).single()),
        }
    }

    /// Parse one `Set-Cookie` header received from `request_url`.
    ///
    /// Returns `None` for malformed headers and for cookies whose `Domain`
    /// does not cover the responding host.
    pub fn parse(header: &str, request_url: &Url, now: DateTime<Utc>) -> Option<Self> {
        let host = request_url.host_str()?.to_ascii_lowercase();
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Self {
            name: name.to_string(),
            value: value.trim().trim_matches('"').to_string(),
            domain: host.clone(),
            host_only: true,
            path: default_path(request_url),
            secure: false,
            expires: None,
        };

        let mut max_age: Option<i64> = None;
        let mut expires: Option<DateTime<Utc>> = None;

        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attr.trim(), ""),
            };
            match key.to_ascii_lowercase().as_str() {
                "domain" if !val.is_empty() => {
                    let domain = val.trim_start_matches('.').to_ascii_lowercase();
                    if !domain_matches(&host, &domain) {
                        return None;
                    }
                    cookie.domain = domain;
                    cookie.host_only = false;
                }
                "path" if val.starts_with('/') => cookie.path = val.to_string(),
                "secure" => cookie.secure = true,
                "max-age" => max_age = val.parse().ok(),
                "expires" => expires = parse_cookie_date(val),
                _ => {}
            }
        }

        // Max-Age wins over Expires.
        cookie.expires = match max_age {
            Some(secs) if secs <= 0 => Some(now - ChronoDuration::seconds(1)),
            Some(secs) => Some(now + ChronoDuration::seconds(secs)),
            None => expires,
        };
        Some(cookie)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.map_or(false, |at| at <= now)
    }

    /// Would a browser attach this cookie to a request for `url`?
    pub fn matches(&self, url: &Url, now: DateTime<Utc>) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let host_ok = if self.host_only {
            host == self.domain
        } else {
            domain_matches(&host, &self.domain)
        };
        host_ok
            && path_matches(url.path(), &self.path)
            && (!self.secure || url.scheme() == "https")
            && !self.is_expired(now)
    }

    fn same_slot(&self, other: &StoredCookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }
}

/// `Expires` in the shapes servers send: RFC 1123, the Netscape dashed
/// form (`Thu, 01-Jan-1970 00:00:00 GMT`), RFC 850 and asctime.
fn parse_cookie_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc2822(raw) {
        return Some(date.with_timezone(&Utc));
    }
    // The weekday is redundant and sometimes wrong.
    let rest = raw.split_once(',').map_or(raw, |(_, rest)| rest.trim());
    let parsed = ["%d-%b-%Y %H:%M:%S GMT", "%d %b %Y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(rest, format).ok())?;
    let parsed = match parsed.year() {
        0..=69 => parsed.with_year(parsed.year() + 2000)?,
        70..=99 => parsed.with_year(parsed.year() + 1900)?,
        _ => parsed,
    };
    Some(Utc.from_utc_datetime(&parsed))
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    request_path == cookie_path
        || (request_path.starts_with(cookie_path)
            && (cookie_path.ends_with('/')
                || request_path.as_bytes().get(cookie_path.len()) == Some(&b'/')))
}

fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Cookie jar for one source.
#[derive(Debug)]
pub struct CredentialContext {
    source_id: String,
    path: Option<PathBuf>,
    cookies: RwLock<Vec<StoredCookie>>,
}

impl CredentialContext {
    /// A context that lives only as long as the process.
    pub fn ephemeral(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            path: None,
            cookies: RwLock::new(Vec::new()),
        }
    }

    fn open(source_id: &str, path: PathBuf) -> Self {
        let cookies = match read_cookies(&path) {
            Ok(cookies) => cookies,
            Err(e) => {
                warn!(source = source_id, error = %e, "discarding unreadable credential file");
                Vec::new()
            }
        };
        debug!(source = source_id, count = cookies.len(), "opened credential context");
        Self {
            source_id: source_id.to_string(),
            path: Some(path),
            cookies: RwLock::new(cookies),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Insert or replace a cookie. Expired cookies delete their slot instead.
    pub fn store(&self, cookie: StoredCookie) {
        self.store_many(std::iter::once(cookie));
    }

    pub fn store_many(&self, incoming: impl IntoIterator<Item = StoredCookie>) {
        let now = Utc::now();
        let mut cookies = self.cookies.write().unwrap_or_else(PoisonError::into_inner);
        for cookie in incoming {
            cookies.retain(|c| !c.same_slot(&cookie));
            if !cookie.is_expired(now) {
                cookies.push(cookie);
            }
        }
        cookies.retain(|c| !c.is_expired(now));
        // Written under the lock so the file always holds the latest jar.
        self.persist(&cookies);
    }

    /// Every unexpired cookie, for seeding a browser profile.
    pub fn live_cookies(&self) -> Vec<StoredCookie> {
        let now = Utc::now();
        self.cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| !c.is_expired(now))
            .cloned()
            .collect()
    }

    /// Cookies a request to `url` would carry, most specific path first.
    pub fn cookies_for(&self, url: &Url) -> Vec<StoredCookie> {
        let now = Utc::now();
        let cookies = self.cookies.read().unwrap_or_else(PoisonError::into_inner);
        let mut matching: Vec<StoredCookie> = cookies
            .iter()
            .filter(|c| c.matches(url, now))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        matching
    }

    /// Empty values are how servers blank a cookie, so they never count.
    pub fn has_cookies_for(&self, url: &Url) -> bool {
        let now = Utc::now();
        self.cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|c| !c.value.is_empty() && c.matches(url, now))
    }

    pub fn has_named_cookie(&self, url: &Url, names: &[&str]) -> bool {
        let now = Utc::now();
        self.cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|c| !c.value.is_empty() && names.contains(&c.name.as_str()) && c.matches(url, now))
    }

    pub fn len(&self) -> usize {
        self.cookies.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cookie and the backing file.
    pub fn clear(&self) -> Result<(), CredentialError> {
        let mut cookies = self.cookies.write().unwrap_or_else(PoisonError::into_inner);
        cookies.clear();
        if let Some(path) = &self.path {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn persist(&self, cookies: &[StoredCookie]) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = write_cookies(path, cookies) {
            warn!(source = %self.source_id, error = %e, "failed to persist cookies");
        }
    }
}

impl reqwest::cookie::CookieStore for CredentialContext {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let now = Utc::now();
        let parsed: Vec<StoredCookie> = cookie_headers
            .filter_map(|h| h.to_str().ok())
            .filter_map(|h| StoredCookie::parse(h, url, now))
            .collect();
        if !parsed.is_empty() {
            debug!(source = %self.source_id, count = parsed.len(), "received cookies");
            self.store_many(parsed);
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let header = self
            .cookies_for(url)
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        if header.is_empty() {
            return None;
        }
        HeaderValue::from_str(&header).ok()
    }
}

fn read_cookies(path: &Path) -> Result<Vec<StoredCookie>, CredentialError> {
    match fs::read_to_string(path) {
        Ok(data) => Ok(serde_json::from_str(&data)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_cookies(path: &Path, cookies: &[StoredCookie]) -> Result<(), CredentialError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(cookies)?)?;
    Ok(())
}

fn sanitize_filename(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Owns every source's context. Cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct CredentialStore {
    dir: Option<PathBuf>,
    contexts: Mutex<HashMap<String, Arc<CredentialContext>>>,
}

impl CredentialStore {
    /// Contexts that vanish with the process. Used by tests and `--no-profile` runs.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Contexts persisted under `dir`.
    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            contexts: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self, source_id: &str) -> Arc<CredentialContext> {
        let mut contexts = self.contexts.lock().unwrap_or_else(PoisonError::into_inner);
        contexts
            .entry(source_id.to_string())
            .or_insert_with(|| {
                Arc::new(match &self.dir {
                    Some(dir) => CredentialContext::open(
                        source_id,
                        dir.join(format!("{}.json", sanitize_filename(source_id))),
                    ),
                    None => CredentialContext::ephemeral(source_id),
                })
            })
            .clone()
    }

    /// Forget everything stored for `source_id`.
    pub fn logout(&self, source_id: &str) -> Result<(), CredentialError> {
        self.context(source_id).clear()
    }
}
