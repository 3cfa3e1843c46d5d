//! Cookie-presence login checks. Never touches the network.

use super::credentials::CredentialStore;
use super::types::SourceDescriptor;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// A source's signed-in state may have changed; its status should be re-read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthChanged {
    pub source_id: String,
}

pub trait AuthListener: Send + Sync {
    fn auth_changed(&self, event: AuthChanged);
}

impl<F> AuthListener for F
where
    F: Fn(AuthChanged) + Send + Sync,
{
    fn auth_changed(&self, event: AuthChanged) {
        self(event)
    }
}

pub struct AuthProbe {
    store: Arc<CredentialStore>,
    sources: Vec<SourceDescriptor>,
}

impl AuthProbe {
    pub fn new(store: Arc<CredentialStore>, sources: Vec<SourceDescriptor>) -> Self {
        Self { store, sources }
    }

    fn lookup(&self, source_id: &str) -> Option<(&SourceDescriptor, Url)> {
        let source = self.sources.iter().find(|s| s.id == source_id)?;
        let origin = Url::parse(source.origin).ok()?;
        Some((source, origin))
    }

    /// Does the source's context hold any live cookie for its origin?
    pub fn is_authenticated(&self, source_id: &str) -> bool {
        match self.lookup(source_id) {
            Some((source, origin)) => self.store.context(source.id).has_cookies_for(&origin),
            None => false,
        }
    }

    /// Stricter check: one of the source's session cookies must be present.
    pub fn has_session(&self, source_id: &str) -> bool {
        match self.lookup(source_id) {
            Some((source, origin)) if !source.session_cookies.is_empty() => self
                .store
                .context(source.id)
                .has_named_cookie(&origin, source.session_cookies),
            Some(_) => self.is_authenticated(source_id),
            None => false,
        }
    }

    pub fn get_all_auth_status(&self) -> HashMap<String, bool> {
        self.sources
            .iter()
            .map(|s| (s.id.to_string(), self.is_authenticated(s.id)))
            .collect()
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::catalog::SOURCES;
    use crate::engine::credentials::StoredCookie;

    fn probe() -> (Arc<CredentialStore>, AuthProbe) {
        let store = Arc::new(CredentialStore::in_memory());
        let probe = AuthProbe::new(store.clone(), SOURCES.to_vec());
        (store, probe)
    }

    #[test]
    fn reports_every_source() {
        let (store, probe) = probe();
        store.context("github").store(StoredCookie::new("user_session", "1", "github.com"));

        let status = probe.get_all_auth_status();
        assert_eq!(status.len(), SOURCES.len());
        assert_eq!(status["github"], true);
        assert_eq!(status["reddit"], false);
    }

    #[test]
    fn cookie_must_cover_origin() {
        let (store, probe) = probe();
        // Stored in reddit's context but scoped to another site.
        store.context("reddit").store(StoredCookie::new("sid", "1", "old.example.com"));
        assert!(!probe.is_authenticated("reddit"));

        store.context("reddit").store(StoredCookie::new("sid", "1", "reddit.com"));
        assert!(probe.is_authenticated("reddit"));
    }

    #[test]
    fn session_requires_named_cookie() {
        let (store, probe) = probe();
        store.context("x").store(StoredCookie::new("guest_id", "g", "x.com"));
        assert!(probe.is_authenticated("x"));
        assert!(!probe.has_session("x"));

        store.context("x").store(StoredCookie::new("ct0", "c", "x.com"));
        assert!(probe.has_session("x"));
    }

    #[test]
    fn unknown_source_is_signed_out() {
        let (_, probe) = probe();
        assert!(!probe.is_authenticated("myspace"));
        assert!(!probe.has_session("myspace"));
    }
}
