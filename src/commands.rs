use crate::config::LauncherConfig;
use crate::engine::sources::default_sources;
use crate::engine::surface::SurfaceFactory;
use crate::engine::transport::HttpTransport;
use crate::engine::{
    catalog, AuthChanged, AuthListener, AuthProbe, CredentialStore, DeliverySink, Orchestrator, OrchestratorError, QueryId, SearchQuery,
    SourceDescriptor, SourceOutcome, SourceReport,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

const UNKNOWN_SOURCE: &str = "Unknown source";

/// Everything the UI commands share. Build once per process.
pub struct LauncherState {
    orchestrator: Orchestrator,
    probe: Arc<AuthProbe>,
    credentials: Arc<CredentialStore>,
    auth_listener: Arc<dyn AuthListener>,
}

impl LauncherState {
    /// Wire the six built-in sources from `config`.
    pub fn new(config: &LauncherConfig, surfaces: Arc<dyn SurfaceFactory>) -> anyhow::Result<Self> {
        let credentials = Arc::new(if config.persist_credentials {
            CredentialStore::persistent(config.credentials_dir()?)
        } else {
            CredentialStore::in_memory()
        });
        let transport = Arc::new(HttpTransport::new(
            credentials.clone(),
            config.user_agent.clone(),
            config.request_timeout(),
        )?);
        let probe = Arc::new(AuthProbe::new(credentials.clone(), catalog::SOURCES.to_vec()));
        let sources = default_sources(config, transport, probe.clone(), surfaces);
        let orchestrator = Orchestrator::new(sources)?.with_settle_deadline(config.settle_deadline());
        Ok(Self::from_parts(orchestrator, probe, credentials))
    }

    pub fn from_parts(orchestrator: Orchestrator, probe: Arc<AuthProbe>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            orchestrator,
            probe,
            credentials,
            auth_listener: Arc::new(|_: AuthChanged| {}),
        }
    }

    /// Where `auth:changed` notifications go. Defaults to nowhere.
    pub fn with_auth_listener(mut self, listener: Arc<dyn AuthListener>) -> Self {
        self.auth_listener = listener;
        self
    }

    fn notify_auth_changed(&self, source_id: &str) {
        self.auth_listener.auth_changed(AuthChanged {
            source_id: source_id.to_string(),
        });
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }
}

/// Headless Chromium when built with the `chromium` feature, otherwise none.
#[cfg_attr(not(feature = "chromium"), allow(unused_variables))]
pub fn default_surfaces(config: &LauncherConfig) -> Arc<dyn SurfaceFactory> {
    #[cfg(feature = "chromium")]
    {
        Arc::new(crate::engine::surface::chromium::ChromiumSurfaceFactory::new(
            config.user_agent.clone(),
        ))
    }
    #[cfg(not(feature = "chromium"))]
    {
        Arc::new(crate::engine::surface::NoopSurfaceFactory)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResponse {
    pub ok: bool,
    pub query_id: Option<QueryId>,
    pub results: HashMap<String, SourceReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/* ---------- 1.  PLAIN SEARCH ---------- */

/// Default-engine URL for `query`. Opening it is the shell's job.
pub fn submit_search(query: &str) -> Result<String, String> {
    let query = SearchQuery::parse(query).map_err(|e| e.to_string())?;
    Ok(catalog::default_search_url(query.as_str()))
}

/* ---------- 2.  AGGREGATE ---------- */

pub async fn aggregate_search(state: &LauncherState, query: &str, sink: &dyn DeliverySink) -> AggregateResponse {
    match state.orchestrator.run_aggregate(query, sink).await {
        Ok(run) => AggregateResponse {
            ok: true,
            query_id: Some(run.query_id),
            results: run
                .results
                .iter()
                .map(|(id, outcome)| (id.clone(), SourceReport::new(id.as_str(), outcome)))
                .collect(),
            error: None,
        },
        Err(e) => AggregateResponse {
            ok: false,
            query_id: None,
            results: HashMap::new(),
            error: Some(e.to_string()),
        },
    }
}

/// Retry one source, e.g. after the user signed in.
pub async fn search_single(state: &LauncherState, query: &str, source_id: &str) -> SourceReport {
    let outcome = match state.orchestrator.run_single(query, source_id).await {
        Ok(outcome) => outcome,
        Err(OrchestratorError::UnknownSource(_)) => SourceOutcome::Failed {
            message: UNKNOWN_SOURCE.to_string(),
        },
        Err(e) => SourceOutcome::Failed { message: e.to_string() },
    };
    SourceReport::new(source_id, &outcome)
}

/* ---------- 3.  SOURCES & AUTH ---------- */

pub fn list_sources() -> Vec<SourceDescriptor> {
    catalog::SOURCES.to_vec()
}

pub fn auth_status(state: &LauncherState) -> HashMap<String, bool> {
    state.probe.get_all_auth_status()
}

/// Page the login window should open for `source_id`.
pub fn login_url(source_id: &str) -> Result<String, String> {
    catalog::find(source_id)
        .map(|s| s.login_url.to_string())
        .ok_or_else(|| UNKNOWN_SOURCE.to_string())
}

pub fn logout(state: &LauncherState, source_id: &str) -> Result<(), String> {
    if catalog::find(source_id).is_none() {
        return Err(UNKNOWN_SOURCE.to_string());
    }
    state.credentials.logout(source_id).map_err(|e| e.to_string())?;
    info!(source = source_id, "logged out");
    state.notify_auth_changed(source_id);
    Ok(())
}

/// The login window for `source_id` closed. Returns whether it is now signed in.
pub fn login_completed(state: &LauncherState, source_id: &str) -> Result<bool, String> {
    if catalog::find(source_id).is_none() {
        return Err(UNKNOWN_SOURCE.to_string());
    }
    let signed_in = state.probe.is_authenticated(source_id);
    info!(source = source_id, signed_in, "login window closed");
    state.notify_auth_changed(source_id);
    Ok(signed_in)
}
