//! Async HTTP fetch with an enforced deadline.
//!
//! Two flavours: plain requests through one shared client, and credentialed
//! requests through a per-source client whose cookie provider is that
//! source's [`CredentialContext`](super::credentials::CredentialContext).

use super::credentials::CredentialStore;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time;
use tracing::{debug, instrument};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(15_000);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Request timeout")]
    Timeout,
    #[error("{0}")]
    Network(String),
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_builder() {
            TransportError::Client(e.to_string())
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    /// Falls back to the transport's default when `None`.
    pub timeout: Option<Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            timeout: None,
        }
    }
}

impl FetchOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Fully-read response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

pub struct HttpTransport {
    client: Client,
    credentials: Arc<CredentialStore>,
    credentialed: Mutex<HashMap<String, Client>>,
    user_agent: String,
    default_timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        credentials: Arc<CredentialStore>,
        user_agent: impl Into<String>,
        default_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let user_agent = user_agent.into();
        let client = Client::builder()
            .user_agent(user_agent.clone())
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self {
            client,
            credentials,
            credentialed: Mutex::new(HashMap::new()),
            user_agent,
            default_timeout,
        })
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Plain request, no cookies.
    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse, TransportError> {
        self.execute(&self.client, url, options).await
    }

    /// Request bound to `context_id`'s cookie jar; cookies the server sets
    /// land in the same jar.
    pub async fn fetch_with_credentials(
        &self,
        context_id: &str,
        url: &str,
        options: &FetchOptions,
    ) -> Result<FetchResponse, TransportError> {
        let client = self.credentialed_client(context_id)?;
        self.execute(&client, url, options).await
    }

    fn credentialed_client(&self, context_id: &str) -> Result<Client, TransportError> {
        let mut clients = self.credentialed.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(context_id) {
            return Ok(client.clone());
        }
        let client = Client::builder()
            .user_agent(self.user_agent.clone())
            .cookie_provider(self.credentials.context(context_id))
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        clients.insert(context_id.to_string(), client.clone());
        Ok(client)
    }

    #[instrument(skip(self, client, options), fields(method = %options.method))]
    async fn execute(
        &self,
        client: &Client,
        url: &str,
        options: &FetchOptions,
    ) -> Result<FetchResponse, TransportError> {
        let deadline = options.timeout.unwrap_or(self.default_timeout);
        let mut request = client.request(options.method.clone(), url);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        // The deadline covers the body as well as the headers.
        let work = async move {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let final_url = response.url().to_string();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>(FetchResponse {
                status,
                url: final_url,
                body,
            })
        };

        match time::timeout(deadline, work).await {
            Ok(Ok(response)) => {
                debug!(status = response.status, bytes = response.body.len(), "fetched");
                Ok(response)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                debug!(timeout_ms = deadline.as_millis() as u64, "request aborted");
                Err(TransportError::Timeout)
            }
        }
    }
}
