//! HTTP client for the Solr update endpoint.
//!
//! One client is created per process and reused across requests. With
//! `background_update` enabled, each submit runs in a spawned worker task
//! while the caller prepares the next batch; only one request is ever in
//! flight, and a new submit first awaits the previous worker so that a
//! failure aborts the pipeline instead of going unnoticed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use url::Url;

use crate::errors::TransportError;
use crate::interfaces::UpdateTransport;

const AGENT: &str = concat!("record-indexer/", env!("CARGO_PKG_VERSION"));

/// Configuration of the Solr update client.
#[derive(Debug, Clone)]
pub struct SolrClientConfig {
    /// Backend POST target, e.g. `http://localhost:8983/solr/biblio/update`.
    pub update_url: String,
    /// Optional basic auth credentials.
    pub username: Option<String>,
    pub password: Option<String>,
    /// Run HTTP requests in a background worker task.
    pub background_update: bool,
    /// Default per-call timeout; `None` means no limit.
    pub timeout: Option<Duration>,
    /// Accept invalid TLS certificates. Off by default; legacy deployments
    /// that relied on disabled peer verification must opt in.
    pub accept_invalid_certs: bool,
}

impl SolrClientConfig {
    pub fn new(update_url: impl Into<String>) -> Self {
        Self {
            update_url: update_url.into(),
            username: None,
            password: None,
            background_update: false,
            timeout: None,
            accept_invalid_certs: false,
        }
    }
}

#[derive(Debug)]
struct RequestContext {
    client: reqwest::Client,
    url: Url,
    username: Option<String>,
    password: Option<String>,
}

/// Solr update endpoint client.
#[derive(Debug)]
pub struct SolrClient {
    context: RequestContext,
    config: SolrClientConfig,
    in_flight: Mutex<Option<JoinHandle<Result<(), TransportError>>>>,
}

impl SolrClient {
    /// Create a new client for the configured update endpoint.
    pub fn new(config: SolrClientConfig) -> Result<Self, TransportError> {
        let url = Url::parse(&config.update_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {e}", config.update_url)))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(AGENT));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| TransportError::http(e.to_string()))?;

        Ok(Self {
            context: RequestContext {
                client,
                url,
                username: config.username.clone(),
                password: config.password.clone(),
            },
            config,
            in_flight: Mutex::new(None),
        })
    }

    /// Await a previously spawned worker and surface its result.
    async fn join_worker(
        handle: JoinHandle<Result<(), TransportError>>,
    ) -> Result<(), TransportError> {
        match handle.await {
            Ok(result) => result,
            Err(e) => Err(TransportError::worker(e.to_string())),
        }
    }

    async fn post(
        context: &RequestContext,
        body: String,
        timeout: Option<Duration>,
    ) -> Result<(), TransportError> {
        let mut request = context.client.post(context.url.clone()).body(body);
        if let Some(username) = &context.username {
            request = request.basic_auth(username, context.password.as_deref());
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::http(e.to_string()))?;

        let status = response.status();
        if status.as_u16() >= 300 {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Update request failed");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(status = %status, "Update request accepted");
        Ok(())
    }
}

#[async_trait]
impl UpdateTransport for SolrClient {
    async fn submit(
        &self,
        body: String,
        timeout: Option<Duration>,
    ) -> Result<(), TransportError> {
        let mut in_flight = self.in_flight.lock().await;
        if let Some(previous) = in_flight.take() {
            Self::join_worker(previous).await?;
        }

        let timeout = timeout.or(self.config.timeout);

        if self.config.background_update {
            let client = self.context.client.clone();
            let url = self.context.url.clone();
            let username = self.context.username.clone();
            let password = self.context.password.clone();
            let handle = tokio::spawn(async move {
                let context = RequestContext {
                    client,
                    url,
                    username,
                    password,
                };
                let result = Self::post(&context, body, timeout).await;
                if let Err(e) = &result {
                    error!(error = %e, "Background update request failed");
                }
                result
            });
            *in_flight = Some(handle);
            Ok(())
        } else {
            Self::post(&self.context, body, timeout).await
        }
    }

    async fn wait_idle(&self) -> Result<(), TransportError> {
        let mut in_flight = self.in_flight.lock().await;
        match in_flight.take() {
            Some(handle) => Self::join_worker(handle).await,
            None => Ok(()),
        }
    }
}
