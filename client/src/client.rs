//! Authenticated HTTP transport for the Exosphere API.

use std::time::Duration;

use exosphere_types::{
    CancelOutcome, GraphDefinition, GraphId, NodeDefinition, Run, RunId, TriggerRequest,
    TriggerResponse, UpsertGraphResponse, UpsertNodeModelResponse,
};
use reqwest::header::ACCEPT;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::ClientError;

pub const DEFAULT_BASE_URL: &str = "https://api.exosphere.host";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const TCP_KEEPALIVE: Duration = Duration::from_secs(60);
const POOL_MAX_IDLE_PER_HOST: usize = 100;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// Connection settings for [`ExosphereClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl ClientConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Point the client at a different deployment. Plain-http URLs are
    /// accepted for local development servers.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overall deadline applied to every non-streaming request.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Authenticated client for the Exosphere API.
///
/// Holds a connection pool; cheap to clone would be overstating it, so share
/// one instance by reference. All methods raise [`ClientError::Api`] with
/// status, status text, and a capped body excerpt on non-success responses.
#[derive(Debug)]
pub struct ExosphereClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    timeout: Duration,
}

impl ExosphereClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| ClientError::Config(format!("invalid base URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Config(format!(
                "base URL {base_url} cannot carry request paths"
            )));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .tcp_keepalive(Some(TCP_KEEPALIVE))
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(Some(POOL_IDLE_TIMEOUT))
            .build()?;

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key,
            timeout: config.timeout,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Current snapshot of a run. Any non-success response raises.
    pub async fn get_run(&self, run_id: &RunId) -> Result<Run, ClientError> {
        let url = self.endpoint(&["v1", "runs", run_id.as_str()]);
        self.get_json(url).await
    }

    /// Start a new run of a registered graph.
    pub async fn trigger(&self, request: &TriggerRequest) -> Result<TriggerResponse, ClientError> {
        let url = self.endpoint(&["v1", "runs", "trigger"]);
        self.post_json(url, request).await
    }

    /// Ask the service to cancel a run.
    pub async fn cancel_run(&self, run_id: &RunId) -> Result<CancelOutcome, ClientError> {
        let url = self.endpoint(&["v1", "runs", run_id.as_str(), "cancel"]);
        self.post_json(url, &serde_json::json!({})).await
    }

    /// Create or update a graph template.
    pub async fn upsert_graph(
        &self,
        graph: &GraphDefinition,
    ) -> Result<UpsertGraphResponse, ClientError> {
        let url = self.endpoint(&["v1", "graphs", "upsert"]);
        self.post_json(url, &serde_json::json!({ "graph": graph }))
            .await
    }

    /// Create or update a single node model within a graph.
    pub async fn upsert_node_model(
        &self,
        graph_id: &GraphId,
        node: &NodeDefinition,
    ) -> Result<UpsertNodeModelResponse, ClientError> {
        let url = self.endpoint(&["v1", "graphs", graph_id.as_str(), "nodes", "upsert"]);
        self.post_json(url, &serde_json::json!({ "node": node }))
            .await
    }

    /// Open the streaming event feed for a run.
    ///
    /// Returns the raw response without inspecting its status; the stream
    /// reader decides how to surface a non-success open. No overall timeout
    /// is applied here, the cancellation token bounds the request lifetime
    /// instead. Firing the token while the request is in flight raises
    /// [`ClientError::Cancelled`].
    pub async fn open_event_stream(
        &self,
        run_id: &RunId,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, ClientError> {
        let mut url = self.endpoint(&["v1", "runs", run_id.as_str(), "events"]);
        url.query_pairs_mut().append_pair("stream", "1");

        tracing::debug!(%run_id, %url, "opening event stream");
        let send = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .header(ACCEPT, "text/event-stream")
            .send();

        tokio::select! {
            () = cancel.cancelled() => Err(ClientError::Cancelled {
                run_id: run_id.clone(),
            }),
            response = send => Ok(response?),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            // Segments are percent-encoded here, so opaque ids are safe.
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T>(&self, url: Url) -> Result<T, ClientError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .header(ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await?;
        Self::decode_response(response).await
    }

    async fn post_json<T, B>(&self, url: Url, body: &B) -> Result<T, ClientError>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .header(ACCEPT, "application/json")
            .timeout(self.timeout)
            .json(body)
            .send()
            .await?;
        Self::decode_response(response).await
    }

    async fn decode_response<T>(response: reqwest::Response) -> Result<T, ClientError>
    where
        T: serde::de::DeserializeOwned,
    {
        let status = response.status();
        if !status.is_success() {
            let body = read_capped_error_body(response).await;
            return Err(ClientError::api(status, body));
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Read a response body for an error message without trusting its size.
pub(crate) async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}
