use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use reqwest::{redirect, Client, Method};
use tracing::{debug, instrument, trace};
use tracker_core::http::CONTENT_LENGTH_HEADER;
use tracker_core::{
    Document, Exchange, Fields, Flow, HttpMethod, HttpRequest, IterationGroup, ListQuery, Node,
    TrackerClient, TrackerConfig, TrackerError,
};

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Tracker API client over HTTP.
///
/// Holds no session state; every call takes its credential explicitly.
#[derive(Debug, Clone)]
pub struct Tracker {
    api: TrackerClient,
    http: Client,
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
    }
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Result<Self, TrackerError> {
        Self::with_timeouts(config, DEFAULT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn with_timeouts(
        config: TrackerConfig,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, TrackerError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            // A 3xx is a status like any other non-200.
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| TrackerError::Config(e.to_string()))?;

        Ok(Self {
            api: TrackerClient::new(config),
            http,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        self.api.config()
    }

    /// Send a request descriptor and decode the response.
    ///
    /// The status line is classified before the body is touched. On any
    /// failure status the response is dropped, which abandons the rest of
    /// the transfer. Redirects are not followed.
    pub async fn execute(&self, request: HttpRequest) -> Result<Document, TrackerError> {
        let url = self.config().url_for(&request);
        let mut builder = self.http.request(method(request.method), &url);
        for (name, value) in &request.headers {
            // reqwest frames a body itself; only the empty length is forwarded.
            if name.eq_ignore_ascii_case(CONTENT_LENGTH_HEADER) && request.body.is_some() {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        debug!(method = request.method.as_str(), %url, "sending request");
        let mut exchange = Exchange::new(request);

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return Err(exchange.fail(e)),
        };

        if exchange.on_status(response.status().as_u16()) == Flow::Abort {
            drop(response);
            return exchange.finish();
        }

        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk: Bytes = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return Err(exchange.fail(e)),
            };
            trace!(len = chunk.len(), "body chunk");
            if exchange.on_chunk(&chunk) == Flow::Abort {
                break;
            }
        }
        exchange.finish()
    }

    // =========================================================================
    // Tokens
    // =========================================================================

    /// Exchange a username and password for an API token.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<String, TrackerError> {
        let document = self.execute(self.api.build_authenticate(username, password)).await?;
        self.api.parse_authenticate(document)
    }

    // =========================================================================
    // Projects
    // =========================================================================

    #[instrument(skip(self, token))]
    pub async fn all_projects(&self, query: &ListQuery, token: &str) -> Result<Vec<Node>, TrackerError> {
        let document = self.execute(self.api.build_all_projects(query, token)).await?;
        self.api.parse_all_projects(document)
    }

    #[instrument(skip(self, token))]
    pub async fn add_project(&self, name: &str, token: &str) -> Result<Node, TrackerError> {
        let document = self.execute(self.api.build_add_project(name, token)?).await?;
        self.api.parse_add_project(document)
    }

    #[instrument(skip(self, token))]
    pub async fn all_memberships(
        &self,
        project_id: u64,
        query: &ListQuery,
        token: &str,
    ) -> Result<Vec<Node>, TrackerError> {
        let request = self.api.build_all_memberships(project_id, query, token);
        self.api.parse_all_memberships(self.execute(request).await?)
    }

    // =========================================================================
    // Iterations
    // =========================================================================

    #[instrument(skip(self, token))]
    pub async fn all_iterations(
        &self,
        project_id: u64,
        query: &ListQuery,
        token: &str,
    ) -> Result<Vec<Node>, TrackerError> {
        let request = self.api.build_all_iterations(project_id, query, token);
        self.api.parse_all_iterations(self.execute(request).await?)
    }

    /// Iterations of one group; each carries its own `stories`.
    #[instrument(skip(self, token))]
    pub async fn stories_by_iteration(
        &self,
        project_id: u64,
        group: IterationGroup,
        query: &ListQuery,
        token: &str,
    ) -> Result<Vec<Node>, TrackerError> {
        let request = self.api.build_stories_by_iteration(project_id, group, query, token);
        self.api.parse_stories_by_iteration(self.execute(request).await?)
    }

    // =========================================================================
    // Stories
    // =========================================================================

    #[instrument(skip(self, token))]
    pub async fn stories_by_filter(
        &self,
        project_id: u64,
        query: &ListQuery,
        token: &str,
    ) -> Result<Vec<Node>, TrackerError> {
        let request = self.api.build_stories_by_filter(project_id, query, token);
        self.api.parse_stories_by_filter(self.execute(request).await?)
    }

    #[instrument(skip(self, token))]
    pub async fn add_story(&self, project_id: u64, fields: &Fields, token: &str) -> Result<Node, TrackerError> {
        let request = self.api.build_add_story(project_id, fields, token)?;
        self.api.parse_story(self.execute(request).await?)
    }

    #[instrument(skip(self, token))]
    pub async fn update_story(
        &self,
        project_id: u64,
        story_id: u64,
        fields: &Fields,
        token: &str,
    ) -> Result<Node, TrackerError> {
        let request = self.api.build_update_story(project_id, story_id, fields, token)?;
        self.api.parse_story(self.execute(request).await?)
    }

    #[instrument(skip(self, token))]
    pub async fn delete_story(&self, project_id: u64, story_id: u64, token: &str) -> Result<Node, TrackerError> {
        let request = self.api.build_delete_story(project_id, story_id, token);
        self.api.parse_story(self.execute(request).await?)
    }
}
