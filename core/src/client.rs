//! Per-operation request builders and response interpreters.
//!
//! # Design
//! `TrackerClient` holds only its `TrackerConfig` and carries no mutable state
//! between calls; the token is passed explicitly on every call. Each remote
//! action is split into a `build_*` method that produces an `HttpRequest` and
//! a `parse_*` method that interprets the decoded `Document`. The host runs
//! the exchange in between (see `Exchange`), keeping the core free of I/O.
//!
//! Every operation that returns a collection goes through the key-path
//! normalizer, so callers always get a `Vec`.

use std::fmt;

use crate::body::{project_body, story_body, Fields};
use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::http::{build_request, Credential, HttpMethod, HttpRequest, ListQuery};
use crate::tree::{Document, Node};

/// Iteration group addressed by `stories_by_iteration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationGroup {
    Current,
    Backlog,
    Done,
    CurrentBacklog,
}

impl IterationGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            IterationGroup::Current => "current",
            IterationGroup::Backlog => "backlog",
            IterationGroup::Done => "done",
            IterationGroup::CurrentBacklog => "current_backlog",
        }
    }
}

impl fmt::Display for IterationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateless request builder and response interpreter for the Tracker API.
#[derive(Debug, Clone)]
pub struct TrackerClient {
    config: TrackerConfig,
}

impl TrackerClient {
    pub fn new(config: TrackerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn get(&self, path: &str, token: &str) -> HttpRequest {
        build_request(&self.config, HttpMethod::Get, path, &Credential::token(token), None)
    }

    // -- tokens --------------------------------------------------------------

    pub fn build_authenticate(&self, username: &str, password: &str) -> HttpRequest {
        build_request(
            &self.config,
            HttpMethod::Get,
            "/tokens/active",
            &Credential::basic(username, password),
            None,
        )
    }

    /// The token's `guid`.
    pub fn parse_authenticate(&self, document: Document) -> Result<String, TrackerError> {
        document
            .body
            .field("guid")
            .map(str::to_string)
            .ok_or_else(|| TrackerError::NotFound {
                resource: "tokens",
                key_path: "guid".to_string(),
            })
    }

    // -- projects ------------------------------------------------------------

    pub fn build_all_projects(&self, query: &ListQuery, token: &str) -> HttpRequest {
        self.get(&format!("/projects{}", query.to_query_string()), token)
    }

    pub fn parse_all_projects(&self, document: Document) -> Result<Vec<Node>, TrackerError> {
        expand(document, "project", "projects")
    }

    pub fn build_add_project(&self, name: &str, token: &str) -> Result<HttpRequest, TrackerError> {
        let body = project_body(name)?;
        Ok(build_request(
            &self.config,
            HttpMethod::Post,
            "/projects",
            &Credential::token(token),
            Some(body),
        ))
    }

    /// The created project as echoed by the service.
    pub fn parse_add_project(&self, document: Document) -> Result<Node, TrackerError> {
        Ok(document.body)
    }

    // -- memberships ---------------------------------------------------------

    pub fn build_all_memberships(&self, project_id: u64, query: &ListQuery, token: &str) -> HttpRequest {
        self.get(
            &format!("/projects/{project_id}/memberships{}", query.to_query_string()),
            token,
        )
    }

    pub fn parse_all_memberships(&self, document: Document) -> Result<Vec<Node>, TrackerError> {
        expand(document, "membership", "memberships")
    }

    // -- iterations ----------------------------------------------------------

    pub fn build_all_iterations(&self, project_id: u64, query: &ListQuery, token: &str) -> HttpRequest {
        self.get(
            &format!("/projects/{project_id}/iterations{}", query.to_query_string()),
            token,
        )
    }

    pub fn parse_all_iterations(&self, document: Document) -> Result<Vec<Node>, TrackerError> {
        expand(document, "iteration", "iterations")
    }

    pub fn build_stories_by_iteration(
        &self,
        project_id: u64,
        group: IterationGroup,
        query: &ListQuery,
        token: &str,
    ) -> HttpRequest {
        self.get(
            &format!("/projects/{project_id}/iterations/{group}{}", query.to_query_string()),
            token,
        )
    }

    /// Iterations of the group, each carrying its own `stories`.
    pub fn parse_stories_by_iteration(&self, document: Document) -> Result<Vec<Node>, TrackerError> {
        expand(document, "iteration", "iterations")
    }

    // -- stories -------------------------------------------------------------

    pub fn build_stories_by_filter(&self, project_id: u64, query: &ListQuery, token: &str) -> HttpRequest {
        self.get(
            &format!("/projects/{project_id}/stories{}", query.to_query_string()),
            token,
        )
    }

    pub fn parse_stories_by_filter(&self, document: Document) -> Result<Vec<Node>, TrackerError> {
        expand(document, "story", "stories")
    }

    pub fn build_add_story(&self, project_id: u64, fields: &Fields, token: &str) -> Result<HttpRequest, TrackerError> {
        let body = story_body(fields)?;
        Ok(build_request(
            &self.config,
            HttpMethod::Post,
            &format!("/projects/{project_id}/stories"),
            &Credential::token(token),
            Some(body),
        ))
    }

    pub fn build_update_story(
        &self,
        project_id: u64,
        story_id: u64,
        fields: &Fields,
        token: &str,
    ) -> Result<HttpRequest, TrackerError> {
        let body = story_body(fields)?;
        Ok(build_request(
            &self.config,
            HttpMethod::Put,
            &format!("/projects/{project_id}/stories/{story_id}"),
            &Credential::token(token),
            Some(body),
        ))
    }

    pub fn build_delete_story(&self, project_id: u64, story_id: u64, token: &str) -> HttpRequest {
        build_request(
            &self.config,
            HttpMethod::Delete,
            &format!("/projects/{project_id}/stories/{story_id}"),
            &Credential::token(token),
            None,
        )
    }

    /// The story echoed back by add, update and delete.
    pub fn parse_story(&self, document: Document) -> Result<Node, TrackerError> {
        Ok(document.body)
    }
}

fn expand(document: Document, key_path: &str, resource: &'static str) -> Result<Vec<Node>, TrackerError> {
    document
        .body
        .into_expanded(key_path)
        .ok_or_else(|| TrackerError::NotFound {
            resource,
            key_path: key_path.to_string(),
        })
}
