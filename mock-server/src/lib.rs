//! In-memory stand-in for the Tracker v3 XML API.
//!
//! Serves the endpoints the client library talks to, with the same status
//! codes and XML shapes, so integration tests can run against real HTTP.

pub mod store;
pub mod xml;

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};

use store::{Db, Group};
use xml::IterationView;

pub const API_PREFIX: &str = "/services/v3";

/// The single account the mock accepts.
#[derive(Clone, Debug)]
pub struct MockConfig {
    pub username: String,
    pub password: String,
    pub token: String,
    pub email: String,
    pub display_name: String,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            username: "tester".to_string(),
            password: "secret".to_string(),
            token: "ABC123".to_string(),
            email: "tester@example.com".to_string(),
            display_name: "Test User".to_string(),
        }
    }
}

#[derive(Clone)]
struct AppState {
    config: Arc<MockConfig>,
    db: Arc<RwLock<Db>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub filter: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl ListParams {
    fn page<T>(&self, items: impl Iterator<Item = T>) -> Vec<T> {
        items
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// An XML response body.
struct Xml(String);

impl IntoResponse for Xml {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, "application/xml")], self.0).into_response()
    }
}

/// A failed request, rendered as Tracker's `<errors>` document.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Invalid or missing token")
    }

    fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{what} not found"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        debug!(status = %self.status, message = %self.message, "request rejected");
        (self.status, Xml(xml::errors(&self.message))).into_response()
    }
}

type ApiResult = Result<Xml, ApiError>;

pub fn app() -> Router {
    app_with(MockConfig::default())
}

pub fn app_with(config: MockConfig) -> Router {
    let state = AppState {
        config: Arc::new(config),
        db: Arc::new(RwLock::new(Db::default())),
    };
    let api = Router::new()
        .route("/tokens/active", get(active_token))
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/{project_id}/memberships", get(list_memberships))
        .route("/projects/{project_id}/iterations", get(list_iterations))
        .route("/projects/{project_id}/iterations/{group}", get(iteration_group))
        .route("/projects/{project_id}/stories", get(list_stories).post(create_story))
        .route(
            "/projects/{project_id}/stories/{story_id}",
            put(update_story).delete(delete_story),
        );
    Router::new().nest(API_PREFIX, api).with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!("mock tracker listening on http://{addr}{API_PREFIX}");
    }
    axum::serve(listener, app()).await
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let token = headers
        .get("x-trackertoken")
        .and_then(|v| v.to_str().ok());
    if token == Some(state.config.token.as_str()) {
        Ok(())
    } else {
        Err(ApiError::unauthorized())
    }
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

async fn active_token(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    let expected = (state.config.username.clone(), state.config.password.clone());
    match basic_credentials(&headers) {
        Some(given) if given == expected => Ok(Xml(xml::token(&state.config.token, 1))),
        _ => Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "Invalid username or password",
        )),
    }
}

async fn list_projects(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> ApiResult {
    authorize(&state, &headers)?;
    let db = state.db.read().await;
    Ok(Xml(xml::projects(params.page(db.projects()))))
}

async fn create_project(State(state): State<AppState>, headers: HeaderMap, body: String) -> ApiResult {
    authorize(&state, &headers)?;
    let fields = xml::read_fields(&body, "project")
        .map_err(|e| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e))?;
    let name = fields
        .into_iter()
        .find(|(k, _)| k == "name")
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "Name can't be blank"))?;
    let owner = (state.config.email.as_str(), state.config.display_name.as_str());
    let project = state.db.write().await.create_project(name, owner);
    info!(project_id = project.id, "project created");
    Ok(Xml(xml::project(&project)))
}

async fn list_memberships(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<u64>,
    Query(params): Query<ListParams>,
) -> ApiResult {
    authorize(&state, &headers)?;
    let db = state.db.read().await;
    let project = db.project(project_id).ok_or_else(|| ApiError::not_found("Project"))?;
    Ok(Xml(xml::memberships(project, params.page(project.memberships.iter()))))
}

fn iteration_views<'a>(
    project: &'a store::Project,
    groups: &[Group],
    params: &ListParams,
) -> Vec<IterationView<'a>> {
    let filter = params.filter.as_deref().unwrap_or_default();
    let views = groups.iter().map(|&group| IterationView {
        number: group.number(),
        stories: project.stories_in(group).filter(|s| s.matches(filter)).collect(),
    });
    params.page(views)
}

async fn list_iterations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<u64>,
    Query(params): Query<ListParams>,
) -> ApiResult {
    authorize(&state, &headers)?;
    let db = state.db.read().await;
    let project = db.project(project_id).ok_or_else(|| ApiError::not_found("Project"))?;
    let views = iteration_views(project, &[Group::Done, Group::Current, Group::Backlog], &params);
    Ok(Xml(xml::iterations(&views)))
}

async fn iteration_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((project_id, group)): Path<(u64, String)>,
    Query(params): Query<ListParams>,
) -> ApiResult {
    authorize(&state, &headers)?;
    let groups = Group::parse_path(&group).ok_or_else(|| ApiError::not_found("Iteration group"))?;
    let db = state.db.read().await;
    let project = db.project(project_id).ok_or_else(|| ApiError::not_found("Project"))?;
    Ok(Xml(xml::iterations(&iteration_views(project, &groups, &params))))
}

async fn list_stories(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<u64>,
    Query(params): Query<ListParams>,
) -> ApiResult {
    authorize(&state, &headers)?;
    let db = state.db.read().await;
    let project = db.project(project_id).ok_or_else(|| ApiError::not_found("Project"))?;
    let filter = params.filter.as_deref().unwrap_or_default();
    let matching = project.stories.values().filter(|s| s.matches(filter));
    Ok(Xml(xml::stories(params.page(matching))))
}

async fn create_story(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<u64>,
    body: String,
) -> ApiResult {
    authorize(&state, &headers)?;
    let fields = xml::read_fields(&body, "story")
        .map_err(|e| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e))?;
    let story = state
        .db
        .write()
        .await
        .create_story(project_id, fields)
        .ok_or_else(|| ApiError::not_found("Project"))?;
    info!(project_id, story_id = story.id, "story created");
    Ok(Xml(xml::story(&story)))
}

async fn update_story(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((project_id, story_id)): Path<(u64, u64)>,
    body: String,
) -> ApiResult {
    authorize(&state, &headers)?;
    let fields = xml::read_fields(&body, "story")
        .map_err(|e| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e))?;
    let story = state
        .db
        .write()
        .await
        .update_story(project_id, story_id, fields)
        .ok_or_else(|| ApiError::not_found("Story"))?;
    Ok(Xml(xml::story(&story)))
}

async fn delete_story(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((project_id, story_id)): Path<(u64, u64)>,
) -> ApiResult {
    authorize(&state, &headers)?;
    let story = state
        .db
        .write()
        .await
        .delete_story(project_id, story_id)
        .ok_or_else(|| ApiError::not_found("Story"))?;
    info!(project_id, story_id, "story deleted");
    Ok(Xml(xml::story(&story)))
}
