use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::{get, post}, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::article::{Article, Section};
use crate::catalog::Catalog;
use crate::completion::CompletionClient;
use crate::export::{self, BatchProgress, Download, ExportError, GenerationError};
use crate::models::LanguageModel;
use crate::session::Session;
use crate::settings::{
    resolve_effective_settings, GlobalConfigDefaults, RequestOverrides, SessionSettings, SessionSettingsPatch,
};
use crate::storage::{SessionRepository, SharedSession};
use crate::wizard::{ArticleConfiguration, UserInputForm, WizardError, WizardInput, WizardPage};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionRepository>,
    pub model: Arc<dyn LanguageModel>,
    pub catalog: Arc<Catalog>,
    pub defaults: Arc<GlobalConfigDefaults>,
    pub archive_dir: PathBuf,
    pub metrics: Option<PrometheusHandle>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("session not found: {0}")]
    SessionNotFound(Uuid),
    #[error(transparent)]
    Wizard(#[from] WizardError),
    #[error(transparent)]
    Generation(#[from] crate::article::ArticleError),
    #[error("{0}")]
    Internal(String),
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Wizard(e) => ApiError::Wizard(e),
            GenerationError::Article(e) => ApiError::Generation(e),
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Wizard(e) => ApiError::Wizard(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ApiError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Wizard(WizardError::NothingToDownload) => (StatusCode::NOT_FOUND, "nothing_to_download"),
            ApiError::Wizard(_) => (StatusCode::CONFLICT, "wizard_state"),
            ApiError::Generation(e) if e.is_transient() => (StatusCode::SERVICE_UNAVAILABLE, "completion_unavailable"),
            ApiError::Generation(_) => (StatusCode::BAD_GATEWAY, "completion_failed"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = Json(ErrorResponse { error: kind, message: self.to_string() });
        (status, body).into_response()
    }
}

async fn find_session(state: &AppState, id: Uuid) -> Result<SharedSession, ApiError> {
    state.sessions.get_session(id).await.ok_or(ApiError::SessionNotFound(id))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ArticleView {
    pub keyword: String,
    pub sections: Vec<Section>,
    pub text: String,
}

impl From<&Article> for ArticleView {
    fn from(article: &Article) -> Self {
        Self { keyword: article.keyword.clone(), sections: article.section_order(), text: article.render() }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionView {
    pub id: Uuid,
    pub page: WizardPage,
    pub form: Option<UserInputForm>,
    pub configuration: Option<ArticleConfiguration>,
    pub articles: Vec<ArticleView>,
    pub archive_ready: bool,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            page: session.page(),
            form: session.wizard.form().cloned(),
            configuration: session.wizard.config().cloned(),
            articles: session.articles.iter().map(ArticleView::from).collect(),
            archive_ready: session.archive.is_some(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PageResponse {
    pub page: WizardPage,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn catalog(State(state): State<AppState>) -> Json<Catalog> {
    Json(state.catalog.as_ref().clone())
}

#[derive(Debug, Deserialize, Default)]
pub struct CreateSessionBody {
    pub client_id: Option<String>,
    pub settings: Option<SessionSettings>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub id: Uuid,
    pub page: WizardPage,
}

async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionBody>>,
) -> Json<CreateSessionResponse> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let id = state.sessions.create_session(body.client_id, body.settings.unwrap_or_default()).await;
    info!(%id, "session started");
    Json(CreateSessionResponse { id, page: WizardPage::default() })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<Uuid>,
}

async fn list_sessions(State(state): State<AppState>) -> Json<ListSessionsResponse> {
    Json(ListSessionsResponse { sessions: state.sessions.list_sessions().await })
}

async fn get_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<SessionView>, ApiError> {
    let shared = find_session(&state, id).await?;
    let session = shared.lock().await;
    Ok(Json(SessionView::from(&*session)))
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    let mut session = state.sessions.delete_session(id).await.ok_or(ApiError::SessionNotFound(id))?;
    export::reset_session(&mut session);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct SessionSettingsResponse {
    settings: SessionSettings,
}

async fn get_session_settings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSettingsResponse>, ApiError> {
    let shared = find_session(&state, id).await?;
    let settings = shared.lock().await.settings.clone();
    Ok(Json(SessionSettingsResponse { settings }))
}

async fn patch_session_settings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<SessionSettingsPatch>,
) -> Result<Json<SessionSettingsResponse>, ApiError> {
    let shared = find_session(&state, id).await?;
    let mut session = shared.lock().await;
    session.settings.apply_patch(patch);
    Ok(Json(SessionSettingsResponse { settings: session.settings.clone() }))
}

async fn advance(state: &AppState, id: Uuid, input: WizardInput) -> Result<Json<PageResponse>, ApiError> {
    let shared = find_session(state, id).await?;
    let mut session = shared.lock().await;
    let page = session.wizard.advance(input)?;
    info!(%id, %page, "wizard advanced");
    Ok(Json(PageResponse { page }))
}

async fn submit_input(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(form): Json<UserInputForm>,
) -> Result<Json<PageResponse>, ApiError> {
    advance(&state, id, WizardInput::UserInput(form)).await
}

async fn submit_configuration(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(config): Json<ArticleConfiguration>,
) -> Result<Json<PageResponse>, ApiError> {
    advance(&state, id, WizardInput::Configure(config)).await
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub articles: Vec<ArticleView>,
}

async fn generate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    overrides: Option<Json<RequestOverrides>>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let overrides = overrides.map(|Json(o)| o).unwrap_or_default();
    let shared = find_session(&state, id).await?;
    let mut session = shared.lock().await;
    let effective = resolve_effective_settings(&state.defaults, &session.settings, &overrides);
    let client = CompletionClient::new(state.model.clone(), &effective);
    let mut on_progress = |p: &BatchProgress| {
        info!(
            session = %id,
            keyword = %p.keyword,
            item = p.keyword_index,
            items = p.keyword_total,
            section = %p.section,
            step = p.step,
            steps = p.total_steps,
            "generating"
        );
    };
    export::generate_for_session(&mut session, &client, &effective, &mut on_progress).await?;
    Ok(Json(GenerateResponse { articles: session.articles.iter().map(ArticleView::from).collect() }))
}

async fn download(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Response, ApiError> {
    let shared = find_session(&state, id).await?;
    let mut session = shared.lock().await;
    match export::prepare_download(&mut session, &state.archive_dir)? {
        Download::Text { filename, body } => Ok((
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
                (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
            ],
            body,
        )
            .into_response()),
        Download::Archive { filename, path } => {
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| ApiError::Internal(format!("reading {}: {}", path.display(), e)))?;
            Ok((
                [
                    (header::CONTENT_TYPE, "application/zip".to_string()),
                    (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
                ],
                bytes,
            )
                .into_response())
        }
    }
}

async fn confirm_download(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<PageResponse>, ApiError> {
    let shared = find_session(&state, id).await?;
    let mut session = shared.lock().await;
    export::confirm_download(&mut session)?;
    info!(%id, "download confirmed, session reset");
    Ok(Json(PageResponse { page: session.page() }))
}

async fn reset(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<PageResponse>, ApiError> {
    let shared = find_session(&state, id).await?;
    let mut session = shared.lock().await;
    export::reset_session(&mut session);
    Ok(Json(PageResponse { page: session.page() }))
}

async fn render_metrics(State(state): State<AppState>) -> Result<String, StatusCode> {
    state.metrics.as_ref().map(|h| h.render()).ok_or(StatusCode::NOT_FOUND)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .route("/v1/catalog", get(catalog))
        .route("/v1/sessions", post(create_session).get(list_sessions))
        .route("/v1/sessions/:id", get(get_session).delete(delete_session))
        .route("/v1/sessions/:id/settings", get(get_session_settings).patch(patch_session_settings))
        .route("/v1/sessions/:id/input", post(submit_input))
        .route("/v1/sessions/:id/configuration", post(submit_configuration))
        .route("/v1/sessions/:id/generate", post(generate))
        .route("/v1/sessions/:id/download", get(download))
        .route("/v1/sessions/:id/download/confirm", post(confirm_download))
        .route("/v1/sessions/:id/reset", post(reset))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
