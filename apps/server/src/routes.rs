//! HTTP surface: axum router, wire types, and error mapping.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use learnpath_core::{BuildOutcome, GraphSummary, LearningPathService, PathRequest, SilentProgress};
use learnpath_graph::LearningPath;
use learnpath_shared::{
    AppConfig, ErrorKind, GraphId, LearnPathError, LearnerId, WeightVector,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

/// Shared handler state.
#[derive(Clone)]
pub(crate) struct AppState {
    pub service: Arc<LearningPathService>,
    /// Learner used when a request names none.
    pub default_learner: LearnerId,
    /// Whether `find_path` falls back to `default_learner`.
    pub apply_default_learner: bool,
}

impl AppState {
    /// Build the service and the request defaults from one config.
    pub(crate) fn new(config: AppConfig) -> learnpath_shared::Result<Self> {
        Ok(Self {
            default_learner: LearnerId::new(config.server.default_learner.clone()),
            apply_default_learner: config.pathfinding.apply_default_learner,
            service: Arc::new(LearningPathService::new(config)?),
        })
    }

    fn learner(&self, requested: Option<String>) -> LearnerId {
        requested
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .map(LearnerId::new)
            .unwrap_or_else(|| self.default_learner.clone())
    }
}

/// Build the application router.
pub(crate) fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/build_graph", post(build_graph))
        .route("/find_path", post(find_path))
        .route("/update_learner", post(update_learner))
        .route("/add_interest", post(add_interest))
        .route("/graphs/{id}", get(graph_summary))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// JSON body extractor whose rejections render as `{"detail": ...}`.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub(crate) struct ApiJson<T>(T);

#[derive(Debug, Deserialize)]
pub(crate) struct BuildGraphRequest {
    #[serde(default)]
    urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FindPathRequest {
    start: String,
    goal: String,
    #[serde(default)]
    weights: Option<WeightVector>,
    #[serde(default)]
    learner_id: Option<String>,
    #[serde(default)]
    graph_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateLearnerRequest {
    concept_id: String,
    mastery: f64,
    #[serde(default)]
    learner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddInterestRequest {
    concept_id: String,
    #[serde(default)]
    learner_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct KnowledgeStateResponse {
    knowledge_state: BTreeMap<String, f64>,
}

#[derive(Debug, Serialize)]
struct InterestsResponse {
    interests: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A failed request rendered as `{"detail": ...}`.
pub(crate) enum ApiError {
    /// The service refused or failed the operation.
    Service(LearnPathError),
    /// The body was not valid JSON for the endpoint.
    Body(JsonRejection),
}

impl From<LearnPathError> for ApiError {
    fn from(err: LearnPathError) -> Self {
        Self::Service(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Body(rejection)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::Service(err) => {
                let status = match err.kind() {
                    ErrorKind::Validation => StatusCode::BAD_REQUEST,
                    ErrorKind::NoResult => StatusCode::NOT_FOUND,
                    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    error!(error = %err, "request failed");
                } else {
                    debug!(error = %err, %status, "request rejected");
                }
                (status, err.detail())
            }
            Self::Body(rejection) => {
                let status = rejection.status();
                debug!(error = %rejection.body_text(), %status, "malformed request body");
                (status, rejection.body_text())
            }
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Adaptive Learning Pathfinder API is running.",
    })
}

async fn build_graph(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<BuildGraphRequest>,
) -> ApiResult<BuildOutcome> {
    let outcome = state.service.build_graph(&req.urls, &SilentProgress).await?;
    Ok(Json(outcome))
}

async fn find_path(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<FindPathRequest>,
) -> ApiResult<LearningPath> {
    let graph_id = req
        .graph_id
        .as_deref()
        .map(|raw| {
            raw.parse::<GraphId>()
                .map_err(|_| LearnPathError::validation(format!("Invalid graph_id '{raw}'.")))
        })
        .transpose()?;

    let named = req.learner_id.filter(|id| !id.trim().is_empty());
    let learner_id = if named.is_some() || state.apply_default_learner {
        Some(state.learner(named))
    } else {
        None
    };

    let request = PathRequest {
        start: req.start,
        goal: req.goal,
        weights: req.weights,
        learner_id,
        graph_id,
    };
    let path = state.service.find_path(&request).await?;
    Ok(Json(path))
}

async fn update_learner(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<UpdateLearnerRequest>,
) -> ApiResult<KnowledgeStateResponse> {
    let learner = state.learner(req.learner_id);
    let knowledge_state = state
        .service
        .update_learner(&learner, &req.concept_id, req.mastery)
        .await?;
    Ok(Json(KnowledgeStateResponse { knowledge_state }))
}

async fn add_interest(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AddInterestRequest>,
) -> ApiResult<InterestsResponse> {
    let learner = state.learner(req.learner_id);
    let interests = state.service.add_interest(&learner, &req.concept_id).await?;
    Ok(Json(InterestsResponse { interests }))
}

async fn graph_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<GraphSummary> {
    let graph_id = id
        .parse::<GraphId>()
        .map_err(|_| LearnPathError::GraphNotFound(id.clone()))?;
    let summary = state.service.graph_summary(graph_id).await?;
    Ok(Json(summary))
}
