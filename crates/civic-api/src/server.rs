//! Axum server and routes.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use civic_engine::IssueEngine;
use civic_types::{
    Actor, AuditLogEntry, BaseResponse, CommentCount, CreateIssueRequest, DuplicateRejection,
    EngineError, Issue, ListIssuesRequest, SetStatusRequest, UpvoteOutcome, UserRole,
    VerificationVote, VerifyRequest, VillageAnalytics, VoteOutcome,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const USER_VILLAGE_HEADER: &str = "x-user-village";

pub struct AppState {
    pub engine: Arc<IssueEngine>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/issues", post(handle_create).get(handle_list))
        .route("/api/issues/:id", get(handle_get))
        .route("/api/issues/:id/upvote", put(handle_upvote))
        .route("/api/issues/:id/status", patch(handle_set_status))
        .route("/api/issues/:id/verify", post(handle_verify))
        .route("/api/issues/:id/history", get(handle_history))
        .route("/api/issues/:id/comments", post(handle_comment))
        .route("/api/analytics", get(handle_analytics))
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Caller identity, supplied by the upstream identity provider in request headers.
pub struct Caller(pub Actor);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &'static str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ApiError::Unauthenticated(format!("missing {} header", name)))
        };
        let id = header(USER_ID_HEADER)?;
        let raw_role = header(USER_ROLE_HEADER)?;
        let village = header(USER_VILLAGE_HEADER)?;
        let role = UserRole::parse(raw_role)
            .ok_or_else(|| ApiError::Unauthenticated(format!("unknown role '{}'", raw_role)))?;
        Ok(Caller(Actor::new(id, role, village)))
    }
}

#[derive(Debug)]
pub enum ApiError {
    Unauthenticated(String),
    Engine(EngineError),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

fn status_for(e: &EngineError) -> StatusCode {
    match e {
        EngineError::Validation(_) | EngineError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
        EngineError::Permission(_) => StatusCode::FORBIDDEN,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Duplicate { .. } | EngineError::State(_) => StatusCode::CONFLICT,
        EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn envelope<T: serde::Serialize>(status: StatusCode, body: BaseResponse<T>) -> Response {
    (status, Json(body)).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthenticated(msg) => envelope(
                StatusCode::UNAUTHORIZED,
                BaseResponse::<()>::error(401, msg),
            ),
            ApiError::Engine(EngineError::Duplicate {
                duplicate_id,
                suggestion,
            }) => envelope(
                StatusCode::CONFLICT,
                BaseResponse {
                    code: 409,
                    message: "A similar issue has already been reported nearby".to_string(),
                    data: Some(DuplicateRejection {
                        duplicate_id,
                        suggestion,
                    }),
                },
            ),
            ApiError::Engine(e) => {
                let status = status_for(&e);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(error = %e, "request failed");
                }
                envelope(
                    status,
                    BaseResponse::<()>::error(i32::from(status.as_u16()), e.to_string()),
                )
            }
        }
    }
}

type ApiResult<T> = Result<Json<BaseResponse<T>>, ApiError>;

fn ok<T>(message: &str, data: T) -> ApiResult<T> {
    Ok(Json(BaseResponse::ok(message, data)))
}

async fn handle_create(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Json(req): Json<CreateIssueRequest>,
) -> ApiResult<Issue> {
    let issue = state.engine.create_issue(&caller, req).await?;
    ok("Issue created", issue)
}

async fn handle_list(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Query(filters): Query<ListIssuesRequest>,
) -> ApiResult<Vec<Issue>> {
    let issues = state.engine.list_issues(&caller, &filters).await?;
    ok("Success", issues)
}

async fn handle_get(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> ApiResult<Issue> {
    let issue = state.engine.get_issue(&caller, &id).await?;
    ok("Success", issue)
}

async fn handle_upvote(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> ApiResult<UpvoteOutcome> {
    let outcome = state.engine.toggle_upvote(&caller, &id).await?;
    let message = if outcome.upvoted {
        "Upvote added"
    } else {
        "Upvote removed"
    };
    ok(message, outcome)
}

async fn handle_set_status(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    Json(req): Json<SetStatusRequest>,
) -> ApiResult<Issue> {
    let issue = state.engine.set_status(&caller, &id, &req.status).await?;
    ok("Status updated", issue)
}

async fn handle_verify(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    Json(req): Json<VerifyRequest>,
) -> ApiResult<VoteOutcome> {
    let vote = VerificationVote::parse(&req.vote).ok_or_else(|| {
        EngineError::Validation(format!(
            "vote must be 'verified' or 'reopen', got '{}'",
            req.vote
        ))
    })?;
    let outcome = state
        .engine
        .cast_verification_vote(&caller, &id, vote)
        .await?;
    ok("Vote recorded", outcome)
}

async fn handle_history(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> ApiResult<Vec<AuditLogEntry>> {
    let entries = state.engine.list_history(&caller, &id).await?;
    ok("Success", entries)
}

async fn handle_comment(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> ApiResult<CommentCount> {
    let comment_count = state.engine.record_comment(&caller, &id).await?;
    ok("Comment recorded", CommentCount { comment_count })
}

async fn handle_analytics(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> ApiResult<VillageAnalytics> {
    let analytics = state.engine.analytics(&caller).await?;
    ok("Success", analytics)
}

async fn handle_health() -> &'static str {
    "ok"
}
