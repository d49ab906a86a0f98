//! HTTP handlers for the Vision API.
//!
//! `/analyze` and `/rank` answer with a server-sent-event stream:
//! `start`, then `item`/`ranking` events, then exactly one `complete` or
//! `error`. Anything rejected before the stream opens is a plain JSON error.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
};
use axum_helpers::{
    ValidatedJson,
    errors::responses::{
        BadRequestValidationResponse, InternalServerErrorResponse, NotFoundResponse,
        ServiceUnavailableResponse, UnprocessableEntityResponse,
    },
};
use chrono::Utc;
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::instrument;
use utoipa::OpenApi;

use crate::error::{VisionError, VisionResult};
use crate::models::{
    AnalyzeRequest, CandidateInput, Demographic, EndSessionResponse, IconCategory, ImagePayload,
    ItemCategory, ProviderKind, RankRequest, RankedCandidate, RankingJob, RecognizedItem,
    SessionImageResponse, StartEvent, StreamErrorPayload, StreamMetrics, TokenUsage,
};
use crate::orchestrator::{StreamUpdate, UpdateStream, VisionOrchestrator};
use crate::session::SessionStore;
use crate::usage::{InMemoryUsageRecorder, UsageSnapshot};

/// OpenAPI documentation for the Vision API
#[derive(OpenApi)]
#[openapi(
    paths(analyze, rank, get_session_image, end_session, get_usage),
    components(
        schemas(
            AnalyzeRequest, RankRequest, CandidateInput, RecognizedItem, RankedCandidate,
            ItemCategory, IconCategory, Demographic, ImagePayload, StartEvent,
            StreamErrorPayload, StreamMetrics, TokenUsage, ProviderKind,
            SessionImageResponse, EndSessionResponse, UsageSnapshot
        ),
        responses(
            BadRequestValidationResponse,
            NotFoundResponse,
            UnprocessableEntityResponse,
            ServiceUnavailableResponse,
            InternalServerErrorResponse
        )
    ),
    tags(
        (name = "Vision", description = "Product recognition and visual ranking streams")
    )
)]
pub struct ApiDoc;

/// Shared state of the vision routes
#[derive(Clone)]
pub struct VisionState {
    pub orchestrator: VisionOrchestrator,
    pub sessions: Arc<dyn SessionStore>,
    pub usage: Arc<InMemoryUsageRecorder>,
}

/// Create the vision router
pub fn router(state: VisionState) -> Router {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/rank", post(rank))
        .route("/sessions/{id}", axum::routing::delete(end_session))
        .route("/sessions/{id}/image", get(get_session_image))
        .route("/usage", get(get_usage))
        .with_state(state)
}

/// Stream recognized products for an image
#[utoipa::path(
    post,
    path = "/analyze",
    tag = "Vision",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "SSE stream: start, item*, complete | error", content_type = "text/event-stream"),
        (status = 400, response = BadRequestValidationResponse),
        (status = 503, response = ServiceUnavailableResponse)
    )
)]
#[instrument(skip_all, fields(session_id = ?request.session_id))]
async fn analyze(
    State(state): State<VisionState>,
    ValidatedJson(request): ValidatedJson<AnalyzeRequest>,
) -> VisionResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let image = ImagePayload::new(request.image);
    // Nothing reaches the provider until the response stream is polled.
    let updates = state.orchestrator.analyze(image.clone())?;

    if let Some(session_id) = &request.session_id {
        state.sessions.create(session_id.clone(), image).await;
    }

    Ok(event_stream(request.session_id, updates))
}

/// Stream ranked candidates for a product
#[utoipa::path(
    post,
    path = "/rank",
    tag = "Vision",
    request_body = RankRequest,
    responses(
        (status = 200, description = "SSE stream: start, ranking*, complete | error", content_type = "text/event-stream"),
        (status = 400, response = BadRequestValidationResponse),
        (status = 404, response = NotFoundResponse),
        (status = 422, response = UnprocessableEntityResponse),
        (status = 503, response = ServiceUnavailableResponse)
    )
)]
#[instrument(skip_all, fields(session_id = ?request.session_id, candidates = request.candidates.len()))]
async fn rank(
    State(state): State<VisionState>,
    ValidatedJson(request): ValidatedJson<RankRequest>,
) -> VisionResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    state.orchestrator.ensure_ranking_supported()?;

    let original = match (&request.session_id, request.image) {
        (Some(session_id), _) => {
            state
                .sessions
                .get(session_id)
                .await
                .ok_or_else(|| VisionError::SessionNotFound(session_id.clone()))?
                .image
        }
        (None, Some(image)) => ImagePayload::new(image),
        (None, None) => {
            return Err(VisionError::Validation(
                "either image or sessionId is required".to_string(),
            ));
        }
    };

    let updates = state.orchestrator.rank(RankingJob {
        original,
        product_name: request.product_name,
        category_tag: request.category_tag,
        candidates: request.candidates,
    })?;

    Ok(event_stream(request.session_id, updates))
}

/// Read the image stored in a session
#[utoipa::path(
    get,
    path = "/sessions/{id}/image",
    tag = "Vision",
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session image", body = SessionImageResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn get_session_image(
    State(state): State<VisionState>,
    Path(id): Path<String>,
) -> VisionResult<Json<SessionImageResponse>> {
    let session = state
        .sessions
        .get(&id)
        .await
        .ok_or(VisionError::SessionNotFound(id))?;
    Ok(Json(session.into()))
}

/// End a session. Ending a missing or expired session still succeeds.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    tag = "Vision",
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session ended", body = EndSessionResponse)
    )
)]
async fn end_session(
    State(state): State<VisionState>,
    Path(id): Path<String>,
) -> Json<EndSessionResponse> {
    let existed = state.sessions.end(&id).await;
    Json(EndSessionResponse {
        success: true,
        existed,
    })
}

/// Usage counters since process start
#[utoipa::path(
    get,
    path = "/usage",
    tag = "Vision",
    responses(
        (status = 200, description = "Usage counters", body = UsageSnapshot)
    )
)]
async fn get_usage(State(state): State<VisionState>) -> Json<UsageSnapshot> {
    Json(state.usage.snapshot())
}

fn event_stream(
    session_id: Option<String>,
    mut updates: UpdateStream,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        let start = StartEvent {
            timestamp: Utc::now(),
            session_id,
        };
        match Event::default().event("start").json_data(start) {
            Ok(event) => yield Ok(event),
            Err(e) => {
                yield Ok(error_event(&VisionError::Internal(e.to_string())));
                return;
            }
        }

        while let Some(update) = updates.next().await {
            let terminal = update.is_terminal();
            match update_event(update) {
                Ok(event) => yield Ok(event),
                Err(e) => {
                    yield Ok(error_event(&VisionError::Internal(e.to_string())));
                    return;
                }
            }
            if terminal {
                break;
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn update_event(update: StreamUpdate) -> Result<Event, axum::Error> {
    match update {
        StreamUpdate::Item(item) => Event::default().event("item").json_data(item),
        StreamUpdate::Ranking(candidate) => Event::default().event("ranking").json_data(candidate),
        StreamUpdate::Complete(metrics) => Event::default().event("complete").json_data(metrics),
        StreamUpdate::Error(err) => Ok(error_event(&err)),
    }
}

fn error_event(err: &VisionError) -> Event {
    let payload = StreamErrorPayload {
        message: err.to_string(),
        code: err.code().to_string(),
    };
    Event::default()
        .event("error")
        .json_data(payload)
        .unwrap_or_else(|_| Event::default().event("error").data(err.code()))
}
