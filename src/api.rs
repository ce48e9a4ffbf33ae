//! HTTP surface.
//!
//! Every generate request runs the pipeline to completion before answering;
//! the job store only mirrors results for `GET /status/:id`.

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::jobs::{JobResponse, JobStatus, JobStore};
use crate::models::{PipelineResult, StoryRequest, TrendRequest};
use crate::pipeline::Pipeline;
use crate::trends::{TRENDS, TrendList};

pub const SERVICE_NAME: &str = "Vireo API";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub jobs: JobStore,
    /// Absolute base for returned URLs; relative URLs when unset.
    pub public_base_url: Option<String>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, public_base_url: Option<String>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            jobs: JobStore::default(),
            public_base_url: public_base_url.filter(|u| !u.trim().is_empty()),
        }
    }

    pub fn with_job_capacity(mut self, capacity: usize) -> Self {
        self.jobs = JobStore::with_capacity(capacity);
        self
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/trends", get(list_trends))
        .route("/generate-story", post(generate_story))
        .route("/generate-video", post(generate_video))
        .route("/status/:id", get(job_status))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Error body: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
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
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::UnknownTrend(_) => StatusCode::NOT_FOUND,
            PipelineError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true, "service": SERVICE_NAME }))
}

async fn list_trends(State(state): State<AppState>) -> Json<TrendList> {
    let base = state.public_base_url.as_deref().unwrap_or("");
    Json(TrendList {
        trends: TRENDS.iter().map(|t| t.summary(base)).collect(),
    })
}

async fn generate_story(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<JobResponse>)> {
    let request = read_story_form(multipart).await?;
    info!(
        "Story request: {} chars of prompt, {} images",
        request.prompt.len(),
        request.images.len()
    );

    let id = Uuid::new_v4();
    state.jobs.insert(id, JobResponse::processing(&id)).await;
    let outcome = state.pipeline.run_with_id(id, request).await;
    finish_job(&state, id, outcome).await
}

async fn generate_video(
    State(state): State<AppState>,
    Json(request): Json<TrendRequest>,
) -> ApiResult<(StatusCode, Json<JobResponse>)> {
    info!("Trend request for {}", request.trend_id);
    let id = Uuid::new_v4();
    state.jobs.insert(id, JobResponse::processing(&id)).await;
    let outcome = state.pipeline.run_trend_with_id(id, request).await;
    finish_job(&state, id, outcome).await
}

async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "invalid id"))?;
    state
        .jobs
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "job not found"))
}

async fn finish_job(
    state: &AppState,
    id: Uuid,
    outcome: Result<PipelineResult, PipelineError>,
) -> ApiResult<(StatusCode, Json<JobResponse>)> {
    match outcome {
        Ok(result) => {
            let response = JobResponse::from_result(&result, state.public_base_url.as_deref());
            state.jobs.insert(id, response.clone()).await;
            let code = if response.status == JobStatus::Completed {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Ok((code, Json(response)))
        }
        Err(PipelineError::Io(e)) => {
            warn!("Request {} could not start: {}", id, e);
            state.jobs.insert(id, JobResponse::failed(&id)).await;
            Err(PipelineError::Io(e).into())
        }
        Err(e) => {
            // rejected requests never become jobs
            state.jobs.remove(&id).await;
            Err(e.into())
        }
    }
}

async fn read_story_form(mut multipart: Multipart) -> ApiResult<StoryRequest> {
    let mut request = StoryRequest::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "prompt" => request.prompt = field_text(field).await?,
            "style" => request.style = field_text(field).await?,
            "images" | "images[]" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;
                request.images.push(bytes.to_vec());
            }
            other => warn!("Ignoring unknown form field '{}'", other),
        }
    }
    Ok(request)
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))
}
