use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tenantdesk_queue::{Queue, QueueError};
use tracing::{error, info};

use crate::org::OrgAccess;
use crate::problem::ProblemResponse;
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnqueueResponse {
    pub job_id: String,
    pub queue: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CountsResponse {
    pub queue: String,
    pub waiting: u64,
}

pub async fn enqueue(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    OrgAccess(org_id): OrgAccess,
    Json(request): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>), ProblemResponse> {
    if request.name.trim().is_empty() {
        return Err(ProblemResponse::new(
            StatusCode::BAD_REQUEST,
            "invalid_job",
            "job name must not be empty",
        ));
    }

    let queue = open_queue(&state, &queue_name).await?;
    let job = queue
        .add(&request.name, request.data, Some(org_id.as_str()))
        .await
        .map_err(|err| queue_unavailable("enqueue", &queue_name, err))?;

    counter!("queue_jobs_enqueued_total", "backend" => queue.backend_kind()).increment(1);
    info!(stage = "queue", queue = %queue_name, job_id = %job.id, org_id = %org_id, job = %job.name, "job enqueued");

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            job_id: job.id,
            queue: queue_name,
        }),
    ))
}

pub async fn counts(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    OrgAccess(_org_id): OrgAccess,
) -> Result<Json<CountsResponse>, ProblemResponse> {
    let queue = open_queue(&state, &queue_name).await?;
    let waiting = queue
        .waiting_count()
        .await
        .map_err(|err| queue_unavailable("count", &queue_name, err))?;

    Ok(Json(CountsResponse {
        queue: queue_name,
        waiting,
    }))
}

async fn open_queue(state: &AppState, queue_name: &str) -> Result<Queue, ProblemResponse> {
    state
        .queue_factory()
        .create_queue(queue_name, state.queue_url())
        .await
        .map_err(|err| queue_unavailable("connect", queue_name, err))
}

fn queue_unavailable(operation: &'static str, queue_name: &str, err: QueueError) -> ProblemResponse {
    counter!("queue_errors_total", "operation" => operation).increment(1);
    error!(stage = "queue", queue = %queue_name, operation, error = %err, "queue operation failed");
    ProblemResponse::new(
        StatusCode::SERVICE_UNAVAILABLE,
        "queue_unavailable",
        "the job queue is currently unavailable",
    )
}
