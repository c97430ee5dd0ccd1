use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use stagger_core::JobId;
use stagger_scheduler::{CreateJobRequest, JobSnapshot};
use std::sync::Arc;

use crate::app::AppState;
use crate::http::{email::EmailFields, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    #[serde(flatten)]
    pub email: EmailFields,
    /// e.g. `*/2 * * * *` for every two minutes.
    pub cron: String,
}

#[derive(Debug, Serialize)]
pub struct ScheduleReply {
    pub job_id: JobId,
    pub message: &'static str,
}

/// POST /schedule-staggered-email-job: create a job and send to the first
/// recipient before replying.
pub async fn schedule_staggered(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScheduleRequest>,
) -> Result<Json<ScheduleReply>, ApiError> {
    let request = CreateJobRequest {
        sender: req.email.sender()?,
        recipients: req.email.recipients()?,
        prompt: req.email.prompt.clone(),
        subject: req.email.subject(),
        cron: req.cron,
    };
    let job_id = state.controller.create_job(request).await?;
    Ok(Json(ScheduleReply {
        job_id,
        message: "Staggered email job scheduled.",
    }))
}

/// GET /jobs
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobSnapshot>> {
    Json(state.controller.jobs())
}

/// GET /jobs/{id}
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobSnapshot>, ApiError> {
    let snapshot = state.controller.job(&JobId::from(id))?;
    Ok(Json(snapshot))
}
