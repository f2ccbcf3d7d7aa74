use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::{error::ControlApiError, validated_json::ValidatedJson};
use crate::{
    app::App,
    jobs::{validate_cron_expression, JobSummary},
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateIntervalRequest {
    #[validate(custom(function = "validate_cron"))]
    pub cron: String,
}

fn validate_cron(cron: &str) -> Result<(), ValidationError> {
    validate_cron_expression(cron).map_err(|err| {
        let mut error = ValidationError::new("cron");
        error.message = Some(err.to_string().into());
        error
    })
}

pub fn routes() -> Router<App> {
    Router::new()
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/{name}/start", post(start_job))
        .route("/api/jobs/{name}/trigger", post(trigger_job))
        .route("/api/jobs/{name}/stop", post(stop_job))
        .route("/api/jobs/{name}/enable", post(enable_job))
        .route("/api/jobs/{name}/disable", post(disable_job))
        .route("/api/jobs/{name}/interval", put(update_interval))
}

async fn list_jobs(State(app): State<App>) -> Result<Json<Vec<JobSummary>>, ControlApiError> {
    Ok(Json(app.jobs.get_all().await?))
}

async fn start_job(
    State(app): State<App>,
    Path(name): Path<String>,
) -> Result<StatusCode, ControlApiError> {
    app.jobs.start(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn trigger_job(
    State(app): State<App>,
    Path(name): Path<String>,
) -> Result<StatusCode, ControlApiError> {
    // The run continues in the background.
    let _run = app.jobs.trigger(&name).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn stop_job(
    State(app): State<App>,
    Path(name): Path<String>,
) -> Result<StatusCode, ControlApiError> {
    app.jobs.stop(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn enable_job(
    State(app): State<App>,
    Path(name): Path<String>,
) -> Result<StatusCode, ControlApiError> {
    app.jobs.enable(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn disable_job(
    State(app): State<App>,
    Path(name): Path<String>,
) -> Result<StatusCode, ControlApiError> {
    app.jobs.disable(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_interval(
    State(app): State<App>,
    Path(name): Path<String>,
    ValidatedJson(request): ValidatedJson<UpdateIntervalRequest>,
) -> Result<StatusCode, ControlApiError> {
    app.jobs.update_interval(&name, &request.cron).await?;
    Ok(StatusCode::NO_CONTENT)
}
