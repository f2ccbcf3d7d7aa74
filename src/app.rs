use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DatabaseConnection;
use thiserror::Error;

use crate::{
    config::Config,
    environment::Environment,
    jobs::{JobManager, StatusBroadcaster},
};

#[derive(Clone, Debug)]
pub struct App {
    pub config: Config,
    pub environment: Environment,
    pub db: DatabaseConnection,
    pub jobs: JobManager,
}

impl App {
    #[must_use]
    pub fn status(&self) -> &StatusBroadcaster {
        self.jobs.status()
    }
}

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("Database connection error")]
    DatabaseError(#[from] sea_orm::DbErr),
}

impl IntoResponse for ReadinessError {
    fn into_response(self) -> Response {
        (StatusCode::SERVICE_UNAVAILABLE, self.to_string()).into_response()
    }
}
