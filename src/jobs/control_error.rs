use sea_orm::DbErr;
use thiserror::Error;

use super::cron_expression::CronParseError;

#[derive(Debug, Error)]
pub enum JobControlError {
    #[error("No job named '{0}' is registered")]
    UnknownJob(String),
    #[error("Invalid cron expression: {0}")]
    InvalidCron(#[from] CronParseError),
    #[error("Job '{0}' never runs on a schedule and cannot be rescheduled")]
    NotSchedulable(String),
    #[error("Job '{0}' does not allow manual execution")]
    ManualExecutionPrevented(String),
    #[error("Job configuration store failed: {0}")]
    Store(#[from] DbErr),
}
