pub mod control_error;
pub mod cron_expression;
pub mod cron_job;
pub mod execution;
pub mod job_config_store;
pub mod job_group;
pub mod job_manager;
pub mod job_registry;
pub mod scheduled_task;
pub mod status;

use std::error::Error as StdError;

use thiserror::Error;

pub use control_error::JobControlError;
pub use cron_expression::{validate_cron_expression, CronExpression, CronParseError, CronSchedule};
pub use cron_job::{create_cron_job, CronJobOptions, JobDefinition, JobHandle};
pub use execution::{ExecutionOutcome, OverlapPolicy};
pub use job_config_store::{JobConfigStore, PersistedJobConfig};
pub use job_group::JobGroup;
pub use job_manager::{JobManager, JobSummary};
pub use job_registry::{JobRegistry, RegistryError};
pub use status::{ExecutionStatus, JobRunStatus, StatusBroadcaster, StatusEvent};

type BoxedSource = Box<dyn StdError + Send + Sync>;

/// Failure reported by a job's business callback.
///
/// Network failures carry enough context to be logged on a single line,
/// everything else is logged with its whole cause chain.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("{message}")]
    Network {
        message: String,
        status: Option<u16>,
        target: Option<String>,
    },
    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

impl JobError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            source: None,
        }
    }

    pub fn caused_by(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Failed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn network(
        message: impl Into<String>,
        status: Option<u16>,
        target: Option<impl Into<String>>,
    ) -> Self {
        Self::Network {
            message: message.into(),
            status,
            target: target.map(Into::into),
        }
    }

    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

impl From<reqwest::Error> for JobError {
    fn from(error: reqwest::Error) -> Self {
        let message = if error.is_timeout() {
            "request timed out".to_string()
        } else if error.is_connect() {
            "connection failed".to_string()
        } else if error.is_status() {
            "unexpected response status".to_string()
        } else {
            error.to_string()
        };

        Self::Network {
            message,
            status: error.status().map(|status| status.as_u16()),
            target: error.url().map(ToString::to_string),
        }
    }
}

impl From<sea_orm::DbErr> for JobError {
    fn from(error: sea_orm::DbErr) -> Self {
        Self::caused_by("database operation failed", error)
    }
}

/// Renders an error followed by each of its sources, `outer: inner: root`.
pub(crate) fn error_chain(error: &dyn StdError) -> String {
    let mut chain = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}
