use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{
    control_error::JobControlError,
    cron_expression::CronExpression,
    execution::ExecutionOutcome,
    job_registry::{JobRegistry, RegisteredJob},
    status::StatusBroadcaster,
};

/// Lifecycle operations over every job of a registry.
#[derive(Debug, Clone)]
pub struct JobGroup {
    registry: Arc<JobRegistry>,
    status: StatusBroadcaster,
}

impl JobGroup {
    #[must_use]
    pub const fn new(registry: Arc<JobRegistry>, status: StatusBroadcaster) -> Self {
        Self { registry, status }
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    #[must_use]
    pub const fn status(&self) -> &StatusBroadcaster {
        &self.status
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.registry.keys()
    }

    fn entry(&self, name: &str) -> Result<&RegisteredJob, JobControlError> {
        self.registry
            .get(name)
            .ok_or_else(|| JobControlError::UnknownJob(name.to_string()))
    }

    /// Runs the job's start behaviour, then schedules it on its effective
    /// expression, replacing any live task.
    pub async fn start(&self, name: &str) -> Result<(), JobControlError> {
        let entry = self.entry(name)?;
        entry.handle().on_start(&self.status).await;
        self.schedule(entry, true);
        Ok(())
    }

    pub async fn start_all(&self) {
        info!("📅 Starting {} jobs", self.registry.len());
        for (_, entry) in self.registry.iter() {
            entry.handle().on_start(&self.status).await;
            self.schedule(entry, true);
        }
    }

    /// Schedules the job without start hooks. A job that is already ticking
    /// keeps its task.
    pub fn resume(&self, name: &str) -> Result<(), JobControlError> {
        let entry = self.entry(name)?;
        self.schedule(entry, false);
        Ok(())
    }

    /// Swaps the effective expression. The live task is replaced when one was
    /// running or when `start` is set; otherwise the job stays stopped.
    pub fn reschedule(
        &self,
        name: &str,
        cron: CronExpression,
        start: bool,
    ) -> Result<(), JobControlError> {
        let entry = self.entry(name)?;
        let handle = entry.handle();
        let mut slot = entry.slot();

        let was_scheduled = slot.task.is_some();
        slot.cron_expression = cron;
        if was_scheduled || start {
            slot.task = handle.create_task(&slot.cron_expression, self.status.clone());
        }

        info!(
            "🔄 Job '{}' now runs on '{}'{}",
            name,
            slot.cron_expression,
            if slot.task.is_some() { "" } else { " (stopped)" }
        );
        Ok(())
    }

    /// Executes the job once, outside its schedule.
    pub async fn run_manually(&self, name: &str) -> Result<ExecutionOutcome, JobControlError> {
        let entry = self.entry(name)?;
        let handle = entry.handle();
        if handle.prevent_manual_execution() {
            return Err(JobControlError::ManualExecutionPrevented(name.to_string()));
        }

        info!("▶️ Running job '{}' manually", name);
        Ok(handle.execute(&self.status).await)
    }

    /// Cancels future ticks. Runs in progress finish normally.
    pub fn stop(&self, name: &str) -> Result<(), JobControlError> {
        let entry = self.entry(name)?;
        if entry.slot().task.take().is_some() {
            info!("⏹️ Stopped job '{}'", name);
        } else {
            debug!("⏹️ Job '{}' was not scheduled", name);
        }
        Ok(())
    }

    pub fn stop_all(&self) {
        for (name, entry) in self.registry.iter() {
            if entry.slot().task.take().is_some() {
                debug!("⏹️ Stopped job '{}'", name);
            }
        }
        info!("⏹️ Stopped all jobs");
    }

    #[must_use]
    pub fn is_scheduled(&self, name: &str) -> bool {
        self.registry
            .get(name)
            .is_some_and(|entry| entry.slot().task.is_some())
    }

    #[must_use]
    pub fn next_run(&self, name: &str) -> Option<DateTime<Utc>> {
        self.registry
            .get(name)
            .and_then(|entry| entry.slot().task.as_ref().and_then(|task| task.next_run()))
    }

    fn schedule(&self, entry: &RegisteredJob, replace: bool) {
        let handle = entry.handle();
        let mut slot = entry.slot();
        if slot.task.is_some() && !replace {
            debug!("📅 Job '{}' is already scheduled", handle.name());
            return;
        }

        slot.task = handle.create_task(&slot.cron_expression, self.status.clone());
        match &slot.task {
            Some(task) => info!(
                "📅 Scheduled job '{}' on '{}' (next run {})",
                handle.name(),
                slot.cron_expression,
                task.next_run()
                    .map_or_else(|| "unknown".to_string(), |next| next.to_rfc3339())
            ),
            None => debug!("📅 Job '{}' never runs on a schedule", handle.name()),
        }
    }
}
