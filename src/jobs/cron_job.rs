use std::{
    fmt::{self, Debug, Formatter},
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use futures_util::FutureExt;
use tracing::{debug, error};

use super::{
    cron_expression::{CronExpression, CronParseError},
    execution::{panic_message, ExecutionHooks, LastExecution, OverlapPolicy, RunTracker},
    status::StatusBroadcaster,
    JobError,
};
use crate::jobs::scheduled_task::ScheduledTask;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type JobCallback = Arc<dyn Fn() -> BoxFuture<'static, Result<(), JobError>> + Send + Sync>;
pub type StartHook = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

pub const DEFAULT_EXPECTED_MAXIMUM_DURATION: Duration = Duration::from_millis(2500);

/// Behaviour flags and hooks for a cron job.
#[derive(Clone)]
pub struct CronJobOptions {
    /// Execute once as soon as the job is started.
    pub run_on_start: bool,
    /// Reject manual triggers.
    pub prevent_manual_execution: bool,
    /// Runs taking longer than this are reported as slow, not failed.
    pub expected_maximum_duration: Duration,
    pub overlap_policy: OverlapPolicy,
    pub(crate) before_start: Option<StartHook>,
    pub(crate) hooks: ExecutionHooks,
}

impl Default for CronJobOptions {
    fn default() -> Self {
        Self {
            run_on_start: false,
            prevent_manual_execution: false,
            expected_maximum_duration: DEFAULT_EXPECTED_MAXIMUM_DURATION,
            overlap_policy: OverlapPolicy::default(),
            before_start: None,
            hooks: ExecutionHooks::default(),
        }
    }
}

impl Debug for CronJobOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronJobOptions")
            .field("run_on_start", &self.run_on_start)
            .field("prevent_manual_execution", &self.prevent_manual_execution)
            .field("expected_maximum_duration", &self.expected_maximum_duration)
            .field("overlap_policy", &self.overlap_policy)
            .finish_non_exhaustive()
    }
}

impl CronJobOptions {
    #[must_use]
    pub const fn run_on_start(mut self) -> Self {
        self.run_on_start = true;
        self
    }

    #[must_use]
    pub const fn prevent_manual_execution(mut self) -> Self {
        self.prevent_manual_execution = true;
        self
    }

    #[must_use]
    pub const fn expected_maximum_duration(mut self, duration: Duration) -> Self {
        self.expected_maximum_duration = duration;
        self
    }

    #[must_use]
    pub const fn overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.overlap_policy = policy;
        self
    }

    /// Runs once when the job is started, before any execution.
    #[must_use]
    pub fn before_start<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.before_start = Some(Arc::new(move || Box::pin(hook())));
        self
    }

    #[must_use]
    pub fn before_callback<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.hooks.before_callback = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn on_callback_success<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.hooks.on_callback_success = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn on_callback_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &JobError) + Send + Sync + 'static,
    {
        self.hooks.on_callback_error = Some(Arc::new(hook));
        self
    }
}

/// A named job with its compiled-in cadence, still missing its callback.
#[derive(Debug, Clone)]
pub struct JobDefinition {
    name: String,
    default_cron: CronExpression,
    options: CronJobOptions,
}

/// Builds a job definition, validating `default_cron` right away.
///
/// An invalid expression is a programming error in the composition root, so
/// callers at bootstrap are expected to treat the error as fatal.
pub fn create_cron_job(
    name: impl Into<String>,
    default_cron: &str,
    options: CronJobOptions,
) -> Result<JobDefinition, CronParseError> {
    let name = name.into();
    let default_cron: CronExpression = default_cron.parse()?;

    debug!("🧩 Created job '{}' ({})", name, default_cron);

    Ok(JobDefinition {
        name,
        default_cron,
        options,
    })
}

impl JobDefinition {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn default_cron(&self) -> &CronExpression {
        &self.default_cron
    }

    /// Attaches the business callback, producing the runtime handle.
    pub fn with_callback<F, Fut>(self, callback: F) -> JobHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        let callback: JobCallback = Arc::new(move || Box::pin(callback()));

        JobHandle {
            inner: Arc::new(JobInner {
                name: self.name,
                default_cron: self.default_cron,
                options: self.options,
                callback,
                runs: RunTracker::default(),
                last_execution: Mutex::new(LastExecution::default()),
            }),
        }
    }
}

pub(crate) struct JobInner {
    pub(crate) name: String,
    pub(crate) default_cron: CronExpression,
    pub(crate) options: CronJobOptions,
    pub(crate) callback: JobCallback,
    pub(crate) runs: RunTracker,
    pub(crate) last_execution: Mutex<LastExecution>,
}

/// Runtime handle of a registered job. Cheap to clone.
#[derive(Clone)]
pub struct JobHandle {
    pub(crate) inner: Arc<JobInner>,
}

impl Debug for JobHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("name", &self.inner.name)
            .field("default_cron", &self.inner.default_cron)
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl JobHandle {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn default_cron(&self) -> &CronExpression {
        &self.inner.default_cron
    }

    #[must_use]
    pub fn prevent_manual_execution(&self) -> bool {
        self.inner.options.prevent_manual_execution
    }

    #[must_use]
    pub fn run_on_start(&self) -> bool {
        self.inner.options.run_on_start
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.runs.is_running()
    }

    #[must_use]
    pub fn last_execution(&self) -> LastExecution {
        *self
            .inner
            .last_execution
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs the `before_start` hook, then executes once if `run_on_start`.
    pub async fn on_start(&self, status: &StatusBroadcaster) {
        if let Some(hook) = &self.inner.options.before_start {
            debug!("🧩 Running start hook for '{}'", self.name());
            if let Err(panic) = AssertUnwindSafe(async { hook().await }).catch_unwind().await {
                error!(
                    "💥 Start hook of job '{}' panicked: {}",
                    self.name(),
                    panic_message(panic.as_ref())
                );
            }
        }

        if self.run_on_start() {
            self.execute(status).await;
        }
    }

    /// Spawns a timer for `cron`. `never` produces no task.
    #[must_use]
    pub fn create_task(
        &self,
        cron: &CronExpression,
        status: StatusBroadcaster,
    ) -> Option<ScheduledTask> {
        cron.schedule()
            .map(|schedule| ScheduledTask::spawn(self.clone(), schedule.clone(), status))
    }
}
