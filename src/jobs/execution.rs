use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, PoisonError,
    },
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::{
    cron_job::JobHandle,
    error_chain,
    status::{ExecutionStatus, JobRunStatus, StatusBroadcaster, StatusEvent},
    JobError,
};

pub type NameHook = Arc<dyn Fn(&str) + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(&str, &JobError) + Send + Sync>;

/// What happens when a run is requested while the previous one is still going.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Drop the new run and log a warning.
    #[default]
    Skip,
    /// Start the new run alongside the previous one.
    Concurrent,
}

#[derive(Clone, Default)]
pub struct ExecutionHooks {
    pub(crate) before_callback: Option<NameHook>,
    pub(crate) on_callback_success: Option<NameHook>,
    pub(crate) on_callback_error: Option<ErrorHook>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Succeeded { elapsed: Duration, slow: bool },
    Failed { elapsed: Duration },
    /// Another run was in progress and the overlap policy is `Skip`.
    Skipped,
}

impl ExecutionOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastExecution {
    pub timestamp: Option<DateTime<Utc>>,
    pub status: Option<ExecutionStatus>,
}

/// Counts in-flight runs of one job.
#[derive(Debug, Default)]
pub struct RunTracker {
    in_flight: AtomicUsize,
}

impl RunTracker {
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    fn acquire(&self, policy: OverlapPolicy) -> Option<RunGuard<'_>> {
        match policy {
            OverlapPolicy::Skip => self
                .in_flight
                .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                .ok()?,
            OverlapPolicy::Concurrent => self.in_flight.fetch_add(1, Ordering::SeqCst),
        };
        Some(RunGuard { tracker: self })
    }
}

/// Releases the run slot on drop, also when the run panics.
struct RunGuard<'a> {
    tracker: &'a RunTracker,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl JobHandle {
    /// Runs the callback once with timing, logging, hooks and status events.
    ///
    /// Never fails: callback errors and panics are reported and swallowed so
    /// the caller's schedule keeps going.
    pub async fn execute(&self, status: &StatusBroadcaster) -> ExecutionOutcome {
        let job = &self.inner;
        let Some(_guard) = job.runs.acquire(job.options.overlap_policy) else {
            warn!(
                "⏭️ Skipping '{}', the previous run is still in progress",
                job.name
            );
            return ExecutionOutcome::Skipped;
        };

        self.publish(status, JobRunStatus::Running);

        if let Some(hook) = &job.options.hooks.before_callback {
            run_hook(&job.name, "before_callback", || hook(&job.name));
        }

        let started_at = Utc::now();
        let started = Instant::now();
        let callback = AssertUnwindSafe(async { (job.callback)().await });
        let result = match callback.catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(JobError::failed(format!(
                "job panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };
        let elapsed = started.elapsed();

        let outcome = match result {
            Ok(()) => {
                if let Some(hook) = &job.options.hooks.on_callback_success {
                    run_hook(&job.name, "on_callback_success", || hook(&job.name));
                }

                let slow = elapsed > job.options.expected_maximum_duration;
                if slow {
                    warn!(
                        "🐢 Job '{}' took {}ms, expected at most {}ms",
                        job.name,
                        elapsed.as_millis(),
                        job.options.expected_maximum_duration.as_millis()
                    );
                } else {
                    info!("✅ Job '{}' finished in {}ms", job.name, elapsed.as_millis());
                }

                ExecutionOutcome::Succeeded { elapsed, slow }
            }
            Err(err) => {
                if let Some(hook) = &job.options.hooks.on_callback_error {
                    run_hook(&job.name, "on_callback_error", || hook(&job.name, &err));
                }

                log_failure(&job.name, &err, elapsed);
                ExecutionOutcome::Failed { elapsed }
            }
        };

        {
            let mut last = job
                .last_execution
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            last.timestamp = Some(started_at);
            last.status = Some(if outcome.is_success() {
                ExecutionStatus::Success
            } else {
                ExecutionStatus::Error
            });
        }

        self.publish(status, JobRunStatus::Idle);

        outcome
    }

    fn publish(&self, status: &StatusBroadcaster, run_status: JobRunStatus) {
        let last = self.last_execution();
        status.publish(StatusEvent {
            name: self.name().to_string(),
            status: run_status,
            last_execution_timestamp: last.timestamp,
            last_execution_status: last.status,
        });
    }
}

fn log_failure(name: &str, err: &JobError, elapsed: Duration) {
    match err {
        JobError::Network {
            message,
            status,
            target,
        } => {
            let status = status.map_or_else(|| "-".to_string(), |code| code.to_string());
            error!(
                "❌ Job '{}' failed after {}ms: {} (status {}, target {})",
                name,
                elapsed.as_millis(),
                message,
                status,
                target.as_deref().unwrap_or("-")
            );
        }
        JobError::Failed { .. } => {
            error!(
                "❌ Job '{}' failed after {}ms: {}",
                name,
                elapsed.as_millis(),
                error_chain(err)
            );
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Calls a user hook. A panic is logged and does not reach the caller.
fn run_hook(job: &str, hook: &str, call: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(call)) {
        error!(
            "💥 Hook '{}' of job '{}' panicked: {}",
            hook,
            job,
            panic_message(panic.as_ref())
        );
    }
}
