use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::{
    task::JoinHandle,
    time::{sleep, sleep_until, Instant},
};
use tracing::{debug, error};
use uuid::Uuid;

use super::{cron_expression::CronSchedule, cron_job::JobHandle, status::StatusBroadcaster};

/// Delay before retrying when a schedule yields no upcoming fire time.
const EXHAUSTED_SCHEDULE_RETRY: Duration = Duration::from_secs(60);

/// A live timer firing a job on its schedule. Dropping it cancels the timer;
/// runs that already started are left to finish.
#[derive(Debug)]
pub struct ScheduledTask {
    id: Uuid,
    schedule: CronSchedule,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn spawn(job: JobHandle, schedule: CronSchedule, status: StatusBroadcaster) -> Self {
        let id = Uuid::new_v4();
        debug!("📅 Spawning timer {} for '{}' ({})", id, job.name(), schedule);

        let handle = tokio::spawn(run_timer(job, schedule.clone(), status));

        Self {
            id,
            schedule,
            handle,
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }

    #[must_use]
    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        self.schedule.next_after(Utc::now())
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run_timer(job: JobHandle, schedule: CronSchedule, status: StatusBroadcaster) {
    // Fire times strictly increase, even if the clock lags behind the last fire.
    let mut cursor = Utc::now();

    loop {
        let now = Utc::now();
        if now > cursor {
            cursor = now;
        }

        let Some(next_execution) = schedule.next_after(cursor) else {
            error!(
                "❌ Could not determine next execution time for job '{}'",
                job.name()
            );
            sleep(EXHAUSTED_SCHEDULE_RETRY).await;
            continue;
        };

        debug!(
            "🔄 Job '{}' next execution at: {}",
            job.name(),
            next_execution.format("%Y-%m-%d %H:%M:%S UTC")
        );

        wait_until_execution_time(next_execution, now).await;
        cursor = next_execution;

        // Runs are detached from the tick loop.
        let job = job.clone();
        let status = status.clone();
        tokio::spawn(async move {
            job.execute(&status).await;
        });
    }
}

async fn wait_until_execution_time(next_execution: DateTime<Utc>, now: DateTime<Utc>) {
    let sleep_duration = (next_execution - now).to_std().unwrap_or_default();
    if sleep_duration > Duration::ZERO {
        sleep_until(Instant::now() + sleep_duration).await;
    }
}
