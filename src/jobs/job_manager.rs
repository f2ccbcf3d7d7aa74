//! Control façade over the job group and the persisted override store.
//!
//! Every mutating operation is serialised per job: the manager holds the
//! job's lock across the store round-trip and the live task swap, so two
//! concurrent requests for the same job cannot interleave their
//! read-modify-write.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{Mutex, MutexGuard},
    task::JoinHandle,
};
use tracing::{info, warn};

use super::{
    control_error::JobControlError,
    cron_expression::{CronExpression, CronSchedule},
    cron_job::JobHandle,
    execution::ExecutionOutcome,
    job_config_store::{JobConfigStore, PersistedJobConfig},
    job_group::JobGroup,
    job_registry::RegisteredJob,
    status::{ExecutionStatus, JobRunStatus, StatusBroadcaster},
};

/// Point-in-time view of one registered job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub name: String,
    /// Persisted override, or the compiled-in default.
    pub cron: String,
    pub prevent_manual_execution: bool,
    pub is_enabled: bool,
    pub status: JobRunStatus,
    pub last_execution_timestamp: Option<DateTime<Utc>>,
    pub last_execution_status: Option<ExecutionStatus>,
    pub next_execution: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct ManagerInner {
    group: JobGroup,
    store: JobConfigStore,
    locks: HashMap<String, Mutex<()>>,
}

#[derive(Debug, Clone)]
pub struct JobManager {
    inner: Arc<ManagerInner>,
}

impl JobManager {
    #[must_use]
    pub fn new(group: JobGroup, store: JobConfigStore) -> Self {
        let locks = group
            .keys()
            .map(|name| (name.to_string(), Mutex::new(())))
            .collect();

        Self {
            inner: Arc::new(ManagerInner {
                group,
                store,
                locks,
            }),
        }
    }

    #[must_use]
    pub fn group(&self) -> &JobGroup {
        &self.inner.group
    }

    #[must_use]
    pub fn store(&self) -> &JobConfigStore {
        &self.inner.store
    }

    #[must_use]
    pub fn status(&self) -> &StatusBroadcaster {
        self.inner.group.status()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.group.registry().contains(name)
    }

    async fn lock(&self, name: &str) -> Result<MutexGuard<'_, ()>, JobControlError> {
        match self.inner.locks.get(name) {
            Some(lock) => Ok(lock.lock().await),
            None => Err(JobControlError::UnknownJob(name.to_string())),
        }
    }

    fn entry(&self, name: &str) -> Result<&RegisteredJob, JobControlError> {
        self.inner
            .group
            .registry()
            .get(name)
            .ok_or_else(|| JobControlError::UnknownJob(name.to_string()))
    }

    fn schedulable_entry(&self, name: &str) -> Result<&RegisteredJob, JobControlError> {
        let entry = self.entry(name)?;
        if entry.handle().default_cron().is_never() {
            return Err(JobControlError::NotSchedulable(name.to_string()));
        }
        Ok(entry)
    }

    /// Resumes ticking on the effective expression. Starting a scheduled job
    /// changes nothing.
    pub async fn start(&self, name: &str) -> Result<(), JobControlError> {
        let _guard = self.lock(name).await?;
        self.inner.group.resume(name)?;
        info!("▶️ Started job '{}'", name);
        Ok(())
    }

    /// Runs the job once right away. The returned handle resolves when the
    /// run completes; dropping it does not cancel the run.
    pub async fn trigger(
        &self,
        name: &str,
    ) -> Result<JoinHandle<ExecutionOutcome>, JobControlError> {
        let handle = self.entry(name)?.handle().clone();
        if handle.prevent_manual_execution() {
            warn!("🚫 Manual execution of job '{}' is not allowed", name);
            return Err(JobControlError::ManualExecutionPrevented(name.to_string()));
        }

        info!("▶️ Triggered job '{}'", name);
        let status = self.status().clone();
        Ok(tokio::spawn(async move { handle.execute(&status).await }))
    }

    /// Pauses ticking. Persisted configuration is left as is.
    pub async fn stop(&self, name: &str) -> Result<(), JobControlError> {
        let _guard = self.lock(name).await?;
        self.inner.group.stop(name)
    }

    /// Persists a new interval, then swaps the live schedule. On any error
    /// the previous schedule keeps running.
    pub async fn update_interval(&self, name: &str, cron: &str) -> Result<(), JobControlError> {
        let _guard = self.lock(name).await?;
        let entry = self.schedulable_entry(name)?;
        let schedule: CronSchedule = cron.parse()?;

        let saved = self
            .inner
            .store
            .upsert(seed(entry.handle()), |config| {
                config.cron_expression = Some(schedule.as_str().to_string());
            })
            .await?;

        self.inner
            .group
            .reschedule(name, CronExpression::Schedule(schedule), saved.is_enabled)?;
        info!("🔄 Updated interval of job '{}' to '{}'", name, cron.trim());
        Ok(())
    }

    pub async fn disable(&self, name: &str) -> Result<(), JobControlError> {
        let _guard = self.lock(name).await?;
        let entry = self.schedulable_entry(name)?;

        self.inner
            .store
            .upsert(seed(entry.handle()), |config| config.is_enabled = false)
            .await?;

        self.inner.group.stop(name)?;
        info!("⏸️ Disabled job '{}'", name);
        Ok(())
    }

    pub async fn enable(&self, name: &str) -> Result<(), JobControlError> {
        let _guard = self.lock(name).await?;
        let entry = self.schedulable_entry(name)?;

        self.inner
            .store
            .upsert(seed(entry.handle()), |config| config.is_enabled = true)
            .await?;

        self.inner.group.resume(name)?;
        info!("✅ Enabled job '{}'", name);
        Ok(())
    }

    /// One summary per registered job, sorted by name.
    pub async fn get_all(&self) -> Result<Vec<JobSummary>, JobControlError> {
        let mut persisted: HashMap<String, PersistedJobConfig> = self
            .inner
            .store
            .find_all()
            .await?
            .into_iter()
            .map(|config| (config.name.clone(), config))
            .collect();

        let summaries = self
            .inner
            .group
            .registry()
            .iter()
            .map(|(name, entry)| {
                let handle = entry.handle();
                let config = persisted.remove(name);
                let default = handle.default_cron();

                let cron = config
                    .as_ref()
                    .and_then(|config| config.cron_expression.as_deref())
                    .filter(|cron| cron.parse::<CronExpression>().is_ok())
                    .map_or_else(|| default.to_string(), str::to_string);
                let is_enabled = config
                    .as_ref()
                    .map_or(!default.is_never(), |config| config.is_enabled);
                let last = handle.last_execution();

                JobSummary {
                    name: name.to_string(),
                    cron,
                    prevent_manual_execution: handle.prevent_manual_execution(),
                    is_enabled,
                    status: if handle.is_running() {
                        JobRunStatus::Running
                    } else {
                        JobRunStatus::Idle
                    },
                    last_execution_timestamp: last.timestamp,
                    last_execution_status: last.status,
                    next_execution: self.inner.group.next_run(name),
                }
            })
            .collect();

        Ok(summaries)
    }

    /// Boot-time rehydration: applies persisted overrides, then starts every
    /// enabled job. `never` jobs are started for their start behaviour;
    /// disabled jobs stay stopped.
    pub async fn start_all(&self) -> Result<(), JobControlError> {
        let persisted: HashMap<String, PersistedJobConfig> = self
            .inner
            .store
            .find_all()
            .await?
            .into_iter()
            .map(|config| (config.name.clone(), config))
            .collect();

        info!(
            "📅 Scheduler starting {} jobs ({} with stored configuration)",
            self.inner.group.registry().len(),
            persisted.len()
        );

        for (name, entry) in self.inner.group.registry().iter() {
            let _guard = self.lock(name).await?;
            let default = entry.handle().default_cron();
            let config = persisted.get(name);

            if let Some(cron) = config.and_then(|config| config.cron_expression.as_deref()) {
                self.apply_override(name, default, cron)?;
            }

            let is_enabled = default.is_never() || config.is_none_or(|config| config.is_enabled);
            if is_enabled {
                self.inner.group.start(name).await?;
            } else {
                info!("⏸️ Job '{}' is disabled, not starting", name);
            }
        }

        Ok(())
    }

    fn apply_override(
        &self,
        name: &str,
        default: &CronExpression,
        cron: &str,
    ) -> Result<(), JobControlError> {
        if default.is_never() {
            return Ok(());
        }

        match cron.parse::<CronSchedule>() {
            Ok(schedule) if schedule.as_str() == default.to_string() => Ok(()),
            Ok(schedule) => {
                self.inner
                    .group
                    .reschedule(name, CronExpression::Schedule(schedule), false)
            }
            Err(err) => {
                warn!(
                    "⚠️ Ignoring stored interval '{}' of job '{}': {}",
                    cron, name, err
                );
                Ok(())
            }
        }
    }

    pub fn shutdown(&self) {
        self.inner.group.stop_all();
    }
}

/// Row inserted when a job has no stored configuration yet.
fn seed(handle: &JobHandle) -> PersistedJobConfig {
    let default = handle.default_cron();
    PersistedJobConfig {
        name: handle.name().to_string(),
        cron_expression: Some(default.to_string()),
        is_enabled: !default.is_never(),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    use super::*;
    use crate::jobs::{
        cron_job::{create_cron_job, CronJobOptions},
        job_registry::JobRegistry,
        JobError,
    };

    fn counting_job(
        name: &str,
        cron: &str,
        options: CronJobOptions,
        calls: &Arc<AtomicU32>,
    ) -> JobHandle {
        let calls = calls.clone();
        create_cron_job(name, cron, options)
            .unwrap()
            .with_callback(move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
    }

    fn sample_jobs(calls: &Arc<AtomicU32>) -> Vec<JobHandle> {
        vec![
            counting_job("sessionCleanup", "0 0 * * */1", CronJobOptions::default(), calls),
            counting_job("cacheInvalidation", "*/15 * * * *", CronJobOptions::default(), calls),
            counting_job("manualReport", "never", CronJobOptions::default(), calls),
            counting_job(
                "lockedImport",
                "0 3 * * *",
                CronJobOptions::default().prevent_manual_execution(),
                calls,
            ),
        ]
    }

    fn manager(jobs: Vec<JobHandle>, store: JobConfigStore) -> JobManager {
        let registry = Arc::new(JobRegistry::new(jobs).unwrap());
        JobManager::new(JobGroup::new(registry, StatusBroadcaster::new()), store)
    }

    fn summary<'a>(summaries: &'a [JobSummary], name: &str) -> &'a JobSummary {
        summaries.iter().find(|summary| summary.name == name).unwrap()
    }

    #[tokio::test]
    async fn test_update_interval_scenario() {
        let calls = Arc::new(AtomicU32::new(0));
        let manager = manager(sample_jobs(&calls), JobConfigStore::mock());
        manager.start_all().await.unwrap();

        manager
            .update_interval("sessionCleanup", "*/5 * * * *")
            .await
            .unwrap();

        let summaries = manager.get_all().await.unwrap();
        assert_eq!(summaries.len(), 4);
        assert_eq!(summary(&summaries, "sessionCleanup").cron, "*/5 * * * *");
        assert_eq!(summary(&summaries, "cacheInvalidation").cron, "*/15 * * * *");
        assert_eq!(summary(&summaries, "manualReport").cron, "never");
        assert_eq!(summary(&summaries, "lockedImport").cron, "0 3 * * *");

        let entry = manager.group().registry().get("sessionCleanup").unwrap();
        assert_eq!(
            entry.slot().task.as_ref().unwrap().schedule().as_str(),
            "*/5 * * * *"
        );

        let stored = manager.store().find("sessionCleanup").await.unwrap().unwrap();
        assert_eq!(stored.cron_expression.as_deref(), Some("*/5 * * * *"));
        assert!(stored.is_enabled);
    }

    #[tokio::test]
    async fn test_update_interval_rejects_never_job_without_side_effects() {
        let calls = Arc::new(AtomicU32::new(0));
        let manager = manager(sample_jobs(&calls), JobConfigStore::mock());

        let result = manager.update_interval("manualReport", "*/5 * * * *").await;

        assert!(matches!(result, Err(JobControlError::NotSchedulable(_))));
        assert!(manager.store().find("manualReport").await.unwrap().is_none());
        let entry = manager.group().registry().get("manualReport").unwrap();
        assert!(entry.cron_expression().is_never());
        assert!(!manager.group().is_scheduled("manualReport"));
    }

    #[tokio::test]
    async fn test_update_interval_rejects_invalid_cron_and_keeps_schedule() {
        let calls = Arc::new(AtomicU32::new(0));
        let manager = manager(sample_jobs(&calls), JobConfigStore::mock());
        manager.start("sessionCleanup").await.unwrap();

        let result = manager.update_interval("sessionCleanup", "*/5 * * *").await;

        assert!(matches!(result, Err(JobControlError::InvalidCron(_))));
        assert!(manager.store().find("sessionCleanup").await.unwrap().is_none());
        let entry = manager.group().registry().get("sessionCleanup").unwrap();
        assert_eq!(
            entry.slot().task.as_ref().unwrap().schedule().as_str(),
            "0 0 * * */1"
        );
    }

    #[tokio::test]
    async fn test_update_interval_rejects_never_as_interval() {
        let calls = Arc::new(AtomicU32::new(0));
        let manager = manager(sample_jobs(&calls), JobConfigStore::mock());

        let result = manager.update_interval("sessionCleanup", "never").await;

        assert!(matches!(result, Err(JobControlError::InvalidCron(_))));
    }

    #[tokio::test]
    async fn test_unknown_job_is_rejected_everywhere() {
        let calls = Arc::new(AtomicU32::new(0));
        let manager = manager(sample_jobs(&calls), JobConfigStore::mock());

        assert!(matches!(manager.start("ghost").await, Err(JobControlError::UnknownJob(_))));
        assert!(matches!(manager.stop("ghost").await, Err(JobControlError::UnknownJob(_))));
        assert!(matches!(manager.enable("ghost").await, Err(JobControlError::UnknownJob(_))));
        assert!(matches!(manager.disable("ghost").await, Err(JobControlError::UnknownJob(_))));
        assert!(matches!(manager.trigger("ghost").await, Err(JobControlError::UnknownJob(_))));
        assert!(matches!(
            manager.update_interval("ghost", "* * * * *").await,
            Err(JobControlError::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn test_enable_then_disable_leaves_job_stopped() {
        let calls = Arc::new(AtomicU32::new(0));
        let manager = manager(sample_jobs(&calls), JobConfigStore::mock());

        manager.enable("cacheInvalidation").await.unwrap();
        manager.disable("cacheInvalidation").await.unwrap();

        let summaries = manager.get_all().await.unwrap();
        assert!(!summary(&summaries, "cacheInvalidation").is_enabled);
        assert!(!manager.group().is_scheduled("cacheInvalidation"));
    }

    #[tokio::test]
    async fn test_disable_then_enable_leaves_job_running() {
        let calls = Arc::new(AtomicU32::new(0));
        let manager = manager(sample_jobs(&calls), JobConfigStore::mock());

        manager.disable("cacheInvalidation").await.unwrap();
        manager.enable("cacheInvalidation").await.unwrap();

        let summaries = manager.get_all().await.unwrap();
        let cache = summary(&summaries, "cacheInvalidation");
        assert!(cache.is_enabled);
        assert!(cache.next_execution.is_some());
        assert!(manager.group().is_scheduled("cacheInvalidation"));
    }

    #[tokio::test]
    async fn test_enable_and_disable_reject_never_job() {
        let calls = Arc::new(AtomicU32::new(0));
        let manager = manager(sample_jobs(&calls), JobConfigStore::mock());

        assert!(matches!(
            manager.enable("manualReport").await,
            Err(JobControlError::NotSchedulable(_))
        ));
        assert!(matches!(
            manager.disable("manualReport").await,
            Err(JobControlError::NotSchedulable(_))
        ));
        assert!(manager.store().find("manualReport").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_all_defaults_without_stored_rows() {
        let calls = Arc::new(AtomicU32::new(0));
        let manager = manager(sample_jobs(&calls), JobConfigStore::mock());

        let summaries = manager.get_all().await.unwrap();

        let names: Vec<_> = summaries.iter().map(|summary| summary.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["cacheInvalidation", "lockedImport", "manualReport", "sessionCleanup"]
        );
        assert!(summary(&summaries, "sessionCleanup").is_enabled);
        assert!(!summary(&summaries, "manualReport").is_enabled);
        assert!(summary(&summaries, "lockedImport").prevent_manual_execution);
        assert_eq!(summary(&summaries, "sessionCleanup").status, JobRunStatus::Idle);
        assert!(summary(&summaries, "sessionCleanup").next_execution.is_none());
    }

    #[tokio::test]
    async fn test_prevented_trigger_never_runs_callback() {
        let calls = Arc::new(AtomicU32::new(0));
        let manager = manager(sample_jobs(&calls), JobConfigStore::mock());

        let result = manager.trigger("lockedImport").await;

        assert!(matches!(
            result,
            Err(JobControlError::ManualExecutionPrevented(_))
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_trigger_runs_never_job() {
        let calls = Arc::new(AtomicU32::new(0));
        let manager = manager(sample_jobs(&calls), JobConfigStore::mock());

        let outcome = manager.trigger("manualReport").await.unwrap().await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let summaries = manager.get_all().await.unwrap();
        let report = summary(&summaries, "manualReport");
        assert_eq!(report.last_execution_status, Some(ExecutionStatus::Success));
        assert!(report.last_execution_timestamp.is_some());
    }

    #[tokio::test]
    async fn test_stop_keeps_configuration() {
        let calls = Arc::new(AtomicU32::new(0));
        let manager = manager(sample_jobs(&calls), JobConfigStore::mock());
        manager.start_all().await.unwrap();

        manager.stop("sessionCleanup").await.unwrap();

        assert!(!manager.group().is_scheduled("sessionCleanup"));
        let summaries = manager.get_all().await.unwrap();
        assert!(summary(&summaries, "sessionCleanup").is_enabled);

        manager.start("sessionCleanup").await.unwrap();
        manager.start("sessionCleanup").await.unwrap();
        assert!(manager.group().is_scheduled("sessionCleanup"));
    }

    #[tokio::test]
    async fn test_disabled_job_is_not_started_after_restart() {
        let calls = Arc::new(AtomicU32::new(0));
        let store = JobConfigStore::mock();

        let first = manager(sample_jobs(&calls), store.clone());
        first.start_all().await.unwrap();
        first.disable("sessionCleanup").await.unwrap();
        first.update_interval("cacheInvalidation", "*/5 * * * *").await.unwrap();
        first.shutdown();

        let restarted = manager(sample_jobs(&calls), store);
        restarted.start_all().await.unwrap();

        let summaries = restarted.get_all().await.unwrap();
        assert!(!summary(&summaries, "sessionCleanup").is_enabled);
        assert!(!restarted.group().is_scheduled("sessionCleanup"));

        assert!(restarted.group().is_scheduled("cacheInvalidation"));
        let entry = restarted.group().registry().get("cacheInvalidation").unwrap();
        assert_eq!(entry.cron_expression().to_string(), "*/5 * * * *");
    }

    #[tokio::test]
    async fn test_invalid_stored_interval_falls_back_to_default() {
        let calls = Arc::new(AtomicU32::new(0));
        let store = JobConfigStore::mock();
        store
            .upsert(
                PersistedJobConfig {
                    name: "sessionCleanup".to_string(),
                    cron_expression: Some("not a cron".to_string()),
                    is_enabled: true,
                },
                |_| {},
            )
            .await
            .unwrap();

        let manager = manager(sample_jobs(&calls), store);
        manager.start_all().await.unwrap();

        let entry = manager.group().registry().get("sessionCleanup").unwrap();
        assert_eq!(entry.cron_expression().to_string(), "0 0 * * */1");
        assert!(manager.group().is_scheduled("sessionCleanup"));
        let summaries = manager.get_all().await.unwrap();
        assert_eq!(summary(&summaries, "sessionCleanup").cron, "0 0 * * */1");
    }

    #[tokio::test]
    async fn test_start_all_runs_on_start_for_never_jobs() {
        let calls = Arc::new(AtomicU32::new(0));
        let jobs = vec![counting_job(
            "warmup",
            "never",
            CronJobOptions::default()
                .run_on_start()
                .prevent_manual_execution(),
            &calls,
        )];
        let manager = manager(jobs, JobConfigStore::mock());

        manager.start_all().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!manager.group().is_scheduled("warmup"));
    }

    #[tokio::test]
    async fn test_failing_tick_does_not_stop_schedule() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let job = create_cron_job("flaky", "* * * * * *", CronJobOptions::default())
            .unwrap()
            .with_callback(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        return Err(JobError::failed("first tick fails"));
                    }
                    Ok(())
                }
            });
        let manager = manager(vec![job], JobConfigStore::mock());
        manager.start_all().await.unwrap();

        tokio::time::sleep(Duration::from_millis(3200)).await;
        manager.shutdown();

        assert!(calls.load(Ordering::SeqCst) >= 2);
        let summaries = manager.get_all().await.unwrap();
        assert_eq!(
            summary(&summaries, "flaky").last_execution_status,
            Some(ExecutionStatus::Success)
        );
    }

    #[tokio::test]
    async fn test_works_against_database_store() {
        use sea_orm::{ConnectOptions, Database};
        use sea_orm_migration::MigratorTrait;

        use crate::database::migrations::Migrator;

        let mut options = ConnectOptions::new("sqlite::memory:");
        options.max_connections(1).sqlx_logging(false);
        let db = Database::connect(options).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let store = JobConfigStore::database(db);

        let calls = Arc::new(AtomicU32::new(0));
        let first = manager(sample_jobs(&calls), store.clone());
        first.start_all().await.unwrap();
        first.update_interval("sessionCleanup", "*/5 * * * *").await.unwrap();
        first.disable("sessionCleanup").await.unwrap();
        first.shutdown();

        let restarted = manager(sample_jobs(&calls), store);
        restarted.start_all().await.unwrap();

        let summaries = restarted.get_all().await.unwrap();
        let cleanup = summary(&summaries, "sessionCleanup");
        assert_eq!(cleanup.cron, "*/5 * * * *");
        assert!(!cleanup.is_enabled);
        assert!(!restarted.group().is_scheduled("sessionCleanup"));
        assert!(restarted.group().is_scheduled("cacheInvalidation"));
    }
}
