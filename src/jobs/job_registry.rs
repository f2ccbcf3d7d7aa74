use std::{
    collections::{btree_map::Entry, BTreeMap},
    sync::{Mutex, MutexGuard, PoisonError},
};

use thiserror::Error;

use super::{cron_expression::CronExpression, cron_job::JobHandle, scheduled_task::ScheduledTask};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Job '{0}' is registered more than once")]
    DuplicateJob(String),
}

/// Mutable per-job runtime state.
#[derive(Debug)]
pub struct JobSlot {
    /// Effective expression: the persisted override or the default.
    pub cron_expression: CronExpression,
    pub task: Option<ScheduledTask>,
}

#[derive(Debug)]
pub struct RegisteredJob {
    handle: JobHandle,
    slot: Mutex<JobSlot>,
}

impl RegisteredJob {
    #[must_use]
    pub const fn handle(&self) -> &JobHandle {
        &self.handle
    }

    pub fn slot(&self) -> MutexGuard<'_, JobSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn cron_expression(&self) -> CronExpression {
        self.slot().cron_expression.clone()
    }
}

/// The fixed set of jobs known to the process, keyed by name.
#[derive(Debug)]
pub struct JobRegistry {
    jobs: BTreeMap<String, RegisteredJob>,
}

impl JobRegistry {
    pub fn new(jobs: Vec<JobHandle>) -> Result<Self, RegistryError> {
        let mut registered = BTreeMap::new();

        for handle in jobs {
            match registered.entry(handle.name().to_string()) {
                Entry::Occupied(entry) => {
                    return Err(RegistryError::DuplicateJob(entry.key().clone()));
                }
                Entry::Vacant(entry) => {
                    let cron_expression = handle.default_cron().clone();
                    entry.insert(RegisteredJob {
                        handle,
                        slot: Mutex::new(JobSlot {
                            cron_expression,
                            task: None,
                        }),
                    });
                }
            }
        }

        Ok(Self { jobs: registered })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredJob> {
        self.jobs.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RegisteredJob)> {
        self.jobs.iter().map(|(name, job)| (name.as_str(), job))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::cron_job::{create_cron_job, CronJobOptions};

    fn job(name: &str, cron: &str) -> JobHandle {
        create_cron_job(name, cron, CronJobOptions::default())
            .unwrap()
            .with_callback(|| async { Ok(()) })
    }

    #[test]
    fn test_registry_keys_are_sorted_and_unique() {
        let registry = JobRegistry::new(vec![
            job("sessionCleanup", "0 0 * * */1"),
            job("cacheInvalidation", "*/5 * * * *"),
        ])
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.keys().collect::<Vec<_>>(),
            vec!["cacheInvalidation", "sessionCleanup"]
        );
        assert!(registry.contains("sessionCleanup"));
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let result = JobRegistry::new(vec![
            job("sessionCleanup", "0 0 * * *"),
            job("sessionCleanup", "never"),
        ]);

        assert_eq!(
            result.unwrap_err(),
            RegistryError::DuplicateJob("sessionCleanup".to_string())
        );
    }

    #[test]
    fn test_slot_starts_with_default_expression_and_no_task() {
        let registry = JobRegistry::new(vec![job("manualOnly", "never")]).unwrap();
        let entry = registry.get("manualOnly").unwrap();

        assert!(entry.cron_expression().is_never());
        assert!(entry.slot().task.is_none());
    }
}
