//! Live job status fan-out.
//!
//! Every execution publishes a `running` event when it begins and an `idle`
//! event when it ends. Delivery is best-effort: events published while nobody
//! listens are dropped, and slow observers may miss events. `JobManager::get_all`
//! remains the source of truth.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobRunStatus {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub name: String,
    pub status: JobRunStatus,
    pub last_execution_timestamp: Option<DateTime<Utc>>,
    pub last_execution_status: Option<ExecutionStatus>,
}

#[derive(Debug)]
struct Channels {
    per_job: DashMap<String, broadcast::Sender<StatusEvent>>,
    all: broadcast::Sender<StatusEvent>,
    capacity: usize,
}

/// Publish/subscribe hub with one topic per job name plus an all-jobs topic.
#[derive(Debug, Clone)]
pub struct StatusBroadcaster {
    channels: Arc<Channels>,
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBroadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// `capacity` is the number of events a subscriber may fall behind
    /// before it starts missing events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (all, _) = broadcast::channel(capacity);
        Self {
            channels: Arc::new(Channels {
                per_job: DashMap::new(),
                all,
                capacity,
            }),
        }
    }

    pub fn publish(&self, event: StatusEvent) {
        if let Some(sender) = self.channels.per_job.get(&event.name) {
            if sender.send(event.clone()).is_err() {
                trace!("No observers for job '{}'", event.name);
            }
        }
        let _ = self.channels.all.send(event);
    }

    /// Subscribes to the events of a single job.
    pub fn subscribe(&self, name: &str) -> broadcast::Receiver<StatusEvent> {
        self.channels
            .per_job
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(self.channels.capacity).0)
            .subscribe()
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<StatusEvent> {
        self.channels.all.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, status: JobRunStatus) -> StatusEvent {
        StatusEvent {
            name: name.to_string(),
            status,
            last_execution_timestamp: None,
            last_execution_status: None,
        }
    }

    #[tokio::test]
    async fn test_subscribers_only_receive_their_job() {
        let broadcaster = StatusBroadcaster::new();
        let mut cleanup = broadcaster.subscribe("sessionCleanup");
        let mut all = broadcaster.subscribe_all();

        broadcaster.publish(event("cacheInvalidation", JobRunStatus::Running));
        broadcaster.publish(event("sessionCleanup", JobRunStatus::Running));

        assert_eq!(cleanup.recv().await.unwrap().name, "sessionCleanup");
        assert!(cleanup.try_recv().is_err());

        assert_eq!(all.recv().await.unwrap().name, "cacheInvalidation");
        assert_eq!(all.recv().await.unwrap().name, "sessionCleanup");
    }

    #[test]
    fn test_publish_without_observers_is_silent() {
        let broadcaster = StatusBroadcaster::new();
        broadcaster.publish(event("sessionCleanup", JobRunStatus::Idle));
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_value(StatusEvent {
            name: "sessionCleanup".to_string(),
            status: JobRunStatus::Idle,
            last_execution_timestamp: None,
            last_execution_status: Some(ExecutionStatus::Error),
        })
        .unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "name": "sessionCleanup",
                "status": "idle",
                "lastExecutionTimestamp": null,
                "lastExecutionStatus": "error",
            })
        );
    }
}
