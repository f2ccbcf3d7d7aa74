use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError},
};

use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, QueryOrder, Set,
    TransactionTrait, Unchanged,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::database::models::job_config;

/// Runtime overrides stored for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedJobConfig {
    pub name: String,
    /// `None` means the default expression applies.
    pub cron_expression: Option<String>,
    pub is_enabled: bool,
}

impl From<job_config::Model> for PersistedJobConfig {
    fn from(model: job_config::Model) -> Self {
        Self {
            name: model.name,
            cron_expression: model.cron_expression,
            is_enabled: model.is_enabled,
        }
    }
}

/// Persisted job overrides, either in the database or in memory for tests.
#[derive(Clone, Debug)]
pub enum JobConfigStore {
    Database(DatabaseConnection),
    Mock(Arc<Mutex<BTreeMap<String, PersistedJobConfig>>>),
}

impl JobConfigStore {
    #[must_use]
    pub const fn database(db: DatabaseConnection) -> Self {
        Self::Database(db)
    }

    #[must_use]
    pub fn mock() -> Self {
        Self::Mock(Arc::new(Mutex::new(BTreeMap::new())))
    }

    pub async fn find(&self, name: &str) -> Result<Option<PersistedJobConfig>, DbErr> {
        match self {
            Self::Database(db) => Ok(job_config::Entity::find_by_id(name.to_string())
                .one(db)
                .await?
                .map(Into::into)),
            Self::Mock(rows) => Ok(rows
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(name)
                .cloned()),
        }
    }

    pub async fn find_all(&self) -> Result<Vec<PersistedJobConfig>, DbErr> {
        match self {
            Self::Database(db) => Ok(job_config::Entity::find()
                .order_by_asc(job_config::Column::Name)
                .all(db)
                .await?
                .into_iter()
                .map(Into::into)
                .collect()),
            Self::Mock(rows) => Ok(rows
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .values()
                .cloned()
                .collect()),
        }
    }

    /// Read-modify-write of one row.
    ///
    /// A missing row starts from `seed`. Updates write only the cron
    /// expression, the enabled flag and `updated_at`; the name is never
    /// rewritten.
    pub async fn upsert<F>(
        &self,
        seed: PersistedJobConfig,
        mutate: F,
    ) -> Result<PersistedJobConfig, DbErr>
    where
        F: FnOnce(&mut PersistedJobConfig) + Send,
    {
        match self {
            Self::Database(db) => {
                let txn = db.begin().await?;
                let existing = job_config::Entity::find_by_id(seed.name.clone())
                    .one(&txn)
                    .await?;
                let now = chrono::Utc::now().naive_utc();

                let saved = if let Some(model) = existing {
                    let mut config = PersistedJobConfig::from(model.clone());
                    mutate(&mut config);

                    job_config::ActiveModel {
                        name: Unchanged(model.name),
                        cron_expression: Set(config.cron_expression),
                        is_enabled: Set(config.is_enabled),
                        updated_at: Set(now),
                        ..Default::default()
                    }
                    .update(&txn)
                    .await?
                } else {
                    let name = seed.name.clone();
                    let mut config = seed;
                    mutate(&mut config);
                    debug!("💾 Seeding configuration for job '{}'", name);

                    job_config::ActiveModel {
                        name: Set(name),
                        cron_expression: Set(config.cron_expression),
                        is_enabled: Set(config.is_enabled),
                        created_at: Set(now),
                        updated_at: Set(now),
                    }
                    .insert(&txn)
                    .await?
                };

                txn.commit().await?;
                Ok(saved.into())
            }
            Self::Mock(rows) => {
                let mut rows = rows.lock().unwrap_or_else(PoisonError::into_inner);
                let name = seed.name.clone();
                let config = rows.entry(name.clone()).or_insert(seed);
                let mut updated = config.clone();
                mutate(&mut updated);
                updated.name = name;
                *config = updated.clone();
                Ok(updated)
            }
        }
    }
}
