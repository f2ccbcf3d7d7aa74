use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use cadence::{
    app_info::AppInfo,
    boot::{boot, BootConfig},
    database::migrations::Migrator,
    jobs::{create_cron_job, CronJobOptions, JobError, JobHandle},
};
use tracing::info;

static CLEANUP_RUNS: AtomicU64 = AtomicU64::new(0);

async fn clean_sessions() -> Result<(), JobError> {
    let run = CLEANUP_RUNS.fetch_add(1, Ordering::SeqCst) + 1;
    info!("🧹 Removed expired sessions (run {run})");
    Ok(())
}

async fn refresh_cdn_cache() -> Result<(), JobError> {
    tokio::time::sleep(Duration::from_millis(500)).await;
    Err(JobError::network(
        "purge request rejected",
        Some(503),
        Some("https://cdn.example.com/purge"),
    ))
}

async fn build_usage_report() -> Result<(), JobError> {
    tokio::time::sleep(Duration::from_secs(3)).await;
    info!("📊 Usage report ready");
    Ok(())
}

async fn warm_caches() -> Result<(), JobError> {
    info!("🔥 Caches warmed");
    Ok(())
}

fn jobs() -> Vec<JobHandle> {
    vec![
        create_cron_job("sessionCleanup", "0 0 * * */1", CronJobOptions::default())
            .expect("valid cron")
            .with_callback(clean_sessions),
        create_cron_job(
            "cdnCacheRefresh",
            "*/10 * * * *",
            CronJobOptions::default().on_callback_error(|name, err| {
                if err.is_network() {
                    info!("📟 Paging on-call for '{name}'");
                }
            }),
        )
        .expect("valid cron")
        .with_callback(refresh_cdn_cache),
        create_cron_job(
            "usageReport",
            "never",
            CronJobOptions::default().expected_maximum_duration(Duration::from_secs(1)),
        )
        .expect("valid cron")
        .with_callback(build_usage_report),
        create_cron_job(
            "cacheWarmup",
            "never",
            CronJobOptions::default()
                .run_on_start()
                .prevent_manual_execution(),
        )
        .expect("valid cron")
        .with_callback(warm_caches),
    ]
}

#[tokio::main]
async fn main() {
    let app_info = AppInfo::new(
        "sample-jobs",
        env!("CARGO_PKG_VERSION"),
        "Sample jobs running on cadence",
    );

    boot::<Migrator>(BootConfig::new(app_info, jobs())).await;
}
