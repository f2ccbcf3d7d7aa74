use std::{env, str::FromStr as _};

use clap::Parser as _;
use config_rs::Config as ConfigRs;
use sea_orm_migration::MigratorTrait;
use tracing::{debug, trace};

use crate::{
    app_info::AppInfo,
    cli::{Cli, Commands},
    commands::{generate_secret, jobs, migrate, serve, version},
    config::Config,
    environment::Environment,
    jobs::JobHandle,
    setup_tracing::setup_tracing_for_command,
};

const ENVIRONMENT_VARIABLE: &str = "APP_ENVIRONMENT";

/// Everything a binary hands over to start the scheduler.
pub struct BootConfig {
    pub app_info: AppInfo,
    pub jobs: Vec<JobHandle>,
}

impl BootConfig {
    #[must_use]
    pub const fn new(app_info: AppInfo, jobs: Vec<JobHandle>) -> Self {
        Self { app_info, jobs }
    }
}

pub async fn boot<AppMigrator: MigratorTrait>(config: BootConfig) {
    let cli = Cli::parse();

    if matches!(cli.command, Some(Commands::Version)) {
        version::print_version_info(config.app_info);
        return;
    }

    let environment = set_environment();

    let app_config = read_config(&environment);

    setup_tracing_for_command(&cli.command, &app_config.tracing.log_level);

    debug!("Environment set to: {:?}", environment);
    trace!("Configuration loaded: {:?}", app_config);

    handle_command::<AppMigrator>(environment, app_config, cli, config).await;
}

#[must_use]
pub fn set_environment() -> Environment {
    env::var(ENVIRONMENT_VARIABLE)
        .ok()
        .and_then(|s| Environment::from_str(&s).ok())
        .unwrap_or_default()
}

/// Layers `config/<environment>.yaml` under `APP_*` variables, nested keys
/// separated by `__` (`APP_CONTROL__API_KEY`).
///
/// # Panics
///
/// Panics if the configuration cannot be read or is incomplete.
pub fn read_config(environment: &Environment) -> Config {
    let config_file_name = format!("config/{environment}");

    trace!("Reading configuration from: {}", config_file_name);

    ConfigRs::builder()
        .add_source(config_rs::File::with_name(&config_file_name))
        .add_source(
            config_rs::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .expect("Failed to read configuration")
        .try_deserialize()
        .expect("Failed to deserialize configuration")
}

pub async fn handle_command<AppMigrator: MigratorTrait>(
    environment: Environment,
    config: Config,
    cli: Cli,
    boot_config: BootConfig,
) {
    match cli.command {
        Some(Commands::Migrate { action }) => {
            migrate::handle_migrate_command::<AppMigrator>(&config, action).await;
        }
        Some(Commands::Jobs { action }) => {
            jobs::handle_jobs_command(&config, action).await;
        }
        Some(Commands::GenerateSecret) => {
            generate_secret::handle_generate_secret_command();
        }
        Some(Commands::Version) => {
            version::print_version_info(boot_config.app_info);
        }
        Some(Commands::Serve) | None => {
            serve::handle_serve_command::<AppMigrator>(environment, config, boot_config.jobs)
                .await;
        }
    }
}
