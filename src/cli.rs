use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run migrations, start the scheduler and serve the control API (default)
    Serve,
    /// Database migration commands
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Control the jobs of a running server
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },
    /// Generate a control API key for configuration
    GenerateSecret,
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum MigrateAction {
    /// Run migrations up
    Up {
        /// Number of migrations to run (default: all)
        #[arg(short, long)]
        steps: Option<u32>,
    },
    /// Run migrations down
    Down {
        /// Number of migrations to rollback (default: 1)
        #[arg(short, long, default_value = "1")]
        steps: u32,
    },
    /// Show migration status
    Status,
    /// Reset database (down all, then up all)
    Reset,
}

#[derive(Subcommand)]
pub enum JobsAction {
    /// List every job with its schedule and last run
    List,
    /// Resume a job's schedule
    Start { name: String },
    /// Run a job once now
    Trigger { name: String },
    /// Pause a job's schedule
    Stop { name: String },
    /// Enable a job and persist the flag
    Enable { name: String },
    /// Disable a job and persist the flag
    Disable { name: String },
    /// Change and persist a job's cron expression
    UpdateInterval {
        name: String,
        /// Five or six field cron expression, e.g. "*/5 * * * *"
        cron: String,
    },
}
