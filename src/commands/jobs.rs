use std::process;

use crate::{
    cli::JobsAction,
    client::{ClientError, ControlClient},
    config::Config,
    jobs::{validate_cron_expression, JobSummary},
};

pub async fn handle_jobs_command(config: &Config, action: JobsAction) {
    if let JobsAction::UpdateInterval { cron, .. } = &action {
        if let Err(e) = validate_cron_expression(cron) {
            eprintln!("❌ Invalid cron expression: {e}");
            process::exit(1);
        }
    }

    let result = match ControlClient::from_config(&config.control) {
        Ok(client) => run(&client, action).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("❌ {e}");
        process::exit(1);
    }
}

async fn run(client: &ControlClient, action: JobsAction) -> Result<(), ClientError> {
    match action {
        JobsAction::List => {
            let jobs = client.get_all().await?;
            print_jobs(&jobs);
        }
        JobsAction::Start { name } => {
            client.start(&name).await?;
            println!("▶️ Started '{name}'");
        }
        JobsAction::Trigger { name } => {
            client.trigger(&name).await?;
            println!("▶️ Triggered '{name}'");
        }
        JobsAction::Stop { name } => {
            client.stop(&name).await?;
            println!("⏹️ Stopped '{name}'");
        }
        JobsAction::Enable { name } => {
            client.enable(&name).await?;
            println!("✅ Enabled '{name}'");
        }
        JobsAction::Disable { name } => {
            client.disable(&name).await?;
            println!("⏸️ Disabled '{name}'");
        }
        JobsAction::UpdateInterval { name, cron } => {
            client.update_interval(&name, &cron).await?;
            println!("🔄 '{name}' now runs on '{cron}'");
        }
    }

    Ok(())
}

fn print_jobs(jobs: &[JobSummary]) {
    if jobs.is_empty() {
        println!("No jobs registered");
        return;
    }

    let width = jobs.iter().map(|job| job.name.len()).max().unwrap_or(0);
    for job in jobs {
        let state = if job.is_enabled { "enabled" } else { "disabled" };
        let last = job.last_execution_timestamp.map_or_else(
            || "never ran".to_string(),
            |at| {
                format!(
                    "last {} at {}",
                    job.last_execution_status
                        .map_or_else(|| "-".to_string(), |status| status.to_string()),
                    at.format("%Y-%m-%d %H:%M:%S")
                )
            },
        );
        let next = job.next_execution.map_or_else(
            || "-".to_string(),
            |at| at.format("%Y-%m-%d %H:%M:%S").to_string(),
        );

        println!(
            "{:<width$}  {:<16}  {:<8}  {:<7}  next {}  {}{}",
            job.name,
            job.cron,
            state,
            job.status.to_string(),
            next,
            last,
            if job.prevent_manual_execution { "  (no manual runs)" } else { "" },
        );
    }
}
