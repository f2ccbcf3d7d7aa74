use std::{cmp, error::Error, process};

use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;

use crate::{cli::MigrateAction, config::Config, database::setup_database_connection};

pub async fn handle_migrate_command<AppMigrator: MigratorTrait>(
    config: &Config,
    action: MigrateAction,
) {
    let db = setup_database_connection(&config.database).await;

    if let Err(e) = handle_migration_command::<AppMigrator>(&db, action).await {
        eprintln!("❌ Migration failed: {e}");
        process::exit(1);
    }
}

pub async fn handle_migration_command<AppMigrator: MigratorTrait>(
    db: &DatabaseConnection,
    action: MigrateAction,
) -> Result<(), Box<dyn Error>> {
    match action {
        MigrateAction::Up { steps } => {
            let pending = AppMigrator::get_pending_migrations(db).await?;
            if pending.is_empty() {
                println!("✅ All migrations are already up to date");
                return Ok(());
            }

            let count = steps.map_or(pending.len(), |steps| {
                cmp::min(steps as usize, pending.len())
            });
            println!("Running {count} migration(s) up:");
            for migration in &pending[..count] {
                println!("  📄 {}", migration.name());
            }

            AppMigrator::up(db, steps).await?;
            println!("✅ Migrations completed successfully");
        }
        MigrateAction::Down { steps } => {
            let applied = AppMigrator::get_applied_migrations(db).await?;
            if applied.is_empty() {
                println!("❌ No migrations to roll back");
                return Ok(());
            }

            let count = cmp::min(steps as usize, applied.len());
            println!("Rolling back {count} migration(s):");
            for migration in applied[applied.len() - count..].iter().rev() {
                println!("  📄 {}", migration.name());
            }

            AppMigrator::down(db, Some(steps)).await?;
            println!("✅ Rollback completed successfully");
        }
        MigrateAction::Status => {
            let pending = AppMigrator::get_pending_migrations(db).await?;
            if pending.is_empty() {
                println!("✅ All migrations are up to date");
            } else {
                println!("📋 Pending migrations:");
                for migration in pending {
                    println!("  - {}", migration.name());
                }
            }

            println!("📋 Applied migrations:");
            for migration in AppMigrator::get_applied_migrations(db).await? {
                println!("  ✓ {}", migration.name());
            }
        }
        MigrateAction::Reset => {
            println!("🔄 Resetting database (this drops every stored job override!)...");
            AppMigrator::reset(db).await?;
            AppMigrator::up(db, None).await?;
            println!("✅ Database reset completed successfully");
        }
    }

    Ok(())
}
