use std::{io, net::SocketAddr, sync::Arc};

use axum::{routing::get, Router};
use sea_orm_migration::MigratorTrait;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::{
    api::health_checks::ok,
    app::App,
    config::Config,
    database::setup_database,
    environment::Environment,
    jobs::{JobConfigStore, JobGroup, JobHandle, JobManager, JobRegistry, StatusBroadcaster},
    router::router,
};

pub async fn handle_serve_command<AppMigrator: MigratorTrait>(
    environment: Environment,
    config: Config,
    jobs: Vec<JobHandle>,
) {
    let port = config.server.port;

    let registry = match JobRegistry::new(jobs) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("❌ {}", e);
            return;
        }
    };

    // Liveness only, until migrations are done.
    let liveness_server_task = tokio::spawn(start_liveness_server(port));

    let (db, migration_receiver) = setup_database::<AppMigrator>(&config.database).await;

    match migration_receiver.await {
        Ok(Ok(())) => {
            info!("✅ Database is ready!");
        }
        Ok(Err(e)) => {
            error!("❌ Database setup failed: {}", e);
            liveness_server_task.abort();
            return;
        }
        Err(_) => {
            error!("❌ Database setup channel closed unexpectedly");
            liveness_server_task.abort();
            return;
        }
    }

    if config.control.api_key.is_empty() {
        error!("🔒 control.api_key is empty, every control request will be rejected");
    }

    let group = JobGroup::new(registry, StatusBroadcaster::new());
    let manager = JobManager::new(group, JobConfigStore::database(db.clone()));

    if let Err(e) = manager.start_all().await {
        error!("❌ Failed to start jobs: {}", e);
        liveness_server_task.abort();
        return;
    }

    let app = App {
        config,
        environment,
        db,
        jobs: manager.clone(),
    };

    liveness_server_task.abort();
    let _ = liveness_server_task.await;

    if let Err(e) = start_server(router(app), port).await {
        error!("❌ Server failed: {}", e);
    }

    manager.shutdown();
}

async fn start_liveness_server(port: u16) -> io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    let migration_router = Router::new().route("/liveness", get(ok));
    axum::serve(listener, migration_router).await
}

async fn start_server(router: Router, port: u16) -> io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!("🌐 Server starting on http://{}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("👋 Shutting down"),
        Err(e) => {
            error!("❌ Cannot listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
