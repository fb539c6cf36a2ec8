use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::info;

use engagement_service::{
    config::Config,
    logging,
    middleware::JwtMiddleware,
    repository::{InMemoryStoryRepository, PgStoryRepository, StoryRepository},
    routes,
    services::EngagementLimits,
    state::AppState,
    websocket::Notifier,
    workers::reconcile::{self, ReconcileConfig},
};

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();

    info!("🔧 Starting engagement-service");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "✅ Configuration loaded: env={}, http_port={}, database={}",
        config.app.env,
        config.app.http_port,
        if config.database.is_some() { "postgres" } else { "in-memory" }
    );

    let lock_timeout = config.engagement.lock_timeout();

    let (repo, db): (Arc<dyn StoryRepository>, _) = match &config.database {
        Some(database) => {
            // Prepared statement caching disabled for PgBouncer transaction mode
            let connect_options = PgConnectOptions::from_str(&database.url)
                .context("Failed to parse DATABASE_URL")?
                .statement_cache_capacity(0);

            let pg_pool = PgPoolOptions::new()
                .max_connections(database.max_connections)
                .min_connections(database.min_connections)
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(600))
                .max_lifetime(Duration::from_secs(1800))
                .connect_with(connect_options)
                .await
                .context("Failed to connect to database")?;
            info!("✅ Database pool created");

            sqlx::migrate!("./migrations")
                .run(&pg_pool)
                .await
                .context("Failed to run database migrations")?;
            info!("✅ Database migrations completed");

            (
                Arc::new(PgStoryRepository::new(pg_pool.clone(), lock_timeout))
                    as Arc<dyn StoryRepository>,
                Some(pg_pool),
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory story repository");
            (
                Arc::new(InMemoryStoryRepository::new(lock_timeout)) as Arc<dyn StoryRepository>,
                None,
            )
        }
    };

    let notifier = Notifier::start(config.notifier.subscriber_queue_capacity);
    info!(
        queue_capacity = config.notifier.subscriber_queue_capacity,
        "✅ Notifier dispatcher started"
    );

    let state = AppState::new(
        repo,
        notifier.clone(),
        EngagementLimits::from(&config.engagement),
        db,
    );

    // Counter reconciliation background job
    let reconcile_config =
        ReconcileConfig::from_interval_secs(config.engagement.reconcile_interval_secs);
    let reconcile_engagement = state.engagement.clone();
    tokio::spawn(async move {
        reconcile::start_reconcile_job(reconcile_engagement, reconcile_config).await;
    });

    let mut join_set = JoinSet::new();

    let http_addr = format!("{}:{}", config.app.host, config.app.http_port);
    let jwt_secret = config.auth.jwt_secret.clone();
    let app_state = web::Data::new(state);

    let http_server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(JwtMiddleware::new(&jwt_secret))
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .configure(routes::configure)
    })
    .bind(&http_addr)
    .context("Failed to bind HTTP server")?
    .disable_signals()
    .run();

    let server_handle = http_server.handle();
    join_set.spawn(async move {
        http_server
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))
    });
    info!("🚀 HTTP + WebSocket server listening on http://{}", http_addr);

    join_set.spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        server_handle.stop(true).await;
        notifier.shutdown();
        Ok(())
    });

    info!("🎉 engagement-service is running");

    // Wait for any task to complete (or fail)
    while let Some(result) = join_set.join_next().await {
        match result {
            Ok(Ok(())) => {
                info!("Task completed successfully");
            }
            Ok(Err(e)) => {
                tracing::error!("Task failed: {:#}", e);
                return Err(e);
            }
            Err(e) => {
                tracing::error!("Task panicked: {:#}", e);
                return Err(anyhow::anyhow!("Task panicked: {}", e));
            }
        }
    }

    info!("🛑 engagement-service shutting down");
    Ok(())
}
