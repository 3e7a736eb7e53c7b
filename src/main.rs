//! attendance-gateway server entry point.
//!
//! Wires storage, the notification queue and the reminder scheduler, then
//! serves the REST API until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum::http::StatusCode;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use attendance_gateway::api;
use attendance_gateway::app_state::AppState;
use attendance_gateway::config::GatewayConfig;
use attendance_gateway::notifications::{LogMailer, Mailer, NotificationQueue, SmtpMailer};
use attendance_gateway::persistence::{MemoryStore, PostgresStore, ReminderStore, SubscriptionStore};
use attendance_gateway::reminders::ReminderScheduler;
use attendance_gateway::service::SubscriptionService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env().context("invalid configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    tracing::info!(addr = %config.listen_addr, "starting attendance-gateway");

    // Build persistence layer
    let subscriptions: Arc<dyn SubscriptionStore>;
    let reminders: Arc<dyn ReminderStore>;
    if config.persistence_enabled {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .context("failed to connect to PostgreSQL")?;
        let store = PostgresStore::new(pool);
        store.migrate().await.context("failed to run migrations")?;
        tracing::info!("persistence: PostgreSQL");
        let store = Arc::new(store);
        subscriptions = Arc::<PostgresStore>::clone(&store);
        reminders = store;
    } else {
        tracing::warn!("persistence disabled, state is kept in memory only");
        let store = Arc::new(MemoryStore::new());
        subscriptions = Arc::<MemoryStore>::clone(&store);
        reminders = store;
    }

    // Build notification layer
    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => {
            tracing::info!(host = %smtp.host, port = smtp.port, "mail: SMTP relay");
            Arc::new(SmtpMailer::new(smtp).context("invalid SMTP settings")?)
        }
        None => {
            tracing::info!("mail: EMAIL_HOST not set, emails are logged only");
            Arc::new(LogMailer)
        }
    };
    let (notifications, _worker) =
        NotificationQueue::start(config.notifications, Arc::clone(&mailer));

    // Build service layer
    let subscription_service = Arc::new(SubscriptionService::new(
        subscriptions,
        Arc::new(notifications.clone()),
    ));

    // Start reminder scheduler
    let scheduler = if config.reminders_enabled && !config.reminder_windows.is_empty() {
        let scheduler = Arc::new(ReminderScheduler::new(
            reminders,
            mailer,
            config.reminder_windows.clone(),
            Duration::from_secs(config.reminder_interval_secs.max(1)),
        ));
        Some(scheduler.spawn())
    } else {
        tracing::info!("reminder scheduler disabled");
        None
    };

    // Build application state
    let app_state = AppState {
        subscription_service,
        notifications,
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = scheduler {
        handle.abort();
    }
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
