/// Server setup and initialization
///
/// Wires together all components: database, flow registry, mailer, campaign
/// supervisor, daily reset scheduler and HTTP routes.

use crate::{
    api::{self, AppState},
    config::Config,
    flow::FlowRegistry,
    mailer::{HttpMailer, Mailer, RecordingMailer},
    runtime::{CampaignSupervisor, DailyResetService, EventProcessor, NodeExecutor},
    store::{Database, Store},
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Build every long-lived component behind the router
///
/// Opens the database, resumes campaigns that were sending at shutdown and
/// schedules the daily sender reset.
pub async fn create_state(config: Config) -> Result<AppState> {
    tracing::info!("🗄️ Opening database: {}", config.database.url);
    let database = Database::connect(&config.database.url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?;
    let store = Store::new(&database);

    tracing::info!("📊 Initializing flow registry");
    let flows = Arc::new(FlowRegistry::new(store.flows.clone()));

    let mailer: Arc<dyn Mailer> = match &config.mailer.relay_url {
        Some(url) => {
            tracing::info!("📤 Delivering through mail relay: {}", url);
            Arc::new(HttpMailer::new(url.clone(), config.mailer.relay_token.clone()))
        }
        None => {
            tracing::warn!("⚠️ No mail relay configured, outbound messages are only recorded");
            Arc::new(RecordingMailer::new())
        }
    };

    tracing::info!("⚙️ Initializing node executor");
    let executor = Arc::new(NodeExecutor::new(store.clone(), mailer, config.engine.clone()));

    let supervisor = Arc::new(CampaignSupervisor::new(
        store.clone(),
        Arc::clone(&flows),
        executor,
    ));
    supervisor
        .resume_all()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to resume sending campaigns: {}", e))?;

    tracing::info!("⏰ Initializing daily sender reset");
    let reset = DailyResetService::new(store.senders.clone(), config.engine.daily_reset_cron.clone())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize reset scheduler: {}", e))?;
    reset
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start reset scheduler: {}", e))?;

    Ok(AppState {
        events: EventProcessor::new(store.activities.clone(), Arc::clone(&supervisor)),
        store,
        flows,
        supervisor,
        scheduler: Arc::new(reset),
    })
}

/// Create the main Axum application with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    tracing::info!("📡 Creating HTTP router with all endpoints");
    let app = Router::new()
        .route("/healthz", get(health_check))
        .merge(api::router(state))
        .layer(TraceLayer::new_for_http());

    tracing::info!("✅ Application initialized successfully");

    app
}

/// Stop background work; sending campaigns keep their state for the next boot
pub async fn shutdown(state: &AppState) {
    if let Err(e) = state.scheduler.stop().await {
        tracing::warn!("⚠️ Failed to stop reset scheduler: {}", e);
    }
    state.supervisor.shutdown().await;
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting outreach server...");

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let state = create_state(config).await?;
    let app = create_app(state.clone());

    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutting down outreach server...");
        trigger.cancel();
    });

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    shutdown(&state).await;
    tracing::info!("Server shut down");

    Ok(())
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn boots_against_a_file_database_and_answers_health() {
        let dir = std::env::temp_dir().join(format!("outreach-{}", uuid::Uuid::new_v4()));
        let mut config = Config::default();
        config.database.url = format!("sqlite://{}/outreach.db", dir.display());
        config.mailer.relay_url = None;

        let state = create_state(config).await.unwrap();
        assert!(state.scheduler.is_scheduled().await);

        let response = create_app(state.clone())
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");

        shutdown(&state).await;
        assert!(!state.scheduler.is_scheduled().await);

        let _ = std::fs::remove_dir_all(dir);
    }
}
