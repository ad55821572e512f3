use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

use dojo_ledger::{
    create_activity_router, create_status_router, create_video_router, ActivityApiState,
    ActivityGate, AppConfig, DatabasePool, ModerationEngine, NotificationBus, RandomSampler,
    ReconciliationService, StatusApiState, VideoApiState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first - validation catches incoherent award and
    // moderation settings before anything touches the store.
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        e
    })?;

    init_logging(&config)?;

    info!("Starting Dojo Ledger (XP ledger & trust-tier moderation)");

    // Connect and apply the schema once; request paths assume it is
    // complete from here on.
    let db = Arc::new(
        DatabasePool::new(&config.database.postgres_url, config.database.max_connections).await?,
    );
    db.init_schema().await?;

    let notifications = NotificationBus::default();
    spawn_decision_logger(&notifications);

    let gate = Arc::new(ActivityGate::new(db.clone(), config.awards.clone()));
    let sampler = Arc::new(RandomSampler::new(config.moderation.spot_check_rate)?);
    let engine = Arc::new(ModerationEngine::new(
        db.clone(),
        config.moderation.to_thresholds(),
        config.moderation.to_limits(),
        sampler,
        notifications.clone(),
    ));
    let reconciliation = Arc::new(ReconciliationService::new(db.clone()));

    info!(
        spot_check_rate = config.moderation.spot_check_rate,
        verified_streak = config.moderation.verified_streak,
        trusted_streak = config.moderation.trusted_streak,
        "Moderation engine initialized"
    );

    let app = Router::new()
        .nest(
            "/activity",
            create_activity_router(ActivityApiState { gate: gate.clone() }),
        )
        .nest(
            "/videos",
            create_video_router(VideoApiState { engine: engine.clone() }),
        )
        .merge(create_status_router(StatusApiState {
            db: db.clone(),
            reconciliation: reconciliation.clone(),
            gate: gate.clone(),
        }))
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", bind_addr, e))?;

    info!("Dojo Ledger listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(if config.logging.log_requests {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}

/// Drain decision events into the log. The real consumer (the platform
/// emailer) subscribes the same way from outside this crate; delivery is
/// never observed by the ledger core.
fn spawn_decision_logger(bus: &NotificationBus) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            info!(
                video_id = %event.video_id,
                student_id = %event.student_id,
                decision = ?event.decision,
                xp_applied = event.xp_applied,
                "Video decision event dispatched"
            );
        }
    });
}
