//! ScanDesk Capture Server
//!
//! Main entry point.

use scandesk::{
    camera_gate::CameraGate,
    capture::{CaptureController, CaptureSettings, ScanRegion, ZbarDecoder},
    ledger::ScanLedger,
    realtime_hub::RealtimeHub,
    roster::SelectionStore,
    state::{AppConfig, AppState},
    submission::{SubmissionClient, SubmissionService},
    web_api,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scandesk=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ScanDesk v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        webhook_url = %config.webhook_url,
        capture_fps = config.capture_fps,
        scan_region = config.scan_region,
        idle_timeout_secs = config.idle_timeout_secs,
        submit_body = %config.submit_body,
        success_field = %config.success_field,
        ledger_order = %config.ledger_order,
        "Configuration loaded"
    );

    // Check the external decode pipeline early; capture start will fail
    // at runtime if the tools are missing, but the operator should know now
    match ZbarDecoder::check_tools().await {
        Ok(version) => tracing::info!(ffmpeg = %version, "Decode pipeline available"),
        Err(e) => tracing::warn!(error = %e, "Decode pipeline tools missing - capture will fail"),
    }

    // Initialize components
    let ledger = Arc::new(ScanLedger::new(config.ledger_order));
    let selection = Arc::new(SelectionStore::new());
    let hub = Arc::new(RealtimeHub::new());
    let gate = Arc::new(CameraGate::new());

    let settings = CaptureSettings {
        fps: config.capture_fps,
        region: ScanRegion {
            width: config.scan_region,
            height: config.scan_region,
        },
        idle_timeout: match config.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        },
    };

    let capture = Arc::new(CaptureController::new(
        Arc::new(ZbarDecoder::new()),
        ledger.clone(),
        hub.clone(),
        gate,
        settings,
    ));
    tracing::info!("CaptureController initialized");

    let submission = Arc::new(SubmissionService::new(
        SubmissionClient::new(
            config.webhook_url.clone(),
            config.submit_body,
            config.success_field.clone(),
            Duration::from_secs(config.submit_timeout_secs),
        ),
        ledger.clone(),
        selection.clone(),
        hub.clone(),
    ));
    tracing::info!("SubmissionService initialized");

    // Create application state
    let state = AppState {
        config: config.clone(),
        ledger,
        selection,
        capture: capture.clone(),
        submission,
        hub,
        started_at: std::time::Instant::now(),
    };

    // Create router with static file serving
    let serve_dir = ServeDir::new(&config.static_dir)
        .not_found_service(ServeFile::new(format!("{}/index.html", config.static_dir)));

    let app = web_api::create_router(state)
        .fallback_service(serve_dir)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    tracing::info!(static_dir = %config.static_dir, "Static file serving enabled");

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    // Teardown discipline: the camera must be released on shutdown
    // regardless of scanning state
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            tracing::info!("Shutdown signal received - stopping capture");
            capture.stop().await;
        })
        .await?;

    Ok(())
}
