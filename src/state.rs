//! Application state
//!
//! Holds configuration and all shared components

use crate::capture::CaptureController;
use crate::ledger::{InsertOrder, ScanLedger};
use crate::realtime_hub::RealtimeHub;
use crate::roster::SelectionStore;
use crate::submission::{BodyFormat, SubmissionService};
use std::sync::Arc;
use std::time::Instant;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Spreadsheet webhook URL (fixed per deployment)
    pub webhook_url: String,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Frontend bundle directory
    pub static_dir: String,
    /// Decode attempts per second
    pub capture_fps: u32,
    /// Detection region edge in logical units (square, centered)
    pub scan_region: u32,
    /// Auto-stop after this many seconds without an accepted scan (0 disables)
    pub idle_timeout_secs: u64,
    /// Client-side webhook timeout in seconds
    pub submit_timeout_secs: u64,
    /// Webhook POST body format (json | form)
    pub submit_body: BodyFormat,
    /// Response field carrying the success flag (`result` or `status`,
    /// depending on the deployed webhook)
    pub success_field: String,
    /// Ledger insertion order (newest_first | append)
    pub ledger_order: InsertOrder,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            webhook_url: std::env::var("WEBHOOK_URL").unwrap_or_else(|_| {
                "https://script.google.com/macros/s/AKfycbzsbJybSrD6XsoNIu85wY_Q0NMhFqWCNaA3myTSKA9xQDsZAFXMIGeGd5BqiIazVBiZdA/exec"
                    .to_string()
            }),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            static_dir: std::env::var("STATIC_DIR")
                .unwrap_or_else(|_| "/opt/scandesk/frontend/dist".to_string()),
            capture_fps: std::env::var("CAPTURE_FPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            scan_region: std::env::var("SCAN_REGION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(250),
            idle_timeout_secs: std::env::var("CAPTURE_IDLE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            submit_timeout_secs: std::env::var("SUBMIT_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            submit_body: std::env::var("SUBMIT_BODY")
                .map(|v| BodyFormat::from(v.as_str()))
                .unwrap_or_default(),
            success_field: std::env::var("WEBHOOK_SUCCESS_FIELD")
                .unwrap_or_else(|_| "result".to_string()),
            ledger_order: std::env::var("LEDGER_ORDER")
                .map(|v| InsertOrder::from(v.as_str()))
                .unwrap_or_default(),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// ScanLedger
    pub ledger: Arc<ScanLedger>,
    /// Operator selection
    pub selection: Arc<SelectionStore>,
    /// CaptureController (camera/decoder lifecycle)
    pub capture: Arc<CaptureController>,
    /// SubmissionService (webhook delivery)
    pub submission: Arc<SubmissionService>,
    /// RealtimeHub (WebSocket)
    pub hub: Arc<RealtimeHub>,
    /// Process start time for uptime reporting
    pub started_at: Instant,
}
