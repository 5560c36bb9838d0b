//! API Routes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::models::{ApiResponse, OptionsResponse, ScanListResponse};
use crate::roster;
use crate::state::AppState;
use crate::Result;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Fixed option sets
        .route("/api/options", get(get_options))
        // Capture lifecycle
        .route("/api/capture/start", post(start_capture))
        .route("/api/capture/stop", post(stop_capture))
        .route("/api/capture/status", get(capture_status))
        // Scan ledger
        .route("/api/scans", get(list_scans))
        .route("/api/scans", delete(clear_scans))
        .route("/api/scans/:code", delete(remove_scan))
        // Operator selection
        .route("/api/selection", get(get_selection))
        .route("/api/selection", put(update_selection))
        // Submission
        .route("/api/submit", post(submit_batch))
        // WebSocket
        .route("/api/ws", get(websocket_handler))
        .with_state(state)
}

// ========================================
// Capture Handlers
// ========================================

async fn start_capture(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let status = state.capture.start().await?;
    Ok(Json(ApiResponse::success(status)))
}

async fn stop_capture(State(state): State<AppState>) -> impl IntoResponse {
    state.capture.stop().await;
    Json(ApiResponse::success(state.capture.status().await))
}

async fn capture_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.capture.status().await))
}

// ========================================
// Ledger Handlers
// ========================================

async fn list_scans(State(state): State<AppState>) -> impl IntoResponse {
    let codes = state.ledger.codes().await;
    Json(ApiResponse::success(ScanListResponse {
        count: codes.len(),
        codes,
    }))
}

/// Remove all occurrences of a code. Absent codes are a no-op, not an error.
async fn remove_scan(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> impl IntoResponse {
    let removed = state.ledger.remove(&code).await;
    Json(ApiResponse::success(serde_json::json!({
        "removed": removed
    })))
}

async fn clear_scans(State(state): State<AppState>) -> impl IntoResponse {
    state.ledger.clear().await;
    Json(ApiResponse::success(ScanListResponse {
        codes: Vec::new(),
        count: 0,
    }))
}

// ========================================
// Selection Handlers
// ========================================

#[derive(Debug, Deserialize)]
struct UpdateSelectionRequest {
    user: Option<String>,
    partner: Option<String>,
}

async fn get_selection(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.selection.get().await))
}

async fn update_selection(
    State(state): State<AppState>,
    Json(req): Json<UpdateSelectionRequest>,
) -> Result<impl IntoResponse> {
    if let Some(user) = &req.user {
        state.selection.set_user(user).await?;
    }
    if let Some(partner) = &req.partner {
        state.selection.set_partner(partner).await?;
    }
    Ok(Json(ApiResponse::success(state.selection.get().await)))
}

async fn get_options() -> impl IntoResponse {
    Json(ApiResponse::success(OptionsResponse {
        users: roster::USERS.iter().map(|s| s.to_string()).collect(),
        partners: roster::PARTNERS.iter().map(|s| s.to_string()).collect(),
    }))
}

// ========================================
// Submission Handler
// ========================================

async fn submit_batch(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let outcome = state.submission.submit().await?;
    Ok(Json(ApiResponse::success(outcome)))
}

// ========================================
// WebSocket Handler
// ========================================

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (client_id, mut rx) = state.hub.register().await;

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to serialize hub message");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.hub.unregister(&client_id).await;
    tracing::debug!(client_id = %client_id, "WebSocket client disconnected");
}
