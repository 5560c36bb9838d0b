//! RealtimeHub - WebSocket Distribution
//!
//! ## Responsibilities
//!
//! - WebSocket connection management
//! - Broadcasting accepted scans (drives the frontend highlight animation)
//! - Capture lifecycle and submission outcome notifications
//!
//! Note: only notifications travel over the socket; ledger contents are
//! fetched via HTTP GET /api/scans.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Per-client channel capacity
const CLIENT_BUFFER: usize = 32;

/// Hub message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HubMessage {
    /// A new code entered the ledger; clients highlight it
    ScanAccepted(ScanAcceptedMessage),
    /// Capture lifecycle change (started / stopped / idle_timeout)
    CaptureState(CaptureStateMessage),
    /// Submission outcome
    SubmissionResult(SubmissionResultMessage),
}

/// Accepted scan notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanAcceptedMessage {
    pub code: String,
    pub count: usize,
    pub timestamp: String,
}

/// Capture lifecycle message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureStateMessage {
    pub scanning: bool,
    pub device_id: Option<String>,
    pub device_label: Option<String>,
    /// "started", "stopped" or "idle_timeout"
    pub reason: String,
}

/// Submission outcome message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResultMessage {
    pub accepted: bool,
    pub message: String,
    pub submitted: usize,
    pub timestamp: String,
}

/// RealtimeHub instance
pub struct RealtimeHub {
    clients: RwLock<HashMap<Uuid, mpsc::Sender<HubMessage>>>,
}

impl RealtimeHub {
    /// Create new RealtimeHub
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Register a client; returns its id and message stream
    pub async fn register(&self) -> (Uuid, mpsc::Receiver<HubMessage>) {
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        let client_id = Uuid::new_v4();
        self.clients.write().await.insert(client_id, tx);
        tracing::debug!(client_id = %client_id, "Hub client registered");
        (client_id, rx)
    }

    /// Remove a client
    pub async fn unregister(&self, client_id: &Uuid) {
        self.clients.write().await.remove(client_id);
        tracing::debug!(client_id = %client_id, "Hub client unregistered");
    }

    /// Fan a message out to all connected clients
    ///
    /// Slow clients get messages dropped rather than stalling the sender.
    pub async fn broadcast(&self, message: HubMessage) {
        let clients = self.clients.read().await;
        for (client_id, tx) in clients.iter() {
            if tx.try_send(message.clone()).is_err() {
                tracing::debug!(client_id = %client_id, "Hub client lagging - message dropped");
            }
        }
    }

    /// Connected client count
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}
