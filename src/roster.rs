//! Roster - Fixed Option Sets and Operator Selection
//!
//! ## Responsibilities
//!
//! - Hold the fixed user and delivery-partner option sets
//! - Track the operator's current selection (both required, no default)
//!
//! Selections stay mutable until submission and are cleared when a batch
//! is accepted by the webhook.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Operators allowed to submit batches
pub const USERS: [&str; 6] = ["Durga", "Pooja", "Shabnam", "Nikita", "Apoorv", "Aryan"];

/// Delivery partners
pub const PARTNERS: [&str; 11] = [
    "Delhivery",
    "DTDC",
    "Bluedart",
    "Xpressbees",
    "Amazon Shipping",
    "Shadowfax",
    "Gati",
    "Safeexpress",
    "Om Logistics",
    "Ekart",
    "Valmo",
];

/// Current operator selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selection {
    pub user: Option<String>,
    pub partner: Option<String>,
}

/// SelectionStore instance
pub struct SelectionStore {
    inner: RwLock<Selection>,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Selection::default()),
        }
    }

    /// Set the user field. Empty string unselects; unknown names are rejected.
    pub async fn set_user(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            self.inner.write().await.user = None;
            return Ok(());
        }
        if !USERS.contains(&name) {
            return Err(Error::Validation(format!("Unknown user: {}", name)));
        }
        self.inner.write().await.user = Some(name.to_string());
        tracing::debug!(user = %name, "User selected");
        Ok(())
    }

    /// Set the partner field. Empty string unselects; unknown carriers are rejected.
    pub async fn set_partner(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            self.inner.write().await.partner = None;
            return Ok(());
        }
        if !PARTNERS.contains(&name) {
            return Err(Error::Validation(format!(
                "Unknown delivery partner: {}",
                name
            )));
        }
        self.inner.write().await.partner = Some(name.to_string());
        tracing::debug!(partner = %name, "Delivery partner selected");
        Ok(())
    }

    pub async fn get(&self) -> Selection {
        self.inner.read().await.clone()
    }

    /// Reset both fields (submission success path)
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.user = None;
        inner.partner = None;
        tracing::debug!("Selection cleared");
    }
}

impl Default for SelectionStore {
    fn default() -> Self {
        Self::new()
    }
}
