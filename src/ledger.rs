//! ScanLedger - In-Memory Scan Accumulation
//!
//! ## Responsibilities
//!
//! - Normalize raw decode text to digit-only codes
//! - Deduplicated insert (idempotent)
//! - Removal, clear, ordered listing for submission
//!
//! The ledger is never persisted; it lives and dies with the process.

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Insertion order for accepted codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertOrder {
    NewestFirst,
    Append,
}

impl Default for InsertOrder {
    fn default() -> Self {
        Self::NewestFirst
    }
}

impl std::fmt::Display for InsertOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NewestFirst => write!(f, "newest_first"),
            Self::Append => write!(f, "append"),
        }
    }
}

impl From<&str> for InsertOrder {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "append" => Self::Append,
            _ => Self::NewestFirst,
        }
    }
}

/// Outcome of an insert attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// Normalized code was new and inserted
    Added(String),
    /// Normalized code already present; ledger unchanged
    Duplicate(String),
    /// Raw text carried no digits; discarded
    Discarded,
}

/// Strip everything but ASCII digits from raw decode text.
///
/// Returns None when nothing remains; such decodes never reach the ledger.
pub fn normalize(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// ScanLedger instance
pub struct ScanLedger {
    codes: RwLock<Vec<String>>,
    order: InsertOrder,
}

impl ScanLedger {
    /// Create new ScanLedger
    pub fn new(order: InsertOrder) -> Self {
        Self {
            codes: RwLock::new(Vec::new()),
            order,
        }
    }

    /// Normalize and insert raw decode text.
    ///
    /// Digit-free payloads are discarded, known codes are a no-op.
    pub async fn add(&self, raw: &str) -> AddOutcome {
        let Some(code) = normalize(raw) else {
            tracing::debug!(raw = %raw, "Decode carried no digits - discarded");
            return AddOutcome::Discarded;
        };

        let mut codes = self.codes.write().await;
        if codes.iter().any(|c| c == &code) {
            tracing::debug!(code = %code, "Duplicate scan ignored");
            return AddOutcome::Duplicate(code);
        }

        match self.order {
            InsertOrder::NewestFirst => codes.insert(0, code.clone()),
            InsertOrder::Append => codes.push(code.clone()),
        }
        tracing::debug!(code = %code, count = codes.len(), "Scan added to ledger");
        AddOutcome::Added(code)
    }

    /// Remove all occurrences of an exact code. No-op if absent.
    ///
    /// Returns how many entries were removed.
    pub async fn remove(&self, code: &str) -> usize {
        let mut codes = self.codes.write().await;
        let before = codes.len();
        codes.retain(|c| c != code);
        let removed = before - codes.len();
        if removed > 0 {
            tracing::debug!(code = %code, removed = removed, "Scan removed from ledger");
        }
        removed
    }

    /// Empty the ledger unconditionally
    pub async fn clear(&self) {
        let mut codes = self.codes.write().await;
        let dropped = codes.len();
        codes.clear();
        tracing::debug!(dropped = dropped, "Ledger cleared");
    }

    /// Snapshot of the codes in ledger order
    pub async fn codes(&self) -> Vec<String> {
        self.codes.read().await.clone()
    }

    /// Derived count; always the ledger length
    pub async fn count(&self) -> usize {
        self.codes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.codes.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_non_digits() {
        assert_eq!(normalize("AB-123-45"), Some("12345".to_string()));
        assert_eq!(normalize("12345"), Some("12345".to_string()));
        assert_eq!(normalize("  9 8 7 "), Some("987".to_string()));
    }

    #[test]
    fn test_normalize_rejects_digit_free_text() {
        assert_eq!(normalize("hello"), None);
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("---"), None);
    }

    #[tokio::test]
    async fn test_add_normalizes_and_inserts() {
        let ledger = ScanLedger::new(InsertOrder::NewestFirst);

        let outcome = ledger.add("ORD-12345").await;
        assert_eq!(outcome, AddOutcome::Added("12345".to_string()));
        assert_eq!(ledger.codes().await, vec!["12345".to_string()]);
    }

    #[tokio::test]
    async fn test_add_discards_digit_free_decode() {
        let ledger = ScanLedger::new(InsertOrder::NewestFirst);

        assert_eq!(ledger.add("no-digits-here").await, AddOutcome::Discarded);
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let ledger = ScanLedger::new(InsertOrder::NewestFirst);

        ledger.add("12345").await;
        let outcome = ledger.add("123-45").await; // same code after normalization
        assert_eq!(outcome, AddOutcome::Duplicate("12345".to_string()));
        assert_eq!(ledger.count().await, 1);
    }

    #[tokio::test]
    async fn test_newest_first_ordering() {
        let ledger = ScanLedger::new(InsertOrder::NewestFirst);

        ledger.add("111").await;
        ledger.add("222").await;
        ledger.add("333").await;
        assert_eq!(
            ledger.codes().await,
            vec!["333".to_string(), "222".to_string(), "111".to_string()]
        );
    }

    #[tokio::test]
    async fn test_append_ordering() {
        let ledger = ScanLedger::new(InsertOrder::Append);

        ledger.add("111").await;
        ledger.add("222").await;
        assert_eq!(
            ledger.codes().await,
            vec!["111".to_string(), "222".to_string()]
        );
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let ledger = ScanLedger::new(InsertOrder::NewestFirst);

        ledger.add("111").await;
        ledger.add("222").await;

        assert_eq!(ledger.remove("111").await, 1);
        assert_eq!(ledger.remove("111").await, 0); // second call is a no-op
        assert_eq!(ledger.codes().await, vec!["222".to_string()]);
    }

    #[tokio::test]
    async fn test_clear_empties_ledger() {
        let ledger = ScanLedger::new(InsertOrder::NewestFirst);

        ledger.add("111").await;
        ledger.add("222").await;
        ledger.clear().await;
        assert_eq!(ledger.count().await, 0);
    }
}
