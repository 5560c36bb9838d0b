//! Submission type definitions
//!
//! ## 概要
//! Webhook送信に必要な型定義
//! - バッチペイロード
//! - ボディ形式（JSON / multipart form）
//! - 送信結果

use serde::{Deserialize, Serialize};

// ============================================================
// Body Format
// ============================================================

/// POSTボディの形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyFormat {
    Json,
    Form,
}

impl Default for BodyFormat {
    fn default() -> Self {
        Self::Json
    }
}

impl std::fmt::Display for BodyFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Form => write!(f, "form"),
        }
    }
}

impl From<&str> for BodyFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "form" | "multipart" => Self::Form,
            _ => Self::Json,
        }
    }
}

// ============================================================
// Payload / Outcome
// ============================================================

/// Webhookへ送るバッチ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionPayload {
    pub barcodes: Vec<String>,
    pub user: String,
    pub partner: String,
}

/// 送信結果
///
/// acceptedがfalseのときは台帳を温存する（再送は操作者の手動操作のみ）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub accepted: bool,
    pub message: Option<String>,
}
