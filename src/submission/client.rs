//! SubmissionClient HTTP Client
//!
//! ## 概要
//! スプレッドシート連携WebhookへのHTTP送信を担当
//! - 事前条件チェック（台帳 → ユーザー → 配送パートナーの順）
//! - JSON / multipart form でのPOST
//! - 成功フラグ付きJSONレスポンスの解釈
//!
//! 成功フラグのフィールド名はデプロイ先により `result` / `status` と揺れる
//! ため設定値で指定する。サーバー側拒否はエラーではなく結果として返す。

use crate::error::{Error, Result};
use crate::submission::types::{BodyFormat, SubmissionOutcome, SubmissionPayload};
use reqwest::multipart::Form;
use reqwest::Client;
use std::time::Duration;
use tracing::{error, info, warn};

/// SubmissionClient
pub struct SubmissionClient {
    http: Client,
    webhook_url: String,
    body_format: BodyFormat,
    success_field: String,
}

impl SubmissionClient {
    /// 新規作成
    pub fn new(
        webhook_url: String,
        body_format: BodyFormat,
        success_field: String,
        timeout: Duration,
    ) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            webhook_url,
            body_format,
            success_field,
        }
    }

    /// バッチ送信
    ///
    /// 事前条件を順にチェックし、満たさない場合はネットワークへ出ずに
    /// 固有のメッセージで短絡する。
    pub async fn submit(
        &self,
        barcodes: &[String],
        user: Option<&str>,
        partner: Option<&str>,
    ) -> Result<SubmissionOutcome> {
        if barcodes.is_empty() {
            return Err(Error::Validation("No barcodes scanned yet!".to_string()));
        }
        let user = match user {
            Some(u) if !u.is_empty() => u,
            _ => return Err(Error::Validation("Please select a User!".to_string())),
        };
        let partner = match partner {
            Some(p) if !p.is_empty() => p,
            _ => {
                return Err(Error::Validation(
                    "Please select a Delivery Partner!".to_string(),
                ))
            }
        };

        let payload = SubmissionPayload {
            barcodes: barcodes.to_vec(),
            user: user.to_string(),
            partner: partner.to_string(),
        };

        info!(
            barcode_count = payload.barcodes.len(),
            user = %payload.user,
            partner = %payload.partner,
            body_format = %self.body_format,
            "Submitting batch to webhook"
        );

        let req = match self.body_format {
            BodyFormat::Json => self.http.post(&self.webhook_url).json(&payload),
            BodyFormat::Form => {
                let barcodes_json = serde_json::to_string(&payload.barcodes)?;
                let form = Form::new()
                    .text("user", payload.user.clone())
                    .text("partner", payload.partner.clone())
                    .text("barcodes", barcodes_json);
                self.http.post(&self.webhook_url).multipart(form)
            }
        };

        let response = match req.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!(url = %self.webhook_url, error = %e, "Webhook request timed out");
                return Err(Error::Timeout(format!("Webhook request timed out: {}", e)));
            }
            Err(e) => {
                error!(url = %self.webhook_url, error = %e, "Webhook request failed");
                return Err(Error::Http(e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Webhook returned error status");
            return Ok(SubmissionOutcome {
                accepted: false,
                message: Some(format!("HTTP {}", status.as_u16())),
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Parse(format!("Failed to parse webhook response: {}", e)))?;

        let flag = body
            .get(&self.success_field)
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let message = body
            .get("message")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        if flag == "success" {
            info!(barcode_count = payload.barcodes.len(), "Batch accepted by webhook");
            Ok(SubmissionOutcome {
                accepted: true,
                message,
            })
        } else {
            warn!(
                success_field = %self.success_field,
                flag = %flag,
                message = ?message,
                "Batch rejected by webhook"
            );
            Ok(SubmissionOutcome {
                accepted: false,
                message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> SubmissionClient {
        SubmissionClient::new(
            url.to_string(),
            BodyFormat::Json,
            "result".to_string(),
            Duration::from_secs(5),
        )
    }

    // 事前条件のテストは到達不能URLを使う。リクエストが出ていれば
    // ValidationではなくHttp/Timeoutになるため、短絡を検証できる。
    const UNROUTABLE: &str = "http://127.0.0.1:1/hook";

    #[tokio::test]
    async fn test_empty_ledger_short_circuits() {
        let result = client(UNROUTABLE)
            .submit(&[], Some("Durga"), Some("Delhivery"))
            .await;
        match result {
            Err(Error::Validation(msg)) => assert_eq!(msg, "No barcodes scanned yet!"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_user_short_circuits() {
        let codes = vec!["12345".to_string()];
        let result = client(UNROUTABLE)
            .submit(&codes, None, Some("Delhivery"))
            .await;
        match result {
            Err(Error::Validation(msg)) => assert_eq!(msg, "Please select a User!"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_partner_short_circuits() {
        let codes = vec!["12345".to_string()];
        let result = client(UNROUTABLE).submit(&codes, Some("Durga"), None).await;
        match result {
            Err(Error::Validation(msg)) => assert_eq!(msg, "Please select a Delivery Partner!"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
