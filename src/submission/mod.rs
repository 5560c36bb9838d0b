//! Submission - batch delivery to the spreadsheet webhook
//!
//! ## 概要
//! SubmissionServiceが送信ワークフローを所有する。
//! - 多重送信ゲート（実行中の再入はConflict）
//! - 受理時のみ台帳と選択をリセット
//! - 結果のHub通知
//!
//! 自動リトライはしない。失敗時の再送は操作者の再操作のみ。

pub mod client;
pub mod types;

pub use client::SubmissionClient;
pub use types::{BodyFormat, SubmissionOutcome, SubmissionPayload};

use crate::ledger::ScanLedger;
use crate::realtime_hub::{HubMessage, RealtimeHub, SubmissionResultMessage};
use crate::roster::SelectionStore;
use crate::{Error, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// SubmissionService
pub struct SubmissionService {
    client: SubmissionClient,
    ledger: Arc<ScanLedger>,
    selection: Arc<SelectionStore>,
    hub: Arc<RealtimeHub>,
    /// 多重送信ゲート
    gate: Mutex<()>,
}

impl SubmissionService {
    /// 新規作成
    pub fn new(
        client: SubmissionClient,
        ledger: Arc<ScanLedger>,
        selection: Arc<SelectionStore>,
        hub: Arc<RealtimeHub>,
    ) -> Self {
        Self {
            client,
            ledger,
            selection,
            hub,
            gate: Mutex::new(()),
        }
    }

    /// 台帳と現在の選択をWebhookへ送信
    ///
    /// 受理されたら台帳と選択をリセットする。拒否・失敗時は何も消さない。
    pub async fn submit(&self) -> Result<SubmissionOutcome> {
        let _guard = self
            .gate
            .try_lock()
            .map_err(|_| Error::Conflict("Submission already in progress".to_string()))?;

        let codes = self.ledger.codes().await;
        let selection = self.selection.get().await;

        let outcome = self
            .client
            .submit(
                &codes,
                selection.user.as_deref(),
                selection.partner.as_deref(),
            )
            .await?;

        if outcome.accepted {
            self.ledger.clear().await;
            self.selection.clear().await;
            info!(submitted = codes.len(), "Batch accepted - ledger and selection reset");
        }

        let message = outcome.message.clone().unwrap_or_else(|| {
            if outcome.accepted {
                "Data successfully added to the sheet!".to_string()
            } else {
                "Unknown error".to_string()
            }
        });

        self.hub
            .broadcast(HubMessage::SubmissionResult(SubmissionResultMessage {
                accepted: outcome.accepted,
                message,
                submitted: codes.len(),
                timestamp: Utc::now().to_rfc3339(),
            }))
            .await;

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InsertOrder;
    use axum::extract::Multipart;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::time::Duration;

    async fn spawn_webhook(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/hook", addr)
    }

    fn service(url: &str, body_format: BodyFormat, success_field: &str) -> SubmissionService {
        SubmissionService::new(
            SubmissionClient::new(
                url.to_string(),
                body_format,
                success_field.to_string(),
                Duration::from_secs(5),
            ),
            Arc::new(ScanLedger::new(InsertOrder::NewestFirst)),
            Arc::new(SelectionStore::new()),
            Arc::new(RealtimeHub::new()),
        )
    }

    async fn prime(service: &SubmissionService) {
        service.ledger.add("12345").await;
        service.selection.set_user("Durga").await.unwrap();
        service.selection.set_partner("Delhivery").await.unwrap();
    }

    #[tokio::test]
    async fn test_accepted_batch_resets_ledger_and_selection() {
        let url = spawn_webhook(Router::new().route(
            "/hook",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["barcodes"], json!(["12345"]));
                assert_eq!(body["user"], "Durga");
                assert_eq!(body["partner"], "Delhivery");
                Json(json!({"result": "success"}))
            }),
        ))
        .await;

        let service = service(&url, BodyFormat::Json, "result");
        prime(&service).await;

        let outcome = service.submit().await.unwrap();
        assert!(outcome.accepted);
        assert!(service.ledger.is_empty().await);
        let selection = service.selection.get().await;
        assert!(selection.user.is_none());
        assert!(selection.partner.is_none());
    }

    #[tokio::test]
    async fn test_rejected_batch_preserves_ledger() {
        let url = spawn_webhook(Router::new().route(
            "/hook",
            post(|| async { Json(json!({"result": "fail", "message": "quota exceeded"})) }),
        ))
        .await;

        let service = service(&url, BodyFormat::Json, "result");
        prime(&service).await;

        let outcome = service.submit().await.unwrap();
        assert!(!outcome.accepted);
        assert_eq!(outcome.message.as_deref(), Some("quota exceeded"));
        assert_eq!(service.ledger.codes().await, vec!["12345".to_string()]);
        assert!(service.selection.get().await.user.is_some());
    }

    #[tokio::test]
    async fn test_status_success_field_is_honored() {
        let url = spawn_webhook(Router::new().route(
            "/hook",
            post(|| async { Json(json!({"status": "success"})) }),
        ))
        .await;

        let service = service(&url, BodyFormat::Json, "status");
        prime(&service).await;

        let outcome = service.submit().await.unwrap();
        assert!(outcome.accepted);
    }

    #[tokio::test]
    async fn test_form_body_carries_fields() {
        let url = spawn_webhook(Router::new().route(
            "/hook",
            post(|mut multipart: Multipart| async move {
                let mut fields = std::collections::HashMap::new();
                while let Some(field) = multipart.next_field().await.unwrap() {
                    let name = field.name().unwrap().to_string();
                    fields.insert(name, field.text().await.unwrap());
                }
                assert_eq!(fields["user"], "Durga");
                assert_eq!(fields["partner"], "Delhivery");
                assert_eq!(fields["barcodes"], "[\"12345\"]");
                Json(json!({"result": "success"}))
            }),
        ))
        .await;

        let service = service(&url, BodyFormat::Form, "result");
        prime(&service).await;

        let outcome = service.submit().await.unwrap();
        assert!(outcome.accepted);
    }

    #[tokio::test]
    async fn test_timeout_aborts_request() {
        let url = spawn_webhook(Router::new().route(
            "/hook",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({"result": "success"}))
            }),
        ))
        .await;

        let service = SubmissionService::new(
            SubmissionClient::new(
                url,
                BodyFormat::Json,
                "result".to_string(),
                Duration::from_millis(100),
            ),
            Arc::new(ScanLedger::new(InsertOrder::NewestFirst)),
            Arc::new(SelectionStore::new()),
            Arc::new(RealtimeHub::new()),
        );
        prime(&service).await;

        let result = service.submit().await;
        assert!(matches!(result, Err(Error::Timeout(_))));
        // タイムアウトでも台帳は温存
        assert_eq!(service.ledger.count().await, 1);
    }

    #[tokio::test]
    async fn test_overlapping_submit_is_gated() {
        let url = spawn_webhook(Router::new().route(
            "/hook",
            post(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Json(json!({"result": "success"}))
            }),
        ))
        .await;

        let service = Arc::new(service(&url, BodyFormat::Json, "result"));
        prime(&service).await;

        let first = {
            let service = service.clone();
            tokio::spawn(async move { service.submit().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = service.submit().await;
        assert!(matches!(second, Err(Error::Conflict(_))));

        let first = first.await.unwrap().unwrap();
        assert!(first.accepted);
    }
}
