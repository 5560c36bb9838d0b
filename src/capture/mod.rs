//! CaptureController - カメラ/デコーダのライフサイクル管理
//!
//! ## 概要
//! start/stop のライフサイクルでフレームループを駆動する。
//! - start: カメラ列挙 → 背面カメラ優先選択 → リース取得 → ループ起動
//! - ループ: fps間隔で1フレームずつデコードし、受理したコードを台帳へ
//! - 無操作タイムアウト: 受理のたびにデッドラインを再アーム、満了で自動停止
//! - stop: 冪等。解放エラーは握りつぶしてログのみ（teardownは必ず完了させる）
//!
//! カメラハンドルはセッションが所有するCameraLeaseで、ループ終了時の
//! Dropで必ず解放される。

pub mod decoder;
pub mod types;

pub use decoder::{BarcodeDecoder, ZbarDecoder};
pub use types::{CameraDevice, CaptureSettings, CaptureStatus, ScanRegion};

use crate::camera_gate::{CameraGate, CameraLease};
use crate::error::{Error, Result};
use crate::ledger::{AddOutcome, ScanLedger};
use crate::realtime_hub::{CaptureStateMessage, HubMessage, RealtimeHub, ScanAcceptedMessage};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// CaptureController
pub struct CaptureController {
    decoder: Arc<dyn BarcodeDecoder>,
    ledger: Arc<ScanLedger>,
    hub: Arc<RealtimeHub>,
    gate: Arc<CameraGate>,
    settings: CaptureSettings,
    running: Arc<RwLock<bool>>,
    active_device: Arc<RwLock<Option<CameraDevice>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureController {
    /// 新規作成
    pub fn new(
        decoder: Arc<dyn BarcodeDecoder>,
        ledger: Arc<ScanLedger>,
        hub: Arc<RealtimeHub>,
        gate: Arc<CameraGate>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            decoder,
            ledger,
            hub,
            gate,
            settings,
            running: Arc::new(RwLock::new(false)),
            active_device: Arc::new(RwLock::new(None)),
            task: Mutex::new(None),
        }
    }

    /// キャプチャ開始
    ///
    /// 既に実行中なら何もしない。カメラが1台もなければCameraUnavailable。
    pub async fn start(&self) -> Result<CaptureStatus> {
        {
            let mut running = self.running.write().await;
            if *running {
                debug!("Capture already running - start ignored");
                drop(running);
                return Ok(self.status().await);
            }
            *running = true;
        }

        if let Err(e) = self.begin_session().await {
            *self.running.write().await = false;
            return Err(e);
        }

        Ok(self.status().await)
    }

    async fn begin_session(&self) -> Result<()> {
        let devices = self.decoder.cameras().await?;
        if devices.is_empty() {
            return Err(Error::CameraUnavailable(
                "No camera devices found".to_string(),
            ));
        }

        // 背面カメラ優先、なければ先頭
        let device = devices
            .iter()
            .find(|d| d.label.to_lowercase().contains("back"))
            .unwrap_or(&devices[0])
            .clone();

        let lease = self
            .gate
            .acquire(&device.id)
            .ok_or_else(|| Error::Conflict(format!("Camera {} is busy", device.id)))?;

        info!(
            device_id = %device.id,
            label = %device.label,
            fps = self.settings.fps,
            idle_timeout_secs = ?self.settings.idle_timeout.map(|d| d.as_secs()),
            "Capture started"
        );

        *self.active_device.write().await = Some(device.clone());

        self.hub
            .broadcast(HubMessage::CaptureState(CaptureStateMessage {
                scanning: true,
                device_id: Some(device.id.clone()),
                device_label: Some(device.label.clone()),
                reason: "started".to_string(),
            }))
            .await;

        let decoder = self.decoder.clone();
        let ledger = self.ledger.clone();
        let hub = self.hub.clone();
        let running = self.running.clone();
        let active_device = self.active_device.clone();
        let settings = self.settings;

        let handle = tokio::spawn(async move {
            capture_loop(decoder, ledger, hub, running, active_device, settings, device, lease)
                .await;
        });
        *self.task.lock().await = Some(handle);

        Ok(())
    }

    /// キャプチャ停止（冪等）
    ///
    /// 未開始でも安全。ループの終了を待ってから戻る。
    pub async fn stop(&self) {
        {
            let mut running = self.running.write().await;
            if !*running {
                debug!("Stop requested but capture not running");
            } else {
                *running = false;
                info!("Capture stop requested");
            }
        }

        let task = self.task.lock().await.take();
        if let Some(handle) = task {
            if let Err(e) = handle.await {
                warn!(error = %e, "Capture task ended abnormally");
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// ライフサイクルのスナップショット
    pub async fn status(&self) -> CaptureStatus {
        CaptureStatus {
            scanning: *self.running.read().await,
            device: self.active_device.read().await.clone(),
            fps: self.settings.fps,
            region: self.settings.region,
            idle_timeout_secs: self.settings.idle_timeout.map(|d| d.as_secs()),
        }
    }
}

/// フレームループ本体
///
/// 終了時は必ず: runningクリア → デコーダ解放（エラーは握りつぶし）→
/// 停止通知 → リースDrop解放。
async fn capture_loop(
    decoder: Arc<dyn BarcodeDecoder>,
    ledger: Arc<ScanLedger>,
    hub: Arc<RealtimeHub>,
    running: Arc<RwLock<bool>>,
    active_device: Arc<RwLock<Option<CameraDevice>>>,
    settings: CaptureSettings,
    device: CameraDevice,
    lease: CameraLease,
) {
    let frame_period = Duration::from_millis(1000 / settings.fps.max(1) as u64);
    let mut interval = tokio::time::interval(frame_period);
    let mut deadline = Instant::now() + settings.idle_timeout.unwrap_or(Duration::ZERO);
    let mut idle_stop = false;

    loop {
        if !*running.read().await {
            break;
        }

        if let Some(idle) = settings.idle_timeout {
            tokio::select! {
                _ = interval.tick() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    info!(
                        device_id = %device.id,
                        idle_secs = idle.as_secs(),
                        "No accepted scan within idle window - stopping capture"
                    );
                    idle_stop = true;
                    break;
                }
            }
        } else {
            interval.tick().await;
        }

        match decoder.grab_and_decode(&device, &settings).await {
            Ok(Some(raw)) => match ledger.add(&raw).await {
                AddOutcome::Added(code) => {
                    let count = ledger.count().await;
                    info!(code = %code, count = count, "Barcode accepted");
                    hub.broadcast(HubMessage::ScanAccepted(ScanAcceptedMessage {
                        code,
                        count,
                        timestamp: Utc::now().to_rfc3339(),
                    }))
                    .await;
                    if let Some(idle) = settings.idle_timeout {
                        deadline = Instant::now() + idle;
                    }
                }
                AddOutcome::Duplicate(_) | AddOutcome::Discarded => {}
            },
            Ok(None) => {
                // Per-frame miss; recurs every frame while nothing is presented
                tracing::trace!(device_id = %device.id, "No code in frame");
            }
            Err(e) => {
                debug!(device_id = %device.id, error = %e, "Frame decode error - continuing");
            }
        }
    }

    *running.write().await = false;
    *active_device.write().await = None;

    if let Err(e) = decoder.release(&device).await {
        warn!(device_id = %device.id, error = %e, "Decoder release failed - ignored");
    }

    hub.broadcast(HubMessage::CaptureState(CaptureStateMessage {
        scanning: false,
        device_id: None,
        device_label: None,
        reason: if idle_stop { "idle_timeout" } else { "stopped" }.to_string(),
    }))
    .await;

    info!(device_id = %device.id, "Capture session ended");
    drop(lease);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InsertOrder;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// スクリプト化したデコーダ（テスト用）
    struct ScriptedDecoder {
        devices: Vec<CameraDevice>,
        frames: Mutex<VecDeque<Option<String>>>,
        releases: AtomicUsize,
    }

    impl ScriptedDecoder {
        fn new(devices: Vec<CameraDevice>, frames: Vec<Option<String>>) -> Self {
            Self {
                devices,
                frames: Mutex::new(frames.into()),
                releases: AtomicUsize::new(0),
            }
        }

        fn device(id: &str, label: &str) -> CameraDevice {
            CameraDevice {
                id: id.to_string(),
                label: label.to_string(),
            }
        }
    }

    #[async_trait]
    impl BarcodeDecoder for ScriptedDecoder {
        async fn cameras(&self) -> crate::Result<Vec<CameraDevice>> {
            Ok(self.devices.clone())
        }

        async fn grab_and_decode(
            &self,
            _device: &CameraDevice,
            _settings: &CaptureSettings,
        ) -> crate::Result<Option<String>> {
            Ok(self.frames.lock().await.pop_front().flatten())
        }

        async fn release(&self, _device: &CameraDevice) -> crate::Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn controller_with(
        decoder: Arc<ScriptedDecoder>,
        settings: CaptureSettings,
    ) -> (CaptureController, Arc<ScanLedger>, Arc<RealtimeHub>) {
        let ledger = Arc::new(ScanLedger::new(InsertOrder::NewestFirst));
        let hub = Arc::new(RealtimeHub::new());
        let controller = CaptureController::new(
            decoder,
            ledger.clone(),
            hub.clone(),
            Arc::new(CameraGate::new()),
            settings,
        );
        (controller, ledger, hub)
    }

    fn fast_settings(idle: Option<Duration>) -> CaptureSettings {
        CaptureSettings {
            fps: 200,
            region: ScanRegion::default(),
            idle_timeout: idle,
        }
    }

    #[tokio::test]
    async fn test_stop_without_start_is_safe() {
        let decoder = Arc::new(ScriptedDecoder::new(vec![], vec![]));
        let (controller, _, _) = controller_with(decoder, fast_settings(None));

        // 未開始のstopはエラーにならず、状態もfalseのまま
        controller.stop().await;
        assert!(!controller.is_running().await);
    }

    #[tokio::test]
    async fn test_start_without_camera_fails() {
        let decoder = Arc::new(ScriptedDecoder::new(vec![], vec![]));
        let (controller, _, _) = controller_with(decoder, fast_settings(None));

        let result = controller.start().await;
        assert!(matches!(result, Err(Error::CameraUnavailable(_))));
        assert!(!controller.is_running().await);
    }

    #[tokio::test]
    async fn test_back_camera_preferred() {
        let decoder = Arc::new(ScriptedDecoder::new(
            vec![
                ScriptedDecoder::device("/dev/video0", "Front Camera"),
                ScriptedDecoder::device("/dev/video2", "Integrated Back Camera"),
            ],
            vec![],
        ));
        let (controller, _, _) = controller_with(decoder, fast_settings(None));

        let status = controller.start().await.unwrap();
        assert_eq!(status.device.unwrap().id, "/dev/video2");
        controller.stop().await;
    }

    #[tokio::test]
    async fn test_decodes_land_in_ledger() {
        let decoder = Arc::new(ScriptedDecoder::new(
            vec![ScriptedDecoder::device("/dev/video0", "UVC Camera")],
            vec![
                Some("ORD-111".to_string()),
                None, // frame miss: must not stop the loop
                Some("111".to_string()), // duplicate after normalization
                Some("letters-only".to_string()), // discarded
                Some("222".to_string()),
            ],
        ));
        let (controller, ledger, _) = controller_with(decoder.clone(), fast_settings(None));

        controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        controller.stop().await;

        assert_eq!(
            ledger.codes().await,
            vec!["222".to_string(), "111".to_string()]
        );
        // teardownでデコーダは1回だけ解放される
        assert_eq!(decoder.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_idle_timeout_stops_exactly_once() {
        let decoder = Arc::new(ScriptedDecoder::new(
            vec![ScriptedDecoder::device("/dev/video0", "UVC Camera")],
            vec![Some("12345".to_string())],
        ));
        let settings = fast_settings(Some(Duration::from_millis(150)));
        let (controller, _, hub) = controller_with(decoder.clone(), settings);

        let (_client_id, mut rx) = hub.register().await;

        controller.start().await.unwrap();
        // 最後の受理から150msで自動停止する
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!controller.is_running().await);

        let mut idle_stops = 0;
        while let Ok(msg) = rx.try_recv() {
            if let HubMessage::CaptureState(state) = msg {
                if state.reason == "idle_timeout" {
                    idle_stops += 1;
                }
            }
        }
        assert_eq!(idle_stops, 1);
        assert_eq!(decoder.releases.load(Ordering::SeqCst), 1);

        // 自動停止後のstopも冪等
        controller.stop().await;
        assert!(!controller.is_running().await);
    }

    #[tokio::test]
    async fn test_double_start_is_ignored() {
        let decoder = Arc::new(ScriptedDecoder::new(
            vec![ScriptedDecoder::device("/dev/video0", "UVC Camera")],
            vec![],
        ));
        let (controller, _, _) = controller_with(decoder, fast_settings(None));

        controller.start().await.unwrap();
        let status = controller.start().await.unwrap();
        assert!(status.scanning);
        controller.stop().await;
        assert!(!controller.is_running().await);
    }
}
