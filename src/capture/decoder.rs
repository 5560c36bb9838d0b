//! Barcode decode collaborator
//!
//! ## 概要
//! カメラ列挙とフレーム単位のデコードを外部パイプラインに委譲する。
//! - カメラ列挙: /sys/class/video4linux から V4L2 デバイスを読む
//! - フレーム取得: ffmpeg で1フレームを検出領域に中央クロップして取得
//! - デコード: zbarimg にパイプしてバーコード/QRを読む
//!
//! zbarimg の終了コード4は「シンボルなし」。フレーム単位のミスであり
//! エラーではない（Noneを返す）。

use crate::capture::types::{CameraDevice, CaptureSettings};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

/// sysfs directory listing V4L2 devices
const V4L_SYSFS_DIR: &str = "/sys/class/video4linux";

/// Per-frame pipeline timeout in seconds
const FRAME_TIMEOUT_SECS: u64 = 5;

/// Decode collaborator seam
///
/// The controller owns the polling cadence; implementations only enumerate
/// devices, decode single frames, and release whatever they hold.
#[async_trait]
pub trait BarcodeDecoder: Send + Sync {
    /// Enumerate available camera devices
    async fn cameras(&self) -> Result<Vec<CameraDevice>>;

    /// Grab one frame from the device and attempt a decode.
    ///
    /// Ok(None) means no code in this frame (transient, recurring, non-fatal).
    async fn grab_and_decode(
        &self,
        device: &CameraDevice,
        settings: &CaptureSettings,
    ) -> Result<Option<String>>;

    /// Release any resources tied to the device. Called at session teardown.
    async fn release(&self, device: &CameraDevice) -> Result<()>;
}

/// ffmpeg + zbarimg based decoder
pub struct ZbarDecoder {
    frame_timeout: Duration,
}

impl ZbarDecoder {
    pub fn new() -> Self {
        Self {
            frame_timeout: Duration::from_secs(FRAME_TIMEOUT_SECS),
        }
    }

    /// Check that the external tools are on PATH
    ///
    /// Returns the ffmpeg version line for logging.
    pub async fn check_tools() -> Result<String> {
        let output = Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await
            .map_err(|e| Error::Capture(format!("ffmpeg not found: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Capture("ffmpeg version check failed".to_string()));
        }

        Command::new("zbarimg")
            .arg("--version")
            .output()
            .await
            .map_err(|e| Error::Capture(format!("zbarimg not found: {}", e)))?;

        let version = String::from_utf8_lossy(&output.stdout);
        let first_line = version.lines().next().unwrap_or("unknown");
        Ok(first_line.to_string())
    }

    /// Grab a single cropped frame from the device via ffmpeg
    ///
    /// Uses kill_on_drop(true) so a timeout drops the Child and SIGKILLs the
    /// process; unresponsive cameras must not accumulate zombie pipelines.
    async fn grab_frame(&self, device_id: &str, width: u32, height: u32) -> Result<Vec<u8>> {
        let crop = format!("crop={}:{}", width, height);

        let child = Command::new("ffmpeg")
            .args([
                "-f", "v4l2",
                "-i", device_id,
                "-frames:v", "1",
                "-vf", &crop,
                "-f", "image2pipe",
                "-vcodec", "mjpeg",
                "-loglevel", "error",
                "-y",
                "-",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Capture(format!("ffmpeg spawn failed: {}", e)))?;

        match timeout(self.frame_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(Error::Capture(format!("ffmpeg failed: {}", stderr.trim())));
                }
                if output.stdout.is_empty() {
                    return Err(Error::Capture("ffmpeg returned empty frame".to_string()));
                }
                Ok(output.stdout)
            }
            Ok(Err(e)) => Err(Error::Capture(format!("ffmpeg execution failed: {}", e))),
            Err(_) => {
                tracing::warn!(
                    device_id = %device_id,
                    timeout_sec = self.frame_timeout.as_secs(),
                    "ffmpeg timeout, process killed via kill_on_drop"
                );
                Err(Error::Capture(format!(
                    "ffmpeg timeout ({}s)",
                    self.frame_timeout.as_secs()
                )))
            }
        }
    }

    /// Run zbarimg over a JPEG frame
    async fn decode_frame(&self, frame: &[u8]) -> Result<Option<String>> {
        let mut child = Command::new("zbarimg")
            .args(["--raw", "-q", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Capture(format!("zbarimg spawn failed: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(frame)
                .await
                .map_err(|e| Error::Capture(format!("zbarimg stdin write failed: {}", e)))?;
        }

        let output = match timeout(self.frame_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::Capture(format!("zbarimg execution failed: {}", e)))
            }
            Err(_) => {
                return Err(Error::Capture(format!(
                    "zbarimg timeout ({}s)",
                    self.frame_timeout.as_secs()
                )))
            }
        };

        match output.status.code() {
            Some(0) => {
                let text = String::from_utf8_lossy(&output.stdout);
                Ok(text.lines().next().map(|l| l.trim().to_string()))
            }
            // Exit code 4: no symbol found in the frame
            Some(4) => Ok(None),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(Error::Capture(format!("zbarimg failed: {}", stderr.trim())))
            }
        }
    }
}

impl Default for ZbarDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BarcodeDecoder for ZbarDecoder {
    async fn cameras(&self) -> Result<Vec<CameraDevice>> {
        let mut devices = Vec::new();

        let mut dir = match fs::read_dir(V4L_SYSFS_DIR).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = V4L_SYSFS_DIR, "No V4L2 sysfs directory");
                return Ok(devices);
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with("video") {
                continue;
            }
            let label = fs::read_to_string(entry.path().join("name"))
                .await
                .unwrap_or_default()
                .trim()
                .to_string();
            devices.push(CameraDevice {
                id: format!("/dev/{}", name),
                label,
            });
        }

        devices.sort_by(|a, b| a.id.cmp(&b.id));
        tracing::debug!(count = devices.len(), "Enumerated camera devices");
        Ok(devices)
    }

    async fn grab_and_decode(
        &self,
        device: &CameraDevice,
        settings: &CaptureSettings,
    ) -> Result<Option<String>> {
        let frame = self
            .grab_frame(&device.id, settings.region.width, settings.region.height)
            .await?;
        self.decode_frame(&frame).await
    }

    async fn release(&self, device: &CameraDevice) -> Result<()> {
        // Frame pipelines are per-shot processes; nothing is held open.
        tracing::debug!(device_id = %device.id, "Decoder released");
        Ok(())
    }
}
