//! Capture types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Enumerated camera device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDevice {
    /// Device node (e.g., /dev/video0)
    pub id: String,
    /// Human-readable label as reported by the driver
    pub label: String,
}

/// Detection region in logical units, centered in the frame
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScanRegion {
    pub width: u32,
    pub height: u32,
}

impl Default for ScanRegion {
    fn default() -> Self {
        Self {
            width: 250,
            height: 250,
        }
    }
}

/// Capture loop settings
#[derive(Debug, Clone, Copy)]
pub struct CaptureSettings {
    /// Decode attempts per second
    pub fps: u32,
    /// Detection region
    pub region: ScanRegion,
    /// Auto-stop after this long with no accepted decode; None disables
    pub idle_timeout: Option<Duration>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            fps: 10,
            region: ScanRegion::default(),
            idle_timeout: Some(Duration::from_secs(10)),
        }
    }
}

/// Capture lifecycle snapshot for the API surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureStatus {
    pub scanning: bool,
    pub device: Option<CameraDevice>,
    pub fps: u32,
    pub region: ScanRegion,
    pub idle_timeout_secs: Option<u64>,
}
