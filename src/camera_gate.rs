//! CameraGate - カメラデバイスの排他利用
//!
//! ## 目的
//!
//! - 同一デバイスへの多重キャプチャ開始を防止
//! - リースはキャプチャセッションが所有し、Dropで必ず返却
//!
//! 取得できないデバイスは待たずに即失敗する。待機中のセッションを
//! 積み上げない（ビジーは呼び出し側でConflictにする）。

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// 使用中デバイスの台帳
#[derive(Default)]
pub struct CameraGate {
    busy: Arc<Mutex<HashSet<String>>>,
}

impl CameraGate {
    /// 新規作成
    pub fn new() -> Self {
        Self::default()
    }

    /// デバイスのリースを取得する。使用中ならNone。
    ///
    /// 返却されたCameraLeaseがDropされると自動で解放される。
    pub fn acquire(&self, device_id: &str) -> Option<CameraLease> {
        let mut busy = lock(&self.busy);
        if !busy.insert(device_id.to_string()) {
            tracing::debug!(device_id = %device_id, "Camera lease denied - device busy");
            return None;
        }
        tracing::debug!(device_id = %device_id, "Camera lease acquired");
        Some(CameraLease {
            device_id: device_id.to_string(),
            busy: self.busy.clone(),
        })
    }

    /// デバイスが使用中かどうか
    pub fn is_busy(&self, device_id: &str) -> bool {
        lock(&self.busy).contains(device_id)
    }
}

/// poisonしたロックは回復して続行する
fn lock(busy: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    busy.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// カメラリース - Dropで返却
pub struct CameraLease {
    device_id: String,
    busy: Arc<Mutex<HashSet<String>>>,
}

impl CameraLease {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        lock(&self.busy).remove(&self.device_id);
        tracing::debug!(device_id = %self.device_id, "Camera lease released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_drop_release() {
        let gate = CameraGate::new();

        let lease = gate.acquire("/dev/video0").unwrap();
        assert_eq!(lease.device_id(), "/dev/video0");
        assert!(gate.is_busy("/dev/video0"));

        // Dropで返却され、再取得できる
        drop(lease);
        assert!(!gate.is_busy("/dev/video0"));
        let _lease2 = gate.acquire("/dev/video0").unwrap();
    }

    #[test]
    fn test_second_acquire_denied_while_held() {
        let gate = CameraGate::new();

        let _lease = gate.acquire("/dev/video0").unwrap();
        assert!(gate.acquire("/dev/video0").is_none());
    }

    #[test]
    fn test_different_devices_are_independent() {
        let gate = CameraGate::new();

        let lease0 = gate.acquire("/dev/video0").unwrap();
        let lease2 = gate.acquire("/dev/video2").unwrap();

        assert_eq!(lease0.device_id(), "/dev/video0");
        assert_eq!(lease2.device_id(), "/dev/video2");
    }
}
