//! ScanDesk Capture Server
//!
//! Camera barcode capture form backend: scan, accumulate, submit.
//!
//! ## Architecture (7 Components)
//!
//! 1. CaptureController - camera/decoder lifecycle
//! 2. BarcodeDecoder - external decode pipeline adapter (ffmpeg + zbarimg)
//! 3. CameraGate - per-device exclusive access leases
//! 4. ScanLedger - deduplicated in-memory scan accumulation
//! 5. SelectionStore - operator/partner selection over fixed rosters
//! 6. SubmissionService - batch delivery to the spreadsheet webhook
//! 7. RealtimeHub + WebAPI - WebSocket notifications and REST surface
//!
//! ## Design Principles
//!
//! - The camera handle is an owned lease, released on Drop
//! - The ledger count is derived, never tracked separately
//! - Server-side rejection preserves the ledger; only acceptance resets it

pub mod camera_gate;
pub mod capture;
pub mod error;
pub mod ledger;
pub mod models;
pub mod realtime_hub;
pub mod roster;
pub mod state;
pub mod submission;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
