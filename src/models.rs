//! Shared data models

use serde::{Deserialize, Serialize};

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: ApiError) -> ApiResponse<T> {
        ApiResponse {
            ok: false,
            data: None,
            error: Some(error),
        }
    }
}

/// API error
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub scanning: bool,
    pub pending_scans: usize,
    pub webhook_configured: bool,
}

/// Scan list response
#[derive(Debug, Serialize, Deserialize)]
pub struct ScanListResponse {
    pub codes: Vec<String>,
    pub count: usize,
}

/// Fixed option sets offered to the operator
#[derive(Debug, Serialize, Deserialize)]
pub struct OptionsResponse {
    pub users: Vec<String>,
    pub partners: Vec<String>,
}
