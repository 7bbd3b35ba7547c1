// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the capture engine

use thiserror::Error;

/// Result type alias using CaptureError
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Errors surfaced by the capture engine
///
/// Every variant resolves exactly one pending operation. None of them are
/// retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// Malformed capture parameters, rejected before anything is submitted
    #[error("Invalid capture parameters: {0}")]
    Validation(String),
    /// The device refused a request at submission time
    #[error("Hardware access failed: {0}")]
    HardwareAccess(String),
    /// Session setup failed; a fresh `start_preview` is required
    #[error("Session configuration failed: {0}")]
    Configuration(String),
    /// The software encoder reported a failure for one capture
    #[error("Encoding failed: {0}")]
    Encode(String),
    /// The delivered image is in a format the extractor cannot handle
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),
    /// Internal bookkeeping no longer matches what the hardware delivered
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
    /// The engine worker has already shut down
    #[error("Camera engine is no longer running")]
    EngineStopped,
}

impl CaptureError {
    /// Whether this error leaves the engine unable to continue
    pub fn is_fatal(&self) -> bool {
        matches!(self, CaptureError::ProtocolViolation(_))
    }
}

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors reported synchronously by a capture device
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// Device is closed or disconnected
    #[error("Device unavailable: {0}")]
    Unavailable(String),
    /// The request could not be accepted
    #[error("Request rejected: {0}")]
    Rejected(String),
    /// No capture session is active
    #[error("No active capture session")]
    NoSession,
}

impl From<DeviceError> for CaptureError {
    fn from(err: DeviceError) -> Self {
        CaptureError::HardwareAccess(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_protocol_violation_is_fatal() {
        assert!(CaptureError::ProtocolViolation("empty queue".into()).is_fatal());
        assert!(!CaptureError::Encode("bad".into()).is_fatal());
        assert!(!CaptureError::HardwareAccess("busy".into()).is_fatal());
    }

    #[test]
    fn test_device_error_maps_to_hardware_access() {
        let err: CaptureError = DeviceError::NoSession.into();
        assert_eq!(
            err,
            CaptureError::HardwareAccess("No active capture session".to_string())
        );
    }
}
