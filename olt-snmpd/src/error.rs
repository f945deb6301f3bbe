use std::time::Duration;
use crate::snmp::SnmpError;

/// Errors that end a request. Per-attribute decode failures and cache
/// backend faults are handled where they occur and never reach this type.
#[derive(Debug, thiserror::Error)]
pub enum OltError {
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),
    #[error("device unreachable: {0}")]
    DeviceUnreachable(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl OltError {
    pub fn deadline_exceeded(deadline: Duration) -> Self {
        Self::Timeout(format!("request exceeded {}s deadline", deadline.as_secs_f32()))
    }
}

impl From<SnmpError> for OltError {
    fn from(err: SnmpError) -> Self {
        match err {
            SnmpError::Io(e) => Self::DeviceUnreachable(e.to_string()),
            SnmpError::Timeout(_) => Self::Timeout(err.to_string()),
            SnmpError::Malformed(_) | SnmpError::Agent { .. } | SnmpError::InvalidOid(_) => {
                Self::Protocol(err.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, OltError>;
