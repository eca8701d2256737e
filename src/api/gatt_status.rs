use std::fmt;

/// Outcome attached to every GATT event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GattStatus {
    Success,
    ReadNotPermitted,
    WriteNotPermitted,
    InsufficientAuthentication,
    RequestNotSupported,
    /// The link dropped before the request completed.
    NotConnected,
    Error,
}

impl GattStatus {
    pub fn is_success(&self) -> bool {
        *self == GattStatus::Success
    }
}

impl fmt::Display for GattStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            GattStatus::Success => "SUCCESS",
            GattStatus::ReadNotPermitted => "READ_NOT_PERMITTED",
            GattStatus::WriteNotPermitted => "WRITE_NOT_PERMITTED",
            GattStatus::InsufficientAuthentication => "INSUFFICIENT_AUTHENTICATION",
            GattStatus::RequestNotSupported => "REQUEST_NOT_SUPPORTED",
            GattStatus::NotConnected => "NOT_CONNECTED",
            GattStatus::Error => "ERROR",
        };
        f.write_str(text)
    }
}
