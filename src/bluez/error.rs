use thiserror::Error;

/// Failure reported by a proxy RPC.
///
/// One variant per `org.bluez.Error.*` name the session logic reacts to;
/// everything else coming from the bus ends up in `Transport`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BluezError {
    #[error("not permitted: {0}")]
    NotPermitted(String),
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("not ready: {0}")]
    NotReady(String),
    #[error("in progress: {0}")]
    InProgress(String),
    #[error("already connected: {0}")]
    AlreadyConnected(String),
    #[error("not connected: {0}")]
    NotConnected(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("failed: {0}")]
    Failed(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl BluezError {
    /// Builds the variant matching a D-Bus error name such as
    /// `org.bluez.Error.NotPermitted`.
    pub fn from_dbus_name(name: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match name.strip_prefix("org.bluez.Error.") {
            Some("NotPermitted") => BluezError::NotPermitted(message),
            Some("NotAuthorized") => BluezError::NotAuthorized(message),
            Some("NotSupported") => BluezError::NotSupported(message),
            Some("NotReady") => BluezError::NotReady(message),
            Some("InProgress") => BluezError::InProgress(message),
            Some("AlreadyConnected") => BluezError::AlreadyConnected(message),
            Some("NotConnected") => BluezError::NotConnected(message),
            Some("InvalidArguments") => BluezError::InvalidArguments(message),
            Some("Failed") => BluezError::Failed(message),
            _ => BluezError::Transport(format!("{name}: {message}")),
        }
    }
}
