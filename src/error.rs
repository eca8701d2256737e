use thiserror::Error;

/// Errors returned synchronously to the caller.
///
/// Failures of the remote stack during a GATT operation never show up here;
/// they are translated to a [`GattStatus`](crate::api::gatt_status::GattStatus)
/// and delivered with the matching event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid Bluetooth address: {0}")]
    InvalidAddress(String),

    #[error("no device object for {0}")]
    DeviceNotFound(String),

    #[error("{0} worker has stopped")]
    WorkerStopped(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
