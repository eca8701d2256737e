use crate::api::gatt_status::GattStatus;
use crate::bluez::error::BluezError;

/// Whether the failed request was reading or writing; decides how
/// "not permitted" is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

pub fn gatt_status(error: &BluezError, access: AccessKind) -> GattStatus {
    match (error, access) {
        (BluezError::NotPermitted(_), AccessKind::Read) => GattStatus::ReadNotPermitted,
        (BluezError::NotPermitted(_), AccessKind::Write) => GattStatus::WriteNotPermitted,
        (BluezError::NotAuthorized(_), _) => GattStatus::InsufficientAuthentication,
        (BluezError::NotSupported(_), _) => GattStatus::RequestNotSupported,
        _ => GattStatus::Error,
    }
}
