use crate::api::characteristic::Characteristic;
use crate::api::descriptor::Descriptor;
use crate::api::gatt_status::GattStatus;

/// Session level events, in the order their causes were observed.
///
/// Every variant carries the address of the session that produced it so a
/// single receiver can serve all sessions of a central.
#[derive(Debug, Clone, PartialEq)]
pub enum PeripheralEvent {
    Connected {
        address: String,
    },
    ConnectFailed {
        address: String,
    },
    Disconnected {
        address: String,
    },
    ServicesDiscovered {
        address: String,
    },
    CharacteristicUpdate {
        address: String,
        characteristic: Characteristic,
        value: Vec<u8>,
        status: GattStatus,
    },
    CharacteristicWrite {
        address: String,
        characteristic: Characteristic,
        value: Vec<u8>,
        status: GattStatus,
    },
    NotificationStateUpdate {
        address: String,
        characteristic: Characteristic,
        status: GattStatus,
    },
    DescriptorRead {
        address: String,
        descriptor: Descriptor,
        value: Vec<u8>,
        status: GattStatus,
    },
    DescriptorWrite {
        address: String,
        descriptor: Descriptor,
        value: Vec<u8>,
        status: GattStatus,
    },
}

impl PeripheralEvent {
    pub fn address(&self) -> &str {
        match self {
            PeripheralEvent::Connected { address }
            | PeripheralEvent::ConnectFailed { address }
            | PeripheralEvent::Disconnected { address }
            | PeripheralEvent::ServicesDiscovered { address }
            | PeripheralEvent::CharacteristicUpdate { address, .. }
            | PeripheralEvent::CharacteristicWrite { address, .. }
            | PeripheralEvent::NotificationStateUpdate { address, .. }
            | PeripheralEvent::DescriptorRead { address, .. }
            | PeripheralEvent::DescriptorWrite { address, .. } => address,
        }
    }
}
