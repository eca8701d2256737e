use std::collections::BTreeSet;

use uuid::Uuid;

use crate::api::descriptor::{AttributePermission, Descriptor};

/// A remote characteristic as last seen by the session.
///
/// `service_uuid` points back at the owning service; it is only used to
/// locate the characteristic again and does not keep the service alive.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct Characteristic {
    pub uuid: Uuid,
    pub service_uuid: Uuid,
    pub properties: BTreeSet<CharacteristicProperty>,
    pub permissions: BTreeSet<AttributePermission>,
    pub value: Vec<u8>,
    pub notifying: bool,
    pub descriptors: Vec<Descriptor>,
}

impl Characteristic {
    pub fn new(
        uuid: Uuid,
        service_uuid: Uuid,
        properties: impl IntoIterator<Item = CharacteristicProperty>,
    ) -> Self {
        Characteristic {
            uuid,
            service_uuid,
            properties: properties.into_iter().collect(),
            permissions: BTreeSet::new(),
            value: Vec::new(),
            notifying: false,
            descriptors: Vec::new(),
        }
    }

    pub fn supports_reading(&self) -> bool {
        self.properties.contains(&CharacteristicProperty::Read)
    }

    pub fn supports_writing_with_response(&self) -> bool {
        self.properties.contains(&CharacteristicProperty::Write)
    }

    pub fn supports_writing_without_response(&self) -> bool {
        self.properties
            .contains(&CharacteristicProperty::WriteWithoutResponse)
    }

    /// Notify and indicate both count.
    pub fn supports_notifying(&self) -> bool {
        self.properties.contains(&CharacteristicProperty::Notify)
            || self.properties.contains(&CharacteristicProperty::Indicate)
    }

    pub fn supports_write_type(&self, write_type: CharacteristicWriteType) -> bool {
        match write_type {
            CharacteristicWriteType::WriteWithResponse => self.supports_writing_with_response(),
            CharacteristicWriteType::WriteWithoutResponse => {
                self.supports_writing_without_response()
            }
        }
    }

    /// First descriptor with the given UUID, in discovery order.
    pub fn descriptor(&self, uuid: Uuid) -> Option<&Descriptor> {
        self.descriptors.iter().find(|descriptor| descriptor.uuid == uuid)
    }
}

#[derive(Debug, Clone, Copy, PartialOrd, Ord, Eq, PartialEq, Hash)]
pub enum CharacteristicProperty {
    Broadcast,
    Read,
    WriteWithoutResponse,
    Write,
    AuthenticatedSignedWrites,
    Notify,
    Indicate,
    ExtendedProperties,
}

#[derive(Debug, Clone, Copy, Default, PartialOrd, Ord, Eq, PartialEq, Hash)]
pub enum CharacteristicWriteType {
    WriteWithoutResponse,
    #[default]
    WriteWithResponse,
}

impl CharacteristicWriteType {
    /// Value of the `type` option handed to `WriteValue`.
    pub fn bluez_type(&self) -> &'static str {
        match self {
            CharacteristicWriteType::WriteWithResponse => "request",
            CharacteristicWriteType::WriteWithoutResponse => "command",
        }
    }
}
