use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub uuid: Uuid,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub value: Vec<u8>,
}

impl Descriptor {
    pub fn new(uuid: Uuid, service_uuid: Uuid, characteristic_uuid: Uuid) -> Self {
        Descriptor {
            uuid,
            service_uuid,
            characteristic_uuid,
            value: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Ord, PartialOrd, PartialEq, Eq, Hash)]
pub enum AttributePermission {
    ReadEncryptionRequired,
    WriteEncryptionRequired,
    ReadAuthenticationRequired,
    WriteAuthenticationRequired,
}
