use uuid::Uuid;

use crate::api::characteristic::Characteristic;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub uuid: Uuid,
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    pub fn new(uuid: Uuid) -> Self {
        Service {
            uuid,
            characteristics: Vec::new(),
        }
    }

    /// First characteristic with the given UUID, in discovery order.
    pub fn characteristic(&self, uuid: Uuid) -> Option<&Characteristic> {
        self.characteristics
            .iter()
            .find(|characteristic| characteristic.uuid == uuid)
    }
}
