use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, warn};
use uuid::Uuid;

use crate::api::characteristic::{Characteristic, CharacteristicProperty};
use crate::api::descriptor::{AttributePermission, Descriptor};
use crate::api::service::Service;
use crate::bluez::proxy::{BluezDevice, BluezGattCharacteristic, BluezGattDescriptor};

struct CharacteristicEntry {
    path: String,
    proxy: Arc<dyn BluezGattCharacteristic>,
    service_index: usize,
    characteristic_index: usize,
}

struct DescriptorEntry {
    path: String,
    proxy: Arc<dyn BluezGattDescriptor>,
    service_index: usize,
    characteristic_index: usize,
    descriptor_index: usize,
}

/// The services of one device together with the proxies behind them.
///
/// The entries remember where their object sits in `services` so updates
/// keyed by object path hit the right characteristic even when UUIDs repeat.
#[derive(Default)]
pub(crate) struct GattTree {
    services: Vec<Service>,
    characteristics: Vec<CharacteristicEntry>,
    descriptors: Vec<DescriptorEntry>,
}

impl GattTree {
    /// Walks the device's service, characteristic and descriptor proxies.
    pub(crate) async fn build(device: &dyn BluezDevice) -> GattTree {
        let mut tree = GattTree::default();
        for service_proxy in device.gatt_services().await {
            let Some(service_uuid) = parse_uuid(&service_proxy.uuid(), &service_proxy.path()) else {
                continue;
            };
            let service_index = tree.services.len();
            let mut service = Service::new(service_uuid);

            for characteristic_proxy in service_proxy.gatt_characteristics().await {
                let path = characteristic_proxy.path();
                let Some(uuid) = parse_uuid(&characteristic_proxy.uuid(), &path) else {
                    continue;
                };
                let flags = characteristic_proxy.flags().await;
                let (properties, permissions) = parse_flags(&flags);
                let characteristic_index = service.characteristics.len();
                let mut characteristic = Characteristic::new(uuid, service_uuid, properties);
                characteristic.permissions = permissions;

                for descriptor_proxy in characteristic_proxy.gatt_descriptors().await {
                    let descriptor_path = descriptor_proxy.path();
                    let Some(descriptor_uuid) = parse_uuid(&descriptor_proxy.uuid(), &descriptor_path)
                    else {
                        continue;
                    };
                    tree.descriptors.push(DescriptorEntry {
                        path: descriptor_path,
                        proxy: descriptor_proxy,
                        service_index,
                        characteristic_index,
                        descriptor_index: characteristic.descriptors.len(),
                    });
                    characteristic
                        .descriptors
                        .push(Descriptor::new(descriptor_uuid, service_uuid, uuid));
                }

                tree.characteristics.push(CharacteristicEntry {
                    path,
                    proxy: characteristic_proxy,
                    service_index,
                    characteristic_index,
                });
                service.characteristics.push(characteristic);
            }
            tree.services.push(service);
        }
        debug!(
            "built GATT tree with {} services and {} characteristics",
            tree.services.len(),
            tree.characteristics.len()
        );
        tree
    }

    pub(crate) fn services(&self) -> &[Service] {
        &self.services
    }

    /// Object path of the first characteristic matching the service and
    /// characteristic UUIDs, in discovery order.
    pub(crate) fn characteristic_path(&self, characteristic: &Characteristic) -> Option<&str> {
        self.characteristics
            .iter()
            .find(|entry| {
                let service = &self.services[entry.service_index];
                service.uuid == characteristic.service_uuid
                    && service.characteristics[entry.characteristic_index].uuid == characteristic.uuid
            })
            .map(|entry| entry.path.as_str())
    }

    pub(crate) fn descriptor_path(&self, descriptor: &Descriptor) -> Option<&str> {
        self.descriptors
            .iter()
            .find(|entry| {
                let service = &self.services[entry.service_index];
                let characteristic = &service.characteristics[entry.characteristic_index];
                service.uuid == descriptor.service_uuid
                    && characteristic.uuid == descriptor.characteristic_uuid
                    && characteristic.descriptors[entry.descriptor_index].uuid == descriptor.uuid
            })
            .map(|entry| entry.path.as_str())
    }

    pub(crate) fn characteristic_proxy(&self, path: &str) -> Option<Arc<dyn BluezGattCharacteristic>> {
        self.characteristics
            .iter()
            .find(|entry| entry.path == path)
            .map(|entry| Arc::clone(&entry.proxy))
    }

    pub(crate) fn descriptor_proxy(&self, path: &str) -> Option<Arc<dyn BluezGattDescriptor>> {
        self.descriptors
            .iter()
            .find(|entry| entry.path == path)
            .map(|entry| Arc::clone(&entry.proxy))
    }

    fn characteristic_at_mut(&mut self, path: &str) -> Option<&mut Characteristic> {
        let entry = self.characteristics.iter().find(|entry| entry.path == path)?;
        Some(&mut self.services[entry.service_index].characteristics[entry.characteristic_index])
    }

    /// Stores a new cached value; returns the updated characteristic.
    pub(crate) fn set_value(&mut self, path: &str, value: &[u8]) -> Option<Characteristic> {
        let characteristic = self.characteristic_at_mut(path)?;
        characteristic.value = value.to_vec();
        Some(characteristic.clone())
    }

    pub(crate) fn set_notifying(&mut self, path: &str, notifying: bool) -> Option<Characteristic> {
        let characteristic = self.characteristic_at_mut(path)?;
        characteristic.notifying = notifying;
        Some(characteristic.clone())
    }

    pub(crate) fn set_descriptor_value(&mut self, path: &str, value: &[u8]) -> Option<Descriptor> {
        let entry = self.descriptors.iter().find(|entry| entry.path == path)?;
        let descriptor = &mut self.services[entry.service_index].characteristics
            [entry.characteristic_index]
            .descriptors[entry.descriptor_index];
        descriptor.value = value.to_vec();
        Some(descriptor.clone())
    }
}

fn parse_uuid(uuid: &str, path: &str) -> Option<Uuid> {
    match Uuid::parse_str(uuid) {
        Ok(uuid) => Some(uuid),
        Err(e) => {
            warn!("Skipping {} with invalid UUID '{}': {}", path, uuid, e);
            None
        }
    }
}

/// Maps the daemon's flag strings to property and permission sets.
pub(crate) fn parse_flags(
    flags: &[String],
) -> (BTreeSet<CharacteristicProperty>, BTreeSet<AttributePermission>) {
    let mut properties = BTreeSet::new();
    let mut permissions = BTreeSet::new();
    for flag in flags {
        match flag.as_str() {
            "broadcast" => {
                properties.insert(CharacteristicProperty::Broadcast);
            }
            "read" => {
                properties.insert(CharacteristicProperty::Read);
            }
            "write-without-response" => {
                properties.insert(CharacteristicProperty::WriteWithoutResponse);
            }
            "write" => {
                properties.insert(CharacteristicProperty::Write);
            }
            "authenticated-signed-writes" => {
                properties.insert(CharacteristicProperty::AuthenticatedSignedWrites);
            }
            "notify" => {
                properties.insert(CharacteristicProperty::Notify);
            }
            "indicate" => {
                properties.insert(CharacteristicProperty::Indicate);
            }
            "extended-properties" => {
                properties.insert(CharacteristicProperty::ExtendedProperties);
            }
            "encrypt-read" => {
                permissions.insert(AttributePermission::ReadEncryptionRequired);
            }
            "encrypt-write" => {
                permissions.insert(AttributePermission::WriteEncryptionRequired);
            }
            "encrypt-authenticated-read" | "secure-read" => {
                permissions.insert(AttributePermission::ReadAuthenticationRequired);
            }
            "encrypt-authenticated-write" | "secure-write" => {
                permissions.insert(AttributePermission::WriteAuthenticationRequired);
            }
            other => debug!("ignoring characteristic flag '{}'", other),
        }
    }
    (properties, permissions)
}
