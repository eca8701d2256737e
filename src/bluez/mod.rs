pub mod central_manager;
mod command_queue;
pub mod error;
mod gatt_tree;
pub mod peripheral;
pub mod proxy;
pub mod signal;
pub mod status;
mod worker;

pub const BLUEZ_ADAPTER_INTERFACE: &str = "org.bluez.Adapter1";
pub const BLUEZ_DEVICE_INTERFACE: &str = "org.bluez.Device1";
pub const BLUEZ_CHARACTERISTIC_INTERFACE: &str = "org.bluez.GattCharacteristic1";

pub const PROPERTY_DISCOVERING: &str = "Discovering";
pub const PROPERTY_POWERED: &str = "Powered";
pub const PROPERTY_ADDRESS: &str = "Address";
pub const PROPERTY_NAME: &str = "Name";
pub const PROPERTY_RSSI: &str = "RSSI";
pub const PROPERTY_SERVICE_UUIDS: &str = "ServiceUUIDs";
pub const PROPERTY_MANUFACTURER_DATA: &str = "ManufacturerData";
pub const PROPERTY_SERVICE_DATA: &str = "ServiceData";
pub const PROPERTY_CONNECTED: &str = "Connected";
pub const PROPERTY_SERVICES_RESOLVED: &str = "ServicesResolved";
pub const PROPERTY_VALUE: &str = "Value";
pub const PROPERTY_NOTIFYING: &str = "Notifying";

/// `/org/bluez/hci0` + `12:34:56:65:43:21` -> `/org/bluez/hci0/dev_12_34_56_65_43_21`
pub fn device_path(adapter_path: &str, address: &str) -> String {
    format!(
        "{}/dev_{}",
        adapter_path,
        address.to_ascii_uppercase().replace(':', "_")
    )
}

/// Inverse of [`device_path`]; `None` when the last segment is not a device.
pub fn address_from_path(path: &str) -> Option<String> {
    let segment = path.rsplit('/').next()?;
    let address = segment.strip_prefix("dev_")?.replace('_', ":");
    crate::api::peripheral::is_valid_address(&address).then_some(address)
}

/// `true` when `path` is `owner` or lies below it.
pub(crate) fn path_is_within(path: &str, owner: &str) -> bool {
    match path.strip_prefix(owner) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || owner.ends_with('/'),
        None => false,
    }
}
