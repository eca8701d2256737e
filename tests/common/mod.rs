#![allow(dead_code)]

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rustycentral::bluez::error::BluezError;
use rustycentral::bluez::proxy::{
    BluezAdapter, BluezDevice, BluezGattCharacteristic, BluezGattDescriptor, BluezGattService,
    PropertyMap, PropertyValue,
};
use rustycentral::bluez::signal::Signal;
use rustycentral::bluez::{
    BLUEZ_ADAPTER_INTERFACE, BLUEZ_CHARACTERISTIC_INTERFACE, BLUEZ_DEVICE_INTERFACE,
    PROPERTY_CONNECTED, PROPERTY_DISCOVERING, PROPERTY_NOTIFYING, PROPERTY_POWERED,
    PROPERTY_SERVICES_RESOLVED, PROPERTY_VALUE,
};
use tokio::sync::Notify;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

pub const ADAPTER_PATH: &str = "/org/bluez/hci0";
pub const DEVICE_PATH: &str = "/org/bluez/hci0/dev_C0_26_DF_01_F2_72";
pub const DEVICE_ADDRESS: &str = "C0:26:DF:01:F2:72";
pub const OTHER_DEVICE_PATH: &str = "/org/bluez/hci0/dev_12_34_56_65_43_21";
pub const OTHER_DEVICE_ADDRESS: &str = "12:34:56:65:43:21";

pub const BLP_SERVICE: u16 = 0x1810;
pub const HTS_SERVICE: u16 = 0x1809;
pub const BLOOD_PRESSURE_MEASUREMENT: u16 = 0x2a35;
pub const TEMPERATURE_MEASUREMENT: u16 = 0x2a1c;
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: u16 = 0x2902;

pub fn init_logging() {
    let _ = pretty_env_logger::formatted_builder()
        .is_test(true)
        .parse_env("RUST_LOG")
        .try_init();
}

/// 16-bit assigned number expanded with the Bluetooth base UUID.
pub fn bt_uuid(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_0080_5f9b_34fb)
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

pub async fn next_event<T>(receiver: &mut UnboundedReceiver<T>) -> T {
    timeout(Duration::from_secs(2), receiver.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

pub async fn assert_no_event<T: Debug>(receiver: &mut UnboundedReceiver<T>) {
    if let Ok(Some(event)) = timeout(Duration::from_millis(100), receiver.recv()).await {
        panic!("unexpected event: {event:?}");
    }
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Lets the workers drain their channels before checking that nothing
/// happened.
pub async fn settle() {
    sleep(Duration::from_millis(50)).await;
}

pub fn properties_changed(path: &str, interface: &str, changes: Vec<(&str, PropertyValue)>) -> Signal {
    Signal::PropertiesChanged {
        path: path.to_string(),
        interface: interface.to_string(),
        changed: changes
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    }
}

pub fn connected_signal(path: &str, connected: bool) -> Signal {
    properties_changed(
        path,
        BLUEZ_DEVICE_INTERFACE,
        vec![(PROPERTY_CONNECTED, connected.into())],
    )
}

pub fn services_resolved_signal(path: &str) -> Signal {
    properties_changed(
        path,
        BLUEZ_DEVICE_INTERFACE,
        vec![(PROPERTY_SERVICES_RESOLVED, true.into())],
    )
}

pub fn value_signal(characteristic_path: &str, value: &[u8]) -> Signal {
    properties_changed(
        characteristic_path,
        BLUEZ_CHARACTERISTIC_INTERFACE,
        vec![(PROPERTY_VALUE, value.to_vec().into())],
    )
}

pub fn notifying_signal(characteristic_path: &str, notifying: bool) -> Signal {
    properties_changed(
        characteristic_path,
        BLUEZ_CHARACTERISTIC_INTERFACE,
        vec![(PROPERTY_NOTIFYING, notifying.into())],
    )
}

pub fn discovering_signal(discovering: bool) -> Signal {
    properties_changed(
        ADAPTER_PATH,
        BLUEZ_ADAPTER_INTERFACE,
        vec![(PROPERTY_DISCOVERING, discovering.into())],
    )
}

pub fn powered_signal(powered: bool) -> Signal {
    properties_changed(
        ADAPTER_PATH,
        BLUEZ_ADAPTER_INTERFACE,
        vec![(PROPERTY_POWERED, powered.into())],
    )
}

pub fn device_added_signal(path: &str, properties: Vec<(&str, PropertyValue)>) -> Signal {
    let properties: PropertyMap = properties
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
    Signal::InterfacesAdded {
        path: path.to_string(),
        interfaces: HashMap::from([(BLUEZ_DEVICE_INTERFACE.to_string(), properties)]),
    }
}

pub struct FakeDescriptor {
    pub uuid: Uuid,
    pub path: String,
    pub read_result: Mutex<Result<Vec<u8>, BluezError>>,
    pub write_result: Mutex<Result<(), BluezError>>,
    pub reads: AtomicUsize,
    pub writes: Mutex<Vec<Vec<u8>>>,
}

impl FakeDescriptor {
    pub fn new(path: &str, uuid: Uuid) -> Arc<Self> {
        Arc::new(FakeDescriptor {
            uuid,
            path: path.to_string(),
            read_result: Mutex::new(Ok(Vec::new())),
            write_result: Mutex::new(Ok(())),
            reads: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl BluezGattDescriptor for FakeDescriptor {
    fn uuid(&self) -> String {
        self.uuid.to_string()
    }

    fn path(&self) -> String {
        self.path.clone()
    }

    async fn read_value(&self, _options: PropertyMap) -> Result<Vec<u8>, BluezError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.read_result.lock().unwrap().clone()
    }

    async fn write_value(&self, value: Vec<u8>, _options: PropertyMap) -> Result<(), BluezError> {
        self.writes.lock().unwrap().push(value);
        self.write_result.lock().unwrap().clone()
    }
}

pub struct FakeCharacteristic {
    pub uuid: Uuid,
    pub path: String,
    pub flags: Vec<String>,
    pub descriptors: Vec<Arc<FakeDescriptor>>,
    pub read_result: Mutex<Result<Vec<u8>, BluezError>>,
    pub write_result: Mutex<Result<(), BluezError>>,
    pub notify_result: Mutex<Result<(), BluezError>>,
    /// While set, reads wait for `release_reads` before returning.
    pub hang_reads: AtomicBool,
    pub release_reads: Notify,
    pub reads: AtomicUsize,
    pub writes: Mutex<Vec<(Vec<u8>, PropertyMap)>>,
    pub start_notify_calls: AtomicUsize,
    pub stop_notify_calls: AtomicUsize,
}

impl FakeCharacteristic {
    pub fn new(path: &str, uuid: Uuid, flags: &[&str]) -> Arc<Self> {
        Self::with_descriptors(path, uuid, flags, Vec::new())
    }

    pub fn with_descriptors(
        path: &str,
        uuid: Uuid,
        flags: &[&str],
        descriptors: Vec<Arc<FakeDescriptor>>,
    ) -> Arc<Self> {
        Arc::new(FakeCharacteristic {
            uuid,
            path: path.to_string(),
            flags: strings(flags),
            descriptors,
            read_result: Mutex::new(Ok(Vec::new())),
            write_result: Mutex::new(Ok(())),
            notify_result: Mutex::new(Ok(())),
            hang_reads: AtomicBool::new(false),
            release_reads: Notify::new(),
            reads: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
            start_notify_calls: AtomicUsize::new(0),
            stop_notify_calls: AtomicUsize::new(0),
        })
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn start_notify_calls(&self) -> usize {
        self.start_notify_calls.load(Ordering::SeqCst)
    }

    pub fn stop_notify_calls(&self) -> usize {
        self.stop_notify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BluezGattCharacteristic for FakeCharacteristic {
    fn uuid(&self) -> String {
        self.uuid.to_string()
    }

    fn path(&self) -> String {
        self.path.clone()
    }

    async fn flags(&self) -> Vec<String> {
        self.flags.clone()
    }

    async fn read_value(&self, _options: PropertyMap) -> Result<Vec<u8>, BluezError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.hang_reads.load(Ordering::SeqCst) {
            self.release_reads.notified().await;
        }
        self.read_result.lock().unwrap().clone()
    }

    async fn write_value(&self, value: Vec<u8>, options: PropertyMap) -> Result<(), BluezError> {
        self.writes.lock().unwrap().push((value, options));
        self.write_result.lock().unwrap().clone()
    }

    async fn start_notify(&self) -> Result<(), BluezError> {
        self.start_notify_calls.fetch_add(1, Ordering::SeqCst);
        self.notify_result.lock().unwrap().clone()
    }

    async fn stop_notify(&self) -> Result<(), BluezError> {
        self.stop_notify_calls.fetch_add(1, Ordering::SeqCst);
        self.notify_result.lock().unwrap().clone()
    }

    async fn gatt_descriptors(&self) -> Vec<Arc<dyn BluezGattDescriptor>> {
        self.descriptors
            .iter()
            .map(|descriptor| Arc::clone(descriptor) as Arc<dyn BluezGattDescriptor>)
            .collect()
    }
}

pub struct FakeService {
    pub uuid: Uuid,
    pub path: String,
    pub characteristics: Vec<Arc<FakeCharacteristic>>,
}

impl FakeService {
    pub fn new(path: &str, uuid: Uuid, characteristics: Vec<Arc<FakeCharacteristic>>) -> Arc<Self> {
        Arc::new(FakeService {
            uuid,
            path: path.to_string(),
            characteristics,
        })
    }
}

#[async_trait]
impl BluezGattService for FakeService {
    fn uuid(&self) -> String {
        self.uuid.to_string()
    }

    fn path(&self) -> String {
        self.path.clone()
    }

    async fn gatt_characteristics(&self) -> Vec<Arc<dyn BluezGattCharacteristic>> {
        self.characteristics
            .iter()
            .map(|characteristic| Arc::clone(characteristic) as Arc<dyn BluezGattCharacteristic>)
            .collect()
    }
}

pub struct FakeDevice {
    pub path: String,
    pub connect_result: Mutex<Result<(), BluezError>>,
    pub disconnect_result: Mutex<Result<(), BluezError>>,
    pub connect_calls: AtomicUsize,
    pub disconnect_calls: AtomicUsize,
    pub services: Mutex<Vec<Arc<FakeService>>>,
}

impl FakeDevice {
    pub fn new(path: &str) -> Arc<Self> {
        Arc::new(FakeDevice {
            path: path.to_string(),
            connect_result: Mutex::new(Ok(())),
            disconnect_result: Mutex::new(Ok(())),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            services: Mutex::new(Vec::new()),
        })
    }

    pub fn set_connect_result(&self, result: Result<(), BluezError>) {
        *self.connect_result.lock().unwrap() = result;
    }

    pub fn set_services(&self, services: Vec<Arc<FakeService>>) {
        *self.services.lock().unwrap() = services;
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BluezDevice for FakeDevice {
    fn path(&self) -> String {
        self.path.clone()
    }

    async fn connect(&self) -> Result<(), BluezError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.connect_result.lock().unwrap().clone()
    }

    async fn disconnect(&self) -> Result<(), BluezError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.disconnect_result.lock().unwrap().clone()
    }

    async fn gatt_services(&self) -> Vec<Arc<dyn BluezGattService>> {
        self.services
            .lock()
            .unwrap()
            .iter()
            .map(|service| Arc::clone(service) as Arc<dyn BluezGattService>)
            .collect()
    }
}

pub struct FakeAdapter {
    pub path: String,
    pub powered: AtomicBool,
    pub discovering: AtomicBool,
    pub set_powered_calls: Mutex<Vec<bool>>,
    pub discovery_filters: Mutex<Vec<PropertyMap>>,
    pub start_discovery_calls: AtomicUsize,
    pub stop_discovery_calls: AtomicUsize,
    pub start_discovery_result: Mutex<Result<(), BluezError>>,
    pub devices: Mutex<HashMap<String, Arc<FakeDevice>>>,
}

impl FakeAdapter {
    pub fn new(powered: bool) -> Arc<Self> {
        Arc::new(FakeAdapter {
            path: ADAPTER_PATH.to_string(),
            powered: AtomicBool::new(powered),
            discovering: AtomicBool::new(false),
            set_powered_calls: Mutex::new(Vec::new()),
            discovery_filters: Mutex::new(Vec::new()),
            start_discovery_calls: AtomicUsize::new(0),
            stop_discovery_calls: AtomicUsize::new(0),
            start_discovery_result: Mutex::new(Ok(())),
            devices: Mutex::new(HashMap::new()),
        })
    }

    pub fn add_device(&self, device: Arc<FakeDevice>) {
        self.devices
            .lock()
            .unwrap()
            .insert(device.path.clone(), device);
    }

    pub fn set_discovering(&self, discovering: bool) {
        self.discovering.store(discovering, Ordering::SeqCst);
    }

    pub fn start_discovery_calls(&self) -> usize {
        self.start_discovery_calls.load(Ordering::SeqCst)
    }

    pub fn stop_discovery_calls(&self) -> usize {
        self.stop_discovery_calls.load(Ordering::SeqCst)
    }

    pub fn discovery_filters(&self) -> Vec<PropertyMap> {
        self.discovery_filters.lock().unwrap().clone()
    }
}

#[async_trait]
impl BluezAdapter for FakeAdapter {
    fn path(&self) -> String {
        self.path.clone()
    }

    async fn is_powered(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }

    async fn set_powered(&self, powered: bool) -> Result<(), BluezError> {
        self.set_powered_calls.lock().unwrap().push(powered);
        Ok(())
    }

    async fn is_discovering(&self) -> bool {
        self.discovering.load(Ordering::SeqCst)
    }

    async fn set_discovery_filter(&self, filter: PropertyMap) -> Result<(), BluezError> {
        self.discovery_filters.lock().unwrap().push(filter);
        Ok(())
    }

    async fn start_discovery(&self) -> Result<(), BluezError> {
        self.start_discovery_calls.fetch_add(1, Ordering::SeqCst);
        self.start_discovery_result.lock().unwrap().clone()
    }

    async fn stop_discovery(&self) -> Result<(), BluezError> {
        self.stop_discovery_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_bluez_device_by_path(&self, path: &str) -> Option<Arc<dyn BluezDevice>> {
        self.devices
            .lock()
            .unwrap()
            .get(path)
            .map(|device| Arc::clone(device) as Arc<dyn BluezDevice>)
    }
}
