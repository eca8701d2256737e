use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, error, info, trace, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use crate::api::central::{DISCOVERY_RSSI_THRESHOLD, ScanFilter, ScanResult};
use crate::api::central_event::{CentralEvent, CentralState};
use crate::api::peripheral::{is_valid_address, normalize_address};
use crate::api::peripheral_event::PeripheralEvent;
use crate::bluez::error::BluezError;
use crate::bluez::peripheral::Peripheral;
use crate::bluez::proxy::{BluezAdapter, PropertyMap, PropertyValue};
use crate::bluez::signal::{Signal, SignalRouter};
use crate::bluez::worker::spawn_worker;
use crate::bluez::{
    BLUEZ_ADAPTER_INTERFACE, BLUEZ_DEVICE_INTERFACE, PROPERTY_ADDRESS, PROPERTY_DISCOVERING,
    PROPERTY_MANUFACTURER_DATA, PROPERTY_NAME, PROPERTY_POWERED, PROPERTY_RSSI,
    PROPERTY_SERVICE_DATA, PROPERTY_SERVICE_UUIDS, address_from_path, device_path,
};
use crate::{Error, Result};

/// Device properties that carry a fresh advertisement.
const ADVERTISEMENT_PROPERTIES: [&str; 4] = [
    PROPERTY_RSSI,
    PROPERTY_NAME,
    PROPERTY_MANUFACTURER_DATA,
    PROPERTY_SERVICE_DATA,
];

enum CentralCommand {
    StartScan,
    StopScan,
    GetPeripheral {
        address: String,
        responder: oneshot::Sender<Result<Peripheral>>,
    },
    RemovePeripheral {
        address: String,
    },
    Signal(Signal),
}

impl From<Signal> for CentralCommand {
    fn from(signal: Signal) -> Self {
        CentralCommand::Signal(signal)
    }
}

/// Scanner and registry of peripheral sessions for one adapter.
pub struct BluetoothCentral {
    adapter_path: String,
    commands: UnboundedSender<CentralCommand>,
    filter: watch::Sender<ScanFilter>,
    scanning: watch::Receiver<bool>,
}

impl BluetoothCentral {
    /// Addresses in `reconnect` are connected automatically the next time
    /// they are discovered.
    pub fn new(
        central_events: UnboundedSender<CentralEvent>,
        peripheral_events: UnboundedSender<PeripheralEvent>,
        reconnect: HashSet<String>,
        adapter: Arc<dyn BluezAdapter>,
        router: &SignalRouter,
    ) -> Result<Self> {
        if central_events.is_closed() {
            return Err(Error::InvalidArgument(
                "central event receiver is closed".to_string(),
            ));
        }
        if peripheral_events.is_closed() {
            return Err(Error::InvalidArgument(
                "peripheral event receiver is closed".to_string(),
            ));
        }
        if let Some(address) = reconnect.iter().find(|address| !is_valid_address(address)) {
            return Err(Error::InvalidAddress(address.clone()));
        }

        let adapter_path = adapter.path();
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (filter_tx, filter_rx) = watch::channel(ScanFilter::None);
        let (scanning_tx, scanning_rx) = watch::channel(false);

        router.register(adapter_path.clone(), commands.downgrade());

        let worker = CentralWorker {
            adapter,
            adapter_path: adapter_path.clone(),
            router: router.clone(),
            commands: commands_rx,
            central_events,
            peripheral_events,
            filter: filter_rx,
            scanning: scanning_tx,
            reconnect: reconnect.iter().map(|address| normalize_address(address)).collect(),
            devices: HashMap::new(),
            peripherals: HashMap::new(),
        };
        spawn_worker(format!("central-{adapter_path}"), worker.run());

        Ok(BluetoothCentral {
            adapter_path,
            commands,
            filter: filter_tx,
            scanning: scanning_rx,
        })
    }

    pub fn adapter_path(&self) -> &str {
        &self.adapter_path
    }

    /// Reports every advertisement.
    pub fn scan_for_peripherals(&self) -> Result<()> {
        self.start_scan(ScanFilter::None)
    }

    pub fn scan_for_peripherals_with_services(&self, uuids: &[Uuid]) -> Result<()> {
        if uuids.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one service UUID is required".to_string(),
            ));
        }
        self.start_scan(ScanFilter::Services(uuids.to_vec()))
    }

    pub fn scan_for_peripherals_with_addresses(&self, addresses: &[&str]) -> Result<()> {
        if addresses.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one address is required".to_string(),
            ));
        }
        if let Some(address) = addresses.iter().find(|address| !is_valid_address(address)) {
            return Err(Error::InvalidAddress(address.to_string()));
        }
        let addresses = addresses
            .iter()
            .map(|address| normalize_address(address))
            .collect();
        self.start_scan(ScanFilter::Addresses(addresses))
    }

    /// Matches advertised names containing any of `names`.
    pub fn scan_for_peripherals_with_names(&self, names: &[&str]) -> Result<()> {
        if names.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one name is required".to_string(),
            ));
        }
        let names = names.iter().map(|name| name.to_string()).collect();
        self.start_scan(ScanFilter::Names(names))
    }

    pub fn stop_scan(&self) -> Result<()> {
        self.send(CentralCommand::StopScan)
    }

    /// `true` between the adapter confirming discovery and confirming its end.
    pub fn is_scanning(&self) -> bool {
        *self.scanning.borrow()
    }

    pub fn scan_filter(&self) -> ScanFilter {
        self.filter.borrow().clone()
    }

    /// Returns the session for `address`, creating it from the adapter's
    /// device object when none exists yet.
    pub async fn get_peripheral(&self, address: &str) -> Result<Peripheral> {
        if !is_valid_address(address) {
            return Err(Error::InvalidAddress(address.to_string()));
        }
        let (responder, response) = oneshot::channel();
        self.send(CentralCommand::GetPeripheral {
            address: normalize_address(address),
            responder,
        })?;
        response
            .await
            .map_err(|_| Error::WorkerStopped("central"))?
    }

    /// Forgets the session. Handles already given out keep working until a
    /// new session for the same device takes over its signals.
    pub fn remove_peripheral(&self, address: &str) -> Result<()> {
        if !is_valid_address(address) {
            return Err(Error::InvalidAddress(address.to_string()));
        }
        self.send(CentralCommand::RemovePeripheral {
            address: normalize_address(address),
        })
    }

    /// The filter is in place before the worker sees the request.
    fn start_scan(&self, filter: ScanFilter) -> Result<()> {
        debug!("Scan requested with filter {:?}", filter);
        self.filter.send_replace(filter);
        self.send(CentralCommand::StartScan)
    }

    fn send(&self, command: CentralCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::WorkerStopped("central"))
    }
}

struct CentralWorker {
    adapter: Arc<dyn BluezAdapter>,
    adapter_path: String,
    router: SignalRouter,
    commands: UnboundedReceiver<CentralCommand>,
    central_events: UnboundedSender<CentralEvent>,
    peripheral_events: UnboundedSender<PeripheralEvent>,
    filter: watch::Receiver<ScanFilter>,
    scanning: watch::Sender<bool>,
    reconnect: HashSet<String>,
    /// Last advertisement per device object path.
    devices: HashMap<String, ScanResult>,
    /// Sessions by normalized address.
    peripherals: HashMap<String, Peripheral>,
}

impl CentralWorker {
    async fn run(mut self) {
        debug!("Central for {} started", self.adapter_path);
        self.power_on().await;
        while let Some(command) = self.commands.recv().await {
            match command {
                CentralCommand::StartScan => self.start_scan().await,
                CentralCommand::StopScan => self.stop_scan().await,
                CentralCommand::GetPeripheral { address, responder } => {
                    let path = device_path(&self.adapter_path, &address);
                    let name = self.devices.get(&path).and_then(|record| record.name.clone());
                    let result = self.peripheral_for(&path, &address, name).await;
                    if responder.send(result).is_err() {
                        trace!("get_peripheral caller for {} went away", address);
                    }
                }
                CentralCommand::RemovePeripheral { address } => {
                    if self.peripherals.remove(&address).is_some() {
                        info!("Removed peripheral {}", address);
                    }
                }
                CentralCommand::Signal(signal) => self.handle_signal(signal).await,
            }
        }
        debug!("Central for {} stopped", self.adapter_path);
    }

    async fn power_on(&self) {
        if self.adapter.is_powered().await {
            return;
        }
        info!("Adapter {} is powered off, powering on", self.adapter_path);
        if let Err(e) = self.adapter.set_powered(true).await {
            error!("Failed to power on {}: {}", self.adapter_path, e);
        }
    }

    fn emit(&self, event: CentralEvent) {
        trace!("central emitting {:?}", event);
        if self.central_events.send(event).is_err() {
            trace!("central event receiver dropped");
        }
    }

    fn scan_failed(&self, action: &str, error: BluezError) {
        error!("{} on {} failed: {}", action, self.adapter_path, error);
        self.emit(CentralEvent::ScanFailed { error });
    }

    async fn start_scan(&mut self) {
        if self.adapter.is_discovering().await {
            debug!("Adapter {} is already discovering", self.adapter_path);
            return;
        }

        let mut discovery_filter = PropertyMap::new();
        discovery_filter.insert("Transport".to_string(), "le".into());
        discovery_filter.insert("DuplicateData".to_string(), true.into());
        discovery_filter.insert("RSSI".to_string(), DISCOVERY_RSSI_THRESHOLD.into());
        if let Err(e) = self.adapter.set_discovery_filter(discovery_filter).await {
            self.scan_failed("Setting discovery filter", e);
            return;
        }
        if let Err(e) = self.adapter.start_discovery().await {
            self.scan_failed("Starting discovery", e);
        }
    }

    async fn stop_scan(&mut self) {
        if !self.adapter.is_discovering().await {
            debug!("Adapter {} is not discovering", self.adapter_path);
            return;
        }
        if let Err(e) = self.adapter.stop_discovery().await {
            self.scan_failed("Stopping discovery", e);
        }
    }

    async fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::PropertiesChanged {
                path,
                interface,
                changed,
            } => match interface.as_str() {
                BLUEZ_ADAPTER_INTERFACE if path == self.adapter_path => {
                    self.handle_adapter_change(&changed)
                }
                BLUEZ_DEVICE_INTERFACE => self.handle_device_change(path, &changed).await,
                _ => {}
            },
            Signal::InterfacesAdded { path, interfaces } => {
                if let Some(properties) = interfaces.get(BLUEZ_DEVICE_INTERFACE) {
                    self.handle_device_added(path, properties).await;
                }
            }
            Signal::InterfacesRemoved { path, interfaces } => {
                let device_removed = interfaces
                    .iter()
                    .any(|interface| interface == BLUEZ_DEVICE_INTERFACE);
                if device_removed && self.devices.remove(&path).is_some() {
                    debug!("Forgot device {}", path);
                }
            }
        }
    }

    fn handle_adapter_change(&mut self, changed: &PropertyMap) {
        if let Some(discovering) = changed.get(PROPERTY_DISCOVERING).and_then(PropertyValue::as_bool) {
            self.set_scanning(discovering);
        }
        if let Some(powered) = changed.get(PROPERTY_POWERED).and_then(PropertyValue::as_bool) {
            let state = if powered {
                CentralState::PoweredOn
            } else {
                CentralState::PoweredOff
            };
            info!("Adapter {} is now {:?}", self.adapter_path, state);
            if !powered {
                self.set_scanning(false);
            }
            self.emit(CentralEvent::StateUpdate { state });
        }
    }

    fn set_scanning(&mut self, scanning: bool) {
        let previous = self.scanning.send_replace(scanning);
        if previous == scanning {
            return;
        }
        if scanning {
            info!("Scan started on {}", self.adapter_path);
            self.emit(CentralEvent::ScanStarted);
        } else {
            info!("Scan stopped on {}", self.adapter_path);
            self.emit(CentralEvent::ScanStopped);
        }
    }

    async fn handle_device_added(&mut self, path: String, properties: &PropertyMap) {
        let address = properties
            .get(PROPERTY_ADDRESS)
            .and_then(PropertyValue::as_str)
            .map(str::to_string)
            .or_else(|| address_from_path(&path));
        let Some(address) = address else {
            warn!("Device {} has no address, ignoring", path);
            return;
        };
        let mut record = ScanResult {
            address: normalize_address(&address),
            ..Default::default()
        };
        apply_properties(&mut record, properties);
        trace!("Device added at {}: {:?}", path, record);
        self.devices.insert(path.clone(), record);
        self.reconcile(&path).await;
    }

    /// Devices the daemon already knew about only announce themselves through
    /// property changes, so an unknown device path starts a new record.
    async fn handle_device_change(&mut self, path: String, changed: &PropertyMap) {
        let advertised = ADVERTISEMENT_PROPERTIES
            .iter()
            .any(|property| changed.contains_key(*property));
        if !self.devices.contains_key(&path) {
            if !advertised {
                return;
            }
            let Some(address) = address_from_path(&path) else {
                return;
            };
            self.devices.insert(
                path.clone(),
                ScanResult {
                    address,
                    ..Default::default()
                },
            );
        }
        if let Some(record) = self.devices.get_mut(&path) {
            apply_properties(record, changed);
        }
        if advertised {
            self.reconcile(&path).await;
        }
    }

    /// Filters the device's latest advertisement and reports it.
    async fn reconcile(&mut self, path: &str) {
        if !*self.scanning.borrow() {
            trace!("Not scanning, ignoring advertisement on {}", path);
            return;
        }
        let Some(scan_result) = self.devices.get(path).cloned() else {
            return;
        };
        if !self.filter.borrow().matches(&scan_result) {
            trace!("{} does not match the scan filter", scan_result.address);
            return;
        }

        let peripheral = match self
            .peripheral_for(path, &scan_result.address, scan_result.name.clone())
            .await
        {
            Ok(peripheral) => peripheral,
            Err(e) => {
                warn!("No session for {}: {}", scan_result.address, e);
                return;
            }
        };

        if self.reconnect.remove(peripheral.address()) {
            info!("Reconnecting to {}", peripheral.address());
            if let Err(e) = peripheral.connect() {
                warn!("Reconnect of {} failed: {}", peripheral.address(), e);
            }
        }

        self.emit(CentralEvent::DiscoveredPeripheral {
            peripheral,
            scan_result,
        });
    }

    async fn peripheral_for(
        &mut self,
        path: &str,
        address: &str,
        name: Option<String>,
    ) -> Result<Peripheral> {
        let key = normalize_address(address);
        if let Some(peripheral) = self.peripherals.get(&key) {
            return Ok(peripheral.clone());
        }
        let device = self
            .adapter
            .get_bluez_device_by_path(path)
            .await
            .ok_or_else(|| Error::DeviceNotFound(key.clone()))?;
        let peripheral = Peripheral::new(
            device,
            &key,
            name,
            self.peripheral_events.clone(),
            &self.router,
        )?;
        debug!("Created session for {} at {}", key, path);
        self.peripherals.insert(key, peripheral.clone());
        Ok(peripheral)
    }
}

/// Copies the advertisement related properties of a device into `record`.
fn apply_properties(record: &mut ScanResult, properties: &PropertyMap) {
    if let Some(name) = properties.get(PROPERTY_NAME).and_then(PropertyValue::as_str) {
        record.name = Some(name.to_string());
    }
    if let Some(rssi) = properties.get(PROPERTY_RSSI).and_then(PropertyValue::as_i16) {
        record.rssi = Some(rssi);
    }
    if let Some(uuids) = properties
        .get(PROPERTY_SERVICE_UUIDS)
        .and_then(PropertyValue::as_str_list)
    {
        record.service_uuids = uuids
            .iter()
            .filter_map(|uuid| Uuid::parse_str(uuid).ok())
            .collect();
    }
    if let Some(PropertyValue::ManufacturerData(data)) = properties.get(PROPERTY_MANUFACTURER_DATA) {
        record.manufacturer_data = data.clone();
    }
    if let Some(PropertyValue::ServiceData(data)) = properties.get(PROPERTY_SERVICE_DATA) {
        record.service_data = data
            .iter()
            .filter_map(|(uuid, bytes)| Uuid::parse_str(uuid).ok().map(|uuid| (uuid, bytes.clone())))
            .collect();
    }
}
