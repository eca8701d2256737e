use std::fmt;
use std::future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use log::{debug, error, info, trace, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use uuid::Uuid;

use crate::api::characteristic::{Characteristic, CharacteristicWriteType};
use crate::api::descriptor::Descriptor;
use crate::api::gatt_status::GattStatus;
use crate::api::peripheral::{ConnectionState, is_valid_address, normalize_address};
use crate::api::peripheral_event::PeripheralEvent;
use crate::api::service::Service;
use crate::bluez::command_queue::{CommandQueue, Operation, OperationRequest, OperationResult};
use crate::bluez::error::BluezError;
use crate::bluez::gatt_tree::GattTree;
use crate::bluez::proxy::{BluezDevice, PropertyMap, PropertyValue};
use crate::bluez::signal::{Signal, SignalRouter};
use crate::bluez::status::{AccessKind, gatt_status};
use crate::bluez::worker::spawn_worker;
use crate::bluez::{
    BLUEZ_CHARACTERISTIC_INTERFACE, BLUEZ_DEVICE_INTERFACE, PROPERTY_CONNECTED,
    PROPERTY_NOTIFYING, PROPERTY_SERVICES_RESOLVED, PROPERTY_VALUE,
};
use crate::{Error, Result};

pub(crate) enum SessionCommand {
    Connect,
    Disconnect,
    Enqueue(Operation),
    Signal(Signal),
}

impl From<Signal> for SessionCommand {
    fn from(signal: Signal) -> Self {
        SessionCommand::Signal(signal)
    }
}

/// Handle to the session with one remote device.
///
/// All requests are handed to the session worker and return immediately;
/// their outcome arrives as a [`PeripheralEvent`]. Cloning the handle is
/// cheap and every clone talks to the same session.
#[derive(Clone)]
pub struct Peripheral {
    address: String,
    name: Option<String>,
    path: String,
    commands: UnboundedSender<SessionCommand>,
    state: watch::Receiver<ConnectionState>,
    services: watch::Receiver<Arc<Vec<Service>>>,
}

impl Peripheral {
    /// Starts a session for `device` and routes the signals below its object
    /// path to it.
    pub fn new(
        device: Arc<dyn BluezDevice>,
        address: &str,
        name: Option<String>,
        events: UnboundedSender<PeripheralEvent>,
        router: &SignalRouter,
    ) -> Result<Self> {
        if !is_valid_address(address) {
            return Err(Error::InvalidAddress(address.to_string()));
        }
        if events.is_closed() {
            return Err(Error::InvalidArgument(
                "peripheral event receiver is closed".to_string(),
            ));
        }

        let address = normalize_address(address);
        let path = device.path();
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (services_tx, services_rx) = watch::channel(Arc::new(Vec::new()));

        router.register(path.clone(), commands.downgrade());

        let worker = SessionWorker {
            address: address.clone(),
            device_path: path.clone(),
            device,
            commands: commands_rx,
            events,
            state: state_tx,
            services: services_tx,
            tree: GattTree::default(),
            queue: CommandQueue::default(),
            link: None,
        };
        spawn_worker(format!("peripheral-{address}"), worker.run());

        Ok(Peripheral {
            address,
            name,
            path,
            commands,
            state: state_rx,
            services: services_rx,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn object_path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Services found by the last discovery; empty while not connected.
    pub fn services(&self) -> Vec<Service> {
        self.services.borrow().to_vec()
    }

    pub fn service(&self, uuid: Uuid) -> Option<Service> {
        self.services
            .borrow()
            .iter()
            .find(|service| service.uuid == uuid)
            .cloned()
    }

    pub fn characteristic(&self, service_uuid: Uuid, uuid: Uuid) -> Option<Characteristic> {
        self.services
            .borrow()
            .iter()
            .find(|service| service.uuid == service_uuid)
            .and_then(|service| service.characteristic(uuid))
            .cloned()
    }

    /// Ignored unless the session is disconnected.
    pub fn connect(&self) -> Result<()> {
        self.send(SessionCommand::Connect)
    }

    /// Ignored unless the session is connected.
    pub fn disconnect(&self) -> Result<()> {
        self.send(SessionCommand::Disconnect)
    }

    pub fn read_characteristic(&self, characteristic: &Characteristic) -> Result<()> {
        self.send(SessionCommand::Enqueue(Operation::ReadCharacteristic {
            characteristic: characteristic.clone(),
        }))
    }

    pub fn write_characteristic(
        &self,
        characteristic: &Characteristic,
        value: &[u8],
        write_type: CharacteristicWriteType,
    ) -> Result<()> {
        self.send(SessionCommand::Enqueue(Operation::WriteCharacteristic {
            characteristic: characteristic.clone(),
            value: value.to_vec(),
            write_type,
        }))
    }

    pub fn set_notify(&self, characteristic: &Characteristic, enable: bool) -> Result<()> {
        self.send(SessionCommand::Enqueue(Operation::SetNotify {
            characteristic: characteristic.clone(),
            enable,
        }))
    }

    pub fn read_descriptor(&self, descriptor: &Descriptor) -> Result<()> {
        self.send(SessionCommand::Enqueue(Operation::ReadDescriptor {
            descriptor: descriptor.clone(),
        }))
    }

    pub fn write_descriptor(&self, descriptor: &Descriptor, value: &[u8]) -> Result<()> {
        self.send(SessionCommand::Enqueue(Operation::WriteDescriptor {
            descriptor: descriptor.clone(),
            value: value.to_vec(),
        }))
    }

    fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::WorkerStopped("peripheral"))
    }
}

impl fmt::Debug for Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peripheral")
            .field("address", &self.address)
            .field("name", &self.name)
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}

enum LinkOutcome {
    Connect(Result<(), BluezError>),
    Disconnect(Result<(), BluezError>),
}

struct SessionWorker {
    address: String,
    device_path: String,
    device: Arc<dyn BluezDevice>,
    commands: UnboundedReceiver<SessionCommand>,
    events: UnboundedSender<PeripheralEvent>,
    state: watch::Sender<ConnectionState>,
    services: watch::Sender<Arc<Vec<Service>>>,
    tree: GattTree,
    queue: CommandQueue,
    link: Option<BoxFuture<'static, LinkOutcome>>,
}

impl SessionWorker {
    async fn run(mut self) {
        debug!("Session for {} started", self.address);
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some((request, result)) = self.queue.next_completion() => {
                    self.complete(request, result);
                }
                outcome = next_link_outcome(&mut self.link) => self.handle_link_outcome(outcome),
            }
            self.dispatch_next();
        }
        debug!("Session for {} stopped", self.address);
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect => self.connect(),
            SessionCommand::Disconnect => self.disconnect(),
            SessionCommand::Enqueue(operation) => self.enqueue(operation),
            SessionCommand::Signal(signal) => self.handle_signal(signal).await,
        }
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("{}: {} -> {}", self.address, previous, state);
        }
    }

    fn emit(&self, event: PeripheralEvent) {
        trace!("{}: emitting {:?}", self.address, event);
        if self.events.send(event).is_err() {
            trace!("{}: event receiver dropped", self.address);
        }
    }

    fn publish_services(&self) {
        self.services
            .send_replace(Arc::new(self.tree.services().to_vec()));
    }

    fn connect(&mut self) {
        let state = self.current_state();
        if state != ConnectionState::Disconnected {
            info!("{} is {}, ignoring connect", self.address, state);
            return;
        }
        self.set_state(ConnectionState::Connecting);
        let device = Arc::clone(&self.device);
        self.link = Some(async move { LinkOutcome::Connect(device.connect().await) }.boxed());
    }

    fn disconnect(&mut self) {
        let state = self.current_state();
        if state != ConnectionState::Connected {
            info!("{} is {}, ignoring disconnect", self.address, state);
            return;
        }
        self.set_state(ConnectionState::Disconnecting);
        let device = Arc::clone(&self.device);
        self.link = Some(async move { LinkOutcome::Disconnect(device.disconnect().await) }.boxed());
    }

    fn handle_link_outcome(&mut self, outcome: LinkOutcome) {
        match outcome {
            LinkOutcome::Connect(Ok(())) => {
                debug!("{}: connect accepted, waiting for link", self.address);
            }
            LinkOutcome::Connect(Err(BluezError::AlreadyConnected(_))) => {
                if self.current_state() == ConnectionState::Connecting {
                    self.set_state(ConnectionState::Connected);
                    self.emit(PeripheralEvent::Connected {
                        address: self.address.clone(),
                    });
                }
            }
            LinkOutcome::Connect(Err(e)) => {
                error!("Connecting to {} failed: {}", self.address, e);
                if self.current_state() == ConnectionState::Connecting {
                    self.set_state(ConnectionState::Disconnected);
                    self.emit(PeripheralEvent::ConnectFailed {
                        address: self.address.clone(),
                    });
                }
            }
            LinkOutcome::Disconnect(Ok(())) => {
                debug!("{}: disconnect accepted, waiting for link", self.address);
            }
            LinkOutcome::Disconnect(Err(BluezError::NotConnected(_))) => {
                if self.current_state() == ConnectionState::Disconnecting {
                    self.handle_disconnected();
                }
            }
            LinkOutcome::Disconnect(Err(e)) => {
                warn!("Disconnecting {} failed: {}", self.address, e);
                if self.current_state() == ConnectionState::Disconnecting {
                    self.set_state(ConnectionState::Connected);
                }
            }
        }
    }

    async fn handle_signal(&mut self, signal: Signal) {
        let Signal::PropertiesChanged {
            path,
            interface,
            changed,
        } = signal
        else {
            return;
        };

        match interface.as_str() {
            BLUEZ_DEVICE_INTERFACE if path == self.device_path => {
                if let Some(connected) = changed.get(PROPERTY_CONNECTED).and_then(PropertyValue::as_bool) {
                    if connected {
                        self.handle_connected();
                    } else {
                        self.handle_disconnected();
                    }
                }
                let resolved = changed
                    .get(PROPERTY_SERVICES_RESOLVED)
                    .and_then(PropertyValue::as_bool);
                if resolved == Some(true) {
                    self.handle_services_resolved().await;
                }
            }
            BLUEZ_CHARACTERISTIC_INTERFACE => {
                if let Some(value) = changed.get(PROPERTY_VALUE).and_then(PropertyValue::as_bytes) {
                    self.handle_value(&path, value);
                }
                if let Some(notifying) = changed.get(PROPERTY_NOTIFYING).and_then(PropertyValue::as_bool) {
                    self.handle_notifying(&path, notifying);
                }
            }
            _ => trace!("{}: ignoring {} change on {}", self.address, interface, path),
        }
    }

    fn handle_connected(&mut self) {
        let state = self.current_state();
        if state != ConnectionState::Connecting {
            debug!("{}: link up while {}", self.address, state);
            return;
        }
        self.set_state(ConnectionState::Connected);
        info!("Connected to {}", self.address);
        self.emit(PeripheralEvent::Connected {
            address: self.address.clone(),
        });
    }

    /// Tears the session down and fails everything still queued.
    fn handle_disconnected(&mut self) {
        let previous = self.current_state();
        self.set_state(ConnectionState::Disconnected);
        self.tree = GattTree::default();
        self.publish_services();

        let drained = self.queue.drain();
        if !drained.is_empty() {
            debug!("{}: failing {} queued requests", self.address, drained.len());
        }
        for request in drained {
            self.emit_failure(request.operation, GattStatus::NotConnected);
        }

        info!("Disconnected from {} (was {})", self.address, previous);
        self.emit(PeripheralEvent::Disconnected {
            address: self.address.clone(),
        });
    }

    async fn handle_services_resolved(&mut self) {
        let state = self.current_state();
        if state != ConnectionState::Connected {
            debug!("{}: services resolved while {}, ignoring", self.address, state);
            return;
        }
        let device = Arc::clone(&self.device);
        self.tree = GattTree::build(device.as_ref()).await;
        self.publish_services();
        info!(
            "{}: discovered {} services",
            self.address,
            self.tree.services().len()
        );
        self.emit(PeripheralEvent::ServicesDiscovered {
            address: self.address.clone(),
        });
    }

    fn handle_value(&mut self, path: &str, value: &[u8]) {
        let Some(characteristic) = self.tree.set_value(path, value) else {
            trace!("{}: value for unknown characteristic {}", self.address, path);
            return;
        };
        self.publish_services();
        self.emit(PeripheralEvent::CharacteristicUpdate {
            address: self.address.clone(),
            characteristic,
            value: value.to_vec(),
            status: GattStatus::Success,
        });
    }

    fn handle_notifying(&mut self, path: &str, notifying: bool) {
        let Some(characteristic) = self.tree.set_notifying(path, notifying) else {
            trace!("{}: Notifying for unknown characteristic {}", self.address, path);
            return;
        };
        self.publish_services();
        self.emit(PeripheralEvent::NotificationStateUpdate {
            address: self.address.clone(),
            characteristic,
            status: GattStatus::Success,
        });
    }

    fn enqueue(&mut self, operation: Operation) {
        let state = self.current_state();
        if state != ConnectionState::Connected {
            info!("{} is {}, ignoring {:?}", self.address, state, operation);
            return;
        }
        let Some(path) = self.target_path(&operation) else {
            warn!("{}: target of {:?} not found", self.address, operation);
            return;
        };
        if let Err(reason) = check_capability(&operation) {
            warn!("{}: {} ({})", self.address, reason, path);
            return;
        }
        self.queue.enqueue(OperationRequest::new(operation, path));
        trace!("{}: {} requests queued", self.address, self.queue.len());
    }

    fn target_path(&self, operation: &Operation) -> Option<String> {
        let path = match operation {
            Operation::ReadCharacteristic { characteristic }
            | Operation::WriteCharacteristic { characteristic, .. }
            | Operation::SetNotify { characteristic, .. } => {
                self.tree.characteristic_path(characteristic)
            }
            Operation::ReadDescriptor { descriptor }
            | Operation::WriteDescriptor { descriptor, .. } => self.tree.descriptor_path(descriptor),
        };
        path.map(str::to_string)
    }

    /// Starts queued requests until one is in flight or the queue is empty.
    fn dispatch_next(&mut self) {
        while let Some(request) = self.queue.next_pending() {
            match self.remote_call(&request) {
                Some(completion) => {
                    trace!("{}: dispatching request for {}", self.address, request.path);
                    self.queue.start(request, completion);
                }
                None => warn!(
                    "{}: {} no longer resolves, dropping request",
                    self.address, request.path
                ),
            }
        }
    }

    fn remote_call(&self, request: &OperationRequest) -> Option<BoxFuture<'static, OperationResult>> {
        let completion = match &request.operation {
            Operation::ReadCharacteristic { .. } => {
                let proxy = self.tree.characteristic_proxy(&request.path)?;
                async move { proxy.read_value(PropertyMap::new()).await }.boxed()
            }
            Operation::WriteCharacteristic {
                value, write_type, ..
            } => {
                let proxy = self.tree.characteristic_proxy(&request.path)?;
                let value = value.clone();
                let mut options = PropertyMap::new();
                options.insert("type".to_string(), write_type.bluez_type().into());
                async move { proxy.write_value(value, options).await.map(|()| Vec::new()) }.boxed()
            }
            Operation::SetNotify { enable, .. } => {
                let proxy = self.tree.characteristic_proxy(&request.path)?;
                let enable = *enable;
                async move {
                    let result = if enable {
                        proxy.start_notify().await
                    } else {
                        proxy.stop_notify().await
                    };
                    result.map(|()| Vec::new())
                }
                .boxed()
            }
            Operation::ReadDescriptor { .. } => {
                let proxy = self.tree.descriptor_proxy(&request.path)?;
                async move { proxy.read_value(PropertyMap::new()).await }.boxed()
            }
            Operation::WriteDescriptor { value, .. } => {
                let proxy = self.tree.descriptor_proxy(&request.path)?;
                let value = value.clone();
                async move {
                    proxy
                        .write_value(value, PropertyMap::new())
                        .await
                        .map(|()| Vec::new())
                }
                .boxed()
            }
        };
        Some(completion)
    }

    fn complete(&mut self, request: OperationRequest, result: OperationResult) {
        debug!(
            "{}: request for {} finished after {:?}",
            self.address,
            request.path,
            request.enqueued_at.elapsed()
        );
        match result {
            Ok(returned) => self.complete_success(&request.path, request.operation, returned),
            Err(e) => {
                warn!("{}: request for {} failed: {}", self.address, request.path, e);
                let status = gatt_status(&e, access_kind(&request.operation));
                self.emit_failure(request.operation, status);
            }
        }
    }

    fn complete_success(&mut self, path: &str, operation: Operation, returned: Vec<u8>) {
        let address = self.address.clone();
        let status = GattStatus::Success;
        let event = match operation {
            Operation::ReadCharacteristic { characteristic } => {
                let characteristic = self
                    .tree
                    .set_value(path, &returned)
                    .unwrap_or_else(|| Characteristic {
                        value: returned.clone(),
                        ..characteristic
                    });
                self.publish_services();
                PeripheralEvent::CharacteristicUpdate {
                    address,
                    characteristic,
                    value: returned,
                    status,
                }
            }
            Operation::WriteCharacteristic {
                characteristic,
                value,
                ..
            } => PeripheralEvent::CharacteristicWrite {
                address,
                characteristic,
                value,
                status,
            },
            // The outcome arrives as a Notifying change.
            Operation::SetNotify { enable, .. } => {
                debug!("{}: notify {} accepted for {}", address, enable, path);
                return;
            }
            Operation::ReadDescriptor { descriptor } => {
                let descriptor = self
                    .tree
                    .set_descriptor_value(path, &returned)
                    .unwrap_or_else(|| Descriptor {
                        value: returned.clone(),
                        ..descriptor
                    });
                self.publish_services();
                PeripheralEvent::DescriptorRead {
                    address,
                    descriptor,
                    value: returned,
                    status,
                }
            }
            Operation::WriteDescriptor { descriptor, value } => PeripheralEvent::DescriptorWrite {
                address,
                descriptor,
                value,
                status,
            },
        };
        self.emit(event);
    }

    /// Reports a request that did not succeed. Reads report an empty value,
    /// writes report the value that was attempted.
    fn emit_failure(&self, operation: Operation, status: GattStatus) {
        let address = self.address.clone();
        let event = match operation {
            Operation::ReadCharacteristic { characteristic } => {
                PeripheralEvent::CharacteristicUpdate {
                    address,
                    characteristic,
                    value: Vec::new(),
                    status,
                }
            }
            Operation::WriteCharacteristic {
                characteristic,
                value,
                ..
            } => PeripheralEvent::CharacteristicWrite {
                address,
                characteristic,
                value,
                status,
            },
            Operation::SetNotify { characteristic, .. } => {
                PeripheralEvent::NotificationStateUpdate {
                    address,
                    characteristic,
                    status,
                }
            }
            Operation::ReadDescriptor { descriptor } => PeripheralEvent::DescriptorRead {
                address,
                descriptor,
                value: Vec::new(),
                status,
            },
            Operation::WriteDescriptor { descriptor, value } => PeripheralEvent::DescriptorWrite {
                address,
                descriptor,
                value,
                status,
            },
        };
        self.emit(event);
    }
}

fn check_capability(operation: &Operation) -> std::result::Result<(), &'static str> {
    match operation {
        Operation::ReadCharacteristic { characteristic } if !characteristic.supports_reading() => {
            Err("characteristic is not readable")
        }
        Operation::WriteCharacteristic {
            characteristic,
            write_type,
            ..
        } if !characteristic.supports_write_type(*write_type) => {
            Err("characteristic does not support this write type")
        }
        Operation::SetNotify { characteristic, .. } if !characteristic.supports_notifying() => {
            Err("characteristic does not support notify or indicate")
        }
        _ => Ok(()),
    }
}

/// Notify toggles are writes to the client configuration descriptor.
fn access_kind(operation: &Operation) -> AccessKind {
    match operation {
        Operation::ReadCharacteristic { .. } | Operation::ReadDescriptor { .. } => AccessKind::Read,
        Operation::WriteCharacteristic { .. }
        | Operation::SetNotify { .. }
        | Operation::WriteDescriptor { .. } => AccessKind::Write,
    }
}

/// Outcome of the pending connect or disconnect RPC; never resolves while
/// none is pending.
async fn next_link_outcome(link: &mut Option<BoxFuture<'static, LinkOutcome>>) -> LinkOutcome {
    let outcome = match link.as_mut() {
        Some(pending) => pending.await,
        None => return future::pending().await,
    };
    *link = None;
    outcome
}
