//! Routing of bus signals to the component owning the object path.

use std::collections::HashMap;

use log::{debug, trace};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};

use crate::bluez::path_is_within;
use crate::bluez::proxy::PropertyMap;
use crate::bluez::worker::spawn_worker;

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    PropertiesChanged {
        path: String,
        interface: String,
        changed: PropertyMap,
    },
    InterfacesAdded {
        path: String,
        interfaces: HashMap<String, PropertyMap>,
    },
    InterfacesRemoved {
        path: String,
        interfaces: Vec<String>,
    },
}

impl Signal {
    pub fn path(&self) -> &str {
        match self {
            Signal::PropertiesChanged { path, .. }
            | Signal::InterfacesAdded { path, .. }
            | Signal::InterfacesRemoved { path, .. } => path,
        }
    }
}

/// Receiving end of a route. Returns `false` once the receiver is gone, which
/// removes the route.
pub trait SignalSink: Send {
    fn deliver(&self, signal: &Signal) -> bool;
}

impl<T> SignalSink for UnboundedSender<T>
where
    T: From<Signal> + Send,
{
    fn deliver(&self, signal: &Signal) -> bool {
        self.send(T::from(signal.clone())).is_ok()
    }
}

impl<T> SignalSink for WeakUnboundedSender<T>
where
    T: From<Signal> + Send,
{
    fn deliver(&self, signal: &Signal) -> bool {
        match self.upgrade() {
            Some(sender) => sender.send(T::from(signal.clone())).is_ok(),
            None => false,
        }
    }
}

enum RouterMessage {
    Register {
        path: String,
        sink: Box<dyn SignalSink>,
    },
    Signal(Signal),
}

/// Dispatches signals to every route whose path is the signal's path or one
/// of its ancestors, e.g. a device session receives the signals of its
/// characteristics and the central (registered at the adapter path) receives
/// the signals of every device.
///
/// Each object path has a single owner: registering a path again replaces
/// the previous route. Registrations and signals share one channel, so a
/// route registered before a signal is handed in always sees it. Signals for
/// one path keep their order.
#[derive(Clone)]
pub struct SignalRouter {
    messages: UnboundedSender<RouterMessage>,
}

impl SignalRouter {
    pub fn new() -> Self {
        let (messages, receiver) = mpsc::unbounded_channel();
        let worker = RouterWorker {
            messages: receiver,
            routes: HashMap::new(),
        };
        spawn_worker("signal-router".to_string(), worker.run());
        SignalRouter { messages }
    }

    /// Entry point for the bus transport.
    pub fn handle_signal(&self, signal: Signal) {
        if self.messages.send(RouterMessage::Signal(signal)).is_err() {
            log::warn!("Signal router has stopped, dropping signal");
        }
    }

    pub fn register(&self, path: impl Into<String>, sink: impl SignalSink + 'static) {
        let message = RouterMessage::Register {
            path: path.into(),
            sink: Box::new(sink),
        };
        if self.messages.send(message).is_err() {
            log::warn!("Signal router has stopped, route not registered");
        }
    }
}

impl Default for SignalRouter {
    fn default() -> Self {
        Self::new()
    }
}

struct RouterWorker {
    messages: UnboundedReceiver<RouterMessage>,
    /// Owner of each registered object path.
    routes: HashMap<String, Box<dyn SignalSink>>,
}

impl RouterWorker {
    async fn run(mut self) {
        while let Some(message) = self.messages.recv().await {
            match message {
                RouterMessage::Register { path, sink } => {
                    if self.routes.insert(path.clone(), sink).is_some() {
                        debug!("route for {} replaced", path);
                    } else {
                        trace!("route registered for {}", path);
                    }
                }
                RouterMessage::Signal(signal) => self.dispatch(&signal),
            }
        }
        trace!("signal router stopped");
    }

    fn dispatch(&mut self, signal: &Signal) {
        let path = signal.path();
        let mut delivered = false;
        let mut closed = Vec::new();
        for (owner, sink) in &self.routes {
            if !path_is_within(path, owner) {
                continue;
            }
            if sink.deliver(signal) {
                delivered = true;
            } else {
                closed.push(owner.clone());
            }
        }
        for owner in closed {
            trace!("dropping closed route for {}", owner);
            self.routes.remove(&owner);
        }
        if !delivered {
            trace!("no route for signal on {}", path);
        }
    }
}
