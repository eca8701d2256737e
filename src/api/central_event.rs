use crate::api::central::ScanResult;
use crate::bluez::error::BluezError;
use crate::bluez::peripheral::Peripheral;

#[derive(Debug, Clone)]
pub enum CentralEvent {
    DiscoveredPeripheral {
        peripheral: Peripheral,
        scan_result: ScanResult,
    },
    ScanStarted,
    ScanStopped,
    ScanFailed {
        error: BluezError,
    },
    StateUpdate {
        state: CentralState,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CentralState {
    PoweredOn,
    PoweredOff,
}
