//! Proxies for the objects exported by the Bluetooth daemon.
//!
//! The bus transport implements these traits; the session and scanner
//! logic only ever talks to them. Property getters return the last cached
//! value, RPCs return the daemon's error as a [`BluezError`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bluez::error::BluezError;

/// Options map passed to `ReadValue`/`WriteValue`/`SetDiscoveryFilter`.
pub type PropertyMap = HashMap<String, PropertyValue>;

/// Subset of D-Bus variant types carried by the properties this crate reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Bool(bool),
    I16(i16),
    Str(String),
    StrList(Vec<String>),
    Bytes(Vec<u8>),
    ManufacturerData(HashMap<u16, Vec<u8>>),
    ServiceData(HashMap<String, Vec<u8>>),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<i16> {
        match self {
            PropertyValue::I16(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str_list(&self) -> Option<&[String]> {
        match self {
            PropertyValue::StrList(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PropertyValue::Bytes(value) => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i16> for PropertyValue {
    fn from(value: i16) -> Self {
        PropertyValue::I16(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Str(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Str(value)
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(value: Vec<u8>) -> Self {
        PropertyValue::Bytes(value)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(values: Vec<String>) -> Self {
        PropertyValue::StrList(values)
    }
}

#[async_trait]
pub trait BluezAdapter: Send + Sync {
    fn path(&self) -> String;

    async fn is_powered(&self) -> bool;

    async fn set_powered(&self, powered: bool) -> Result<(), BluezError>;

    async fn is_discovering(&self) -> bool;

    async fn set_discovery_filter(&self, filter: PropertyMap) -> Result<(), BluezError>;

    async fn start_discovery(&self) -> Result<(), BluezError>;

    async fn stop_discovery(&self) -> Result<(), BluezError>;

    async fn get_bluez_device_by_path(&self, path: &str) -> Option<Arc<dyn BluezDevice>>;
}

#[async_trait]
pub trait BluezDevice: Send + Sync {
    fn path(&self) -> String;

    async fn connect(&self) -> Result<(), BluezError>;

    async fn disconnect(&self) -> Result<(), BluezError>;

    async fn gatt_services(&self) -> Vec<Arc<dyn BluezGattService>>;
}

#[async_trait]
pub trait BluezGattService: Send + Sync {
    fn uuid(&self) -> String;

    fn path(&self) -> String;

    async fn gatt_characteristics(&self) -> Vec<Arc<dyn BluezGattCharacteristic>>;
}

#[async_trait]
pub trait BluezGattCharacteristic: Send + Sync {
    fn uuid(&self) -> String;

    fn path(&self) -> String;

    async fn flags(&self) -> Vec<String>;

    async fn read_value(&self, options: PropertyMap) -> Result<Vec<u8>, BluezError>;

    async fn write_value(&self, value: Vec<u8>, options: PropertyMap) -> Result<(), BluezError>;

    async fn start_notify(&self) -> Result<(), BluezError>;

    async fn stop_notify(&self) -> Result<(), BluezError>;

    async fn gatt_descriptors(&self) -> Vec<Arc<dyn BluezGattDescriptor>>;
}

#[async_trait]
pub trait BluezGattDescriptor: Send + Sync {
    fn uuid(&self) -> String;

    fn path(&self) -> String;

    async fn read_value(&self, options: PropertyMap) -> Result<Vec<u8>, BluezError>;

    async fn write_value(&self, value: Vec<u8>, options: PropertyMap) -> Result<(), BluezError>;
}
