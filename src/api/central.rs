use std::collections::HashMap;

use uuid::Uuid;

/// RSSI floor requested from the adapter for every scan.
pub const DISCOVERY_RSSI_THRESHOLD: i16 = -70;

/// The filter of the current scan. Only one kind can be active at a time.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum ScanFilter {
    #[default]
    None,
    Services(Vec<Uuid>),
    Addresses(Vec<String>),
    /// Matches advertised names containing any of the entries.
    Names(Vec<String>),
}

impl ScanFilter {
    pub fn service_uuids(&self) -> &[Uuid] {
        match self {
            ScanFilter::Services(uuids) => uuids,
            _ => &[],
        }
    }

    pub fn addresses(&self) -> &[String] {
        match self {
            ScanFilter::Addresses(addresses) => addresses,
            _ => &[],
        }
    }

    pub fn names(&self) -> &[String] {
        match self {
            ScanFilter::Names(names) => names,
            _ => &[],
        }
    }

    pub fn matches(&self, scan_result: &ScanResult) -> bool {
        match self {
            ScanFilter::None => true,
            ScanFilter::Services(uuids) => scan_result
                .service_uuids
                .iter()
                .any(|uuid| uuids.contains(uuid)),
            ScanFilter::Addresses(addresses) => addresses
                .iter()
                .any(|address| address.eq_ignore_ascii_case(&scan_result.address)),
            ScanFilter::Names(names) => match &scan_result.name {
                Some(advertised) => names.iter().any(|name| advertised.contains(name.as_str())),
                None => false,
            },
        }
    }
}

/// One advertisement, as handed to the application.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub address: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub service_uuids: Vec<Uuid>,
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    pub service_data: HashMap<Uuid, Vec<u8>>,
}
