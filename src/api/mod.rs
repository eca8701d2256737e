pub mod central;
pub mod central_event;
pub mod characteristic;
pub mod descriptor;
pub mod gatt_status;
pub mod peripheral;
pub mod peripheral_event;
pub mod service;
