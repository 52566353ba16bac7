//! Virtual device implementations: light sensor, curtains.

mod curtain;
mod light_sensor;

pub use curtain::VirtualCurtains;
pub use light_sensor::VirtualLightSensor;

use lumen_domain::device::{Device, DeviceKind};
use lumen_domain::error::LumenError;
use lumen_domain::id::DeviceId;

use crate::address_for;

/// Registration record for a simulated light sensor.
///
/// # Errors
///
/// Returns a validation error if the builder fails.
pub fn sensor_device(id: DeviceId) -> Result<Device, LumenError> {
    Device::builder()
        .address(address_for(id.as_str()))
        .name(format!("Virtual light sensor {id}"))
        .id(id)
        .kind(DeviceKind::Sensor)
        .manufacturer("lumen")
        .model("VLux-1")
        .build()
}

/// Registration record for a simulated curtain, initially closed.
///
/// # Errors
///
/// Returns a validation error if the builder fails.
pub fn curtain_device(id: DeviceId) -> Result<Device, LumenError> {
    Device::builder()
        .address(address_for(id.as_str()))
        .name(format!("Virtual curtain {id}"))
        .id(id)
        .kind(DeviceKind::Actuator)
        .manufacturer("lumen")
        .model("VCurtain-1")
        .level(0)
        .build()
}
