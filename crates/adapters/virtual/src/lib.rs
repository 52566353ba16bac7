//! # lumen-adapter-virtual
//!
//! Virtual/demo integration that simulates light sensors and curtains, so
//! the whole pipeline can run without hardware.
//!
//! ## Provided devices
//!
//! | Device | Port | Behaviour |
//! |--------|------|-----------|
//! | [`VirtualLightSensor`] | `SensorSource` | Lux following a daylight curve with ±10% noise |
//! | [`VirtualCurtains`] | `ActuatorClient` | Accepts `open` / `close` / `set_level` after a simulated latency |
//!
//! Virtual devices are addressed as `virtual://<device-id>`.
//!
//! ## Dependency rule
//!
//! Depends on `lumen-app` (port traits) and `lumen-domain` only.

mod curve;
mod devices;

pub use curve::daylight_lux;
pub use devices::{VirtualCurtains, VirtualLightSensor, curtain_device, sensor_device};

/// Address scheme owned by this integration.
pub const SCHEME: &str = "virtual://";

/// The device key of a `virtual://` address.
#[must_use]
pub fn device_key(address: &str) -> Option<&str> {
    address
        .strip_prefix(SCHEME)
        .filter(|key| !key.is_empty())
}

/// The `virtual://` address of a device key.
#[must_use]
pub fn address_for(key: &str) -> String {
    format!("{SCHEME}{key}")
}
