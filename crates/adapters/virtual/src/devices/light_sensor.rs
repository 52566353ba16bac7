//! Virtual light sensor: samples the daylight curve.

use std::sync::{Mutex, PoisonError};

use chrono::NaiveTime;
use rand::SeedableRng;
use rand::rngs::StdRng;

use lumen_app::ports::SensorSource;
use lumen_domain::actuation::CommandError;
use lumen_domain::device::Device;
use lumen_domain::reading::ReadingSource;

use crate::curve::daylight_lux;
use crate::device_key;

/// Simulated sensor answering for every `virtual://` device.
pub struct VirtualLightSensor {
    rng: Mutex<StdRng>,
}

impl Default for VirtualLightSensor {
    fn default() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl VirtualLightSensor {
    /// A sensor producing a reproducible sequence.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Lux at the given local time of day.
    pub fn sample_at(&self, time: NaiveTime) -> f64 {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        daylight_lux(time, &mut *rng)
    }
}

impl SensorSource for VirtualLightSensor {
    fn source(&self) -> ReadingSource {
        ReadingSource::Simulated
    }

    fn accepts(&self, device: &Device) -> bool {
        device_key(&device.address).is_some()
    }

    async fn sample(&self, device: &Device) -> Result<f64, CommandError> {
        if device_key(&device.address).is_none() {
            return Err(CommandError::Unreachable(device.address.clone()));
        }
        Ok(self.sample_at(chrono::Local::now().time()))
    }
}
