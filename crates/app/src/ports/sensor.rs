//! Sensor port: pulls a measurement out of a sensor on demand.

use std::future::Future;

use lumen_domain::actuation::CommandError;
use lumen_domain::device::Device;
use lumen_domain::reading::ReadingSource;

/// Something the poller can sample light values from.
pub trait SensorSource {
    /// Provenance tag stamped on readings from this source.
    fn source(&self) -> ReadingSource;

    /// Whether this source knows how to reach `device`.
    fn accepts(&self, device: &Device) -> bool {
        let _ = device;
        true
    }

    /// Take one measurement.
    fn sample(&self, device: &Device) -> impl Future<Output = Result<f64, CommandError>> + Send;
}
