//! Actuator port: sends commands to curtain-like devices.

use std::future::Future;
use std::sync::Arc;

use lumen_domain::actuation::{CommandAck, CommandError};
use lumen_domain::rule::Action;

/// Transport able to deliver an [`Action`] to the device at `address`.
///
/// Implementations perform a single attempt; timeouts and retries are the
/// dispatcher's job.
pub trait ActuatorClient {
    fn send(
        &self,
        address: &str,
        action: Action,
    ) -> impl Future<Output = Result<CommandAck, CommandError>> + Send;
}

impl<T: ActuatorClient + Send + Sync> ActuatorClient for Arc<T> {
    fn send(
        &self,
        address: &str,
        action: Action,
    ) -> impl Future<Output = Result<CommandAck, CommandError>> + Send {
        (**self).send(address, action)
    }
}
