//! Routes commands to the integration owning the device's address scheme.

use std::sync::Arc;

use lumen_adapter_actuator_http::HttpActuatorClient;
use lumen_adapter_virtual::VirtualCurtains;
use lumen_app::ports::ActuatorClient;
use lumen_domain::actuation::{CommandAck, CommandError};
use lumen_domain::rule::Action;

/// `virtual://` addresses go to the simulator, `http(s)://` ones over the
/// network. Any other scheme is a permanent rejection.
pub struct RoutingActuator {
    curtains: Arc<VirtualCurtains>,
    http: HttpActuatorClient,
}

impl RoutingActuator {
    pub fn new(curtains: Arc<VirtualCurtains>, http: HttpActuatorClient) -> Self {
        Self { curtains, http }
    }
}

impl ActuatorClient for RoutingActuator {
    async fn send(&self, address: &str, action: Action) -> Result<CommandAck, CommandError> {
        if lumen_adapter_virtual::device_key(address).is_some() {
            self.curtains.send(address, action).await
        } else if lumen_adapter_actuator_http::handles(address) {
            self.http.send(address, action).await
        } else {
            Err(CommandError::Rejected(format!(
                "no integration handles address {address}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn actuator() -> (RoutingActuator, Arc<VirtualCurtains>) {
        let curtains = Arc::new(VirtualCurtains::new(Duration::ZERO));
        let http = HttpActuatorClient::new(Duration::from_millis(200)).unwrap();
        (RoutingActuator::new(Arc::clone(&curtains), http), curtains)
    }

    #[tokio::test]
    async fn should_route_virtual_addresses_to_simulator() {
        let (actuator, curtains) = actuator();

        let ack = actuator
            .send("virtual://blind", Action::SetLevel { level: 30 })
            .await
            .unwrap();

        assert_eq!(ack.level, Some(30));
        assert_eq!(curtains.position("blind"), Some(30));
    }

    #[tokio::test]
    async fn should_reject_unknown_scheme_permanently() {
        let (actuator, _) = actuator();

        let err = actuator
            .send("zigbee://0x1234", Action::Open)
            .await
            .unwrap_err();

        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn should_treat_unreachable_http_device_as_transient() {
        let (actuator, _) = actuator();

        // Port 9 (discard) on loopback is not expected to be listening.
        let err = actuator
            .send("http://127.0.0.1:9", Action::Close)
            .await
            .unwrap_err();

        assert!(err.is_transient());
    }
}
