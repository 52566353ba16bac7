//! # lumen-adapter-actuator-http
//!
//! [`ActuatorClient`] for curtains reachable over HTTP.
//!
//! A command is sent as `POST {address}/command` with the body
//!
//! ```json
//! {"command": "set_level", "params": {"level": 40}}
//! ```
//!
//! where `command` is `open`, `close` or `set_level`. A 2xx response
//! acknowledges the command; its JSON body may report `"success": false`
//! (a rejection) and the `level` actually reached.
//!
//! | Failure | Classification |
//! |---------|----------------|
//! | connection refused, DNS, reset | transient (`Unreachable`) |
//! | request timeout | transient (`Timeout`) |
//! | 5xx | transient (`Unreachable`) |
//! | other non-2xx, `success: false` | permanent (`Rejected`) |
//!
//! ## Dependency rule
//!
//! Depends on `lumen-app` (port traits) and `lumen-domain` only.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use lumen_app::ports::ActuatorClient;
use lumen_domain::actuation::{CommandAck, CommandError};
use lumen_domain::rule::Action;

#[derive(Debug, Serialize)]
struct CommandBody {
    command: &'static str,
    params: CommandParams,
}

#[derive(Debug, Serialize)]
struct CommandParams {
    level: u8,
}

impl From<Action> for CommandBody {
    fn from(action: Action) -> Self {
        Self {
            command: action.command_name(),
            params: CommandParams {
                level: action.target_level(),
            },
        }
    }
}

/// Optional acknowledgement body.
#[derive(Debug, Default, Deserialize)]
struct AckBody {
    success: Option<bool>,
    level: Option<u8>,
    message: Option<String>,
}

/// Whether `address` should be driven by [`HttpActuatorClient`].
#[must_use]
pub fn handles(address: &str) -> bool {
    address.starts_with("http://") || address.starts_with("https://")
}

/// Actuator client posting commands over HTTP.
#[derive(Debug, Clone)]
pub struct HttpActuatorClient {
    client: reqwest::Client,
}

impl HttpActuatorClient {
    /// Create a client whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("lumen/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap a preconfigured reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn command_url(address: &str) -> String {
    format!("{}/command", address.trim_end_matches('/'))
}

fn classify(err: &reqwest::Error) -> CommandError {
    if err.is_timeout() {
        CommandError::Timeout
    } else {
        CommandError::Unreachable(err.to_string())
    }
}

impl ActuatorClient for HttpActuatorClient {
    async fn send(&self, address: &str, action: Action) -> Result<CommandAck, CommandError> {
        let url = command_url(address);
        let response = self
            .client
            .post(&url)
            .json(&CommandBody::from(action))
            .send()
            .await
            .map_err(|err| classify(&err))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(CommandError::Unreachable(format!("{url} answered {status}")));
        }
        if !status.is_success() {
            return Err(CommandError::Rejected(format!("{url} answered {status}")));
        }

        let bytes = response.bytes().await.map_err(|err| classify(&err))?;
        let ack: AckBody = if bytes.is_empty() {
            AckBody::default()
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                tracing::debug!(%url, %err, "ignoring unparseable acknowledgement");
                AckBody::default()
            })
        };
        if ack.success == Some(false) {
            return Err(CommandError::Rejected(
                ack.message
                    .unwrap_or_else(|| "device reported failure".to_string()),
            ));
        }
        Ok(CommandAck {
            level: ack.level.or(Some(action.target_level())),
        })
    }
}
