//! Process wiring: storage, in-memory stores, background tasks and the
//! HTTP state, constructed once at startup and torn down at shutdown.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::task::JoinHandle;

use lumen_adapter_actuator_http::HttpActuatorClient;
use lumen_adapter_http_axum::state::AppState;
use lumen_adapter_storage_sqlite_sqlx::{
    Database, SqliteDeviceRepository, SqliteRuleRepository, StorageError,
};
use lumen_adapter_virtual::{VirtualCurtains, VirtualLightSensor, curtain_device, sensor_device};
use lumen_app::automation_engine::{AutomationEngine, EngineHandle};
use lumen_app::dispatcher::ActuationDispatcher;
use lumen_app::heartbeat::HeartbeatMonitor;
use lumen_app::poller::SensorPoller;
use lumen_app::registry::DeviceRegistry;
use lumen_app::rule_store::RuleStore;
use lumen_app::services::curtain_service::CurtainService;
use lumen_app::services::rule_service::RuleService;
use lumen_app::telemetry::{SubscriptionFilter, TelemetryStore};
use lumen_domain::device::Device;
use lumen_domain::error::LumenError;
use lumen_domain::id::DeviceId;

use crate::actuator::RoutingActuator;
use crate::config::{Config, VirtualConfig};

pub type State = AppState<SqliteDeviceRepository, SqliteRuleRepository>;

/// Why the process could not start.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("failed to open database")]
    Storage(#[from] StorageError),
    #[error("failed to restore devices and rules")]
    Restore(#[from] LumenError),
    #[error("failed to build HTTP actuator client")]
    ActuatorClient(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A running lumen instance.
pub struct Lumen {
    state: State,
    curtains: Arc<VirtualCurtains>,
    engine: EngineHandle,
    dispatcher: JoinHandle<()>,
    /// How long shutdown waits for commands already handed to the dispatcher.
    drain_timeout: Duration,
    background: Vec<JoinHandle<()>>,
    database: Database,
}

impl Lumen {
    /// Open storage, restore devices and rules, and start every background
    /// task. The HTTP server is left to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`StartError`] when storage cannot be opened or restored.
    pub async fn start(config: &Config) -> Result<Self, StartError> {
        let database = lumen_adapter_storage_sqlite_sqlx::Config {
            database_url: config.database.url.clone(),
        }
        .build()
        .await?;
        let pool = database.pool().clone();

        let registry =
            Arc::new(DeviceRegistry::load(SqliteDeviceRepository::new(pool.clone())).await?);
        let rules = Arc::new(RuleStore::load(SqliteRuleRepository::new(pool)).await?);
        let telemetry = Arc::new(TelemetryStore::new(
            Arc::clone(&registry),
            config.telemetry_config(),
        ));
        tracing::info!(
            devices = registry.list().len(),
            rules = rules.list().len(),
            "state restored"
        );

        let virtual_config = &config.integrations.virtual_devices;
        if virtual_config.enabled {
            seed_virtual_devices(&registry, virtual_config).await?;
        }

        let dispatcher_config = config.dispatcher_config();
        let drain_timeout = dispatcher_config.ceiling();
        let curtains = Arc::new(VirtualCurtains::new(Duration::from_millis(
            virtual_config.actuator_latency_ms,
        )));
        let http = HttpActuatorClient::new(dispatcher_config.attempt_timeout)
            .map_err(|err| StartError::ActuatorClient(Box::new(err)))?;
        let (dispatcher, dispatcher_task) = ActuationDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&telemetry),
            RoutingActuator::new(Arc::clone(&curtains), http),
            dispatcher_config,
        )
        .start();

        let engine = Arc::new(AutomationEngine::new(Arc::clone(&rules), dispatcher.clone()));
        let engine = engine.start(
            telemetry.subscribe(SubscriptionFilter::All),
            dispatcher.subscribe_results(),
            config.engine_config(),
        );

        let mut background = vec![
            HeartbeatMonitor::new(
                Arc::clone(&registry),
                Duration::from_secs(config.heartbeat.timeout_secs),
            )
            .start(Duration::from_secs(config.heartbeat.interval_secs)),
        ];
        if virtual_config.enabled {
            background.push(
                SensorPoller::new(
                    Arc::clone(&registry),
                    Arc::clone(&telemetry),
                    VirtualLightSensor::default(),
                )
                .start(Duration::from_secs(virtual_config.poll_interval_secs)),
            );
        }

        let state = AppState::new(
            Arc::clone(&registry),
            telemetry,
            Arc::new(RuleService::new(Arc::clone(&registry), rules)),
            Arc::new(CurtainService::new(registry, dispatcher)),
        );

        Ok(Self {
            state,
            curtains,
            engine,
            dispatcher: dispatcher_task,
            drain_timeout,
            background,
            database,
        })
    }

    /// Router serving the HTTP API over this instance.
    #[must_use]
    pub fn router(&self) -> Router {
        lumen_adapter_http_axum::router::build(self.state.clone())
    }

    #[must_use]
    pub fn state(&self) -> &State {
        &self.state
    }

    /// The simulator behind every `virtual://` curtain.
    #[must_use]
    pub fn curtains(&self) -> &Arc<VirtualCurtains> {
        &self.curtains
    }

    /// Stop the engine (draining queued readings), cancel background tasks,
    /// let in-flight and queued commands finish, then close storage.
    ///
    /// The dispatcher exits once every handle to it is dropped, so routers
    /// built from [`Lumen::router`] must be gone before this is called. After
    /// `drain_timeout` the dispatcher is aborted.
    pub async fn shutdown(self) {
        let Self {
            state,
            engine,
            mut dispatcher,
            drain_timeout,
            background,
            database,
            ..
        } = self;

        engine.shutdown().await;
        for task in background {
            task.abort();
        }

        drop(state);
        match tokio::time::timeout(drain_timeout, &mut dispatcher).await {
            Ok(Ok(())) => tracing::debug!("actuation dispatcher drained"),
            Ok(Err(err)) => tracing::error!(%err, "actuation dispatcher panicked"),
            Err(_) => {
                tracing::warn!(?drain_timeout, "actuation dispatcher did not drain, aborting");
                dispatcher.abort();
            }
        }

        database.close().await;
        tracing::info!("lumen stopped");
    }
}

async fn seed_virtual_devices(
    registry: &DeviceRegistry<SqliteDeviceRepository>,
    config: &VirtualConfig,
) -> Result<(), LumenError> {
    for id in &config.sensors {
        register_missing(registry, id, sensor_device).await?;
    }
    for id in &config.curtains {
        register_missing(registry, id, curtain_device).await?;
    }
    Ok(())
}

async fn register_missing(
    registry: &DeviceRegistry<SqliteDeviceRepository>,
    id: &str,
    make: fn(DeviceId) -> Result<Device, LumenError>,
) -> Result<(), LumenError> {
    let id = DeviceId::new(id)?;
    if registry.get(&id).is_none() {
        registry.register(make(id)?).await?;
    }
    Ok(())
}
