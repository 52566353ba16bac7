//! Actuation dispatcher: executes intents against actuators.
//!
//! Intents enter through a bounded queue ([`DispatcherHandle::submit`]). A
//! scheduler task keeps one FIFO lane per target device and hands the head
//! of each lane to a worker pool limited by a semaphore, so at most one
//! command is in flight per device while distinct devices proceed in
//! parallel.
//!
//! Each dispatch makes up to `max_attempts` attempts bounded by
//! `attempt_timeout`, backing off exponentially between transient failures.
//! The whole dispatch is bounded by [`DispatcherConfig::ceiling`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use lumen_domain::actuation::{ActuationIntent, ActuationResult, CommandError, Outcome};
use lumen_domain::device::{DeviceStatus, StatusUpdate};
use lumen_domain::error::LumenError;
use lumen_domain::id::DeviceId;
use lumen_domain::reading::Reading;
use lumen_domain::rule::Action;

use crate::ports::{ActuatorClient, DeviceRepository};
use crate::registry::DeviceRegistry;
use crate::telemetry::TelemetryStore;

/// Dispatcher tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Commands in flight at once across all devices.
    pub workers: usize,
    /// Intents waiting to be scheduled before `submit` waits.
    pub queue_capacity: usize,
    pub attempt_timeout: Duration,
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each further one.
    pub backoff_base: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
            attempt_timeout: Duration::from_secs(5),
            max_attempts: 3,
            backoff_base: Duration::from_millis(200),
        }
    }
}

impl DispatcherConfig {
    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1 << exponent)
    }

    /// Upper bound of one dispatch: every attempt timing out plus every backoff.
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        let waits = (1..attempts).fold(Duration::ZERO, |total, attempt| {
            total.saturating_add(self.backoff(attempt))
        });
        self.attempt_timeout.saturating_mul(attempts).saturating_add(waits)
    }
}

struct Job {
    intent: ActuationIntent,
    reply: Option<oneshot::Sender<ActuationResult>>,
}

/// Cloneable entry point to a running dispatcher.
#[derive(Clone)]
pub struct DispatcherHandle {
    jobs: mpsc::Sender<Job>,
    results: broadcast::Sender<ActuationResult>,
}

impl DispatcherHandle {
    /// Queue an intent; its result is broadcast to result subscribers.
    ///
    /// Waits while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::Unavailable`] once the dispatcher has stopped.
    pub async fn submit(&self, intent: ActuationIntent) -> Result<(), LumenError> {
        self.jobs
            .send(Job {
                intent,
                reply: None,
            })
            .await
            .map_err(|_| LumenError::Unavailable("actuation dispatcher"))
    }

    /// Queue an intent and wait for its result.
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::Unavailable`] once the dispatcher has stopped.
    pub async fn execute(&self, intent: ActuationIntent) -> Result<ActuationResult, LumenError> {
        let (reply, result) = oneshot::channel();
        self.jobs
            .send(Job {
                intent,
                reply: Some(reply),
            })
            .await
            .map_err(|_| LumenError::Unavailable("actuation dispatcher"))?;
        result
            .await
            .map_err(|_| LumenError::Unavailable("actuation dispatcher"))
    }

    /// Receive the result of every intent completed from now on.
    #[must_use]
    pub fn subscribe_results(&self) -> broadcast::Receiver<ActuationResult> {
        self.results.subscribe()
    }

    /// A handle whose queue is drained by the caller instead of a dispatcher.
    #[cfg(test)]
    pub(crate) fn detached(capacity: usize) -> (Self, mpsc::Receiver<ActuationIntent>) {
        let (jobs, mut raw) = mpsc::channel::<Job>(capacity);
        let (intents_tx, intents) = mpsc::channel(capacity);
        tokio::spawn(async move {
            while let Some(job) = raw.recv().await {
                if intents_tx.send(job.intent).await.is_err() {
                    break;
                }
            }
        });
        let (results, _) = broadcast::channel(capacity);
        (Self { jobs, results }, intents)
    }
}

/// Sends commands to actuators and records their outcome.
pub struct ActuationDispatcher<R, A> {
    registry: Arc<DeviceRegistry<R>>,
    telemetry: Arc<TelemetryStore<R>>,
    client: A,
    config: DispatcherConfig,
}

impl<R, A> ActuationDispatcher<R, A>
where
    R: DeviceRepository + Send + Sync + 'static,
    A: ActuatorClient + Send + Sync + 'static,
{
    pub fn new(
        registry: Arc<DeviceRegistry<R>>,
        telemetry: Arc<TelemetryStore<R>>,
        client: A,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            registry,
            telemetry,
            client,
            config: DispatcherConfig {
                workers: config.workers.max(1),
                queue_capacity: config.queue_capacity.max(1),
                max_attempts: config.max_attempts.max(1),
                ..config
            },
        }
    }

    #[must_use]
    pub fn config(&self) -> DispatcherConfig {
        self.config
    }

    /// Spawn the scheduler and return a handle to it.
    ///
    /// The scheduler stops once every handle is dropped and all queued
    /// intents have completed.
    pub fn start(self) -> (DispatcherHandle, JoinHandle<()>) {
        let (jobs, queue) = mpsc::channel(self.config.queue_capacity);
        let (results, _) = broadcast::channel(self.config.queue_capacity.max(16));
        let handle = DispatcherHandle {
            jobs,
            results: results.clone(),
        };
        let task = tokio::spawn(Arc::new(self).schedule(queue, results));
        (handle, task)
    }

    async fn schedule(
        self: Arc<Self>,
        mut queue: mpsc::Receiver<Job>,
        results: broadcast::Sender<ActuationResult>,
    ) {
        let permits = Arc::new(Semaphore::new(self.config.workers));
        let (done_tx, mut done) = mpsc::unbounded_channel::<DeviceId>();
        // A lane exists while its device has a command in flight.
        let mut lanes: HashMap<DeviceId, VecDeque<Job>> = HashMap::new();
        let mut accepting = true;

        while accepting || !lanes.is_empty() {
            tokio::select! {
                job = queue.recv(), if accepting => match job {
                    Some(job) => {
                        let target = job.intent.target.clone();
                        if let Some(lane) = lanes.get_mut(&target) {
                            lane.push_back(job);
                        } else {
                            lanes.insert(target, VecDeque::new());
                            self.spawn_job(job, &permits, &results, &done_tx);
                        }
                    }
                    None => accepting = false,
                },
                Some(target) = done.recv() => {
                    match lanes.get_mut(&target).and_then(VecDeque::pop_front) {
                        Some(next) => self.spawn_job(next, &permits, &results, &done_tx),
                        None => {
                            lanes.remove(&target);
                        }
                    }
                }
            }
        }
        tracing::debug!("actuation dispatcher stopped");
    }

    fn spawn_job(
        self: &Arc<Self>,
        job: Job,
        permits: &Arc<Semaphore>,
        results: &broadcast::Sender<ActuationResult>,
        done: &mpsc::UnboundedSender<DeviceId>,
    ) {
        let this = Arc::clone(self);
        let permits = Arc::clone(permits);
        let results = results.clone();
        let done = done.clone();
        tokio::spawn(async move {
            let target = job.intent.target.clone();
            let permit = permits.acquire_owned().await;
            let result = this.dispatch(&job.intent).await;
            drop(permit);
            if let Some(reply) = job.reply {
                let _ = reply.send(result.clone());
            }
            // No subscribers is fine.
            let _ = results.send(result);
            let _ = done.send(target);
        });
    }

    /// Execute one intent to completion.
    ///
    /// Never fails: every outcome, including an unknown target, is
    /// reported in the returned [`ActuationResult`].
    #[tracing::instrument(
        skip(self, intent),
        fields(intent_id = %intent.id, target = %intent.target, action = %intent.action)
    )]
    pub async fn dispatch(&self, intent: &ActuationIntent) -> ActuationResult {
        let device = match self.registry.get(&intent.target) {
            Some(device) if device.is_actuator() => device,
            _ => {
                tracing::warn!("target is not a registered actuator");
                return ActuationResult::new(intent, Outcome::UnknownDevice, 0);
            }
        };

        let mut attempts = 0;
        let outcome = match tokio::time::timeout(
            self.config.ceiling(),
            self.attempt(intent.action, &device.address, &mut attempts),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(attempts, "dispatch ceiling reached");
                Outcome::Timeout
            }
        };
        self.record(ActuationResult::new(intent, outcome, attempts))
            .await
    }

    async fn attempt(&self, action: Action, address: &str, attempts: &mut u32) -> Outcome {
        loop {
            *attempts += 1;
            let error = match tokio::time::timeout(
                self.config.attempt_timeout,
                self.client.send(address, action),
            )
            .await
            {
                Ok(Ok(ack)) => {
                    return Outcome::Success {
                        level: ack.level.unwrap_or_else(|| action.target_level()),
                    };
                }
                Ok(Err(err)) => err,
                Err(_) => CommandError::Timeout,
            };
            if !error.is_transient() {
                tracing::warn!(attempt = *attempts, %error, "command rejected");
                return Outcome::PermanentFailure {
                    reason: error.to_string(),
                };
            }
            if *attempts >= self.config.max_attempts {
                tracing::warn!(attempt = *attempts, %error, "giving up after transient failures");
                return Outcome::Failure {
                    reason: error.to_string(),
                };
            }
            let delay = self.config.backoff(*attempts);
            tracing::debug!(attempt = *attempts, ?delay, %error, "transient failure, retrying");
            tokio::time::sleep(delay).await;
        }
    }

    /// Write the outcome back into the registry and, on success, telemetry.
    async fn record(&self, result: ActuationResult) -> ActuationResult {
        let update: StatusUpdate = match &result.outcome {
            Outcome::Success { level } => StatusUpdate::online().with_level(*level),
            Outcome::PermanentFailure { .. } => DeviceStatus::Error.into(),
            Outcome::Failure { .. } | Outcome::Timeout => DeviceStatus::Offline.into(),
            Outcome::UnknownDevice => return result,
        };
        let now = lumen_domain::time::now();
        if let Err(err) = self
            .registry
            .upsert_status(&result.target, update, now)
            .await
        {
            tracing::warn!(%err, "failed to record actuator status");
        }
        if let Outcome::Success { level } = result.outcome
            && let Err(err) = self
                .telemetry
                .append(Reading::synthetic(result.target.clone(), level, now))
                .await
        {
            tracing::warn!(%err, "failed to record synthetic reading");
        }
        match self.registry.get(&result.target) {
            Some(device) => result.with_final_status(device.status),
            None => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use lumen_domain::device::DeviceStatus;
    use lumen_domain::reading::ReadingSource;

    use super::*;
    use crate::telemetry::TelemetryConfig;
    use crate::testing::{InMemoryDeviceRepo, ScriptedActuator, Step, actuator, sensor};

    type Dispatcher = ActuationDispatcher<InMemoryDeviceRepo, Arc<ScriptedActuator>>;

    struct Fixture {
        registry: Arc<DeviceRegistry<InMemoryDeviceRepo>>,
        telemetry: Arc<TelemetryStore<InMemoryDeviceRepo>>,
        client: Arc<ScriptedActuator>,
    }

    impl Fixture {
        async fn new(client: ScriptedActuator) -> Self {
            let registry = Arc::new(DeviceRegistry::new(InMemoryDeviceRepo::default()));
            registry.register(actuator("act-1")).await.unwrap();
            registry.register(actuator("act-2")).await.unwrap();
            registry.register(sensor("sensor-1")).await.unwrap();
            let telemetry = Arc::new(TelemetryStore::new(
                Arc::clone(&registry),
                TelemetryConfig::default(),
            ));
            Self {
                registry,
                telemetry,
                client: Arc::new(client),
            }
        }

        fn dispatcher(&self, config: DispatcherConfig) -> Dispatcher {
            ActuationDispatcher::new(
                Arc::clone(&self.registry),
                Arc::clone(&self.telemetry),
                Arc::clone(&self.client),
                config,
            )
        }
    }

    fn intent(target: &str, action: Action) -> ActuationIntent {
        ActuationIntent::manual(DeviceId::new(target).unwrap(), action)
    }

    fn device(id: &str) -> DeviceId {
        DeviceId::new(id).unwrap()
    }

    #[test]
    fn should_double_backoff_and_sum_ceiling() {
        let config = DispatcherConfig::default();
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(2), Duration::from_millis(400));
        assert_eq!(config.ceiling(), Duration::from_millis(15_600));
    }

    #[tokio::test(start_paused = true)]
    async fn should_update_registry_and_telemetry_when_command_succeeds() {
        let fixture = Fixture::new(ScriptedActuator::default()).await;
        let dispatcher = fixture.dispatcher(DispatcherConfig::default());

        let result = dispatcher.dispatch(&intent("act-1", Action::Close)).await;

        assert_eq!(result.outcome, Outcome::Success { level: 0 });
        assert_eq!(result.attempts, 1);
        assert_eq!(result.final_status, Some(DeviceStatus::Online));
        let stored = fixture.registry.get(&device("act-1")).unwrap();
        assert_eq!(stored.level, Some(0));
        let synthetic = fixture.telemetry.latest(&device("act-1")).unwrap();
        assert_eq!(synthetic.source, ReadingSource::SyntheticFromActuation);
        assert_eq!(synthetic.value, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_fail_fast_without_attempt_when_device_unknown() {
        let fixture = Fixture::new(ScriptedActuator::default()).await;
        let dispatcher = fixture.dispatcher(DispatcherConfig::default());

        let result = dispatcher.dispatch(&intent("ghost", Action::Open)).await;

        assert_eq!(result.outcome, Outcome::UnknownDevice);
        assert_eq!(result.attempts, 0);
        assert!(fixture.client.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn should_treat_sensor_target_as_unknown_device() {
        let fixture = Fixture::new(ScriptedActuator::default()).await;
        let dispatcher = fixture.dispatcher(DispatcherConfig::default());

        let result = dispatcher.dispatch(&intent("sensor-1", Action::Open)).await;

        assert_eq!(result.outcome, Outcome::UnknownDevice);
        assert!(fixture.client.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_retry_when_command_rejected() {
        let fixture = Fixture::new(ScriptedActuator::with_script([Step::Fail(
            CommandError::Rejected("busy".into()),
        )]))
        .await;
        let dispatcher = fixture.dispatcher(DispatcherConfig::default());

        let result = dispatcher.dispatch(&intent("act-1", Action::Close)).await;

        assert!(matches!(result.outcome, Outcome::PermanentFailure { .. }));
        assert_eq!(result.attempts, 1);
        assert_eq!(fixture.client.calls().len(), 1);
        assert_eq!(result.final_status, Some(DeviceStatus::Error));
        assert!(fixture.telemetry.latest(&device("act-1")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn should_retry_transient_failures_with_increasing_backoff() {
        let fixture = Fixture::new(ScriptedActuator::with_script([
            Step::Fail(CommandError::Unreachable("refused".into())),
            Step::Fail(CommandError::Unreachable("refused".into())),
            Step::Fail(CommandError::Unreachable("refused".into())),
        ]))
        .await;
        let dispatcher = fixture.dispatcher(DispatcherConfig::default());

        let result = dispatcher.dispatch(&intent("act-1", Action::Close)).await;

        assert!(matches!(result.outcome, Outcome::Failure { .. }));
        assert_eq!(result.attempts, 3);
        assert_eq!(result.retries(), 2);
        assert_eq!(result.final_status, Some(DeviceStatus::Offline));
        let calls = fixture.client.calls();
        assert_eq!(calls.len(), 3);
        let first_gap = calls[1].at - calls[0].at;
        let second_gap = calls[2].at - calls[1].at;
        assert_eq!(first_gap, Duration::from_millis(200));
        assert_eq!(second_gap, Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn should_succeed_after_transient_failure() {
        let fixture = Fixture::new(ScriptedActuator::with_script([
            Step::Fail(CommandError::Timeout),
            Step::Succeed,
        ]))
        .await;
        let dispatcher = fixture.dispatcher(DispatcherConfig::default());

        let result = dispatcher
            .dispatch(&intent("act-1", Action::SetLevel { level: 40 }))
            .await;

        assert_eq!(result.outcome, Outcome::Success { level: 40 });
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn should_treat_hung_attempts_as_transient_and_stop_within_ceiling() {
        let fixture = Fixture::new(ScriptedActuator::with_script([
            Step::Hang,
            Step::Hang,
            Step::Hang,
        ]))
        .await;
        let config = DispatcherConfig::default();
        let dispatcher = fixture.dispatcher(config);
        let started = Instant::now();

        let result = dispatcher.dispatch(&intent("act-1", Action::Open)).await;

        assert!(!result.is_success());
        assert_eq!(result.attempts, 3);
        assert!(started.elapsed() <= config.ceiling());
        assert_eq!(result.final_status, Some(DeviceStatus::Offline));
    }

    #[tokio::test(start_paused = true)]
    async fn should_deliver_result_to_executing_caller_and_subscribers() {
        let fixture = Fixture::new(ScriptedActuator::default()).await;
        let (handle, _task) = fixture.dispatcher(DispatcherConfig::default()).start();
        let mut results = handle.subscribe_results();

        let result = handle.execute(intent("act-1", Action::Open)).await.unwrap();

        assert_eq!(result.outcome, Outcome::Success { level: 100 });
        assert_eq!(results.recv().await.unwrap().intent_id, result.intent_id);
    }

    #[tokio::test(start_paused = true)]
    async fn should_serialize_same_device_and_overlap_distinct_devices() {
        let fixture = Fixture::new(ScriptedActuator::with_latency(Duration::from_millis(100))).await;
        let (handle, task) = fixture.dispatcher(DispatcherConfig::default()).start();
        let mut results = handle.subscribe_results();

        for action in [Action::Close, Action::SetLevel { level: 50 }, Action::Open] {
            handle.submit(intent("act-1", action)).await.unwrap();
            handle.submit(intent("act-2", action)).await.unwrap();
        }
        for _ in 0..6 {
            results.recv().await.unwrap();
        }

        assert_eq!(fixture.client.max_in_flight_per_address(), 1);
        assert_eq!(fixture.client.max_in_flight_total(), 2);

        let act_1: Vec<Action> = fixture
            .client
            .calls()
            .into_iter()
            .filter(|call| call.address == "virtual://act-1")
            .map(|call| call.action)
            .collect();
        assert_eq!(
            act_1,
            vec![Action::Close, Action::SetLevel { level: 50 }, Action::Open]
        );
        assert_eq!(
            fixture.registry.get(&device("act-1")).unwrap().level,
            Some(100)
        );

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_processing_after_a_failed_intent() {
        let fixture = Fixture::new(ScriptedActuator::with_script([Step::Fail(
            CommandError::Rejected("malformed".into()),
        )]))
        .await;
        let (handle, _task) = fixture.dispatcher(DispatcherConfig::default()).start();

        let failed = handle.execute(intent("act-1", Action::Close)).await.unwrap();
        let next = handle.execute(intent("act-1", Action::Open)).await.unwrap();

        assert!(matches!(failed.outcome, Outcome::PermanentFailure { .. }));
        assert!(next.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn should_limit_parallelism_to_worker_count() {
        let fixture = Fixture::new(ScriptedActuator::with_latency(Duration::from_millis(50))).await;
        let config = DispatcherConfig {
            workers: 1,
            ..DispatcherConfig::default()
        };
        let (handle, _task) = fixture.dispatcher(config).start();
        let mut results = handle.subscribe_results();

        handle.submit(intent("act-1", Action::Close)).await.unwrap();
        handle.submit(intent("act-2", Action::Close)).await.unwrap();
        results.recv().await.unwrap();
        results.recv().await.unwrap();

        assert_eq!(fixture.client.max_in_flight_total(), 1);
    }
}
