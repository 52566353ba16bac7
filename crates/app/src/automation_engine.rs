//! Automation engine: evaluates light readings against rules and emits intents.
//!
//! Readings arrive from the telemetry store. A router task fans them out to
//! one worker per source device so a device's readings are evaluated in
//! arrival order while devices proceed independently. A worker that falls
//! behind drops its oldest pending readings.
//!
//! Rules for a reading are evaluated in creation order. Every firing becomes
//! an [`ActuationIntent`] submitted to the dispatcher; since the dispatcher
//! executes intents per device in FIFO order, the last rule to fire on a
//! given target wins.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use lumen_domain::actuation::{ActuationIntent, ActuationResult, Cause};
use lumen_domain::error::LumenError;
use lumen_domain::id::{DeviceId, IntentId, RuleId};
use lumen_domain::reading::Reading;
use lumen_domain::rule::{Action, Decision, Edge};

use crate::dispatcher::DispatcherHandle;
use crate::ports::RuleRepository;
use crate::rule_store::RuleStore;
use crate::telemetry::Subscription;

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Readings buffered per source device before the oldest are dropped.
    pub device_queue: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { device_queue: 64 }
    }
}

/// Why a rule was not evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    Invalid(String),
}

/// What evaluating one rule against one reading did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Fired {
        intent_id: IntentId,
        edge: Edge,
        action: Action,
    },
    Debounced {
        edge: Edge,
    },
    NoChange,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEvaluation {
    pub rule_id: RuleId,
    pub outcome: RuleOutcome,
}

/// Rule evaluator that turns readings into actuation intents.
pub struct AutomationEngine<R> {
    rules: Arc<RuleStore<R>>,
    dispatcher: DispatcherHandle,
}

impl<R> AutomationEngine<R>
where
    R: RuleRepository + Send + Sync + 'static,
{
    pub fn new(rules: Arc<RuleStore<R>>, dispatcher: DispatcherHandle) -> Self {
        Self { rules, dispatcher }
    }

    /// Evaluate every rule sourced from the reading's device.
    ///
    /// A disabled or malformed rule is skipped without affecting its
    /// siblings. Debounce windows are measured against the reading's
    /// timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::Unavailable`] if the dispatcher has stopped.
    #[tracing::instrument(
        skip(self, reading),
        fields(device_id = %reading.device_id, value = reading.value)
    )]
    pub async fn process_reading(
        &self,
        reading: &Reading,
    ) -> Result<Vec<RuleEvaluation>, LumenError> {
        let rules = self.rules.rules_for(&reading.device_id);
        let mut report = Vec::with_capacity(rules.len());

        for rule in rules {
            if !rule.enabled {
                tracing::debug!(rule_id = %rule.id, "rule disabled, skipping");
                report.push(RuleEvaluation {
                    rule_id: rule.id,
                    outcome: RuleOutcome::Skipped(SkipReason::Disabled),
                });
                continue;
            }
            if let Err(err) = rule.validate() {
                tracing::warn!(rule_id = %rule.id, %err, "malformed rule, skipping");
                report.push(RuleEvaluation {
                    rule_id: rule.id,
                    outcome: RuleOutcome::Skipped(SkipReason::Invalid(err.to_string())),
                });
                continue;
            }

            let evaluation = rule.evaluate(reading.value, reading.timestamp);
            if evaluation.engaged != rule.state.engaged
                && let Err(err) = self.rules.set_engaged(&rule.id, evaluation.engaged).await
            {
                // Deleted while evaluating.
                tracing::debug!(rule_id = %rule.id, %err, "could not record engaged flag");
                continue;
            }

            let outcome = match evaluation.decision {
                Decision::Fire { edge, action } => {
                    let intent = ActuationIntent::from_rule(
                        rule.id.clone(),
                        edge,
                        rule.target_device_id.clone(),
                        action,
                        Cause {
                            device_id: reading.device_id.clone(),
                            timestamp: reading.timestamp,
                        },
                    );
                    let intent_id = intent.id;
                    self.dispatcher.submit(intent).await?;
                    if let Err(err) = self
                        .rules
                        .mark_fired(&rule.id, edge, reading.timestamp)
                        .await
                    {
                        tracing::debug!(rule_id = %rule.id, %err, "could not record firing");
                    }
                    tracing::info!(
                        rule_id = %rule.id,
                        %edge,
                        %action,
                        target = %rule.target_device_id,
                        "rule fired"
                    );
                    RuleOutcome::Fired {
                        intent_id,
                        edge,
                        action,
                    }
                }
                Decision::Debounced { edge } => {
                    tracing::debug!(rule_id = %rule.id, %edge, "rule debounced");
                    RuleOutcome::Debounced { edge }
                }
                Decision::NoChange => RuleOutcome::NoChange,
            };
            report.push(RuleEvaluation {
                rule_id: rule.id,
                outcome,
            });
        }

        Ok(report)
    }

    /// Run the engine on a telemetry subscription until shut down.
    ///
    /// Dispatch results received on `results` are recorded against the rule
    /// that produced them.
    pub fn start(
        self: Arc<Self>,
        readings: Subscription,
        results: broadcast::Receiver<ActuationResult>,
        config: EngineConfig,
    ) -> EngineHandle {
        let (shutdown, stop) = oneshot::channel();
        let task = tokio::spawn(self.route(readings, results, config, stop));
        EngineHandle {
            shutdown: Some(shutdown),
            task,
        }
    }

    async fn route(
        self: Arc<Self>,
        mut readings: Subscription,
        mut results: broadcast::Receiver<ActuationResult>,
        config: EngineConfig,
        mut stop: oneshot::Receiver<()>,
    ) {
        let capacity = config.device_queue.max(1);
        let mut lanes: HashMap<DeviceId, broadcast::Sender<Reading>> = HashMap::new();
        let mut workers = Vec::new();
        let mut results_open = true;

        loop {
            tokio::select! {
                _ = &mut stop => break,
                reading = readings.recv() => {
                    let Some(reading) = reading else { break };
                    let lane = lanes.entry(reading.device_id.clone()).or_insert_with(|| {
                        let (lane, queue) = broadcast::channel(capacity);
                        workers.push(tokio::spawn(Arc::clone(&self).work(queue)));
                        lane
                    });
                    // The worker owns the receiver until the lane is dropped.
                    let _ = lane.send(reading);
                }
                result = results.recv(), if results_open => match result {
                    Ok(result) => self.rules.record_result(&result),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "automation engine missed dispatch results");
                    }
                    Err(broadcast::error::RecvError::Closed) => results_open = false,
                },
            }
        }

        drop(lanes);
        for worker in workers {
            if let Err(err) = worker.await {
                tracing::error!(%err, "automation worker panicked");
            }
        }
        tracing::debug!("automation engine stopped");
    }

    async fn work(self: Arc<Self>, mut queue: broadcast::Receiver<Reading>) {
        loop {
            match queue.recv().await {
                Ok(reading) => {
                    if let Err(err) = self.process_reading(&reading).await {
                        tracing::error!(%err, "rule evaluation aborted");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(dropped)) => {
                    tracing::warn!(dropped, "device queue full, dropped oldest readings");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// Handle to a running engine.
pub struct EngineHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl EngineHandle {
    /// Stop routing new readings and wait for queued ones to be evaluated.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(err) = self.task.await {
            tracing::error!(%err, "automation engine panicked");
        }
    }
}
