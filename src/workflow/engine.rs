// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Tokio runner for the workflow machine
//!
//! Owns the machine on a single task, executes its commands on spawned
//! tasks and publishes state snapshots through a watch channel. Callers
//! interact only through the cheap, cloneable [`WorkflowHandle`].

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::client::GenerationEndpoint;
use crate::config::EngineConfig;
use crate::error::WorkflowError;
use crate::media::ImageCompressor;
use crate::screening::{analyze_image, ClassifierLoader};
use crate::styles::StyleId;
use crate::x402::{encode_payment_header, ensure_within_cap, select_payment_requirements};

use super::machine::{
    Command, FailurePhase, Settlement, WorkflowEvent, WorkflowMachine, WorkflowState,
};

/// Collaborators and configuration needed to run the workflow
#[derive(Clone)]
pub struct EngineDeps {
    pub endpoint: Arc<dyn GenerationEndpoint>,
    pub compressor: Arc<dyn ImageCompressor>,
    /// Absent loader means screening always fails open
    pub classifier_loader: Option<Arc<dyn ClassifierLoader>>,
    pub config: EngineConfig,
}

/// Read-only view of the machine published after every transition
#[derive(Debug, Clone)]
pub struct WorkflowSnapshot {
    pub state: WorkflowState,
    pub selected_style: StyleId,
    pub raw_image: Option<String>,
    pub transport_image: Option<String>,
    pub generated_image: Option<String>,
    pub generation_record_id: Option<String>,
    pub classification_score: Option<f32>,
    pub last_error: Option<WorkflowError>,
    pub wallet_connected: bool,
    pub classifier_ready: bool,
}

impl WorkflowSnapshot {
    pub fn is_idle(&self) -> bool {
        self.state == WorkflowState::Idle
    }

    pub fn is_analyzing(&self) -> bool {
        matches!(self.state, WorkflowState::Analyzing { .. })
    }

    pub fn is_nsfw_violation(&self) -> bool {
        self.state == WorkflowState::NsfwViolation
    }

    pub fn is_user_confirming(&self) -> bool {
        self.state == WorkflowState::UserConfirming
    }

    pub fn is_generating(&self) -> bool {
        matches!(self.state, WorkflowState::Generating(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, WorkflowState::Failed(_))
    }

    pub fn failed_phase(&self) -> Option<FailurePhase> {
        match self.state {
            WorkflowState::Failed(phase) => Some(phase),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == WorkflowState::Success
    }
}

/// Handle for dispatching events and observing snapshots
#[derive(Clone)]
pub struct WorkflowHandle {
    events: mpsc::UnboundedSender<WorkflowEvent>,
    snapshots: watch::Receiver<WorkflowSnapshot>,
}

impl WorkflowHandle {
    /// Dispatch an event. Silently a no-op once the engine has shut down.
    pub fn send(&self, event: WorkflowEvent) {
        if self.events.send(event).is_err() {
            warn!("workflow engine is gone, event dropped");
        }
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Wait until a published snapshot satisfies `predicate`, returning it.
    /// Errors only if the engine shut down first.
    pub async fn wait_for(
        &mut self,
        predicate: impl Fn(&WorkflowSnapshot) -> bool,
    ) -> anyhow::Result<WorkflowSnapshot> {
        loop {
            {
                let current = self.snapshots.borrow_and_update();
                if predicate(&current) {
                    return Ok(current.clone());
                }
            }
            self.snapshots
                .changed()
                .await
                .map_err(|_| anyhow::anyhow!("workflow engine stopped"))?;
        }
    }
}

/// The workflow runner. Constructed once per session with [`spawn`].
///
/// [`spawn`]: WorkflowEngine::spawn
pub struct WorkflowEngine {
    machine: WorkflowMachine,
    deps: EngineDeps,
    settlements_tx: mpsc::UnboundedSender<Settlement>,
    snapshots_tx: watch::Sender<WorkflowSnapshot>,
}

impl WorkflowEngine {
    /// Start the engine on the current runtime and return its handle.
    /// The engine stops when every handle has been dropped.
    pub fn spawn(deps: EngineDeps) -> WorkflowHandle {
        let machine = WorkflowMachine::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (settlements_tx, settlements_rx) = mpsc::unbounded_channel();
        let (snapshots_tx, snapshots_rx) = watch::channel(Self::snapshot_of(&machine));

        // Kick off the best-effort classifier load before any event arrives
        if let Some(loader) = deps.classifier_loader.clone() {
            let settlements = settlements_tx.clone();
            tokio::spawn(async move {
                let outcome = loader.load().await.map_err(|e| e.to_string());
                let _ = settlements.send(Settlement::ClassifierLoaded(outcome));
            });
        }

        let engine = Self {
            machine,
            deps,
            settlements_tx,
            snapshots_tx,
        };
        tokio::spawn(engine.run(events_rx, settlements_rx));

        WorkflowHandle {
            events: events_tx,
            snapshots: snapshots_rx,
        }
    }

    async fn run(
        mut self,
        mut events_rx: mpsc::UnboundedReceiver<WorkflowEvent>,
        mut settlements_rx: mpsc::UnboundedReceiver<Settlement>,
    ) {
        info!("workflow engine started");
        loop {
            let command = tokio::select! {
                event = events_rx.recv() => match event {
                    Some(event) => {
                        debug!("event: {event:?}");
                        self.machine.handle(event)
                    }
                    // All handles dropped; in-flight settlements no longer matter
                    None => break,
                },
                Some(settlement) = settlements_rx.recv() => {
                    debug!("settlement: {settlement:?}");
                    self.machine.settle(settlement)
                }
            };

            if let Some(command) = command {
                self.dispatch(command);
            }
            let _ = self.snapshots_tx.send(Self::snapshot_of(&self.machine));
        }
        info!("workflow engine stopped");
    }

    fn snapshot_of(machine: &WorkflowMachine) -> WorkflowSnapshot {
        let context = machine.context();
        WorkflowSnapshot {
            state: machine.state(),
            selected_style: context.selected_style,
            raw_image: context.raw_image.clone(),
            transport_image: context.transport_image.clone(),
            generated_image: context.generated_image.clone(),
            generation_record_id: context.generation_record_id.clone(),
            classification_score: context.classification_score,
            last_error: context.last_error.clone(),
            wallet_connected: context.wallet_connected(),
            classifier_ready: context.classifier.is_some(),
        }
    }

    /// Run one command on its own task. Every command reports back exactly
    /// one settlement carrying the epoch it was issued under, even when the
    /// task panics; a lost settlement would strand the machine in its
    /// invoking state.
    fn dispatch(&self, command: Command) {
        match command {
            Command::Analyze {
                epoch,
                file,
                classifier,
            } => {
                let compressor = self.deps.compressor.clone();
                let options = self.deps.config.compression.clone();
                let threshold = self.deps.config.nsfw_threshold;
                let floor = self.deps.config.analysis_floor;
                self.run_settling(
                    epoch,
                    async move {
                        analyze_image(&file, classifier, &*compressor, &options, threshold, floor)
                            .await
                            .map_err(|e| e.to_string())
                    },
                    |epoch, outcome| Settlement::AnalysisSettled { epoch, outcome },
                );
            }

            Command::Discover { epoch, request } => {
                let endpoint = self.deps.endpoint.clone();
                let network = self.deps.config.network.clone();
                let scheme = self.deps.config.scheme.clone();
                self.run_settling(
                    epoch,
                    async move {
                        let challenge = endpoint
                            .discover(&request)
                            .await
                            .map_err(|e| e.to_string())?;
                        select_payment_requirements(&challenge.accepts, &network, &scheme)
                            .cloned()
                            .ok_or_else(|| {
                                "payment challenge offered no payment options".to_string()
                            })
                    },
                    |epoch, outcome| Settlement::DiscoverySettled { epoch, outcome },
                );
            }

            Command::Sign {
                epoch,
                wallet,
                requirements,
            } => {
                let max_amount = self.deps.config.max_payment_amount;
                self.run_settling(
                    epoch,
                    async move {
                        let outcome = async {
                            ensure_within_cap(&requirements, max_amount)?;
                            wallet.sign_payment(&requirements).await
                        }
                        .await;
                        outcome.map_err(|e| e.to_string())
                    },
                    |epoch, outcome| Settlement::SigningSettled { epoch, outcome },
                );
            }

            Command::Execute {
                epoch,
                request,
                token,
            } => {
                let endpoint = self.deps.endpoint.clone();
                self.run_settling(
                    epoch,
                    async move {
                        let outcome = async {
                            let header = encode_payment_header(&token)?;
                            endpoint.execute(&request, &header).await
                        }
                        .await;
                        outcome.map_err(|e| e.to_string())
                    },
                    |epoch, outcome| Settlement::ExecutionSettled { epoch, outcome },
                );
            }
        }
    }

    /// Spawn `work` and forward its result as a settlement. A panicked task
    /// surfaces as an `Err` outcome so the machine's failure routing (or the
    /// analysis fail-open rule) applies instead of a hang.
    fn run_settling<T, F>(
        &self,
        epoch: u64,
        work: F,
        settle: fn(u64, Result<T, String>) -> Settlement,
    ) where
        T: Send + 'static,
        F: Future<Output = Result<T, String>> + Send + 'static,
    {
        let settlements = self.settlements_tx.clone();
        let task = tokio::spawn(work);
        tokio::spawn(async move {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!("command task failed: {err}");
                    Err(format!("background task failed: {err}"))
                }
            };
            let _ = settlements.send(settle(epoch, outcome));
        });
    }
}
