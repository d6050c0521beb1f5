// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! The workflow state machine: states, events, settlements and the
//! exhaustive transition function.
//!
//! The machine is pure and synchronous. Entering a state with an associated
//! effect returns a [`Command`]; the engine runs it and feeds the outcome
//! back as a [`Settlement`] stamped with the epoch the command was issued
//! under. A settlement whose epoch no longer matches the active state is
//! discarded, so results from superseded invocations never mutate context.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::client::{GenerationOutput, GenerationRequest};
use crate::error::{classify_payment_error, ErrorKind, PaymentPhase, WorkflowError};
use crate::media::ImageFile;
use crate::screening::{AnalysisReport, ImageClassifier};
use crate::styles::StyleId;
use crate::wallet::WalletSigner;
use crate::x402::{PaymentPayload, PaymentRequirements};

use super::context::WorkflowContext;

/// Active phase of the composite `generating` state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPhase {
    /// Requesting payment requirements from the endpoint
    Discovering { epoch: u64 },
    /// Requesting a wallet signature over the challenge
    AwaitingPayment { epoch: u64 },
    /// Replaying the request with the signed token
    Executing { epoch: u64 },
}

/// Which phase a classified failure came from; determines where RETRY resumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePhase {
    Discovery,
    Payment,
    Generation,
}

/// Exclusive workflow state. Composite states carry exactly one sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    /// Awaiting a photo
    Idle,
    /// Running the intake pipeline
    Analyzing { epoch: u64 },
    /// Terminal-per-attempt screening block
    NsfwViolation,
    /// User reviews image and style, must confirm with a connected wallet
    UserConfirming,
    /// The 3-phase payment protocol is running
    Generating(GenerationPhase),
    /// Classified failure; RETRY resumes at the most advanced resumable phase
    Failed(FailurePhase),
    /// Artifact ready
    Success,
}

/// Events dispatched by the presentation layer or wallet plumbing
pub enum WorkflowEvent {
    SelectStyle(StyleId),
    FileSelected { file: ImageFile },
    ConfirmPay { fid: Option<u64> },
    Cancel,
    Reset,
    Retry,
    StartOver,
    WalletConnected(Arc<dyn WalletSigner>),
    WalletDisconnected,
}

impl fmt::Debug for WorkflowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowEvent::SelectStyle(style) => write!(f, "SelectStyle({style})"),
            WorkflowEvent::FileSelected { .. } => write!(f, "FileSelected"),
            WorkflowEvent::ConfirmPay { fid } => write!(f, "ConfirmPay(fid: {fid:?})"),
            WorkflowEvent::Cancel => write!(f, "Cancel"),
            WorkflowEvent::Reset => write!(f, "Reset"),
            WorkflowEvent::Retry => write!(f, "Retry"),
            WorkflowEvent::StartOver => write!(f, "StartOver"),
            WorkflowEvent::WalletConnected(_) => write!(f, "WalletConnected"),
            WorkflowEvent::WalletDisconnected => write!(f, "WalletDisconnected"),
        }
    }
}

/// Completion of an asynchronous invocation started by a [`Command`].
/// Errors are carried as strings so they can flow through the substring
/// classifier unchanged.
pub enum Settlement {
    ClassifierLoaded(Result<Arc<dyn ImageClassifier>, String>),
    AnalysisSettled {
        epoch: u64,
        outcome: Result<AnalysisReport, String>,
    },
    DiscoverySettled {
        epoch: u64,
        outcome: Result<PaymentRequirements, String>,
    },
    SigningSettled {
        epoch: u64,
        outcome: Result<PaymentPayload, String>,
    },
    ExecutionSettled {
        epoch: u64,
        outcome: Result<GenerationOutput, String>,
    },
}

impl fmt::Debug for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Settlement::ClassifierLoaded(outcome) => {
                write!(f, "ClassifierLoaded(ok: {})", outcome.is_ok())
            }
            Settlement::AnalysisSettled { epoch, outcome } => {
                write!(f, "AnalysisSettled(epoch: {epoch}, ok: {})", outcome.is_ok())
            }
            Settlement::DiscoverySettled { epoch, outcome } => {
                write!(f, "DiscoverySettled(epoch: {epoch}, ok: {})", outcome.is_ok())
            }
            Settlement::SigningSettled { epoch, outcome } => {
                write!(f, "SigningSettled(epoch: {epoch}, ok: {})", outcome.is_ok())
            }
            Settlement::ExecutionSettled { epoch, outcome } => {
                write!(f, "ExecutionSettled(epoch: {epoch}, ok: {})", outcome.is_ok())
            }
        }
    }
}

/// Asynchronous effect to start on entering a state. Exactly one command is
/// produced per effectful transition.
pub enum Command {
    Analyze {
        epoch: u64,
        file: ImageFile,
        classifier: Option<Arc<dyn ImageClassifier>>,
    },
    Discover {
        epoch: u64,
        request: GenerationRequest,
    },
    Sign {
        epoch: u64,
        wallet: Arc<dyn WalletSigner>,
        requirements: PaymentRequirements,
    },
    Execute {
        epoch: u64,
        request: GenerationRequest,
        token: PaymentPayload,
    },
}

/// The generation workflow controller's transition core
pub struct WorkflowMachine {
    state: WorkflowState,
    context: WorkflowContext,
    epoch: u64,
}

impl Default for WorkflowMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowMachine {
    pub fn new() -> Self {
        Self {
            state: WorkflowState::Idle,
            context: WorkflowContext::default(),
            epoch: 0,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn context(&self) -> &WorkflowContext {
        &self.context
    }

    fn next_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    fn reset_to_idle(&mut self) {
        self.context.reset();
        self.state = WorkflowState::Idle;
    }

    /// Request body shared by discovery and execution: the transport image
    /// (or the original as fallback), the selected style and the payer id.
    fn generation_request(&self) -> Option<GenerationRequest> {
        let image = self.context.transport_or_raw()?;
        Some(GenerationRequest {
            image,
            style: self.context.selected_style,
            fid: self.context.payer_fid,
        })
    }

    /// Process one presentation-layer event to completion.
    ///
    /// Guard-rejected events return `None` without mutating context.
    pub fn handle(&mut self, event: WorkflowEvent) -> Option<Command> {
        // Wallet connection changes apply in every state
        let event = match event {
            WorkflowEvent::WalletConnected(wallet) => {
                debug!("wallet connected: {:#x}", wallet.address());
                self.context.wallet = Some(wallet);
                return None;
            }
            WorkflowEvent::WalletDisconnected => {
                debug!("wallet disconnected");
                self.context.wallet = None;
                return None;
            }
            other => other,
        };

        match (self.state, event) {
            (
                WorkflowState::Idle | WorkflowState::UserConfirming,
                WorkflowEvent::SelectStyle(style),
            ) => {
                self.context.selected_style = style;
                None
            }

            (WorkflowState::Idle, WorkflowEvent::FileSelected { file }) => {
                self.context.raw_image = Some(file.to_data_url());
                self.context.raw_file = Some(file.clone());
                let epoch = self.next_epoch();
                self.state = WorkflowState::Analyzing { epoch };
                debug!("idle -> analyzing (epoch {epoch})");
                Some(Command::Analyze {
                    epoch,
                    file,
                    classifier: self.context.classifier.clone(),
                })
            }

            (
                WorkflowState::Analyzing { .. } | WorkflowState::UserConfirming,
                WorkflowEvent::Cancel,
            ) => {
                debug!("cancelled, resetting to idle");
                self.reset_to_idle();
                None
            }

            (WorkflowState::NsfwViolation, WorkflowEvent::Reset) => {
                self.reset_to_idle();
                None
            }

            (WorkflowState::UserConfirming, WorkflowEvent::ConfirmPay { fid }) => {
                if !self.context.has_image() || !self.context.wallet_connected() {
                    debug!("CONFIRM_PAY ignored: guard failed (image or wallet missing)");
                    return None;
                }
                self.context.payer_fid = fid;
                let request = self.generation_request()?;
                let epoch = self.next_epoch();
                self.state = WorkflowState::Generating(GenerationPhase::Discovering { epoch });
                info!("payment flow started (epoch {epoch})");
                Some(Command::Discover { epoch, request })
            }

            (WorkflowState::Failed(phase), WorkflowEvent::Retry) => {
                let wallet = self.context.wallet.clone()?;
                let request = self.generation_request()?;
                self.context.last_error = None;

                // Most-advanced-first: resume past phases that already
                // produced their artifact.
                if let Some(token) = self.context.payment_token.clone() {
                    let epoch = self.next_epoch();
                    self.state = WorkflowState::Generating(GenerationPhase::Executing { epoch });
                    info!("retrying execution after {phase:?} failure (epoch {epoch})");
                    Some(Command::Execute {
                        epoch,
                        request,
                        token,
                    })
                } else if let Some(requirements) = self.context.payment_challenge.clone() {
                    let epoch = self.next_epoch();
                    self.state =
                        WorkflowState::Generating(GenerationPhase::AwaitingPayment { epoch });
                    info!("retrying signing after {phase:?} failure (epoch {epoch})");
                    Some(Command::Sign {
                        epoch,
                        wallet,
                        requirements,
                    })
                } else {
                    let epoch = self.next_epoch();
                    self.state = WorkflowState::Generating(GenerationPhase::Discovering { epoch });
                    info!("retrying discovery after {phase:?} failure (epoch {epoch})");
                    Some(Command::Discover { epoch, request })
                }
            }

            (
                WorkflowState::Failed(_) | WorkflowState::Success,
                WorkflowEvent::StartOver,
            ) => {
                self.reset_to_idle();
                None
            }

            (state, event) => {
                trace!("event {event:?} ignored in state {state:?}");
                None
            }
        }
    }

    /// Process the completion of an asynchronous invocation. Settlements
    /// whose epoch does not match the active state are discarded unchanged.
    pub fn settle(&mut self, settlement: Settlement) -> Option<Command> {
        match settlement {
            Settlement::ClassifierLoaded(Ok(classifier)) => {
                info!("NSFW classifier ready");
                self.context.classifier = Some(classifier);
                None
            }
            Settlement::ClassifierLoaded(Err(err)) => {
                // Best-effort load; screening fails open without it
                warn!("NSFW classifier unavailable, screening will fail open: {err}");
                None
            }

            Settlement::AnalysisSettled { epoch, outcome } => {
                if !matches!(self.state, WorkflowState::Analyzing { epoch: e } if e == epoch) {
                    trace!("discarding stale analysis settlement (epoch {epoch})");
                    return None;
                }
                match outcome {
                    Ok(report) if report.is_nsfw => {
                        info!(
                            "screening blocked upload (score {:.3})",
                            report.unsafe_score
                        );
                        self.context.classification_score = Some(report.unsafe_score);
                        self.context.last_error = Some(WorkflowError::nsfw());
                        self.state = WorkflowState::NsfwViolation;
                    }
                    Ok(report) => {
                        self.context.classification_score = Some(report.unsafe_score);
                        self.context.transport_image = Some(report.compressed.data_url);
                        self.state = WorkflowState::UserConfirming;
                    }
                    Err(err) => {
                        // Fail open: screening must not block the user
                        debug!("analysis failed, proceeding without screening: {err}");
                        self.state = WorkflowState::UserConfirming;
                    }
                }
                None
            }

            Settlement::DiscoverySettled { epoch, outcome } => {
                if !matches!(
                    self.state,
                    WorkflowState::Generating(GenerationPhase::Discovering { epoch: e }) if e == epoch
                ) {
                    trace!("discarding stale discovery settlement (epoch {epoch})");
                    return None;
                }
                match outcome {
                    Ok(requirements) => {
                        self.context.payment_challenge = Some(requirements.clone());
                        match self.context.wallet.clone() {
                            Some(wallet) => {
                                let epoch = self.next_epoch();
                                self.state = WorkflowState::Generating(
                                    GenerationPhase::AwaitingPayment { epoch },
                                );
                                Some(Command::Sign {
                                    epoch,
                                    wallet,
                                    requirements,
                                })
                            }
                            None => {
                                self.context.last_error = Some(WorkflowError::new(
                                    ErrorKind::PaymentSigning,
                                    "Wallet disconnected. Reconnect and try again.",
                                    true,
                                ));
                                self.state = WorkflowState::Failed(FailurePhase::Payment);
                                None
                            }
                        }
                    }
                    Err(err) => {
                        self.context.last_error =
                            Some(classify_payment_error(PaymentPhase::Discovery, &err));
                        self.state = WorkflowState::Failed(FailurePhase::Discovery);
                        None
                    }
                }
            }

            Settlement::SigningSettled { epoch, outcome } => {
                if !matches!(
                    self.state,
                    WorkflowState::Generating(GenerationPhase::AwaitingPayment { epoch: e }) if e == epoch
                ) {
                    trace!("discarding stale signing settlement (epoch {epoch})");
                    return None;
                }
                match outcome {
                    Ok(token) => {
                        self.context.payment_token = Some(token.clone());
                        match self.generation_request() {
                            Some(request) => {
                                let epoch = self.next_epoch();
                                self.state = WorkflowState::Generating(
                                    GenerationPhase::Executing { epoch },
                                );
                                Some(Command::Execute {
                                    epoch,
                                    request,
                                    token,
                                })
                            }
                            None => {
                                self.context.last_error = Some(WorkflowError::new(
                                    ErrorKind::Generation,
                                    "No image available for generation.",
                                    true,
                                ));
                                self.state = WorkflowState::Failed(FailurePhase::Generation);
                                None
                            }
                        }
                    }
                    Err(err) => {
                        self.context.last_error =
                            Some(classify_payment_error(PaymentPhase::Signing, &err));
                        self.state = WorkflowState::Failed(FailurePhase::Payment);
                        None
                    }
                }
            }

            Settlement::ExecutionSettled { epoch, outcome } => {
                if !matches!(
                    self.state,
                    WorkflowState::Generating(GenerationPhase::Executing { epoch: e }) if e == epoch
                ) {
                    trace!("discarding stale execution settlement (epoch {epoch})");
                    return None;
                }
                match outcome {
                    Ok(output) => {
                        info!("generation complete: {}", output.image_url);
                        self.context.generated_image = Some(output.image_url);
                        self.context.generation_record_id = output.generation_id;
                        self.state = WorkflowState::Success;
                    }
                    Err(err) => {
                        self.context.last_error =
                            Some(classify_payment_error(PaymentPhase::Execution, &err));
                        self.state = WorkflowState::Failed(FailurePhase::Generation);
                    }
                }
                None
            }
        }
    }
}
