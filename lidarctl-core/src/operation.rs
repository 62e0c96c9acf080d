//! Fleet operations
//!
//! A [`FleetOperation`] owns every [`CommandRequest`] issued by one dispatch,
//! together with the count of requests still waiting for an outcome. Each
//! request resolves exactly once: either through its [`Completion`] or by
//! expiry when the convergence timeout fires. Both paths go through the same
//! compare-and-mark step under the operation lock.
//!
//! A successful completion writes the registry between marking its slot and
//! releasing its outstanding count, so once the count reaches zero every
//! confirmed mode is visible in the registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace};

use lidarctl_types::{DeviceHandle, Mode, SequenceNumber};

use crate::registry::DeviceRegistry;

/// One command sent to one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub handle: DeviceHandle,
    pub mode: Mode,
    pub sequence: SequenceNumber,
    pub submitted_at: Instant,
}

/// How a request resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Device confirmed; `observed` is the mode it reported
    Succeeded { observed: Mode },

    /// Device or transport reported an error
    Failed { reason: String },

    /// No answer before the operation timed out
    TimedOut,
}

impl OutcomeStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded { observed } => write!(f, "succeeded ({})", observed),
            Self::Failed { reason } => write!(f, "failed: {}", reason),
            Self::TimedOut => f.write_str("timed out"),
        }
    }
}

/// Resolution of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub sequence: SequenceNumber,
    pub handle: DeviceHandle,
    pub status: OutcomeStatus,

    /// Time between submission and resolution
    pub latency: Duration,
}

#[derive(Debug)]
struct Slot {
    request: CommandRequest,
    outcome: Option<CommandOutcome>,
}

#[derive(Debug, Default)]
struct OperationState {
    slots: BTreeMap<SequenceNumber, Slot>,
    outstanding: usize,
}

#[derive(Debug)]
struct OperationInner {
    target: Mode,
    started_at: Instant,
    registry: DeviceRegistry,
    state: Mutex<OperationState>,
    outstanding_tx: watch::Sender<usize>,
}

/// All requests of one dispatch
///
/// Cheap to clone (Arc internally).
#[derive(Debug, Clone)]
pub struct FleetOperation {
    inner: Arc<OperationInner>,
}

impl FleetOperation {
    pub(crate) fn new(target: Mode, registry: DeviceRegistry) -> Self {
        let (outstanding_tx, _) = watch::channel(0);

        Self {
            inner: Arc::new(OperationInner {
                target,
                started_at: Instant::now(),
                registry,
                state: Mutex::new(OperationState::default()),
                outstanding_tx,
            }),
        }
    }

    /// Add a request and get the completion handle the transport resolves
    pub(crate) fn register(&self, request: CommandRequest) -> Completion {
        let completion = Completion {
            op: Arc::clone(&self.inner),
            sequence: request.sequence,
            handle: request.handle,
            mode: request.mode,
        };

        let mut state = self.inner.state.lock();
        state.slots.insert(
            request.sequence,
            Slot {
                request,
                outcome: None,
            },
        );
        state.outstanding += 1;
        self.inner.outstanding_tx.send_replace(state.outstanding);

        completion
    }

    /// Mode every request of this operation asks for
    pub fn target(&self) -> Mode {
        self.inner.target
    }

    /// When the dispatch started
    pub fn started_at(&self) -> Instant {
        self.inner.started_at
    }

    /// Number of requests
    pub fn len(&self) -> usize {
        self.inner.state.lock().slots.len()
    }

    /// Check if the operation has no requests
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of requests without an outcome
    pub fn outstanding(&self) -> usize {
        self.inner.state.lock().outstanding
    }

    /// Check if every request has an outcome
    pub fn is_converged(&self) -> bool {
        self.outstanding() == 0
    }

    /// Watch the outstanding count
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.inner.outstanding_tx.subscribe()
    }

    /// Copies of all requests, in sequence order
    pub fn requests(&self) -> Vec<CommandRequest> {
        self.inner
            .state
            .lock()
            .slots
            .values()
            .map(|slot| slot.request.clone())
            .collect()
    }

    /// Outcomes recorded so far, in sequence order
    pub fn outcomes(&self) -> Vec<CommandOutcome> {
        self.inner
            .state
            .lock()
            .slots
            .values()
            .filter_map(|slot| slot.outcome.clone())
            .collect()
    }

    /// Mark every unresolved request as timed out
    ///
    /// Returns the handles that timed out. Completions arriving afterwards
    /// are no-ops. Completions already marked keep their outstanding count
    /// until their registry write lands.
    pub fn expire(&self) -> Vec<DeviceHandle> {
        let now = Instant::now();
        let mut state = self.inner.state.lock();
        let mut expired = Vec::new();

        for slot in state.slots.values_mut() {
            if slot.outcome.is_none() {
                slot.outcome = Some(CommandOutcome {
                    sequence: slot.request.sequence,
                    handle: slot.request.handle,
                    status: OutcomeStatus::TimedOut,
                    latency: now.saturating_duration_since(slot.request.submitted_at),
                });
                expired.push(slot.request.handle);
            }
        }

        state.outstanding -= expired.len();
        self.inner.outstanding_tx.send_replace(state.outstanding);

        expired
    }
}

/// Completion handle for one request
///
/// Handed to the transport with the command. Resolving it more than once, or
/// after the operation expired, does nothing and returns `false`.
#[derive(Debug, Clone)]
pub struct Completion {
    op: Arc<OperationInner>,
    sequence: SequenceNumber,
    handle: DeviceHandle,
    mode: Mode,
}

impl Completion {
    /// Device the command was sent to
    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    /// Sequence number of the request
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// Mode the command asked for
    pub fn requested_mode(&self) -> Mode {
        self.mode
    }

    /// Check if the request already has an outcome
    ///
    /// True once the request completed or its operation expired; later
    /// calls to [`succeed`](Self::succeed) or [`fail`](Self::fail) do nothing.
    pub fn is_resolved(&self) -> bool {
        self.op
            .state
            .lock()
            .slots
            .get(&self.sequence)
            .map_or(true, |slot| slot.outcome.is_some())
    }

    /// Report that the device confirmed, now being in `observed`
    pub fn succeed(&self, observed: Mode) -> bool {
        self.resolve(OutcomeStatus::Succeeded { observed })
    }

    /// Report that the command failed
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.resolve(OutcomeStatus::Failed {
            reason: reason.into(),
        })
    }

    fn resolve(&self, status: OutcomeStatus) -> bool {
        let observed = match &status {
            OutcomeStatus::Succeeded { observed } => Some(*observed),
            _ => None,
        };

        {
            let mut state = self.op.state.lock();

            let Some(slot) = state.slots.get_mut(&self.sequence) else {
                return false;
            };

            if let Some(existing) = &slot.outcome {
                trace!(
                    device = %self.handle,
                    sequence = self.sequence,
                    resolved = %existing.status,
                    "Ignoring repeated completion"
                );
                return false;
            }

            debug!(device = %self.handle, sequence = self.sequence, outcome = %status, "Command resolved");

            slot.outcome = Some(CommandOutcome {
                sequence: self.sequence,
                handle: self.handle,
                latency: slot.request.submitted_at.elapsed(),
                status,
            });
        }

        // Registry is written before the request stops counting as outstanding
        if let Some(mode) = observed {
            self.op.registry.update_mode(self.handle, self.sequence, mode);
        }

        let mut state = self.op.state.lock();
        state.outstanding -= 1;
        self.op.outstanding_tx.send_replace(state.outstanding);

        true
    }
}
