//! Convergence waiter
//!
//! Suspends until every request of a [`FleetOperation`] has an outcome or the
//! operation runs out of time, whichever comes first.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time;
use tracing::{debug, info, warn};

use lidarctl_types::DeviceHandle;

use crate::operation::{CommandOutcome, FleetOperation, OutcomeStatus};

/// Final state of a fleet operation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConvergenceResult {
    /// Every request resolved through a genuine completion
    pub fully_converged: bool,

    pub succeeded: BTreeSet<DeviceHandle>,
    pub failed: BTreeSet<DeviceHandle>,
    pub timed_out: BTreeSet<DeviceHandle>,

    /// One outcome per request, in sequence order
    pub outcomes: Vec<CommandOutcome>,

    /// Time from dispatch to return
    pub elapsed: Duration,
}

impl ConvergenceResult {
    /// Build from the outcomes recorded in `op`
    pub fn collect(op: &FleetOperation) -> Self {
        let outcomes = op.outcomes();
        let mut result = Self {
            elapsed: op.started_at().elapsed(),
            ..Self::default()
        };

        for outcome in &outcomes {
            let set = match outcome.status {
                OutcomeStatus::Succeeded { .. } => &mut result.succeeded,
                OutcomeStatus::Failed { .. } => &mut result.failed,
                OutcomeStatus::TimedOut => &mut result.timed_out,
            };
            set.insert(outcome.handle);
        }

        result.fully_converged = outcomes.len() == op.len() && result.timed_out.is_empty();
        result.outcomes = outcomes;
        result
    }

    /// Number of devices the operation targeted
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Outcome for one device
    pub fn outcome_for(&self, handle: DeviceHandle) -> Option<&CommandOutcome> {
        self.outcomes.iter().find(|o| o.handle == handle)
    }
}

/// Wait for `op` to converge
///
/// `timeout` is measured from the start of the dispatch, so the call returns
/// no later than `timeout` after [`FleetOperation::started_at`] no matter how
/// many devices stay silent. Requests still unresolved at that point are
/// marked timed out; their completions are ignored if they show up later.
pub async fn await_completion(op: &FleetOperation, timeout: Duration) -> ConvergenceResult {
    let deadline = op.started_at() + timeout;
    let mut outstanding = op.subscribe();

    let converged = matches!(
        time::timeout_at(deadline, outstanding.wait_for(|n| *n == 0)).await,
        Ok(Ok(_))
    );

    if converged {
        debug!(requests = op.len(), "Fleet operation converged");
    } else {
        let expired = op.expire();
        if !expired.is_empty() {
            warn!(
                timed_out = expired.len(),
                timeout_ms = timeout.as_millis() as u64,
                "Fleet operation timed out"
            );
        }

        // Completions marked before the expiry are still writing the registry
        let _ = outstanding.wait_for(|n| *n == 0).await;
    }

    let result = ConvergenceResult::collect(op);

    info!(
        succeeded = result.succeeded.len(),
        failed = result.failed.len(),
        timed_out = result.timed_out.len(),
        elapsed_ms = result.elapsed.as_millis() as u64,
        "Fleet operation finished"
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::CommandDispatcher;
    use crate::operation::Completion;
    use crate::registry::DeviceRegistry;
    use crate::transport::{DeviceTransport, DiscoveryCallback, InitError};
    use async_trait::async_trait;
    use lidarctl_types::Mode;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// How a scripted device answers
    #[derive(Clone, Copy)]
    enum Script {
        Succeed(u64),
        Fail(u64),
        Silent,
    }

    /// Answers from spawned tasks after the scripted delay
    #[derive(Default)]
    struct ScriptedTransport {
        scripts: HashMap<DeviceHandle, Script>,
        completions: Mutex<Vec<Completion>>,
    }

    #[async_trait]
    impl DeviceTransport for ScriptedTransport {
        async fn initialize(&self) -> Result<(), InitError> {
            Ok(())
        }

        async fn shutdown(&self) {}

        fn on_device_discovered(&self, _callback: DiscoveryCallback) {}

        fn send_mode_command(&self, handle: DeviceHandle, mode: Mode, completion: Completion) {
            self.completions.lock().push(completion.clone());

            match self.scripts.get(&handle).copied().unwrap_or(Script::Silent) {
                Script::Succeed(ms) => {
                    tokio::spawn(async move {
                        time::sleep(Duration::from_millis(ms)).await;
                        completion.succeed(mode);
                    });
                }
                Script::Fail(ms) => {
                    tokio::spawn(async move {
                        time::sleep(Duration::from_millis(ms)).await;
                        completion.fail("ret_code 1");
                    });
                }
                Script::Silent => {}
            }
        }
    }

    fn handle(n: u32) -> DeviceHandle {
        DeviceHandle::from_raw(n)
    }

    fn setup(scripts: &[(u32, Script)]) -> (DeviceRegistry, Arc<ScriptedTransport>, CommandDispatcher) {
        let registry = DeviceRegistry::new();
        for (n, _) in scripts {
            registry.upsert(handle(*n), &format!("SN{}", n), Mode::Standby);
        }

        let transport = Arc::new(ScriptedTransport {
            scripts: scripts.iter().map(|(n, s)| (handle(*n), *s)).collect(),
            ..Default::default()
        });
        let dispatcher = CommandDispatcher::new(registry.clone(), transport.clone());

        (registry, transport, dispatcher)
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_devices_answer() {
        let (registry, _, dispatcher) = setup(&[(1, Script::Succeed(20)), (2, Script::Fail(40))]);

        let op = dispatcher.dispatch([handle(1), handle(2)], Mode::Active).unwrap();
        let result = await_completion(&op, Duration::from_millis(500)).await;

        assert!(result.fully_converged);
        assert_eq!(result.succeeded, BTreeSet::from([handle(1)]));
        assert_eq!(result.failed, BTreeSet::from([handle(2)]));
        assert!(result.timed_out.is_empty());

        // Returned as soon as the last answer arrived
        assert!(result.elapsed < Duration::from_millis(100));

        assert_eq!(registry.get(handle(1)).unwrap().mode, Mode::Active);
        assert_eq!(registry.get(handle(2)).unwrap().mode, Mode::Standby);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_device_silent() {
        let (_, _, dispatcher) = setup(&[(1, Script::Succeed(50)), (2, Script::Silent)]);

        let op = dispatcher.dispatch([handle(1), handle(2)], Mode::Active).unwrap();
        let result = await_completion(&op, Duration::from_millis(500)).await;

        assert!(!result.fully_converged);
        assert_eq!(result.succeeded, BTreeSet::from([handle(1)]));
        assert!(result.failed.is_empty());
        assert_eq!(result.timed_out, BTreeSet::from([handle(2)]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_wait_with_many_silent_devices() {
        let scripts: Vec<_> = (1..=64).map(|n| (n, Script::Silent)).collect();
        let (_, _, dispatcher) = setup(&scripts);

        let op = dispatcher.dispatch((1..=64).map(handle), Mode::Standby).unwrap();
        let start = time::Instant::now();
        let result = await_completion(&op, Duration::from_millis(500)).await;

        assert_eq!(result.timed_out.len(), 64);
        assert!(start.elapsed() <= Duration::from_millis(501));
        assert!(op.started_at().elapsed() <= Duration::from_millis(501));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_completion_is_ignored() {
        let (registry, transport, dispatcher) = setup(&[(1, Script::Silent)]);

        let op = dispatcher.dispatch([handle(1)], Mode::Active).unwrap();
        let result = await_completion(&op, Duration::from_millis(100)).await;
        assert_eq!(result.timed_out, BTreeSet::from([handle(1)]));

        let late = transport.completions.lock()[0].clone();
        assert!(!late.succeed(Mode::Active));

        assert_eq!(registry.get(handle(1)).unwrap().mode, Mode::Standby);
        assert_eq!(
            ConvergenceResult::collect(&op).timed_out,
            BTreeSet::from([handle(1)])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_operation_returns_immediately() {
        let (_, _, dispatcher) = setup(&[]);

        let op = dispatcher.dispatch(std::iter::empty(), Mode::Active).unwrap();
        let result = await_completion(&op, Duration::from_secs(30)).await;

        assert!(result.fully_converged);
        assert_eq!(result.total(), 0);
        assert_eq!(result.elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcome_lookup() {
        let (_, _, dispatcher) = setup(&[(1, Script::Fail(10))]);

        let op = dispatcher.dispatch([handle(1)], Mode::Active).unwrap();
        let result = await_completion(&op, Duration::from_millis(100)).await;

        let outcome = result.outcome_for(handle(1)).unwrap();
        assert_eq!(
            outcome.status,
            OutcomeStatus::Failed { reason: "ret_code 1".into() }
        );
        assert!(result.outcome_for(handle(2)).is_none());
    }
}
