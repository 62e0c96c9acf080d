//! Command dispatcher
//!
//! Turns "put these devices into this mode" into one command per device,
//! each carrying its own sequence number and completion handle.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info};

use lidarctl_types::{DeviceHandle, Mode};

use crate::error::{Error, Result};
use crate::operation::{CommandRequest, FleetOperation};
use crate::registry::DeviceRegistry;
use crate::sequence::SequenceGenerator;
use crate::transport::DeviceTransport;

/// Issues mode commands to sets of devices
pub struct CommandDispatcher {
    registry: DeviceRegistry,
    transport: Arc<dyn DeviceTransport>,
    sequence: SequenceGenerator,
}

impl CommandDispatcher {
    /// Create a dispatcher writing confirmed modes into `registry`
    pub fn new(registry: DeviceRegistry, transport: Arc<dyn DeviceTransport>) -> Self {
        Self {
            registry,
            transport,
            sequence: SequenceGenerator::new(),
        }
    }

    /// Send `mode` to every device in `targets`
    ///
    /// Returns as soon as all commands are handed to the transport. Duplicate
    /// handles are sent one command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTargetMode`] for modes that cannot be
    /// requested (unknown or transitional).
    pub fn dispatch(
        &self,
        targets: impl IntoIterator<Item = DeviceHandle>,
        mode: Mode,
    ) -> Result<FleetOperation> {
        if !mode.is_requestable() {
            return Err(Error::InvalidTargetMode(mode));
        }

        let targets: BTreeSet<DeviceHandle> = targets.into_iter().collect();
        let op = FleetOperation::new(mode, self.registry.clone());

        // Every request is registered before the first command goes out, so a
        // completion delivered synchronously always finds its slot.
        let completions: Vec<_> = targets
            .iter()
            .map(|&handle| {
                op.register(CommandRequest {
                    handle,
                    mode,
                    sequence: self.sequence.next(),
                    submitted_at: Instant::now(),
                })
            })
            .collect();

        info!(devices = completions.len(), mode = %mode, "Dispatching mode command");

        for completion in completions {
            debug!(
                device = %completion.handle(),
                sequence = completion.sequence(),
                "Sending mode command"
            );
            self.transport
                .send_mode_command(completion.handle(), mode, completion);
        }

        Ok(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Completion, OutcomeStatus};
    use crate::transport::{DiscoveryCallback, InitError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    /// Records commands; optionally answers them on the spot
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Completion>>,
        answer_inline: bool,
    }

    #[async_trait]
    impl DeviceTransport for RecordingTransport {
        async fn initialize(&self) -> std::result::Result<(), InitError> {
            Ok(())
        }

        async fn shutdown(&self) {}

        fn on_device_discovered(&self, _callback: DiscoveryCallback) {}

        fn send_mode_command(&self, _handle: DeviceHandle, mode: Mode, completion: Completion) {
            if self.answer_inline {
                completion.succeed(mode);
            }
            self.sent.lock().push(completion);
        }
    }

    fn handle(n: u32) -> DeviceHandle {
        DeviceHandle::from_raw(n)
    }

    #[tokio::test]
    async fn test_dispatch_one_command_per_target() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = CommandDispatcher::new(DeviceRegistry::new(), transport.clone());

        let op = dispatcher
            .dispatch([handle(2), handle(1), handle(2)], Mode::Active)
            .unwrap();

        assert_eq!(op.len(), 2);
        assert_eq!(op.outstanding(), 2);

        let sent = transport.sent.lock();
        let handles: Vec<_> = sent.iter().map(|c| c.handle()).collect();
        assert_eq!(handles, vec![handle(1), handle(2)]);
        assert!(sent.iter().all(|c| c.requested_mode() == Mode::Active));
    }

    #[tokio::test]
    async fn test_sequence_numbers_strictly_increase() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = CommandDispatcher::new(DeviceRegistry::new(), transport.clone());

        dispatcher.dispatch([handle(1), handle(2)], Mode::Active).unwrap();
        dispatcher.dispatch([handle(1)], Mode::Standby).unwrap();

        let sequences: Vec<_> = transport.sent.lock().iter().map(|c| c.sequence()).collect();
        assert!(sequences.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_dispatch_rejects_transitional_mode() {
        let dispatcher =
            CommandDispatcher::new(DeviceRegistry::new(), Arc::new(RecordingTransport::default()));

        let result = dispatcher.dispatch([handle(1)], Mode::TransitioningToActive);
        assert!(matches!(result, Err(Error::InvalidTargetMode(_))));
    }

    #[tokio::test]
    async fn test_inline_completion_finds_its_request() {
        let registry = DeviceRegistry::new();
        registry.upsert(handle(1), "SN1", Mode::Standby);
        registry.upsert(handle(2), "SN2", Mode::Standby);

        let transport = Arc::new(RecordingTransport {
            answer_inline: true,
            ..Default::default()
        });
        let dispatcher = CommandDispatcher::new(registry.clone(), transport);

        let op = dispatcher.dispatch([handle(1), handle(2)], Mode::Active).unwrap();

        assert!(op.is_converged());
        assert!(op.outcomes().iter().all(|o| o.status.is_success()));
        assert!(registry.snapshot().iter().all(|r| r.mode == Mode::Active));
    }

    #[tokio::test]
    async fn test_newer_operation_wins_over_late_completion() {
        let registry = DeviceRegistry::new();
        registry.upsert(handle(1), "SN1", Mode::Standby);

        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = CommandDispatcher::new(registry.clone(), transport.clone());

        dispatcher.dispatch([handle(1)], Mode::Active).unwrap();
        dispatcher.dispatch([handle(1)], Mode::Standby).unwrap();

        let (first, second) = {
            let sent = transport.sent.lock();
            (sent[0].clone(), sent[1].clone())
        };

        // Completions arrive out of order
        second.succeed(Mode::Standby);
        first.succeed(Mode::Active);

        assert_eq!(registry.get(handle(1)).unwrap().mode, Mode::Standby);
    }

    #[tokio::test]
    async fn test_empty_target_set_is_converged() {
        let dispatcher =
            CommandDispatcher::new(DeviceRegistry::new(), Arc::new(RecordingTransport::default()));

        let op = dispatcher.dispatch(std::iter::empty(), Mode::Standby).unwrap();
        assert!(op.is_empty());
        assert!(op.is_converged());
    }

    #[tokio::test]
    async fn test_duplicate_delivery_decrements_once() {
        let registry = DeviceRegistry::new();
        registry.upsert(handle(1), "SN1", Mode::Standby);
        registry.upsert(handle(2), "SN2", Mode::Standby);

        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = CommandDispatcher::new(registry.clone(), transport.clone());
        let op = dispatcher.dispatch([handle(1), handle(2)], Mode::Active).unwrap();

        let first = transport.sent.lock()[0].clone();
        assert!(first.succeed(Mode::TransitioningToActive));
        assert!(!first.succeed(Mode::Active));

        assert_eq!(op.outstanding(), 1);
        assert_eq!(
            registry.get(handle(1)).unwrap().mode,
            Mode::TransitioningToActive
        );
        assert_eq!(
            op.outcomes()[0].status,
            OutcomeStatus::Succeeded { observed: Mode::TransitioningToActive }
        );
    }
}
