//! Transfer handoff: the buffer object itself moves between the sides.
//!
//! ```text
//! simulator ──(FrameBuffer, READY)────▶ consumer
//!     ▲                                     │
//!     └────────(FrameBuffer, CONSUMED)──────┘
//! ```
//!
//! A side that does not currently hold the object has nothing to write or
//! read. The typed views are re-derived from the words on every access, so
//! nothing keeps pointing into an object that has moved away.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use tandem_shared::HandoffMode;

use super::handoff::{ConsumerHandoff, SimulatorHandoff};
use super::state::BufferState;
use crate::layout::{FrameBuffer, FrameLayout};

/// Simulator end over moved buffers.
pub(super) struct TransferSimulatorHandoff {
    /// Some while the simulator owns the buffer.
    held: Option<FrameBuffer>,
    to_consumer: Sender<FrameBuffer>,
    from_consumer: Receiver<FrameBuffer>,
    layout: FrameLayout,
}

/// Consumer end over moved buffers.
pub(super) struct TransferConsumerHandoff {
    to_simulator: Sender<FrameBuffer>,
    from_simulator: Receiver<FrameBuffer>,
    layout: FrameLayout,
}

impl TransferSimulatorHandoff {
    /// Allocates the buffer on the simulator side and returns both ends.
    pub(super) fn pair(layout: FrameLayout) -> (Self, TransferConsumerHandoff) {
        // One buffer in existence, so one slot per direction suffices
        let (to_consumer, from_simulator) = bounded(1);
        let (to_simulator, from_consumer) = bounded(1);
        (
            Self {
                held: Some(FrameBuffer::new(layout)),
                to_consumer,
                from_consumer,
                layout,
            },
            TransferConsumerHandoff {
                to_simulator,
                from_simulator,
                layout,
            },
        )
    }

    /// Takes the buffer back if the consumer has returned it.
    fn reclaim(&mut self) {
        if self.held.is_some() {
            return;
        }
        match self.from_consumer.try_recv() {
            Ok(frame) => self.held = Some(frame),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                tracing::debug!("consumer end dropped; buffer will not return");
            }
        }
    }
}

impl SimulatorHandoff for TransferSimulatorHandoff {
    fn mode(&self) -> HandoffMode {
        HandoffMode::Transfer
    }

    fn layout(&self) -> FrameLayout {
        self.layout
    }

    fn produce(&mut self, write: &mut dyn FnMut(&mut FrameBuffer)) -> bool {
        self.reclaim();
        let Some(mut frame) = self.held.take() else {
            return false;
        };

        let (prev, next) = match frame.state().and_then(|s| s.publish().map(|n| (s, n))) {
            Ok(pair) => pair,
            Err(err) => {
                tracing::error!(%err, "held buffer is not writable");
                self.held = Some(frame);
                return false;
            }
        };

        write(&mut frame);
        frame.set_state(next);
        match self.to_consumer.try_send(frame) {
            Ok(()) => true,
            Err(err) => {
                // Consumer is gone: keep the buffer, undo the publish
                let mut frame = err.into_inner();
                frame.set_state(prev);
                self.held = Some(frame);
                false
            }
        }
    }
}

impl ConsumerHandoff for TransferConsumerHandoff {
    fn mode(&self) -> HandoffMode {
        HandoffMode::Transfer
    }

    fn layout(&self) -> FrameLayout {
        self.layout
    }

    fn consume(&mut self, read: &mut dyn FnMut(&mut FrameBuffer)) -> bool {
        let Ok(mut frame) = self.from_simulator.try_recv() else {
            return false;
        };

        let next = match frame.state().and_then(BufferState::release) {
            Ok(next) => next,
            Err(err) => {
                tracing::error!(%err, "received buffer is not READY; returning it unread");
                let _ = self.to_simulator.try_send(frame);
                return false;
            }
        };

        read(&mut frame);
        frame.set_state(next);
        if self.to_simulator.try_send(frame).is_err() {
            tracing::debug!("simulator end dropped; buffer discarded");
        }
        true
    }
}
