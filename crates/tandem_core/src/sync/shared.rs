//! Shared-memory handoff: one buffer, one atomic state word.
//!
//! ## Safety Note
//!
//! Both ends alias the same `FrameBuffer` through an `UnsafeCell`. Exclusive
//! access is guaranteed by the state word: only the simulator touches the
//! buffer while it is writable, only the consumer while it is `READY`.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use tandem_shared::HandoffMode;

use super::handoff::{ConsumerHandoff, SimulatorHandoff};
use super::state::BufferState;
use crate::error::SyncError;
use crate::layout::{FrameBuffer, FrameLayout};

/// The buffer plus the word that arbitrates it.
struct SharedFrame {
    /// Mirrors the header state word; the atomic is authoritative.
    state: CachePadded<AtomicU32>,
    frame: UnsafeCell<FrameBuffer>,
}

// SAFETY: access to `frame` is serialized by `state` (see module docs)
unsafe impl Sync for SharedFrame {}

impl SharedFrame {
    /// Loads the state and applies `transition`.
    ///
    /// Returns None when the caller does not own the buffer.
    fn claim(
        &self,
        transition: fn(BufferState) -> Result<BufferState, SyncError>,
    ) -> Option<BufferState> {
        let word = self.state.load(Ordering::Acquire);
        match BufferState::from_word(word).and_then(transition) {
            Ok(next) => Some(next),
            Err(SyncError::IllegalTransition { .. }) => None,
            Err(err) => {
                tracing::error!(%err, "shared buffer state is corrupt");
                None
            }
        }
    }

    /// Runs `access` on the buffer, then publishes `next`.
    ///
    /// # Safety
    ///
    /// The caller must own the buffer under the current state.
    unsafe fn hand_over(&self, next: BufferState, access: &mut dyn FnMut(&mut FrameBuffer)) {
        let frame = &mut *self.frame.get();
        access(frame);
        frame.set_state(next);
        self.state.store(next as u32, Ordering::Release);
    }
}

/// Simulator end over shared memory.
pub(super) struct SharedSimulatorHandoff {
    shared: Arc<SharedFrame>,
    layout: FrameLayout,
}

/// Consumer end over shared memory.
pub(super) struct SharedConsumerHandoff {
    shared: Arc<SharedFrame>,
    layout: FrameLayout,
}

impl SharedSimulatorHandoff {
    /// Allocates the buffer and returns both ends.
    pub(super) fn pair(layout: FrameLayout) -> (Self, SharedConsumerHandoff) {
        let shared = Arc::new(SharedFrame {
            state: CachePadded::new(AtomicU32::new(BufferState::Uninitialized as u32)),
            frame: UnsafeCell::new(FrameBuffer::new(layout)),
        });
        (
            Self {
                shared: Arc::clone(&shared),
                layout,
            },
            SharedConsumerHandoff { shared, layout },
        )
    }
}

impl SimulatorHandoff for SharedSimulatorHandoff {
    fn mode(&self) -> HandoffMode {
        HandoffMode::SharedMemory
    }

    fn layout(&self) -> FrameLayout {
        self.layout
    }

    fn produce(&mut self, write: &mut dyn FnMut(&mut FrameBuffer)) -> bool {
        let Some(next) = self.shared.claim(BufferState::publish) else {
            return false;
        };
        // SAFETY: the state is writable, so the consumer will not touch the
        // buffer until the Release store inside `hand_over`
        unsafe { self.shared.hand_over(next, write) };
        true
    }
}

impl ConsumerHandoff for SharedConsumerHandoff {
    fn mode(&self) -> HandoffMode {
        HandoffMode::SharedMemory
    }

    fn layout(&self) -> FrameLayout {
        self.layout
    }

    fn consume(&mut self, read: &mut dyn FnMut(&mut FrameBuffer)) -> bool {
        let Some(next) = self.shared.claim(BufferState::release) else {
            return false;
        };
        // SAFETY: the state is READY, so the simulator will not touch the
        // buffer until the Release store inside `hand_over`
        unsafe { self.shared.hand_over(next, read) };
        true
    }
}
