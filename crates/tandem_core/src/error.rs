//! # Core Error Types
//!
//! Everything here is recoverable. Nothing in the core panics across the
//! thread boundary.

use tandem_shared::EntityId;
use thiserror::Error;

use crate::sync::BufferState;

/// Errors from the slot allocator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    /// The free list is empty.
    #[error("slot capacity exceeded: all {capacity} slots are live")]
    CapacityExceeded {
        /// Fixed capacity of the allocator.
        capacity: u32,
    },

    /// The identifier already owns a slot.
    #[error("entity {0} already owns a slot")]
    AlreadyAllocated(EntityId),
}

/// Result type for slot operations.
pub type SlotResult<T> = Result<T, SlotError>;

/// Errors from the buffer state machine.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// A side attempted a transition it does not own, or out of order.
    #[error("illegal buffer transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// State before the attempt.
        from: BufferState,
        /// Requested state.
        to: BufferState,
    },

    /// A header word held no known state.
    #[error("corrupt buffer state word {0}")]
    CorruptState(u32),
}
