//! # Buffer State Machine
//!
//! ```text
//!  UNINITIALIZED ──publish──▶ READY ──release──▶ CONSUMED
//!                              ▲                    │
//!                              └──────publish───────┘
//! ```
//!
//! `publish` belongs to the simulator, `release` to the consumer.
//! `UNINITIALIZED` is never re-entered.

use crate::error::SyncError;

/// Who may touch the buffer next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BufferState {
    /// No snapshot has been published yet; the simulator owns the buffer.
    Uninitialized = 0,
    /// A complete snapshot is waiting; the consumer owns the buffer.
    Ready = 1,
    /// The consumer has copied the snapshot out; the simulator owns it.
    Consumed = 2,
}

impl BufferState {
    /// Decodes a header or atomic word.
    ///
    /// # Errors
    ///
    /// [`SyncError::CorruptState`] for any other value.
    pub const fn from_word(word: u32) -> Result<Self, SyncError> {
        match word {
            0 => Ok(Self::Uninitialized),
            1 => Ok(Self::Ready),
            2 => Ok(Self::Consumed),
            other => Err(SyncError::CorruptState(other)),
        }
    }

    /// Returns true if the simulator may write.
    #[inline]
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::Uninitialized | Self::Consumed)
    }

    /// Simulator transition: a complete snapshot is in the buffer.
    ///
    /// # Errors
    ///
    /// [`SyncError::IllegalTransition`] from `Ready`: the consumer has not
    /// caught up and the snapshot in flight must not be overwritten.
    pub const fn publish(self) -> Result<Self, SyncError> {
        if self.is_writable() {
            Ok(Self::Ready)
        } else {
            Err(SyncError::IllegalTransition {
                from: self,
                to: Self::Ready,
            })
        }
    }

    /// Consumer transition: the snapshot has been copied out.
    ///
    /// # Errors
    ///
    /// [`SyncError::IllegalTransition`] unless the state is `Ready`.
    pub const fn release(self) -> Result<Self, SyncError> {
        match self {
            Self::Ready => Ok(Self::Consumed),
            other => Err(SyncError::IllegalTransition {
                from: other,
                to: Self::Consumed,
            }),
        }
    }
}
