//! # TANDEM Core
//!
//! The memory side of the bridge between a fixed-interval physics simulator
//! and a render-cadence consumer:
//! - Slot allocation for up to `max_bodies` live entities
//! - A flat record block both sides agree on, field by field
//! - A handoff that decides which side currently owns that block
//!
//! ## Architecture Rules
//!
//! 1. **One owner at a time** - the buffer is written by exactly one side
//! 2. **Publish after write** - a snapshot becomes visible only once complete
//! 3. **Never wait** - a side that does not own the buffer skips its turn
//!
//! ## Example
//!
//! ```rust,ignore
//! use tandem_core::{handoff, HandoffMode, FrameLayout};
//!
//! let pair = handoff::open(HandoffMode::SharedMemory, FrameLayout::new(1_000, 0));
//! let (mut simulator, mut consumer) = (pair.simulator, pair.consumer);
//!
//! simulator.produce(&mut |frame| frame.set_telemetry(Telemetry::default()));
//! consumer.consume(&mut |frame| println!("{:?}", frame.telemetry()));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod layout;
pub mod memory;
pub mod sync;

pub use error::{SlotError, SlotResult, SyncError};
pub use layout::{
    DebugDrawRecord, DebugSink, FrameBuffer, FrameLayout, Roster, RosterEntry, SoftBodyRecord,
    Telemetry, BODY_DATA_SIZE, HEADER_SIZE, MAX_COLLISIONS, NO_COLLISION,
};
pub use memory::{Slot, SlotAllocator};
pub use sync::{handoff, BufferState, ConsumerHandoff, HandoffPair, SimulatorHandoff};
pub use tandem_shared::{HandoffMode, HandoffPreference};
