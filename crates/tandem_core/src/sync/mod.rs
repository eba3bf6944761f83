//! # Buffer Handoff
//!
//! ## The Problem
//!
//! ```text
//! Simulator (fixed interval):  WRITE snapshot N+1
//! Consumer  (render frame):    READ snapshot N
//!
//! Without arbitration: torn snapshots
//! With a Mutex:        one side stalls the other
//! ```
//!
//! ## The Solution: Turn-Taking
//!
//! ```text
//! Simulator:  owns buffer ─ write ─ publish(READY) ───────────────┐
//! Consumer:                     sees READY ─ copy ─ release(CONSUMED)
//! Simulator:  sees CONSUMED ─ write ─ publish(READY) ...
//! ```
//!
//! A side that does not own the buffer skips its turn instead of waiting.
//! Two strategies implement the same turns:
//! - **Shared memory**: one buffer, an atomic state flag
//! - **Transfer**: the buffer object itself moves between the sides

pub mod handoff;
mod shared;
mod state;
mod transfer;

pub use handoff::{ConsumerHandoff, HandoffPair, SimulatorHandoff};
pub use state::BufferState;
