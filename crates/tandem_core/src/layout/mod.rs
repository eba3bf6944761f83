//! # Shared Buffer Layout
//!
//! Field-by-field layout of the block handed between the two sides.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (HEADER_SIZE words)                                   │
//! │ state │ step duration │ step timestamp │ sub-steps           │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Body record 0 (BODY_DATA_SIZE words)                         │
//! │ 4x4 matrix (16 f32) │ lin speed │ ang speed │ collisions (i32)│
//! ├──────────────────────────────────────────────────────────────┤
//! │ Body record 1 ...                                  max_bodies│
//! └──────────────────────────────────────────────────────────────┘
//!   + debug-draw record, soft-body records, roster
//! ```
//!
//! The record block is raw `u32` words. Readers pick the float or the
//! integer view per offset range; nothing caches a view across handoffs.

mod debug;
mod frame;
mod record;
mod roster;

pub use debug::{DebugDrawRecord, DebugSink};
pub use frame::{FrameBuffer, FrameLayout, SoftBodyRecord, Telemetry};
pub use record::{
    BodyRecord, BodyRecordMut, ANGULAR_SPEED_OFFSET, BODY_DATA_SIZE, COLLISIONS_OFFSET,
    HEADER_STATE, HEADER_STEP_DURATION, HEADER_STEP_TIMESTAMP, HEADER_SUB_STEPS, HEADER_SIZE,
    LINEAR_SPEED_OFFSET, MATRIX_OFFSET, MAX_COLLISIONS, NO_COLLISION,
};
pub use roster::{Roster, RosterEntry};
