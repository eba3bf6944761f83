//! # TANDEM Shared
//!
//! Vocabulary shared by the simulator and the consumer.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on:
//! - threading or channel crates
//! - the buffer layout in `tandem_core`
//!
//! Everything here is plain data that can be moved across a thread boundary
//! or encoded into bytes for a host that only moves messages.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod ids;
pub mod protocol;

pub use constants::{
    DEBUG_VERTEX_CAPACITY, FIXED_TIME_STEP, MAX_BODIES, MAX_SUB_STEPS, PROTOCOL_VERSION, TICK_RATE,
};
pub use ids::{EntityId, RequestId};
pub use protocol::{
    BodyConfig, BodyConfigPatch, BodyKind, Command, ConstraintConfig, ConstraintKind, Event,
    HandoffDescriptor, HandoffMode, HandoffPreference, RaycastHit, RejectReason, ShapeDescriptor,
    SoftBodyBuffers, SoftBodyConfig, WorldConfig,
};

/// Math types used by every payload.
pub use glam::{Mat4, Quat, Vec3};
