//! # Session Constants
//!
//! Defaults both sides agree on before the handshake.
//!
//! **CRITICAL:** The simulator and the consumer may be built at different
//! times. Bump [`PROTOCOL_VERSION`] whenever a `Command` or `Event` payload
//! changes shape.

// =============================================================================
// PROTOCOL
// =============================================================================

/// Version carried in the `INIT` handshake.
pub const PROTOCOL_VERSION: u32 = 1;

// =============================================================================
// CAPACITY
// =============================================================================

/// Default number of body slots in the shared record block.
pub const MAX_BODIES: u32 = 10_000;

/// Default number of debug line vertices the debug-draw record can hold.
pub const DEBUG_VERTEX_CAPACITY: u32 = 1_000_000;

// =============================================================================
// TIMING
// =============================================================================

/// Simulation ticks per wall-clock second.
pub const TICK_RATE: u32 = 60;

/// Upper bound on engine sub-steps per tick.
///
/// Under a load spike the elapsed delta grows; past this bound the engine
/// drops time instead of spiralling.
pub const MAX_SUB_STEPS: u32 = 4;

/// Length of one engine sub-step in seconds.
pub const FIXED_TIME_STEP: f32 = 1.0 / 60.0;
