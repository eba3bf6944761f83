//! # TANDEM Bridge
//!
//! The two schedulable units of a physics bridge and what connects them:
//! - [`SimulationDriver`]: steps an external [`PhysicsEngine`] on a fixed
//!   wall-clock interval and publishes snapshots
//! - [`ConsumerDriver`]: once per render frame, copies the latest snapshot
//!   into an external [`SceneGraph`]
//! - [`channel`]: structural commands one way, events and replies the other
//!
//! ## Session Lifecycle
//!
//! ```text
//! Consumer                         Simulator
//!    │── INIT (world, descriptor) ──▶│
//!    │   (structural commands held)  │ allocate slots, init engine
//!    │◀──────────── READY ───────────│
//!    │── held commands, in order ───▶│
//!    │◀════ snapshots via handoff ═══│ every tick it owns the buffer
//!    │── SHUTDOWN ──────────────────▶│
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use tandem_bridge::{session, MockPhysicsEngine, MockSceneGraph, SessionConfig};
//!
//! let (mut consumer, simulator) = session::connect(&SessionConfig::default(), MockPhysicsEngine::new())?;
//! let worker = session::spawn_simulator(simulator)?;
//!
//! let mut scene = MockSceneGraph::new();
//! loop {
//!     consumer.frame(&mut scene);
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod channel;
pub mod config;
pub mod consumer;
pub mod error;
pub mod session;
pub mod simulation;
pub mod traits;

pub use channel::{CommandSender, ConsumerLink, PendingRequests, RequestTicket, SimulatorLink};
pub use config::SessionConfig;
pub use consumer::{ConsumerDriver, ConsumerStats, FrameReport};
pub use error::{ChannelError, ChannelResult, ConfigError, EngineError, WireError};
pub use simulation::{Phase, SimulationContext, SimulationDriver, SimulationStats, TickLoop, TickStats};
pub use traits::{
    EngineHit, MockMesh, MockNode, MockPhysicsEngine, MockSceneGraph, NativeHandle, PhysicsEngine,
    RayQuery, SceneGraph,
};
