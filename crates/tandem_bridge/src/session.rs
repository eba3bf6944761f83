//! Session setup: one config in, two connected drivers out.
//!
//! ```text
//! SessionConfig ─ validate ─ resolve handoff mode ─ open buffer
//!                                                    │
//!              ConsumerDriver ◀── consumer end ──────┤
//!              SimulationDriver ◀── simulator end ───┘
//! ```
//!
//! `INIT` is queued on the channel before either driver is returned, so it
//! is always the first message the simulator sees.

use std::io;
use std::thread::{self, JoinHandle};

use tandem_core::handoff;
use tandem_shared::Command;

use crate::channel;
use crate::config::SessionConfig;
use crate::consumer::ConsumerDriver;
use crate::error::{ChannelError, ConfigError};
use crate::simulation::SimulationDriver;
use crate::traits::PhysicsEngine;

/// Name of the thread started by [`spawn_simulator`].
pub const SIMULATOR_THREAD_NAME: &str = "tandem-sim";

/// Builds both drivers of one session.
///
/// # Errors
///
/// [`ConfigError::Invalid`] if the configuration is out of range.
pub fn connect<E: PhysicsEngine>(
    config: &SessionConfig,
    engine: E,
) -> Result<(ConsumerDriver, SimulationDriver<E>), ConfigError> {
    config.validate()?;

    let mode = handoff::resolve(config.handoff);
    let pair = handoff::open(mode, config.layout());
    let (consumer_link, simulator_link) = channel::link();

    let simulator = SimulationDriver::new(engine, simulator_link, pair.simulator, config.tick_rate);
    let mut consumer = ConsumerDriver::new(consumer_link, pair.consumer);
    consumer
        .send(Command::Init {
            world: config.world.clone(),
            handoff: config.descriptor(mode),
        })
        .map_err(|err: ChannelError| ConfigError::Invalid(format!("cannot queue INIT: {err}")))?;

    tracing::info!(
        ?mode,
        max_bodies = config.max_bodies,
        tick_rate = config.tick_rate,
        "session connected"
    );
    Ok((consumer, simulator))
}

/// Runs the simulator on its own thread until `SHUTDOWN` or until the
/// consumer is dropped. Joining returns the driver for its stats.
///
/// # Errors
///
/// Returns the OS error if the thread cannot be started.
pub fn spawn_simulator<E>(mut simulator: SimulationDriver<E>) -> io::Result<JoinHandle<SimulationDriver<E>>>
where
    E: PhysicsEngine + 'static,
{
    thread::Builder::new()
        .name(SIMULATOR_THREAD_NAME.to_string())
        .spawn(move || {
            simulator.run();
            simulator
        })
}
