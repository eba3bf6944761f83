//! # Simulation Driver
//!
//! ## Tick Order (fixed interval)
//!
//! ```text
//! 1. Drain commands (FIFO), apply to the simulation context
//! 2. Buffer still READY?  -> skip the whole tick, time keeps accumulating
//! 3. Apply debug switch, rewind debug cursor
//! 4. Push consumer-authored (static/kinematic) transforms into the engine
//! 5. Step the engine by the owed wall-clock time, bounded sub-steps
//! 6. Write every live slot: transform, speeds, collisions
//! 7. Write roster, soft-body records, telemetry
//! 8. Publish (* -> READY)
//! ```

mod context;
mod tick;

use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, TryRecvError};
use tandem_core::{DebugSink, SimulatorHandoff, Telemetry};
use tandem_shared::{
    Command, EntityId, Event, HandoffDescriptor, RejectReason, WorldConfig, PROTOCOL_VERSION,
};

use crate::channel::SimulatorLink;
use crate::traits::{PhysicsEngine, RayQuery};

pub use context::SimulationContext;
pub use tick::{TickLoop, TickStats};

/// Where the driver is in the session handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for `INIT`; structural commands are dropped.
    AwaitingInit,
    /// `READY` has been sent.
    Running,
    /// `SHUTDOWN` received or the consumer went away.
    Stopped,
}

/// Command and snapshot counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimulationStats {
    /// Commands applied.
    pub commands_applied: u64,
    /// Commands logged and dropped (ordering errors, unknown kinds).
    pub commands_dropped: u64,
    /// Structural adds that created nothing.
    pub rejected: u64,
    /// Snapshots published.
    pub snapshots_published: u64,
}

/// Owns the engine and the simulation context; runs on its own thread.
pub struct SimulationDriver<E: PhysicsEngine> {
    engine: E,
    link: SimulatorLink,
    handoff: Box<dyn SimulatorHandoff>,
    /// Created on `INIT`.
    context: Option<SimulationContext>,
    world: WorldConfig,
    phase: Phase,
    ticks: TickLoop,
    /// Origin of the telemetry timestamp.
    started: Instant,
    /// End of the last stepped tick; skipped ticks leave it in place.
    last_step: Instant,
    stats: SimulationStats,
}

impl<E: PhysicsEngine> SimulationDriver<E> {
    /// Creates a driver waiting for `INIT`.
    pub fn new(
        engine: E,
        link: SimulatorLink,
        handoff: Box<dyn SimulatorHandoff>,
        tick_rate: u32,
    ) -> Self {
        let now = Instant::now();
        Self {
            engine,
            link,
            handoff,
            context: None,
            world: WorldConfig::default(),
            phase: Phase::AwaitingInit,
            ticks: TickLoop::new(tick_rate),
            started: now,
            last_step: now,
            stats: SimulationStats::default(),
        }
    }

    /// Handshake phase.
    #[inline]
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Command and snapshot counters.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Tick timing statistics.
    #[inline]
    #[must_use]
    pub fn tick_stats(&self) -> &TickStats {
        self.ticks.stats()
    }

    /// The engine being driven.
    #[inline]
    #[must_use]
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// The simulation context, once initialized.
    #[inline]
    #[must_use]
    pub const fn context(&self) -> Option<&SimulationContext> {
        self.context.as_ref()
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    /// Applies every command queued so far, in order.
    pub fn pump_commands(&mut self) {
        while self.phase != Phase::Stopped {
            match self.link.commands.try_recv() {
                Ok(command) => self.handle(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::info!("consumer disconnected, stopping simulation");
                    self.phase = Phase::Stopped;
                }
            }
        }
    }

    /// Blocks up to `timeout` for the next command, then applies it and
    /// everything queued behind it.
    ///
    /// # Returns
    ///
    /// true if a command arrived.
    pub fn wait_for_command(&mut self, timeout: Duration) -> bool {
        match self.link.commands.recv_timeout(timeout) {
            Ok(command) => {
                self.handle(command);
                self.pump_commands();
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                tracing::info!("consumer disconnected, stopping simulation");
                self.phase = Phase::Stopped;
                false
            }
        }
    }

    fn emit(&self, event: Event) {
        if self.link.events.send(event).is_err() {
            tracing::debug!("event dropped, consumer is gone");
        }
    }

    fn reject(&mut self, id: EntityId, reason: RejectReason) {
        tracing::warn!(%id, ?reason, "structural add rejected");
        self.stats.rejected += 1;
        self.emit(Event::Rejected { id, reason });
    }

    /// Applies one command.
    ///
    /// Problems are logged and the command dropped; nothing is returned to
    /// the consumer except `REJECTED` for adds that created nothing.
    pub fn handle(&mut self, command: Command) {
        match command {
            Command::Init { world, handoff } => {
                self.init(world, &handoff);
                return;
            }
            Command::Shutdown => {
                tracing::info!("shutdown requested");
                self.phase = Phase::Stopped;
                return;
            }
            Command::Unknown => {
                tracing::warn!("unknown command kind dropped");
                self.stats.commands_dropped += 1;
                return;
            }
            _ => {}
        }

        let Some(context) = self.context.as_mut() else {
            tracing::error!(kind = command.kind(), "command received before INIT, dropped");
            self.stats.commands_dropped += 1;
            return;
        };
        let engine = &mut self.engine;
        self.stats.commands_applied += 1;

        let rejected = match command {
            Command::AddRigidBody {
                id,
                initial_transform,
                shape,
                config,
            } => context
                .add_rigid_body(engine, id.clone(), &initial_transform, &shape, &config)
                .err()
                .map(|reason| (id, reason)),
            Command::UpdateRigidBody { id, config } => {
                if !context.update_rigid_body(engine, &id, &config) {
                    tracing::debug!(%id, "update for unknown body ignored");
                }
                None
            }
            Command::RemoveRigidBody { id } => {
                if !context.remove_rigid_body(engine, &id) {
                    tracing::debug!(%id, "remove for unknown body ignored");
                }
                None
            }
            Command::AddSoftBody { id, buffers, config } => context
                .add_soft_body(engine, id.clone(), &buffers, &config)
                .err()
                .map(|reason| (id, reason)),
            Command::RemoveSoftBody { id } => {
                if !context.remove_soft_body(engine, &id) {
                    tracing::debug!(%id, "remove for unknown soft body ignored");
                }
                None
            }
            Command::AddConstraint {
                id,
                body_a,
                body_b,
                config,
            } => context
                .add_constraint(engine, id.clone(), &body_a, body_b.as_ref(), &config)
                .err()
                .map(|reason| (id, reason)),
            Command::RemoveConstraint { id } => {
                if !context.remove_constraint(engine, &id) {
                    tracing::debug!(%id, "remove for unknown constraint ignored");
                }
                None
            }
            Command::SetMotionState {
                id,
                position,
                rotation,
            } => {
                if let Some(body) = context.body_handle(&id) {
                    engine.set_motion_state(body, position, rotation);
                }
                None
            }
            Command::SetLinearVelocity { id, velocity } => {
                if let Some(body) = context.body_handle(&id) {
                    engine.set_linear_velocity(body, velocity);
                }
                None
            }
            Command::ApplyImpulse {
                id,
                impulse,
                offset,
            } => {
                if let Some(body) = context.body_handle(&id) {
                    engine.apply_impulse(body, impulse, offset);
                }
                None
            }
            Command::ApplyForce { id, force, offset } => {
                if let Some(body) = context.body_handle(&id) {
                    engine.apply_force(body, force, offset);
                }
                None
            }
            Command::EnableDebug { enabled } => {
                context.set_debug(enabled);
                None
            }
            Command::ResetDynamicBody { id } => {
                if let Some(body) = context.body_handle(&id) {
                    engine.reset_dynamic_body(body);
                }
                None
            }
            Command::ActivateBody { id } => {
                if let Some(body) = context.body_handle(&id) {
                    engine.activate(body);
                }
                None
            }
            Command::RaycastRequest {
                request_id,
                from,
                to,
                multiple,
                filter_group,
                filter_mask,
            } => {
                let query = RayQuery {
                    from,
                    to,
                    multiple,
                    filter_group,
                    filter_mask,
                };
                let hits = context.raycast(&*engine, &query);
                self.emit(Event::RaycastResponse { request_id, hits });
                None
            }
            Command::Init { .. } | Command::Shutdown | Command::Unknown => None,
        };

        if let Some((id, reason)) = rejected {
            self.reject(id, reason);
        }
    }

    fn init(&mut self, world: WorldConfig, handoff: &HandoffDescriptor) {
        if self.phase != Phase::AwaitingInit {
            tracing::error!("duplicate INIT dropped");
            self.stats.commands_dropped += 1;
            return;
        }
        if handoff.protocol_version != PROTOCOL_VERSION {
            tracing::warn!(
                theirs = handoff.protocol_version,
                ours = PROTOCOL_VERSION,
                "protocol revision mismatch, unknown kinds will be dropped"
            );
        }
        let layout = self.handoff.layout();
        if handoff.mode != self.handoff.mode()
            || handoff.max_bodies != layout.max_bodies
            || handoff.debug_vertex_capacity != layout.debug_vertex_capacity
        {
            tracing::error!(
                ?handoff,
                ?layout,
                "INIT describes a different buffer than the one attached, dropped"
            );
            self.stats.commands_dropped += 1;
            return;
        }

        self.engine.init(&world);
        let mut context = SimulationContext::new(layout.max_bodies);
        if world.debug_draw {
            context.set_debug(true);
        }
        self.context = Some(context);
        self.world = world;
        self.phase = Phase::Running;
        self.last_step = Instant::now();
        self.ticks.restart();

        tracing::info!(
            max_bodies = layout.max_bodies,
            mode = ?handoff.mode,
            "simulation initialized"
        );
        self.emit(Event::Ready {
            max_bodies: layout.max_bodies,
        });
    }

    // =========================================================================
    // TICK
    // =========================================================================

    /// Runs one tick if the simulator owns the buffer.
    ///
    /// # Returns
    ///
    /// true if a snapshot was published; false if the consumer still holds
    /// the previous one or the session is not running.
    pub fn tick(&mut self) -> bool {
        if self.phase != Phase::Running {
            return false;
        }
        let Self {
            engine,
            handoff,
            context,
            world,
            started,
            last_step,
            ..
        } = self;
        let Some(context) = context.as_mut() else {
            return false;
        };

        let now = Instant::now();
        let delta = now.duration_since(*last_step).as_secs_f32();

        let published = handoff.produce(&mut |frame| {
            context.begin_tick(engine, frame);

            let step_start = Instant::now();
            let debug = frame.debug_mut();
            let sink = if debug.is_enabled() {
                Some(debug as &mut dyn DebugSink)
            } else {
                None
            };
            let sub_steps = engine.step(delta, world.max_sub_steps, world.fixed_time_step, sink);
            let step_duration = step_start.elapsed();

            context.write_snapshot(&*engine, frame);
            frame.set_telemetry(Telemetry {
                step_duration_ms: step_duration.as_secs_f32() * 1000.0,
                step_timestamp: now.duration_since(*started).as_secs_f32(),
                sub_steps,
            });
        });

        if published {
            *last_step = now;
            self.stats.snapshots_published += 1;
        } else {
            tracing::trace!("buffer still in flight, tick skipped");
            self.ticks.record_skip();
        }
        published
    }

    /// Runs until `SHUTDOWN` or until the consumer goes away.
    pub fn run(&mut self) {
        tracing::info!(
            tick_us = self.ticks.tick_duration().as_micros(),
            mode = ?self.handoff.mode(),
            "simulation loop started"
        );

        while self.phase != Phase::Stopped {
            if self.phase == Phase::AwaitingInit {
                // No clock to keep until INIT; park on the channel
                self.wait_for_command(self.ticks.tick_duration());
                continue;
            }
            self.pump_commands();
            if self.phase == Phase::Running && self.ticks.should_tick() {
                let start = self.ticks.begin_tick();
                self.tick();
                self.ticks.end_tick(start);
            }
            if self.phase != Phase::Stopped {
                self.ticks.wait_for_next_tick();
            }
        }

        let ticks = self.ticks.stats();
        tracing::info!(
            snapshots = self.stats.snapshots_published,
            skipped = ticks.skipped_ticks,
            late = ticks.late_ticks,
            "simulation loop stopped"
        );
    }
}
