//! Handoff strategy interface, mode probing, and pair construction.
//!
//! The drivers only ever see [`SimulatorHandoff`] and [`ConsumerHandoff`];
//! which strategy sits behind them is decided once in [`open`].

use tandem_shared::{HandoffMode, HandoffPreference};

use super::shared::SharedSimulatorHandoff;
use super::transfer::TransferSimulatorHandoff;
use crate::layout::{FrameBuffer, FrameLayout};

/// Simulator end of the buffer handoff.
pub trait SimulatorHandoff: Send {
    /// Strategy behind this end.
    fn mode(&self) -> HandoffMode;

    /// Layout of the buffer.
    fn layout(&self) -> FrameLayout;

    /// Writes one snapshot if the simulator currently owns the buffer.
    ///
    /// On ownership, runs `write`, then performs the `* -> READY`
    /// transition. Otherwise does nothing: the consumer has not caught up
    /// and the snapshot in flight must not be touched.
    ///
    /// # Returns
    ///
    /// true if `write` ran and the snapshot was published.
    fn produce(&mut self, write: &mut dyn FnMut(&mut FrameBuffer)) -> bool;
}

/// Consumer end of the buffer handoff.
pub trait ConsumerHandoff: Send {
    /// Strategy behind this end.
    fn mode(&self) -> HandoffMode;

    /// Layout of the buffer.
    fn layout(&self) -> FrameLayout;

    /// Reads the waiting snapshot, if any.
    ///
    /// On a `READY` buffer, runs `read`, then performs the
    /// `READY -> CONSUMED` transition. Otherwise does nothing; this is
    /// normal back-pressure.
    ///
    /// # Returns
    ///
    /// true if `read` ran and the buffer was released.
    fn consume(&mut self, read: &mut dyn FnMut(&mut FrameBuffer)) -> bool;
}

/// Both ends of one session's handoff.
pub struct HandoffPair {
    /// Goes to the simulation context.
    pub simulator: Box<dyn SimulatorHandoff>,
    /// Goes to the consumer context.
    pub consumer: Box<dyn ConsumerHandoff>,
}

/// Returns true if the host offers memory both contexts can write
/// concurrently with atomics.
///
/// Native targets always do. `wasm32` only does when built with the
/// `atomics` target feature (shared linear memory).
#[must_use]
pub const fn probe_shared_memory() -> bool {
    !cfg!(all(target_arch = "wasm32", not(target_feature = "atomics")))
}

/// Turns a configured preference into the session's mode.
///
/// A forced `SharedMemory` on a host without it falls back to `Transfer`.
#[must_use]
pub fn resolve(preference: HandoffPreference) -> HandoffMode {
    let shared = probe_shared_memory();
    match preference {
        HandoffPreference::Auto if shared => HandoffMode::SharedMemory,
        HandoffPreference::Auto | HandoffPreference::Transfer => HandoffMode::Transfer,
        HandoffPreference::SharedMemory if shared => HandoffMode::SharedMemory,
        HandoffPreference::SharedMemory => {
            tracing::warn!("shared memory requested but unavailable, using transfer handoff");
            HandoffMode::Transfer
        }
    }
}

/// Builds both ends of a handoff over one fresh buffer.
#[must_use]
pub fn open(mode: HandoffMode, layout: FrameLayout) -> HandoffPair {
    tracing::info!(
        ?mode,
        max_bodies = layout.max_bodies,
        debug_vertices = layout.debug_vertex_capacity,
        "opening buffer handoff"
    );

    match mode {
        HandoffMode::SharedMemory => {
            let (simulator, consumer) = SharedSimulatorHandoff::pair(layout);
            HandoffPair {
                simulator: Box::new(simulator),
                consumer: Box::new(consumer),
            }
        }
        HandoffMode::Transfer => {
            let (simulator, consumer) = TransferSimulatorHandoff::pair(layout);
            HandoffPair {
                simulator: Box::new(simulator),
                consumer: Box::new(consumer),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Telemetry;
    use crate::memory::Slot;
    use crate::sync::BufferState;

    const MODES: [HandoffMode; 2] = [HandoffMode::SharedMemory, HandoffMode::Transfer];

    fn stamp(sub_steps: u32) -> Telemetry {
        Telemetry {
            step_duration_ms: 1.0,
            step_timestamp: 0.0,
            sub_steps,
        }
    }

    #[test]
    fn test_native_host_has_shared_memory() {
        assert!(probe_shared_memory());
        assert_eq!(resolve(HandoffPreference::Auto), HandoffMode::SharedMemory);
        assert_eq!(resolve(HandoffPreference::Transfer), HandoffMode::Transfer);
    }

    #[test]
    fn test_consumer_sees_nothing_before_first_publish() {
        for mode in MODES {
            let mut pair = open(mode, FrameLayout::new(4, 0));
            assert_eq!(pair.consumer.mode(), mode);
            assert!(!pair.consumer.consume(&mut |_| panic!("no snapshot yet")));
        }
    }

    #[test]
    fn test_turns_alternate() {
        for mode in MODES {
            let mut pair = open(mode, FrameLayout::new(4, 0));
            let mut seen = Vec::new();

            for round in 1..=3 {
                assert!(pair.simulator.produce(&mut |frame| {
                    assert!(frame.state().unwrap().is_writable());
                    frame.set_telemetry(stamp(round));
                }));
                assert!(pair.consumer.consume(&mut |frame| {
                    assert_eq!(frame.state(), Ok(BufferState::Ready));
                    seen.push(frame.telemetry().sub_steps);
                }));
                // Released: nothing left to read
                assert!(!pair.consumer.consume(&mut |_| panic!("already consumed")));
            }
            assert_eq!(seen, vec![1, 2, 3], "{mode:?}");
        }
    }

    #[test]
    fn test_simulator_skips_while_snapshot_in_flight() {
        for mode in MODES {
            let mut pair = open(mode, FrameLayout::new(2, 0));

            // Snapshot N
            assert!(pair.simulator.produce(&mut |frame| {
                frame.body_mut(Slot::new(0)).unwrap().set_speeds(1.0, 1.0);
                frame.set_telemetry(stamp(1));
            }));

            // Consumer has not caught up: snapshot N+1 must not be written at all
            let mut wrote = false;
            assert!(!pair.simulator.produce(&mut |frame| {
                wrote = true;
                frame.body_mut(Slot::new(0)).unwrap().set_speeds(2.0, 2.0);
            }));
            assert!(!wrote);

            assert!(pair.consumer.consume(&mut |frame| {
                let body = frame.body(Slot::new(0)).unwrap();
                assert_eq!(body.linear_speed(), 1.0);
                assert_eq!(frame.telemetry().sub_steps, 1);
            }));

            // Released: the simulator writes again
            assert!(pair.simulator.produce(&mut |frame| {
                assert_eq!(frame.state(), Ok(BufferState::Consumed));
            }));
        }
    }

    #[test]
    fn test_consumer_writes_survive_the_round_trip() {
        // Kinematic transforms flow consumer -> simulator through the same buffer
        for mode in MODES {
            let mut pair = open(mode, FrameLayout::new(1, 0));
            assert!(pair.simulator.produce(&mut |_| {}));
            assert!(pair.consumer.consume(&mut |frame| {
                frame.body_mut(Slot::new(0)).unwrap().set_speeds(0.0, 7.0);
            }));
            assert!(pair.simulator.produce(&mut |frame| {
                assert_eq!(frame.body(Slot::new(0)).unwrap().angular_speed(), 7.0);
            }));
        }
    }
}
