//! # Consumer Driver
//!
//! ## Frame Order (once per render frame)
//!
//! ```text
//! 1. Pump events: READY, REJECTED, RAYCAST_RESPONSE
//! 2. No snapshot waiting?  -> nothing to copy, done (back-pressure)
//! 3. Roster changed?       -> rebuild the id <-> slot cache
//! 4. Dynamic bodies:       slot -> parent-space position/rotation -> scene
//!    Static/kinematic:     scene world transform -> slot
//! 5. Soft bodies:          vertex/normal arrays -> scene meshes
//! 6. Debug lines:          cursor > 0 -> scene, rewind cursor
//! 7. Release (READY -> CONSUMED)
//! ```

use std::collections::HashMap;

use crossbeam_channel::{Receiver, TryRecvError};
use tandem_core::{
    ConsumerHandoff, FrameBuffer, RosterEntry, Slot, Telemetry, MAX_COLLISIONS, NO_COLLISION,
};
use tandem_shared::{Command, EntityId, Event, RaycastHit, RejectReason, RequestId};

use crate::channel::{CommandSender, ConsumerLink, PendingRequests, RequestTicket};
use crate::error::ChannelResult;
use crate::traits::{RayQuery, SceneGraph};

/// What one call to [`ConsumerDriver::frame`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameReport {
    /// A snapshot was read and released.
    pub consumed: bool,
    /// Dynamic bodies whose transform went to the scene.
    pub bodies_read: u32,
    /// Static/kinematic bodies whose transform went to the buffer.
    pub bodies_written: u32,
    /// Soft-body meshes copied.
    pub soft_bodies: u32,
    /// Debug line vertices copied.
    pub debug_vertices: u32,
    /// Telemetry of the snapshot read.
    pub telemetry: Option<Telemetry>,
}

/// Frame counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Calls to `frame`.
    pub frames: u64,
    /// Frames that found a snapshot.
    pub snapshots_read: u64,
    /// Structural adds the simulator rejected.
    pub rejections: u64,
}

/// Ids and slots of the last snapshot read, plus its collision words.
#[derive(Default)]
struct RosterCache {
    generation: u64,
    entries: Vec<RosterEntry>,
    by_id: HashMap<EntityId, usize>,
    by_slot: HashMap<Slot, usize>,
    /// `MAX_COLLISIONS` words per entry, in entry order.
    collisions: Vec<i32>,
}

impl RosterCache {
    fn sync(&mut self, frame: &FrameBuffer) {
        let roster = frame.roster();
        if roster.generation() == self.generation {
            return;
        }
        self.generation = roster.generation();
        self.entries.clear();
        self.entries.extend_from_slice(roster.entries());
        self.by_id.clear();
        self.by_slot.clear();
        for (index, entry) in self.entries.iter().enumerate() {
            self.by_id.insert(entry.id.clone(), index);
            self.by_slot.insert(entry.slot, index);
        }
        self.collisions.clear();
        self.collisions.resize(self.entries.len() * MAX_COLLISIONS, NO_COLLISION);
    }
}

/// Runs in the render context; never blocks on the simulator.
pub struct ConsumerDriver {
    commands: CommandSender,
    events: Receiver<Event>,
    handoff: Box<dyn ConsumerHandoff>,
    raycasts: PendingRequests<Vec<RaycastHit>>,
    /// Slot count announced by `READY`.
    max_bodies: Option<u32>,
    roster: RosterCache,
    telemetry: Telemetry,
    rejections: Vec<(EntityId, RejectReason)>,
    stats: ConsumerStats,
}

impl ConsumerDriver {
    /// Wraps the consumer ends of the channel and the handoff.
    #[must_use]
    pub fn new(link: ConsumerLink, handoff: Box<dyn ConsumerHandoff>) -> Self {
        Self {
            commands: link.commands,
            events: link.events,
            handoff,
            raycasts: PendingRequests::new(),
            max_bodies: None,
            roster: RosterCache::default(),
            telemetry: Telemetry::default(),
            rejections: Vec::new(),
            stats: ConsumerStats::default(),
        }
    }

    /// Returns true once the simulator answered `READY`.
    #[inline]
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.max_bodies.is_some()
    }

    /// Slot count announced by `READY`.
    #[inline]
    #[must_use]
    pub const fn max_bodies(&self) -> Option<u32> {
        self.max_bodies
    }

    /// Telemetry of the last snapshot read.
    #[inline]
    #[must_use]
    pub const fn telemetry(&self) -> Telemetry {
        self.telemetry
    }

    /// Frame counters.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    /// Live bodies as of the last snapshot read.
    #[must_use]
    pub fn roster(&self) -> &[RosterEntry] {
        &self.roster.entries
    }

    /// Raycasts still waiting for a reply.
    #[must_use]
    pub fn pending_raycasts(&self) -> usize {
        self.raycasts.len()
    }

    /// Rejections received since the last call.
    pub fn take_rejections(&mut self) -> Vec<(EntityId, RejectReason)> {
        std::mem::take(&mut self.rejections)
    }

    /// Bodies touching `id` in the last snapshot read.
    ///
    /// Empty if `id` was not live in that snapshot.
    #[must_use]
    pub fn collisions_of(&self, id: &EntityId) -> Vec<EntityId> {
        let Some(&index) = self.roster.by_id.get(id) else {
            return Vec::new();
        };
        self.roster.collisions[index * MAX_COLLISIONS..(index + 1) * MAX_COLLISIONS]
            .iter()
            .take_while(|&&word| word != NO_COLLISION)
            .filter_map(|&word| {
                let slot = Slot::new(u32::try_from(word).ok()?);
                let other = *self.roster.by_slot.get(&slot)?;
                Some(self.roster.entries[other].id.clone())
            })
            .collect()
    }

    // =========================================================================
    // OUTGOING
    // =========================================================================

    /// Sends a structural or one-shot command.
    ///
    /// Commands issued before `READY` are held and sent in order once it
    /// arrives.
    ///
    /// # Errors
    ///
    /// [`crate::ChannelError::Disconnected`] if the simulator is gone.
    pub fn send(&mut self, command: Command) -> ChannelResult<()> {
        self.commands.send(command)
    }

    /// Casts a ray; the reply arrives through the returned ticket once a
    /// later [`Self::frame`] or [`Self::pump_events`] picks it up.
    ///
    /// # Errors
    ///
    /// [`crate::ChannelError::Disconnected`] if the simulator is gone.
    pub fn raycast(&mut self, query: RayQuery) -> ChannelResult<RequestTicket<Vec<RaycastHit>>> {
        let ticket = self.raycasts.ticket();
        self.send_raycast(ticket.id(), query)?;
        Ok(ticket)
    }

    /// Casts a ray and runs `on_reply` with the hits when they arrive.
    ///
    /// # Errors
    ///
    /// [`crate::ChannelError::Disconnected`] if the simulator is gone.
    pub fn raycast_with(
        &mut self,
        query: RayQuery,
        on_reply: impl FnOnce(Vec<RaycastHit>) + Send + 'static,
    ) -> ChannelResult<RequestId> {
        let id = self.raycasts.issue(on_reply);
        self.send_raycast(id, query)?;
        Ok(id)
    }

    fn send_raycast(&mut self, request_id: RequestId, query: RayQuery) -> ChannelResult<()> {
        let sent = self.commands.send(Command::RaycastRequest {
            request_id,
            from: query.from,
            to: query.to,
            multiple: query.multiple,
            filter_group: query.filter_group,
            filter_mask: query.filter_mask,
        });
        if sent.is_err() {
            self.raycasts.abandon(request_id);
        }
        sent
    }

    /// Asks the simulator to stop.
    ///
    /// # Errors
    ///
    /// [`crate::ChannelError::Disconnected`] if it already has.
    pub fn shutdown(&mut self) -> ChannelResult<()> {
        self.commands.send(Command::Shutdown)
    }

    // =========================================================================
    // INCOMING
    // =========================================================================

    /// Handles every event received so far.
    pub fn pump_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.handle(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::debug!("simulator event channel closed");
                    break;
                }
            }
        }
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Ready { max_bodies } => {
                if self.max_bodies.is_some() {
                    tracing::error!("duplicate READY ignored");
                    return;
                }
                tracing::info!(max_bodies, "simulator ready");
                self.max_bodies = Some(max_bodies);
                if let Err(err) = self.commands.mark_ready() {
                    tracing::error!(%err, "failed to flush commands held before READY");
                }
            }
            Event::Rejected { id, reason } => {
                tracing::warn!(%id, ?reason, "simulator rejected entity");
                self.stats.rejections += 1;
                self.rejections.push((id, reason));
            }
            Event::RaycastResponse { request_id, hits } => {
                self.raycasts.resolve(request_id, hits);
            }
            Event::Unknown => {
                tracing::warn!("unknown event kind dropped");
            }
        }
    }

    // =========================================================================
    // FRAME
    // =========================================================================

    /// Runs one render frame against `scene`.
    ///
    /// A frame without a waiting snapshot copies nothing; that is normal
    /// back-pressure.
    pub fn frame<S: SceneGraph + ?Sized>(&mut self, scene: &mut S) -> FrameReport {
        self.pump_events();
        self.stats.frames += 1;

        let mut report = FrameReport::default();
        let roster = &mut self.roster;

        report.consumed = self.handoff.consume(&mut |frame| {
            roster.sync(frame);

            for (index, entry) in roster.entries.iter().enumerate() {
                if entry.kind.is_simulated() {
                    let Some(record) = frame.body(entry.slot) else {
                        continue;
                    };
                    let mut matrix = record.matrix();
                    if let Some(parent) = scene.parent_world_matrix(&entry.id) {
                        matrix = parent.inverse() * matrix;
                    }
                    let (_, rotation, position) = matrix.to_scale_rotation_translation();
                    scene.set_local_transform(&entry.id, position, rotation);
                    report.bodies_read += 1;
                } else if let Some(world) = scene.world_matrix(&entry.id) {
                    if let Some(mut record) = frame.body_mut(entry.slot) {
                        record.set_matrix(&world);
                        report.bodies_written += 1;
                    }
                }

                if let Some(record) = frame.body(entry.slot) {
                    roster.collisions[index * MAX_COLLISIONS..(index + 1) * MAX_COLLISIONS]
                        .copy_from_slice(record.collision_words());
                }
            }

            for (id, soft_body) in frame.soft_bodies() {
                scene.update_soft_body_mesh(id, soft_body.vertices(), soft_body.normals());
                report.soft_bodies += 1;
            }

            let debug = frame.debug_mut();
            if debug.cursor() > 0 {
                scene.update_debug_lines(debug.vertices(), debug.colors(), debug.cursor());
                report.debug_vertices = debug.cursor();
                debug.reset();
            }

            report.telemetry = Some(frame.telemetry());
        });

        if let Some(telemetry) = report.telemetry {
            self.telemetry = telemetry;
            self.stats.snapshots_read += 1;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;
    use crate::simulation::SimulationDriver;
    use crate::traits::{MockNode, MockPhysicsEngine, MockSceneGraph};
    use tandem_core::{handoff, FrameLayout};
    use tandem_shared::{
        BodyConfig, BodyKind, HandoffDescriptor, HandoffMode, Mat4, Quat, ShapeDescriptor,
        SoftBodyBuffers, SoftBodyConfig, Vec3, WorldConfig, PROTOCOL_VERSION,
    };

    struct Rig {
        consumer: ConsumerDriver,
        simulator: SimulationDriver<MockPhysicsEngine>,
        scene: MockSceneGraph,
    }

    impl Rig {
        fn new(mode: HandoffMode, max_bodies: u32) -> Self {
            let pair = handoff::open(mode, FrameLayout::new(max_bodies, 64));
            let (consumer_link, simulator_link) = channel::link();
            let mut consumer = ConsumerDriver::new(consumer_link, pair.consumer);
            consumer
                .send(Command::Init {
                    world: WorldConfig::default(),
                    handoff: HandoffDescriptor {
                        mode,
                        max_bodies,
                        debug_vertex_capacity: 64,
                        protocol_version: PROTOCOL_VERSION,
                    },
                })
                .unwrap();
            Self {
                consumer,
                simulator: SimulationDriver::new(MockPhysicsEngine::new(), simulator_link, pair.simulator, 60),
                scene: MockSceneGraph::new(),
            }
        }

        /// Simulator turn, then consumer turn.
        fn round(&mut self) -> FrameReport {
            self.simulator.pump_commands();
            self.simulator.tick();
            self.consumer.frame(&mut self.scene)
        }

        /// INIT, READY and the flush of everything sent before READY.
        fn handshake(&mut self) {
            self.simulator.pump_commands();
            self.consumer.pump_events();
            assert!(self.consumer.is_ready());
        }
    }

    fn add(name: &str, at: Vec3, kind: BodyKind) -> Command {
        Command::AddRigidBody {
            id: EntityId::new(name),
            initial_transform: Mat4::from_translation(at),
            shape: ShapeDescriptor::Sphere { radius: 0.5 },
            config: BodyConfig {
                kind,
                ..BodyConfig::default()
            },
        }
    }

    #[test]
    fn test_commands_before_ready_arrive_after_it() {
        for mode in [HandoffMode::SharedMemory, HandoffMode::Transfer] {
            let mut rig = Rig::new(mode, 4);
            rig.consumer.send(add("a", Vec3::new(0.0, 5.0, 0.0), BodyKind::Dynamic)).unwrap();
            assert!(!rig.consumer.is_ready());

            rig.handshake();
            assert_eq!(rig.consumer.max_bodies(), Some(4));

            let report = rig.round();
            assert!(report.consumed, "{mode:?}");
            assert_eq!(report.bodies_read, 1);
            assert_eq!(rig.consumer.roster().len(), 1);
            assert_eq!(rig.consumer.roster()[0].id, EntityId::new("a"));
        }
    }

    #[test]
    fn test_frame_without_snapshot_copies_nothing() {
        let mut rig = Rig::new(HandoffMode::SharedMemory, 4);
        rig.handshake();
        assert!(rig.round().consumed);

        let report = rig.consumer.frame(&mut rig.scene);
        assert_eq!(report, FrameReport::default());
        assert_eq!(rig.consumer.stats().frames, 2);
        assert_eq!(rig.consumer.stats().snapshots_read, 1);
    }

    #[test]
    fn test_dynamic_transform_lands_in_parent_space() {
        let mut rig = Rig::new(HandoffMode::SharedMemory, 4);
        let id = EntityId::new("crate");
        rig.scene.insert(
            id.clone(),
            MockNode {
                parent: Some(Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0))),
                ..MockNode::default()
            },
        );
        rig.consumer.send(add("crate", Vec3::new(10.0, 5.0, 0.0), BodyKind::Dynamic)).unwrap();
        rig.handshake();
        rig.round();

        let node = rig.scene.node(&id).unwrap();
        assert!(node.position.x.abs() < 1e-4);
        assert!(node.position.y > 4.9 && node.position.y <= 5.0);
        assert!(node.rotation.abs_diff_eq(Quat::IDENTITY, 1e-5));
    }

    #[test]
    fn test_kinematic_transform_flows_back_to_engine() {
        let mut rig = Rig::new(HandoffMode::Transfer, 4);
        let id = EntityId::new("platform");
        rig.scene.insert(
            id.clone(),
            MockNode {
                position: Vec3::new(1.0, 2.0, 3.0),
                ..MockNode::default()
            },
        );
        rig.consumer.send(add("platform", Vec3::new(0.0, 5.0, 0.0), BodyKind::Kinematic)).unwrap();
        rig.handshake();

        let report = rig.round();
        assert_eq!(report.bodies_read, 0);
        assert_eq!(report.bodies_written, 1);

        // Next owned tick pushes the scene transform into the engine
        rig.round();
        let handle = rig.simulator.context().unwrap().body_handle(&id).unwrap();
        let position = rig.simulator.engine().position(handle).unwrap();
        assert!(position.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-5));
        // The scene object itself is never moved by the simulator
        assert_eq!(rig.scene.node(&id).unwrap().position, Vec3::new(1.0, 2.0, 3.0));

        // The consumer moves the object; the engine follows a turn later
        rig.scene.node_mut(&id).unwrap().position = Vec3::new(-4.0, 2.0, 0.0);
        rig.round();
        rig.round();
        let position = rig.simulator.engine().position(handle).unwrap();
        assert!(position.abs_diff_eq(Vec3::new(-4.0, 2.0, 0.0), 1e-5));
    }

    #[test]
    fn test_collisions_resolve_to_ids() {
        let mut rig = Rig::new(HandoffMode::SharedMemory, 4);
        rig.consumer.send(add("a", Vec3::new(0.0, 5.0, 0.0), BodyKind::Dynamic)).unwrap();
        rig.consumer.send(add("b", Vec3::new(0.0, 5.5, 0.0), BodyKind::Dynamic)).unwrap();
        rig.consumer.send(add("far", Vec3::new(20.0, 5.0, 0.0), BodyKind::Dynamic)).unwrap();
        rig.handshake();
        rig.round();

        assert_eq!(rig.consumer.collisions_of(&EntityId::new("a")), vec![EntityId::new("b")]);
        assert_eq!(rig.consumer.collisions_of(&EntityId::new("b")), vec![EntityId::new("a")]);
        assert!(rig.consumer.collisions_of(&EntityId::new("far")).is_empty());
        assert!(rig.consumer.collisions_of(&EntityId::new("ghost")).is_empty());
    }

    #[test]
    fn test_raycast_replies_match_their_requests() {
        let mut rig = Rig::new(HandoffMode::SharedMemory, 4);
        rig.consumer.send(add("target", Vec3::new(0.0, 5.0, 0.0), BodyKind::Static)).unwrap();
        rig.handshake();
        rig.round();

        let mut hit = rig
            .consumer
            .raycast(RayQuery::closest(Vec3::new(0.0, 20.0, 0.0), Vec3::new(0.0, -20.0, 0.0)))
            .unwrap();
        let mut miss = rig
            .consumer
            .raycast(RayQuery::closest(Vec3::new(9.0, 20.0, 0.0), Vec3::new(9.0, -20.0, 0.0)))
            .unwrap();
        assert_ne!(hit.id(), miss.id());
        assert_eq!(rig.consumer.pending_raycasts(), 2);

        rig.round();
        assert_eq!(rig.consumer.pending_raycasts(), 0);

        let hits = hit.try_take().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, EntityId::new("target"));
        assert!((hits[0].point.y - 5.5).abs() < 1e-4);
        assert_eq!(miss.try_take(), Some(Vec::new()));
    }

    #[test]
    fn test_debug_lines_are_drained_once() {
        let mut rig = Rig::new(HandoffMode::SharedMemory, 4);
        rig.consumer.send(add("a", Vec3::new(0.0, 5.0, 0.0), BodyKind::Dynamic)).unwrap();
        rig.consumer.send(Command::EnableDebug { enabled: true }).unwrap();
        rig.handshake();

        let report = rig.round();
        assert_eq!(report.debug_vertices, 2);
        let (vertices, uploads) = rig.scene.debug_lines();
        // Only the valid range is handed over: 2 vertices, xyz each
        assert_eq!(vertices.len(), 6);
        assert_eq!(uploads, 1);

        // Same snapshot is not read twice
        assert_eq!(rig.consumer.frame(&mut rig.scene).debug_vertices, 0);
        assert_eq!(rig.scene.debug_lines().1, 1);
    }

    #[test]
    fn test_soft_body_meshes_reach_the_scene() {
        let mut rig = Rig::new(HandoffMode::Transfer, 4);
        let cloth = EntityId::new("cloth");
        rig.consumer
            .send(Command::AddSoftBody {
                id: cloth.clone(),
                buffers: SoftBodyBuffers {
                    vertices: vec![0.0, 2.0, 0.0],
                    normals: vec![0.0, 1.0, 0.0],
                    indices: Vec::new(),
                },
                config: SoftBodyConfig::default(),
            })
            .unwrap();
        rig.handshake();

        let report = rig.round();
        assert_eq!(report.soft_bodies, 1);
        assert_eq!(rig.simulator.engine().soft_body_count(), 1);
        let mesh = rig.scene.mesh(&cloth).unwrap();
        assert_eq!(mesh.vertices.len(), 3);
        assert!(mesh.vertices[1] <= 2.0);
        assert_eq!(mesh.normals, vec![0.0, 1.0, 0.0]);
        assert_eq!(mesh.uploads, 1);

        rig.consumer.send(Command::RemoveSoftBody { id: cloth.clone() }).unwrap();
        let report = rig.round();
        assert_eq!(report.soft_bodies, 0);
        assert_eq!(rig.simulator.engine().soft_body_count(), 0);
        assert_eq!(rig.scene.mesh(&cloth).unwrap().uploads, 1);
    }

    #[test]
    fn test_rejections_are_collected() {
        let mut rig = Rig::new(HandoffMode::SharedMemory, 1);
        rig.consumer.send(add("a", Vec3::ZERO, BodyKind::Dynamic)).unwrap();
        rig.consumer.send(add("b", Vec3::ZERO, BodyKind::Dynamic)).unwrap();
        rig.handshake();
        rig.round();

        let rejected = rig.consumer.take_rejections();
        assert_eq!(rejected, vec![(EntityId::new("b"), RejectReason::CapacityExceeded)]);
        assert!(rig.consumer.take_rejections().is_empty());
        assert_eq!(rig.consumer.stats().rejections, 1);
    }

    #[test]
    fn test_send_after_simulator_exit_fails() {
        let mut rig = Rig::new(HandoffMode::SharedMemory, 1);
        rig.handshake();
        let Rig { mut consumer, simulator, .. } = rig;
        drop(simulator);
        assert!(consumer.send(Command::ActivateBody { id: EntityId::new("a") }).is_err());
        assert_eq!(consumer.pending_raycasts(), 0);
        assert!(consumer
            .raycast(RayQuery::closest(Vec3::ZERO, Vec3::X))
            .is_err());
        assert_eq!(consumer.pending_raycasts(), 0);
    }
}
