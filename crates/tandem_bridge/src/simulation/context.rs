//! # Simulation Context
//!
//! Everything the simulator knows about live entities, owned by the
//! simulation driver and passed by reference. No globals.
//!
//! ```text
//! EntityId ──SlotAllocator──▶ Slot ──bodies[slot]──▶ BodyEntry { handle, config }
//!                               ▲
//! NativeHandle ──by_handle──────┘   (contacts and ray hits come back as handles)
//! ```

use std::collections::HashMap;

use tandem_core::{FrameBuffer, RosterEntry, Slot, SlotAllocator, SlotError};
use tandem_shared::{
    BodyConfig, BodyConfigPatch, ConstraintConfig, EntityId, Mat4, RaycastHit, RejectReason,
    ShapeDescriptor, SoftBodyBuffers, SoftBodyConfig,
};

use crate::traits::{NativeHandle, PhysicsEngine, RayQuery};

/// One live rigid body.
struct BodyEntry {
    handle: NativeHandle,
    config: BodyConfig,
    /// Transform to publish for a consumer-authored body before the
    /// consumer has written one of its own.
    seed: Option<Mat4>,
}

/// One live constraint and the bodies it joins.
struct ConstraintEntry {
    handle: NativeHandle,
    body_a: EntityId,
    body_b: Option<EntityId>,
}

impl ConstraintEntry {
    fn joins(&self, body: &EntityId) -> bool {
        self.body_a == *body || self.body_b.as_ref() == Some(body)
    }
}

/// Slot table, native handle arena and pending per-tick work.
pub struct SimulationContext {
    slots: SlotAllocator,
    /// Indexed by slot; Some exactly while the slot is allocated.
    bodies: Vec<Option<BodyEntry>>,
    by_handle: HashMap<NativeHandle, Slot>,
    soft_bodies: HashMap<EntityId, NativeHandle>,
    constraints: HashMap<EntityId, ConstraintEntry>,
    /// Live set changed since the roster was last published.
    roster_dirty: bool,
    /// Soft-body set changed since records were last pruned.
    soft_bodies_dirty: bool,
    /// Debug capture switch to apply on the next owned tick.
    debug_toggle: Option<bool>,
    /// Scratch: directed contact pairs, sorted by first slot.
    contacts: Vec<(Slot, Slot)>,
}

impl SimulationContext {
    /// Creates a context with `max_bodies` free slots.
    #[must_use]
    pub fn new(max_bodies: u32) -> Self {
        let mut bodies = Vec::new();
        bodies.resize_with(max_bodies as usize, || None);
        Self {
            slots: SlotAllocator::new(max_bodies),
            bodies,
            by_handle: HashMap::new(),
            soft_bodies: HashMap::new(),
            constraints: HashMap::new(),
            roster_dirty: true,
            soft_bodies_dirty: false,
            debug_toggle: None,
            contacts: Vec::new(),
        }
    }

    /// Number of live rigid bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.slots.len()
    }

    /// Slot owned by a rigid body.
    #[must_use]
    pub fn slot_of(&self, id: &EntityId) -> Option<Slot> {
        self.slots.slot_of(id)
    }

    /// Native handle of a rigid body.
    #[must_use]
    pub fn body_handle(&self, id: &EntityId) -> Option<NativeHandle> {
        let slot = self.slots.slot_of(id)?;
        self.bodies[slot.as_usize()].as_ref().map(|entry| entry.handle)
    }

    /// Identifier of the rigid body behind a native handle.
    #[must_use]
    pub fn entity_of(&self, handle: NativeHandle) -> Option<&EntityId> {
        self.slots.owner_of(*self.by_handle.get(&handle)?)
    }

    fn is_taken(&self, id: &EntityId) -> bool {
        self.slots.slot_of(id).is_some()
            || self.soft_bodies.contains_key(id)
            || self.constraints.contains_key(id)
    }

    // =========================================================================
    // STRUCTURAL COMMANDS
    // =========================================================================

    /// Creates a rigid body and assigns it a slot.
    ///
    /// # Errors
    ///
    /// The reason nothing was created. The engine and the slot table are
    /// unchanged in every error case.
    pub fn add_rigid_body<E: PhysicsEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        id: EntityId,
        transform: &Mat4,
        shape: &ShapeDescriptor,
        config: &BodyConfig,
    ) -> Result<Slot, RejectReason> {
        if self.is_taken(&id) {
            return Err(RejectReason::DuplicateId);
        }
        if self.slots.is_full() {
            return Err(RejectReason::CapacityExceeded);
        }

        let handle = engine
            .add_rigid_body(transform, shape, config)
            .map_err(|err| RejectReason::EngineRefused(err.to_string()))?;

        let slot = match self.slots.allocate(id) {
            Ok(slot) => slot,
            Err(err) => {
                engine.remove_rigid_body(handle);
                return Err(match err {
                    SlotError::CapacityExceeded { .. } => RejectReason::CapacityExceeded,
                    SlotError::AlreadyAllocated(_) => RejectReason::DuplicateId,
                });
            }
        };

        self.bodies[slot.as_usize()] = Some(BodyEntry {
            handle,
            config: config.clone(),
            seed: (!config.kind.is_simulated()).then_some(*transform),
        });
        self.by_handle.insert(handle, slot);
        self.roster_dirty = true;
        Ok(slot)
    }

    /// Applies a partial configuration. Unknown ids are a no-op.
    pub fn update_rigid_body<E: PhysicsEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        id: &EntityId,
        patch: &BodyConfigPatch,
    ) -> bool {
        let Some(slot) = self.slots.slot_of(id) else {
            return false;
        };
        let Some(entry) = self.bodies[slot.as_usize()].as_mut() else {
            return false;
        };

        let was_simulated = entry.config.kind.is_simulated();
        entry.config.apply(patch);
        engine.update_rigid_body(entry.handle, &entry.config);

        if entry.config.kind.is_simulated() != was_simulated {
            if !entry.config.kind.is_simulated() {
                // Publish where the engine left it until the consumer writes
                entry.seed = Some(engine.transform(entry.handle));
            }
            self.roster_dirty = true;
        } else if patch.kind.is_some() {
            self.roster_dirty = true;
        }
        true
    }

    /// Destroys a rigid body and frees its slot. Unknown ids are a no-op.
    ///
    /// Constraints attached to the body are destroyed first.
    pub fn remove_rigid_body<E: PhysicsEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        id: &EntityId,
    ) -> bool {
        let Some(slot) = self.slots.free(id) else {
            return false;
        };
        self.constraints.retain(|constraint, entry| {
            if !entry.joins(id) {
                return true;
            }
            tracing::debug!(%constraint, body = %id, "constraint removed with its body");
            engine.remove_constraint(entry.handle);
            false
        });
        if let Some(entry) = self.bodies[slot.as_usize()].take() {
            self.by_handle.remove(&entry.handle);
            engine.remove_rigid_body(entry.handle);
        }
        self.roster_dirty = true;
        true
    }

    /// Creates a soft body.
    ///
    /// # Errors
    ///
    /// The reason nothing was created.
    pub fn add_soft_body<E: PhysicsEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        id: EntityId,
        buffers: &SoftBodyBuffers,
        config: &SoftBodyConfig,
    ) -> Result<(), RejectReason> {
        if self.is_taken(&id) {
            return Err(RejectReason::DuplicateId);
        }
        let handle = engine
            .add_soft_body(buffers, config)
            .map_err(|err| RejectReason::EngineRefused(err.to_string()))?;
        self.soft_bodies.insert(id, handle);
        self.soft_bodies_dirty = true;
        Ok(())
    }

    /// Destroys a soft body. Unknown ids are a no-op.
    pub fn remove_soft_body<E: PhysicsEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        id: &EntityId,
    ) -> bool {
        let Some(handle) = self.soft_bodies.remove(id) else {
            return false;
        };
        engine.remove_soft_body(handle);
        self.soft_bodies_dirty = true;
        true
    }

    /// Joins two rigid bodies, or one to the world.
    ///
    /// # Errors
    ///
    /// [`RejectReason::MissingBody`] if either body is not live (yet).
    pub fn add_constraint<E: PhysicsEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        id: EntityId,
        body_a: &EntityId,
        body_b: Option<&EntityId>,
        config: &ConstraintConfig,
    ) -> Result<(), RejectReason> {
        if self.is_taken(&id) {
            return Err(RejectReason::DuplicateId);
        }
        let resolve = |body: &EntityId| {
            self.body_handle(body)
                .ok_or_else(|| RejectReason::MissingBody(body.clone()))
        };
        let a = resolve(body_a)?;
        let b = body_b.map(resolve).transpose()?;

        let handle = engine
            .add_constraint(a, b, config)
            .map_err(|err| RejectReason::EngineRefused(err.to_string()))?;
        self.constraints.insert(
            id,
            ConstraintEntry {
                handle,
                body_a: body_a.clone(),
                body_b: body_b.cloned(),
            },
        );
        Ok(())
    }

    /// Destroys a constraint. Unknown ids are a no-op.
    pub fn remove_constraint<E: PhysicsEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        id: &EntityId,
    ) -> bool {
        let Some(entry) = self.constraints.remove(id) else {
            return false;
        };
        engine.remove_constraint(entry.handle);
        true
    }

    /// Schedules a debug capture switch for the next owned tick.
    pub fn set_debug(&mut self, enabled: bool) {
        self.debug_toggle = Some(enabled);
    }

    /// Runs a ray query and names the hit bodies.
    ///
    /// Hits on objects without a slot (soft bodies, bodies removed in the
    /// meantime) are left out.
    pub fn raycast<E: PhysicsEngine + ?Sized>(&self, engine: &E, query: &RayQuery) -> Vec<RaycastHit> {
        engine
            .raycast(query)
            .into_iter()
            .filter_map(|hit| {
                Some(RaycastHit {
                    id: self.entity_of(hit.body)?.clone(),
                    point: hit.point,
                    normal: hit.normal,
                })
            })
            .collect()
    }

    // =========================================================================
    // PER-TICK WORK (buffer owned)
    // =========================================================================

    /// Start of an owned tick: applies the pending debug switch, rewinds the
    /// debug cursor and pushes consumer-authored transforms into the engine.
    pub fn begin_tick<E: PhysicsEngine + ?Sized>(&mut self, engine: &mut E, frame: &mut FrameBuffer) {
        if let Some(enabled) = self.debug_toggle.take() {
            frame.debug_mut().set_enabled(enabled);
        }
        frame.debug_mut().reset();

        for (slot, _) in self.slots.iter() {
            let Some(entry) = self.bodies[slot.as_usize()].as_ref() else {
                continue;
            };
            if entry.config.kind.is_simulated() || entry.seed.is_some() {
                continue;
            }
            if let Some(record) = frame.body(slot) {
                engine.set_transform(entry.handle, &record.matrix());
            }
        }
    }

    /// End of an owned tick: writes every live slot, the roster and the
    /// soft-body records.
    ///
    /// Only slots still in the allocator are written, so a body removed by
    /// a command this tick is already gone from the snapshot.
    pub fn write_snapshot<E: PhysicsEngine + ?Sized>(&mut self, engine: &E, frame: &mut FrameBuffer) {
        self.collect_contacts(engine);

        for (slot, _) in self.slots.iter() {
            let Some(entry) = self.bodies[slot.as_usize()].as_mut() else {
                continue;
            };
            let Some(mut record) = frame.body_mut(slot) else {
                continue;
            };

            if entry.config.kind.is_simulated() {
                record.set_matrix(&engine.transform(entry.handle));
            } else if let Some(seed) = entry.seed.take() {
                record.set_matrix(&seed);
            }
            let (linear, angular) = engine.speeds(entry.handle);
            record.set_speeds(linear, angular);

            let start = self.contacts.partition_point(|&(owner, _)| owner < slot);
            record.set_collisions(
                self.contacts[start..]
                    .iter()
                    .take_while(|&&(owner, _)| owner == slot)
                    .map(|&(_, other)| other),
            );
        }

        if self.roster_dirty {
            let bodies = &self.bodies;
            frame
                .roster_mut()
                .replace(self.slots.iter().filter_map(|(slot, id)| {
                    bodies[slot.as_usize()].as_ref().map(|entry| RosterEntry {
                        id: id.clone(),
                        slot,
                        kind: entry.config.kind,
                    })
                }));
            self.roster_dirty = false;
        }

        if self.soft_bodies_dirty {
            let live = &self.soft_bodies;
            frame.retain_soft_bodies(|id| live.contains_key(id));
            self.soft_bodies_dirty = false;
        }
        for (id, &handle) in &self.soft_bodies {
            let (vertices, normals) = frame.soft_body_entry(id).arrays_mut();
            engine.soft_body_mesh(handle, vertices, normals);
        }
    }

    fn collect_contacts<E: PhysicsEngine + ?Sized>(&mut self, engine: &E) {
        let by_handle = &self.by_handle;
        let contacts = &mut self.contacts;
        contacts.clear();
        engine.for_each_contact(&mut |a, b| {
            // Pairs involving non-slot objects (ground, soft bodies) are not reported
            if let (Some(&a), Some(&b)) = (by_handle.get(&a), by_handle.get(&b)) {
                contacts.push((a, b));
                contacts.push((b, a));
            }
        });
        contacts.sort_unstable();
        contacts.dedup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockPhysicsEngine;
    use tandem_core::{FrameLayout, NO_COLLISION};
    use tandem_shared::{BodyKind, Vec3};

    fn sphere() -> ShapeDescriptor {
        ShapeDescriptor::Sphere { radius: 0.5 }
    }

    fn at(x: f32, y: f32) -> Mat4 {
        Mat4::from_translation(Vec3::new(x, y, 0.0))
    }

    fn id(name: &str) -> EntityId {
        EntityId::new(name)
    }

    fn add(ctx: &mut SimulationContext, engine: &mut MockPhysicsEngine, name: &str, x: f32) -> Slot {
        ctx.add_rigid_body(engine, id(name), &at(x, 5.0), &sphere(), &BodyConfig::default())
            .unwrap()
    }

    #[test]
    fn test_remove_twice_is_a_no_op() {
        let mut engine = MockPhysicsEngine::new();
        let mut ctx = SimulationContext::new(4);
        add(&mut ctx, &mut engine, "a", 0.0);

        assert!(ctx.remove_rigid_body(&mut engine, &id("a")));
        assert!(!ctx.remove_rigid_body(&mut engine, &id("a")));
        assert_eq!(ctx.body_count(), 0);
        assert_eq!(engine.body_count(), 0);
    }

    #[test]
    fn test_capacity_rejection_leaves_engine_untouched() {
        let mut engine = MockPhysicsEngine::new();
        let mut ctx = SimulationContext::new(2);
        add(&mut ctx, &mut engine, "a", 0.0);
        add(&mut ctx, &mut engine, "b", 2.0);

        let err = ctx
            .add_rigid_body(&mut engine, id("c"), &Mat4::IDENTITY, &sphere(), &BodyConfig::default())
            .unwrap_err();
        assert_eq!(err, RejectReason::CapacityExceeded);
        assert_eq!(engine.body_count(), 2);
        assert_eq!(ctx.slot_of(&id("c")), None);
    }

    #[test]
    fn test_ids_are_unique_across_entity_types() {
        let mut engine = MockPhysicsEngine::new();
        let mut ctx = SimulationContext::new(4);
        add(&mut ctx, &mut engine, "a", 0.0);

        assert_eq!(
            ctx.add_soft_body(&mut engine, id("a"), &SoftBodyBuffers::default(), &SoftBodyConfig::default()),
            Err(RejectReason::DuplicateId)
        );
        assert_eq!(
            ctx.add_rigid_body(&mut engine, id("a"), &Mat4::IDENTITY, &sphere(), &BodyConfig::default()),
            Err(RejectReason::DuplicateId)
        );
    }

    #[test]
    fn test_constraint_needs_live_bodies() {
        let mut engine = MockPhysicsEngine::new();
        let mut ctx = SimulationContext::new(4);
        add(&mut ctx, &mut engine, "a", 0.0);

        let config = ConstraintConfig::default();
        assert_eq!(
            ctx.add_constraint(&mut engine, id("hinge"), &id("a"), Some(&id("ghost")), &config),
            Err(RejectReason::MissingBody(id("ghost")))
        );
        assert!(ctx
            .add_constraint(&mut engine, id("pin"), &id("a"), None, &config)
            .is_ok());
        assert_eq!(engine.constraint_count(), 1);
        assert!(ctx.remove_constraint(&mut engine, &id("pin")));
        assert!(!ctx.remove_constraint(&mut engine, &id("pin")));
    }

    #[test]
    fn test_removing_a_body_removes_its_constraints() {
        let mut engine = MockPhysicsEngine::new();
        let mut ctx = SimulationContext::new(4);
        add(&mut ctx, &mut engine, "a", 0.0);
        add(&mut ctx, &mut engine, "b", 2.0);
        add(&mut ctx, &mut engine, "c", 4.0);

        let config = ConstraintConfig::default();
        ctx.add_constraint(&mut engine, id("ab"), &id("a"), Some(&id("b")), &config).unwrap();
        ctx.add_constraint(&mut engine, id("pin-b"), &id("b"), None, &config).unwrap();
        ctx.add_constraint(&mut engine, id("ac"), &id("a"), Some(&id("c")), &config).unwrap();

        assert!(ctx.remove_rigid_body(&mut engine, &id("b")));
        assert_eq!(engine.constraint_count(), 1);
        assert_eq!(engine.dangling_constraints(), 0);

        // Cascaded ids are free again; the survivor is untouched
        assert!(!ctx.remove_constraint(&mut engine, &id("ab")));
        assert!(ctx
            .add_constraint(&mut engine, id("pin-b"), &id("a"), None, &config)
            .is_ok());
        assert!(ctx.remove_constraint(&mut engine, &id("ac")));
        assert_eq!(engine.constraint_count(), 1);
    }

    #[test]
    fn test_snapshot_writes_live_slots_and_roster() {
        let mut engine = MockPhysicsEngine::new();
        let mut ctx = SimulationContext::new(4);
        let mut frame = FrameBuffer::new(FrameLayout::new(4, 0));

        let a = add(&mut ctx, &mut engine, "a", 0.0);
        let b = add(&mut ctx, &mut engine, "b", 0.8);
        let far = add(&mut ctx, &mut engine, "far", 10.0);
        engine.step(0.0, 1, 1.0 / 60.0, None);
        ctx.write_snapshot(&engine, &mut frame);

        let record = frame.body(a).unwrap();
        assert_eq!(record.matrix(), at(0.0, 5.0));
        assert_eq!(record.collisions().collect::<Vec<_>>(), vec![b]);
        assert_eq!(frame.body(b).unwrap().collisions().collect::<Vec<_>>(), vec![a]);
        assert!(frame
            .body(far)
            .unwrap()
            .collision_words()
            .iter()
            .all(|&w| w == NO_COLLISION));

        let roster = frame.roster();
        assert_eq!(roster.len(), 3);
        assert_eq!(roster.find(&id("b")).unwrap().slot, b);

        // Removal drops the body from the next snapshot's roster
        let generation = roster.generation();
        ctx.remove_rigid_body(&mut engine, &id("b"));
        ctx.write_snapshot(&engine, &mut frame);
        assert!(frame.roster().find(&id("b")).is_none());
        assert_eq!(frame.roster().generation(), generation + 1);

        // Unchanged live set: roster is not rewritten
        ctx.write_snapshot(&engine, &mut frame);
        assert_eq!(frame.roster().generation(), generation + 1);
    }

    #[test]
    fn test_kinematic_transform_flows_from_consumer() {
        let mut engine = MockPhysicsEngine::new();
        let mut ctx = SimulationContext::new(2);
        let mut frame = FrameBuffer::new(FrameLayout::new(2, 0));
        let config = BodyConfig {
            kind: BodyKind::Kinematic,
            ..BodyConfig::default()
        };
        let slot = ctx
            .add_rigid_body(&mut engine, id("platform"), &at(1.0, 1.0), &sphere(), &config)
            .unwrap();
        let handle = ctx.body_handle(&id("platform")).unwrap();

        // First owned tick publishes the initial transform
        ctx.begin_tick(&mut engine, &mut frame);
        ctx.write_snapshot(&engine, &mut frame);
        assert_eq!(frame.body(slot).unwrap().matrix(), at(1.0, 1.0));

        // Consumer moves it during its turn
        frame.body_mut(slot).unwrap().set_matrix(&at(3.0, 1.0));

        ctx.begin_tick(&mut engine, &mut frame);
        assert_eq!(engine.position(handle), Some(Vec3::new(3.0, 1.0, 0.0)));
        ctx.write_snapshot(&engine, &mut frame);
        // The simulator does not overwrite consumer-authored transforms
        assert_eq!(frame.body(slot).unwrap().matrix(), at(3.0, 1.0));
    }

    #[test]
    fn test_switching_to_kinematic_seeds_current_transform() {
        let mut engine = MockPhysicsEngine::new();
        let mut ctx = SimulationContext::new(2);
        let mut frame = FrameBuffer::new(FrameLayout::new(2, 0));
        let slot = add(&mut ctx, &mut engine, "a", 0.0);
        ctx.write_snapshot(&engine, &mut frame);

        let patch = BodyConfigPatch {
            kind: Some(BodyKind::Kinematic),
            ..BodyConfigPatch::default()
        };
        assert!(ctx.update_rigid_body(&mut engine, &id("a"), &patch));
        assert!(!ctx.update_rigid_body(&mut engine, &id("missing"), &patch));

        // Stale slot contents must not be pushed before the seed is published
        frame.body_mut(slot).unwrap().set_matrix(&at(9.0, 9.0));
        ctx.begin_tick(&mut engine, &mut frame);
        ctx.write_snapshot(&engine, &mut frame);
        assert_eq!(frame.body(slot).unwrap().matrix(), at(0.0, 5.0));
        assert_eq!(frame.roster().find(&id("a")).unwrap().kind, BodyKind::Kinematic);
    }

    #[test]
    fn test_soft_body_records_follow_live_set() {
        let mut engine = MockPhysicsEngine::new();
        let mut ctx = SimulationContext::new(1);
        let mut frame = FrameBuffer::new(FrameLayout::new(1, 0));
        let buffers = SoftBodyBuffers {
            vertices: vec![0.0, 2.0, 0.0],
            normals: vec![0.0, 1.0, 0.0],
            indices: vec![],
        };
        ctx.add_soft_body(&mut engine, id("cloth"), &buffers, &SoftBodyConfig::default())
            .unwrap();
        ctx.write_snapshot(&engine, &mut frame);
        assert_eq!(frame.soft_body(&id("cloth")).unwrap().vertices(), &[0.0, 2.0, 0.0]);

        assert!(ctx.remove_soft_body(&mut engine, &id("cloth")));
        ctx.write_snapshot(&engine, &mut frame);
        assert!(frame.soft_body(&id("cloth")).is_none());
    }

    #[test]
    fn test_debug_switch_applies_on_owned_tick() {
        let mut engine = MockPhysicsEngine::new();
        let mut ctx = SimulationContext::new(1);
        let mut frame = FrameBuffer::new(FrameLayout::new(1, 16));

        ctx.set_debug(true);
        assert!(!frame.debug().is_enabled());
        ctx.begin_tick(&mut engine, &mut frame);
        assert!(frame.debug().is_enabled());
        assert_eq!(frame.debug().cursor(), 0);
    }

    #[test]
    fn test_raycast_names_hit_bodies() {
        let mut engine = MockPhysicsEngine::new();
        let mut ctx = SimulationContext::new(2);
        add(&mut ctx, &mut engine, "target", 0.0);

        let hits = ctx.raycast(&engine, &RayQuery::closest(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id("target"));
    }
}
