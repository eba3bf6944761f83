//! # Integration Traits
//!
//! The physics engine and the scene graph are external collaborators. This
//! crate only defines what it needs from them.
//!
//! ```text
//! tandem_bridge defines:       an engine/renderer implements:
//! ┌────────────────────┐       ┌────────────────────┐
//! │ trait PhysicsEngine│ ◀──── │ impl PhysicsEngine │  (simulation context)
//! │ trait SceneGraph   │ ◀──── │ impl SceneGraph    │  (consumer context)
//! └────────────────────┘       └────────────────────┘
//! ```

use std::collections::{BTreeMap, HashMap};

use glam::{Mat4, Quat, Vec3};
use tandem_core::DebugSink;
use tandem_shared::{
    BodyConfig, BodyKind, ConstraintConfig, EntityId, ShapeDescriptor, SoftBodyBuffers,
    SoftBodyConfig, WorldConfig,
};

use crate::error::EngineError;

/// Opaque handle of a native engine object.
///
/// Only ever used as a lookup key; never dereferenced or offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NativeHandle(pub u64);

/// One hit reported by the engine's ray test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineHit {
    /// Body that was hit.
    pub body: NativeHandle,
    /// Hit point in world space.
    pub point: Vec3,
    /// Surface normal at the hit point.
    pub normal: Vec3,
}

/// Ray query parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayQuery {
    /// Ray origin.
    pub from: Vec3,
    /// Ray end.
    pub to: Vec3,
    /// Report every hit instead of the closest one.
    pub multiple: bool,
    /// Collision group of the ray.
    pub filter_group: u32,
    /// Groups the ray collides with.
    pub filter_mask: u32,
}

impl RayQuery {
    /// Closest-hit ray against every group.
    #[must_use]
    pub const fn closest(from: Vec3, to: Vec3) -> Self {
        Self {
            from,
            to,
            multiple: false,
            filter_group: 1,
            filter_mask: u32::MAX,
        }
    }
}

// ============================================================================
// PHYSICS ENGINE (simulation context)
// ============================================================================

/// A rigid/soft-body physics engine driven by the simulation context.
///
/// Building shapes, solving constraints and integrating motion all happen
/// behind this trait.
pub trait PhysicsEngine: Send {
    /// Configures the world. Called once, on `INIT`.
    fn init(&mut self, world: &WorldConfig);

    /// Advances by `delta` seconds in at most `max_sub_steps` steps of
    /// `fixed_step` seconds, streaming debug lines into `debug` if given.
    ///
    /// Returns the number of sub-steps actually taken.
    fn step(
        &mut self,
        delta: f32,
        max_sub_steps: u32,
        fixed_step: f32,
        debug: Option<&mut dyn DebugSink>,
    ) -> u32;

    /// Creates a rigid body from already-built geometry.
    ///
    /// # Errors
    ///
    /// [`EngineError`] if the engine refuses the shape or configuration.
    fn add_rigid_body(
        &mut self,
        transform: &Mat4,
        shape: &ShapeDescriptor,
        config: &BodyConfig,
    ) -> Result<NativeHandle, EngineError>;

    /// Applies a full configuration to an existing body.
    fn update_rigid_body(&mut self, body: NativeHandle, config: &BodyConfig);

    /// Destroys a rigid body.
    fn remove_rigid_body(&mut self, body: NativeHandle);

    /// Creates a soft body.
    ///
    /// # Errors
    ///
    /// [`EngineError`] if the mesh or configuration is refused.
    fn add_soft_body(
        &mut self,
        buffers: &SoftBodyBuffers,
        config: &SoftBodyConfig,
    ) -> Result<NativeHandle, EngineError>;

    /// Destroys a soft body.
    fn remove_soft_body(&mut self, body: NativeHandle);

    /// Copies the current soft-body mesh into the given arrays.
    fn soft_body_mesh(&self, body: NativeHandle, vertices: &mut Vec<f32>, normals: &mut Vec<f32>);

    /// Joins two bodies, or one body to the world.
    ///
    /// # Errors
    ///
    /// [`EngineError`] if the engine refuses the constraint.
    fn add_constraint(
        &mut self,
        body_a: NativeHandle,
        body_b: Option<NativeHandle>,
        config: &ConstraintConfig,
    ) -> Result<NativeHandle, EngineError>;

    /// Destroys a constraint.
    fn remove_constraint(&mut self, constraint: NativeHandle);

    /// Current world transform of a body.
    fn transform(&self, body: NativeHandle) -> Mat4;

    /// Overwrites a body's world transform.
    fn set_transform(&mut self, body: NativeHandle, transform: &Mat4);

    /// Linear and angular speed of a body.
    fn speeds(&self, body: NativeHandle) -> (f32, f32);

    /// Calls `visit` once per touching pair.
    fn for_each_contact(&self, visit: &mut dyn FnMut(NativeHandle, NativeHandle));

    /// Teleports a body; absent parts keep their current value.
    fn set_motion_state(&mut self, body: NativeHandle, position: Option<Vec3>, rotation: Option<Quat>);

    /// Overwrites linear velocity.
    fn set_linear_velocity(&mut self, body: NativeHandle, velocity: Vec3);

    /// Applies a one-shot impulse at `offset` from the center of mass.
    fn apply_impulse(&mut self, body: NativeHandle, impulse: Vec3, offset: Option<Vec3>);

    /// Applies a force for the next step at `offset` from the center of mass.
    fn apply_force(&mut self, body: NativeHandle, force: Vec3, offset: Option<Vec3>);

    /// Zeroes velocities and accumulated forces.
    fn reset_dynamic_body(&mut self, body: NativeHandle);

    /// Wakes a sleeping body.
    fn activate(&mut self, body: NativeHandle);

    /// Casts a ray; hits closest first.
    fn raycast(&self, query: &RayQuery) -> Vec<EngineHit>;
}

// ============================================================================
// SCENE GRAPH (consumer context)
// ============================================================================

/// The renderer's object graph, as seen by the consumer driver.
pub trait SceneGraph {
    /// World transform of the entity's object, or None if it has none.
    fn world_matrix(&self, id: &EntityId) -> Option<Mat4>;

    /// World transform of the object's parent; None for root objects.
    fn parent_world_matrix(&self, id: &EntityId) -> Option<Mat4>;

    /// Sets the object's parent-space position and rotation.
    fn set_local_transform(&mut self, id: &EntityId, position: Vec3, rotation: Quat);

    /// Copies a soft-body mesh and marks it dirty for upload.
    fn update_soft_body_mesh(&mut self, id: &EntityId, vertices: &[f32], normals: &[f32]);

    /// Copies debug lines, limits the draw range to `count` vertices and
    /// marks them dirty for upload.
    fn update_debug_lines(&mut self, vertices: &[f32], colors: &[f32], count: u32);
}

// ============================================================================
// MOCK IMPLEMENTATIONS (For Testing)
// ============================================================================

/// Below this speed a resting body falls asleep.
const SLEEP_SPEED: f32 = 0.01;

struct MockBody {
    kind: BodyKind,
    position: Vec3,
    rotation: Quat,
    linear: Vec3,
    angular: Vec3,
    force: Vec3,
    inverse_mass: f32,
    gravity: Option<Vec3>,
    linear_damping: f32,
    restitution: f32,
    radius: f32,
    group: u32,
    mask: u32,
    asleep: bool,
}

impl MockBody {
    fn matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    fn configure(&mut self, config: &BodyConfig) {
        self.kind = config.kind;
        self.inverse_mass = if config.kind.is_simulated() && config.mass > 0.0 {
            config.mass.recip()
        } else {
            0.0
        };
        self.gravity = config.gravity;
        self.linear_damping = config.linear_damping;
        self.restitution = config.restitution;
        self.group = config.collision_filter_group;
        self.mask = config.collision_filter_mask;
    }

    fn collides_with(&self, group: u32, mask: u32) -> bool {
        self.group & mask != 0 && group & self.mask != 0
    }
}

/// Bounding-sphere physics over a ground plane at `y = 0`.
///
/// Good enough to drive both contexts end to end; not a real solver.
pub struct MockPhysicsEngine {
    next_handle: u64,
    gravity: Vec3,
    accumulator: f32,
    bodies: BTreeMap<NativeHandle, MockBody>,
    soft_bodies: BTreeMap<NativeHandle, (Vec<f32>, Vec<f32>)>,
    constraints: BTreeMap<NativeHandle, (NativeHandle, Option<NativeHandle>)>,
    contacts: Vec<(NativeHandle, NativeHandle)>,
    steps_taken: u64,
}

impl MockPhysicsEngine {
    /// Creates an empty world with default gravity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            gravity: WorldConfig::default().gravity,
            accumulator: 0.0,
            bodies: BTreeMap::new(),
            soft_bodies: BTreeMap::new(),
            constraints: BTreeMap::new(),
            contacts: Vec::new(),
            steps_taken: 0,
        }
    }

    fn mint(&mut self) -> NativeHandle {
        let handle = NativeHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    /// Number of live rigid bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of live soft bodies.
    #[must_use]
    pub fn soft_body_count(&self) -> usize {
        self.soft_bodies.len()
    }

    /// Number of live constraints.
    #[must_use]
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Constraints naming a body that no longer exists.
    #[must_use]
    pub fn dangling_constraints(&self) -> usize {
        self.constraints
            .values()
            .filter(|(a, b)| {
                !self.bodies.contains_key(a) || b.is_some_and(|b| !self.bodies.contains_key(&b))
            })
            .count()
    }

    /// Total sub-steps integrated so far.
    #[must_use]
    pub const fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    /// Position of a body.
    #[must_use]
    pub fn position(&self, body: NativeHandle) -> Option<Vec3> {
        self.bodies.get(&body).map(|b| b.position)
    }

    /// Linear velocity of a body.
    #[must_use]
    pub fn linear_velocity(&self, body: NativeHandle) -> Option<Vec3> {
        self.bodies.get(&body).map(|b| b.linear)
    }

    /// Returns true if the body is asleep.
    #[must_use]
    pub fn is_asleep(&self, body: NativeHandle) -> bool {
        self.bodies.get(&body).is_some_and(|b| b.asleep)
    }

    fn integrate(&mut self, dt: f32) {
        let world_gravity = self.gravity;
        for body in self.bodies.values_mut() {
            if !body.kind.is_simulated() || body.asleep {
                continue;
            }
            let gravity = body.gravity.unwrap_or(world_gravity);
            body.linear += (gravity + body.force * body.inverse_mass) * dt;
            body.linear *= (1.0 - body.linear_damping * dt).max(0.0);
            body.position += body.linear * dt;
            body.rotation = (Quat::from_scaled_axis(body.angular * dt) * body.rotation).normalize();

            if body.position.y < body.radius {
                body.position.y = body.radius;
                if body.linear.y < 0.0 {
                    body.linear.y = -body.linear.y * body.restitution;
                }
                if body.linear.length() < SLEEP_SPEED && body.angular.length() < SLEEP_SPEED {
                    body.asleep = true;
                }
            }
        }

        for (vertices, _) in self.soft_bodies.values_mut() {
            for y in vertices.iter_mut().skip(1).step_by(3) {
                *y = (*y + world_gravity.y * dt * dt).max(0.0);
            }
        }
    }

    fn detect_contacts(&mut self) {
        self.contacts.clear();
        let bodies: Vec<_> = self.bodies.iter().collect();
        for (i, &(&ha, a)) in bodies.iter().enumerate() {
            for &(&hb, b) in &bodies[i + 1..] {
                if !a.kind.is_simulated() && !b.kind.is_simulated() {
                    continue;
                }
                if !a.collides_with(b.group, b.mask) {
                    continue;
                }
                if a.position.distance(b.position) <= a.radius + b.radius {
                    self.contacts.push((ha, hb));
                }
            }
        }
    }
}

impl Default for MockPhysicsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsEngine for MockPhysicsEngine {
    fn init(&mut self, world: &WorldConfig) {
        self.gravity = world.gravity;
    }

    fn step(
        &mut self,
        delta: f32,
        max_sub_steps: u32,
        fixed_step: f32,
        debug: Option<&mut dyn DebugSink>,
    ) -> u32 {
        self.accumulator += delta;
        let mut taken = 0;
        while self.accumulator >= fixed_step && taken < max_sub_steps {
            self.integrate(fixed_step);
            self.accumulator -= fixed_step;
            taken += 1;
        }
        if taken == max_sub_steps {
            // Under load the backlog is dropped rather than replayed
            self.accumulator = self.accumulator.min(fixed_step);
        }
        for body in self.bodies.values_mut() {
            body.force = Vec3::ZERO;
        }
        self.steps_taken += u64::from(taken);
        self.detect_contacts();

        if let Some(sink) = debug {
            for body in self.bodies.values() {
                sink.draw_line(body.position, body.position + body.linear, Vec3::new(0.0, 1.0, 0.0));
            }
            for (a, b) in &self.contacts {
                if let (Some(a), Some(b)) = (self.bodies.get(a), self.bodies.get(b)) {
                    sink.draw_line(a.position, b.position, Vec3::new(1.0, 0.0, 0.0));
                }
            }
        }
        taken
    }

    fn add_rigid_body(
        &mut self,
        transform: &Mat4,
        shape: &ShapeDescriptor,
        config: &BodyConfig,
    ) -> Result<NativeHandle, EngineError> {
        if config.kind.is_simulated() && matches!(shape, ShapeDescriptor::Mesh { .. }) {
            return Err(EngineError::Refused("triangle meshes cannot be dynamic".into()));
        }
        let (_, rotation, position) = transform.to_scale_rotation_translation();
        let mut body = MockBody {
            kind: config.kind,
            position,
            rotation,
            linear: Vec3::ZERO,
            angular: Vec3::ZERO,
            force: Vec3::ZERO,
            inverse_mass: 0.0,
            gravity: None,
            linear_damping: 0.0,
            restitution: 0.0,
            radius: shape.bounding_radius(),
            group: 1,
            mask: u32::MAX,
            asleep: false,
        };
        body.configure(config);
        let handle = self.mint();
        self.bodies.insert(handle, body);
        Ok(handle)
    }

    fn update_rigid_body(&mut self, body: NativeHandle, config: &BodyConfig) {
        if let Some(body) = self.bodies.get_mut(&body) {
            body.configure(config);
            body.asleep = false;
        }
    }

    fn remove_rigid_body(&mut self, body: NativeHandle) {
        // Like a native solver, constraints still naming the body are left dangling
        self.bodies.remove(&body);
    }

    fn add_soft_body(
        &mut self,
        buffers: &SoftBodyBuffers,
        config: &SoftBodyConfig,
    ) -> Result<NativeHandle, EngineError> {
        if config.pressure > 0.0 {
            return Err(EngineError::Unsupported("pressurized soft bodies"));
        }
        if buffers.vertices.len() % 3 != 0 || buffers.normals.len() != buffers.vertices.len() {
            return Err(EngineError::Refused("soft body arrays must be packed xyz of equal length".into()));
        }
        let handle = self.mint();
        self.soft_bodies
            .insert(handle, (buffers.vertices.clone(), buffers.normals.clone()));
        Ok(handle)
    }

    fn remove_soft_body(&mut self, body: NativeHandle) {
        self.soft_bodies.remove(&body);
    }

    fn soft_body_mesh(&self, body: NativeHandle, vertices: &mut Vec<f32>, normals: &mut Vec<f32>) {
        if let Some((v, n)) = self.soft_bodies.get(&body) {
            vertices.clear();
            vertices.extend_from_slice(v);
            normals.clear();
            normals.extend_from_slice(n);
        }
    }

    fn add_constraint(
        &mut self,
        body_a: NativeHandle,
        body_b: Option<NativeHandle>,
        _config: &ConstraintConfig,
    ) -> Result<NativeHandle, EngineError> {
        if body_b == Some(body_a) {
            return Err(EngineError::Refused("constraint joins a body to itself".into()));
        }
        let handle = self.mint();
        self.constraints.insert(handle, (body_a, body_b));
        Ok(handle)
    }

    fn remove_constraint(&mut self, constraint: NativeHandle) {
        self.constraints.remove(&constraint);
    }

    fn transform(&self, body: NativeHandle) -> Mat4 {
        self.bodies.get(&body).map_or(Mat4::IDENTITY, MockBody::matrix)
    }

    fn set_transform(&mut self, body: NativeHandle, transform: &Mat4) {
        if let Some(body) = self.bodies.get_mut(&body) {
            let (_, rotation, position) = transform.to_scale_rotation_translation();
            body.position = position;
            body.rotation = rotation;
        }
    }

    fn speeds(&self, body: NativeHandle) -> (f32, f32) {
        self.bodies
            .get(&body)
            .map_or((0.0, 0.0), |b| (b.linear.length(), b.angular.length()))
    }

    fn for_each_contact(&self, visit: &mut dyn FnMut(NativeHandle, NativeHandle)) {
        for &(a, b) in &self.contacts {
            visit(a, b);
        }
    }

    fn set_motion_state(&mut self, body: NativeHandle, position: Option<Vec3>, rotation: Option<Quat>) {
        if let Some(body) = self.bodies.get_mut(&body) {
            if let Some(position) = position {
                body.position = position;
            }
            if let Some(rotation) = rotation {
                body.rotation = rotation;
            }
            body.asleep = false;
        }
    }

    fn set_linear_velocity(&mut self, body: NativeHandle, velocity: Vec3) {
        if let Some(body) = self.bodies.get_mut(&body) {
            body.linear = velocity;
            body.asleep = false;
        }
    }

    fn apply_impulse(&mut self, body: NativeHandle, impulse: Vec3, offset: Option<Vec3>) {
        if let Some(body) = self.bodies.get_mut(&body) {
            body.linear += impulse * body.inverse_mass;
            if let Some(offset) = offset {
                body.angular += offset.cross(impulse) * body.inverse_mass;
            }
            body.asleep = false;
        }
    }

    fn apply_force(&mut self, body: NativeHandle, force: Vec3, offset: Option<Vec3>) {
        if let Some(body) = self.bodies.get_mut(&body) {
            body.force += force;
            if let Some(offset) = offset {
                body.angular += offset.cross(force) * body.inverse_mass * 1e-3;
            }
            body.asleep = false;
        }
    }

    fn reset_dynamic_body(&mut self, body: NativeHandle) {
        if let Some(body) = self.bodies.get_mut(&body) {
            body.linear = Vec3::ZERO;
            body.angular = Vec3::ZERO;
            body.force = Vec3::ZERO;
        }
    }

    fn activate(&mut self, body: NativeHandle) {
        if let Some(body) = self.bodies.get_mut(&body) {
            body.asleep = false;
        }
    }

    fn raycast(&self, query: &RayQuery) -> Vec<EngineHit> {
        let segment = query.to - query.from;
        let length = segment.length();
        if length <= f32::EPSILON {
            return Vec::new();
        }
        let direction = segment / length;

        let mut hits: Vec<(f32, EngineHit)> = self
            .bodies
            .iter()
            .filter(|(_, b)| b.collides_with(query.filter_group, query.filter_mask))
            .filter_map(|(&handle, b)| {
                // Ray against bounding sphere
                let to_center = b.position - query.from;
                let along = to_center.dot(direction);
                let miss_sq = to_center.length_squared() - along * along;
                let radius_sq = b.radius * b.radius;
                if miss_sq > radius_sq {
                    return None;
                }
                let t = along - (radius_sq - miss_sq).sqrt();
                if !(0.0..=length).contains(&t) {
                    return None;
                }
                let point = query.from + direction * t;
                let normal = (point - b.position).normalize_or_zero();
                Some((t, EngineHit { body: handle, point, normal }))
            })
            .collect();

        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        if !query.multiple {
            hits.truncate(1);
        }
        hits.into_iter().map(|(_, hit)| hit).collect()
    }
}

/// One object in the mock scene.
#[derive(Clone, Debug, PartialEq)]
pub struct MockNode {
    /// Parent-space position.
    pub position: Vec3,
    /// Parent-space rotation.
    pub rotation: Quat,
    /// Parent's world transform; None for root objects.
    pub parent: Option<Mat4>,
}

impl Default for MockNode {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            parent: None,
        }
    }
}

/// Uploaded mesh arrays and how often they were marked dirty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MockMesh {
    /// Packed positions.
    pub vertices: Vec<f32>,
    /// Packed normals.
    pub normals: Vec<f32>,
    /// Dirty marks so far.
    pub uploads: u32,
}

/// Flat map of objects standing in for a renderer.
#[derive(Debug, Default)]
pub struct MockSceneGraph {
    nodes: HashMap<EntityId, MockNode>,
    meshes: HashMap<EntityId, MockMesh>,
    debug_vertices: Vec<f32>,
    debug_colors: Vec<f32>,
    debug_draw_range: u32,
    debug_uploads: u32,
}

impl MockSceneGraph {
    /// Creates an empty scene.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an object.
    pub fn insert(&mut self, id: EntityId, node: MockNode) {
        self.nodes.insert(id, node);
    }

    /// Looks up an object.
    #[must_use]
    pub fn node(&self, id: &EntityId) -> Option<&MockNode> {
        self.nodes.get(id)
    }

    /// Mutable object lookup.
    pub fn node_mut(&mut self, id: &EntityId) -> Option<&mut MockNode> {
        self.nodes.get_mut(id)
    }

    /// Uploaded soft-body mesh.
    #[must_use]
    pub fn mesh(&self, id: &EntityId) -> Option<&MockMesh> {
        self.meshes.get(id)
    }

    /// Visible debug vertices and how many times they were uploaded.
    #[must_use]
    pub fn debug_lines(&self) -> (&[f32], u32) {
        let visible = self.debug_draw_range as usize * 3;
        (&self.debug_vertices[..visible], self.debug_uploads)
    }
}

impl SceneGraph for MockSceneGraph {
    fn world_matrix(&self, id: &EntityId) -> Option<Mat4> {
        self.nodes.get(id).map(|node| {
            node.parent.unwrap_or(Mat4::IDENTITY)
                * Mat4::from_rotation_translation(node.rotation, node.position)
        })
    }

    fn parent_world_matrix(&self, id: &EntityId) -> Option<Mat4> {
        self.nodes.get(id).and_then(|node| node.parent)
    }

    fn set_local_transform(&mut self, id: &EntityId, position: Vec3, rotation: Quat) {
        let node = self.nodes.entry(id.clone()).or_default();
        node.position = position;
        node.rotation = rotation;
    }

    fn update_soft_body_mesh(&mut self, id: &EntityId, vertices: &[f32], normals: &[f32]) {
        let mesh = self.meshes.entry(id.clone()).or_default();
        mesh.vertices.clear();
        mesh.vertices.extend_from_slice(vertices);
        mesh.normals.clear();
        mesh.normals.extend_from_slice(normals);
        mesh.uploads += 1;
    }

    fn update_debug_lines(&mut self, vertices: &[f32], colors: &[f32], count: u32) {
        self.debug_vertices.clear();
        self.debug_vertices.extend_from_slice(vertices);
        self.debug_colors.clear();
        self.debug_colors.extend_from_slice(colors);
        self.debug_draw_range = count;
        self.debug_uploads += 1;
    }
}
