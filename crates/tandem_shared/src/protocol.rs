//! Command and event protocol between the consumer and the simulator.
//!
//! Every message is a tagged record `{ "kind": ..., ...fields }`. Both sides
//! match these enums exhaustively; the `Unknown` variants exist only for
//! kinds introduced by a peer built from a newer protocol revision.
//!
//! ```text
//! CONSUMER                               SIMULATOR
//!    |--- INIT{world, handoff} ------------->|
//!    |<-- READY -----------------------------|
//!    |--- ADD_RIGID_BODY{id, ...} ---------->|  (FIFO, fire-and-forget)
//!    |--- RAYCAST_REQUEST{request_id:7} ---->|
//!    |<-- RAYCAST_RESPONSE{request_id:7} ----|
//! ```

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, RequestId};

// ============================================================================
// SESSION
// ============================================================================

/// Mechanism used to hand the shared buffer between the two sides.
///
/// Selected once per session and never mixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffMode {
    /// One buffer visible to both sides, arbitrated by an atomic state flag.
    SharedMemory,
    /// The buffer object itself is moved between sides.
    Transfer,
}

/// Configured wish for the handoff mechanism.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffPreference {
    /// Probe the host and use shared memory when it exists.
    #[default]
    Auto,
    /// Shared memory, falling back to transfer if the host lacks it.
    SharedMemory,
    /// Always move the buffer object.
    Transfer,
}

/// Describes the buffer the simulator will be writing into.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandoffDescriptor {
    /// Handoff mechanism chosen at connect time.
    pub mode: HandoffMode,
    /// Body slots in the record block.
    pub max_bodies: u32,
    /// Debug line vertices the debug-draw record can hold.
    pub debug_vertex_capacity: u32,
    /// Protocol revision of the consumer.
    pub protocol_version: u32,
}

/// World-level configuration sent with `INIT`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Gravity applied to dynamic bodies.
    pub gravity: Vec3,
    /// Constraint solver iterations per sub-step.
    pub solver_iterations: u32,
    /// Upper bound on sub-steps per tick.
    pub max_sub_steps: u32,
    /// Length of one sub-step in seconds.
    pub fixed_time_step: f32,
    /// Start with debug-draw capture enabled.
    pub debug_draw: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.8, 0.0),
            solver_iterations: 10,
            max_sub_steps: crate::MAX_SUB_STEPS,
            fixed_time_step: crate::FIXED_TIME_STEP,
            debug_draw: false,
        }
    }
}

// ============================================================================
// BODY CONFIGURATION
// ============================================================================

/// Who is authoritative for a body's transform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    /// Simulated; the simulator writes the transform, the consumer reads it.
    #[default]
    Dynamic,
    /// Never moves on its own; the consumer writes the transform.
    Static,
    /// Driven by the consumer; the consumer writes the transform.
    Kinematic,
}

impl BodyKind {
    /// Returns true if the simulator owns this body's transform.
    #[inline]
    #[must_use]
    pub const fn is_simulated(self) -> bool {
        matches!(self, Self::Dynamic)
    }
}

/// Already-computed collision geometry.
///
/// Building these from render meshes happens outside this crate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeDescriptor {
    /// Axis-aligned box in body space.
    Box {
        /// Half extents along each axis.
        half_extents: Vec3,
    },
    /// Sphere around the body origin.
    Sphere {
        /// Radius.
        radius: f32,
    },
    /// Capsule along the body's Y axis.
    Capsule {
        /// Radius of the caps.
        radius: f32,
        /// Half the length of the cylindrical section.
        half_height: f32,
    },
    /// Convex hull over a point cloud.
    Hull {
        /// Packed `xyz` points.
        points: Vec<f32>,
    },
    /// Static triangle mesh.
    Mesh {
        /// Packed `xyz` vertices.
        vertices: Vec<f32>,
        /// Triangle indices.
        indices: Vec<u32>,
    },
}

impl ShapeDescriptor {
    /// Radius of a sphere around the body origin enclosing the shape.
    #[must_use]
    pub fn bounding_radius(&self) -> f32 {
        fn farthest(points: &[f32]) -> f32 {
            points
                .chunks_exact(3)
                .map(|p| Vec3::new(p[0], p[1], p[2]).length())
                .fold(0.0, f32::max)
        }

        match self {
            Self::Box { half_extents } => half_extents.length(),
            Self::Sphere { radius } => *radius,
            Self::Capsule { radius, half_height } => radius + half_height,
            Self::Hull { points } => farthest(points),
            Self::Mesh { vertices, .. } => farthest(vertices),
        }
    }
}

/// Per-body tunables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyConfig {
    /// Authority over the transform.
    pub kind: BodyKind,
    /// Mass in kilograms; ignored for static bodies.
    pub mass: f32,
    /// Per-body gravity override.
    pub gravity: Option<Vec3>,
    /// Linear damping factor.
    pub linear_damping: f32,
    /// Angular damping factor.
    pub angular_damping: f32,
    /// Surface friction.
    pub friction: f32,
    /// Bounciness.
    pub restitution: f32,
    /// Collision group bits this body belongs to.
    pub collision_filter_group: u32,
    /// Collision group bits this body collides with.
    pub collision_filter_mask: u32,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            kind: BodyKind::Dynamic,
            mass: 1.0,
            gravity: None,
            linear_damping: 0.01,
            angular_damping: 0.01,
            friction: 0.5,
            restitution: 0.0,
            collision_filter_group: 1,
            collision_filter_mask: u32::MAX,
        }
    }
}

/// Partial update of a [`BodyConfig`]; `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyConfigPatch {
    /// New authority.
    pub kind: Option<BodyKind>,
    /// New mass.
    pub mass: Option<f32>,
    /// New gravity override.
    pub gravity: Option<Vec3>,
    /// New linear damping.
    pub linear_damping: Option<f32>,
    /// New angular damping.
    pub angular_damping: Option<f32>,
    /// New friction.
    pub friction: Option<f32>,
    /// New restitution.
    pub restitution: Option<f32>,
    /// New collision group.
    pub collision_filter_group: Option<u32>,
    /// New collision mask.
    pub collision_filter_mask: Option<u32>,
}

impl BodyConfig {
    /// Applies a patch in place.
    pub fn apply(&mut self, patch: &BodyConfigPatch) {
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(mass) = patch.mass {
            self.mass = mass;
        }
        if patch.gravity.is_some() {
            self.gravity = patch.gravity;
        }
        if let Some(v) = patch.linear_damping {
            self.linear_damping = v;
        }
        if let Some(v) = patch.angular_damping {
            self.angular_damping = v;
        }
        if let Some(v) = patch.friction {
            self.friction = v;
        }
        if let Some(v) = patch.restitution {
            self.restitution = v;
        }
        if let Some(v) = patch.collision_filter_group {
            self.collision_filter_group = v;
        }
        if let Some(v) = patch.collision_filter_mask {
            self.collision_filter_mask = v;
        }
    }
}

// ============================================================================
// SOFT BODIES & CONSTRAINTS
// ============================================================================

/// Initial mesh of a soft body.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SoftBodyBuffers {
    /// Packed `xyz` vertex positions.
    pub vertices: Vec<f32>,
    /// Packed `xyz` vertex normals.
    pub normals: Vec<f32>,
    /// Triangle indices.
    pub indices: Vec<u32>,
}

/// Soft-body tunables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftBodyConfig {
    /// Total mass spread over the nodes.
    pub mass: f32,
    /// Collision margin.
    pub margin: f32,
    /// Internal pressure for closed volumes.
    pub pressure: f32,
}

impl Default for SoftBodyConfig {
    fn default() -> Self {
        Self {
            mass: 1.0,
            margin: 0.05,
            pressure: 0.0,
        }
    }
}

/// Constraint families understood by the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Bodies keep their relative transform.
    #[default]
    Lock,
    /// Like `Lock`, solved as a single rigid joint.
    Fixed,
    /// Spring between the pivots.
    Spring,
    /// Slides along an axis.
    Slider,
    /// Rotates around an axis.
    Hinge,
    /// Cone-limited ball joint.
    ConeTwist,
    /// Ball joint at the pivots.
    PointToPoint,
}

/// Constraint tunables.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintConfig {
    /// Constraint family.
    pub kind: ConstraintKind,
    /// Pivot in body A space.
    pub pivot_a: Vec3,
    /// Pivot in body B space.
    pub pivot_b: Vec3,
    /// Axis in body A space.
    pub axis_a: Vec3,
    /// Axis in body B space.
    pub axis_b: Vec3,
}

// ============================================================================
// COMMANDS (Consumer -> Simulator)
// ============================================================================

/// Structural and one-shot commands sent to the simulator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Session handshake; must be the first message.
    Init {
        /// World configuration.
        world: WorldConfig,
        /// Buffer the simulator will write into.
        handoff: HandoffDescriptor,
    },
    /// Create a rigid body.
    AddRigidBody {
        /// New entity.
        id: EntityId,
        /// Initial world transform.
        initial_transform: Mat4,
        /// Collision geometry.
        shape: ShapeDescriptor,
        /// Tunables.
        config: BodyConfig,
    },
    /// Change tunables of an existing rigid body.
    UpdateRigidBody {
        /// Target entity.
        id: EntityId,
        /// Fields to change.
        config: BodyConfigPatch,
    },
    /// Destroy a rigid body.
    RemoveRigidBody {
        /// Target entity.
        id: EntityId,
    },
    /// Create a soft body.
    AddSoftBody {
        /// New entity.
        id: EntityId,
        /// Initial mesh.
        buffers: SoftBodyBuffers,
        /// Tunables.
        config: SoftBodyConfig,
    },
    /// Destroy a soft body.
    RemoveSoftBody {
        /// Target entity.
        id: EntityId,
    },
    /// Join one body to another, or to the world when `body_b` is absent.
    AddConstraint {
        /// New constraint.
        id: EntityId,
        /// First body.
        body_a: EntityId,
        /// Second body.
        body_b: Option<EntityId>,
        /// Tunables.
        config: ConstraintConfig,
    },
    /// Destroy a constraint.
    RemoveConstraint {
        /// Target constraint.
        id: EntityId,
    },
    /// Teleport a body.
    SetMotionState {
        /// Target entity.
        id: EntityId,
        /// New position.
        position: Option<Vec3>,
        /// New rotation.
        rotation: Option<Quat>,
    },
    /// Overwrite a body's linear velocity.
    SetLinearVelocity {
        /// Target entity.
        id: EntityId,
        /// New velocity.
        velocity: Vec3,
    },
    /// One-shot impulse.
    ApplyImpulse {
        /// Target entity.
        id: EntityId,
        /// Impulse vector.
        impulse: Vec3,
        /// Application point relative to the center of mass.
        offset: Option<Vec3>,
    },
    /// One-shot force for the next step.
    ApplyForce {
        /// Target entity.
        id: EntityId,
        /// Force vector.
        force: Vec3,
        /// Application point relative to the center of mass.
        offset: Option<Vec3>,
    },
    /// Toggle debug-draw capture.
    EnableDebug {
        /// New state.
        enabled: bool,
    },
    /// Zero velocities and forces of a dynamic body.
    ResetDynamicBody {
        /// Target entity.
        id: EntityId,
    },
    /// Wake a sleeping body.
    ActivateBody {
        /// Target entity.
        id: EntityId,
    },
    /// Ray query; answered by `RAYCAST_RESPONSE` with the same id.
    RaycastRequest {
        /// Correlation id.
        request_id: RequestId,
        /// Ray origin.
        from: Vec3,
        /// Ray end.
        to: Vec3,
        /// Report every hit instead of the closest one.
        multiple: bool,
        /// Collision group of the ray.
        filter_group: u32,
        /// Groups the ray collides with.
        filter_mask: u32,
    },
    /// Stop the simulation loop.
    Shutdown,
    /// A kind this build does not know.
    #[serde(other)]
    Unknown,
}

impl Command {
    /// Returns true if the simulator must have answered `READY` before this
    /// command may be applied.
    #[must_use]
    pub const fn requires_ready(&self) -> bool {
        !matches!(self, Self::Init { .. } | Self::Shutdown | Self::Unknown)
    }

    /// Wire name of the kind, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "INIT",
            Self::AddRigidBody { .. } => "ADD_RIGID_BODY",
            Self::UpdateRigidBody { .. } => "UPDATE_RIGID_BODY",
            Self::RemoveRigidBody { .. } => "REMOVE_RIGID_BODY",
            Self::AddSoftBody { .. } => "ADD_SOFT_BODY",
            Self::RemoveSoftBody { .. } => "REMOVE_SOFT_BODY",
            Self::AddConstraint { .. } => "ADD_CONSTRAINT",
            Self::RemoveConstraint { .. } => "REMOVE_CONSTRAINT",
            Self::SetMotionState { .. } => "SET_MOTION_STATE",
            Self::SetLinearVelocity { .. } => "SET_LINEAR_VELOCITY",
            Self::ApplyImpulse { .. } => "APPLY_IMPULSE",
            Self::ApplyForce { .. } => "APPLY_FORCE",
            Self::EnableDebug { .. } => "ENABLE_DEBUG",
            Self::ResetDynamicBody { .. } => "RESET_DYNAMIC_BODY",
            Self::ActivateBody { .. } => "ACTIVATE_BODY",
            Self::RaycastRequest { .. } => "RAYCAST_REQUEST",
            Self::Shutdown => "SHUTDOWN",
            Self::Unknown => "UNKNOWN",
        }
    }
}

// ============================================================================
// EVENTS (Simulator -> Consumer)
// ============================================================================

/// One hit reported by a ray query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaycastHit {
    /// Entity that was hit.
    pub id: EntityId,
    /// Hit point in world space.
    pub point: Vec3,
    /// Surface normal at the hit point.
    pub normal: Vec3,
}

/// Why a structural add produced no entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Every body slot is in use.
    CapacityExceeded,
    /// The identifier is already live.
    DuplicateId,
    /// A constraint named a body that does not exist (yet).
    MissingBody(EntityId),
    /// The physics engine refused the geometry or configuration.
    EngineRefused(String),
}

/// Messages sent back to the consumer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    /// Handshake reply; sent exactly once.
    Ready {
        /// Body slots the simulator allocated.
        max_bodies: u32,
    },
    /// A structural add had no effect.
    Rejected {
        /// Entity that was not created.
        id: EntityId,
        /// Why.
        reason: RejectReason,
    },
    /// Reply to `RAYCAST_REQUEST`.
    RaycastResponse {
        /// Echo of the request id.
        request_id: RequestId,
        /// Hits, closest first.
        hits: Vec<RaycastHit>,
    },
    /// A kind this build does not know.
    #[serde(other)]
    Unknown,
}
