//! Physics adapter
//!
//! Wraps one rapier2d pipeline per simulation instance. Orbs are dynamic
//! balls, moving pegs are kinematic, everything else is fixed. Contact-begin
//! pairs come from rapier's collision events and are collected after every
//! step until the owner drains them.

use glam::Vec2;
use rapier2d::crossbeam::channel::{Receiver, unbounded};
use rapier2d::prelude::*;

use crate::consts::{GRAVITY, ORB_MAX_SPEED};

/// Typical object size in world units, used to scale solver tolerances
const LENGTH_UNIT: Real = 100.0;

/// Handle to a body in a [`PhysicsWorld`]. Generational: a removed body's
/// handle never resolves to a later body.
pub type BodyHandle = RigidBodyHandle;

/// A pair of bodies, lower handle first
pub type ContactPair = (BodyHandle, BodyHandle);

fn ordered(a: BodyHandle, b: BodyHandle) -> ContactPair {
    if a.into_raw_parts() <= b.into_raw_parts() {
        (a, b)
    } else {
        (b, a)
    }
}

fn to_vec2(v: &Vector<Real>) -> Vec2 {
    Vec2::new(v.x, v.y)
}

fn to_vector(v: Vec2) -> Vector<Real> {
    vector![v.x, v.y]
}

/// Collision shape, in body-local coordinates
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Circle { radius: f32 },
    Rect { half_extents: Vec2 },
    /// Convex polygon, points relative to the body position
    Polygon { points: Vec<Vec2> },
}

impl Shape {
    fn collider(&self) -> ColliderBuilder {
        match self {
            Shape::Circle { radius } => ColliderBuilder::ball(*radius),
            Shape::Rect { half_extents } => ColliderBuilder::cuboid(half_extents.x, half_extents.y),
            Shape::Polygon { points } => {
                let hull: Vec<Point<Real>> = points.iter().map(|p| point![p.x, p.y]).collect();
                ColliderBuilder::convex_hull(&hull).unwrap_or_else(|| {
                    log::error!("Degenerate polygon ({} points), using a point collider", points.len());
                    ColliderBuilder::ball(1.0)
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Static,
    /// Moved along a path by the owner, unaffected by contacts
    Kinematic,
    Dynamic,
}

/// Everything needed to create a body
#[derive(Debug, Clone)]
pub struct BodyDesc {
    pub shape: Shape,
    pub kind: BodyKind,
    pub position: Vec2,
    pub velocity: Vec2,
    pub restitution: f32,
    pub friction: f32,
}

impl BodyDesc {
    pub fn fixed(shape: Shape, position: Vec2) -> Self {
        Self {
            shape,
            kind: BodyKind::Static,
            position,
            velocity: Vec2::ZERO,
            restitution: 0.0,
            friction: 0.0,
        }
    }

    pub fn kinematic(shape: Shape, position: Vec2) -> Self {
        Self {
            kind: BodyKind::Kinematic,
            ..Self::fixed(shape, position)
        }
    }

    pub fn dynamic(shape: Shape, position: Vec2) -> Self {
        Self {
            kind: BodyKind::Dynamic,
            ..Self::fixed(shape, position)
        }
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }
}

/// One rapier world. Never shared between simulation instances.
pub struct PhysicsWorld {
    gravity: Vector<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    events: ChannelEventCollector,
    collisions: Receiver<CollisionEvent>,
    _forces: Receiver<ContactForceEvent>,
}

impl std::fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("gravity", &to_vec2(&self.gravity))
            .field("bodies", &self.bodies.len())
            .field("colliders", &self.colliders.len())
            .finish()
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(Vec2::new(0.0, GRAVITY))
    }
}

impl PhysicsWorld {
    pub fn new(gravity: Vec2) -> Self {
        let (collision_send, collisions) = unbounded();
        let (force_send, forces) = unbounded();
        let mut params = IntegrationParameters::default();
        params.length_unit = LENGTH_UNIT;
        Self {
            gravity: to_vector(gravity),
            params,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            events: ChannelEventCollector::new(collision_send, force_send),
            collisions,
            _forces: forces,
        }
    }

    pub fn add_body(&mut self, desc: BodyDesc) -> BodyHandle {
        let builder = match desc.kind {
            BodyKind::Static => RigidBodyBuilder::fixed(),
            BodyKind::Kinematic => RigidBodyBuilder::kinematic_position_based(),
            BodyKind::Dynamic => RigidBodyBuilder::dynamic().ccd_enabled(true),
        };
        let body = builder
            .translation(to_vector(desc.position))
            .linvel(to_vector(desc.velocity))
            .build();
        let handle = self.bodies.insert(body);

        let mut collider = desc
            .shape
            .collider()
            .restitution(desc.restitution)
            .restitution_combine_rule(CoefficientCombineRule::Max)
            .friction(desc.friction)
            .friction_combine_rule(CoefficientCombineRule::Max);
        // Every reportable contact involves an orb
        if desc.kind == BodyKind::Dynamic {
            collider = collider.active_events(ActiveEvents::COLLISION_EVENTS);
        }
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        handle
    }

    /// Remove a body and its collider. Contacts it had not yet reported are
    /// dropped at drain time.
    pub fn remove_body(&mut self, handle: BodyHandle) -> bool {
        self.bodies
            .remove(
                handle,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            )
            .is_some()
    }

    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.bodies.contains(handle)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn position(&self, handle: BodyHandle) -> Option<Vec2> {
        self.bodies.get(handle).map(|b| to_vec2(b.translation()))
    }

    pub fn velocity(&self, handle: BodyHandle) -> Option<Vec2> {
        self.bodies.get(handle).map(|b| to_vec2(b.linvel()))
    }

    pub fn set_velocity(&mut self, handle: BodyHandle, vel: Vec2) -> bool {
        match self.bodies.get_mut(handle) {
            Some(body) => {
                body.set_linvel(to_vector(vel), true);
                true
            }
            None => false,
        }
    }

    /// Where a kinematic body should be at the end of the next step
    pub fn set_kinematic_target(&mut self, handle: BodyHandle, pos: Vec2) -> bool {
        match self.bodies.get_mut(handle) {
            Some(body) if body.is_kinematic() => {
                body.set_next_kinematic_translation(to_vector(pos));
                true
            }
            _ => false,
        }
    }

    /// Advance the world by `dt` seconds
    pub fn step(&mut self, dt: f32) {
        for (_, body) in self.bodies.iter_mut() {
            if !body.is_dynamic() {
                continue;
            }
            let vel = *body.linvel();
            let speed = vel.norm();
            if speed > ORB_MAX_SPEED {
                body.set_linvel(vel * (ORB_MAX_SPEED / speed), true);
            }
        }

        self.params.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &self.events,
        );
    }

    fn parent(&self, collider: ColliderHandle) -> Option<BodyHandle> {
        self.colliders.get(collider).and_then(|c| c.parent())
    }

    /// Take the contact-begin pairs reported since the last drain, skipping
    /// any whose bodies have since been removed. Sorted by handle, since the
    /// channel's delivery order isn't stable.
    pub fn drain_contacts(&mut self) -> Vec<ContactPair> {
        let mut began = Vec::new();
        while let Ok(event) = self.collisions.try_recv() {
            let CollisionEvent::Started(a, b, _) = event else {
                continue;
            };
            if let (Some(a), Some(b)) = (self.parent(a), self.parent(b)) {
                began.push(ordered(a, b));
            }
        }
        began.sort_by_key(|(a, b)| (a.into_raw_parts(), b.into_raw_parts()));
        began
    }
}
