//! Entities and the per-instance registry
//!
//! Every entity owns exactly one physics body. [`Scene`] is the only place
//! bodies are created or removed, so world and registry never drift apart.

use std::collections::{BTreeMap, HashMap};

use glam::Vec2;
use serde::Serialize;

use super::physics::{BodyDesc, BodyHandle, PhysicsWorld, Shape};
use crate::consts::{
    BOUNCER_MAGNITUDE, BOUNCER_RADIUS, ORB_FRICTION, ORB_RADIUS, ORB_RESTITUTION, PEG_RADIUS,
    PEG_RESTITUTION,
};

/// Handle to an entity in an [`EntityRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityId {
    index: u32,
    generation: u32,
}

/// Opaque handle the render layer uses to find its sprite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RenderHandle(pub u64);

/// Entity variant with its fixed attributes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum EntityKind {
    Wall,
    /// Scoring bin; `score` is awarded when an orb lands in it
    Goal { score: i64 },
    Peg,
    /// Peg that kicks orbs outward on contact
    Bouncer { magnitude: f32 },
    Orb,
    /// Off-screen wall that keeps stray orbs near the playfield
    InvisibleBoundary,
}

/// Fieldless mirror of [`EntityKind`] for counting and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EntityTag {
    Wall,
    Goal,
    Peg,
    Bouncer,
    Orb,
    InvisibleBoundary,
}

impl EntityKind {
    pub fn tag(&self) -> EntityTag {
        match self {
            EntityKind::Wall => EntityTag::Wall,
            EntityKind::Goal { .. } => EntityTag::Goal,
            EntityKind::Peg => EntityTag::Peg,
            EntityKind::Bouncer { .. } => EntityTag::Bouncer,
            EntityKind::Orb => EntityTag::Orb,
            EntityKind::InvisibleBoundary => EntityTag::InvisibleBoundary,
        }
    }

    /// Points awarded on contact, if this is a goal
    pub fn score(&self) -> Option<i64> {
        match self {
            EntityKind::Goal { score } => Some(*score),
            _ => None,
        }
    }

    /// Bounce magnitude, if this is a bouncer
    pub fn bounce(&self) -> Option<f32> {
        match self {
            EntityKind::Bouncer { magnitude } => Some(*magnitude),
            _ => None,
        }
    }

    pub fn is_orb(&self) -> bool {
        matches!(self, EntityKind::Orb)
    }

    pub fn is_visible(&self) -> bool {
        !matches!(self, EntityKind::InvisibleBoundary)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    pub kind: EntityKind,
    #[serde(skip)]
    pub body: BodyHandle,
    /// Circle radius, zero for non-circular shapes
    pub radius: f32,
    pub render: RenderHandle,
    /// Position as of the last graphics sync
    pub position: Vec2,
}

#[derive(Debug, Default)]
struct RegistrySlot {
    generation: u32,
    entity: Option<Entity>,
}

/// Arena of entities plus the body → entity lookup
#[derive(Debug, Default)]
pub struct EntityRegistry {
    slots: Vec<RegistrySlot>,
    free: Vec<u32>,
    by_body: HashMap<BodyHandle, EntityId>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, entity: Entity) -> EntityId {
        let body = entity.body;
        let id = if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entity = Some(entity);
            EntityId {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(RegistrySlot {
                generation: 0,
                entity: Some(entity),
            });
            EntityId {
                index: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        };
        self.by_body.insert(body, id);
        id
    }

    fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)?;
        let entity = slot.entity.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.by_body.remove(&entity.body);
        Some(entity)
    }

    fn rebind(&mut self, id: EntityId, old: BodyHandle, new: BodyHandle) {
        self.by_body.remove(&old);
        self.by_body.insert(new, id);
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.entity.as_ref())
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.entity.as_mut())
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    /// Entity owning a physics body
    pub fn resolve(&self, body: BodyHandle) -> Option<EntityId> {
        self.by_body.get(&body).copied()
    }

    pub fn len(&self) -> usize {
        self.by_body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_body.is_empty()
    }

    /// Live entities in slot order
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.entity.as_ref().map(|e| {
                (
                    EntityId {
                        index: i as u32,
                        generation: s.generation,
                    },
                    e,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut Entity)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, s)| {
            let generation = s.generation;
            s.entity.as_mut().map(|e| {
                (
                    EntityId {
                        index: i as u32,
                        generation,
                    },
                    e,
                )
            })
        })
    }

    pub fn ids_with(&self, tag: EntityTag) -> Vec<EntityId> {
        self.iter()
            .filter(|(_, e)| e.kind.tag() == tag)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn count(&self, tag: EntityTag) -> usize {
        self.iter().filter(|(_, e)| e.kind.tag() == tag).count()
    }
}

/// Circular track a moving peg follows, in screen coordinates (y down)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PegPath {
    pub center: Vec2,
    pub radius: f32,
    /// Time for one full turn
    pub period_ms: f64,
    /// 1.0 turns clockwise on screen, -1.0 counter-clockwise
    pub direction: f64,
    /// How far along the track the peg is at time zero
    pub start_ms: f64,
}

impl PegPath {
    /// Point on the track at `time_ms`; time zero starts at the top when
    /// `start_ms` is zero
    pub fn position(&self, time_ms: f64) -> Vec2 {
        let angle = self.direction * (time_ms + self.start_ms) * std::f64::consts::TAU
            / self.period_ms;
        self.center + self.radius * Vec2::new(angle.sin() as f32, -angle.cos() as f32)
    }
}

/// Physics world and entity registry of one simulation instance
#[derive(Debug, Default)]
pub struct Scene {
    physics: PhysicsWorld,
    registry: EntityRegistry,
    /// Tracks of moving pegs and bouncers
    paths: BTreeMap<EntityId, PegPath>,
    next_render: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut EntityRegistry {
        &mut self.registry
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.registry.get(id)
    }

    /// Create the body and register the entity that owns it
    pub fn spawn(&mut self, kind: EntityKind, desc: BodyDesc) -> EntityId {
        let radius = match desc.shape {
            Shape::Circle { radius } => radius,
            _ => 0.0,
        };
        let position = desc.position;
        let body = self.physics.add_body(desc);
        let render = RenderHandle(self.next_render);
        self.next_render += 1;
        self.registry.insert(Entity {
            kind,
            body,
            radius,
            render,
            position,
        })
    }

    /// Remove an entity and its body together
    pub fn despawn(&mut self, id: EntityId) -> bool {
        match self.registry.remove(id) {
            Some(entity) => {
                self.physics.remove_body(entity.body);
                self.paths.remove(&id);
                true
            }
            None => false,
        }
    }

    /// Remove every entity
    pub fn clear(&mut self) {
        let ids: Vec<EntityId> = self.registry.iter().map(|(id, _)| id).collect();
        for id in ids {
            self.despawn(id);
        }
    }

    pub fn spawn_orb(&mut self, position: Vec2, velocity: Vec2) -> EntityId {
        let desc = BodyDesc::dynamic(Shape::Circle { radius: ORB_RADIUS }, position)
            .with_velocity(velocity)
            .with_restitution(ORB_RESTITUTION)
            .with_friction(ORB_FRICTION);
        self.spawn(EntityKind::Orb, desc)
    }

    pub fn spawn_peg(&mut self, position: Vec2) -> EntityId {
        let desc = BodyDesc::fixed(Shape::Circle { radius: PEG_RADIUS }, position)
            .with_restitution(PEG_RESTITUTION);
        self.spawn(EntityKind::Peg, desc)
    }

    /// Peg that follows `path`, starting at its time-zero point
    pub fn spawn_moving_peg(&mut self, path: PegPath) -> EntityId {
        let desc = BodyDesc::kinematic(Shape::Circle { radius: PEG_RADIUS }, path.position(0.0))
            .with_restitution(PEG_RESTITUTION);
        let id = self.spawn(EntityKind::Peg, desc);
        self.paths.insert(id, path);
        id
    }

    pub fn path(&self, id: EntityId) -> Option<&PegPath> {
        self.paths.get(&id)
    }

    /// Send every moving body toward where its track puts it at `time_ms`
    pub fn advance_paths(&mut self, time_ms: f64) {
        for (id, path) in &self.paths {
            if let Some(entity) = self.registry.get(*id) {
                self.physics
                    .set_kinematic_target(entity.body, path.position(time_ms));
            }
        }
    }

    pub fn spawn_bouncer(&mut self, position: Vec2) -> EntityId {
        self.spawn(
            EntityKind::Bouncer {
                magnitude: BOUNCER_MAGNITUDE,
            },
            bouncer_desc(position, false),
        )
    }

    pub fn spawn_goal(&mut self, center: Vec2, half_extents: Vec2, score: i64) -> EntityId {
        let desc = BodyDesc::fixed(Shape::Rect { half_extents }, center);
        self.spawn(EntityKind::Goal { score }, desc)
    }

    /// Convex wall, points relative to `position`
    pub fn spawn_wall(&mut self, position: Vec2, points: Vec<Vec2>) -> EntityId {
        let desc = BodyDesc::fixed(Shape::Polygon { points }, position).with_friction(0.1);
        self.spawn(EntityKind::Wall, desc)
    }

    pub fn spawn_boundary(&mut self, center: Vec2, half_extents: Vec2) -> EntityId {
        let desc = BodyDesc::fixed(Shape::Rect { half_extents }, center);
        self.spawn(EntityKind::InvisibleBoundary, desc)
    }

    /// Swap a peg's body for a bouncer body at the same spot. The entity keeps
    /// its id, render handle and track.
    pub fn convert_peg_to_bouncer(&mut self, id: EntityId) -> bool {
        let Some(entity) = self.registry.get(id) else {
            log::error!("Cannot convert missing entity {:?}", id);
            return false;
        };
        if entity.kind != EntityKind::Peg {
            log::error!("Cannot convert {:?} into a bouncer", entity.kind.tag());
            return false;
        }
        let old = entity.body;
        let position = self.physics.position(old).unwrap_or(entity.position);

        self.physics.remove_body(old);
        let moving = self.paths.contains_key(&id);
        let new = self.physics.add_body(bouncer_desc(position, moving));
        self.registry.rebind(id, old, new);
        if let Some(entity) = self.registry.get_mut(id) {
            entity.kind = EntityKind::Bouncer {
                magnitude: BOUNCER_MAGNITUDE,
            };
            entity.body = new;
            entity.radius = BOUNCER_RADIUS;
            entity.position = position;
        }
        true
    }

    pub fn position(&self, id: EntityId) -> Option<Vec2> {
        self.registry
            .get(id)
            .and_then(|e| self.physics.position(e.body))
    }

    pub fn velocity(&self, id: EntityId) -> Option<Vec2> {
        self.registry
            .get(id)
            .and_then(|e| self.physics.velocity(e.body))
    }

    pub fn set_velocity(&mut self, id: EntityId, velocity: Vec2) -> bool {
        match self.registry.get(id) {
            Some(e) => self.physics.set_velocity(e.body, velocity),
            None => false,
        }
    }

    /// Advance physics by `dt` seconds
    pub fn step(&mut self, dt: f32) {
        self.physics.step(dt);
    }

    /// Contact-begin pairs since the last call, resolved to entities
    pub fn drain_contacts(&mut self) -> Vec<(EntityId, EntityId)> {
        let mut pairs = Vec::new();
        for (a, b) in self.physics.drain_contacts() {
            match (self.registry.resolve(a), self.registry.resolve(b)) {
                (Some(ea), Some(eb)) => pairs.push((ea, eb)),
                _ => log::error!("Contact between unregistered bodies {:?} / {:?}", a, b),
            }
        }
        pairs
    }

    /// Copy body positions into the cached entity positions
    pub fn sync_positions(&mut self) {
        let physics = &self.physics;
        for (_, entity) in self.registry.iter_mut() {
            if let Some(pos) = physics.position(entity.body) {
                entity.position = pos;
            }
        }
    }

    pub fn body_count(&self) -> usize {
        self.physics.body_count()
    }
}

fn bouncer_desc(position: Vec2, moving: bool) -> BodyDesc {
    let shape = Shape::Circle {
        radius: BOUNCER_RADIUS,
    };
    let desc = if moving {
        BodyDesc::kinematic(shape, position)
    } else {
        BodyDesc::fixed(shape, position)
    };
    desc.with_restitution(PEG_RESTITUTION)
}
