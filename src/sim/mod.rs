//! Simulation core
//!
//! One [`GameState`] per instance; everything it owns is private to it. The
//! only thing instances share is the host's [`TimingController`].
//! - Fixed timestep only
//! - Seeded RNG per instance
//! - Stable iteration order (arena slot order, sorted contact pairs)

pub mod collision;
pub mod entity;
pub mod events;
pub mod level;
pub mod physics;
pub mod spawner;
pub mod state;
pub mod timing;
pub mod upgrades;

pub use collision::classify;
pub use entity::{
    Entity, EntityId, EntityKind, EntityRegistry, EntityTag, PegPath, RenderHandle, Scene,
};
pub use events::{EventQueue, GameEvent};
pub use level::{LevelManager, target};
pub use physics::{BodyDesc, BodyHandle, BodyKind, PhysicsWorld, Shape};
pub use spawner::Spawner;
pub use state::{DrainOutcome, FrameContext, GameState, GateChoice, Phase, Snapshot};
pub use timing::{InstanceId, TimerAction, TimerTarget, TimingController};
pub use upgrades::{CATALOGUE, UpgradeEffect, UpgradeGenerator, UpgradeManager, UpgradeOffer};
