//! Playfield layouts
//!
//! A builder populates an empty [`GameState`] with walls, goals and pegs. The
//! host keeps the [`LevelChoice`] around and re-runs its builder whenever an
//! instance is replaced.

use glam::Vec2;

use crate::highscores::UnlockRequirement;
use crate::sim::{GameState, PegPath};

/// Populates an empty simulation
pub type LevelBuilder = fn(&mut GameState);

/// Value of goal `index` out of `count`
pub type BinValues = fn(usize, usize) -> i64;

#[derive(Debug, Clone, Copy)]
pub struct LevelChoice {
    pub id: &'static str,
    pub title: &'static str,
    pub init: LevelBuilder,
    /// High scores needed before this level can be picked
    pub unlock: &'static [UnlockRequirement],
}

const WALL_WIDTH: f32 = 40.0;
const BOUNDS_WIDTH: f32 = 250.0;
const TOOTH_MIN: f32 = WALL_WIDTH * 3.0 / 4.0;
const TOOTH_MAX: f32 = WALL_WIDTH * 3.0 / 2.0;
/// Gap between the top of the teeth and the lowest peg row
const PEG_CLEARANCE: f32 = 60.0;

pub const CLASSIC: LevelChoice = LevelChoice {
    id: "classic",
    title: "Classic",
    init: classic_init,
    unlock: &[],
};

pub const SQUARE: LevelChoice = LevelChoice {
    id: "square",
    title: "Square",
    init: square_init,
    unlock: &[UnlockRequirement {
        id: "classic",
        level_max: 3,
    }],
};

pub const WHEEL: LevelChoice = LevelChoice {
    id: "wheel",
    title: "Wheel",
    init: wheel_init,
    unlock: &[UnlockRequirement {
        id: "square",
        level_max: 3,
    }],
};

pub const VORTEX: LevelChoice = LevelChoice {
    id: "vortex",
    title: "Vortex",
    init: vortex_init,
    unlock: &[UnlockRequirement {
        id: "wheel",
        level_max: 3,
    }],
};

pub static LEVEL_LIST: &[LevelChoice] = &[CLASSIC, SQUARE, WHEEL, VORTEX];

pub fn level_ids() -> Vec<&'static str> {
    LEVEL_LIST.iter().map(|l| l.id).collect()
}

pub fn find(id: &str) -> Option<&'static LevelChoice> {
    LEVEL_LIST.iter().find(|l| l.id == id)
}

/// Edge goals are worth the most
pub fn out_bins(index: usize, count: usize) -> i64 {
    let mid = (count as f64 - 1.0) / 2.0;
    (50.0 + 50.0 * (index as f64 - mid).abs()).round() as i64
}

/// Center goals are worth the most
pub fn in_bins(index: usize, count: usize) -> i64 {
    let mid = (count as f64 - 1.0) / 2.0;
    (50.0 * (count as f64 + 1.0) / 2.0 - 50.0 * (index as f64 - mid).abs()).round() as i64
}

/// Goals halfway between the center and the edges are worth the most
pub fn mid_bins(index: usize, count: usize) -> i64 {
    let mid = (count as f64 - 1.0) / 2.0;
    let last = count as f64 - 1.0;
    let i = index as f64;
    let dist = i.min((last - i).abs()).min((mid - i).abs());
    (50.0 + 100.0 * dist).round() as i64
}

fn tooth() -> Vec<Vec2> {
    let half = WALL_WIDTH / 2.0;
    vec![
        Vec2::new(-half, 0.0),
        Vec2::new(-half, -TOOTH_MIN),
        Vec2::new(0.0, -TOOTH_MAX),
        Vec2::new(half, -TOOTH_MIN),
        Vec2::new(half, 0.0),
    ]
}

/// Teeth, goals, side walls and hidden bounds shared by every layout
fn base_world_init(state: &mut GameState, bins: usize, values: BinValues) {
    let (width, height) = (state.config().width, state.config().height);
    let scene = state.scene_mut();
    let goal_width = (width - (bins as f32 + 1.0) * WALL_WIDTH) / bins as f32;

    scene.spawn_wall(Vec2::new(WALL_WIDTH / 2.0, height), tooth());
    for bin in 0..bins {
        let off = WALL_WIDTH + bin as f32 * (WALL_WIDTH + goal_width);
        scene.spawn_wall(
            Vec2::new(off + goal_width + WALL_WIDTH / 2.0, height),
            tooth(),
        );
        scene.spawn_goal(
            Vec2::new(off + goal_width / 2.0, height - TOOTH_MIN / 2.0),
            Vec2::new(goal_width / 2.0, TOOTH_MIN / 2.0),
            values(bin, bins),
        );
    }

    let side = |dir: f32| {
        vec![
            Vec2::new(0.0, height - TOOTH_MIN),
            Vec2::new(dir * WALL_WIDTH / 2.0, height - TOOTH_MAX),
            Vec2::new(dir * WALL_WIDTH / 4.0, WALL_WIDTH / 4.0),
            Vec2::new(0.0, 0.0),
        ]
    };
    scene.spawn_wall(Vec2::ZERO, side(1.0));
    scene.spawn_wall(Vec2::new(width, 0.0), side(-1.0));

    let half = BOUNDS_WIDTH / 2.0;
    let wide = Vec2::new(width / 2.0 + BOUNDS_WIDTH, half);
    let tall = Vec2::new(half, height / 2.0);
    scene.spawn_boundary(Vec2::new(width / 2.0, -half), wide);
    scene.spawn_boundary(Vec2::new(width / 2.0, height + half), wide);
    scene.spawn_boundary(Vec2::new(-half, height / 2.0), tall);
    scene.spawn_boundary(Vec2::new(width + half, height / 2.0), tall);
}

/// Horizontal extent of the peg field
fn peg_width(width: f32) -> f32 {
    (width - 2.0 * WALL_WIDTH) * 0.9 - 10.0
}

/// Peg position for a lattice cell, row 0 at the bottom
fn lattice(width: f32, height: f32, cols: usize, row: usize, col: usize) -> Vec2 {
    let span = peg_width(width);
    let spacing = span / (cols as f32 - 1.0);
    Vec2::new(
        (width - span) / 2.0 + spacing * col as f32,
        height - TOOTH_MAX - PEG_CLEARANCE - spacing * row as f32,
    )
}

/// Diagonal lattice over edge-weighted goals
pub fn classic_init(state: &mut GameState) {
    const ROWS: usize = 10;
    const COLS: usize = 15;
    base_world_init(state, 7, out_bins);
    let (width, height) = (state.config().width, state.config().height);
    for row in 0..ROWS {
        for col in (0..COLS).filter(|c| c % 2 == row % 2) {
            state
                .scene_mut()
                .spawn_peg(lattice(width, height, COLS, row, col));
        }
    }
}

/// Square grid over edge-weighted goals
pub fn square_init(state: &mut GameState) {
    const ROWS: usize = 6;
    const COLS: usize = 9;
    base_world_init(state, 7, out_bins);
    let (width, height) = (state.config().width, state.config().height);
    for row in 0..ROWS {
        for col in 0..COLS {
            state
                .scene_mut()
                .spawn_peg(lattice(width, height, COLS, row, col));
        }
    }
}

/// Time for a ring of moving pegs to make one turn
const RING_PERIOD_MS: f64 = 6000.0;

/// Height of the peg field, from y = 200 down to the lattice floor
fn peg_height(height: f32) -> f32 {
    height - TOOTH_MAX - PEG_CLEARANCE - 200.0
}

/// `(rung, pegs)` for `rungs` concentric rings, outermost first. The outer
/// ring holds `outer_pegs`; inner rings keep the same gap between pegs.
fn ring_counts(radius: f32, outer_pegs: usize, rungs: usize) -> Vec<(usize, usize)> {
    let circumference = std::f64::consts::TAU * radius as f64;
    let gap = (circumference / outer_pegs as f64).floor();
    (1..=rungs)
        .rev()
        .map(|rung| {
            let pegs = (circumference * rung as f64 / (gap * rungs as f64)).floor();
            (rung, pegs as usize)
        })
        .collect()
}

/// Rings of pegs turning around `center`, evenly spread along each ring
fn spawn_rings(
    state: &mut GameState,
    center: Vec2,
    radius: f32,
    outer_pegs: usize,
    rungs: usize,
    direction: impl Fn(usize) -> f64,
) {
    for (rung, pegs) in ring_counts(radius, outer_pegs, rungs) {
        for num in 0..pegs {
            state.scene_mut().spawn_moving_peg(PegPath {
                center,
                radius: radius * rung as f32 / rungs as f32,
                period_ms: RING_PERIOD_MS,
                direction: direction(rung),
                start_ms: num as f64 * RING_PERIOD_MS / pegs as f64,
            });
        }
    }
}

/// One big wheel of counter-rotating rings over center-weighted goals
pub fn wheel_init(state: &mut GameState) {
    const PEGS: usize = 24;
    const RUNGS: usize = 4;
    base_world_init(state, 7, in_bins);
    let (width, height) = (state.config().width, state.config().height);
    let field_height = peg_height(height);
    let radius = peg_width(width).min(field_height) / 2.0;
    let center = Vec2::new(width / 2.0, 200.0 + field_height / 2.0);
    spawn_rings(state, center, radius, PEGS, RUNGS, |rung| {
        if (RUNGS - rung) % 2 == 0 { 1.0 } else { -1.0 }
    });
}

/// Four spinning wheels around a fixed ring cluster, over mid-weighted goals
pub fn vortex_init(state: &mut GameState) {
    const PEGS: usize = 12;
    const RUNGS: usize = 4;
    const CENTER_PEGS: usize = 12;
    const CENTER_RUNGS: usize = 3;
    base_world_init(state, 7, mid_bins);
    let (width, height) = (state.config().width, state.config().height);
    let field_width = peg_width(width);
    let field_height = peg_height(height);
    let left = (width - field_width) / 2.0;
    let short = field_width.min(field_height);

    let radius = short / 4.0 - 30.0;
    for ix in 0..2 {
        let x = if ix == 0 {
            left + radius
        } else {
            left + field_width - radius
        };
        for iy in 0..2 {
            let y = 200.0 + field_height * (2 * iy + 1) as f32 / 4.0;
            let direction = if (ix + iy) % 2 == 0 { 1.0 } else { -1.0 };
            spawn_rings(state, Vec2::new(x, y), radius, PEGS, RUNGS, |_| direction);
        }
    }

    let center = Vec2::new(width / 2.0, 200.0 + field_height / 2.0);
    let radius = short / 4.0 - 45.0;
    for (rung, pegs) in ring_counts(radius, CENTER_PEGS, CENTER_RUNGS) {
        let r = radius * rung as f32 / CENTER_RUNGS as f32;
        for num in 0..pegs {
            let angle = std::f32::consts::TAU * num as f32 / pegs as f32;
            state
                .scene_mut()
                .spawn_peg(center + r * Vec2::new(angle.sin(), -angle.cos()));
        }
    }
}
