//! Named input actions and key bindings
//!
//! The host feeds raw key names in; the simulation only ever asks whether a
//! named action has fired since it was last reset.

use std::collections::BTreeMap;

/// Actions the simulation understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    Spawn,
    Restart,
    Menu,
    Select,
    Up,
    Down,
    Left,
    Right,
}

impl Action {
    pub const ALL: [Action; 8] = [
        Action::Spawn,
        Action::Restart,
        Action::Menu,
        Action::Select,
        Action::Up,
        Action::Down,
        Action::Left,
        Action::Right,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Spawn => "SPAWN",
            Action::Restart => "RESTART",
            Action::Menu => "MENU",
            Action::Select => "SELECT",
            Action::Up => "UP",
            Action::Down => "DOWN",
            Action::Left => "LEFT",
            Action::Right => "RIGHT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
    }
}

/// Default action → key table
pub const DEFAULT_BINDINGS: &[(Action, &str)] = &[
    (Action::Spawn, " "),
    (Action::Restart, "r"),
    (Action::Menu, "Escape"),
    (Action::Select, "Enter"),
    (Action::Up, "ArrowUp"),
    (Action::Down, "ArrowDown"),
    (Action::Left, "ArrowLeft"),
    (Action::Right, "ArrowRight"),
];

/// What the simulation needs from an input device
pub trait InputSource {
    /// Whether `action` fired since it was last reset
    fn poll(&self, action: Action) -> bool;
    /// Clear `action` (and every action on the same key), or everything
    fn reset(&mut self, action: Option<Action>);
}

/// Latched key state keyed by action
#[derive(Debug, Clone)]
pub struct InputState {
    bindings: BTreeMap<Action, String>,
    status: BTreeMap<Action, bool>,
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

impl InputState {
    pub fn new() -> Self {
        Self::with_bindings(DEFAULT_BINDINGS)
    }

    pub fn with_bindings(bindings: &[(Action, &str)]) -> Self {
        Self {
            bindings: bindings
                .iter()
                .map(|(action, key)| (*action, key.to_string()))
                .collect(),
            status: bindings.iter().map(|(action, _)| (*action, false)).collect(),
        }
    }

    /// Latch every action bound to `key`
    pub fn press_key(&mut self, key: &str) {
        for (action, binding) in &self.bindings {
            if binding == key {
                self.status.insert(*action, true);
            }
        }
    }

    /// Convenience for hosts and tests that think in actions
    pub fn press(&mut self, action: Action) {
        if let Some(key) = self.bindings.get(&action).cloned() {
            self.press_key(&key);
        }
    }

    pub fn binding(&self, action: Action) -> Option<&str> {
        self.bindings.get(&action).map(String::as_str)
    }
}

impl InputSource for InputState {
    fn poll(&self, action: Action) -> bool {
        self.status.get(&action).copied().unwrap_or(false)
    }

    fn reset(&mut self, action: Option<Action>) {
        let key = action.and_then(|a| self.bindings.get(&a));
        for (other, pressed) in self.status.iter_mut() {
            if key.is_none() || self.bindings.get(other) == key {
                *pressed = false;
            }
        }
    }
}
