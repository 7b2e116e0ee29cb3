use std::sync::{LazyLock, Mutex};

use log::debug;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::game::note::LANE_COUNT;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Lane {
    Left = 0,
    Down = 1,
    Up = 2,
    Right = 3,
}

impl Lane {
    pub const ALL: [Self; LANE_COUNT] = [Self::Left, Self::Down, Self::Up, Self::Right];

    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline(always)]
    pub const fn from_index(idx: usize) -> Option<Self> {
        match idx {
            0 => Some(Self::Left),
            1 => Some(Self::Down),
            2 => Some(Self::Up),
            3 => Some(Self::Right),
            _ => None,
        }
    }
}

/// A lane press or release after repeat filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaneEdge {
    pub lane: Lane,
    pub pressed: bool,
    pub at_ms: i64,
}

/* ------------------------------ Keymap ------------------------------ */

/// Physical key codes (`KeyD`, `ArrowLeft`, ...) to lanes. Several keys may
/// share a lane.
#[derive(Clone, Debug, Default)]
pub struct Keymap {
    map: FxHashMap<String, Lane>,
}

impl Keymap {
    pub fn bind(&mut self, lane: Lane, codes: &[&str]) {
        for code in codes {
            let code = code.trim();
            if !code.is_empty() {
                self.map.insert(code.to_string(), lane);
            }
        }
    }

    #[inline(always)]
    pub fn lane_for(&self, code: &str) -> Option<Lane> {
        self.map.get(code).copied()
    }

    /// Keys bound to `lane`, sorted for stable output.
    pub fn codes_for(&self, lane: Lane) -> Vec<&str> {
        let mut codes: Vec<&str> = self
            .map
            .iter()
            .filter(|(_, l)| **l == lane)
            .map(|(c, _)| c.as_str())
            .collect();
        codes.sort_unstable();
        codes
    }
}

pub fn default_keymap() -> Keymap {
    let mut km = Keymap::default();
    km.bind(Lane::Left, &["KeyD"]);
    km.bind(Lane::Down, &["KeyF"]);
    km.bind(Lane::Up, &["KeyJ"]);
    km.bind(Lane::Right, &["KeyK"]);
    km
}

static KEYMAP: LazyLock<Mutex<Keymap>> = LazyLock::new(|| Mutex::new(default_keymap()));

#[inline(always)]
pub fn get_keymap() -> Keymap {
    KEYMAP.lock().unwrap().clone()
}

#[inline(always)]
pub fn set_keymap(new_map: Keymap) {
    *KEYMAP.lock().unwrap() = new_map;
}

/* ---------------------------- Lane state ---------------------------- */

/// Per-lane key state. OS auto-repeat and a second key on an already held
/// lane produce no edge; the lane is released when its last key goes up.
#[derive(Clone, Debug)]
pub struct LaneInput {
    keymap: Keymap,
    held_keys: [SmallVec<[String; 2]>; LANE_COUNT],
}

impl LaneInput {
    pub fn new(keymap: Keymap) -> Self {
        Self {
            keymap,
            held_keys: Default::default(),
        }
    }

    #[inline(always)]
    pub fn is_down(&self, lane: Lane) -> bool {
        !self.held_keys[lane.index()].is_empty()
    }

    pub fn key_event(&mut self, code: &str, pressed: bool, repeat: bool, at_ms: i64) -> Option<LaneEdge> {
        let lane = self.keymap.lane_for(code)?;
        if repeat {
            return None;
        }
        let held = &mut self.held_keys[lane.index()];
        let was_down = !held.is_empty();
        if pressed {
            if held.iter().any(|k| k == code) {
                return None;
            }
            held.push(code.to_string());
        } else {
            let before = held.len();
            held.retain(|k| k != code);
            if held.len() == before {
                return None;
            }
        }
        let is_down = !held.is_empty();
        if was_down == is_down {
            return None;
        }
        Some(LaneEdge {
            lane,
            pressed: is_down,
            at_ms,
        })
    }

    /// Releases every held lane, e.g. when the window loses focus.
    pub fn release_all(&mut self, at_ms: i64) -> SmallVec<[LaneEdge; LANE_COUNT]> {
        let mut out = SmallVec::new();
        for lane in Lane::ALL {
            let held = &mut self.held_keys[lane.index()];
            if !held.is_empty() {
                held.clear();
                out.push(LaneEdge {
                    lane,
                    pressed: false,
                    at_ms,
                });
            }
        }
        if !out.is_empty() {
            debug!("Released {} lanes on focus loss", out.len());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_are_dropped() {
        let mut input = LaneInput::new(default_keymap());
        assert_eq!(
            input.key_event("KeyF", true, false, 10),
            Some(LaneEdge { lane: Lane::Down, pressed: true, at_ms: 10 })
        );
        assert_eq!(input.key_event("KeyF", true, true, 40), None);
        assert_eq!(input.key_event("KeyF", true, false, 45), None);
        assert_eq!(
            input.key_event("KeyF", false, false, 90),
            Some(LaneEdge { lane: Lane::Down, pressed: false, at_ms: 90 })
        );
        assert_eq!(input.key_event("KeyQ", true, false, 100), None);
    }

    #[test]
    fn shared_lane_releases_with_last_key() {
        let mut km = default_keymap();
        km.bind(Lane::Left, &["ArrowLeft"]);
        let mut input = LaneInput::new(km);
        assert!(input.key_event("KeyD", true, false, 0).is_some());
        assert!(input.key_event("ArrowLeft", true, false, 5).is_none());
        assert!(input.key_event("KeyD", false, false, 10).is_none());
        assert!(input.is_down(Lane::Left));
        assert!(input.key_event("ArrowLeft", false, false, 20).is_some());
    }

    #[test]
    fn release_all_only_reports_held_lanes() {
        let mut input = LaneInput::new(default_keymap());
        input.key_event("KeyD", true, false, 0);
        input.key_event("KeyK", true, false, 0);
        let edges = input.release_all(50);
        let lanes: Vec<Lane> = edges.iter().map(|e| e.lane).collect();
        assert_eq!(lanes, [Lane::Left, Lane::Right]);
        assert!(input.release_all(60).is_empty());
    }
}
