use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use rustc_hash::FxHashSet;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::game::note::{LANE_COUNT, Note};

/// Upper bound for note times and hold lengths (24 hours). Anything beyond
/// it is treated as malformed.
pub const MAX_CHART_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("failed to read chart file: {0}")]
    Io(#[from] std::io::Error),
    #[error("chart is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChart {
    #[serde(default)]
    music_id: Option<Value>,
    // Backend charts carry their id instead of a music id.
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    artist: String,
    #[serde(default)]
    difficulty: Option<f64>,
    #[serde(default)]
    notes: Vec<RawNote>,
}

// Every field is optional so one bad note cannot reject the whole chart.
#[derive(Debug, Deserialize)]
struct RawNote {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    time: Option<f64>,
    #[serde(default)]
    lane: Option<f64>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChartData {
    pub music_id: String,
    pub title: String,
    pub artist: String,
    pub difficulty: u32,
    pub notes: Vec<Note>,
    /// Notes dropped while loading because they could not be placed.
    pub dropped: usize,
    /// Notes whose id repeated an earlier one and got a fresh id.
    pub renamed: usize,
}

impl ChartData {
    /// An empty chart means "play generated notes".
    pub fn is_procedural(&self) -> bool {
        self.notes.is_empty()
    }
}

fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[inline(always)]
fn as_whole_ms(v: f64) -> Option<i64> {
    v.is_finite().then(|| v.round() as i64)
}

struct Placed {
    id: String,
    time_ms: i64,
    lane: i64,
    hold_ms: Option<i64>,
}

fn place(idx: usize, raw: &RawNote) -> Option<Placed> {
    let id = raw
        .id
        .as_ref()
        .and_then(value_to_string)
        .unwrap_or_else(|| format!("chart-note-{idx}"));
    let Some(time_ms) = raw.time.and_then(as_whole_ms) else {
        warn!("Dropping chart note {id}: missing or invalid time");
        return None;
    };
    if time_ms < 0 {
        warn!("Dropping chart note {id}: negative time {time_ms}");
        return None;
    }
    if time_ms > MAX_CHART_MS {
        warn!("Dropping chart note {id}: time {time_ms} past {MAX_CHART_MS}ms");
        return None;
    }
    let lane = match raw.lane {
        Some(l) if l.is_finite() && l.fract() == 0.0 => l as i64,
        _ => {
            warn!("Dropping chart note {id}: missing or invalid lane");
            return None;
        }
    };
    let is_hold = raw
        .kind
        .as_deref()
        .is_some_and(|k| k.eq_ignore_ascii_case("hold"));
    let hold_ms = if is_hold {
        match raw.duration.and_then(as_whole_ms) {
            Some(d) if d > MAX_CHART_MS => {
                warn!("Dropping chart note {id}: hold duration {d} past {MAX_CHART_MS}ms");
                return None;
            }
            Some(d) if d > 0 => Some(d),
            _ => {
                warn!("Chart note {id} is a hold without a positive duration; treating as tap");
                None
            }
        }
    } else {
        None
    };
    Some(Placed {
        id,
        time_ms,
        lane,
        hold_ms,
    })
}

/// Gives every repeated id a fresh `<id>~<n>` id so notes stay distinct.
fn dedupe_ids(placed: &mut [Placed]) -> usize {
    let mut seen: FxHashSet<String> = placed.iter().map(|p| p.id.clone()).collect();
    let mut first: FxHashSet<String> = FxHashSet::default();
    let mut renamed = 0;
    for p in placed.iter_mut() {
        if first.insert(p.id.clone()) {
            continue;
        }
        let mut n = 2;
        let mut fresh = format!("{}~{n}", p.id);
        while seen.contains(&fresh) {
            n += 1;
            fresh = format!("{}~{n}", p.id);
        }
        warn!("Chart note id {} is repeated (lane {}); renaming to {fresh}", p.id, p.lane);
        seen.insert(fresh.clone());
        p.id = fresh;
        renamed += 1;
    }
    renamed
}

/// Turns raw chart notes into engine notes. Charts authored with lanes
/// numbered 1..=4 are shifted down to 0..=3; anything still outside the
/// playfield afterwards is dropped.
fn build_notes(raw: &[RawNote]) -> (Vec<Note>, usize, usize) {
    let mut placed: Vec<Placed> = raw
        .iter()
        .enumerate()
        .filter_map(|(idx, n)| place(idx, n))
        .collect();
    let mut dropped = raw.len() - placed.len();
    let renamed = dedupe_ids(&mut placed);

    let one_based = !placed.is_empty()
        && placed
            .iter()
            .all(|p| (1..=LANE_COUNT as i64).contains(&p.lane))
        && placed.iter().any(|p| p.lane == LANE_COUNT as i64);
    if one_based {
        debug!("Chart lanes look 1-based; shifting to 0-based");
    }

    let mut notes = Vec::with_capacity(placed.len());
    for p in placed {
        let lane = if one_based { p.lane - 1 } else { p.lane };
        if !(0..LANE_COUNT as i64).contains(&lane) {
            warn!("Dropping chart note {}: lane {} outside the playfield", p.id, p.lane);
            dropped += 1;
            continue;
        }
        let lane = lane as usize;
        notes.push(match p.hold_ms {
            Some(d) => Note::hold(p.id, p.time_ms, lane, d),
            None => Note::tap(p.id, p.time_ms, lane),
        });
    }
    notes.sort_by_key(|n| n.time_ms);
    (notes, dropped, renamed)
}

pub fn parse_chart(json: &str) -> Result<ChartData, ChartError> {
    let raw: RawChart = serde_json::from_str(json)?;
    Ok(from_raw(raw))
}

pub fn parse_chart_value(value: Value) -> Result<ChartData, ChartError> {
    let raw: RawChart = serde_json::from_value(value)?;
    Ok(from_raw(raw))
}

fn from_raw(raw: RawChart) -> ChartData {
    let (notes, dropped, renamed) = build_notes(&raw.notes);
    let music_id = raw
        .music_id
        .as_ref()
        .and_then(value_to_string)
        .or_else(|| raw.id.as_ref().and_then(value_to_string))
        .unwrap_or_default();
    let difficulty = raw
        .difficulty
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map_or(0, |d| d.round() as u32);
    if dropped > 0 {
        warn!("Chart '{music_id}': dropped {dropped} malformed notes");
    }
    ChartData {
        music_id,
        title: raw.title,
        artist: raw.artist,
        difficulty,
        notes,
        dropped,
        renamed,
    }
}

pub fn load_chart_file(path: &Path) -> Result<ChartData, ChartError> {
    let text = fs::read_to_string(path)?;
    let chart = parse_chart(&text)?;
    info!(
        "Loaded chart '{}' ({}) from {:?}: {} notes",
        chart.title,
        chart.music_id,
        path,
        chart.notes.len()
    );
    Ok(chart)
}
