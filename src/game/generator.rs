use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::game::note::{LANE_COUNT, Note};

pub const NOTE_BATCH_SIZE: usize = 8;
pub const NOTE_RENEW_THRESHOLD: usize = 6;
pub const NOTE_INITIAL_DELAY_MS: i64 = 1;
pub const NOTE_MIN_INTERVAL_MS: i64 = 120;
pub const NOTE_MAX_INTERVAL_MS: i64 = 320;
pub const NOTE_DENSITY_MULTIPLIER: f64 = 1.7;
pub const NOTE_BURST_CHANCE: f64 = 0.6;
pub const NOTE_BURST_COUNT: usize = 2;
pub const HOLD_CHANCE: f64 = 0.25;
pub const HOLD_MIN_DURATION_MS: i64 = 1000;
pub const HOLD_MAX_DURATION_MS: i64 = 2000;
pub const NOTE_DISPLAY_TIME_MS: i64 = 600;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorConfig {
    pub batch_size: usize,
    pub renew_threshold: usize,
    pub initial_delay_ms: i64,
    pub min_interval_ms: i64,
    pub max_interval_ms: i64,
    pub density_multiplier: f64,
    pub burst_chance: f64,
    pub burst_count: usize,
    pub hold_chance: f64,
    pub min_hold_ms: i64,
    pub max_hold_ms: i64,
    pub display_window_ms: i64,
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            batch_size: NOTE_BATCH_SIZE,
            renew_threshold: NOTE_RENEW_THRESHOLD,
            initial_delay_ms: NOTE_INITIAL_DELAY_MS,
            min_interval_ms: NOTE_MIN_INTERVAL_MS,
            max_interval_ms: NOTE_MAX_INTERVAL_MS,
            density_multiplier: NOTE_DENSITY_MULTIPLIER,
            burst_chance: NOTE_BURST_CHANCE,
            burst_count: NOTE_BURST_COUNT,
            hold_chance: HOLD_CHANCE,
            min_hold_ms: HOLD_MIN_DURATION_MS,
            max_hold_ms: HOLD_MAX_DURATION_MS,
            display_window_ms: NOTE_DISPLAY_TIME_MS,
            seed: None,
        }
    }
}

impl GeneratorConfig {
    /// Clamps ranges so sampling can never panic on an inverted interval or
    /// an out-of-range probability.
    pub fn sanitized(mut self) -> Self {
        self.batch_size = self.batch_size.max(1);
        self.min_interval_ms = self.min_interval_ms.max(1);
        self.max_interval_ms = self.max_interval_ms.max(self.min_interval_ms);
        self.min_hold_ms = self.min_hold_ms.max(1);
        self.max_hold_ms = self.max_hold_ms.max(self.min_hold_ms);
        self.display_window_ms = self.display_window_ms.max(0);
        self.burst_count = self.burst_count.min(LANE_COUNT - 1);
        if !self.density_multiplier.is_finite() || self.density_multiplier <= 0.0 {
            self.density_multiplier = 1.0;
        }
        self.burst_chance = clamp_probability(self.burst_chance);
        self.hold_chance = clamp_probability(self.hold_chance);
        self
    }

    #[inline(always)]
    pub fn target_count(&self) -> usize {
        ((self.batch_size as f64 * self.density_multiplier).round() as usize).max(1)
    }
}

#[inline(always)]
fn clamp_probability(p: f64) -> f64 {
    if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 }
}

/// Endless note stream. Each batch continues where the last one stopped and
/// a lane only takes a new note once its previous note (including a hold
/// body) has cleared by at least the minimum interval.
#[derive(Debug, Clone)]
pub struct NoteGenerator {
    cfg: GeneratorConfig,
    rng: StdRng,
    session_tag: String,
    next_seq: u64,
    last_time_ms: Option<i64>,
    busy_until_ms: [Option<i64>; LANE_COUNT],
}

impl NoteGenerator {
    pub fn new(cfg: GeneratorConfig, session_tag: impl Into<String>) -> Self {
        let cfg = cfg.sanitized();
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            cfg,
            rng,
            session_tag: session_tag.into(),
            next_seq: 0,
            last_time_ms: None,
            busy_until_ms: [None; LANE_COUNT],
        }
    }

    pub const fn config(&self) -> &GeneratorConfig {
        &self.cfg
    }

    pub const fn last_time_ms(&self) -> Option<i64> {
        self.last_time_ms
    }

    /// Whether a live set of `live_count` notes has run low enough to ask
    /// for another batch.
    #[inline(always)]
    pub const fn wants_batch(&self, live_count: usize) -> bool {
        live_count <= self.cfg.renew_threshold
    }

    /// First slot of the next batch: never closer to the last generated note
    /// than the minimum interval and never inside the visible window.
    pub fn next_start_ms(&self, now_ms: i64) -> i64 {
        let horizon = now_ms + self.cfg.display_window_ms;
        match self.last_time_ms {
            Some(last) => (last + self.cfg.min_interval_ms).max(horizon),
            None => self.cfg.initial_delay_ms.max(horizon),
        }
    }

    fn lane_free(&self, lane: usize, t: i64) -> bool {
        self.busy_until_ms[lane].is_none_or(|busy| t >= busy + self.cfg.min_interval_ms)
    }

    fn pick_lane(&mut self, t: i64, taken: &[usize]) -> Option<usize> {
        let mut free = [0usize; LANE_COUNT];
        let mut n = 0;
        for lane in 0..LANE_COUNT {
            if !taken.contains(&lane) && self.lane_free(lane, t) {
                free[n] = lane;
                n += 1;
            }
        }
        (n > 0).then(|| free[self.rng.random_range(0..n)])
    }

    fn make_note(&mut self, t: i64, lane: usize) -> Note {
        let id = format!("gen-{}-{}", self.session_tag, self.next_seq);
        self.next_seq += 1;
        let note = if self.rng.random_bool(self.cfg.hold_chance) {
            let duration = self
                .rng
                .random_range(self.cfg.min_hold_ms..=self.cfg.max_hold_ms);
            Note::hold(id, t, lane, duration)
        } else {
            Note::tap(id, t, lane)
        };
        self.busy_until_ms[lane] = Some(note.end_time_ms());
        note
    }

    /// Produces one batch starting at `start_ms`. Slots where every lane is
    /// still busy are skipped rather than stacked.
    pub fn generate_batch(&mut self, start_ms: i64) -> Vec<Note> {
        let target = self.cfg.target_count();
        let mut notes = Vec::with_capacity(target * (1 + self.cfg.burst_count));
        let mut t = start_ms;
        let mut skipped = 0usize;

        for _ in 0..target {
            let mut taken: Vec<usize> = Vec::with_capacity(1 + self.cfg.burst_count);
            match self.pick_lane(t, &taken) {
                Some(lane) => {
                    taken.push(lane);
                    notes.push(self.make_note(t, lane));
                    if self.rng.random_bool(self.cfg.burst_chance) {
                        for _ in 0..self.cfg.burst_count {
                            let Some(extra) = self.pick_lane(t, &taken) else {
                                break;
                            };
                            taken.push(extra);
                            notes.push(self.make_note(t, extra));
                        }
                    }
                    self.last_time_ms = Some(t);
                }
                None => skipped += 1,
            }
            t += self
                .rng
                .random_range(self.cfg.min_interval_ms..=self.cfg.max_interval_ms);
        }

        // An all-skipped batch still moves the cursor so the next one does
        // not retry the same congested slot.
        if notes.is_empty() {
            self.last_time_ms = Some(t - self.cfg.min_interval_ms);
        }

        debug!(
            "Generated batch: start={start_ms}, notes={}, skipped_slots={skipped}, last={:?}",
            notes.len(),
            self.last_time_ms
        );
        notes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashSet;

    fn seeded(seed: u64) -> NoteGenerator {
        NoteGenerator::new(
            GeneratorConfig {
                seed: Some(seed),
                ..GeneratorConfig::default()
            },
            "t",
        )
    }

    #[test]
    fn same_seed_same_notes() {
        let a = seeded(7).generate_batch(1000);
        let b = seeded(7).generate_batch(1000);
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn lanes_never_overlap() {
        let mut g = seeded(42);
        let mut all = Vec::new();
        let mut start = 1000;
        for _ in 0..50 {
            let batch = g.generate_batch(start);
            all.extend(batch);
            start = g.next_start_ms(0);
        }
        let min_gap = g.config().min_interval_ms;
        for lane in 0..LANE_COUNT {
            let mut in_lane: Vec<&Note> = all.iter().filter(|n| n.lane == lane).collect();
            in_lane.sort_by_key(|n| n.time_ms);
            for pair in in_lane.windows(2) {
                assert!(
                    pair[1].time_ms >= pair[0].end_time_ms() + min_gap,
                    "lane {lane}: {:?} overlaps {:?}",
                    pair[0],
                    pair[1]
                );
            }
        }
    }

    #[test]
    fn ids_are_unique_and_tagged() {
        let mut g = seeded(3);
        let mut ids = FxHashSet::default();
        for n in g.generate_batch(0).into_iter().chain(g.generate_batch(10_000)) {
            assert!(n.id.as_str().starts_with("gen-t-"));
            assert!(ids.insert(n.id));
        }
    }

    #[test]
    fn next_batch_stays_out_of_display_window() {
        let mut g = seeded(1);
        assert_eq!(g.next_start_ms(0), NOTE_DISPLAY_TIME_MS);
        g.generate_batch(600);
        let last = g.last_time_ms().unwrap();
        assert_eq!(g.next_start_ms(0), last + NOTE_MIN_INTERVAL_MS);
        assert_eq!(g.next_start_ms(last + 5000), last + 5000 + NOTE_DISPLAY_TIME_MS);
    }

    #[test]
    fn batch_times_are_non_decreasing() {
        let notes = seeded(99).generate_batch(500);
        assert!(notes.windows(2).all(|w| w[0].time_ms <= w[1].time_ms));
        assert!(notes.iter().all(|n| n.lane < LANE_COUNT));
    }

    #[test]
    fn sanitized_repairs_bad_ranges() {
        let cfg = GeneratorConfig {
            min_interval_ms: 300,
            max_interval_ms: 100,
            hold_chance: 3.0,
            burst_count: 9,
            density_multiplier: f64::NAN,
            ..GeneratorConfig::default()
        }
        .sanitized();
        assert_eq!(cfg.max_interval_ms, 300);
        assert_eq!(cfg.hold_chance, 1.0);
        assert_eq!(cfg.burst_count, LANE_COUNT - 1);
        assert_eq!(cfg.target_count(), NOTE_BATCH_SIZE);
    }
}
