use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::game::gameplay::GameSession;
use crate::game::note::{LANE_COUNT, NoteId};

/// Taps are let go this long after the press.
const TAP_RELEASE_MS: i64 = 30;
/// Holds are let go this long after the tail.
const HOLD_RELEASE_PAD_MS: i64 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AutoKey {
    pub lane: usize,
    pub pressed: bool,
    pub at_ms: i64,
}

/// Scripted player for headless runs. Every live note gets one press with a
/// uniform timing error of up to `jitter_ms` either way.
#[derive(Debug)]
pub struct AutoPlayer {
    rng: StdRng,
    jitter_ms: i64,
    planned: FxHashMap<NoteId, i64>,
    done: FxHashSet<NoteId>,
    releases: Vec<AutoKey>,
    down: [bool; LANE_COUNT],
}

impl AutoPlayer {
    pub fn new(jitter_ms: i64, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            jitter_ms: jitter_ms.max(0),
            planned: FxHashMap::default(),
            done: FxHashSet::default(),
            releases: Vec::new(),
            down: [false; LANE_COUNT],
        }
    }

    /// Key edges the bot wants applied up to `now_ms`, in time order.
    pub fn poll(&mut self, session: &GameSession, now_ms: i64) -> SmallVec<[AutoKey; 8]> {
        let mut out: SmallVec<[AutoKey; 8]> = SmallVec::new();

        // Releases first so a lane is free again for the next press.
        self.releases.sort_by_key(|k| k.at_ms);
        let due = self.releases.partition_point(|k| k.at_ms <= now_ms);
        for key in self.releases.drain(..due) {
            self.down[key.lane] = false;
            out.push(key);
        }

        for note in session.live_notes() {
            if self.done.contains(&note.id) {
                continue;
            }
            let jitter = self.jitter_ms;
            let press_at = *self
                .planned
                .entry(note.id.clone())
                .or_insert_with(|| note.time_ms + self.rng.random_range(-jitter..=jitter));
            if press_at > now_ms || self.down[note.lane] {
                continue;
            }
            self.planned.remove(&note.id);
            self.done.insert(note.id.clone());
            self.down[note.lane] = true;
            out.push(AutoKey {
                lane: note.lane,
                pressed: true,
                at_ms: press_at,
            });
            let release_at = if note.is_hold() {
                note.end_time_ms() + HOLD_RELEASE_PAD_MS
            } else {
                press_at + TAP_RELEASE_MS
            };
            self.releases.push(AutoKey {
                lane: note.lane,
                pressed: false,
                at_ms: release_at,
            });
            trace!("AUTOPLAY: id={}, lane={}, press={press_at}, release={release_at}", note.id, note.lane);
        }

        out.sort_by_key(|k| (k.at_ms, k.pressed));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::gameplay::{SessionOptions, TickEvent};
    use crate::game::note::Note;
    use crate::game::note_source::NoteSource;

    #[test]
    fn zero_jitter_bot_plays_all_perfect() {
        let notes = vec![
            Note::tap("a", 1000, 0),
            Note::tap("b", 1200, 1),
            Note::hold("c", 1400, 2, 600),
            Note::tap("d", 1600, 0),
        ];
        let mut session = GameSession::new(
            SessionOptions::default(),
            NoteSource::from_chart(notes, 600, 150),
        );
        let mut bot = AutoPlayer::new(0, 1);
        let mut now = 0;
        let mut completed = false;
        while !completed && now < 10_000 {
            now += 16;
            for key in bot.poll(&session, now) {
                session.queue_input_edge(key.lane, key.pressed, key.at_ms);
            }
            let report = session.advance(now);
            completed = report.completed;
            assert!(!report.events.iter().any(|e| matches!(e, TickEvent::HoldFailed { .. })));
        }
        assert!(completed);
        let r = session.result();
        assert!(r.is_all_perfect);
        assert_eq!(r.perfect, 5);
        assert_eq!(r.total_resolved, 4);
    }
}
