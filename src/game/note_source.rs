use std::collections::VecDeque;

use log::{debug, error, info, warn};
use rustc_hash::FxHashSet;

use crate::game::generator::NoteGenerator;
use crate::game::note::{LANE_COUNT, Note, NoteId};

#[derive(Debug, Clone)]
struct LiveEntry {
    seq: u64,
    note: Note,
}

/// Notes that may currently be judged or swept, bucketed by lane and kept in
/// time order inside each lane.
#[derive(Debug, Clone, Default)]
pub struct LiveSet {
    lanes: [VecDeque<LiveEntry>; LANE_COUNT],
    next_seq: u64,
    len: usize,
}

impl LiveSet {
    pub fn insert(&mut self, note: Note) {
        let Some(lane) = self.lanes.get_mut(note.lane) else {
            error!("Dropping note {} with out-of-range lane {}", note.id, note.lane);
            return;
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        // Stable: equal times keep insertion order.
        let at = lane.partition_point(|e| e.note.time_ms <= note.time_ms);
        lane.insert(at, LiveEntry { seq, note });
        self.len += 1;
    }

    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn lane(&self, lane: usize) -> impl Iterator<Item = &Note> {
        self.lanes
            .get(lane)
            .into_iter()
            .flat_map(|entries| entries.iter().map(|e| &e.note))
    }

    /// Every live note, ordered by time and then by insertion.
    pub fn all(&self) -> Vec<&Note> {
        let mut entries: Vec<&LiveEntry> = self.lanes.iter().flatten().collect();
        entries.sort_by_key(|e| (e.note.time_ms, e.seq));
        entries.into_iter().map(|e| &e.note).collect()
    }

    /// Nearest note to `at_ms` in `lane` no farther than `max_offset_ms`.
    /// Equal distances resolve to the earlier scheduled note.
    pub fn closest_in_lane(&self, lane: usize, at_ms: i64, max_offset_ms: i64) -> Option<&Note> {
        let mut best: Option<(&Note, i64)> = None;
        for note in self.lane(lane) {
            if note.time_ms - at_ms > max_offset_ms {
                break;
            }
            let err = (note.time_ms - at_ms).abs();
            if err > max_offset_ms {
                continue;
            }
            match best {
                Some((_, best_err)) if err >= best_err => {}
                _ => best = Some((note, err)),
            }
        }
        best.map(|(note, _)| note)
    }

    pub fn remove(&mut self, id: &NoteId) -> Option<Note> {
        for lane in &mut self.lanes {
            if let Some(pos) = lane.iter().position(|e| &e.note.id == id) {
                self.len -= 1;
                return lane.remove(pos).map(|e| e.note);
            }
        }
        None
    }

    /// Removes and returns every note whose judgement deadline lies strictly
    /// before `now_ms`.
    pub fn take_expired(&mut self, now_ms: i64, miss_window_ms: i64) -> Vec<Note> {
        let mut expired = Vec::new();
        for lane in &mut self.lanes {
            let before = lane.len();
            let mut kept = VecDeque::with_capacity(before);
            for entry in lane.drain(..) {
                if now_ms > entry.note.deadline_ms(miss_window_ms) {
                    expired.push(entry);
                } else {
                    kept.push_back(entry);
                }
            }
            *lane = kept;
        }
        self.len -= expired.len();
        expired.sort_by_key(|e| (e.note.time_ms, e.seq));
        expired.into_iter().map(|e| e.note).collect()
    }

    pub fn clear(&mut self) {
        for lane in &mut self.lanes {
            lane.clear();
        }
        self.len = 0;
    }
}

/// Where new notes come from.
#[derive(Debug, Clone)]
pub enum NoteFeed {
    /// Finite, pre-sorted chart notes that have not been presented yet.
    Chart {
        pending: VecDeque<Note>,
        lookahead_ms: i64,
    },
    /// Endless generated notes; stops once sealed.
    Procedural(NoteGenerator),
}

#[derive(Debug, Clone)]
pub struct NoteSource {
    feed: NoteFeed,
    live: LiveSet,
    sealed: bool,
}

impl NoteSource {
    /// `lookahead_ms` is clamped up to `miss_window_ms` so no note can fall
    /// inside the judgement window before it is live. Notes repeating an
    /// earlier id are dropped; ids must be unique for the whole session.
    pub fn from_chart(mut notes: Vec<Note>, lookahead_ms: i64, miss_window_ms: i64) -> Self {
        let mut seen: FxHashSet<NoteId> = FxHashSet::default();
        notes.retain(|n| {
            let fresh = seen.insert(n.id.clone());
            if !fresh {
                warn!("Dropping note {} in lane {}: id already used", n.id, n.lane);
            }
            fresh
        });
        notes.sort_by_key(|n| n.time_ms);
        let lookahead_ms = lookahead_ms.max(miss_window_ms);
        info!(
            "Chart note source: {} notes, lookahead={lookahead_ms}ms",
            notes.len()
        );
        Self {
            feed: NoteFeed::Chart {
                pending: notes.into(),
                lookahead_ms,
            },
            live: LiveSet::default(),
            sealed: false,
        }
    }

    pub fn procedural(generator: NoteGenerator) -> Self {
        info!(
            "Procedural note source: batch={}, density={}",
            generator.config().batch_size,
            generator.config().density_multiplier
        );
        Self {
            feed: NoteFeed::Procedural(generator),
            live: LiveSet::default(),
            sealed: false,
        }
    }

    pub const fn is_procedural(&self) -> bool {
        matches!(self.feed, NoteFeed::Procedural(_))
    }

    /// Presents chart notes whose lookahead has been reached, or tops up the
    /// generated stream when it runs low. Returns the number of notes added.
    pub fn refill(&mut self, now_ms: i64) -> usize {
        if self.sealed {
            return 0;
        }
        match &mut self.feed {
            NoteFeed::Chart {
                pending,
                lookahead_ms,
            } => {
                let mut added = 0;
                while pending
                    .front()
                    .is_some_and(|n| n.time_ms - *lookahead_ms <= now_ms)
                {
                    if let Some(note) = pending.pop_front() {
                        self.live.insert(note);
                        added += 1;
                    }
                }
                added
            }
            NoteFeed::Procedural(generator) => {
                if !generator.wants_batch(self.live.len()) {
                    return 0;
                }
                let start = generator.next_start_ms(now_ms);
                let batch = generator.generate_batch(start);
                let added = batch.len();
                for note in batch {
                    self.live.insert(note);
                }
                added
            }
        }
    }

    pub const fn live(&self) -> &LiveSet {
        &self.live
    }

    pub fn live_notes(&self) -> Vec<&Note> {
        self.live.all()
    }

    pub fn closest_in_lane(&self, lane: usize, at_ms: i64, max_offset_ms: i64) -> Option<&Note> {
        self.live.closest_in_lane(lane, at_ms, max_offset_ms)
    }

    /// Takes a note out of the live set for good. Asking for an id that is
    /// not live means some caller already consumed it.
    pub fn remove(&mut self, id: &NoteId) -> Option<Note> {
        let removed = self.live.remove(id);
        debug_assert!(removed.is_some(), "removed unknown note {id}");
        if removed.is_none() {
            error!("Tried to remove note {id}, which is not live");
        }
        removed
    }

    pub fn take_expired(&mut self, now_ms: i64, miss_window_ms: i64) -> Vec<Note> {
        self.live.take_expired(now_ms, miss_window_ms)
    }

    /// Stops producing notes. Chart notes that were never presented are
    /// discarded along with the rest of the feed.
    pub fn seal(&mut self) {
        if self.sealed {
            return;
        }
        self.sealed = true;
        if let NoteFeed::Chart { pending, .. } = &mut self.feed
            && !pending.is_empty()
        {
            debug!("Sealing chart source with {} unpresented notes", pending.len());
            pending.clear();
        }
    }

    /// Discards live notes without resolving them (teardown only).
    pub fn clear_live(&mut self) {
        self.live.clear();
    }

    /// No note will ever be judged again: nothing live and nothing left to
    /// present. A generated stream only ends once sealed.
    pub fn is_exhausted(&self) -> bool {
        if !self.live.is_empty() {
            return false;
        }
        match &self.feed {
            NoteFeed::Chart { pending, .. } => pending.is_empty(),
            NoteFeed::Procedural(_) => self.sealed,
        }
    }
}
