use log::info;

use crate::game::note::NoteId;
use crate::game::note_source::NoteSource;
use crate::game::scores::ScoreLedger;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SweptNote {
    pub note_id: NoteId,
    pub lane: usize,
    pub note_time_ms: i64,
    pub swept_at_ms: i64,
}

/// Resolves as Miss every live note whose deadline (`time + miss` for taps,
/// `time + duration + miss` for holds) is strictly behind `now_ms`. Sweep
/// misses carry no early/late information.
pub fn apply_time_based_misses(
    source: &mut NoteSource,
    ledger: &mut ScoreLedger,
    now_ms: i64,
    miss_window_ms: i64,
) -> Vec<SweptNote> {
    let expired = source.take_expired(now_ms, miss_window_ms);
    let mut out = Vec::with_capacity(expired.len());
    for note in expired {
        ledger.record_sweep_miss(&note.id);
        info!(
            "TIMING MISS: id={}, lane={}, note_time_ms={}, deadline_ms={}, miss_time_ms={now_ms}",
            note.id,
            note.lane,
            note.time_ms,
            note.deadline_ms(miss_window_ms)
        );
        out.push(SweptNote {
            note_id: note.id,
            lane: note.lane,
            note_time_ms: note.time_ms,
            swept_at_ms: now_ms,
        });
    }
    out
}
