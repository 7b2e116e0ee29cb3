use std::fmt;
use std::sync::Arc;

pub const LANE_COUNT: usize = 4;

/// Stable identity of a note for the lifetime of a session. Chart notes keep
/// the id they were authored with; generated notes get a synthetic one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteId(Arc<str>);

impl NoteId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    #[inline(always)]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NoteKind {
    Tap,
    Hold { duration_ms: i64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    pub time_ms: i64,
    pub lane: usize, // 0..LANE_COUNT
    pub kind: NoteKind,
}

impl Note {
    pub fn tap(id: impl Into<NoteId>, time_ms: i64, lane: usize) -> Self {
        Self {
            id: id.into(),
            time_ms,
            lane,
            kind: NoteKind::Tap,
        }
    }

    pub fn hold(id: impl Into<NoteId>, time_ms: i64, lane: usize, duration_ms: i64) -> Self {
        Self {
            id: id.into(),
            time_ms,
            lane,
            kind: NoteKind::Hold { duration_ms },
        }
    }

    #[inline(always)]
    pub const fn is_hold(&self) -> bool {
        matches!(self.kind, NoteKind::Hold { .. })
    }

    #[inline(always)]
    pub const fn duration_ms(&self) -> i64 {
        match self.kind {
            NoteKind::Tap => 0,
            NoteKind::Hold { duration_ms } => duration_ms,
        }
    }

    /// Time at which the note stops occupying its lane.
    #[inline(always)]
    pub const fn end_time_ms(&self) -> i64 {
        self.time_ms.saturating_add(self.duration_ms())
    }

    /// Latest clock reading at which the note may still be judged. Holds get
    /// their grace period after the tail, not after the head.
    #[inline(always)]
    pub const fn deadline_ms(&self, miss_window_ms: i64) -> i64 {
        self.end_time_ms().saturating_add(miss_window_ms)
    }
}

impl From<String> for NoteId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
