use std::collections::VecDeque;

use log::{debug, error, info, warn};
use smallvec::SmallVec;

use crate::game::chart::ChartData;
use crate::game::generator::{GeneratorConfig, NOTE_DISPLAY_TIME_MS, NoteGenerator};
use crate::game::hold::{ActiveHold, HoldOutcome, HoldResult, HoldTracker};
use crate::game::judgment::{JudgeGrade, Judgment, ScoreTable, Timing};
use crate::game::note::{LANE_COUNT, Note, NoteId};
use crate::game::note_source::NoteSource;
use crate::game::scores::{ResultState, ScoreLedger, ScoringPolicy};
use crate::game::sweep::{self, SweptNote};
use crate::game::timing_stats::{self, TimingStats};
use crate::game::timing_windows::{TimingWindows, classify_offset_ms};

pub const MEDIA_END_GRACE_MS: i64 = 1000;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub music_id: String,
    pub difficulty: u32,
    pub windows: TimingWindows,
    pub score_table: ScoreTable,
    pub scoring: ScoringPolicy,
    /// How long before its time a chart note becomes live.
    pub lookahead_ms: i64,
    /// Completion also waits for `notify_media_end` plus the grace period.
    pub wait_for_media_end: bool,
    pub media_grace_ms: i64,
    pub generator: GeneratorConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            music_id: String::new(),
            difficulty: 0,
            windows: TimingWindows::default(),
            score_table: ScoreTable::default(),
            scoring: ScoringPolicy::default(),
            lookahead_ms: NOTE_DISPLAY_TIME_MS,
            wait_for_media_end: false,
            media_grace_ms: MEDIA_END_GRACE_MS,
            generator: GeneratorConfig::default(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InputEdge {
    pub lane: usize,
    pub pressed: bool,
    pub at_ms: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TickEvent {
    Judged(Judgment),
    HoldStarted { note_id: NoteId, lane: usize, end_ms: i64 },
    HoldCompleted { note_id: NoteId, lane: usize, at_ms: i64, points: u64 },
    HoldFailed { note_id: NoteId, lane: usize, at_ms: i64 },
    SweepMiss(SweptNote),
    Completed(ResultState),
}

pub type TickEvents = SmallVec<[TickEvent; 8]>;

/// Everything that happened during one `advance`, for the UI.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    pub now_ms: i64,
    pub events: TickEvents,
    pub completed: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Playing,
    Complete,
    TornDown,
}

/// One play of one chart (or one generated run). Owns the note source, the
/// hold tracker and the score ledger; nothing else mutates them.
#[derive(Debug)]
pub struct GameSession {
    opts: SessionOptions,
    source: NoteSource,
    holds: HoldTracker,
    ledger: ScoreLedger,
    pending_edges: VecDeque<InputEdge>,
    lanes_down: [bool; LANE_COUNT],
    events: TickEvents,
    judgments: Vec<Judgment>,
    media_end_ms: Option<i64>,
    last_now_ms: i64,
    status: SessionStatus,
    result: Option<ResultState>,
}

impl GameSession {
    pub fn new(opts: SessionOptions, source: NoteSource) -> Self {
        let mut opts = opts;
        opts.windows = opts.windows.normalized();
        let ledger = ScoreLedger::new(
            opts.music_id.clone(),
            opts.difficulty,
            opts.score_table,
            opts.scoring,
        );
        info!(
            "Starting session: music_id='{}', difficulty={}, procedural={}, windows={:?}",
            opts.music_id,
            opts.difficulty,
            source.is_procedural(),
            opts.windows.as_array()
        );
        Self {
            opts,
            source,
            holds: HoldTracker::new(),
            ledger,
            pending_edges: VecDeque::new(),
            lanes_down: [false; LANE_COUNT],
            events: TickEvents::new(),
            judgments: Vec::new(),
            media_end_ms: None,
            last_now_ms: 0,
            status: SessionStatus::Playing,
            result: None,
        }
    }

    /// Builds the note source from a loaded chart. A chart without notes
    /// switches to generated play.
    pub fn from_chart(mut opts: SessionOptions, chart: ChartData) -> Self {
        if opts.music_id.is_empty() {
            opts.music_id.clone_from(&chart.music_id);
        }
        if opts.difficulty == 0 {
            opts.difficulty = chart.difficulty;
        }
        let source = if chart.is_procedural() {
            Self::procedural_source(&opts)
        } else {
            let miss = opts.windows.normalized().miss_ms;
            NoteSource::from_chart(chart.notes, opts.lookahead_ms, miss)
        };
        Self::new(opts, source)
    }

    pub fn procedural(opts: SessionOptions) -> Self {
        let source = Self::procedural_source(&opts);
        Self::new(opts, source)
    }

    fn procedural_source(opts: &SessionOptions) -> NoteSource {
        let tag = if opts.music_id.is_empty() {
            chrono::Local::now().format("%H%M%S").to_string()
        } else {
            opts.music_id.clone()
        };
        NoteSource::procedural(NoteGenerator::new(opts.generator, tag))
    }

    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status == SessionStatus::Complete
    }

    pub const fn options(&self) -> &SessionOptions {
        &self.opts
    }

    pub const fn windows(&self) -> &TimingWindows {
        &self.opts.windows
    }

    pub const fn is_lane_down(&self, lane: usize) -> bool {
        lane < LANE_COUNT && self.lanes_down[lane]
    }

    /// Queues a key edge; it is applied during the next `advance`.
    pub fn queue_input_edge(&mut self, lane: usize, pressed: bool, at_ms: i64) {
        if lane >= LANE_COUNT {
            warn!("Ignoring input edge for lane {lane}");
            return;
        }
        if self.status != SessionStatus::Playing {
            return;
        }
        self.pending_edges.push_back(InputEdge {
            lane,
            pressed,
            at_ms,
        });
    }

    /// Focus loss: every lane that is down gets a release edge at `at_ms`.
    pub fn release_all(&mut self, at_ms: i64) {
        // Include lanes whose press is still queued.
        let mut down = self.lanes_down;
        for edge in &self.pending_edges {
            down[edge.lane] = edge.pressed;
        }
        for (lane, is_down) in down.into_iter().enumerate() {
            if is_down {
                self.queue_input_edge(lane, false, at_ms);
            }
        }
    }

    /// Judges a key-down in `lane` at `at_ms` against the nearest live note,
    /// bypassing the edge queue. The lane counts as held until a release
    /// edge is queued for it. Presses with no note inside the miss window do
    /// nothing.
    pub fn judge_press(&mut self, lane: usize, at_ms: i64) -> Option<Judgment> {
        if self.status != SessionStatus::Playing || lane >= LANE_COUNT {
            return None;
        }
        self.lanes_down[lane] = true;
        self.judge_lane(lane, at_ms)
    }

    fn judge_lane(&mut self, lane: usize, at_ms: i64) -> Option<Judgment> {
        let windows = self.opts.windows;
        let (note_id, offset_ms, grade) = {
            let note = self.source.closest_in_lane(lane, at_ms, windows.miss_ms)?;
            let offset_ms = note.time_ms - at_ms;
            (note.id.clone(), offset_ms, classify_offset_ms(offset_ms, &windows)?)
        };
        let note = self.source.remove(&note_id)?;

        let timing = Timing::from_offset_ms(offset_ms);
        let points = self.ledger.record_press(grade, timing, at_ms);
        let judgment = Judgment {
            note_id: note.id.clone(),
            lane,
            grade,
            offset_ms,
            timing,
            judged_at_ms: at_ms,
            is_hold_start: note.is_hold(),
        };

        debug!(
            "TIMING HIT: grade={:?}, id={}, lane={lane}, note_time_ms={}, press_ms={at_ms}, offset_ms={offset_ms}, timing={timing:?}, points={points}, combo={}",
            grade,
            note.id,
            note.time_ms,
            self.ledger.current_combo()
        );

        self.judgments.push(judgment.clone());
        self.events.push(TickEvent::Judged(judgment.clone()));

        if note.is_hold() && grade.is_hit() {
            self.start_hold(&note, at_ms);
        } else {
            self.ledger.resolve(&note.id);
        }
        Some(judgment)
    }

    fn start_hold(&mut self, note: &Note, at_ms: i64) {
        // A press can only land here while a hold is active if its release
        // edge never arrived; settle that hold first.
        if self.holds.is_holding(note.lane) {
            warn!("Lane {} pressed while a hold was active; releasing it", note.lane);
            if let Some(outcome) = self.holds.release(note.lane, at_ms) {
                self.apply_hold_outcome(outcome);
            }
        }
        match self.holds.arm(note, at_ms) {
            Ok(()) => self.events.push(TickEvent::HoldStarted {
                note_id: note.id.clone(),
                lane: note.lane,
                end_ms: note.end_time_ms(),
            }),
            Err(busy) => {
                debug_assert!(false, "lane {} still busy after release", busy.lane);
                error!("Could not arm hold {}; resolving it without a tail", note.id);
                self.ledger.resolve(&note.id);
            }
        }
    }

    fn apply_hold_outcome(&mut self, outcome: HoldOutcome) {
        let HoldOutcome {
            note_id,
            lane,
            result,
            at_ms,
        } = outcome;
        match result {
            HoldResult::Completed => {
                let points = self.ledger.record_hold_complete(&note_id, at_ms);
                info!("HOLD OK: id={note_id}, lane={lane}, at_ms={at_ms}, points={points}");
                self.events.push(TickEvent::HoldCompleted {
                    note_id,
                    lane,
                    at_ms,
                    points,
                });
            }
            HoldResult::Failed => {
                self.ledger.record_hold_fail(&note_id);
                info!("HOLD NG: id={note_id}, lane={lane}, at_ms={at_ms}");
                self.events.push(TickEvent::HoldFailed {
                    note_id,
                    lane,
                    at_ms,
                });
            }
        }
    }

    fn process_input_edges(&mut self, now_ms: i64) {
        while let Some(edge) = self.pending_edges.pop_front() {
            let lane = edge.lane;
            // Edges stamped ahead of the frame clock are pulled back to it.
            let at_ms = edge.at_ms.min(now_ms);
            let was_down = self.lanes_down[lane];
            self.lanes_down[lane] = edge.pressed;
            if edge.pressed && !was_down {
                self.judge_lane(lane, at_ms);
            } else if !edge.pressed
                && was_down
                && let Some(outcome) = self.holds.release(lane, at_ms)
            {
                self.apply_hold_outcome(outcome);
            }
        }
    }

    /// Media playback finished at `at_ms`. A generated stream stops
    /// producing notes from here on.
    pub fn notify_media_end(&mut self, at_ms: i64) {
        if self.media_end_ms.is_some() {
            return;
        }
        info!("Media ended at {at_ms}ms");
        self.media_end_ms = Some(at_ms);
        if self.source.is_procedural() {
            self.source.seal();
        }
    }

    fn ready_to_complete(&self, now_ms: i64) -> bool {
        if !self.source.is_exhausted() || !self.holds.is_idle() {
            return false;
        }
        if !self.opts.wait_for_media_end {
            return true;
        }
        self.media_end_ms
            .is_some_and(|end| now_ms >= end.saturating_add(self.opts.media_grace_ms))
    }

    /// Runs one tick: refill, sweep, key edges, hold check, completion.
    /// After completion or teardown this does nothing.
    pub fn advance(&mut self, now_ms: i64) -> TickReport {
        if self.status != SessionStatus::Playing {
            return TickReport {
                now_ms,
                ..TickReport::default()
            };
        }
        if now_ms < self.last_now_ms {
            debug!("Clock went backwards ({now_ms} < {}); holding", self.last_now_ms);
        }
        let now_ms = now_ms.max(self.last_now_ms);
        self.last_now_ms = now_ms;

        self.source.refill(now_ms);

        let miss_ms = self.opts.windows.miss_ms;
        let swept = sweep::apply_time_based_misses(&mut self.source, &mut self.ledger, now_ms, miss_ms);
        self.events.extend(swept.into_iter().map(TickEvent::SweepMiss));

        self.process_input_edges(now_ms);

        for outcome in self.holds.check(now_ms, &self.lanes_down) {
            self.apply_hold_outcome(outcome);
        }

        let mut completed = false;
        if self.ready_to_complete(now_ms) {
            let result = self.ledger.freeze();
            info!(
                "Session complete: score={}, accuracy={}%, rank={}, max_combo={}, resolved={}",
                result.score,
                result.accuracy,
                result.rank.as_str(),
                result.max_combo,
                result.total_resolved
            );
            self.events.push(TickEvent::Completed(result.clone()));
            self.result = Some(result);
            self.status = SessionStatus::Complete;
            completed = true;
        }

        TickReport {
            now_ms,
            events: std::mem::take(&mut self.events),
            completed,
        }
    }

    /// Abandons the session: active holds are dropped unscored and the
    /// source stops producing notes.
    pub fn teardown(&mut self) {
        if self.status == SessionStatus::TornDown {
            return;
        }
        let dropped = self.holds.clear();
        self.source.seal();
        self.pending_edges.clear();
        self.events.clear();
        self.status = SessionStatus::TornDown;
        info!("Session torn down ({dropped} active holds dropped)");
    }

    /// Frozen result once complete, otherwise a live snapshot.
    pub fn result(&self) -> ResultState {
        match &self.result {
            Some(r) => r.clone(),
            None => self.ledger.snapshot(),
        }
    }

    pub const fn ledger(&self) -> &ScoreLedger {
        &self.ledger
    }

    pub fn holds_snapshot(&self) -> [Option<ActiveHold>; LANE_COUNT] {
        self.holds.snapshot()
    }

    pub fn live_notes(&self) -> Vec<&Note> {
        self.source.live_notes()
    }

    pub fn judgments(&self) -> &[Judgment] {
        &self.judgments
    }

    pub fn timing_stats(&self) -> TimingStats {
        timing_stats::compute_timing_stats(&self.judgments)
    }

    /// Count of Miss-tier presses, as opposed to sweep and hold misses.
    pub fn pressed_miss_count(&self) -> usize {
        self.judgments
            .iter()
            .filter(|j| j.grade == JudgeGrade::Miss)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart_session(notes: Vec<Note>) -> GameSession {
        GameSession::new(
            SessionOptions {
                music_id: "m".into(),
                ..SessionOptions::default()
            },
            NoteSource::from_chart(notes, 600, 150),
        )
    }

    #[test]
    fn press_outside_window_is_ignored() {
        let mut s = chart_session(vec![Note::tap("a", 1000, 0)]);
        s.advance(500);
        assert!(s.judge_press(0, 700).is_none());
        assert!(s.judge_press(1, 1000).is_none());
        assert_eq!(s.result().judgement_count(), 0);
        assert_eq!(s.live_notes().len(), 1);
    }

    #[test]
    fn miss_tier_press_breaks_combo_and_counts_timing() {
        let mut s = chart_session(vec![Note::tap("a", 1000, 0), Note::tap("b", 1500, 0)]);
        s.advance(900);
        s.judge_press(0, 1000).unwrap();
        let j = s.judge_press(0, 1380).unwrap();
        assert_eq!(j.grade, JudgeGrade::Miss);
        assert_eq!(j.timing, Timing::Early);
        let r = s.result();
        assert_eq!((r.perfect, r.miss, r.early_count, r.late_count), (1, 1, 1, 1));
        assert_eq!(r.current_combo, 0);
        assert_eq!(s.pressed_miss_count(), 1);
    }

    #[test]
    fn direct_press_holds_the_lane_down() {
        let mut s = chart_session(vec![Note::hold("h", 2000, 2, 800)]);
        s.advance(1900);
        let j = s.judge_press(2, 2010).unwrap();
        assert!(j.is_hold_start);
        assert!(s.is_lane_down(2));

        let report = s.advance(2016);
        assert!(!report.events.iter().any(|e| matches!(e, TickEvent::HoldFailed { .. })));
        assert!(s.holds_snapshot()[2].is_some());

        s.queue_input_edge(2, false, 2900);
        let report = s.advance(2900);
        assert!(!report.events.iter().any(|e| matches!(e, TickEvent::HoldFailed { .. })));
        let r = s.result();
        assert_eq!((r.perfect, r.miss), (2, 0));
        assert!(s.is_complete());
    }

    #[test]
    fn repeated_key_down_is_judged_once() {
        let mut s = chart_session(vec![Note::tap("a", 1000, 0), Note::tap("b", 1100, 0)]);
        s.advance(900);
        s.queue_input_edge(0, true, 1000);
        s.queue_input_edge(0, true, 1090);
        let report = s.advance(1100);
        let judged = report
            .events
            .iter()
            .filter(|e| matches!(e, TickEvent::Judged(_)))
            .count();
        assert_eq!(judged, 1);
        assert_eq!(s.live_notes().len(), 1);
    }

    #[test]
    fn hold_miss_tier_resolves_without_arming() {
        let mut s = chart_session(vec![Note::hold("h", 1000, 1, 500)]);
        s.advance(900);
        s.queue_input_edge(1, true, 880);
        s.advance(900);
        assert!(s.holds_snapshot()[1].is_none());
        assert_eq!(s.result().miss, 1);
        assert!(s.ledger().is_resolved(&NoteId::from("h")));
    }

    #[test]
    fn focus_loss_fails_active_hold() {
        let mut s = chart_session(vec![Note::hold("h", 1000, 1, 800)]);
        s.advance(900);
        s.queue_input_edge(1, true, 1000);
        s.advance(1000);
        assert!(s.holds_snapshot()[1].is_some());
        s.release_all(1200);
        let report = s.advance(1200);
        assert!(
            report
                .events
                .iter()
                .any(|e| matches!(e, TickEvent::HoldFailed { at_ms: 1200, .. }))
        );
        assert!(!s.is_lane_down(1));
    }

    #[test]
    fn teardown_makes_advance_a_no_op() {
        let mut s = chart_session(vec![Note::hold("h", 1000, 1, 800)]);
        s.advance(900);
        s.queue_input_edge(1, true, 1000);
        s.advance(1000);
        s.teardown();
        assert!(s.holds_snapshot().iter().all(Option::is_none));
        let report = s.advance(5000);
        assert!(report.events.is_empty());
        assert_eq!(s.status(), SessionStatus::TornDown);
        assert_eq!(s.result().miss, 0);
    }

    #[test]
    fn procedural_session_ends_after_media_and_grace() {
        let mut s = GameSession::procedural(SessionOptions {
            music_id: "p".into(),
            wait_for_media_end: true,
            generator: GeneratorConfig {
                seed: Some(11),
                ..GeneratorConfig::default()
            },
            ..SessionOptions::default()
        });
        s.advance(0);
        assert!(!s.live_notes().is_empty());
        s.notify_media_end(1000);
        let mut t = 0;
        while !s.is_complete() && t < 60_000 {
            t += 16;
            s.advance(t);
        }
        assert!(s.is_complete());
        assert!(t >= 2000);
        let r = s.result();
        assert_eq!(r.total_resolved, r.judgement_count());
    }
}
