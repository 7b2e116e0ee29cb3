use log::{debug, error};
use rustc_hash::FxHashSet;

use crate::game::combo::{ComboHistory, ComboSegment};
use crate::game::judgment::{JudgeGrade, ScoreTable, Timing};
use crate::game::note::NoteId;

// --- Rank Definitions ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rank {
    F,
    D,
    C,
    B,
    A,
    S,
    SS,
}

impl Rank {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Rank::F => "F",
            Rank::D => "D",
            Rank::C => "C",
            Rank::B => "B",
            Rank::A => "A",
            Rank::S => "S",
            Rank::SS => "SS",
        }
    }
}

/// Accuracy weights and rank cutoffs. These were still being tuned upstream,
/// so they come from the ini rather than being baked in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringPolicy {
    pub weight_perfect: f64,
    pub weight_great: f64,
    pub weight_good: f64,
    pub rank_ss: u32,
    pub rank_s: u32,
    pub rank_a: u32,
    pub rank_b: u32,
    pub rank_c: u32,
    pub rank_d: u32,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            weight_perfect: 1.0,
            weight_great: 0.8,
            weight_good: 0.5,
            rank_ss: 98,
            rank_s: 95,
            rank_a: 85,
            rank_b: 75,
            rank_c: 60,
            rank_d: 50,
        }
    }
}

impl ScoringPolicy {
    pub fn accuracy(&self, perfect: u32, great: u32, good: u32, miss: u32) -> u32 {
        let total = u64::from(perfect) + u64::from(great) + u64::from(good) + u64::from(miss);
        if total == 0 {
            return 0;
        }
        let weighted = f64::from(perfect) * self.weight_perfect
            + f64::from(great) * self.weight_great
            + f64::from(good) * self.weight_good;
        (100.0 * weighted / total as f64).round().clamp(0.0, 100.0) as u32
    }

    /// SS additionally requires that nothing but Perfects was recorded.
    pub fn rank_for(&self, accuracy: u32, all_perfect: bool) -> Rank {
        if accuracy >= self.rank_ss && all_perfect { Rank::SS }
        else if accuracy >= self.rank_s { Rank::S }
        else if accuracy >= self.rank_a { Rank::A }
        else if accuracy >= self.rank_b { Rank::B }
        else if accuracy >= self.rank_c { Rank::C }
        else if accuracy >= self.rank_d { Rank::D }
        else { Rank::F }
    }
}

/// Read-only view of the ledger handed to the UI and, once frozen, to the
/// persistence layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultState {
    pub music_id: String,
    pub difficulty: u32,
    pub score: u64,
    pub accuracy: u32,
    pub rank: Rank,
    pub perfect: u32,
    pub great: u32,
    pub good: u32,
    pub miss: u32,
    pub combo_segments: Vec<ComboSegment>,
    pub current_combo: u32,
    pub max_combo: u32,
    pub early_count: u32,
    pub late_count: u32,
    pub is_full_combo: bool,
    pub is_all_perfect: bool,
    pub total_resolved: u32,
}

impl ResultState {
    pub const fn judgement_count(&self) -> u32 {
        self.perfect + self.great + self.good + self.miss
    }
}

#[derive(Debug, Clone)]
pub struct ScoreLedger {
    music_id: String,
    difficulty: u32,
    table: ScoreTable,
    policy: ScoringPolicy,
    score: u64,
    perfect: u32,
    great: u32,
    good: u32,
    miss: u32,
    early_count: u32,
    late_count: u32,
    combo: ComboHistory,
    resolved: FxHashSet<NoteId>,
    frozen: bool,
}

impl ScoreLedger {
    pub fn new(music_id: impl Into<String>, difficulty: u32, table: ScoreTable, policy: ScoringPolicy) -> Self {
        Self {
            music_id: music_id.into(),
            difficulty,
            table,
            policy,
            score: 0,
            perfect: 0,
            great: 0,
            good: 0,
            miss: 0,
            early_count: 0,
            late_count: 0,
            combo: ComboHistory::default(),
            resolved: FxHashSet::default(),
            frozen: false,
        }
    }

    #[inline(always)]
    fn check_writable(&self) {
        debug_assert!(!self.frozen, "score ledger mutated after session completion");
        if self.frozen {
            error!("Score ledger mutated after it was frozen");
        }
    }

    /// Marks a note as finally resolved. A second resolution of the same id
    /// means two subsystems both claimed the note.
    fn mark_resolved(&mut self, id: &NoteId) {
        let fresh = self.resolved.insert(id.clone());
        debug_assert!(fresh, "note {id} resolved twice");
        if !fresh {
            error!("Note {id} was resolved twice; ignoring the second resolution.");
        }
    }

    fn count_grade(&mut self, grade: JudgeGrade) {
        let slot = match grade {
            JudgeGrade::Perfect => &mut self.perfect,
            JudgeGrade::Great => &mut self.great,
            JudgeGrade::Good => &mut self.good,
            JudgeGrade::Miss => &mut self.miss,
        };
        *slot = slot.saturating_add(1);
    }

    /// Scores a judged press (a tap or the head of a hold). Returns the
    /// points awarded. Whether the press also resolves the note is the
    /// caller's decision, see [`ScoreLedger::resolve`].
    pub fn record_press(&mut self, grade: JudgeGrade, timing: Timing, at_ms: i64) -> u64 {
        self.check_writable();
        match timing {
            Timing::Early => self.early_count = self.early_count.saturating_add(1),
            Timing::Late => self.late_count = self.late_count.saturating_add(1),
        }
        self.count_grade(grade);
        if !grade.is_hit() {
            self.combo.break_streak();
            return 0;
        }
        let points = self.table.award(grade, self.combo.current());
        self.score = self.score.saturating_add(points);
        self.combo.hit(at_ms);
        points
    }

    pub fn resolve(&mut self, id: &NoteId) {
        self.check_writable();
        self.mark_resolved(id);
    }

    /// A note that ran past its deadline without input.
    pub fn record_sweep_miss(&mut self, id: &NoteId) {
        self.check_writable();
        if self.resolved.contains(id) {
            debug_assert!(false, "swept note {id} was already resolved");
            error!("Swept note {id} was already resolved; skipping.");
            return;
        }
        self.count_grade(JudgeGrade::Miss);
        self.combo.break_streak();
        self.mark_resolved(id);
    }

    pub fn record_hold_complete(&mut self, id: &NoteId, at_ms: i64) -> u64 {
        self.check_writable();
        let points = self.table.hold_bonus(self.combo.current());
        self.score = self.score.saturating_add(points);
        self.count_grade(JudgeGrade::Perfect);
        self.combo.hit(at_ms);
        self.mark_resolved(id);
        points
    }

    pub fn record_hold_fail(&mut self, id: &NoteId) {
        self.check_writable();
        self.count_grade(JudgeGrade::Miss);
        self.combo.break_streak();
        self.mark_resolved(id);
    }

    pub fn is_resolved(&self, id: &NoteId) -> bool {
        self.resolved.contains(id)
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }

    pub fn current_combo(&self) -> u32 {
        self.combo.current()
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn accuracy(&self) -> u32 {
        self.policy.accuracy(self.perfect, self.great, self.good, self.miss)
    }

    pub const fn is_full_combo(&self) -> bool {
        self.miss == 0
    }

    pub const fn is_all_perfect(&self) -> bool {
        self.miss == 0 && self.great == 0 && self.good == 0
    }

    pub fn rank(&self) -> Rank {
        let all_perfect = self.is_all_perfect() && self.perfect > 0;
        self.policy.rank_for(self.accuracy(), all_perfect)
    }

    pub fn freeze(&mut self) -> ResultState {
        if !self.frozen {
            debug!(
                "Freezing score ledger: score={}, resolved={}",
                self.score,
                self.resolved.len()
            );
            self.frozen = true;
        }
        self.snapshot()
    }

    pub fn snapshot(&self) -> ResultState {
        ResultState {
            music_id: self.music_id.clone(),
            difficulty: self.difficulty,
            score: self.score,
            accuracy: self.accuracy(),
            rank: self.rank(),
            perfect: self.perfect,
            great: self.great,
            good: self.good,
            miss: self.miss,
            combo_segments: self.combo.segments().to_vec(),
            current_combo: self.combo.current(),
            max_combo: self.combo.max(),
            early_count: self.early_count,
            late_count: self.late_count,
            is_full_combo: self.is_full_combo(),
            is_all_perfect: self.is_all_perfect(),
            total_resolved: self.resolved.len() as u32,
        }
    }
}
