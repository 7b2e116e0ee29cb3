use crate::game::note::NoteId;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JudgeGrade {
    Perfect,
    Great,
    Good,
    Miss,
}

impl JudgeGrade {
    #[inline(always)]
    pub const fn is_hit(self) -> bool {
        !matches!(self, Self::Miss)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Perfect => "Perfect",
            Self::Great => "Great",
            Self::Good => "Good",
            Self::Miss => "Miss",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Timing {
    Early,
    Late,
}

impl Timing {
    /// Sign convention: `note_time - press_time > 0` means the player was
    /// early. An exact hit counts as late.
    #[inline(always)]
    pub const fn from_offset_ms(note_minus_press_ms: i64) -> Self {
        if note_minus_press_ms > 0 {
            Self::Early
        } else {
            Self::Late
        }
    }
}

/// Outcome of a single key-down that landed inside the miss window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Judgment {
    pub note_id: NoteId,
    pub lane: usize,
    pub grade: JudgeGrade,
    /// `note.time - press_time` in milliseconds.
    pub offset_ms: i64,
    pub timing: Timing,
    pub judged_at_ms: i64,
    pub is_hold_start: bool,
}

pub const BASE_SCORE_PERFECT: u32 = 100;
pub const BASE_SCORE_GREAT: u32 = 50;
pub const BASE_SCORE_GOOD: u32 = 20;
pub const HOLD_COMPLETION_BONUS: u32 = 100;

pub const COMBO_STEP: u32 = 20;
pub const COMBO_STEP_BONUS: f64 = 0.05;
pub const COMBO_MULTIPLIER_CAP: f64 = 1.5;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScoreTable {
    pub perfect: u32,
    pub great: u32,
    pub good: u32,
    pub hold_completion_bonus: u32,
    pub combo_step: u32,
    pub combo_step_bonus: f64,
    pub combo_multiplier_cap: f64,
}

impl Default for ScoreTable {
    fn default() -> Self {
        Self {
            perfect: BASE_SCORE_PERFECT,
            great: BASE_SCORE_GREAT,
            good: BASE_SCORE_GOOD,
            hold_completion_bonus: HOLD_COMPLETION_BONUS,
            combo_step: COMBO_STEP,
            combo_step_bonus: COMBO_STEP_BONUS,
            combo_multiplier_cap: COMBO_MULTIPLIER_CAP,
        }
    }
}

impl ScoreTable {
    pub const fn base_score(&self, grade: JudgeGrade) -> u32 {
        match grade {
            JudgeGrade::Perfect => self.perfect,
            JudgeGrade::Great => self.great,
            JudgeGrade::Good => self.good,
            JudgeGrade::Miss => 0,
        }
    }

    /// `min(1 + floor(combo / step) * bonus, cap)`, evaluated against the
    /// combo count before the hit being scored.
    pub fn combo_multiplier(&self, combo: u32) -> f64 {
        let step = self.combo_step.max(1);
        let steps = f64::from(combo / step);
        (1.0 + steps * self.combo_step_bonus).min(self.combo_multiplier_cap)
    }

    #[inline(always)]
    pub fn scaled(&self, base: u32, combo: u32) -> u64 {
        (f64::from(base) * self.combo_multiplier(combo)).round() as u64
    }

    pub fn award(&self, grade: JudgeGrade, combo: u32) -> u64 {
        self.scaled(self.base_score(grade), combo)
    }

    pub fn hold_bonus(&self, combo: u32) -> u64 {
        self.scaled(self.hold_completion_bonus, combo)
    }
}
