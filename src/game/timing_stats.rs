use crate::game::judgment::{JudgeGrade, Judgment};

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TimingStats {
    pub mean_abs_ms: f32,
    pub mean_ms: f32,
    pub stddev_ms: f32,
    pub max_abs_ms: f32,
    pub count: usize,
}

/// Offset statistics over judged presses, Miss tier excluded. Offsets keep
/// the `note - press` sign, so a positive mean means the player runs early.
#[inline(always)]
pub fn compute_timing_stats(judgments: &[Judgment]) -> TimingStats {
    // First pass: sums and maxima
    let mut sum_abs = 0.0_f32;
    let mut sum_signed = 0.0_f32;
    let mut max_abs = 0.0_f32;
    let mut count: usize = 0;

    for j in judgments.iter().filter(|j| j.grade != JudgeGrade::Miss) {
        let e = j.offset_ms as f32;
        let a = e.abs();
        sum_abs += a;
        sum_signed += e;
        if a > max_abs { max_abs = a; }
        count += 1;
    }

    if count == 0 {
        return TimingStats::default();
    }

    let mean_ms = sum_signed / (count as f32);
    let mean_abs_ms = sum_abs / (count as f32);

    // Second pass: sample standard deviation of signed offsets
    let stddev_ms = if count > 1 {
        let sum_diff_sq: f32 = judgments
            .iter()
            .filter(|j| j.grade != JudgeGrade::Miss)
            .map(|j| {
                let d = j.offset_ms as f32 - mean_ms;
                d * d
            })
            .sum();
        (sum_diff_sq / ((count as f32) - 1.0)).sqrt()
    } else { 0.0 };

    TimingStats { mean_abs_ms, mean_ms, stddev_ms, max_abs_ms: max_abs, count }
}
