// Shared timing window definitions to keep judging, sweeping and the UI in sync.

use crate::game::judgment::JudgeGrade;

// All windows are in milliseconds, measured as |note time - press time|.
pub const BASE_PERFECT_MS: i64 = 30;
pub const BASE_GREAT_MS: i64 = 60;
pub const BASE_GOOD_MS: i64 = 100;
pub const BASE_MISS_MS: i64 = 150;

/// Nested judgement windows, tightest first. The miss window is the outer
/// bound: presses farther away than it are ignored entirely.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimingWindows {
    pub perfect_ms: i64,
    pub great_ms: i64,
    pub good_ms: i64,
    pub miss_ms: i64,
}

impl Default for TimingWindows {
    fn default() -> Self {
        Self {
            perfect_ms: BASE_PERFECT_MS,
            great_ms: BASE_GREAT_MS,
            good_ms: BASE_GOOD_MS,
            miss_ms: BASE_MISS_MS,
        }
    }
}

impl TimingWindows {
    /// Repairs a window set that is not strictly nested (e.g. from a hand
    /// edited ini) by pushing each outer window past the one inside it.
    pub fn normalized(self) -> Self {
        let perfect_ms = self.perfect_ms.max(0);
        let great_ms = self.great_ms.max(perfect_ms + 1);
        let good_ms = self.good_ms.max(great_ms + 1);
        let miss_ms = self.miss_ms.max(good_ms + 1);
        Self {
            perfect_ms,
            great_ms,
            good_ms,
            miss_ms,
        }
    }

    #[inline(always)]
    pub const fn as_array(&self) -> [i64; 4] {
        [self.perfect_ms, self.great_ms, self.good_ms, self.miss_ms]
    }
}

/// Classifies an absolute offset into a grade. A value exactly on a boundary
/// gets the tighter grade. Returns `None` outside the miss window.
#[inline(always)]
pub fn classify_offset_ms(offset_ms: i64, windows: &TimingWindows) -> Option<JudgeGrade> {
    let abs = offset_ms.abs();
    if abs <= windows.perfect_ms {
        Some(JudgeGrade::Perfect)
    } else if abs <= windows.great_ms {
        Some(JudgeGrade::Great)
    } else if abs <= windows.good_ms {
        Some(JudgeGrade::Good)
    } else if abs <= windows.miss_ms {
        Some(JudgeGrade::Miss)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn boundaries_resolve_to_tighter_grade() {
        let w = TimingWindows::default();
        assert_eq!(classify_offset_ms(30, &w), Some(JudgeGrade::Perfect));
        assert_eq!(classify_offset_ms(-30, &w), Some(JudgeGrade::Perfect));
        assert_eq!(classify_offset_ms(31, &w), Some(JudgeGrade::Great));
        assert_eq!(classify_offset_ms(60, &w), Some(JudgeGrade::Great));
        assert_eq!(classify_offset_ms(100, &w), Some(JudgeGrade::Good));
        assert_eq!(classify_offset_ms(150, &w), Some(JudgeGrade::Miss));
        assert_eq!(classify_offset_ms(151, &w), None);
    }

    #[test]
    fn normalized_repairs_inverted_windows() {
        let w = TimingWindows {
            perfect_ms: 50,
            great_ms: 40,
            good_ms: 100,
            miss_ms: 90,
        }
        .normalized();
        assert_eq!(w.as_array(), [50, 51, 100, 101]);
    }

    proptest! {
        #[test]
        fn grades_never_improve_as_offset_grows(a in 0i64..400, b in 0i64..400) {
            let w = TimingWindows::default();
            let (near, far) = if a <= b { (a, b) } else { (b, a) };
            match (classify_offset_ms(near, &w), classify_offset_ms(far, &w)) {
                (Some(g_near), Some(g_far)) => prop_assert!(g_near <= g_far),
                (None, Some(_)) => prop_assert!(false, "inner offset fell outside the windows"),
                _ => {}
            }
        }

        #[test]
        fn inside_perfect_is_always_perfect(offset in -30i64..=30) {
            prop_assert_eq!(
                classify_offset_ms(offset, &TimingWindows::default()),
                Some(JudgeGrade::Perfect)
            );
        }
    }
}
