use std::time::Instant;

pub const DEFAULT_COUNTDOWN_MS: i64 = 4000;

/// Monotonic game clock in milliseconds. The first `countdown_ms` of host
/// time are a pre-roll during which elapsed time stays at zero.
#[derive(Debug, Clone)]
pub struct GameClock {
    origin: Instant,
    countdown_ms: i64,
    raw_ms: i64,
    elapsed_ms: i64,
}

impl GameClock {
    pub fn new(countdown_ms: i64) -> Self {
        Self::starting_at(Instant::now(), countdown_ms)
    }

    pub fn starting_at(origin: Instant, countdown_ms: i64) -> Self {
        Self {
            origin,
            countdown_ms: countdown_ms.max(0),
            raw_ms: 0,
            elapsed_ms: 0,
        }
    }

    /// Reads the host clock once for this frame.
    pub fn tick(&mut self) -> i64 {
        let raw = self.origin.elapsed().as_millis();
        self.tick_at(i64::try_from(raw).unwrap_or(i64::MAX))
    }

    /// Same as [`GameClock::tick`] for a caller-supplied host reading in
    /// milliseconds since the clock was created. Readings that go backwards
    /// leave the clock where it is.
    pub fn tick_at(&mut self, raw_ms: i64) -> i64 {
        self.raw_ms = self.raw_ms.max(raw_ms);
        let elapsed = (self.raw_ms - self.countdown_ms).max(0);
        self.elapsed_ms = self.elapsed_ms.max(elapsed);
        self.elapsed_ms
    }

    #[inline(always)]
    pub const fn elapsed_ms(&self) -> i64 {
        self.elapsed_ms
    }

    #[inline(always)]
    pub const fn is_running(&self) -> bool {
        self.raw_ms >= self.countdown_ms
    }

    /// Whole seconds left on the pre-roll, rounded up; 0 once running.
    pub const fn countdown_seconds_left(&self) -> i64 {
        let left = self.countdown_ms - self.raw_ms;
        if left <= 0 { 0 } else { (left + 999) / 1000 }
    }
}
