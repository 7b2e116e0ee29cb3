use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// One unbroken streak: when it started, when it was last extended, and how
/// many hits it holds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ComboSegment {
    pub start_ms: i64,
    pub last_hit_ms: i64,
    pub count: u32,
}

impl ComboSegment {
    pub const fn opened_at(at_ms: i64) -> Self {
        Self {
            start_ms: at_ms,
            last_hit_ms: at_ms,
            count: 1,
        }
    }

    pub fn extend(&mut self, at_ms: i64) {
        self.last_hit_ms = self.last_hit_ms.max(at_ms);
        self.count = self.count.saturating_add(1);
    }
}

// Persisted form is "start-end-count", which the result API stores verbatim.
impl fmt::Display for ComboSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.start_ms, self.last_hit_ms, self.count)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComboParseError {
    #[error("expected start-end-count, got {0:?}")]
    Shape(String),
    #[error("invalid number {0:?} in combo segment")]
    Number(String),
}

impl FromStr for ComboSegment {
    type Err = ComboParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('-');
        let (Some(start), Some(end), Some(count), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ComboParseError::Shape(s.to_string()));
        };
        let num = |p: &str| p.parse::<i64>().map_err(|_| ComboParseError::Number(p.to_string()));
        let count = count
            .parse::<u32>()
            .map_err(|_| ComboParseError::Number(count.to_string()))?;
        Ok(Self {
            start_ms: num(start)?,
            last_hit_ms: num(end)?,
            count,
        })
    }
}

/// Ordered streak history. A break closes the open segment; the next hit
/// opens a fresh one with count 1.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComboHistory {
    segments: Vec<ComboSegment>,
    open: bool,
}

impl ComboHistory {
    pub fn hit(&mut self, at_ms: i64) {
        match self.segments.last_mut() {
            Some(seg) if self.open => seg.extend(at_ms),
            _ => {
                self.segments.push(ComboSegment::opened_at(at_ms));
                self.open = true;
            }
        }
    }

    pub fn break_streak(&mut self) {
        self.open = false;
    }

    /// Length of the streak currently in progress.
    pub fn current(&self) -> u32 {
        if self.open {
            self.segments.last().map_or(0, |s| s.count)
        } else {
            0
        }
    }

    pub fn max(&self) -> u32 {
        self.segments.iter().map(|s| s.count).max().unwrap_or(0)
    }

    pub fn segments(&self) -> &[ComboSegment] {
        &self.segments
    }
}

pub fn join_segments(segments: &[ComboSegment]) -> String {
    segments
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

pub fn parse_segments(s: &str) -> Result<Vec<ComboSegment>, ComboParseError> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    s.split(',').map(str::parse).collect()
}
