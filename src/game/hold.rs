use log::{debug, error};
use smallvec::SmallVec;

use crate::game::note::{LANE_COUNT, Note, NoteId};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HoldPhase {
    /// Head judged; no hold check has seen the key down yet.
    Armed,
    Holding,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HoldResult {
    Completed,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveHold {
    pub note_id: NoteId,
    pub lane: usize,
    /// Clock reading of the press that armed the hold.
    pub start_ms: i64,
    pub note_time_ms: i64,
    pub end_ms: i64,
    pub phase: HoldPhase,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HoldOutcome {
    pub note_id: NoteId,
    pub lane: usize,
    pub result: HoldResult,
    pub at_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneBusy {
    pub lane: usize,
}

/// One slot per lane; a lane never carries two holds at once.
#[derive(Clone, Debug, Default)]
pub struct HoldTracker {
    active: [Option<ActiveHold>; LANE_COUNT],
}

impl HoldTracker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn is_holding(&self, lane: usize) -> bool {
        self.active.get(lane).is_some_and(Option::is_some)
    }

    pub fn get(&self, lane: usize) -> Option<&ActiveHold> {
        self.active.get(lane).and_then(Option::as_ref)
    }

    pub fn is_idle(&self) -> bool {
        self.active.iter().all(Option::is_none)
    }

    pub fn snapshot(&self) -> [Option<ActiveHold>; LANE_COUNT] {
        self.active.clone()
    }

    /// Idle -> Armed. Fails if the lane already carries a hold, which the
    /// caller must treat as a broken invariant.
    pub fn arm(&mut self, note: &Note, pressed_at_ms: i64) -> Result<(), LaneBusy> {
        let lane = note.lane;
        let Some(slot) = self.active.get_mut(lane) else {
            return Err(LaneBusy { lane });
        };
        if let Some(existing) = slot.as_ref() {
            error!(
                "Refusing to arm hold {} in lane {lane}: hold {} is still active",
                note.id, existing.note_id
            );
            return Err(LaneBusy { lane });
        }
        debug!(
            "HOLD ARMED: id={}, lane={lane}, note_time={}, end={}, press={pressed_at_ms}",
            note.id,
            note.time_ms,
            note.end_time_ms()
        );
        *slot = Some(ActiveHold {
            note_id: note.id.clone(),
            lane,
            start_ms: pressed_at_ms,
            note_time_ms: note.time_ms,
            end_ms: note.end_time_ms(),
            phase: HoldPhase::Armed,
        });
        Ok(())
    }

    /// Key-up edge for `lane`. Releasing at or after the tail completes the
    /// hold; anything earlier fails it on the spot.
    pub fn release(&mut self, lane: usize, at_ms: i64) -> Option<HoldOutcome> {
        let hold = self.active.get_mut(lane)?.take()?;
        let result = if at_ms >= hold.end_ms {
            HoldResult::Completed
        } else {
            HoldResult::Failed
        };
        debug!(
            "HOLD RELEASED: id={}, lane={lane}, at={at_ms}, end={}, result={result:?}",
            hold.note_id, hold.end_ms
        );
        Some(HoldOutcome {
            note_id: hold.note_id,
            lane,
            result,
            at_ms,
        })
    }

    /// Periodic check driven by the frame loop. `lanes_down` is the physical
    /// key state after this tick's input edges were applied.
    pub fn check(
        &mut self,
        now_ms: i64,
        lanes_down: &[bool; LANE_COUNT],
    ) -> SmallVec<[HoldOutcome; LANE_COUNT]> {
        let mut out = SmallVec::new();
        for (lane, slot) in self.active.iter_mut().enumerate() {
            let finished = match slot.as_mut() {
                None => continue,
                // Release edge was lost (focus change, device unplug).
                Some(hold) if !lanes_down[lane] => Some(if now_ms >= hold.end_ms {
                    HoldResult::Completed
                } else {
                    HoldResult::Failed
                }),
                Some(hold) => {
                    if hold.phase == HoldPhase::Armed {
                        hold.phase = HoldPhase::Holding;
                    }
                    (now_ms >= hold.end_ms).then_some(HoldResult::Completed)
                }
            };
            if let Some(result) = finished
                && let Some(hold) = slot.take()
            {
                out.push(HoldOutcome {
                    note_id: hold.note_id,
                    lane,
                    result,
                    at_ms: now_ms,
                });
            }
        }
        out
    }

    /// Drops every active hold without producing outcomes.
    pub fn clear(&mut self) -> usize {
        let mut cleared = 0;
        for slot in &mut self.active {
            if slot.take().is_some() {
                cleared += 1;
            }
        }
        cleared
    }
}
