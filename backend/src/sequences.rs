use crate::error::SequenceError;
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_COUNTDOWN: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SequenceStep {
    Safe,
    Armed,
    Counting { ends_at_ms: u64, announced_s: u64 },
    Ignited { at_ms: u64 },
}

/// What the countdown reports to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IgnitionStatus {
    Safe,
    Armed,
    Counting { remaining_s: u64 },
    Ignited { at_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownEvent {
    /// Whole seconds left, once per second.
    TMinus(u64),
    Ignition,
}

/// Launch countdown: `Safe -> Armed -> Counting -> Ignited`.
///
/// Abort returns an armed or counting sequence to `Safe`. Only `reset` leaves
/// `Ignited`.
#[derive(Clone, Debug)]
pub struct IgnitionSequence {
    step: SequenceStep,
    countdown: Duration,
}

impl IgnitionSequence {
    pub fn new(countdown: Duration) -> Self {
        Self {
            step: SequenceStep::Safe,
            countdown,
        }
    }

    pub fn arm(&mut self) -> Result<(), SequenceError> {
        match self.step {
            SequenceStep::Safe | SequenceStep::Armed => {
                self.step = SequenceStep::Armed;
                Ok(())
            }
            SequenceStep::Counting { .. } => Err(SequenceError::AlreadyCounting),
            SequenceStep::Ignited { .. } => Err(SequenceError::AlreadyIgnited),
        }
    }

    /// Starts counting down. `link_ok` is false when the link gate is
    /// configured and the link is not established.
    pub fn start(&mut self, now_ms: u64, link_ok: bool) -> Result<u64, SequenceError> {
        match self.step {
            SequenceStep::Safe => return Err(SequenceError::NotArmed),
            SequenceStep::Counting { .. } => return Err(SequenceError::AlreadyCounting),
            SequenceStep::Ignited { .. } => return Err(SequenceError::AlreadyIgnited),
            SequenceStep::Armed => {}
        }
        if !link_ok {
            return Err(SequenceError::LinkDown);
        }
        let total_s = self.countdown.as_secs();
        self.step = SequenceStep::Counting {
            ends_at_ms: now_ms.saturating_add(self.countdown.as_millis() as u64),
            announced_s: total_s,
        };
        Ok(total_s)
    }

    /// Returns true if there was something to abort.
    pub fn abort(&mut self) -> Result<bool, SequenceError> {
        match self.step {
            SequenceStep::Safe => Ok(false),
            SequenceStep::Armed | SequenceStep::Counting { .. } => {
                self.step = SequenceStep::Safe;
                Ok(true)
            }
            SequenceStep::Ignited { .. } => Err(SequenceError::AlreadyIgnited),
        }
    }

    pub fn reset(&mut self) {
        self.step = SequenceStep::Safe;
    }

    pub fn is_counting(&self) -> bool {
        matches!(self.step, SequenceStep::Counting { .. })
    }

    pub fn is_ignited(&self) -> bool {
        matches!(self.step, SequenceStep::Ignited { .. })
    }

    pub fn remaining_s(&self, now_ms: u64) -> Option<u64> {
        match self.step {
            SequenceStep::Counting { ends_at_ms, .. } => {
                Some(ends_at_ms.saturating_sub(now_ms).div_ceil(1000))
            }
            _ => None,
        }
    }

    /// Advances the countdown to `now_ms`.
    pub fn tick(&mut self, now_ms: u64) -> Option<CountdownEvent> {
        let SequenceStep::Counting {
            ends_at_ms,
            announced_s,
        } = self.step
        else {
            return None;
        };

        if now_ms >= ends_at_ms {
            self.step = SequenceStep::Ignited { at_ms: now_ms };
            return Some(CountdownEvent::Ignition);
        }

        let remaining = ends_at_ms.saturating_sub(now_ms).div_ceil(1000);
        if remaining < announced_s {
            self.step = SequenceStep::Counting {
                ends_at_ms,
                announced_s: remaining,
            };
            return Some(CountdownEvent::TMinus(remaining));
        }
        None
    }

    pub fn status(&self, now_ms: u64) -> IgnitionStatus {
        match self.step {
            SequenceStep::Safe => IgnitionStatus::Safe,
            SequenceStep::Armed => IgnitionStatus::Armed,
            SequenceStep::Counting { .. } => IgnitionStatus::Counting {
                remaining_s: self.remaining_s(now_ms).unwrap_or(0),
            },
            SequenceStep::Ignited { at_ms } => IgnitionStatus::Ignited { at_ms },
        }
    }
}
