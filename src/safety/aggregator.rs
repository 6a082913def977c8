use serde::Serialize;

use super::evaluator::SafetyVerdict;

pub const DEFAULT_HYSTERESIS_FRAMES: u32 = 3;

/// Stable verdict after hysteresis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AggregatedVerdict {
    /// Verdict flight logic acts on.
    pub current: SafetyVerdict,
    /// Consecutive frames agreeing with the most recent per-frame verdict.
    pub streak: u32,
    /// True only on the tick where `current` switched.
    pub changed: bool,
}

/// Debounces per-frame verdicts.
///
/// A new verdict replaces `current` only once it has been seen on
/// `hysteresis_frames` consecutive frames. Until then the prior value holds,
/// including against `Indeterminate`, so a dropped frame or a brief occlusion
/// cannot blank a stable verdict.
#[derive(Debug)]
pub struct VerdictAggregator {
    hysteresis_frames: u32,
    current: SafetyVerdict,
    candidate: SafetyVerdict,
    streak: u32,
    changed: bool,
}

impl VerdictAggregator {
    pub fn new(hysteresis_frames: u32) -> Self {
        Self {
            hysteresis_frames: hysteresis_frames.max(1),
            current: SafetyVerdict::Indeterminate,
            candidate: SafetyVerdict::Indeterminate,
            streak: 0,
            changed: false,
        }
    }

    pub fn push(&mut self, verdict: SafetyVerdict) -> AggregatedVerdict {
        if verdict == self.candidate {
            self.streak = self.streak.saturating_add(1);
        } else {
            self.candidate = verdict;
            self.streak = 1;
        }

        self.changed = self.candidate != self.current && self.streak >= self.hysteresis_frames;
        if self.changed {
            self.current = self.candidate;
        }
        self.snapshot()
    }

    pub fn snapshot(&self) -> AggregatedVerdict {
        AggregatedVerdict {
            current: self.current,
            streak: self.streak,
            changed: self.changed,
        }
    }

    pub fn current(&self) -> SafetyVerdict {
        self.current
    }

    pub fn hysteresis_frames(&self) -> u32 {
        self.hysteresis_frames
    }
}

impl Default for VerdictAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_HYSTERESIS_FRAMES)
    }
}
