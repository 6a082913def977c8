use std::time::Duration;

use anyhow::Result;

use super::clock::Clock;

/// Result of a bounded wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    Satisfied { polls: u32 },
    TimedOut { polls: u32 },
}

impl PollOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, PollOutcome::Satisfied { .. })
    }
}

/// Evaluate `check` every `interval` until it returns `true` or `timeout` elapses.
///
/// The check always runs at least once, and once more at the deadline. Errors
/// from `check` abort the wait immediately and propagate. There is no other
/// cancellation.
pub fn poll_until<C, F>(clock: &C, interval: Duration, timeout: Duration, mut check: F) -> Result<PollOutcome>
where
    C: Clock + ?Sized,
    F: FnMut() -> Result<bool>,
{
    let start = clock.now();
    let mut polls = 0u32;
    loop {
        polls += 1;
        if check()? {
            return Ok(PollOutcome::Satisfied { polls });
        }
        let elapsed = clock.now().saturating_sub(start);
        if elapsed >= timeout {
            return Ok(PollOutcome::TimedOut { polls });
        }
        clock.sleep(interval.min(timeout - elapsed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flight::clock::ManualClock;
    use anyhow::anyhow;

    #[test]
    fn returns_as_soon_as_condition_holds() {
        let clock = ManualClock::new();
        let mut calls = 0;
        let outcome = poll_until(&clock, Duration::from_secs(1), Duration::from_secs(10), || {
            calls += 1;
            Ok(calls == 3)
        })
        .unwrap();
        assert_eq!(outcome, PollOutcome::Satisfied { polls: 3 });
        assert_eq!(clock.now(), Duration::from_secs(2));
    }

    #[test]
    fn times_out_at_deadline() {
        let clock = ManualClock::new();
        let outcome = poll_until(&clock, Duration::from_secs(1), Duration::from_secs(5), || {
            Ok(false)
        })
        .unwrap();
        // t = 0, 1, 2, 3, 4, 5
        assert_eq!(outcome, PollOutcome::TimedOut { polls: 6 });
        assert_eq!(clock.now(), Duration::from_secs(5));
    }

    #[test]
    fn last_sleep_is_clipped_to_deadline() {
        let clock = ManualClock::new();
        let outcome = poll_until(
            &clock,
            Duration::from_secs(2),
            Duration::from_secs(3),
            || Ok(false),
        )
        .unwrap();
        assert!(!outcome.is_satisfied());
        assert_eq!(clock.now(), Duration::from_secs(3));
    }

    #[test]
    fn check_errors_propagate() {
        let clock = ManualClock::new();
        let result = poll_until(&clock, Duration::from_secs(1), Duration::from_secs(5), || {
            Err(anyhow!("link dropped"))
        });
        assert!(result.is_err());
        assert_eq!(clock.now(), Duration::ZERO);
    }
}
