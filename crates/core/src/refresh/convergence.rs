//! Retry policy for a single logical refresh.
//!
//! A refresh that expects a change keeps fetching until the change is
//! visible or the retry budget is spent. Failed attempts draw from the same
//! budget. The controller itself is stateless; the attempt number travels
//! with the work.
//!
//! | Attempt result | expect_change | Decision |
//! |----------------|---------------|----------|
//! | success, changed | true | `Converged` |
//! | success, unchanged | true | `Retry` until the budget is spent, then `Exhausted` |
//! | success | false | `NotExpected` |
//! | failure | any | `Retry` until the budget is spent, then `Exhausted` |

use std::time::Duration;

use super::refresh_model::ConvergenceState;
use crate::constants::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};

/// What to do after an attempt finished.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConvergenceDecision {
    /// The expected change was observed. Stop.
    Converged,
    /// Nothing was expected. Stop after one successful attempt.
    NotExpected,
    /// Schedule `next_attempt` after `delay`.
    Retry { next_attempt: u32, delay: Duration },
    /// Budget spent. Stop and keep whatever the cache holds.
    Exhausted,
}

impl ConvergenceDecision {
    /// State reported on the event emitted for the attempt.
    pub fn state(&self) -> ConvergenceState {
        match self {
            Self::Converged => ConvergenceState::Converged,
            Self::NotExpected => ConvergenceState::NotExpected,
            Self::Retry { .. } => ConvergenceState::Fetching,
            Self::Exhausted => ConvergenceState::Exhausted,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConvergenceController {
    max_retries: u32,
    retry_delay: Duration,
}

impl ConvergenceController {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decision after an attempt that fetched and stored a portfolio.
    pub fn after_success(
        &self,
        expect_change: bool,
        changed: bool,
        retry_count: u32,
    ) -> ConvergenceDecision {
        if !expect_change {
            ConvergenceDecision::NotExpected
        } else if changed {
            ConvergenceDecision::Converged
        } else {
            self.next(retry_count)
        }
    }

    /// Decision after an attempt whose fetch or cache write failed.
    pub fn after_failure(&self, retry_count: u32) -> ConvergenceDecision {
        self.next(retry_count)
    }

    fn next(&self, retry_count: u32) -> ConvergenceDecision {
        if retry_count < self.max_retries {
            ConvergenceDecision::Retry {
                next_attempt: retry_count + 1,
                delay: self.retry_delay,
            }
        } else {
            ConvergenceDecision::Exhausted
        }
    }
}

impl Default for ConvergenceController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_expectation_stops_after_one_attempt() {
        let controller = ConvergenceController::default();
        assert_eq!(
            controller.after_success(false, false, 0),
            ConvergenceDecision::NotExpected
        );
        assert_eq!(
            controller.after_success(false, true, 0),
            ConvergenceDecision::NotExpected
        );
    }

    #[test]
    fn test_observed_change_converges() {
        let controller = ConvergenceController::default();
        let decision = controller.after_success(true, true, 2);
        assert_eq!(decision, ConvergenceDecision::Converged);
        assert_eq!(decision.state(), ConvergenceState::Converged);
    }

    #[test]
    fn test_unchanged_retries_until_budget_spent() {
        let controller = ConvergenceController::new(5, Duration::from_secs(5));

        for retry_count in 0..5 {
            assert_eq!(
                controller.after_success(true, false, retry_count),
                ConvergenceDecision::Retry {
                    next_attempt: retry_count + 1,
                    delay: Duration::from_secs(5),
                }
            );
        }
        assert_eq!(
            controller.after_success(true, false, 5),
            ConvergenceDecision::Exhausted
        );
    }

    #[test]
    fn test_failures_share_the_budget() {
        let controller = ConvergenceController::new(2, Duration::from_secs(1));
        assert!(matches!(
            controller.after_failure(1),
            ConvergenceDecision::Retry { next_attempt: 2, .. }
        ));
        assert_eq!(controller.after_failure(2), ConvergenceDecision::Exhausted);
    }

    #[test]
    fn test_zero_budget_never_retries() {
        let controller = ConvergenceController::new(0, Duration::from_secs(5));
        assert_eq!(
            controller.after_success(true, false, 0),
            ConvergenceDecision::Exhausted
        );
        assert_eq!(controller.after_failure(0), ConvergenceDecision::Exhausted);
    }

    #[test]
    fn test_retry_reports_fetching() {
        let decision = ConvergenceDecision::Retry {
            next_attempt: 1,
            delay: Duration::from_secs(5),
        };
        assert_eq!(decision.state(), ConvergenceState::Fetching);
        assert!(!decision.state().is_terminal());
    }
}
