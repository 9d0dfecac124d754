//! The sabotage (NOT-gate) eligibility policy.
//!
//! Sabotage inverts a rival player's effective bit at a score and time
//! cost. The policy decides whether an attempt is currently permitted; the
//! state machine applies the toggle and charges the acting team. The
//! deadline-anchored [`Countdown`](crate::Countdown) is the authoritative
//! clock for the lockout check; display-only tickers must never feed it.

use std::fmt;

/// Default trailing window (seconds) during which sabotage is disallowed.
pub const DEFAULT_LOCKOUT_SECONDS: u32 = 5;

/// Default score a team must exceed before it may sabotage.
///
/// The reference deployment carried two conflicting thresholds (`> 4` in an
/// early UI hint, `> 0` enforced authoritatively). This engine uses the
/// authoritative `> 0` uniformly; the stricter variant remains available
/// through [`SabotagePolicy::strict`].
pub const DEFAULT_MIN_SCORE_EXCLUSIVE: i32 = 0;

/// Default points deducted from the acting team per sabotage.
pub const DEFAULT_SABOTAGE_COST: i32 = 1;

/// Why a sabotage attempt was refused.
///
/// A refusal leaves all state untouched (no toggle, no cost) and is
/// reported to the actor only, never silently dropped.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SabotageDenial {
    /// The round is inside the trailing lockout window.
    LockoutActive {
        /// Authoritative seconds remaining in the round.
        seconds_remaining: u32,
        /// The configured lockout window.
        lockout_seconds: u32,
    },
    /// The acting team's score does not exceed the required threshold.
    ScoreTooLow {
        /// The acting team's current score.
        score: i32,
        /// The score that must be exceeded.
        min_exclusive: i32,
    },
    /// Toggling a teammate's (or one's own) NOT flag is a solving mechanic
    /// reserved for open mode, not a sabotage.
    OwnTeamOutsideOpenMode,
}

impl fmt::Display for SabotageDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SabotageDenial::LockoutActive {
                seconds_remaining,
                lockout_seconds,
            } => write!(
                f,
                "lockout active ({}s remaining, lockout is the final {}s)",
                seconds_remaining, lockout_seconds
            ),
            SabotageDenial::ScoreTooLow {
                score,
                min_exclusive,
            } => write!(
                f,
                "team score {} does not exceed the required {}",
                score, min_exclusive
            ),
            SabotageDenial::OwnTeamOutsideOpenMode => {
                write!(f, "own-team toggles are only available in open mode")
            }
        }
    }
}

/// Configuration for sabotage eligibility.
///
/// # Example
///
/// ```
/// use logic_arena::SabotagePolicy;
///
/// let policy = SabotagePolicy::default();
/// assert!(policy.permits(3, 12));
/// assert!(!policy.permits(3, 5));  // inside the 5s lockout
/// assert!(!policy.permits(0, 12)); // score must exceed 0
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SabotagePolicy {
    /// Sabotage is disallowed once `seconds_remaining <= lockout_seconds`.
    pub lockout_seconds: u32,
    /// The acting team's score must strictly exceed this value.
    pub min_score_exclusive: i32,
    /// Points deducted from the acting team on a successful sabotage.
    pub cost: i32,
}

impl Default for SabotagePolicy {
    fn default() -> Self {
        Self {
            lockout_seconds: DEFAULT_LOCKOUT_SECONDS,
            min_score_exclusive: DEFAULT_MIN_SCORE_EXCLUSIVE,
            cost: DEFAULT_SABOTAGE_COST,
        }
    }
}

impl SabotagePolicy {
    /// Creates a policy with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The stricter observed variant: sabotage requires a score above 4.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            min_score_exclusive: 4,
            ..Self::default()
        }
    }

    /// Checks a sabotage attempt, returning the denial reason on refusal.
    ///
    /// `seconds_remaining` must come from the deadline-anchored countdown.
    ///
    /// # Errors
    ///
    /// Returns a [`SabotageDenial`] if the attempt falls inside the lockout
    /// window or the acting team's score is too low.
    pub fn evaluate(
        &self,
        acting_team_score: i32,
        seconds_remaining: u32,
    ) -> Result<(), SabotageDenial> {
        if seconds_remaining <= self.lockout_seconds {
            return Err(SabotageDenial::LockoutActive {
                seconds_remaining,
                lockout_seconds: self.lockout_seconds,
            });
        }
        if acting_team_score <= self.min_score_exclusive {
            return Err(SabotageDenial::ScoreTooLow {
                score: acting_team_score,
                min_exclusive: self.min_score_exclusive,
            });
        }
        Ok(())
    }

    /// Convenience boolean form of [`evaluate`](Self::evaluate).
    #[must_use]
    pub fn permits(&self, acting_team_score: i32, seconds_remaining: u32) -> bool {
        self.evaluate(acting_team_score, seconds_remaining).is_ok()
    }
}

// #########
// # TESTS #
// #########

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permitted_inside_window_with_score() {
        let policy = SabotagePolicy::default();
        assert!(policy.permits(1, 6));
        assert!(policy.permits(100, 60));
    }

    #[test]
    fn lockout_boundary_is_inclusive() {
        let policy = SabotagePolicy::default();
        // Exactly at the lockout boundary counts as locked.
        assert!(!policy.permits(10, 5));
        assert!(policy.permits(10, 6));
        assert!(!policy.permits(10, 0));
    }

    #[test]
    fn score_threshold_is_exclusive() {
        let policy = SabotagePolicy::default();
        assert!(!policy.permits(0, 30));
        assert!(policy.permits(1, 30));
        assert!(!policy.permits(-3, 30));
    }

    #[test]
    fn strict_preset_requires_score_above_four() {
        let policy = SabotagePolicy::strict();
        assert!(!policy.permits(4, 30));
        assert!(policy.permits(5, 30));
    }

    #[test]
    fn denial_carries_the_reason() {
        let policy = SabotagePolicy::default();
        match policy.evaluate(10, 3) {
            Err(SabotageDenial::LockoutActive {
                seconds_remaining, ..
            }) => assert_eq!(seconds_remaining, 3),
            other => panic!("expected lockout denial, got {other:?}"),
        }
        match policy.evaluate(0, 30) {
            Err(SabotageDenial::ScoreTooLow { score, .. }) => assert_eq!(score, 0),
            other => panic!("expected score denial, got {other:?}"),
        }
    }

    #[test]
    fn lockout_check_runs_before_score_check() {
        // Inside the lockout both conditions fail; the time window wins.
        let policy = SabotagePolicy::default();
        assert!(matches!(
            policy.evaluate(0, 2),
            Err(SabotageDenial::LockoutActive { .. })
        ));
    }
}
