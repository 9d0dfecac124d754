//! Wall-clock countdown reconciliation.
//!
//! The authoritative source declares a round duration in seconds; clients
//! must render a monotonically decreasing countdown that survives delivery
//! jitter, repeated snapshots of the same round, and tab suspension. The
//! approach: anchor an absolute deadline once per round, then derive the
//! displayed value from the deadline on every tick instead of counting
//! ticks.
//!
//! [`Countdown`] (deadline-anchored) is the authoritative clock for every
//! timing-gated policy, most importantly the sabotage lockout.
//! [`DisplayCountdown`] re-anchors once per tick and exists only for
//! auxiliary displays; it must never feed a policy decision.

use web_time::{Duration, Instant};

/// Recommended tick cadence for driving [`Countdown::remaining`].
///
/// Two updates a second keeps the display smooth without the countdown
/// ever being the bottleneck; the value shown is derived from the deadline,
/// so a slower cadence only coarsens the display, never drifts it.
pub const RECOMMENDED_TICK_INTERVAL: Duration = Duration::from_millis(500);

/// A deadline-anchored countdown.
///
/// On receipt of a round start, compute `deadline = now + duration`; each
/// tick recomputes `remaining = ceil(deadline - now)` clamped to zero.
/// Re-anchoring is the caller's responsibility and must happen only when
/// the session phase transitions into `PLAYING`, never on every snapshot —
/// repeated snapshots of the same round would otherwise stretch the round.
///
/// # Examples
///
/// ```
/// use logic_arena::Countdown;
/// use web_time::{Duration, Instant};
///
/// let t0 = Instant::now();
/// let mut countdown = Countdown::new();
/// countdown.anchor_at(t0, 30);
///
/// assert_eq!(countdown.remaining_at(t0), 30);
/// assert_eq!(countdown.remaining_at(t0 + Duration::from_millis(29_500)), 1);
/// assert_eq!(countdown.remaining_at(t0 + Duration::from_secs(31)), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Countdown {
    deadline: Option<Instant>,
}

impl Countdown {
    /// Creates an idle countdown with no deadline.
    #[must_use]
    pub const fn new() -> Self {
        Self { deadline: None }
    }

    /// Anchors the deadline `duration_secs` from now.
    pub fn anchor(&mut self, duration_secs: u32) {
        self.anchor_at(Instant::now(), duration_secs);
    }

    /// Anchors the deadline `duration_secs` from the given instant.
    pub fn anchor_at(&mut self, now: Instant, duration_secs: u32) {
        self.deadline = Some(now + Duration::from_secs(u64::from(duration_secs)));
    }

    /// Drops the deadline, returning the countdown to idle.
    ///
    /// Callers must suspend ticking through this before re-anchoring a new
    /// round, so a tick never races a re-anchor.
    pub fn suspend(&mut self) {
        self.deadline = None;
    }

    /// True iff a deadline is currently anchored.
    #[inline]
    #[must_use]
    pub const fn is_anchored(&self) -> bool {
        self.deadline.is_some()
    }

    /// Whole seconds remaining as of now (ceiling, clamped to zero).
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining_at(Instant::now())
    }

    /// Whole seconds remaining as of the given instant.
    ///
    /// Returns zero when idle or past the deadline, and sticks at zero
    /// thereafter; ticking can stop once this reaches zero.
    #[must_use]
    pub fn remaining_at(&self, now: Instant) -> u32 {
        let Some(deadline) = self.deadline else {
            return 0;
        };
        let left = deadline.saturating_duration_since(now);
        let millis = left.as_millis();
        // Ceiling division: 29.5s displays as 30 until it actually elapses.
        u32::try_from(millis.div_ceil(1000)).unwrap_or(u32::MAX)
    }

    /// True iff a deadline is anchored and has passed.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }

    /// True iff a deadline is anchored and has passed, as of now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}

/// A display-only countdown that decrements once per externally driven
/// second tick.
///
/// Auxiliary surfaces (a pulsing header, a coarse progress bar) may prefer
/// a value that moves exactly once a second regardless of jitter. This
/// ticker drifts with its tick source and is therefore non-authoritative:
/// sabotage-lockout and round-end decisions read [`Countdown`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayCountdown {
    remaining_secs: u32,
}

impl DisplayCountdown {
    /// Creates a ticker starting at the given number of seconds.
    #[must_use]
    pub const fn new(duration_secs: u32) -> Self {
        Self {
            remaining_secs: duration_secs,
        }
    }

    /// Restarts the ticker at the given number of seconds.
    pub fn restart(&mut self, duration_secs: u32) {
        self.remaining_secs = duration_secs;
    }

    /// Consumes one second of display time, saturating at zero.
    pub fn tick(&mut self) {
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
    }

    /// The currently displayed value.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining_secs
    }
}

// #########
// # TESTS #
// #########
