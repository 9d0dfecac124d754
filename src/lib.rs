//! # Logic Arena
//!
//! Logic Arena is the deterministic session engine behind a real-time,
//! team-based logic-puzzle party game: teams of players each hold a binary
//! card, must collectively predict (or force) the output of an assigned
//! boolean gate, may sabotage rivals by inverting their bit, and are scored
//! round by round under a wall-clock timer.
//!
//! The engine is split into an authoritative [`HostSession`] (the source of
//! truth that validates commands and emits full-state snapshots) and an
//! [`ObserverSession`] (the client-side core that recomputes derived facts,
//! reconciles the countdown and detects one-shot edge events by diffing
//! successive snapshots). Every observer fed the same snapshot sequence
//! reaches the same conclusions, independent of duplicate or out-of-order
//! delivery.
//!
//! Rendering, audio, chat transport and the network itself are external
//! collaborators: snapshots flow in, fire-and-forget [`Command`]s flow out.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::fmt;

pub use commands::{Command, CommandSink, GateSelection};
pub use consensus::ConsensusReport;
pub use countdown::{Countdown, DisplayCountdown, RECOMMENDED_TICK_INTERVAL};
pub use error::{ArenaError, ArenaResult};
pub use events::{ArenaEvent, EventFeed, SnapshotEventDetector};
pub use gate::GateKind;
pub use sabotage::{SabotageDenial, SabotagePolicy};
pub use sessions::builder::SessionBuilder;
pub use sessions::event_drain::EventDrain;
pub use sessions::host_session::HostSession;
pub use sessions::observer_session::{EngineHealth, ObserverSession, RenderTarget, TeamFacts};
pub use snapshot::{PlayerSnapshot, RoundStats, SessionSnapshot, TeamSnapshot};

pub mod commands;
pub mod consensus;
pub mod countdown;
pub mod error;
pub mod events;
pub mod gate;
pub mod rng;
pub mod sabotage;
pub mod snapshot;
#[doc(hidden)]
pub mod sessions {
    #[doc(hidden)]
    pub mod builder;
    #[doc(hidden)]
    pub mod event_drain;
    #[doc(hidden)]
    pub mod host_session;
    #[doc(hidden)]
    pub mod observer_session;
}

// #############
// # NEWTYPES  #
// #############

/// A single binary value: a player's card, a vote, or a gate output.
///
/// `Bit` makes the "card and vote values are binary" invariant
/// unrepresentable to violate: construction only succeeds from `0`/`1`
/// (or a `bool`), and the serde impls reject any other integer at the
/// deserialization boundary.
///
/// # Examples
///
/// ```
/// use logic_arena::Bit;
///
/// assert_eq!(Bit::ONE.as_u8(), 1);
/// assert_eq!(!Bit::ONE, Bit::ZERO);
/// assert_eq!(Bit::from_u8(2), None);
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Bit(bool);

impl Bit {
    /// The bit `0`.
    pub const ZERO: Bit = Bit(false);
    /// The bit `1`.
    pub const ONE: Bit = Bit(true);

    /// Creates a `Bit` from a `bool` (`true` is `1`).
    #[inline]
    #[must_use]
    pub const fn new(value: bool) -> Self {
        Bit(value)
    }

    /// Creates a `Bit` from an integer, returning `None` for anything
    /// other than `0` or `1`.
    #[inline]
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Bit(false)),
            1 => Some(Bit(true)),
            _ => None,
        }
    }

    /// Returns the bit as `0` or `1`.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0 as u8
    }

    /// Returns the bit as a `bool`.
    #[inline]
    #[must_use]
    pub const fn as_bool(self) -> bool {
        self.0
    }

    /// Returns the inverted bit.
    #[inline]
    #[must_use]
    pub const fn flipped(self) -> Self {
        Bit(!self.0)
    }

    /// Returns the bit inverted iff `invert` is true.
    ///
    /// This is the polarity rule for sabotaged players: effective input =
    /// card value flipped when the NOT flag is set.
    #[inline]
    #[must_use]
    pub const fn flipped_if(self, invert: bool) -> Self {
        if invert {
            self.flipped()
        } else {
            self
        }
    }
}

impl std::ops::Not for Bit {
    type Output = Bit;

    #[inline]
    fn not(self) -> Self::Output {
        self.flipped()
    }
}

impl From<bool> for Bit {
    #[inline]
    fn from(value: bool) -> Self {
        Bit(value)
    }
}

impl fmt::Display for Bit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

impl serde::Serialize for Bit {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> serde::Deserialize<'de> for Bit {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = <u8 as serde::Deserialize>::deserialize(deserializer)?;
        Bit::from_u8(value)
            .ok_or_else(|| serde::de::Error::custom(format!("bit must be 0 or 1, got {value}")))
    }
}

/// A monotonically increasing round counter.
///
/// Round `0` means "no round has been played yet" (the initial lobby).
/// The counter increases by exactly one each time a round starts and
/// never decreases; observers use it as the primary ordering watermark
/// for stale-snapshot rejection.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct RoundNumber(u32);

impl RoundNumber {
    /// The pre-game round counter value.
    pub const ZERO: RoundNumber = RoundNumber(0);

    /// Creates a `RoundNumber` from a raw counter value.
    #[inline]
    #[must_use]
    pub const fn new(round: u32) -> Self {
        RoundNumber(round)
    }

    /// Returns the underlying counter value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the next round number.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        RoundNumber(self.0 + 1)
    }
}

impl fmt::Display for RoundNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unique identifier for a player within a session.
///
/// Player ids are opaque strings assigned by the transport (session ids in
/// the reference deployment). Their `Ord` is ascending lexicographic order,
/// which is also the gate input order within a team: stable and
/// deterministic regardless of join order.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct PlayerId(String);

impl PlayerId {
    /// Creates a new `PlayerId`.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        PlayerId(id.into())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        PlayerId::new(id)
    }
}

/// A unique identifier for a team within a session.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct TeamId(String);

impl TeamId {
    /// Creates a new `TeamId`.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        TeamId(id.into())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TeamId {
    fn from(id: &str) -> Self {
        TeamId::new(id)
    }
}

// #############
// #   ENUMS   #
// #############

/// The lifecycle state of a session.
///
/// A session is always in exactly one phase. The derived `Ord`
/// (`Lobby < Playing < Finished`) is the within-round ordering used by
/// observers to drop out-of-order snapshots.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPhase {
    /// Pre-round: mode, gate and duration editing is permitted.
    Lobby,
    /// A round is active: voting and sabotage are permitted subject to policy.
    Playing,
    /// The round is resolved and read-only until the next round starts.
    Finished,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Lobby => "LOBBY",
            SessionPhase::Playing => "PLAYING",
            SessionPhase::Finished => "FINISHED",
        };
        f.write_str(name)
    }
}

/// How gates are assigned to teams at round start.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Every team plays the single operator-selected target gate.
    #[default]
    Competitive,
    /// Each team gets a different gate, rotating every round.
    Asymmetric,
    /// All teams share a gate sequence that advances one step per round.
    Campaign,
}

/// The round objective.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogicMode {
    /// Teams must unanimously predict the gate output from their cards.
    #[default]
    Predict,
    /// Teams must force the gate output to `1` and explicitly attempt an
    /// override once everyone has confirmed.
    Open,
}

/// The role a participant holds in the session.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A team member holding a card and a vote.
    #[default]
    Player,
    /// The single session operator: belongs to no team and never votes.
    Operator,
}

/// The resolution of a team's round.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundOutcome {
    /// The team met the round objective.
    Success,
    /// The team missed the round objective.
    Failure,
}

// ###################
// # UNIT TESTS      #
// ###################

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================
    // Bit Tests
    // ==========================================

    #[test]
    fn bit_from_u8_accepts_only_binary() {
        assert_eq!(Bit::from_u8(0), Some(Bit::ZERO));
        assert_eq!(Bit::from_u8(1), Some(Bit::ONE));
        assert_eq!(Bit::from_u8(2), None);
        assert_eq!(Bit::from_u8(255), None);
    }

    #[test]
    fn bit_flip_roundtrip() {
        assert_eq!(Bit::ZERO.flipped(), Bit::ONE);
        assert_eq!(Bit::ONE.flipped().flipped(), Bit::ONE);
        assert_eq!(!Bit::ZERO, Bit::ONE);
    }

    #[test]
    fn bit_flipped_if_applies_polarity() {
        assert_eq!(Bit::ONE.flipped_if(false), Bit::ONE);
        assert_eq!(Bit::ONE.flipped_if(true), Bit::ZERO);
        assert_eq!(Bit::ZERO.flipped_if(true), Bit::ONE);
    }

    #[test]
    fn bit_serializes_as_integer() {
        let json = serde_json::to_string(&Bit::ONE).unwrap();
        assert_eq!(json, "1");
        let bit: Bit = serde_json::from_str("0").unwrap();
        assert_eq!(bit, Bit::ZERO);
    }

    #[test]
    fn bit_rejects_non_binary_json() {
        assert!(serde_json::from_str::<Bit>("2").is_err());
        assert!(serde_json::from_str::<Bit>("true").is_err());
        assert!(serde_json::from_str::<Bit>("\"1\"").is_err());
    }

    #[test]
    fn bit_display() {
        assert_eq!(Bit::ZERO.to_string(), "0");
        assert_eq!(Bit::ONE.to_string(), "1");
    }

    // ==========================================
    // RoundNumber Tests
    // ==========================================

    #[test]
    fn round_number_starts_at_zero() {
        assert_eq!(RoundNumber::ZERO.as_u32(), 0);
        assert_eq!(RoundNumber::default(), RoundNumber::ZERO);
    }

    #[test]
    fn round_number_next_increments_by_one() {
        let round = RoundNumber::new(3);
        assert_eq!(round.next(), RoundNumber::new(4));
        assert!(round.next() > round);
    }

    #[test]
    fn round_number_serde_transparent() {
        let json = serde_json::to_string(&RoundNumber::new(7)).unwrap();
        assert_eq!(json, "7");
    }

    // ==========================================
    // Identifier Tests
    // ==========================================

    #[test]
    fn player_id_orders_lexicographically() {
        let a = PlayerId::new("alice");
        let b = PlayerId::new("bob");
        let z = PlayerId::new("Zed");
        assert!(a < b);
        // Byte-wise lexicographic: uppercase sorts before lowercase.
        assert!(z < a);
    }

    #[test]
    fn team_id_display_roundtrip() {
        let id = TeamId::new("A");
        assert_eq!(id.to_string(), "A");
        assert_eq!(id.as_str(), "A");
    }

    // ==========================================
    // Enum wire format Tests
    // ==========================================

    #[test]
    fn session_phase_wire_format_is_screaming() {
        assert_eq!(
            serde_json::to_string(&SessionPhase::Playing).unwrap(),
            "\"PLAYING\""
        );
        let phase: SessionPhase = serde_json::from_str("\"LOBBY\"").unwrap();
        assert_eq!(phase, SessionPhase::Lobby);
    }

    #[test]
    fn session_phase_ordering_for_watermarks() {
        assert!(SessionPhase::Lobby < SessionPhase::Playing);
        assert!(SessionPhase::Playing < SessionPhase::Finished);
    }

    #[test]
    fn mode_wire_formats_are_lowercase() {
        assert_eq!(
            serde_json::to_string(&GameMode::Asymmetric).unwrap(),
            "\"asymmetric\""
        );
        assert_eq!(
            serde_json::to_string(&LogicMode::Predict).unwrap(),
            "\"predict\""
        );
        assert_eq!(
            serde_json::to_string(&Role::Operator).unwrap(),
            "\"operator\""
        );
        assert_eq!(
            serde_json::to_string(&RoundOutcome::Failure).unwrap(),
            "\"failure\""
        );
    }
}
