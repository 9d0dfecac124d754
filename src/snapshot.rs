//! The full-state session snapshot.
//!
//! A snapshot is a complete, self-describing representation of session
//! state at one instant. The authoritative source pushes one on every
//! meaningful mutation; there are no partial or delta snapshots. Everything
//! a client displays is either a field carried here or a fact recomputed
//! from these fields, so independent observers reach identical conclusions.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::{
    consensus::ConsensusReport, error::ArenaError, error::ArenaResult, gate::GateKind, Bit,
    GameMode, LogicMode, PlayerId, RoundNumber, RoundOutcome, SessionPhase, TeamId,
};

/// The default number of players a team may hold.
pub const DEFAULT_MAX_PLAYERS_PER_TEAM: usize = 3;

/// Per-round score movement, frozen for display once the round is resolved.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize,
)]
pub struct RoundStats {
    /// Flat points for meeting the round objective.
    pub base: u32,
    /// Extra points for harder gate types.
    pub bonus: u32,
    /// Points lost to failure, or to having been sabotaged on the way to a
    /// success.
    pub penalty: u32,
}

impl RoundStats {
    /// The signed score delta these stats apply to a team.
    #[inline]
    #[must_use]
    pub const fn delta(&self) -> i32 {
        self.base as i32 + self.bonus as i32 - self.penalty as i32
    }
}

/// One player's slice of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PlayerSnapshot {
    /// Display name.
    pub name: String,
    /// Avatar glyph shown next to the name.
    pub avatar: String,
    /// The card dealt by the authoritative source this round.
    pub card_value: Bit,
    /// The player's vote, `None` until cast. Mutable only while PLAYING.
    pub vote_value: Option<Bit>,
    /// Sabotage flag: the player's effective bit is inverted while set.
    /// Cleared at the start of every round.
    pub has_not_gate: bool,
}

impl PlayerSnapshot {
    /// The bit this player actually feeds into the gate: the card value
    /// with polarity flipped when sabotaged.
    #[inline]
    #[must_use]
    pub const fn effective_bit(&self) -> Bit {
        self.card_value.flipped_if(self.has_not_gate)
    }
}

/// One team's slice of the snapshot.
///
/// `players` is a [`BTreeMap`] keyed by [`PlayerId`], so iterating it
/// yields players in ascending lexicographic id order — exactly the gate
/// input order, stable regardless of join order.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TeamSnapshot {
    /// Team identifier.
    pub id: TeamId,
    /// Display name.
    pub name: String,
    /// Cumulative score. May go negative.
    pub score: i32,
    /// The gate this team plays in the current round.
    pub current_gate: GateKind,
    /// True once the team has met the round objective.
    pub solved_current_round: bool,
    /// The previous round's resolution, `None` before the first resolution
    /// or after a round start clears it.
    pub last_round_result: Option<RoundOutcome>,
    /// Score movement from the last resolution.
    pub round_stats: RoundStats,
    /// Whether the chat relay is enabled for this team.
    pub chat_enabled: bool,
    /// True if a rival inverted one of this team's players this round.
    #[serde(default)]
    pub was_sabotaged: bool,
    /// How many sabotages this team bought this round.
    #[serde(default)]
    pub sabotages_used: u32,
    /// The team roster, keyed (and therefore gate-ordered) by player id.
    pub players: BTreeMap<PlayerId, PlayerSnapshot>,
}

impl TeamSnapshot {
    /// The team's effective gate inputs, in ascending player id order.
    #[must_use]
    pub fn effective_inputs(&self) -> SmallVec<[Bit; 4]> {
        self.players
            .values()
            .map(PlayerSnapshot::effective_bit)
            .collect()
    }

    /// Evaluates the team's gate over its effective inputs.
    #[must_use]
    pub fn gate_output(&self) -> Bit {
        self.current_gate.evaluate(&self.effective_inputs())
    }

    /// Assesses the team's current voting state.
    #[must_use]
    pub fn consensus(&self) -> ConsensusReport {
        ConsensusReport::assess(self.players.values().map(|player| player.vote_value))
    }
}

/// A complete session snapshot.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub id: String,
    /// Lifecycle phase.
    pub phase: SessionPhase,
    /// Monotonic round counter.
    pub round_number: RoundNumber,
    /// Authoritative seconds remaining at the instant this snapshot was
    /// emitted. Zero outside PLAYING.
    pub timer_secs: u32,
    /// The round objective.
    pub logic_mode: LogicMode,
    /// How gates are assigned at round start.
    pub game_mode: GameMode,
    /// The single target gate (competitive mode).
    pub target_gate: GateKind,
    /// The shared gate sequence (campaign mode).
    pub target_gates: Vec<GateKind>,
    /// Trailing seconds of a round during which sabotage is disallowed.
    pub sabotage_lockout_secs: u32,
    /// Per-team roster capacity.
    pub max_players_per_team: usize,
    /// The operator seat, if occupied. Operators belong to no team.
    pub operator: Option<PlayerId>,
    /// All teams, keyed by team id.
    pub teams: BTreeMap<TeamId, TeamSnapshot>,
}

impl SessionSnapshot {
    /// Parses a snapshot from its JSON wire form and validates its
    /// structure.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::MalformedSnapshot`] if the payload does not
    /// parse, is missing required fields, carries non-binary bit values,
    /// or fails the structural checks in [`validate`](Self::validate).
    /// Clients must refuse to derive conclusions from such a payload
    /// rather than guessing defaults.
    pub fn from_json(payload: &str) -> ArenaResult<Self> {
        let snapshot: SessionSnapshot =
            serde_json::from_str(payload).map_err(|err| ArenaError::MalformedSnapshot {
                context: err.to_string(),
            })?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Serializes the snapshot to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::MalformedSnapshot`] if serialization fails,
    /// which would indicate an internal inconsistency.
    pub fn to_json(&self) -> ArenaResult<String> {
        serde_json::to_string(self).map_err(|err| ArenaError::MalformedSnapshot {
            context: err.to_string(),
        })
    }

    /// Structural validation beyond what the type system enforces.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::MalformedSnapshot`] if a team map key
    /// disagrees with the team's own id, or the operator also appears on
    /// a team roster.
    pub fn validate(&self) -> ArenaResult<()> {
        for (key, team) in &self.teams {
            if key != &team.id {
                return Err(ArenaError::MalformedSnapshot {
                    context: format!("team map key '{}' disagrees with team id '{}'", key, team.id),
                });
            }
        }
        if let Some(operator) = &self.operator {
            if self
                .teams
                .values()
                .any(|team| team.players.contains_key(operator))
            {
                return Err(ArenaError::MalformedSnapshot {
                    context: format!("operator '{}' also appears on a team roster", operator),
                });
            }
        }
        Ok(())
    }

    /// Finds a player anywhere in the session.
    #[must_use]
    pub fn find_player(&self, player: &PlayerId) -> Option<(&TeamId, &PlayerSnapshot)> {
        self.teams.values().find_map(|team| {
            team.players
                .get(player)
                .map(|snapshot| (&team.id, snapshot))
        })
    }

    /// The team a player belongs to, if any.
    #[must_use]
    pub fn team_of(&self, player: &PlayerId) -> Option<&TeamSnapshot> {
        self.teams
            .values()
            .find(|team| team.players.contains_key(player))
    }

    /// True iff the given id holds the operator seat.
    #[must_use]
    pub fn is_operator(&self, player: &PlayerId) -> bool {
        self.operator.as_ref() == Some(player)
    }

    /// The `(round, phase)` watermark used to order snapshots of the same
    /// session: rounds order first, then `Lobby < Playing < Finished`
    /// within a round.
    #[must_use]
    pub fn ordering_key(&self) -> (RoundNumber, SessionPhase) {
        (self.round_number, self.phase)
    }
}

// #########
// # TESTS #
// #########
