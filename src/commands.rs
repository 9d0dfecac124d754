//! Outbound commands.
//!
//! Commands are fire-and-forget: a client sends one and never blocks on an
//! acknowledgement. Every resulting state change is observed only through a
//! subsequent snapshot; rejection is reported to the issuing client alone.
//! Retry and backoff belong to the transport collaborator, not here.

use crate::{error::ArenaError, error::ArenaResult, gate::GateKind, Bit, GameMode, LogicMode,
    PlayerId, Role, TeamId};

/// The gate payload of a `set_target_gate` command: a single gate for
/// competitive play or a rotation sequence for campaign play.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum GateSelection {
    /// One fixed gate (competitive mode).
    Single(GateKind),
    /// A cyclical sequence, advanced one step per round (campaign mode).
    Sequence(Vec<GateKind>),
}

/// Every command a client can send to the authoritative source.
///
/// The wire form is tagged JSON (`{"type": "submit_vote", "vote": 1}`),
/// matching the self-describing snapshot format.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Operator: begin a new round with the given duration.
    StartRound {
        /// Round length in seconds.
        duration_secs: u32,
    },
    /// Player: cast, change, or retract (`None`) a vote. Last write wins.
    SubmitVote {
        /// The vote, or `None` to retract.
        vote: Option<Bit>,
    },
    /// Player or operator: toggle a NOT gate on the target player.
    ApplySabotage {
        /// The player whose bit is inverted.
        target: PlayerId,
    },
    /// Player (open mode): attempt to force the gate open now.
    AttemptOverride,
    /// Operator: remove a player from the session.
    KickPlayer {
        /// The player to remove.
        target: PlayerId,
    },
    /// Operator: change the gate assignment mode.
    SetGameMode {
        /// The new mode.
        mode: GameMode,
    },
    /// Operator: change the target gate or campaign sequence.
    SetTargetGate {
        /// The new gate selection.
        selection: GateSelection,
    },
    /// Operator: change the round objective.
    SetLogicMode {
        /// The new objective.
        mode: LogicMode,
    },
    /// Operator: zero every team's score and round stats.
    ResetScores,
    /// Operator: flip the chat relay flag for one team.
    ToggleChat {
        /// The team whose chat flag flips.
        team: TeamId,
    },
    /// Attach a new participant to the session.
    Join {
        /// Display name.
        name: String,
        /// Avatar glyph.
        avatar: String,
        /// Requested role.
        role: Role,
        /// Target team; required for players, ignored for the operator.
        team: Option<TeamId>,
    },
    /// Operator: change the per-team roster capacity.
    SetMaxPlayers {
        /// New capacity.
        count: usize,
    },
    /// Operator: change the sabotage lockout window.
    SetSabotageLockout {
        /// New trailing window in seconds.
        seconds: u32,
    },
    /// Operator: create an empty team.
    AddTeam {
        /// Team identifier.
        team: TeamId,
        /// Display name.
        name: String,
    },
}

impl Command {
    /// The command's wire name, used in error reports.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Command::StartRound { .. } => "start_round",
            Command::SubmitVote { .. } => "submit_vote",
            Command::ApplySabotage { .. } => "apply_sabotage",
            Command::AttemptOverride => "attempt_override",
            Command::KickPlayer { .. } => "kick_player",
            Command::SetGameMode { .. } => "set_game_mode",
            Command::SetTargetGate { .. } => "set_target_gate",
            Command::SetLogicMode { .. } => "set_logic_mode",
            Command::ResetScores => "reset_scores",
            Command::ToggleChat { .. } => "toggle_chat",
            Command::Join { .. } => "join",
            Command::SetMaxPlayers { .. } => "set_max_players",
            Command::SetSabotageLockout { .. } => "set_sabotage_lockout",
            Command::AddTeam { .. } => "add_team",
        }
    }

    /// Serializes the command to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::ValidationError`] if serialization fails.
    pub fn to_json(&self) -> ArenaResult<String> {
        serde_json::to_string(self).map_err(|err| ArenaError::ValidationError {
            info: err.to_string(),
        })
    }

    /// Parses a command from its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::ValidationError`] for unparseable payloads,
    /// including non-binary vote values.
    pub fn from_json(payload: &str) -> ArenaResult<Self> {
        serde_json::from_str(payload).map_err(|err| ArenaError::ValidationError {
            info: err.to_string(),
        })
    }
}

/// The outbound half of the transport seam.
///
/// Implementations forward commands to the authoritative source however
/// they like (websocket, channel, in-process call); the engine never waits
/// for a reply. Delivery may be best-effort.
pub trait CommandSink {
    /// Sends one command, fire-and-forget.
    fn send(&mut self, command: Command);
}

impl CommandSink for Vec<Command> {
    fn send(&mut self, command: Command) {
        self.push(command);
    }
}

// #########
// # TESTS #
// #########

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_wire_format_is_tagged() {
        let command = Command::SubmitVote {
            vote: Some(Bit::ONE),
        };
        assert_eq!(
            command.to_json().unwrap(),
            r#"{"type":"submit_vote","vote":1}"#
        );
    }

    #[test]
    fn vote_retraction_roundtrips() {
        let command = Command::SubmitVote { vote: None };
        let parsed = Command::from_json(&command.to_json().unwrap()).unwrap();
        assert_eq!(parsed, command);
    }

    #[test]
    fn non_binary_vote_fails_validation() {
        let err = Command::from_json(r#"{"type":"submit_vote","vote":3}"#).unwrap_err();
        assert!(matches!(err, ArenaError::ValidationError { .. }));
    }

    #[test]
    fn gate_selection_accepts_single_or_sequence() {
        let single = Command::from_json(
            r#"{"type":"set_target_gate","selection":"XOR"}"#,
        )
        .unwrap();
        assert_eq!(
            single,
            Command::SetTargetGate {
                selection: GateSelection::Single(GateKind::Xor)
            }
        );

        let sequence = Command::from_json(
            r#"{"type":"set_target_gate","selection":["AND","NOR"]}"#,
        )
        .unwrap();
        assert_eq!(
            sequence,
            Command::SetTargetGate {
                selection: GateSelection::Sequence(vec![GateKind::And, GateKind::Nor])
            }
        );
    }

    #[test]
    fn command_names_match_wire_tags() {
        let command = Command::ApplySabotage {
            target: PlayerId::new("p9"),
        };
        assert!(command.to_json().unwrap().contains(command.name()));
    }

    #[test]
    fn vec_sink_collects_commands() {
        let mut sink: Vec<Command> = Vec::new();
        sink.send(Command::ResetScores);
        sink.send(Command::AttemptOverride);
        assert_eq!(sink.len(), 2);
    }
}
