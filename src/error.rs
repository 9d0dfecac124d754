//! Error types returned by the session engine.

use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::{sabotage::SabotageDenial, PlayerId, Role, SessionPhase, TeamId};

/// Convenience alias for results returned by this crate.
pub type ArenaResult<T> = Result<T, ArenaError>;

/// This enum contains all error messages this library can return. Most API
/// functions will generally return an [`ArenaResult`].
///
/// Every error here is recoverable and local to the issuing client: the
/// command is rejected, the issuer is informed, and no other participant's
/// view is affected. The core has no fatal error paths; a snapshot that
/// fails structural validation surfaces as
/// [`MalformedSnapshot`](ArenaError::MalformedSnapshot) and flips the
/// observer into an "engine unavailable" state instead of guessing
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
    /// A command was issued in a session phase that forbids it. The command
    /// is rejected with no state change; accepting it silently would be a
    /// protocol violation.
    IllegalTransition {
        /// The phase the session was in when the command arrived.
        phase: SessionPhase,
        /// The name of the rejected command.
        command: &'static str,
    },
    /// A sabotage attempt fell outside the score/time window allowed by the
    /// [`SabotagePolicy`](crate::SabotagePolicy). Rejected with no state
    /// change and no cost; reported to the actor only.
    PolicyDenied {
        /// Why the policy refused the sabotage.
        denial: SabotageDenial,
    },
    /// A command carried a malformed payload (e.g. a non-binary vote).
    ValidationError {
        /// Further specifies what was malformed.
        info: String,
    },
    /// The command was issued by, or targeted at, a participant unknown to
    /// the session.
    UnknownPlayer {
        /// The player id that could not be resolved.
        player: PlayerId,
    },
    /// The command referenced a team unknown to the session.
    UnknownTeam {
        /// The team id that could not be resolved.
        team: TeamId,
    },
    /// The command requires a role the issuer does not hold (e.g. only the
    /// operator may start rounds or kick players; operators never vote).
    RoleForbidden {
        /// The role the issuer holds.
        role: Role,
        /// The name of the rejected command.
        command: &'static str,
    },
    /// A participant tried to join with an id that is already present.
    DuplicatePlayer {
        /// The id that is already taken.
        player: PlayerId,
    },
    /// A team was added with an id that is already present.
    DuplicateTeam {
        /// The id that is already taken.
        team: TeamId,
    },
    /// A join targeted a team that already holds the maximum number of
    /// players.
    TeamFull {
        /// The full team.
        team: TeamId,
        /// The configured per-team capacity.
        capacity: usize,
    },
    /// Someone tried to claim the operator seat while it was occupied.
    OperatorSeatTaken,
    /// An inbound snapshot failed basic structural validation. The observer
    /// refuses to derive conclusions from it.
    MalformedSnapshot {
        /// A description of what failed to parse or validate.
        context: String,
    },
}

impl Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArenaError::IllegalTransition { phase, command } => {
                write!(
                    f,
                    "Command '{}' is not legal while the session is {}.",
                    command, phase
                )
            }
            ArenaError::PolicyDenied { denial } => {
                write!(f, "Sabotage denied: {}", denial)
            }
            ArenaError::ValidationError { info } => {
                write!(f, "Validation error: {}", info)
            }
            ArenaError::UnknownPlayer { player } => {
                write!(f, "No player '{}' in this session.", player)
            }
            ArenaError::UnknownTeam { team } => {
                write!(f, "No team '{}' in this session.", team)
            }
            ArenaError::RoleForbidden { role, command } => {
                write!(f, "Command '{}' is not available to role {:?}.", command, role)
            }
            ArenaError::DuplicatePlayer { player } => {
                write!(f, "Player id '{}' is already in use.", player)
            }
            ArenaError::DuplicateTeam { team } => {
                write!(f, "Team id '{}' is already in use.", team)
            }
            ArenaError::TeamFull { team, capacity } => {
                write!(f, "Team '{}' already has {} players.", team, capacity)
            }
            ArenaError::OperatorSeatTaken => {
                write!(f, "This session already has an operator.")
            }
            ArenaError::MalformedSnapshot { context } => {
                write!(f, "Refusing to process malformed snapshot: {}", context)
            }
        }
    }
}

impl Error for ArenaError {}
