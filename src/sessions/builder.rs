use crate::{
    error::{ArenaError, ArenaResult},
    gate::GateKind,
    rng::Pcg32,
    sabotage::SabotagePolicy,
    sessions::host_session::{empty_team, HostSession},
    sessions::observer_session::ObserverSession,
    snapshot::{SessionSnapshot, DEFAULT_MAX_PLAYERS_PER_TEAM},
    GameMode, LogicMode, PlayerId, Role, RoundNumber, SessionPhase, TeamId,
};

/// Default session identifier for locally built sessions.
const DEFAULT_SESSION_ID: &str = "arena";
/// Default RNG seed for card dealing. Hosts that want non-reproducible
/// deals should seed from an external entropy source.
const DEFAULT_RNG_SEED: u64 = 0x5eed;
/// Default event queue size.
/// Events older than this threshold are dropped if not polled.
const DEFAULT_EVENT_QUEUE_SIZE: usize = 100;

/// The [`SessionBuilder`] builds both session types.
///
/// Configure the shared session parameters, then consume the builder with
/// [`start_host_session`](Self::start_host_session) for the authoritative
/// source of truth or
/// [`start_observer_session`](Self::start_observer_session) for a client.
///
/// # Example
///
/// ```
/// use logic_arena::{GateKind, SessionBuilder};
///
/// let host = SessionBuilder::new()
///     .with_session_id("friday-night")
///     .with_target_gate(GateKind::Xor)
///     .with_rng_seed(0xfeed)
///     .start_host_session();
/// ```
#[must_use = "SessionBuilder must be consumed by calling a start_*_session method"]
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    session_id: String,
    policy: SabotagePolicy,
    game_mode: GameMode,
    logic_mode: LogicMode,
    target_gate: GateKind,
    target_gates: Vec<GateKind>,
    max_players_per_team: usize,
    event_queue_size: usize,
    rng_seed: u64,
    teams: Vec<(TeamId, String)>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    /// Constructs a new builder with all values set to their defaults.
    pub fn new() -> Self {
        Self {
            session_id: DEFAULT_SESSION_ID.to_owned(),
            policy: SabotagePolicy::default(),
            game_mode: GameMode::default(),
            logic_mode: LogicMode::default(),
            target_gate: GateKind::And,
            target_gates: vec![GateKind::And],
            max_players_per_team: DEFAULT_MAX_PLAYERS_PER_TEAM,
            event_queue_size: DEFAULT_EVENT_QUEUE_SIZE,
            rng_seed: DEFAULT_RNG_SEED,
            teams: Vec::new(),
        }
    }

    /// Sets the session identifier carried in every snapshot.
    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = id.into();
        self
    }

    /// Sets the sabotage policy (lockout window, score threshold, cost).
    pub fn with_sabotage_policy(mut self, policy: SabotagePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the gate assignment mode.
    pub fn with_game_mode(mut self, mode: GameMode) -> Self {
        self.game_mode = mode;
        self
    }

    /// Sets the round objective.
    pub fn with_logic_mode(mut self, mode: LogicMode) -> Self {
        self.logic_mode = mode;
        self
    }

    /// Sets the single target gate used in competitive mode.
    pub fn with_target_gate(mut self, gate: GateKind) -> Self {
        self.target_gate = gate;
        self
    }

    /// Sets the shared campaign gate sequence.
    pub fn with_target_gates(mut self, gates: Vec<GateKind>) -> Self {
        self.target_gates = gates;
        self
    }

    /// Sets the per-team roster capacity.
    pub fn with_max_players_per_team(mut self, count: usize) -> Self {
        self.max_players_per_team = count;
        self
    }

    /// Sets how many unpolled edge events an observer retains before the
    /// oldest are dropped.
    pub fn with_event_queue_size(mut self, size: usize) -> Self {
        self.event_queue_size = size;
        self
    }

    /// Seeds the card-dealing RNG for deterministic deals.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = seed;
        self
    }

    /// Pre-creates a team. Teams can also be created later via the
    /// `add_team` command or implicitly by the first player join.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::DuplicateTeam`] if the id was added before.
    pub fn add_team(mut self, id: TeamId, name: impl Into<String>) -> ArenaResult<Self> {
        if self.teams.iter().any(|(existing, _)| existing == &id) {
            return Err(ArenaError::DuplicateTeam { team: id });
        }
        self.teams.push((id, name.into()));
        Ok(self)
    }

    /// Consumes the builder and starts the authoritative session in the
    /// lobby phase.
    #[must_use]
    pub fn start_host_session(self) -> HostSession {
        let state = SessionSnapshot {
            id: self.session_id,
            phase: SessionPhase::Lobby,
            round_number: RoundNumber::ZERO,
            timer_secs: 0,
            logic_mode: self.logic_mode,
            game_mode: self.game_mode,
            target_gate: self.target_gate,
            target_gates: self.target_gates,
            sabotage_lockout_secs: self.policy.lockout_seconds,
            max_players_per_team: self.max_players_per_team,
            operator: None,
            teams: self
                .teams
                .into_iter()
                .map(|(id, name)| (id.clone(), empty_team(id, name)))
                .collect(),
        };
        HostSession::new(state, self.policy, Pcg32::seed_from_u64(self.rng_seed))
    }

    /// Consumes the builder and starts a client-side observer for the
    /// given local participant.
    #[must_use]
    pub fn start_observer_session(self, local_id: PlayerId, role: Role) -> ObserverSession {
        ObserverSession::new(local_id, role, self.policy, self.event_queue_size)
    }
}

// #########
// # TESTS #
// #########

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let host = SessionBuilder::new().start_host_session();
        let snapshot = host.snapshot();
        assert_eq!(snapshot.id, DEFAULT_SESSION_ID);
        assert_eq!(snapshot.phase, SessionPhase::Lobby);
        assert_eq!(snapshot.round_number, RoundNumber::ZERO);
        assert_eq!(snapshot.sabotage_lockout_secs, 5);
        assert_eq!(snapshot.max_players_per_team, 3);
        assert!(snapshot.teams.is_empty());
        assert!(snapshot.operator.is_none());
    }

    #[test]
    fn pre_created_teams_appear_in_the_first_snapshot() {
        let host = SessionBuilder::new()
            .add_team(TeamId::new("A"), "Alpha")
            .unwrap()
            .add_team(TeamId::new("B"), "Beta")
            .unwrap()
            .start_host_session();
        let snapshot = host.snapshot();
        assert_eq!(snapshot.teams.len(), 2);
        assert_eq!(snapshot.teams[&TeamId::new("A")].name, "Alpha");
    }

    #[test]
    fn duplicate_team_ids_are_rejected() {
        let err = SessionBuilder::new()
            .add_team(TeamId::new("A"), "Alpha")
            .unwrap()
            .add_team(TeamId::new("A"), "Again")
            .unwrap_err();
        assert_eq!(
            err,
            ArenaError::DuplicateTeam {
                team: TeamId::new("A")
            }
        );
    }

    #[test]
    fn policy_flows_into_both_session_types() {
        let policy = SabotagePolicy::strict();
        let host = SessionBuilder::new()
            .with_sabotage_policy(policy)
            .start_host_session();
        assert_eq!(host.policy().min_score_exclusive, 4);

        let observer = SessionBuilder::new()
            .with_sabotage_policy(policy)
            .start_observer_session(PlayerId::new("p1"), Role::Player);
        assert_eq!(observer.role(), Role::Player);
    }
}
