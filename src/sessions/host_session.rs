//! The authoritative round state machine.
//!
//! A [`HostSession`] owns the single source-of-truth session state, runs
//! the LOBBY → PLAYING → FINISHED lifecycle, validates every inbound
//! command against the current phase and the issuer's role, and emits the
//! full-state snapshots observers consume. Commands are processed to
//! completion one at a time; rejected commands change nothing and the
//! rejection is reported to the issuer alone.

use tracing::{debug, trace};
use web_time::Instant;

use crate::{
    commands::{Command, GateSelection},
    consensus::ConsensusReport,
    countdown::Countdown,
    error::{ArenaError, ArenaResult},
    gate::GATE_ROTATION,
    rng::Pcg32,
    sabotage::SabotagePolicy,
    snapshot::{PlayerSnapshot, RoundStats, SessionSnapshot, TeamSnapshot},
    Bit, GameMode, LogicMode, PlayerId, Role, RoundOutcome, SessionPhase, TeamId,
};

/// Flat points for meeting the round objective.
const BASE_SUCCESS_POINTS: u32 = 1;
/// Points lost for missing the round objective.
const FAILURE_PENALTY: u32 = 1;
/// Points lost for succeeding while carrying a rival's NOT gate.
const SABOTAGE_RECOVERY_PENALTY: u32 = 1;
/// Points lost per rejected open-mode override attempt, folded into the
/// round resolution so scores only move at resolution time.
const FAILED_OVERRIDE_PENALTY: u32 = 1;

/// The authoritative session: state machine, scoring, and snapshot source.
///
/// Built via [`SessionBuilder`](crate::SessionBuilder). Drive it from a
/// single-threaded event loop: [`handle_command`](Self::handle_command) for
/// each inbound command, [`advance_clock`](Self::advance_clock) on a
/// periodic tick, [`snapshot`](Self::snapshot) after every mutation.
#[derive(Debug)]
pub struct HostSession {
    state: SessionSnapshot,
    countdown: Countdown,
    policy: SabotagePolicy,
    rng: Pcg32,
}

impl HostSession {
    pub(crate) fn new(state: SessionSnapshot, policy: SabotagePolicy, rng: Pcg32) -> Self {
        Self {
            state,
            countdown: Countdown::new(),
            policy,
            rng,
        }
    }

    /// The current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    /// The current round counter.
    #[must_use]
    pub fn round_number(&self) -> crate::RoundNumber {
        self.state.round_number
    }

    /// The active sabotage policy.
    #[must_use]
    pub fn policy(&self) -> &SabotagePolicy {
        &self.policy
    }

    /// Emits a full self-contained snapshot of the session as of now.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_at(Instant::now())
    }

    /// Emits a snapshot with the timer evaluated at the given instant.
    #[must_use]
    pub fn snapshot_at(&self, now: Instant) -> SessionSnapshot {
        let mut snapshot = self.state.clone();
        snapshot.timer_secs = if snapshot.phase == SessionPhase::Playing {
            self.countdown.remaining_at(now)
        } else {
            0
        };
        snapshot
    }

    /// Processes one command from the given actor.
    ///
    /// # Errors
    ///
    /// Returns the rejection to report to the issuing client; the session
    /// state is unchanged on every error except a failed open-mode
    /// override, which records its penalty for the next resolution.
    pub fn handle_command(&mut self, actor: &PlayerId, command: Command) -> ArenaResult<()> {
        self.handle_command_at(Instant::now(), actor, command)
    }

    /// Deterministic entry point for command processing, used by tests and
    /// replays.
    ///
    /// # Errors
    ///
    /// See [`handle_command`](Self::handle_command).
    pub fn handle_command_at(
        &mut self,
        now: Instant,
        actor: &PlayerId,
        command: Command,
    ) -> ArenaResult<()> {
        trace!(actor = %actor, command = command.name(), "processing command");
        match command {
            Command::StartRound { duration_secs } => self.start_round(now, actor, duration_secs),
            Command::SubmitVote { vote } => self.submit_vote(actor, vote),
            Command::ApplySabotage { target } => self.apply_sabotage(now, actor, &target),
            Command::AttemptOverride => self.attempt_override(actor),
            Command::KickPlayer { target } => self.kick_player(actor, &target),
            Command::SetGameMode { mode } => self.set_game_mode(actor, mode),
            Command::SetTargetGate { selection } => self.set_target_gate(actor, selection),
            Command::SetLogicMode { mode } => self.set_logic_mode(actor, mode),
            Command::ResetScores => self.reset_scores(actor),
            Command::ToggleChat { team } => self.toggle_chat(actor, &team),
            Command::Join {
                name,
                avatar,
                role,
                team,
            } => self.join(actor, name, avatar, role, team),
            Command::SetMaxPlayers { count } => self.set_max_players(actor, count),
            Command::SetSabotageLockout { seconds } => self.set_sabotage_lockout(actor, seconds),
            Command::AddTeam { team, name } => self.add_team(actor, &team, name),
        }
    }

    /// Advances the authoritative clock; finishes the round if the
    /// deadline has passed. Returns `true` if the round just resolved.
    pub fn advance_clock(&mut self) -> bool {
        self.advance_clock_at(Instant::now())
    }

    /// Clock advancement with an explicit instant, for tests and replays.
    pub fn advance_clock_at(&mut self, now: Instant) -> bool {
        if self.state.phase != SessionPhase::Playing || !self.countdown.is_expired_at(now) {
            return false;
        }
        // Final evaluation before resolving: a late sabotage may have made
        // standing votes correct.
        if self.state.logic_mode == LogicMode::Predict {
            for team in self.state.teams.values_mut() {
                check_predict_team(team);
            }
        }
        debug!(round = %self.state.round_number, "round timer expired");
        self.finish_round();
        true
    }

    /// Removes a participant (player or operator), e.g. on disconnect.
    /// Unknown ids are ignored.
    pub fn remove_participant(&mut self, id: &PlayerId) {
        if self.state.operator.as_ref() == Some(id) {
            self.state.operator = None;
            return;
        }
        for team in self.state.teams.values_mut() {
            if team.players.remove(id).is_some() {
                return;
            }
        }
    }

    // ###############
    // # TRANSITIONS #
    // ###############

    fn start_round(&mut self, now: Instant, actor: &PlayerId, duration_secs: u32) -> ArenaResult<()> {
        self.require_operator(actor, "start_round")?;
        if self.state.phase == SessionPhase::Playing {
            return Err(ArenaError::IllegalTransition {
                phase: self.state.phase,
                command: "start_round",
            });
        }
        if duration_secs == 0 {
            return Err(ArenaError::ValidationError {
                info: "round duration must be at least one second".to_owned(),
            });
        }

        self.state.round_number = self.state.round_number.next();
        let round = self.state.round_number;

        for team in self.state.teams.values_mut() {
            team.solved_current_round = false;
            team.last_round_result = None;
            team.round_stats = RoundStats::default();
            team.was_sabotaged = false;
            team.sabotages_used = 0;
            for player in team.players.values_mut() {
                player.card_value = self.rng.next_bit();
                player.vote_value = None;
                player.has_not_gate = false;
            }
        }
        self.assign_gates();

        self.state.phase = SessionPhase::Playing;
        // Ticks must be suspended before the new deadline is anchored.
        self.countdown.suspend();
        self.countdown.anchor_at(now, duration_secs);

        debug!(%round, duration_secs, mode = ?self.state.game_mode, "round started");
        Ok(())
    }

    /// Assigns each team's gate for the round that just started.
    fn assign_gates(&mut self) {
        let round = self.state.round_number.as_u32();
        match self.state.game_mode {
            GameMode::Competitive => {
                let gate = self.state.target_gate;
                for team in self.state.teams.values_mut() {
                    team.current_gate = gate;
                }
            }
            GameMode::Asymmetric => {
                for (index, team) in self.state.teams.values_mut().enumerate() {
                    let slot = (index + round as usize) % GATE_ROTATION.len();
                    team.current_gate = GATE_ROTATION[slot];
                }
            }
            GameMode::Campaign => {
                let sequence: &[_] = if self.state.target_gates.is_empty() {
                    std::slice::from_ref(&self.state.target_gate)
                } else {
                    &self.state.target_gates
                };
                let gate = sequence[(round as usize - 1) % sequence.len()];
                for team in self.state.teams.values_mut() {
                    team.current_gate = gate;
                }
            }
        }
    }

    fn submit_vote(&mut self, actor: &PlayerId, vote: Option<Bit>) -> ArenaResult<()> {
        self.require_playing("submit_vote")?;
        let team_id = self.team_of_player(actor, "submit_vote")?;

        let team = self.team_mut(&team_id)?;
        if let Some(player) = team.players.get_mut(actor) {
            player.vote_value = vote;
        }
        // An input change reopens the team's round until re-checked.
        team.solved_current_round = false;
        if self.state.logic_mode == LogicMode::Predict {
            let team = self.team_mut(&team_id)?;
            check_predict_team(team);
        }

        self.finish_if_all_resolved();
        Ok(())
    }

    fn apply_sabotage(&mut self, now: Instant, actor: &PlayerId, target: &PlayerId) -> ArenaResult<()> {
        self.require_playing("apply_sabotage")?;

        let target_team_id = self
            .state
            .team_of(target)
            .map(|team| team.id.clone())
            .ok_or_else(|| ArenaError::UnknownPlayer {
                player: target.clone(),
            })?;

        let seconds_remaining = self.countdown.remaining_at(now);
        let is_operator = self.state.is_operator(actor);
        let actor_team_id = if is_operator {
            None
        } else {
            Some(self.team_of_player(actor, "apply_sabotage")?)
        };

        // The trailing lockout applies to everyone, the operator included.
        if seconds_remaining <= self.policy.lockout_seconds {
            return Err(ArenaError::PolicyDenied {
                denial: crate::sabotage::SabotageDenial::LockoutActive {
                    seconds_remaining,
                    lockout_seconds: self.policy.lockout_seconds,
                },
            });
        }

        let rival_sabotage = match &actor_team_id {
            None => false,
            Some(actor_team) if *actor_team == target_team_id => {
                // Toggling inside the own team is a solving mechanic, open mode only.
                if self.state.logic_mode != LogicMode::Open {
                    return Err(ArenaError::PolicyDenied {
                        denial: crate::sabotage::SabotageDenial::OwnTeamOutsideOpenMode,
                    });
                }
                false
            }
            Some(actor_team) => {
                let score = self.team_mut(actor_team)?.score;
                self.policy
                    .evaluate(score, seconds_remaining)
                    .map_err(|denial| ArenaError::PolicyDenied { denial })?;
                true
            }
        };

        let target_team = self.team_mut(&target_team_id)?;
        let now_inverted = if let Some(player) = target_team.players.get_mut(target) {
            player.has_not_gate = !player.has_not_gate;
            player.has_not_gate
        } else {
            false
        };
        target_team.solved_current_round = false;
        if rival_sabotage && now_inverted {
            target_team.was_sabotaged = true;
        }

        if rival_sabotage {
            if let Some(actor_team_id) = actor_team_id {
                let cost = self.policy.cost;
                let actor_team = self.team_mut(&actor_team_id)?;
                actor_team.score -= cost;
                actor_team.sabotages_used += 1;
                debug!(
                    actor = %actor, target = %target, cost,
                    "sabotage applied against rival"
                );
            }
        }
        Ok(())
    }

    fn attempt_override(&mut self, actor: &PlayerId) -> ArenaResult<()> {
        self.require_playing("attempt_override")?;
        if self.state.logic_mode != LogicMode::Open {
            return Err(ArenaError::ValidationError {
                info: "attempt_override is only available in open mode".to_owned(),
            });
        }
        let team_id = self.team_of_player(actor, "attempt_override")?;
        let team = self.team_mut(&team_id)?;

        let report = team.consensus();
        if report.consensus != Some(Bit::ONE) {
            return Err(ArenaError::ValidationError {
                info: "override requires every teammate to have confirmed with 1".to_owned(),
            });
        }

        if team.gate_output() == Bit::ONE {
            team.solved_current_round = true;
            debug!(team = %team_id, "open-mode override succeeded");
            self.finish_round();
            Ok(())
        } else {
            // The attempt costs a point at the next resolution; spamming
            // overrides is not free.
            team.round_stats.penalty += FAILED_OVERRIDE_PENALTY;
            Err(ArenaError::ValidationError {
                info: "override rejected: gate output is still 0".to_owned(),
            })
        }
    }

    // ###################
    // # LOBBY COMMANDS  #
    // ###################

    fn kick_player(&mut self, actor: &PlayerId, target: &PlayerId) -> ArenaResult<()> {
        self.require_operator(actor, "kick_player")?;
        self.require_lobby("kick_player")?;
        let team_id = self
            .state
            .team_of(target)
            .map(|team| team.id.clone())
            .ok_or_else(|| ArenaError::UnknownPlayer {
                player: target.clone(),
            })?;
        self.team_mut(&team_id)?.players.remove(target);
        debug!(target = %target, "player kicked");
        Ok(())
    }

    fn set_game_mode(&mut self, actor: &PlayerId, mode: GameMode) -> ArenaResult<()> {
        self.require_operator(actor, "set_game_mode")?;
        self.require_lobby("set_game_mode")?;
        self.state.game_mode = mode;
        Ok(())
    }

    fn set_target_gate(&mut self, actor: &PlayerId, selection: GateSelection) -> ArenaResult<()> {
        self.require_operator(actor, "set_target_gate")?;
        self.require_lobby("set_target_gate")?;
        match selection {
            GateSelection::Single(gate) => self.state.target_gate = gate,
            GateSelection::Sequence(gates) => {
                if gates.is_empty() {
                    return Err(ArenaError::ValidationError {
                        info: "gate sequence must not be empty".to_owned(),
                    });
                }
                self.state.target_gates = gates;
            }
        }
        Ok(())
    }

    fn set_logic_mode(&mut self, actor: &PlayerId, mode: LogicMode) -> ArenaResult<()> {
        self.require_operator(actor, "set_logic_mode")?;
        self.require_lobby("set_logic_mode")?;
        self.state.logic_mode = mode;
        Ok(())
    }

    fn set_max_players(&mut self, actor: &PlayerId, count: usize) -> ArenaResult<()> {
        self.require_operator(actor, "set_max_players")?;
        self.require_lobby("set_max_players")?;
        if count == 0 {
            return Err(ArenaError::ValidationError {
                info: "teams must allow at least one player".to_owned(),
            });
        }
        self.state.max_players_per_team = count;
        Ok(())
    }

    fn set_sabotage_lockout(&mut self, actor: &PlayerId, seconds: u32) -> ArenaResult<()> {
        self.require_operator(actor, "set_sabotage_lockout")?;
        self.require_lobby("set_sabotage_lockout")?;
        self.policy.lockout_seconds = seconds;
        self.state.sabotage_lockout_secs = seconds;
        Ok(())
    }

    fn add_team(&mut self, actor: &PlayerId, team: &TeamId, name: String) -> ArenaResult<()> {
        self.require_operator(actor, "add_team")?;
        self.require_lobby("add_team")?;
        if self.state.teams.contains_key(team) {
            return Err(ArenaError::DuplicateTeam { team: team.clone() });
        }
        self.state
            .teams
            .insert(team.clone(), empty_team(team.clone(), name));
        Ok(())
    }

    // #####################
    // # ANYTIME COMMANDS  #
    // #####################

    fn reset_scores(&mut self, actor: &PlayerId) -> ArenaResult<()> {
        self.require_operator(actor, "reset_scores")?;
        for team in self.state.teams.values_mut() {
            team.score = 0;
            team.round_stats = RoundStats::default();
            team.last_round_result = None;
        }
        debug!("scores reset");
        Ok(())
    }

    fn toggle_chat(&mut self, actor: &PlayerId, team: &TeamId) -> ArenaResult<()> {
        self.require_operator(actor, "toggle_chat")?;
        let team = self.team_mut(team)?;
        team.chat_enabled = !team.chat_enabled;
        Ok(())
    }

    fn join(
        &mut self,
        actor: &PlayerId,
        name: String,
        avatar: String,
        role: Role,
        team: Option<TeamId>,
    ) -> ArenaResult<()> {
        if self.state.operator.as_ref() == Some(actor) || self.state.find_player(actor).is_some() {
            return Err(ArenaError::DuplicatePlayer {
                player: actor.clone(),
            });
        }
        match role {
            Role::Operator => {
                if self.state.operator.is_some() {
                    return Err(ArenaError::OperatorSeatTaken);
                }
                self.state.operator = Some(actor.clone());
                debug!(operator = %actor, "operator seated");
                Ok(())
            }
            Role::Player => {
                let team_id = team.ok_or_else(|| ArenaError::ValidationError {
                    info: "players must name a team to join".to_owned(),
                })?;
                let capacity = self.state.max_players_per_team;
                let team = self
                    .state
                    .teams
                    .entry(team_id.clone())
                    .or_insert_with(|| empty_team(team_id.clone(), format!("Team {team_id}")));
                if team.players.len() >= capacity {
                    return Err(ArenaError::TeamFull {
                        team: team_id,
                        capacity,
                    });
                }
                team.players.insert(
                    actor.clone(),
                    PlayerSnapshot {
                        name,
                        avatar,
                        card_value: Bit::ZERO,
                        vote_value: None,
                        has_not_gate: false,
                    },
                );
                debug!(player = %actor, team = %team_id, "player joined");
                Ok(())
            }
        }
    }

    // ##############
    // # RESOLUTION #
    // ##############

    /// Ends the round early once every team has reached a resolution.
    fn finish_if_all_resolved(&mut self) {
        if self.state.phase == SessionPhase::Playing
            && !self.state.teams.is_empty()
            && self
                .state
                .teams
                .values()
                .all(|team| team.solved_current_round)
        {
            debug!("all teams resolved before timeout");
            self.finish_round();
        }
    }

    /// Resolves every team, applies deferred scoring and freezes the round
    /// for display.
    fn finish_round(&mut self) {
        for team in self.state.teams.values_mut() {
            let outcome = if team.solved_current_round {
                RoundOutcome::Success
            } else {
                RoundOutcome::Failure
            };
            // round_stats.penalty may already hold accrued override
            // penalties from this round.
            match outcome {
                RoundOutcome::Success => {
                    team.round_stats.base = BASE_SUCCESS_POINTS;
                    team.round_stats.bonus = team.current_gate.points() - 1;
                    if team.was_sabotaged {
                        team.round_stats.penalty += SABOTAGE_RECOVERY_PENALTY;
                    }
                }
                RoundOutcome::Failure => {
                    team.round_stats.penalty += FAILURE_PENALTY;
                }
            }
            team.score += team.round_stats.delta();
            team.last_round_result = Some(outcome);
            debug!(
                team = %team.id, ?outcome, delta = team.round_stats.delta(),
                score = team.score, "round resolved"
            );
        }
        self.state.phase = SessionPhase::Finished;
        self.countdown.suspend();
    }

    // ###########
    // # HELPERS #
    // ###########

    fn require_playing(&self, command: &'static str) -> ArenaResult<()> {
        if self.state.phase == SessionPhase::Playing {
            Ok(())
        } else {
            Err(ArenaError::IllegalTransition {
                phase: self.state.phase,
                command,
            })
        }
    }

    fn require_lobby(&self, command: &'static str) -> ArenaResult<()> {
        if self.state.phase == SessionPhase::Lobby {
            Ok(())
        } else {
            Err(ArenaError::IllegalTransition {
                phase: self.state.phase,
                command,
            })
        }
    }

    fn require_operator(&self, actor: &PlayerId, command: &'static str) -> ArenaResult<()> {
        if self.state.is_operator(actor) {
            Ok(())
        } else if self.state.find_player(actor).is_some() {
            Err(ArenaError::RoleForbidden {
                role: Role::Player,
                command,
            })
        } else {
            Err(ArenaError::UnknownPlayer {
                player: actor.clone(),
            })
        }
    }

    fn team_of_player(&self, actor: &PlayerId, command: &'static str) -> ArenaResult<TeamId> {
        if self.state.is_operator(actor) {
            return Err(ArenaError::RoleForbidden {
                role: Role::Operator,
                command,
            });
        }
        self.state
            .team_of(actor)
            .map(|team| team.id.clone())
            .ok_or_else(|| ArenaError::UnknownPlayer {
                player: actor.clone(),
            })
    }

    fn team_mut(&mut self, team: &TeamId) -> ArenaResult<&mut TeamSnapshot> {
        self.state
            .teams
            .get_mut(team)
            .ok_or_else(|| ArenaError::UnknownTeam { team: team.clone() })
    }
}

/// Marks a team solved if its complete, unanimous vote matches the gate.
fn check_predict_team(team: &mut TeamSnapshot) {
    let report: ConsensusReport = team.consensus();
    if report.is_complete() && report.all_agree && report.consensus == Some(team.gate_output()) {
        team.solved_current_round = true;
    }
}

pub(crate) fn empty_team(id: TeamId, name: String) -> TeamSnapshot {
    TeamSnapshot {
        id,
        name,
        score: 0,
        current_gate: crate::gate::GateKind::And,
        solved_current_round: false,
        last_round_result: None,
        round_stats: RoundStats::default(),
        chat_enabled: true,
        was_sabotaged: false,
        sabotages_used: 0,
        players: std::collections::BTreeMap::new(),
    }
}

// #########
// # TESTS #
// #########

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{gate::GateKind, SessionBuilder};
    use web_time::Duration;

    const OPERATOR: &str = "op";

    fn op() -> PlayerId {
        PlayerId::new(OPERATOR)
    }

    /// A two-team session with the operator seated and players joined.
    fn session(gate: GateKind) -> HostSession {
        let mut host = SessionBuilder::new()
            .with_session_id("test-arena")
            .with_target_gate(gate)
            .with_rng_seed(7)
            .start_host_session();
        host.handle_command(
            &op(),
            Command::Join {
                name: "Operator".to_owned(),
                avatar: "🎛".to_owned(),
                role: Role::Operator,
                team: None,
            },
        )
        .unwrap();
        for (pid, team) in [("a1", "A"), ("a2", "A"), ("b1", "B"), ("b2", "B")] {
            host.handle_command(
                &PlayerId::new(pid),
                Command::Join {
                    name: pid.to_uppercase(),
                    avatar: "🦁".to_owned(),
                    role: Role::Player,
                    team: Some(TeamId::new(team)),
                },
            )
            .unwrap();
        }
        host
    }

    fn start_round_at(host: &mut HostSession, t0: Instant, duration: u32) {
        host.handle_command_at(
            t0,
            &op(),
            Command::StartRound {
                duration_secs: duration,
            },
        )
        .unwrap();
    }

    /// Forces every card on a team so vote outcomes are predictable.
    fn force_cards(host: &mut HostSession, team: &str, cards: &[(&str, u8)]) {
        let team = host.state.teams.get_mut(&TeamId::new(team)).unwrap();
        for (pid, value) in cards {
            team.players
                .get_mut(&PlayerId::new(*pid))
                .unwrap()
                .card_value = Bit::from_u8(*value).unwrap();
        }
    }

    fn vote(host: &mut HostSession, t0: Instant, pid: &str, value: u8) -> ArenaResult<()> {
        host.handle_command_at(
            t0,
            &PlayerId::new(pid),
            Command::SubmitVote {
                vote: Bit::from_u8(value),
            },
        )
    }

    #[test]
    fn starts_in_lobby_with_round_zero() {
        let host = session(GateKind::And);
        assert_eq!(host.phase(), SessionPhase::Lobby);
        assert_eq!(host.round_number().as_u32(), 0);
    }

    #[test]
    fn only_the_operator_starts_rounds() {
        let mut host = session(GateKind::And);
        let err = host
            .handle_command(&PlayerId::new("a1"), Command::StartRound { duration_secs: 30 })
            .unwrap_err();
        assert!(matches!(err, ArenaError::RoleForbidden { .. }));
    }

    #[test]
    fn start_round_deals_cards_and_clears_round_state() {
        let mut host = session(GateKind::And);
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 30);

        assert_eq!(host.phase(), SessionPhase::Playing);
        assert_eq!(host.round_number().as_u32(), 1);
        let snapshot = host.snapshot_at(t0);
        assert_eq!(snapshot.timer_secs, 30);
        for team in snapshot.teams.values() {
            assert!(!team.solved_current_round);
            assert_eq!(team.last_round_result, None);
            assert_eq!(team.current_gate, GateKind::And);
            for player in team.players.values() {
                assert_eq!(player.vote_value, None);
                assert!(!player.has_not_gate);
            }
        }
    }

    #[test]
    fn restarting_mid_round_is_an_illegal_transition() {
        let mut host = session(GateKind::And);
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 30);
        let err = host
            .handle_command_at(t0, &op(), Command::StartRound { duration_secs: 30 })
            .unwrap_err();
        assert!(matches!(err, ArenaError::IllegalTransition { .. }));
    }

    #[test]
    fn correct_unanimous_prediction_solves_the_team() {
        let mut host = session(GateKind::Xor);
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 30);
        force_cards(&mut host, "A", &[("a1", 1), ("a2", 0)]);

        // XOR(1, 0) = 1; both predict 1.
        vote(&mut host, t0, "a1", 1).unwrap();
        assert!(!host.snapshot_at(t0).teams[&TeamId::new("A")].solved_current_round);
        vote(&mut host, t0, "a2", 1).unwrap();
        assert!(host.snapshot_at(t0).teams[&TeamId::new("A")].solved_current_round);
        // Scoring is deferred until resolution.
        assert_eq!(host.snapshot_at(t0).teams[&TeamId::new("A")].score, 0);
    }

    #[test]
    fn wrong_prediction_does_not_solve() {
        let mut host = session(GateKind::Xor);
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 30);
        force_cards(&mut host, "A", &[("a1", 1), ("a2", 1)]);

        // XOR(1, 1) = 0; predicting 1 is wrong.
        vote(&mut host, t0, "a1", 1).unwrap();
        vote(&mut host, t0, "a2", 1).unwrap();
        assert!(!host.snapshot_at(t0).teams[&TeamId::new("A")].solved_current_round);
    }

    #[test]
    fn timer_expiry_resolves_the_round_with_xor_bonus() {
        let mut host = session(GateKind::Xor);
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 30);
        force_cards(&mut host, "A", &[("a1", 1), ("a2", 0)]);
        vote(&mut host, t0, "a1", 1).unwrap();
        vote(&mut host, t0, "a2", 1).unwrap();

        let after = t0 + Duration::from_secs(31);
        assert!(host.advance_clock_at(after));
        let snapshot = host.snapshot_at(after);
        assert_eq!(snapshot.phase, SessionPhase::Finished);

        let team_a = &snapshot.teams[&TeamId::new("A")];
        assert_eq!(team_a.last_round_result, Some(RoundOutcome::Success));
        // base 1 + bonus 2 for XOR's higher point value.
        assert_eq!(team_a.round_stats.base, 1);
        assert_eq!(team_a.round_stats.bonus, 2);
        assert_eq!(team_a.round_stats.penalty, 0);
        assert_eq!(team_a.score, 3);

        let team_b = &snapshot.teams[&TeamId::new("B")];
        assert_eq!(team_b.last_round_result, Some(RoundOutcome::Failure));
        assert_eq!(team_b.round_stats.penalty, 1);
        assert_eq!(team_b.score, -1);
    }

    #[test]
    fn late_sabotage_is_caught_by_final_evaluation() {
        let mut host = session(GateKind::And);
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 30);
        force_cards(&mut host, "A", &[("a1", 1), ("a2", 0)]);
        // AND(1, 0) = 0 now, so voting 1 is wrong...
        vote(&mut host, t0, "a1", 1).unwrap();
        vote(&mut host, t0, "a2", 1).unwrap();
        assert!(!host.snapshot_at(t0).teams[&TeamId::new("A")].solved_current_round);

        // ...until a2's card is inverted and AND(1, 1) = 1.
        host.state
            .teams
            .get_mut(&TeamId::new("A"))
            .unwrap()
            .players
            .get_mut(&PlayerId::new("a2"))
            .unwrap()
            .has_not_gate = true;

        let after = t0 + Duration::from_secs(31);
        assert!(host.advance_clock_at(after));
        assert_eq!(
            host.snapshot_at(after).teams[&TeamId::new("A")].last_round_result,
            Some(RoundOutcome::Success)
        );
    }

    #[test]
    fn sabotage_toggles_and_charges_the_acting_team() {
        let mut host = session(GateKind::And);
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 30);
        host.state.teams.get_mut(&TeamId::new("A")).unwrap().score = 3;

        let apply = |host: &mut HostSession| {
            host.handle_command_at(
                t0,
                &PlayerId::new("a1"),
                Command::ApplySabotage {
                    target: PlayerId::new("b1"),
                },
            )
        };

        apply(&mut host).unwrap();
        let snapshot = host.snapshot_at(t0);
        assert!(snapshot.teams[&TeamId::new("B")].players[&PlayerId::new("b1")].has_not_gate);
        assert!(snapshot.teams[&TeamId::new("B")].was_sabotaged);
        assert_eq!(snapshot.teams[&TeamId::new("A")].score, 2);
        assert_eq!(snapshot.teams[&TeamId::new("A")].sabotages_used, 1);

        // Sabotage is a toggle: a second application restores the flag and
        // still costs a point.
        apply(&mut host).unwrap();
        let snapshot = host.snapshot_at(t0);
        assert!(!snapshot.teams[&TeamId::new("B")].players[&PlayerId::new("b1")].has_not_gate);
        assert_eq!(snapshot.teams[&TeamId::new("A")].score, 1);
    }

    #[test]
    fn sabotage_denied_without_score() {
        let mut host = session(GateKind::And);
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 30);

        let err = host
            .handle_command_at(
                t0,
                &PlayerId::new("a1"),
                Command::ApplySabotage {
                    target: PlayerId::new("b1"),
                },
            )
            .unwrap_err();
        assert!(matches!(err, ArenaError::PolicyDenied { .. }));
        // No toggle, no cost.
        let snapshot = host.snapshot_at(t0);
        assert!(!snapshot.teams[&TeamId::new("B")].players[&PlayerId::new("b1")].has_not_gate);
        assert_eq!(snapshot.teams[&TeamId::new("A")].score, 0);
    }

    #[test]
    fn sabotage_denied_inside_the_lockout_window() {
        let mut host = session(GateKind::And);
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 30);
        host.state.teams.get_mut(&TeamId::new("A")).unwrap().score = 10;

        let late = t0 + Duration::from_secs(26); // 4s remaining, lockout 5
        let err = host
            .handle_command_at(
                late,
                &PlayerId::new("a1"),
                Command::ApplySabotage {
                    target: PlayerId::new("b1"),
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ArenaError::PolicyDenied {
                denial: crate::sabotage::SabotageDenial::LockoutActive { .. }
            }
        ));
    }

    #[test]
    fn own_team_toggle_requires_open_mode() {
        let mut host = session(GateKind::And);
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 30);
        host.state.teams.get_mut(&TeamId::new("A")).unwrap().score = 10;

        let err = host
            .handle_command_at(
                t0,
                &PlayerId::new("a1"),
                Command::ApplySabotage {
                    target: PlayerId::new("a2"),
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ArenaError::PolicyDenied {
                denial: crate::sabotage::SabotageDenial::OwnTeamOutsideOpenMode
            }
        ));
    }

    #[test]
    fn open_mode_override_succeeds_and_finishes_the_round() {
        let mut host = session(GateKind::Or);
        host.state.logic_mode = LogicMode::Open;
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 30);
        force_cards(&mut host, "A", &[("a1", 1), ("a2", 0)]);

        vote(&mut host, t0, "a1", 1).unwrap();
        vote(&mut host, t0, "a2", 1).unwrap();
        host.handle_command_at(t0, &PlayerId::new("a1"), Command::AttemptOverride)
            .unwrap();

        let snapshot = host.snapshot_at(t0);
        assert_eq!(snapshot.phase, SessionPhase::Finished);
        assert_eq!(
            snapshot.teams[&TeamId::new("A")].last_round_result,
            Some(RoundOutcome::Success)
        );
    }

    #[test]
    fn failed_override_accrues_a_deferred_penalty() {
        let mut host = session(GateKind::And);
        host.state.logic_mode = LogicMode::Open;
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 30);
        force_cards(&mut host, "A", &[("a1", 1), ("a2", 0)]);

        vote(&mut host, t0, "a1", 1).unwrap();
        vote(&mut host, t0, "a2", 1).unwrap();
        // AND(1, 0) = 0: the override is rejected.
        let err = host
            .handle_command_at(t0, &PlayerId::new("a1"), Command::AttemptOverride)
            .unwrap_err();
        assert!(matches!(err, ArenaError::ValidationError { .. }));
        // Score moves only at resolution.
        assert_eq!(host.snapshot_at(t0).teams[&TeamId::new("A")].score, 0);

        let after = t0 + Duration::from_secs(31);
        assert!(host.advance_clock_at(after));
        let team_a = &host.snapshot_at(after).teams[&TeamId::new("A")];
        // Failure penalty plus the failed override.
        assert_eq!(team_a.round_stats.penalty, 2);
        assert_eq!(team_a.score, -2);
    }

    #[test]
    fn override_requires_full_confirmation() {
        let mut host = session(GateKind::Or);
        host.state.logic_mode = LogicMode::Open;
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 30);
        force_cards(&mut host, "A", &[("a1", 1), ("a2", 0)]);

        vote(&mut host, t0, "a1", 1).unwrap();
        let err = host
            .handle_command_at(t0, &PlayerId::new("a1"), Command::AttemptOverride)
            .unwrap_err();
        assert!(matches!(err, ArenaError::ValidationError { .. }));
        assert_eq!(host.phase(), SessionPhase::Playing);
    }

    #[test]
    fn sabotaged_but_successful_team_pays_the_recovery_penalty() {
        let mut host = session(GateKind::Xor);
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 30);
        host.state.teams.get_mut(&TeamId::new("B")).unwrap().score = 5;
        force_cards(&mut host, "A", &[("a1", 1), ("a2", 1)]);

        // B inverts a2: effective inputs become (1, 0), XOR = 1.
        host.handle_command_at(
            t0,
            &PlayerId::new("b1"),
            Command::ApplySabotage {
                target: PlayerId::new("a2"),
            },
        )
        .unwrap();

        vote(&mut host, t0, "a1", 1).unwrap();
        vote(&mut host, t0, "a2", 1).unwrap();
        let after = t0 + Duration::from_secs(31);
        assert!(host.advance_clock_at(after));

        let team_a = &host.snapshot_at(after).teams[&TeamId::new("A")];
        assert_eq!(team_a.last_round_result, Some(RoundOutcome::Success));
        assert_eq!(team_a.round_stats.base, 1);
        assert_eq!(team_a.round_stats.bonus, 2);
        assert_eq!(team_a.round_stats.penalty, 1);
        assert_eq!(team_a.score, 2);
    }

    #[test]
    fn votes_are_last_write_wins_and_retractable() {
        let mut host = session(GateKind::And);
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 30);

        vote(&mut host, t0, "a1", 0).unwrap();
        vote(&mut host, t0, "a1", 1).unwrap();
        host.handle_command_at(t0, &PlayerId::new("a1"), Command::SubmitVote { vote: None })
            .unwrap();
        let snapshot = host.snapshot_at(t0);
        assert_eq!(
            snapshot.teams[&TeamId::new("A")].players[&PlayerId::new("a1")].vote_value,
            None
        );
    }

    #[test]
    fn operators_never_vote() {
        let mut host = session(GateKind::And);
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 30);
        let err = host
            .handle_command_at(
                t0,
                &op(),
                Command::SubmitVote {
                    vote: Some(Bit::ONE),
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ArenaError::RoleForbidden {
                role: Role::Operator,
                ..
            }
        ));
    }

    #[test]
    fn lobby_only_commands_are_rejected_mid_round() {
        let mut host = session(GateKind::And);
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 30);

        for command in [
            Command::KickPlayer {
                target: PlayerId::new("a1"),
            },
            Command::SetGameMode {
                mode: GameMode::Campaign,
            },
            Command::SetLogicMode {
                mode: LogicMode::Open,
            },
            Command::SetTargetGate {
                selection: GateSelection::Single(GateKind::Nor),
            },
            Command::SetMaxPlayers { count: 4 },
            Command::SetSabotageLockout { seconds: 10 },
        ] {
            let err = host.handle_command_at(t0, &op(), command).unwrap_err();
            assert!(matches!(err, ArenaError::IllegalTransition { .. }));
        }
    }

    #[test]
    fn finished_is_a_display_pause_not_a_blocking_state() {
        let mut host = session(GateKind::And);
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 10);
        assert!(host.advance_clock_at(t0 + Duration::from_secs(11)));
        assert_eq!(host.phase(), SessionPhase::Finished);

        // The next start begins round 2 directly.
        start_round_at(&mut host, t0 + Duration::from_secs(20), 10);
        assert_eq!(host.phase(), SessionPhase::Playing);
        assert_eq!(host.round_number().as_u32(), 2);
    }

    #[test]
    fn asymmetric_mode_rotates_gates_per_team_and_round() {
        let mut host = session(GateKind::And);
        host.state.game_mode = GameMode::Asymmetric;
        let t0 = Instant::now();

        start_round_at(&mut host, t0, 10);
        let snapshot = host.snapshot_at(t0);
        // Round 1: team index 0 -> rotation[1], index 1 -> rotation[2].
        assert_eq!(snapshot.teams[&TeamId::new("A")].current_gate, GATE_ROTATION[1]);
        assert_eq!(snapshot.teams[&TeamId::new("B")].current_gate, GATE_ROTATION[2]);

        assert!(host.advance_clock_at(t0 + Duration::from_secs(11)));
        start_round_at(&mut host, t0 + Duration::from_secs(12), 10);
        let snapshot = host.snapshot_at(t0 + Duration::from_secs(12));
        assert_eq!(snapshot.teams[&TeamId::new("A")].current_gate, GATE_ROTATION[2]);
        assert_eq!(snapshot.teams[&TeamId::new("B")].current_gate, GATE_ROTATION[3]);
    }

    #[test]
    fn campaign_mode_advances_the_shared_sequence() {
        let mut host = session(GateKind::And);
        host.state.game_mode = GameMode::Campaign;
        host.state.target_gates = vec![GateKind::Or, GateKind::Xor];
        let t0 = Instant::now();

        start_round_at(&mut host, t0, 10);
        assert!(host
            .snapshot_at(t0)
            .teams
            .values()
            .all(|team| team.current_gate == GateKind::Or));

        assert!(host.advance_clock_at(t0 + Duration::from_secs(11)));
        start_round_at(&mut host, t0 + Duration::from_secs(12), 10);
        assert!(host
            .snapshot_at(t0)
            .teams
            .values()
            .all(|team| team.current_gate == GateKind::Xor));

        assert!(host.advance_clock_at(t0 + Duration::from_secs(23)));
        start_round_at(&mut host, t0 + Duration::from_secs(24), 10);
        // Wraps back to the start of the sequence.
        assert!(host
            .snapshot_at(t0)
            .teams
            .values()
            .all(|team| team.current_gate == GateKind::Or));
    }

    #[test]
    fn early_finish_when_every_team_resolves() {
        let mut host = session(GateKind::Or);
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 30);
        force_cards(&mut host, "A", &[("a1", 1), ("a2", 0)]);
        force_cards(&mut host, "B", &[("b1", 0), ("b2", 0)]);

        vote(&mut host, t0, "a1", 1).unwrap();
        vote(&mut host, t0, "a2", 1).unwrap();
        assert_eq!(host.phase(), SessionPhase::Playing);
        vote(&mut host, t0, "b1", 0).unwrap();
        vote(&mut host, t0, "b2", 0).unwrap();
        assert_eq!(host.phase(), SessionPhase::Finished);
        // Both teams resolved successfully before the timer.
        let snapshot = host.snapshot_at(t0);
        assert!(snapshot
            .teams
            .values()
            .all(|team| team.last_round_result == Some(RoundOutcome::Success)));
    }

    #[test]
    fn reset_scores_clears_scores_and_stats() {
        let mut host = session(GateKind::And);
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 10);
        assert!(host.advance_clock_at(t0 + Duration::from_secs(11)));

        host.handle_command(&op(), Command::ResetScores).unwrap();
        let snapshot = host.snapshot();
        for team in snapshot.teams.values() {
            assert_eq!(team.score, 0);
            assert_eq!(team.round_stats, RoundStats::default());
            assert_eq!(team.last_round_result, None);
        }
    }

    #[test]
    fn join_rejects_full_teams_and_duplicate_operators() {
        let mut host = session(GateKind::And);
        host.handle_command(
            &PlayerId::new("a3"),
            Command::Join {
                name: "A3".to_owned(),
                avatar: "🐯".to_owned(),
                role: Role::Player,
                team: Some(TeamId::new("A")),
            },
        )
        .unwrap();
        let err = host
            .handle_command(
                &PlayerId::new("a4"),
                Command::Join {
                    name: "A4".to_owned(),
                    avatar: "🐻".to_owned(),
                    role: Role::Player,
                    team: Some(TeamId::new("A")),
                },
            )
            .unwrap_err();
        assert!(matches!(err, ArenaError::TeamFull { .. }));

        let err = host
            .handle_command(
                &PlayerId::new("op2"),
                Command::Join {
                    name: "Second".to_owned(),
                    avatar: "🎛".to_owned(),
                    role: Role::Operator,
                    team: None,
                },
            )
            .unwrap_err();
        assert_eq!(err, ArenaError::OperatorSeatTaken);
    }

    #[test]
    fn card_dealing_is_deterministic_per_seed() {
        let deal = |seed: u64| {
            let mut host = SessionBuilder::new()
                .with_rng_seed(seed)
                .start_host_session();
            host.handle_command(
                &op(),
                Command::Join {
                    name: "Op".to_owned(),
                    avatar: "🎛".to_owned(),
                    role: Role::Operator,
                    team: None,
                },
            )
            .unwrap();
            for pid in ["p1", "p2", "p3"] {
                host.handle_command(
                    &PlayerId::new(pid),
                    Command::Join {
                        name: pid.to_owned(),
                        avatar: "🦄".to_owned(),
                        role: Role::Player,
                        team: Some(TeamId::new("A")),
                    },
                )
                .unwrap();
            }
            let t0 = Instant::now();
            start_round_at(&mut host, t0, 10);
            host.snapshot_at(t0).teams[&TeamId::new("A")]
                .players
                .values()
                .map(|player| player.card_value)
                .collect::<Vec<_>>()
        };
        assert_eq!(deal(42), deal(42));
    }

    #[test]
    fn snapshot_timer_tracks_the_deadline() {
        let mut host = session(GateKind::And);
        let t0 = Instant::now();
        start_round_at(&mut host, t0, 30);
        assert_eq!(host.snapshot_at(t0).timer_secs, 30);
        assert_eq!(
            host.snapshot_at(t0 + Duration::from_secs(10)).timer_secs,
            20
        );
        assert!(host.advance_clock_at(t0 + Duration::from_secs(31)));
        assert_eq!(
            host.snapshot_at(t0 + Duration::from_secs(31)).timer_secs,
            0
        );
    }

    #[test]
    fn remove_participant_frees_the_operator_seat() {
        let mut host = session(GateKind::And);
        host.remove_participant(&op());
        host.handle_command(
            &PlayerId::new("op2"),
            Command::Join {
                name: "Next".to_owned(),
                avatar: "🎛".to_owned(),
                role: Role::Operator,
                team: None,
            },
        )
        .unwrap();
    }
}
