//! The client-side observing core.
//!
//! An [`ObserverSession`] ingests full-state snapshots from the transport
//! and is the only thing a rendering layer needs to talk to: it recomputes
//! derived facts (gate output, consensus, countdown), detects one-shot
//! narration events, selects the render target from the local role, and
//! validates outgoing intents before they become fire-and-forget
//! [`Command`]s.
//!
//! The observer runs in a single-threaded event loop: each snapshot is
//! processed to completion before the next, and the periodic countdown tick
//! only ever reads the deadline anchored here. The countdown is suspended
//! before a new round's deadline is re-anchored, so a tick never races a
//! re-anchor. The observer never mutates session state — all state change
//! goes through commands to the authoritative source and comes back as a
//! snapshot.

use std::collections::VecDeque;

use tracing::{trace, warn};
use web_time::Instant;

use crate::{
    commands::Command,
    consensus::ConsensusReport,
    countdown::Countdown,
    error::{ArenaError, ArenaResult},
    events::SnapshotEventDetector,
    sabotage::SabotagePolicy,
    sessions::event_drain::EventDrain,
    snapshot::SessionSnapshot,
    Bit, LogicMode, PlayerId, Role, RoundNumber, RoundOutcome, SessionPhase, TeamId,
};

/// Whether the observer currently trusts its view of the session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EngineHealth {
    /// Snapshots are parsing and validating; derived facts are meaningful.
    #[default]
    Healthy,
    /// The last inbound payload failed structural validation. The client
    /// should show an "engine unavailable" state instead of deriving
    /// conclusions from a guess.
    Unavailable {
        /// What went wrong with the payload.
        context: String,
    },
}

impl EngineHealth {
    /// True iff derived facts can be trusted.
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, EngineHealth::Healthy)
    }
}

/// Which dashboard the rendering layer should present, derived from the
/// local role and roster — a tagged union, not a duck-typed field check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderTarget {
    /// The operator's control dashboard.
    OperatorDashboard,
    /// The in-team player arena.
    PlayerArena {
        /// The local player's team.
        team: TeamId,
    },
    /// A participant with no team yet (or no snapshot yet).
    Spectate,
}

/// The derived facts a rendering layer needs for one team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamFacts {
    /// The gate's current output over the team's effective inputs.
    pub gate_output: Bit,
    /// Voting completeness and agreement.
    pub consensus: ConsensusReport,
    /// True once the team met the round objective.
    pub solved: bool,
    /// The team's last resolution, if the round is over.
    pub outcome: Option<RoundOutcome>,
    /// Authoritative seconds remaining in the round.
    pub remaining_secs: u32,
    /// Whether this team could legally buy a sabotage right now.
    pub sabotage_available: bool,
}

/// A client-side observer of one session.
///
/// Built via [`SessionBuilder`](crate::SessionBuilder). Feed it snapshots
/// with [`ingest_json`](Self::ingest_json) or
/// [`ingest_snapshot`](Self::ingest_snapshot), then drain
/// [`events`](Self::events) and query derived facts.
#[derive(Debug)]
pub struct ObserverSession {
    local_id: PlayerId,
    role: Role,
    latest: Option<SessionSnapshot>,
    watermark: Option<(RoundNumber, SessionPhase)>,
    countdown: Countdown,
    detector: SnapshotEventDetector,
    events: VecDeque<crate::events::ArenaEvent>,
    event_queue_capacity: usize,
    subscribers: Vec<crate::events::EventFeed>,
    policy: SabotagePolicy,
    health: EngineHealth,
}

impl ObserverSession {
    pub(crate) fn new(
        local_id: PlayerId,
        role: Role,
        policy: SabotagePolicy,
        event_queue_capacity: usize,
    ) -> Self {
        Self {
            local_id,
            role,
            latest: None,
            watermark: None,
            countdown: Countdown::new(),
            detector: SnapshotEventDetector::new(),
            events: VecDeque::new(),
            event_queue_capacity,
            subscribers: Vec::new(),
            policy,
            health: EngineHealth::Healthy,
        }
    }

    /// Creates a new event feed that will receive every subsequently
    /// detected edge, independent of the [`events`](Self::events) drain.
    ///
    /// This is the subscription surface for collaborators outside the core
    /// loop (narration, accessibility, sound effects): each subscriber
    /// polls its own feed and sees each event exactly once.
    pub fn subscribe(&mut self) -> crate::events::EventFeed {
        let feed = crate::events::EventFeed::new(self.event_queue_capacity);
        self.subscribers.push(feed.clone());
        feed
    }

    /// The local participant's id.
    #[must_use]
    pub fn local_id(&self) -> &PlayerId {
        &self.local_id
    }

    /// The local participant's role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether the observer trusts its current view.
    #[must_use]
    pub fn health(&self) -> &EngineHealth {
        &self.health
    }

    /// The most recent accepted snapshot, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&SessionSnapshot> {
        self.latest.as_ref()
    }

    /// Parses and ingests a JSON snapshot payload.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::MalformedSnapshot`] and flips
    /// [`health`](Self::health) to unavailable if the payload fails
    /// structural validation. The previous accepted snapshot is kept.
    pub fn ingest_json(&mut self, payload: &str) -> ArenaResult<()> {
        match SessionSnapshot::from_json(payload) {
            Ok(snapshot) => self.ingest_snapshot(snapshot),
            Err(err) => {
                warn!(error = %err, "rejecting inbound snapshot");
                self.health = EngineHealth::Unavailable {
                    context: err.to_string(),
                };
                Err(err)
            }
        }
    }

    /// Ingests an already-parsed snapshot as of now.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::MalformedSnapshot`] if the snapshot fails
    /// [`SessionSnapshot::validate`].
    pub fn ingest_snapshot(&mut self, snapshot: SessionSnapshot) -> ArenaResult<()> {
        self.ingest_snapshot_at(Instant::now(), snapshot)
    }

    /// Deterministic ingestion entry point, used by tests and replays.
    ///
    /// Stale snapshots (older than the accepted `(round, phase)` watermark)
    /// are dropped without effect; duplicates of the current snapshot are
    /// passed through to the edge detector, which fires each edge at most
    /// once.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::MalformedSnapshot`] if the snapshot fails
    /// structural validation.
    pub fn ingest_snapshot_at(
        &mut self,
        now: Instant,
        snapshot: SessionSnapshot,
    ) -> ArenaResult<()> {
        if let Err(err) = snapshot.validate() {
            warn!(error = %err, "rejecting inbound snapshot");
            self.health = EngineHealth::Unavailable {
                context: err.to_string(),
            };
            return Err(err);
        }

        let key = snapshot.ordering_key();
        if let Some(watermark) = self.watermark {
            if key < watermark {
                trace!(?key, ?watermark, "dropping stale snapshot");
                return Ok(());
            }
        }

        // Re-anchor the countdown only on a transition into PLAYING (a new
        // round counts even if the FINISHED snapshot in between was lost).
        // Repeated snapshots of the same round must not stretch the clock.
        if snapshot.phase == SessionPhase::Playing {
            let entering_playing = match &self.latest {
                None => true,
                Some(previous) => {
                    previous.phase != SessionPhase::Playing
                        || previous.round_number != snapshot.round_number
                }
            };
            if entering_playing {
                self.countdown.suspend();
                self.countdown.anchor_at(now, snapshot.timer_secs);
            }
        } else {
            self.countdown.suspend();
        }

        // The lockout window is session configuration; track it live.
        self.policy.lockout_seconds = snapshot.sabotage_lockout_secs;

        for event in self.detector.observe(&snapshot) {
            for feed in &self.subscribers {
                feed.push(event.clone());
            }
            if self.events.len() >= self.event_queue_capacity {
                warn!("event queue full, dropping oldest event");
                self.events.pop_front();
            }
            self.events.push_back(event);
        }

        self.watermark = Some(key);
        self.latest = Some(snapshot);
        self.health = EngineHealth::Healthy;
        Ok(())
    }

    /// Drains the pending one-shot edge events.
    ///
    /// The narration/accessibility collaborator polls this after each
    /// ingested snapshot; every event is delivered exactly once.
    pub fn events(&mut self) -> EventDrain<'_> {
        if self.events.is_empty() {
            EventDrain::empty()
        } else {
            EventDrain::from_drain(self.events.drain(..))
        }
    }

    /// Authoritative seconds remaining in the round, as of now.
    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs_at(Instant::now())
    }

    /// Authoritative seconds remaining, as of the given instant.
    #[must_use]
    pub fn remaining_secs_at(&self, now: Instant) -> u32 {
        self.countdown.remaining_at(now)
    }

    /// Selects the dashboard variant for the rendering layer.
    #[must_use]
    pub fn render_target(&self) -> RenderTarget {
        if self.role == Role::Operator {
            return RenderTarget::OperatorDashboard;
        }
        match self
            .latest
            .as_ref()
            .and_then(|snapshot| snapshot.team_of(&self.local_id))
        {
            Some(team) => RenderTarget::PlayerArena {
                team: team.id.clone(),
            },
            None => RenderTarget::Spectate,
        }
    }

    /// Derived facts for one team, as of now.
    #[must_use]
    pub fn facts_for(&self, team: &TeamId) -> Option<TeamFacts> {
        self.facts_for_at(Instant::now(), team)
    }

    /// Derived facts for one team, as of the given instant.
    #[must_use]
    pub fn facts_for_at(&self, now: Instant, team: &TeamId) -> Option<TeamFacts> {
        let snapshot = self.latest.as_ref()?;
        let team = snapshot.teams.get(team)?;
        let remaining_secs = self.remaining_secs_at(now);
        Some(TeamFacts {
            gate_output: team.gate_output(),
            consensus: team.consensus(),
            solved: team.solved_current_round,
            outcome: team.last_round_result,
            remaining_secs,
            sabotage_available: snapshot.phase == SessionPhase::Playing
                && self.policy.permits(team.score, remaining_secs),
        })
    }

    /// Derived facts for the local player's own team.
    #[must_use]
    pub fn my_team_facts(&self) -> Option<TeamFacts> {
        let team_id = self
            .latest
            .as_ref()?
            .team_of(&self.local_id)
            .map(|team| team.id.clone())?;
        self.facts_for(&team_id)
    }

    // ####################
    // # OUTGOING INTENTS #
    // ####################

    /// Validates and builds a vote command for the local player.
    ///
    /// # Errors
    ///
    /// Rejects votes from the operator and votes outside `PLAYING`.
    pub fn vote(&self, vote: Option<Bit>) -> ArenaResult<Command> {
        if self.role == Role::Operator {
            return Err(ArenaError::RoleForbidden {
                role: Role::Operator,
                command: "submit_vote",
            });
        }
        self.require_phase(SessionPhase::Playing, "submit_vote")?;
        Ok(Command::SubmitVote { vote })
    }

    /// Validates and builds a sabotage command against the target player.
    ///
    /// Rechecks the policy locally against the authoritative countdown so
    /// obviously-doomed attempts never reach the wire; the authoritative
    /// source remains the final arbiter.
    ///
    /// # Errors
    ///
    /// Rejects attempts outside `PLAYING`, against unknown players, and
    /// attempts the [`SabotagePolicy`] refuses.
    pub fn sabotage(&self, target: &PlayerId) -> ArenaResult<Command> {
        self.sabotage_at(Instant::now(), target)
    }

    /// [`sabotage`](Self::sabotage) with an explicit clock, for tests.
    ///
    /// # Errors
    ///
    /// See [`sabotage`](Self::sabotage).
    pub fn sabotage_at(&self, now: Instant, target: &PlayerId) -> ArenaResult<Command> {
        self.require_phase(SessionPhase::Playing, "apply_sabotage")?;
        let snapshot = self.snapshot_required()?;
        let target_team = snapshot
            .team_of(target)
            .ok_or_else(|| ArenaError::UnknownPlayer {
                player: target.clone(),
            })?;

        if self.role != Role::Operator {
            let my_team = snapshot.team_of(&self.local_id).ok_or_else(|| {
                ArenaError::UnknownPlayer {
                    player: self.local_id.clone(),
                }
            })?;
            if my_team.id == target_team.id {
                if snapshot.logic_mode != LogicMode::Open {
                    return Err(ArenaError::PolicyDenied {
                        denial: crate::sabotage::SabotageDenial::OwnTeamOutsideOpenMode,
                    });
                }
            } else {
                self.policy
                    .evaluate(my_team.score, self.remaining_secs_at(now))
                    .map_err(|denial| ArenaError::PolicyDenied { denial })?;
            }
        }

        Ok(Command::ApplySabotage {
            target: target.clone(),
        })
    }

    /// Validates and builds an open-mode override attempt.
    ///
    /// # Errors
    ///
    /// Rejects attempts outside `PLAYING`, outside open mode, and before
    /// the whole team has confirmed with `1`.
    pub fn attempt_override(&self) -> ArenaResult<Command> {
        self.require_phase(SessionPhase::Playing, "attempt_override")?;
        let snapshot = self.snapshot_required()?;
        if snapshot.logic_mode != LogicMode::Open {
            return Err(ArenaError::ValidationError {
                info: "attempt_override is only available in open mode".to_owned(),
            });
        }
        let my_team = snapshot
            .team_of(&self.local_id)
            .ok_or_else(|| ArenaError::UnknownPlayer {
                player: self.local_id.clone(),
            })?;
        if my_team.consensus().consensus != Some(Bit::ONE) {
            return Err(ArenaError::ValidationError {
                info: "override requires every teammate to have confirmed with 1".to_owned(),
            });
        }
        Ok(Command::AttemptOverride)
    }

    /// Validates and builds a start-round command (operator only).
    ///
    /// # Errors
    ///
    /// Rejects non-operators and starts while a round is already running.
    pub fn start_round(&self, duration_secs: u32) -> ArenaResult<Command> {
        if self.role != Role::Operator {
            return Err(ArenaError::RoleForbidden {
                role: self.role,
                command: "start_round",
            });
        }
        if self.phase() == Some(SessionPhase::Playing) {
            return Err(ArenaError::IllegalTransition {
                phase: SessionPhase::Playing,
                command: "start_round",
            });
        }
        Ok(Command::StartRound { duration_secs })
    }

    // ###########
    // # HELPERS #
    // ###########

    fn phase(&self) -> Option<SessionPhase> {
        self.latest.as_ref().map(|snapshot| snapshot.phase)
    }

    fn require_phase(&self, phase: SessionPhase, command: &'static str) -> ArenaResult<()> {
        match self.phase() {
            Some(current) if current == phase => Ok(()),
            Some(current) => Err(ArenaError::IllegalTransition {
                phase: current,
                command,
            }),
            None => Err(ArenaError::MalformedSnapshot {
                context: "no snapshot received yet".to_owned(),
            }),
        }
    }

    fn snapshot_required(&self) -> ArenaResult<&SessionSnapshot> {
        self.latest.as_ref().ok_or(ArenaError::MalformedSnapshot {
            context: "no snapshot received yet".to_owned(),
        })
    }
}

// #########
// # TESTS #
// #########
