//! One-shot edge events derived by diffing successive snapshots.
//!
//! The transport delivers full-state snapshots, not deltas, and may deliver
//! the same snapshot more than once. Narration-worthy moments ("the round
//! started", "someone was sabotaged", "the round ended") are therefore
//! *edges* between the previously observed state and the new one, computed
//! by a small explicit value object rather than mutable flags scattered
//! through rendering code.
//!
//! [`SnapshotEventDetector::observe`] is pure given (previous memory, new
//! snapshot): identical input sequences produce identical event sequences,
//! and feeding the same snapshot twice fires each edge at most once.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{snapshot::SessionSnapshot, PlayerId, RoundNumber, SessionPhase, TeamId};

/// A narration-worthy edge detected between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArenaEvent {
    /// A new round has begun. Fires exactly once per round number.
    RoundStarted {
        /// The round that just started.
        round: RoundNumber,
    },
    /// A player's NOT flag transitioned from clear to set.
    ///
    /// Fires only on the `false → true` edge: a repeated snapshot of an
    /// already-inverted player is silent, as is the reset to `false` at
    /// round start.
    SabotageLanded {
        /// The team whose player was inverted.
        team: TeamId,
        /// The inverted player.
        player: PlayerId,
    },
    /// The current round has been resolved. Fires exactly once per round,
    /// and only for a round whose start was observed.
    RoundEnded {
        /// The round that just ended.
        round: RoundNumber,
    },
}

/// Which round the detector has narrated, and how far.
///
/// This is the explicit rendition of the two integer sentinels the edge
/// logic needs: "nothing narrated yet" and "this round's end was already
/// reported, do not re-fire".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
enum NarrationMark {
    /// No round start has been observed yet.
    #[default]
    NoneYet,
    /// This round's start was reported; its end has not been.
    Started(RoundNumber),
    /// The last started round's end was reported too.
    Consumed,
}

/// Detects one-shot edges across a stream of snapshots.
///
/// Carry one detector per observing client, alongside whatever consumes
/// the events (narration, accessibility, sound effects). All memory is
/// client-local; the detector never mutates session state.
///
/// # Examples
///
/// ```
/// use logic_arena::SnapshotEventDetector;
///
/// let mut detector = SnapshotEventDetector::new();
/// # let snapshot = logic_arena::SessionSnapshot {
/// #     id: "s".into(),
/// #     phase: logic_arena::SessionPhase::Playing,
/// #     round_number: logic_arena::RoundNumber::new(3),
/// #     timer_secs: 30,
/// #     logic_mode: Default::default(),
/// #     game_mode: Default::default(),
/// #     target_gate: logic_arena::GateKind::And,
/// #     target_gates: vec![],
/// #     sabotage_lockout_secs: 5,
/// #     max_players_per_team: 3,
/// #     operator: None,
/// #     teams: Default::default(),
/// # };
/// let first = detector.observe(&snapshot);
/// let replay = detector.observe(&snapshot);
/// assert_eq!(first.len(), 1); // RoundStarted
/// assert!(replay.is_empty()); // duplicate delivery is silent
/// ```
#[derive(Debug, Clone, Default)]
pub struct SnapshotEventDetector {
    mark: NarrationMark,
    not_gate_bitmap: BTreeMap<PlayerId, bool>,
}

impl SnapshotEventDetector {
    /// Creates a detector with no memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Diffs the new snapshot against the detector's memory and returns
    /// the edges that fired, updating the memory.
    ///
    /// Events are returned in narration order: round start, then sabotage
    /// edges (in ascending player id order), then round end.
    pub fn observe(&mut self, snapshot: &SessionSnapshot) -> Vec<ArenaEvent> {
        let mut events = Vec::new();

        if snapshot.phase == SessionPhase::Playing
            && self.mark != NarrationMark::Started(snapshot.round_number)
        {
            events.push(ArenaEvent::RoundStarted {
                round: snapshot.round_number,
            });
            self.mark = NarrationMark::Started(snapshot.round_number);
        }

        let mut current = BTreeMap::new();
        for team in snapshot.teams.values() {
            for (player_id, player) in &team.players {
                if player.has_not_gate
                    && !self.not_gate_bitmap.get(player_id).copied().unwrap_or(false)
                {
                    events.push(ArenaEvent::SabotageLanded {
                        team: team.id.clone(),
                        player: player_id.clone(),
                    });
                }
                current.insert(player_id.clone(), player.has_not_gate);
            }
        }
        self.not_gate_bitmap = current;

        if snapshot.phase == SessionPhase::Finished
            && self.mark == NarrationMark::Started(snapshot.round_number)
        {
            events.push(ArenaEvent::RoundEnded {
                round: snapshot.round_number,
            });
            self.mark = NarrationMark::Consumed;
        }

        events
    }
}

/// A cloneable, shared queue of edge events for out-of-core collaborators.
///
/// The narration/accessibility collaborator runs outside the core event
/// loop and polls at its own cadence, so it gets its own feed instead of
/// sharing the rendering layer's drain: every subscriber sees every event
/// exactly once. Clones share the same underlying queue.
///
/// The lock is held only for the duration of a push or drain.
#[derive(Debug, Clone)]
pub struct EventFeed {
    queue: Arc<Mutex<VecDeque<ArenaEvent>>>,
    capacity: usize,
}

impl EventFeed {
    /// Creates a feed retaining at most `capacity` unpolled events; the
    /// oldest are dropped beyond that.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            capacity,
        }
    }

    pub(crate) fn push(&self, event: ArenaEvent) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(event);
    }

    /// Takes every pending event, oldest first.
    #[must_use]
    pub fn drain(&self) -> Vec<ArenaEvent> {
        self.queue.lock().drain(..).collect()
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// True iff no events are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

// #########
// # TESTS #
// #########
