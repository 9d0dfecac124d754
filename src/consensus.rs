//! Per-team voting completeness and agreement, derived from a snapshot.

use crate::Bit;

/// What a team's votes currently add up to.
///
/// Derived facts only; assessing a team never mutates anything. The same
/// votes always produce the same report.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ConsensusReport {
    /// Count of players that have cast a vote.
    pub votes_collected: usize,
    /// Total players on the team.
    pub total_players: usize,
    /// True iff at least one vote was collected and all collected votes are
    /// equal. Meaningful before completeness.
    pub all_agree: bool,
    /// The common vote, present only when the vote is complete AND unanimous.
    pub consensus: Option<Bit>,
    /// True iff two or more votes were collected and they disagree. Drives
    /// the "voting mismatch" warning state before completeness.
    pub mismatch: bool,
}

impl ConsensusReport {
    /// Assesses an ordered sequence of vote slots (`None` = not yet voted).
    #[must_use]
    pub fn assess<I>(votes: I) -> Self
    where
        I: IntoIterator<Item = Option<Bit>>,
    {
        let mut total_players = 0usize;
        let mut collected: Vec<Bit> = Vec::new();
        for slot in votes {
            total_players += 1;
            if let Some(vote) = slot {
                collected.push(vote);
            }
        }

        let votes_collected = collected.len();
        let all_agree =
            votes_collected > 0 && collected.iter().all(|vote| *vote == collected[0]);
        let complete = votes_collected == total_players && total_players > 0;
        let consensus = if complete && all_agree {
            Some(collected[0])
        } else {
            None
        };
        let mismatch = votes_collected > 1 && !all_agree;

        Self {
            votes_collected,
            total_players,
            all_agree,
            consensus,
            mismatch,
        }
    }

    /// True iff every player on the team has voted.
    #[inline]
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.votes_collected == self.total_players && self.total_players > 0
    }
}

// #########
// # TESTS #
// #########
