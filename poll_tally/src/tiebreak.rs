//! Resolution of last-place ties.
//!
//! When several choices share the lowest count of a round, a sub-election restricted to
//! the tied choices is simulated over *all* the ballots, including the ballots currently
//! counting for a choice outside the tie. The last place of that sub-election is
//! eliminated from the main election. If the sub-election is itself tied at the bottom,
//! it recurses on the smaller set; only when every tied choice receives the same count is
//! the random source consulted.

use log::debug;
use snafu::prelude::*;

use crate::config::*;
use crate::random::TiebreakSource;
use crate::VoteCount;

/// The choice to eliminate and how it was found.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct Resolution {
    pub eliminated: usize,
    pub outcome: TiebreakOutcome,
}

/// Restricts a ranking to the members of `subset`, keeping their relative order.
pub fn project(rank_order: &[usize], subset: &[usize]) -> Vec<usize> {
    rank_order
        .iter()
        .copied()
        .filter(|c| subset.contains(c))
        .collect()
}

/// Picks the member of `tied` (at least two choices) that leaves the main election.
///
/// `round` is the round of the main election, passed to the random source.
pub fn resolve(
    tied: &[usize],
    ballots: &[Ballot],
    source: &dyn TiebreakSource,
    round: u32,
) -> Result<Resolution, TallyError> {
    resolve_at_depth(tied, ballots, source, round, 1)
}

fn resolve_at_depth(
    tied: &[usize],
    ballots: &[Ballot],
    source: &dyn TiebreakSource,
    round: u32,
    depth: u32,
) -> Result<Resolution, TallyError> {
    debug_assert!(tied.len() >= 2, "not a tie: {:?}", tied);
    let tally = sub_election_tally(tied, ballots);
    debug!(
        "resolve: round {} depth {}: sub-election tally {:?}",
        round, depth, tally
    );

    let min_count = tally
        .iter()
        .map(|(_, vc)| *vc)
        .min()
        .unwrap_or(VoteCount::EMPTY);
    let lowest: Vec<usize> = tally
        .iter()
        .filter(|(_, vc)| *vc == min_count)
        .map(|(cid, _)| *cid)
        .collect();

    if lowest.len() == 1 {
        return Ok(Resolution {
            eliminated: lowest[0],
            outcome: TiebreakOutcome::SubElection { depth },
        });
    }

    if lowest.len() == tied.len() {
        // The ballots split evenly among the tied choices: nothing more to learn.
        let choice = source.choose(tied, round);
        ensure!(tied.contains(&choice), InvalidTiebreakSnafu { choice });
        debug!(
            "resolve: round {} depth {}: random source picked {} among {:?}",
            round, depth, choice, tied
        );
        return Ok(Resolution {
            eliminated: choice,
            outcome: TiebreakOutcome::Random { depth },
        });
    }

    resolve_at_depth(&lowest, ballots, source, round, depth + 1)
}

// Counts, for each tied choice, the ballots that prefer it to every other tied choice.
fn sub_election_tally(tied: &[usize], ballots: &[Ballot]) -> Vec<(usize, VoteCount)> {
    let mut tally: Vec<(usize, VoteCount)> =
        tied.iter().map(|cid| (*cid, VoteCount::EMPTY)).collect();
    for ballot in ballots.iter() {
        let projected = project(&ballot.rank_order, tied);
        if let Some(top) = projected.first() {
            if let Some(entry) = tally.iter_mut().find(|(cid, _)| cid == top) {
                entry.1 += VoteCount(1);
            }
        }
    }
    tally
}
