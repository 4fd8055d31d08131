/*!
Ranked-choice (instant-runoff) tally engine for polls.

Voters rank every choice of a poll. Each round, every ballot counts for its most preferred
choice still in the running. A choice holding a strict majority wins; otherwise the choice
with the fewest votes is eliminated and the next round starts. Ties for last place are
settled by a sub-election among the tied choices (see [`tiebreak`]), and only as a last
resort by a [`random::TiebreakSource`].

```
use poll_tally::builder::Builder;
use poll_tally::{TallyRules, TieBreakMode};

let rules = TallyRules { tiebreak_mode: TieBreakMode::Random(42) };
let mut builder = Builder::new(&rules)?.poll(
    "What is the best fruit?",
    &["apple".to_string(), "banana".to_string(), "clementine".to_string()],
)?;
builder.add_ballot(&[1, 0, 2])?;
builder.add_ballot(&[2, 0, 1])?;
builder.add_ballot(&[2, 1, 0])?;

let result = builder.tally()?;
assert_eq!(result.winning_choice, "clementine");
# Ok::<(), poll_tally::TallyError>(())
```
*/

mod config;
pub mod builder;
pub mod manual;
pub mod random;
pub mod service;
pub mod store;
pub mod tiebreak;

use log::{debug, info};
use snafu::prelude::*;

use std::ops::{Add, AddAssign};

pub use crate::config::*;
use crate::random::TiebreakSource;

// **** Private structures ****

type RoundId = u32;

#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash)]
pub(crate) struct VoteCount(pub(crate) u64);

impl VoteCount {
    pub(crate) const EMPTY: VoteCount = VoteCount(0);
}

impl std::iter::Sum for VoteCount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        VoteCount(iter.map(|vc| vc.0).sum())
    }
}

impl AddAssign for VoteCount {
    fn add_assign(&mut self, rhs: VoteCount) {
        self.0 += rhs.0;
    }
}

impl Add for VoteCount {
    type Output = VoteCount;
    fn add(self: VoteCount, rhs: VoteCount) -> VoteCount {
        VoteCount(self.0 + rhs.0)
    }
}

/// Runs the instant-runoff tally of a poll.
///
/// Arguments:
/// * `poll` the poll, with at least two choices
/// * `ballots` a snapshot of the ballots of this poll. Every ballot must rank every choice.
/// * `source` decides the ties that the ballots cannot separate
///
/// The computation is pure: the same poll, ballots and tie-break draws always give the same
/// result. It finishes in at most `choices - 1` eliminations.
pub fn run_tally(
    poll: &Poll,
    ballots: &[Ballot],
    source: &dyn TiebreakSource,
) -> Result<TallyResult, TallyError> {
    let num_choices = poll.choice_count();
    ensure!(num_choices >= 2, InvalidPollSnafu { count: num_choices });
    ensure!(!ballots.is_empty(), NoBallotsSnafu);
    for ballot in ballots.iter() {
        check_rank_order(&ballot.rank_order, num_choices).context(InvalidBallotSnafu)?;
    }
    info!(
        "run_tally: poll {}: processing {} ballots, choices: {:?}",
        poll.poll_id,
        ballots.len(),
        poll.choices
    );

    // Every ballot ranks every choice, so no ballot is ever exhausted and the total
    // stays the same in every round.
    let total = VoteCount(ballots.len() as u64);
    let threshold = get_threshold(total);
    let mut active: Vec<bool> = vec![true; num_choices];
    let mut rounds: Vec<RoundStats> = Vec::new();

    for round_id in 1..=(num_choices as RoundId) {
        let tally = compute_tally(ballots, &active);
        debug!("run_tally: round {}: tally: {:?}", round_id, tally);
        debug_assert_eq!(tally.iter().map(|(_, vc)| *vc).sum::<VoteCount>(), total);

        let mut stats = RoundStats {
            round: round_id,
            tally: tally
                .iter()
                .map(|(cid, vc)| ChoiceStats::new(&poll.choices[*cid], vc.0, total.0))
                .collect(),
            threshold: threshold.0,
            elected: None,
            eliminated: None,
            tiebreak: None,
        };

        // At most one choice can hold a strict majority.
        if let Some(&(winner, count)) = tally.iter().find(|(_, vc)| *vc >= threshold) {
            stats.elected = Some(poll.choices[winner].clone());
            log_round(&stats);
            rounds.push(stats);
            return Ok(TallyResult {
                prompt: poll.prompt.clone(),
                total_votes: total.0,
                winning_votes: count.0,
                winning_choice: poll.choices[winner].clone(),
                winning_index: winner,
                winning_round: round_id,
                rounds,
            });
        }

        let (eliminated, tiebreak) = find_eliminated_choice(&tally, ballots, source, round_id)?;
        debug_assert!(active[eliminated], "choice {} already eliminated", eliminated);
        stats.eliminated = Some(poll.choices[eliminated].clone());
        stats.tiebreak = tiebreak;
        log_round(&stats);
        rounds.push(stats);
        active[eliminated] = false;
    }
    NoConvergenceSnafu.fail()
}

fn get_threshold(total: VoteCount) -> VoteCount {
    VoteCount((total.0 / 2) + 1)
}

// The count of each choice still running, in poll order.
fn compute_tally(ballots: &[Ballot], active: &[bool]) -> Vec<(usize, VoteCount)> {
    let mut counts: Vec<VoteCount> = vec![VoteCount::EMPTY; active.len()];
    for ballot in ballots.iter() {
        if let Some(cid) = ballot.first_active(active) {
            counts[cid] += VoteCount(1);
        }
    }
    active
        .iter()
        .enumerate()
        .filter(|(_, still_running)| **still_running)
        .map(|(cid, _)| (cid, counts[cid]))
        .collect()
}

fn find_eliminated_choice(
    tally: &[(usize, VoteCount)],
    ballots: &[Ballot],
    source: &dyn TiebreakSource,
    round_id: RoundId,
) -> Result<(usize, Option<TiebreakOutcome>), TallyError> {
    let min_count: VoteCount = tally
        .iter()
        .map(|(_, vc)| *vc)
        .min()
        .context(NoConvergenceSnafu)?;
    let all_smallest: Vec<usize> = tally
        .iter()
        .filter(|(_, vc)| *vc == min_count)
        .map(|(cid, _)| *cid)
        .collect();
    debug!(
        "find_eliminated_choice: round {}: all_smallest: {:?}",
        round_id, all_smallest
    );

    // No tiebreak, the logic below is not relevant.
    if all_smallest.len() == 1 {
        return Ok((all_smallest[0], None));
    }
    let resolution = tiebreak::resolve(&all_smallest, ballots, source, round_id)?;
    Ok((resolution.eliminated, Some(resolution.outcome)))
}

fn log_round(stats: &RoundStats) {
    info!(
        "Round {} (winning threshold: {})",
        stats.round, stats.threshold
    );
    for cs in stats.tally.iter() {
        let status = if stats.elected.as_ref() == Some(&cs.choice) {
            " -> elected".to_string()
        } else if stats.eliminated.as_ref() == Some(&cs.choice) {
            match stats.tiebreak {
                Some(TiebreakOutcome::SubElection { depth }) => {
                    format!(" -> eliminated (tie broken by sub-election, depth {})", depth)
                }
                Some(TiebreakOutcome::Random { depth }) => {
                    format!(" -> eliminated (tie broken at random, depth {})", depth)
                }
                None => " -> eliminated".to_string(),
            }
        } else {
            String::new()
        };
        info!(
            "{:>7} {:>3}% {}{}",
            cs.votes, cs.percentage, cs.choice, status
        );
    }
}
