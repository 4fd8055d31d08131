pub use crate::config::*;

use crate::random::TiebreakSource;
use crate::run_tally;
use snafu::prelude::*;

/// The most ballots a [`Builder`] holds. Counts come from files that may not be trusted.
pub const MAX_BALLOTS: usize = 1_000_000;

/// A builder for tallying a poll held entirely in memory, without any store.
///
/// ```
/// pub use poll_tally::builder::Builder;
/// pub use poll_tally::{TallyRules, TieBreakMode};
/// # use poll_tally::TallyError;
///
/// let rules = TallyRules { tiebreak_mode: TieBreakMode::Hashed(7) };
/// let mut builder = Builder::new(&rules)?
///     .poll("Best pet?", &["cat".to_string(), "dog".to_string()])?;
///
/// builder.add_ranking(&["dog".to_string(), "cat".to_string()])?;
/// builder.add_ballot(&[1, 0])?;
///
/// assert_eq!(builder.tally()?.winning_choice, "dog");
/// # Ok::<(), TallyError>(())
/// ```
pub struct Builder {
    pub(crate) _rules: TallyRules,
    pub(crate) _poll: Option<Poll>,
    pub(crate) _ballots: Vec<Ballot>,
}

impl Builder {
    pub fn new(rules: &TallyRules) -> Result<Builder, TallyError> {
        Ok(Builder {
            _rules: rules.clone(),
            _poll: None,
            _ballots: Vec::new(),
        })
    }

    /// Sets the poll. Any ballot added before is dropped.
    pub fn poll(self, prompt: &str, choices: &[String]) -> Result<Builder, TallyError> {
        Ok(Builder {
            _rules: self._rules,
            _poll: Some(Poll::new(prompt, choices)?),
            _ballots: Vec::new(),
        })
    }

    pub fn current_poll(&self) -> Option<&Poll> {
        self._poll.as_ref()
    }

    pub fn ballots(&self) -> &[Ballot] {
        &self._ballots
    }

    /// Adds a ballot given by choice indices, most preferred first.
    pub fn add_ballot(&mut self, rank_order: &[i64]) -> Result<(), TallyError> {
        self.add_ballot_count(rank_order, 1)
    }

    /// Adds `count` identical ballots, as long as the builder stays within [`MAX_BALLOTS`].
    pub fn add_ballot_count(&mut self, rank_order: &[i64], count: u64) -> Result<(), TallyError> {
        let poll = self._poll.as_ref().context(InvalidPollSnafu { count: 0usize })?;
        let room = (MAX_BALLOTS - self._ballots.len()) as u64;
        ensure!(
            count <= room,
            TooManyBallotsSnafu {
                count,
                limit: MAX_BALLOTS
            }
        );
        let ballot = Ballot::new(poll, None, rank_order)?;
        for _ in 1..count {
            let mut copy = ballot.clone();
            copy.voter_id = format!("{}-{}", ballot.voter_id, self._ballots.len());
            self._ballots.push(copy);
        }
        if count > 0 {
            self._ballots.push(ballot);
        }
        Ok(())
    }

    /// Adds a ballot given by choice labels, most preferred first.
    ///
    /// Every label must be one of the poll's choices. Labels that are not choices are
    /// reported as out of range.
    pub fn add_ranking(&mut self, ranking: &[String]) -> Result<(), TallyError> {
        self.add_ranking_count(ranking, 1)
    }

    pub fn add_ranking_count(&mut self, ranking: &[String], count: u64) -> Result<(), TallyError> {
        let poll = self._poll.as_ref().context(InvalidPollSnafu { count: 0usize })?;
        let rank_order: Vec<i64> = ranking
            .iter()
            .map(|name| {
                poll.choices
                    .iter()
                    .position(|c| c == name)
                    .map(|idx| idx as i64)
                    .unwrap_or(-1)
            })
            .collect();
        self.add_ballot_count(&rank_order, count)
    }

    /// Tallies with a source built from the rules.
    pub fn tally(&self) -> Result<TallyResult, TallyError> {
        let source = self._rules.tiebreak_mode.source()?;
        self.tally_with(source.as_ref())
    }

    pub fn tally_with(&self, source: &dyn TiebreakSource) -> Result<TallyResult, TallyError> {
        let poll = self._poll.as_ref().context(InvalidPollSnafu { count: 0usize })?;
        run_tally(poll, &self._ballots, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    fn rules() -> TallyRules {
        TallyRules {
            tiebreak_mode: TieBreakMode::UseChoiceOrder,
        }
    }

    #[test]
    fn builder_by_names() {
        let mut b = Builder::new(&rules())
            .unwrap()
            .poll("Best?", &names(&["A", "B", "C"]))
            .unwrap();
        b.add_ranking_count(&names(&["A", "B", "C"]), 2).unwrap();
        b.add_ranking_count(&names(&["B", "C", "A"]), 2).unwrap();
        b.add_ranking(&names(&["C", "A", "B"])).unwrap();
        assert_eq!(b.ballots().len(), 5);
        let res = b.tally().unwrap();
        assert_eq!(res.winning_choice, "A");
        assert_eq!(res.winning_round, 2);
    }

    #[test]
    fn unknown_label_is_rejected() {
        let mut b = Builder::new(&rules())
            .unwrap()
            .poll("Best?", &names(&["A", "B"]))
            .unwrap();
        let err = b.add_ranking(&names(&["A", "Z"])).unwrap_err();
        assert!(matches!(
            err,
            TallyError::InvalidBallot {
                source: RankOrderError::OutOfRange { value: -1 }
            }
        ));
    }

    #[test]
    fn ballots_need_a_poll() {
        let mut b = Builder::new(&rules()).unwrap();
        assert!(b.add_ballot(&[0, 1]).is_err());
        assert!(b.tally().is_err());
    }

    #[test]
    fn zero_count_adds_nothing() {
        let mut b = Builder::new(&rules())
            .unwrap()
            .poll("Best?", &names(&["A", "B"]))
            .unwrap();
        b.add_ballot_count(&[0, 1], 0).unwrap();
        assert!(matches!(b.tally().unwrap_err(), TallyError::NoBallots));
    }

    #[test]
    fn huge_counts_are_rejected() {
        let mut b = Builder::new(&rules())
            .unwrap()
            .poll("Best?", &names(&["A", "B"]))
            .unwrap();
        let err = b
            .add_ranking_count(&names(&["A", "B"]), 1_000_000_000_000)
            .unwrap_err();
        assert!(matches!(err, TallyError::TooManyBallots { .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(b.ballots().is_empty());

        // The limit covers the ballots already held.
        b.add_ballot_count(&[0, 1], 3).unwrap();
        assert!(b.add_ballot_count(&[1, 0], MAX_BALLOTS as u64 - 2).is_err());
        assert_eq!(b.ballots().len(), 3);
    }

    #[test]
    fn choice_order_tiebreak() {
        let mut b = Builder::new(&rules())
            .unwrap()
            .poll("Best?", &names(&["A", "B"]))
            .unwrap();
        b.add_ballot(&[0, 1]).unwrap();
        b.add_ballot(&[1, 0]).unwrap();
        // A perfect tie: B, listed last, is eliminated.
        let res = b.tally().unwrap();
        assert_eq!(res.winning_choice, "A");
        assert_eq!(res.winning_round, 2);
        assert_eq!(res.winning_votes, 2);
    }
}
