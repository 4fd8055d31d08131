//! The operations offered to the outer application: create a poll, submit a ballot,
//! compute a result.

use std::sync::Arc;

use log::{debug, info};
use snafu::prelude::*;

use crate::config::*;
use crate::random::TiebreakSource;
use crate::run_tally;
use crate::store::{BallotStore, PollStore, StoreError};

enum SourceFactory {
    // A private source is built for every result, so that seeded tallies of the same
    // snapshot agree.
    PerTally(TieBreakMode),
    Shared(Arc<dyn TiebreakSource>),
}

pub struct PollService<S> {
    store: S,
    tiebreak: SourceFactory,
}

impl<S: PollStore + BallotStore> PollService<S> {
    pub fn new(store: S, rules: &TallyRules) -> PollService<S> {
        PollService {
            store,
            tiebreak: SourceFactory::PerTally(rules.tiebreak_mode),
        }
    }

    /// Uses the same source for every result. The source must tolerate concurrent calls,
    /// which the [`TiebreakSource`] bounds already require.
    pub fn with_source(store: S, source: Arc<dyn TiebreakSource>) -> PollService<S> {
        PollService {
            store,
            tiebreak: SourceFactory::Shared(source),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn create_poll(&self, prompt: &str, choices: &[String]) -> Result<Poll, TallyError> {
        let poll = Poll::new(prompt, choices)?;
        self.store.put_poll(&poll).context(StoreSnafu)?;
        info!(
            "create_poll: created poll {} with {} choices",
            poll.poll_id,
            poll.choice_count()
        );
        Ok(poll)
    }

    pub fn get_poll(&self, poll_id: &str) -> Result<Poll, TallyError> {
        self.store
            .get_poll(poll_id)
            .context(StoreSnafu)?
            .context(PollNotFoundSnafu { poll_id })
    }

    /// Validates the ranking against the poll's choices and appends the ballot.
    pub fn submit_ballot(
        &self,
        poll_id: &str,
        voter_id: Option<&str>,
        rank_order: &[i64],
    ) -> Result<Ballot, TallyError> {
        let poll = self.get_poll(poll_id)?;
        let ballot = Ballot::new(&poll, voter_id, rank_order)?;
        match self.store.append_ballot(&ballot) {
            Ok(()) => {
                debug!(
                    "submit_ballot: poll {}: ballot from {} accepted",
                    poll_id, ballot.voter_id
                );
                Ok(ballot)
            }
            Err(StoreError::VoterExists { poll_id, voter_id }) => {
                DuplicateVoterSnafu { poll_id, voter_id }.fail()
            }
            Err(e) => Err(e).context(StoreSnafu),
        }
    }

    /// Tallies the ballots received so far. Ballots submitted while this runs may or may
    /// not be counted.
    pub fn get_result(&self, poll_id: &str) -> Result<TallyResult, TallyError> {
        let poll = self.get_poll(poll_id)?;
        let ballots = self.store.list_ballots(poll_id).context(StoreSnafu)?;
        debug!(
            "get_result: poll {}: snapshot of {} ballots",
            poll_id,
            ballots.len()
        );
        match &self.tiebreak {
            SourceFactory::PerTally(mode) => {
                let source = mode.source()?;
                run_tally(&poll, &ballots, source.as_ref())
            }
            SourceFactory::Shared(source) => run_tally(&poll, &ballots, source.as_ref()),
        }
    }
}
