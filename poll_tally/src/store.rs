//! Storage contracts for polls and ballots, and an in-memory implementation.
//!
//! The engine only needs two guarantees from storage: appending a ballot is atomic (it is
//! either fully visible to later readers or not at all), and listing the ballots of a poll
//! returns a consistent snapshot as of the call.

use std::collections::HashMap;

use log::debug;
use parking_lot::RwLock;
use snafu::prelude::*;

use crate::config::{Ballot, Poll};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    #[snafu(display("voter {voter_id} already voted in poll {poll_id}"))]
    VoterExists { poll_id: String, voter_id: String },
    #[snafu(display("poll {poll_id} already exists"))]
    PollExists { poll_id: String },
    #[snafu(display("storage unavailable: {message}"))]
    Unavailable { message: String },
    #[snafu(display("storage I/O error on {path}: {source}"))]
    Io {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("could not (de)serialize the stored data: {source}"))]
    Serialization { source: serde_json::Error },
}

pub trait PollStore: Send + Sync {
    fn put_poll(&self, poll: &Poll) -> Result<(), StoreError>;

    /// `None` if no poll has this id.
    fn get_poll(&self, poll_id: &str) -> Result<Option<Poll>, StoreError>;
}

pub trait BallotStore: Send + Sync {
    /// Appends a ballot. Fails with [`StoreError::VoterExists`] if this voter already has a
    /// ballot in this poll.
    fn append_ballot(&self, ballot: &Ballot) -> Result<(), StoreError>;

    /// All the ballots appended to the poll before the call started.
    fn list_ballots(&self, poll_id: &str) -> Result<Vec<Ballot>, StoreError>;
}

/// Keeps everything in memory. Readers and writers share a lock per table; a ballot is
/// pushed while holding the write lock, so a snapshot never sees half a ballot.
#[derive(Default)]
pub struct MemoryStore {
    polls: RwLock<HashMap<String, Poll>>,
    ballots: RwLock<HashMap<String, Vec<Ballot>>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl PollStore for MemoryStore {
    fn put_poll(&self, poll: &Poll) -> Result<(), StoreError> {
        let mut polls = self.polls.write();
        ensure!(
            !polls.contains_key(&poll.poll_id),
            PollExistsSnafu {
                poll_id: poll.poll_id.clone()
            }
        );
        polls.insert(poll.poll_id.clone(), poll.clone());
        debug!("MemoryStore: stored poll {}", poll.poll_id);
        Ok(())
    }

    fn get_poll(&self, poll_id: &str) -> Result<Option<Poll>, StoreError> {
        Ok(self.polls.read().get(poll_id).cloned())
    }
}

impl BallotStore for MemoryStore {
    fn append_ballot(&self, ballot: &Ballot) -> Result<(), StoreError> {
        let mut ballots = self.ballots.write();
        let poll_ballots = ballots.entry(ballot.poll_id.clone()).or_default();
        ensure!(
            !poll_ballots.iter().any(|b| b.voter_id == ballot.voter_id),
            VoterExistsSnafu {
                poll_id: ballot.poll_id.clone(),
                voter_id: ballot.voter_id.clone()
            }
        );
        poll_ballots.push(ballot.clone());
        debug!(
            "MemoryStore: poll {}: appended ballot #{}",
            ballot.poll_id,
            poll_ballots.len()
        );
        Ok(())
    }

    fn list_ballots(&self, poll_id: &str) -> Result<Vec<Ballot>, StoreError> {
        Ok(self
            .ballots
            .read()
            .get(poll_id)
            .cloned()
            .unwrap_or_default())
    }
}
