// ********* Input data structures ***********

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use uuid::Uuid;

use crate::store::StoreError;

/// A poll: a prompt and an ordered list of distinct choices.
///
/// Polls are immutable once created. The position of a choice in `choices` is
/// the index that ballots refer to.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub poll_id: String,
    pub prompt: String,
    pub choices: Vec<String>,
}

impl Poll {
    /// Creates a poll with a fresh identifier after checking the prompt and the choices.
    pub fn new(prompt: &str, choices: &[String]) -> Result<Poll, TallyError> {
        Poll::with_id(&Uuid::new_v4().to_string(), prompt, choices)
    }

    /// Same as [`Poll::new`] with a caller-provided identifier.
    pub fn with_id(poll_id: &str, prompt: &str, choices: &[String]) -> Result<Poll, TallyError> {
        ensure!(!prompt.is_empty(), EmptyPromptSnafu);
        check_choices(choices)?;
        Ok(Poll {
            poll_id: poll_id.to_string(),
            prompt: prompt.to_string(),
            choices: choices.to_vec(),
        })
    }

    pub fn choice_count(&self) -> usize {
        self.choices.len()
    }
}

/// Checks that there are at least two choices, none empty and all distinct.
/// Equality is case-sensitive.
pub fn check_choices(choices: &[String]) -> Result<(), TallyError> {
    ensure!(
        choices.len() >= 2,
        TooFewChoicesSnafu {
            count: choices.len()
        }
    );
    for (position, choice) in choices.iter().enumerate() {
        ensure!(!choice.is_empty(), EmptyChoiceSnafu { position });
        if choices[..position].contains(choice) {
            return InvalidChoicesSnafu {
                choice: choice.clone(),
            }
            .fail();
        }
    }
    Ok(())
}

/// One voter's complete ranking of a poll's choices.
///
/// `rank_order[0]` is the index of the most preferred choice. Once accepted,
/// a ballot always ranks every choice exactly once.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    pub poll_id: String,
    pub voter_id: String,
    pub rank_order: Vec<usize>,
}

impl Ballot {
    /// Validates a raw ranking against the poll and builds the ballot.
    ///
    /// A missing voter id is replaced by a random one.
    pub fn new(
        poll: &Poll,
        voter_id: Option<&str>,
        rank_order: &[i64],
    ) -> Result<Ballot, TallyError> {
        let rank_order =
            parse_rank_order(rank_order, poll.choice_count()).context(InvalidBallotSnafu)?;
        let voter_id = match voter_id {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        Ok(Ballot {
            poll_id: poll.poll_id.clone(),
            voter_id,
            rank_order,
        })
    }

    /// The most preferred choice that is still in the running.
    pub(crate) fn first_active(&self, active: &[bool]) -> Option<usize> {
        self.rank_order.iter().copied().find(|idx| active[*idx])
    }
}

/// Converts signed ranks to choice indices, then checks the permutation rules.
pub fn parse_rank_order(raw: &[i64], choice_count: usize) -> Result<Vec<usize>, RankOrderError> {
    ensure!(
        raw.len() == choice_count,
        WrongLengthSnafu {
            expected: choice_count,
            actual: raw.len()
        }
    );
    let mut indices: Vec<usize> = Vec::with_capacity(raw.len());
    for &value in raw {
        let idx = usize::try_from(value)
            .ok()
            .filter(|idx| *idx < choice_count)
            .context(OutOfRangeSnafu { value })?;
        indices.push(idx);
    }
    check_rank_order(&indices, choice_count)?;
    Ok(indices)
}

/// A rank order is valid if it is a permutation of `0..choice_count`.
pub fn check_rank_order(rank_order: &[usize], choice_count: usize) -> Result<(), RankOrderError> {
    ensure!(
        rank_order.len() == choice_count,
        WrongLengthSnafu {
            expected: choice_count,
            actual: rank_order.len()
        }
    );
    let mut seen = vec![false; choice_count];
    for &idx in rank_order {
        ensure!(idx < choice_count, OutOfRangeSnafu { value: idx as i64 });
        ensure!(!seen[idx], DuplicateIndexSnafu { index: idx });
        seen[idx] = true;
    }
    Ok(())
}

// ******** Output data structures *********

/// How a last-place tie was settled in a round.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum TiebreakOutcome {
    /// The sub-election among the tied choices found a single last place.
    /// `depth` counts the nested sub-elections, starting at 1.
    SubElection { depth: u32 },
    /// The ballots could not separate the tied choices and the random source decided.
    Random { depth: u32 },
}

/// The votes of one choice in a round.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceStats {
    pub choice: String,
    pub votes: u64,
    /// Share of all the ballots, rounded down.
    pub percentage: u64,
}

impl ChoiceStats {
    pub fn new(choice: &str, votes: u64, total: u64) -> ChoiceStats {
        ChoiceStats {
            choice: choice.to_string(),
            votes,
            percentage: if total == 0 { 0 } else { votes * 100 / total },
        }
    }
}

/// Statistics for one round
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundStats {
    pub round: u32,
    /// Every choice still running, in poll order.
    pub tally: Vec<ChoiceStats>,
    pub threshold: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eliminated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiebreak: Option<TiebreakOutcome>,
}

/// The outcome of a poll. Computed on demand, never stored by the engine.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyResult {
    pub prompt: String,
    pub total_votes: u64,
    pub winning_votes: u64,
    pub winning_choice: String,
    pub winning_index: usize,
    /// 1-based.
    pub winning_round: u32,
    pub rounds: Vec<RoundStats>,
}

/// Error categories, so that callers can decide how to report a failure.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ErrorKind {
    /// The caller sent something invalid. Never retried.
    Validation,
    /// The request is well-formed but the poll is not in a state to answer it.
    Precondition,
    /// A collaborator (storage, entropy) failed.
    Infrastructure,
}

/// Why a rank order is not a permutation of the poll's choice indices.
#[derive(Debug, Snafu, Eq, PartialEq, Clone)]
#[snafu(visibility(pub(crate)))]
pub enum RankOrderError {
    #[snafu(display("expected {expected} rankings, got {actual}"))]
    WrongLength { expected: usize, actual: usize },
    #[snafu(display("index {value} is out of range"))]
    OutOfRange { value: i64 },
    #[snafu(display("index {index} appears more than once"))]
    DuplicateIndex { index: usize },
}

/// Errors that prevent a poll operation from completing.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TallyError {
    #[snafu(display("prompt cannot be empty"))]
    EmptyPrompt,
    #[snafu(display("there must be at least two choices, got {count}"))]
    TooFewChoices { count: usize },
    #[snafu(display("none of the choices can be empty (position {position})"))]
    EmptyChoice { position: usize },
    #[snafu(display("choices must be unique: {choice:?} is repeated"))]
    InvalidChoices { choice: String },
    #[snafu(display("not a valid rank order: {source}"))]
    InvalidBallot { source: RankOrderError },
    #[snafu(display("cannot hold more than {limit} ballots, {count} requested"))]
    TooManyBallots { count: u64, limit: usize },
    #[snafu(display("voter {voter_id} already voted in poll {poll_id}"))]
    DuplicateVoter { poll_id: String, voter_id: String },
    #[snafu(display("poll {poll_id} not found"))]
    PollNotFound { poll_id: String },
    #[snafu(display("no ballots were cast"))]
    NoBallots,
    #[snafu(display("cannot tally a poll with {count} choices"))]
    InvalidPoll { count: usize },
    #[snafu(display("tie-break source returned {choice}, which is not one of the tied choices"))]
    InvalidTiebreak { choice: usize },
    #[snafu(display("could not seed the tie-break source: {message}"))]
    Entropy { message: String },
    #[snafu(display("the tally did not converge"))]
    NoConvergence,
    #[snafu(display("storage failure: {source}"))]
    Store { source: StoreError },
}

impl TallyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TallyError::EmptyPrompt
            | TallyError::TooFewChoices { .. }
            | TallyError::EmptyChoice { .. }
            | TallyError::InvalidChoices { .. }
            | TallyError::InvalidBallot { .. }
            | TallyError::TooManyBallots { .. }
            | TallyError::DuplicateVoter { .. }
            | TallyError::PollNotFound { .. } => ErrorKind::Validation,
            TallyError::NoBallots | TallyError::InvalidPoll { .. } => ErrorKind::Precondition,
            TallyError::InvalidTiebreak { .. }
            | TallyError::Entropy { .. }
            | TallyError::NoConvergence
            | TallyError::Store { .. } => ErrorKind::Infrastructure,
        }
    }
}

// ********* Configuration **********

/// Decides the irreducible ties, when the ballots carry no information to separate
/// the tied choices.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TieBreakMode {
    /// Uniform choice from a ChaCha stream with a fixed seed.
    Random(u64),
    /// Uniform choice from a ChaCha stream seeded by the operating system.
    Entropy,
    /// Picks the choice with the smallest SHA-256 digest of (seed, round, index).
    /// Stateless and reproducible.
    Hashed(u32),
    /// Eliminates the tied choice listed last in the poll.
    UseChoiceOrder,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TallyRules {
    pub tiebreak_mode: TieBreakMode,
}

impl TallyRules {
    pub const DEFAULT_RULES: TallyRules = TallyRules {
        tiebreak_mode: TieBreakMode::Entropy,
    };
}

impl Default for TallyRules {
    fn default() -> Self {
        TallyRules::DEFAULT_RULES
    }
}
