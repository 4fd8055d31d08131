use std::fs;

use log::{debug, info};
use poll_tally::builder::Builder;
use poll_tally::{TallyResult, TallyRules};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::polls::{OpeningJsonSnafu, ParsingJsonSnafu, TallySnafu, VerdictResult};

/// An election held outside of the data file: a poll and its ballots, by label.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Election {
    pub prompt: String,
    pub choices: Vec<String>,
    pub ballots: Vec<ElectionBallot>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ElectionBallot {
    /// The labels of the choices, most preferred first.
    pub ranking: Vec<String>,
    pub count: Option<u64>,
}

pub fn read_election(path: &str) -> VerdictResult<Election> {
    info!("Attempting to read election file {:?}", path);
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    serde_json::from_str(&contents).context(ParsingJsonSnafu { path })
}

pub fn tally_election(election: &Election, rules: &TallyRules) -> VerdictResult<TallyResult> {
    let mut builder = Builder::new(rules)
        .and_then(|b| b.poll(&election.prompt, &election.choices))
        .context(TallySnafu)?;
    for ballot in election.ballots.iter() {
        builder
            .add_ranking_count(&ballot.ranking, ballot.count.unwrap_or(1))
            .context(TallySnafu)?;
    }
    debug!(
        "tally_election: {} ballots from {} entries",
        builder.ballots().len(),
        election.ballots.len()
    );
    builder.tally().context(TallySnafu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use poll_tally::{TallyError, TieBreakMode};

    const FRUITS: &str = r#"{
        "prompt": "What is the best fruit?",
        "choices": ["apple", "banana", "clementine"],
        "ballots": [
            {"ranking": ["apple", "banana", "clementine"]},
            {"ranking": ["banana", "apple", "clementine"], "count": 2},
            {"ranking": ["clementine", "apple", "banana"]},
            {"ranking": ["clementine", "banana", "apple"]}
        ]
    }"#;

    fn rules() -> TallyRules {
        TallyRules {
            tiebreak_mode: TieBreakMode::Hashed(1),
        }
    }

    #[test]
    fn counts_weighted_ballots() {
        let election: Election = serde_json::from_str(FRUITS).unwrap();
        let res = tally_election(&election, &rules()).unwrap();
        assert_eq!(res.winning_choice, "banana");
        assert_eq!(res.total_votes, 5);
        assert_eq!(res.winning_votes, 3);
        assert_eq!(res.winning_round, 2);
    }

    #[test]
    fn incomplete_ranking() {
        let mut election: Election = serde_json::from_str(FRUITS).unwrap();
        election.ballots[0].ranking.pop();
        let err = tally_election(&election, &rules()).unwrap_err();
        assert!(matches!(
            err,
            crate::polls::VerdictError::Tally {
                source: TallyError::InvalidBallot { .. }
            }
        ));
    }

    #[test]
    fn oversized_count() {
        let mut election: Election = serde_json::from_str(FRUITS).unwrap();
        election.ballots[0].count = Some(1_000_000_000_000);
        let err = tally_election(&election, &rules()).unwrap_err();
        assert!(matches!(
            err,
            crate::polls::VerdictError::Tally {
                source: TallyError::TooManyBallots { .. }
            }
        ));
        assert_eq!(crate::polls::exit_code(&err), 2);
    }

    #[test]
    fn reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("election.json");
        fs::write(&path, FRUITS).unwrap();
        let election = read_election(path.to_str().unwrap()).unwrap();
        assert_eq!(election.ballots[1].count, Some(2));
        assert!(read_election("/does/not/exist.json").is_err());
    }
}
