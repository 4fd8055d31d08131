//! Sources of randomness for the irreducible ties.
//!
//! A source is only consulted when the ballots rank every tied choice the same way.
//! Sources are shared between concurrent tallies, so every implementation is `Send + Sync`
//! and keeps its state consistent under concurrent calls.

use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::*;

pub trait TiebreakSource: Send + Sync {
    /// Picks one element of `candidates` (never empty). `round` is the main election round
    /// in which the tie happened.
    fn choose(&self, candidates: &[usize], round: u32) -> usize;
}

/// Uniform selection from a ChaCha stream.
///
/// The stream is behind a mutex: two tallies drawing at the same time each get a distinct,
/// complete draw.
pub struct SeededSource {
    rng: Mutex<ChaCha8Rng>,
}

impl SeededSource {
    pub fn from_seed(seed: u64) -> SeededSource {
        SeededSource {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Result<SeededSource, TallyError> {
        let rng = ChaCha8Rng::try_from_os_rng().map_err(|e| TallyError::Entropy {
            message: e.to_string(),
        })?;
        Ok(SeededSource {
            rng: Mutex::new(rng),
        })
    }
}

impl TiebreakSource for SeededSource {
    fn choose(&self, candidates: &[usize], round: u32) -> usize {
        let pos = self.rng.lock().random_range(0..candidates.len());
        debug!(
            "SeededSource: round {}: picked {} among {:?}",
            round, candidates[pos], candidates
        );
        candidates[pos]
    }
}

/// Generates a "random" choice without any state. Random in this context means hard to
/// guess in advance: the candidate with the smallest SHA-256 digest of the seed, the round
/// and its index is picked.
pub struct HashedSource {
    seed: u32,
}

impl HashedSource {
    pub fn new(seed: u32) -> HashedSource {
        HashedSource { seed }
    }

    fn digest(&self, round: u32, candidate: usize) -> String {
        sha256::digest(format!("{:08}{:08}{}", self.seed, round, candidate).as_str())
    }
}

impl TiebreakSource for HashedSource {
    fn choose(&self, candidates: &[usize], round: u32) -> usize {
        let mut keyed: Vec<(String, usize)> = candidates
            .iter()
            .map(|c| (self.digest(round, *c), *c))
            .collect();
        keyed.sort();
        debug!("HashedSource: round {}: order {:?}", round, keyed);
        keyed[0].1
    }
}

/// Deterministic fallback: the choice listed last in the poll is eliminated.
pub struct ChoiceOrderSource;

impl TiebreakSource for ChoiceOrderSource {
    fn choose(&self, candidates: &[usize], _round: u32) -> usize {
        candidates.iter().copied().max().unwrap_or_default()
    }
}

impl TieBreakMode {
    /// Builds a fresh source for this mode.
    pub fn source(&self) -> Result<Arc<dyn TiebreakSource>, TallyError> {
        let source: Arc<dyn TiebreakSource> = match *self {
            TieBreakMode::Random(seed) => Arc::new(SeededSource::from_seed(seed)),
            TieBreakMode::Entropy => Arc::new(SeededSource::from_entropy()?),
            TieBreakMode::Hashed(seed) => Arc::new(HashedSource::new(seed)),
            TieBreakMode::UseChoiceOrder => Arc::new(ChoiceOrderSource),
        };
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn seeded_is_reproducible() {
        let candidates = [1, 4, 7, 9];
        let s1 = SeededSource::from_seed(42);
        let s2 = SeededSource::from_seed(42);
        let d1: Vec<usize> = (0..20).map(|r| s1.choose(&candidates, r)).collect();
        let d2: Vec<usize> = (0..20).map(|r| s2.choose(&candidates, r)).collect();
        assert_eq!(d1, d2);
        assert!(d1.iter().all(|c| candidates.contains(c)));
    }

    #[test]
    fn seeded_covers_all_candidates() {
        let candidates = [0, 1, 2];
        let s = SeededSource::from_seed(7);
        let seen: HashSet<usize> = (0..200).map(|r| s.choose(&candidates, r)).collect();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn entropy_source_picks_a_candidate() {
        let s = SeededSource::from_entropy().unwrap();
        assert!([3, 5].contains(&s.choose(&[3, 5], 1)));
    }

    #[test]
    fn seeded_is_safe_to_share() {
        let s = SeededSource::from_seed(3);
        let candidates = [2, 3];
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for r in 0..100 {
                        assert!(candidates.contains(&s.choose(&candidates, r)));
                    }
                });
            }
        });
    }

    #[test]
    fn hashed_is_stateless() {
        let s = HashedSource::new(11);
        let candidates = [0, 2, 5];
        let first = s.choose(&candidates, 3);
        for _ in 0..5 {
            assert_eq!(s.choose(&candidates, 3), first);
        }
        // Order of the candidates does not matter.
        assert_eq!(s.choose(&[5, 2, 0], 3), first);
        assert_eq!(HashedSource::new(11).choose(&candidates, 3), first);
    }

    #[test]
    fn choice_order_picks_last() {
        assert_eq!(ChoiceOrderSource.choose(&[1, 3, 2], 1), 3);
    }

    #[test]
    fn modes_build_sources() {
        for mode in [
            TieBreakMode::Random(1),
            TieBreakMode::Entropy,
            TieBreakMode::Hashed(1),
            TieBreakMode::UseChoiceOrder,
        ] {
            let s = mode.source().unwrap();
            assert!([0, 1].contains(&s.choose(&[0, 1], 1)));
        }
    }
}
