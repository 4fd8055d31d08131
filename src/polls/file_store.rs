use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind as IoErrorKind;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;
use parking_lot::Mutex;
use poll_tally::store::*;
use poll_tally::{Ballot, Poll};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use tempfile::NamedTempFile;

/// Everything the file holds.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
struct DataFile {
    polls: Vec<Poll>,
    ballots: Vec<Ballot>,
}

/// Keeps the polls and the ballots in a single JSON document.
///
/// Every operation holds an OS lock on a sibling `.lock` file, so separate processes sharing
/// the data file take turns. The data file is never written in place: a fresh temporary file
/// is filled in the same directory and then renamed over it.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: &Path) -> JsonFileStore {
        JsonFileStore {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn path_str(&self) -> String {
        self.path.display().to_string()
    }

    // The data file is replaced on every write, so the lock cannot live on it.
    fn lock_path(&self) -> PathBuf {
        let mut p = self.path.clone().into_os_string();
        p.push(".lock");
        PathBuf::from(p)
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }

    fn open_lock_file(&self) -> Result<File, StoreError> {
        let lock_path = self.lock_path();
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .context(IoSnafu {
                path: lock_path.display().to_string(),
            })
    }

    /// Runs `f` while holding the process mutex and the exclusive file lock.
    fn with_write_lock<T>(
        &self,
        f: impl FnOnce(&JsonFileStore) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = self.lock.lock();
        let mut file_lock = fd_lock::RwLock::new(self.open_lock_file()?);
        let _file_guard = file_lock.write().context(IoSnafu {
            path: self.lock_path().display().to_string(),
        })?;
        f(self)
    }

    fn with_read_lock<T>(
        &self,
        f: impl FnOnce(&JsonFileStore) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let file_lock = fd_lock::RwLock::new(self.open_lock_file()?);
        let _file_guard = file_lock.read().context(IoSnafu {
            path: self.lock_path().display().to_string(),
        })?;
        f(self)
    }

    fn load(&self) -> Result<DataFile, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(x) => x,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                debug!("JsonFileStore: {} does not exist yet", self.path_str());
                return Ok(DataFile::default());
            }
            Err(e) => {
                return Err(e).context(IoSnafu {
                    path: self.path_str(),
                })
            }
        };
        serde_json::from_str(&contents).context(SerializationSnafu)
    }

    fn save(&self, data: &DataFile) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(data).context(SerializationSnafu)?;
        let dir = self.dir();
        let mut tmp = NamedTempFile::new_in(dir).context(IoSnafu {
            path: dir.display().to_string(),
        })?;
        tmp.write_all(contents.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .context(IoSnafu {
                path: tmp.path().display().to_string(),
            })?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .context(IoSnafu {
                path: self.path_str(),
            })?;
        Ok(())
    }
}

impl PollStore for JsonFileStore {
    fn put_poll(&self, poll: &Poll) -> Result<(), StoreError> {
        self.with_write_lock(|store| {
            let mut data = store.load()?;
            ensure!(
                !data.polls.iter().any(|p| p.poll_id == poll.poll_id),
                PollExistsSnafu {
                    poll_id: poll.poll_id.clone()
                }
            );
            data.polls.push(poll.clone());
            store.save(&data)?;
            debug!("JsonFileStore: stored poll {}", poll.poll_id);
            Ok(())
        })
    }

    fn get_poll(&self, poll_id: &str) -> Result<Option<Poll>, StoreError> {
        self.with_read_lock(|store| {
            let data = store.load()?;
            Ok(data.polls.into_iter().find(|p| p.poll_id == poll_id))
        })
    }
}

impl BallotStore for JsonFileStore {
    fn append_ballot(&self, ballot: &Ballot) -> Result<(), StoreError> {
        self.with_write_lock(|store| {
            let mut data = store.load()?;
            ensure!(
                !data
                    .ballots
                    .iter()
                    .any(|b| b.poll_id == ballot.poll_id && b.voter_id == ballot.voter_id),
                VoterExistsSnafu {
                    poll_id: ballot.poll_id.clone(),
                    voter_id: ballot.voter_id.clone()
                }
            );
            data.ballots.push(ballot.clone());
            store.save(&data)?;
            debug!(
                "JsonFileStore: poll {}: appended ballot from {}",
                ballot.poll_id, ballot.voter_id
            );
            Ok(())
        })
    }

    fn list_ballots(&self, poll_id: &str) -> Result<Vec<Ballot>, StoreError> {
        self.with_read_lock(|store| {
            let data = store.load()?;
            Ok(data
                .ballots
                .into_iter()
                .filter(|b| b.poll_id == poll_id)
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ballot(poll_id: &str, voter_id: &str) -> Ballot {
        Ballot {
            poll_id: poll_id.to_string(),
            voter_id: voter_id.to_string(),
            rank_order: vec![1, 0],
        }
    }

    #[test]
    fn survives_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let poll = Poll::with_id("poll1", "Best?", &["a".to_string(), "b".to_string()]).unwrap();
        {
            let store = JsonFileStore::new(&path);
            assert_eq!(store.get_poll("poll1").unwrap(), None);
            store.put_poll(&poll).unwrap();
            store.append_ballot(&ballot("poll1", "u1")).unwrap();
            store.append_ballot(&ballot("poll2", "u1")).unwrap();
        }
        let store = JsonFileStore::new(&path);
        assert_eq!(store.get_poll("poll1").unwrap(), Some(poll));
        assert_eq!(store.list_ballots("poll1").unwrap(), vec![ballot("poll1", "u1")]);
        // Only the data file and its lock are left behind.
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["data.json", "data.json.lock"]);
    }

    #[test]
    fn rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(&dir.path().join("data.json"));
        let poll = Poll::with_id("poll1", "Best?", &["a".to_string(), "b".to_string()]).unwrap();
        store.put_poll(&poll).unwrap();
        assert!(matches!(
            store.put_poll(&poll),
            Err(StoreError::PollExists { .. })
        ));
        store.append_ballot(&ballot("poll1", "u1")).unwrap();
        assert!(matches!(
            store.append_ballot(&ballot("poll1", "u1")),
            Err(StoreError::VoterExists { .. })
        ));
    }

    #[test]
    fn corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, "not json").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(matches!(
            store.list_ballots("poll1"),
            Err(StoreError::Serialization { .. })
        ));
    }

    #[test]
    fn concurrent_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(&dir.path().join("data.json"));
        std::thread::scope(|scope| {
            for t in 0..4 {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..10 {
                        store
                            .append_ballot(&ballot("poll1", &format!("{}-{}", t, i)))
                            .unwrap();
                    }
                });
            }
        });
        assert_eq!(store.list_ballots("poll1").unwrap().len(), 40);
    }

    #[test]
    fn stores_sharing_a_file_keep_every_ballot() {
        // Each store stands for a separate process: they share nothing but the path.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::thread::scope(|scope| {
            for t in 0..2 {
                let path = &path;
                scope.spawn(move || {
                    let store = JsonFileStore::new(path);
                    for i in 0..50 {
                        store
                            .append_ballot(&ballot("poll1", &format!("{}-{}", t, i)))
                            .unwrap();
                    }
                });
            }
        });
        let store = JsonFileStore::new(&path);
        assert_eq!(store.list_ballots("poll1").unwrap().len(), 100);
    }

    #[test]
    fn relative_path() {
        let store = JsonFileStore::new(Path::new("verdict.json"));
        assert_eq!(store.dir(), Path::new("."));
        assert_eq!(store.lock_path(), PathBuf::from("verdict.json.lock"));
    }
}
