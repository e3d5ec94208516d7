//! Persistence collaborators: user records and attempts.
//!
//! The engine only talks to the [`UserStore`] and [`AttemptStore`] traits.
//! In-memory implementations back tests and single-process use; the
//! [`JsonUserStore`] keeps one JSON document per user on disk.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use hacksim_types::error::{HackError, Result};
use hacksim_types::time::Timestamp;
use hacksim_vfs::FilesystemSnapshot;
use serde::{Deserialize, Serialize};

use crate::session::SessionKey;

/// Identifier of a persisted attempt.
pub type AttemptId = u64;

/// Durable per-user state.
pub trait UserStore: Send + Sync {
    /// The saved file system for a session slot, if any.
    fn load_filesystem(&self, key: &SessionKey) -> Result<Option<FilesystemSnapshot>>;
    fn save_filesystem(&self, key: &SessionKey, snapshot: &FilesystemSnapshot) -> Result<()>;
    fn load_score(&self, user_id: &str) -> Result<u64>;
    /// Add to the user's score and return the new total.
    fn add_score(&self, user_id: &str, delta: u64) -> Result<u64>;
    /// Record a completed challenge. Returns `true` the first time only.
    fn mark_challenge_completed(&self, user_id: &str, challenge_id: &str) -> Result<bool>;
    /// Mark the challenge completed and add `points` as one update.
    ///
    /// Returns the new total on the first completion and `None` on replays.
    /// A failure leaves neither change behind.
    fn award_first_completion(
        &self,
        user_id: &str,
        challenge_id: &str,
        points: u64,
    ) -> Result<Option<u64>>;
    fn completed_challenges(&self, user_id: &str) -> Result<BTreeSet<String>>;
}

/// Durable attempt records.
pub trait AttemptStore: Send + Sync {
    /// The user's most recent attempt at a challenge that is not completed.
    fn find_open_attempt(&self, user_id: &str, challenge_id: &str) -> Result<Option<Attempt>>;
    fn create(&self, user_id: &str, challenge_id: &str) -> Result<Attempt>;
    fn get(&self, attempt_id: AttemptId) -> Result<Option<Attempt>>;
    fn append_command(&self, attempt_id: AttemptId, entry: HistoryEntry) -> Result<()>;
    /// Add objective ids. Ids already present keep their first timestamp.
    fn mark_objectives_completed(
        &self,
        attempt_id: AttemptId,
        ids: &[String],
        at: Timestamp,
    ) -> Result<()>;
    /// Close the attempt. A completed attempt is never reopened or re-scored.
    fn mark_attempt_completed(&self, attempt_id: AttemptId, score: u64, at: Timestamp)
    -> Result<()>;
}

/// One command in an attempt's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub command: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedObjective {
    pub objective_id: String,
    pub completed_at: Timestamp,
}

/// One user's run at one challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    pub user_id: String,
    pub challenge_id: String,
    pub command_history: Vec<HistoryEntry>,
    pub objectives_completed: Vec<CompletedObjective>,
    pub completed: bool,
    pub completed_at: Option<Timestamp>,
    pub score: u64,
}

impl Attempt {
    fn new(id: AttemptId, user_id: &str, challenge_id: &str) -> Self {
        Self {
            id,
            user_id: user_id.to_string(),
            challenge_id: challenge_id.to_string(),
            command_history: Vec::new(),
            objectives_completed: Vec::new(),
            completed: false,
            completed_at: None,
            score: 0,
        }
    }

    pub fn completed_ids(&self) -> BTreeSet<String> {
        self.objectives_completed
            .iter()
            .map(|o| o.objective_id.clone())
            .collect()
    }

    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.command_history.iter().map(|h| h.command.as_str())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// User records
// ---------------------------------------------------------------------------

/// Everything stored about one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub score: u64,
    #[serde(default)]
    pub completed_challenges: BTreeSet<String>,
    /// Session slot (challenge id or `general`) -> saved file system.
    #[serde(default)]
    pub filesystems: BTreeMap<String, FilesystemSnapshot>,
}

impl UserRecord {
    fn mark_completed(&mut self, challenge_id: &str) -> bool {
        self.completed_challenges.insert(challenge_id.to_string())
    }

    fn award(&mut self, challenge_id: &str, points: u64) -> Option<u64> {
        if !self.mark_completed(challenge_id) {
            return None;
        }
        self.score = self.score.saturating_add(points);
        Some(self.score)
    }
}

/// Thread-safe in-memory user store.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a user's record (empty if unknown).
    pub fn record(&self, user_id: &str) -> UserRecord {
        lock(&self.users).get(user_id).cloned().unwrap_or_default()
    }
}

impl UserStore for MemoryUserStore {
    fn load_filesystem(&self, key: &SessionKey) -> Result<Option<FilesystemSnapshot>> {
        Ok(lock(&self.users)
            .get(&key.user_id)
            .and_then(|u| u.filesystems.get(key.slot()))
            .cloned())
    }

    fn save_filesystem(&self, key: &SessionKey, snapshot: &FilesystemSnapshot) -> Result<()> {
        lock(&self.users)
            .entry(key.user_id.clone())
            .or_default()
            .filesystems
            .insert(key.slot().to_string(), snapshot.clone());
        Ok(())
    }

    fn load_score(&self, user_id: &str) -> Result<u64> {
        Ok(lock(&self.users).get(user_id).map_or(0, |u| u.score))
    }

    fn add_score(&self, user_id: &str, delta: u64) -> Result<u64> {
        let mut users = lock(&self.users);
        let user = users.entry(user_id.to_string()).or_default();
        user.score = user.score.saturating_add(delta);
        Ok(user.score)
    }

    fn mark_challenge_completed(&self, user_id: &str, challenge_id: &str) -> Result<bool> {
        Ok(lock(&self.users)
            .entry(user_id.to_string())
            .or_default()
            .mark_completed(challenge_id))
    }

    fn award_first_completion(
        &self,
        user_id: &str,
        challenge_id: &str,
        points: u64,
    ) -> Result<Option<u64>> {
        Ok(lock(&self.users)
            .entry(user_id.to_string())
            .or_default()
            .award(challenge_id, points))
    }

    fn completed_challenges(&self, user_id: &str) -> Result<BTreeSet<String>> {
        Ok(lock(&self.users)
            .get(user_id)
            .map(|u| u.completed_challenges.clone())
            .unwrap_or_default())
    }
}

/// User store persisting one `<user>.json` file per user in a directory.
#[derive(Debug)]
pub struct JsonUserStore {
    dir: PathBuf,
    /// Serializes read-modify-write cycles on the files.
    io: Mutex<()>,
}

impl JsonUserStore {
    /// Open (and create if needed) a store directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        log::info!("User store at {}", dir.display());
        Ok(Self {
            dir,
            io: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, user_id: &str) -> Result<PathBuf> {
        let valid = !user_id.is_empty()
            && user_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !user_id.starts_with('.');
        if !valid {
            return Err(HackError::InvalidArgument(format!("invalid user id {user_id:?}")));
        }
        Ok(self.dir.join(format!("{user_id}.json")))
    }

    fn read(&self, user_id: &str) -> Result<UserRecord> {
        let file = self.file_for(user_id)?;
        match std::fs::read_to_string(&file) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(UserRecord::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, user_id: &str, record: &UserRecord) -> Result<()> {
        let file = self.file_for(user_id)?;
        let tmp = file.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(record)?)?;
        std::fs::rename(&tmp, &file)?;
        Ok(())
    }

    fn update<T>(&self, user_id: &str, f: impl FnOnce(&mut UserRecord) -> T) -> Result<T> {
        let _guard = lock(&self.io);
        let mut record = self.read(user_id)?;
        let out = f(&mut record);
        self.write(user_id, &record)?;
        Ok(out)
    }
}

impl UserStore for JsonUserStore {
    fn load_filesystem(&self, key: &SessionKey) -> Result<Option<FilesystemSnapshot>> {
        let _guard = lock(&self.io);
        Ok(self.read(&key.user_id)?.filesystems.remove(key.slot()))
    }

    fn save_filesystem(&self, key: &SessionKey, snapshot: &FilesystemSnapshot) -> Result<()> {
        self.update(&key.user_id, |u| {
            u.filesystems
                .insert(key.slot().to_string(), snapshot.clone());
        })
    }

    fn load_score(&self, user_id: &str) -> Result<u64> {
        let _guard = lock(&self.io);
        Ok(self.read(user_id)?.score)
    }

    fn add_score(&self, user_id: &str, delta: u64) -> Result<u64> {
        self.update(user_id, |u| {
            u.score = u.score.saturating_add(delta);
            u.score
        })
    }

    fn mark_challenge_completed(&self, user_id: &str, challenge_id: &str) -> Result<bool> {
        self.update(user_id, |u| u.mark_completed(challenge_id))
    }

    fn award_first_completion(
        &self,
        user_id: &str,
        challenge_id: &str,
        points: u64,
    ) -> Result<Option<u64>> {
        self.update(user_id, |u| u.award(challenge_id, points))
    }

    fn completed_challenges(&self, user_id: &str) -> Result<BTreeSet<String>> {
        let _guard = lock(&self.io);
        Ok(self.read(user_id)?.completed_challenges)
    }
}

// ---------------------------------------------------------------------------
// Attempts
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct AttemptTable {
    next_id: AttemptId,
    attempts: BTreeMap<AttemptId, Attempt>,
}

impl AttemptTable {
    fn get_mut(&mut self, id: AttemptId) -> Result<&mut Attempt> {
        self.attempts
            .get_mut(&id)
            .ok_or_else(|| HackError::NotFound(format!("attempt {id}")))
    }
}

/// Thread-safe in-memory attempt store.
#[derive(Debug, Default)]
pub struct MemoryAttemptStore {
    table: Mutex<AttemptTable>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All attempts of a user at a challenge, oldest first.
    pub fn attempts_for(&self, user_id: &str, challenge_id: &str) -> Vec<Attempt> {
        lock(&self.table)
            .attempts
            .values()
            .filter(|a| a.user_id == user_id && a.challenge_id == challenge_id)
            .cloned()
            .collect()
    }
}

impl AttemptStore for MemoryAttemptStore {
    fn find_open_attempt(&self, user_id: &str, challenge_id: &str) -> Result<Option<Attempt>> {
        Ok(lock(&self.table)
            .attempts
            .values()
            .rev()
            .find(|a| !a.completed && a.user_id == user_id && a.challenge_id == challenge_id)
            .cloned())
    }

    fn create(&self, user_id: &str, challenge_id: &str) -> Result<Attempt> {
        let mut table = lock(&self.table);
        table.next_id += 1;
        let attempt = Attempt::new(table.next_id, user_id, challenge_id);
        table.attempts.insert(attempt.id, attempt.clone());
        Ok(attempt)
    }

    fn get(&self, attempt_id: AttemptId) -> Result<Option<Attempt>> {
        Ok(lock(&self.table).attempts.get(&attempt_id).cloned())
    }

    fn append_command(&self, attempt_id: AttemptId, entry: HistoryEntry) -> Result<()> {
        lock(&self.table)
            .get_mut(attempt_id)?
            .command_history
            .push(entry);
        Ok(())
    }

    fn mark_objectives_completed(
        &self,
        attempt_id: AttemptId,
        ids: &[String],
        at: Timestamp,
    ) -> Result<()> {
        let mut table = lock(&self.table);
        let attempt = table.get_mut(attempt_id)?;
        for id in ids {
            if !attempt
                .objectives_completed
                .iter()
                .any(|o| &o.objective_id == id)
            {
                attempt.objectives_completed.push(CompletedObjective {
                    objective_id: id.clone(),
                    completed_at: at,
                });
            }
        }
        Ok(())
    }

    fn mark_attempt_completed(
        &self,
        attempt_id: AttemptId,
        score: u64,
        at: Timestamp,
    ) -> Result<()> {
        let mut table = lock(&self.table);
        let attempt = table.get_mut(attempt_id)?;
        if !attempt.completed {
            attempt.completed = true;
            attempt.completed_at = Some(at);
            attempt.score = score;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(user: &str, challenge: Option<&str>) -> SessionKey {
        SessionKey::new(user, challenge)
    }

    fn snapshot_with(dir: &str) -> FilesystemSnapshot {
        let mut snap = FilesystemSnapshot::default();
        snap.entries.insert("/".to_string(), vec![dir.to_string()]);
        snap.entries.insert(format!("/{dir}"), Vec::new());
        snap
    }

    fn exercise_user_store(store: &dyn UserStore) {
        assert!(store.load_filesystem(&key("ada", None)).unwrap().is_none());
        store
            .save_filesystem(&key("ada", Some("intro")), &snapshot_with("intro"))
            .unwrap();
        store
            .save_filesystem(&key("ada", None), &snapshot_with("home"))
            .unwrap();
        assert_eq!(
            store.load_filesystem(&key("ada", Some("intro"))).unwrap(),
            Some(snapshot_with("intro"))
        );
        assert_eq!(
            store.load_filesystem(&key("ada", None)).unwrap(),
            Some(snapshot_with("home"))
        );
        assert!(store.load_filesystem(&key("bob", None)).unwrap().is_none());

        assert_eq!(store.load_score("ada").unwrap(), 0);
        assert_eq!(store.add_score("ada", 50).unwrap(), 50);
        assert_eq!(store.add_score("ada", 25).unwrap(), 75);

        assert!(store.mark_challenge_completed("ada", "intro").unwrap());
        assert!(!store.mark_challenge_completed("ada", "intro").unwrap());
        assert_eq!(
            store.completed_challenges("ada").unwrap(),
            BTreeSet::from(["intro".to_string()])
        );
        assert!(store.completed_challenges("bob").unwrap().is_empty());

        assert_eq!(store.award_first_completion("ada", "breach", 100).unwrap(), Some(175));
        assert_eq!(store.award_first_completion("ada", "breach", 100).unwrap(), None);
        assert_eq!(store.award_first_completion("ada", "intro", 50).unwrap(), None);
        assert_eq!(store.load_score("ada").unwrap(), 175);
        assert!(store.completed_challenges("ada").unwrap().contains("breach"));
    }

    #[test]
    fn memory_user_store() {
        exercise_user_store(&MemoryUserStore::new());
    }

    #[test]
    fn json_user_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonUserStore::open(dir.path()).unwrap();
        exercise_user_store(&store);
        assert!(dir.path().join("ada.json").exists());
    }

    #[test]
    fn json_user_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonUserStore::open(dir.path()).unwrap();
            store.add_score("neo", 10).unwrap();
            store
                .save_filesystem(&key("neo", Some("intro")), &snapshot_with("x"))
                .unwrap();
        }
        let store = JsonUserStore::open(dir.path()).unwrap();
        assert_eq!(store.load_score("neo").unwrap(), 10);
        assert_eq!(
            store.load_filesystem(&key("neo", Some("intro"))).unwrap(),
            Some(snapshot_with("x"))
        );
    }

    #[test]
    fn json_user_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonUserStore::open(dir.path()).unwrap();
        for bad in ["", "../etc", "a/b", ".hidden"] {
            assert!(matches!(
                store.load_score(bad),
                Err(HackError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn json_user_store_corrupt_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("eve.json"), "{not json").unwrap();
        let store = JsonUserStore::open(dir.path()).unwrap();
        let err = store.load_score("eve").unwrap_err();
        assert_eq!(err.kind(), hacksim_types::error::ErrorKind::Unavailable);
    }

    #[test]
    fn open_attempt_lifecycle() {
        let store = MemoryAttemptStore::new();
        assert!(store.find_open_attempt("ada", "intro").unwrap().is_none());
        let a = store.create("ada", "intro").unwrap();
        assert_eq!(
            store.find_open_attempt("ada", "intro").unwrap().map(|x| x.id),
            Some(a.id)
        );
        assert!(store.find_open_attempt("ada", "other").unwrap().is_none());
        assert!(store.find_open_attempt("bob", "intro").unwrap().is_none());

        store.mark_attempt_completed(a.id, 50, 1).unwrap();
        assert!(store.find_open_attempt("ada", "intro").unwrap().is_none());
        let b = store.create("ada", "intro").unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.attempts_for("ada", "intro").len(), 2);
    }

    #[test]
    fn history_and_objectives() {
        let store = MemoryAttemptStore::new();
        let a = store.create("ada", "intro").unwrap();
        store
            .append_command(
                a.id,
                HistoryEntry {
                    command: "ls".to_string(),
                    timestamp: 5,
                },
            )
            .unwrap();
        store
            .mark_objectives_completed(a.id, &["look".to_string()], 5)
            .unwrap();
        store
            .mark_objectives_completed(a.id, &["look".to_string(), "cd".to_string()], 9)
            .unwrap();
        let a = store.get(a.id).unwrap().unwrap();
        assert_eq!(a.commands().collect::<Vec<_>>(), vec!["ls"]);
        assert_eq!(a.objectives_completed.len(), 2);
        assert_eq!(a.objectives_completed[0].completed_at, 5);
        assert_eq!(
            a.completed_ids(),
            BTreeSet::from(["cd".to_string(), "look".to_string()])
        );
    }

    #[test]
    fn completion_is_sticky() {
        let store = MemoryAttemptStore::new();
        let a = store.create("ada", "intro").unwrap();
        store.mark_attempt_completed(a.id, 50, 10).unwrap();
        store.mark_attempt_completed(a.id, 999, 20).unwrap();
        let a = store.get(a.id).unwrap().unwrap();
        assert!(a.completed);
        assert_eq!(a.score, 50);
        assert_eq!(a.completed_at, Some(10));
    }

    #[test]
    fn unknown_attempt_is_not_found() {
        let store = MemoryAttemptStore::new();
        assert!(store.get(42).unwrap().is_none());
        let err = store
            .append_command(
                42,
                HistoryEntry {
                    command: "ls".to_string(),
                    timestamp: 0,
                },
            )
            .unwrap_err();
        assert!(matches!(err, HackError::NotFound(_)));
    }
}
