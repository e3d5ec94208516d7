//! Session cache and the command execution entry point.
//!
//! Each `(user, challenge)` pair owns one slot guarded by its own mutex, so
//! commands for the same key run one at a time while different keys run in
//! parallel. The outer map lock is only held long enough to find or insert
//! a slot. Eviction marks a slot dead under its lock before unlinking it,
//! and a caller that wakes up holding a dead slot retries with a fresh one.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use hacksim_terminal::{CommandRegistry, CommandResult, Environment, register_builtins};
use hacksim_types::config::EngineConfig;
use hacksim_types::error::{ErrorKind, HackError, Result};
use hacksim_types::time::{Timestamp, now_millis};
use hacksim_vfs::{FilesystemSnapshot, VirtualFilesystem, path};
use serde::Serialize;

use crate::catalog::{Challenge, ChallengeCatalog};
use crate::evaluator;
use crate::objective::EvalContext;
use crate::store::{Attempt, AttemptId, AttemptStore, HistoryEntry, UserStore};

/// Slot name for sessions outside any challenge.
pub const GENERAL_SLOT: &str = "general";

/// Identity of a cached session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKey {
    pub user_id: String,
    pub challenge_id: Option<String>,
}

impl SessionKey {
    pub fn new(user_id: &str, challenge_id: Option<&str>) -> Self {
        Self {
            user_id: user_id.to_string(),
            challenge_id: challenge_id.map(str::to_string),
        }
    }

    /// The challenge id, or [`GENERAL_SLOT`].
    pub fn slot(&self) -> &str {
        self.challenge_id.as_deref().unwrap_or(GENERAL_SLOT)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.slot())
    }
}

/// One command request, as received from the transport layer.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteRequest<'a> {
    pub user_id: &'a str,
    pub command: &'a str,
    /// Directory the client believes it is in. Ignored unless it exists.
    pub current_directory: Option<&'a str>,
    pub challenge_id: Option<&'a str>,
    /// Grade against this attempt instead of the open one.
    pub attempt_id: Option<AttemptId>,
}

impl<'a> ExecuteRequest<'a> {
    pub fn new(user_id: &'a str, command: &'a str) -> Self {
        Self {
            user_id,
            command,
            current_directory: None,
            challenge_id: None,
            attempt_id: None,
        }
    }

    pub fn in_challenge(mut self, challenge_id: &'a str) -> Self {
        self.challenge_id = Some(challenge_id);
        self
    }

    pub fn from_directory(mut self, dir: &'a str) -> Self {
        self.current_directory = Some(dir);
        self
    }

    pub fn with_attempt(mut self, attempt_id: AttemptId) -> Self {
        self.attempt_id = Some(attempt_id);
        self
    }
}

/// Everything returned for one executed line.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    #[serde(flatten)]
    pub result: CommandResult,
    /// Objective ids completed by this line, in catalog order.
    pub objectives_completed: Vec<String>,
    pub all_objectives_completed: bool,
    /// Points added to the user's score by this line.
    pub score_awarded: u64,
    pub attempt_id: Option<AttemptId>,
    /// The file system after the command.
    pub filesystem: FilesystemSnapshot,
}

/// Read-only copy of a cached session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub key: SessionKey,
    pub current_directory: String,
    pub attempt_id: Option<AttemptId>,
    pub filesystem: FilesystemSnapshot,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveStatus {
    pub id: String,
    pub description: String,
    pub completed: bool,
}

/// A user's standing in one challenge.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub challenge_id: String,
    pub title: String,
    pub points: u64,
    pub hints: Vec<String>,
    pub objectives: Vec<ObjectiveStatus>,
    pub attempt_id: AttemptId,
    pub completed: bool,
    pub user_score: u64,
}

/// Attempt state mirrored into the session.
struct ActiveAttempt {
    id: AttemptId,
    /// Most recent commands, bounded by `max_history`.
    history: Vec<String>,
    completed_ids: BTreeSet<String>,
    completed: bool,
}

struct Session {
    key: SessionKey,
    challenge: Option<Arc<Challenge>>,
    vfs: VirtualFilesystem,
    current_directory: String,
    attempt: Option<ActiveAttempt>,
    last_accessed: Instant,
}

#[derive(Default)]
struct SessionSlot {
    session: Option<Session>,
    /// Set by the sweeper once the slot is unlinked from the map.
    evicted: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reclassify a store failure as `Unavailable`.
fn store<T>(result: Result<T>) -> Result<T> {
    result.map_err(|e| {
        log::warn!("Store call failed: {e}");
        match e.kind() {
            ErrorKind::Unavailable => e,
            _ => HackError::Unavailable(e.to_string()),
        }
    })
}

/// Owns the session cache and routes commands through the interpreter and
/// the objective evaluator.
pub struct SessionManager {
    config: EngineConfig,
    registry: CommandRegistry,
    catalog: Arc<dyn ChallengeCatalog>,
    users: Arc<dyn UserStore>,
    attempts: Arc<dyn AttemptStore>,
    sessions: Mutex<HashMap<SessionKey, Arc<Mutex<SessionSlot>>>>,
}

impl SessionManager {
    pub fn new(
        config: EngineConfig,
        catalog: Arc<dyn ChallengeCatalog>,
        users: Arc<dyn UserStore>,
        attempts: Arc<dyn AttemptStore>,
    ) -> Self {
        let mut registry = CommandRegistry::new();
        register_builtins(&mut registry);
        Self {
            config,
            registry,
            catalog,
            users,
            attempts,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of cached sessions.
    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Load (or reuse) the session for a key and return a copy of it.
    pub fn get_or_create(&self, user_id: &str, challenge_id: Option<&str>) -> Result<SessionView> {
        let key = SessionKey::new(user_id, challenge_id);
        self.with_session(&key, None, |_, session| {
            session.last_accessed = Instant::now();
            Ok(SessionView {
                key: session.key.clone(),
                current_directory: session.current_directory.clone(),
                attempt_id: session.attempt.as_ref().map(|a| a.id),
                filesystem: session.vfs.snapshot(),
            })
        })
    }

    /// Execute one input line.
    ///
    /// Command failures are reported inside the response. `Err` is returned
    /// for unknown challenges, foreign attempt ids, and store faults; after a
    /// store fault the cached session is dropped so the next call reloads
    /// persisted state.
    pub fn execute(&self, req: ExecuteRequest<'_>) -> Result<ExecuteResponse> {
        let key = SessionKey::new(req.user_id, req.challenge_id);
        self.with_session(&key, req.attempt_id, |mgr, session| mgr.run(session, &req))
    }

    /// Objectives, hints and completion state for a challenge.
    pub fn progress(&self, user_id: &str, challenge_id: &str) -> Result<Progress> {
        let key = SessionKey::new(user_id, Some(challenge_id));
        let progress = self.with_session(&key, None, |_, session| {
            let (Some(challenge), Some(attempt)) = (&session.challenge, &session.attempt) else {
                return Err(HackError::NotFound(format!("challenge {challenge_id}")));
            };
            Ok(Progress {
                challenge_id: challenge.id.clone(),
                title: challenge.title.clone(),
                points: challenge.points,
                hints: challenge.hints.clone(),
                objectives: challenge
                    .objectives
                    .iter()
                    .map(|o| ObjectiveStatus {
                        id: o.id.clone(),
                        description: o.description.clone(),
                        completed: attempt.completed_ids.contains(&o.id),
                    })
                    .collect(),
                attempt_id: attempt.id,
                completed: attempt.completed,
                user_score: 0,
            })
        })?;
        let user_score = store(self.users.load_score(user_id))?;
        Ok(Progress {
            user_score,
            ..progress
        })
    }

    /// Restore a challenge's initial file system for a user.
    ///
    /// The cached session is dropped; the next request starts from the
    /// initial files, on the open attempt or on a new one if the last
    /// attempt was completed.
    pub fn reset(&self, user_id: &str, challenge_id: &str) -> Result<()> {
        let challenge = self
            .catalog
            .get(challenge_id)?
            .ok_or_else(|| HackError::NotFound(format!("challenge {challenge_id}")))?;
        let key = SessionKey::new(user_id, Some(challenge_id));
        let initial = challenge.initial_vfs()?.snapshot();
        self.with_slot(&key, |slot| {
            slot.session = None;
            store(self.users.save_filesystem(&key, &initial))
        })?;
        log::info!("Session {key} reset to initial files");
        Ok(())
    }

    /// Evict every session idle for longer than the configured timeout.
    ///
    /// Returns the number of slots removed.
    pub fn sweep_idle_at(&self, now: Instant) -> usize {
        let idle = Duration::from_secs(self.config.session_idle_timeout_secs);
        let candidates: Vec<(SessionKey, Arc<Mutex<SessionSlot>>)> = lock(&self.sessions)
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();

        let mut evicted = 0;
        for (key, slot) in candidates {
            let mut guard = lock(&slot);
            if guard.evicted {
                continue;
            }
            let stale = guard
                .session
                .as_ref()
                .is_none_or(|s| now.saturating_duration_since(s.last_accessed) > idle);
            if !stale {
                continue;
            }
            guard.evicted = true;
            guard.session = None;
            let mut sessions = lock(&self.sessions);
            if sessions.get(&key).is_some_and(|cur| Arc::ptr_eq(cur, &slot)) {
                sessions.remove(&key);
            }
            evicted += 1;
            log::info!("Evicted idle session {key}");
        }
        evicted
    }

    /// Run [`Self::sweep_idle_at`] every `sweep_interval_secs` on a
    /// background thread.
    pub fn spawn_sweeper(self: &Arc<Self>) -> Result<SweeperHandle> {
        self.spawn_sweeper_every(Duration::from_secs(self.config.sweep_interval_secs))
    }

    /// Like [`Self::spawn_sweeper`] with an explicit interval.
    pub fn spawn_sweeper_every(self: &Arc<Self>, interval: Duration) -> Result<SweeperHandle> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let manager: Weak<Self> = Arc::downgrade(self);
        let thread = std::thread::Builder::new()
            .name("session-sweeper".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let Some(manager) = manager.upgrade() else {
                                break;
                            };
                            let n = manager.sweep_idle_at(Instant::now());
                            log::debug!("Sweep evicted {n} sessions");
                        },
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;
        log::info!("Session sweeper running every {}s", interval.as_secs());
        Ok(SweeperHandle {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    // -- internals --

    fn slot_for(&self, key: &SessionKey) -> Arc<Mutex<SessionSlot>> {
        Arc::clone(lock(&self.sessions).entry(key.clone()).or_default())
    }

    /// Run `f` with the key's slot locked, retrying if the slot was evicted
    /// while we waited for it.
    fn with_slot<T>(
        &self,
        key: &SessionKey,
        f: impl FnOnce(&mut SessionSlot) -> Result<T>,
    ) -> Result<T> {
        loop {
            let slot = self.slot_for(key);
            let mut guard = lock(&slot);
            if guard.evicted {
                continue;
            }
            return f(&mut guard);
        }
    }

    fn with_session<T>(
        &self,
        key: &SessionKey,
        attempt_id: Option<AttemptId>,
        f: impl FnOnce(&Self, &mut Session) -> Result<T>,
    ) -> Result<T> {
        self.with_slot(key, |slot| {
            let session = match slot.session.take() {
                Some(session) => session,
                None => self.load_session(key, attempt_id)?,
            };
            let session = slot.session.insert(session);
            let result = self
                .rebind_attempt(session, attempt_id)
                .and_then(|()| f(self, session));
            if let Err(e) = &result
                && e.kind() == ErrorKind::Unavailable
            {
                log::warn!("Dropping session {key} after store fault");
                slot.session = None;
            }
            result
        })
    }

    fn load_session(&self, key: &SessionKey, attempt_id: Option<AttemptId>) -> Result<Session> {
        let challenge = match &key.challenge_id {
            Some(id) => Some(
                self.catalog
                    .get(id)?
                    .ok_or_else(|| HackError::NotFound(format!("challenge {id}")))?,
            ),
            None => None,
        };
        if challenge.is_none() && attempt_id.is_some() {
            return Err(HackError::InvalidArgument(
                "attempts require a challenge".to_string(),
            ));
        }

        let vfs = match store(self.users.load_filesystem(key))? {
            Some(snapshot) => store(VirtualFilesystem::from_snapshot(snapshot))?,
            None => match &challenge {
                Some(c) => c.initial_vfs()?,
                None => VirtualFilesystem::new(),
            },
        };

        let attempt = match &challenge {
            Some(c) => Some(self.active_attempt(key, &c.id, attempt_id)?),
            None => None,
        };

        log::info!("Session {key} created");
        Ok(Session {
            key: key.clone(),
            challenge,
            vfs,
            current_directory: path::ROOT.to_string(),
            attempt,
            last_accessed: Instant::now(),
        })
    }

    /// Switch a cached session to an explicitly requested attempt.
    fn rebind_attempt(&self, session: &mut Session, attempt_id: Option<AttemptId>) -> Result<()> {
        let Some(id) = attempt_id else {
            return Ok(());
        };
        if session.attempt.as_ref().is_some_and(|a| a.id == id) {
            return Ok(());
        }
        let Some(challenge) = &session.challenge else {
            return Err(HackError::InvalidArgument(
                "attempts require a challenge".to_string(),
            ));
        };
        let attempt = self.active_attempt(&session.key, &challenge.id, Some(id))?;
        session.attempt = Some(attempt);
        Ok(())
    }

    /// The requested attempt, else the open one, else a new one.
    fn active_attempt(
        &self,
        key: &SessionKey,
        challenge_id: &str,
        attempt_id: Option<AttemptId>,
    ) -> Result<ActiveAttempt> {
        let attempt = match attempt_id {
            Some(id) => {
                let attempt = store(self.attempts.get(id))?
                    .ok_or_else(|| HackError::NotFound(format!("attempt {id}")))?;
                if attempt.user_id != key.user_id || attempt.challenge_id != challenge_id {
                    return Err(HackError::InvalidArgument(format!(
                        "attempt {id} does not belong to {key}"
                    )));
                }
                attempt
            },
            None => match store(self.attempts.find_open_attempt(&key.user_id, challenge_id))? {
                Some(attempt) => attempt,
                None => {
                    let attempt = store(self.attempts.create(&key.user_id, challenge_id))?;
                    log::info!("Created attempt {} for {key}", attempt.id);
                    attempt
                },
            },
        };
        Ok(self.mirror(attempt))
    }

    fn mirror(&self, attempt: Attempt) -> ActiveAttempt {
        let completed_ids = attempt.completed_ids();
        let mut history: Vec<String> = attempt.commands().map(str::to_string).collect();
        self.trim_history(&mut history);
        ActiveAttempt {
            id: attempt.id,
            history,
            completed_ids,
            completed: attempt.completed,
        }
    }

    fn trim_history(&self, history: &mut Vec<String>) {
        if let Some(max) = self.config.max_history
            && history.len() > max
        {
            history.drain(..history.len() - max);
        }
    }

    fn run(&self, session: &mut Session, req: &ExecuteRequest<'_>) -> Result<ExecuteResponse> {
        if let Some(dir) = req.current_directory {
            if session.vfs.is_dir(dir) {
                session.current_directory = dir.to_string();
            } else {
                log::debug!("Ignoring unknown client directory {dir}");
            }
        }

        let mut env = Environment {
            cwd: session.current_directory.clone(),
            vfs: &mut session.vfs,
            config: &self.config.terminal,
        };
        let outcome = self.registry.execute(req.command, &mut env);
        session.current_directory = env.cwd;
        session.last_accessed = Instant::now();

        store(self.users.save_filesystem(&session.key, &session.vfs.snapshot()))?;

        let mut objectives_completed = Vec::new();
        let mut score_awarded = 0;
        if let (Some(challenge), Some(attempt)) = (&session.challenge, &mut session.attempt) {
            for executed in &outcome.executed {
                let now = now_millis();
                store(self.attempts.append_command(
                    attempt.id,
                    HistoryEntry {
                        command: executed.command.clone(),
                        timestamp: now,
                    },
                ))?;
                attempt.history.push(executed.command.clone());
                self.trim_history(&mut attempt.history);
                if attempt.completed {
                    continue;
                }

                let ctx = EvalContext {
                    command: &executed.command,
                    history: &attempt.history,
                    cwd: &executed.result.new_directory,
                    vfs: &session.vfs,
                };
                let grade = evaluator::grade(&ctx, &challenge.objectives, &attempt.completed_ids);
                if !grade.newly_completed.is_empty() {
                    store(self.attempts.mark_objectives_completed(
                        attempt.id,
                        &grade.newly_completed,
                        now,
                    ))?;
                    for id in &grade.newly_completed {
                        log::info!("{} completed objective {id}", session.key);
                    }
                    attempt
                        .completed_ids
                        .extend(grade.newly_completed.iter().cloned());
                    objectives_completed.extend(grade.newly_completed);
                }
                if grade.all_completed {
                    score_awarded = self.finish_attempt(&session.key, challenge, attempt, now)?;
                }
            }
        }

        Ok(ExecuteResponse {
            result: outcome.result,
            objectives_completed,
            all_objectives_completed: session.attempt.as_ref().is_some_and(|a| a.completed),
            score_awarded,
            attempt_id: session.attempt.as_ref().map(|a| a.id),
            filesystem: session.vfs.snapshot(),
        })
    }

    /// Close the attempt and award points on the user's first completion.
    fn finish_attempt(
        &self,
        key: &SessionKey,
        challenge: &Challenge,
        attempt: &mut ActiveAttempt,
        now: Timestamp,
    ) -> Result<u64> {
        store(self.attempts.mark_attempt_completed(attempt.id, challenge.points, now))?;
        attempt.completed = true;
        let awarded = self.users.award_first_completion(
            &key.user_id,
            &challenge.id,
            challenge.points,
        );
        let Some(total) = store(awarded)? else {
            log::info!("{key} replayed {}; no points awarded", challenge.id);
            return Ok(0);
        };
        log::info!(
            "{key} completed {} (+{} points, total {total})",
            challenge.id,
            challenge.points
        );
        Ok(challenge.points)
    }
}

/// Stops the background sweeper when dropped.
pub struct SweeperHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for its thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::warn!("Session sweeper panicked");
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_slot_and_display() {
        let general = SessionKey::new("ada", None);
        assert_eq!(general.slot(), GENERAL_SLOT);
        assert_eq!(general.to_string(), "ada/general");
        let challenge = SessionKey::new("ada", Some("intro"));
        assert_eq!(challenge.slot(), "intro");
        assert_ne!(general, challenge);
    }

    #[test]
    fn store_errors_become_unavailable() {
        let err = store::<()>(Err(HackError::NotFound("attempt 9".to_string()))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        let io = std::io::Error::other("disk gone");
        let err = store::<()>(Err(io.into())).unwrap_err();
        assert!(matches!(err, HackError::Io(_)));
    }

    #[test]
    fn request_builder() {
        let req = ExecuteRequest::new("ada", "ls")
            .in_challenge("intro")
            .from_directory("/missions")
            .with_attempt(3);
        assert_eq!(req.challenge_id, Some("intro"));
        assert_eq!(req.current_directory, Some("/missions"));
        assert_eq!(req.attempt_id, Some(3));
    }
}
