//! Sharded session supervisor.
//!
//! This is the outside-world facing orchestration layer around `formfill_core`:
//! - owns every `MappingSession`, keyed by session id
//! - serializes operations per session (one shard lock at a time)
//! - picks the `MappingEngine` for a session's form template
//! - exports/imports session records for storage-agnostic persistence
//!
//! No IO. No async. Concurrency is achieved by sharding sessions by id.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use formfill_core::{Entity, FieldDescriptor, MappingEngine};

use crate::adapter::FormRenderer;
use crate::session::{
    Choice, ConfirmOutcome, FinalizeOutcome, MappingSession, SessionError, SessionId, SessionState, SessionView,
};

/// Snapshot of supervisor state for storage-agnostic persistence.
///
/// This is intentionally pure data: callers decide how/where to store it.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct SupervisorSnapshot {
    /// Session records, sorted by id.
    pub sessions: Vec<MappingSession>,
}

/// Simple observability counters returned by restore/import operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RestoreStats {
    /// Number of sessions applied from the snapshot/iterator.
    pub applied: usize,
    /// Number of existing sessions that were overwritten.
    pub overwritten: usize,
}

/// Everything `start_session` needs.
#[derive(Clone, Debug, Default)]
pub struct SessionRequest {
    pub entities: Vec<Entity>,
    pub fields: Vec<FieldDescriptor>,
    /// Anchor for relative dates ("yesterday"). Defaults to today (UTC).
    pub reference_date: Option<NaiveDate>,
    /// Form template name, used to pick a tuned engine.
    pub template: Option<String>,
}

#[derive(Default, Debug)]
struct Shard {
    sessions: HashMap<SessionId, MappingSession>,
}

/// Deterministic FNV-1a hash (stable across runs).
fn fnv1a_u64(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in bytes {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

fn shard_index(id: &SessionId, shard_count: usize) -> usize {
    if shard_count <= 1 {
        return 0;
    }
    (fnv1a_u64(id.as_bytes()) as usize) % shard_count
}

/// A sharded supervisor. One session is one `(session_id -> MappingSession)` entry.
///
/// `shards == 1` behaves like a single-threaded supervisor. Sessions never
/// share mutable state, so more shards only reduce lock contention.
#[derive(Debug)]
pub struct SessionSupervisor {
    engine: Arc<MappingEngine>,
    /// Per-template engine overrides.
    overrides: HashMap<String, Arc<MappingEngine>>,
    shards: usize,
    // NOTE: Sessions are behind a Mutex for interior mutability. This crate does not spawn
    // threads; wrap the supervisor in an `Arc` to share it.
    session_shards: Vec<Mutex<Shard>>,
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new(1, MappingEngine::default())
    }
}

impl SessionSupervisor {
    /// Create a supervisor with `shards` (concurrency count). `shards=1` is the default.
    pub fn new(shards: usize, engine: MappingEngine) -> Self {
        let shards = shards.max(1);
        let mut session_shards = Vec::with_capacity(shards);
        for _ in 0..shards {
            session_shards.push(Mutex::new(Shard::default()));
        }

        Self {
            engine: Arc::new(engine),
            overrides: HashMap::new(),
            shards,
            session_shards,
        }
    }

    /// Use a differently tuned engine for sessions opened with `template`.
    pub fn set_template_engine(&mut self, template: impl Into<String>, engine: MappingEngine) {
        self.overrides.insert(template.into(), Arc::new(engine));
    }

    pub fn clear_template_engine(&mut self, template: &str) {
        self.overrides.remove(template);
    }

    fn engine_for(&self, template: Option<&str>) -> &MappingEngine {
        template
            .and_then(|t| self.overrides.get(t))
            .unwrap_or(&self.engine)
    }

    fn shard_for(&self, id: &SessionId) -> MutexGuard<'_, Shard> {
        let idx = shard_index(id, self.shards);
        self.session_shards[idx]
            .lock()
            .expect("session supervisor shard mutex poisoned")
    }

    /// Run `op` against one session under its shard lock.
    fn with_session<T>(
        &self,
        id: SessionId,
        op: impl FnOnce(&MappingEngine, &mut MappingSession) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let mut guard = self.shard_for(&id);
        let session = guard.sessions.get_mut(&id).ok_or(SessionError::UnknownSession(id))?;
        let engine = self.engine_for(session.template());
        op(engine, session)
    }

    /// Create an Idle session over `fields`; entities arrive later through
    /// `supply_entities`.
    pub fn open_session(
        &self,
        fields: Vec<FieldDescriptor>,
        reference_date: Option<NaiveDate>,
        template: Option<String>,
    ) -> Result<SessionId, SessionError> {
        let id = Uuid::new_v4();
        let reference_date = reference_date.unwrap_or_else(|| Utc::now().date_naive());
        let session = MappingSession::open(id, fields, reference_date, template).inspect_err(|e| {
            tracing::warn!(error = %e, "session rejected");
        })?;
        tracing::info!(session = %id, fields = session.fields().len(), "session opened");
        self.shard_for(&id).sessions.insert(id, session);
        Ok(id)
    }

    /// Create a session and run it through extraction and mapping.
    ///
    /// A `SchemaError` in either set rejects the request; no session is kept.
    pub fn start_session(&self, req: SessionRequest) -> Result<SessionId, SessionError> {
        let id = Uuid::new_v4();
        let reference_date = req.reference_date.unwrap_or_else(|| Utc::now().date_naive());
        let engine = self.engine_for(req.template.as_deref());
        let session = MappingSession::open(id, req.fields, reference_date, req.template.clone())
            .and_then(|mut s| s.supply_entities(engine, req.entities).map(|_| s))
            .inspect_err(|e| tracing::warn!(error = %e, "session rejected"))?;
        tracing::info!(session = %id, state = ?session.state(), "session started");
        self.shard_for(&id).sessions.insert(id, session);
        Ok(id)
    }

    pub fn supply_entities(&self, id: SessionId, entities: Vec<Entity>) -> Result<SessionView, SessionError> {
        self.with_session(id, |engine, s| {
            s.supply_entities(engine, entities)?;
            Ok(s.view())
        })
    }

    pub fn get_state(&self, id: SessionId) -> Result<SessionView, SessionError> {
        self.with_session(id, |_, s| Ok(s.view()))
    }

    pub fn apply_edit(&self, id: SessionId, field_id: &str, value: &str) -> Result<SessionView, SessionError> {
        self.with_session(id, |engine, s| {
            s.apply_edit(engine, field_id, value)?;
            Ok(s.view())
        })
    }

    pub fn resolve_clarification(
        &self,
        id: SessionId,
        clarification_id: &str,
        choice: Choice,
    ) -> Result<SessionView, SessionError> {
        self.with_session(id, |engine, s| {
            s.resolve_clarification(engine, clarification_id, choice)?;
            Ok(s.view())
        })
    }

    pub fn confirm(&self, id: SessionId) -> Result<ConfirmOutcome, SessionError> {
        self.with_session(id, |engine, s| s.confirm(engine))
    }

    pub fn finalize<R: FormRenderer + ?Sized>(&self, id: SessionId, renderer: &R) -> Result<FinalizeOutcome, SessionError> {
        self.with_session(id, |_, s| s.finalize(renderer))
    }

    pub fn cancel(&self, id: SessionId) -> Result<SessionView, SessionError> {
        self.with_session(id, |_, s| {
            s.cancel()?;
            Ok(s.view())
        })
    }

    /// Forget a session entirely (after it has been archived elsewhere).
    pub fn remove_session(&self, id: SessionId) -> Option<MappingSession> {
        self.shard_for(&id).sessions.remove(&id)
    }

    /// All session ids, sorted.
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut out = Vec::new();
        for shard in &self.session_shards {
            let guard = shard.lock().expect("session supervisor shard mutex poisoned");
            out.extend(guard.sessions.keys().copied());
        }
        out.sort();
        out
    }

    /// Export every session record as a plain snapshot.
    ///
    /// Deterministic ordering: sessions are returned sorted by id.
    pub fn snapshot(&self) -> SupervisorSnapshot {
        self.snapshot_filtered(|_| true)
    }

    /// Export a snapshot filtered by a caller-provided predicate, e.g. only
    /// sessions that are still open.
    pub fn snapshot_filtered<F>(&self, mut predicate: F) -> SupervisorSnapshot
    where
        F: FnMut(&MappingSession) -> bool,
    {
        let mut out: Vec<MappingSession> = Vec::new();

        // Lock shards in a stable order.
        for shard in &self.session_shards {
            let guard = shard.lock().expect("session supervisor shard mutex poisoned");
            out.extend(guard.sessions.values().filter(|s| predicate(s)).cloned());
        }

        out.sort_by_key(|s| s.id());
        SupervisorSnapshot { sessions: out }
    }

    pub fn snapshot_sessions(&self, ids: &[SessionId]) -> SupervisorSnapshot {
        let want: HashSet<SessionId> = ids.iter().copied().collect();
        self.snapshot_filtered(|s| want.contains(&s.id()))
    }

    /// Sessions not yet Finalized or Rejected.
    pub fn snapshot_open(&self) -> SupervisorSnapshot {
        self.snapshot_filtered(|s| !s.state().is_terminal())
    }

    /// Replace all sessions with the snapshot's.
    ///
    /// Restored sessions carry no scored candidates; they are rebuilt on the next pass.
    pub fn restore(&self, snap: SupervisorSnapshot) -> RestoreStats {
        for shard in &self.session_shards {
            shard
                .lock()
                .expect("session supervisor shard mutex poisoned")
                .sessions
                .clear();
        }
        self.restore_merge(snap)
    }

    /// Merge a snapshot into the current sessions. Snapshot entries overwrite
    /// sessions with the same id; everything else is kept.
    pub fn restore_merge(&self, snap: SupervisorSnapshot) -> RestoreStats {
        let mut stats = RestoreStats::default();
        for session in snap.sessions {
            let id = session.id();
            if self.shard_for(&id).sessions.insert(id, session).is_some() {
                stats.overwritten += 1;
            }
            stats.applied += 1;
        }
        tracing::info!(applied = stats.applied, overwritten = stats.overwritten, "sessions restored");
        stats
    }

    /// Count of sessions per state, for monitoring. Ordered by state.
    pub fn state_counts(&self) -> Vec<(SessionState, usize)> {
        let mut counts: BTreeMap<SessionState, usize> = BTreeMap::new();
        for shard in &self.session_shards {
            let guard = shard.lock().expect("session supervisor shard mutex poisoned");
            for s in guard.sessions.values() {
                *counts.entry(s.state()).or_default() += 1;
            }
        }
        counts.into_iter().collect()
    }
}
