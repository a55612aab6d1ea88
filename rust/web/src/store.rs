//! Storage ports for session state and seat assignments, plus the
//! in-process backends. The remote REST backends live in [`crate::remote`];
//! which backend is constructed is decided once, in [`crate::server`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::rules::Side;
use crate::seats::SeatAssignment;

pub type SessionId = String;

/// One accepted move, kept for replay and move-list display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub uci: String,
    pub san: String,
}

/// The persisted session record. `status` is deliberately absent: it is
/// derived from `position` by the rules engine on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    /// Opaque encoded position; only the rules engine interprets it
    pub position: String,
    pub turn_owner: Side,
    /// Count of accepted moves; the optimistic-concurrency token
    pub version: u64,
    #[serde(default)]
    pub moves: Vec<MoveRecord>,
    /// Unix milliseconds of the last write. Observability only: never part
    /// of change detection.
    pub updated_at: i64,
}

impl Session {
    pub fn new(id: impl Into<SessionId>, position: impl Into<String>) -> Self {
        Session {
            id: id.into(),
            position: position.into(),
            turn_owner: Side::First,
            version: 0,
            moves: Vec::new(),
            updated_at: now_millis(),
        }
    }

    /// Refresh `updated_at`. Callers do this before every save.
    pub fn touch(&mut self) {
        self.updated_at = now_millis();
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached at all
    #[error("Backend request failed: {0}")]
    Transport(String),
    /// The backend answered with a non-success status
    #[error("Backend returned status {status}: {detail}")]
    Backend { status: u16, detail: String },
    /// A stored record could not be encoded or decoded
    #[error("Stored record is not valid JSON: {0}")]
    Corrupt(String),
}

/// Port for session records. Implementations never interpret `position`
/// and offer no compare-and-set; concurrency control sits above this layer.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist a new session. Creating an id that already exists is a
    /// no-op returning the existing record.
    async fn create(&self, session: Session) -> Result<Session, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError>;

    /// Unconditional whole-record overwrite.
    async fn save(&self, session: &Session) -> Result<(), StoreError>;

    /// Drop sessions whose last write is older than `ttl`, returning the
    /// removed ids. Backends with native key expiry keep the no-op default.
    async fn purge_expired(&self, ttl: Duration) -> Result<Vec<SessionId>, StoreError> {
        let _ = ttl;
        Ok(Vec::new())
    }
}

/// Port for seat assignments. Reads and writes move the whole assignment;
/// the registry itself guarantees nothing about concurrent writers.
#[async_trait]
pub trait SeatRegistry: Send + Sync {
    /// Current assignment, empty when nothing was ever bound.
    async fn get(&self, id: &str) -> Result<SeatAssignment, StoreError>;

    async fn put(&self, id: &str, assignment: &SeatAssignment) -> Result<(), StoreError>;

    /// Forget assignments for sessions that no longer exist. No-op default
    /// for backends whose keys expire on their own.
    async fn forget(&self, ids: &[SessionId]) -> Result<(), StoreError> {
        let _ = ids;
        Ok(())
    }
}

/// Process-local session store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn create(&self, session: Session) -> Result<Session, StoreError> {
        let mut guard = self.sessions.write().await;
        let stored = guard.entry(session.id.clone()).or_insert(session);
        Ok(stored.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let guard = self.sessions.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let mut guard = self.sessions.write().await;
        guard.insert(session.id.clone(), session.clone());
        Ok(())
    }

    /// Gives the in-process backend the same lifecycle as the remote
    /// backend's key TTL.
    async fn purge_expired(&self, ttl: Duration) -> Result<Vec<SessionId>, StoreError> {
        let cutoff = now_millis() - ttl.as_millis() as i64;
        let mut purged = Vec::new();
        let mut guard = self.sessions.write().await;
        guard.retain(|id, session| {
            if session.updated_at < cutoff {
                purged.push(id.clone());
                false
            } else {
                true
            }
        });
        if !purged.is_empty() {
            tracing::debug!(count = purged.len(), "purged expired sessions");
        }
        Ok(purged)
    }
}

/// Process-local seat registry.
#[derive(Debug, Default)]
pub struct MemorySeatStore {
    seats: RwLock<HashMap<SessionId, SeatAssignment>>,
}

impl MemorySeatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SeatRegistry for MemorySeatStore {
    async fn get(&self, id: &str) -> Result<SeatAssignment, StoreError> {
        let guard = self.seats.read().await;
        Ok(guard.get(id).cloned().unwrap_or_default())
    }

    async fn put(&self, id: &str, assignment: &SeatAssignment) -> Result<(), StoreError> {
        let mut guard = self.seats.write().await;
        guard.insert(id.to_string(), assignment.clone());
        Ok(())
    }

    async fn forget(&self, ids: &[SessionId]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut guard = self.seats.write().await;
        for id in ids {
            guard.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seats::{SeatHolder, SeatRole};

    #[tokio::test]
    async fn create_is_idempotent_per_id() {
        let store = MemoryStateStore::new();
        let first = store
            .create(Session::new("s-1", "start"))
            .await
            .expect("create");

        let mut replacement = Session::new("s-1", "something else");
        replacement.version = 9;
        let second = store.create(replacement).await.expect("create again");

        assert_eq!(second, first);
        assert_eq!(second.position, "start");
        assert_eq!(second.version, 0);
    }

    #[tokio::test]
    async fn get_and_save_round_trip() {
        let store = MemoryStateStore::new();
        assert!(store.get("missing").await.expect("get").is_none());

        let mut session = store
            .create(Session::new("s-2", "start"))
            .await
            .expect("create");
        session.version = 1;
        session.moves.push(MoveRecord {
            uci: "e2e4".into(),
            san: "e4".into(),
        });
        session.touch();
        store.save(&session).await.expect("save");

        let loaded = store.get("s-2").await.expect("get").expect("present");
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.moves.len(), 1);
    }

    #[tokio::test]
    async fn purge_removes_only_stale_sessions() {
        let store = MemoryStateStore::new();
        let mut stale = Session::new("stale", "start");
        stale.updated_at = now_millis() - 10_000;
        store.save(&stale).await.expect("save stale");
        store
            .create(Session::new("fresh", "start"))
            .await
            .expect("create fresh");

        let purged = store
            .purge_expired(Duration::from_secs(5))
            .await
            .expect("purge");
        assert_eq!(purged, vec!["stale".to_string()]);
        assert!(store.get("stale").await.expect("get").is_none());
        assert!(store.get("fresh").await.expect("get").is_some());

        let seats = MemorySeatStore::new();
        let mut assignment = SeatAssignment::default();
        assignment.first = Some(SeatHolder::new("stale-player", None));
        seats.put("stale", &assignment).await.expect("put");
        seats.forget(&purged).await.expect("forget");
        assert_eq!(seats.get("stale").await.expect("get"), SeatAssignment::default());
    }

    /// The registry alone is not safe against racing binders: two requests
    /// that both read the empty assignment before either writes back will
    /// both claim the first seat, and the later put erases the earlier one.
    /// [`crate::session::SessionService`] closes this window by serializing
    /// every read-bind-write cycle through its per-session lock.
    #[tokio::test]
    async fn unsynchronized_binds_lose_the_earlier_claim() {
        let seats = MemorySeatStore::new();

        let mut seen_by_a = seats.get("s-race").await.expect("get");
        let mut seen_by_b = seats.get("s-race").await.expect("get");

        assert_eq!(seen_by_a.bind("alice-1234", None).role, SeatRole::First);
        seats.put("s-race", &seen_by_a).await.expect("put first claim");

        assert_eq!(seen_by_b.bind("bob-99999", None).role, SeatRole::First);
        seats.put("s-race", &seen_by_b).await.expect("put second claim");

        let stored = seats.get("s-race").await.expect("get");
        assert_eq!(
            stored.first.as_ref().map(|h| h.identity.as_str()),
            Some("bob-99999")
        );
        assert_eq!(stored.role_of("alice-1234"), None);
    }

    #[tokio::test]
    async fn missing_assignment_reads_as_empty() {
        let seats = MemorySeatStore::new();
        let assignment = seats.get("nobody").await.expect("get");
        assert!(assignment.first.is_none());
        assert!(assignment.second.is_none());
        assert!(assignment.observers.is_empty());
    }

    #[test]
    fn session_record_serializes_with_wire_field_names() {
        let session = Session::new("s-3", "start");
        let json = serde_json::to_value(&session).expect("serialize");
        assert_eq!(json["turnOwner"], "first");
        assert_eq!(json["updatedAt"], session.updated_at);
        assert!(json.get("status").is_none());
    }
}
