use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parlor_engine::MoveParts;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::etag;
use crate::rules::{MoveApplied, Rules, RulesError, SessionStatus, Side};
use crate::seats::{SeatAssignment, SeatHolder, SeatRole};
use crate::store::{MoveRecord, SeatRegistry, Session, SessionId, StateStore, StoreError};

/// The synchronization core. Owns the stores and the rules engine behind
/// trait objects and serializes every read-modify-write cycle per session
/// through an in-process lock table.
///
/// Across processes sharing a remote backend no such serialization exists
/// (the KV offers no compare-and-set); concurrent writers degrade to
/// last-writer-wins on whole records, never to interleaved partial state.
pub struct SessionService {
    store: Arc<dyn StateStore>,
    seats: Arc<dyn SeatRegistry>,
    rules: Arc<dyn Rules>,
    locks: LockTable,
    ttl: Duration,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn StateStore>,
        seats: Arc<dyn SeatRegistry>,
        rules: Arc<dyn Rules>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            seats,
            rules,
            locks: LockTable::default(),
            ttl,
        }
    }

    /// Create a fresh session at the rules engine's starting position,
    /// version 0, first seat to move, no seats bound.
    pub async fn create(&self) -> Result<ViewBundle, SessionError> {
        self.sweep().await;

        let id = Uuid::new_v4().to_string();
        let session = self
            .store
            .create(Session::new(id, self.rules.initial_position()))
            .await?;

        tracing::info!(session_id = %session.id, "session created");
        self.bundle(&session, &SeatAssignment::default(), None)
    }

    /// Read a session. An identified read runs the seat binding ladder
    /// before the view and fingerprint are computed, so the reader's own
    /// arrival is part of the state it observes. A matching
    /// `If-None-Match` tag short-circuits to a bodyless answer.
    pub async fn fetch(
        &self,
        id: &str,
        viewer: Option<Viewer>,
        if_none_match: Option<&str>,
    ) -> Result<ReadOutcome, SessionError> {
        let _guard = self.locks.acquire(id).await;

        let session = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        let mut assignment = self.seats.get(id).await?;

        let seat = match viewer {
            Some(v) => {
                let bound = assignment.bind(&v.identity, v.label.as_deref());
                if bound.changed {
                    self.seats.put(id, &assignment).await?;
                    tracing::debug!(session_id = %id, role = ?bound.role, "seat binding updated");
                }
                Some(bound.role)
            }
            None => None,
        };

        let bundle = self.bundle(&session, &assignment, seat)?;
        if etag::matches(if_none_match, &bundle.etag) {
            return Ok(ReadOutcome::NotModified { etag: bundle.etag });
        }
        Ok(ReadOutcome::Modified(bundle))
    }

    /// Apply a move under optimistic concurrency. Inside the session's
    /// guard the checks run in a fixed order: seat resolution (which may
    /// bind the mover), turn authorization, version comparison, and only
    /// then the rules engine. Authorization precedes the version check, so
    /// an off-turn mover is told so regardless of how stale its view is.
    ///
    /// Authorization compares identities against the holder of the seat
    /// that owns the turn. While that seat is unbound any identity may
    /// play its move, so a session stays playable solo or hotseat until
    /// the second participant arrives.
    pub async fn apply_move(
        &self,
        id: &str,
        cmd: MoveCommand,
    ) -> Result<MoveOutcome, SessionError> {
        let _guard = self.locks.acquire(id).await;

        let mut session = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        let mut assignment = self.seats.get(id).await?;

        // Binding sticks even when the move itself is rejected
        let bound = assignment.bind(&cmd.identity, None);
        if bound.changed {
            self.seats.put(id, &assignment).await?;
        }

        // The turn seat authorizes by identity: a seat nobody holds yet
        // takes a move from anyone, a bound one only from its holder
        let off_turn = assignment
            .holder(session.turn_owner)
            .map_or(false, |holder| holder.identity != cmd.identity);
        if off_turn {
            tracing::debug!(
                session_id = %id,
                role = ?bound.role,
                turn_owner = ?session.turn_owner,
                "off-turn move rejected"
            );
            let current = self.bundle(&session, &assignment, Some(bound.role))?;
            return Ok(MoveOutcome::Rejected {
                reason: MoveRejection::WrongTurn { role: bound.role },
                current,
            });
        }

        if cmd.expected_version != session.version {
            tracing::debug!(
                session_id = %id,
                expected = cmd.expected_version,
                current = session.version,
                "stale move rejected"
            );
            let current = self.bundle(&session, &assignment, Some(bound.role))?;
            return Ok(MoveOutcome::Rejected {
                reason: MoveRejection::StaleVersion {
                    expected: cmd.expected_version,
                },
                current,
            });
        }

        let applied = match self.rules.apply(&session.position, &cmd.parts) {
            Ok(applied) => applied,
            Err(RulesError::Rejected(detail)) => {
                tracing::debug!(session_id = %id, detail = %detail, "move rejected by rules");
                let current = self.bundle(&session, &assignment, Some(bound.role))?;
                return Ok(MoveOutcome::Rejected {
                    reason: MoveRejection::Illegal { detail },
                    current,
                });
            }
            Err(RulesError::BadPosition(detail)) => {
                return Err(SessionError::CorruptPosition(detail))
            }
        };

        let MoveApplied { position, uci, san } = applied;
        session.position = position;
        session.turn_owner = session.turn_owner.other();
        session.version += 1;
        session.moves.push(MoveRecord {
            uci: uci.clone(),
            san,
        });
        session.touch();
        self.store.save(&session).await?;

        tracing::info!(
            session_id = %id,
            version = session.version,
            mv = %uci,
            turn_owner = ?session.turn_owner,
            "move applied"
        );

        let bundle = self.bundle(&session, &assignment, Some(bound.role))?;
        Ok(MoveOutcome::Applied(bundle))
    }

    fn bundle(
        &self,
        session: &Session,
        assignment: &SeatAssignment,
        seat: Option<SeatRole>,
    ) -> Result<ViewBundle, SessionError> {
        let status = self.status_of(&session.position)?;
        let etag = etag::fingerprint(session.version, assignment);
        Ok(ViewBundle {
            view: SessionView::render(session, assignment, status, seat),
            etag,
        })
    }

    fn status_of(&self, position: &str) -> Result<SessionStatus, SessionError> {
        let report = self.rules.evaluate(position).map_err(|err| match err {
            RulesError::Rejected(detail) | RulesError::BadPosition(detail) => {
                SessionError::CorruptPosition(detail)
            }
        })?;
        Ok(report.status)
    }

    /// Opportunistic expiry sweep, run on session creation. Backends with
    /// native key TTL make this a no-op.
    async fn sweep(&self) {
        match self.store.purge_expired(self.ttl).await {
            Ok(purged) if !purged.is_empty() => {
                if let Err(err) = self.seats.forget(&purged).await {
                    tracing::warn!(error = %err, "failed to forget seat assignments for purged sessions");
                }
                self.locks.forget(&purged).await;
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "expiry sweep failed"),
        }
    }
}

/// One unit mutex per session id, handed out as owned guards so they can
/// be held across awaits. Entries are dropped when their session is
/// purged, and only once no request still holds them.
#[derive(Default)]
struct LockTable {
    entries: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl LockTable {
    async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut guard = self.entries.lock().await;
            Arc::clone(guard.entry(id.to_string()).or_default())
        };
        entry.lock_owned().await
    }

    /// Drop lock entries for purged sessions. An entry some request still
    /// holds survives the sweep and is reclaimed by a later one, so a
    /// straggler can never race a fresh guard for the same id.
    async fn forget(&self, ids: &[SessionId]) {
        if ids.is_empty() {
            return;
        }
        let mut guard = self.entries.lock().await;
        for id in ids {
            let released = guard
                .get(id)
                .map_or(false, |entry| Arc::strong_count(entry) == 1);
            if released {
                guard.remove(id);
            }
        }
    }
}

/// A view bundle pairs the rendered body with the fingerprint it was
/// rendered under.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewBundle {
    pub view: SessionView,
    pub etag: String,
}

#[derive(Debug)]
pub enum ReadOutcome {
    Modified(ViewBundle),
    NotModified { etag: String },
}

#[derive(Debug)]
pub enum MoveOutcome {
    Applied(ViewBundle),
    /// The move was not applied; `current` is the authoritative state the
    /// client resynchronizes from.
    Rejected {
        reason: MoveRejection,
        current: ViewBundle,
    },
}

#[derive(Debug, Clone)]
pub enum MoveRejection {
    WrongTurn { role: SeatRole },
    StaleVersion { expected: u64 },
    Illegal { detail: String },
}

/// An identified reader. Anonymous polls carry no viewer and trigger no
/// seat binding.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub identity: String,
    pub label: Option<String>,
}

/// A move attempt as submitted by a client.
#[derive(Debug, Clone)]
pub struct MoveCommand {
    pub parts: MoveParts,
    pub expected_version: u64,
    pub identity: String,
}

/// The wire representation of a session, as returned by every read and
/// successful (or conflicted) move. Identities never appear here; seats
/// and spectators expose labels only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: SessionId,
    pub position: String,
    pub turn_owner: Side,
    /// Derived by the rules engine on every render, never stored
    pub status: SessionStatus,
    pub version: u64,
    pub updated_at: i64,
    pub moves: Vec<MoveRecord>,
    pub seats: SeatsView,
    pub spectators: Vec<HolderView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat: Option<SeatRole>,
    pub seats_assigned: bool,
}

impl SessionView {
    fn render(
        session: &Session,
        assignment: &SeatAssignment,
        status: SessionStatus,
        seat: Option<SeatRole>,
    ) -> Self {
        SessionView {
            id: session.id.clone(),
            position: session.position.clone(),
            turn_owner: session.turn_owner,
            status,
            version: session.version,
            updated_at: session.updated_at,
            moves: session.moves.clone(),
            seats: SeatsView {
                first: assignment.first.as_ref().map(HolderView::of),
                second: assignment.second.as_ref().map(HolderView::of),
            },
            spectators: assignment.observers.iter().map(HolderView::of).collect(),
            seat,
            seats_assigned: assignment.both_bound(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeatsView {
    pub first: Option<HolderView>,
    pub second: Option<HolderView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HolderView {
    pub label: Option<String>,
}

impl HolderView {
    fn of(holder: &SeatHolder) -> Self {
        HolderView {
            label: holder.label.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),
    #[error("Stored position is unreadable: {0}")]
    CorruptPosition(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl crate::errors::IntoErrorResponse for SessionError {
    fn status_code(&self) -> warp::http::StatusCode {
        use warp::http::StatusCode;
        match self {
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
            SessionError::CorruptPosition(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SessionError::Store(StoreError::Corrupt(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            SessionError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "not_found",
            SessionError::CorruptPosition(_) => "internal_error",
            SessionError::Store(StoreError::Corrupt(_)) => "internal_error",
            SessionError::Store(_) => "backend_unavailable",
        }
    }

    fn error_message(&self) -> String {
        self.to_string()
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            SessionError::NotFound(id) => Some(serde_json::json!({ "sessionId": id })),
            _ => None,
        }
    }

    fn severity(&self) -> crate::errors::ErrorSeverity {
        use crate::errors::ErrorSeverity;
        match self {
            SessionError::NotFound(_) => ErrorSeverity::Client,
            SessionError::CorruptPosition(_) => ErrorSeverity::Critical,
            SessionError::Store(StoreError::Corrupt(_)) => ErrorSeverity::Critical,
            SessionError::Store(_) => ErrorSeverity::Server,
        }
    }
}
