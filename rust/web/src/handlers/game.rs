use crate::errors::ErrorResponse;
use crate::session::{
    MoveCommand, MoveOutcome, MoveRejection, ReadOutcome, SessionError, SessionService, ViewBundle,
    Viewer,
};
use crate::store::SessionId;
use parlor_engine::{MoveParts, Promotion};
use serde::Deserialize;
use std::sync::Arc;
use warp::http::{self, header, StatusCode};
use warp::reply::{self, Response};
use warp::Reply;

const MIN_IDENTITY_CHARS: usize = 8;

/// Query parameters accepted by a session read.
#[derive(Debug, Deserialize)]
pub struct ReadQuery {
    pub identity: Option<String>,
    pub label: Option<String>,
}

/// Body of a move submission.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub promotion: Option<Promotion>,
    pub expected_version: u64,
    pub identity: String,
}

impl MoveRequest {
    fn into_command(self) -> Result<MoveCommand, ErrorResponse> {
        validate_cell("from", &self.from)?;
        validate_cell("to", &self.to)?;
        validate_identity(&self.identity)?;
        Ok(MoveCommand {
            parts: MoveParts::new(self.from, self.to, self.promotion),
            expected_version: self.expected_version,
            identity: self.identity,
        })
    }
}

/// Creates a new session at the starting position.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/sessions`
///
/// # Purpose
/// Allocates a session id, persists the starting position with version 0
/// and the first seat to move, and returns the full session view. Seats
/// are bound later, by the first identified readers and movers.
///
/// # Request Format
/// Empty body.
///
/// # Response Format
/// - **Success (201 Created)**: JSON session view plus an `ETag` header
///   carrying the change-detection fingerprint
/// - **Error (503 Service Unavailable)**: The storage backend could not
///   be reached
///
/// # Error Cases
/// - `backend_unavailable`: The storage backend rejected or dropped the
///   request
///
/// # Arguments
/// * `service` - Shared reference to the session service
///
/// # Returns
/// HTTP response with status 201 and the session view on success, or an
/// error response on failure
pub async fn create_session(service: Arc<SessionService>) -> Response {
    match service.create().await {
        Ok(bundle) => view_response(StatusCode::CREATED, &bundle),
        Err(err) => service_error(err),
    }
}

/// Reads a session, optionally binding the reader to a seat.
///
/// # HTTP Method and Path
/// - **Method**: GET
/// - **Path**: `/api/sessions/{session_id}?identity=&label=`
///
/// # Purpose
/// The polling endpoint. An anonymous read returns the view as-is. A read
/// carrying an `identity` runs the seat binding ladder first: the identity
/// keeps its existing seat, takes the lowest open one, or joins the
/// observers, and the returned view reflects that. With an `If-None-Match`
/// header equal to the current fingerprint the body is skipped entirely.
///
/// # Request Format
/// No body. Optional query parameters `identity` (at least 8 characters)
/// and `label` (display name, trimmed, at most 64 characters kept), plus
/// an optional `If-None-Match` header from a previous response's `ETag`.
///
/// # Response Format
/// - **Success (200 OK)**: JSON session view plus `ETag`
/// - **Success (304 Not Modified)**: Empty body, `ETag` still present
/// - **Error (400 Bad Request)**: `identity` present but too short
/// - **Error (404 Not Found)**: Unknown or expired session id
///
/// # Error Cases
/// - `invalid_payload`: Identity shorter than 8 characters
/// - `not_found`: No session with the given id
/// - `backend_unavailable`: The storage backend failed
///
/// # Arguments
/// * `service` - Shared reference to the session service
/// * `session_id` - Session id from the path
/// * `query` - Optional identity and label
/// * `if_none_match` - Fingerprint from a previous poll, if any
///
/// # Returns
/// HTTP response with the session view, a bodyless 304, or an error
pub async fn read_session(
    service: Arc<SessionService>,
    session_id: SessionId,
    query: ReadQuery,
    if_none_match: Option<String>,
) -> Response {
    let viewer = match query.identity {
        Some(identity) => {
            if let Err(invalid) = validate_identity(&identity) {
                return invalid.into_response(StatusCode::BAD_REQUEST);
            }
            Some(Viewer {
                identity,
                label: query.label,
            })
        }
        None => None,
    };

    match service
        .fetch(&session_id, viewer, if_none_match.as_deref())
        .await
    {
        Ok(ReadOutcome::Modified(bundle)) => view_response(StatusCode::OK, &bundle),
        Ok(ReadOutcome::NotModified { etag }) => not_modified_response(&etag),
        Err(err) => service_error(err),
    }
}

/// Submits a move under optimistic concurrency.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/sessions/{session_id}/moves`
///
/// # Purpose
/// Applies one move to the session if the seat that owns the turn is
/// either unclaimed or held by the submitting identity, and
/// `expectedVersion` still matches the stored version. The identity is
/// run through the seat binding ladder first, so the opening moves of a
/// session also claim the seats, and a lone participant can play both
/// sides until an opponent arrives.
///
/// # Request Format
/// ```json
/// {
///   "from": "e2",
///   "to": "e4",
///   "promotion": "q",
///   "expectedVersion": 0,
///   "identity": "alice-token"
/// }
/// ```
/// `promotion` is optional and one of `q`, `r`, `b`, `n`.
///
/// # Response Format
/// - **Success (200 OK)**: Updated JSON session view plus `ETag`
/// - **Error (400 Bad Request)**: Malformed payload, a move out of turn,
///   or an illegal move; `wrong_turn` and `illegal_move` responses carry
///   the current view under `details` so the client can resynchronize
/// - **Error (404 Not Found)**: Unknown session id
/// - **Error (409 Conflict)**: Stale `expectedVersion`; the body is the
///   plain current view, not an error envelope
///
/// # Error Cases
/// - `invalid_payload`: Cell names not 2 characters or identity too short
/// - `wrong_turn`: Another identity holds the seat that owns the turn
/// - `illegal_move`: The rules engine rejected the move
/// - `backend_unavailable`: The storage backend failed
///
/// # Arguments
/// * `service` - Shared reference to the session service
/// * `session_id` - Session id from the path
/// * `request` - Deserialized move submission
///
/// # Returns
/// HTTP response with the updated view on success, or a rejection
pub async fn submit_move(
    service: Arc<SessionService>,
    session_id: SessionId,
    request: MoveRequest,
) -> Response {
    let cmd = match request.into_command() {
        Ok(cmd) => cmd,
        Err(invalid) => return invalid.into_response(StatusCode::BAD_REQUEST),
    };

    match service.apply_move(&session_id, cmd).await {
        Ok(MoveOutcome::Applied(bundle)) => view_response(StatusCode::OK, &bundle),
        Ok(MoveOutcome::Rejected { reason, current }) => rejection_response(reason, current),
        Err(err) => service_error(err),
    }
}

fn rejection_response(reason: MoveRejection, current: ViewBundle) -> Response {
    match reason {
        // The conflict body is the authoritative view itself, so one round
        // trip is enough to resynchronize
        MoveRejection::StaleVersion { .. } => view_response(StatusCode::CONFLICT, &current),
        MoveRejection::WrongTurn { role } => ErrorResponse::with_details(
            "wrong_turn",
            "It is not this seat's turn to move",
            serde_json::json!({ "seat": role, "state": state_details(&current) }),
        )
        .into_response(StatusCode::BAD_REQUEST),
        MoveRejection::Illegal { detail } => ErrorResponse::with_details(
            "illegal_move",
            detail,
            serde_json::json!({ "state": state_details(&current) }),
        )
        .into_response(StatusCode::BAD_REQUEST),
    }
}

fn state_details(current: &ViewBundle) -> serde_json::Value {
    serde_json::to_value(&current.view).unwrap_or(serde_json::Value::Null)
}

fn validate_identity(identity: &str) -> Result<(), ErrorResponse> {
    if identity.chars().count() < MIN_IDENTITY_CHARS {
        return Err(ErrorResponse::with_details(
            "invalid_payload",
            format!("identity must be at least {MIN_IDENTITY_CHARS} characters"),
            serde_json::json!({ "field": "identity" }),
        ));
    }
    Ok(())
}

fn validate_cell(field: &'static str, value: &str) -> Result<(), ErrorResponse> {
    if value.chars().count() != 2 {
        return Err(ErrorResponse::with_details(
            "invalid_payload",
            format!("{field} must name a cell in exactly 2 characters"),
            serde_json::json!({ "field": field }),
        ));
    }
    Ok(())
}

fn view_response(status: StatusCode, bundle: &ViewBundle) -> Response {
    reply::with_header(
        reply::with_status(reply::json(&bundle.view), status),
        header::ETAG,
        bundle.etag.as_str(),
    )
    .into_response()
}

fn not_modified_response(etag: &str) -> Response {
    http::Response::builder()
        .status(StatusCode::NOT_MODIFIED)
        .header(header::ETAG, etag)
        .body(warp::hyper::Body::empty())
        .expect("build empty response")
}

fn service_error(err: SessionError) -> Response {
    use crate::errors::IntoErrorResponse;
    err.into_http_response()
}
