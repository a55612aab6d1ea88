//! The rules-engine seam. The synchronization core never interprets a
//! position itself; everything it needs to know goes through [`Rules`].

use parlor_engine::position::{GamePosition, Outcome};
use parlor_engine::types::{Color, MoveParts};
use parlor_engine::EngineError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the two playing seats. The first seat always owns the opening
/// move of a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    First,
    Second,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::First => Side::Second,
            Side::Second => Side::First,
        }
    }
}

/// Session status as derived from the position. Never persisted; computed
/// on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Check,
    /// Terminal: the side that just moved won. `turnOwner` names the loser.
    Win,
    /// Terminal: drawn
    Draw,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Win | SessionStatus::Draw)
    }
}

/// What the rules engine can say about a stored position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionReport {
    pub turn: Side,
    pub status: SessionStatus,
}

/// Result of a successful move application.
#[derive(Debug, Clone)]
pub struct MoveApplied {
    /// Encoded successor position
    pub position: String,
    /// Canonical UCI rendering of the applied move
    pub uci: String,
    /// SAN rendering for move-list display
    pub san: String,
}

#[derive(Debug, Error)]
pub enum RulesError {
    /// The move is not playable: illegal, malformed, or the game is over.
    /// The session record must not change.
    #[error("Move rejected: {0}")]
    Rejected(String),
    /// The stored position cannot be interpreted. This is a server-side
    /// fault, not a client mistake.
    #[error("Stored position is unreadable: {0}")]
    BadPosition(String),
}

/// Capability interface the synchronization core compiles against. The
/// shipped implementation is chess ([`ChessRules`]); the core itself has no
/// opinion about what game is being played.
pub trait Rules: Send + Sync {
    /// Encoded starting position for a fresh session.
    fn initial_position(&self) -> String;

    /// Turn owner and derived status for a stored position.
    fn evaluate(&self, position: &str) -> Result<PositionReport, RulesError>;

    /// All playable moves in UCI notation.
    fn legal_moves(&self, position: &str) -> Result<Vec<String>, RulesError>;

    /// Validate and apply a move, returning the successor position. Must
    /// not succeed for terminal positions.
    fn apply(&self, position: &str, mv: &MoveParts) -> Result<MoveApplied, RulesError>;
}

/// Chess rules backed by parlor-engine. Positions are FEN strings.
#[derive(Debug, Default, Clone)]
pub struct ChessRules;

impl ChessRules {
    pub fn new() -> Self {
        ChessRules
    }

    fn load(position: &str) -> Result<GamePosition, RulesError> {
        GamePosition::from_fen(position).map_err(|e| RulesError::BadPosition(e.to_string()))
    }

    fn side_of(color: Color) -> Side {
        match color {
            Color::White => Side::First,
            Color::Black => Side::Second,
        }
    }
}

impl Rules for ChessRules {
    fn initial_position(&self) -> String {
        GamePosition::new().to_fen()
    }

    fn evaluate(&self, position: &str) -> Result<PositionReport, RulesError> {
        let pos = Self::load(position)?;
        let status = match pos.outcome() {
            Some(Outcome::Checkmate(_)) => SessionStatus::Win,
            Some(Outcome::Stalemate) | Some(Outcome::InsufficientMaterial) => SessionStatus::Draw,
            None if pos.is_check() => SessionStatus::Check,
            None => SessionStatus::InProgress,
        };
        Ok(PositionReport {
            turn: Self::side_of(pos.turn()),
            status,
        })
    }

    fn legal_moves(&self, position: &str) -> Result<Vec<String>, RulesError> {
        Ok(Self::load(position)?.legal_moves())
    }

    fn apply(&self, position: &str, mv: &MoveParts) -> Result<MoveApplied, RulesError> {
        let pos = Self::load(position)?;
        let applied = pos.apply(mv).map_err(|e| match e {
            EngineError::InvalidPosition(detail) => RulesError::BadPosition(detail),
            other => RulesError::Rejected(other.to_string()),
        })?;
        Ok(MoveApplied {
            position: applied.position.to_fen(),
            uci: applied.uci,
            san: applied.san,
        })
    }
}
