//! Position handling on top of shakmaty: FEN parsing and rendering, move
//! legality, SAN rendering and game-end detection.

use shakmaty::{fen::Fen, san::San, uci::UciMove, CastlingMode, Chess, EnPassantMode, Position};

use crate::errors::EngineError;
use crate::types::{Color, MoveParts};

/// How a finished game ended.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Outcome {
    /// The given color delivered mate
    Checkmate(Color),
    /// Side to move has no legal move but is not in check
    Stalemate,
    /// Neither side can force mate
    InsufficientMaterial,
}

impl Outcome {
    pub fn is_draw(self) -> bool {
        !matches!(self, Outcome::Checkmate(_))
    }
}

/// A chess position. The inner representation is shakmaty's; callers only
/// ever exchange FEN strings and [`MoveParts`] with it.
#[derive(Debug, Clone)]
pub struct GamePosition {
    inner: Chess,
}

impl GamePosition {
    /// The standard starting position.
    pub fn new() -> Self {
        GamePosition {
            inner: Chess::default(),
        }
    }

    /// Parse a position from its FEN encoding.
    pub fn from_fen(fen: &str) -> Result<Self, EngineError> {
        let parsed: Fen = fen
            .parse()
            .map_err(|e| EngineError::InvalidPosition(format!("{e}")))?;
        let inner: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| EngineError::InvalidPosition(format!("{e}")))?;
        Ok(GamePosition { inner })
    }

    /// Render the position as FEN.
    pub fn to_fen(&self) -> String {
        Fen::from_position(self.inner.clone(), EnPassantMode::Legal).to_string()
    }

    /// Which color moves next.
    pub fn turn(&self) -> Color {
        self.inner.turn().into()
    }

    /// Whether the side to move is currently in check.
    pub fn is_check(&self) -> bool {
        self.inner.is_check()
    }

    /// Game-end verdict, if the game is over.
    pub fn outcome(&self) -> Option<Outcome> {
        if self.inner.is_checkmate() {
            // the side to move is the one that got mated
            Some(Outcome::Checkmate(self.turn().opposite()))
        } else if self.inner.is_stalemate() {
            Some(Outcome::Stalemate)
        } else if self.inner.is_insufficient_material() {
            Some(Outcome::InsufficientMaterial)
        } else {
            None
        }
    }

    pub fn is_game_over(&self) -> bool {
        self.outcome().is_some()
    }

    /// All legal moves in UCI notation.
    pub fn legal_moves(&self) -> Vec<String> {
        self.inner
            .legal_moves()
            .iter()
            .map(|m| UciMove::from_move(m, CastlingMode::Standard).to_string())
            .collect()
    }

    /// Validate a submitted move against this position and, if legal, return
    /// the successor position along with the move's canonical UCI and SAN
    /// renderings. The receiver is left untouched.
    pub fn apply(&self, parts: &MoveParts) -> Result<Applied, EngineError> {
        if self.is_game_over() {
            return Err(EngineError::GameOver);
        }

        let uci_text = parts.to_uci();
        let uci: UciMove = uci_text
            .parse()
            .map_err(|_| EngineError::MalformedMove(uci_text.clone()))?;
        let mv = uci
            .to_move(&self.inner)
            .map_err(|_| EngineError::IllegalMove {
                mv: uci_text.clone(),
            })?;

        // SAN must be rendered against the position the move is played from
        let san = San::from_move(&self.inner, &mv);

        if !self.inner.is_legal(&mv) {
            return Err(EngineError::IllegalMove { mv: uci_text });
        }

        let next = self
            .inner
            .clone()
            .play(&mv)
            .map_err(|_| EngineError::IllegalMove {
                mv: uci_text.clone(),
            })?;

        Ok(Applied {
            position: GamePosition { inner: next },
            uci: UciMove::from_move(&mv, CastlingMode::Standard).to_string(),
            san: san.to_string(),
        })
    }
}

impl Default for GamePosition {
    fn default() -> Self {
        GamePosition::new()
    }
}

/// Result of a successful [`GamePosition::apply`].
#[derive(Debug, Clone)]
pub struct Applied {
    /// The position after the move
    pub position: GamePosition,
    /// Canonical UCI rendering of the move that was played
    pub uci: String,
    /// SAN rendering relative to the position the move was played from
    pub san: String,
}
