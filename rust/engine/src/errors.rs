use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Invalid position encoding: {0}")]
    InvalidPosition(String),
    #[error("Malformed move: {0}")]
    MalformedMove(String),
    #[error("Illegal move {mv} in current position")]
    IllegalMove { mv: String },
    #[error("Game is already over")]
    GameOver,
}
