//! # parlor-engine: Chess Rules Core
//!
//! A thin, deterministic chess rules layer for the parlor session server.
//! Positions travel as FEN strings, moves arrive as from/to cell pairs with
//! an optional promotion piece, and every question about legality, turn
//! ownership or game end is answered here. The crate holds no session state
//! and performs no I/O.
//!
//! ## Core Modules
//!
//! - [`types`] - Color, promotion pieces and the client-submitted move shape
//! - [`position`] - FEN parsing/rendering, legality and game-end detection
//! - [`errors`] - Error types for rule evaluation
//!
//! ## Quick Start
//!
//! ```rust
//! use parlor_engine::position::GamePosition;
//! use parlor_engine::types::MoveParts;
//!
//! let start = GamePosition::new();
//! assert_eq!(start.legal_moves().len(), 20);
//!
//! let applied = start.apply(&MoveParts::new("e2", "e4", None)).unwrap();
//! assert_eq!(applied.san, "e4");
//! assert!(applied.position.to_fen().starts_with("rnbqkbnr/pppppppp/8/8/4P3"));
//! ```
//!
//! ## Rejections
//!
//! Illegal or malformed moves never mutate anything; they come back as
//! typed errors:
//!
//! ```rust
//! use parlor_engine::errors::EngineError;
//! use parlor_engine::position::GamePosition;
//! use parlor_engine::types::MoveParts;
//!
//! let start = GamePosition::new();
//! let err = start.apply(&MoveParts::new("e2", "e5", None)).unwrap_err();
//! assert!(matches!(err, EngineError::IllegalMove { .. }));
//! ```

pub mod errors;
pub mod position;
pub mod types;

pub use errors::EngineError;
pub use position::{Applied, GamePosition, Outcome};
pub use types::{Color, MoveParts, Promotion};
