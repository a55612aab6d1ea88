use std::fmt;

use serde::{Deserialize, Serialize};

/// Represents one of the two armies on the board.
/// White always owns the opening move of a fresh game.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    /// The side that moves first
    White,
    /// The side that moves second
    Black,
}

impl Color {
    pub fn opposite(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

impl From<shakmaty::Color> for Color {
    fn from(c: shakmaty::Color) -> Self {
        match c {
            shakmaty::Color::White => Color::White,
            shakmaty::Color::Black => Color::Black,
        }
    }
}

impl From<Color> for shakmaty::Color {
    fn from(c: Color) -> Self {
        match c {
            Color::White => shakmaty::Color::White,
            Color::Black => shakmaty::Color::Black,
        }
    }
}

/// Represents the piece a pawn may promote to on reaching the back rank.
/// Serialized as the single lowercase letter used in UCI notation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Promotion {
    /// Promote to queen (q)
    #[serde(rename = "q")]
    Queen,
    /// Promote to rook (r)
    #[serde(rename = "r")]
    Rook,
    /// Promote to bishop (b)
    #[serde(rename = "b")]
    Bishop,
    /// Promote to knight (n)
    #[serde(rename = "n")]
    Knight,
}

impl Promotion {
    pub fn as_char(self) -> char {
        match self {
            Promotion::Queen => 'q',
            Promotion::Rook => 'r',
            Promotion::Bishop => 'b',
            Promotion::Knight => 'n',
        }
    }
}

impl From<Promotion> for shakmaty::Role {
    fn from(p: Promotion) -> Self {
        match p {
            Promotion::Queen => shakmaty::Role::Queen,
            Promotion::Rook => shakmaty::Role::Rook,
            Promotion::Bishop => shakmaty::Role::Bishop,
            Promotion::Knight => shakmaty::Role::Knight,
        }
    }
}

/// Represents a move as submitted by a client: origin cell, target cell and
/// an optional promotion piece. Cells use algebraic file-rank form (`e2`).
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct MoveParts {
    /// Origin cell, e.g. `e2`
    pub from: String,
    /// Target cell, e.g. `e4`
    pub to: String,
    /// Promotion piece, required only when a pawn reaches the back rank
    pub promotion: Option<Promotion>,
}

impl MoveParts {
    pub fn new(from: impl Into<String>, to: impl Into<String>, promotion: Option<Promotion>) -> Self {
        MoveParts {
            from: from.into(),
            to: to.into(),
            promotion,
        }
    }

    /// Collapse the parts into UCI notation (`e2e4`, `a7a8q`).
    pub fn to_uci(&self) -> String {
        let mut s = String::with_capacity(5);
        s.push_str(&self.from);
        s.push_str(&self.to);
        if let Some(p) = self.promotion {
            s.push(p.as_char());
        }
        s
    }
}

impl fmt::Display for MoveParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uci())
    }
}
