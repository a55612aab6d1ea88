pub mod game;
pub mod health;

pub use game::{MoveRequest, ReadQuery, create_session, read_session, submit_move};
pub use health::health;
