//! # Shared Synchronization Model
//!
//! Types used by both the client and the server to agree on what happened to
//! a shared puzzle grid.
//!
//! ## Action Model (`action`)
//! Every edit and protocol event is an [`Action`]: a tagged variant carrying
//! the actor that issued it and, once the server log has accepted it, its
//! sequence number. Actions travel as JSON text frames.
//!
//! ## Grid State (`grid`, `segment`)
//! [`GridState`] holds the cells and the marked answer segments of every clue
//! list. It only changes through [`GridState::apply`], which is last-writer-wins
//! and idempotent for every mutating action, so replaying a confirmed action
//! never changes the outcome.
//!
//! ## Geometry (`geometry`)
//! Maps grid coordinates onto row and band clue lists.
//!
//! ## Identity (`identity`)
//! Private/public id pairs used to attribute actions without exposing the
//! private half to peers.

pub mod action;
pub mod geometry;
pub mod grid;
pub mod identity;
pub mod segment;

pub use action::{Action, ActionBody, DecodeError, ListKind, UNCONFIRMED_SEQ};
pub use geometry::{CellLocation, MarchingBands, PuzzleGeometry};
pub use grid::{BoundsError, Cell, GridState, BLANK};
pub use identity::{Identity, IdentityError};
pub use segment::{AnswerPosition, Segment, SegmentSet};

/// Side length of the default puzzle
pub const DEFAULT_GRID_SIZE: usize = 13;

/// Longest room id the server accepts
pub const MAX_ROOM_ID_LEN: usize = 64;

/// Room ids are opaque but restricted to URL-safe characters
pub fn is_valid_room_id(room_id: &str) -> bool {
    !room_id.is_empty()
        && room_id.len() <= MAX_ROOM_ID_LEN
        && room_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}
