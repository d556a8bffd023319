//! Puzzle-solving state and the transition function that actions drive.

use thiserror::Error;

use crate::action::{Action, ActionBody, ListKind};
use crate::geometry::PuzzleGeometry;
use crate::segment::{AnswerPosition, SegmentSet};

/// Text of a cell nobody has written in
pub const BLANK: &str = " ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub text: String,
}

impl Cell {
    pub fn blank() -> Self {
        Self {
            text: BLANK.to_string(),
        }
    }

    pub fn is_filled(&self) -> bool {
        self.text != BLANK
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::blank()
    }
}

/// An action that addresses a cell or list outside the puzzle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundsError {
    #[error("cell ({row}, {col}) outside {size}x{size} grid")]
    Cell { row: usize, col: usize, size: usize },

    #[error("{kind:?} list {index} does not exist ({count} lists)")]
    List {
        kind: ListKind,
        index: usize,
        count: usize,
    },

    #[error("offset {offset} outside {kind:?} list {index} of length {len}")]
    Offset {
        kind: ListKind,
        index: usize,
        offset: usize,
        len: usize,
    },

    #[error("segment start {start} is past its end {end}")]
    Inverted { start: usize, end: usize },
}

/// Mutable state of one solving session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridState {
    pub room_id: String,
    size: usize,
    cells: Vec<Vec<Cell>>,
    row_segments: Vec<SegmentSet>,
    band_segments: Vec<SegmentSet>,
    row_lengths: Vec<usize>,
    band_lengths: Vec<usize>,
    exempt: Option<(usize, usize)>,
    solved: bool,
}

impl GridState {
    pub fn new(room_id: impl Into<String>, geometry: &dyn PuzzleGeometry) -> Self {
        let size = geometry.size();
        let lengths = |kind: ListKind| -> Vec<usize> {
            (0..geometry.list_count(kind))
                .map(|index| geometry.list_len(kind, index))
                .collect()
        };
        let row_lengths = lengths(ListKind::Row);
        let band_lengths = lengths(ListKind::Band);

        Self {
            room_id: room_id.into(),
            size,
            cells: vec![vec![Cell::blank(); size]; size],
            row_segments: vec![SegmentSet::new(); row_lengths.len()],
            band_segments: vec![SegmentSet::new(); band_lengths.len()],
            row_lengths,
            band_lengths,
            exempt: geometry.exempt_cell(),
            solved: false,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_solved(&self) -> bool {
        self.solved
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        &self.cells[row][col]
    }

    pub fn cells(&self) -> &[Vec<Cell>] {
        &self.cells
    }

    /// The marked answers of one clue list
    pub fn answer_segments(&self, kind: ListKind, index: usize) -> &SegmentSet {
        match kind {
            ListKind::Row => &self.row_segments[index],
            ListKind::Band => &self.band_segments[index],
        }
    }

    pub fn in_answer_at(&self, kind: ListKind, index: usize, offset: usize) -> AnswerPosition {
        self.answer_segments(kind, index).in_answer_at(offset)
    }

    /// Applies one action. Bounds are the caller's precondition; see
    /// [`GridState::check_bounds`].
    pub fn apply(&mut self, action: &Action) {
        match &action.body {
            ActionBody::SetCell { row, col, text } => {
                self.cells[*row][*col].text = text.clone();
                self.solved = self.all_filled();
            }
            ActionBody::ClearCell { row, col } => {
                self.cells[*row][*col] = Cell::blank();
                self.solved = false;
            }
            ActionBody::MarkSegment {
                list_kind,
                list_index,
                start,
                end,
            } => {
                self.segments_mut(*list_kind, *list_index).mark(*start, *end);
            }
            ActionBody::ClearSegment {
                list_kind,
                list_index,
                at,
            } => {
                self.segments_mut(*list_kind, *list_index).clear_at(*at);
            }
            ActionBody::JoinRoom { .. } | ActionBody::LeaveRoom {} | ActionBody::SetCursor { .. } => {}
        }
    }

    /// Checks that every coordinate the action addresses exists
    pub fn check_bounds(&self, action: &Action) -> Result<(), BoundsError> {
        match &action.body {
            ActionBody::SetCell { row, col, .. }
            | ActionBody::ClearCell { row, col }
            | ActionBody::SetCursor { row, col } => self.check_cell(*row, *col),
            ActionBody::MarkSegment {
                list_kind,
                list_index,
                start,
                end,
            } => {
                if start > end {
                    return Err(BoundsError::Inverted {
                        start: *start,
                        end: *end,
                    });
                }
                self.check_offset(*list_kind, *list_index, *end)
            }
            ActionBody::ClearSegment {
                list_kind,
                list_index,
                at,
            } => self.check_offset(*list_kind, *list_index, *at),
            ActionBody::JoinRoom { .. } | ActionBody::LeaveRoom {} => Ok(()),
        }
    }

    fn check_cell(&self, row: usize, col: usize) -> Result<(), BoundsError> {
        if row < self.size && col < self.size {
            Ok(())
        } else {
            Err(BoundsError::Cell {
                row,
                col,
                size: self.size,
            })
        }
    }

    fn check_offset(&self, kind: ListKind, index: usize, offset: usize) -> Result<(), BoundsError> {
        let lengths = match kind {
            ListKind::Row => &self.row_lengths,
            ListKind::Band => &self.band_lengths,
        };
        let len = *lengths.get(index).ok_or(BoundsError::List {
            kind,
            index,
            count: lengths.len(),
        })?;
        if offset < len {
            Ok(())
        } else {
            Err(BoundsError::Offset {
                kind,
                index,
                offset,
                len,
            })
        }
    }

    fn segments_mut(&mut self, kind: ListKind, index: usize) -> &mut SegmentSet {
        match kind {
            ListKind::Row => &mut self.row_segments[index],
            ListKind::Band => &mut self.band_segments[index],
        }
    }

    fn all_filled(&self) -> bool {
        let required = self.size * self.size - usize::from(self.exempt.is_some());
        let filled = self
            .cells
            .iter()
            .enumerate()
            .flat_map(|(row, cells)| {
                cells
                    .iter()
                    .enumerate()
                    .map(move |(col, cell)| ((row, col), cell))
            })
            .filter(|(coords, cell)| Some(*coords) != self.exempt && cell.is_filled())
            .count();
        filled == required
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::MarchingBands;
    use crate::segment::Segment;

    fn grid(size: usize) -> GridState {
        GridState::new("room", &MarchingBands::new(size))
    }

    fn fill_all_but_center(state: &mut GridState) {
        let size = state.size();
        for row in 0..size {
            for col in 0..size {
                if state.exempt != Some((row, col)) {
                    state.apply(&Action::set_cell(row, col, "X"));
                }
            }
        }
    }

    #[test]
    fn test_new_grid_is_blank() {
        let state = grid(5);
        assert_eq!(state.size(), 5);
        assert!(!state.is_solved());
        assert!(state.cells().iter().flatten().all(|cell| !cell.is_filled()));
        assert!(state.answer_segments(ListKind::Row, 4).is_empty());
        assert!(state.answer_segments(ListKind::Band, 1).is_empty());
    }

    #[test]
    fn test_set_and_clear_cell() {
        let mut state = grid(3);
        state.apply(&Action::set_cell(1, 2, "K"));
        assert_eq!(state.cell(1, 2).text, "K");
        assert!(state.cell(1, 2).is_filled());

        state.apply(&Action::clear_cell(1, 2));
        assert_eq!(state.cell(1, 2), &Cell::blank());
    }

    #[test]
    fn test_solved_ignores_center_cell() {
        let mut state = grid(3);
        fill_all_but_center(&mut state);
        assert!(state.is_solved());

        state.apply(&Action::clear_cell(0, 0));
        assert!(!state.is_solved());

        state.apply(&Action::set_cell(0, 0, "Y"));
        assert!(state.is_solved());
    }

    #[test]
    fn test_filling_center_does_not_count_towards_solved() {
        let mut state = grid(3);
        state.apply(&Action::set_cell(1, 1, "C"));
        for (row, col) in [(0, 0), (0, 1), (0, 2), (1, 0), (1, 2), (2, 0), (2, 1)] {
            state.apply(&Action::set_cell(row, col, "X"));
        }
        assert!(!state.is_solved());

        state.apply(&Action::set_cell(2, 2, "X"));
        assert!(state.is_solved());
    }

    #[test]
    fn test_even_grid_requires_every_cell() {
        let mut state = grid(2);
        state.apply(&Action::set_cell(0, 0, "A"));
        state.apply(&Action::set_cell(0, 1, "B"));
        state.apply(&Action::set_cell(1, 0, "C"));
        assert!(!state.is_solved());

        state.apply(&Action::set_cell(1, 1, "D"));
        assert!(state.is_solved());
    }

    #[test]
    fn test_clear_cell_unsolves_even_when_blank() {
        let mut state = grid(3);
        fill_all_but_center(&mut state);
        state.apply(&Action::clear_cell(1, 1));
        assert!(!state.is_solved());
    }

    #[test]
    fn test_segment_actions_target_one_list() {
        let mut state = grid(5);
        state.apply(&Action::mark_segment(ListKind::Band, 0, 2, 5));
        state.apply(&Action::mark_segment(ListKind::Row, 0, 0, 4));

        assert_eq!(
            state.answer_segments(ListKind::Band, 0).segments(),
            &[Segment::new(2, 5)]
        );
        assert!(state.answer_segments(ListKind::Band, 1).is_empty());
        assert!(state.in_answer_at(ListKind::Row, 0, 4).is_end);

        state.apply(&Action::clear_segment(ListKind::Band, 0, 3));
        assert!(state.answer_segments(ListKind::Band, 0).is_empty());
        assert_eq!(state.answer_segments(ListKind::Row, 0).len(), 1);
    }

    #[test]
    fn test_protocol_actions_do_not_mutate() {
        let mut state = grid(3);
        let before = state.clone();
        state.apply(&Action::join_room("room", -1));
        state.apply(&Action::leave_room());
        state.apply(&Action::set_cursor(1, 1));
        assert_eq!(state, before);
    }

    #[test]
    fn test_replaying_confirmed_action_is_idempotent() {
        let actions = [
            Action::set_cell(0, 0, "A"),
            Action::clear_cell(0, 0),
            Action::mark_segment(ListKind::Row, 1, 0, 2),
            Action::clear_segment(ListKind::Row, 1, 1),
        ];
        for action in actions {
            let action = action.with_actor("peer").with_sequence(0);
            let mut once = grid(3);
            once.apply(&action);
            let mut twice = grid(3);
            twice.apply(&action);
            twice.apply(&action);
            assert_eq!(once, twice, "{} is not idempotent", action.kind());
        }
    }

    #[test]
    fn test_check_bounds() {
        let state = grid(5);
        assert!(state.check_bounds(&Action::set_cell(4, 4, "A")).is_ok());
        assert_eq!(
            state.check_bounds(&Action::set_cell(5, 0, "A")),
            Err(BoundsError::Cell {
                row: 5,
                col: 0,
                size: 5
            })
        );
        assert!(state.check_bounds(&Action::set_cursor(0, 9)).is_err());
        assert!(state
            .check_bounds(&Action::mark_segment(ListKind::Band, 1, 0, 7))
            .is_ok());
        assert!(matches!(
            state.check_bounds(&Action::mark_segment(ListKind::Band, 1, 0, 8)),
            Err(BoundsError::Offset { len: 8, .. })
        ));
        assert!(matches!(
            state.check_bounds(&Action::mark_segment(ListKind::Band, 2, 0, 0)),
            Err(BoundsError::List { count: 2, .. })
        ));
        assert_eq!(
            state.check_bounds(&Action::mark_segment(ListKind::Row, 0, 3, 1)),
            Err(BoundsError::Inverted { start: 3, end: 1 })
        );
        assert!(state
            .check_bounds(&Action::clear_segment(ListKind::Row, 4, 4))
            .is_ok());
        assert!(state.check_bounds(&Action::leave_room()).is_ok());
    }
}
