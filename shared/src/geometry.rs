//! Static puzzle geometry: how grid coordinates map onto clue lists.

use crate::action::ListKind;

/// Position of one cell within the clue lists that pass through it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellLocation {
    pub row_list: usize,
    pub row_offset: usize,
    /// `None` for a cell that belongs to no band (the odd-size center)
    pub band: Option<(usize, usize)>,
}

/// Read-only description of a puzzle's shape
pub trait PuzzleGeometry {
    /// Side length of the square grid
    fn size(&self) -> usize;

    /// Number of clue lists of the given kind
    fn list_count(&self, kind: ListKind) -> usize;

    /// Number of cells along one clue list
    fn list_len(&self, kind: ListKind, index: usize) -> usize;

    /// Which lists and offsets a coordinate belongs to
    fn locate(&self, row: usize, col: usize) -> CellLocation;

    /// The single cell that never needs filling, if the grid has a true center
    fn exempt_cell(&self) -> Option<(usize, usize)> {
        let size = self.size();
        (size % 2 == 1).then(|| (size / 2, size / 2))
    }
}

/// Square grid with one row list per row and one band per concentric ring
///
/// Bands run clockwise starting at the ring's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarchingBands {
    size: usize,
}

impl MarchingBands {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    fn ring_of(&self, row: usize, col: usize) -> usize {
        let last = self.size - 1;
        row.min(col).min(last - row).min(last - col)
    }

    fn ring_offset(&self, ring: usize, row: usize, col: usize) -> usize {
        let side = self.size - 2 * ring;
        let far = ring + side - 1;
        let edge = side - 1;
        if row == ring {
            col - ring
        } else if col == far {
            edge + (row - ring)
        } else if row == far {
            2 * edge + (far - col)
        } else {
            3 * edge + (far - row)
        }
    }
}

impl PuzzleGeometry for MarchingBands {
    fn size(&self) -> usize {
        self.size
    }

    fn list_count(&self, kind: ListKind) -> usize {
        match kind {
            ListKind::Row => self.size,
            ListKind::Band => self.size / 2,
        }
    }

    fn list_len(&self, kind: ListKind, index: usize) -> usize {
        match kind {
            ListKind::Row => self.size,
            ListKind::Band => 4 * (self.size - 2 * index - 1),
        }
    }

    fn locate(&self, row: usize, col: usize) -> CellLocation {
        let ring = self.ring_of(row, col);
        let band = (ring < self.list_count(ListKind::Band))
            .then(|| (ring, self.ring_offset(ring, row, col)));
        CellLocation {
            row_list: row,
            row_offset: col,
            band,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_list_counts() {
        let odd = MarchingBands::new(13);
        assert_eq!(odd.list_count(ListKind::Row), 13);
        assert_eq!(odd.list_count(ListKind::Band), 6);
        assert_eq!(odd.list_len(ListKind::Band, 0), 48);
        assert_eq!(odd.list_len(ListKind::Band, 5), 8);

        let even = MarchingBands::new(4);
        assert_eq!(even.list_count(ListKind::Band), 2);
        assert_eq!(even.list_len(ListKind::Band, 1), 4);
    }

    #[test]
    fn test_exempt_cell_only_for_odd_sizes() {
        assert_eq!(MarchingBands::new(5).exempt_cell(), Some((2, 2)));
        assert_eq!(MarchingBands::new(4).exempt_cell(), None);
    }

    #[test]
    fn test_outer_band_runs_clockwise() {
        let geometry = MarchingBands::new(5);
        assert_eq!(geometry.locate(0, 0).band, Some((0, 0)));
        assert_eq!(geometry.locate(0, 4).band, Some((0, 4)));
        assert_eq!(geometry.locate(4, 4).band, Some((0, 8)));
        assert_eq!(geometry.locate(4, 0).band, Some((0, 12)));
        assert_eq!(geometry.locate(1, 0).band, Some((0, 15)));
    }

    #[test]
    fn test_center_has_no_band() {
        let geometry = MarchingBands::new(5);
        let center = geometry.locate(2, 2);
        assert_eq!(center.band, None);
        assert_eq!(center.row_list, 2);
        assert_eq!(center.row_offset, 2);
    }

    #[test]
    fn test_band_offsets_cover_each_ring_exactly_once() {
        let geometry = MarchingBands::new(7);
        let mut seen: Vec<HashSet<usize>> = vec![HashSet::new(); 3];

        for row in 0..7 {
            for col in 0..7 {
                if let Some((band, offset)) = geometry.locate(row, col).band {
                    assert!(offset < geometry.list_len(ListKind::Band, band));
                    assert!(seen[band].insert(offset), "duplicate offset {offset}");
                }
            }
        }

        for (band, offsets) in seen.iter().enumerate() {
            assert_eq!(offsets.len(), geometry.list_len(ListKind::Band, band));
        }
    }
}
