//! Grid Sizing - Smallest Sheet That Fits
//!
//! Sheets are rectangular grids of equally sized cells. The last cell is
//! always reserved for the back face, so callers ask for `cards + 1` cells.

use serde::{Deserialize, Serialize};

pub const MIN_COLUMNS: u32 = 2;
pub const MAX_COLUMNS: u32 = 10;
pub const MIN_ROWS: u32 = 2;
pub const MAX_ROWS: u32 = 7;

/// Card slots on a single sheet (the largest grid minus the back-face cell)
pub const PAGE_CAPACITY: usize = (MAX_COLUMNS * MAX_ROWS - 1) as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    pub columns: u32,
    pub rows: u32,
}

impl Grid {
    pub fn cells(&self) -> u32 {
        self.columns * self.rows
    }

    /// Row-major position of a zero-based slot id
    pub fn position(&self, id: u32) -> (u32, u32) {
        slot_position(id, self.columns)
    }

    /// The bottom-right cell, where the back face goes
    pub fn last_cell(&self) -> (u32, u32) {
        (self.columns - 1, self.rows - 1)
    }
}

/// Minimal-area grid holding at least `cells` cells.
///
/// Iterates rows ascending, then columns ascending, and only replaces the
/// current best on a strictly smaller area, so equal areas prefer fewer rows
/// and then fewer columns. Counts above the largest grid get the largest grid;
/// keeping pages within [`PAGE_CAPACITY`] is the caller's job.
pub fn grid_for(cells: usize) -> Grid {
    let mut best = Grid { columns: MAX_COLUMNS, rows: MAX_ROWS };
    let mut best_area = u32::MAX;
    for rows in MIN_ROWS..=MAX_ROWS {
        for columns in MIN_COLUMNS..=MAX_COLUMNS {
            let area = columns * rows;
            if (area as usize) >= cells && area < best_area {
                best_area = area;
                best = Grid { columns, rows };
            }
        }
    }
    best
}

/// Maps a zero-based linear slot id to `(column, row)`
pub fn slot_position(id: u32, columns: u32) -> (u32, u32) {
    (id % columns, id / columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_grid_is_minimal_for_every_page_size() {
        for n in 1..=(PAGE_CAPACITY + 1) {
            let grid = grid_for(n);
            assert!((MIN_COLUMNS..=MAX_COLUMNS).contains(&grid.columns));
            assert!((MIN_ROWS..=MAX_ROWS).contains(&grid.rows));
            assert!(grid.cells() as usize >= n, "grid too small for {}", n);

            for r in MIN_ROWS..=MAX_ROWS {
                for c in MIN_COLUMNS..=MAX_COLUMNS {
                    let area = (c * r) as usize;
                    if area >= n {
                        assert!(area >= grid.cells() as usize, "{}x{} beats {:?} for {}", c, r, grid, n);
                    }
                }
            }
        }
    }

    #[test]
    fn test_grid_tie_prefers_fewer_rows() {
        // 12 cells: 6x2, 4x3 and 3x4 all fit exactly
        assert_eq!(grid_for(12), Grid { columns: 6, rows: 2 });
        // Single card plus back face
        assert_eq!(grid_for(2), Grid { columns: 2, rows: 2 });
        assert_eq!(grid_for(70), Grid { columns: 10, rows: 7 });
    }

    #[test]
    fn test_grid_oversized_request_gets_largest() {
        assert_eq!(grid_for(500), Grid { columns: MAX_COLUMNS, rows: MAX_ROWS });
    }

    #[test]
    fn test_slot_position_is_bijection() {
        for r in MIN_ROWS..=MAX_ROWS {
            for c in MIN_COLUMNS..=MAX_COLUMNS {
                let grid = Grid { columns: c, rows: r };
                let seen: HashSet<_> = (0..grid.cells()).map(|id| grid.position(id)).collect();
                assert_eq!(seen.len() as u32, grid.cells());
                assert!(seen.iter().all(|&(col, row)| col < c && row < r));
            }
        }
    }

    #[test]
    fn test_slot_position_row_major() {
        assert_eq!(slot_position(0, 4), (0, 0));
        assert_eq!(slot_position(3, 4), (3, 0));
        assert_eq!(slot_position(4, 4), (0, 1));
        assert_eq!(Grid { columns: 4, rows: 3 }.last_cell(), (3, 2));
    }
}
