//! The grid, its cells, and the three rules that act on it.
//!
//! Row 0 is the top of the board, row 5 the bottom. Pieces fall, so a
//! column always fills from row 5 upward.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of rows on the board.
pub const ROWS: usize = 6;

/// Number of columns on the board.
pub const COLS: usize = 7;

/// Scan directions for [`Grid::detect_line`], in scan order:
/// right, down, down-right, down-left.
const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

// ---------------------------------------------------------------------------
// Seat
// ---------------------------------------------------------------------------

/// Which side of the board a piece belongs to.
///
/// `First` is the participant who moves first in a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Seat {
    First,
    Second,
}

impl Seat {
    /// Returns the opposing seat.
    pub fn other(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }

    /// Seat number as shown to clients: 1 or 2.
    pub fn number(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }

    /// Index into a two-element participant array.
    pub fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seat-{}", self.number())
    }
}

// ---------------------------------------------------------------------------
// Cell
// ---------------------------------------------------------------------------

/// A single board position.
///
/// On the wire a cell is a bare number: `0` empty, `1` first seat,
/// `2` second seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cell {
    #[default]
    Empty,
    Taken(Seat),
}

impl Cell {
    /// Returns the owning seat, or `None` for an empty cell.
    pub fn owner(self) -> Option<Seat> {
        match self {
            Self::Empty => None,
            Self::Taken(seat) => Some(seat),
        }
    }

    fn code(self) -> u8 {
        match self {
            Self::Empty => 0,
            Self::Taken(seat) => seat.number(),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(Self::Empty),
            1 => Ok(Self::Taken(Seat::First)),
            2 => Ok(Self::Taken(Seat::Second)),
            other => Err(serde::de::Error::custom(format!(
                "invalid cell value {other}, expected 0, 1 or 2"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// MoveError
// ---------------------------------------------------------------------------

/// Why [`Grid::apply_move`] refused a move. The grid is untouched in both
/// cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("column {0} is out of range")]
    OutOfRange(usize),

    #[error("column {0} is full")]
    ColumnFull(usize),
}

// ---------------------------------------------------------------------------
// Line
// ---------------------------------------------------------------------------

/// Four contiguous same-owner cells found by [`Grid::detect_line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line {
    /// Whose pieces form the line.
    pub owner: Seat,
    /// `(row, column)` of each cell, starting from the scan origin.
    pub cells: [(usize, usize); 4],
}

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

/// The 6×7 playing grid.
///
/// `apply_move` is the only way to write to it; everything else reads.
/// The automated opponent simulates moves on `Copy`s of the session grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid {
    cells: [[Cell; COLS]; ROWS],
}

impl Grid {
    /// Creates an empty grid.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cell at `(row, col)`. Panics if out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Cell {
        self.cells[row][col]
    }

    /// Returns `true` if `col` has no empty cell left (or doesn't exist).
    pub fn is_column_full(&self, col: usize) -> bool {
        col >= COLS || self.cells[0][col] != Cell::Empty
    }

    /// Drops a piece for `seat` into `col`.
    ///
    /// The piece lands in the lowest empty row, scanning from the bottom.
    /// Returns that row.
    ///
    /// # Errors
    /// [`MoveError::OutOfRange`] if `col >= COLS`, [`MoveError::ColumnFull`]
    /// if there's no room. Neither case mutates the grid.
    pub fn apply_move(&mut self, col: usize, seat: Seat) -> Result<usize, MoveError> {
        if col >= COLS {
            return Err(MoveError::OutOfRange(col));
        }

        for row in (0..ROWS).rev() {
            if self.cells[row][col] == Cell::Empty {
                self.cells[row][col] = Cell::Taken(seat);
                return Ok(row);
            }
        }

        Err(MoveError::ColumnFull(col))
    }

    /// Looks for four in a line anywhere on the board.
    ///
    /// Cells are visited in row-major order; from each occupied cell the
    /// four directions right, down, down-right, down-left are checked in that
    /// order. The first hit wins, so the result is reproducible even when
    /// several lines exist at once.
    pub fn detect_line(&self) -> Option<Line> {
        for row in 0..ROWS {
            for col in 0..COLS {
                let Some(owner) = self.cells[row][col].owner() else {
                    continue;
                };
                for (dr, dc) in DIRECTIONS {
                    if let Some(cells) = self.run_from(row, col, dr, dc, owner) {
                        return Some(Line { owner, cells });
                    }
                }
            }
        }
        None
    }

    /// Returns `true` when no further move is possible.
    ///
    /// Checking the top row is enough: columns fill bottom-up, so a column
    /// with a piece in row 0 is full.
    pub fn is_full(&self) -> bool {
        self.cells[0].iter().all(|cell| *cell != Cell::Empty)
    }

    /// Number of pieces `seat` has on the board.
    pub fn count(&self, seat: Seat) -> usize {
        self.cells
            .iter()
            .flatten()
            .filter(|cell| cell.owner() == Some(seat))
            .count()
    }

    /// Iterates over the rows, top first.
    pub fn rows(&self) -> impl Iterator<Item = &[Cell; COLS]> {
        self.cells.iter()
    }

    fn run_from(
        &self,
        row: usize,
        col: usize,
        dr: isize,
        dc: isize,
        owner: Seat,
    ) -> Option<[(usize, usize); 4]> {
        let mut cells = [(0, 0); 4];
        for (k, slot) in cells.iter_mut().enumerate() {
            let r = row.checked_add_signed(dr * k as isize)?;
            let c = col.checked_add_signed(dc * k as isize)?;
            if r >= ROWS || c >= COLS || self.cells[r][c] != Cell::Taken(owner) {
                return None;
            }
            *slot = (r, c);
        }
        Some(cells)
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.cells {
            for cell in row {
                let ch = match cell {
                    Cell::Empty => '.',
                    Cell::Taken(Seat::First) => 'X',
                    Cell::Taken(Seat::Second) => 'O',
                };
                write!(f, "{ch}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
