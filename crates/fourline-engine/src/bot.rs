//! The automated opponent's move choice.

use crate::board::{COLS, Grid, Seat};

/// Column preference once there's nothing to win or block: center outward.
const PREFERENCE: [usize; COLS] = [3, 2, 4, 1, 5, 0, 6];

/// Picks a column for `me` to play on `grid`.
///
/// In order:
/// 1. a column where `me` completes a line,
/// 2. a column where `opponent` would complete a line (block it),
/// 3. the first non-full column in center-out order,
/// 4. column 0.
///
/// Only copies of `grid` are modified. Step 4 is only reached on a full
/// grid, which the caller never offers.
pub fn choose_column(grid: &Grid, me: Seat, opponent: Seat) -> usize {
    if let Some(col) = winning_column(grid, me) {
        return col;
    }
    if let Some(col) = winning_column(grid, opponent) {
        return col;
    }
    PREFERENCE
        .into_iter()
        .find(|&col| !grid.is_column_full(col))
        .unwrap_or(0)
}

/// Lowest-index column where `seat` would complete a line of its own.
fn winning_column(grid: &Grid, seat: Seat) -> Option<usize> {
    (0..COLS).find(|&col| {
        let mut trial = *grid;
        trial.apply_move(col, seat).is_ok()
            && trial.detect_line().is_some_and(|line| line.owner == seat)
    })
}
