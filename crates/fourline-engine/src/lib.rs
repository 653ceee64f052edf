//! Board engine for fourline.
//!
//! Everything in this crate is a pure function of its inputs: no shared
//! state, no I/O, no clocks. The session layer calls into it synchronously
//! while holding the coordinator lock.
//!
//! - [`Grid`]: the 6×7 board, [`Grid::apply_move`], [`Grid::detect_line`],
//!   [`Grid::is_full`]
//! - [`choose_column`]: the automated opponent's heuristic

mod board;
mod bot;

pub use board::{Cell, Grid, Line, MoveError, Seat, COLS, ROWS};
pub use bot::choose_column;
