use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of cells on the board
pub const CELL_COUNT: usize = 9;

/// The 8 winning triples, in detection order: rows, then columns, then diagonals.
///
/// When more than one triple is complete (unreachable through legal play),
/// the first one in this order decides the winner.
pub const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Symbol placed on a cell. `X` always moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    pub fn other(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mark::X => "X",
            Mark::O => "O",
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a board stands: still open, won by a mark, or full without a winner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    InProgress,
    Won(Mark),
    Draw,
}

impl Outcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::InProgress)
    }
}

/// Fixed 9-cell board, row-major from the top-left corner.
///
/// Boards are values: placing a mark returns a new board and leaves the
/// original untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    cells: [Option<Mark>; CELL_COUNT],
}

impl Board {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a board from raw cells.
    pub fn from_cells(cells: [Option<Mark>; CELL_COUNT]) -> Self {
        Self { cells }
    }

    /// Cell contents, or `None` when `index` is off the board.
    pub fn get(&self, index: usize) -> Option<Option<Mark>> {
        self.cells.get(index).copied()
    }

    pub fn is_empty_cell(&self, index: usize) -> bool {
        matches!(self.get(index), Some(None))
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Returns a copy of this board with `mark` at `index`.
    ///
    /// Callers must have checked that `index` is on the board and empty.
    pub(crate) fn with_mark(&self, index: usize, mark: Mark) -> Self {
        let mut cells = self.cells;
        cells[index] = Some(mark);
        Self { cells }
    }

    /// First complete triple's mark, scanning [`LINES`] in order.
    pub fn winner(&self) -> Option<Mark> {
        LINES.iter().find_map(|&[a, b, c]| match self.cells[a] {
            Some(mark) if self.cells[b] == Some(mark) && self.cells[c] == Some(mark) => {
                Some(mark)
            }
            _ => None,
        })
    }

    pub fn outcome(&self) -> Outcome {
        match self.winner() {
            Some(mark) => Outcome::Won(mark),
            None if self.is_full() => Outcome::Draw,
            None => Outcome::InProgress,
        }
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, chunk) in self.cells.chunks(3).enumerate() {
            if row > 0 {
                writeln!(f, "---+---+---")?;
            }
            let line: Vec<String> = chunk
                .iter()
                .enumerate()
                .map(|(col, cell)| match cell {
                    Some(mark) => format!(" {} ", mark),
                    None => format!(" {} ", row * 3 + col),
                })
                .collect();
            writeln!(f, "{}", line.join("|"))?;
        }
        Ok(())
    }
}
