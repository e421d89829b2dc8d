//! Game state and move mechanics for Fibonacci 2048.
//!
//! The board is a 4x4 grid of small cell indices. A cell holds a Fibonacci
//! *index*, not a face value: index 0 is the empty cell and index `k > 0`
//! denotes the tile whose face is `fib(k)`. Two tiles merge iff their indices
//! are consecutive (or both are 1, the 1+1 -> 2 kick-off), producing
//! `max + 1`. Face values only appear at the text I/O boundary.
//!
//! Linear cell addressing (row-major):
//!
//! ```text
//!  (0)  (1)  (2)  (3)
//!  (4)  (5)  (6)  (7)
//!  (8)  (9) (10) (11)
//! (12) (13) (14) (15)
//! ```

use std::fmt;
use std::str::FromStr;

/// A single cell: a Fibonacci index, 0 for empty.
pub type Cell = u8;

/// Merge reward of a move, or -1 for an illegal move/placement.
pub type Reward = i32;

/// Fibonacci faces for cell indices 0..=32. Index 0 doubles as the empty cell.
pub const FIBONACCI: [u32; 33] = [
    0, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144, 233, 377, 610, 987, 1597, 2584, 4181, 6765, 10946,
    17711, 28657, 46368, 75025, 121393, 196418, 317811, 514229, 832040, 1346269, 2178309, 3524578,
];

/// Face value of cell index `i`.
#[inline]
pub fn fib(i: Cell) -> u32 {
    FIBONACCI[i as usize]
}

/// Inverse of [`fib`]: the cell index whose face is `face`, if any.
pub fn r_fib(face: u32) -> Option<Cell> {
    FIBONACCI.iter().position(|&f| f == face).map(|i| i as Cell)
}

/// A slide direction. Discriminants match the wire opcode: the low two bits
/// of an opcode select the direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Move {
    Up = 0,
    Right = 1,
    Down = 2,
    Left = 3,
}

impl Move {
    /// All directions in opcode order.
    pub const ALL: [Move; 4] = [Move::Up, Move::Right, Move::Down, Move::Left];

    /// Decode a direction from the low two bits of an opcode.
    #[inline]
    pub fn from_opcode(op: u8) -> Move {
        match op & 0b11 {
            0 => Move::Up,
            1 => Move::Right,
            2 => Move::Down,
            _ => Move::Left,
        }
    }

    #[inline]
    pub fn opcode(self) -> u8 {
        self as u8
    }
}

/// Array-based 4x4 board.
///
/// Equality is structural over the cells; the `attr` word is opaque episode
/// metadata carried alongside the grid and never consulted here.
#[derive(Clone, Copy, Eq)]
pub struct Board {
    cells: [Cell; 16],
    attr: u64,
}

impl PartialEq for Board {
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells
    }
}

impl Default for Board {
    fn default() -> Self {
        Board::EMPTY
    }
}

impl Board {
    pub const EMPTY: Board = Board { cells: [0; 16], attr: 0 };

    pub fn from_cells(cells: [Cell; 16]) -> Self {
        Board { cells, attr: 0 }
    }

    /// The raw cell array, row-major.
    #[inline]
    pub fn cells(&self) -> [Cell; 16] {
        self.cells
    }

    #[inline]
    pub fn get(&self, pos: usize) -> Cell {
        self.cells[pos]
    }

    #[inline]
    pub fn set(&mut self, pos: usize, cell: Cell) {
        self.cells[pos] = cell;
    }

    #[inline]
    fn at(&self, row: usize, col: usize) -> Cell {
        self.cells[row * 4 + col]
    }

    /// Opaque attribute word (episode metadata).
    #[inline]
    pub fn info(&self) -> u64 {
        self.attr
    }

    /// Replace the attribute word, returning the previous value.
    #[inline]
    pub fn set_info(&mut self, attr: u64) -> u64 {
        std::mem::replace(&mut self.attr, attr)
    }

    /// Place a tile (index 1 or 2) at a linear position.
    ///
    /// Returns 0, or -1 when the position or tile is out of range.
    /// Overwriting a non-empty cell is allowed; choosing an empty position
    /// is the environment's job.
    pub fn place(&mut self, pos: usize, tile: Cell) -> Reward {
        if pos >= 16 {
            return -1;
        }
        if tile != 1 && tile != 2 {
            return -1;
        }
        self.cells[pos] = tile;
        0
    }

    /// Slide and merge tiles in a direction.
    ///
    /// Returns the sum of merge rewards, or -1 if the board is unchanged.
    pub fn slide(&mut self, dir: Move) -> Reward {
        match dir {
            Move::Up => self.slide_up(),
            Move::Right => self.slide_right(),
            Move::Down => self.slide_down(),
            Move::Left => self.slide_left(),
        }
    }

    fn slide_left(&mut self) -> Reward {
        let prev = *self;
        let mut score = 0;
        for r in 0..4 {
            let row = r * 4;
            let mut top = 0;
            let mut hold: Cell = 0;
            for c in 0..4 {
                let tile = self.cells[row + c];
                if tile == 0 {
                    continue;
                }
                self.cells[row + c] = 0;
                if hold != 0 {
                    if tile.abs_diff(hold) == 1 || (tile == 1 && hold == 1) {
                        let merged = tile.max(hold) + 1;
                        self.cells[row + top] = merged;
                        top += 1;
                        score += fib(merged) as Reward;
                        hold = 0;
                    } else {
                        self.cells[row + top] = hold;
                        top += 1;
                        hold = tile;
                    }
                } else {
                    hold = tile;
                }
            }
            if hold != 0 {
                self.cells[row + top] = hold;
            }
        }
        if *self != prev {
            score
        } else {
            -1
        }
    }

    fn slide_right(&mut self) -> Reward {
        self.reflect_horizontal();
        let score = self.slide_left();
        self.reflect_horizontal();
        score
    }

    fn slide_up(&mut self) -> Reward {
        self.rotate_right();
        let score = self.slide_right();
        self.rotate_left();
        score
    }

    fn slide_down(&mut self) -> Reward {
        self.rotate_right();
        let score = self.slide_left();
        self.rotate_left();
        score
    }

    pub fn transpose(&mut self) {
        for r in 0..4 {
            for c in r + 1..4 {
                self.cells.swap(r * 4 + c, c * 4 + r);
            }
        }
    }

    pub fn reflect_horizontal(&mut self) {
        for r in 0..4 {
            self.cells.swap(r * 4, r * 4 + 3);
            self.cells.swap(r * 4 + 1, r * 4 + 2);
        }
    }

    pub fn reflect_vertical(&mut self) {
        for c in 0..4 {
            self.cells.swap(c, 12 + c);
            self.cells.swap(4 + c, 8 + c);
        }
    }

    /// Clockwise quarter turn.
    pub fn rotate_right(&mut self) {
        self.transpose();
        self.reflect_horizontal();
    }

    /// Counterclockwise quarter turn.
    pub fn rotate_left(&mut self) {
        self.transpose();
        self.reflect_vertical();
    }

    /// 180-degree turn.
    pub fn reverse(&mut self) {
        self.reflect_horizontal();
        self.reflect_vertical();
    }

    pub fn num_empty(&self) -> i32 {
        self.cells.iter().filter(|&&c| c == 0).count() as i32
    }

    /// Sum of the four corner cell indices.
    pub fn corner_sum(&self) -> i32 {
        [0, 3, 12, 15].iter().map(|&p| self.cells[p] as i32).sum()
    }

    /// Length of the longest run of adjacent cells along a row or column
    /// whose indices step by exactly +1 or -1.
    ///
    /// The column scan seeds its counter at zero while the row scan seeds at
    /// one, so columns report one short of rows for the same pattern. Kept
    /// for parity with existing heuristic replays.
    pub fn monotonic(&self) -> i32 {
        let mut max_length = 0;
        for r in 0..4 {
            for direction in [1i32, -1] {
                let mut length = 1;
                for c in 0..3 {
                    if self.at(r, c) as i32 - self.at(r, c + 1) as i32 == direction {
                        length += 1;
                        max_length = max_length.max(length);
                    } else {
                        length = 1;
                    }
                }
            }
        }
        for c in 0..4 {
            for direction in [1i32, -1] {
                let mut length = 0;
                for r in 0..3 {
                    if self.at(r, c) as i32 - self.at(r + 1, c) as i32 == direction {
                        length += 1;
                        max_length = max_length.max(length);
                    } else {
                        length = 1;
                    }
                }
            }
        }
        max_length
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Board({:?})", self.cells)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "+------------------------+")?;
        for r in 0..4 {
            write!(f, "|")?;
            for c in 0..4 {
                write!(f, "{:6}", fib(self.at(r, c)))?;
            }
            writeln!(f, "|")?;
        }
        writeln!(f, "+------------------------+")
    }
}

/// Failure to read a board from its 16-face text form.
#[derive(thiserror::Error, Debug)]
pub enum ParseBoardError {
    #[error("expected 16 face values, found {0}")]
    WrongCount(usize),
    #[error("unparsable face value '{0}'")]
    NotANumber(String),
    #[error("{0} is not a Fibonacci face")]
    UnknownFace(u32),
}

impl FromStr for Board {
    type Err = ParseBoardError;

    /// Reads 16 decimal face values separated by any non-digit characters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut cells = [0 as Cell; 16];
        let mut n = 0;
        for token in s.split(|c: char| !c.is_ascii_digit()).filter(|t| !t.is_empty()) {
            if n == 16 {
                n += 1;
                break;
            }
            let face: u32 = token
                .parse()
                .map_err(|_| ParseBoardError::NotANumber(token.to_string()))?;
            cells[n] = r_fib(face).ok_or(ParseBoardError::UnknownFace(face))?;
            n += 1;
        }
        if n != 16 {
            return Err(ParseBoardError::WrongCount(n));
        }
        Ok(Board::from_cells(cells))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_with_row(row: [Cell; 4]) -> Board {
        let mut cells = [0; 16];
        cells[..4].copy_from_slice(&row);
        Board::from_cells(cells)
    }

    #[test]
    fn fib_codec_round_trips() {
        for i in 0..33u8 {
            assert_eq!(r_fib(fib(i)), Some(i));
        }
        assert_eq!(r_fib(4), None);
        assert_eq!(r_fib(6), None);
        assert_eq!(fib(23), 46368);
    }

    #[test]
    fn basic_merge() {
        // [1,1,0,0] -> [2,0,0,0], reward fib(2) = 2
        let mut b = board_with_row([1, 1, 0, 0]);
        assert_eq!(b.slide(Move::Left), 2);
        assert_eq!(b.cells()[..4], [2, 0, 0, 0]);
    }

    #[test]
    fn fibonacci_chain_merge() {
        // [2,3,0,0] -> [4,0,0,0], reward fib(4) = 5
        let mut b = board_with_row([2, 3, 0, 0]);
        assert_eq!(b.slide(Move::Left), 5);
        assert_eq!(b.cells()[..4], [4, 0, 0, 0]);
    }

    #[test]
    fn non_adjacent_indices_do_not_merge() {
        // [2,4,0,0] is already packed left and |2-4| != 1, so nothing moves
        let mut b = board_with_row([2, 4, 0, 0]);
        assert_eq!(b.slide(Move::Left), -1);
        assert_eq!(b.cells()[..4], [2, 4, 0, 0]);
    }

    #[test]
    fn gap_merge_earns_reward() {
        // [a,0,0,b] merges iff adjacent in the sequence once compacted
        let mut b = board_with_row([3, 0, 0, 4]);
        assert_eq!(b.slide(Move::Left), fib(5) as Reward);
        assert_eq!(b.cells()[..4], [5, 0, 0, 0]);

        let mut b = board_with_row([3, 0, 0, 5]);
        assert_eq!(b.slide(Move::Left), 0);
        assert_eq!(b.cells()[..4], [3, 5, 0, 0]);
    }

    #[test]
    fn leftmost_pair_has_priority() {
        // [1,1,1,0] -> [2,1,0,0]: third 1 is left without a partner
        let mut b = board_with_row([1, 1, 1, 0]);
        assert_eq!(b.slide(Move::Left), 2);
        assert_eq!(b.cells()[..4], [2, 1, 0, 0]);
    }

    #[test]
    fn merged_tile_does_not_merge_again() {
        // [1,1,2,0] -> [2,2,0,0] with reward 2, not [3,0,0,0]
        let mut b = board_with_row([1, 1, 2, 0]);
        assert_eq!(b.slide(Move::Left), 2);
        assert_eq!(b.cells()[..4], [2, 2, 0, 0]);
    }

    #[test]
    fn slide_right_mirrors_left() {
        let mut b = board_with_row([0, 0, 1, 1]);
        assert_eq!(b.slide(Move::Right), 2);
        assert_eq!(b.cells()[..4], [0, 0, 0, 2]);
    }

    #[test]
    fn slide_up_and_down_work_on_columns() {
        let mut cells = [0; 16];
        cells[0] = 2;
        cells[4] = 3;
        let mut b = Board::from_cells(cells);
        assert_eq!(b.slide(Move::Up), 5);
        assert_eq!(b.get(0), 4);
        assert_eq!(b.num_empty(), 15);

        let mut b = Board::from_cells(cells);
        assert_eq!(b.slide(Move::Down), 5);
        assert_eq!(b.get(12), 4);
    }

    #[test]
    fn alternating_board_has_no_legal_move() {
        let b = Board::from_cells([1, 3, 1, 3, 3, 1, 3, 1, 1, 3, 1, 3, 3, 1, 3, 1]);
        for dir in Move::ALL {
            let mut tmp = b;
            assert_eq!(tmp.slide(dir), -1);
            assert_eq!(tmp, b);
        }
    }

    #[test]
    fn cells_stay_in_domain_under_play() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(7);
        let mut b = Board::EMPTY;
        for _ in 0..500 {
            let pos = rng.gen_range(0..16);
            if b.get(pos) == 0 {
                b.place(pos, if rng.gen_range(0..10) < 9 { 1 } else { 2 });
            }
            let dir = Move::from_opcode(rng.gen_range(0..4));
            b.slide(dir);
            assert!(b.cells().iter().all(|&c| (c as usize) < crate::network::MAX_INDEX));
        }
    }

    #[test]
    fn place_validates_position_and_tile() {
        let mut b = Board::EMPTY;
        assert_eq!(b.place(16, 1), -1);
        assert_eq!(b.place(0, 3), -1);
        assert_eq!(b.place(0, 0), -1);
        assert_eq!(b.place(5, 2), 0);
        assert_eq!(b.get(5), 2);
        // overwriting an occupied cell is the caller's business, not an error
        assert_eq!(b.place(5, 1), 0);
        assert_eq!(b.get(5), 1);
    }

    #[test]
    fn transforms_are_involutions_or_cycles() {
        let b = Board::from_cells([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);

        let mut t = b;
        t.transpose();
        t.transpose();
        assert_eq!(t, b);

        let mut t = b;
        t.reflect_horizontal();
        t.reflect_horizontal();
        assert_eq!(t, b);

        let mut t = b;
        t.reflect_vertical();
        t.reflect_vertical();
        assert_eq!(t, b);

        let mut t = b;
        for _ in 0..4 {
            t.rotate_right();
        }
        assert_eq!(t, b);

        let mut t = b;
        t.rotate_right();
        t.rotate_right();
        let mut r = b;
        r.reverse();
        assert_eq!(t, r);

        let mut t = b;
        t.rotate_right();
        t.rotate_left();
        assert_eq!(t, b);
    }

    #[test]
    fn rotation_moves_cells_where_expected() {
        let mut b = Board::EMPTY;
        b.set(0, 5);
        b.rotate_right();
        assert_eq!(b.get(3), 5);
        b.rotate_right();
        assert_eq!(b.get(15), 5);
        b.rotate_left();
        assert_eq!(b.get(3), 5);
    }

    #[test]
    fn equality_ignores_attr() {
        let mut a = Board::EMPTY;
        let mut b = Board::EMPTY;
        a.set_info(42);
        assert_eq!(a, b);
        assert_eq!(a.set_info(7), 42);
        b.set_info(0);
        assert_eq!(a.info(), 7);
    }

    #[test]
    fn monotonic_counts_runs() {
        // full ascending row: run of 4
        let b = board_with_row([1, 2, 3, 4]);
        assert_eq!(b.monotonic(), 4);

        // descending pair only
        let b = board_with_row([5, 4, 0, 0]);
        assert!(b.monotonic() >= 2);

        // constant board has no +-1 step anywhere
        let b = Board::from_cells([2; 16]);
        assert_eq!(b.monotonic(), 0);

        // column runs count one short of row runs (legacy scan quirk)
        let mut cells = [0; 16];
        for r in 0..4 {
            cells[r * 4] = (r + 1) as Cell;
        }
        assert_eq!(Board::from_cells(cells).monotonic(), 3);
    }

    #[test]
    fn aggregates() {
        let b = Board::from_cells([3, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 5]);
        assert_eq!(b.num_empty(), 12);
        assert_eq!(b.corner_sum(), 11);
    }

    #[test]
    fn text_io_round_trips_faces() {
        let b = Board::from_cells([1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8, 0, 0, 0, 9]);
        let text = b.to_string();
        let parsed: Board = text.parse().unwrap();
        assert_eq!(parsed, b);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(matches!(
            "1 2 3".parse::<Board>(),
            Err(ParseBoardError::WrongCount(3))
        ));
        let bad = "4 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0";
        assert!(matches!(
            bad.parse::<Board>(),
            Err(ParseBoardError::UnknownFace(4))
        ));
    }
}
