//! N-tuple network: a linear value function over four lookup tables.
//!
//! Each table is keyed by a tuple of board cells read in mixed-radix base
//! [`MAX_INDEX`]. Estimation and adjustment both walk the same fixed set of
//! board orientations: identity, 180 degrees, 90 CCW, 90 CW. Only those four
//! rotations are visited; the remaining reflection symmetry is baked into
//! the table geometry (two laterally asymmetric 6-tuples plus two symmetric
//! column 4-tuples). The traversal order is load-bearing for trained weight
//! files; changing it invalidates them.

use crate::engine::Board;
use crate::weights::{WeightError, WeightTable};

/// Exclusive upper bound on cell indices seen by the tables. Bounds the
/// reachable face to `fib(23)`.
pub const MAX_INDEX: usize = 24;

/// Cell tuples backing the four tables, in table order.
pub const FEATURES: [&[usize]; 4] = [
    &[0, 1, 4, 5, 8, 9],
    &[1, 2, 5, 6, 9, 10],
    &[2, 6, 10, 14],
    &[3, 7, 11, 15],
];

/// Mixed-radix index of `positions` on `board`, base [`MAX_INDEX`].
///
/// Each cell is clamped to `MAX_INDEX - 1` first, so a corrupt or overflowed
/// cell can never index out of a table. Do not remove the clamp.
#[inline]
pub fn extract_index(board: &Board, positions: &[usize]) -> usize {
    positions.iter().fold(0, |index, &p| {
        index * MAX_INDEX + (board.get(p) as usize).min(MAX_INDEX - 1)
    })
}

/// The four-table bank with symmetry-shared estimation and adjustment.
pub struct Network {
    tables: Vec<WeightTable>,
}

impl Network {
    /// Allocate the bank with all entries zero (~1.53 GiB).
    pub fn new() -> Self {
        let tables = FEATURES
            .iter()
            .map(|f| WeightTable::zeroed(MAX_INDEX.pow(f.len() as u32)))
            .collect();
        Network { tables }
    }

    /// Adopt a loaded bank, verifying it matches the feature geometry.
    pub fn from_tables(tables: Vec<WeightTable>) -> Result<Self, WeightError> {
        if tables.len() != FEATURES.len() {
            return Err(WeightError::Shape);
        }
        for (table, feature) in tables.iter().zip(FEATURES) {
            if table.len() != MAX_INDEX.pow(feature.len() as u32) {
                return Err(WeightError::Shape);
            }
        }
        Ok(Network { tables })
    }

    #[inline]
    pub fn tables(&self) -> &[WeightTable] {
        &self.tables
    }

    /// Estimated value of an after-state: the sum of all table entries
    /// touched across the orientation traversal (no averaging).
    pub fn value(&self, after: &Board) -> f32 {
        let mut value = 0.0;
        for_each_orientation(after, |b| {
            for (k, index) in feature_indices(b).into_iter().enumerate() {
                value += self.tables[k][index];
            }
        });
        value
    }

    /// Move every entry touched by [`Network::value`] on `after` by
    /// `alpha * (target - value(after))`.
    pub fn adjust(&mut self, after: &Board, target: f32, alpha: f32) {
        let delta = alpha * (target - self.value(after));
        let tables = &mut self.tables;
        for_each_orientation(after, |b| {
            for (k, index) in feature_indices(b).into_iter().enumerate() {
                tables[k][index] += delta;
            }
        });
    }
}

impl Default for Network {
    fn default() -> Self {
        Network::new()
    }
}

#[inline]
fn feature_indices(b: &Board) -> [usize; 4] {
    [
        extract_index(b, FEATURES[0]),
        extract_index(b, FEATURES[1]),
        extract_index(b, FEATURES[2]),
        extract_index(b, FEATURES[3]),
    ]
}

/// Run `visit` on the four traversal orientations of `board`.
///
/// Each step applies its rotation, visits, then inverts the rotation
/// exactly, so successive steps always start from the input orientation.
fn for_each_orientation(board: &Board, mut visit: impl FnMut(&Board)) {
    let mut tmp = *board;
    for step in 0..4 {
        match step {
            0 => {}
            1 => {
                tmp.rotate_left();
                tmp.rotate_left();
            }
            2 => tmp.rotate_left(),
            _ => tmp.rotate_right(),
        }
        visit(&tmp);
        match step {
            0 => {}
            1 => {
                tmp.rotate_right();
                tmp.rotate_right();
            }
            2 => tmp.rotate_right(),
            _ => tmp.rotate_left(),
        }
    }
}
