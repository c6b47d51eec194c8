//! Hex coordinate system for the EC4X starmap
//!
//! Systems sit on an axial hex grid. Adjacency between systems is defined
//! by jump lanes, not by grid neighborhood; coordinates exist for map
//! layout and distance heuristics.

use serde::{Deserialize, Serialize};

/// An axial hex coordinate.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub struct Hex {
    pub q: i32,
    pub r: i32,
}

impl Hex {
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    pub const fn origin() -> Self {
        Self::new(0, 0)
    }

    /// Hex distance in grid steps (axial metric).
    pub fn distance_to(&self, other: &Hex) -> u32 {
        let dq = self.q - other.q;
        let dr = self.r - other.r;
        let ds = dq + dr;
        (dq.unsigned_abs() + dr.unsigned_abs() + ds.unsigned_abs()) / 2
    }

    /// The six neighboring grid cells, clockwise from east.
    pub fn neighbors(&self) -> [Hex; 6] {
        [
            Hex::new(self.q + 1, self.r),
            Hex::new(self.q + 1, self.r - 1),
            Hex::new(self.q, self.r - 1),
            Hex::new(self.q - 1, self.r),
            Hex::new(self.q - 1, self.r + 1),
            Hex::new(self.q, self.r + 1),
        ]
    }
}

impl std::fmt::Display for Hex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.q, self.r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_axial() {
        let a = Hex::new(0, 0);
        assert_eq!(a.distance_to(&Hex::new(3, 0)), 3);
        assert_eq!(a.distance_to(&Hex::new(0, -2)), 2);
        assert_eq!(a.distance_to(&Hex::new(2, -1)), 2);
        // Moving along +q/-r diagonals costs one step per hex.
        assert_eq!(a.distance_to(&Hex::new(1, -1)), 1);
    }

    #[test]
    fn neighbors_are_at_distance_one() {
        let center = Hex::new(4, -2);
        for n in center.neighbors() {
            assert_eq!(center.distance_to(&n), 1);
        }
    }
}
