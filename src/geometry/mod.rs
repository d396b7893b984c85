use serde_derive::{Deserialize, Serialize};

use crate::vec::Vector;

/// An axis-aligned box between a lower-left vertex `v0` and an upper-right
/// vertex `v1`, used as the geometry of the box potentials.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisAlignedBox<const D: usize> {
    pub v0: Vector<D>,
    pub v1: Vector<D>,
}

impl<const D: usize> AxisAlignedBox<D> {
    pub fn new(v0: Vector<D>, v1: Vector<D>) -> Self {
        Self { v0, v1 }
    }

    /// Whether `position` lies strictly inside the box.
    pub fn contains(&self, position: &Vector<D>) -> bool {
        (0..D).all(|d| position[d] > self.v0[d] && position[d] < self.v1[d])
    }

    /// Shortest displacement from `position` to the box under the inclusion
    /// sense: zero inside, the per-axis overshoot outside.
    pub fn smallest_difference_inclusion(&self, position: &Vector<D>) -> Vector<D> {
        let mut difference = Vector::default();

        for d in 0..D {
            if position[d] < self.v0[d] {
                difference[d] = position[d] - self.v0[d];
            } else if position[d] > self.v1[d] {
                difference[d] = position[d] - self.v1[d];
            }
        }

        difference
    }

    /// Shortest displacement from `position` to the box boundary under the
    /// exclusion sense: zero outside, the smallest single-axis escape inside.
    pub fn smallest_difference_exclusion(&self, position: &Vector<D>) -> Vector<D> {
        if !self.contains(position) {
            return Vector::default();
        }

        // All axes are in range; find the face closest to the position.
        let mut best_axis = 0;
        let mut best_difference = 0.0;
        let mut best_distance = f32::MAX;

        for d in 0..D {
            let to_lower = position[d] - self.v0[d];
            let to_upper = position[d] - self.v1[d];

            if to_lower.abs() < best_distance {
                best_distance = to_lower.abs();
                best_difference = to_lower;
                best_axis = d;
            }
            if to_upper.abs() < best_distance {
                best_distance = to_upper.abs();
                best_difference = to_upper;
                best_axis = d;
            }
        }

        let mut difference = Vector::default();

        difference[best_axis] = best_difference;

        difference
    }
}
