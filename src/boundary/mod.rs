use serde_derive::{Deserialize, Serialize};

use crate::vec::Vector;

/// The simulation box, centered at the origin.
///
/// When `periodic` is set, positions wrap into `[-extent/2, extent/2)` on
/// every axis and displacements follow the minimum-image convention.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boundary<const D: usize> {
    pub extents: Vector<D>,
    pub periodic: bool,
}

impl<const D: usize> Boundary<D> {
    pub fn periodic(extents: [f32; D]) -> Self {
        Self {
            extents: Vector::new(extents),
            periodic: true,
        }
    }

    pub fn open(extents: [f32; D]) -> Self {
        Self {
            extents: Vector::new(extents),
            periodic: false,
        }
    }

    /// Wraps `position` back into the box. A no-op for open boxes.
    pub fn wrap(&self, position: &mut Vector<D>) {
        if !self.periodic {
            return;
        }

        for d in 0..D {
            let half = 0.5 * self.extents[d];

            while position[d] >= half {
                position[d] -= self.extents[d];
            }
            while position[d] < -half {
                position[d] += self.extents[d];
            }
        }
    }

    /// The displacement from `p1` to `p2` with the smallest magnitude over
    /// all periodic images.
    pub fn shortest_difference(&self, p1: &Vector<D>, p2: &Vector<D>) -> Vector<D> {
        let mut difference = *p2 - *p1;

        self.wrap(&mut difference);

        difference
    }

    pub fn distance_squared(&self, p1: &Vector<D>, p2: &Vector<D>) -> f32 {
        self.shortest_difference(p1, p2).mag_squared()
    }
}

#[cfg(test)]
mod test {
    use super::Boundary;
    use crate::vec::Vector;

    #[test]
    fn wrap_into_box() {
        let boundary = Boundary::periodic([10.0, 10.0]);
        let mut position = Vector::new([6.0, -17.0]);

        boundary.wrap(&mut position);

        assert_eq!(position, Vector::new([-4.0, 3.0]));
    }

    #[test]
    fn wrap_is_idempotent() {
        let boundary = Boundary::periodic([5.0, 5.0]);
        let mut once = Vector::new([7.25, -3.75]);

        boundary.wrap(&mut once);

        let mut twice = once;

        boundary.wrap(&mut twice);

        assert_eq!(once, twice);
    }

    #[test]
    fn upper_bound_is_exclusive() {
        let boundary = Boundary::periodic([10.0, 10.0]);
        let mut position = Vector::new([5.0, -5.0]);

        boundary.wrap(&mut position);

        assert_eq!(position, Vector::new([-5.0, -5.0]));
    }

    #[test]
    fn open_box_does_not_wrap() {
        let boundary = Boundary::open([10.0, 10.0]);
        let mut position = Vector::new([17.0, -12.0]);

        boundary.wrap(&mut position);

        assert_eq!(position, Vector::new([17.0, -12.0]));
    }

    #[test]
    fn shortest_difference_crosses_the_seam() {
        let boundary = Boundary::periodic([10.0, 10.0]);
        let p1 = Vector::new([4.5, 0.0]);
        let p2 = Vector::new([-4.5, 0.0]);

        let difference = boundary.shortest_difference(&p1, &p2);

        assert_eq!(difference, Vector::new([1.0, 0.0]));
        assert!((boundary.distance_squared(&p1, &p2) - 1.0).abs() < 1e-6);
    }
}
