use serde_derive::{Deserialize, Serialize};

use crate::boundary::Boundary;
use crate::geometry::AxisAlignedBox;
use crate::vec::Vector;

/// An external (first-order) potential acting on a single particle type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExternalPotential<const D: usize> {
    /// The bistable double well `k (x0^2 - 1)^2 + k x1^2`.
    DoubleWell { particle_type: usize, k: f32 },
    /// A harmonic restraint pulling particles back into a box.
    BoxInclusion {
        particle_type: usize,
        geometry: AxisAlignedBox<D>,
        k: f32,
    },
    /// A harmonic restraint pushing particles out of a box.
    BoxExclusion {
        particle_type: usize,
        geometry: AxisAlignedBox<D>,
        k: f32,
    },
}

impl<const D: usize> ExternalPotential<D> {
    pub fn particle_type(&self) -> usize {
        match self {
            Self::DoubleWell { particle_type, .. }
            | Self::BoxInclusion { particle_type, .. }
            | Self::BoxExclusion { particle_type, .. } => *particle_type,
        }
    }

    pub fn supports_type(&self, type_id: usize) -> bool {
        self.particle_type() == type_id
    }

    pub fn energy(&self, position: &Vector<D>) -> f32 {
        match self {
            Self::DoubleWell { k, .. } => {
                let x0 = position[0];
                let mut energy = k * (x0 * x0 - 1.0) * (x0 * x0 - 1.0);

                if D > 1 {
                    energy += k * position[1] * position[1];
                }

                energy
            }
            Self::BoxInclusion { geometry, k, .. } => {
                0.5 * k * geometry.smallest_difference_inclusion(position).mag_squared()
            }
            Self::BoxExclusion { geometry, k, .. } => {
                0.5 * k * geometry.smallest_difference_exclusion(position).mag_squared()
            }
        }
    }

    pub fn force(&self, position: &Vector<D>) -> Vector<D> {
        match self {
            Self::DoubleWell { k, .. } => {
                let x0 = position[0];
                let mut force = Vector::default();

                force[0] = -4.0 * k * x0 * x0 * x0 + 4.0 * k * x0;
                if D > 1 {
                    force[1] = -2.0 * k * position[1];
                }

                force
            }
            Self::BoxInclusion { geometry, k, .. } => {
                geometry.smallest_difference_inclusion(position) * -k
            }
            Self::BoxExclusion { geometry, k, .. } => {
                geometry.smallest_difference_exclusion(position) * -k
            }
        }
    }
}

/// A pair (second-order) potential with a finite cutoff. Pair keys are
/// symmetric: `supports_pair(a, b)` equals `supports_pair(b, a)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PairPotential {
    /// Harmonic repulsion below `cutoff`; `types: None` repels every pair.
    HarmonicRepulsion {
        cutoff: f32,
        k: f32,
        types: Option<(usize, usize)>,
    },
}

impl PairPotential {
    pub fn cutoff(&self) -> f32 {
        match self {
            Self::HarmonicRepulsion { cutoff, .. } => *cutoff,
        }
    }

    pub fn supports_pair(&self, a: usize, b: usize) -> bool {
        match self {
            Self::HarmonicRepulsion { types, .. } => match types {
                Some((t1, t2)) => (a, b) == (*t1, *t2) || (b, a) == (*t1, *t2),
                None => true,
            },
        }
    }

    pub fn energy<const D: usize>(
        &self,
        x1: &Vector<D>,
        x2: &Vector<D>,
        boundary: &Boundary<D>,
    ) -> f32 {
        match self {
            Self::HarmonicRepulsion { cutoff, k, .. } => {
                let d_squared = boundary.distance_squared(x1, x2);

                if d_squared < cutoff * cutoff {
                    let overlap = d_squared.sqrt() - cutoff;

                    0.5 * k * overlap * overlap
                } else {
                    0.0
                }
            }
        }
    }

    /// The force exerted on the particle at `x1`, using the shortest-image
    /// displacement to `x2`.
    pub fn force<const D: usize>(
        &self,
        x1: &Vector<D>,
        x2: &Vector<D>,
        boundary: &Boundary<D>,
    ) -> Vector<D> {
        match self {
            Self::HarmonicRepulsion { cutoff, k, .. } => {
                let difference = boundary.shortest_difference(x1, x2);
                let d_squared = difference.mag_squared();

                if d_squared < cutoff * cutoff && d_squared > 0.0 {
                    let distance = d_squared.sqrt();

                    difference * (k * (distance - cutoff) / distance)
                } else {
                    Vector::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::{ExternalPotential, PairPotential};
    use crate::boundary::Boundary;
    use crate::geometry::AxisAlignedBox;
    use crate::vec::Vector;

    #[test]
    fn double_well_has_minima_at_plus_minus_one() {
        let well = ExternalPotential::<2>::DoubleWell {
            particle_type: 0,
            k: 1.0,
        };

        assert_eq!(well.force(&Vector::new([1.0, 0.0])), Vector::default());
        assert_eq!(well.force(&Vector::new([-1.0, 0.0])), Vector::default());

        // The barrier at the origin pushes nowhere along x0 but the energy
        // is maximal there.
        assert!(well.energy(&Vector::new([0.0, 0.0])) > well.energy(&Vector::new([1.0, 0.0])));

        // Off-axis displacement is pulled back harmonically.
        assert_eq!(
            well.force(&Vector::new([1.0, 0.5])),
            Vector::new([0.0, -1.0])
        );
    }

    #[test]
    fn double_well_force_matches_gradient() {
        let well = ExternalPotential::<2>::DoubleWell {
            particle_type: 0,
            k: 2.0,
        };
        let x = Vector::new([0.7, -0.3]);

        // (-4 k x^3 + 4 k x, -2 k y)
        let expected = Vector::new([
            -4.0 * 2.0 * 0.7f32.powi(3) + 4.0 * 2.0 * 0.7,
            -2.0 * 2.0 * -0.3,
        ]);

        let force = well.force(&x);

        assert!((force[0] - expected[0]).abs() < 1e-6);
        assert!((force[1] - expected[1]).abs() < 1e-6);
    }

    #[test]
    fn box_inclusion_pulls_back_inside() {
        let potential = ExternalPotential::BoxInclusion {
            particle_type: 0,
            geometry: AxisAlignedBox::new(Vector::new([-1.0, -1.0]), Vector::new([1.0, 1.0])),
            k: 2.0,
        };

        assert_eq!(
            potential.force(&Vector::new([0.0, 0.0])),
            Vector::default()
        );
        assert_eq!(
            potential.force(&Vector::new([1.5, 0.0])),
            Vector::new([-1.0, 0.0])
        );
    }

    #[test]
    fn harmonic_repulsion_acts_below_cutoff() {
        let repulsion = PairPotential::HarmonicRepulsion {
            cutoff: 1.0,
            k: 1.0,
            types: None,
        };
        let boundary = Boundary::periodic([10.0, 10.0]);

        let x1 = Vector::new([0.0, 0.0]);
        let x2 = Vector::new([0.5, 0.0]);

        // Separation 0.5 under unit cutoff: the force on x1 points away
        // from x2 with magnitude k * (cutoff - d).
        assert_eq!(
            repulsion.force(&x1, &x2, &boundary),
            Vector::new([-0.5, 0.0])
        );

        // Beyond the cutoff nothing happens.
        let far = Vector::new([2.0, 0.0]);

        assert_eq!(repulsion.force(&x1, &far, &boundary), Vector::default());
        assert_eq!(repulsion.energy(&x1, &far, &boundary), 0.0);
    }

    #[test]
    fn harmonic_repulsion_uses_the_shortest_image() {
        let repulsion = PairPotential::HarmonicRepulsion {
            cutoff: 1.0,
            k: 1.0,
            types: None,
        };
        let boundary = Boundary::periodic([10.0, 10.0]);

        let x1 = Vector::new([-4.8, 0.0]);
        let x2 = Vector::new([4.8, 0.0]);

        // The images are 0.4 apart across the seam; x2 lies at lower x in
        // the nearest image, so x1 is pushed towards +x.
        let force = repulsion.force(&x1, &x2, &boundary);

        assert!(force[0] > 0.0);
        assert!((force[0] - 0.6).abs() < 1e-5);
    }

    #[test]
    fn pair_filters_are_symmetric() {
        let repulsion = PairPotential::HarmonicRepulsion {
            cutoff: 1.0,
            k: 1.0,
            types: Some((0, 1)),
        };

        assert!(repulsion.supports_pair(0, 1));
        assert!(repulsion.supports_pair(1, 0));
        assert!(!repulsion.supports_pair(0, 0));
        assert!(!repulsion.supports_pair(1, 1));
    }
}
