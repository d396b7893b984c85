use std::collections::HashSet;

use crate::boundary::Boundary;
use crate::cells::CellList;
use crate::pool::TaskPool;
use crate::potentials::{ExternalPotential, PairPotential};
use crate::store::ParticleStore;
use crate::system::{ConfigError, System};
use crate::vec::Vector;

/// The per-step force evaluator.
///
/// Dispatch is type-indexed: a table per type for external potentials and a
/// dense symmetric `n_types x n_types` table for pair potentials, both built
/// once from the system descriptor. When pair potentials exist, a cell list
/// over `max(cutoff)` restricted to the participating types accelerates the
/// neighbor sums.
pub struct ForceField<const D: usize> {
    external: Vec<ExternalPotential<D>>,
    pair: Vec<PairPotential>,
    o1_by_type: Vec<Vec<usize>>,
    o2_by_pair: Vec<Vec<usize>>,
    cells: Option<CellList<D>>,
    boundary: Boundary<D>,
    n_types: usize,
}

impl<const D: usize> ForceField<D> {
    pub fn new(system: &System<D>) -> Result<Self, ConfigError> {
        let n_types = system.n_types();

        let mut o1_by_type = vec![Vec::new(); n_types];

        for (index, potential) in system.external_potentials.iter().enumerate() {
            for type_id in 0..n_types {
                if potential.supports_type(type_id) {
                    o1_by_type[type_id].push(index);
                }
            }
        }

        let mut o2_by_pair = vec![Vec::new(); n_types * n_types];

        for (index, potential) in system.pair_potentials.iter().enumerate() {
            for a in 0..n_types {
                for b in 0..n_types {
                    if potential.supports_pair(a, b) {
                        o2_by_pair[a * n_types + b].push(index);
                    }
                }
            }
        }

        let cells = if system.pair_potentials.is_empty() {
            None
        } else {
            let cutoff = system
                .pair_potentials
                .iter()
                .map(PairPotential::cutoff)
                .fold(0.0f32, f32::max);

            let mut cells = CellList::new(system.boundary, cutoff, 2)?;

            // Inert types stay out of the chains entirely.
            let mut active = HashSet::new();

            for a in 0..n_types {
                for b in 0..n_types {
                    if !o2_by_pair[a * n_types + b].is_empty() {
                        active.insert(a);
                        active.insert(b);
                    }
                }
            }

            cells.set_active_types(active);

            Some(cells)
        };

        Ok(Self {
            external: system.external_potentials.clone(),
            pair: system.pair_potentials.clone(),
            o1_by_type,
            o2_by_pair,
            cells,
            boundary: system.boundary,
            n_types,
        })
    }

    pub fn has_pair_potentials(&self) -> bool {
        self.cells.is_some()
    }

    /// Computes every live particle's force from the current configuration.
    /// Parallel per particle; tasks write their own force slots and only
    /// read neighbor data.
    pub fn evaluate(&mut self, store: &mut ParticleStore<D>, pool: &TaskPool) {
        if let Some(cells) = &mut self.cells {
            cells.update(store, pool);
        }

        let external = &self.external;
        let pair = &self.pair;
        let o1_by_type = &self.o1_by_type;
        let o2_by_pair = &self.o2_by_pair;
        let cells = &self.cells;
        let boundary = self.boundary;
        let n_types = self.n_types;

        store.for_each_force_mut(pool, |id, position, type_id, force, view| {
            *force = Vector::default();

            for &index in &o1_by_type[type_id] {
                *force += external[index].force(position);
            }

            if let Some(cells) = cells {
                if cells.is_active(type_id) {
                    cells.for_each_neighbor(id, position, |neighbor| {
                        let neighbor_position = view.position(neighbor);
                        let neighbor_type = view.type_of(neighbor);

                        for &index in &o2_by_pair[type_id * n_types + neighbor_type] {
                            *force += pair[index].force(position, neighbor_position, &boundary);
                        }
                    });
                }
            }
        });
    }
}
