use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use rand_distr::StandardNormal;

use crate::boundary::Boundary;
use crate::cells::CellList;
use crate::pool::TaskPool;
use crate::reactions::{ReactionO1, ReactionO2};
use crate::store::{ParticleId, ParticleStore};
use crate::system::{ConfigError, System};
use crate::vec::Vector;

/// A proposed reaction, recorded during the parallel propose phase and
/// settled during the single-threaded commit. For first-order events `id2`
/// equals `id1`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    pub n_educts: u8,
    pub id1: ParticleId,
    pub id2: ParticleId,
    pub reaction_index: usize,
}

impl ReactionEvent {
    fn touches(&self, id: ParticleId) -> bool {
        self.id1 == id || (self.n_educts == 2 && self.id2 == id)
    }
}

/// Deferred store mutations accumulated during a commit and drained at its
/// end under single-thread ownership.
#[derive(Default)]
struct Updater<const D: usize> {
    adds: Vec<(Vector<D>, usize)>,
    removes: Vec<ParticleId>,
}

/// Proposes and commits stochastic reactions for one timestep.
///
/// The propose phase runs parallel and read-only: first-order reactions per
/// particle, second-order reactions over unique unordered neighbor pairs of
/// a cell list rebuilt each step over the largest reaction radius. The
/// commit phase shuffles the proposals with the engine's RNG and applies
/// them in order, invalidating later events that touch a mutated particle.
pub struct ReactionEngine<const D: usize> {
    reactions_o1: Vec<ReactionO1>,
    reactions_o2: Vec<ReactionO2>,
    o1_by_type: Vec<Vec<usize>>,
    o2_by_pair: Vec<Vec<usize>>,
    cells: Option<CellList<D>>,
    boundary: Boundary<D>,
    n_types: usize,
}

impl<const D: usize> ReactionEngine<D> {
    pub fn new(system: &System<D>) -> Result<Self, ConfigError> {
        let n_types = system.n_types();

        let mut o1_by_type = vec![Vec::new(); n_types];

        for (index, reaction) in system.reactions_o1.iter().enumerate() {
            o1_by_type[reaction.educt()].push(index);
        }

        let mut o2_by_pair = vec![Vec::new(); n_types * n_types];

        for (index, reaction) in system.reactions_o2.iter().enumerate() {
            let (educt1, educt2) = reaction.educts();

            o2_by_pair[educt1 * n_types + educt2].push(index);
            if educt1 != educt2 {
                o2_by_pair[educt2 * n_types + educt1].push(index);
            }
        }

        let cells = if system.reactions_o2.is_empty() {
            None
        } else {
            let radius = system
                .reactions_o2
                .iter()
                .map(ReactionO2::radius)
                .fold(0.0f32, f32::max);

            Some(CellList::new(system.boundary, radius, 2)?)
        };

        Ok(Self {
            reactions_o1: system.reactions_o1.clone(),
            reactions_o2: system.reactions_o2.clone(),
            o1_by_type,
            o2_by_pair,
            cells,
            boundary: system.boundary,
            n_types,
        })
    }

    /// Runs one reaction step of length `tau`: rebuild the cell list,
    /// propose, commit. Returns the number of committed events.
    pub fn step(
        &mut self,
        store: &mut ParticleStore<D>,
        pool: &TaskPool,
        tau: f32,
        rng: &mut StdRng,
    ) -> usize {
        self.update_cells(store, pool);

        let events = self.propose(store, pool, tau);

        self.commit(store, events, rng)
    }

    /// Rebuilds the reaction cell list, when second-order reactions exist.
    pub fn update_cells(&mut self, store: &ParticleStore<D>, pool: &TaskPool) {
        if let Some(cells) = &mut self.cells {
            cells.update(store, pool);
        }
    }

    /// The parallel proposal pass. Task-local buffers are concatenated into
    /// one list under a single mutex at task end.
    pub fn propose(&self, store: &ParticleStore<D>, pool: &TaskPool, tau: f32) -> Vec<ReactionEvent> {
        let events = Mutex::new(Vec::new());

        // First order: every particle rolls against each reaction listed
        // for its type.
        if !self.reactions_o1.is_empty() {
            let o1_by_type = &self.o1_by_type;
            let reactions_o1 = &self.reactions_o1;

            store.for_each_range(pool, |context, range| {
                let mut local = Vec::new();

                for (id, _position, type_id) in range.iter() {
                    for &reaction_index in &o1_by_type[type_id] {
                        let rate = reactions_o1[reaction_index].rate();

                        if should_perform(&mut context.rng, tau, rate) {
                            local.push(ReactionEvent {
                                n_educts: 1,
                                id1: id,
                                id2: id,
                                reaction_index,
                            });
                        }
                    }
                }

                append(&events, local);
            });
        }

        // Second order: unique unordered pairs per cell, rejected by
        // distance first.
        if let Some(cells) = &self.cells {
            let o2_by_pair = &self.o2_by_pair;
            let reactions_o2 = &self.reactions_o2;
            let boundary = self.boundary;
            let n_types = self.n_types;
            let view = store.view();

            cells.for_each_cell_range(pool, |context, cell_range| {
                let mut local = Vec::new();

                for cell in cell_range {
                    cells.for_each_pair_in_cell(cell, false, |p, q| {
                        let type_p = view.type_of(p);
                        let type_q = view.type_of(q);
                        let listed = &o2_by_pair[type_p * n_types + type_q];

                        if listed.is_empty() {
                            return;
                        }

                        let d_squared =
                            boundary.distance_squared(view.position(p), view.position(q));

                        for &reaction_index in listed {
                            let reaction = &reactions_o2[reaction_index];
                            let radius = reaction.radius();

                            if d_squared < radius * radius
                                && should_perform(&mut context.rng, tau, reaction.rate())
                            {
                                local.push(ReactionEvent {
                                    n_educts: 2,
                                    id1: p,
                                    id2: q,
                                    reaction_index,
                                });
                            }
                        }
                    });
                }

                append(&events, local);
            });
        }

        events.into_inner().unwrap_or_default()
    }

    /// The single-threaded commit. Shuffles with the engine RNG, applies
    /// surviving events, invalidates later events touching mutated ids, and
    /// drains the deferred adds and removes at the end.
    pub fn commit(
        &self,
        store: &mut ParticleStore<D>,
        mut events: Vec<ReactionEvent>,
        rng: &mut StdRng,
    ) -> usize {
        events.shuffle(rng);

        let mut valid = vec![true; events.len()];
        let mut updater = Updater::default();
        let mut committed = 0;

        for current in 0..events.len() {
            if !valid[current] {
                continue;
            }

            let event = events[current];

            // Stale proposals against particles a previous event consumed
            // are dropped, never faulted on.
            if !store.exists(event.id1) || !store.exists(event.id2) {
                continue;
            }

            let mutated = self.apply(store, &mut updater, &event, rng);

            if mutated.is_empty() {
                continue;
            }

            committed += 1;

            for later in current + 1..events.len() {
                if valid[later]
                    && mutated
                        .iter()
                        .any(|id| events[later].touches(*id))
                {
                    valid[later] = false;
                }
            }
        }

        for id in updater.removes {
            store.remove(id);
        }
        for (mut position, type_id) in updater.adds {
            self.boundary.wrap(&mut position);
            store.add(position, type_id);
        }

        committed
    }

    /// Applies one event and reports which particle ids were mutated by it;
    /// an untouched catalyst stays available for further events this step.
    fn apply(
        &self,
        store: &mut ParticleStore<D>,
        updater: &mut Updater<D>,
        event: &ReactionEvent,
        rng: &mut StdRng,
    ) -> Vec<ParticleId> {
        if event.n_educts == 1 {
            match self.reactions_o1[event.reaction_index] {
                ReactionO1::Decay { .. } => {
                    updater.removes.push(event.id1);

                    vec![event.id1]
                }
                ReactionO1::Conversion { product, .. } => {
                    store.set_type(event.id1, product);

                    vec![event.id1]
                }
                ReactionO1::Fission {
                    product1,
                    product2,
                    distance,
                    ..
                } => {
                    let center = *store.position_of(event.id1);
                    let direction = unit_direction(rng);
                    let radial: f32 = rng.random::<f32>().powf(1.0 / D as f32) * distance;
                    let offset = direction * (0.5 * radial);

                    let mut shifted = center + offset;

                    self.boundary.wrap(&mut shifted);
                    store.set_type(event.id1, product1);
                    store.set_position(event.id1, shifted);

                    updater.adds.push((center - offset, product2));

                    vec![event.id1]
                }
            }
        } else {
            match self.reactions_o2[event.reaction_index] {
                ReactionO2::Fusion {
                    educt1,
                    product,
                    weight1,
                    weight2,
                    ..
                } => {
                    let x1 = *store.position_of(event.id1);
                    let x2 = *store.position_of(event.id2);
                    let weight = if store.type_of(event.id1) == educt1 {
                        weight1
                    } else {
                        weight2
                    };

                    let mut merged = x1 + (x2 - x1) * weight;

                    self.boundary.wrap(&mut merged);
                    store.set_type(event.id1, product);
                    store.set_position(event.id1, merged);

                    updater.removes.push(event.id2);

                    vec![event.id1, event.id2]
                }
                ReactionO2::Catalysis {
                    catalyst, product, ..
                } => {
                    let educt_id = if store.type_of(event.id1) == catalyst {
                        event.id2
                    } else {
                        event.id1
                    };

                    store.set_type(educt_id, product);

                    vec![educt_id]
                }
            }
        }
    }
}

fn should_perform(rng: &mut StdRng, tau: f32, rate: f32) -> bool {
    rng.random::<f32>() < 1.0 - (-rate * tau).exp()
}

/// A direction drawn uniformly from the unit sphere, via normalized
/// standard-normal coordinates.
fn unit_direction<const D: usize>(rng: &mut StdRng) -> Vector<D> {
    loop {
        let mut direction = Vector::default();

        for d in 0..D {
            direction[d] = rng.sample(StandardNormal);
        }

        let mag = direction.mag();

        if mag > 0.0 {
            return direction / mag;
        }
    }
}

fn append(events: &Mutex<Vec<ReactionEvent>>, mut local: Vec<ReactionEvent>) {
    if local.is_empty() {
        return;
    }

    match events.lock() {
        Ok(mut guard) => guard.append(&mut local),
        Err(mut poisoned) => poisoned.get_mut().append(&mut local),
    }
}
