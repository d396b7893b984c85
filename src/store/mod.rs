use bitflags::bitflags;

use rand::Rng;

use crate::boundary::Boundary;
use crate::pool::{TaskContext, TaskPool};
use crate::vec::Vector;

/// A stable index into the store; valid from `add` until `remove`.
pub type ParticleId = usize;

bitflags! {
    /// Auxiliary per-particle channels carried alongside positions and
    /// types.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Channels: u8 {
        const FORCES = 1;
        const VELOCITIES = 1 << 1;
    }
}

/// Stable-index storage for particles.
///
/// A slot holds `Some(position)` while its particle is alive and `None` once
/// it has been removed; tombstoned slot indices are kept on a free-list and
/// reused by later insertions, so live identifiers never move.
#[derive(Debug, Clone)]
pub struct ParticleStore<const D: usize> {
    positions: Vec<Option<Vector<D>>>,
    types: Vec<usize>,
    forces: Vec<Vector<D>>,
    velocities: Vec<Vector<D>>,
    blanks: Vec<usize>,
    channels: Channels,
}

/// A read view over a contiguous index range of the store, as handed to
/// range-parallel traversals. Iteration skips tombstones and yields ids in
/// ascending order.
pub struct RangeView<'a, const D: usize> {
    start: usize,
    positions: &'a [Option<Vector<D>>],
    types: &'a [usize],
}

impl<'a, const D: usize> RangeView<'a, D> {
    pub fn iter(&self) -> impl Iterator<Item = (ParticleId, &'a Vector<D>, usize)> + '_ {
        self.positions
            .iter()
            .enumerate()
            .filter_map(|(offset, maybe_position)| {
                maybe_position
                    .as_ref()
                    .map(|position| (self.start + offset, position, self.types[offset]))
            })
    }
}

/// A whole-store read view, for neighbor lookups from inside a parallel
/// force pass.
pub struct StoreView<'a, const D: usize> {
    positions: &'a [Option<Vector<D>>],
    types: &'a [usize],
}

impl<'a, const D: usize> StoreView<'a, D> {
    pub fn exists(&self, id: ParticleId) -> bool {
        self.positions[id].is_some()
    }

    // Panics on a dead slot.
    pub fn position(&self, id: ParticleId) -> &'a Vector<D> {
        match &self.positions[id] {
            Some(position) => position,
            None => panic!("read of tombstoned particle {}", id),
        }
    }

    pub fn type_of(&self, id: ParticleId) -> usize {
        self.types[id]
    }
}

impl<const D: usize> ParticleStore<D> {
    pub fn new(channels: Channels) -> Self {
        Self {
            positions: Vec::new(),
            types: Vec::new(),
            forces: Vec::new(),
            velocities: Vec::new(),
            blanks: Vec::new(),
            channels,
        }
    }

    pub fn channels(&self) -> Channels {
        self.channels
    }

    pub fn has_forces(&self) -> bool {
        self.channels.contains(Channels::FORCES)
    }

    /// The slot count, including tombstones.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// The number of live particles.
    pub fn n_particles(&self) -> usize {
        self.positions.len() - self.blanks.len()
    }

    /// Inserts a particle, reusing a tombstoned slot if one is available.
    /// The returned id stays valid until the particle is removed.
    pub fn add(&mut self, position: Vector<D>, type_id: usize) -> ParticleId {
        match self.blanks.pop() {
            Some(id) => {
                self.positions[id] = Some(position);
                self.types[id] = type_id;
                if self.channels.contains(Channels::FORCES) {
                    self.forces[id] = Vector::default();
                }
                if self.channels.contains(Channels::VELOCITIES) {
                    self.velocities[id] = Vector::default();
                }
                id
            }
            None => {
                self.positions.push(Some(position));
                self.types.push(type_id);
                if self.channels.contains(Channels::FORCES) {
                    self.forces.push(Vector::default());
                }
                if self.channels.contains(Channels::VELOCITIES) {
                    self.velocities.push(Vector::default());
                }
                self.positions.len() - 1
            }
        }
    }

    /// Tombstones a slot. The contract is at most one remove per id per
    /// step; the id becomes available for reuse by later `add` calls.
    pub fn remove(&mut self, id: ParticleId) {
        debug_assert!(self.exists(id), "double remove of particle {}", id);

        self.positions[id] = None;
        self.blanks.push(id);
    }

    pub fn exists(&self, id: ParticleId) -> bool {
        self.positions[id].is_some()
    }

    pub fn set_position(&mut self, id: ParticleId, position: Vector<D>) {
        self.positions[id] = Some(position);
    }

    pub fn set_type(&mut self, id: ParticleId, type_id: usize) {
        self.types[id] = type_id;
    }

    pub fn set_velocity(&mut self, id: ParticleId, velocity: Vector<D>) {
        debug_assert!(self.channels.contains(Channels::VELOCITIES));

        self.velocities[id] = velocity;
    }

    // Panics on a dead slot.
    pub fn position_of(&self, id: ParticleId) -> &Vector<D> {
        match &self.positions[id] {
            Some(position) => position,
            None => panic!("read of tombstoned particle {}", id),
        }
    }

    pub fn type_of(&self, id: ParticleId) -> usize {
        self.types[id]
    }

    pub fn force_of(&self, id: ParticleId) -> &Vector<D> {
        &self.forces[id]
    }

    pub fn velocity_of(&self, id: ParticleId) -> &Vector<D> {
        &self.velocities[id]
    }

    pub fn view(&self) -> StoreView<'_, D> {
        StoreView {
            positions: &self.positions,
            types: &self.types,
        }
    }

    /// Ids of all live particles, ascending.
    pub fn live_ids(&self) -> impl Iterator<Item = ParticleId> + '_ {
        self.positions
            .iter()
            .enumerate()
            .filter_map(|(id, maybe_position)| maybe_position.as_ref().map(|_| id))
    }

    /// Drops `n` particles of one type uniformly into the box.
    pub fn initialize_particles<R: Rng>(
        &mut self,
        n: usize,
        type_id: usize,
        boundary: &Boundary<D>,
        rng: &mut R,
    ) {
        for _ in 0..n {
            let mut position = Vector::default();

            for d in 0..D {
                let half = 0.5 * boundary.extents[d];
                position[d] = rng.random_range(-half..half);
            }

            self.add(position, type_id);
        }
    }

    /// Parallel read-only traversal over live particles, split into
    /// contiguous ranges handed to the pool. `op` runs once per range and
    /// iterates the range itself, which lets it keep task-local scratch.
    pub fn for_each_range<F>(&self, pool: &TaskPool, op: F)
    where
        F: Fn(&mut TaskContext, RangeView<'_, D>) + Send + Sync,
    {
        let grain = grain_size(self.positions.len(), pool.granularity());
        let positions = &self.positions;
        let types = &self.types;

        pool.scope(|scope| {
            let op = &op;
            let mut start = 0;

            while start < positions.len() {
                let end = (start + grain).min(positions.len());
                let view = RangeView {
                    start,
                    positions: &positions[start..end],
                    types: &types[start..end],
                };

                scope.submit(move |context| op(context, view));

                start = end;
            }
        });
    }

    /// Parallel read-only traversal over live particles, one call per
    /// particle.
    pub fn for_each<F>(&self, pool: &TaskPool, op: F)
    where
        F: Fn(&mut TaskContext, ParticleId, &Vector<D>, usize) + Send + Sync,
    {
        self.for_each_range(pool, |context, range| {
            for (id, position, type_id) in range.iter() {
                op(context, id, position, type_id);
            }
        });
    }

    /// Parallel traversal writing forces: reads positions and types, hands
    /// out exclusive access to each particle's force slot. The whole-store
    /// view allows neighbor reads.
    pub fn for_each_force_mut<F>(&mut self, pool: &TaskPool, op: F)
    where
        F: Fn(ParticleId, &Vector<D>, usize, &mut Vector<D>, &StoreView<'_, D>) + Send + Sync,
    {
        debug_assert!(self.channels.contains(Channels::FORCES));

        let grain = grain_size(self.positions.len(), pool.granularity());
        let positions = &self.positions;
        let types = &self.types;

        pool.scope(|scope| {
            let op = &op;
            let mut start = 0;

            for chunk in self.forces.chunks_mut(grain) {
                let chunk_start = start;

                start += chunk.len();

                scope.submit(move |_context| {
                    let view = StoreView { positions, types };

                    for (offset, force) in chunk.iter_mut().enumerate() {
                        let id = chunk_start + offset;

                        if let Some(position) = &positions[id] {
                            op(id, position, types[id], force, &view);
                        }
                    }
                });
            }
        });
    }

    /// Parallel traversal writing positions: each task owns a contiguous
    /// position range exclusively and reads types and forces. The force is
    /// passed by value and is zero when the store carries no force channel.
    pub fn for_each_position_mut<F>(&mut self, pool: &TaskPool, op: F)
    where
        F: Fn(&mut TaskContext, ParticleId, &mut Vector<D>, usize, Vector<D>) + Send + Sync,
    {
        let grain = grain_size(self.positions.len(), pool.granularity());
        let types = &self.types;
        let forces = &self.forces;

        pool.scope(|scope| {
            let op = &op;
            let mut start = 0;

            for chunk in self.positions.chunks_mut(grain) {
                let chunk_start = start;

                start += chunk.len();

                scope.submit(move |context| {
                    for (offset, slot) in chunk.iter_mut().enumerate() {
                        let id = chunk_start + offset;

                        if let Some(position) = slot {
                            let force = forces.get(id).copied().unwrap_or_default();

                            op(context, id, position, types[id], force);
                        }
                    }
                });
            }
        });
    }

    /// Reclaims tombstones by moving live tail slots into free holes and
    /// truncating. Invalidates outstanding ids; maintenance only, never
    /// called during a step.
    pub fn compact(&mut self) {
        if self.blanks.is_empty() {
            return;
        }

        self.blanks.sort_unstable();

        let target_len = self.positions.len() - self.blanks.len();
        let mut n_swapped = 0;

        for id in (target_len..self.positions.len()).rev() {
            if self.positions[id].is_some() {
                let blank = self.blanks[n_swapped];
                let moved_position = self.positions[id].take();
                let moved_type = self.types[id];

                self.positions[blank] = moved_position;
                self.types[blank] = moved_type;
                if self.channels.contains(Channels::FORCES) {
                    let moved_force = self.forces[id];
                    self.forces[blank] = moved_force;
                }
                if self.channels.contains(Channels::VELOCITIES) {
                    let moved_velocity = self.velocities[id];
                    self.velocities[blank] = moved_velocity;
                }

                n_swapped += 1;
            }
        }

        self.positions.truncate(target_len);
        self.types.truncate(target_len);
        if self.channels.contains(Channels::FORCES) {
            self.forces.truncate(target_len);
        }
        if self.channels.contains(Channels::VELOCITIES) {
            self.velocities.truncate(target_len);
        }
        self.blanks.clear();
    }
}

fn grain_size(len: usize, granularity: usize) -> usize {
    (len / granularity).max(1)
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::{Channels, ParticleStore};
    use crate::boundary::Boundary;
    use crate::pool::TaskPool;
    use crate::vec::Vector;

    fn store_2d() -> ParticleStore<2> {
        ParticleStore::new(Channels::FORCES)
    }

    #[test]
    fn add_remove_reuses_the_freed_slot() {
        let mut store = store_2d();

        let a = store.add(Vector::new([0.0, 0.0]), 0);
        let b = store.add(Vector::new([1.0, 0.0]), 0);

        assert_eq!((a, b), (0, 1));
        assert_eq!(store.n_particles(), 2);

        store.remove(a);

        assert!(!store.exists(a));
        assert_eq!(store.n_particles(), 1);

        // The freed index comes back; the slot count does not grow.
        let c = store.add(Vector::new([2.0, 0.0]), 1);

        assert_eq!(c, a);
        assert_eq!(store.len(), 2);
        assert_eq!(store.n_particles(), 2);
        assert_eq!(store.type_of(c), 1);
    }

    #[test]
    fn live_count_tracks_adds_and_removes() {
        let mut store = store_2d();

        for i in 0..10 {
            store.add(Vector::new([i as f32, 0.0]), 0);
        }
        for id in [1, 3, 5] {
            store.remove(id);
        }

        assert_eq!(store.n_particles(), 7);
        assert_eq!(store.live_ids().count(), 7);
        assert_eq!(store.len(), 10);
    }

    #[test]
    fn parallel_traversal_skips_tombstones() {
        let pool = TaskPool::new(4, 7);
        let mut store = store_2d();

        for i in 0..100 {
            store.add(Vector::new([i as f32, 0.0]), 0);
        }
        for id in (0..100).step_by(3) {
            store.remove(id);
        }

        let visited = AtomicUsize::new(0);
        let sum = Mutex::new(0.0f32);

        store.for_each(&pool, |_context, _id, position, _type_id| {
            visited.fetch_add(1, Ordering::Relaxed);
            *sum.lock().unwrap() += position[0];
        });

        let expected: f32 = (0..100).filter(|i| i % 3 != 0).map(|i| i as f32).sum();

        assert_eq!(visited.load(Ordering::Relaxed), store.n_particles());
        assert_eq!(*sum.lock().unwrap(), expected);
    }

    #[test]
    fn force_traversal_writes_every_live_slot() {
        let pool = TaskPool::new(4, 7);
        let mut store = store_2d();

        for i in 0..50 {
            store.add(Vector::new([i as f32, 0.0]), 0);
        }
        store.remove(25);

        store.for_each_force_mut(&pool, |id, _position, _type_id, force, view| {
            assert!(view.exists(id));
            *force = Vector::new([id as f32, -1.0]);
        });

        assert_eq!(*store.force_of(10), Vector::new([10.0, -1.0]));
        assert_eq!(*store.force_of(49), Vector::new([49.0, -1.0]));
    }

    #[test]
    fn position_traversal_sees_forces() {
        let pool = TaskPool::new(2, 7);
        let mut store = store_2d();

        let id = store.add(Vector::new([1.0, 1.0]), 0);

        store.for_each_force_mut(&pool, |_id, _position, _type_id, force, _view| {
            *force = Vector::new([0.5, -0.5]);
        });

        store.for_each_position_mut(&pool, |_context, _id, position, _type_id, force| {
            *position += force;
        });

        assert_eq!(*store.position_of(id), Vector::new([1.5, 0.5]));
    }

    #[test]
    fn initialize_particles_lands_inside_the_box() {
        let boundary = Boundary::periodic([4.0, 6.0]);
        let mut rng = StdRng::seed_from_u64(1);
        let mut store = store_2d();

        store.initialize_particles(200, 0, &boundary, &mut rng);

        assert_eq!(store.n_particles(), 200);

        for id in store.live_ids() {
            let position = store.position_of(id);

            assert!(position[0] >= -2.0 && position[0] < 2.0);
            assert!(position[1] >= -3.0 && position[1] < 3.0);
        }
    }

    #[test]
    fn velocity_channel_is_carried_when_requested() {
        let mut store: ParticleStore<2> =
            ParticleStore::new(Channels::FORCES | Channels::VELOCITIES);

        let id = store.add(Vector::new([0.0, 0.0]), 0);

        assert!(store.channels().contains(Channels::VELOCITIES));
        assert_eq!(*store.velocity_of(id), Vector::default());

        store.set_velocity(id, Vector::new([1.0, -1.0]));

        assert_eq!(*store.velocity_of(id), Vector::new([1.0, -1.0]));

        // Reusing the slot resets the channel payloads.
        store.remove(id);

        let reused = store.add(Vector::new([2.0, 2.0]), 0);

        assert_eq!(reused, id);
        assert_eq!(*store.velocity_of(reused), Vector::default());
    }

    #[test]
    fn compact_reclaims_tombstones() {
        let mut store = store_2d();

        for i in 0..10 {
            store.add(Vector::new([i as f32, 0.0]), i);
        }
        for id in [1, 9, 4] {
            store.remove(id);
        }

        store.compact();

        assert_eq!(store.len(), 7);
        assert_eq!(store.n_particles(), 7);

        // The live payloads survive, whichever slots they ended up in.
        let mut types: Vec<usize> = store.live_ids().map(|id| store.type_of(id)).collect();
        types.sort_unstable();

        assert_eq!(types, vec![0, 2, 3, 5, 6, 7, 8]);
    }
}
