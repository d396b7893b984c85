use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::boundary::Boundary;
use crate::index::GridIndex;
use crate::pool::{TaskContext, TaskPool};
use crate::store::{ParticleId, ParticleStore};
use crate::system::ConfigError;
use crate::vec::Vector;

/// Precomputed cell adjacency: for every flat cell index, the sorted,
/// deduplicated flat indices of all cells within `radius` steps on every
/// axis, the cell itself included. Periodic grids wrap offsets, open grids
/// clip them.
///
/// Stored flattened with a fixed stride per cell; the first entry of each
/// row is the number of adjacent cells that follow.
#[derive(Debug, Clone, Default)]
pub struct CellAdjacency {
    stride: usize,
    data: Vec<usize>,
}

impl CellAdjacency {
    pub fn new<const D: usize>(index: &GridIndex<D>, radius: i32, periodic: bool) -> Self {
        let span = 2 * radius + 1;

        let mut max_adjacent = 1usize;
        for axis in 0..D {
            max_adjacent *= index[axis].min(span) as usize;
        }

        let stride = 1 + max_adjacent;
        let mut data = vec![0; index.len() * stride];

        let offsets = GridIndex::new([span; D]);
        let mut adjacent = Vec::with_capacity(max_adjacent);

        for cell in 0..index.len() {
            let ijk = index.unravel(cell);

            adjacent.clear();

            'offsets: for flat_offset in 0..offsets.len() {
                let offset = offsets.unravel(flat_offset);
                let mut neighbor = ijk;

                for axis in 0..D {
                    neighbor[axis] += offset[axis] - radius;

                    if periodic {
                        neighbor[axis] =
                            (neighbor[axis] % index[axis] + index[axis]) % index[axis];
                    } else if neighbor[axis] < 0 || neighbor[axis] >= index[axis] {
                        continue 'offsets;
                    }
                }

                adjacent.push(index.ravel(neighbor));
            }

            adjacent.sort_unstable();
            adjacent.dedup();

            let row = cell * stride;

            data[row] = adjacent.len();
            data[row + 1..row + 1 + adjacent.len()].copy_from_slice(&adjacent);
        }

        Self { stride, data }
    }

    /// The adjacent cells of `cell`, itself included.
    pub fn neighbors(&self, cell: usize) -> &[usize] {
        let row = cell * self.stride;
        let count = self.data[row];

        &self.data[row + 1..row + 1 + count]
    }
}

/// A cell-linked list over the simulation box.
///
/// Each cell holds the head of a singly linked chain of the particles it
/// contains; chain entries store `id + 1` so that `0` marks the end of a
/// chain. Heads are updated with compare-and-swap during the parallel
/// rebuild and are read-only in between.
#[derive(Debug)]
pub struct CellList<const D: usize> {
    index: GridIndex<D>,
    cell_size: Vector<D>,
    boundary: Boundary<D>,
    adjacency: CellAdjacency,
    subdivision: i32,
    heads: Vec<AtomicUsize>,
    links: Vec<AtomicUsize>,
    active_types: Option<HashSet<usize>>,
}

impl<const D: usize> CellList<D> {
    /// Builds the grid for `interaction_radius` with `subdivision` cells per
    /// radius. Rejects non-positive box extents.
    pub fn new(
        boundary: Boundary<D>,
        interaction_radius: f32,
        subdivision: i32,
    ) -> Result<Self, ConfigError> {
        debug_assert!(subdivision >= 1);
        debug_assert!(interaction_radius > 0.0);

        let mut cell_size = Vector::default();
        let mut n_cells = [0i32; D];

        for axis in 0..D {
            let extent = boundary.extents[axis];

            if extent <= 0.0 {
                return Err(ConfigError::InvalidBoxExtent { axis, extent });
            }

            cell_size[axis] = interaction_radius / subdivision as f32;
            n_cells[axis] = ((extent / cell_size[axis]).floor() as i32).max(1);
        }

        let index = GridIndex::new(n_cells);
        let adjacency = CellAdjacency::new(&index, subdivision, boundary.periodic);
        let heads = (0..index.len()).map(|_| AtomicUsize::new(0)).collect();

        Ok(Self {
            index,
            cell_size,
            boundary,
            adjacency,
            subdivision,
            heads,
            links: Vec::new(),
            active_types: None,
        })
    }

    /// Restricts the list to the given types; particles of other types are
    /// skipped during `update`.
    pub fn set_active_types(&mut self, types: HashSet<usize>) {
        self.active_types = Some(types);
    }

    pub fn is_active(&self, type_id: usize) -> bool {
        match &self.active_types {
            Some(types) => types.contains(&type_id),
            None => true,
        }
    }

    pub fn n_cells(&self) -> usize {
        self.index.len()
    }

    pub fn subdivision(&self) -> i32 {
        self.subdivision
    }

    pub fn adjacency(&self) -> &CellAdjacency {
        &self.adjacency
    }

    /// The grid coordinates of `position`; the box is centered at the
    /// origin, and a position exactly on a cell boundary lands in the
    /// higher-index cell.
    pub fn grid_position(&self, position: &Vector<D>) -> [i32; D] {
        let mut ijk = [0i32; D];

        for axis in 0..D {
            let shifted = (position[axis] + 0.5 * self.boundary.extents[axis])
                / self.cell_size[axis];
            let cell = shifted.floor().max(0.0) as i32;

            ijk[axis] = cell.min(self.index[axis] - 1);
        }

        ijk
    }

    pub fn cell_of(&self, position: &Vector<D>) -> usize {
        self.index.ravel(self.grid_position(position))
    }

    /// Rebuilds the chains from the current store contents. After the
    /// rebuild, every live particle of an active type sits in exactly one
    /// chain.
    pub fn update(&mut self, store: &ParticleStore<D>, pool: &TaskPool) {
        if self.links.len() != store.len() + 1 {
            self.links = (0..store.len() + 1).map(|_| AtomicUsize::new(0)).collect();
        } else {
            for link in &mut self.links {
                *link.get_mut() = 0;
            }
        }
        for head in &mut self.heads {
            *head.get_mut() = 0;
        }

        let this = &*self;

        store.for_each(pool, |_context, id, position, type_id| {
            if !this.is_active(type_id) {
                return;
            }

            let cell = this.cell_of(position);

            // Push-front via CAS; ids are unique within a rebuild, so there
            // is no ABA hazard.
            let head = &this.heads[cell];
            let mut current = head.load(Ordering::Relaxed);

            loop {
                match head.compare_exchange_weak(current, id + 1, Ordering::Relaxed, Ordering::Relaxed)
                {
                    Ok(_) => break,
                    Err(observed) => current = observed,
                }
            }

            this.links[id + 1].store(current, Ordering::Relaxed);
        });
    }

    /// Walks the chains of every cell adjacent to the cell containing
    /// `position`, invoking `op` once per particle other than `id`.
    pub fn for_each_neighbor<F>(&self, id: ParticleId, position: &Vector<D>, mut op: F)
    where
        F: FnMut(ParticleId),
    {
        let cell = self.cell_of(position);

        for &neighbor_cell in self.adjacency.neighbors(cell) {
            let mut cursor = self.heads[neighbor_cell].load(Ordering::Relaxed);

            while cursor != 0 {
                let neighbor = cursor - 1;

                if neighbor != id {
                    op(neighbor);
                }

                cursor = self.links[cursor].load(Ordering::Relaxed);
            }
        }
    }

    /// Parallel iteration over contiguous cell index ranges.
    pub fn for_each_cell_range<F>(&self, pool: &TaskPool, op: F)
    where
        F: Fn(&mut TaskContext, std::ops::Range<usize>) + Send + Sync,
    {
        let n_cells = self.n_cells();
        let grain = (n_cells / pool.granularity()).max(1);

        pool.scope(|scope| {
            let op = &op;
            let mut start = 0;

            while start < n_cells {
                let end = (start + grain).min(n_cells);

                scope.submit(move |context| op(context, start..end));

                start = end;
            }
        });
    }

    /// Pairs within a cell's adjacency: ordered pairs when `all` is set,
    /// unique unordered pairs (`neighbor > particle`) otherwise.
    pub fn for_each_pair_in_cell<F>(&self, cell: usize, all: bool, mut op: F)
    where
        F: FnMut(ParticleId, ParticleId),
    {
        let mut cursor = self.heads[cell].load(Ordering::Relaxed);

        while cursor != 0 {
            let particle = cursor - 1;

            for &neighbor_cell in self.adjacency.neighbors(cell) {
                let mut neighbor_cursor = self.heads[neighbor_cell].load(Ordering::Relaxed);

                while neighbor_cursor != 0 {
                    let neighbor = neighbor_cursor - 1;

                    if all {
                        if neighbor != particle {
                            op(particle, neighbor);
                        }
                    } else if neighbor > particle {
                        op(particle, neighbor);
                    }

                    neighbor_cursor = self.links[neighbor_cursor].load(Ordering::Relaxed);
                }
            }

            cursor = self.links[cursor].load(Ordering::Relaxed);
        }
    }

    /// The number of particles currently threaded through the chains.
    pub fn occupancy(&self) -> usize {
        let mut count = 0;

        for head in &self.heads {
            let mut cursor = head.load(Ordering::Relaxed);

            while cursor != 0 {
                count += 1;
                cursor = self.links[cursor].load(Ordering::Relaxed);
            }
        }

        count
    }
}
