use std::fmt;

use crate::store::{ParticleId, ParticleStore};
use crate::vec::Vector;

/// A runtime warning surfaced through the recorder channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A position turned non-finite during integration; the particle has
    /// been tombstoned.
    NonFinitePosition { id: ParticleId, step: u64 },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFinitePosition { id, step } => {
                write!(
                    f,
                    "particle {} reached a non-finite position in step {} and was removed",
                    id, step
                )
            }
        }
    }
}

/// A read view of the live particles, taken between steps.
#[derive(Debug, Clone, Default)]
pub struct Snapshot<const D: usize> {
    pub step: u64,
    pub ids: Vec<ParticleId>,
    pub positions: Vec<Vector<D>>,
    pub types: Vec<usize>,
}

impl<const D: usize> Snapshot<D> {
    pub fn of(store: &ParticleStore<D>, step: u64) -> Self {
        let mut snapshot = Self {
            step,
            ids: Vec::with_capacity(store.n_particles()),
            positions: Vec::with_capacity(store.n_particles()),
            types: Vec::with_capacity(store.n_particles()),
        };

        for id in store.live_ids() {
            snapshot.ids.push(id);
            snapshot.positions.push(*store.position_of(id));
            snapshot.types.push(store.type_of(id));
        }

        snapshot
    }

    pub fn n_particles(&self) -> usize {
        self.ids.len()
    }

    /// The number of live particles of one type.
    pub fn count_of(&self, type_id: usize) -> usize {
        self.types.iter().filter(|t| **t == type_id).count()
    }
}

/// The sink the engine reports into: snapshots on request between steps,
/// warnings as they happen.
pub trait Recorder<const D: usize>: Send {
    fn record(&mut self, _snapshot: &Snapshot<D>) {}

    fn warn(&mut self, _warning: Warning) {}
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullRecorder;

impl<const D: usize> Recorder<D> for NullRecorder {}

/// Keeps a per-type census of every recorded snapshot, plus the warnings.
#[derive(Debug, Default)]
pub struct CountRecorder {
    pub n_types: usize,
    pub counts: Vec<Vec<usize>>,
    pub warnings: Vec<Warning>,
}

impl CountRecorder {
    pub fn new(n_types: usize) -> Self {
        Self {
            n_types,
            counts: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl<const D: usize> Recorder<D> for CountRecorder {
    fn record(&mut self, snapshot: &Snapshot<D>) {
        let mut census = vec![0; self.n_types];

        for type_id in &snapshot.types {
            census[*type_id] += 1;
        }

        self.counts.push(census);
    }

    fn warn(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }
}

#[cfg(test)]
mod test {
    use super::{CountRecorder, Recorder, Snapshot, Warning};
    use crate::store::{Channels, ParticleStore};
    use crate::vec::Vector;

    #[test]
    fn snapshots_cover_live_particles_only() {
        let mut store: ParticleStore<2> = ParticleStore::new(Channels::FORCES);

        store.add(Vector::new([0.0, 0.0]), 0);
        let gone = store.add(Vector::new([1.0, 0.0]), 1);
        store.add(Vector::new([2.0, 0.0]), 1);
        store.remove(gone);

        let snapshot = Snapshot::of(&store, 3);

        assert_eq!(snapshot.step, 3);
        assert_eq!(snapshot.n_particles(), 2);
        assert_eq!(snapshot.count_of(0), 1);
        assert_eq!(snapshot.count_of(1), 1);
        assert!(!snapshot.ids.contains(&gone));
    }

    #[test]
    fn count_recorder_builds_a_census_series() {
        let mut store: ParticleStore<2> = ParticleStore::new(Channels::FORCES);

        store.add(Vector::new([0.0, 0.0]), 0);
        store.add(Vector::new([1.0, 0.0]), 0);
        store.add(Vector::new([2.0, 0.0]), 1);

        let mut recorder = CountRecorder::new(2);

        <CountRecorder as Recorder<2>>::record(&mut recorder, &Snapshot::of(&store, 0));
        store.remove(0);
        <CountRecorder as Recorder<2>>::record(&mut recorder, &Snapshot::of(&store, 1));

        assert_eq!(recorder.counts, vec![vec![2, 1], vec![1, 1]]);

        <CountRecorder as Recorder<2>>::warn(
            &mut recorder,
            Warning::NonFinitePosition { id: 5, step: 2 },
        );

        assert_eq!(recorder.warnings.len(), 1);
    }
}
