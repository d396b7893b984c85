use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rand_distr::StandardNormal;

use crate::forces::ForceField;
use crate::pool::TaskPool;
use crate::reactions::engine::ReactionEngine;
use crate::recorder::{Recorder, Snapshot, Warning};
use crate::stats::{StepCounters, StepPhase};
use crate::store::{Channels, ParticleId, ParticleStore};
use crate::system::{ConfigError, System};
use crate::vec::Vector;

/// The Euler-Maruyama simulation engine.
///
/// Owns the particle store, the force field and the reaction engine, and
/// composes them into steps: force evaluation, the stochastic displacement
/// update, the reaction step, and the wrap passes, in that order. Phases
/// within a step are strictly serialized; no concurrent steps run.
pub struct Engine<const D: usize> {
    system: System<D>,
    store: ParticleStore<D>,
    force_field: Option<ForceField<D>>,
    reactions: Option<ReactionEngine<D>>,
    pool: Arc<TaskPool>,
    rng: StdRng,
    random_prefactors: Vec<f32>,
    deterministic_prefactors: Vec<f32>,
    previous_step_size: f32,
    recorder: Option<Box<dyn Recorder<D>>>,
    counters: StepCounters,
    step_count: u64,
}

impl<const D: usize> Engine<D> {
    /// Validates the descriptor and builds an engine around it. The `seed`
    /// drives the commit shuffle and all engine-side draws; worker RNGs are
    /// seeded by the pool.
    pub fn new(system: System<D>, pool: Arc<TaskPool>, seed: u64) -> Result<Self, ConfigError> {
        system.validate()?;

        let force_field = if system.has_forces() {
            Some(ForceField::new(&system)?)
        } else {
            None
        };

        let reactions = if system.has_reactions() {
            Some(ReactionEngine::new(&system)?)
        } else {
            None
        };

        let channels = if system.has_forces() {
            Channels::FORCES
        } else {
            Channels::empty()
        };

        let n_types = system.n_types();

        #[cfg(feature = "print_init_info")]
        println!(
            "engine: {} types, {} external potentials, {} pair potentials, {} + {} reactions, periodic={}",
            n_types,
            system.external_potentials.len(),
            system.pair_potentials.len(),
            system.reactions_o1.len(),
            system.reactions_o2.len(),
            system.boundary.periodic,
        );

        Ok(Self {
            system,
            store: ParticleStore::new(channels),
            force_field,
            reactions,
            pool,
            rng: StdRng::seed_from_u64(seed),
            random_prefactors: vec![0.0; n_types],
            deterministic_prefactors: vec![0.0; n_types],
            previous_step_size: 0.0,
            recorder: None,
            counters: StepCounters::default(),
            step_count: 0,
        })
    }

    pub fn system(&self) -> &System<D> {
        &self.system
    }

    pub fn particles(&self) -> &ParticleStore<D> {
        &self.store
    }

    pub fn particles_mut(&mut self) -> &mut ParticleStore<D> {
        &mut self.store
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn counters(&self) -> &StepCounters {
        &self.counters
    }

    pub fn set_recorder(&mut self, recorder: Box<dyn Recorder<D>>) {
        self.recorder = Some(recorder);
    }

    pub fn take_recorder(&mut self) -> Option<Box<dyn Recorder<D>>> {
        self.recorder.take()
    }

    /// Adds one particle of a named type.
    pub fn add_particle(
        &mut self,
        position: Vector<D>,
        type_name: &str,
    ) -> Result<ParticleId, ConfigError> {
        let type_id = self.system.type_id(type_name)?;

        Ok(self.store.add(position, type_id))
    }

    /// Drops `n` particles of a named type uniformly into the box, using
    /// the engine's RNG.
    pub fn initialize_particles(&mut self, n: usize, type_name: &str) -> Result<(), ConfigError> {
        let type_id = self.system.type_id(type_name)?;

        self.store
            .initialize_particles(n, type_id, &self.system.boundary, &mut self.rng);

        Ok(())
    }

    /// A read view of the live particles, for the host's recorder.
    pub fn snapshot(&self) -> Snapshot<D> {
        Snapshot::of(&self.store, self.step_count)
    }

    /// Hands the current snapshot to the attached recorder, if any.
    pub fn record(&mut self) {
        if let Some(recorder) = &mut self.recorder {
            recorder.record(&Snapshot::of(&self.store, self.step_count));
        }
    }

    /// Advances the system by one step of length `h`.
    pub fn step(&mut self, h: f32) {
        #[cfg(feature = "print_timing_info")]
        let step_started_at = std::time::Instant::now();

        if h != self.previous_step_size {
            self.previous_step_size = h;

            for type_id in 0..self.system.n_types() {
                let diffusion = self.system.diffusion_constant_of(type_id);

                self.random_prefactors[type_id] = (2.0 * diffusion * h).sqrt();
                self.deterministic_prefactors[type_id] = diffusion * h / self.system.kbt;
            }
        }

        if let Some(force_field) = &mut self.force_field {
            self.counters.get_mut(StepPhase::Forces).start();
            force_field.evaluate(&mut self.store, &self.pool);
            self.counters.get_mut(StepPhase::Forces).end();
        }

        self.counters.get_mut(StepPhase::Integrate).start();

        let non_finite = Mutex::new(Vec::new());

        {
            let boundary = self.system.boundary;
            let deterministic = &self.deterministic_prefactors;
            let random = &self.random_prefactors;
            let non_finite = &non_finite;

            self.store
                .for_each_position_mut(&self.pool, |context, id, position, type_id, force| {
                    let mut noise = Vector::default();

                    for d in 0..D {
                        noise[d] = context.rng.sample(StandardNormal);
                    }

                    *position += force * deterministic[type_id] + noise * random[type_id];

                    boundary.wrap(position);

                    if !position.is_finite() {
                        if let Ok(mut quarantined) = non_finite.lock() {
                            quarantined.push(id);
                        }
                    }
                });
        }

        self.counters.get_mut(StepPhase::Integrate).end();

        for id in non_finite.into_inner().unwrap_or_default() {
            self.store.remove(id);

            let warning = Warning::NonFinitePosition {
                id,
                step: self.step_count,
            };

            log::warn!("{}", warning);

            #[cfg(feature = "print_warnings")]
            println!("warning: {}", warning);

            if let Some(recorder) = &mut self.recorder {
                recorder.warn(warning);
            }
        }

        if let Some(reactions) = &mut self.reactions {
            self.counters.get_mut(StepPhase::CellListUpdate).start();
            reactions.update_cells(&self.store, &self.pool);
            self.counters.get_mut(StepPhase::CellListUpdate).end();

            self.counters.get_mut(StepPhase::ReactionPropose).start();
            let events = reactions.propose(&self.store, &self.pool, h);
            self.counters.get_mut(StepPhase::ReactionPropose).end();

            self.counters.get_mut(StepPhase::ReactionCommit).start();
            reactions.commit(&mut self.store, events, &mut self.rng);
            self.counters.get_mut(StepPhase::ReactionCommit).end();

            if self.system.boundary.periodic {
                let boundary = self.system.boundary;

                self.store.for_each_position_mut(
                    &self.pool,
                    |_context, _id, position, _type_id, _force| {
                        boundary.wrap(position);
                    },
                );
            }
        }

        self.step_count += 1;

        #[cfg(feature = "print_timing_info")]
        println!(
            "step {} took {:.3} ms",
            self.step_count,
            step_started_at.elapsed().as_secs_f64() * 1e3
        );
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use super::Engine;
    use crate::boundary::Boundary;
    use crate::pool::TaskPool;
    use crate::potentials::ExternalPotential;
    use crate::reactions::{ReactionO1, ReactionO2};
    use crate::recorder::{Recorder, Warning};
    use crate::system::System;
    use crate::vec::Vector;

    fn pool(workers: usize) -> Arc<TaskPool> {
        Arc::new(TaskPool::new(workers, 7))
    }

    #[test]
    fn construction_validates_the_system() {
        let system: System<2> = System::new(Boundary::periodic([10.0, -10.0]), 1.0);

        assert!(Engine::new(system, pool(1), 1).is_err());
    }

    #[test]
    fn pure_diffusion_matches_the_einstein_relation() {
        let mut system = System::new(Boundary::open([1000.0, 1000.0]), 1.0);

        system.add_type("A", 1.0);

        let mut engine = Engine::new(system, pool(4), 42).unwrap();

        for _ in 0..1000 {
            engine.add_particle(Vector::new([0.0, 0.0]), "A").unwrap();
        }

        let n_steps = 500;
        let h = 1e-3;

        for _ in 0..n_steps {
            engine.step(h);
        }

        // Var[x_d] = 2 D t per axis.
        let expected = 2.0 * 1.0 * (n_steps as f32) * h;
        let snapshot = engine.snapshot();

        for axis in 0..2 {
            let mean: f32 = snapshot
                .positions
                .iter()
                .map(|position| position[axis])
                .sum::<f32>()
                / snapshot.n_particles() as f32;
            let variance: f32 = snapshot
                .positions
                .iter()
                .map(|position| (position[axis] - mean) * (position[axis] - mean))
                .sum::<f32>()
                / (snapshot.n_particles() - 1) as f32;

            assert!(
                (variance - expected).abs() < 0.25 * expected,
                "axis {}: variance {} vs expected {}",
                axis,
                variance,
                expected
            );
        }
    }

    #[test]
    fn a_frozen_system_is_a_no_op() {
        let mut system = System::new(Boundary::periodic([10.0, 10.0]), 1.0);

        system.add_type("A", 0.0);
        system.reactions_o1.push(ReactionO1::Conversion {
            educt: 0,
            product: 0,
            rate: 0.0,
        });

        let mut engine = Engine::new(system, pool(2), 1).unwrap();

        for i in 0..20 {
            engine
                .add_particle(Vector::new([0.1 * i as f32, -0.2 * i as f32]), "A")
                .unwrap();
        }

        let before = engine.snapshot();

        for _ in 0..10 {
            engine.step(1e-3);
        }

        let after = engine.snapshot();

        assert_eq!(before.positions, after.positions);
        assert_eq!(before.types, after.types);
    }

    #[test]
    fn conversion_counts_match_the_rate() {
        let mut system = System::new(Boundary::periodic([10.0, 10.0]), 1.0);

        let a = system.add_type("A", 1.0);
        let b = system.add_type("B", 1.0);

        system.reactions_o1.push(ReactionO1::Conversion {
            educt: a,
            product: b,
            rate: 1.0,
        });

        let mut engine = Engine::new(system, pool(4), 42).unwrap();

        engine.initialize_particles(1000, "A").unwrap();
        engine.step(0.01);

        // E[converted] = 1000 (1 - e^{-0.01}) = 9.95, sigma = 3.1.
        let snapshot = engine.snapshot();
        let converted = snapshot.count_of(b);

        assert!(
            (2..=25).contains(&converted),
            "converted {} particles",
            converted
        );
        assert_eq!(snapshot.n_particles(), 1000);
    }

    #[test]
    fn fusion_shrinks_the_population_monotonically() {
        let mut system = System::new(Boundary::periodic([5.0, 5.0]), 1.0);

        let a = system.add_type("A", 1.0);
        let b = system.add_type("B", 1.0);

        system
            .reactions_o2
            .push(ReactionO2::fusion(a, a, b, 0.2, 10.0));

        let mut engine = Engine::new(system, pool(1), 42).unwrap();

        engine.initialize_particles(200, "A").unwrap();

        let mut previous = engine.particles().n_particles();

        for _ in 0..50 {
            engine.step(1e-3);

            let current = engine.particles().n_particles();

            assert!(current <= previous);
            previous = current;
        }

        assert!(previous < 200, "no fusion event fired in 50 steps");
    }

    #[test]
    fn positions_stay_wrapped_through_reactions() {
        let mut system = System::new(Boundary::periodic([4.0, 4.0]), 1.0);

        let a = system.add_type("A", 1.0);

        // Fission with a distance beyond the box exercises the wrap pass.
        system.reactions_o1.push(ReactionO1::Fission {
            educt: a,
            product1: a,
            product2: a,
            distance: 3.0,
            rate: 20.0,
        });

        let mut engine = Engine::new(system, pool(2), 3).unwrap();

        engine.initialize_particles(50, "A").unwrap();

        for _ in 0..20 {
            engine.step(5e-3);

            let snapshot = engine.snapshot();

            for position in &snapshot.positions {
                for axis in 0..2 {
                    assert!(
                        (-2.0..2.0).contains(&position[axis]),
                        "position {} outside the box",
                        position
                    );
                }
            }
        }

        assert!(engine.particles().n_particles() > 50);
    }

    #[test]
    fn double_well_samples_both_basins() {
        let mut system = System::new(Boundary::periodic([5.0, 5.0]), 1.0);

        let a = system.add_type("A", 1.0);

        system.external_potentials.push(ExternalPotential::DoubleWell {
            particle_type: a,
            k: 1.0,
        });

        let mut engine = Engine::new(system, pool(2), 11).unwrap();

        engine.add_particle(Vector::new([1.0, 0.0]), "A").unwrap();

        let mut sum_squared = 0.0;
        let n_steps = 20_000;

        for _ in 0..n_steps {
            engine.step(1e-3);
            sum_squared += engine.snapshot().positions[0][0].powi(2);
        }

        // The stationary density of k (x^2-1)^2 at kBT = 1 keeps x^2 near
        // 1; far smaller means stuck at the barrier, far larger means the
        // walls failed.
        let mean_squared = sum_squared / n_steps as f32;

        assert!(
            (0.2..2.5).contains(&mean_squared),
            "mean x0^2 = {}",
            mean_squared
        );
    }

    #[test]
    fn trajectories_are_reproducible_with_one_worker() {
        let build = || {
            let mut system = System::new(Boundary::periodic([5.0, 5.0]), 1.0);

            let a = system.add_type("A", 1.0);
            let b = system.add_type("B", 1.0);

            system
                .reactions_o2
                .push(ReactionO2::fusion(a, a, b, 0.3, 50.0));
            system.reactions_o1.push(ReactionO1::Decay {
                educt: b,
                rate: 0.5,
            });

            let mut engine = Engine::new(system, Arc::new(TaskPool::new(1, 13)), 99).unwrap();

            engine.initialize_particles(100, "A").unwrap();
            engine
        };

        let run = |mut engine: Engine<2>| {
            for _ in 0..20 {
                engine.step(1e-2);
            }

            let snapshot = engine.snapshot();

            (snapshot.ids, snapshot.positions, snapshot.types)
        };

        assert_eq!(run(build()), run(build()));
    }

    #[test]
    fn non_finite_positions_are_quarantined() {
        struct SharedWarnings(Arc<Mutex<Vec<Warning>>>);

        impl Recorder<2> for SharedWarnings {
            fn warn(&mut self, warning: Warning) {
                if let Ok(mut warnings) = self.0.lock() {
                    warnings.push(warning);
                }
            }
        }

        let mut system = System::new(Boundary::periodic([10.0, 10.0]), 1.0);

        system.add_type("A", 0.0);

        let mut engine = Engine::new(system, pool(2), 1).unwrap();

        let healthy = engine.add_particle(Vector::new([1.0, 1.0]), "A").unwrap();
        let poisoned = engine.add_particle(Vector::new([0.0, 0.0]), "A").unwrap();

        let warnings = Arc::new(Mutex::new(Vec::new()));

        engine.set_recorder(Box::new(SharedWarnings(Arc::clone(&warnings))));
        engine
            .particles_mut()
            .set_position(poisoned, Vector::new([f32::NAN, 0.0]));

        engine.step(1e-3);

        assert!(engine.particles().exists(healthy));
        assert!(!engine.particles().exists(poisoned));

        let warnings = warnings.lock().unwrap();

        assert_eq!(
            *warnings,
            vec![Warning::NonFinitePosition {
                id: poisoned,
                step: 0
            }]
        );
    }
}
