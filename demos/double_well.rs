//! A two-species double-well system: both species sit in a bistable
//! external potential, repel each other harmonically, and fuse slowly.
//! Prints the basin occupancy and the species census as the run progresses.

use std::sync::Arc;

use iprd::boundary::Boundary;
use iprd::engine::Engine;
use iprd::pool::TaskPool;
use iprd::potentials::{ExternalPotential, PairPotential};
use iprd::reactions::ReactionO2;
use iprd::system::{ConfigError, System};

fn main() -> Result<(), ConfigError> {
    let mut system = System::new(Boundary::periodic([5.0, 5.0]), 1.0);

    let a = system.add_type("A", 1.0);
    let b = system.add_type("B", 1.0);

    system
        .external_potentials
        .push(ExternalPotential::DoubleWell {
            particle_type: a,
            k: 1.0,
        });
    system
        .external_potentials
        .push(ExternalPotential::DoubleWell {
            particle_type: b,
            k: 1.0,
        });
    system.pair_potentials.push(PairPotential::HarmonicRepulsion {
        cutoff: 0.1,
        k: 1.0,
        types: None,
    });
    system
        .reactions_o2
        .push(ReactionO2::fusion(a, a, b, 0.1, 0.1));

    let pool = Arc::new(TaskPool::new(4, 5));
    let mut engine = Engine::new(system, pool, 5)?;

    engine.initialize_particles(500, "A")?;

    for step in 0..50_000u64 {
        engine.step(1e-3);

        if step % 5_000 == 0 {
            let snapshot = engine.snapshot();
            let left = snapshot
                .positions
                .iter()
                .filter(|position| position[0] < 0.0)
                .count();

            println!(
                "step {:>6}: {} particles ({} A, {} B), {} in the left basin",
                step,
                snapshot.n_particles(),
                snapshot.count_of(a),
                snapshot.count_of(b),
                left,
            );
        }
    }

    Ok(())
}
