//! A spatial predator-prey model: prey are born by fission, predators die
//! by decay, predation is a catalysis, and both species feel a fusion-based
//! social friction. The microscopic pair rates are checked against their
//! macroscopic targets before the run starts, and the species counts
//! oscillate over the trajectory.

use std::sync::Arc;

use iprd::boundary::Boundary;
use iprd::engine::Engine;
use iprd::pool::TaskPool;
use iprd::rates::macroscopic_rate;
use iprd::reactions::{ReactionO1, ReactionO2};
use iprd::system::{ConfigError, System};

const DIFF_PREY: f32 = 0.01;
const DIFF_PREDATOR: f32 = 0.01;

// Macroscopic targets and the microscopic rates that realize them.
const ALPHA: f32 = 2.0; // birth: prey -> prey + prey
const ALPHA_DISTANCE: f32 = 2.0;
const BETA: f32 = 0.05; // eat: prey + pred -> pred + pred
const BETA_RADIUS: f32 = 0.25;
const BETA_MIC: f32 = 7.670_679_8;
const GAMMA: f32 = 1.5; // predator death
const FRICTION: f32 = 0.01;
const FRICTION_RADIUS: f32 = 0.2;
const FRICTION_MIC: f32 = 0.391_555_65;

fn main() -> Result<(), ConfigError> {
    let mut system = System::new(Boundary::periodic([10.0, 50.0]), 2.43614);

    let predator = system.add_type("predator", DIFF_PREDATOR);
    let prey = system.add_type("prey", DIFF_PREY);

    system.reactions_o1.push(ReactionO1::Fission {
        educt: prey,
        product1: prey,
        product2: prey,
        distance: ALPHA_DISTANCE,
        rate: ALPHA,
    });
    system.reactions_o1.push(ReactionO1::Decay {
        educt: predator,
        rate: GAMMA,
    });

    system
        .reactions_o2
        .push(ReactionO2::fusion(prey, prey, prey, FRICTION_RADIUS, FRICTION_MIC));
    system.reactions_o2.push(ReactionO2::fusion(
        predator,
        predator,
        predator,
        FRICTION_RADIUS,
        FRICTION_MIC,
    ));
    system.reactions_o2.push(ReactionO2::Catalysis {
        catalyst: predator,
        educt: prey,
        product: predator,
        radius: BETA_RADIUS,
        rate: BETA_MIC,
    });

    // The microscopic rates must reproduce the macroscopic model.
    let beta_macro = macroscopic_rate(BETA_MIC, DIFF_PREY, DIFF_PREDATOR, BETA_RADIUS);
    let friction_macro =
        macroscopic_rate(FRICTION_MIC, DIFF_PREY, DIFF_PREDATOR, FRICTION_RADIUS);

    assert!(
        (beta_macro - BETA).abs() < 1e-4,
        "beta: macroscopic {} vs target {}",
        beta_macro,
        BETA
    );
    assert!(
        (friction_macro - FRICTION).abs() < 1e-4,
        "friction: macroscopic {} vs target {}",
        friction_macro,
        FRICTION
    );

    let pool = Arc::new(TaskPool::new(4, 11));
    let mut engine = Engine::new(system, pool, 11)?;

    engine.initialize_particles(125, "prey")?;
    engine.initialize_particles(100, "predator")?;

    for step in 0..10_000u64 {
        engine.step(5e-3);

        if step % 200 == 0 {
            let snapshot = engine.snapshot();

            println!(
                "step {:>5}: {:>5} prey, {:>5} predators",
                step,
                snapshot.count_of(prey),
                snapshot.count_of(predator),
            );
        }
    }

    Ok(())
}
