//! Enzyme kinetics: E + S fuse into the complex ES, which either releases
//! the substrate again or turns it over into the product P.

use std::sync::Arc;

use iprd::boundary::Boundary;
use iprd::engine::Engine;
use iprd::pool::TaskPool;
use iprd::reactions::{ReactionO1, ReactionO2};
use iprd::system::{ConfigError, System};

fn main() -> Result<(), ConfigError> {
    let mut system = System::new(Boundary::periodic([0.3, 0.3, 0.3]), 2.43614);

    let e = system.add_type("E", 10.0);
    let s = system.add_type("S", 10.0);
    let es = system.add_type("ES", 10.0);
    let p = system.add_type("P", 10.0);

    // ES -> E + S (unbinding) and ES -> E + P (turnover).
    system.reactions_o1.push(ReactionO1::Fission {
        educt: es,
        product1: e,
        product2: s,
        distance: 0.03,
        rate: 1.0,
    });
    system.reactions_o1.push(ReactionO1::Fission {
        educt: es,
        product1: e,
        product2: p,
        distance: 0.03,
        rate: 1.0,
    });

    // E + S -> ES.
    system
        .reactions_o2
        .push(ReactionO2::fusion(e, s, es, 0.03, 86.786_385));

    let pool = Arc::new(TaskPool::new(4, 17));
    let mut engine = Engine::new(system, pool, 17)?;

    engine.initialize_particles(40, "E")?;
    engine.initialize_particles(400, "S")?;

    for step in 0..20_000u64 {
        engine.step(1e-4);

        if step % 1_000 == 0 {
            let snapshot = engine.snapshot();

            println!(
                "step {:>6}: E {:>4}  S {:>4}  ES {:>4}  P {:>4}",
                step,
                snapshot.count_of(e),
                snapshot.count_of(s),
                snapshot.count_of(es),
                snapshot.count_of(p),
            );
        }
    }

    Ok(())
}
