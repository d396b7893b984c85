use core::fmt::{self, Display};

#[cfg(feature = "debug_cycle_counts")]
use core::arch::x86_64::_rdtsc;

use num_format::{Locale, ToFormattedString};

/// The phases of a simulation step, used to index the cycle counters.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StepPhase {
    CellListUpdate = 0,
    Forces,
    Integrate,
    ReactionPropose,
    ReactionCommit,
}

pub const N_STEP_PHASES: usize = 5;

impl Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::CellListUpdate => "CellListUpdate",
            Self::Forces => "Forces",
            Self::Integrate => "Integrate",
            Self::ReactionPropose => "ReactionPropose",
            Self::ReactionCommit => "ReactionCommit",
        };

        write!(f, "{}", label)
    }
}

impl StepPhase {
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Self::CellListUpdate,
            1 => Self::Forces,
            2 => Self::Integrate,
            3 => Self::ReactionPropose,
            _ => Self::ReactionCommit,
        }
    }
}

#[derive(Default, Debug, Copy, Clone)]
pub struct CycleCounter {
    pub last_start_cycles: u64,
    pub total_cycles: u64,
    pub hits: usize,
}

impl fmt::Display for CycleCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Hits: {}{}",
            pad_right(self.hits.to_string(), 8),
            if self.hits > 0 {
                format!(
                    "Cycles/hit: {}",
                    self.get_average_cycles().to_formatted_string(&Locale::en)
                )
            } else {
                String::default()
            }
        )
    }
}

impl CycleCounter {
    pub fn start(&mut self) {
        #[cfg(target_arch = "x86_64")]
        #[cfg(feature = "debug_cycle_counts")]
        {
            self.last_start_cycles = unsafe { _rdtsc() };
        }
    }

    pub fn end(&mut self) {
        #[cfg(target_arch = "x86_64")]
        #[cfg(feature = "debug_cycle_counts")]
        {
            unsafe {
                self.hits += 1;
                self.total_cycles += _rdtsc() - self.last_start_cycles;
            }
        }
    }

    fn get_average_cycles(&self) -> u64 {
        (self.total_cycles as f64 / self.hits as f64) as u64
    }
}

/// One counter per step phase.
#[derive(Default, Debug)]
pub struct StepCounters([CycleCounter; N_STEP_PHASES]);

impl StepCounters {
    pub fn get_mut(&mut self, phase: StepPhase) -> &mut CycleCounter {
        &mut self.0[phase as usize]
    }

    pub fn reset(&mut self) {
        #[cfg(feature = "debug_cycle_counts")]
        {
            for counter in &mut self.0 {
                counter.hits = 0;
                counter.total_cycles = 0;
            }
        }
    }

    pub fn report(&self) {
        for (index, counter) in self.0.iter().enumerate() {
            if counter.hits != 0 {
                let label = format!("{}", StepPhase::from_index(index));
                let label_padded = pad_right(label, 20);

                println!("\t{}\t{}", label_padded, counter);
            }
        }

        println!();
    }
}

fn pad_right(v: String, width: usize) -> String {
    let len = v.len();

    debug_assert!(width >= len);

    v + &" ".repeat(width - len)
}
