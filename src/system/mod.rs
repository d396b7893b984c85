use serde_derive::{Deserialize, Serialize};

use thiserror::Error;

use crate::boundary::Boundary;
use crate::potentials::{ExternalPotential, PairPotential};
use crate::reactions::{ReactionO1, ReactionO2};

/// A configuration problem detected while building an engine. Unrecoverable;
/// reported to the caller of `Engine::new` or `System::from_json`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("box extent along axis {axis} must be positive, got {extent}")]
    InvalidBoxExtent { axis: usize, extent: f32 },

    #[error("system declares no particle types")]
    NoTypes,

    #[error("unknown particle type name `{0}`")]
    UnknownTypeName(String),

    #[error("particle type id {id} out of range for {n_types} declared types")]
    TypeIdOutOfRange { id: usize, n_types: usize },

    #[error("diffusion constant of type `{name}` must be non-negative, got {value}")]
    NegativeDiffusionConstant { name: String, value: f32 },

    #[error("kBT must be positive, got {0}")]
    NonPositiveTemperature(f32),

    #[error("negative rate {rate} in {reaction} reaction")]
    NegativeRate { reaction: &'static str, rate: f32 },

    #[error("reaction radius must be positive in {reaction} reaction, got {radius}")]
    NonPositiveRadius { reaction: &'static str, radius: f32 },

    #[error("fission distance must be non-negative, got {0}")]
    NegativeFissionDistance(f32),

    #[error("pair potential cutoff must be positive, got {0}")]
    NonPositiveCutoff(f32),

    #[error("failed to parse system descriptor: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One row of the closed per-system type table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleTypeInfo {
    pub name: String,
    pub diffusion_constant: f32,
}

/// The full description of a simulated system: box, temperature, the type
/// table, and the potential and reaction catalogues. Immutable for the run
/// once an engine has been built from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct System<const D: usize> {
    pub boundary: Boundary<D>,
    pub kbt: f32,
    pub types: Vec<ParticleTypeInfo>,
    #[serde(default)]
    pub external_potentials: Vec<ExternalPotential<D>>,
    #[serde(default)]
    pub pair_potentials: Vec<PairPotential>,
    #[serde(default)]
    pub reactions_o1: Vec<ReactionO1>,
    #[serde(default)]
    pub reactions_o2: Vec<ReactionO2>,
}

impl<const D: usize> System<D> {
    pub fn new(boundary: Boundary<D>, kbt: f32) -> Self {
        Self {
            boundary,
            kbt,
            types: Vec::new(),
            external_potentials: Vec::new(),
            pair_potentials: Vec::new(),
            reactions_o1: Vec::new(),
            reactions_o2: Vec::new(),
        }
    }

    /// Declares a particle type and returns its id. Reaction and potential
    /// descriptors refer to types by these ids.
    pub fn add_type(&mut self, name: &str, diffusion_constant: f32) -> usize {
        self.types.push(ParticleTypeInfo {
            name: name.to_string(),
            diffusion_constant,
        });

        self.types.len() - 1
    }

    /// Looks a type id up by name.
    pub fn type_id(&self, name: &str) -> Result<usize, ConfigError> {
        self.types
            .iter()
            .position(|info| info.name == name)
            .ok_or_else(|| ConfigError::UnknownTypeName(name.to_string()))
    }

    pub fn n_types(&self) -> usize {
        self.types.len()
    }

    pub fn diffusion_constant_of(&self, type_id: usize) -> f32 {
        self.types[type_id].diffusion_constant
    }

    pub fn has_forces(&self) -> bool {
        !self.external_potentials.is_empty() || !self.pair_potentials.is_empty()
    }

    pub fn has_reactions(&self) -> bool {
        !self.reactions_o1.is_empty() || !self.reactions_o2.is_empty()
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let system: Self = serde_json::from_str(json)?;

        system.validate()?;

        Ok(system)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks the descriptor for configuration errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for axis in 0..D {
            let extent = self.boundary.extents[axis];

            if extent <= 0.0 {
                return Err(ConfigError::InvalidBoxExtent { axis, extent });
            }
        }

        if self.kbt <= 0.0 {
            return Err(ConfigError::NonPositiveTemperature(self.kbt));
        }

        if self.types.is_empty() {
            return Err(ConfigError::NoTypes);
        }

        for info in &self.types {
            if info.diffusion_constant < 0.0 {
                return Err(ConfigError::NegativeDiffusionConstant {
                    name: info.name.clone(),
                    value: info.diffusion_constant,
                });
            }
        }

        for potential in &self.external_potentials {
            self.check_type_id(potential.particle_type())?;
        }

        for potential in &self.pair_potentials {
            if potential.cutoff() <= 0.0 {
                return Err(ConfigError::NonPositiveCutoff(potential.cutoff()));
            }

            if let PairPotential::HarmonicRepulsion {
                types: Some((a, b)),
                ..
            } = potential
            {
                self.check_type_id(*a)?;
                self.check_type_id(*b)?;
            }
        }

        for reaction in &self.reactions_o1 {
            if reaction.rate() < 0.0 {
                return Err(ConfigError::NegativeRate {
                    reaction: reaction.name(),
                    rate: reaction.rate(),
                });
            }

            match reaction {
                ReactionO1::Decay { educt, .. } => self.check_type_id(*educt)?,
                ReactionO1::Conversion { educt, product, .. } => {
                    self.check_type_id(*educt)?;
                    self.check_type_id(*product)?;
                }
                ReactionO1::Fission {
                    educt,
                    product1,
                    product2,
                    distance,
                    ..
                } => {
                    self.check_type_id(*educt)?;
                    self.check_type_id(*product1)?;
                    self.check_type_id(*product2)?;

                    if *distance < 0.0 {
                        return Err(ConfigError::NegativeFissionDistance(*distance));
                    }
                }
            }
        }

        for reaction in &self.reactions_o2 {
            if reaction.rate() < 0.0 {
                return Err(ConfigError::NegativeRate {
                    reaction: reaction.name(),
                    rate: reaction.rate(),
                });
            }

            if reaction.radius() <= 0.0 {
                return Err(ConfigError::NonPositiveRadius {
                    reaction: reaction.name(),
                    radius: reaction.radius(),
                });
            }

            let (educt1, educt2) = reaction.educts();

            self.check_type_id(educt1)?;
            self.check_type_id(educt2)?;

            match reaction {
                ReactionO2::Fusion { product, .. } => self.check_type_id(*product)?,
                ReactionO2::Catalysis { product, .. } => self.check_type_id(*product)?,
            }
        }

        Ok(())
    }

    fn check_type_id(&self, id: usize) -> Result<(), ConfigError> {
        if id >= self.types.len() {
            return Err(ConfigError::TypeIdOutOfRange {
                id,
                n_types: self.types.len(),
            });
        }

        Ok(())
    }
}
