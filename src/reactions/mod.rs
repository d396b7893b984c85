use serde_derive::{Deserialize, Serialize};

pub mod engine;

/// A first-order (unimolecular) reaction; fires for a single educt particle
/// with probability `1 - exp(-rate * tau)` per step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReactionO1 {
    /// `educt -> nothing`.
    Decay { educt: usize, rate: f32 },
    /// `educt -> product`, in place.
    Conversion {
        educt: usize,
        product: usize,
        rate: f32,
    },
    /// `educt -> product1 + product2`, the products placed `distance`-apart
    /// at most, symmetrically around the educt.
    Fission {
        educt: usize,
        product1: usize,
        product2: usize,
        distance: f32,
        rate: f32,
    },
}

impl ReactionO1 {
    pub fn educt(&self) -> usize {
        match self {
            Self::Decay { educt, .. }
            | Self::Conversion { educt, .. }
            | Self::Fission { educt, .. } => *educt,
        }
    }

    pub fn rate(&self) -> f32 {
        match self {
            Self::Decay { rate, .. }
            | Self::Conversion { rate, .. }
            | Self::Fission { rate, .. } => *rate,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Decay { .. } => "decay",
            Self::Conversion { .. } => "conversion",
            Self::Fission { .. } => "fission",
        }
    }
}

/// A second-order (bimolecular) reaction; fires for an educt pair closer
/// than `radius` with probability `1 - exp(-rate * tau)` per step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReactionO2 {
    /// `educt1 + educt2 -> product`; the product is placed at
    /// `x1 + w * (x2 - x1)` with the weight picked by educt identity.
    Fusion {
        educt1: usize,
        educt2: usize,
        product: usize,
        radius: f32,
        rate: f32,
        weight1: f32,
        weight2: f32,
    },
    /// `catalyst + educt -> catalyst + product`.
    Catalysis {
        catalyst: usize,
        educt: usize,
        product: usize,
        radius: f32,
        rate: f32,
    },
}

impl ReactionO2 {
    /// A fusion placing the product halfway between its educts.
    pub fn fusion(educt1: usize, educt2: usize, product: usize, radius: f32, rate: f32) -> Self {
        Self::Fusion {
            educt1,
            educt2,
            product,
            radius,
            rate,
            weight1: 0.5,
            weight2: 0.5,
        }
    }

    pub fn educts(&self) -> (usize, usize) {
        match self {
            Self::Fusion { educt1, educt2, .. } => (*educt1, *educt2),
            Self::Catalysis {
                catalyst, educt, ..
            } => (*catalyst, *educt),
        }
    }

    pub fn radius(&self) -> f32 {
        match self {
            Self::Fusion { radius, .. } | Self::Catalysis { radius, .. } => *radius,
        }
    }

    pub fn rate(&self) -> f32 {
        match self {
            Self::Fusion { rate, .. } | Self::Catalysis { rate, .. } => *rate,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Fusion { .. } => "fusion",
            Self::Catalysis { .. } => "catalysis",
        }
    }
}
