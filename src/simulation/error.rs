use crate::floating_type_mod::FT;
use thiserror::Error;

/// Errors detected once during configuration validation. The solver never
/// starts stepping with an invalid configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("particle count must be positive")]
    InvalidParticleCount,

    #[error("particle mass must be positive, got {0}")]
    InvalidMass(FT),

    #[error("smoothing radius must be positive, got {0}")]
    InvalidSmoothingRadius(FT),

    #[error("particle radius must be positive, got {0}")]
    InvalidParticleRadius(FT),

    #[error("bounds are inverted or empty: left={left} right={right} bottom={bottom} top={top}")]
    InvalidBounds { left: FT, right: FT, bottom: FT, top: FT },

    #[error("restitution must be in [0, 1], got {0}")]
    InvalidRestitution(FT),

    #[error("grid layout spacing must be positive, got {0}")]
    InvalidLayoutSpacing(FT),
}
