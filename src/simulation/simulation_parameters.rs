use crate::{error::ConfigError, floating_type_mod::FT, V2};
use serde::{Deserialize, Serialize};

/// Axis-aligned simulation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: FT,
    pub right: FT,
    pub bottom: FT,
    pub top: FT,
}

impl Bounds {
    pub fn width(&self) -> FT {
        self.right - self.left
    }

    pub fn height(&self) -> FT {
        self.top - self.bottom
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InitialLayout {
    // centered square grid with the given particle spacing
    Grid { spacing: FT },

    // uniform positions inside the bounds, deterministic for a fixed seed
    Random { seed: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    pub particle_count: usize,
    pub particle_mass: FT,

    // also the cell size of the spatial hash grid
    pub smoothing_radius: FT,

    pub rest_density: FT,
    pub pressure_stiffness: FT,
    pub gravity: [FT; 2],

    pub bounds: Bounds,
    // collision radius of a particle against the bounds, not the smoothing radius
    pub particle_radius: FT,
    // velocity kept after a boundary reflection, in [0, 1]
    pub restitution: FT,

    // short fixed interval used to advance positions for density estimation
    pub prediction_lookahead: FT,

    pub initial_layout: InitialLayout,
}

impl SimulationParams {
    pub fn gravity_vector(&self) -> V2 {
        V2::from_column_slice(&self.gravity)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.particle_count == 0 {
            return Err(ConfigError::InvalidParticleCount);
        }
        if !(self.particle_mass > 0.) {
            return Err(ConfigError::InvalidMass(self.particle_mass));
        }
        if !(self.smoothing_radius > 0.) {
            return Err(ConfigError::InvalidSmoothingRadius(self.smoothing_radius));
        }
        if !(self.particle_radius > 0.) {
            return Err(ConfigError::InvalidParticleRadius(self.particle_radius));
        }
        if !(self.bounds.width() > 0.) || !(self.bounds.height() > 0.) {
            return Err(ConfigError::InvalidBounds {
                left: self.bounds.left,
                right: self.bounds.right,
                bottom: self.bounds.bottom,
                top: self.bounds.top,
            });
        }
        if !(self.restitution >= 0. && self.restitution <= 1.) {
            return Err(ConfigError::InvalidRestitution(self.restitution));
        }
        if let InitialLayout::Grid { spacing } = self.initial_layout {
            if !(spacing > 0.) {
                return Err(ConfigError::InvalidLayoutSpacing(spacing));
            }
        }
        Ok(())
    }
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            particle_count: 50,
            particle_mass: 1.,
            smoothing_radius: 0.2,
            rest_density: 0.5,
            pressure_stiffness: 0.5,
            gravity: [0., -9.81],
            bounds: Bounds {
                left: -5.,
                right: 5.,
                bottom: -5.,
                top: 5.,
            },
            particle_radius: 0.2,
            restitution: 0.5,
            prediction_lookahead: 1. / 120.,
            initial_layout: InitialLayout::Random { seed: 12345 },
        }
    }
}
