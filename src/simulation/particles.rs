use nalgebra::zero;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    floating_type_mod::FT,
    simulation_parameters::{InitialLayout, SimulationParams},
    vec2f, V2,
};

macro_rules! decl_particle_vec {
    (pub struct $struct_name:ident { $(pub $field_name:ident: Vec<$field_type:ty> | $default_value:expr),*$(,)? }) => {
        /// Structure-of-arrays particle storage. All arrays always have the
        /// same length; every cross-component access goes through an index.
        pub struct $struct_name {
            $(
                pub $field_name : Vec<$field_type>,
            )*
        }

        impl $struct_name {
            pub fn default(len: usize) -> Self {
                $struct_name {
                    $(
                        $field_name : vec![$default_value; len],
                    )*
                }
            }

            pub fn fill_defaults(&mut self) {
                $(
                    for value in self.$field_name.iter_mut() {
                        *value = $default_value;
                    }
                )*
            }
        }
    };
}

decl_particle_vec!(
    pub struct ParticleVec {
        pub position: Vec<V2> | zero(),
        pub velocity: Vec<V2> | zero(),
        pub predicted_position: Vec<V2> | zero(),
        pub density: Vec<FT> | 0.,
        pub force: Vec<V2> | zero(),
        pub mass: Vec<FT> | 0.,
    }
);

impl ParticleVec {
    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /// (Re)populate positions from the configured layout and zero all derived
    /// state. Only legal between simulation runs, never mid-step. The caller
    /// must have validated `params` already.
    pub fn reset(&mut self, params: &SimulationParams) {
        self.fill_defaults();

        for mass in self.mass.iter_mut() {
            *mass = params.particle_mass;
        }

        match params.initial_layout {
            InitialLayout::Random { seed } => {
                let mut rng = StdRng::seed_from_u64(seed);
                for position in self.position.iter_mut() {
                    let x = params.bounds.left + rng.gen::<FT>() * params.bounds.width();
                    let y = params.bounds.bottom + rng.gen::<FT>() * params.bounds.height();
                    *position = vec2f(x, y);
                }
            }
            InitialLayout::Grid { spacing } => {
                let num_particles = self.position.len();
                let per_row = (num_particles as FT).sqrt().ceil() as usize;
                let num_rows = (num_particles + per_row - 1) / per_row;
                let center = vec2f(
                    (params.bounds.left + params.bounds.right) / 2.,
                    (params.bounds.bottom + params.bounds.top) / 2.,
                );
                let min = center
                    - vec2f(
                        (per_row - 1) as FT * spacing / 2.,
                        (num_rows - 1) as FT * spacing / 2.,
                    );
                for (i, position) in self.position.iter_mut().enumerate() {
                    let x = (i % per_row) as FT;
                    let y = (i / per_row) as FT;
                    *position = min + vec2f(x * spacing, y * spacing);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation_parameters::InitialLayout;

    #[test]
    fn arrays_share_length() {
        let particles = ParticleVec::default(17);
        assert_eq!(particles.len(), 17);
        assert_eq!(particles.position.len(), 17);
        assert_eq!(particles.velocity.len(), 17);
        assert_eq!(particles.predicted_position.len(), 17);
        assert_eq!(particles.density.len(), 17);
        assert_eq!(particles.force.len(), 17);
        assert_eq!(particles.mass.len(), 17);
    }

    #[test]
    fn seeded_layout_is_deterministic() {
        let mut params = SimulationParams::default();
        params.particle_count = 64;
        params.initial_layout = InitialLayout::Random { seed: 98765 };

        let mut a = ParticleVec::default(params.particle_count);
        let mut b = ParticleVec::default(params.particle_count);
        a.reset(&params);
        b.reset(&params);

        assert_eq!(a.position, b.position);

        // positions stay inside the configured bounds
        for p in &a.position {
            assert!(p.x >= params.bounds.left && p.x <= params.bounds.right);
            assert!(p.y >= params.bounds.bottom && p.y <= params.bounds.top);
        }
    }

    #[test]
    fn reset_clears_derived_state() {
        let mut params = SimulationParams::default();
        params.particle_count = 8;

        let mut particles = ParticleVec::default(params.particle_count);
        particles.velocity[3] = vec2f(1., 2.);
        particles.density[3] = 9.;
        particles.force[3] = vec2f(-1., 0.5);

        particles.reset(&params);

        assert_eq!(particles.velocity[3], vec2f(0., 0.));
        assert_eq!(particles.density[3], 0.);
        assert_eq!(particles.force[3], vec2f(0., 0.));
        assert_eq!(particles.mass[3], params.particle_mass);
    }

    #[test]
    fn grid_layout_is_centered_and_spaced() {
        let mut params = SimulationParams::default();
        params.particle_count = 9;
        params.initial_layout = InitialLayout::Grid { spacing: 0.1 };

        let mut particles = ParticleVec::default(params.particle_count);
        particles.reset(&params);

        // 3x3 grid centered on the bounds center (0, 0)
        assert_eq!(particles.position[4], vec2f(0., 0.));
        let dx = particles.position[1] - particles.position[0];
        assert!((dx.x - 0.1).abs() < 1e-6);
        assert_eq!(dx.y, 0.);
    }
}
