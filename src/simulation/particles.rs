use nalgebra::zero;

use crate::{floating_type_mod::FT, VF, VU};

macro_rules! decl_particle_vec {
    (pub struct $struct_name:ident<const D: usize> { $(pub $field_name:ident: Vec<$field_type:ty> | $default_value:expr),*$(,)?  }) => {
        #[derive(Debug, Clone)]
        pub struct $struct_name<const D: usize> {
            $(
                pub $field_name : Vec<$field_type>,
            )*
        }

        impl<const D: usize> $struct_name<D> {
            pub fn swap(&mut self, i: usize, j: usize) {
                $(
                    self.$field_name.swap(i, j);
                )*
            }

            pub fn truncate(&mut self, len: usize) {
                $(
                    self.$field_name.truncate(len);
                )*
            }

            pub fn extend(&mut self, num_elements: usize) {
                $(
                    self.$field_name.extend((0..num_elements).map::<$field_type, _>(|_| $default_value));
                )*
            }

            pub fn default(len: usize) -> Self {
                Self {
                    $(
                        $field_name: (0..len).map(|_| $default_value).collect::<Vec<$field_type>>(),
                    )*
                }
            }
        }
    }
}

decl_particle_vec! {
    pub struct BaseParticles<const D: usize> {
        pub mass: Vec<FT> | 0.,
        pub volume: Vec<FT> | 0.,
        pub position: Vec<VF<D>> | zero(),
        pub velocity: Vec<VF<D>> | zero(),
        // force per unit mass
        pub acceleration: Vec<VF<D>> | zero(),

        pub species: Vec<Vec<FT>> | Vec::new(),
    }
}

impl<const D: usize> BaseParticles<D> {
    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /// Appends particles of volume `particle_spacing^D` at the given positions.
    pub fn add_lattice(&mut self, positions: &[VF<D>], velocity: VF<D>, particle_spacing: FT, density: FT) {
        let first = self.len();
        self.extend(positions.len());
        let volume = particle_spacing.powi(D as i32);
        for (k, position) in positions.iter().enumerate() {
            let i = first + k;
            self.position[i] = *position;
            self.velocity[i] = velocity;
            self.volume[i] = volume;
            self.mass[i] = volume * density;
        }
    }

    /// Sets all species concentrations to `values`.
    pub fn initialize_species(&mut self, values: &[FT]) {
        for species in &mut self.species {
            species.clear();
            species.extend_from_slice(values);
        }
    }
}

/// Cell-centered lattice points with distance `particle_spacing` covering `[lower, upper]`.
pub fn lattice_positions<const D: usize>(lower: VF<D>, upper: VF<D>, particle_spacing: FT) -> Vec<VF<D>> {
    if D == 0 || !(particle_spacing > 0.) {
        return Vec::new();
    }
    let counts = VU::<D>::from_fn(|d, _| ((upper[d] - lower[d]) / particle_spacing).round().max(0.) as usize);
    if counts.iter().any(|&c| c == 0) {
        return Vec::new();
    }

    let mut positions = Vec::with_capacity(counts.iter().product());
    let mut index = VU::<D>::zeros();
    loop {
        positions.push(VF::<D>::from_fn(|d, _| {
            lower[d] + (index[d] as FT + 0.5) * particle_spacing
        }));

        let mut d = 0;
        loop {
            index[d] += 1;
            if index[d] < counts[d] {
                break;
            }
            index[d] = 0;
            d += 1;
            if d == D {
                return positions;
            }
        }
    }
}

#[test]
fn lattice_covers_the_block() {
    let positions = lattice_positions(crate::vec2f(0., 0.), crate::vec2f(1., 0.5), 0.25);
    assert_eq!(positions.len(), 4 * 2);
    assert_eq!(positions[0], crate::vec2f(0.125, 0.125));
    assert_eq!(positions[7], crate::vec2f(0.875, 0.375));

    assert!(lattice_positions(crate::vec2f(0., 0.), crate::vec2f(0., 1.), 0.25).is_empty());
    assert!(lattice_positions(crate::vec2f(0., 0.), crate::vec2f(1., 1.), 0.).is_empty());
}

#[test]
fn particle_arrays_grow_together() {
    let mut particles = BaseParticles::<2>::default(0);
    let positions = lattice_positions(crate::vec2f(0., 0.), crate::vec2f(1., 1.), 0.5);
    particles.add_lattice(&positions, crate::vec2f(1., 0.), 0.5, 2.);
    particles.initialize_species(&[0.3, 0.7]);

    assert_eq!(particles.len(), 4);
    assert_eq!(particles.mass, vec![0.5; 4]);
    assert_eq!(particles.volume, vec![0.25; 4]);
    assert_eq!(particles.species[3], vec![0.3, 0.7]);

    particles.extend(2);
    assert_eq!(particles.velocity.len(), 6);
    assert!(particles.species[5].is_empty());

    particles.swap(0, 5);
    assert_eq!(particles.position[5], crate::vec2f(0.25, 0.25));
    particles.truncate(3);
    assert_eq!(particles.acceleration.len(), 3);
}
