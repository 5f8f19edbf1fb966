pub mod body;
pub mod cell_linked_list;
pub mod cell_list;
pub mod concurrency;
pub mod error;
pub mod io_system;
pub mod kernel_selection;
pub mod mesh;
pub mod neighborhood_check;
pub mod particle_configuration;
pub mod particles;
pub mod relation;
pub mod simulation_parameters;
pub mod sph_kernels;
pub mod system;
pub mod thread_safe_ptr;

pub type IT = i32;

#[cfg(feature = "double-precision")]
pub mod floating_type_mod {
    pub type FT = f64;
    pub use std::f64::consts::{FRAC_1_PI, PI, TAU};
}

#[cfg(not(feature = "double-precision"))]
pub mod floating_type_mod {
    pub type FT = f32;
    pub use std::f32::consts::{FRAC_1_PI, PI, TAU};
}

use floating_type_mod::FT;

use nalgebra::SVector;

pub type V<T, const D: usize> = SVector<T, D>;

pub type VF<const D: usize> = V<FT, D>;
pub type VI<const D: usize> = V<IT, D>;
pub type VU<const D: usize> = V<usize, D>;

/// Raw (unchecked) cell coordinates. Wide enough that stencil offsets never overflow
/// for positions far outside of a grid.
pub type VC<const D: usize> = V<i64, D>;

pub fn vec2f(x: FT, y: FT) -> V<FT, 2> {
    [x, y].into()
}

pub fn vec3f(x: FT, y: FT, z: FT) -> V<FT, 3> {
    [x, y, z].into()
}

pub use body::{BodyId, SphBody};
pub use cell_linked_list::MeshCellLinkedList;
pub use cell_list::{CellList, ConcurrentPush, ListData};
pub use error::{SphError, SphResult};
pub use kernel_selection::{CoarserKernel, KernelSelection, KernelSelectionPolicy, OriginKernel};
pub use mesh::{BoundingBox, Mesh, MeshDataMatrix, MeshOutput};
pub use particle_configuration::{
    ContactParticleConfiguration, InnerParticleConfiguration, NeighborRelation, Neighborhood, ParticleConfiguration,
};
pub use particles::BaseParticles;
pub use relation::{BodyRelation, ComplexRelation, ContactRelation, InnerRelation};
pub use sph_kernels::{DimensionUtils, DimensionUtils2d, DimensionUtils3d, Kernel};
pub use system::{SimulationContext, SphSystem};

pub fn is_ft_approx_eq<T: num_traits::Float>(a: T, b: T, tolerance: T) -> bool {
    assert!(!a.is_nan());
    assert!(!b.is_nan());
    b <= a + tolerance && b >= a - tolerance
}

pub fn assert_ft_approx_eq<T: num_traits::Float + std::fmt::Display>(
    a: T,
    b: T,
    tolerance: T,
    s: impl FnOnce() -> String,
) {
    if !is_ft_approx_eq(a, b, tolerance) {
        panic!(
            "{} value not equal with a tolerance of {}:\n\ta={}\n\tb={}\n",
            s(),
            tolerance,
            a,
            b
        );
    }
}
