use log::info;

use crate::{
    cell_linked_list::MeshCellLinkedList,
    error::{SphError, SphResult},
    floating_type_mod::FT,
    kernel_selection::KernelSelectionPolicy,
    mesh::BoundingBox,
    particle_configuration::{ContactParticleConfiguration, InnerParticleConfiguration},
    particles::BaseParticles,
    sph_kernels::{DimensionUtils, Kernel},
    VF,
};

/// Handle of a body inside of its [`crate::SphSystem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub usize);

/// Particles of one body together with their resolution and their own cell linked list.
///
/// Real particles always come first; indices from `total_real_particles` on are buffer particles.
#[derive(Debug)]
pub struct SphBody<DU: DimensionUtils<D>, const D: usize> {
    name: String,
    refinement_level: usize,
    particle_spacing: FT,
    kernel: Kernel<DU, D>,
    particles: BaseParticles<D>,
    total_real_particles: usize,
    cell_linked_list: MeshCellLinkedList<DU, D>,
}

impl<DU: DimensionUtils<D>, const D: usize> SphBody<DU, D> {
    /// `particle_spacing = reference_particle_spacing / 2^refinement_level`, the smoothing length is
    /// `smoothing_length_ratio` particle spacings and the cells are one cutoff radius wide.
    pub fn new(
        name: impl Into<String>,
        bounding_box: BoundingBox<D>,
        reference_particle_spacing: FT,
        smoothing_length_ratio: FT,
        buffer_size: usize,
        refinement_level: usize,
    ) -> SphResult<Self> {
        let name = name.into();
        if !(reference_particle_spacing > 0.) || !reference_particle_spacing.is_finite() {
            return Err(SphError::InvalidParameter {
                name: "reference_particle_spacing",
                details: format!("has to be positive, got {}", reference_particle_spacing),
            });
        }
        if !(smoothing_length_ratio > 0.) || !smoothing_length_ratio.is_finite() {
            return Err(SphError::InvalidParameter {
                name: "smoothing_length_ratio",
                details: format!("has to be positive, got {}", smoothing_length_ratio),
            });
        }

        let particle_spacing = i32::try_from(refinement_level)
            .map(|level| reference_particle_spacing / (2. as FT).powi(level))
            .unwrap_or(0.);
        if !(particle_spacing > 0.) || !particle_spacing.is_finite() {
            return Err(SphError::InvalidParameter {
                name: "refinement_level",
                details: format!(
                    "level {} of body '{}' leaves no representable particle spacing",
                    refinement_level, name
                ),
            });
        }
        let kernel = Kernel::new(smoothing_length_ratio * particle_spacing)?;
        let cutoff_radius = kernel.cutoff_radius();
        let cell_linked_list =
            MeshCellLinkedList::new(bounding_box, cutoff_radius, buffer_size)?.with_cutoff_radius(cutoff_radius)?;

        info!(
            "body '{}': level {}, particle spacing {}, cutoff radius {}, {:?} cells",
            name,
            refinement_level,
            particle_spacing,
            cutoff_radius,
            cell_linked_list.number_of_cells().as_slice()
        );

        Ok(SphBody {
            name,
            refinement_level,
            particle_spacing,
            kernel,
            particles: BaseParticles::default(0),
            total_real_particles: 0,
            cell_linked_list,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn refinement_level(&self) -> usize {
        self.refinement_level
    }

    pub fn particle_spacing(&self) -> FT {
        self.particle_spacing
    }

    pub fn kernel(&self) -> &Kernel<DU, D> {
        &self.kernel
    }

    pub fn particles(&self) -> &BaseParticles<D> {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut BaseParticles<D> {
        &mut self.particles
    }

    pub fn cell_linked_list(&self) -> &MeshCellLinkedList<DU, D> {
        &self.cell_linked_list
    }

    pub fn total_real_particles(&self) -> usize {
        self.total_real_particles
    }

    pub fn number_of_particles(&self) -> usize {
        self.particles.len()
    }

    /// Adds real particles. They have to be added before any buffer particle.
    pub fn add_real_particles(&mut self, positions: &[VF<D>], velocity: VF<D>, density: FT) -> SphResult<()> {
        if self.particles.len() != self.total_real_particles {
            return Err(SphError::InvalidParameter {
                name: "particles",
                details: format!("body '{}' already has buffer particles", self.name),
            });
        }
        self.particles.add_lattice(positions, velocity, self.particle_spacing, density);
        self.total_real_particles = self.particles.len();
        Ok(())
    }

    /// Adds particles behind the real ones. They are part of every neighbor search but not counted as
    /// real particles of a cell.
    pub fn add_buffer_particles(&mut self, positions: &[VF<D>]) {
        self.particles
            .add_lattice(positions, VF::<D>::zeros(), self.particle_spacing, 0.);
    }

    /// Replaces all particles, e.g. with states read back from a file. The first
    /// `total_real_particles` become the real particles.
    pub fn restore_particles(&mut self, particles: BaseParticles<D>, total_real_particles: usize) -> SphResult<()> {
        if total_real_particles > particles.len() {
            return Err(SphError::CountMismatch {
                what: "real particles in restored body",
                expected: particles.len(),
                found: total_real_particles,
            });
        }
        self.particles = particles;
        self.total_real_particles = total_real_particles;
        Ok(())
    }

    pub fn update_cell_lists(&mut self) -> SphResult<()> {
        self.cell_linked_list.update_cell_lists(&self.particles.position)
    }

    pub fn update_inner_configuration(&mut self, configuration: &mut InnerParticleConfiguration<D>) -> SphResult<()> {
        self.cell_linked_list
            .update_inner_configuration(&self.kernel, self.total_real_particles, configuration)
    }

    /// Neighbors of this body's particles among the particles of `target`, searched in `target`'s grid.
    pub fn update_contact_configuration(
        &self,
        target: &SphBody<DU, D>,
        policy: &KernelSelectionPolicy,
        configuration: &mut ContactParticleConfiguration<D>,
    ) -> SphResult<()> {
        target.cell_linked_list.update_contact_configuration(
            &self.particles.position,
            self.refinement_level,
            &self.kernel,
            target.refinement_level,
            &target.kernel,
            policy,
            configuration,
        )
    }

    /// Moves every particle by `velocity * dt`.
    pub fn advance_positions(&mut self, dt: FT) {
        let particles = &mut self.particles;
        for (position, velocity) in particles.position.iter_mut().zip(particles.velocity.iter()) {
            *position += velocity * dt;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sph_kernels::DimensionUtils2d, vec2f, VU};

    fn body(level: usize) -> SphBody<DimensionUtils2d, 2> {
        let bbox = BoundingBox::new(vec2f(0., 0.), vec2f(4., 2.)).unwrap();
        SphBody::new("tissue", bbox, 0.5, 1.25, 2, level).unwrap()
    }

    #[test]
    fn resolution_follows_refinement_level() {
        let coarse = body(0);
        assert_eq!(coarse.particle_spacing(), 0.5);
        assert_eq!(coarse.kernel().smoothing_length(), 0.625);
        assert_eq!(coarse.cell_linked_list().cell_spacing(), 1.25);
        // ceil(4 / 1.25) + 4, ceil(2 / 1.25) + 4
        assert_eq!(coarse.cell_linked_list().number_of_cells(), VU::<2>::new(8, 6));

        let fine = body(2);
        assert_eq!(fine.particle_spacing(), 0.125);
        assert_eq!(fine.kernel().cutoff_radius(), 0.3125);
    }

    #[test]
    fn buffer_particles_follow_real_particles() {
        let mut body = body(0);
        body.add_real_particles(&[vec2f(1., 1.), vec2f(1.2, 1.)], vec2f(0., 0.), 1.)
            .unwrap();
        body.add_buffer_particles(&[vec2f(1.1, 1.)]);
        assert_eq!(body.total_real_particles(), 2);
        assert_eq!(body.number_of_particles(), 3);
        assert!(body.add_real_particles(&[vec2f(0.5, 0.5)], vec2f(0., 0.), 1.).is_err());

        let mut configuration = InnerParticleConfiguration::default();
        body.update_cell_lists().unwrap();
        body.update_inner_configuration(&mut configuration).unwrap();
        assert_eq!(configuration.len(), 3);
        assert_eq!(configuration.neighborhood(0).len(), 2);

        let location = body
            .cell_linked_list()
            .mesh()
            .cell_location_from_position(&vec2f(1., 1.))
            .unwrap();
        let cell = body.cell_linked_list().cell_list(location).unwrap();
        assert_eq!(cell.len(), 3);
        assert_eq!(cell.real_particles_in_cell(), 2);
    }

    #[test]
    fn invalid_resolution_is_rejected() {
        let bbox = BoundingBox::new(vec2f(0., 0.), vec2f(4., 2.)).unwrap();
        assert!(SphBody::<DimensionUtils2d, 2>::new("a", bbox, 0., 1.3, 2, 0).is_err());
        assert!(SphBody::<DimensionUtils2d, 2>::new("a", bbox, 0.1, -1., 2, 0).is_err());
        assert!(matches!(
            SphBody::<DimensionUtils2d, 2>::new("a", bbox, 0.1, 1.3, 0, 0),
            Err(SphError::ZeroBufferSize)
        ));
    }

    #[test]
    fn unreachable_refinement_levels_are_rejected() {
        let bbox = BoundingBox::new(vec2f(0., 0.), vec2f(4., 2.)).unwrap();
        for level in [200, 5000, usize::MAX] {
            assert!(matches!(
                SphBody::<DimensionUtils2d, 2>::new("a", bbox, 0.5, 1.3, 2, level),
                Err(SphError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn advance_positions_moves_by_velocity() {
        let mut body = body(0);
        body.add_real_particles(&[vec2f(1., 1.)], vec2f(2., -1.), 1.).unwrap();
        body.advance_positions(0.25);
        assert_eq!(body.particles().position[0], vec2f(1.5, 0.75));
    }
}
