use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    body::{BodyId, SphBody},
    error::{SphError, SphResult},
    floating_type_mod::FT,
    mesh::BoundingBox,
    sph_kernels::DimensionUtils,
};

/// Time keeping of a run. Handed to every writer instead of living in global state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationContext {
    pub physical_time: FT,
    pub restart_step: usize,
    pub iteration: usize,
}

/// All bodies of a simulation sharing one bounding box and one reference resolution.
#[derive(Debug)]
pub struct SphSystem<DU: DimensionUtils<D>, const D: usize> {
    bounding_box: BoundingBox<D>,
    reference_particle_spacing: FT,
    smoothing_length_ratio: FT,
    buffer_size: usize,
    bodies: Vec<SphBody<DU, D>>,
    pub context: SimulationContext,
}

impl<DU: DimensionUtils<D>, const D: usize> SphSystem<DU, D> {
    pub fn new(
        bounding_box: BoundingBox<D>,
        reference_particle_spacing: FT,
        smoothing_length_ratio: FT,
        buffer_size: usize,
    ) -> SphResult<Self> {
        if buffer_size == 0 {
            return Err(SphError::ZeroBufferSize);
        }
        Ok(SphSystem {
            bounding_box,
            reference_particle_spacing,
            smoothing_length_ratio,
            buffer_size,
            bodies: Vec::new(),
            context: SimulationContext::default(),
        })
    }

    pub fn bounding_box(&self) -> &BoundingBox<D> {
        &self.bounding_box
    }

    pub fn reference_particle_spacing(&self) -> FT {
        self.reference_particle_spacing
    }

    pub fn add_body(&mut self, name: &str, refinement_level: usize) -> SphResult<BodyId> {
        if self.bodies.iter().any(|body| body.name() == name) {
            return Err(SphError::DuplicateBody(name.to_string()));
        }
        let body = SphBody::new(
            name,
            self.bounding_box,
            self.reference_particle_spacing,
            self.smoothing_length_ratio,
            self.buffer_size,
            refinement_level,
        )?;
        self.bodies.push(body);
        Ok(BodyId(self.bodies.len() - 1))
    }

    pub fn body_id(&self, name: &str) -> SphResult<BodyId> {
        self.bodies
            .iter()
            .position(|body| body.name() == name)
            .map(BodyId)
            .ok_or_else(|| SphError::UnknownBody(name.to_string()))
    }

    pub fn body(&self, id: BodyId) -> &SphBody<DU, D> {
        &self.bodies[id.0]
    }

    pub fn body_mut(&mut self, id: BodyId) -> &mut SphBody<DU, D> {
        &mut self.bodies[id.0]
    }

    pub fn bodies(&self) -> &[SphBody<DU, D>] {
        &self.bodies
    }

    pub fn bodies_mut(&mut self) -> &mut [SphBody<DU, D>] {
        &mut self.bodies
    }

    pub fn body_names(&self) -> Vec<String> {
        self.bodies.iter().map(|body| body.name().to_string()).collect()
    }

    /// Rebuilds the cell lists of every body. Stops at the first body that fails.
    pub fn update_cell_lists(&mut self) -> SphResult<()> {
        self.bodies.iter_mut().try_for_each(SphBody::update_cell_lists)
    }

    /// Advances the context by one step of length `dt`.
    pub fn advance_time(&mut self, dt: FT) {
        self.context.physical_time += dt;
        self.context.iteration += 1;
    }

    pub fn log_summary(&self) {
        for body in &self.bodies {
            info!(
                "body '{}': {} particles ({} real)",
                body.name(),
                body.number_of_particles(),
                body.total_real_particles()
            );
        }
    }
}

#[test]
fn bodies_are_looked_up_by_name() {
    use crate::{sph_kernels::DimensionUtils2d, vec2f};

    let bbox = BoundingBox::new(vec2f(0., 0.), vec2f(1., 1.)).unwrap();
    let mut system = SphSystem::<DimensionUtils2d, 2>::new(bbox, 0.1, 1.3, 2).unwrap();
    let water = system.add_body("water", 0).unwrap();
    let wall = system.add_body("wall", 1).unwrap();

    assert_eq!(system.body_id("wall").unwrap(), wall);
    assert_eq!(system.body(water).name(), "water");
    assert_eq!(system.body_names(), vec!["water".to_string(), "wall".to_string()]);
    assert!(matches!(system.add_body("water", 2), Err(SphError::DuplicateBody(_))));
    assert!(matches!(system.body_id("air"), Err(SphError::UnknownBody(_))));

    system.update_cell_lists().unwrap();
    system.advance_time(0.5);
    assert_eq!(system.context.iteration, 1);
    assert_eq!(system.context.physical_time, 0.5);
}
