use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    error::{SphError, SphResult},
    floating_type_mod::FT,
    kernel_selection::{CoarserKernel, KernelSelectionPolicy, OriginKernel},
    mesh::BoundingBox,
    particles::lattice_positions,
    relation::{BodyRelation, ComplexRelation, ContactRelation, InnerRelation},
    sph_kernels::DimensionUtils,
    system::SphSystem,
    VF,
};

#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum KernelSelectionMethod {
    Coarser,
    Origin,
}

impl KernelSelectionMethod {
    pub fn policy(self) -> KernelSelectionPolicy {
        match self {
            KernelSelectionMethod::Coarser => CoarserKernel.into(),
            KernelSelectionMethod::Origin => OriginKernel.into(),
        }
    }
}

impl Default for KernelSelectionMethod {
    fn default() -> Self {
        KernelSelectionMethod::Coarser
    }
}

/// Axis-aligned block filled with a particle lattice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockConfig {
    pub lower: Vec<FT>,
    pub upper: Vec<FT>,
    /// zero if left out
    #[serde(default)]
    pub velocity: Vec<FT>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyConfig {
    pub name: String,
    #[serde(default)]
    pub refinement_level: usize,
    #[serde(default = "default_density")]
    pub density: FT,
    #[serde(default)]
    pub blocks: Vec<BlockConfig>,
    #[serde(default)]
    pub buffer_blocks: Vec<BlockConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationConfig {
    pub body: String,
    #[serde(default)]
    pub contact_bodies: Vec<String>,
    #[serde(default = "default_true")]
    pub inner: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationParams {
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    pub domain_lower: Vec<FT>,
    pub domain_upper: Vec<FT>,
    pub reference_particle_spacing: FT,
    #[serde(default = "default_smoothing_length_ratio")]
    pub smoothing_length_ratio: FT,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    pub time_step: FT,
    pub end_time: FT,
    // rebuild cell lists and configurations every n steps
    #[serde(default = "default_one")]
    pub rebuild_interval: usize,
    // write snapshots every n steps, 0 disables output
    #[serde(default)]
    pub output_interval: usize,
    #[serde(default)]
    pub restart_interval: usize,
    #[serde(default = "default_output_folder")]
    pub output_folder: PathBuf,

    #[serde(default)]
    pub check_neighborhood: bool,
    #[serde(default)]
    pub kernel_selection: KernelSelectionMethod,

    pub bodies: Vec<BodyConfig>,
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
}

fn default_dimensions() -> usize {
    2
}

fn default_smoothing_length_ratio() -> FT {
    1.3
}

fn default_buffer_size() -> usize {
    2
}

fn default_density() -> FT {
    1.
}

fn default_one() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_output_folder() -> PathBuf {
    PathBuf::from("./output")
}

fn to_vector<const D: usize>(name: &'static str, values: &[FT]) -> SphResult<VF<D>> {
    if values.len() != D {
        return Err(SphError::InvalidParameter {
            name,
            details: format!("expected {} components, got {:?}", D, values),
        });
    }
    Ok(VF::<D>::from_column_slice(values))
}

fn block_positions<const D: usize>(block: &BlockConfig, particle_spacing: FT) -> SphResult<(Vec<VF<D>>, VF<D>)> {
    let lower = to_vector::<D>("blocks.lower", &block.lower)?;
    let upper = to_vector::<D>("blocks.upper", &block.upper)?;
    let velocity = if block.velocity.is_empty() {
        VF::<D>::zeros()
    } else {
        to_vector::<D>("blocks.velocity", &block.velocity)?
    };
    Ok((lattice_positions(lower, upper, particle_spacing), velocity))
}

impl SimulationParams {
    /// Reads a YAML file. Top-level keys of `overwrite` replace or add to the ones of the base file.
    pub fn load(path: &Path, overwrite: Option<&Path>) -> SphResult<Self> {
        let read = |path: &Path| -> SphResult<serde_yaml::Value> {
            if !path.exists() {
                return Err(SphError::MissingInput(path.to_path_buf()));
            }
            let yaml = std::fs::read_to_string(path).map_err(|e| SphError::io(path, e))?;
            serde_yaml::from_str(&yaml).map_err(|e| SphError::yaml(path, e))
        };

        let mut simulation_params_serde = read(path)?;

        if let Some(overwrite_path) = overwrite {
            let overwrite_config = read(overwrite_path)?;
            let overwrite_mapping = overwrite_config.as_mapping().cloned().unwrap_or_default();
            let mapping = simulation_params_serde
                .as_mapping_mut()
                .ok_or_else(|| SphError::InvalidParameter {
                    name: "simulation config",
                    details: "top level has to be a mapping".to_string(),
                })?;
            for (k, v) in overwrite_mapping.into_iter() {
                mapping.insert(k, v);
            }
        }

        let params: SimulationParams =
            serde_yaml::from_value(simulation_params_serde).map_err(|e| SphError::yaml(path, e))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> SphResult<()> {
        let invalid = |name: &'static str, details: String| Err(SphError::InvalidParameter { name, details });

        if self.dimensions != 2 && self.dimensions != 3 {
            return invalid("dimensions", format!("has to be 2 or 3, got {}", self.dimensions));
        }
        if self.domain_lower.len() != self.dimensions || self.domain_upper.len() != self.dimensions {
            return invalid(
                "domain",
                format!(
                    "bounds need {} components, got {:?} and {:?}",
                    self.dimensions, self.domain_lower, self.domain_upper
                ),
            );
        }
        if !(self.time_step > 0.) {
            return invalid("time_step", format!("has to be positive, got {}", self.time_step));
        }
        if !(self.end_time >= 0.) {
            return invalid("end_time", format!("must not be negative, got {}", self.end_time));
        }
        if self.rebuild_interval == 0 {
            return invalid("rebuild_interval", "has to be at least 1".to_string());
        }
        if self.bodies.is_empty() {
            return invalid("bodies", "at least one body is needed".to_string());
        }
        for block in self.bodies.iter().flat_map(|b| b.blocks.iter().chain(b.buffer_blocks.iter())) {
            let velocity_ok = block.velocity.is_empty() || block.velocity.len() == self.dimensions;
            if block.lower.len() != self.dimensions || block.upper.len() != self.dimensions || !velocity_ok {
                return invalid("blocks", format!("block {:?} does not have {} components", block, self.dimensions));
            }
        }
        Ok(())
    }

    /// Number of steps until `end_time`.
    pub fn number_of_steps(&self) -> usize {
        // tolerate rounding in the quotient
        (self.end_time / self.time_step - 1e-3).ceil().max(0.) as usize
    }

    /// Creates the bodies with their particles and the declared relations.
    pub fn build_system<DU: DimensionUtils<D>, const D: usize>(
        &self,
    ) -> SphResult<(SphSystem<DU, D>, Vec<BodyRelation<D>>)> {
        let bounding_box = BoundingBox::new(
            to_vector::<D>("domain_lower", &self.domain_lower)?,
            to_vector::<D>("domain_upper", &self.domain_upper)?,
        )?;
        let mut system = SphSystem::new(
            bounding_box,
            self.reference_particle_spacing,
            self.smoothing_length_ratio,
            self.buffer_size,
        )?;

        for body_config in &self.bodies {
            let id = system.add_body(&body_config.name, body_config.refinement_level)?;
            let body = system.body_mut(id);
            let particle_spacing = body.particle_spacing();

            for block in &body_config.blocks {
                let (positions, velocity) = block_positions::<D>(block, particle_spacing)?;
                body.add_real_particles(&positions, velocity, body_config.density)?;
            }
            for block in &body_config.buffer_blocks {
                let (positions, _) = block_positions::<D>(block, particle_spacing)?;
                body.add_buffer_particles(&positions);
            }
        }

        let policy = self.kernel_selection.policy();
        let mut relations = Vec::with_capacity(self.relations.len());
        for relation in &self.relations {
            let body = system.body_id(&relation.body)?;
            let relation = match (relation.inner, relation.contact_bodies.is_empty()) {
                (true, true) => BodyRelation::Inner(InnerRelation::new(body)),
                (true, false) => {
                    BodyRelation::Complex(ComplexRelation::new(&system, body, &relation.contact_bodies, policy)?)
                }
                (false, _) => {
                    BodyRelation::Contact(ContactRelation::new(&system, body, &relation.contact_bodies, policy)?)
                }
            };
            relations.push(relation);
        }

        info!(
            "built system with {} bodies and {} relations",
            system.bodies().len(),
            relations.len()
        );

        Ok((system, relations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sph_kernels::{DimensionUtils2d, DimensionUtils3d};

    const SCENE: &str = r#"
domain_lower: [0.0, 0.0]
domain_upper: [2.0, 1.0]
reference_particle_spacing: 0.1
time_step: 0.01
end_time: 0.1
output_interval: 5
bodies:
  - name: fluid
    blocks:
      - lower: [0.0, 0.0]
        upper: [1.0, 0.5]
        velocity: [0.5, 0.0]
  - name: wall
    refinement_level: 1
    blocks:
      - lower: [1.5, 0.0]
        upper: [2.0, 1.0]
    buffer_blocks:
      - lower: [1.9, 0.9]
        upper: [2.0, 1.0]
relations:
  - body: fluid
    contact_bodies: [wall]
  - body: wall
    contact_bodies: [fluid]
    inner: false
"#;

    fn params() -> SimulationParams {
        let params: SimulationParams = serde_yaml::from_str(SCENE).unwrap();
        params.validate().unwrap();
        params
    }

    #[test]
    fn scene_builds_bodies_and_relations() {
        let params = params();
        assert_eq!(params.smoothing_length_ratio, 1.3);
        assert_eq!(params.number_of_steps(), 10);

        let (mut system, mut relations) = params.build_system::<DimensionUtils2d, 2>().unwrap();
        let fluid = system.body(system.body_id("fluid").unwrap());
        assert_eq!(fluid.number_of_particles(), 10 * 5);
        assert_eq!(fluid.particles().velocity[0], crate::vec2f(0.5, 0.));

        let wall = system.body(system.body_id("wall").unwrap());
        assert_eq!(wall.total_real_particles(), 10 * 20);
        assert_eq!(wall.number_of_particles(), 10 * 20 + 4);

        assert!(matches!(relations[0], BodyRelation::Complex(_)));
        assert!(matches!(relations[1], BodyRelation::Contact(_)));

        system.update_cell_lists().unwrap();
        for relation in &mut relations {
            relation.update_configuration(&mut system).unwrap();
        }
        assert_eq!(relations[0].inner().unwrap().configuration.len(), 50);
        assert!(relations[1].inner().is_none());
    }

    #[test]
    fn mismatching_vectors_are_rejected() {
        let mut params = params();
        params.bodies[0].blocks[0].velocity = vec![1., 2., 3.];
        assert!(matches!(params.validate(), Err(SphError::InvalidParameter { .. })));

        let mut params = self::params();
        params.dimensions = 3;
        assert!(params.validate().is_err());

        // a 2D scene cannot be built as 3D system
        assert!(self::params().build_system::<DimensionUtils3d, 3>().is_err());
    }

    #[test]
    fn unknown_bodies_in_relations_are_rejected() {
        let mut params = params();
        params.relations[0].contact_bodies.push("air".to_string());
        assert!(matches!(
            params.build_system::<DimensionUtils2d, 2>(),
            Err(SphError::UnknownBody(_))
        ));
    }

    #[test]
    fn overwrite_file_replaces_top_level_keys() {
        let folder = std::env::temp_dir().join(format!("sph-cell-lists-params-{}", std::process::id()));
        std::fs::create_dir_all(&folder).unwrap();
        let base = folder.join("scene.yaml");
        let overwrite = folder.join("overwrite.yaml");
        std::fs::write(&base, SCENE).unwrap();
        std::fs::write(&overwrite, "end_time: 0.5\nkernel_selection: Origin\n").unwrap();

        let params = SimulationParams::load(&base, Some(&overwrite)).unwrap();
        assert_eq!(params.end_time, 0.5);
        assert_eq!(params.kernel_selection, KernelSelectionMethod::Origin);

        std::fs::write(&overwrite, "no_such_key: 1\n").unwrap();
        assert!(SimulationParams::load(&base, Some(&overwrite)).is_err());
        assert!(matches!(
            SimulationParams::load(&folder.join("missing.yaml"), None),
            Err(SphError::MissingInput(_))
        ));

        let _ = std::fs::remove_dir_all(&folder);
    }
}
