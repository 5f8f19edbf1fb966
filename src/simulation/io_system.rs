//! Writers and readers of body states. File formats are kept simple (YAML); the neighbor search
//! only depends on the [`BodyStatesRecording`] interface.

use std::{
    fs::{create_dir_all, File},
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use log::{debug, info};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    body::SphBody,
    error::{SphError, SphResult},
    floating_type_mod::FT,
    mesh::MeshOutput,
    particles::BaseParticles,
    sph_kernels::DimensionUtils,
    system::SimulationContext,
    VF,
};

/// Anything that writes the state of a set of bodies at one point of a run.
pub trait BodyStatesRecording<DU: DimensionUtils<D>, const D: usize> {
    fn write_to_file(&mut self, bodies: &[SphBody<DU, D>], context: &SimulationContext) -> SphResult<()>;
}

fn ensure_folder(folder: &Path) -> SphResult<()> {
    create_dir_all(folder).map_err(|e| SphError::io(folder, e))
}

fn write_yaml<T: Serialize>(path: &Path, value: &T) -> SphResult<()> {
    let file = File::create(path).map_err(|e| SphError::io(path, e))?;
    serde_yaml::to_writer(BufWriter::new(file), value).map_err(|e| SphError::yaml(path, e))
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> SphResult<T> {
    if !path.exists() {
        return Err(SphError::MissingInput(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|e| SphError::io(path, e))?;
    serde_yaml::from_reader(BufReader::new(file)).map_err(|e| SphError::yaml(path, e))
}

fn check_body_count(what: &'static str, expected: usize, found: usize) -> SphResult<()> {
    if expected != found {
        return Err(SphError::CountMismatch { what, expected, found });
    }
    Ok(())
}

/// Particle states of one body as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ParticleStates {
    body: String,
    total_real_particles: usize,
    position: Vec<Vec<FT>>,
    #[serde(default)]
    velocity: Vec<Vec<FT>>,
    mass: Vec<FT>,
    volume: Vec<FT>,
}

impl ParticleStates {
    fn from_body<DU: DimensionUtils<D>, const D: usize>(body: &SphBody<DU, D>, with_velocity: bool) -> Self {
        let particles = body.particles();
        let to_vec = |v: &VF<D>| v.iter().cloned().collect::<Vec<FT>>();
        ParticleStates {
            body: body.name().to_string(),
            total_real_particles: body.total_real_particles(),
            position: particles.position.iter().map(to_vec).collect(),
            velocity: if with_velocity {
                particles.velocity.iter().map(to_vec).collect()
            } else {
                Vec::new()
            },
            mass: particles.mass.clone(),
            volume: particles.volume.clone(),
        }
    }

    fn to_vectors<const D: usize>(name: &'static str, values: &[Vec<FT>]) -> SphResult<Vec<VF<D>>> {
        values
            .iter()
            .map(|v| {
                if v.len() != D {
                    return Err(SphError::InvalidParameter {
                        name,
                        details: format!("expected {} components, got {:?}", D, v),
                    });
                }
                Ok(VF::<D>::from_column_slice(v))
            })
            .collect()
    }

    /// Converts the stored states into particle arrays plus the number of real particles, checking
    /// every array length on the way.
    fn to_particles<const D: usize>(&self) -> SphResult<(BaseParticles<D>, usize)> {
        let n = self.position.len();
        check_body_count("masses per position", n, self.mass.len())?;
        check_body_count("volumes per position", n, self.volume.len())?;
        if self.total_real_particles > n {
            return Err(SphError::CountMismatch {
                what: "real particles in restored body",
                expected: n,
                found: self.total_real_particles,
            });
        }

        let mut particles = BaseParticles::<D>::default(n);
        particles.position = Self::to_vectors("position", &self.position)?;
        if !self.velocity.is_empty() {
            check_body_count("velocities per position", n, self.velocity.len())?;
            particles.velocity = Self::to_vectors("velocity", &self.velocity)?;
        }
        particles.mass = self.mass.clone();
        particles.volume = self.volume.clone();

        Ok((particles, self.total_real_particles))
    }
}

/// Replaces the particles of all bodies at once. Only called after every file was read and checked,
/// so a failed read leaves all bodies untouched.
fn restore_bodies<DU: DimensionUtils<D>, const D: usize>(
    bodies: &mut [SphBody<DU, D>],
    restored: Vec<(BaseParticles<D>, usize)>,
) -> SphResult<()> {
    for (body, (particles, total_real_particles)) in bodies.iter_mut().zip(restored) {
        body.restore_particles(particles, total_real_particles)?;
    }
    Ok(())
}

/// Folder layout of reload files: one file per body name.
pub struct ReloadParticleIo {
    folder: PathBuf,
}

impl ReloadParticleIo {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        ReloadParticleIo { folder: folder.into() }
    }

    fn file_path(&self, body_name: &str) -> PathBuf {
        self.folder.join(format!("SPHBody_{}_rld.yaml", body_name))
    }

    /// Replaces the particles of `bodies` with the ones stored under `reload_body_names`. The two
    /// lists pair up by position, so their lengths have to agree.
    pub fn read_from_file<DU: DimensionUtils<D>, const D: usize>(
        &self,
        bodies: &mut [SphBody<DU, D>],
        reload_body_names: &[String],
    ) -> SphResult<()> {
        check_body_count("reload body names", bodies.len(), reload_body_names.len())?;
        let restored = reload_body_names
            .iter()
            .map(|name| read_yaml::<ParticleStates>(&self.file_path(name))?.to_particles::<D>())
            .collect::<SphResult<Vec<_>>>()?;
        restore_bodies(bodies, restored)?;

        for (body, name) in bodies.iter().zip(reload_body_names) {
            info!("reloaded {} particles of '{}' from '{}'", body.number_of_particles(), body.name(), name);
        }
        Ok(())
    }
}

impl<DU: DimensionUtils<D>, const D: usize> BodyStatesRecording<DU, D> for ReloadParticleIo {
    fn write_to_file(&mut self, bodies: &[SphBody<DU, D>], _context: &SimulationContext) -> SphResult<()> {
        ensure_folder(&self.folder)?;
        for body in bodies {
            write_yaml(&self.file_path(body.name()), &ParticleStates::from_body(body, false))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct RestartTime {
    physical_time: FT,
}

/// Restart files, keyed by the iteration they were written at.
pub struct RestartIo {
    folder: PathBuf,
}

impl RestartIo {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        RestartIo { folder: folder.into() }
    }

    fn time_file_path(&self, restart_step: usize) -> PathBuf {
        self.folder.join(format!("Restart_time_{}.yaml", restart_step))
    }

    fn body_file_path(&self, body_name: &str, restart_step: usize) -> PathBuf {
        self.folder.join(format!("SPHBody_{}_rst_{}.yaml", body_name, restart_step))
    }

    pub fn read_restart_time(&self, restart_step: usize) -> SphResult<FT> {
        let time: RestartTime = read_yaml(&self.time_file_path(restart_step))?;
        Ok(time.physical_time)
    }

    /// Restores the particles of all bodies and returns the context to continue with.
    pub fn read_from_file<DU: DimensionUtils<D>, const D: usize>(
        &self,
        bodies: &mut [SphBody<DU, D>],
        restart_step: usize,
    ) -> SphResult<SimulationContext> {
        let physical_time = self.read_restart_time(restart_step)?;
        let restored = bodies
            .iter()
            .map(|body| {
                let states: ParticleStates = read_yaml(&self.body_file_path(body.name(), restart_step))?;
                if states.body != body.name() {
                    return Err(SphError::UnknownBody(states.body));
                }
                states.to_particles::<D>()
            })
            .collect::<SphResult<Vec<_>>>()?;
        restore_bodies(bodies, restored)?;
        info!("restarted at step {} (time {})", restart_step, physical_time);
        Ok(SimulationContext {
            physical_time,
            restart_step,
            iteration: restart_step,
        })
    }
}

impl<DU: DimensionUtils<D>, const D: usize> BodyStatesRecording<DU, D> for RestartIo {
    fn write_to_file(&mut self, bodies: &[SphBody<DU, D>], context: &SimulationContext) -> SphResult<()> {
        ensure_folder(&self.folder)?;
        let step = context.iteration;
        write_yaml(
            &self.time_file_path(step),
            &RestartTime {
                physical_time: context.physical_time,
            },
        )?;
        for body in bodies {
            write_yaml(&self.body_file_path(body.name(), step), &ParticleStates::from_body(body, true))?;
        }
        Ok(())
    }
}

/// Dumps the cell linked list of every body through its [`MeshOutput`] hook. Bodies whose mesh
/// writes nothing do not get a file.
pub struct MeshRecordingToPlt {
    folder: PathBuf,
}

impl MeshRecordingToPlt {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        MeshRecordingToPlt { folder: folder.into() }
    }
}

impl<DU: DimensionUtils<D>, const D: usize> BodyStatesRecording<DU, D> for MeshRecordingToPlt {
    fn write_to_file(&mut self, bodies: &[SphBody<DU, D>], context: &SimulationContext) -> SphResult<()> {
        for body in bodies {
            let mut buffer = Vec::new();
            let path = self
                .folder
                .join(format!("{}_cell_linked_list_{}.dat", body.name(), context.iteration));
            body.cell_linked_list()
                .write_mesh_to_plt(&mut buffer)
                .map_err(|e| SphError::io(&path, e))?;
            if buffer.is_empty() {
                debug!("mesh of '{}' has nothing to dump", body.name());
                continue;
            }
            ensure_folder(&self.folder)?;
            std::fs::write(&path, buffer).map_err(|e| SphError::io(&path, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sph_kernels::DimensionUtils2d, vec2f, BodyId, BoundingBox, SphSystem};

    fn scratch_folder(name: &str) -> PathBuf {
        let folder = std::env::temp_dir().join(format!("sph-cell-lists-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&folder);
        folder
    }

    fn system() -> SphSystem<DimensionUtils2d, 2> {
        let bbox = BoundingBox::new(vec2f(0., 0.), vec2f(2., 2.)).unwrap();
        let mut system = SphSystem::new(bbox, 0.25, 1.3, 2).unwrap();
        let fluid = system.add_body("fluid", 0).unwrap();
        let wall = system.add_body("wall", 1).unwrap();
        system
            .body_mut(fluid)
            .add_real_particles(&[vec2f(0.5, 0.5), vec2f(0.75, 0.5)], vec2f(1., 0.), 1000.)
            .unwrap();
        system.body_mut(fluid).add_buffer_particles(&[vec2f(1.5, 1.5)]);
        system
            .body_mut(wall)
            .add_real_particles(&[vec2f(1., 0.1)], vec2f(0., 0.), 1000.)
            .unwrap();
        system
    }

    #[test]
    fn restart_roundtrip() {
        let folder = scratch_folder("restart");
        let mut original = system();
        original.advance_time(0.125);
        original.advance_time(0.125);
        let context = original.context;

        let mut restart = RestartIo::new(&folder);
        restart.write_to_file(original.bodies(), &context).unwrap();

        let mut restored = system();
        restored.bodies_mut()[0].particles_mut().truncate(0);
        let restored_context = restart.read_from_file(restored.bodies_mut(), 2).unwrap();
        assert_eq!(restored_context.physical_time, 0.25);
        assert_eq!(restored_context.restart_step, 2);

        let body = &restored.bodies()[0];
        assert_eq!(body.number_of_particles(), 3);
        assert_eq!(body.total_real_particles(), 2);
        assert_eq!(body.particles().position, original.bodies()[0].particles().position);
        assert_eq!(body.particles().velocity, original.bodies()[0].particles().velocity);

        assert!(matches!(
            restart.read_restart_time(7),
            Err(SphError::MissingInput(_))
        ));
        let _ = std::fs::remove_dir_all(&folder);
    }

    #[test]
    fn reload_checks_names_against_bodies() {
        let folder = scratch_folder("reload");
        let original = system();
        let mut reload = ReloadParticleIo::new(&folder);
        reload.write_to_file(original.bodies(), &original.context).unwrap();

        let mut reloaded = system();
        let names = vec!["wall".to_string(), "fluid".to_string()];
        assert!(matches!(
            reload.read_from_file(reloaded.bodies_mut(), &names[..1]),
            Err(SphError::CountMismatch { expected: 2, found: 1, .. })
        ));

        // bodies pair up with the names by position
        reload.read_from_file(reloaded.bodies_mut(), &names).unwrap();
        assert_eq!(reloaded.bodies()[0].particles().position, vec![vec2f(1., 0.1)]);
        assert_eq!(reloaded.bodies()[1].number_of_particles(), 3);

        let missing = vec!["air".to_string(), "fluid".to_string()];
        assert!(matches!(
            reload.read_from_file(reloaded.bodies_mut(), &missing),
            Err(SphError::MissingInput(_))
        ));
        let _ = std::fs::remove_dir_all(&folder);
    }

    #[test]
    fn failed_restart_leaves_all_bodies_untouched() {
        let folder = scratch_folder("restart-partial");
        let mut written = system();
        written.body_mut(BodyId(0)).add_buffer_particles(&[vec2f(1.25, 1.5), vec2f(1.5, 1.25)]);
        let mut restart = RestartIo::new(&folder);
        restart.write_to_file(written.bodies(), &written.context).unwrap();
        std::fs::remove_file(folder.join("SPHBody_wall_rst_0.yaml")).unwrap();

        let mut target = system();
        assert!(matches!(
            restart.read_from_file(target.bodies_mut(), 0),
            Err(SphError::MissingInput(_))
        ));
        assert_eq!(target.bodies()[0].number_of_particles(), 3);
        assert_eq!(target.bodies()[1].number_of_particles(), 1);

        // a malformed file of a later body
        restart.write_to_file(written.bodies(), &written.context).unwrap();
        std::fs::write(folder.join("SPHBody_wall_rst_0.yaml"), "body: wall\n").unwrap();
        assert!(matches!(
            restart.read_from_file(target.bodies_mut(), 0),
            Err(SphError::Yaml { .. })
        ));
        assert_eq!(target.bodies()[0].number_of_particles(), 3);

        let _ = std::fs::remove_dir_all(&folder);
    }

    #[test]
    fn failed_reload_leaves_all_bodies_untouched() {
        let folder = scratch_folder("reload-partial");
        let original = system();
        let mut reload = ReloadParticleIo::new(&folder);
        reload.write_to_file(original.bodies(), &original.context).unwrap();

        let mut target = system();
        target.body_mut(BodyId(0)).particles_mut().truncate(1);
        let names = vec!["fluid".to_string(), "air".to_string()];
        assert!(matches!(
            reload.read_from_file(target.bodies_mut(), &names),
            Err(SphError::MissingInput(_))
        ));
        assert_eq!(target.bodies()[0].number_of_particles(), 1);

        let _ = std::fs::remove_dir_all(&folder);
    }

    #[test]
    fn mesh_recording_writes_no_files_for_silent_meshes() {
        let folder = scratch_folder("mesh");
        let system = system();
        let mut recording = MeshRecordingToPlt::new(&folder);
        recording.write_to_file(system.bodies(), &system.context).unwrap();
        assert!(!folder.exists());
    }
}
