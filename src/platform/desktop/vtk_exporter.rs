use std::{
    fs::{create_dir_all, File},
    io::Write,
    path::PathBuf,
};

use log::warn;
use vtkio::model::*;

use crate::{
    floating_type_mod::FT, io_system::BodyStatesRecording, sph_kernels::DimensionUtils, SimulationContext, SphBody,
    SphError, SphResult, VF,
};

fn to_vec3d<const D: usize>(v: &VF<D>) -> [FT; 3] {
    if D == 2 {
        [v[0], v[1], 0.]
    } else {
        [v[0], v[1], v[2]]
    }
}

pub(crate) struct VtkExporter {
    /// something like './data/fluid' which will get expanded to './data/fluid-00001.vtk' and './data/fluid.vtk.series'
    folder: PathBuf,
    basename: String,
    snapshot_number: usize,
    series_file: File,
}

impl VtkExporter {
    pub(crate) fn new(folder: impl Into<PathBuf>, basename: impl Into<String>) -> SphResult<VtkExporter> {
        let folder: PathBuf = folder.into();
        let basename: String = basename.into();

        create_dir_all(&folder).map_err(|e| SphError::io(&folder, e))?;

        let series_path = folder.join(format!("{}.vtk.series", basename));
        let mut series_file = File::create(&series_path).map_err(|e| SphError::io(&series_path, e))?;
        let series_prelude_str = "{\n\"file-series-version\": \"1.0\",\n\"files\": [";
        series_file
            .write_all(series_prelude_str.as_bytes())
            .map_err(|e| SphError::io(&series_path, e))?;

        Ok(VtkExporter {
            series_file,
            folder,
            basename,
            snapshot_number: 1,
        })
    }

    pub(crate) fn add_snapshot<DU: DimensionUtils<D>, const D: usize>(
        &mut self,
        time: FT,
        body: &SphBody<DU, D>,
    ) -> SphResult<()> {
        let series_path = self.folder.join(format!("{}.vtk.series", self.basename));
        if self.snapshot_number > 1 {
            self.series_file
                .write_all(",".as_bytes())
                .map_err(|e| SphError::io(&series_path, e))?;
        }

        let vtk_filename = format!("{}-{:05}.vtk", self.basename, self.snapshot_number);
        Self::write_body_file(self.folder.join(&vtk_filename), body)?;

        write!(
            self.series_file,
            "\n{{ \"name\": \"{}\", \"time\": {} }}",
            vtk_filename, time
        )
        .map_err(|e| SphError::io(&series_path, e))?;

        self.snapshot_number += 1;
        Ok(())
    }

    fn write_body_file<DU: DimensionUtils<D>, const D: usize>(path: PathBuf, body: &SphBody<DU, D>) -> SphResult<()> {
        let particles = body.particles();

        let data_ft: Vec<(String, Vec<FT>)> = vec![
            ("mass".into(), particles.mass.clone()),
            ("volume".into(), particles.volume.clone()),
        ];

        let data_vec: Vec<(String, Vec<VF<D>>)> = vec![
            ("velocity".into(), particles.velocity.clone()),
            ("acceleration".into(), particles.acceleration.clone()),
        ];

        let data_u8: Vec<(String, Vec<u8>)> = vec![(
            "is_buffer_particle".into(),
            (0..particles.len())
                .map(|i| (i >= body.total_real_particles()) as u8)
                .collect(),
        )];

        write_vtk_file(path, &particles.position, data_ft, data_vec, data_u8)
    }
}

impl Drop for VtkExporter {
    fn drop(&mut self) {
        let series_end_str = "\n]\n}";
        if let Err(e) = self.series_file.write_all(series_end_str.as_bytes()) {
            warn!("failed to finish series file of '{}': {}", self.basename, e);
        }
    }
}

pub fn write_vtk_file<P: Into<PathBuf>, const D: usize>(
    path: P,
    positions: &[VF<D>],
    data_ft: Vec<(String, Vec<FT>)>,
    data_vec: Vec<(String, Vec<VF<D>>)>,
    data_u8: Vec<(String, Vec<u8>)>,
) -> SphResult<()> {
    let mut data_arrays: Vec<DataArray> = Vec::new();

    for (name, arr) in data_ft {
        let mut data_array = DataArray::scalars(name, 1);
        data_array.data = arr.into();
        data_arrays.push(data_array);
    }

    for (name, arr) in data_vec {
        let mut data_array = DataArray::scalars(name, 3);
        data_array.data = arr.iter().flat_map(to_vec3d).collect::<Vec<_>>().into();
        data_arrays.push(data_array);
    }

    for (name, arr) in data_u8 {
        let mut data_array = DataArray::scalars(name, 1);
        data_array.data = arr.into();
        data_arrays.push(data_array);
    }

    let path = path.into();

    let num_particles = positions.len();
    let vtk_verts: Vec<u32> = (0..num_particles).flat_map(|i| [1, i as u32]).collect();
    let vtk_points: Vec<FT> = positions.iter().flat_map(to_vec3d).collect();

    let vtk = Vtk {
        version: Version::new((4, 2)),
        byte_order: ByteOrder::BigEndian,
        title: String::from("SPH Particles 1.0"),
        file_path: Some(path.clone()),
        data: DataSet::PolyData {
            meta: None,
            pieces: vec![Piece::Inline(Box::new(PolyDataPiece {
                points: vtk_points.into(),
                verts: VertexNumbers::Legacy {
                    num_cells: num_particles as u32,
                    vertices: vtk_verts,
                }
                .into(),
                data: Attributes {
                    cell: Vec::new(),
                    point: data_arrays.into_iter().map(Attribute::DataArray).collect(),
                },
                ..Default::default()
            }))],
        },
    };
    vtk.export(&path).map_err(|e| SphError::Export {
        path,
        details: format!("{:?}", e),
    })
}

/// One `.vtk.series` per body, snapshots named after the body.
pub(crate) struct BodyStatesRecordingToVtk {
    folder: PathBuf,
    exporters: Vec<VtkExporter>,
}

impl BodyStatesRecordingToVtk {
    pub(crate) fn new(folder: impl Into<PathBuf>) -> Self {
        BodyStatesRecordingToVtk {
            folder: folder.into(),
            exporters: Vec::new(),
        }
    }
}

impl<DU: DimensionUtils<D>, const D: usize> BodyStatesRecording<DU, D> for BodyStatesRecordingToVtk {
    fn write_to_file(&mut self, bodies: &[SphBody<DU, D>], context: &SimulationContext) -> SphResult<()> {
        if self.exporters.is_empty() {
            for body in bodies {
                self.exporters.push(VtkExporter::new(&self.folder, body.name())?);
            }
        }
        if self.exporters.len() != bodies.len() {
            return Err(SphError::CountMismatch {
                what: "bodies per vtk recording",
                expected: self.exporters.len(),
                found: bodies.len(),
            });
        }

        for (exporter, body) in self.exporters.iter_mut().zip(bodies) {
            exporter.add_snapshot(context.physical_time, body)?;
        }
        Ok(())
    }
}
