use std::io::{self, Write};

use crate::{
    error::{SphError, SphResult},
    floating_type_mod::FT,
    VC, VF, VU,
};

/// Axis-aligned domain shared by all bodies of a system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox<const D: usize> {
    lower: VF<D>,
    upper: VF<D>,
}

impl<const D: usize> BoundingBox<D> {
    pub fn new(lower: VF<D>, upper: VF<D>) -> SphResult<Self> {
        let valid = (0..D).all(|d| lower[d].is_finite() && upper[d].is_finite() && lower[d] < upper[d]);
        if !valid {
            return Err(SphError::InvertedBoundingBox {
                lower: lower.iter().cloned().collect(),
                upper: upper.iter().cloned().collect(),
            });
        }
        Ok(BoundingBox { lower, upper })
    }

    pub fn lower(&self) -> VF<D> {
        self.lower
    }

    pub fn upper(&self) -> VF<D> {
        self.upper
    }

    pub fn extent(&self) -> VF<D> {
        self.upper - self.lower
    }

    pub fn contains(&self, position: &VF<D>) -> bool {
        (0..D).all(|d| self.lower[d] <= position[d] && position[d] <= self.upper[d])
    }
}

/// Flat index of `location` in a row of `dims` cells, first axis fastest.
fn flat_index<const D: usize>(dims: VU<D>, location: VU<D>) -> usize {
    let mut idx = 0;
    let mut stride = 1;
    for d in 0..D {
        debug_assert!(location[d] < dims[d]);
        idx += location[d] * stride;
        stride *= dims[d];
    }
    idx
}

/// Number of entries of a `dims` array, if it can be allocated at all.
fn checked_len<T, const D: usize>(dims: VU<D>) -> Option<usize> {
    let len = dims.iter().try_fold(1usize, |acc, &n| acc.checked_mul(n))?;
    let bytes = len.checked_mul(std::mem::size_of::<T>().max(1))?;
    (bytes <= isize::MAX as usize).then(|| len)
}

/// Dense D-dimensional array stored as one flat buffer. The first axis is the fastest varying one.
#[derive(Debug, Clone)]
pub struct MeshDataMatrix<T, const D: usize> {
    dims: VU<D>,
    data: Vec<T>,
}

impl<T: Default, const D: usize> MeshDataMatrix<T, D> {
    /// Fails instead of aborting if the memory cannot be reserved.
    pub fn new(dims: VU<D>) -> SphResult<Self> {
        let too_large = |details: String| SphError::InvalidParameter {
            name: "number_of_cells",
            details,
        };
        let len = checked_len::<T, D>(dims)
            .ok_or_else(|| too_large(format!("{:?} cells do not fit into memory", dims.as_slice())))?;

        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| too_large(format!("{} cells: {}", len, e)))?;
        data.extend((0..len).map(|_| T::default()));

        Ok(MeshDataMatrix { dims, data })
    }
}

impl<T, const D: usize> MeshDataMatrix<T, D> {
    pub fn dims(&self) -> VU<D> {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn linear_index(&self, location: VU<D>) -> usize {
        flat_index(self.dims, location)
    }

    pub fn location(&self, mut linear_index: usize) -> VU<D> {
        debug_assert!(linear_index < self.data.len());
        let mut location = VU::<D>::zeros();
        for d in 0..D {
            location[d] = linear_index % self.dims[d];
            linear_index /= self.dims[d];
        }
        location
    }

    pub fn get(&self, location: VU<D>) -> &T {
        &self.data[self.linear_index(location)]
    }

    pub fn get_mut(&mut self, location: VU<D>) -> &mut T {
        let idx = self.linear_index(location);
        &mut self.data[idx]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

/// Optional visualization hook. Meshes that do not need to be dumped keep the no-op defaults.
pub trait MeshOutput {
    fn write_mesh_to_vtu(&self, _output: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }

    fn write_mesh_to_plt(&self, _output: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }
}

/// Uniform grid over a bounding box, padded with `buffer_size` layers of cells on every side.
#[derive(Debug)]
pub struct Mesh<T, const D: usize> {
    bounding_box: BoundingBox<D>,
    cell_spacing: FT,
    buffer_size: usize,
    number_of_cells: VU<D>,
    mesh_data: Option<MeshDataMatrix<T, D>>,
}

impl<T, const D: usize> Mesh<T, D> {
    pub fn new(bounding_box: BoundingBox<D>, cell_spacing: FT, buffer_size: usize) -> SphResult<Self> {
        if !(cell_spacing > 0.) || !cell_spacing.is_finite() {
            return Err(SphError::NonPositiveCellSpacing(cell_spacing));
        }
        if buffer_size == 0 {
            return Err(SphError::ZeroBufferSize);
        }

        let extent = bounding_box.extent();
        let buffer_cells = buffer_size.checked_mul(2);
        let mut number_of_cells = VU::<D>::zeros();
        for d in 0..D {
            // float to int casts saturate, a saturated count fails the addition
            let inner_cells = (extent[d] / cell_spacing).ceil() as usize;
            number_of_cells[d] = buffer_cells
                .and_then(|b| inner_cells.checked_add(b))
                .ok_or_else(|| SphError::InvalidParameter {
                    name: "cell_spacing",
                    details: format!("{} is too small for an extent of {}", cell_spacing, extent[d]),
                })?;
        }
        if checked_len::<T, D>(number_of_cells).is_none() {
            return Err(SphError::InvalidParameter {
                name: "cell_spacing",
                details: format!(
                    "{} gives {:?} cells, more than fit into memory",
                    cell_spacing,
                    number_of_cells.as_slice()
                ),
            });
        }

        Ok(Mesh {
            bounding_box,
            cell_spacing,
            buffer_size,
            number_of_cells,
            mesh_data: None,
        })
    }

    pub fn bounding_box(&self) -> &BoundingBox<D> {
        &self.bounding_box
    }

    pub fn cell_spacing(&self) -> FT {
        self.cell_spacing
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn number_of_cells(&self) -> VU<D> {
        self.number_of_cells
    }

    pub fn total_number_of_cells(&self) -> usize {
        self.number_of_cells.iter().product()
    }

    /// Index of a cell in the flat cell array, first axis fastest.
    pub fn linear_index(&self, location: VU<D>) -> usize {
        flat_index(self.number_of_cells, location)
    }

    /// Unchecked cell coordinate of a position: `floor((position - lower) / spacing) + buffer_size`.
    /// Non-finite coordinates end up far outside of every grid.
    pub fn cell_index_from_position(&self, position: &VF<D>) -> VC<D> {
        let lower = self.bounding_box.lower();
        VC::<D>::from_fn(|d, _| {
            let c = ((position[d] - lower[d]) / self.cell_spacing).floor();
            if c.is_nan() {
                i64::MIN
            } else {
                // float to int casts saturate
                (c as i64).saturating_add(self.buffer_size as i64)
            }
        })
    }

    pub fn cell_location_from_position(&self, position: &VF<D>) -> Option<VU<D>> {
        self.checked_location(self.cell_index_from_position(position))
    }

    /// Converts a raw cell coordinate into a location if it lies inside of the grid.
    pub fn checked_location(&self, cell: VC<D>) -> Option<VU<D>> {
        let mut location = VU::<D>::zeros();
        for d in 0..D {
            if cell[d] < 0 || cell[d] as u64 >= self.number_of_cells[d] as u64 {
                return None;
            }
            location[d] = cell[d] as usize;
        }
        Some(location)
    }

    /// Like [`Mesh::cell_location_from_position`], but an out-of-grid position is reported as an error.
    pub fn checked_cell_location(&self, particle: usize, position: &VF<D>) -> SphResult<VU<D>> {
        self.cell_location_from_position(position).ok_or_else(|| SphError::ParticleOutsideMesh {
            particle,
            position: position.iter().cloned().collect(),
            cell: self.cell_index_from_position(position).iter().cloned().collect(),
            number_of_cells: self.number_of_cells.iter().cloned().collect(),
        })
    }

    /// Lower corner of a cell (the buffer layers lie below the bounding box).
    pub fn cell_lower_corner(&self, location: VU<D>) -> VF<D> {
        let lower = self.bounding_box.lower();
        VF::<D>::from_fn(|d, _| lower[d] + (location[d] as FT - self.buffer_size as FT) * self.cell_spacing)
    }

    pub fn cell_center(&self, location: VU<D>) -> VF<D> {
        self.cell_lower_corner(location) + VF::<D>::from_element(0.5 * self.cell_spacing)
    }

    pub fn is_allocated(&self) -> bool {
        self.mesh_data.is_some()
    }

    pub fn mesh_data(&self) -> Option<&MeshDataMatrix<T, D>> {
        self.mesh_data.as_ref()
    }

    pub fn mesh_data_mut(&mut self) -> Option<&mut MeshDataMatrix<T, D>> {
        self.mesh_data.as_mut()
    }

    /// Releases the cell data. Also happens on drop; calling it without an allocation is fine.
    pub fn delete_mesh_data_matrix(&mut self) {
        self.mesh_data = None;
    }
}

impl<T: Default, const D: usize> Mesh<T, D> {
    /// Allocates one default constructed entry per cell. Does nothing if the data already exists.
    pub fn allocate_mesh_data_matrix(&mut self) -> SphResult<&mut MeshDataMatrix<T, D>> {
        let mesh_data = match self.mesh_data.take() {
            Some(mesh_data) => mesh_data,
            None => MeshDataMatrix::new(self.number_of_cells)?,
        };
        Ok(self.mesh_data.insert(mesh_data))
    }
}

#[test]
fn number_of_cells_includes_buffer_layers() {
    let bbox = BoundingBox::new(crate::vec2f(0., 0.), crate::vec2f(10., 4.5)).unwrap();
    let mesh = Mesh::<u32, 2>::new(bbox, 1., 2).unwrap();
    assert_eq!(mesh.number_of_cells(), VU::<2>::new(14, 9));
    assert_eq!(mesh.total_number_of_cells(), 14 * 9);
}

#[test]
fn position_to_cell_transform() {
    let bbox = BoundingBox::new(crate::vec2f(0., 0.), crate::vec2f(10., 10.)).unwrap();
    let mesh = Mesh::<u32, 2>::new(bbox, 1., 2).unwrap();

    assert_eq!(mesh.cell_location_from_position(&crate::vec2f(5., 5.)), Some(VU::<2>::new(7, 7)));
    assert_eq!(mesh.cell_location_from_position(&crate::vec2f(0., 9.99)), Some(VU::<2>::new(2, 11)));

    // inside of the buffer layers
    assert_eq!(mesh.cell_location_from_position(&crate::vec2f(-1.5, 11.5)), Some(VU::<2>::new(0, 13)));

    // beyond the buffer layers
    assert_eq!(mesh.cell_location_from_position(&crate::vec2f(-2.5, 5.)), None);
    assert_eq!(mesh.cell_location_from_position(&crate::vec2f(5., 12.)), None);
    assert_eq!(mesh.cell_location_from_position(&crate::vec2f(FT::NAN, 5.)), None);
    assert_eq!(mesh.cell_location_from_position(&crate::vec2f(FT::INFINITY, 5.)), None);

    match mesh.checked_cell_location(3, &crate::vec2f(5., 30.)) {
        Err(SphError::ParticleOutsideMesh { particle, cell, .. }) => {
            assert_eq!(particle, 3);
            assert_eq!(cell, vec![7, 32]);
        }
        other => panic!("unexpected result {:?}", other),
    }

    let corner = mesh.cell_lower_corner(VU::<2>::new(7, 0));
    assert_eq!(corner, crate::vec2f(5., -2.));
    assert_eq!(mesh.cell_center(VU::<2>::new(7, 0)), crate::vec2f(5.5, -1.5));
}

#[test]
fn invalid_mesh_parameters_are_rejected() {
    assert!(matches!(
        BoundingBox::new(crate::vec2f(0., 1.), crate::vec2f(1., 1.)),
        Err(SphError::InvertedBoundingBox { .. })
    ));
    assert!(matches!(
        BoundingBox::new(crate::vec2f(2., 0.), crate::vec2f(1., 1.)),
        Err(SphError::InvertedBoundingBox { .. })
    ));

    let bbox = BoundingBox::new(crate::vec2f(0., 0.), crate::vec2f(1., 1.)).unwrap();
    assert!(matches!(
        Mesh::<u32, 2>::new(bbox, 0., 2),
        Err(SphError::NonPositiveCellSpacing(_))
    ));
    assert!(matches!(
        Mesh::<u32, 2>::new(bbox, -1., 2),
        Err(SphError::NonPositiveCellSpacing(_))
    ));
    assert!(matches!(Mesh::<u32, 2>::new(bbox, 0.1, 0), Err(SphError::ZeroBufferSize)));

    // cell counts that overflow or cannot be allocated
    assert!(matches!(
        Mesh::<u32, 2>::new(bbox, 1e-30, 2),
        Err(SphError::InvalidParameter { name: "cell_spacing", .. })
    ));
    assert!(matches!(
        Mesh::<u32, 2>::new(bbox, 1e-12, 2),
        Err(SphError::InvalidParameter { name: "cell_spacing", .. })
    ));
    assert!(matches!(
        MeshDataMatrix::<u64, 2>::new(VU::<2>::new(usize::MAX / 2, 3)),
        Err(SphError::InvalidParameter { .. })
    ));
}

#[test]
fn mesh_data_matrix_allocation_lifecycle() {
    let bbox = BoundingBox::new(crate::vec3f(0., 0., 0.), crate::vec3f(2., 3., 4.)).unwrap();
    let mut mesh = Mesh::<u32, 3>::new(bbox, 1., 1).unwrap();

    // deleting before allocating is a no-op
    mesh.delete_mesh_data_matrix();
    assert!(!mesh.is_allocated());

    *mesh.allocate_mesh_data_matrix().unwrap().get_mut(VU::<3>::new(1, 2, 3)) = 42;
    // second allocation keeps the existing data
    assert_eq!(*mesh.allocate_mesh_data_matrix().unwrap().get(VU::<3>::new(1, 2, 3)), 42);

    let data = mesh.mesh_data().unwrap();
    assert_eq!(data.len(), 4 * 5 * 6);
    for idx in 0..data.len() {
        assert_eq!(data.linear_index(data.location(idx)), idx);
        assert_eq!(mesh.linear_index(data.location(idx)), idx);
    }

    mesh.delete_mesh_data_matrix();
    assert!(!mesh.is_allocated());
}
