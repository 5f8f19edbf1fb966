use std::{cmp::Ordering, collections::BTreeMap, marker::PhantomData};

use log::debug;
#[cfg(not(target_arch = "wasm32"))]
use rayon::iter::ParallelIterator;

use crate::{
    cell_list::{CellList, ListData},
    concurrency::{into_par_iter, par_iter_mut1, par_try_map},
    error::{SphError, SphResult},
    floating_type_mod::FT,
    kernel_selection::{KernelSelection, KernelSelectionPolicy},
    mesh::{BoundingBox, Mesh, MeshOutput},
    particle_configuration::{ContactParticleConfiguration, InnerParticleConfiguration, NeighborRelation},
    sph_kernels::{DimensionUtils, Kernel},
    thread_safe_ptr::ThreadSafeMutPtr,
    VC, VF, VU,
};

/// Number of cell layers of the target grid that have to be scanned when a body at `origin_level`
/// searches a body at `target_level`. A coarser origin than target needs one layer, every level the
/// target is finer than the origin doubles the count.
pub fn computing_search_range(origin_level: usize, target_level: usize) -> usize {
    if origin_level >= target_level {
        1
    } else {
        u32::try_from(target_level - origin_level)
            .ok()
            .and_then(|shift| 1usize.checked_shl(shift))
            .unwrap_or(usize::MAX)
    }
}

pub fn choosing_kernel<'a, DU: DimensionUtils<D>, const D: usize>(
    policy: &KernelSelectionPolicy,
    origin_kernel: &'a Kernel<DU, D>,
    target_kernel: &'a Kernel<DU, D>,
) -> &'a Kernel<DU, D> {
    policy.choose(origin_kernel, target_kernel)
}

/// Total order of two positions: first by the cell they fall into (lexicographically by axis),
/// then by the positions themselves.
fn compare_cells<const D: usize>(a: &VC<D>, b: &VC<D>) -> Ordering {
    a.iter().cmp(b.iter())
}

fn compare_positions<const D: usize>(a: &VF<D>, b: &VF<D>) -> Ordering {
    for d in 0..D {
        match a[d].partial_cmp(&b[d]) {
            Some(Ordering::Equal) | None => continue,
            Some(ordering) => return ordering,
        }
    }
    Ordering::Equal
}

/// Pair order shared by [`MeshCellLinkedList::is_in_sequence`] and the inner builder: the cell order
/// decides, `tie_break` only runs for two entries of the same cell.
fn in_sequence(cell_order: Ordering, tie_break: impl FnOnce() -> Ordering) -> bool {
    cell_order.then_with(tie_break).is_lt()
}

fn cell_color<const D: usize>(location: VU<D>, modulus: usize) -> usize {
    let mut color = 0;
    let mut factor = 1;
    for d in 0..D {
        color += (location[d] % modulus) * factor;
        factor *= modulus;
    }
    color
}

/// Calls `f` for every location in the box `[lower, upper]` (both inclusive).
fn for_each_location_in_box<const D: usize>(lower: VU<D>, upper: VU<D>, mut f: impl FnMut(VU<D>)) {
    if D == 0 {
        return;
    }
    let mut location = lower;
    loop {
        f(location);
        let mut d = 0;
        loop {
            if location[d] < upper[d] {
                location[d] += 1;
                break;
            }
            location[d] = lower[d];
            d += 1;
            if d == D {
                return;
            }
        }
    }
}

/// Uniform grid of cell lists for one body.
///
/// Every rebuild clears all cells and sorts the particles in again. Neighbor configurations are
/// derived from the cells afterwards: inside of the body with a split-cell traversal, towards other
/// bodies with a per-particle stencil scan.
#[derive(Debug)]
pub struct MeshCellLinkedList<DU: DimensionUtils<D>, const D: usize> {
    mesh: Mesh<CellList<D>, D>,
    cutoff_radius: FT,
    /// stencil half width in cells
    search_depth: usize,
    /// all cells (linear indices) grouped by color, non-empty colors only
    color_partition: Vec<Vec<usize>>,
    /// occupied cells grouped by color, refreshed on every rebuild
    split_cell_lists: Vec<Vec<usize>>,
    number_of_particles: usize,
    _marker: PhantomData<DU>,
}

impl<DU: DimensionUtils<D>, const D: usize> MeshCellLinkedList<DU, D> {
    /// Grid with cells of size `cell_spacing` that searches up to one cell spacing.
    pub fn new(bounding_box: BoundingBox<D>, cell_spacing: FT, buffer_size: usize) -> SphResult<Self> {
        let mut mesh = Mesh::<CellList<D>, D>::new(bounding_box, cell_spacing, buffer_size)?;

        let data = mesh.allocate_mesh_data_matrix()?;
        for idx in 0..data.len() {
            let location = data.location(idx);
            data.as_mut_slice()[idx].set_cell_information(location);
        }

        let mut cell_linked_list = MeshCellLinkedList {
            mesh,
            cutoff_radius: cell_spacing,
            search_depth: 1,
            color_partition: Vec::new(),
            split_cell_lists: Vec::new(),
            number_of_particles: 0,
            _marker: PhantomData,
        };
        cell_linked_list.compute_color_partition();

        debug!(
            "allocated cell linked list with {:?} cells (spacing {}, buffer {})",
            cell_linked_list.number_of_cells().as_slice(),
            cell_spacing,
            buffer_size
        );

        Ok(cell_linked_list)
    }

    /// Sets the largest radius this list will be searched with. Radii above the cell spacing widen the
    /// stencil and the cell coloring.
    pub fn with_cutoff_radius(mut self, cutoff_radius: FT) -> SphResult<Self> {
        if !(cutoff_radius > 0.) || !cutoff_radius.is_finite() {
            return Err(SphError::NonPositiveCutoffRadius(cutoff_radius));
        }
        let search_depth = ((cutoff_radius / self.cell_spacing()).ceil() as usize).max(1);
        self.cutoff_radius = cutoff_radius;
        if search_depth != self.search_depth {
            self.search_depth = search_depth;
            self.compute_color_partition();
            self.update_split_cell_lists();
        }
        Ok(self)
    }

    pub fn mesh(&self) -> &Mesh<CellList<D>, D> {
        &self.mesh
    }

    pub fn cell_spacing(&self) -> FT {
        self.mesh.cell_spacing()
    }

    pub fn number_of_cells(&self) -> VU<D> {
        self.mesh.number_of_cells()
    }

    pub fn cutoff_radius(&self) -> FT {
        self.cutoff_radius
    }

    pub fn search_depth(&self) -> usize {
        self.search_depth
    }

    pub fn number_of_particles(&self) -> usize {
        self.number_of_particles
    }

    pub fn cells(&self) -> &[CellList<D>] {
        self.mesh.mesh_data().map_or(&[][..], |data| data.as_slice())
    }

    fn cells_mut(&mut self) -> &mut [CellList<D>] {
        match self.mesh.mesh_data_mut() {
            Some(data) => data.as_mut_slice(),
            None => &mut [],
        }
    }

    pub fn cell_list(&self, location: VU<D>) -> Option<&CellList<D>> {
        self.mesh.mesh_data().map(|data| data.get(location))
    }

    /// Occupied cells grouped by color. Two cells of one color never share a stencil.
    pub fn split_cell_lists(&self) -> &[Vec<usize>] {
        &self.split_cell_lists
    }

    fn compute_color_partition(&mut self) {
        let modulus = 2 * self.search_depth + 1;
        let mut colors: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (idx, cell) in self.cells().iter().enumerate() {
            colors
                .entry(cell_color(cell.cell_location(), modulus))
                .or_default()
                .push(idx);
        }
        self.color_partition = colors.into_values().collect();
    }

    pub fn clear_cell_lists(&mut self) {
        par_iter_mut1(self.cells_mut(), |_, cell| cell.clear());
    }

    /// Adds one particle to its cell. Callable concurrently; the entry is seen by the neighbor
    /// searches once [`MeshCellLinkedList::seal_cell_lists`] ran.
    pub fn insert_a_cell_linked_list_entry(&self, particle_index: usize, position: VF<D>) -> SphResult<()> {
        let location = self.mesh.checked_cell_location(particle_index, &position)?;
        if let Some(cell) = self.cell_list(location) {
            cell.push(ListData::new(particle_index, position));
        }
        Ok(())
    }

    /// Ends an insertion phase over `number_of_particles` particles.
    pub fn seal_cell_lists(&mut self, number_of_particles: usize) {
        par_iter_mut1(self.cells_mut(), |_, cell| cell.seal());
        self.number_of_particles = number_of_particles;
        self.update_split_cell_lists();
    }

    /// Rebuilds all cells from scratch. Fails without touching the previous state if any particle
    /// maps outside of the grid.
    pub fn update_cell_lists(&mut self, positions: &[VF<D>]) -> SphResult<()> {
        let mesh = &self.mesh;
        let cell_indices = par_try_map(positions.len(), |i| {
            mesh.checked_cell_location(i, &positions[i])
                .map(|location| mesh.linear_index(location))
        })?;

        self.clear_cell_lists();

        {
            let cells = self.cells();
            into_par_iter(0..positions.len()).for_each(|i| {
                cells[cell_indices[i]].push(ListData::new(i, positions[i]));
            });
        }

        self.seal_cell_lists(positions.len());

        debug!(
            "sorted {} particles into {} occupied of {} cells",
            self.number_of_particles,
            self.split_cell_lists.iter().map(Vec::len).sum::<usize>(),
            self.mesh.total_number_of_cells()
        );

        Ok(())
    }

    /// Collects the occupied cells of every color.
    pub fn update_split_cell_lists(&mut self) {
        let cells = self.mesh.mesh_data().map_or(&[][..], |data| data.as_slice());
        self.split_cell_lists = self
            .color_partition
            .iter()
            .map(|color| color.iter().copied().filter(|&idx| !cells[idx].is_empty()).collect::<Vec<_>>())
            .filter(|color: &Vec<usize>| !color.is_empty())
            .collect();
    }

    /// Whether `position_1` comes strictly before `position_2` in the order used to visit every
    /// particle pair once: by cell location (lexicographic) first. Inside one cell
    /// [`MeshCellLinkedList::update_inner_configuration`] breaks ties with the particle indices,
    /// here the positions break them.
    pub fn is_in_sequence(&self, position_1: &VF<D>, position_2: &VF<D>) -> bool {
        let cell_1 = self.mesh.cell_index_from_position(position_1);
        let cell_2 = self.mesh.cell_index_from_position(position_2);
        in_sequence(compare_cells(&cell_1, &cell_2), || compare_positions(position_1, position_2))
    }

    /// Builds the neighborhoods of all particles of the last rebuild inside of this body.
    ///
    /// Colors are processed one after another, the cells of one color in parallel. A pair is only
    /// evaluated from the particle that comes first in cell order and then written to both
    /// neighborhoods.
    pub fn update_inner_configuration(
        &mut self,
        kernel: &Kernel<DU, D>,
        total_real_particles: usize,
        configuration: &mut InnerParticleConfiguration<D>,
    ) -> SphResult<()> {
        let cutoff_radius = kernel.cutoff_radius();
        if cutoff_radius > self.cutoff_radius {
            return Err(SphError::CutoffRadiusExceedsMesh {
                kernel: cutoff_radius,
                mesh: self.cutoff_radius,
            });
        }
        let cutoff_sq = cutoff_radius * cutoff_radius;
        let search_depth = ((cutoff_radius / self.cell_spacing()).ceil() as usize).clamp(1, self.search_depth);
        let stencil = i32::try_from(search_depth).unwrap_or(i32::MAX);

        configuration.reset(self.number_of_particles);
        let neighborhoods = ThreadSafeMutPtr::new(configuration.neighborhoods_mut().as_mut_ptr());

        let mesh = &self.mesh;
        let cells = self.cells();

        for color in &self.split_cell_lists {
            into_par_iter(color).for_each(|&cell_idx| {
                let cell = &cells[cell_idx];
                let location = cell.cell_location();
                let center = VC::<D>::from_fn(|d, _| location[d] as i64);

                DU::iterate_grid_neighbors(stencil, |offset| {
                    let neighbor_cell = VC::<D>::from_fn(|d, _| center[d] + offset[d] as i64);
                    let neighbor_location = match mesh.checked_location(neighbor_cell) {
                        Some(neighbor_location) => neighbor_location,
                        None => return,
                    };
                    let cell_order = compare_cells(&center, &neighbor_cell);
                    if cell_order.is_gt() {
                        return;
                    }

                    let neighbor_entries = cells[mesh.linear_index(neighbor_location)].particle_data_lists();
                    for entry_i in cell.particle_data_lists() {
                        for entry_j in neighbor_entries {
                            if !in_sequence(cell_order, || entry_i.particle_index.cmp(&entry_j.particle_index)) {
                                continue;
                            }
                            if (entry_i.position - entry_j.position).norm_squared() > cutoff_sq {
                                continue;
                            }

                            let relation = NeighborRelation::new(
                                kernel,
                                entry_i.position,
                                entry_j.particle_index,
                                entry_j.position,
                            );
                            // SAFETY: both particles lie in this cell or its stencil. Cells of one
                            // color are at least 2 * search_depth + 1 cells apart, so no other
                            // thread touches these neighborhoods during this color.
                            unsafe {
                                neighborhoods.element_mut(entry_i.particle_index).push(relation);
                                neighborhoods
                                    .element_mut(entry_j.particle_index)
                                    .push(relation.mirrored(entry_i.particle_index));
                            }
                        }
                    }
                });
            });
        }

        par_iter_mut1(self.cells_mut(), |_, cell| {
            cell.update_real_particles_in_cell(total_real_particles)
        });

        debug!(
            "inner configuration: {} relations for {} particles",
            configuration.total_relations(),
            configuration.len()
        );

        Ok(())
    }

    /// Builds, for every particle of another body, the neighbors among the particles stored in this
    /// grid. `self` is the target body's list.
    #[allow(clippy::too_many_arguments)]
    pub fn update_contact_configuration(
        &self,
        origin_positions: &[VF<D>],
        origin_level: usize,
        origin_kernel: &Kernel<DU, D>,
        target_level: usize,
        target_kernel: &Kernel<DU, D>,
        policy: &KernelSelectionPolicy,
        configuration: &mut ContactParticleConfiguration<D>,
    ) -> SphResult<()> {
        let kernel = choosing_kernel(policy, origin_kernel, target_kernel);
        let cutoff_radius = kernel.cutoff_radius();
        let cutoff_sq = cutoff_radius * cutoff_radius;

        let largest_dimension = self.number_of_cells().iter().copied().max().unwrap_or(0);
        let search_range = computing_search_range(origin_level, target_level)
            .max((cutoff_radius / self.cell_spacing()).ceil() as usize)
            .min(largest_dimension);
        let search_range = search_range as i64;

        configuration.reset(origin_positions.len());

        let mesh = &self.mesh;
        let cells = self.cells();
        let upper_bound = self.number_of_cells();

        par_iter_mut1(configuration.neighborhoods_mut(), |i, neighborhood| {
            let position_i = origin_positions[i];
            let center = mesh.cell_index_from_position(&position_i);

            let mut lower = VU::<D>::zeros();
            let mut upper = VU::<D>::zeros();
            for d in 0..D {
                let lo = center[d].saturating_sub(search_range).max(0);
                let hi = center[d].saturating_add(search_range).min(upper_bound[d] as i64 - 1);
                if lo > hi {
                    return;
                }
                lower[d] = lo as usize;
                upper[d] = hi as usize;
            }

            for_each_location_in_box(lower, upper, |location| {
                for entry in cells[mesh.linear_index(location)].particle_data_lists() {
                    if (position_i - entry.position).norm_squared() <= cutoff_sq {
                        neighborhood.push(NeighborRelation::new(
                            kernel,
                            position_i,
                            entry.particle_index,
                            entry.position,
                        ));
                    }
                }
            });
        });

        debug!(
            "contact configuration: {} relations for {} particles (search range {}, cutoff {})",
            configuration.total_relations(),
            configuration.len(),
            search_range,
            cutoff_radius
        );

        Ok(())
    }
}

impl<DU: DimensionUtils<D>, const D: usize> MeshOutput for MeshCellLinkedList<DU, D> {}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;
    use crate::{sph_kernels::DimensionUtils2d, sph_kernels::DimensionUtils3d, vec2f};

    type List2d = MeshCellLinkedList<DimensionUtils2d, 2>;

    fn ten_by_ten_list() -> List2d {
        let bbox = BoundingBox::new(vec2f(0., 0.), vec2f(10., 10.)).unwrap();
        List2d::new(bbox, 1., 2).unwrap()
    }

    fn inner_configuration<DU: DimensionUtils<D>, const D: usize>(
        list: &mut MeshCellLinkedList<DU, D>,
        positions: &[VF<D>],
        cutoff_radius: FT,
    ) -> InnerParticleConfiguration<D> {
        let kernel = Kernel::<DU, D>::from_cutoff_radius(cutoff_radius).unwrap();
        let mut configuration = InnerParticleConfiguration::default();
        list.update_cell_lists(positions).unwrap();
        list.update_inner_configuration(&kernel, positions.len(), &mut configuration)
            .unwrap();
        configuration
    }

    fn sorted_neighbors<const D: usize>(configuration: &InnerParticleConfiguration<D>) -> Vec<Vec<usize>> {
        configuration
            .neighborhoods()
            .iter()
            .map(|neighborhood| {
                let mut indices: Vec<usize> = neighborhood.neighbor_indices().collect();
                indices.sort_unstable();
                indices
            })
            .collect()
    }

    fn brute_force<const D: usize>(origin: &[VF<D>], target: &[VF<D>], cutoff_radius: FT, skip_self: bool) -> Vec<Vec<usize>> {
        origin
            .iter()
            .enumerate()
            .map(|(i, position_i)| {
                target
                    .iter()
                    .enumerate()
                    .filter(|&(j, position_j)| {
                        !(skip_self && i == j) && (position_i - position_j).norm_squared() <= cutoff_radius * cutoff_radius
                    })
                    .map(|(j, _)| j)
                    .collect()
            })
            .collect()
    }

    fn random_positions_2d(rng: &mut StdRng, n: usize, lower: FT, upper: FT) -> Vec<VF<2>> {
        (0..n)
            .map(|_| vec2f(rng.gen_range(lower..upper), rng.gen_range(lower..upper)))
            .collect()
    }

    #[test]
    fn close_pair_are_neighbors() {
        let mut list = ten_by_ten_list();
        let positions = [vec2f(5.0, 5.0), vec2f(5.5, 5.0)];
        let configuration = inner_configuration(&mut list, &positions, 1.);

        assert_eq!(sorted_neighbors(&configuration), vec![vec![1], vec![0]]);
        let relation = configuration.neighborhood(0).iter().next().unwrap();
        assert_eq!(relation.r_ij, 0.5);
        assert_eq!(relation.e_ij, vec2f(-1., 0.));
    }

    #[test]
    fn distant_pair_are_not_neighbors() {
        let mut list = ten_by_ten_list();
        let positions = [vec2f(5.0, 5.0), vec2f(7.0, 5.0)];
        let configuration = inner_configuration(&mut list, &positions, 1.);
        assert_eq!(sorted_neighbors(&configuration), vec![Vec::<usize>::new(), vec![]]);
    }

    #[test]
    fn empty_body_gives_empty_configuration() {
        let mut list = ten_by_ten_list();
        let configuration = inner_configuration(&mut list, &[], 1.);
        assert!(configuration.is_empty());
        assert!(list.split_cell_lists().is_empty());
        assert!(list.cells().iter().all(CellList::is_empty));
    }

    #[test]
    fn pair_at_exactly_the_cutoff_is_included() {
        let mut list = ten_by_ten_list();
        let positions = [vec2f(5.0, 5.0), vec2f(6.0, 5.0)];
        let configuration = inner_configuration(&mut list, &positions, 1.);
        assert_eq!(sorted_neighbors(&configuration), vec![vec![1], vec![0]]);
    }

    #[test]
    fn inner_configuration_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(42);

        // uniform
        let uniform = random_positions_2d(&mut rng, 600, 0., 10.);
        // clustered, many particles share cells
        let clustered = random_positions_2d(&mut rng, 400, 4., 5.2);
        // partly inside of the buffer layers
        let buffered = random_positions_2d(&mut rng, 300, -1.9, 11.9);

        for positions in [uniform, clustered, buffered, vec![vec2f(3.3, 3.3)]] {
            for cutoff_radius in [1.0, 1.7] {
                let bbox = BoundingBox::new(vec2f(0., 0.), vec2f(10., 10.)).unwrap();
                let mut list = List2d::new(bbox, 1., 2)
                    .unwrap()
                    .with_cutoff_radius(cutoff_radius)
                    .unwrap();
                let configuration = inner_configuration(&mut list, &positions, cutoff_radius);
                assert_eq!(
                    sorted_neighbors(&configuration),
                    brute_force(&positions, &positions, cutoff_radius, true)
                );
            }
        }
    }

    #[test]
    fn inner_configuration_3d_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(7);
        let positions: Vec<VF<3>> = (0..500)
            .map(|_| crate::vec3f(rng.gen_range(0.0..4.0), rng.gen_range(0.0..4.0), rng.gen_range(0.0..4.0)))
            .collect();

        let bbox = BoundingBox::new(crate::vec3f(0., 0., 0.), crate::vec3f(4., 4., 4.)).unwrap();
        let mut list = MeshCellLinkedList::<DimensionUtils3d, 3>::new(bbox, 0.6, 1).unwrap();
        let configuration = inner_configuration(&mut list, &positions, 0.6);
        assert_eq!(sorted_neighbors(&configuration), brute_force(&positions, &positions, 0.6, true));
    }

    #[test]
    fn inner_configuration_is_symmetric_and_free_of_duplicates() {
        let mut rng = StdRng::seed_from_u64(3);
        let positions = random_positions_2d(&mut rng, 800, 0., 10.);
        let mut list = ten_by_ten_list();
        let configuration = inner_configuration(&mut list, &positions, 1.);

        for (i, neighborhood) in configuration.neighborhoods().iter().enumerate() {
            let mut indices: Vec<usize> = neighborhood.neighbor_indices().collect();
            let len = indices.len();
            indices.sort_unstable();
            indices.dedup();
            assert_eq!(indices.len(), len, "duplicate neighbor of particle {}", i);
            assert!(!neighborhood.contains(i));

            for relation in neighborhood.iter() {
                let mirrored = configuration
                    .neighborhood(relation.j)
                    .iter()
                    .find(|other| other.j == i)
                    .unwrap();
                assert_eq!(mirrored.r_ij, relation.r_ij);
                assert_eq!(mirrored.w_ij, relation.w_ij);
                assert_eq!(mirrored.e_ij, -relation.e_ij);
            }
        }
    }

    #[test]
    fn rebuilds_are_deterministic() {
        let mut rng = StdRng::seed_from_u64(11);
        let positions = random_positions_2d(&mut rng, 500, 0., 10.);
        let mut list = ten_by_ten_list();

        let first = inner_configuration(&mut list, &positions, 1.);
        let second = inner_configuration(&mut list, &positions, 1.);
        for i in 0..positions.len() {
            let a: Vec<usize> = first.neighborhood(i).neighbor_indices().collect();
            let b: Vec<usize> = second.neighborhood(i).neighbor_indices().collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn split_cell_lists_partition_the_occupied_cells() {
        let mut rng = StdRng::seed_from_u64(5);
        let positions = random_positions_2d(&mut rng, 300, 0., 10.);
        let bbox = BoundingBox::new(vec2f(0., 0.), vec2f(10., 10.)).unwrap();
        let mut list = List2d::new(bbox, 1., 2).unwrap().with_cutoff_radius(2.).unwrap();
        assert_eq!(list.search_depth(), 2);
        list.update_cell_lists(&positions).unwrap();

        let mut seen: Vec<usize> = list.split_cell_lists().iter().flatten().copied().collect();
        let total = seen.len();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), total, "cell in more than one color");

        let occupied: Vec<usize> = (0..list.cells().len())
            .filter(|&idx| !list.cells()[idx].is_empty())
            .collect();
        assert_eq!(seen, occupied);

        let min_distance = 2 * list.search_depth() + 1;
        for color in list.split_cell_lists() {
            for &a in color {
                for &b in color {
                    if a == b {
                        continue;
                    }
                    let la = list.cells()[a].cell_location();
                    let lb = list.cells()[b].cell_location();
                    let chebyshev = (0..2).map(|d| la[d].abs_diff(lb[d])).max().unwrap();
                    assert!(chebyshev >= min_distance);
                }
            }
        }
    }

    #[test]
    fn real_particles_in_cell_excludes_buffer_particles() {
        let mut list = ten_by_ten_list();
        let positions = [vec2f(5.1, 5.1), vec2f(5.2, 5.2), vec2f(5.3, 5.3)];
        let kernel = Kernel::<DimensionUtils2d, 2>::from_cutoff_radius(1.).unwrap();
        let mut configuration = InnerParticleConfiguration::default();
        list.update_cell_lists(&positions).unwrap();
        list.update_inner_configuration(&kernel, 2, &mut configuration).unwrap();

        let cell = list.cell_list(VU::<2>::new(7, 7)).unwrap();
        assert_eq!(cell.len(), 3);
        assert_eq!(cell.real_particles_in_cell(), 2);
    }

    #[test]
    fn particle_outside_of_the_grid_keeps_previous_state() {
        let mut list = ten_by_ten_list();
        let positions = [vec2f(1., 1.), vec2f(1.5, 1.)];
        list.update_cell_lists(&positions).unwrap();

        let moved = [vec2f(1., 1.), vec2f(1.5, 13.)];
        match list.update_cell_lists(&moved) {
            Err(SphError::ParticleOutsideMesh { particle, .. }) => assert_eq!(particle, 1),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(list.number_of_particles(), 2);
        assert_eq!(list.cell_list(VU::<2>::new(3, 3)).unwrap().len(), 2);

        assert!(list.update_cell_lists(&[vec2f(FT::NAN, 1.)]).is_err());
        assert_eq!(list.number_of_particles(), 2);
    }

    #[test]
    fn kernel_wider_than_the_grid_cutoff_is_rejected() {
        let mut list = ten_by_ten_list();
        list.update_cell_lists(&[vec2f(1., 1.)]).unwrap();
        let kernel = Kernel::<DimensionUtils2d, 2>::from_cutoff_radius(1.5).unwrap();
        let mut configuration = InnerParticleConfiguration::default();
        assert!(matches!(
            list.update_inner_configuration(&kernel, 1, &mut configuration),
            Err(SphError::CutoffRadiusExceedsMesh { .. })
        ));

        assert!(matches!(
            ten_by_ten_list().with_cutoff_radius(0.),
            Err(SphError::NonPositiveCutoffRadius(_))
        ));
    }

    #[test]
    fn is_in_sequence_is_a_strict_order() {
        let list = ten_by_ten_list();
        let a = vec2f(1.5, 1.5);
        let b = vec2f(2.5, 1.2);
        let c = vec2f(1.7, 1.1);

        assert!(list.is_in_sequence(&a, &b));
        assert!(!list.is_in_sequence(&b, &a));
        // same cell, decided by the positions
        assert!(list.is_in_sequence(&a, &c));
        assert!(!list.is_in_sequence(&c, &a));
        assert!(!list.is_in_sequence(&a, &a));
    }

    #[test]
    fn builder_visits_pairs_in_sequence_order() {
        assert!(in_sequence(Ordering::Less, || Ordering::Greater));
        assert!(!in_sequence(Ordering::Greater, || Ordering::Less));
        assert!(in_sequence(Ordering::Equal, || Ordering::Less));
        assert!(!in_sequence(Ordering::Equal, || Ordering::Equal));

        // pairs in different cells are recorded from the particle that is first in sequence
        let mut list = ten_by_ten_list();
        let positions = vec![vec2f(2.2, 1.5), vec2f(1.9, 1.5), vec2f(1.7, 1.1)];
        let configuration = inner_configuration(&mut list, &positions, 1.);
        for (i, j) in [(1, 0), (2, 0), (2, 1)] {
            assert!(list.is_in_sequence(&positions[i], &positions[j]));
            assert!(!list.is_in_sequence(&positions[j], &positions[i]));
            assert!(configuration.neighborhood(i).contains(j));
            assert!(configuration.neighborhood(j).contains(i));
        }
        assert_eq!(configuration.total_relations(), 6);
    }

    #[test]
    fn search_range_grows_with_target_refinement() {
        assert_eq!(computing_search_range(0, 0), 1);
        assert_eq!(computing_search_range(3, 1), 1);
        assert_eq!(computing_search_range(0, 1), 2);
        assert_eq!(computing_search_range(1, 4), 8);
        assert_eq!(computing_search_range(0, 200), usize::MAX);
    }

    #[test]
    fn contact_configuration_covers_all_resolutions() {
        let mut rng = StdRng::seed_from_u64(19);
        let bbox = BoundingBox::new(vec2f(0., 0.), vec2f(10., 10.)).unwrap();
        let coarse_positions = random_positions_2d(&mut rng, 300, 0., 10.);
        let fine_positions = random_positions_2d(&mut rng, 1200, 0., 10.);

        // level 0 with cutoff 1, level 2 with cutoff 0.25
        let coarse_kernel = Kernel::<DimensionUtils2d, 2>::from_cutoff_radius(1.).unwrap();
        let fine_kernel = Kernel::<DimensionUtils2d, 2>::from_cutoff_radius(0.25).unwrap();

        let mut coarse_list = List2d::new(bbox, 1., 2).unwrap();
        coarse_list.update_cell_lists(&coarse_positions).unwrap();
        let mut fine_list = List2d::new(bbox, 0.25, 2).unwrap();
        fine_list.update_cell_lists(&fine_positions).unwrap();

        let sorted = |configuration: &ContactParticleConfiguration<2>| sorted_neighbors(configuration);

        for policy in [KernelSelectionPolicy::default(), crate::OriginKernel.into()] {
            // fine body searching the coarse body
            let mut configuration = ContactParticleConfiguration::default();
            fine_list
                .update_contact_configuration(&[], 2, &fine_kernel, 0, &coarse_kernel, &policy, &mut configuration)
                .unwrap();
            assert!(configuration.is_empty());

            coarse_list
                .update_contact_configuration(
                    &fine_positions,
                    2,
                    &fine_kernel,
                    0,
                    &coarse_kernel,
                    &policy,
                    &mut configuration,
                )
                .unwrap();
            let cutoff = policy.choose(&fine_kernel, &coarse_kernel).cutoff_radius();
            assert_eq!(sorted(&configuration), brute_force(&fine_positions, &coarse_positions, cutoff, false));

            // coarse body searching the fine body
            fine_list
                .update_contact_configuration(
                    &coarse_positions,
                    0,
                    &coarse_kernel,
                    2,
                    &fine_kernel,
                    &policy,
                    &mut configuration,
                )
                .unwrap();
            let cutoff = policy.choose(&coarse_kernel, &fine_kernel).cutoff_radius();
            assert_eq!(sorted(&configuration), brute_force(&coarse_positions, &fine_positions, cutoff, false));
        }
    }

    #[test]
    fn contact_with_nothing_in_range_is_empty() {
        let mut target = ten_by_ten_list();
        target.update_cell_lists(&[vec2f(1., 1.)]).unwrap();
        let kernel = Kernel::<DimensionUtils2d, 2>::from_cutoff_radius(1.).unwrap();

        let mut configuration = ContactParticleConfiguration::default();
        target
            .update_contact_configuration(
                &[vec2f(8., 8.), vec2f(-100., 3.), vec2f(FT::INFINITY, 0.)],
                0,
                &kernel,
                0,
                &kernel,
                &KernelSelectionPolicy::default(),
                &mut configuration,
            )
            .unwrap();
        assert_eq!(configuration.len(), 3);
        assert_eq!(configuration.total_relations(), 0);
    }

    #[test]
    fn manual_insertion_is_visible_after_sealing() {
        let mut list = ten_by_ten_list();
        list.clear_cell_lists();
        list.insert_a_cell_linked_list_entry(0, vec2f(2.2, 2.2)).unwrap();
        list.insert_a_cell_linked_list_entry(1, vec2f(2.6, 2.2)).unwrap();
        assert!(list.insert_a_cell_linked_list_entry(2, vec2f(-5., 2.2)).is_err());
        list.seal_cell_lists(2);

        let kernel = Kernel::<DimensionUtils2d, 2>::from_cutoff_radius(1.).unwrap();
        let mut configuration = InnerParticleConfiguration::default();
        list.update_inner_configuration(&kernel, 2, &mut configuration).unwrap();
        assert_eq!(sorted_neighbors(&configuration), vec![vec![1], vec![0]]);
    }

    #[test]
    fn mesh_dump_hooks_write_nothing() {
        let list = ten_by_ten_list();
        let mut vtu = Vec::new();
        let mut plt = Vec::new();
        list.write_mesh_to_vtu(&mut vtu).unwrap();
        list.write_mesh_to_plt(&mut plt).unwrap();
        assert!(vtu.is_empty());
        assert!(plt.is_empty());
    }
}
