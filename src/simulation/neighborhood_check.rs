//! Slow cross-check of neighbor configurations against an R*-tree radius search.

use rstar::{primitives::GeomWithData, Point, RTree};

use crate::{
    concurrency::par_try_map,
    error::{SphError, SphResult},
    floating_type_mod::FT,
    particle_configuration::ParticleConfiguration,
    VF,
};

#[derive(Debug, PartialEq, Clone, Copy)]
struct CustomRTreePoint<const D: usize> {
    p: VF<D>,
}

impl<const D: usize> Point for CustomRTreePoint<D> {
    type Scalar = FT;

    const DIMENSIONS: usize = D;

    fn generate(mut generator: impl FnMut(usize) -> Self::Scalar) -> Self {
        CustomRTreePoint {
            p: VF::<D>::from_iterator((0..D).map(|d| generator(d))),
        }
    }

    fn nth(&self, index: usize) -> Self::Scalar {
        self.p[index]
    }

    fn nth_mut(&mut self, index: usize) -> &mut Self::Scalar {
        &mut self.p[index]
    }
}

impl<const D: usize> From<VF<D>> for CustomRTreePoint<D> {
    fn from(p: VF<D>) -> Self {
        CustomRTreePoint { p }
    }
}

type CustomRTreeElem<const D: usize> = GeomWithData<CustomRTreePoint<D>, usize>;

fn build_rtree<const D: usize>(positions: &[VF<D>]) -> RTree<CustomRTreeElem<D>> {
    let rtree_elems: Vec<_> = positions
        .iter()
        .enumerate()
        .map(|(idx, position)| CustomRTreeElem::new(CustomRTreePoint::from(*position), idx))
        .collect();
    RTree::bulk_load(rtree_elems)
}

/// Indices of all `target` particles with `|x - x_j| <= cutoff_radius`, sorted.
fn reference_neighbors<const D: usize>(
    rtree: &RTree<CustomRTreeElem<D>>,
    target: &[VF<D>],
    position: VF<D>,
    cutoff_radius: FT,
) -> Vec<usize> {
    let cutoff_sq = cutoff_radius * cutoff_radius;
    // the tree query is only a prefilter, the exact test below decides
    let query_sq = cutoff_sq * 1.001;
    let mut neighbors: Vec<usize> = rtree
        .locate_within_distance(CustomRTreePoint::from(position), query_sq)
        .map(|elem| elem.data)
        .filter(|&j| (position - target[j]).norm_squared() <= cutoff_sq)
        .collect();
    neighbors.sort_unstable();
    neighbors
}

fn sorted_indices<const D: usize>(configuration: &ParticleConfiguration<D>, i: usize) -> SphResult<Vec<usize>> {
    let mut indices: Vec<usize> = configuration.neighborhood(i).neighbor_indices().collect();
    let len = indices.len();
    indices.sort_unstable();
    indices.dedup();
    if indices.len() != len {
        return Err(SphError::InconsistentConfiguration {
            particle: i,
            details: "neighbor listed more than once".to_string(),
        });
    }
    Ok(indices)
}

fn check_count<const D: usize>(configuration: &ParticleConfiguration<D>, expected: usize) -> SphResult<()> {
    if configuration.len() != expected {
        return Err(SphError::CountMismatch {
            what: "neighborhoods in configuration",
            expected,
            found: configuration.len(),
        });
    }
    Ok(())
}

/// Verifies an inner configuration: complete, free of duplicates and self pairs, and symmetric.
pub fn check_inner_configuration<const D: usize>(
    positions: &[VF<D>],
    cutoff_radius: FT,
    configuration: &ParticleConfiguration<D>,
) -> SphResult<()> {
    check_count(configuration, positions.len())?;
    let rtree = build_rtree(positions);

    par_try_map(positions.len(), |i| {
        let found = sorted_indices(configuration, i)?;
        if found.binary_search(&i).is_ok() {
            return Err(SphError::InconsistentConfiguration {
                particle: i,
                details: "particle is listed as its own neighbor".to_string(),
            });
        }

        let mut expected = reference_neighbors(&rtree, positions, positions[i], cutoff_radius);
        expected.retain(|&j| j != i);
        if found != expected {
            return Err(SphError::InconsistentConfiguration {
                particle: i,
                details: format!("found neighbors {:?}, expected {:?}", found, expected),
            });
        }

        if let Some(&j) = found.iter().find(|&&j| !configuration.neighborhood(j).contains(i)) {
            return Err(SphError::InconsistentConfiguration {
                particle: i,
                details: format!("{} is a neighbor of {} but not the other way around", j, i),
            });
        }
        Ok(())
    })?;

    Ok(())
}

/// Verifies a contact configuration of `origin` particles towards `target` particles.
pub fn check_contact_configuration<const D: usize>(
    origin: &[VF<D>],
    target: &[VF<D>],
    cutoff_radius: FT,
    configuration: &ParticleConfiguration<D>,
) -> SphResult<()> {
    check_count(configuration, origin.len())?;
    let rtree = build_rtree(target);

    par_try_map(origin.len(), |i| {
        let found = sorted_indices(configuration, i)?;
        let expected = reference_neighbors(&rtree, target, origin[i], cutoff_radius);
        if found != expected {
            return Err(SphError::InconsistentConfiguration {
                particle: i,
                details: format!("found contact neighbors {:?}, expected {:?}", found, expected),
            });
        }
        Ok(())
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;
    use crate::{
        sph_kernels::{DimensionUtils2d, Kernel},
        vec2f, BoundingBox, InnerParticleConfiguration, KernelSelectionPolicy, MeshCellLinkedList,
        NeighborRelation,
    };

    fn random_positions(seed: u64, n: usize) -> Vec<VF<2>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| vec2f(rng.gen_range(0.0..5.0), rng.gen_range(0.0..5.0)))
            .collect()
    }

    #[test]
    fn cell_linked_list_passes_the_check() {
        let positions = random_positions(1, 400);
        let target = random_positions(2, 300);
        let bbox = BoundingBox::new(vec2f(0., 0.), vec2f(5., 5.)).unwrap();
        let kernel = Kernel::<DimensionUtils2d, 2>::from_cutoff_radius(0.5).unwrap();

        let mut list = MeshCellLinkedList::<DimensionUtils2d, 2>::new(bbox, 0.5, 1).unwrap();
        let mut configuration = InnerParticleConfiguration::default();
        list.update_cell_lists(&positions).unwrap();
        list.update_inner_configuration(&kernel, positions.len(), &mut configuration)
            .unwrap();
        check_inner_configuration(&positions, 0.5, &configuration).unwrap();

        let mut target_list = MeshCellLinkedList::<DimensionUtils2d, 2>::new(bbox, 0.5, 1).unwrap();
        target_list.update_cell_lists(&target).unwrap();
        let mut contact = InnerParticleConfiguration::default();
        target_list
            .update_contact_configuration(
                &positions,
                0,
                &kernel,
                0,
                &kernel,
                &KernelSelectionPolicy::default(),
                &mut contact,
            )
            .unwrap();
        check_contact_configuration(&positions, &target, 0.5, &contact).unwrap();
    }

    #[test]
    fn broken_configurations_are_reported() {
        let kernel = Kernel::<DimensionUtils2d, 2>::from_cutoff_radius(1.).unwrap();
        let positions = vec![vec2f(0., 0.), vec2f(0.5, 0.), vec2f(3., 3.)];

        // missing pair
        let configuration = ParticleConfiguration::<2>::new(3);
        assert!(matches!(
            check_inner_configuration(&positions, 1., &configuration),
            Err(SphError::InconsistentConfiguration { .. })
        ));

        // one sided pair
        let mut configuration = ParticleConfiguration::<2>::new(3);
        configuration.neighborhoods_mut()[0].push(NeighborRelation::new(&kernel, positions[0], 1, positions[1]));
        assert!(check_inner_configuration(&positions, 1., &configuration).is_err());

        configuration.neighborhoods_mut()[1].push(NeighborRelation::new(&kernel, positions[1], 0, positions[0]));
        check_inner_configuration(&positions, 1., &configuration).unwrap();

        // duplicate
        configuration.neighborhoods_mut()[1].push(NeighborRelation::new(&kernel, positions[1], 0, positions[0]));
        assert!(check_inner_configuration(&positions, 1., &configuration).is_err());

        assert!(matches!(
            check_inner_configuration(&positions, 1., &ParticleConfiguration::new(2)),
            Err(SphError::CountMismatch { .. })
        ));
    }
}
