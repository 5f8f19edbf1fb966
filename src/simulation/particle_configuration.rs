use crate::{
    floating_type_mod::FT,
    sph_kernels::{DimensionUtils, Kernel},
    VF,
};

/// Relation between a particle `i` and one of its neighbors `j`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborRelation<const D: usize> {
    pub j: usize,
    /// distance |x_i - x_j|
    pub r_ij: FT,
    /// unit vector pointing from j to i, zero for coincident particles
    pub e_ij: VF<D>,
    pub w_ij: FT,
    pub dw_ij: FT,
}

impl<const D: usize> NeighborRelation<D> {
    pub fn new<DU: DimensionUtils<D>>(kernel: &Kernel<DU, D>, position_i: VF<D>, j: usize, position_j: VF<D>) -> Self {
        let displacement = position_i - position_j;
        let r_ij = displacement.norm();
        let e_ij = if r_ij > 0. {
            displacement / r_ij
        } else {
            VF::<D>::zeros()
        };
        NeighborRelation {
            j,
            r_ij,
            e_ij,
            w_ij: kernel.w(r_ij),
            dw_ij: kernel.dw(r_ij),
        }
    }

    /// The same relation seen from the other particle.
    pub fn mirrored(&self, i: usize) -> Self {
        NeighborRelation {
            j: i,
            e_ij: -self.e_ij,
            ..*self
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Neighborhood<const D: usize> {
    relations: Vec<NeighborRelation<D>>,
}

impl<const D: usize> Neighborhood<D> {
    pub fn push(&mut self, relation: NeighborRelation<D>) {
        self.relations.push(relation);
    }

    pub fn iter(&self) -> impl Iterator<Item = &NeighborRelation<D>> {
        self.relations.iter()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn clear(&mut self) {
        self.relations.clear();
    }

    pub fn contains(&self, j: usize) -> bool {
        self.relations.iter().any(|relation| relation.j == j)
    }

    pub fn neighbor_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.relations.iter().map(|relation| relation.j)
    }
}

/// One neighborhood per particle, indexed by particle. Valid until the next rebuild.
#[derive(Debug, Clone, Default)]
pub struct ParticleConfiguration<const D: usize> {
    neighborhoods: Vec<Neighborhood<D>>,
}

/// Neighbors inside of the same body.
pub type InnerParticleConfiguration<const D: usize> = ParticleConfiguration<D>;

/// Neighbors in a contact body; `j` indexes the contact body's particles.
pub type ContactParticleConfiguration<const D: usize> = ParticleConfiguration<D>;

impl<const D: usize> ParticleConfiguration<D> {
    pub fn new(num_particles: usize) -> Self {
        let mut configuration = Self::default();
        configuration.reset(num_particles);
        configuration
    }

    /// Resizes to `num_particles` empty neighborhoods. Existing allocations are reused.
    pub fn reset(&mut self, num_particles: usize) {
        self.neighborhoods.truncate(num_particles);
        self.neighborhoods.iter_mut().for_each(Neighborhood::clear);
        self.neighborhoods.resize_with(num_particles, Neighborhood::default);
    }

    pub fn neighborhood(&self, i: usize) -> &Neighborhood<D> {
        &self.neighborhoods[i]
    }

    pub fn neighborhoods(&self) -> &[Neighborhood<D>] {
        &self.neighborhoods
    }

    pub(crate) fn neighborhoods_mut(&mut self) -> &mut [Neighborhood<D>] {
        &mut self.neighborhoods
    }

    pub fn len(&self) -> usize {
        self.neighborhoods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighborhoods.is_empty()
    }

    pub fn total_relations(&self) -> usize {
        self.neighborhoods.iter().map(Neighborhood::len).sum()
    }
}

#[test]
fn relation_geometry() {
    use crate::sph_kernels::DimensionUtils2d;

    let kernel = Kernel::<DimensionUtils2d, 2>::from_cutoff_radius(1.).unwrap();
    let relation = NeighborRelation::new(&kernel, crate::vec2f(1., 1.), 7, crate::vec2f(1., 0.5));
    assert_eq!(relation.j, 7);
    assert_eq!(relation.r_ij, 0.5);
    assert_eq!(relation.e_ij, crate::vec2f(0., 1.));
    assert_eq!(relation.w_ij, kernel.w(0.5));
    assert!(relation.dw_ij < 0.);

    let mirrored = relation.mirrored(3);
    assert_eq!(mirrored.j, 3);
    assert_eq!(mirrored.e_ij, crate::vec2f(0., -1.));
    assert_eq!(mirrored.r_ij, relation.r_ij);

    let coincident = NeighborRelation::new(&kernel, crate::vec2f(1., 1.), 0, crate::vec2f(1., 1.));
    assert_eq!(coincident.e_ij, crate::vec2f(0., 0.));
}

#[test]
fn reset_reuses_and_resizes() {
    let mut configuration = ParticleConfiguration::<2>::new(3);
    configuration.neighborhoods_mut()[1].push(NeighborRelation {
        j: 0,
        r_ij: 0.,
        e_ij: crate::vec2f(0., 0.),
        w_ij: 0.,
        dw_ij: 0.,
    });
    assert_eq!(configuration.total_relations(), 1);
    assert!(configuration.neighborhood(1).contains(0));

    configuration.reset(5);
    assert_eq!(configuration.len(), 5);
    assert_eq!(configuration.total_relations(), 0);

    configuration.reset(0);
    assert!(configuration.is_empty());
}
