use parking_lot::Mutex;

use crate::{VF, VU};

/// A particle as it is seen by a cell: its index into the body's particle arrays and the position
/// it had when the cell lists were rebuilt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListData<const D: usize> {
    pub particle_index: usize,
    pub position: VF<D>,
}

impl<const D: usize> ListData<D> {
    pub fn new(particle_index: usize, position: VF<D>) -> Self {
        ListData {
            particle_index,
            position,
        }
    }
}

/// Containers that can be appended to from several threads at once.
pub trait ConcurrentPush<T>: Sync {
    fn push(&self, value: T);
}

/// Growable list guarded by a mutex. Only used while particles are inserted into the cells.
#[derive(Debug, Default)]
pub struct ConcurrentListDataVector<const D: usize> {
    entries: Mutex<Vec<ListData<D>>>,
}

impl<const D: usize> ConcurrentPush<ListData<D>> for ConcurrentListDataVector<D> {
    fn push(&self, value: ListData<D>) {
        self.entries.lock().push(value);
    }
}

impl<const D: usize> ConcurrentListDataVector<D> {
    pub fn clear(&mut self) {
        self.entries.get_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn drain_into(&mut self, target: &mut Vec<ListData<D>>) {
        target.append(self.entries.get_mut());
    }
}

/// Content of one grid cell.
///
/// Insertion goes through the mutex guarded staging list so particles can be sorted in from all
/// threads. [`CellList::seal`] moves them into a plain vector that the neighbor search reads without
/// any locking.
#[derive(Debug)]
pub struct CellList<const D: usize> {
    cell_location: VU<D>,
    concurrent_particle_data: ConcurrentListDataVector<D>,
    particle_data_lists: Vec<ListData<D>>,
    real_particles_in_cell: usize,
}

impl<const D: usize> Default for CellList<D> {
    fn default() -> Self {
        CellList {
            cell_location: VU::<D>::zeros(),
            concurrent_particle_data: ConcurrentListDataVector::default(),
            particle_data_lists: Vec::new(),
            real_particles_in_cell: 0,
        }
    }
}

impl<const D: usize> CellList<D> {
    /// Stores the location of this cell inside of its grid. Done once after allocation.
    pub fn set_cell_information(&mut self, cell_location: VU<D>) {
        self.cell_location = cell_location;
    }

    pub fn cell_location(&self) -> VU<D> {
        self.cell_location
    }

    pub fn clear(&mut self) {
        self.concurrent_particle_data.clear();
        self.particle_data_lists.clear();
        self.real_particles_in_cell = 0;
    }

    /// Appends an entry. Safe to call from many threads for the same cell.
    pub fn push(&self, entry: ListData<D>) {
        self.concurrent_particle_data.push(entry);
    }

    /// Ends the insertion phase. Entries are ordered by particle index so the cell content does not
    /// depend on thread scheduling.
    pub fn seal(&mut self) {
        self.concurrent_particle_data.drain_into(&mut self.particle_data_lists);
        self.particle_data_lists.sort_unstable_by_key(|entry| entry.particle_index);
    }

    pub fn particle_data_lists(&self) -> &[ListData<D>] {
        &self.particle_data_lists
    }

    pub fn len(&self) -> usize {
        self.particle_data_lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particle_data_lists.is_empty()
    }

    /// Recounts the entries that belong to real particles (indices below `total_real_particles`).
    pub fn update_real_particles_in_cell(&mut self, total_real_particles: usize) {
        self.real_particles_in_cell = self
            .particle_data_lists
            .iter()
            .filter(|entry| entry.particle_index < total_real_particles)
            .count();
    }

    pub fn real_particles_in_cell(&self) -> usize {
        self.real_particles_in_cell
    }
}

#[test]
fn concurrent_pushes_are_not_lost() {
    use rayon::prelude::*;

    let mut cell = CellList::<2>::default();
    cell.set_cell_information(VU::<2>::new(3, 4));

    let n = 10_000;
    (0..n).into_par_iter().for_each(|i| {
        cell.push(ListData::new(i, crate::vec2f(i as crate::floating_type_mod::FT, 0.)));
    });
    cell.seal();

    assert_eq!(cell.len(), n);
    assert_eq!(cell.cell_location(), VU::<2>::new(3, 4));
    for (i, entry) in cell.particle_data_lists().iter().enumerate() {
        assert_eq!(entry.particle_index, i);
        assert_eq!(entry.position.x, i as crate::floating_type_mod::FT);
    }

    cell.update_real_particles_in_cell(2500);
    assert_eq!(cell.real_particles_in_cell(), 2500);

    cell.clear();
    assert!(cell.is_empty());
    assert_eq!(cell.real_particles_in_cell(), 0);
}
