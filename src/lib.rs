/*!
Cell-linked-list neighbor search for multi-body SPH simulations.

Every body owns a [`MeshCellLinkedList`] over the system bounding box. Each rebuild cycle the
grid is cleared and refilled from the current particle positions, after which inner (same
body) and contact (cross body, possibly cross resolution) neighbor configurations are derived
from it.
*/

mod platform;
mod simulation;

pub use simulation::*;

#[cfg(not(target_arch = "wasm32"))]
pub use platform::start;
