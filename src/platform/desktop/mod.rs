mod main_loop;
mod vtk_exporter;

pub use main_loop::start;
