fn main() {
    #[cfg(not(target_arch = "wasm32"))]
    sph_cell_lists::start();
}
