pub use internal::*;

#[cfg(target_arch = "wasm32")]
mod internal {
    pub fn into_par_iter<T>(
        v: impl IntoIterator<Item = T, IntoIter = impl Iterator<Item = T>>,
    ) -> impl Iterator<Item = T> {
        v.into_iter()
    }

    pub fn par_iter_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(arr1: &mut [T1], f: F) {
        arr1.iter_mut().enumerate().for_each(|(idx, v1)| {
            f(idx, v1);
        });
    }

    pub fn par_try_map<T: Send, E: Send, F: Fn(usize) -> Result<T, E> + Send + Sync>(
        n: usize,
        f: F,
    ) -> Result<Vec<T>, E> {
        (0..n).map(f).collect()
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod internal {
    use rayon::prelude::*;

    pub fn into_par_iter<T>(v: impl IntoParallelIterator<Item = T>) -> impl ParallelIterator<Item = T> {
        v.into_par_iter()
    }

    pub fn par_iter_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(arr1: &mut [T1], f: F) {
        arr1.into_par_iter().enumerate().for_each(|(idx, v1)| {
            f(idx, v1);
        });
    }

    /// Maps every index in `0..n` in parallel and stops at the first error.
    pub fn par_try_map<T: Send, E: Send, F: Fn(usize) -> Result<T, E> + Send + Sync>(
        n: usize,
        f: F,
    ) -> Result<Vec<T>, E> {
        (0..n).into_par_iter().map(f).collect()
    }
}
