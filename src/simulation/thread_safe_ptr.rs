/// A raw pointer that may be shared between rayon workers.
///
/// Whoever dereferences it must guarantee that no two threads access the same element at the same
/// time. The only user is the split-cell traversal, where the cell coloring provides that guarantee.
#[derive(Copy, Clone)]
pub struct ThreadSafeMutPtr<T> {
    ptr: *mut T,
}
unsafe impl<T> Sync for ThreadSafeMutPtr<T> {}
unsafe impl<T> Send for ThreadSafeMutPtr<T> {}
impl<T> ThreadSafeMutPtr<T> {
    pub fn new(ptr: *mut T) -> ThreadSafeMutPtr<T> {
        ThreadSafeMutPtr { ptr }
    }

    /// # Safety
    /// `index` must be in bounds of the allocation and no other thread may access the same element
    /// for the lifetime of the returned reference.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn element_mut(&self, index: usize) -> &mut T {
        &mut *self.ptr.add(index)
    }
}
