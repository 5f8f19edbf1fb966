use enum_dispatch::enum_dispatch;

use crate::sph_kernels::{DimensionUtils, Kernel};

/// Decides which of two kernels governs the interaction between two bodies.
#[enum_dispatch]
pub trait KernelSelection {
    fn choose<'a, DU: DimensionUtils<D>, const D: usize>(
        &self,
        origin_kernel: &'a Kernel<DU, D>,
        target_kernel: &'a Kernel<DU, D>,
    ) -> &'a Kernel<DU, D>;
}

/// The kernel with the larger smoothing length wins. On ties the origin kernel is used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoarserKernel;

impl KernelSelection for CoarserKernel {
    fn choose<'a, DU: DimensionUtils<D>, const D: usize>(
        &self,
        origin_kernel: &'a Kernel<DU, D>,
        target_kernel: &'a Kernel<DU, D>,
    ) -> &'a Kernel<DU, D> {
        if target_kernel.smoothing_length() > origin_kernel.smoothing_length() {
            target_kernel
        } else {
            origin_kernel
        }
    }
}

/// Always uses the kernel of the querying body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OriginKernel;

impl KernelSelection for OriginKernel {
    fn choose<'a, DU: DimensionUtils<D>, const D: usize>(
        &self,
        origin_kernel: &'a Kernel<DU, D>,
        _target_kernel: &'a Kernel<DU, D>,
    ) -> &'a Kernel<DU, D> {
        origin_kernel
    }
}

#[enum_dispatch(KernelSelection)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelSelectionPolicy {
    CoarserKernel,
    OriginKernel,
}

impl Default for KernelSelectionPolicy {
    fn default() -> Self {
        CoarserKernel.into()
    }
}

#[test]
fn coarser_kernel_prefers_larger_smoothing_length() {
    use crate::sph_kernels::DimensionUtils2d;

    let fine = Kernel::<DimensionUtils2d, 2>::new(0.5).unwrap();
    let coarse = Kernel::<DimensionUtils2d, 2>::new(1.0).unwrap();
    let coarse_too = Kernel::<DimensionUtils2d, 2>::new(1.0).unwrap();

    let policy = KernelSelectionPolicy::default();
    assert_eq!(policy.choose(&fine, &coarse).smoothing_length(), 1.0);
    assert_eq!(policy.choose(&coarse, &fine).smoothing_length(), 1.0);

    // ties go to the origin
    assert!(std::ptr::eq(policy.choose(&coarse, &coarse_too), &coarse));

    let origin: KernelSelectionPolicy = OriginKernel.into();
    assert_eq!(origin.choose(&fine, &coarse).smoothing_length(), 0.5);
}
