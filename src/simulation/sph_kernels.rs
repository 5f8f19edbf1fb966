use std::marker::PhantomData;

use crate::{
    error::{SphError, SphResult},
    floating_type_mod::{FT, PI},
    VI,
};

/**
 * Cubic spline with support [0, 1] in the normalized distance `q`.
 */
pub fn cubic_kernel_unnormalized(q: FT) -> FT {
    if q < 0.5 {
        6. * (q * q * q - q * q) + 1.
    } else if q < 1. {
        let v = 1. - q;
        2. * (v * v * v)
    } else {
        0.
    }
}

pub fn cubic_kernel_unnormalized_deriv(q: FT) -> FT {
    if q < 0.5 {
        18. * q * q - 12. * q
    } else if q < 1. {
        let v = 1. - q;
        -6. * v * v
    } else {
        0.
    }
}

fn cubic_kernel_norm_factor_2d(h: FT) -> FT {
    10. / (7. * PI * (h * h))
}

fn cubic_kernel_norm_factor_3d(h: FT) -> FT {
    1. / (PI * (h * h * h))
}

/**
 * r is the distance to the center.
 * h is the smoothing length, the support radius is 2h.
 */
pub fn cubic_kernel_2d(r: FT, h: FT) -> FT {
    cubic_kernel_norm_factor_2d(h) * cubic_kernel_unnormalized(r / (2. * h))
}
pub fn cubic_kernel_3d(r: FT, h: FT) -> FT {
    cubic_kernel_norm_factor_3d(h) * cubic_kernel_unnormalized(r / (2. * h))
}

/**
 * Radial derivative dW/dr.
 */
pub fn cubic_kernel_2d_deriv(r: FT, h: FT) -> FT {
    cubic_kernel_norm_factor_2d(h) * cubic_kernel_unnormalized_deriv(r / (2. * h)) / (2. * h)
}
pub fn cubic_kernel_3d_deriv(r: FT, h: FT) -> FT {
    cubic_kernel_norm_factor_3d(h) * cubic_kernel_unnormalized_deriv(r / (2. * h)) / (2. * h)
}

// Sync is needed since we use this trait inside parallel iterators
pub trait DimensionUtils<const D: usize>: Sync + Send + 'static {
    /// Calls `f` for every cell offset of the (2 * dist + 1)^D stencil, including the zero offset.
    fn iterate_grid_neighbors(dist: i32, f: impl FnMut(VI<D>));

    fn kernel(r: FT, h: FT) -> FT;
    fn kernel_deriv(r: FT, h: FT) -> FT;

    fn support_radius_by_smoothing_length() -> FT;
}

#[derive(Debug)]
pub enum DimensionUtils2d {}
impl DimensionUtils<2> for DimensionUtils2d {
    fn iterate_grid_neighbors(dist: i32, mut f: impl FnMut(VI<2>)) {
        for y in -dist..=dist {
            for x in -dist..=dist {
                f([x, y].into());
            }
        }
    }

    fn kernel(r: FT, h: FT) -> FT {
        cubic_kernel_2d(r, h)
    }

    fn kernel_deriv(r: FT, h: FT) -> FT {
        cubic_kernel_2d_deriv(r, h)
    }

    fn support_radius_by_smoothing_length() -> FT {
        2.
    }
}

#[derive(Debug)]
pub enum DimensionUtils3d {}
impl DimensionUtils<3> for DimensionUtils3d {
    fn iterate_grid_neighbors(dist: i32, mut f: impl FnMut(VI<3>)) {
        for z in -dist..=dist {
            for y in -dist..=dist {
                for x in -dist..=dist {
                    f([x, y, z].into());
                }
            }
        }
    }

    fn kernel(r: FT, h: FT) -> FT {
        cubic_kernel_3d(r, h)
    }

    fn kernel_deriv(r: FT, h: FT) -> FT {
        cubic_kernel_3d_deriv(r, h)
    }

    fn support_radius_by_smoothing_length() -> FT {
        2.
    }
}

/// Smoothing kernel of one body. Its cutoff radius is the interaction range used for neighbor search.
pub struct Kernel<DU: DimensionUtils<D>, const D: usize> {
    smoothing_length: FT,
    _marker: PhantomData<DU>,
}

impl<DU: DimensionUtils<D>, const D: usize> Clone for Kernel<DU, D> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<DU: DimensionUtils<D>, const D: usize> Copy for Kernel<DU, D> {}

impl<DU: DimensionUtils<D>, const D: usize> std::fmt::Debug for Kernel<DU, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("smoothing_length", &self.smoothing_length)
            .field("cutoff_radius", &self.cutoff_radius())
            .finish()
    }
}

impl<DU: DimensionUtils<D>, const D: usize> Kernel<DU, D> {
    pub fn new(smoothing_length: FT) -> SphResult<Self> {
        if !(smoothing_length > 0.) || !smoothing_length.is_finite() {
            return Err(SphError::NonPositiveSmoothingLength(smoothing_length));
        }
        Ok(Kernel {
            smoothing_length,
            _marker: PhantomData,
        })
    }

    /// Kernel whose support ends exactly at `cutoff_radius`.
    pub fn from_cutoff_radius(cutoff_radius: FT) -> SphResult<Self> {
        Self::new(cutoff_radius / DU::support_radius_by_smoothing_length())
    }

    pub fn smoothing_length(&self) -> FT {
        self.smoothing_length
    }

    pub fn cutoff_radius(&self) -> FT {
        self.smoothing_length * DU::support_radius_by_smoothing_length()
    }

    pub fn w(&self, r: FT) -> FT {
        DU::kernel(r, self.smoothing_length)
    }

    pub fn dw(&self, r: FT) -> FT {
        DU::kernel_deriv(r, self.smoothing_length)
    }
}

#[test]
fn cubic_kernel_2d_integration_test() {
    let h = 5.;
    let support_radius = 2.0 * h;
    let grid_size = 200;
    let square_len = 2. * support_radius / grid_size as FT;
    let square_area = square_len * square_len;

    let kernel = Kernel::<DimensionUtils2d, 2>::new(h).unwrap();
    let mut integral = 0.;

    for y in 0..grid_size {
        for x in 0..grid_size {
            let integration_point = crate::vec2f(
                (x as FT + 0.5) * square_len - support_radius,
                (y as FT + 0.5) * square_len - support_radius,
            );
            integral += kernel.w(integration_point.norm()) * square_area;
        }
    }

    let allow_deviation = 1.0001;
    assert!(1.0 / allow_deviation <= integral, "integral {}", integral);
    assert!(integral <= allow_deviation / 1.0, "integral {}", integral);
}

#[test]
fn cubic_kernel_derivative_test() {
    fn inner<DU: DimensionUtils<D>, const D: usize>() {
        let kernel = Kernel::<DU, D>::new(0.5).unwrap();
        let diff = kernel.cutoff_radius() * 1e-3;
        let samples = 97;
        for k in 1..samples {
            let r = kernel.cutoff_radius() * k as FT / samples as FT;
            let approx = (kernel.w(r + 0.5 * diff) - kernel.w(r - 0.5 * diff)) / diff;
            let analytical = kernel.dw(r);
            crate::assert_ft_approx_eq(analytical, approx, 0.01 * kernel.w(0.), || {
                format!("kernel derivative at r={}", r)
            });
        }
    }

    inner::<DimensionUtils2d, 2>();
    inner::<DimensionUtils3d, 3>();
}

#[test]
fn kernel_vanishes_outside_cutoff() {
    let kernel = Kernel::<DimensionUtils3d, 3>::from_cutoff_radius(1.2).unwrap();
    assert_eq!(kernel.cutoff_radius(), 1.2);
    assert_eq!(kernel.w(1.2), 0.);
    assert_eq!(kernel.w(5.), 0.);
    assert_eq!(kernel.dw(1.3), 0.);
    assert!(kernel.w(0.) > kernel.w(0.6));
}

#[test]
fn degenerate_smoothing_lengths_are_rejected() {
    for h in [0., -1., FT::NAN, FT::INFINITY] {
        assert!(matches!(
            Kernel::<DimensionUtils2d, 2>::new(h),
            Err(SphError::NonPositiveSmoothingLength(_))
        ));
    }
    assert!(Kernel::<DimensionUtils2d, 2>::from_cutoff_radius(0.).is_err());
}

#[test]
fn stencil_visits_every_offset_once() {
    let mut offsets = Vec::new();
    DimensionUtils3d::iterate_grid_neighbors(2, |o| offsets.push(o));
    assert_eq!(offsets.len(), 125);
    offsets.sort_by_key(|o| (o.x, o.y, o.z));
    offsets.dedup();
    assert_eq!(offsets.len(), 125);
}
