use crate::image::{separable_filter, GrayFloatImage};
use ndarray::{azip, s, Array2, ArrayView2};

/// Central difference, `0.5 * (f(x + 1) - f(x - 1))`.
const CENTRAL: [f32; 3] = [-0.5, 0.0, 0.5];
/// Second difference, `f(x - 1) - 2 f(x) + f(x + 1)`.
const SECOND: [f32; 3] = [1.0, -2.0, 1.0];
const IDENTITY: [f32; 1] = [1.0];

/// The first and second order differential record of one image.
#[derive(Debug, Clone)]
pub struct Gradient {
    pub x: GrayFloatImage,
    pub y: GrayFloatImage,
    pub norm: GrayFloatImage,
    /// Direction of the gradient in turns, `[0, 1)`.
    pub phase: GrayFloatImage,
    /// Unnormalized Laplacian `Lxx + Lyy`.
    pub laplacian: GrayFloatImage,
}

pub fn derivative_x(image: &GrayFloatImage) -> GrayFloatImage {
    GrayFloatImage(separable_filter(&image.0, &CENTRAL, &IDENTITY))
}

pub fn derivative_y(image: &GrayFloatImage) -> GrayFloatImage {
    GrayFloatImage(separable_filter(&image.0, &IDENTITY, &CENTRAL))
}

pub fn laplacian(image: &GrayFloatImage) -> GrayFloatImage {
    let lxx = GrayFloatImage(separable_filter(&image.0, &SECOND, &IDENTITY));
    let mut lyy = GrayFloatImage(separable_filter(&image.0, &IDENTITY, &SECOND));
    lyy.mut_array2()
        .zip_mut_with(&lxx.ref_array2(), |acc, &xx| *acc += xx);
    lyy
}

/// Angle of `(x, y)` in turns, wrapped into `[0, 1)`.
pub fn phase_turns(x: f32, y: f32) -> f32 {
    let turns = y.atan2(x) / std::f32::consts::TAU;
    let wrapped = turns.rem_euclid(1.0);
    // rem_euclid can round up to exactly 1.0 for tiny negative inputs.
    if wrapped >= 1.0 {
        0.0
    } else {
        wrapped
    }
}

/// Compute the full gradient record of an image.
pub fn gradient(image: &GrayFloatImage) -> Gradient {
    let x = derivative_x(image);
    let y = derivative_y(image);
    let (norm, phase) = polar(x.ref_array2(), y.ref_array2());
    Gradient {
        laplacian: laplacian(image),
        norm: GrayFloatImage::from_array2(norm),
        phase: GrayFloatImage::from_array2(phase),
        x,
        y,
    }
}

/// Norm and phase (turns) of a vector field.
pub fn polar(x: ArrayView2<f32>, y: ArrayView2<f32>) -> (Array2<f32>, Array2<f32>) {
    let mut norm = Array2::zeros(x.dim());
    let mut phase = Array2::zeros(x.dim());
    azip!((n in &mut norm, p in &mut phase, &gx in &x, &gy in &y) {
        *n = (gx * gx + gy * gy).sqrt();
        *p = phase_turns(gx, gy);
    });
    (norm, phase)
}

/// Central-difference gradient of the interior of `samples`.
///
/// The output is one pixel smaller on every side, so a patch cropped with a
/// one pixel margin yields the gradient over the patch proper.
pub fn interior_gradient(samples: ArrayView2<f32>) -> (Array2<f32>, Array2<f32>) {
    let (rows, cols) = samples.dim();
    let dim = (rows.saturating_sub(2), cols.saturating_sub(2));
    let mut gx = Array2::zeros(dim);
    let mut gy = Array2::zeros(dim);
    if dim.0 == 0 || dim.1 == 0 {
        return (gx, gy);
    }
    azip!((
        out in &mut gx,
        &left in samples.slice(s![1..-1, ..-2]),
        &right in samples.slice(s![1..-1, 2..]),
    ) {
        *out = 0.5 * (right - left);
    });
    azip!((
        out in &mut gy,
        &up in samples.slice(s![..-2, 1..-1]),
        &down in samples.slice(s![2.., 1..-1]),
    ) {
        *out = 0.5 * (down - up);
    });
    (gx, gy)
}
