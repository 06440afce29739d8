// gradient.rs — Sobel gradients, gradient magnitude, and display
// normalisation of signed gradients.
//
// The Sobel operators are the outer product of a derivative and a smoothing
// tap (the same separable pair the WGSL kernels unroll):
//
//   Sobel_x = smooth^T * deriv      Sobel_y = deriv^T * smooth
//     [-1 0 1]                        [-1 -2 -1]
//     [-2 0 2]                        [ 0  0  0]
//     [-1 0 1]                        [ 1  2  1]
//
// Input is the red channel of the Greyscale buffer (all three colour
// channels hold the same luma). Borders clamp to the nearest edge pixel.
// For input in [0, 1] each gradient lies in [-4, 4].

use crate::image::{Image, Rgba};

/// Derivative tap (along the gradient direction).
pub const SOBEL_DERIV: [f32; 3] = [-1.0, 0.0, 1.0];
/// Smoothing tap (across the gradient direction).
pub const SOBEL_SMOOTH: [f32; 3] = [1.0, 2.0, 1.0];

/// Half-width of the signed gradient range for unit-range input.
/// `normalise_at` maps [-NORMALISE_RANGE, NORMALISE_RANGE] onto [0, 1].
pub const NORMALISE_RANGE: f32 = 4.0;

/// Sobel-x response at (x, y). Positive where intensity increases to the
/// right.
#[inline]
pub fn sobel_x_at(grey: &Image<Rgba>, x: usize, y: usize) -> f32 {
    let (x, y) = (x as isize, y as isize);
    let mut acc = 0.0f32;
    for (j, &s) in SOBEL_SMOOTH.iter().enumerate() {
        for (i, &d) in SOBEL_DERIV.iter().enumerate() {
            if d != 0.0 {
                acc += s * d * grey.get_clamped(x + i as isize - 1, y + j as isize - 1).r;
            }
        }
    }
    acc
}

/// Sobel-y response at (x, y). Positive where intensity increases downward.
#[inline]
pub fn sobel_y_at(grey: &Image<Rgba>, x: usize, y: usize) -> f32 {
    let (x, y) = (x as isize, y as isize);
    let mut acc = 0.0f32;
    for (j, &d) in SOBEL_DERIV.iter().enumerate() {
        if d == 0.0 {
            continue;
        }
        for (i, &s) in SOBEL_SMOOTH.iter().enumerate() {
            acc += s * d * grey.get_clamped(x + i as isize - 1, y + j as isize - 1).r;
        }
    }
    acc
}

/// Euclidean magnitude of the two gradient buffers at (x, y).
#[inline]
pub fn magnitude_at(horiz: &Image<Rgba>, vert: &Image<Rgba>, x: usize, y: usize) -> f32 {
    let gx = horiz.get(x, y).r;
    let gy = vert.get(x, y).r;
    (gx * gx + gy * gy).sqrt()
}

/// Map a signed gradient onto [0, 1] for display: zero becomes mid-grey.
#[inline]
pub fn normalise_at(gradient: &Image<Rgba>, x: usize, y: usize) -> f32 {
    let g = gradient.get(x, y).r;
    (g / (2.0 * NORMALISE_RANGE) + 0.5).clamp(0.0, 1.0)
}

/// Whole-image Sobel-x, stored as opaque grey `(g, g, g, 1)`.
pub fn sobel_x(grey: &Image<Rgba>) -> Image<Rgba> {
    Image::from_fn(grey.width(), grey.height(), |x, y| Rgba::splat(sobel_x_at(grey, x, y)))
}

/// Whole-image Sobel-y, stored as opaque grey `(g, g, g, 1)`.
pub fn sobel_y(grey: &Image<Rgba>) -> Image<Rgba> {
    Image::from_fn(grey.width(), grey.height(), |x, y| Rgba::splat(sobel_y_at(grey, x, y)))
}

/// Whole-image gradient magnitude.
///
/// # Panics
/// Panics if the two gradient images differ in size.
pub fn magnitude(horiz: &Image<Rgba>, vert: &Image<Rgba>) -> Image<Rgba> {
    assert_eq!(horiz.dimensions(), vert.dimensions(), "gradient size mismatch");
    Image::from_fn(horiz.width(), horiz.height(), |x, y| {
        Rgba::splat(magnitude_at(horiz, vert, x, y))
    })
}

/// Whole-image display normalisation of a signed gradient.
pub fn normalise(gradient: &Image<Rgba>) -> Image<Rgba> {
    Image::from_fn(gradient.width(), gradient.height(), |x, y| {
        Rgba::splat(normalise_at(gradient, x, y))
    })
}
