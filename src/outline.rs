// outline.rs — Composite detected edges over the source frame.
//
//   rgb = mix(origin.rgb, line.rgb, e * line.a),   alpha = 1
//
// With a hard threshold this paints edge pixels in the line colour and
// leaves everything else untouched; a fuzzy threshold blends.

use crate::image::{Image, Rgba};

#[inline]
fn mix(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

/// Outline kernel body.
#[inline]
pub fn outline_at(origin: Rgba, edge: f32, line: Rgba) -> Rgba {
    let t = edge * line.a;
    Rgba::new(
        mix(origin.r, line.r, t),
        mix(origin.g, line.g, t),
        mix(origin.b, line.b, t),
        1.0,
    )
}

/// Whole-image outline composite.
///
/// # Panics
/// Panics if `origin` and `edges` differ in size.
pub fn outline(origin: &Image<Rgba>, edges: &Image<Rgba>, line: Rgba) -> Image<Rgba> {
    assert_eq!(origin.dimensions(), edges.dimensions(), "outline size mismatch");
    Image::from_fn(origin.width(), origin.height(), |x, y| {
        outline_at(origin.get(x, y), edges.get(x, y).r, line)
    })
}
