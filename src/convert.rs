// convert.rs — Colour conversions between frames, pipeline buffers and
// display formats.
//
//   RGBA8 frame (image crate) → Image<Rgba>    (Origin upload)
//   Image<Rgba>               → luma          (Greyscale stage)
//   Image<T: Pixel>           → RGBA8 / 0RGB  (PNG snapshots, minifb tiles)
//
// All pipeline buffers are linear f32. Display conversions clamp to [0, 1]
// before quantising, so signed Sobel values show as black where negative.

use crate::image::{Image, Pixel, Rgba};

/// ITU-R BT.601 luma coefficients: Y = 0.299 R + 0.587 G + 0.114 B.
pub const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Luma of one pixel. Alpha is ignored.
#[inline]
pub fn luma(c: Rgba) -> f32 {
    LUMA_WEIGHTS[0] * c.r + LUMA_WEIGHTS[1] * c.g + LUMA_WEIGHTS[2] * c.b
}

/// Greyscale kernel body: `(l, l, l, 1)` at (x, y).
#[inline]
pub fn greyscale_at(src: &Image<Rgba>, x: usize, y: usize) -> Rgba {
    Rgba::splat(luma(src.get(x, y)))
}

/// Whole-image greyscale conversion.
pub fn greyscale(src: &Image<Rgba>) -> Image<Rgba> {
    Image::from_fn(src.width(), src.height(), |x, y| greyscale_at(src, x, y))
}

/// Convert an 8-bit RGBA frame to a linear f32 pipeline image.
/// Channel values map 0 → 0.0, 255 → 1.0.
pub fn rgba8_to_image(src: &image::RgbaImage) -> Image<Rgba> {
    let (w, h) = src.dimensions();
    Image::from_fn(w as usize, h as usize, |x, y| {
        let p = src.get_pixel(x as u32, y as u32).0;
        Rgba::new(
            p[0] as f32 / 255.0,
            p[1] as f32 / 255.0,
            p[2] as f32 / 255.0,
            p[3] as f32 / 255.0,
        )
    })
}

/// Quantise one channel: clamp to [0, 1], scale to [0, 255], round.
#[inline]
pub fn quantise(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Convert any image to 8-bit RGBA, e.g. to write a buffer as PNG.
pub fn to_rgba8<T: Pixel>(src: &Image<T>) -> image::RgbaImage {
    let mut out = image::RgbaImage::new(src.width() as u32, src.height() as u32);
    for (x, y, v) in src.pixels() {
        let c = v.to_rgba();
        out.put_pixel(
            x as u32,
            y as u32,
            image::Rgba([quantise(c.r), quantise(c.g), quantise(c.b), quantise(c.a)]),
        );
    }
    out
}

/// Pack a pixel as `0x00RRGGBB`, the framebuffer format minifb expects.
/// Alpha is dropped.
#[inline]
pub fn pack_0rgb(c: Rgba) -> u32 {
    ((quantise(c.r) as u32) << 16) | ((quantise(c.g) as u32) << 8) | quantise(c.b) as u32
}
