// kernels.rs — The nine compute kernels: names, binding slots, parameters,
// and the CPU body of each.
//
// KERNEL TABLE
// ────────────
//   Kernel               input slots                  output slot              params
//   ───────────────────  ───────────────────────────  ───────────────────────  ───────────────────
//   Greyscale            input                        greyscale                —
//   HorizSobel           greyscale                    horiz_sobel              —
//   VertSobel            greyscale                    vert_sobel               —
//   CombSobel            horiz_sobel, vert_sobel      comb_sobel               —
//   Threshold            comb_sobel                   threshold                threshold
//   ThresholdFuzzy       comb_sobel                   threshold                threshold, fuzzy_band
//   Outline              input, threshold             outline                  line_colour
//   NormaliseHorizSobel  horiz_sobel                  horiz_sobel_normalised   —
//   NormaliseVertSobel   vert_sobel                   vert_sobel_normalised    —
//
// Slot order is also the GPU binding order: input slots take bindings 0 and
// 1 (a single-input kernel binds its input twice), the output slot takes
// binding 2, and the parameter uniform binding 3. See shaders/edge.wgsl.

use crate::convert::greyscale_at;
use crate::gradient::{magnitude_at, normalise_at, sobel_x_at, sobel_y_at};
use crate::image::{Image, Rgba};
use crate::outline::outline_at;
use crate::threshold::{fuzzy_at, hard_at};

/// Binding slot names.
pub mod slot {
    pub const INPUT: &str = "input";
    pub const GREYSCALE: &str = "greyscale";
    pub const HORIZ_SOBEL: &str = "horiz_sobel";
    pub const VERT_SOBEL: &str = "vert_sobel";
    pub const COMB_SOBEL: &str = "comb_sobel";
    pub const THRESHOLD: &str = "threshold";
    pub const OUTLINE: &str = "outline";
    pub const HORIZ_SOBEL_NORMALISED: &str = "horiz_sobel_normalised";
    pub const VERT_SOBEL_NORMALISED: &str = "vert_sobel_normalised";
}

/// Scalar parameter names accepted by `KernelBackend::set_float` /
/// `set_vector`.
pub mod param {
    pub const THRESHOLD: &str = "threshold";
    pub const FUZZY_BAND: &str = "fuzzy_band";
    pub const LINE_COLOUR: &str = "line_colour";
}

/// Every kernel the pipeline knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelKind {
    Greyscale,
    HorizSobel,
    VertSobel,
    CombSobel,
    Threshold,
    ThresholdFuzzy,
    Outline,
    NormaliseHorizSobel,
    NormaliseVertSobel,
}

impl KernelKind {
    pub const ALL: [KernelKind; 9] = [
        KernelKind::Greyscale,
        KernelKind::HorizSobel,
        KernelKind::VertSobel,
        KernelKind::CombSobel,
        KernelKind::Threshold,
        KernelKind::ThresholdFuzzy,
        KernelKind::Outline,
        KernelKind::NormaliseHorizSobel,
        KernelKind::NormaliseVertSobel,
    ];

    /// The name a backend resolves with `find_kernel`.
    pub fn name(self) -> &'static str {
        match self {
            KernelKind::Greyscale => "Greyscale",
            KernelKind::HorizSobel => "HorizSobel",
            KernelKind::VertSobel => "VertSobel",
            KernelKind::CombSobel => "CombSobel",
            KernelKind::Threshold => "Threshold",
            KernelKind::ThresholdFuzzy => "ThresholdFuzzy",
            KernelKind::Outline => "Outline",
            KernelKind::NormaliseHorizSobel => "NormaliseHorizSobel",
            KernelKind::NormaliseVertSobel => "NormaliseVertSobel",
        }
    }

    /// WGSL entry point in shaders/edge.wgsl.
    pub fn entry_point(self) -> &'static str {
        match self {
            KernelKind::Greyscale => "greyscale",
            KernelKind::HorizSobel => "horiz_sobel",
            KernelKind::VertSobel => "vert_sobel",
            KernelKind::CombSobel => "comb_sobel",
            KernelKind::Threshold => "threshold_hard",
            KernelKind::ThresholdFuzzy => "threshold_fuzzy",
            KernelKind::Outline => "outline",
            KernelKind::NormaliseHorizSobel => "normalise_horiz_sobel",
            KernelKind::NormaliseVertSobel => "normalise_vert_sobel",
        }
    }

    pub fn from_name(name: &str) -> Option<KernelKind> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Input slots, in binding order.
    pub fn input_slots(self) -> &'static [&'static str] {
        match self {
            KernelKind::Greyscale => &[slot::INPUT],
            KernelKind::HorizSobel | KernelKind::VertSobel => &[slot::GREYSCALE],
            KernelKind::CombSobel => &[slot::HORIZ_SOBEL, slot::VERT_SOBEL],
            KernelKind::Threshold | KernelKind::ThresholdFuzzy => &[slot::COMB_SOBEL],
            KernelKind::Outline => &[slot::INPUT, slot::THRESHOLD],
            KernelKind::NormaliseHorizSobel => &[slot::HORIZ_SOBEL],
            KernelKind::NormaliseVertSobel => &[slot::VERT_SOBEL],
        }
    }

    pub fn output_slot(self) -> &'static str {
        match self {
            KernelKind::Greyscale => slot::GREYSCALE,
            KernelKind::HorizSobel => slot::HORIZ_SOBEL,
            KernelKind::VertSobel => slot::VERT_SOBEL,
            KernelKind::CombSobel => slot::COMB_SOBEL,
            KernelKind::Threshold | KernelKind::ThresholdFuzzy => slot::THRESHOLD,
            KernelKind::Outline => slot::OUTLINE,
            KernelKind::NormaliseHorizSobel => slot::HORIZ_SOBEL_NORMALISED,
            KernelKind::NormaliseVertSobel => slot::VERT_SOBEL_NORMALISED,
        }
    }

    /// Binding position of a slot: inputs 0..n, output [`OUTPUT_BINDING`].
    pub fn slot_binding(self, name: &str) -> Option<u32> {
        if name == self.output_slot() {
            return Some(OUTPUT_BINDING);
        }
        self.input_slots()
            .iter()
            .position(|s| *s == name)
            .map(|i| i as u32)
    }

    /// Scalar parameters the kernel reads.
    pub fn params(self) -> &'static [&'static str] {
        match self {
            KernelKind::Threshold => &[param::THRESHOLD],
            KernelKind::ThresholdFuzzy => &[param::THRESHOLD, param::FUZZY_BAND],
            KernelKind::Outline => &[param::LINE_COLOUR],
            _ => &[],
        }
    }
}

impl std::fmt::Display for KernelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// GPU binding index of every kernel's output slot.
pub const OUTPUT_BINDING: u32 = 2;

/// Current values of the scalar parameters, as last pushed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelUniforms {
    pub threshold: f32,
    pub fuzzy_band: f32,
    pub line_colour: Rgba,
}

impl Default for KernelUniforms {
    fn default() -> Self {
        KernelUniforms {
            threshold: 0.5,
            fuzzy_band: 0.1,
            line_colour: Rgba::new(1.0, 0.0, 0.0, 1.0),
        }
    }
}

/// Evaluate one kernel at one pixel. `inputs` are in `input_slots()` order.
///
/// This is the CPU reference every GPU entry point is validated against.
#[inline]
pub fn eval_at(
    kind: KernelKind,
    inputs: &[&Image<Rgba>],
    u: &KernelUniforms,
    x: usize,
    y: usize,
) -> Rgba {
    match kind {
        KernelKind::Greyscale => greyscale_at(inputs[0], x, y),
        KernelKind::HorizSobel => Rgba::splat(sobel_x_at(inputs[0], x, y)),
        KernelKind::VertSobel => Rgba::splat(sobel_y_at(inputs[0], x, y)),
        KernelKind::CombSobel => Rgba::splat(magnitude_at(inputs[0], inputs[1], x, y)),
        KernelKind::Threshold => Rgba::splat(hard_at(inputs[0].get(x, y).r, u.threshold)),
        KernelKind::ThresholdFuzzy => {
            Rgba::splat(fuzzy_at(inputs[0].get(x, y).r, u.threshold, u.fuzzy_band))
        }
        KernelKind::Outline => outline_at(inputs[0].get(x, y), inputs[1].get(x, y).r, u.line_colour),
        KernelKind::NormaliseHorizSobel | KernelKind::NormaliseVertSobel => {
            Rgba::splat(normalise_at(inputs[0], x, y))
        }
    }
}
