// params.rs — Mutable per-frame parameters.
//
// The setters store values and never fail; nothing reaches the backend until
// the pipeline pushes them immediately before the stages that read them.

use tracing::debug;

use crate::colour::PaletteColour;
use crate::config::EdgeConfig;
use crate::image::Rgba;
use crate::threshold::ThresholdMode;

/// Threshold, threshold mode, fuzzy band and line colour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineParams {
    threshold: f32,
    hard_threshold: bool,
    fuzzy_band: f32,
    colour: PaletteColour,
}

impl Default for PipelineParams {
    fn default() -> Self {
        PipelineParams {
            threshold: 0.5,
            hard_threshold: true,
            fuzzy_band: 0.1,
            colour: PaletteColour::Red,
        }
    }
}

impl PipelineParams {
    pub fn from_config(config: &EdgeConfig) -> Self {
        PipelineParams {
            threshold: config.threshold,
            hard_threshold: config.hard_threshold,
            fuzzy_band: config.fuzzy_band,
            colour: config.initial_colour,
        }
    }

    /// Stored as given. Values outside [0, 1] are legal and simply mark
    /// everything or nothing as an edge.
    pub fn set_threshold(&mut self, value: f32) {
        debug!(threshold = value, "threshold set");
        self.threshold = value;
    }

    pub fn set_hard_threshold(&mut self, hard: bool) {
        debug!(hard, "threshold mode set");
        self.hard_threshold = hard;
    }

    /// Advance one palette step, wrapping after black.
    pub fn cycle_line_colour(&mut self) -> PaletteColour {
        self.colour = self.colour.next();
        debug!(colour = %self.colour, "line colour cycled");
        self.colour
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn hard_threshold(&self) -> bool {
        self.hard_threshold
    }

    pub fn mode(&self) -> ThresholdMode {
        ThresholdMode::from_hard_flag(self.hard_threshold)
    }

    pub fn fuzzy_band(&self) -> f32 {
        self.fuzzy_band
    }

    pub fn colour(&self) -> PaletteColour {
        self.colour
    }

    pub fn line_colour(&self) -> Rgba {
        self.colour.rgba()
    }
}
