// config.rs — Pipeline configuration, loaded from TOML.
//
// Every field has a serde default, so an empty file (or no file) gives the
// stock pipeline:
//
// ```toml
// threshold = 0.5
// hard_threshold = true
// initial_colour = "red"
// fuzzy_band = 0.1
// run_normalisation = true
// show_normalised_sobels = false
//
// [display]
// columns = 4
// gap = 4
// scale = 1
// ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::colour::PaletteColour;
use crate::error::EdgeError;

/// Layout of the display-sink mosaic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Tiles per mosaic row.
    #[serde(default = "default_columns")]
    pub columns: u32,
    /// Pixels between tiles.
    #[serde(default = "default_gap")]
    pub gap: u32,
    /// Integer upscale of every tile.
    #[serde(default = "default_scale")]
    pub scale: u32,
}

fn default_columns() -> u32 { 4 }
fn default_gap() -> u32 { 4 }
fn default_scale() -> u32 { 1 }

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            columns: default_columns(),
            gap: default_gap(),
            scale: default_scale(),
        }
    }
}

/// Complete edge-pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_true")]
    pub hard_threshold: bool,
    #[serde(default = "default_colour")]
    pub initial_colour: PaletteColour,
    /// Half-width of the fuzzy threshold's smoothstep band.
    #[serde(default = "default_fuzzy_band")]
    pub fuzzy_band: f32,
    /// Run the two normalised-Sobel stages every frame.
    #[serde(default = "default_true")]
    pub run_normalisation: bool,
    /// Show the normalised Sobels in place of the raw ones.
    #[serde(default)]
    pub show_normalised_sobels: bool,
    #[serde(default)]
    pub display: DisplayConfig,
}

fn default_threshold() -> f32 { 0.5 }
fn default_true() -> bool { true }
fn default_colour() -> PaletteColour { PaletteColour::Red }
fn default_fuzzy_band() -> f32 { 0.1 }

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            hard_threshold: default_true(),
            initial_colour: default_colour(),
            fuzzy_band: default_fuzzy_band(),
            run_normalisation: default_true(),
            show_normalised_sobels: false,
            display: DisplayConfig::default(),
        }
    }
}

impl EdgeConfig {
    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, EdgeError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self, EdgeError> {
        let config: EdgeConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise defaults. A missing file falls back
    /// to defaults with a warning; a malformed one is still an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, EdgeError> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            Some(p) => {
                warn!(path = %p.display(), "configuration file not found, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), EdgeError> {
        if !(self.fuzzy_band > 0.0) {
            return Err(EdgeError::InvalidConfig(format!(
                "fuzzy_band must be positive, got {}",
                self.fuzzy_band
            )));
        }
        if !self.threshold.is_finite() {
            return Err(EdgeError::InvalidConfig("threshold must be finite".to_string()));
        }
        if self.display.columns == 0 {
            return Err(EdgeError::InvalidConfig("display.columns must be at least 1".to_string()));
        }
        if self.display.scale == 0 {
            return Err(EdgeError::InvalidConfig("display.scale must be at least 1".to_string()));
        }
        if self.show_normalised_sobels && !self.run_normalisation {
            return Err(EdgeError::InvalidConfig(
                "show_normalised_sobels requires run_normalisation".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let cfg = EdgeConfig::from_toml("").unwrap();
        assert_eq!(cfg, EdgeConfig::default());
        assert!(cfg.run_normalisation);
        assert!(!cfg.show_normalised_sobels);
    }

    #[test]
    fn test_partial_toml() {
        let cfg = EdgeConfig::from_toml(
            "threshold = 0.25\ninitial_colour = \"yellow\"\n[display]\ncolumns = 3\n",
        )
        .unwrap();
        assert_eq!(cfg.threshold, 0.25);
        assert_eq!(cfg.initial_colour, PaletteColour::Yellow);
        assert_eq!(cfg.display.columns, 3);
        assert_eq!(cfg.display.gap, 4);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            EdgeConfig::from_toml("fuzzy_band = 0.0"),
            Err(EdgeError::InvalidConfig(_))
        ));
        assert!(EdgeConfig::from_toml("[display]\ncolumns = 0").is_err());
        assert!(EdgeConfig::from_toml("[display]\nscale = 0").is_err());
        assert!(EdgeConfig::from_toml(
            "run_normalisation = false\nshow_normalised_sobels = true"
        )
        .is_err());
    }

    #[test]
    fn test_parse_error() {
        let err = EdgeConfig::from_toml("threshold = \"high\"").unwrap_err();
        assert!(matches!(err, EdgeError::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "hard_threshold = false").unwrap();
        let cfg = EdgeConfig::load(file.path()).unwrap();
        assert!(!cfg.hard_threshold);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let cfg = EdgeConfig::load_or_default(Some(Path::new("/nonexistent/edge.toml"))).unwrap();
        assert_eq!(cfg, EdgeConfig::default());
        assert_eq!(EdgeConfig::load_or_default(None).unwrap(), EdgeConfig::default());
    }

    #[test]
    fn test_toml_round_trip() {
        let cfg = EdgeConfig {
            threshold: 0.75,
            initial_colour: PaletteColour::Grey,
            ..EdgeConfig::default()
        };
        let text = cfg.to_toml().unwrap();
        assert_eq!(EdgeConfig::from_toml(&text).unwrap(), cfg);
    }
}
