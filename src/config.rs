//! Configuration file parser for projector setup.
//!
//! A config file describes one scanner (preset name or explicit
//! parameters), optional compression settings and optional projector knobs:
//!
//! ```toml
//! [scanner]
//! name = "mCT"
//!
//! [compression]
//! span = 3
//! arc_corrected = false
//!
//! [projector]
//! num_tangential_lors = 2
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::compression::Compression;
use crate::engine::SymmetryFlags;
use crate::error::Result;
use crate::projector::ProjectorOptions;
use crate::scanner::{Scanner, ScannerParameters};

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub compression: CompressionConfig,

    #[serde(default)]
    pub projector: ProjectorConfig,
}

/// Either `name = "..."` for a registry preset, or the full parameter record.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum ScannerConfig {
    Preset { name: String },
    Parameters(ScannerParameters),
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct CompressionConfig {
    #[serde(default = "default_span")]
    pub span: u32,
    #[serde(default)]
    pub max_num_segments: Option<u32>,
    #[serde(default)]
    pub num_of_views: Option<usize>,
    #[serde(default)]
    pub num_tangential_bins: Option<usize>,
    #[serde(default)]
    pub arc_corrected: bool,
}

fn default_span() -> u32 { 1 }

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            span: 1,
            max_num_segments: None,
            num_of_views: None,
            num_tangential_bins: None,
            arc_corrected: false,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ProjectorConfig {
    #[serde(default)]
    pub symmetries: SymmetryFlags,
    #[serde(default = "default_num_tangential_lors")]
    pub num_tangential_lors: usize,
    #[serde(default)]
    pub verbosity: i32,
}

fn default_num_tangential_lors() -> usize { 1 }

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            symmetries: SymmetryFlags::default(),
            num_tangential_lors: 1,
            verbosity: 0,
        }
    }
}

impl Config {

    pub fn scanner(&self) -> Result<Scanner> {
        match &self.scanner {
            ScannerConfig::Preset { name } => Scanner::from_name(name),
            ScannerConfig::Parameters(params) => Scanner::from_parameters(params.clone()),
        }
    }

    pub fn compression(&self) -> Result<Compression> {
        let mut compression = Compression::new(self.scanner()?);
        compression.span = self.compression.span;
        compression.max_num_segments = self.compression.max_num_segments;
        compression.num_of_views = self.compression.num_of_views;
        compression.num_tangential_bins = self.compression.num_tangential_bins;
        compression.arc_corrected = self.compression.arc_corrected;
        Ok(compression)
    }

    pub fn projector_options(&self) -> ProjectorOptions {
        ProjectorOptions {
            symmetries: self.projector.symmetries,
            num_tangential_lors: self.projector.num_tangential_lors,
            verbosity: self.projector.verbosity,
        }
    }
}

pub fn read_config_file(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&text)?)
}

// ------------------------------ TESTS ------------------------------
#[cfg(test)]
mod test {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn preset_scanner_with_defaults_everywhere() {
        let config: Config = toml::from_str(r#"
            [scanner]
            name = "mCT"
        "#).unwrap();
        let compression = config.compression().unwrap();
        assert_eq!(compression.span, 1);
        assert_eq!(compression.scanner.num_rings, 8);
        assert_eq!(config.projector_options(), ProjectorOptions::default());
    }

    #[test]
    fn explicit_scanner_parameters() {
        let config: Config = toml::from_str(r#"
            [scanner]
            num_rings = 4
            num_dets_per_ring = 16
            inner_ring_radius = 50.0
            ring_spacing = 4.0
            average_depth_of_interaction = 0.0
            default_bin_size = 5.0

            [compression]
            span = 3
            max_num_segments = 2
        "#).unwrap();
        let compression = config.compression().unwrap();
        assert_eq!(compression.scanner.num_rings, 4);
        assert_eq!(compression.span, 3);
        assert_eq!(compression.max_num_segments, Some(2));
    }

    #[test]
    fn projector_knobs_are_read() {
        let config: Config = toml::from_str(r#"
            [scanner]
            name = "mCT"

            [projector]
            num_tangential_lors = 3
            verbosity = 2

            [projector.symmetries]
            swap_segment = false
        "#).unwrap();
        let options = config.projector_options();
        assert_eq!(options.num_tangential_lors, 3);
        assert_eq!(options.verbosity, 2);
        assert!(!options.symmetries.swap_segment);
        assert!(options.symmetries.phi_90);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: std::result::Result<Config, _> = toml::from_str(r#"
            [scanner]
            name = "mCT"

            [compression]
            spam = 3
        "#);
        assert!(result.is_err());
    }
}
