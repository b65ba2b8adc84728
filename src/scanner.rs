//! Physical description of a ring-detector PET scanner.
//!
//! A `Scanner` is immutable after construction: it is either built from a
//! named preset in the registry, or from an explicit `ScannerParameters`
//! record. Both paths run the same consistency predicate and fail rather
//! than hand back a half-valid geometry.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::Lengthf32;

/// Names accepted by [`Scanner::from_name`].
pub const SCANNER_NAMES: [&str; 2] = ["mCT", "ECAT HR+"];

/// Explicit construction parameters for a [`Scanner`].
///
/// Block, bucket, layer and singles-unit counts default to 1 (an explicit
/// singles-unit count of 0 means "not modelled" and disables those
/// divisibility checks); the intrinsic tilt defaults to 0. The tangential-bin fields
/// default from the detector count: `max_num_non_arccorrected_bins` to
/// `num_dets_per_ring / 2` (roughly the number of detectors across the
/// diameter) and `default_num_arccorrected_bins` to the same value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScannerParameters {
    pub num_rings: u32,
    pub num_dets_per_ring: u32,
    /// Radius of the crystal surface, in mm
    pub inner_ring_radius: Lengthf32,
    /// Centre-to-centre axial distance between rings, in mm
    pub ring_spacing: Lengthf32,
    /// Average depth of interaction inside the crystal, in mm
    pub average_depth_of_interaction: Lengthf32,
    /// Default width of an arc-corrected tangential bin, in mm
    pub default_bin_size: Lengthf32,
    #[serde(default)]
    pub intrinsic_tilt: f32,
    #[serde(default = "one")]
    pub axial_crystals_per_block: u32,
    #[serde(default = "one")]
    pub trans_crystals_per_block: u32,
    #[serde(default = "one")]
    pub axial_blocks_per_bucket: u32,
    #[serde(default = "one")]
    pub trans_blocks_per_bucket: u32,
    #[serde(default = "one")]
    pub axial_crystals_per_singles_unit: u32,
    #[serde(default = "one")]
    pub trans_crystals_per_singles_unit: u32,
    #[serde(default = "one")]
    pub num_detector_layers: u32,
    #[serde(default)]
    pub max_num_non_arccorrected_bins: Option<u32>,
    #[serde(default)]
    pub default_num_arccorrected_bins: Option<u32>,
}

fn one() -> u32 { 1 }

/// Validated, immutable scanner geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scanner {
    pub num_rings: u32,
    pub num_dets_per_ring: u32,
    pub inner_ring_radius: Lengthf32,
    pub ring_spacing: Lengthf32,
    pub average_depth_of_interaction: Lengthf32,
    pub default_bin_size: Lengthf32,
    pub default_num_arccorrected_bins: u32,
    pub max_num_non_arccorrected_bins: u32,
    pub intrinsic_tilt: f32,
    pub axial_crystals_per_block: u32,
    pub trans_crystals_per_block: u32,
    pub axial_blocks_per_bucket: u32,
    pub trans_blocks_per_bucket: u32,
    pub axial_crystals_per_singles_unit: u32,
    pub trans_crystals_per_singles_unit: u32,
    pub num_detector_layers: u32,
}

impl Scanner {

    /// Look up a named preset. Fails with [`Error::UnknownScanner`] for
    /// anything not in [`SCANNER_NAMES`].
    pub fn from_name(name: &str) -> Result<Self> {
        let params = match name.trim() {
            "mCT"      => mct_parameters(),
            "ECAT HR+" => ecat_hr_plus_parameters(),
            other      => return Err(Error::UnknownScanner(other.to_string())),
        };
        Self::from_parameters(params)
    }

    /// Construct from explicit parameters, resolving defaults and running
    /// the consistency predicate. Construction is atomic: either a fully
    /// valid geometry or an error.
    pub fn from_parameters(params: ScannerParameters) -> Result<Self> {
        let max_non_arc = params.max_num_non_arccorrected_bins
            .unwrap_or(params.num_dets_per_ring / 2);
        let default_arc = params.default_num_arccorrected_bins
            .unwrap_or(max_non_arc);
        let scanner = Scanner {
            num_rings: params.num_rings,
            num_dets_per_ring: params.num_dets_per_ring,
            inner_ring_radius: params.inner_ring_radius,
            ring_spacing: params.ring_spacing,
            average_depth_of_interaction: params.average_depth_of_interaction,
            default_bin_size: params.default_bin_size,
            default_num_arccorrected_bins: default_arc,
            max_num_non_arccorrected_bins: max_non_arc,
            intrinsic_tilt: params.intrinsic_tilt,
            axial_crystals_per_block: params.axial_crystals_per_block,
            trans_crystals_per_block: params.trans_crystals_per_block,
            axial_blocks_per_bucket: params.axial_blocks_per_bucket,
            trans_blocks_per_bucket: params.trans_blocks_per_bucket,
            axial_crystals_per_singles_unit: params.axial_crystals_per_singles_unit,
            trans_crystals_per_singles_unit: params.trans_crystals_per_singles_unit,
            num_detector_layers: params.num_detector_layers,
        };
        scanner.check_consistency()?;
        debug!(rings = scanner.num_rings, dets = scanner.num_dets_per_ring,
               "constructed scanner geometry");
        Ok(scanner)
    }

    /// The consistency predicate: positive counts, radii and spacings, and
    /// block/bucket crystal products dividing the per-ring detector count
    /// (transaxially) and the ring count (axially). Singles-unit counts
    /// participate only when non-zero (zero means "not modelled").
    pub fn check_consistency(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::GeometryConsistency(msg));

        if self.num_rings == 0          { return fail("num_rings must be positive".into()); }
        if self.num_dets_per_ring == 0  { return fail("num_dets_per_ring must be positive".into()); }
        if self.num_detector_layers == 0 { return fail("num_detector_layers must be positive".into()); }
        if !(self.inner_ring_radius > 0.0) {
            return fail(format!("inner_ring_radius must be positive, got {}", self.inner_ring_radius));
        }
        if !(self.ring_spacing > 0.0) {
            return fail(format!("ring_spacing must be positive, got {}", self.ring_spacing));
        }
        if self.average_depth_of_interaction < 0.0 {
            return fail(format!("average_depth_of_interaction must not be negative, got {}",
                                self.average_depth_of_interaction));
        }
        if self.default_bin_size < 0.0 {
            return fail(format!("default_bin_size must not be negative, got {}", self.default_bin_size));
        }
        if self.max_num_non_arccorrected_bins == 0 {
            return fail("max_num_non_arccorrected_bins must be positive".into());
        }
        if self.default_num_arccorrected_bins == 0 {
            return fail("default_num_arccorrected_bins must be positive".into());
        }
        if !self.intrinsic_tilt.is_finite() {
            return fail("intrinsic_tilt must be finite".into());
        }

        let trans_per_bucket = self.trans_crystals_per_block * self.trans_blocks_per_bucket;
        if self.trans_crystals_per_block > 0 &&
            self.num_dets_per_ring % self.trans_crystals_per_block != 0 {
            return fail(format!("{} detectors per ring not divisible into transaxial blocks of {}",
                                self.num_dets_per_ring, self.trans_crystals_per_block));
        }
        if trans_per_bucket > 0 && self.num_dets_per_ring % trans_per_bucket != 0 {
            return fail(format!("{} detectors per ring not divisible into transaxial buckets of {}",
                                self.num_dets_per_ring, trans_per_bucket));
        }

        let axial_per_bucket = self.axial_crystals_per_block * self.axial_blocks_per_bucket;
        if self.axial_crystals_per_block > 0 &&
            self.num_rings % self.axial_crystals_per_block != 0 {
            return fail(format!("{} rings not divisible into axial blocks of {}",
                                self.num_rings, self.axial_crystals_per_block));
        }
        if axial_per_bucket > 0 && self.num_rings % axial_per_bucket != 0 {
            return fail(format!("{} rings not divisible into axial buckets of {}",
                                self.num_rings, axial_per_bucket));
        }

        if self.trans_crystals_per_singles_unit > 0 &&
            self.num_dets_per_ring % self.trans_crystals_per_singles_unit != 0 {
            return fail(format!("{} detectors per ring not divisible into singles units of {}",
                                self.num_dets_per_ring, self.trans_crystals_per_singles_unit));
        }
        if self.axial_crystals_per_singles_unit > 0 &&
            self.num_rings % self.axial_crystals_per_singles_unit != 0 {
            return fail(format!("{} rings not divisible into axial singles units of {}",
                                self.num_rings, self.axial_crystals_per_singles_unit));
        }

        Ok(())
    }

    /// Radius at which LORs effectively originate: crystal surface plus the
    /// average depth of interaction.
    pub fn effective_radius(&self) -> Lengthf32 {
        self.inner_ring_radius + self.average_depth_of_interaction
    }

    /// Axial extent of the detector, in mm.
    pub fn axial_length(&self) -> Lengthf32 {
        self.num_rings as Lengthf32 * self.ring_spacing
    }

    /// Axial position of ring coordinate `r`, with the scanner centred on
    /// the origin. Fractional coordinates address the interleaved axial
    /// positions of merged segments.
    pub fn ring_z(&self, r: Lengthf32) -> Lengthf32 {
        (r - (self.num_rings as Lengthf32 - 1.0) / 2.0) * self.ring_spacing
    }
}

/// The small Siemens mCT-like benchtop geometry used throughout the tests.
fn mct_parameters() -> ScannerParameters {
    ScannerParameters {
        num_rings: 8,
        num_dets_per_ring: 112,
        inner_ring_radius: 57.5,
        ring_spacing: 6.25,
        average_depth_of_interaction: 7.0,
        default_bin_size: 1.65,
        intrinsic_tilt: 0.0,
        axial_crystals_per_block: 8,
        trans_crystals_per_block: 7,
        axial_blocks_per_bucket: 1,
        trans_blocks_per_bucket: 16,
        axial_crystals_per_singles_unit: 8,
        trans_crystals_per_singles_unit: 0,
        num_detector_layers: 1,
        max_num_non_arccorrected_bins: None,
        default_num_arccorrected_bins: None,
    }
}

/// A full-size whole-body geometry in the ECAT HR+ mould.
fn ecat_hr_plus_parameters() -> ScannerParameters {
    ScannerParameters {
        num_rings: 32,
        num_dets_per_ring: 576,
        inner_ring_radius: 412.0,
        ring_spacing: 2.425,
        average_depth_of_interaction: 7.0,
        default_bin_size: 2.25,
        intrinsic_tilt: 0.0,
        axial_crystals_per_block: 8,
        trans_crystals_per_block: 8,
        axial_blocks_per_bucket: 4,
        trans_blocks_per_bucket: 9,
        axial_crystals_per_singles_unit: 8,
        trans_crystals_per_singles_unit: 72,
        num_detector_layers: 1,
        max_num_non_arccorrected_bins: Some(288),
        default_num_arccorrected_bins: Some(288),
    }
}
