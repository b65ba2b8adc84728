//! Axial compression of 3D PET data, and the descriptors derived from it.
//!
//! A `Compression` owns the scanner it compresses for, plus the settings of
//! one acquisition/compression session. Every optional setting has a
//! documented default resolved deterministically from the scanner; nothing
//! is looked up globally. Derived descriptors are recomputed on demand by
//! pure functions, so changing a setting and re-deriving always reflects
//! the current state.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fov::Fov;
use crate::projdata::ProjDataGeometry;
use crate::scanner::Scanner;
use crate::space::ProjectionSpace;
use crate::Lengthf32;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Compression {
    pub scanner: Scanner,

    /// Axial compression (span): how many ring differences are merged into
    /// one axial position. Always odd; 1 means no axial compression.
    pub span: u32,

    /// Largest |ring difference| to include. `None` means everything the
    /// scanner has: `num_rings - 1`.
    pub max_num_segments: Option<u32>,

    /// Number of angular views. Fewer than half the detectors per ring
    /// subsamples the scanner's angular positions; more leaves empty cells.
    /// `None` means `num_dets_per_ring / 2`.
    pub num_of_views: Option<usize>,

    /// Number of tangential positions (the LOR's distance from the centre
    /// of the FOV). `None` picks the scanner default appropriate to
    /// `arc_corrected`.
    pub num_tangential_bins: Option<usize>,

    /// Whether the data were arc-corrected during acquisition or
    /// preprocessing. This crate never arc-corrects; it only needs to know.
    pub arc_corrected: bool,
}

impl Compression {

    pub fn new(scanner: Scanner) -> Self {
        Self {
            scanner,
            span: 1,
            max_num_segments: None,
            num_of_views: None,
            num_tangential_bins: None,
            arc_corrected: false,
        }
    }

    pub fn default_max_ring_diff(&self) -> u32 { self.scanner.num_rings - 1 }

    pub fn effective_max_ring_diff(&self) -> u32 {
        self.max_num_segments.unwrap_or_else(|| self.default_max_ring_diff())
    }

    pub fn effective_num_views(&self) -> usize {
        self.num_of_views.unwrap_or(self.scanner.num_dets_per_ring as usize / 2)
    }

    pub fn default_num_tangential(&self) -> usize {
        if self.arc_corrected {
            self.scanner.default_num_arccorrected_bins as usize
        } else {
            self.scanner.max_num_non_arccorrected_bins as usize
        }
    }

    pub fn effective_num_tangential(&self) -> usize {
        self.num_tangential_bins.unwrap_or_else(|| self.default_num_tangential())
    }

    /// Tangential sampling distance at the centre bin, in mm. Arc-corrected
    /// data sample at the scanner's default bin size; otherwise (or when the
    /// scanner reports a zero bin size) the sampling distance implied by the
    /// detector pitch at the effective radius is used.
    pub fn tangential_sampling(&self) -> Lengthf32 {
        if self.arc_corrected && self.scanner.default_bin_size > 0.0 {
            self.scanner.default_bin_size
        } else {
            self.centre_bin_sampling()
        }
    }

    fn centre_bin_sampling(&self) -> Lengthf32 {
        self.scanner.effective_radius() * PI / self.scanner.num_dets_per_ring as Lengthf32
    }

    /// Derive the full projection-data geometry for the current settings.
    /// Pure: identical settings yield identical (and `==`-comparable)
    /// geometries.
    pub fn projection_data_geometry(&self) -> Result<ProjDataGeometry> {
        ProjDataGeometry::derive(
            &self.scanner,
            self.span,
            self.effective_max_ring_diff(),
            self.effective_num_views(),
            self.effective_num_tangential(),
            self.arc_corrected,
            self.tangential_sampling(),
        )
    }

    /// Ordered `(segment, axial size)` pairs of the derived geometry.
    pub fn sinogram_info(&self) -> Result<Vec<(i32, usize)>> {
        Ok(self.projection_data_geometry()?.sinogram_info())
    }

    /// Flat sinogram offset of `(segment, axial)` in the derived geometry.
    pub fn sinogram_offset(&self, segment: i32, axial: usize) -> Result<Option<usize>> {
        Ok(self.projection_data_geometry()?.sinogram_offset(segment, axial))
    }

    /// The canonical operator range for the current settings.
    pub fn projection_space(&self, radius: f32) -> Result<ProjectionSpace> {
        Ok(ProjectionSpace::from_proj_geometry(&self.projection_data_geometry()?, radius))
    }

    /// Derive the image volume the projection data spans.
    ///
    /// Any size component equal to the sentinel `-1` is auto-derived:
    ///
    /// + z: the segment-0 axial count `N0` when segment 0 is axially
    ///   compressed (span > 1), else `2*N0 - 1`;
    /// + x/y: the diameter of the tangential field of view divided by the
    ///   in-plane voxel size.
    ///
    /// In-plane voxel size is `default_bin_size / zoom` so that it does not
    /// depend on whether arc correction is used; a scanner reporting a zero
    /// bin size falls back to the centre-bin tangential sampling distance.
    /// Axial voxel size is half the ring spacing.
    ///
    /// Warning: the x/y auto-sizing is known not to reliably reproduce a
    /// projection engine's own defaulting in all cases (the z size is
    /// dependable). Pass explicit x/y sizes for production use until this
    /// has been validated against the engine at hand.
    pub fn volume_geometry(&self,
                           zoom: f32,
                           sizes: Option<[i32; 3]>,
                           offset: Option<[Lengthf32; 3]>,
    ) -> Result<Fov> {
        if !(zoom > 0.0) {
            return Err(Error::InvalidCompression(format!("zoom must be positive, got {zoom}")));
        }
        let sizes = sizes.unwrap_or([-1, -1, -1]);
        for s in sizes {
            if s < -1 || s == 0 {
                return Err(Error::InvalidCompression(
                    format!("volume sizes must be positive or the -1 sentinel, got {sizes:?}")));
            }
        }
        let offset = offset.unwrap_or([0.0; 3]);

        let geometry = self.projection_data_geometry()?;
        let n0 = geometry.num_axial_poss(0).expect("segment 0 is always present");

        let bin = if self.scanner.default_bin_size > 0.0 {
            self.scanner.default_bin_size
        } else {
            self.centre_bin_sampling()
        };
        let voxel_xy = bin / zoom;
        let voxel_z = self.scanner.ring_spacing / 2.0;

        let fov_diameter = geometry.num_tangential_poss() as f32 * geometry.tangential_sampling;
        let auto_xy = ((fov_diameter / voxel_xy).ceil() as usize).max(1);
        let auto_z = if self.span > 1 { n0 } else { 2 * n0 - 1 };

        let pick = |requested: i32, auto: usize| {
            if requested >= 0 { requested as usize } else { auto }
        };
        let n = [pick(sizes[0], auto_xy), pick(sizes[1], auto_xy), pick(sizes[2], auto_z)];
        Ok(Fov::from_spacing(n, [voxel_xy, voxel_xy, voxel_z], offset))
    }
}
