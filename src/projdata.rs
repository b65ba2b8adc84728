//! Derived geometry of axially-compressed projection data.
//!
//! A [`ProjDataGeometry`] is a pure value recomputed on demand from a
//! scanner and a set of compression choices; it is never mutated in place.
//! The segment/axial bookkeeping here must agree, segment by segment, with
//! what a projection engine given the same (span, max ring difference,
//! ring count) would produce, because all downstream shape checks depend
//! on it.
//!
//! Sizing rules:
//!
//! + span 1: segment `k` holds ring difference `k` exactly and has
//!   `num_rings - |k|` axial positions, one per ring pair.
//!
//! + span > 1: segment `k` merges the ring differences within
//!   `k*span ± (span-1)/2` (the outermost segment truncated to the maximum
//!   ring difference). Axial positions then interleave ring pairs at half
//!   ring spacing: segment 0 has `2*num_rings - 1` of them, segment `k`
//!   loses two per unit of its smallest |ring difference|.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::scanner::Scanner;
use crate::Lengthf32;

/// One segment (ring-difference group) of the compressed data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentGeometry {
    /// Segment index; 0 holds the direct sinograms.
    pub segment: i32,
    /// Smallest ring difference merged into this segment.
    pub min_ring_diff: i32,
    /// Largest ring difference merged into this segment.
    pub max_ring_diff: i32,
    /// Number of axial positions (sinograms) in this segment.
    pub num_axial_poss: usize,
}

/// Time-frame bookkeeping attached to projection-data buffers.
///
/// Unless doing motion correction or list-mode work (out of scope here) a
/// single `[0, 1]` frame is all an engine needs to be told.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExamInfo {
    pub time_frame: (f32, f32),
}

impl Default for ExamInfo {
    fn default() -> Self { Self { time_frame: (0.0, 1.0) } }
}

/// Full description of a compressed projection-data set: the segment list
/// with per-segment axial sizes, the angular and tangential discretization,
/// and the scanner it was derived from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjDataGeometry {
    pub scanner: Scanner,
    /// Axial compression factor (odd; 1 = no compression).
    pub span: u32,
    /// Largest |ring difference| included in any segment.
    pub max_ring_diff: u32,
    /// Whether the data have been arc-corrected (by acquisition or
    /// preprocessing; never by this crate).
    pub arc_corrected: bool,
    /// Tangential sampling distance at the centre bin, in mm.
    pub tangential_sampling: Lengthf32,
    segments: Vec<SegmentGeometry>,
    num_views: usize,
    num_tangential_poss: usize,
}

impl ProjDataGeometry {

    /// Derive the geometry. This is a pure function of its inputs: calling
    /// it twice yields equal values.
    pub fn derive(scanner: &Scanner,
                  span: u32,
                  max_ring_diff: u32,
                  num_views: usize,
                  num_tangential_poss: usize,
                  arc_corrected: bool,
                  tangential_sampling: Lengthf32,
    ) -> Result<Self> {
        if span == 0 || span % 2 == 0 {
            return Err(Error::InvalidCompression(
                format!("span must be a positive odd integer, got {span}")));
        }
        // `>=` rather than `> num_rings - 1`: the scanner may come from an
        // unvalidated source, and `num_rings - 1` underflows at zero rings.
        if max_ring_diff >= scanner.num_rings {
            return Err(Error::InvalidCompression(
                format!("max ring difference {} does not fit in {} rings",
                        max_ring_diff, scanner.num_rings)));
        }
        if num_views == 0 {
            return Err(Error::InvalidCompression("number of views must be positive".into()));
        }
        if num_tangential_poss == 0 {
            return Err(Error::InvalidCompression("number of tangential bins must be positive".into()));
        }

        let rings = scanner.num_rings as i64;
        let half = (span as i64 - 1) / 2;
        let max_delta = max_ring_diff as i64;

        // Largest segment index whose smallest |ring difference| still fits
        // under the requested maximum.
        let max_segment: i64 = if span == 1 { max_delta } else { (max_delta + half) / span as i64 };

        let mut segments = Vec::with_capacity((2 * max_segment + 1) as usize);
        for k in -max_segment..=max_segment {
            let centre = k * span as i64;
            let min_rd = (centre - half).max(-max_delta);
            let max_rd = (centre + half).min(max_delta);
            let num_axial_poss = if min_rd == max_rd {
                // Single ring difference: one axial position per ring pair.
                (rings - min_rd.abs()) as usize
            } else {
                // Merged differences interleave ring pairs at half spacing;
                // two positions are lost per unit of the smallest |difference|.
                let d_min_abs = if min_rd <= 0 && max_rd >= 0 { 0 }
                                else { min_rd.abs().min(max_rd.abs()) };
                (2 * rings - 1 - 2 * d_min_abs) as usize
            };
            segments.push(SegmentGeometry {
                segment: k as i32,
                min_ring_diff: min_rd as i32,
                max_ring_diff: max_rd as i32,
                num_axial_poss,
            });
        }

        let geometry = Self {
            scanner: scanner.clone(),
            span,
            max_ring_diff,
            arc_corrected,
            tangential_sampling,
            segments,
            num_views,
            num_tangential_poss,
        };
        debug!(span, max_ring_diff,
               segments = geometry.segments.len(),
               sinograms = geometry.num_sinograms(),
               "derived projection-data geometry");
        Ok(geometry)
    }

    pub fn min_segment(&self) -> i32 { self.segments[0].segment }
    pub fn max_segment(&self) -> i32 { self.segments[self.segments.len() - 1].segment }
    pub fn num_segments(&self) -> usize { self.segments.len() }
    pub fn num_views(&self) -> usize { self.num_views }
    pub fn num_tangential_poss(&self) -> usize { self.num_tangential_poss }

    pub fn segments(&self) -> &[SegmentGeometry] { &self.segments }

    pub fn segment(&self, segment: i32) -> Option<&SegmentGeometry> {
        let offset = segment - self.min_segment();
        if offset < 0 { return None; }
        self.segments.get(offset as usize)
    }

    /// Number of axial positions in `segment`, if it exists.
    pub fn num_axial_poss(&self, segment: i32) -> Option<usize> {
        self.segment(segment).map(|s| s.num_axial_poss)
    }

    /// Total number of 2D sinograms across all segments.
    pub fn num_sinograms(&self) -> usize {
        self.segments.iter().map(|s| s.num_axial_poss).sum()
    }

    /// Ordered `(segment, axial size)` pairs, in segment-index order.
    pub fn sinogram_info(&self) -> Vec<(i32, usize)> {
        self.segments.iter().map(|s| (s.segment, s.num_axial_poss)).collect()
    }

    /// Flat sinogram index of `(segment, axial)`: the axial sizes of all
    /// preceding segments, in segment-index order, plus `axial`. Total and
    /// gap-free over the valid pairs.
    pub fn sinogram_offset(&self, segment: i32, axial: usize) -> Option<usize> {
        let target = self.segment(segment)?;
        if axial >= target.num_axial_poss { return None; }
        let preceding: usize = self.segments.iter()
            .take_while(|s| s.segment < segment)
            .map(|s| s.num_axial_poss)
            .sum();
        Some(preceding + axial)
    }

    /// Inverse of [`Self::sinogram_offset`].
    pub fn segment_and_axial(&self, sinogram: usize) -> Option<(i32, usize)> {
        let mut remaining = sinogram;
        for s in &self.segments {
            if remaining < s.num_axial_poss { return Some((s.segment, remaining)); }
            remaining -= s.num_axial_poss;
        }
        None
    }

    /// Buffer shape of the compressed data: (sinogram, view, tangential).
    pub fn shape(&self) -> [usize; 3] {
        [self.num_sinograms(), self.num_views, self.num_tangential_poss]
    }

    /// Axial positions of the two LOR endpoints for a given sinogram, with
    /// the scanner centred on the origin. For merged segments the mean ring
    /// difference of the segment is used, at half-ring-spacing axial steps.
    pub fn endpoint_zs(&self, segment: i32, axial: usize) -> Option<(Lengthf32, Lengthf32)> {
        let seg = *self.segment(segment)?;
        if axial >= seg.num_axial_poss { return None; }
        let d_min_abs = if seg.min_ring_diff <= 0 && seg.max_ring_diff >= 0 { 0 }
                        else { seg.min_ring_diff.abs().min(seg.max_ring_diff.abs()) };
        // Sum of the two ring indices identifies the axial position.
        let ring_sum = if seg.min_ring_diff == seg.max_ring_diff {
            2.0 * axial as Lengthf32 + d_min_abs as Lengthf32
        } else {
            axial as Lengthf32 + d_min_abs as Lengthf32
        };
        let z_mid = self.scanner.ring_z(ring_sum / 2.0);
        let mean_delta = (seg.min_ring_diff + seg.max_ring_diff) as Lengthf32 / 2.0;
        let dz = mean_delta * self.scanner.ring_spacing;
        Some((z_mid - dz / 2.0, z_mid + dz / 2.0))
    }
}
