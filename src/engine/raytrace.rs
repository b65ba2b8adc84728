//! Reference ray-tracing projection engine.
//!
//! One LOR (or a small fan of parallel sub-LORs) is traced through the voxel
//! grid for every projection bin, and the resulting weights are stored as an
//! explicit sparse matrix row. Forward projection multiplies by the rows,
//! back projection by the same rows transposed, so the operator pair is an
//! exact transpose by construction.
//!
//! The traversal walks voxel boundaries in order of distance along the LOR:
//! expressing the voxel size in units of the direction vector's components
//! makes "which boundary comes next" a three-way minimum, and the weight of
//! each voxel is simply the length of LOR between consecutive boundaries.

use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};

use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::{raw, ProjDataBuffer, ProjectionEngine, SymmetryFlags, VolumeBuffer};
use crate::error::{Error, Result};
use crate::fov::Fov;
use crate::image::Image;
use crate::index::{index3_to_1, Index1_u};
use crate::projdata::{ExamInfo, ProjDataGeometry};
use crate::scanner::Scanner;
use crate::utils::group_digits;
use crate::{Intensityf32, Lengthf32, Pointf32, Weightf32};

// ----------------------------------------------------------------------------
// Buffers

/// Projection data laid out as (sinogram, view, tangential), tangential
/// fastest.
#[derive(Clone, Debug, PartialEq)]
pub struct SinogramStack {
    pub shape: [usize; 3],
    pub exam: ExamInfo,
    pub data: Vec<Intensityf32>,
}

impl SinogramStack {
    pub fn zeros(geometry: &ProjDataGeometry, exam: ExamInfo) -> Self {
        let shape = geometry.shape();
        let size = shape[0] * shape[1] * shape[2];
        Self { shape, exam, data: vec![0.0; size] }
    }
}

impl VolumeBuffer for Image {
    fn shape(&self) -> [usize; 3] { self.fov.shape() }

    fn fill_from(&mut self, data: &[Intensityf32]) -> Result<()> {
        if data.len() != self.data.len() {
            return Err(Error::BufferLength { expected: self.data.len(), actual: data.len() });
        }
        self.data.copy_from_slice(data);
        Ok(())
    }

    fn to_vec(&self) -> Vec<Intensityf32> { self.data.clone() }
}

impl ProjDataBuffer for SinogramStack {
    fn shape(&self) -> [usize; 3] { self.shape }

    fn fill_from(&mut self, data: &[Intensityf32]) -> Result<()> {
        if data.len() != self.data.len() {
            return Err(Error::BufferLength { expected: self.data.len(), actual: data.len() });
        }
        self.data.copy_from_slice(data);
        Ok(())
    }

    fn to_vec(&self) -> Vec<Intensityf32> { self.data.clone() }
}

// ----------------------------------------------------------------------------
// The engine

/// Process-wide, like the verbosity of the C++ engines this one stands in
/// for. Scoped changes go through `engine::with_verbosity`.
static VERBOSITY: AtomicI32 = AtomicI32::new(0);

#[derive(Clone, Copy, Debug, Default)]
pub struct RayTracingEngine;

/// Explicit sparse system matrix: one row of `(flat voxel index, weight)`
/// pairs per projection bin, in flat bin order.
pub struct RayTracedMatrix {
    rows: Vec<Vec<(u32, Weightf32)>>,
    vol_shape: [usize; 3],
    proj_shape: [usize; 3],
    pub symmetries: SymmetryFlags,
    pub num_tangential_lors: usize,
}

impl RayTracedMatrix {
    pub fn num_bins(&self) -> usize { self.rows.len() }

    pub fn num_stored_elements(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    /// Row of `(flat voxel index, weight)` pairs for one flat bin index.
    pub fn row(&self, bin: usize) -> &[(u32, Weightf32)] { &self.rows[bin] }
}

impl ProjectionEngine for RayTracingEngine {
    type Volume = Image;
    type ProjData = SinogramStack;
    type Matrix = RayTracedMatrix;

    fn volume(&self, fov: &Fov) -> Result<Image> {
        Ok(Image::zeros(*fov))
    }

    fn projection_data(&self, geometry: &ProjDataGeometry, exam: &ExamInfo)
                       -> Result<SinogramStack> {
        Ok(SinogramStack::zeros(geometry, *exam))
    }

    fn system_matrix(&self,
                     fov: &Fov,
                     geometry: &ProjDataGeometry,
                     symmetries: SymmetryFlags,
                     num_tangential_lors: usize,
    ) -> Result<RayTracedMatrix> {
        if num_tangential_lors == 0 {
            return Err(Error::EngineCall("number of tangential LORs must be positive".into()));
        }
        let proj_shape = geometry.shape();
        let [n_sino, n_views, n_tang] = proj_shape;
        let n_bins = n_sino * n_views * n_tang;

        let rows: Vec<Vec<(u32, Weightf32)>> = (0..n_bins).into_par_iter()
            .map(|bin| trace_bin(fov, geometry, bin, num_tangential_lors))
            .collect();

        // The symmetry flags are recorded but not exploited: with every row
        // stored explicitly, the transpose is exact whether or not rows are
        // shared, and tracing rows independently avoids the interpolation
        // shortcuts that sharing would require.
        let matrix = RayTracedMatrix {
            rows,
            vol_shape: fov.shape(),
            proj_shape,
            symmetries,
            num_tangential_lors,
        };
        if VERBOSITY.load(Ordering::Relaxed) > 0 {
            info!(bins = %group_digits(matrix.num_bins()),
                  stored = %group_digits(matrix.num_stored_elements()),
                  num_tangential_lors,
                  "traced system matrix");
        } else {
            debug!(bins = matrix.num_bins(), stored = matrix.num_stored_elements(),
                   "traced system matrix");
        }
        Ok(matrix)
    }

    fn forward_project(&self,
                       matrix: &RayTracedMatrix,
                       volume: &Image,
                       proj_data: &mut SinogramStack,
    ) -> Result<()> {
        check_shape("forward projection volume", matrix.vol_shape, VolumeBuffer::shape(volume))?;
        check_shape("forward projection data", matrix.proj_shape, proj_data.shape)?;
        proj_data.data.par_iter_mut()
            .zip(matrix.rows.par_iter())
            .for_each(|(bin, row)| {
                let mut sum = 0.0;
                for &(j, w) in row { sum += w * volume.data[j as usize]; }
                *bin = sum;
            });
        Ok(())
    }

    fn back_project(&self,
                    matrix: &RayTracedMatrix,
                    proj_data: &SinogramStack,
                    volume: &mut Image,
    ) -> Result<()> {
        check_shape("back projection data", matrix.proj_shape, proj_data.shape)?;
        check_shape("back projection volume", matrix.vol_shape, VolumeBuffer::shape(volume))?;
        let num_voxels = volume.data.len();
        let accumulated = matrix.rows.par_iter()
            .zip(proj_data.data.par_iter())
            .fold(|| vec![0.0; num_voxels],
                  |mut acc, (row, &bin)| {
                      for &(j, w) in row { acc[j as usize] += w * bin; }
                      acc
                  })
            .reduce(|| vec![0.0; num_voxels],
                    |l, r| l.iter().zip(r.iter()).map(|(l, r)| l + r).collect());
        for (voxel, add) in volume.data.iter_mut().zip(accumulated) {
            *voxel += add;
        }
        Ok(())
    }

    fn verbosity(&self) -> i32 { VERBOSITY.load(Ordering::Relaxed) }
    fn set_verbosity(&self, level: i32) { VERBOSITY.store(level, Ordering::Relaxed); }

    fn volume_from_file(&self, path: &Path) -> Result<(Fov, Image)> {
        let header: VolumeHeader = read_header(path)?;
        let fov = Fov::from_spacing(header.n, header.voxel_size, header.offset);
        let data = raw::read_vec(&sibling(path, &header.data_file), fov.num_voxels())?;
        Ok((fov, Image::new(fov, data)))
    }

    fn projection_data_from_file(&self, path: &Path)
        -> Result<(ProjDataGeometry, ExamInfo, SinogramStack)>
    {
        let header: ProjDataHeader = read_header(path)?;
        // Headers carry a raw scanner table that bypassed construction.
        header.scanner.check_consistency()?;
        let geometry = ProjDataGeometry::derive(
            &header.scanner,
            header.span,
            header.max_ring_diff,
            header.num_views,
            header.num_tangential_poss,
            header.arc_corrected,
            header.tangential_sampling,
        )?;
        let exam = ExamInfo { time_frame: header.time_frame.unwrap_or((0.0, 1.0)) };
        let shape = geometry.shape();
        let data = raw::read_vec(&sibling(path, &header.data_file),
                                 shape[0] * shape[1] * shape[2])?;
        Ok((geometry, exam, SinogramStack { shape, exam, data }))
    }
}

fn check_shape(what: &'static str, expected: [usize; 3], actual: [usize; 3]) -> Result<()> {
    if expected != actual {
        return Err(Error::ShapeMismatch { what, expected, actual });
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// LOR tracing

/// Trace all sub-LORs of one flat projection bin and merge them into a
/// single matrix row. Sub-LOR weights are averaged, so the row scale does
/// not depend on `num_lors`.
fn trace_bin(fov: &Fov,
             geometry: &ProjDataGeometry,
             bin: usize,
             num_lors: usize,
) -> Vec<(u32, Weightf32)> {
    let n_views = geometry.num_views();
    let n_tang = geometry.num_tangential_poss();
    let sinogram = bin / (n_views * n_tang);
    let view = (bin / n_tang) % n_views;
    let tang = bin % n_tang;

    let mut elements: Vec<(u32, Weightf32)> = vec![];
    for sub in 0..num_lors {
        if let Some((p1, p2)) = lor_endpoints(geometry, sinogram, view, tang, sub, num_lors) {
            for (j, w) in weights_along_lor(fov, p1, p2) {
                elements.push((j as u32, w / num_lors as Weightf32));
            }
        }
    }
    if num_lors > 1 {
        elements.sort_unstable_by_key(|&(j, _)| j);
        elements.dedup_by(|later, earlier| {
            if earlier.0 == later.0 { earlier.1 += later.1; true } else { false }
        });
    }
    elements
}

/// Endpoints of one (sub-)LOR, with the scanner centred on the origin.
///
/// The angular position is `intrinsic_tilt + pi * view / num_views`; the
/// tangential position counts bins symmetrically about the scanner axis.
/// Sub-LORs subdivide the tangential bin evenly. Bins whose tangential
/// position falls outside the effective radius have no LOR.
fn lor_endpoints(geometry: &ProjDataGeometry,
                 sinogram: usize,
                 view: usize,
                 tang: usize,
                 sub: usize,
                 num_sub: usize,
) -> Option<(Pointf32, Pointf32)> {
    let (segment, axial) = geometry.segment_and_axial(sinogram)?;
    let (z1, z2) = geometry.endpoint_zs(segment, axial)?;
    let scanner = &geometry.scanner;

    let phi = scanner.intrinsic_tilt + PI * view as f32 / geometry.num_views() as f32;
    let sampling = geometry.tangential_sampling;
    let n_tang = geometry.num_tangential_poss() as f32;
    let s = (tang as f32 - (n_tang - 1.0) / 2.0) * sampling
          + (sub as f32 - (num_sub as f32 - 1.0) / 2.0) * sampling / num_sub as f32;

    let r = scanner.effective_radius();
    if s.abs() >= r { return None; }
    let half_chord = (r * r - s * s).sqrt();

    let (sin_phi, cos_phi) = phi.sin_cos();
    // Unit vector along the LOR, and the bin centre displaced perpendicular
    // to it by the tangential position.
    let (ux, uy) = (-sin_phi, cos_phi);
    let (cx, cy) = (s * cos_phi, s * sin_phi);
    let p1 = Pointf32::new(cx - ux * half_chord, cy - uy * half_chord, z1);
    let p2 = Pointf32::new(cx + ux * half_chord, cy + uy * half_chord, z2);
    Some((p1, p2))
}

/// Indices and weights of the voxels traversed by the segment from `p1` to
/// `p2`. The weight of a voxel is the length of the segment inside it; the
/// weights sum to the length of the segment's intersection with the volume.
pub fn weights_along_lor(fov: &Fov, p1: Pointf32, p2: Pointf32)
                         -> Vec<(Index1_u, Weightf32)>
{
    // Allocated once per call; an upper bound on the number of voxels any
    // straight line can cross.
    let mut row = Vec::with_capacity(fov.n[0] + fov.n[1] + fov.n[2] - 2);

    let length = (p2 - p1).norm();
    if !(length > 0.0) { return row; }
    let (entry, exit) = match (fov.entry(p1, p2), fov.entry(p2, p1)) {
        (Some(entry), Some(exit)) => (entry, exit),
        _ => return row,
    };
    let t_exit = (exit - entry).norm();
    if !(t_exit > 0.0) { return row; }
    let direction = (p2 - p1) / length;

    // Work in a frame with the lower corner of the volume at the origin, so
    // that flooring a coordinate in voxel units yields the voxel index.
    let h = fov.half_width();
    let origin = [fov.offset[0] - h.x, fov.offset[1] - h.y, fov.offset[2] - h.z];
    let e = [entry.x - origin[0], entry.y - origin[1], entry.z - origin[2]];
    let d = [direction.x, direction.y, direction.z];
    let voxel_size = fov.voxel_size;
    let n = fov.n;

    let mut index  = [0_i64; 3];
    let mut step   = [0_i64; 3];
    // Distance along the LOR to the next boundary in each dimension;
    // infinite for any axis parallel to the LOR.
    let mut t_next = [f32::INFINITY; 3];
    for a in 0..3 {
        // Entry points landing exactly on the far face floor to an index one
        // past the end; clamping selects the boundary voxel instead.
        index[a] = ((e[a] / voxel_size[a]).floor() as i64).clamp(0, n[a] as i64 - 1);
        if d[a] > 0.0 {
            step[a] = 1;
            t_next[a] = ((index[a] + 1) as f32 * voxel_size[a] - e[a]) / d[a];
        } else if d[a] < 0.0 {
            step[a] = -1;
            t_next[a] = (index[a] as f32 * voxel_size[a] - e[a]) / d[a];
        }
    }

    let mut t_here = 0.0;
    loop {
        // Which boundary comes next along the LOR
        let mut axis = 0;
        for a in 1..3 { if t_next[a] < t_next[axis] { axis = a; } }
        let t_boundary = t_next[axis];

        // The weight is the length of LOR in this voxel
        let weight = t_boundary.min(t_exit) - t_here;
        if weight > 0.0 {
            let i3 = [index[0] as usize, index[1] as usize, index[2] as usize];
            row.push((index3_to_1(i3, n), weight));
        }

        if t_boundary >= t_exit { break; }
        t_here = t_boundary;
        index[axis] += step[axis];
        if index[axis] < 0 || index[axis] >= n[axis] as i64 { break; }
        t_next[axis] += voxel_size[axis] / d[axis].abs();
    }
    row
}

// ----------------------------------------------------------------------------
// File format: a TOML header naming a raw little-endian f32 data file.

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeHeader {
    pub n: [usize; 3],
    pub voxel_size: [Lengthf32; 3],
    #[serde(default)]
    pub offset: [Lengthf32; 3],
    /// Resolved relative to the header's directory.
    pub data_file: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjDataHeader {
    pub span: u32,
    pub max_ring_diff: u32,
    pub num_views: usize,
    pub num_tangential_poss: usize,
    #[serde(default)]
    pub arc_corrected: bool,
    pub tangential_sampling: Lengthf32,
    #[serde(default)]
    pub time_frame: Option<(f32, f32)>,
    /// Resolved relative to the header's directory.
    pub data_file: PathBuf,
    // Tables must follow plain values in TOML, so the scanner comes last.
    pub scanner: Scanner,
}

fn read_header<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&text)?)
}

fn sibling(header: &Path, data_file: &Path) -> PathBuf {
    if data_file.is_absolute() { return data_file.to_owned(); }
    match header.parent() {
        Some(dir) => dir.join(data_file),
        None => data_file.to_owned(),
    }
}

fn data_file_name(header: &Path) -> Result<(PathBuf, PathBuf)> {
    let raw_path = header.with_extension("raw");
    let name = raw_path.file_name()
        .map(PathBuf::from)
        .ok_or_else(|| Error::EngineCall(format!("no file name in header path {header:?}")))?;
    Ok((raw_path, name))
}

/// Write `image` as a TOML header at `path` plus a raw data file next to it.
pub fn write_volume_file(path: &Path, image: &Image) -> Result<()> {
    let (raw_path, data_file) = data_file_name(path)?;
    let header = VolumeHeader {
        n: image.fov.n,
        voxel_size: image.fov.voxel_size,
        offset: image.fov.offset,
        data_file,
    };
    std::fs::write(path, toml::to_string(&header)?)?;
    raw::write(image.data.iter().copied(), &raw_path)?;
    Ok(())
}

/// Write a projection-data set as a TOML header at `path` plus a raw data
/// file next to it. The geometry is re-derived from the header on loading,
/// so only the compression settings are stored, never the segment table.
pub fn write_projection_data_file(path: &Path,
                                  geometry: &ProjDataGeometry,
                                  stack: &SinogramStack,
) -> Result<()> {
    check_shape("projection data to write", geometry.shape(), stack.shape)?;
    let (raw_path, data_file) = data_file_name(path)?;
    let header = ProjDataHeader {
        span: geometry.span,
        max_ring_diff: geometry.max_ring_diff,
        num_views: geometry.num_views(),
        num_tangential_poss: geometry.num_tangential_poss(),
        arc_corrected: geometry.arc_corrected,
        tangential_sampling: geometry.tangential_sampling,
        time_frame: Some(stack.exam.time_frame),
        data_file,
        scanner: geometry.scanner.clone(),
    };
    std::fs::write(path, toml::to_string(&header)?)?;
    raw::write(stack.data.iter().copied(), &raw_path)?;
    Ok(())
}

// ------------------------------ TESTS ------------------------------
#[cfg(test)]
mod test {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};
    use float_eq::assert_float_eq;
    use rstest::rstest;

    // --------------------------------------------------------------------------------
    // Hand-picked traversals, easy to verify by eye. Two checks per case:
    //
    // 1. The sum of the LOR-lengths within individual voxels equals the
    //    expected total length of LOR in the whole volume.
    //
    // 2. The indices of the voxels traversed by the LOR are as expected.
    #[rstest(/**/      p1       ,      p2      ,    size     ,  n   ,  length  , expected_voxels,
             // symmetric 3x3, diagonal LOR under all four axis flip combinations
             case((-30.0, -30.0), ( 30.0, 30.0), (10.0, 10.0), (3,3), 14.142135, vec![(0,0), (1,1), (2,2)]),
             case(( 30.0, -30.0), (-30.0, 30.0), (10.0, 10.0), (3,3), 14.142135, vec![(2,0), (1,1), (0,2)]),
             case((-30.0,  30.0), ( 30.0,-30.0), (10.0, 10.0), (3,3), 14.142135, vec![(0,2), (1,1), (2,0)]),
             case(( 30.0,  30.0), (-30.0,-30.0), (10.0, 10.0), (3,3), 14.142135, vec![(2,2), (1,1), (0,0)]),
             // like case 1, but with asymmetric voxels
             case((-30.0, -30.0), ( 30.0, 30.0), (10.0, 10.0), (3,2), 14.142135, vec![(0,0), (1,0), (1,1), (2,1)]),
             case((-30.0, -30.0), ( 30.0, 30.0), (10.0, 10.0), (2,3), 14.142135, vec![(0,0), (0,1), (1,1), (1,2)]),
             // vertical / horizontal off-centre LOR
             case((  5.4, -20.0), (  5.4, 10.0), (11.0,  9.0), (9,4),  9.0     , vec![(8,0), (8,1), (8,2), (8,3)]),
             case((-15.0,  -4.0), ( 15.0, -4.0), ( 8.0, 10.0), (4,3),  8.0     , vec![(0,0), (1,0), (2,0), (3,0)]),
    )]
    fn hand_picked(p1:   (Lengthf32, Lengthf32),
                   p2:   (Lengthf32, Lengthf32),
                   size: (Lengthf32, Lengthf32),
                   n: (usize, usize),
                   length: Lengthf32,
                   expected_voxels: Vec<(usize, usize)>) {

        let p1 = Pointf32::new(p1.0, p1.1, 0.0);
        let p2 = Pointf32::new(p2.0, p2.1, 0.0);
        let fov = Fov::new((size.0, size.1, 1.0), (n.0, n.1, 1));

        let hits = weights_along_lor(&fov, p1, p2);

        // Diagnostic output
        for (j, l) in &hits { println!("  {:?}   {}", crate::index::index1_to_3(*j, fov.n), l) }

        // Check total length through the volume
        let total_length: Lengthf32 = hits.iter().map(|(_, weight)| weight).sum();
        assert_float_eq!(total_length, length, ulps <= 2);

        // Check voxels hit
        let voxels: Vec<(usize, usize)> = hits.into_iter()
            .map(|(j, _)| crate::index::index1_to_3(j, fov.n))
            .map(|[x, y, _]| (x, y))
            .collect();
        assert_eq!(voxels, expected_voxels)
    }

    // --------------------------------------------------------------------------------
    use proptest::prelude::*;
    // Random LORs: the sum of the per-voxel lengths must equal the length of
    // the LOR's intersection with the volume.
    proptest! {
        #[test]
        fn sum_of_weights_equals_length_through_box(
            r        in  200.0..(300.0 as Lengthf32),
            p1_angle in 0.0..(1.0 as Lengthf32), // around the circle
            p2_delta in 0.1..(0.9 as Lengthf32), // relative to p1_angle
            p1_z     in -200.0..(200.0 as Lengthf32),
            p2_z     in -200.0..(200.0 as Lengthf32),
            // Field of View
            dx in  100.0..(150.0 as Lengthf32),
            dy in  100.0..(150.0 as Lengthf32),
            dz in  100.0..(190.0 as Lengthf32),
            nx in  5..50_usize,
            ny in  5..50_usize,
            nz in  5..90_usize,
        ) {
            use std::f32::consts::TAU;
            let p1_theta = p1_angle * TAU;
            let p2_theta = p1_theta + p2_delta * TAU;
            let p1 = Pointf32::new(r * p1_theta.cos(), r * p1_theta.sin(), p1_z);
            let p2 = Pointf32::new(r * p2_theta.cos(), r * p2_theta.sin(), p2_z);
            let fov = Fov::new((dx, dy, dz), (nx, ny, nz));

            let summed: Lengthf32 = weights_along_lor(&fov, p1, p2).into_iter()
                .map(|(_, weight)| weight)
                .sum();

            let in_one_go = match (fov.entry(p1, p2), fov.entry(p2, p1)) {
                (Some(a), Some(b)) => (a - b).norm(),
                _ => 0.0,
            };

            assert_float_eq!(summed, in_one_go, rel <= 1e-3, abs <= 1e-3);
        }
    }

    // --------------------------------------------------------------------------------

    fn small_geometry() -> ProjDataGeometry {
        let scanner = Scanner::from_parameters(crate::scanner::ScannerParameters {
            num_rings: 4,
            num_dets_per_ring: 16,
            inner_ring_radius: 50.0,
            ring_spacing: 4.0,
            average_depth_of_interaction: 0.0,
            default_bin_size: 5.0,
            intrinsic_tilt: 0.0,
            axial_crystals_per_block: 1,
            trans_crystals_per_block: 1,
            axial_blocks_per_bucket: 1,
            trans_blocks_per_bucket: 1,
            axial_crystals_per_singles_unit: 0,
            trans_crystals_per_singles_unit: 0,
            num_detector_layers: 1,
            max_num_non_arccorrected_bins: None,
            default_num_arccorrected_bins: None,
        }).unwrap();
        ProjDataGeometry::derive(&scanner, 1, 3, 8, 7, false, 5.0).unwrap()
    }

    #[test]
    fn view_zero_lors_run_along_y() {
        let geometry = small_geometry();
        // Direct sinogram, first view, centre-ish tangential bin
        let (p1, p2) = lor_endpoints(&geometry, 0, 0, 3, 0, 1).unwrap();
        assert_float_eq!(p1.x, p2.x, abs <= 1e-5);
        assert!(p1.y < 0.0 && p2.y > 0.0);
        // Segment 0: both endpoints on the same ring
        assert_float_eq!(p1.z, p2.z, ulps <= 1);
    }

    #[test]
    fn tangential_bin_outside_the_ring_has_no_lor() {
        let geometry = small_geometry();
        // Bin 0 sits 3 bins * 5 mm off-centre; push it outside with a fake
        // tangential position far beyond the 50 mm radius
        let scanner = geometry.scanner.clone();
        let wide = ProjDataGeometry::derive(&scanner, 1, 3, 8, 41, false, 5.0).unwrap();
        // Outermost of 41 bins: 20 * 5 mm = 100 mm > 50 mm radius
        assert!(lor_endpoints(&wide, 0, 0, 0, 0, 1).is_none());
        assert!(lor_endpoints(&wide, 0, 0, 20, 0, 1).is_some());
    }

    #[test]
    fn forward_projection_of_uniform_image_is_nonnegative_and_somewhere_positive() {
        let engine = RayTracingEngine;
        let geometry = small_geometry();
        let fov = Fov::new((60.0, 60.0, 16.0), (8, 8, 4));
        let matrix = engine.system_matrix(&fov, &geometry, SymmetryFlags::default(), 1).unwrap();
        let volume = Image::ones(fov);
        let mut proj = SinogramStack::zeros(&geometry, ExamInfo::default());
        engine.forward_project(&matrix, &volume, &mut proj).unwrap();
        assert!(proj.data.iter().all(|&v| v >= 0.0));
        assert!(proj.data.iter().any(|&v| v > 0.0));
    }

    #[test]
    fn sub_lor_rows_have_the_same_total_weight_scale() {
        // Averaging over sub-LORs must not change the order of magnitude of
        // a row: compare total weights for 1 and 3 sub-LORs
        let engine = RayTracingEngine;
        let geometry = small_geometry();
        let fov = Fov::new((60.0, 60.0, 16.0), (8, 8, 4));
        let one = engine.system_matrix(&fov, &geometry, SymmetryFlags::default(), 1).unwrap();
        let three = engine.system_matrix(&fov, &geometry, SymmetryFlags::default(), 3).unwrap();
        let total = |m: &RayTracedMatrix| -> f32 {
            (0..m.num_bins()).map(|b| m.row(b).iter().map(|&(_, w)| w).sum::<f32>()).sum()
        };
        let (t1, t3) = (total(&one), total(&three));
        assert!(t1 > 0.0 && t3 > 0.0);
        assert_float_eq!(t1, t3, rel <= 0.1);
    }

    #[test]
    fn volume_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volume.toml");
        let mut fov = Fov::new((60.0, 60.0, 16.0), (4, 4, 2));
        fov.offset = [1.0, -2.0, 3.0];
        let image = Image::new(fov, (0..32).map(|i| i as f32).collect());
        write_volume_file(&path, &image).unwrap();

        let engine = RayTracingEngine;
        let (reloaded_fov, reloaded) = engine.volume_from_file(&path).unwrap();
        assert_eq!(reloaded_fov, fov);
        assert_eq!(reloaded.data, image.data);
    }

    #[test]
    fn projection_data_file_roundtrip_rederives_the_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projdata.toml");
        let geometry = small_geometry();
        let mut stack = SinogramStack::zeros(&geometry, ExamInfo::default());
        for (i, v) in stack.data.iter_mut().enumerate() { *v = i as f32; }
        write_projection_data_file(&path, &geometry, &stack).unwrap();

        let engine = RayTracingEngine;
        let (reloaded_geometry, exam, reloaded) = engine.projection_data_from_file(&path).unwrap();
        assert_eq!(reloaded_geometry, geometry);
        assert_eq!(exam, ExamInfo::default());
        assert_eq!(reloaded.data, stack.data);
    }

    #[test]
    fn header_with_inconsistent_scanner_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projdata.toml");
        let geometry = small_geometry();
        let stack = SinogramStack::zeros(&geometry, ExamInfo::default());
        write_projection_data_file(&path, &geometry, &stack).unwrap();

        // Corrupt the scanner table in place: zero rings is a geometry no
        // constructor would have let through
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("num_rings = 4"));
        std::fs::write(&path, text.replace("num_rings = 4", "num_rings = 0")).unwrap();

        let engine = RayTracingEngine;
        assert!(matches!(engine.projection_data_from_file(&path),
                         Err(Error::GeometryConsistency(_))));
    }
}
