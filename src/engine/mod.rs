//! The pluggable projection-engine seam.
//!
//! A [`ProjectionEngine`] owns everything opaque about a backend: its buffer
//! layouts, its system-matrix representation, its file formats and its
//! process-wide verbosity. The projector layer only ever talks to a backend
//! through this trait, so the geometry code never depends on any one engine.
//!
//! [`raytrace`] provides the reference backend: a ray tracer which builds an
//! explicit sparse matrix, giving a forward/back pair that is an exact
//! transpose.

pub mod raw;
pub mod raytrace;

pub use raytrace::{RayTracingEngine, RayTracedMatrix, SinogramStack};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fov::Fov;
use crate::projdata::{ExamInfo, ProjDataGeometry};
use crate::Intensityf32;

/// Geometric symmetries an engine is allowed to exploit when building its
/// system matrix. All enabled by default; disabling them trades speed for a
/// matrix free of symmetry-induced discretization artefacts.
///
/// An engine may ignore any flag it cannot honour, as long as the resulting
/// operator pair stays an exact transpose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SymmetryFlags {
    /// Reflection of the azimuthal angle about 90 degrees.
    #[serde(default = "yes")] pub phi_90: bool,
    /// Reflection of the azimuthal angle about 180 degrees.
    #[serde(default = "yes")] pub phi_180: bool,
    /// Reflection of the tangential coordinate about the centre bin.
    #[serde(default = "yes")] pub swap_s: bool,
    /// Exchange of positive and negative segments.
    #[serde(default = "yes")] pub swap_segment: bool,
}

fn yes() -> bool { true }

impl Default for SymmetryFlags {
    fn default() -> Self {
        Self { phi_90: true, phi_180: true, swap_s: true, swap_segment: true }
    }
}

/// An engine-side image volume. Shape is `(z, y, x)`; the flat element order
/// runs x fastest.
pub trait VolumeBuffer {
    fn shape(&self) -> [usize; 3];
    /// Overwrite the buffer contents. Fails on length disagreement without
    /// touching the buffer.
    fn fill_from(&mut self, data: &[Intensityf32]) -> Result<()>;
    fn to_vec(&self) -> Vec<Intensityf32>;
}

/// An engine-side projection-data set. Shape is (sinogram, view, tangential).
pub trait ProjDataBuffer {
    fn shape(&self) -> [usize; 3];
    fn fill_from(&mut self, data: &[Intensityf32]) -> Result<()>;
    fn to_vec(&self) -> Vec<Intensityf32>;
}

/// One projection backend.
///
/// The `system_matrix` / `forward_project` / `back_project` triple must
/// satisfy the adjoint identity: for the same matrix,
/// `<forward(x), y> == <x, back(y)>` up to floating-point rounding.
pub trait ProjectionEngine {
    type Volume: VolumeBuffer;
    type ProjData: ProjDataBuffer;
    type Matrix;

    /// Allocate a zeroed volume over `fov`.
    fn volume(&self, fov: &Fov) -> Result<Self::Volume>;

    /// Allocate a zeroed projection-data set over `geometry`.
    fn projection_data(&self, geometry: &ProjDataGeometry, exam: &ExamInfo)
                       -> Result<Self::ProjData>;

    /// Set up the system matrix mapping `fov` to `geometry`. The expensive
    /// step: callers should validate shapes before getting here.
    fn system_matrix(&self,
                     fov: &Fov,
                     geometry: &ProjDataGeometry,
                     symmetries: SymmetryFlags,
                     num_tangential_lors: usize,
    ) -> Result<Self::Matrix>;

    /// Overwrite `proj_data` with the projection of `volume`.
    fn forward_project(&self,
                       matrix: &Self::Matrix,
                       volume: &Self::Volume,
                       proj_data: &mut Self::ProjData,
    ) -> Result<()>;

    /// Accumulate the back projection of `proj_data` into `volume`. The
    /// caller decides whether to zero the volume first.
    fn back_project(&self,
                    matrix: &Self::Matrix,
                    proj_data: &Self::ProjData,
                    volume: &mut Self::Volume,
    ) -> Result<()>;

    /// Engine chattiness. Process-wide state in most backends, hence the
    /// scoped discipline of [`with_verbosity`].
    fn verbosity(&self) -> i32;
    fn set_verbosity(&self, level: i32);

    /// Read a volume from the engine's native file format.
    fn volume_from_file(&self, path: &Path) -> Result<(Fov, Self::Volume)>;

    /// Read a projection-data set from the engine's native file format.
    fn projection_data_from_file(&self, path: &Path)
        -> Result<(ProjDataGeometry, ExamInfo, Self::ProjData)>;
}

/// Run `f` with the engine's verbosity set to `level`, restoring the
/// previous value afterwards. Restoration also happens when `f` panics, so
/// a failed call never leaks a verbosity change to unrelated code.
pub fn with_verbosity<E, T>(engine: &E, level: i32, f: impl FnOnce() -> T) -> T
where
    E: ProjectionEngine + ?Sized,
{
    struct Restore<'e, E: ProjectionEngine + ?Sized> {
        engine: &'e E,
        saved: i32,
    }
    impl<E: ProjectionEngine + ?Sized> Drop for Restore<'_, E> {
        fn drop(&mut self) { self.engine.set_verbosity(self.saved); }
    }

    let _restore = Restore { engine, saved: engine.verbosity() };
    engine.set_verbosity(level);
    f()
}
