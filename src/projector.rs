//! Adjoint forward/back projector pair over one shared system matrix.
//!
//! Both handles of a [`ProjectorPair`] point at the same [`PairState`], so
//! `forward.adjoint()` is the back projector that shares the forward
//! projector's matrix and buffers, and `adjoint` of that is the original
//! operator again. Sharing the matrix is what makes the pair an exact
//! transpose; two independently-built operators would only be approximately
//! adjoint.
//!
//! The handles are single-threaded by design (`Rc` + `RefCell`): one pair
//! per thread, never one pair across threads. The engine may still
//! parallelize internally.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use ndarray::Array3;
use tracing::debug;

use crate::compression::Compression;
use crate::engine::raytrace::RayTracingEngine;
use crate::engine::{with_verbosity, ProjDataBuffer, ProjectionEngine, SymmetryFlags, VolumeBuffer};
use crate::error::{Error, Result};
use crate::fov::Fov;
use crate::projdata::{ExamInfo, ProjDataGeometry};
use crate::space::ProjectionSpace;
use crate::Intensityf32;

/// Knobs forwarded to the engine when the pair is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProjectorOptions {
    pub symmetries: SymmetryFlags,
    /// Parallel sub-LORs traced per tangential bin; averaging them smooths
    /// the discretization of wide bins.
    pub num_tangential_lors: usize,
    /// Engine verbosity during matrix setup and every apply call. Scoped:
    /// the engine's verbosity outside those calls is untouched.
    pub verbosity: i32,
}

impl Default for ProjectorOptions {
    fn default() -> Self {
        Self { symmetries: SymmetryFlags::default(), num_tangential_lors: 1, verbosity: 0 }
    }
}

/// Everything the two handles of a pair share.
struct PairState<E: ProjectionEngine> {
    engine: E,
    matrix: E::Matrix,
    volume: RefCell<E::Volume>,
    proj_data: RefCell<E::ProjData>,
    domain: Fov,
    range: ProjectionSpace,
    geometry: ProjDataGeometry,
    verbosity: i32,
}

pub struct ForwardProjector<E: ProjectionEngine> {
    state: Rc<PairState<E>>,
}

pub struct BackProjector<E: ProjectionEngine> {
    state: Rc<PairState<E>>,
}

// Manual impls: deriving would demand E: Clone for no reason.
impl<E: ProjectionEngine> Clone for ForwardProjector<E> {
    fn clone(&self) -> Self { Self { state: Rc::clone(&self.state) } }
}
impl<E: ProjectionEngine> Clone for BackProjector<E> {
    fn clone(&self) -> Self { Self { state: Rc::clone(&self.state) } }
}

pub struct ProjectorPair<E: ProjectionEngine> {
    pub forward: ForwardProjector<E>,
    pub back: BackProjector<E>,
}

impl<E: ProjectionEngine> ProjectorPair<E> {

    /// Build the pair: allocate the engine buffers, validate their shapes
    /// against the requested geometry, then build the system matrix. The
    /// shape checks run first so that a bad setup fails before the expensive
    /// step.
    pub fn new(engine: E,
               fov: Fov,
               geometry: ProjDataGeometry,
               exam: ExamInfo,
               options: ProjectorOptions,
    ) -> Result<Self> {
        let volume = engine.volume(&fov)?;
        let actual = VolumeBuffer::shape(&volume);
        if actual != fov.shape() {
            return Err(Error::ShapeMismatch {
                what: "engine volume buffer", expected: fov.shape(), actual,
            });
        }
        let proj_data = engine.projection_data(&geometry, &exam)?;
        let actual = ProjDataBuffer::shape(&proj_data);
        if actual != geometry.shape() {
            return Err(Error::ShapeMismatch {
                what: "engine projection-data buffer", expected: geometry.shape(), actual,
            });
        }

        let matrix = with_verbosity(&engine, options.verbosity, || {
            engine.system_matrix(&fov, &geometry,
                                 options.symmetries, options.num_tangential_lors)
        })?;

        let radius = geometry.num_tangential_poss() as f32 / 2.0
                   * geometry.tangential_sampling;
        let range = ProjectionSpace::from_proj_geometry(&geometry, radius);
        debug!(domain = ?fov.shape(), range = ?range.shape, "built projector pair");

        let state = Rc::new(PairState {
            engine,
            matrix,
            volume: RefCell::new(volume),
            proj_data: RefCell::new(proj_data),
            domain: fov,
            range,
            geometry,
            verbosity: options.verbosity,
        });
        Ok(Self {
            forward: ForwardProjector { state: Rc::clone(&state) },
            back: BackProjector { state },
        })
    }
}

impl ProjectorPair<RayTracingEngine> {

    /// Pair over the reference engine, with the projection-data geometry
    /// derived from `compression`.
    pub fn from_compression(compression: &Compression,
                            fov: Fov,
                            options: ProjectorOptions,
    ) -> Result<Self> {
        let geometry = compression.projection_data_geometry()?;
        Self::new(RayTracingEngine, fov, geometry, ExamInfo::default(), options)
    }

    /// Pair over the reference engine, with domain and range read from the
    /// engine's native header files. Only the shapes are taken from the
    /// files; their data are not loaded into the operators.
    pub fn from_files(volume_header: &Path,
                      proj_data_header: &Path,
                      options: ProjectorOptions,
    ) -> Result<Self> {
        let engine = RayTracingEngine;
        let (fov, _volume) = engine.volume_from_file(volume_header)?;
        let (geometry, exam, _proj_data) = engine.projection_data_from_file(proj_data_header)?;
        Self::new(engine, fov, geometry, exam, options)
    }
}

impl<E: ProjectionEngine> ForwardProjector<E> {

    /// Project a volume, shaped `(z, y, x)` over the domain grid, into
    /// projection data shaped (sinogram, view, tangential).
    pub fn apply(&self, volume: &Array3<Intensityf32>) -> Result<Array3<Intensityf32>> {
        let s = &*self.state;
        let (a, b, c) = volume.dim();
        let actual = [a, b, c];
        if actual != s.domain.shape() {
            return Err(Error::ShapeMismatch {
                what: "forward projection input", expected: s.domain.shape(), actual,
            });
        }
        let data: Vec<Intensityf32> = volume.iter().copied().collect();
        let mut volume_buffer = s.volume.borrow_mut();
        volume_buffer.fill_from(&data)?;
        let mut proj_buffer = s.proj_data.borrow_mut();
        with_verbosity(&s.engine, s.verbosity, || {
            s.engine.forward_project(&s.matrix, &volume_buffer, &mut proj_buffer)
        })?;
        array_from_buffer(proj_buffer.to_vec(), s.range.shape)
    }

    /// The back projector sharing this operator's matrix and buffers.
    pub fn adjoint(&self) -> BackProjector<E> {
        BackProjector { state: Rc::clone(&self.state) }
    }

    /// Whether `other` operates over the very same shared state.
    pub fn same_operator(&self, other: &BackProjector<E>) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    pub fn domain(&self) -> &Fov { &self.state.domain }
    pub fn range(&self) -> &ProjectionSpace { &self.state.range }
    pub fn geometry(&self) -> &ProjDataGeometry { &self.state.geometry }
}

impl<E: ProjectionEngine> BackProjector<E> {

    /// Back-project data shaped (sinogram, view, tangential) into a volume
    /// shaped `(z, y, x)` over the domain grid.
    pub fn apply(&self, proj_data: &Array3<Intensityf32>) -> Result<Array3<Intensityf32>> {
        let s = &*self.state;
        let (a, b, c) = proj_data.dim();
        let actual = [a, b, c];
        if actual != s.range.shape {
            return Err(Error::ShapeMismatch {
                what: "back projection input", expected: s.range.shape, actual,
            });
        }
        let data: Vec<Intensityf32> = proj_data.iter().copied().collect();
        let mut proj_buffer = s.proj_data.borrow_mut();
        proj_buffer.fill_from(&data)?;
        let mut volume_buffer = s.volume.borrow_mut();
        // The engine accumulates; the shared buffer still holds the previous
        // call's result.
        volume_buffer.fill_from(&vec![0.0; s.domain.num_voxels()])?;
        with_verbosity(&s.engine, s.verbosity, || {
            s.engine.back_project(&s.matrix, &proj_buffer, &mut volume_buffer)
        })?;
        array_from_buffer(volume_buffer.to_vec(), s.domain.shape())
    }

    /// The forward projector sharing this operator's matrix and buffers.
    pub fn adjoint(&self) -> ForwardProjector<E> {
        ForwardProjector { state: Rc::clone(&self.state) }
    }

    /// Whether `other` operates over the very same shared state.
    pub fn same_operator(&self, other: &ForwardProjector<E>) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    pub fn domain(&self) -> &ProjectionSpace { &self.state.range }
    pub fn range(&self) -> &Fov { &self.state.domain }
    pub fn geometry(&self) -> &ProjDataGeometry { &self.state.geometry }
}

fn array_from_buffer(data: Vec<Intensityf32>, shape: [usize; 3])
                     -> Result<Array3<Intensityf32>> {
    Array3::from_shape_vec((shape[0], shape[1], shape[2]), data)
        .map_err(|e| Error::EngineCall(format!("engine returned a wrong-size buffer: {e}")))
}
