pub use crate::error::{Error, Result};
pub use crate::scanner::{Scanner, ScannerParameters};
pub use crate::compression::Compression;
pub use crate::projdata::{ExamInfo, ProjDataGeometry, SegmentGeometry};
pub use crate::space::ProjectionSpace;
pub use crate::fov::Fov;
pub use crate::image::{Image, ImageData};
pub use crate::projector::{BackProjector, ForwardProjector, ProjectorOptions, ProjectorPair};

use ncollide3d as nc;

pub type Lengthf32    = f32;
pub type Weightf32    = f32;
pub type Intensityf32 = f32;

pub type Vectorf32 = nc::math::Vector<Lengthf32>;
pub type Pointf32  = nc::math::Point <Lengthf32>;

pub use crate::index::{BoxDim_u, Index1_u, Index3_u};
