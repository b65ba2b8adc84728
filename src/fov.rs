//! The size, granularity and placement of the image volume (Field Of View)
//! the projectors map into and out of.

use serde::{Deserialize, Serialize};

use crate::index::{BoxDim_u, Index3_u};
use crate::{Lengthf32, Pointf32, Vectorf32};

/// Voxel grid of the reconstruction volume.
///
/// `n` is `[nx, ny, nz]`; buffers over this grid are shaped `(z, y, x)`
/// with x varying fastest, which is what [`Fov::shape`] reports.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fov {
    pub n: BoxDim_u,
    pub voxel_size: [Lengthf32; 3],
    /// Displacement of the volume centre from the scanner centre, in mm.
    pub offset: [Lengthf32; 3],
}

impl Fov {

    pub fn new(full_size: (Lengthf32, Lengthf32, Lengthf32),
               (nx, ny, nz): (usize, usize, usize)
    ) -> Self {
        let (dx, dy, dz) = full_size;
        let voxel_size = [dx / nx as Lengthf32,
                          dy / ny as Lengthf32,
                          dz / nz as Lengthf32];
        Self { n: [nx, ny, nz], voxel_size, offset: [0.0; 3] }
    }

    pub fn from_spacing(n: BoxDim_u, voxel_size: [Lengthf32; 3], offset: [Lengthf32; 3]) -> Self {
        Self { n, voxel_size, offset }
    }

    pub fn half_width(&self) -> Vectorf32 {
        Vectorf32::new(self.n[0] as Lengthf32 * self.voxel_size[0] / 2.0,
                       self.n[1] as Lengthf32 * self.voxel_size[1] / 2.0,
                       self.n[2] as Lengthf32 * self.voxel_size[2] / 2.0)
    }

    /// Buffer shape over this grid: `(z, y, x)`.
    pub fn shape(&self) -> [usize; 3] {
        [self.n[2], self.n[1], self.n[0]]
    }

    pub fn num_voxels(&self) -> usize {
        self.n[0] * self.n[1] * self.n[2]
    }

    /// Find centre of voxel with given 3D index
    pub fn voxel_centre(&self, i: Index3_u) -> Pointf32 {
        let s = self.voxel_size;
        let h = self.half_width();
        Pointf32::new((i[0] as Lengthf32 + 0.5) * s[0] - h.x + self.offset[0],
                      (i[1] as Lengthf32 + 0.5) * s[1] - h.y + self.offset[1],
                      (i[2] as Lengthf32 + 0.5) * s[2] - h.z + self.offset[2])
    }

    /// Point at which the segment from `p1` towards `p2` enters the volume,
    /// if it does.
    pub fn entry(&self, p1: Pointf32, p2: Pointf32) -> Option<Pointf32> {

        use ncollide3d::query::RayCast;
        use ncollide3d::shape::Cuboid;

        type Ray      = ncollide3d::query::Ray    <Lengthf32>;
        type Isometry = ncollide3d::math::Isometry<Lengthf32>;

        // Work in a frame with the volume centred on the origin
        let shift = Vectorf32::new(self.offset[0], self.offset[1], self.offset[2]);
        let p1 = p1 - shift;
        let p2 = p2 - shift;

        let lor_direction = (p2 - p1).normalize();
        let lor_length    = (p2 - p1).norm();
        let lor: Ray = Ray::new(p1, lor_direction);
        let iso: Isometry = Isometry::identity();
        Cuboid::new(self.half_width())
            .toi_with_ray(&iso, &lor, lor_length, true)
            .map(|toi| lor.origin + lor.dir * toi + shift)
    }
}
