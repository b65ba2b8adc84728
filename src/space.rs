//! Discretized coordinate space over compressed projection data: the
//! canonical range of the forward projector.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::projdata::ProjDataGeometry;

/// A uniformly discretized box in (sinogram, angle, tangential) coordinates.
///
/// The first axis is the compound segment/axial ("(dz,z)") index in
/// `[0, num_sinograms]`; the second is the azimuthal angle in `[0, π)`; the
/// third is the tangential position, normalized to `[-radius, radius]`.
/// `radius` only rescales the axis bookkeeping, never the data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSpace {
    pub shape: [usize; 3],
    pub min_pt: [f32; 3],
    pub max_pt: [f32; 3],
}

impl ProjectionSpace {

    pub const AXIS_LABELS: [&'static str; 3] = ["(dz,z)", "phi", "s"];

    pub fn from_proj_geometry(geometry: &ProjDataGeometry, radius: f32) -> Self {
        let shape = geometry.shape();
        Self {
            shape,
            min_pt: [0.0, 0.0, -radius],
            max_pt: [shape[0] as f32, PI, radius],
        }
    }
}

// ------------------------------ TESTS ------------------------------
#[cfg(test)]
mod test {
    use super::*;
    use crate::scanner::Scanner;
    use float_eq::assert_float_eq;

    #[test]
    fn axes_follow_the_projection_geometry() {
        let scanner = Scanner::from_name("mCT").unwrap();
        let geometry = ProjDataGeometry::derive(&scanner, 1, 7, 56, 56, false, 2.0).unwrap();
        let space = ProjectionSpace::from_proj_geometry(&geometry, 1.0);
        assert_eq!(space.shape, [64, 56, 56]);
        assert_float_eq!(space.min_pt, [0.0, 0.0, -1.0], ulps <= [1, 1, 1]);
        assert_float_eq!(space.max_pt, [64.0, PI, 1.0], ulps <= [1, 1, 1]);
    }

    #[test]
    fn radius_rescales_only_the_tangential_axis() {
        let scanner = Scanner::from_name("mCT").unwrap();
        let geometry = ProjDataGeometry::derive(&scanner, 3, 7, 56, 56, false, 2.0).unwrap();
        let a = ProjectionSpace::from_proj_geometry(&geometry, 1.0);
        let b = ProjectionSpace::from_proj_geometry(&geometry, 250.0);
        assert_eq!(a.shape, b.shape);
        assert_float_eq!(b.min_pt[2], -250.0, ulps <= 1);
        assert_float_eq!(b.max_pt[2],  250.0, ulps <= 1);
    }
}
