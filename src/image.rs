//! In-memory image volume over a [`Fov`].

use crate::fov::Fov;
use crate::index::{index3_to_1, Index1_u, Index3_u};
use crate::Intensityf32;

pub type ImageData = Vec<Intensityf32>;

#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub fov: Fov,
    pub data: ImageData,
}

impl Image {

    pub fn new(fov: Fov, data: ImageData) -> Self {
        if data.len() != fov.num_voxels() {
            panic!("image data length {} does not match voxel grid {:?}", data.len(), fov.n);
        }
        Image { fov, data }
    }

    pub fn zeros(fov: Fov) -> Self { Self::new(fov, vec![0.0; fov.num_voxels()]) }
    pub fn ones (fov: Fov) -> Self { Self::new(fov, vec![1.0; fov.num_voxels()]) }
}

impl core::ops::IndexMut<Index1_u> for Image {
    #[inline]
    fn index_mut(&mut self, i: Index1_u) -> &mut Self::Output { &mut self.data[i] }
}

impl core::ops::Index<Index1_u> for Image {
    type Output = Intensityf32;
    #[inline]
    fn index(&self, i: Index1_u) -> &Self::Output { &self.data[i] }
}

impl core::ops::IndexMut<Index3_u> for Image {
    fn index_mut(&mut self, i3: Index3_u) -> &mut Self::Output {
        let i1 = index3_to_1(i3, self.fov.n);
        &mut self.data[i1]
    }
}

impl core::ops::Index<Index3_u> for Image {
    type Output = Intensityf32;
    fn index(&self, i3: Index3_u) -> &Self::Output {
        let i1 = index3_to_1(i3, self.fov.n);
        &self.data[i1]
    }
}
