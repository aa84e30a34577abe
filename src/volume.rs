use crate::enums::{Endianness, NiftiVersion, Orientation, ScalarType};
use crate::header::VolumeHeader;
use crate::transfer_function::{ColorTransferFunction, OpacityTransferFunction};
use crate::volume_loader::VolumeLoaderError;

use image::{ImageBuffer, Rgba, RgbaImage};
use ndarray::{Array2, Array3, ArrayView2, Axis, s};
use rayon::prelude::*;

/// Voxel samples of one 3D volume.
///
/// Arrays are shaped (depth, height, width), i.e. (z, y, x), so the
/// standard layout has x varying fastest like the NIfTI payload.
#[derive(Clone, Debug, PartialEq)]
pub enum VoxelBuffer {
    UInt8(Array3<u8>),
    Int16(Array3<i16>),
    Float32(Array3<f32>),
}

impl VoxelBuffer {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::UInt8(_) => ScalarType::UInt8,
            Self::Int16(_) => ScalarType::Int16,
            Self::Float32(_) => ScalarType::Float32,
        }
    }

    /// Get the dimensions of the buffer (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            Self::UInt8(data) => data.dim(),
            Self::Int16(data) => data.dim(),
            Self::Float32(data) => data.dim(),
        }
    }

    pub fn len(&self) -> usize {
        let (depth, height, width) = self.dim();
        depth * height * width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample at voxel coordinate (x, y, z).
    pub fn value_at(&self, (x, y, z): (usize, usize, usize)) -> Option<f32> {
        let index = [z, y, x];
        match self {
            Self::UInt8(data) => data.get(index).map(|&v| f32::from(v)),
            Self::Int16(data) => data.get(index).map(|&v| f32::from(v)),
            Self::Float32(data) => data.get(index).copied(),
        }
    }

    /// Raw sample bytes in native byte order, x fastest.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::UInt8(data) => data.as_slice(),
            Self::Int16(data) => data.as_slice().map(bytemuck::cast_slice),
            Self::Float32(data) => data.as_slice().map(bytemuck::cast_slice),
        }
    }

    /// Minimum and maximum sample, ignoring NaNs. `None` if there are none.
    pub fn scalar_range(&self) -> Option<(f32, f32)> {
        let fold = |acc: Option<(f32, f32)>, v: f32| match acc {
            _ if v.is_nan() => acc,
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        };
        match self {
            Self::UInt8(data) => data.iter().map(|&v| f32::from(v)).fold(None, fold),
            Self::Int16(data) => data.iter().map(|&v| f32::from(v)).fold(None, fold),
            Self::Float32(data) => data.iter().copied().fold(None, fold),
        }
    }

    fn slice_values(&self, index: usize, orientation: Orientation) -> Array2<f32> {
        fn take<T: Copy>(data: &Array3<T>, index: usize, orientation: Orientation) -> ArrayView2<'_, T> {
            match orientation {
                Orientation::Axial => data.slice(s![index, .., ..]),
                Orientation::Coronal => data.slice(s![.., index, ..]),
                Orientation::Sagittal => data.slice(s![.., .., index]),
            }
        }
        match self {
            Self::UInt8(data) => take(data, index, orientation).mapv(f32::from),
            Self::Int16(data) => take(data, index, orientation).mapv(f32::from),
            Self::Float32(data) => take(data, index, orientation).to_owned(),
        }
    }
}

/// A decoded volume: header and voxels from the same file.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarField {
    header: VolumeHeader,
    voxels: VoxelBuffer,
}

impl ScalarField {
    /// Pair a header with its voxels.
    ///
    /// # Errors
    ///
    /// `Decode` if the buffer shape differs from the header's dimensions.
    pub fn new(header: VolumeHeader, voxels: VoxelBuffer) -> Result<Self, VolumeLoaderError> {
        let (x, y, z) = header.dims;
        if voxels.dim() != (z, y, x) {
            return Err(VolumeLoaderError::Decode(format!(
                "voxel buffer shape {:?} does not match header dims {:?}",
                voxels.dim(),
                header.dims
            )));
        }
        Ok(Self { header, voxels })
    }

    /// Build a field with a synthesized single-file NIfTI-1 header.
    pub fn from_voxels(voxels: VoxelBuffer, spacing: (f32, f32, f32)) -> Self {
        let (depth, height, width) = voxels.dim();
        let header = VolumeHeader {
            version: NiftiVersion::Nifti1,
            endianness: Endianness::Little,
            ndim: 3,
            dims: (width, height, depth),
            spacing,
            origin: (0.0, 0.0, 0.0),
            datatype: voxels.scalar_type().code(),
            bitpix: (voxels.scalar_type().size() * 8) as i16,
            time_points: 1,
            vox_offset: 352,
            scl_slope: 0.0,
            scl_inter: 0.0,
            description: String::new(),
        };
        Self { header, voxels }
    }

    pub fn header(&self) -> &VolumeHeader {
        &self.header
    }

    pub fn voxels(&self) -> &VoxelBuffer {
        &self.voxels
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.voxels.dim()
    }

    pub fn spacing(&self) -> (f32, f32, f32) {
        self.header.spacing
    }

    pub fn scalar_range(&self) -> Option<(f32, f32)> {
        self.voxels.scalar_range()
    }

    pub fn into_parts(self) -> (VolumeHeader, VoxelBuffer) {
        (self.header, self.voxels)
    }

    /// Color one slice through the volume with the given transfer functions.
    ///
    /// Rows of the image follow the slowest remaining axis. Returns `None`
    /// if `index` is out of range for the orientation.
    pub fn get_image_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
        color: &ColorTransferFunction,
        opacity: &OpacityTransferFunction,
    ) -> Option<RgbaImage> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        let slice = self.voxels.slice_values(index, orientation);
        Self::slice_to_image(&slice.view(), color, opacity)
    }

    fn slice_to_image(
        slice: &ArrayView2<'_, f32>,
        color: &ColorTransferFunction,
        opacity: &OpacityTransferFunction,
    ) -> Option<RgbaImage> {
        let (height, width) = slice.dim();
        let pixel_data: Vec<u8> = slice
            .axis_iter(Axis(0))
            .into_par_iter()
            .flat_map_iter(|row| {
                row.iter()
                    .flat_map(|&v| Self::shade(v, color, opacity))
                    .collect::<Vec<u8>>()
            })
            .collect();
        ImageBuffer::<Rgba<u8>, _>::from_raw(width as u32, height as u32, pixel_data)
    }

    #[inline]
    fn shade(value: f32, color: &ColorTransferFunction, opacity: &OpacityTransferFunction) -> [u8; 4] {
        let to_u8 = |c: f32| (c * 255.0).round().clamp(0.0, 255.0) as u8;
        let [r, g, b] = color.sample(value);
        [to_u8(r), to_u8(g), to_u8(b), to_u8(opacity.sample(value))]
    }

    fn is_valid_index(&self, index: usize, orientation: Orientation) -> bool {
        let dim = self.dim();
        let max_index = match orientation {
            Orientation::Axial => dim.0,
            Orientation::Coronal => dim.1,
            Orientation::Sagittal => dim.2,
        };
        index < max_index
    }
}
