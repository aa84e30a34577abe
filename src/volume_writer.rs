use crate::header::{EXTENSION_FLAG_SIZE, NIFTI1_HEADER_SIZE, NIFTI1_MAGIC, NIFTI1_MAGIC_OFFSET};
use crate::volume::{ScalarField, VoxelBuffer};

use flate2::{Compression, write::GzEncoder};
use std::io::{self, Write};

/// Voxel data offset: header plus the 4-byte extension flag.
const VOX_OFFSET: usize = NIFTI1_HEADER_SIZE + EXTENSION_FLAG_SIZE;

pub struct VolumeWriter;

impl VolumeWriter {
    /// Serialize a field as a little-endian single-file NIfTI-1 volume.
    ///
    /// The datatype written is the one of the voxel buffer, so a field read
    /// through the 8-bit fallback is written back as 8-bit.
    pub fn encode(field: &ScalarField, compress: bool) -> io::Result<Vec<u8>> {
        let header = field.header();
        let voxels = field.voxels();
        let scalar_type = voxels.scalar_type();

        let to_i16 = |v: usize| {
            i16::try_from(v).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("extent {v} does not fit a NIfTI-1 header"),
                )
            })
        };
        let (x, y, z) = header.dims;
        let dim = [3, to_i16(x)?, to_i16(y)?, to_i16(z)?, 1, 1, 1, 1];
        let (sx, sy, sz) = header.spacing;
        let pixdim = [1.0f32, sx, sy, sz, 0.0, 0.0, 0.0, 0.0];

        let mut bytes = vec![0u8; VOX_OFFSET];
        bytes[0..4].copy_from_slice(&(NIFTI1_HEADER_SIZE as i32).to_le_bytes());
        for i in 0..8 {
            bytes[40 + 2 * i..42 + 2 * i].copy_from_slice(&dim[i].to_le_bytes());
            bytes[76 + 4 * i..80 + 4 * i].copy_from_slice(&pixdim[i].to_le_bytes());
        }
        bytes[70..72].copy_from_slice(&scalar_type.code().to_le_bytes());
        bytes[72..74].copy_from_slice(&((scalar_type.size() * 8) as i16).to_le_bytes());
        bytes[108..112].copy_from_slice(&(VOX_OFFSET as f32).to_le_bytes());
        bytes[112..116].copy_from_slice(&header.scl_slope.to_le_bytes());
        bytes[116..120].copy_from_slice(&header.scl_inter.to_le_bytes());
        let description = header.description.as_bytes();
        let len = description.len().min(79);
        bytes[148..148 + len].copy_from_slice(&description[..len]);
        bytes[NIFTI1_MAGIC_OFFSET..NIFTI1_MAGIC_OFFSET + 4].copy_from_slice(NIFTI1_MAGIC);

        bytes.reserve(voxels.len() * scalar_type.size());
        match voxels {
            VoxelBuffer::UInt8(data) => bytes.extend(data.iter()),
            VoxelBuffer::Int16(data) => bytes.extend(data.iter().flat_map(|v| v.to_le_bytes())),
            VoxelBuffer::Float32(data) => bytes.extend(data.iter().flat_map(|v| v.to_le_bytes())),
        }

        if !compress {
            return Ok(bytes);
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bytes)?;
        encoder.finish()
    }
}
