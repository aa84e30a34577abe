use crate::enums::{Endianness, ScalarType};
use crate::header::VolumeHeader;
use crate::volume::{ScalarField, VoxelBuffer};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::MultiGzDecoder;
use ndarray::Array3;
use std::{fs, io::Read, path::Path};
use thiserror::Error;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

/// Bytes of one load request, exactly as fetched.
pub struct RawAsset {
    bytes: Vec<u8>,
    is_compressed: bool,
}

impl RawAsset {
    pub fn new(bytes: Vec<u8>) -> Self {
        let is_compressed = bytes.starts_with(&GZIP_MAGIC);
        Self {
            bytes,
            is_compressed,
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.is_compressed
    }

    /// Consume the asset, inflating it fully if it is gzip-compressed.
    pub fn into_decompressed(self) -> Result<Vec<u8>, VolumeLoaderError> {
        if !self.is_compressed {
            return Ok(self.bytes);
        }
        let mut decompressed = Vec::with_capacity(self.bytes.len() * 4);
        MultiGzDecoder::new(self.bytes.as_slice())
            .read_to_end(&mut decompressed)
            .map_err(|e| VolumeLoaderError::Format(format!("corrupt gzip stream: {e}")))?;
        Ok(decompressed)
    }
}

/// Result of a successful decode.
///
/// `DecodedWithFallback` carries the unsupported datatype code whose payload
/// was read as unsigned 8-bit samples.
#[derive(Debug)]
pub enum DecodeOutcome {
    Decoded(ScalarField),
    DecodedWithFallback(ScalarField, i16),
}

impl DecodeOutcome {
    pub fn field(&self) -> &ScalarField {
        match self {
            Self::Decoded(field) | Self::DecodedWithFallback(field, _) => field,
        }
    }

    pub fn into_field(self) -> ScalarField {
        match self {
            Self::Decoded(field) | Self::DecodedWithFallback(field, _) => field,
        }
    }

    pub fn fallback_code(&self) -> Option<i16> {
        match self {
            Self::Decoded(_) => None,
            Self::DecodedWithFallback(_, code) => Some(*code),
        }
    }
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Decode a NIfTI volume, gzip-compressed or not, from its bytes
    ///
    /// # Errors
    ///
    /// `Format` if the bytes are not a NIfTI volume, `Decode` if the header
    /// is unusable or the voxel payload does not match the declared
    /// dimensions.
    pub fn decode(bytes: Vec<u8>) -> Result<DecodeOutcome, VolumeLoaderError> {
        let bytes = RawAsset::new(bytes).into_decompressed()?;
        let header = VolumeHeader::parse(&bytes)?;

        let (scalar_type, fallback) = match header.scalar_type() {
            Some(scalar_type) => (scalar_type, None),
            None => {
                log::info!(
                    "unsupported datatype code {}, reading voxels as unsigned 8-bit",
                    header.datatype
                );
                (ScalarType::UInt8, Some(header.datatype))
            }
        };

        let voxels = Self::decode_voxels(&bytes, &header, scalar_type, fallback.is_some())?;
        let field = ScalarField::new(header, voxels)?;

        Ok(match fallback {
            None => DecodeOutcome::Decoded(field),
            Some(code) => DecodeOutcome::DecodedWithFallback(field, code),
        })
    }

    /// Load a volume from a `.nii` or `.nii.gz` file
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<DecodeOutcome, VolumeLoaderError> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| VolumeLoaderError::Transport(format!("{}: {e}", path.display())))?;
        Self::decode(bytes)
    }

    /// Read the first 3D volume of the payload.
    ///
    /// A fallback stores samples of the declared `bitpix` width; the voxel
    /// buffer then holds the first bytes of the payload, one per voxel.
    fn decode_voxels(
        bytes: &[u8],
        header: &VolumeHeader,
        scalar_type: ScalarType,
        fallback: bool,
    ) -> Result<VoxelBuffer, VolumeLoaderError> {
        let payload = bytes.get(header.vox_offset..).unwrap_or_default();
        let count = header.voxel_count();
        let width = if fallback {
            header.declared_sample_size().unwrap_or(1)
        } else {
            scalar_type.size()
        };
        let needed = count
            .checked_mul(width)
            .ok_or_else(|| VolumeLoaderError::Decode("voxel payload size overflows".to_string()))?;

        Self::validate_payload_length(payload.len(), needed, width, count, header.time_points)?;

        let (x, y, z) = header.dims;
        let shape = (z, y, x);

        let voxels = match (scalar_type, header.endianness) {
            (ScalarType::UInt8, _) => {
                VoxelBuffer::UInt8(Self::build_volume_array(shape, payload[..count].to_vec())?)
            }
            (ScalarType::Int16, Endianness::Little) => {
                VoxelBuffer::Int16(Self::build_volume_array(shape, read_int16::<LittleEndian>(payload, count))?)
            }
            (ScalarType::Int16, Endianness::Big) => {
                VoxelBuffer::Int16(Self::build_volume_array(shape, read_int16::<BigEndian>(payload, count))?)
            }
            (ScalarType::Float32, Endianness::Little) => {
                VoxelBuffer::Float32(Self::build_volume_array(shape, read_float32::<LittleEndian>(payload, count))?)
            }
            (ScalarType::Float32, Endianness::Big) => {
                VoxelBuffer::Float32(Self::build_volume_array(shape, read_float32::<BigEndian>(payload, count))?)
            }
        };
        Ok(voxels)
    }

    /// The payload must hold every declared time point, and nothing more.
    fn validate_payload_length(
        available: usize,
        needed: usize,
        width: usize,
        count: usize,
        time_points: usize,
    ) -> Result<(), VolumeLoaderError> {
        let expected = needed
            .checked_mul(time_points)
            .ok_or_else(|| VolumeLoaderError::Decode("voxel payload size overflows".to_string()))?;
        if available != expected {
            return Err(VolumeLoaderError::Decode(format!(
                "voxel buffer holds {} elements, header declares {}",
                available / width,
                count * time_points
            )));
        }
        Ok(())
    }

    fn build_volume_array<T>(
        shape: (usize, usize, usize),
        samples: Vec<T>,
    ) -> Result<Array3<T>, VolumeLoaderError> {
        Array3::from_shape_vec(shape, samples)
            .map_err(|e| VolumeLoaderError::Decode(format!("voxel buffer shape: {e}")))
    }
}

fn read_int16<E: ByteOrder>(payload: &[u8], count: usize) -> Vec<i16> {
    let mut samples = vec![0i16; count];
    E::read_i16_into(&payload[..count * 2], &mut samples);
    samples
}

fn read_float32<E: ByteOrder>(payload: &[u8], count: usize) -> Vec<f32> {
    let mut samples = vec![0f32; count];
    E::read_f32_into(&payload[..count * 4], &mut samples);
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume_writer::VolumeWriter;

    fn field_u8(dims: (usize, usize, usize), values: Vec<u8>) -> ScalarField {
        let (x, y, z) = dims;
        ScalarField::from_voxels(
            VoxelBuffer::UInt8(Array3::from_shape_vec((z, y, x), values).unwrap()),
            (1.0, 1.0, 1.0),
        )
    }

    #[test]
    fn test_raw_asset_detects_gzip() {
        assert!(RawAsset::new(vec![0x1f, 0x8b, 0x08]).is_compressed());
        assert!(!RawAsset::new(vec![0x5c, 0x01, 0x00, 0x00]).is_compressed());
        assert!(!RawAsset::new(Vec::new()).is_compressed());
    }

    #[test]
    fn test_decode_single_voxel_with_singleton_axes() {
        let field = field_u8((1, 1, 1), vec![200]);
        let mut bytes = VolumeWriter::encode(&field, false).unwrap();
        // dim = (1, 0, 1, 1, 0, ...), pixdim = (1, 2, 2, 2, 0, ...)
        let dim: [i16; 8] = [1, 0, 1, 1, 0, 0, 0, 0];
        let pixdim: [f32; 8] = [1.0, 2.0, 2.0, 2.0, 0.0, 0.0, 0.0, 0.0];
        for i in 0..8 {
            bytes[40 + 2 * i..42 + 2 * i].copy_from_slice(&dim[i].to_le_bytes());
            bytes[76 + 4 * i..80 + 4 * i].copy_from_slice(&pixdim[i].to_le_bytes());
        }
        assert_eq!(bytes.len(), 353);

        let outcome = VolumeLoader::decode(bytes).unwrap();
        assert_eq!(outcome.fallback_code(), None);
        let field = outcome.into_field();
        assert_eq!(field.header().dims, (1, 1, 1));
        assert_eq!(field.header().spacing, (2.0, 2.0, 2.0));
        assert_eq!(field.voxels().value_at((0, 0, 0)), Some(200.0));
    }

    #[test]
    fn test_decode_rejects_unrecognized_bytes() {
        let err = VolumeLoader::decode(b"definitely not a volume".to_vec()).unwrap_err();
        assert!(matches!(err, VolumeLoaderError::Format(_)));
        assert_eq!(err.to_string(), "Format error: not a recognized volume file");
    }

    #[test]
    fn test_decode_rejects_short_payload() {
        let field = field_u8((2, 2, 2), (0..8).collect());
        let mut bytes = VolumeWriter::encode(&field, false).unwrap();
        bytes.pop();

        let err = VolumeLoader::decode(bytes).unwrap_err();
        assert!(matches!(err, VolumeLoaderError::Decode(_)));
        assert!(err.to_string().contains("7 elements"));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let field = field_u8((2, 2, 2), (0..8).collect());
        let mut bytes = VolumeWriter::encode(&field, false).unwrap();
        bytes.push(0);
        assert!(matches!(
            VolumeLoader::decode(bytes),
            Err(VolumeLoaderError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_keeps_first_time_point() {
        let field = field_u8((2, 1, 1), vec![7, 9]);
        let mut bytes = VolumeWriter::encode(&field, false).unwrap();
        bytes[40..42].copy_from_slice(&4i16.to_le_bytes());
        bytes[48..50].copy_from_slice(&3i16.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3, 4]);

        let field = VolumeLoader::decode(bytes).unwrap().into_field();
        assert_eq!(field.header().time_points, 3);
        assert_eq!(field.voxels().len(), 2);
        assert_eq!(field.voxels().value_at((1, 0, 0)), Some(9.0));
    }

    #[test]
    fn test_decode_gzip_matches_uncompressed() {
        let field = field_u8((3, 2, 2), (0..12).map(|v| v * 20).collect());
        let plain = VolumeWriter::encode(&field, false).unwrap();
        let packed = VolumeWriter::encode(&field, true).unwrap();
        assert!(RawAsset::new(packed.clone()).is_compressed());

        let a = VolumeLoader::decode(plain).unwrap().into_field();
        let b = VolumeLoader::decode(packed).unwrap().into_field();
        assert_eq!(a, b);
    }

    #[test]
    fn test_decode_corrupt_gzip() {
        let field = field_u8((2, 2, 2), (0..8).collect());
        let mut packed = VolumeWriter::encode(&field, true).unwrap();
        packed.truncate(packed.len() / 2);
        assert!(matches!(
            VolumeLoader::decode(packed),
            Err(VolumeLoaderError::Format(_))
        ));
    }

    #[test]
    fn test_decode_uses_declared_width() {
        let values = vec![-300i16, 0, 1200, i16::MAX];
        let field = ScalarField::from_voxels(
            VoxelBuffer::Int16(Array3::from_shape_vec((1, 2, 2), values).unwrap()),
            (1.0, 1.0, 1.0),
        );
        let bytes = VolumeWriter::encode(&field, false).unwrap();

        let decoded = VolumeLoader::decode(bytes).unwrap().into_field();
        assert_eq!(decoded.voxels().scalar_type(), ScalarType::Int16);
        assert_eq!(decoded.voxels().value_at((0, 0, 0)), Some(-300.0));
        assert_eq!(decoded.voxels().value_at((1, 1, 0)), Some(f32::from(i16::MAX)));
    }

    #[test]
    fn test_decode_float32() {
        let values = vec![0.25f32, -1.5, 3.0, 1e6, 0.0, 7.75];
        let field = ScalarField::from_voxels(
            VoxelBuffer::Float32(Array3::from_shape_vec((1, 2, 3), values).unwrap()),
            (0.5, 0.5, 4.0),
        );
        let bytes = VolumeWriter::encode(&field, false).unwrap();

        let decoded = VolumeLoader::decode(bytes).unwrap().into_field();
        assert_eq!(decoded.header().spacing, (0.5, 0.5, 4.0));
        assert_eq!(decoded.voxels().value_at((1, 0, 0)), Some(-1.5));
        assert_eq!(decoded.voxels().value_at((2, 1, 0)), Some(7.75));
    }

    #[test]
    fn test_decode_big_endian_int16() {
        let mut bytes = vec![0u8; 352];
        bytes[0..4].copy_from_slice(&348i32.to_be_bytes());
        let dim: [i16; 8] = [3, 2, 1, 1, 1, 1, 1, 1];
        for i in 0..8 {
            bytes[40 + 2 * i..42 + 2 * i].copy_from_slice(&dim[i].to_be_bytes());
            bytes[76 + 4 * i..80 + 4 * i].copy_from_slice(&1f32.to_be_bytes());
        }
        bytes[70..72].copy_from_slice(&4i16.to_be_bytes());
        bytes[108..112].copy_from_slice(&352f32.to_be_bytes());
        bytes[344..348].copy_from_slice(b"n+1\0");
        bytes.extend_from_slice(&513i16.to_be_bytes());
        bytes.extend_from_slice(&(-2i16).to_be_bytes());

        let field = VolumeLoader::decode(bytes).unwrap().into_field();
        assert_eq!(field.voxels().value_at((0, 0, 0)), Some(513.0));
        assert_eq!(field.voxels().value_at((1, 0, 0)), Some(-2.0));
    }

    #[test]
    fn test_decode_unknown_datatype_falls_back_to_u8() {
        let field = field_u8((2, 2, 1), vec![1, 2, 3, 4]);
        let mut bytes = VolumeWriter::encode(&field, false).unwrap();
        // DT_UINT16
        bytes[70..72].copy_from_slice(&512i16.to_le_bytes());

        let outcome = VolumeLoader::decode(bytes).unwrap();
        assert_eq!(outcome.fallback_code(), Some(512));
        let field = outcome.into_field();
        assert_eq!(field.voxels().scalar_type(), ScalarType::UInt8);
        assert_eq!(field.voxels().value_at((1, 1, 0)), Some(4.0));
    }

    #[test]
    fn test_decode_fallback_reads_declared_16_bit_payload() {
        let values = vec![258i16, 3, -1, 1000];
        let field = ScalarField::from_voxels(
            VoxelBuffer::Int16(Array3::from_shape_vec((1, 2, 2), values).unwrap()),
            (1.0, 1.0, 1.0),
        );
        let mut bytes = VolumeWriter::encode(&field, false).unwrap();
        // DT_UINT16, bitpix stays 16
        bytes[70..72].copy_from_slice(&512i16.to_le_bytes());
        assert_eq!(bytes.len(), 352 + 8);

        let outcome = VolumeLoader::decode(bytes).unwrap();
        assert_eq!(outcome.fallback_code(), Some(512));
        let field = outcome.into_field();
        assert_eq!(field.header().bitpix, 16);
        assert_eq!(
            field.voxels(),
            &VoxelBuffer::UInt8(Array3::from_shape_vec((1, 2, 2), vec![2, 1, 3, 0]).unwrap())
        );
    }

    #[test]
    fn test_decode_fallback_reads_declared_32_bit_payload() {
        let values = vec![1.0f32, 2.0, 3.0];
        let field = ScalarField::from_voxels(
            VoxelBuffer::Float32(Array3::from_shape_vec((1, 1, 3), values).unwrap()),
            (1.0, 1.0, 1.0),
        );
        let mut bytes = VolumeWriter::encode(&field, false).unwrap();
        // DT_UINT32, bitpix stays 32
        bytes[70..72].copy_from_slice(&768i16.to_le_bytes());

        let outcome = VolumeLoader::decode(bytes).unwrap();
        assert_eq!(outcome.fallback_code(), Some(768));
        let field = outcome.into_field();
        assert_eq!(field.voxels().scalar_type(), ScalarType::UInt8);
        assert_eq!(field.voxels().len(), 3);
        // 1.0f32 is 00 00 80 3f
        assert_eq!(field.voxels().value_at((2, 0, 0)), Some(128.0));
    }

    #[test]
    fn test_decode_fallback_still_checks_payload_length() {
        let field = ScalarField::from_voxels(
            VoxelBuffer::Int16(Array3::zeros((1, 2, 2))),
            (1.0, 1.0, 1.0),
        );
        let mut bytes = VolumeWriter::encode(&field, false).unwrap();
        bytes[70..72].copy_from_slice(&512i16.to_le_bytes());
        bytes.truncate(bytes.len() - 4);

        let err = VolumeLoader::decode(bytes).unwrap_err();
        assert!(matches!(err, VolumeLoaderError::Decode(_)));
        assert!(err.to_string().contains("2 elements"));
    }

    #[test]
    fn test_decode_rejects_truncated_time_series() {
        let field = field_u8((2, 1, 1), vec![7, 9]);
        let mut bytes = VolumeWriter::encode(&field, false).unwrap();
        bytes[40..42].copy_from_slice(&4i16.to_le_bytes());
        bytes[48..50].copy_from_slice(&3i16.to_le_bytes());
        bytes.push(1);

        let err = VolumeLoader::decode(bytes).unwrap_err();
        assert!(matches!(err, VolumeLoaderError::Decode(_)));
        assert!(err.to_string().contains("header declares 6"));
    }

    #[test]
    fn test_decode_is_deterministic() {
        let field = field_u8((4, 3, 2), (0..24).map(|v| v * 10).collect());
        let bytes = VolumeWriter::encode(&field, true).unwrap();
        let a = VolumeLoader::decode(bytes.clone()).unwrap().into_field();
        let b = VolumeLoader::decode(bytes).unwrap().into_field();
        assert_eq!(a, b);
        assert_eq!(a.voxels(), field.voxels());
    }
}
