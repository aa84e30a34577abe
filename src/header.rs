use crate::enums::{Endianness, NiftiVersion, ScalarType};
use crate::volume_loader::VolumeLoaderError;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

pub(crate) const NIFTI1_HEADER_SIZE: usize = 348;
pub(crate) const NIFTI2_HEADER_SIZE: usize = 540;
pub(crate) const NIFTI1_MAGIC: &[u8; 4] = b"n+1\0";
pub(crate) const NIFTI1_MAGIC_OFFSET: usize = 344;

const NIFTI1_PAIR_MAGIC: &[u8; 4] = b"ni1\0";
const NIFTI2_MAGIC: &[u8; 4] = b"n+2\0";
const NIFTI2_PAIR_MAGIC: &[u8; 4] = b"ni2\0";
const NIFTI2_MAGIC_OFFSET: usize = 4;
pub(crate) const EXTENSION_FLAG_SIZE: usize = 4;

pub(crate) const NOT_RECOGNIZED: &str = "not a recognized volume file";

/// Decoded NIfTI header, reduced to what volume rendering needs.
///
/// `dims` and `spacing` are ordered (x, y, z). The origin is always
/// (0, 0, 0): the affine (qform/sform) is not modeled.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeHeader {
    pub version: NiftiVersion,
    pub endianness: Endianness,
    /// Declared dimensionality, `dim[0]` in the file.
    pub ndim: u16,
    pub dims: (usize, usize, usize),
    pub spacing: (f32, f32, f32),
    pub origin: (f32, f32, f32),
    /// Raw datatype code as stored in the file.
    pub datatype: i16,
    /// Declared bits per sample.
    pub bitpix: i16,
    /// Number of 3D volumes in the file; only the first is decoded.
    pub time_points: usize,
    /// Byte offset of the voxel payload.
    pub vox_offset: usize,
    /// Intensity scaling, reported but never applied.
    pub scl_slope: f32,
    pub scl_inter: f32,
    pub description: String,
}

impl VolumeHeader {
    /// Parse the header at the start of an (already decompressed) buffer.
    ///
    /// # Errors
    ///
    /// `Format` if the buffer is not a single-file NIfTI-1/NIfTI-2 volume,
    /// `Decode` if the header is recognized but structurally unusable.
    pub fn parse(bytes: &[u8]) -> Result<Self, VolumeLoaderError> {
        let (version, endianness) = Self::detect(bytes)?;

        let raw = match (version, endianness) {
            (NiftiVersion::Nifti1, Endianness::Little) => RawHeader::nifti1::<LittleEndian>(bytes),
            (NiftiVersion::Nifti1, Endianness::Big) => RawHeader::nifti1::<BigEndian>(bytes),
            (NiftiVersion::Nifti2, Endianness::Little) => RawHeader::nifti2::<LittleEndian>(bytes),
            (NiftiVersion::Nifti2, Endianness::Big) => RawHeader::nifti2::<BigEndian>(bytes),
        };

        let axes = SpatialAxes::resolve(&raw.dim, &raw.pixdim)?;
        let vox_offset = Self::vox_offset(raw.vox_offset, version)?;

        let header = Self {
            version,
            endianness,
            ndim: axes.ndim,
            dims: axes.dims,
            spacing: axes.spacing,
            origin: (0.0, 0.0, 0.0),
            datatype: raw.datatype,
            bitpix: raw.bitpix,
            time_points: axes.time_points,
            vox_offset,
            scl_slope: raw.scl_slope,
            scl_inter: raw.scl_inter,
            description: raw.description,
        };
        log::debug!(
            "parsed {:?} header ({:?}): dims {:?}, spacing {:?}, datatype {}",
            header.version,
            header.endianness,
            header.dims,
            header.spacing,
            header.datatype
        );
        Ok(header)
    }

    /// Scalar type declared by the header, `None` if the code is unsupported.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        ScalarType::from_code(self.datatype)
    }

    /// Bytes per stored sample according to `bitpix`, if it names whole bytes.
    pub fn declared_sample_size(&self) -> Option<usize> {
        match self.bitpix {
            bits if bits > 0 && bits % 8 == 0 => Some(bits as usize / 8),
            _ => None,
        }
    }

    /// Number of voxels in one 3D volume.
    pub fn voxel_count(&self) -> usize {
        self.dims.0 * self.dims.1 * self.dims.2
    }

    fn detect(bytes: &[u8]) -> Result<(NiftiVersion, Endianness), VolumeLoaderError> {
        let not_recognized = || VolumeLoaderError::Format(NOT_RECOGNIZED.to_string());

        let sizeof_hdr = bytes.get(..4).ok_or_else(not_recognized)?;
        let sizeof_hdr_le = LittleEndian::read_i32(sizeof_hdr);
        let sizeof_hdr_be = BigEndian::read_i32(sizeof_hdr);

        let (version, endianness) = match (sizeof_hdr_le, sizeof_hdr_be) {
            (348, _) => (NiftiVersion::Nifti1, Endianness::Little),
            (_, 348) => (NiftiVersion::Nifti1, Endianness::Big),
            (540, _) => (NiftiVersion::Nifti2, Endianness::Little),
            (_, 540) => (NiftiVersion::Nifti2, Endianness::Big),
            _ => return Err(not_recognized()),
        };

        let (offset, single, pair) = match version {
            NiftiVersion::Nifti1 => (NIFTI1_MAGIC_OFFSET, NIFTI1_MAGIC, NIFTI1_PAIR_MAGIC),
            NiftiVersion::Nifti2 => (NIFTI2_MAGIC_OFFSET, NIFTI2_MAGIC, NIFTI2_PAIR_MAGIC),
        };
        if bytes.len() < header_size(version) {
            return Err(not_recognized());
        }

        let magic = &bytes[offset..offset + 4];
        if magic == single {
            Ok((version, endianness))
        } else if magic == pair {
            Err(VolumeLoaderError::Decode(
                "detached voxel data (.hdr/.img pair) is not supported".to_string(),
            ))
        } else {
            Err(not_recognized())
        }
    }

    /// Single files keep 4 extension-flag bytes between header and voxels.
    fn vox_offset(raw: f64, version: NiftiVersion) -> Result<usize, VolumeLoaderError> {
        let minimum = header_size(version) + EXTENSION_FLAG_SIZE;
        if !raw.is_finite() || raw.fract() != 0.0 || raw < minimum as f64 {
            return Err(VolumeLoaderError::Decode(format!(
                "voxel offset {raw} is below {minimum}"
            )));
        }
        Ok(raw as usize)
    }
}

fn header_size(version: NiftiVersion) -> usize {
    match version {
        NiftiVersion::Nifti1 => NIFTI1_HEADER_SIZE,
        NiftiVersion::Nifti2 => NIFTI2_HEADER_SIZE,
    }
}

/// Header fields as stored, before the spatial axes are resolved.
///
/// Both constructors expect a buffer already checked to hold a full header.
struct RawHeader {
    dim: [i64; 8],
    pixdim: [f64; 8],
    datatype: i16,
    bitpix: i16,
    vox_offset: f64,
    scl_slope: f32,
    scl_inter: f32,
    description: String,
}

impl RawHeader {
    fn nifti1<E: ByteOrder>(bytes: &[u8]) -> Self {
        let mut dim = [0i64; 8];
        let mut pixdim = [0f64; 8];
        for (i, (d, p)) in dim.iter_mut().zip(pixdim.iter_mut()).enumerate() {
            *d = i64::from(E::read_i16(&bytes[40 + 2 * i..]));
            *p = f64::from(E::read_f32(&bytes[76 + 4 * i..]));
        }
        Self {
            dim,
            pixdim,
            datatype: E::read_i16(&bytes[70..72]),
            bitpix: E::read_i16(&bytes[72..74]),
            vox_offset: f64::from(E::read_f32(&bytes[108..112])),
            scl_slope: E::read_f32(&bytes[112..116]),
            scl_inter: E::read_f32(&bytes[116..120]),
            description: text(&bytes[148..228]),
        }
    }

    fn nifti2<E: ByteOrder>(bytes: &[u8]) -> Self {
        let mut dim = [0i64; 8];
        let mut pixdim = [0f64; 8];
        for (i, (d, p)) in dim.iter_mut().zip(pixdim.iter_mut()).enumerate() {
            *d = E::read_i64(&bytes[16 + 8 * i..]);
            *p = E::read_f64(&bytes[104 + 8 * i..]);
        }
        Self {
            dim,
            pixdim,
            datatype: E::read_i16(&bytes[12..14]),
            bitpix: E::read_i16(&bytes[14..16]),
            vox_offset: E::read_i64(&bytes[168..176]) as f64,
            scl_slope: E::read_f64(&bytes[176..184]) as f32,
            scl_inter: E::read_f64(&bytes[184..192]) as f32,
            description: text(&bytes[240..320]),
        }
    }
}

/// NUL-terminated header text.
fn text(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).trim_end().to_string()
}

/// The x, y, z axes extracted from the 1-based `dim`/`pixdim` arrays.
///
/// Index 0 of both arrays is metadata (dimensionality and qfac); the
/// spatial axes live at indices 1..=3. Axes past `dim[0]` and axes with a
/// declared extent of 0 are singleton axes.
struct SpatialAxes {
    ndim: u16,
    dims: (usize, usize, usize),
    spacing: (f32, f32, f32),
    time_points: usize,
}

impl SpatialAxes {
    fn resolve(dim: &[i64; 8], pixdim: &[f64; 8]) -> Result<Self, VolumeLoaderError> {
        let ndim = dim[0];
        if !(1..=7).contains(&ndim) {
            return Err(VolumeLoaderError::Decode(format!(
                "dimensionality {ndim} outside 1..=7"
            )));
        }

        let mut extents = [1usize; 3];
        let mut spacing = [1f32; 3];
        for axis in 0..3 {
            let index = axis + 1;
            let used = (index as i64) <= ndim;

            if used {
                let extent = dim[index];
                if extent < 0 {
                    return Err(VolumeLoaderError::Decode(format!(
                        "negative extent {extent} on axis {axis}"
                    )));
                }
                extents[axis] = (extent as usize).max(1);
            }

            let step = pixdim[index];
            if step.is_finite() && step > 0.0 {
                spacing[axis] = step as f32;
            } else if used {
                return Err(VolumeLoaderError::Decode(format!(
                    "missing spacing on axis {axis} (pixdim {step})"
                )));
            }
        }

        extents
            .iter()
            .try_fold(1usize, |acc, &e| acc.checked_mul(e))
            .ok_or_else(|| VolumeLoaderError::Decode("voxel count overflows".to_string()))?;

        let time_points = if ndim >= 4 && dim[4] > 1 {
            dim[4] as usize
        } else {
            1
        };

        Ok(Self {
            ndim: ndim as u16,
            dims: (extents[0], extents[1], extents[2]),
            spacing: (spacing[0], spacing[1], spacing[2]),
            time_points,
        })
    }
}
