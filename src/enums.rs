#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

/// Element type the voxel payload is reinterpreted as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarType {
    UInt8,
    Int16,
    Float32,
}

impl ScalarType {
    pub const NIFTI_UINT8: i16 = 2;
    pub const NIFTI_INT16: i16 = 4;
    pub const NIFTI_FLOAT32: i16 = 16;

    /// Maps a NIfTI datatype code to a scalar type, `None` for unsupported codes.
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            Self::NIFTI_UINT8 => Some(Self::UInt8),
            Self::NIFTI_INT16 => Some(Self::Int16),
            Self::NIFTI_FLOAT32 => Some(Self::Float32),
            _ => None,
        }
    }

    pub fn code(self) -> i16 {
        match self {
            Self::UInt8 => Self::NIFTI_UINT8,
            Self::Int16 => Self::NIFTI_INT16,
            Self::Float32 => Self::NIFTI_FLOAT32,
        }
    }

    /// Width of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::UInt8 => 1,
            Self::Int16 => 2,
            Self::Float32 => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NiftiVersion {
    Nifti1,
    Nifti2,
}

/// Observable state of the displayed scene.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SceneState {
    #[default]
    Empty,
    Loading,
    Displayed,
    Error,
}
