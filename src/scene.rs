use crate::transfer_function::{
    ColorTransferFunction, OpacityTransferFunction, SCALAR_RANGE, bake_lookup_table,
};
use crate::volume::ScalarField;

/// Axis-aligned bounds in physical units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Bounds {
    pub fn center(&self) -> [f32; 3] {
        std::array::from_fn(|i| (self.min[i] + self.max[i]) * 0.5)
    }

    pub fn diagonal(&self) -> f32 {
        (0..3)
            .map(|i| (self.max[i] - self.min[i]).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Grid geometry of a scalar field: voxel counts, spacing and origin,
/// all ordered (x, y, z).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeGeometry {
    pub dims: [usize; 3],
    pub spacing: [f32; 3],
    pub origin: [f32; 3],
}

impl VolumeGeometry {
    pub fn from_field(field: &ScalarField) -> Self {
        let header = field.header();
        let (x, y, z) = header.dims;
        let (sx, sy, sz) = header.spacing;
        let (ox, oy, oz) = header.origin;
        Self {
            dims: [x, y, z],
            spacing: [sx, sy, sz],
            origin: [ox, oy, oz],
        }
    }

    /// Bounds spanned by the voxel centers.
    pub fn bounds(&self) -> Bounds {
        let max = std::array::from_fn(|i| {
            self.origin[i] + (self.dims[i].saturating_sub(1)) as f32 * self.spacing[i]
        });
        Bounds {
            min: self.origin,
            max,
        }
    }
}

/// A scalar field ready for the renderer, with its geometry and the fixed
/// heatmap transfer functions.
#[derive(Clone, Debug)]
pub struct SceneVolume {
    field: ScalarField,
    geometry: VolumeGeometry,
    color: ColorTransferFunction,
    opacity: OpacityTransferFunction,
}

impl SceneVolume {
    /// Wrap a decoded field with the PET heatmap and background-suppressing
    /// opacity presets.
    ///
    /// The presets cover [`SCALAR_RANGE`] whatever the data holds; data
    /// outside it renders saturated.
    pub fn configure(field: ScalarField) -> Self {
        if let Some((lo, hi)) = field.scalar_range() {
            if lo < SCALAR_RANGE.0 || hi > SCALAR_RANGE.1 {
                log::debug!(
                    "data range [{lo}, {hi}] exceeds transfer function range {SCALAR_RANGE:?}"
                );
            }
        }
        Self {
            geometry: VolumeGeometry::from_field(&field),
            field,
            color: ColorTransferFunction::pet_heatmap(),
            opacity: OpacityTransferFunction::background_suppression(),
        }
    }

    pub fn field(&self) -> &ScalarField {
        &self.field
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    pub fn color(&self) -> &ColorTransferFunction {
        &self.color
    }

    pub fn opacity(&self) -> &OpacityTransferFunction {
        &self.opacity
    }

    pub fn bounds(&self) -> Bounds {
        self.geometry.bounds()
    }

    pub fn lookup_table(&self, resolution: u32) -> Vec<[u8; 4]> {
        bake_lookup_table(&self.color, &self.opacity, resolution)
    }
}
