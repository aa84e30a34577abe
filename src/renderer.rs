use crate::scene::{Bounds, SceneVolume};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Render session is closed")]
    Closed,

    #[error("Volume of {dims:?} voxels exceeds the 3D texture limit of {limit}")]
    VolumeTooLarge { dims: [usize; 3], limit: u32 },

    #[error("Voxel buffer is not contiguous")]
    NonContiguous,

    #[error("No GPU adapter available: {0}")]
    Adapter(String),

    #[error("GPU device request failed: {0}")]
    Device(String),
}

/// A volume renderer the session drives.
///
/// `upload` allocates everything a volume needs on the renderer side
/// without touching the scene; `add_volume`/`remove_volume` change what is
/// displayed. Dropping a `Volume` returned by `upload` frees it.
pub trait VolumeRenderer {
    type Volume;

    fn upload(&mut self, volume: &SceneVolume) -> Result<Self::Volume, RendererError>;

    fn add_volume(&mut self, volume: &Self::Volume);

    fn remove_volume(&mut self, volume: Self::Volume);

    /// Frame the camera on `bounds`.
    fn reset_camera(&mut self, bounds: &Bounds);

    /// Request a redraw of the current scene.
    fn render(&mut self) -> Result<(), RendererError>;

    /// Free the rendering surface and everything allocated on it.
    fn release(&mut self);
}

#[derive(Clone, Debug, PartialEq)]
pub struct RendererConfig {
    pub background: [f32; 3],
    /// Number of entries in the baked transfer function lookup table.
    pub lut_resolution: u32,
    /// Vertical field of view in degrees.
    pub field_of_view: f32,
    /// Size of the render target in pixels.
    pub viewport: [u32; 2],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            background: [0.0, 0.0, 0.0],
            lut_resolution: 256,
            field_of_view: 30.0,
            viewport: [512, 512],
        }
    }
}

impl RendererConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_background(mut self, background: [f32; 3]) -> Self {
        self.background = background;
        self
    }

    pub fn with_lut_resolution(mut self, resolution: u32) -> Self {
        self.lut_resolution = resolution.max(2);
        self
    }

    pub fn with_field_of_view(mut self, degrees: f32) -> Self {
        self.field_of_view = degrees.clamp(1.0, 179.0);
        self
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = [width.max(1), height.max(1)];
        self
    }
}

/// Camera looking down -z at a focal point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: [f32; 3],
    pub focal_point: [f32; 3],
    pub view_up: [f32; 3],
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 1.0],
            focal_point: [0.0, 0.0, 0.0],
            view_up: [0.0, 1.0, 0.0],
        }
    }
}

impl Camera {
    /// Place the camera so a sphere enclosing `bounds` fills the view.
    pub fn framing(bounds: &Bounds, field_of_view: f32) -> Self {
        let focal_point = bounds.center();
        let radius = (bounds.diagonal() * 0.5).max(0.5);
        let distance = radius / (field_of_view.to_radians() * 0.5).sin();
        Self {
            position: [focal_point[0], focal_point[1], focal_point[2] + distance],
            focal_point,
            view_up: [0.0, 1.0, 0.0],
        }
    }

    pub fn distance(&self) -> f32 {
        (0..3)
            .map(|i| (self.position[i] - self.focal_point[i]).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderer_config_builder() {
        let config = RendererConfig::new()
            .with_background([0.1, 0.1, 0.1])
            .with_lut_resolution(0)
            .with_field_of_view(400.0)
            .with_viewport(0, 300);
        assert_eq!(config.background, [0.1, 0.1, 0.1]);
        assert_eq!(config.lut_resolution, 2);
        assert_eq!(config.field_of_view, 179.0);
        assert_eq!(config.viewport, [1, 300]);
    }

    #[test]
    fn test_camera_framing_centers_on_bounds() {
        let bounds = Bounds {
            min: [0.0, 0.0, 0.0],
            max: [6.0, 0.0, 8.0],
        };
        let camera = Camera::framing(&bounds, 60.0);
        assert_eq!(camera.focal_point, [3.0, 0.0, 4.0]);
        // radius 5 at half-angle 30 degrees
        assert!((camera.distance() - 10.0).abs() < 1e-4);
        assert_eq!(camera.position[0], 3.0);
    }

    #[test]
    fn test_camera_framing_single_voxel() {
        let bounds = Bounds {
            min: [0.0; 3],
            max: [0.0; 3],
        };
        let camera = Camera::framing(&bounds, 30.0);
        assert!(camera.distance() > 0.0);
    }
}
