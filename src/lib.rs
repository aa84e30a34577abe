//! # NIfTI-volume library
//!
//! This crate turns a NIfTI file into a volume ready for direct volume
//! rendering.
//!
//! A processed volume (usually quantized to 8 bits upstream) is fetched,
//! gunzipped when needed, and decoded into a [`ScalarField`]: the voxel
//! grid together with its dimensions, physical spacing and datatype. The
//! field is then wrapped into a [`SceneVolume`] carrying a fixed PET-style
//! heatmap and a background-suppressing opacity ramp, and swapped into a
//! [`RenderSession`] that owns the renderer for the lifetime of the
//! viewport.
//!
//! Supported input:
//!  - Single-file NIfTI-1 (`n+1`) and NIfTI-2 (`n+2`), either byte order
//!  - Unsigned 8-bit, signed 16-bit and 32-bit float voxels; other datatype
//!    codes are read as unsigned 8-bit and reported as a fallback
//!  - 3D volumes (only the first volume of a time series is used)
//!
//! The affine is not modeled: volumes are placed at the origin with their
//! voxel spacing.
//!
//! # Examples
//!
//! ## Decoding a file and previewing its center slice
//!
//! ```no_run
//! # use nifti_volume::{ColorTransferFunction, OpacityTransferFunction, Orientation, VolumeLoader};
//! let field = VolumeLoader::load_from_path("pet.nii.gz")
//!     .expect("should have decoded the volume")
//!     .into_field();
//! let image = field
//!     .get_image_from_axis(
//!         field.dim().0 / 2,
//!         Orientation::Axial,
//!         &ColorTransferFunction::pet_heatmap(),
//!         &OpacityTransferFunction::background_suppression(),
//!     )
//!     .expect("should have returned image at center of volume");
//! image.save("result.png").expect("should have written the image");
//! ```

pub mod enums;
pub mod fetch;
pub mod gpu_renderer;
pub mod header;
pub mod renderer;
pub mod scene;
pub mod session;
pub mod transfer_function;
pub mod volume;
pub mod volume_loader;
pub mod volume_writer;

pub use enums::{Orientation, ScalarType, SceneState};
pub use fetch::{FileFetcher, ResourceFetcher, fetch_and_decode};
pub use gpu_renderer::WgpuRenderer;
pub use header::VolumeHeader;
pub use renderer::{RendererConfig, RendererError, VolumeRenderer};
pub use scene::{Bounds, SceneVolume, VolumeGeometry};
pub use session::{LoadError, LoadStatus, LoadTicket, RenderSession};
pub use transfer_function::{ColorTransferFunction, OpacityTransferFunction};
pub use volume::{ScalarField, VoxelBuffer};
pub use volume_loader::{DecodeOutcome, RawAsset, VolumeLoader, VolumeLoaderError};
pub use volume_writer::VolumeWriter;
