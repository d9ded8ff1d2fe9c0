//! # Vulkit
//!
//! Thin ergonomic layer over [ash]. Vulkit wraps the lifetime sensitive Vulkan
//! objects (instance, device, images, buffers, views) into owners that destroy
//! themselves exactly once, and leaves everything else (create infos, flags,
//! command recording) as plain `ash` types.
//!
//! The two main entry points:
//! - [context]: instance creation, physical-device selection and logical-device
//!   setup. [Gpu::new](context::Gpu::new) rates all installed GPUs against the
//!   requested extensions, features and queue families and builds the device on
//!   the best one.
//! - [rendering]: attachment groups for dynamic rendering, single-sampled and
//!   multisampled, including the images backing them.
//!
//! Structures that are not sensitive to lifetime requirements (like create infos)
//! are not wrapped.

pub use ash;
#[cfg(feature = "default_allocator")]
pub use gpu_allocator;

pub mod allocator;
pub mod context;
pub mod error;
pub mod rendering;
pub mod resources;
pub mod util;

pub use error::{DeviceError, InstanceError, ResourceError, VulkitError};

#[cfg(test)]
pub(crate) mod testing;
