use std::error::Error;
use std::ffi::CString;

use ash::{LoadingError, vk};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstanceError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Failed to load Vulkan entry point: {0}")]
    EntryLoading(#[from] LoadingError),
    #[error("Instance layer {0:?} is not available")]
    MissingLayer(CString),
    #[error("Instance extension {0:?} is not available")]
    MissingExtension(CString),
    #[error("Could not acquire a display handle for the window")]
    NoDisplayHandle,
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("No physical device found. Is a Vulkan capable GPU and driver installed?")]
    NoPhysicalDevice,
    #[error("No physical device satisfies the requested extensions, features and queue families")]
    NoAdequatePhysicalDevice,
    #[error("Extension {0} is not supported by the device")]
    UnsupportedExtension(String),
    #[error("Queue families could not be derived for the selected device")]
    QueueFamiliesUnavailable,
}

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Allocation failed: {0}")]
    Allocation(#[source] Box<dyn Error + Send + Sync + 'static>),
    #[error("Color attachment count {requested} exceeds the supported maximum of {max}")]
    TooManyColorAttachments { requested: u32, max: u32 },
    #[error("Buffer write of {len} bytes at offset {offset} exceeds buffer size {size}")]
    BufferWriteOutOfBounds {
        offset: u64,
        len: u64,
        size: u64,
    },
}

#[derive(Error, Debug)]
pub enum VulkitError {
    #[error("Instance error: {0}")]
    InstanceError(#[from] InstanceError),
    #[error("Device error: {0}")]
    DeviceError(#[from] DeviceError),
    #[error("Resource error: {0}")]
    ResourceError(#[from] ResourceError),
    #[error("Other error: {0}")]
    Other(String),
}

#[cfg(test)]
mod test {
    use static_assertions::assert_impl_all;

    use crate::{
        VulkitError,
        error::{DeviceError, InstanceError, ResourceError},
    };

    #[test]
    fn assure_send_sync() {
        assert_impl_all!(InstanceError: Send, Sync);
        assert_impl_all!(DeviceError: Send, Sync);
        assert_impl_all!(ResourceError: Send, Sync);
        assert_impl_all!(VulkitError: Send, Sync);
    }
}
