//! ## Allocator
//!
//! In Vulkan the application itself is responsible for allocating memory.
//! Most of the time however this will be done through some external allocator.
//!
//! Since there are several, vulkit provides a simple abstraction via the [Allocator] trait.
//! The trait owns the whole resource pairing: it creates the native handle together with
//! its backing allocation and destroys both together, exactly once.
//!
//! A default implementation based on [Traverse Research's](https://github.com/Traverse-Research/gpu-allocator)
//! `gpu-allocator` crate is included through the `default_allocator` feature that is enabled by default.

#[cfg(feature = "default_allocator")]
mod gpu_allocator;
#[cfg(feature = "default_allocator")]
pub use gpu_allocator::GpuAllocator;

use std::ptr::NonNull;

use ash::vk;

///Types of memory usage. Make sure to use GpuOnly wherever it applies to get optimal performance.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MemoryUsage {
    Unknown,
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
}

///Implemented by anything that can create and destroy images and buffers together with
/// their backing memory. [AllocatedImage](crate::resources::AllocatedImage) and
/// [AllocatedBuffer](crate::resources::AllocatedBuffer) are built on exactly this shape.
///
/// `destroy_*` consumes the allocation, which makes a double free unrepresentable at the
/// trait level. Mapping is only valid for host-visible allocations (`CpuToGpu` / `GpuToCpu`).
pub trait Allocator {
    type Allocation: Send + Sync + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    ///Creates the image described by `create_info` and binds it to a fresh allocation.
    fn create_image(
        &mut self,
        create_info: &vk::ImageCreateInfo,
        usage: MemoryUsage,
    ) -> Result<(vk::Image, Self::Allocation), Self::Error>;

    ///Destroys `image` and frees `allocation`. Must be the pair returned by [Allocator::create_image].
    fn destroy_image(&mut self, image: vk::Image, allocation: Self::Allocation);

    ///Creates the buffer described by `create_info` and binds it to a fresh allocation.
    fn create_buffer(
        &mut self,
        create_info: &vk::BufferCreateInfo,
        usage: MemoryUsage,
    ) -> Result<(vk::Buffer, Self::Allocation), Self::Error>;

    ///Destroys `buffer` and frees `allocation`. Must be the pair returned by [Allocator::create_buffer].
    fn destroy_buffer(&mut self, buffer: vk::Buffer, allocation: Self::Allocation);

    ///Maps the allocation into host address space.
    fn map_memory(&mut self, allocation: &mut Self::Allocation)
    -> Result<NonNull<u8>, Self::Error>;

    ///Releases a mapping obtained from [Allocator::map_memory]. Allocators that keep
    /// host-visible memory persistently mapped may treat this as a no-op.
    fn unmap_memory(&mut self, allocation: &mut Self::Allocation);
}
