use std::ptr::NonNull;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, AllocatorCreateDesc,
};
use thiserror::Error;

use crate::allocator::{Allocator, MemoryUsage};
use crate::context::Device;

impl From<MemoryUsage> for MemoryLocation {
    fn from(usage: MemoryUsage) -> MemoryLocation {
        match usage {
            MemoryUsage::Unknown => MemoryLocation::Unknown,
            MemoryUsage::GpuOnly => MemoryLocation::GpuOnly,
            MemoryUsage::CpuToGpu => MemoryLocation::CpuToGpu,
            MemoryUsage::GpuToCpu => MemoryLocation::GpuToCpu,
        }
    }
}

#[derive(Error, Debug)]
pub enum GpuAllocatorError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("gpu-allocator error: {0}")]
    Allocation(#[from] gpu_allocator::AllocationError),
    #[error("Allocation is not host visible, can not be mapped")]
    NotMapped,
}

///Default [Allocator] implementation on top of `gpu-allocator`. Keeps its device
/// alive so allocations can always be freed against a live handle.
pub struct GpuAllocator {
    pub device: Arc<Device>,
    pub inner: gpu_allocator::vulkan::Allocator,
}

impl GpuAllocator {
    pub fn new(device: &Arc<Device>) -> Result<Self, GpuAllocatorError> {
        let inner = gpu_allocator::vulkan::Allocator::new(&AllocatorCreateDesc {
            instance: device.instance.inner.clone(),
            device: device.inner.clone(),
            physical_device: device.physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_leaks_on_shutdown: true,
                ..Default::default()
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        Ok(GpuAllocator {
            device: device.clone(),
            inner,
        })
    }

    fn allocate(
        &mut self,
        requirements: vk::MemoryRequirements,
        usage: MemoryUsage,
        linear: bool,
    ) -> Result<Allocation, GpuAllocatorError> {
        Ok(self.inner.allocate(&AllocationCreateDesc {
            name: "vulkit",
            requirements,
            location: usage.into(),
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?)
    }

    fn free(&mut self, allocation: Allocation) {
        if let Err(e) = self.inner.free(allocation) {
            //NOTE: failed free happens "silently" as in, we don't panic. The allocator
            //      "knows" something is wrong and won't reuse the allocation anymore.
            log::error!("Freeing allocation failed with: {}", e);
        }
    }
}

impl Allocator for GpuAllocator {
    type Allocation = Allocation;
    type Error = GpuAllocatorError;

    fn create_image(
        &mut self,
        create_info: &vk::ImageCreateInfo,
        usage: MemoryUsage,
    ) -> Result<(vk::Image, Self::Allocation), Self::Error> {
        let image = unsafe { self.device.inner.create_image(create_info, None)? };
        let requirements = unsafe { self.device.inner.get_image_memory_requirements(image) };

        let allocation = match self.allocate(requirements, usage, false) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.inner.destroy_image(image, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe {
            self.device
                .inner
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        } {
            self.free(allocation);
            unsafe { self.device.inner.destroy_image(image, None) };
            return Err(e.into());
        }

        Ok((image, allocation))
    }

    fn destroy_image(&mut self, image: vk::Image, allocation: Self::Allocation) {
        unsafe { self.device.inner.destroy_image(image, None) };
        self.free(allocation);
    }

    fn create_buffer(
        &mut self,
        create_info: &vk::BufferCreateInfo,
        usage: MemoryUsage,
    ) -> Result<(vk::Buffer, Self::Allocation), Self::Error> {
        let buffer = unsafe { self.device.inner.create_buffer(create_info, None)? };
        let requirements = unsafe { self.device.inner.get_buffer_memory_requirements(buffer) };

        //buffers are always linear in memory
        let allocation = match self.allocate(requirements, usage, true) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.inner.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe {
            self.device
                .inner
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            self.free(allocation);
            unsafe { self.device.inner.destroy_buffer(buffer, None) };
            return Err(e.into());
        }

        Ok((buffer, allocation))
    }

    fn destroy_buffer(&mut self, buffer: vk::Buffer, allocation: Self::Allocation) {
        unsafe { self.device.inner.destroy_buffer(buffer, None) };
        self.free(allocation);
    }

    fn map_memory(
        &mut self,
        allocation: &mut Self::Allocation,
    ) -> Result<NonNull<u8>, Self::Error> {
        //gpu-allocator keeps host visible memory persistently mapped.
        allocation
            .mapped_ptr()
            .map(NonNull::cast)
            .ok_or(GpuAllocatorError::NotMapped)
    }

    fn unmap_memory(&mut self, _allocation: &mut Self::Allocation) {}
}
