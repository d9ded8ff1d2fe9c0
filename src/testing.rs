//! Shared test doubles. The mock allocator hands out fake handles and records
//! every destruction, which lets the ownership plumbing run without a GPU.

use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use ash::vk;
use ash::vk::Handle;
use thiserror::Error;

use crate::allocator::{Allocator, MemoryUsage};
use crate::context::PhysicalDeviceInfo;

#[derive(Error, Debug)]
pub enum MockError {
    #[error("mock allocation failed")]
    Failure,
}

pub struct MockAllocation {
    handle: u64,
    bytes: Box<[u8]>,
}

///Allocator double. Handles are a running counter, buffer allocations carry real
/// host memory so mapped writes and reads work.
pub struct MockAllocator {
    next_handle: u64,
    pub destroyed_images: Vec<u64>,
    pub destroyed_buffers: Vec<u64>,
}

impl MockAllocator {
    pub fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(MockAllocator {
            next_handle: 1,
            destroyed_images: Vec::new(),
            destroyed_buffers: Vec::new(),
        }))
    }

    fn next(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl Allocator for MockAllocator {
    type Allocation = MockAllocation;
    type Error = MockError;

    fn create_image(
        &mut self,
        _create_info: &vk::ImageCreateInfo,
        _usage: MemoryUsage,
    ) -> Result<(vk::Image, MockAllocation), MockError> {
        let handle = self.next();
        Ok((
            vk::Image::from_raw(handle),
            MockAllocation {
                handle,
                bytes: Box::default(),
            },
        ))
    }

    fn destroy_image(&mut self, image: vk::Image, allocation: MockAllocation) {
        assert_eq!(image.as_raw(), allocation.handle, "handle/allocation pair mixed up");
        self.destroyed_images.push(allocation.handle);
    }

    fn create_buffer(
        &mut self,
        create_info: &vk::BufferCreateInfo,
        _usage: MemoryUsage,
    ) -> Result<(vk::Buffer, MockAllocation), MockError> {
        let handle = self.next();
        Ok((
            vk::Buffer::from_raw(handle),
            MockAllocation {
                handle,
                bytes: vec![0u8; create_info.size as usize].into_boxed_slice(),
            },
        ))
    }

    fn destroy_buffer(&mut self, buffer: vk::Buffer, allocation: MockAllocation) {
        assert_eq!(buffer.as_raw(), allocation.handle, "handle/allocation pair mixed up");
        self.destroyed_buffers.push(allocation.handle);
    }

    fn map_memory(&mut self, allocation: &mut MockAllocation) -> Result<NonNull<u8>, MockError> {
        NonNull::new(allocation.bytes.as_mut_ptr()).ok_or(MockError::Failure)
    }

    fn unmap_memory(&mut self, _allocation: &mut MockAllocation) {}
}

///A blank [PhysicalDeviceInfo] with one graphics+compute+transfer queue family,
/// adjusted by `patch`.
pub fn physical_device_info(patch: impl FnOnce(&mut PhysicalDeviceInfo)) -> PhysicalDeviceInfo {
    let mut info = PhysicalDeviceInfo {
        phydev: vk::PhysicalDevice::null(),
        properties: vk::PhysicalDeviceProperties::default(),
        features: vk::PhysicalDeviceFeatures::default(),
        extensions: Vec::new(),
        queue_families: vec![vk::QueueFamilyProperties {
            queue_flags: vk::QueueFlags::GRAPHICS
                | vk::QueueFlags::COMPUTE
                | vk::QueueFlags::TRANSFER,
            queue_count: 1,
            ..Default::default()
        }],
    };
    patch(&mut info);
    info
}
