use std::ops::Deref;
use std::sync::{Arc, Mutex};

use ash::vk;

use crate::allocator::{Allocator, MemoryUsage};
use crate::context::Device;
use crate::error::ResourceError;
use crate::util;

///Non-owning image metadata: the native handle together with everything needed to
/// derive views, subresource ranges and mip extents from it. Cheap to copy; the
/// backing resource is owned elsewhere, usually by an [AllocatedImage].
#[derive(Clone, Copy, Debug)]
pub struct Image {
    pub inner: vk::Image,
    pub extent: vk::Extent3D,
    pub format: vk::Format,
    pub mip_levels: u32,
    pub array_layers: u32,
}

impl Image {
    ///In case of 3d images the depth is ignored.
    pub fn extent_2d(&self) -> vk::Extent2D {
        util::extent_2d(self.extent)
    }

    ///Number of mip levels a full mip chain over this image would have.
    pub fn max_mip_levels(&self) -> u32 {
        util::max_mip_levels_2d(self.extent_2d())
    }

    pub fn mip_extent(&self, level: u32) -> vk::Extent2D {
        util::mip_extent(self.extent_2d(), level)
    }

    ///Returns a subresource range that encloses the whole image, with the aspect
    /// derived from the image format.
    pub fn subresource_all(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: util::format_aspect_flags(self.format),
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: self.array_layers,
        }
    }
}

///Implemented for all managed allocations. Allows [AllocatedImage] and
/// [AllocatedBuffer](crate::resources::AllocatedBuffer) to hide their allocator type.
pub trait AnonymAllocation: Send + Sync {}

struct ManagedImage<A: Allocator + Send + 'static> {
    allocator: Arc<Mutex<A>>,
    image: vk::Image,
    allocation: Option<A::Allocation>,
}

impl<A: Allocator + Send + 'static> AnonymAllocation for ManagedImage<A> {}

impl<A: Allocator + Send + 'static> Drop for ManagedImage<A> {
    fn drop(&mut self) {
        if let (Ok(mut lck), Some(allocation)) = (self.allocator.lock(), self.allocation.take()) {
            lck.destroy_image(self.image, allocation);
        } else {
            log::warn!("Could not free managed image allocation");
        }
    }
}

///Image that owns its backing allocation. Handle and allocation are destroyed
/// together, exactly once, through the allocator that created them. Moving the
/// value transfers that responsibility; there is no way to end up with two owners.
pub struct AllocatedImage {
    image: Image,
    #[allow(dead_code)]
    allocation: Box<dyn AnonymAllocation>,
}

impl AllocatedImage {
    ///Creates the image described by `create_info` through `allocator` and records
    /// its metadata from the create info.
    pub fn new<A: Allocator + Send + 'static>(
        allocator: &Arc<Mutex<A>>,
        create_info: &vk::ImageCreateInfo<'_>,
        memory_usage: MemoryUsage,
    ) -> Result<Self, ResourceError> {
        let (handle, allocation) = allocator
            .lock()
            .unwrap()
            .create_image(create_info, memory_usage)
            .map_err(|e| ResourceError::Allocation(Box::new(e)))?;

        Ok(AllocatedImage {
            image: Image {
                inner: handle,
                extent: create_info.extent,
                format: create_info.format,
                mip_levels: create_info.mip_levels,
                array_layers: create_info.array_layers,
            },
            allocation: Box::new(ManagedImage {
                allocator: allocator.clone(),
                image: handle,
                allocation: Some(allocation),
            }),
        })
    }
}

impl Deref for AllocatedImage {
    type Target = Image;
    fn deref(&self) -> &Image {
        &self.image
    }
}

///[vk::ImageView] wrapper that keeps its device alive and destroys itself when dropped.
pub struct ImageView {
    pub inner: vk::ImageView,
    pub format: vk::Format,
    pub range: vk::ImageSubresourceRange,
    pub device: Arc<Device>,
}

impl ImageView {
    ///Creates a plain 2d view over `image`.
    pub fn new_2d(
        device: &Arc<Device>,
        image: vk::Image,
        format: vk::Format,
        range: vk::ImageSubresourceRange,
    ) -> Result<Self, ResourceError> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(range);

        let view = unsafe { device.inner.create_image_view(&create_info, None)? };

        Ok(ImageView {
            inner: view,
            format,
            range,
            device: device.clone(),
        })
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_image_view(self.inner, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockAllocator;
    use ash::vk::Handle;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Image: Send, Sync);
        assert_impl_all!(AllocatedImage: Send, Sync);
    }

    #[test]
    fn allocated_image_freed_exactly_once() {
        let allocator = MockAllocator::shared();
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk::Format::R8G8B8A8_UNORM)
            .extent(vk::Extent3D {
                width: 64,
                height: 64,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1);

        let image =
            AllocatedImage::new(&allocator, &create_info, MemoryUsage::GpuOnly).unwrap();
        let handle = image.inner.as_raw();
        assert_eq!(image.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(image.extent.width, 64);

        //move it around before dropping, the destructor must still run exactly once
        let moved = image;
        drop(moved);

        let lock = allocator.lock().unwrap();
        assert_eq!(lock.destroyed_images, vec![handle]);
    }

    #[test]
    fn subresource_all_covers_every_mip_and_layer() {
        let image = Image {
            inner: vk::Image::null(),
            extent: vk::Extent3D {
                width: 256,
                height: 128,
                depth: 1,
            },
            format: vk::Format::D24_UNORM_S8_UINT,
            mip_levels: 5,
            array_layers: 2,
        };

        let range = image.subresource_all();
        assert_eq!(
            range.aspect_mask,
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(range.level_count, 5);
        assert_eq!(range.layer_count, 2);
        assert_eq!(image.max_mip_levels(), 8);
    }
}
