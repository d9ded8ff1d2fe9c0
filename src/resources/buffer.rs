use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use ash::vk;

use crate::allocator::{Allocator, MemoryUsage};
use crate::error::ResourceError;

use super::AnonymAllocation;

///Non-owning buffer metadata. Cheap to copy; the backing resource is owned by an
/// [AllocatedBuffer] or [MappedBuffer].
#[derive(Clone, Copy, Debug)]
pub struct Buffer {
    pub inner: vk::Buffer,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

struct ManagedBuffer<A: Allocator + Send + 'static> {
    allocator: Arc<Mutex<A>>,
    buffer: vk::Buffer,
    allocation: Option<A::Allocation>,
}

impl<A: Allocator + Send + 'static> AnonymAllocation for ManagedBuffer<A> {}

impl<A: Allocator + Send + 'static> Drop for ManagedBuffer<A> {
    fn drop(&mut self) {
        if let (Ok(mut lck), Some(allocation)) = (self.allocator.lock(), self.allocation.take()) {
            lck.destroy_buffer(self.buffer, allocation);
        } else {
            log::warn!("Could not free managed buffer allocation");
        }
    }
}

///Buffer that owns its backing allocation, destroyed together exactly once.
pub struct AllocatedBuffer {
    buffer: Buffer,
    #[allow(dead_code)]
    allocation: Box<dyn AnonymAllocation>,
}

impl AllocatedBuffer {
    pub fn new<A: Allocator + Send + 'static>(
        allocator: &Arc<Mutex<A>>,
        create_info: &vk::BufferCreateInfo<'_>,
        memory_usage: MemoryUsage,
    ) -> Result<Self, ResourceError> {
        let (handle, allocation) = allocator
            .lock()
            .unwrap()
            .create_buffer(create_info, memory_usage)
            .map_err(|e| ResourceError::Allocation(Box::new(e)))?;

        Ok(AllocatedBuffer {
            buffer: Buffer {
                inner: handle,
                size: create_info.size,
                usage: create_info.usage,
            },
            allocation: Box::new(ManagedBuffer {
                allocator: allocator.clone(),
                buffer: handle,
                allocation: Some(allocation),
            }),
        })
    }
}

impl Deref for AllocatedBuffer {
    type Target = Buffer;
    fn deref(&self) -> &Buffer {
        &self.buffer
    }
}

///Host visible buffer that is mapped for its whole lifetime. Intended for
/// uniform/staging data that the host rewrites frequently. Unmapped and destroyed
/// on drop.
pub struct MappedBuffer<A: Allocator + Send + 'static> {
    buffer: Buffer,
    allocator: Arc<Mutex<A>>,
    allocation: Option<A::Allocation>,
    ptr: NonNull<u8>,
}

impl<A: Allocator + Send + 'static> MappedBuffer<A> {
    ///Creates a `CpuToGpu` buffer from `create_info` and maps it.
    pub fn new(
        allocator: &Arc<Mutex<A>>,
        create_info: &vk::BufferCreateInfo<'_>,
    ) -> Result<Self, ResourceError> {
        let mut lck = allocator.lock().unwrap();
        let (handle, mut allocation) = lck
            .create_buffer(create_info, MemoryUsage::CpuToGpu)
            .map_err(|e| ResourceError::Allocation(Box::new(e)))?;

        let ptr = match lck.map_memory(&mut allocation) {
            Ok(ptr) => ptr,
            Err(e) => {
                lck.destroy_buffer(handle, allocation);
                return Err(ResourceError::Allocation(Box::new(e)));
            }
        };
        drop(lck);

        Ok(MappedBuffer {
            buffer: Buffer {
                inner: handle,
                size: create_info.size,
                usage: create_info.usage,
            },
            allocator: allocator.clone(),
            allocation: Some(allocation),
            ptr,
        })
    }

    ///Creates a mapped buffer sized for `data` and writes `data` into it.
    pub fn from_data<T: bytemuck::Pod>(
        allocator: &Arc<Mutex<A>>,
        data: &[T],
        usage: vk::BufferUsageFlags,
    ) -> Result<Self, ResourceError> {
        let create_info = vk::BufferCreateInfo::default()
            .size(std::mem::size_of_val(data) as vk::DeviceSize)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let mut buffer = Self::new(allocator, &create_info)?;
        buffer.write(0, data)?;
        Ok(buffer)
    }

    ///Writes `data` at `byte_offset`. Fails if the write would run past the end of
    /// the buffer.
    pub fn write<T: bytemuck::Pod>(
        &mut self,
        byte_offset: vk::DeviceSize,
        data: &[T],
    ) -> Result<(), ResourceError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let end = byte_offset + bytes.len() as vk::DeviceSize;
        if end > self.buffer.size {
            return Err(ResourceError::BufferWriteOutOfBounds {
                offset: byte_offset,
                len: bytes.len() as u64,
                size: self.buffer.size,
            });
        }

        unsafe {
            self.ptr
                .as_ptr()
                .add(byte_offset as usize)
                .copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
        }
        Ok(())
    }

    ///Reads the whole buffer back as a slice of `T`. Trailing bytes that do not
    /// form a full element are cut off.
    pub fn as_slice<T: bytemuck::Pod>(&self) -> &[T] {
        let len = (self.buffer.size as usize) / std::mem::size_of::<T>();
        let bytes = unsafe {
            std::slice::from_raw_parts(self.ptr.as_ptr(), len * std::mem::size_of::<T>())
        };
        bytemuck::cast_slice(bytes)
    }
}

impl<A: Allocator + Send + 'static> Deref for MappedBuffer<A> {
    type Target = Buffer;
    fn deref(&self) -> &Buffer {
        &self.buffer
    }
}

impl<A: Allocator + Send + 'static> Drop for MappedBuffer<A> {
    fn drop(&mut self) {
        if let (Ok(mut lck), Some(mut allocation)) =
            (self.allocator.lock(), self.allocation.take())
        {
            lck.unmap_memory(&mut allocation);
            lck.destroy_buffer(self.buffer.inner, allocation);
        } else {
            log::warn!("Could not free mapped buffer allocation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockAllocator;
    use ash::vk::Handle;

    #[test]
    fn mapped_buffer_roundtrip() {
        let allocator = MockAllocator::shared();
        let data: [f32; 4] = [1.0, 2.0, 3.0, 4.0];

        let buffer =
            MappedBuffer::from_data(&allocator, &data, vk::BufferUsageFlags::UNIFORM_BUFFER)
                .unwrap();
        assert_eq!(buffer.size, 16);
        assert_eq!(buffer.as_slice::<f32>(), &data);
    }

    #[test]
    fn mapped_buffer_rejects_out_of_bounds_write() {
        let allocator = MockAllocator::shared();
        let create_info = vk::BufferCreateInfo::default()
            .size(8)
            .usage(vk::BufferUsageFlags::UNIFORM_BUFFER);

        let mut buffer = MappedBuffer::new(&allocator, &create_info).unwrap();
        let err = buffer.write(4, &[0u32, 1u32]).unwrap_err();
        assert!(matches!(
            err,
            ResourceError::BufferWriteOutOfBounds { offset: 4, len: 8, size: 8 }
        ));

        //an exactly fitting write is fine
        buffer.write(0, &[0u32, 1u32]).unwrap();
    }

    #[test]
    fn buffers_freed_exactly_once() {
        let allocator = MockAllocator::shared();
        let create_info = vk::BufferCreateInfo::default()
            .size(64)
            .usage(vk::BufferUsageFlags::STORAGE_BUFFER);

        let allocated =
            AllocatedBuffer::new(&allocator, &create_info, MemoryUsage::GpuOnly).unwrap();
        let handle = allocated.inner.as_raw();
        drop(allocated);

        let lock = allocator.lock().unwrap();
        assert_eq!(lock.destroyed_buffers, vec![handle]);
    }
}
