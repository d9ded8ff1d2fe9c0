use std::sync::Arc;

use ash::vk;

use crate::error::DeviceError;

use super::Instance;

///Logical device wrapper. Keeps the [Instance] it was created from alive and
/// destroys the device when dropped.
///
/// Construction goes through [Gpu::new](super::Gpu::new) which handles
/// physical-device selection, extension checks and queue setup.
pub struct Device {
    pub inner: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: Arc<Instance>,
}

impl Device {
    ///Creates the logical device from an already assembled create info.
    ///
    /// # Safety
    ///
    /// `create_info` must only reference extensions and features that
    /// `physical_device` supports, and queue families it exposes.
    pub(crate) unsafe fn from_create_info(
        instance: &Arc<Instance>,
        physical_device: vk::PhysicalDevice,
        create_info: &vk::DeviceCreateInfo<'_>,
    ) -> Result<Arc<Self>, DeviceError> {
        let device = unsafe {
            instance
                .inner
                .create_device(physical_device, create_info, None)?
        };

        Ok(Arc::new(Device {
            inner: device,
            physical_device,
            instance: instance.clone(),
        }))
    }

    ///Blocks until the device finished all submitted work.
    pub fn wait_idle(&self) -> Result<(), DeviceError> {
        unsafe { self.inner.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe { self.inner.destroy_device(None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Device: Send, Sync);
    }
}
