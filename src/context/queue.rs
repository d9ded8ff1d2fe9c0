use ash::vk;

use super::PhysicalDeviceInfo;

///One queue retrieved from a built device.
#[derive(Clone, Copy, Debug)]
pub struct Queue {
    pub inner: vk::Queue,
    pub family_index: u32,
}

///Describes the queues to create for one family.
#[derive(Clone, Debug)]
pub struct QueueRequest {
    pub family_index: u32,
    pub priorities: Vec<f32>,
}

impl QueueRequest {
    ///A single queue of `family_index` with default priority.
    pub fn single(family_index: u32) -> Self {
        QueueRequest {
            family_index,
            priorities: vec![1.0],
        }
    }

    pub fn as_create_info<'a>(&'a self) -> vk::DeviceQueueCreateInfo<'a> {
        vk::DeviceQueueCreateInfo::default()
            .queue_family_index(self.family_index)
            .queue_priorities(&self.priorities)
    }
}

///The family indices an application needs from a physical device. Implementors
/// probe a [PhysicalDeviceInfo] and return `None` if the device cannot serve them,
/// which makes the device inadequate during selection.
pub trait QueueFamilies: Sized {
    fn find(info: &PhysicalDeviceInfo) -> Option<Self>;
}

///Selects which queues are created on the logical device and how they are handed
/// back to the application. [Gpu::new](super::Gpu::new) calls [queue_requests](DeviceQueues::queue_requests)
/// before device creation and [collect](DeviceQueues::collect) afterwards.
pub trait DeviceQueues: Sized {
    type Families: QueueFamilies;

    ///Queue create requests, one per used family. Families must not repeat.
    fn queue_requests(families: &Self::Families) -> Vec<QueueRequest>;

    ///Fetches the created queues from `device`.
    fn collect(device: &ash::Device, families: &Self::Families) -> Self;
}

///Family set for the common case of a single graphics queue that also handles
/// transfer and compute work.
#[derive(Clone, Copy, Debug)]
pub struct GraphicsQueueFamilies {
    pub graphics: u32,
}

impl QueueFamilies for GraphicsQueueFamilies {
    fn find(info: &PhysicalDeviceInfo) -> Option<Self> {
        let graphics = info.queue_families.iter().position(|family| {
            family
                .queue_flags
                .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
        })?;

        Some(GraphicsQueueFamilies {
            graphics: graphics as u32,
        })
    }
}

///The queues belonging to [GraphicsQueueFamilies].
pub struct GraphicsQueue {
    pub graphics: Queue,
}

impl DeviceQueues for GraphicsQueue {
    type Families = GraphicsQueueFamilies;

    fn queue_requests(families: &Self::Families) -> Vec<QueueRequest> {
        vec![QueueRequest::single(families.graphics)]
    }

    fn collect(device: &ash::Device, families: &Self::Families) -> Self {
        let queue = unsafe { device.get_device_queue(families.graphics, 0) };
        GraphicsQueue {
            graphics: Queue {
                inner: queue,
                family_index: families.graphics,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::physical_device_info;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn graphics_family_probe_picks_first_match() {
        let info = physical_device_info(|info| {
            info.queue_families = vec![
                family(vk::QueueFlags::TRANSFER),
                family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
                family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            ];
        });

        let families = GraphicsQueueFamilies::find(&info).unwrap();
        assert_eq!(families.graphics, 1);
    }

    #[test]
    fn graphics_family_probe_rejects_compute_only_devices() {
        let info = physical_device_info(|info| {
            info.queue_families = vec![
                family(vk::QueueFlags::COMPUTE),
                family(vk::QueueFlags::TRANSFER),
            ];
        });

        assert!(GraphicsQueueFamilies::find(&info).is_none());
    }

    #[test]
    fn queue_request_wiring() {
        let request = QueueRequest {
            family_index: 3,
            priorities: vec![1.0, 0.5],
        };
        let create_info = request.as_create_info();

        assert_eq!(create_info.queue_family_index, 3);
        assert_eq!(create_info.queue_count, 2);
        assert!(!create_info.p_queue_priorities.is_null());
    }
}
