//! ## Context
//!
//! When working with Vulkan the [Device](ash::Device) is the entry point for most
//! operations. It is created from an [Instance](ash::Instance) which represents a
//! runtime instance of Vulkan.
//!
//! This module wraps both: [Instance] owns the entry point, the instance handle and
//! the optional debug messenger; [Gpu] performs the physical-device selection search
//! (rate all enumerated devices against the requested extensions, features and queue
//! families, pick the best, fail hard if none is adequate) and materializes the
//! logical [Device] together with the caller-defined queue objects.
//!
//! Which queue families exist is never hardcoded. Callers describe their needs via
//! the [QueueFamilies] and [DeviceQueues] traits and get their own queue type back
//! from [Gpu::new].

mod device;
pub use device::Device;

mod gpu;
pub use gpu::{Gpu, GpuConfig, PhysicalDeviceInfo, default_device_rating};

mod instance;
pub use instance::{Instance, InstanceBuilder};

mod queue;
pub use queue::{
    DeviceQueues, GraphicsQueue, GraphicsQueueFamilies, Queue, QueueFamilies, QueueRequest,
};
