use std::ffi::{CStr, CString};
use std::sync::Arc;

use ash::vk;

use crate::error::DeviceError;

use super::{Device, DeviceQueues, Instance, QueueFamilies};

///Snapshot of everything the selection search needs to know about one physical
/// device. Queried once per device at enumeration time, then rated offline.
#[derive(Clone, Debug)]
pub struct PhysicalDeviceInfo {
    pub phydev: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub extensions: Vec<CString>,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
}

impl PhysicalDeviceInfo {
    ///Queries properties, features, extensions and queue families of `phydev`.
    pub fn query(instance: &Instance, phydev: vk::PhysicalDevice) -> Self {
        let (properties, features, extensions, queue_families) = unsafe {
            let properties = instance.inner.get_physical_device_properties(phydev);
            let features = instance.inner.get_physical_device_features(phydev);
            let extensions = instance
                .inner
                .enumerate_device_extension_properties(phydev)
                .unwrap_or_default()
                .iter()
                .filter_map(|ext| ext.extension_name_as_c_str().ok().map(CStr::to_owned))
                .collect();
            let queue_families = instance
                .inner
                .get_physical_device_queue_family_properties(phydev);
            (properties, features, extensions, queue_families)
        };

        PhysicalDeviceInfo {
            phydev,
            properties,
            features,
            extensions,
            queue_families,
        }
    }

    ///Queries all physical devices known to `instance`.
    pub fn enumerate(instance: &Instance) -> Result<Vec<Self>, DeviceError> {
        let devices = unsafe { instance.inner.enumerate_physical_devices()? };
        if devices.is_empty() {
            return Err(DeviceError::NoPhysicalDevice);
        }

        Ok(devices
            .into_iter()
            .map(|phydev| Self::query(instance, phydev))
            .collect())
    }

    ///True if the device advertises the extension with exactly this name.
    pub fn supports_extension(&self, name: &CStr) -> bool {
        self.extensions.iter().any(|ext| ext.as_c_str() == name)
    }

    pub fn name(&self) -> String {
        self.properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| String::from("unnamed device"))
    }
}

///Views the feature struct as the flat list of feature flags it is defined as.
fn feature_bits(features: &vk::PhysicalDeviceFeatures) -> &[vk::Bool32] {
    //PhysicalDeviceFeatures is repr(C) and consists of Bool32 fields only
    unsafe {
        std::slice::from_raw_parts(
            (features as *const vk::PhysicalDeviceFeatures).cast::<vk::Bool32>(),
            std::mem::size_of::<vk::PhysicalDeviceFeatures>()
                / std::mem::size_of::<vk::Bool32>(),
        )
    }
}

fn supports_features(
    available: &vk::PhysicalDeviceFeatures,
    required: &vk::PhysicalDeviceFeatures,
) -> bool {
    feature_bits(available)
        .iter()
        .zip(feature_bits(required))
        .all(|(has, needs)| *needs == vk::FALSE || *has == vk::TRUE)
}

///Default positive rating of an already adequate device. Discrete GPUs get a large
/// head start, the maximum 2d image dimension breaks ties between same-class
/// devices.
pub fn default_device_rating(info: &PhysicalDeviceInfo) -> u64 {
    let mut score = info.properties.limits.max_image_dimension2_d as u64;
    if info.properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += 1000;
    }
    score
}

///Declares what the logical device must provide: extensions, core features,
/// extension feature structs for the create-info chain and (optionally) a custom
/// rating used to break ties between adequate devices.
pub struct GpuConfig {
    pub extensions: Vec<&'static CStr>,
    features: vk::PhysicalDeviceFeatures,
    feature_chain: Vec<Box<dyn vk::ExtendsDeviceCreateInfo>>,
    use_features2: bool,
    rating: Box<dyn Fn(&PhysicalDeviceInfo) -> u64>,
}

impl Default for GpuConfig {
    fn default() -> Self {
        GpuConfig {
            extensions: Vec::new(),
            features: vk::PhysicalDeviceFeatures::default(),
            feature_chain: Vec::new(),
            use_features2: false,
            rating: Box::new(default_device_rating),
        }
    }
}

impl GpuConfig {
    pub fn new() -> Self {
        Self::default()
    }

    ///Requires a device extension. Devices that do not advertise it are rejected
    /// during selection.
    pub fn with_extension(mut self, name: &'static CStr) -> Self {
        if self.extensions.contains(&name) {
            log::warn!("Tried to enable device extension twice: {:?}", name);
            return self;
        }
        self.extensions.push(name);
        self
    }

    ///Requires the set feature flags of the core 1.0 feature struct. Devices that
    /// miss any set flag are rejected during selection.
    pub fn with_features(mut self, features: vk::PhysicalDeviceFeatures) -> Self {
        if self.use_features2 {
            log::warn!(
                "Core features already supplied through a features2 chain, ignoring inline features"
            );
            return self;
        }
        self.features = features;
        self
    }

    ///Appends an extension feature struct to the device create-info chain.
    pub fn with_feature<T: vk::ExtendsDeviceCreateInfo + 'static>(mut self, feature: T) -> Self {
        self.feature_chain.push(Box::new(feature));
        self
    }

    ///Supplies all features through a [vk::PhysicalDeviceFeatures2] chain node.
    /// From here on the inline feature struct is unused, the two paths are mutually
    /// exclusive per Vulkan rules. Features requested this way are not part of the
    /// adequacy check.
    pub fn with_features2(mut self, features2: vk::PhysicalDeviceFeatures2<'static>) -> Self {
        if feature_bits(&self.features).iter().any(|bit| *bit == vk::TRUE) {
            log::warn!("Dropping inline core features in favour of the features2 chain");
            self.features = vk::PhysicalDeviceFeatures::default();
        }
        self.use_features2 = true;
        self.feature_chain.push(Box::new(features2));
        self
    }

    ///Replaces the default rating of adequate devices.
    pub fn with_rating(mut self, rating: impl Fn(&PhysicalDeviceInfo) -> u64 + 'static) -> Self {
        self.rating = Box::new(rating);
        self
    }

    ///Rates `info`: zero if the device misses a required extension, a required
    /// feature flag or a usable set of queue families, otherwise the positive
    /// rating.
    pub fn rate<F: QueueFamilies>(&self, info: &PhysicalDeviceInfo) -> u64 {
        for ext in &self.extensions {
            if !info.supports_extension(ext) {
                log::info!("{} misses extension {:?}", info.name(), ext);
                return 0;
            }
        }

        if !self.use_features2 && !supports_features(&info.features, &self.features) {
            log::info!("{} misses required features", info.name());
            return 0;
        }

        if F::find(info).is_none() {
            log::info!("{} misses required queue families", info.name());
            return 0;
        }

        (self.rating)(info)
    }
}

///Among equally rated devices the first enumerated one wins.
fn pick_first_max(
    candidates: impl IntoIterator<Item = (PhysicalDeviceInfo, u64)>,
) -> Option<(PhysicalDeviceInfo, u64)> {
    candidates
        .into_iter()
        .fold(None, |best, candidate| match best {
            Some((_, best_score)) if best_score >= candidate.1 => best,
            _ => Some(candidate),
        })
}

fn select_physical_device<F: QueueFamilies>(
    config: &GpuConfig,
    infos: Vec<PhysicalDeviceInfo>,
) -> Result<PhysicalDeviceInfo, DeviceError> {
    let rated = infos
        .into_iter()
        .map(|info| {
            let score = config.rate::<F>(&info);
            log::info!("Device {} rated {}", info.name(), score);
            (info, score)
        })
        .collect::<Vec<_>>();

    match pick_first_max(rated) {
        Some((info, score)) if score > 0 => Ok(info),
        _ => Err(DeviceError::NoAdequatePhysicalDevice),
    }
}

///A selected physical device, the logical device created on it and the queues the
/// caller asked for.
///
/// The queue layout is chosen by the type parameter. [GraphicsQueue](super::GraphicsQueue)
/// covers the common single-queue case; applications with their own layout
/// implement [DeviceQueues] and [QueueFamilies] themselves.
pub struct Gpu<Q: DeviceQueues> {
    pub device: Arc<Device>,
    pub queues: Q,
    pub families: Q::Families,
    pub info: PhysicalDeviceInfo,
}

impl<Q: DeviceQueues> Gpu<Q> {
    ///Runs the selection search over all physical devices of `instance`, then
    /// creates the logical device with the configured extensions and features.
    pub fn new(instance: &Arc<Instance>, mut config: GpuConfig) -> Result<Self, DeviceError> {
        let infos = PhysicalDeviceInfo::enumerate(instance)?;
        let info = select_physical_device::<Q::Families>(&config, infos)?;
        log::info!("Selected device: {}", info.name());

        //the portability subset must be enabled whenever the device advertises it
        if info.supports_extension(ash::khr::portability_subset::NAME)
            && !config.extensions.contains(&ash::khr::portability_subset::NAME)
        {
            config.extensions.push(ash::khr::portability_subset::NAME);
        }

        for ext in &config.extensions {
            if !info.supports_extension(ext) {
                return Err(DeviceError::UnsupportedExtension(
                    ext.to_string_lossy().into_owned(),
                ));
            }
        }

        let families =
            Q::Families::find(&info).ok_or(DeviceError::QueueFamiliesUnavailable)?;
        let requests = Q::queue_requests(&families);
        let queue_infos = requests
            .iter()
            .map(|request| request.as_create_info())
            .collect::<Vec<_>>();

        let extension_ptrs = config
            .extensions
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<_>>();

        let mut create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs);
        if !config.use_features2 {
            create_info = create_info.enabled_features(&config.features);
        }

        //thread the boxed extension structs into the p_next chain by hand, they are
        // type erased and cannot go through push_next
        for node in config.feature_chain.iter_mut() {
            unsafe {
                let node = (node.as_mut() as *mut dyn vk::ExtendsDeviceCreateInfo)
                    .cast::<vk::BaseOutStructure<'static>>();
                (*node).p_next = create_info.p_next as *mut vk::BaseOutStructure<'static>;
                create_info.p_next = node.cast();
            }
        }

        let device = unsafe { Device::from_create_info(instance, info.phydev, &create_info)? };
        let queues = Q::collect(&device.inner, &families);

        Ok(Gpu {
            device,
            queues,
            families,
            info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GraphicsQueueFamilies;
    use crate::testing::physical_device_info;

    fn with_max_dim(
        device_type: vk::PhysicalDeviceType,
        max_dim: u32,
        extensions: Vec<CString>,
    ) -> PhysicalDeviceInfo {
        physical_device_info(|info| {
            info.properties.device_type = device_type;
            info.properties.limits.max_image_dimension2_d = max_dim;
            info.extensions = extensions;
        })
    }

    #[test]
    fn missing_extension_rejects_device() {
        let config = GpuConfig::new().with_extension(ash::khr::swapchain::NAME);

        let discrete_without_swapchain = with_max_dim(
            vk::PhysicalDeviceType::DISCRETE_GPU,
            16384,
            vec![c"VK_KHR_something_else".to_owned()],
        );
        assert_eq!(
            config.rate::<GraphicsQueueFamilies>(&discrete_without_swapchain),
            0
        );

        //prefix matches do not count
        let prefix_only = with_max_dim(
            vk::PhysicalDeviceType::DISCRETE_GPU,
            16384,
            vec![c"VK_KHR_swapchain_extra".to_owned()],
        );
        assert_eq!(config.rate::<GraphicsQueueFamilies>(&prefix_only), 0);
    }

    #[test]
    fn missing_feature_flag_rejects_device() {
        let config = GpuConfig::new()
            .with_features(vk::PhysicalDeviceFeatures::default().geometry_shader(true));

        let without = physical_device_info(|_| {});
        assert_eq!(config.rate::<GraphicsQueueFamilies>(&without), 0);

        let with = physical_device_info(|info| {
            info.features.geometry_shader = vk::TRUE;
            info.properties.limits.max_image_dimension2_d = 4096;
        });
        assert_eq!(config.rate::<GraphicsQueueFamilies>(&with), 4096);
    }

    #[test]
    fn missing_queue_family_rejects_device() {
        let config = GpuConfig::new();
        let compute_only = physical_device_info(|info| {
            info.queue_families = vec![vk::QueueFamilyProperties {
                queue_flags: vk::QueueFlags::COMPUTE,
                queue_count: 1,
                ..Default::default()
            }];
        });

        assert_eq!(config.rate::<GraphicsQueueFamilies>(&compute_only), 0);
    }

    #[test]
    fn adequate_integrated_beats_inadequate_discrete() {
        let config = GpuConfig::new().with_extension(ash::khr::swapchain::NAME);
        let swapchain = vec![ash::khr::swapchain::NAME.to_owned()];

        //discrete but without the required extension
        let a = with_max_dim(vk::PhysicalDeviceType::DISCRETE_GPU, 16384, Vec::new());
        //integrated and adequate
        let b = with_max_dim(
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            4096,
            swapchain.clone(),
        );
        //discrete, adequate, but weaker limits
        let c = with_max_dim(vk::PhysicalDeviceType::DISCRETE_GPU, 2048, swapchain);

        assert_eq!(config.rate::<GraphicsQueueFamilies>(&a), 0);
        assert_eq!(config.rate::<GraphicsQueueFamilies>(&b), 4096);
        assert_eq!(config.rate::<GraphicsQueueFamilies>(&c), 3048);

        let selected =
            select_physical_device::<GraphicsQueueFamilies>(&config, vec![a, b, c]).unwrap();
        assert_eq!(
            selected.properties.device_type,
            vk::PhysicalDeviceType::INTEGRATED_GPU
        );
    }

    #[test]
    fn ties_resolve_to_first_enumerated() {
        let config = GpuConfig::new();
        let first = physical_device_info(|info| {
            info.properties.limits.max_image_dimension2_d = 4096;
            info.properties.pipeline_cache_uuid[0] = 1;
        });
        let second = physical_device_info(|info| {
            info.properties.limits.max_image_dimension2_d = 4096;
            info.properties.pipeline_cache_uuid[0] = 2;
        });

        let selected =
            select_physical_device::<GraphicsQueueFamilies>(&config, vec![first, second])
                .unwrap();
        assert_eq!(selected.properties.pipeline_cache_uuid[0], 1);
    }

    #[test]
    fn all_inadequate_is_an_error() {
        let config = GpuConfig::new().with_extension(ash::khr::swapchain::NAME);
        let infos = vec![
            with_max_dim(vk::PhysicalDeviceType::DISCRETE_GPU, 16384, Vec::new()),
            with_max_dim(vk::PhysicalDeviceType::CPU, 1024, Vec::new()),
        ];

        let err = select_physical_device::<GraphicsQueueFamilies>(&config, infos).unwrap_err();
        assert!(matches!(err, DeviceError::NoAdequatePhysicalDevice));
    }

    #[test]
    fn features2_suppresses_inline_features() {
        let config = GpuConfig::new()
            .with_features2(vk::PhysicalDeviceFeatures2::default())
            .with_features(vk::PhysicalDeviceFeatures::default().geometry_shader(true));

        //the inline feature requirement was dropped, so a device without
        // geometry shaders still rates positive
        let info = physical_device_info(|info| {
            info.properties.limits.max_image_dimension2_d = 2048;
        });
        assert_eq!(config.rate::<GraphicsQueueFamilies>(&info), 2048);
    }
}
