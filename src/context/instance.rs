use std::ffi::{CStr, CString};
use std::sync::Arc;

use ash::vk;
use raw_window_handle::HasDisplayHandle;

use crate::error::InstanceError;

///The external callback print function used by the debug messenger when validation
/// is enabled.
unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_types: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut core::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        log::error!("Validation message without callback data");
        return vk::FALSE;
    }

    let (id, message) = unsafe {
        let data = &*p_callback_data;
        let id = if data.p_message_id_name.is_null() {
            c"unknown id"
        } else {
            CStr::from_ptr(data.p_message_id_name)
        };
        let message = if data.p_message.is_null() {
            c"no message"
        } else {
            CStr::from_ptr(data.p_message)
        };
        (id, message)
    };

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[{:?}]: {:?}", id, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("[{:?}]: {:?}", id, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::info!("[{:?}]: {:?}", id, message);
    } else {
        log::trace!("[{:?}]: {:?}", id, message);
    }

    vk::FALSE
}

///Instance configuration as well as the source entry point. Usually this struct is
/// created via [Instance::load] or [Instance::linked].
pub struct InstanceBuilder {
    pub entry: ash::Entry,
    pub validation: bool,
    pub enabled_layers: Vec<CString>,
    pub enabled_extensions: Vec<CString>,
    available_layers: Vec<vk::LayerProperties>,
    available_extensions: Vec<vk::ExtensionProperties>,
}

impl InstanceBuilder {
    fn from_entry(entry: ash::Entry) -> Result<Self, InstanceError> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };
        let available_extensions =
            unsafe { entry.enumerate_instance_extension_properties(None)? };

        Ok(InstanceBuilder {
            entry,
            validation: false,
            enabled_layers: Vec::new(),
            enabled_extensions: Vec::new(),
            available_layers,
            available_extensions,
        })
    }

    ///Returns true if an instance layer with the given name is available.
    pub fn is_layer_available(&self, name: &CStr) -> bool {
        self.available_layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str() == Ok(name))
    }

    ///Returns true if an instance extension with the given name is available.
    pub fn is_extension_available(&self, name: &CStr) -> bool {
        self.available_extensions
            .iter()
            .any(|ext| ext.extension_name_as_c_str() == Ok(name))
    }

    ///Adds an extension with the given name, if it was not added yet.
    pub fn with_extension(mut self, name: CString) -> Result<Self, InstanceError> {
        if !self.is_extension_available(&name) {
            return Err(InstanceError::MissingExtension(name));
        }

        if self.enabled_extensions.contains(&name) {
            log::warn!("Tried to enable instance extension twice: {:?}", name);
            return Ok(self);
        }

        log::info!("Enabling instance extension: {:?}", name);
        self.enabled_extensions.push(name);
        Ok(self)
    }

    ///Adds a layer with the given name to the list of enabled layers.
    pub fn with_layer(mut self, name: CString) -> Result<Self, InstanceError> {
        if !self.is_layer_available(&name) {
            return Err(InstanceError::MissingLayer(name));
        }

        if self.enabled_layers.contains(&name) {
            log::warn!("Tried to enable instance layer twice: {:?}", name);
            return Ok(self);
        }

        self.enabled_layers.push(name);
        Ok(self)
    }

    ///Enables all extensions that are needed for a surface over `handle` to work.
    pub fn for_surface(mut self, handle: &dyn HasDisplayHandle) -> Result<Self, InstanceError> {
        let display_handle = handle
            .display_handle()
            .map_err(|_| InstanceError::NoDisplayHandle)?;
        let required_extensions =
            ash_window::enumerate_required_extensions(display_handle.as_raw())?;
        for ext in required_extensions {
            let name = unsafe { CStr::from_ptr(*ext).to_owned() };
            self = self.with_extension(name)?;
        }

        Ok(self)
    }

    ///Enables the Khronos validation layer and a debug messenger that reports
    /// through the `log` crate.
    pub fn enable_validation(mut self) -> Self {
        self.validation = true;
        self
    }

    ///Builds the instance from the current information.
    pub fn build(mut self) -> Result<Arc<Instance>, InstanceError> {
        if self.validation {
            self = self.with_layer(c"VK_LAYER_KHRONOS_validation".to_owned())?;
            self = self.with_extension(ash::ext::debug_utils::NAME.to_owned())?;
        }

        let app_info = vk::ApplicationInfo::default().api_version(vk::make_api_version(
            0,
            Instance::API_VERSION_MAJOR,
            Instance::API_VERSION_MINOR,
            Instance::API_VERSION_PATCH,
        ));

        log::info!(
            "Instance creation for Vulkan {}.{}.{}",
            Instance::API_VERSION_MAJOR,
            Instance::API_VERSION_MINOR,
            Instance::API_VERSION_PATCH,
        );
        for layer in &self.enabled_layers {
            log::info!("  layer: {:?}", layer);
        }
        for ext in &self.enabled_extensions {
            log::info!("  extension: {:?}", ext);
        }

        let layer_ptrs = self
            .enabled_layers
            .iter()
            .map(|layer| layer.as_ptr())
            .collect::<Vec<_>>();
        let extension_ptrs = self
            .enabled_extensions
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<_>>();

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        let instance = unsafe { self.entry.create_instance(&create_info, None)? };

        let debug = if self.validation {
            let messenger_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(vulkan_debug_callback));

            let loader = ash::ext::debug_utils::Instance::new(&self.entry, &instance);
            let messenger =
                match unsafe { loader.create_debug_utils_messenger(&messenger_info, None) } {
                    Ok(messenger) => Some((loader, messenger)),
                    Err(e) => {
                        log::error!("Could not create debug messenger: {}", e);
                        None
                    }
                };
            messenger
        } else {
            None
        };

        Ok(Arc::new(Instance {
            entry: self.entry,
            inner: instance,
            validation_enabled: self.validation,
            debug,
        }))
    }
}

///Vulkit instance. Wraps the entry point as well as the created instance into one
/// object, so the dispatch tables live with the instance instead of in process
/// global state.
///
/// # Safety
///
/// This struct is un-clonable for a reason. It implements [Drop] which takes care of
/// destroying the Vulkan instance, as well as the debug messenger if one was created.
pub struct Instance {
    pub entry: ash::Entry,
    pub inner: ash::Instance,
    pub validation_enabled: bool,
    debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    ///The major version of Vulkan loaded.
    pub const API_VERSION_MAJOR: u32 = 1;
    ///The minor version of Vulkan loaded.
    pub const API_VERSION_MINOR: u32 = 3;
    ///The patch version of Vulkan loaded.
    pub const API_VERSION_PATCH: u32 = 0;

    ///Creates an instance builder loaded by using [Entry::load](ash::Entry::load).
    pub fn load() -> Result<InstanceBuilder, InstanceError> {
        let entry = unsafe { ash::Entry::load()? };
        InstanceBuilder::from_entry(entry)
    }

    ///Creates an instance builder using [Entry::linked](ash::Entry::linked).
    pub fn linked() -> Result<InstanceBuilder, InstanceError> {
        InstanceBuilder::from_entry(ash::Entry::linked())
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.inner.destroy_instance(None);
        }
    }
}
