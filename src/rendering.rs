//! ## Rendering
//!
//! Dynamic-rendering attachment management. An attachment group owns the images
//! and views that back a render target set (through its arena) and assembles the
//! [vk::RenderingInfo] for a `vkCmdBeginRendering` call from them.
//!
//! Two group flavours exist as separate concrete types: [AttachmentGroup] for
//! single-sampled rendering and [MsaaAttachmentGroup] which renders multisampled
//! and resolves every color attachment into a single-sampled partner image.
//!
//! The usual flow:
//! 1. create the backing images through [create_color_image](AttachmentGroup::create_color_image)
//!    and friends, then move them into the arena via
//!    [store_image](AttachmentGroupBase::store_image),
//! 2. register them via [add_color_attachment](AttachmentGroup::add_color_attachment)
//!    etc., which derives the views,
//! 3. each frame, call [rendering_info](AttachmentGroup::rendering_info) with the
//!    load/store configuration of that pass and begin rendering from the returned
//!    [RenderingDescriptor].
//!
//! Attachments reference views by handle. Views created through the group live in
//! its arena; externally created views (a swapchain image for instance) are
//! registered through the `*_view` variants and must outlive the group.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use ash::vk;
use smallvec::SmallVec;

use crate::allocator::{Allocator, MemoryUsage};
use crate::context::Device;
use crate::error::ResourceError;
use crate::resources::{AllocatedImage, Image, ImageView};
use crate::util;

///A single-sampled render target: the view that is rendered to and the layout the
/// image is in while rendering.
#[derive(Clone, Copy, Debug)]
pub struct Attachment {
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
}

///A multisampled render target together with the single-sampled view its content
/// is resolved into at the end of the pass.
#[derive(Clone, Copy, Debug)]
pub struct MsaaAttachment {
    pub view: vk::ImageView,
    pub resolve_view: vk::ImageView,
    pub layout: vk::ImageLayout,
}

///Converts a typed clear value into the untyped union the attachment info carries.
pub trait AsClearValue: Copy {
    fn as_clear_value(&self) -> vk::ClearValue;
}

impl AsClearValue for vk::ClearColorValue {
    fn as_clear_value(&self) -> vk::ClearValue {
        vk::ClearValue { color: *self }
    }
}

impl AsClearValue for vk::ClearDepthStencilValue {
    fn as_clear_value(&self) -> vk::ClearValue {
        vk::ClearValue {
            depth_stencil: *self,
        }
    }
}

///Per-pass load/store configuration of one attachment. `C` is
/// [vk::ClearColorValue] for color attachments and [vk::ClearDepthStencilValue]
/// for depth/stencil.
#[derive(Clone, Copy)]
pub struct AttachmentConfig<C: AsClearValue> {
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear: C,
}

pub type ColorConfig = AttachmentConfig<vk::ClearColorValue>;
pub type DepthStencilConfig = AttachmentConfig<vk::ClearDepthStencilValue>;

impl AttachmentConfig<vk::ClearColorValue> {
    ///Clears to `color` on load, keeps the result.
    pub fn clear(color: [f32; 4]) -> Self {
        AttachmentConfig {
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear: vk::ClearColorValue { float32: color },
        }
    }
}

impl AttachmentConfig<vk::ClearDepthStencilValue> {
    ///Clears depth and stencil on load, keeps the result.
    pub fn clear(depth: f32, stencil: u32) -> Self {
        AttachmentConfig {
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear: vk::ClearDepthStencilValue { depth, stencil },
        }
    }
}

impl<C: AsClearValue + Default> AttachmentConfig<C> {
    ///Loads the previous content and keeps the result.
    pub fn load() -> Self {
        AttachmentConfig {
            load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::STORE,
            clear: C::default(),
        }
    }

    ///Neither loads nor keeps content. For transient attachments.
    pub fn discard() -> Self {
        AttachmentConfig {
            load_op: vk::AttachmentLoadOp::DONT_CARE,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            clear: C::default(),
        }
    }
}

///State shared by both group flavours: the render extent and the arena of images
/// and views the group owns. Arena entries stay alive exactly as long as the
/// group, handing out only copyable [Image] metadata and raw view handles, so no
/// registered handle can outlive its backing resource.
pub struct AttachmentGroupBase {
    extent: vk::Extent2D,
    stored_images: Vec<AllocatedImage>,
    stored_views: Vec<ImageView>,
}

impl AttachmentGroupBase {
    fn new(extent: vk::Extent2D) -> Self {
        AttachmentGroupBase {
            extent,
            stored_images: Vec::new(),
            stored_views: Vec::new(),
        }
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    ///Moves `image` into the group's arena and returns its metadata. The backing
    /// resource is destroyed when the group is dropped.
    pub fn store_image(&mut self, image: AllocatedImage) -> Image {
        let metadata = *image;
        self.stored_images.push(image);
        metadata
    }

    ///Moves `view` into the group's arena and returns its handle.
    pub fn store_view(&mut self, view: ImageView) -> vk::ImageView {
        let handle = view.inner;
        self.stored_views.push(view);
        handle
    }

    ///Creates a 2d image matching the group extent. Pure factory, the group is
    /// not touched; hand the result to [store_image](Self::store_image) to move it
    /// into the arena.
    pub fn create_attachment_image<A: Allocator + Send + 'static>(
        &self,
        allocator: &Arc<Mutex<A>>,
        format: vk::Format,
        samples: vk::SampleCountFlags,
        usage: vk::ImageUsageFlags,
        memory_usage: MemoryUsage,
    ) -> Result<AllocatedImage, ResourceError> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(util::extent_3d(self.extent))
            .mip_levels(1)
            .array_layers(1)
            .samples(samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        AllocatedImage::new(allocator, &create_info, memory_usage)
    }

    ///Derives a view over `image` and stores it in the arena. A format of
    /// `UNDEFINED` inherits the image format.
    fn create_view(
        &mut self,
        device: &Arc<Device>,
        image: &Image,
        format: vk::Format,
        range: vk::ImageSubresourceRange,
    ) -> Result<vk::ImageView, ResourceError> {
        let format = if format == vk::Format::UNDEFINED {
            image.format
        } else {
            format
        };
        let view = ImageView::new_2d(device, image.inner, format, range)?;
        Ok(self.store_view(view))
    }

    ///Full-extent viewport. With `negative_height` the viewport is flipped so that
    /// the origin sits at the top left, the y axis points down and clip space
    /// matches the usual right-handed convention.
    pub fn viewport(&self, negative_height: bool) -> vk::Viewport {
        let width = self.extent.width as f32;
        let height = self.extent.height as f32;
        if negative_height {
            vk::Viewport {
                x: 0.0,
                y: height,
                width,
                height: -height,
                min_depth: 0.0,
                max_depth: 1.0,
            }
        } else {
            vk::Viewport {
                x: 0.0,
                y: 0.0,
                width,
                height,
                min_depth: 0.0,
                max_depth: 1.0,
            }
        }
    }

    ///Full-extent scissor rect.
    pub fn scissor(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }

    ///Records the full-extent viewport into `cmd`.
    ///
    /// # Safety
    ///
    /// `cmd` must be in the recording state.
    pub unsafe fn set_viewport(
        &self,
        device: &Device,
        cmd: vk::CommandBuffer,
        negative_height: bool,
    ) {
        unsafe {
            device
                .inner
                .cmd_set_viewport(cmd, 0, &[self.viewport(negative_height)])
        };
    }

    ///Records the full-extent scissor into `cmd`.
    ///
    /// # Safety
    ///
    /// `cmd` must be in the recording state.
    pub unsafe fn set_scissor(&self, device: &Device, cmd: vk::CommandBuffer) {
        unsafe { device.inner.cmd_set_scissor(cmd, 0, &[self.scissor()]) };
    }
}

fn attachment_info<C: AsClearValue>(
    view: vk::ImageView,
    layout: vk::ImageLayout,
    config: &AttachmentConfig<C>,
) -> vk::RenderingAttachmentInfo<'static> {
    vk::RenderingAttachmentInfo::default()
        .image_view(view)
        .image_layout(layout)
        .load_op(config.load_op)
        .store_op(config.store_op)
        .clear_value(config.clear.as_clear_value())
}

fn msaa_attachment_info(
    attachment: &MsaaAttachment,
    config: &ColorConfig,
) -> vk::RenderingAttachmentInfo<'static> {
    attachment_info(attachment.view, attachment.layout, config)
        .resolve_mode(vk::ResolveModeFlags::AVERAGE)
        .resolve_image_view(attachment.resolve_view)
        .resolve_image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
}

///Single-sampled attachment group.
pub struct AttachmentGroup {
    base: AttachmentGroupBase,
    color: Vec<Attachment>,
    depth_stencil: Option<Attachment>,
}

impl AttachmentGroup {
    pub fn new(extent: vk::Extent2D) -> Self {
        AttachmentGroup {
            base: AttachmentGroupBase::new(extent),
            color: Vec::new(),
            depth_stencil: None,
        }
    }

    ///Creates a single-sampled color render target image. The color attachment
    /// usage bit is always set. Pure factory, see
    /// [store_image](AttachmentGroupBase::store_image).
    pub fn create_color_image<A: Allocator + Send + 'static>(
        &self,
        allocator: &Arc<Mutex<A>>,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        memory_usage: MemoryUsage,
    ) -> Result<AllocatedImage, ResourceError> {
        self.base.create_attachment_image(
            allocator,
            format,
            vk::SampleCountFlags::TYPE_1,
            usage | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            memory_usage,
        )
    }

    ///Creates a single-sampled depth/stencil render target image. The
    /// depth/stencil attachment usage bit is always set.
    pub fn create_depth_stencil_image<A: Allocator + Send + 'static>(
        &self,
        allocator: &Arc<Mutex<A>>,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        memory_usage: MemoryUsage,
    ) -> Result<AllocatedImage, ResourceError> {
        self.base.create_attachment_image(
            allocator,
            format,
            vk::SampleCountFlags::TYPE_1,
            usage | vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            memory_usage,
        )
    }

    ///Derives a view over `range` of `image` and appends it as the next color
    /// attachment. Order here is the attachment order of the pass. A format of
    /// `UNDEFINED` inherits the image format.
    pub fn add_color_attachment(
        &mut self,
        device: &Arc<Device>,
        image: &Image,
        format: vk::Format,
        range: vk::ImageSubresourceRange,
    ) -> Result<Attachment, ResourceError> {
        let view = self.base.create_view(device, image, format, range)?;
        Ok(self.add_color_attachment_view(view, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL))
    }

    ///Appends an externally created view as the next color attachment. The view
    /// must outlive the group.
    pub fn add_color_attachment_view(
        &mut self,
        view: vk::ImageView,
        layout: vk::ImageLayout,
    ) -> Attachment {
        let attachment = Attachment { view, layout };
        self.color.push(attachment);
        attachment
    }

    ///Views the depth aspect of `image` and installs it as the depth/stencil
    /// attachment, replacing any previous one.
    pub fn set_depth_attachment(
        &mut self,
        device: &Arc<Device>,
        image: &Image,
        format: vk::Format,
    ) -> Result<(), ResourceError> {
        self.set_ds_aspect(device, image, format, vk::ImageAspectFlags::DEPTH)
    }

    ///Views the stencil aspect of `image` and installs it as the depth/stencil
    /// attachment, replacing any previous one.
    pub fn set_stencil_attachment(
        &mut self,
        device: &Arc<Device>,
        image: &Image,
        format: vk::Format,
    ) -> Result<(), ResourceError> {
        self.set_ds_aspect(device, image, format, vk::ImageAspectFlags::STENCIL)
    }

    ///Views both aspects of `image` and installs it as the depth/stencil
    /// attachment, replacing any previous one. For combined depth/stencil formats.
    pub fn set_depth_stencil_attachment(
        &mut self,
        device: &Arc<Device>,
        image: &Image,
        format: vk::Format,
    ) -> Result<(), ResourceError> {
        self.set_ds_aspect(
            device,
            image,
            format,
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
        )
    }

    fn set_ds_aspect(
        &mut self,
        device: &Arc<Device>,
        image: &Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> Result<(), ResourceError> {
        let view =
            self.base
                .create_view(device, image, format, util::subresource_range(aspect))?;
        self.set_depth_stencil_attachment_view(
            view,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        );
        Ok(())
    }

    ///Installs an externally created view as the depth/stencil attachment,
    /// replacing any previous one. The view must outlive the group.
    pub fn set_depth_stencil_attachment_view(
        &mut self,
        view: vk::ImageView,
        layout: vk::ImageLayout,
    ) {
        self.depth_stencil = Some(Attachment { view, layout });
    }

    ///Assembles the rendering state of one pass over this group. Attachment infos
    /// pair with configs in registration order.
    ///
    /// Panics if `color_configs` does not supply exactly one config per registered
    /// color attachment, or if the depth/stencil config presence does not match
    /// the attachment presence.
    pub fn rendering_info(
        &self,
        color_configs: &[ColorConfig],
        ds_config: Option<DepthStencilConfig>,
    ) -> RenderingDescriptor {
        assert_eq!(
            color_configs.len(),
            self.color.len(),
            "one config per color attachment is required"
        );
        assert_eq!(
            ds_config.is_some(),
            self.depth_stencil.is_some(),
            "depth/stencil config and attachment must be supplied together"
        );

        RenderingDescriptor {
            render_area: self.base.scissor(),
            layer_count: 1,
            color: self
                .color
                .iter()
                .zip(color_configs)
                .map(|(attachment, config)| {
                    attachment_info(attachment.view, attachment.layout, config)
                })
                .collect(),
            depth_stencil: self
                .depth_stencil
                .as_ref()
                .zip(ds_config.as_ref())
                .map(|(attachment, config)| {
                    attachment_info(attachment.view, attachment.layout, config)
                }),
        }
    }
}

impl Deref for AttachmentGroup {
    type Target = AttachmentGroupBase;
    fn deref(&self) -> &AttachmentGroupBase {
        &self.base
    }
}

impl DerefMut for AttachmentGroup {
    fn deref_mut(&mut self) -> &mut AttachmentGroupBase {
        &mut self.base
    }
}

///Multisampled attachment group. Color attachments render at `samples` and resolve
/// into their single-sampled partner at the end of the pass. Depth/stencil renders
/// multisampled without a resolve.
pub struct MsaaAttachmentGroup {
    base: AttachmentGroupBase,
    samples: vk::SampleCountFlags,
    color: Vec<MsaaAttachment>,
    depth_stencil: Option<Attachment>,
}

impl MsaaAttachmentGroup {
    pub fn new(extent: vk::Extent2D, samples: vk::SampleCountFlags) -> Self {
        MsaaAttachmentGroup {
            base: AttachmentGroupBase::new(extent),
            samples,
            color: Vec::new(),
            depth_stencil: None,
        }
    }

    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    ///Creates a color render target image at the group sample count. Pure
    /// factory, see [store_image](AttachmentGroupBase::store_image).
    pub fn create_color_image<A: Allocator + Send + 'static>(
        &self,
        allocator: &Arc<Mutex<A>>,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        memory_usage: MemoryUsage,
    ) -> Result<AllocatedImage, ResourceError> {
        self.base.create_attachment_image(
            allocator,
            format,
            self.samples,
            usage | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            memory_usage,
        )
    }

    ///Creates the single-sampled image a color attachment resolves into.
    pub fn create_resolve_image<A: Allocator + Send + 'static>(
        &self,
        allocator: &Arc<Mutex<A>>,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        memory_usage: MemoryUsage,
    ) -> Result<AllocatedImage, ResourceError> {
        self.base.create_attachment_image(
            allocator,
            format,
            vk::SampleCountFlags::TYPE_1,
            usage | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            memory_usage,
        )
    }

    ///Creates a depth/stencil render target image at the group sample count.
    pub fn create_depth_stencil_image<A: Allocator + Send + 'static>(
        &self,
        allocator: &Arc<Mutex<A>>,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        memory_usage: MemoryUsage,
    ) -> Result<AllocatedImage, ResourceError> {
        self.base.create_attachment_image(
            allocator,
            format,
            self.samples,
            usage | vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            memory_usage,
        )
    }

    ///Derives views over `image` and `resolve_image` and appends them as the next
    /// color attachment. A format of `UNDEFINED` inherits the respective image
    /// format.
    pub fn add_color_attachment(
        &mut self,
        device: &Arc<Device>,
        image: &Image,
        resolve_image: &Image,
        format: vk::Format,
        range: vk::ImageSubresourceRange,
        resolve_range: vk::ImageSubresourceRange,
    ) -> Result<MsaaAttachment, ResourceError> {
        let view = self.base.create_view(device, image, format, range)?;
        let resolve_view = self
            .base
            .create_view(device, resolve_image, format, resolve_range)?;
        Ok(self.add_color_attachment_views(
            view,
            resolve_view,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ))
    }

    ///Appends externally created views as the next color attachment. Both views
    /// must outlive the group.
    pub fn add_color_attachment_views(
        &mut self,
        view: vk::ImageView,
        resolve_view: vk::ImageView,
        layout: vk::ImageLayout,
    ) -> MsaaAttachment {
        let attachment = MsaaAttachment {
            view,
            resolve_view,
            layout,
        };
        self.color.push(attachment);
        attachment
    }

    ///Views the depth aspect of `image` and installs it as the depth/stencil
    /// attachment, replacing any previous one.
    pub fn set_depth_attachment(
        &mut self,
        device: &Arc<Device>,
        image: &Image,
        format: vk::Format,
    ) -> Result<(), ResourceError> {
        self.set_ds_aspect(device, image, format, vk::ImageAspectFlags::DEPTH)
    }

    ///Views the stencil aspect of `image` and installs it as the depth/stencil
    /// attachment, replacing any previous one.
    pub fn set_stencil_attachment(
        &mut self,
        device: &Arc<Device>,
        image: &Image,
        format: vk::Format,
    ) -> Result<(), ResourceError> {
        self.set_ds_aspect(device, image, format, vk::ImageAspectFlags::STENCIL)
    }

    ///Views both aspects of `image` and installs it as the depth/stencil
    /// attachment, replacing any previous one.
    pub fn set_depth_stencil_attachment(
        &mut self,
        device: &Arc<Device>,
        image: &Image,
        format: vk::Format,
    ) -> Result<(), ResourceError> {
        self.set_ds_aspect(
            device,
            image,
            format,
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
        )
    }

    fn set_ds_aspect(
        &mut self,
        device: &Arc<Device>,
        image: &Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> Result<(), ResourceError> {
        let view =
            self.base
                .create_view(device, image, format, util::subresource_range(aspect))?;
        self.set_depth_stencil_attachment_view(
            view,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        );
        Ok(())
    }

    ///Installs an externally created view as the depth/stencil attachment,
    /// replacing any previous one. The view must outlive the group.
    pub fn set_depth_stencil_attachment_view(
        &mut self,
        view: vk::ImageView,
        layout: vk::ImageLayout,
    ) {
        self.depth_stencil = Some(Attachment { view, layout });
    }

    ///Assembles the rendering state of one pass over this group. Every color
    /// attachment resolves into its partner with average resolve mode; the
    /// depth/stencil attachment stays multisampled.
    ///
    /// Panics under the same conditions as [AttachmentGroup::rendering_info].
    pub fn rendering_info(
        &self,
        color_configs: &[ColorConfig],
        ds_config: Option<DepthStencilConfig>,
    ) -> RenderingDescriptor {
        assert_eq!(
            color_configs.len(),
            self.color.len(),
            "one config per color attachment is required"
        );
        assert_eq!(
            ds_config.is_some(),
            self.depth_stencil.is_some(),
            "depth/stencil config and attachment must be supplied together"
        );

        RenderingDescriptor {
            render_area: self.base.scissor(),
            layer_count: 1,
            color: self
                .color
                .iter()
                .zip(color_configs)
                .map(|(attachment, config)| msaa_attachment_info(attachment, config))
                .collect(),
            depth_stencil: self
                .depth_stencil
                .as_ref()
                .zip(ds_config.as_ref())
                .map(|(attachment, config)| {
                    attachment_info(attachment.view, attachment.layout, config)
                }),
        }
    }
}

impl Deref for MsaaAttachmentGroup {
    type Target = AttachmentGroupBase;
    fn deref(&self) -> &AttachmentGroupBase {
        &self.base
    }
}

impl DerefMut for MsaaAttachmentGroup {
    fn deref_mut(&mut self) -> &mut AttachmentGroupBase {
        &mut self.base
    }
}

///The assembled per-pass rendering state. Owns the attachment info arrays the
/// final [vk::RenderingInfo] points into, so the group can be mutated or dropped
/// independently of passes already assembled.
pub struct RenderingDescriptor {
    render_area: vk::Rect2D,
    layer_count: u32,
    color: SmallVec<[vk::RenderingAttachmentInfo<'static>; 4]>,
    depth_stencil: Option<vk::RenderingAttachmentInfo<'static>>,
}

impl RenderingDescriptor {
    ///The info for `vkCmdBeginRendering`. Borrows the arrays owned by `self`.
    pub fn rendering_info(&self) -> vk::RenderingInfo<'_> {
        let mut info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(self.layer_count)
            .color_attachments(&self.color);

        if let Some(depth_stencil) = &self.depth_stencil {
            info = info.depth_attachment(depth_stencil);
        }

        info
    }

    ///Begins dynamic rendering on `cmd`.
    ///
    /// # Safety
    ///
    /// `cmd` must be in the recording state and all views referenced by this
    /// descriptor must still be alive.
    pub unsafe fn begin(&self, device: &Device, cmd: vk::CommandBuffer) {
        unsafe { device.inner.cmd_begin_rendering(cmd, &self.rendering_info()) };
    }

    ///Ends dynamic rendering on `cmd`.
    ///
    /// # Safety
    ///
    /// `cmd` must be recording a rendering instance begun by [begin](Self::begin).
    pub unsafe fn end(&self, device: &Device, cmd: vk::CommandBuffer) {
        unsafe { device.inner.cmd_end_rendering(cmd) };
    }
}
