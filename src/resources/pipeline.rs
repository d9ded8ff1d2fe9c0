use std::ffi::CStr;

use ash::vk;

use crate::error::ResourceError;

///Upper bound on simultaneously bound color attachments that the default pipeline
/// state is prepared for.
pub const MAX_COLOR_ATTACHMENTS: u32 = 8;

///One shader stage of a pipeline. The module is created and owned by the caller,
/// usually from reflected or embedded SPIR-V.
#[derive(Clone, Copy, Debug)]
pub struct ShaderStage<'a> {
    pub stage: vk::ShaderStageFlags,
    pub module: vk::ShaderModule,
    pub entry: &'a CStr,
}

///Builds the stage create infos for a pipeline from a list of [ShaderStage]s, in order.
pub fn shader_stage_infos<'a>(
    stages: &[ShaderStage<'a>],
) -> Vec<vk::PipelineShaderStageCreateInfo<'a>> {
    stages
        .iter()
        .map(|stage| {
            vk::PipelineShaderStageCreateInfo::default()
                .stage(stage.stage)
                .module(stage.module)
                .name(stage.entry)
        })
        .collect()
}

///Owns the default fixed-function state arrays a graphics pipeline create info
/// points into. Covers the common case of dynamic-rendering pipelines: triangle
/// list, fill mode with back face culling, no blending, viewport and scissor
/// dynamic.
///
/// Keep this alive for as long as create infos derived from it are in use.
pub struct GraphicsPipelineDefaults {
    blend_attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    dynamic_states: [vk::DynamicState; 2],
    sample_count: vk::SampleCountFlags,
    has_depth_stencil: bool,
}

impl GraphicsPipelineDefaults {
    pub fn new(
        color_attachment_count: u32,
        has_depth_stencil: bool,
        sample_count: vk::SampleCountFlags,
    ) -> Result<Self, ResourceError> {
        if color_attachment_count > MAX_COLOR_ATTACHMENTS {
            return Err(ResourceError::TooManyColorAttachments {
                requested: color_attachment_count,
                max: MAX_COLOR_ATTACHMENTS,
            });
        }

        let blend_attachment = vk::PipelineColorBlendAttachmentState::default().color_write_mask(
            vk::ColorComponentFlags::R
                | vk::ColorComponentFlags::G
                | vk::ColorComponentFlags::B
                | vk::ColorComponentFlags::A,
        );

        Ok(GraphicsPipelineDefaults {
            blend_attachments: vec![blend_attachment; color_attachment_count as usize],
            dynamic_states: [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            sample_count,
            has_depth_stencil,
        })
    }

    ///Assembles the per-stage state blocks. The returned value borrows the arrays
    /// owned by `self`.
    pub fn state(&self) -> GraphicsPipelineState<'_> {
        GraphicsPipelineState {
            vertex_input: vk::PipelineVertexInputStateCreateInfo::default(),
            input_assembly: vk::PipelineInputAssemblyStateCreateInfo::default()
                .topology(vk::PrimitiveTopology::TRIANGLE_LIST),
            viewport: vk::PipelineViewportStateCreateInfo::default()
                .viewport_count(1)
                .scissor_count(1),
            rasterization: vk::PipelineRasterizationStateCreateInfo::default()
                .polygon_mode(vk::PolygonMode::FILL)
                .cull_mode(vk::CullModeFlags::BACK)
                .line_width(1.0),
            multisample: vk::PipelineMultisampleStateCreateInfo::default()
                .rasterization_samples(self.sample_count),
            depth_stencil: self
                .has_depth_stencil
                .then(vk::PipelineDepthStencilStateCreateInfo::default),
            color_blend: vk::PipelineColorBlendStateCreateInfo::default()
                .attachments(&self.blend_attachments),
            dynamic: vk::PipelineDynamicStateCreateInfo::default()
                .dynamic_states(&self.dynamic_states),
        }
    }
}

///The assembled fixed-function state blocks of one graphics pipeline.
pub struct GraphicsPipelineState<'a> {
    pub vertex_input: vk::PipelineVertexInputStateCreateInfo<'a>,
    pub input_assembly: vk::PipelineInputAssemblyStateCreateInfo<'a>,
    pub viewport: vk::PipelineViewportStateCreateInfo<'a>,
    pub rasterization: vk::PipelineRasterizationStateCreateInfo<'a>,
    pub multisample: vk::PipelineMultisampleStateCreateInfo<'a>,
    pub depth_stencil: Option<vk::PipelineDepthStencilStateCreateInfo<'a>>,
    pub color_blend: vk::PipelineColorBlendStateCreateInfo<'a>,
    pub dynamic: vk::PipelineDynamicStateCreateInfo<'a>,
}

impl<'a> GraphicsPipelineState<'a> {
    ///Wires `stages`, `layout` and the state blocks into a create info. The result
    /// borrows `self` and `stages`.
    pub fn create_info(
        &'a self,
        stages: &'a [vk::PipelineShaderStageCreateInfo<'a>],
        layout: vk::PipelineLayout,
    ) -> vk::GraphicsPipelineCreateInfo<'a> {
        let mut create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(stages)
            .vertex_input_state(&self.vertex_input)
            .input_assembly_state(&self.input_assembly)
            .viewport_state(&self.viewport)
            .rasterization_state(&self.rasterization)
            .multisample_state(&self.multisample)
            .color_blend_state(&self.color_blend)
            .dynamic_state(&self.dynamic)
            .layout(layout);

        if let Some(depth_stencil) = &self.depth_stencil {
            create_info = create_info.depth_stencil_state(depth_stencil);
        }

        create_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_too_many_color_attachments() {
        let err = GraphicsPipelineDefaults::new(9, false, vk::SampleCountFlags::TYPE_1)
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(
            err,
            ResourceError::TooManyColorAttachments {
                requested: 9,
                max: MAX_COLOR_ATTACHMENTS
            }
        ));
    }

    #[test]
    fn default_state_wiring() {
        let defaults =
            GraphicsPipelineDefaults::new(3, true, vk::SampleCountFlags::TYPE_4).unwrap();
        let state = defaults.state();

        assert_eq!(state.color_blend.attachment_count, 3);
        assert_eq!(
            state.multisample.rasterization_samples,
            vk::SampleCountFlags::TYPE_4
        );
        assert!(state.depth_stencil.is_some());

        let stages: [vk::PipelineShaderStageCreateInfo; 0] = [];
        let create_info = state.create_info(&stages, vk::PipelineLayout::null());
        assert!(!create_info.p_depth_stencil_state.is_null());
        assert!(!create_info.p_dynamic_state.is_null());
    }

    #[test]
    fn depth_stencil_block_is_optional() {
        let defaults =
            GraphicsPipelineDefaults::new(1, false, vk::SampleCountFlags::TYPE_1).unwrap();
        let state = defaults.state();
        assert!(state.depth_stencil.is_none());

        let stages: [vk::PipelineShaderStageCreateInfo; 0] = [];
        let create_info = state.create_info(&stages, vk::PipelineLayout::null());
        assert!(create_info.p_depth_stencil_state.is_null());
    }
}
