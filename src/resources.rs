//! Allocatable resources. Mostly [Image] and [Buffer] plus their self-managing
//! allocated variants, and small pipeline-construction helpers.

mod buffer;
mod image;
mod pipeline;

pub use buffer::{AllocatedBuffer, Buffer, MappedBuffer};
pub use image::{AllocatedImage, AnonymAllocation, Image, ImageView};
pub use pipeline::{
    GraphicsPipelineDefaults, GraphicsPipelineState, MAX_COLOR_ATTACHMENTS, ShaderStage,
    shader_stage_infos,
};
