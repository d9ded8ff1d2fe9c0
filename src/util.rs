//! The infamous utility module. Extent conversion, mip-chain arithmetic,
//! format-to-aspect mapping and subresource-range helpers used throughout the crate.

use ash::vk;

///Drops the depth component of `extent`.
pub const fn extent_2d(extent: vk::Extent3D) -> vk::Extent2D {
    vk::Extent2D {
        width: extent.width,
        height: extent.height,
    }
}

///Lifts a 2d extent into a 3d one with a depth of 1.
pub const fn extent_3d(extent: vk::Extent2D) -> vk::Extent3D {
    vk::Extent3D {
        width: extent.width,
        height: extent.height,
        depth: 1,
    }
}

///Reinterprets an extent as an offset, for instance to build the blit region of a whole image.
pub const fn extent_to_offset(extent: vk::Extent2D) -> vk::Offset2D {
    vk::Offset2D {
        x: extent.width as i32,
        y: extent.height as i32,
    }
}

///Number of mip levels of a full mip chain over `size`, i.e. the bit width of `size`.
pub const fn max_mip_levels(size: u32) -> u32 {
    u32::BITS - size.leading_zeros()
}

///Number of mip levels of a full mip chain over `extent`, bounded by its smaller side.
pub const fn max_mip_levels_2d(extent: vk::Extent2D) -> u32 {
    max_mip_levels(if extent.width < extent.height {
        extent.width
    } else {
        extent.height
    })
}

///Extent of mip level `level` of an image with mip level 0 sized `extent`.
pub const fn mip_extent(extent: vk::Extent2D, level: u32) -> vk::Extent2D {
    vk::Extent2D {
        width: extent.width >> level,
        height: extent.height >> level,
    }
}

///Maps an image format to the aspect flags a view of it uses. Depth-only and
/// stencil-only formats map to their single aspect, combined formats to both,
/// everything else to `COLOR`.
pub const fn format_aspect_flags(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::X8_D24_UNORM_PACK32 | vk::Format::D32_SFLOAT => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::from_raw(
                vk::ImageAspectFlags::DEPTH.as_raw() | vk::ImageAspectFlags::STENCIL.as_raw(),
            )
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

///Single-mip, single-layer subresource range for the given aspect. This is the
/// default range used when creating attachment views.
pub const fn subresource_range(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

///Rounds `num / denom` up.
pub const fn div_ceil(num: u32, denom: u32) -> u32 {
    num / denom + (num % denom != 0) as u32
}

///Total invocation-group count of a 3d dispatch.
pub const fn workgroup_total(workgroup_count: [u32; 3]) -> u32 {
    workgroup_count[0] * workgroup_count[1] * workgroup_count[2]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_levels() {
        assert_eq!(max_mip_levels(1), 1);
        assert_eq!(max_mip_levels(512), 10);
        assert_eq!(max_mip_levels(513), 10);
        assert_eq!(
            max_mip_levels_2d(vk::Extent2D {
                width: 1024,
                height: 512
            }),
            10
        );
        assert_eq!(
            mip_extent(
                vk::Extent2D {
                    width: 800,
                    height: 600
                },
                2
            ),
            vk::Extent2D {
                width: 200,
                height: 150
            }
        );
    }

    #[test]
    fn aspect_mapping() {
        assert_eq!(
            format_aspect_flags(vk::Format::R8G8B8A8_UNORM),
            vk::ImageAspectFlags::COLOR
        );
        assert_eq!(
            format_aspect_flags(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            format_aspect_flags(vk::Format::S8_UINT),
            vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            format_aspect_flags(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn dispatch_arithmetic() {
        assert_eq!(div_ceil(1920, 16), 120);
        assert_eq!(div_ceil(1921, 16), 121);
        assert_eq!(workgroup_total([4, 3, 2]), 24);
    }

    #[test]
    fn full_range_is_single_mip_and_layer() {
        let range = subresource_range(vk::ImageAspectFlags::COLOR);
        assert_eq!(range.base_mip_level, 0);
        assert_eq!(range.level_count, 1);
        assert_eq!(range.base_array_layer, 0);
        assert_eq!(range.layer_count, 1);
    }
}
