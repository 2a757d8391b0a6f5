//! Total translation tables from legacy state encodings to protocol enums.
//!
//! Every function is a total `match`: out-of-domain input maps to the enum's
//! explicit `Invalid` variant, never a silent clamp. The device drops entries
//! carrying `Invalid`.

use boreal_gpu_protocol::{AddressMode, ClearFlags, CompareFunc, FilterMode, StencilOpValue};

/// Texture coordinate addressing. The legacy cube mode collapses to edge
/// clamping; the device has no cube addressing distinct from its face setup.
pub fn translate_address_mode(v: u32) -> AddressMode {
    match v {
        0 => AddressMode::Wrap,
        1 => AddressMode::Mirror,
        2 | 3 => AddressMode::Edge,
        4 => AddressMode::Border,
        5 => AddressMode::MirrorOnce,
        _ => AddressMode::Invalid,
    }
}

/// Mip filter slot (two-bit legacy field, value 2 is reserved).
pub fn translate_mip_filter(v: u32) -> FilterMode {
    match v {
        0 => FilterMode::None,
        1 => FilterMode::Nearest,
        3 => FilterMode::Linear,
        _ => FilterMode::Invalid,
    }
}

/// Min/mag filter slot. Legacy values 3-6 are block filters the device
/// cannot express; they degrade to nearest.
pub fn translate_image_filter(v: u32) -> FilterMode {
    match v {
        0 | 3..=6 => FilterMode::Nearest,
        1 => FilterMode::Linear,
        2 => FilterMode::Anisotropic,
        _ => FilterMode::Invalid,
    }
}

/// Comparison functions share the protocol's numbering except zero, which
/// the legacy stream uses for "always". Callers pass three-bit fields.
pub fn translate_compare_func(v: u32) -> CompareFunc {
    match v {
        1 => CompareFunc::Never,
        2 => CompareFunc::Less,
        3 => CompareFunc::Equal,
        4 => CompareFunc::LessEqual,
        5 => CompareFunc::Greater,
        6 => CompareFunc::NotEqual,
        7 => CompareFunc::GreaterEqual,
        _ => CompareFunc::Always,
    }
}

pub fn translate_stencil_op(v: u32) -> StencilOpValue {
    match v {
        0 => StencilOpValue::Keep,
        1 => StencilOpValue::Zero,
        2 => StencilOpValue::Replace,
        3 => StencilOpValue::IncrSat,
        4 => StencilOpValue::DecrSat,
        5 => StencilOpValue::Incr,
        6 => StencilOpValue::Decr,
        7 => StencilOpValue::Invert,
        _ => StencilOpValue::Invalid,
    }
}

/// Legacy clear mask: bit 2 color, bit 1 depth, bit 0 stencil.
pub fn translate_clear_mask(mask: u32) -> ClearFlags {
    let mut out = ClearFlags::empty();
    if mask & 4 != 0 {
        out |= ClearFlags::COLOR;
    }
    if mask & 2 != 0 {
        out |= ClearFlags::DEPTH;
    }
    if mask & 1 != 0 {
        out |= ClearFlags::STENCIL;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_modes_cover_the_full_domain() {
        assert_eq!(translate_address_mode(0), AddressMode::Wrap);
        assert_eq!(translate_address_mode(1), AddressMode::Mirror);
        assert_eq!(translate_address_mode(2), AddressMode::Edge);
        // Legacy cube mode collapses to edge.
        assert_eq!(translate_address_mode(3), AddressMode::Edge);
        assert_eq!(translate_address_mode(4), AddressMode::Border);
        assert_eq!(translate_address_mode(5), AddressMode::MirrorOnce);
        for v in 6..16 {
            assert_eq!(translate_address_mode(v), AddressMode::Invalid);
        }
    }

    #[test]
    fn filters_are_total_with_explicit_invalid() {
        assert_eq!(translate_mip_filter(0), FilterMode::None);
        assert_eq!(translate_mip_filter(1), FilterMode::Nearest);
        assert_eq!(translate_mip_filter(2), FilterMode::Invalid);
        assert_eq!(translate_mip_filter(3), FilterMode::Linear);

        assert_eq!(translate_image_filter(0), FilterMode::Nearest);
        assert_eq!(translate_image_filter(1), FilterMode::Linear);
        assert_eq!(translate_image_filter(2), FilterMode::Anisotropic);
        for v in 3..7 {
            assert_eq!(translate_image_filter(v), FilterMode::Nearest);
        }
        assert_eq!(translate_image_filter(7), FilterMode::Invalid);
    }

    #[test]
    fn compare_zero_means_always() {
        assert_eq!(translate_compare_func(0), CompareFunc::Always);
        assert_eq!(translate_compare_func(1), CompareFunc::Never);
        assert_eq!(translate_compare_func(7), CompareFunc::GreaterEqual);
    }

    #[test]
    fn stencil_ops_reorder_incr_decr_invert() {
        assert_eq!(translate_stencil_op(0), StencilOpValue::Keep);
        assert_eq!(translate_stencil_op(4), StencilOpValue::DecrSat);
        assert_eq!(translate_stencil_op(5), StencilOpValue::Incr);
        assert_eq!(translate_stencil_op(6), StencilOpValue::Decr);
        assert_eq!(translate_stencil_op(7), StencilOpValue::Invert);
        assert_eq!(translate_stencil_op(8), StencilOpValue::Invalid);
    }

    #[test]
    fn clear_mask_bits_map_to_flags() {
        assert_eq!(translate_clear_mask(0), ClearFlags::empty());
        assert_eq!(translate_clear_mask(4), ClearFlags::COLOR);
        assert_eq!(translate_clear_mask(2), ClearFlags::DEPTH);
        assert_eq!(translate_clear_mask(1), ClearFlags::STENCIL);
        assert_eq!(
            translate_clear_mask(7),
            ClearFlags::COLOR | ClearFlags::DEPTH | ClearFlags::STENCIL
        );
    }
}
