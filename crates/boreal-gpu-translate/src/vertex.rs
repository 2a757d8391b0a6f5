//! Vertex format synthesis from the two packed legacy descriptor words.
//!
//! Descriptor A carries eight 4-bit texture-coordinate formats; descriptor B
//! carries the position kind and the presence bits for point width, colors,
//! and the fog parameter. `analyze` is pure: the declaration list, offsets,
//! and stride are a function of the two words and the capacity alone.

use boreal_gpu_protocol::{DeclType, DeclUsage, VertexDeclRecord};
use thiserror::Error;

use crate::bits::bit_select;

/// Enough slots for position, point width, two colors, and all eight
/// texture-coordinate sets.
pub const MAX_DECLS: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VertexFormatError {
    #[error("position kind XYW is not supported")]
    UnsupportedPosition,
    #[error("invalid position kind {value}")]
    InvalidPosition { value: u32 },
    #[error("invalid texture coordinate format {value} for set {set}")]
    InvalidTexCoordFormat { set: u32, value: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexFormat {
    pub decls: Vec<VertexDeclRecord>,
    /// Bit per texture-coordinate set that produced a declaration.
    pub texcoord_mask: u8,
    /// Byte stride of one interleaved vertex, covering every attribute the
    /// descriptors name even when `capacity` truncated the declaration list.
    pub stride: u32,
}

/// Position kind field of descriptor B.
pub(crate) fn position_kind(descriptor_b: u32) -> u32 {
    bit_select(descriptor_b, 6, 3)
}

pub(crate) fn has_point_width(descriptor_b: u32) -> bool {
    descriptor_b & (1 << 12) != 0
}

pub(crate) fn has_primary_color(descriptor_b: u32) -> bool {
    descriptor_b & (1 << 10) != 0
}

pub(crate) fn has_specular_color(descriptor_b: u32) -> bool {
    descriptor_b & (1 << 11) != 0
}

pub(crate) fn has_fog_param(descriptor_b: u32) -> bool {
    descriptor_b & (1 << 2) != 0
}

/// Flat-shade bit of descriptor B; consulted by the polygon draw path.
pub(crate) fn flat_shade(descriptor_b: u32) -> bool {
    descriptor_b & (1 << 15) != 0
}

/// Texture-coordinate format nibble for `set` of descriptor A.
pub(crate) fn texcoord_format(descriptor_a: u32, set: u32) -> u32 {
    bit_select(descriptor_a, set * 4, 4)
}

/// Derive the declaration list and stride. Position always comes first;
/// the fog parameter contributes vertex bytes but no declaration; nibble
/// `0xF` marks an absent texture-coordinate set. Declarations stop at
/// `capacity`, but size accumulation continues so the stride always matches
/// the untruncated vertex layout.
pub fn analyze(
    descriptor_a: u32,
    descriptor_b: u32,
    capacity: usize,
) -> Result<VertexFormat, VertexFormatError> {
    let mut decls = Vec::with_capacity(capacity.min(MAX_DECLS));
    let mut size = 0u32;
    let mut texcoord_mask = 0u8;

    let mut push = |decls: &mut Vec<VertexDeclRecord>,
                    size: &mut u32,
                    usage: DeclUsage,
                    usage_index: u32,
                    ty: DeclType|
     -> bool {
        let produced = decls.len() < capacity;
        if produced {
            decls.push(VertexDeclRecord {
                usage: usage as u32,
                usage_index,
                decl_type: ty as u32,
                offset: *size,
                stride: 0,
            });
        }
        *size += ty.size_bytes();
        produced
    };

    let position_type = match position_kind(descriptor_b) {
        1 => DeclType::Float3,
        2 => DeclType::Float4,
        3 => DeclType::Float2,
        4 => return Err(VertexFormatError::UnsupportedPosition),
        value => return Err(VertexFormatError::InvalidPosition { value }),
    };
    push(&mut decls, &mut size, DeclUsage::Position, 0, position_type);

    if has_point_width(descriptor_b) {
        push(&mut decls, &mut size, DeclUsage::PointSize, 0, DeclType::Float1);
    }
    if has_primary_color(descriptor_b) {
        push(&mut decls, &mut size, DeclUsage::Color, 0, DeclType::ColorU32);
    }
    if has_specular_color(descriptor_b) {
        push(&mut decls, &mut size, DeclUsage::Color, 1, DeclType::ColorU32);
    }
    if has_fog_param(descriptor_b) {
        // Occupies vertex bytes only; no attribute is declared for it.
        size += 4;
    }

    for set in 0..8u32 {
        let ty = match texcoord_format(descriptor_a, set) {
            0 => DeclType::Float2,
            1 => DeclType::Float3,
            2 => DeclType::Float4,
            3 => DeclType::Float1,
            4 => DeclType::Half2,
            5 => DeclType::Half4,
            0xF => continue,
            value => return Err(VertexFormatError::InvalidTexCoordFormat { set, value }),
        };
        if push(&mut decls, &mut size, DeclUsage::TexCoord, set, ty) {
            texcoord_mask |= 1 << set;
        }
    }

    for decl in &mut decls {
        decl.stride = size;
    }
    Ok(VertexFormat {
        decls,
        texcoord_mask,
        stride: size,
    })
}
