//! Polygon draw helpers: fan-to-strip index synthesis and flat shading.

use boreal_gpu_protocol::{DeclType, VertexDeclRecord};

/// Index order rendering a convex polygon as a triangle strip: vertex 0,
/// then alternately the next-lowest and next-highest remaining vertices
/// (`0, 1, n-1, 2, n-2, ...`).
pub fn polygon_index_order(base: u16, vertex_count: u16) -> Vec<u16> {
    let mut indices = Vec::with_capacity(vertex_count as usize);
    if vertex_count == 0 {
        return indices;
    }
    let mut lo = 0u16;
    let mut hi = vertex_count - 1;
    indices.push(base + lo);
    lo += 1;
    while lo < hi {
        indices.push(base + lo);
        indices.push(base + hi);
        lo += 1;
        hi -= 1;
    }
    if lo == hi {
        indices.push(base + lo);
    }
    indices
}

/// Copy vertex 0's packed color attributes onto every other vertex, so a
/// flat-shaded polygon renders with one color regardless of provoking-vertex
/// convention.
pub fn broadcast_flat_color(
    vertex_bytes: &mut [u8],
    vertex_count: usize,
    decls: &[VertexDeclRecord],
) {
    for decl in decls {
        if decl.decl_type != DeclType::ColorU32 as u32 {
            continue;
        }
        let offset = decl.offset as usize;
        let stride = decl.stride as usize;
        if stride == 0 || offset + 4 > vertex_bytes.len() {
            continue;
        }
        let color: [u8; 4] = vertex_bytes[offset..offset + 4].try_into().unwrap_or([0; 4]);
        for v in 1..vertex_count {
            let at = v * stride + offset;
            if at + 4 > vertex_bytes.len() {
                break;
            }
            vertex_bytes[at..at + 4].copy_from_slice(&color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boreal_gpu_protocol::DeclUsage;
    use pretty_assertions::assert_eq;

    #[test]
    fn fan_order_alternates_low_and_high() {
        assert_eq!(polygon_index_order(0, 3), vec![0, 1, 2]);
        assert_eq!(polygon_index_order(0, 4), vec![0, 1, 3, 2]);
        assert_eq!(polygon_index_order(0, 5), vec![0, 1, 4, 2, 3]);
        assert_eq!(polygon_index_order(0, 6), vec![0, 1, 5, 2, 4, 3]);
        assert_eq!(polygon_index_order(10, 4), vec![10, 11, 13, 12]);
        assert_eq!(polygon_index_order(0, 0), Vec::<u16>::new());
    }

    #[test]
    fn flat_shading_broadcasts_vertex_zero_colors() {
        let decls = [VertexDeclRecord {
            usage: DeclUsage::Color as u32,
            usage_index: 0,
            decl_type: DeclType::ColorU32 as u32,
            offset: 4,
            stride: 8,
        }];
        // Three vertices of [ignored u32, color u32].
        let mut bytes = Vec::new();
        for (pad, color) in [(1u32, 0xAABBCCDDu32), (2, 0x11111111), (3, 0x22222222)] {
            bytes.extend_from_slice(&pad.to_le_bytes());
            bytes.extend_from_slice(&color.to_le_bytes());
        }
        broadcast_flat_color(&mut bytes, 3, &decls);
        for v in 0..3 {
            let at = v * 8 + 4;
            assert_eq!(
                u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap()),
                0xAABBCCDD
            );
        }
        // Non-color bytes untouched.
        assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 2);
    }
}
