//! Command opcodes, state names, and fixed payload records.
//!
//! Every command in the ring is framed `[opcode u32, size_bytes u32,
//! payload...]` with `size_bytes` covering the whole record, except
//! [`Opcode::Fence`], which is the raw two-word record `[FENCE, id]`.
//! Payloads are a whole number of 32-bit words; float-valued fields travel as
//! raw bit patterns in `u32` slots unless a record declares `f32` explicitly.

use bytemuck::{Pod, Zeroable};

/// Sentinel id meaning "no program" / "resolution failed".
pub const PROGRAM_ID_INVALID: u32 = 0xFFFF_FFFF;
/// Sentinel id meaning "no surface bound".
pub const SURFACE_ID_INVALID: u32 = 0xFFFF_FFFF;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Opcode {
    /// Raw two-word record `[FENCE, id]`; no length word.
    Fence = 0x0001,

    SetRenderState = 0x0010,
    SetTextureState = 0x0011,

    DefineProgram = 0x0020,
    DestroyProgram = 0x0021,
    SelectProgram = 0x0022,
    SetProgramConst = 0x0023,

    SetRenderTarget = 0x0030,
    Clear = 0x0031,
    SetScissorRect = 0x0032,
    SetViewport = 0x0033,
    SetDepthRange = 0x0034,

    DrawPrimitive = 0x0040,
}

impl Opcode {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0x0001 => Self::Fence,
            0x0010 => Self::SetRenderState,
            0x0011 => Self::SetTextureState,
            0x0020 => Self::DefineProgram,
            0x0021 => Self::DestroyProgram,
            0x0022 => Self::SelectProgram,
            0x0023 => Self::SetProgramConst,
            0x0030 => Self::SetRenderTarget,
            0x0031 => Self::Clear,
            0x0032 => Self::SetScissorRect,
            0x0033 => Self::SetViewport,
            0x0034 => Self::SetDepthRange,
            0x0040 => Self::DrawPrimitive,
            _ => return None,
        })
    }
}

/// Named render-state slots carried in [`StateEntry`] records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum RenderStateName {
    PointSize = 0,
    ShadeMode = 1,
    CullMode = 2,
    PointSpriteEnable = 3,
    AntialiasedLineEnable = 4,

    DitherEnable = 5,
    LastPixel = 6,
    FogEnable = 7,
    StencilRef = 8,
    StencilFunc = 9,
    StencilFail = 10,
    StencilZFail = 11,
    StencilPass = 12,
    StencilEnable = 13,

    ColorWriteEnable = 14,
    BlendEnable = 15,
    BlendEquation = 16,
    SrcBlend = 17,
    DstBlend = 18,
    AlphaTestEnable = 19,
    AlphaFunc = 20,
    AlphaRef = 21,
    DepthEnable = 22,
    DepthFunc = 23,
    DepthWriteEnable = 24,

    DepthBias = 25,
    SlopeScaleDepthBias = 26,
    ScissorTestEnable = 27,
    BlendColor = 28,
    StencilMask = 29,
    StencilWriteMask = 30,

    TwoSidedStencilEnable = 31,
    CcwStencilFunc = 32,
    CcwStencilFail = 33,
    CcwStencilZFail = 34,
    CcwStencilPass = 35,

    SeparateAlphaBlendEnable = 36,
    BlendEquationAlpha = 37,
    SrcBlendAlpha = 38,
    DstBlendAlpha = 39,
}

/// Per-stage texture/sampler state names carried in [`TextureStateEntry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum TextureStateName {
    BindTexture = 0,
    BorderColor = 1,
    AddressU = 2,
    AddressV = 3,
    AddressW = 4,
    MipFilter = 5,
    MagFilter = 6,
    MinFilter = 7,
    AnisotropyLevel = 8,
    Gamma = 9,
    TransformFlags = 10,
}

/// Value of [`TextureStateName::TransformFlags`] requesting projective
/// texture coordinates.
pub const TEXTURE_TRANSFORM_PROJECTED: u32 = 1;

/// Texture addressing modes (values are the wire encoding).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum AddressMode {
    Wrap = 1,
    Mirror = 2,
    Edge = 3,
    Border = 4,
    MirrorOnce = 5,
    /// Out-of-domain source value; the device ignores the entry.
    Invalid = 0xFFFF_FFFF,
}

/// Texture filtering modes, shared by the mip and image (min/mag) slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum FilterMode {
    None = 0,
    Nearest = 1,
    Linear = 2,
    Anisotropic = 3,
    Invalid = 0xFFFF_FFFF,
}

/// Comparison functions for alpha/depth/stencil tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum CompareFunc {
    Never = 1,
    Less = 2,
    Equal = 3,
    LessEqual = 4,
    Greater = 5,
    NotEqual = 6,
    GreaterEqual = 7,
    Always = 8,
}

/// Stencil operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum StencilOpValue {
    Keep = 1,
    Zero = 2,
    Replace = 3,
    IncrSat = 4,
    DecrSat = 5,
    Invert = 6,
    Incr = 7,
    Decr = 8,
    Invalid = 0xFFFF_FFFF,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ShadeMode {
    Flat = 1,
    Smooth = 2,
}

bitflags::bitflags! {
    /// Surface aspects named by a [`ClearRecord`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ClearFlags: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Vertex attribute element types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum DeclType {
    Float1 = 0,
    Float2 = 1,
    Float3 = 2,
    Float4 = 3,
    /// Packed BGRA color in one dword.
    ColorU32 = 4,
    Half2 = 5,
    Half4 = 6,
}

impl DeclType {
    /// Element size within an interleaved vertex record.
    pub fn size_bytes(self) -> u32 {
        match self {
            DeclType::Float1 => 4,
            DeclType::Float2 => 8,
            DeclType::Float3 => 12,
            DeclType::Float4 => 16,
            DeclType::ColorU32 => 4,
            DeclType::Half2 => 4,
            DeclType::Half4 => 8,
        }
    }
}

/// Vertex attribute semantics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum DeclUsage {
    /// Pre-transformed position.
    Position = 0,
    PointSize = 1,
    Color = 2,
    TexCoord = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum PrimitiveKind {
    TriangleList = 0,
    TriangleStrip = 1,
    TriangleFan = 2,
    LineList = 3,
    LineStrip = 4,
    PointList = 5,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ProgramKind {
    Pixel = 0,
    Vertex = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum RenderTargetKind {
    Color0 = 0,
    Depth = 1,
}

/// One `(state, value)` pair in a [`Opcode::SetRenderState`] payload.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct StateEntry {
    pub state: u32,
    pub value: u32,
}

impl StateEntry {
    pub fn new(state: RenderStateName, value: u32) -> Self {
        Self {
            state: state as u32,
            value,
        }
    }

    /// Float-valued states travel as raw bit patterns.
    pub fn float(state: RenderStateName, value: f32) -> Self {
        Self::new(state, value.to_bits())
    }
}

/// One `(stage, name, value)` triple in a [`Opcode::SetTextureState`] payload.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct TextureStateEntry {
    pub stage: u32,
    pub name: u32,
    pub value: u32,
}

impl TextureStateEntry {
    pub fn new(stage: u32, name: TextureStateName, value: u32) -> Self {
        Self {
            stage,
            name: name as u32,
            value,
        }
    }

    pub fn float(stage: u32, name: TextureStateName, value: f32) -> Self {
        Self::new(stage, name, value.to_bits())
    }
}

/// Rectangle payload shared by scissor, viewport, and clear records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct RectRecord {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Payload of [`Opcode::Clear`].
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ClearRecord {
    /// [`ClearFlags`] bits.
    pub flags: u32,
    pub color: u32,
    pub depth: f32,
    pub stencil: u32,
    pub rect: RectRecord,
}

/// Payload of [`Opcode::SetRenderTarget`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TargetRecord {
    /// [`RenderTargetKind`] discriminant.
    pub kind: u32,
    pub surface_id: u32,
    pub face: u32,
    pub mip: u32,
}

/// Leading record of a [`Opcode::DrawPrimitive`] payload.
///
/// It is followed by `decl_count` [`VertexDeclRecord`]s, `index_count`
/// 16-bit indices (padded to a word boundary), and the raw interleaved
/// vertex bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct DrawHeader {
    /// [`PrimitiveKind`] discriminant.
    pub primitive: u32,
    pub primitive_count: u32,
    pub vertex_count: u32,
    pub decl_count: u32,
    /// Zero for non-indexed draws.
    pub index_count: u32,
    pub vertex_stride: u32,
}

/// One vertex attribute declaration in a draw payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct VertexDeclRecord {
    /// [`DeclUsage`] discriminant.
    pub usage: u32,
    pub usage_index: u32,
    /// [`DeclType`] discriminant.
    pub decl_type: u32,
    /// Byte offset within one interleaved vertex record.
    pub offset: u32,
    /// Byte stride between consecutive vertices; one common value per draw.
    pub stride: u32,
}

// Wire layout is fixed; catch accidental field reordering at compile time.
const _: () = {
    use core::mem::{offset_of, size_of};
    assert!(size_of::<StateEntry>() == 8);
    assert!(size_of::<TextureStateEntry>() == 12);
    assert!(size_of::<RectRecord>() == 16);
    assert!(size_of::<ClearRecord>() == 32);
    assert!(size_of::<TargetRecord>() == 16);
    assert!(size_of::<DrawHeader>() == 24);
    assert!(size_of::<VertexDeclRecord>() == 20);
    assert!(offset_of!(ClearRecord, rect) == 16);
    assert!(offset_of!(DrawHeader, vertex_stride) == 20);
};
