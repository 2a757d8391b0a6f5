//! The streaming instruction decoder.
//!
//! `submit` walks a caller-owned `&[u32]` instruction buffer one command at
//! a time. Bits 31..29 of each word select the class (control, 2D blit, 3D);
//! each handler reports the word count it consumed, and a zero skip is
//! forced to one so the loop always progresses. Translation failures never
//! abort the walk: a partially-correct frame beats none.

use boreal_gpu_protocol::{
    ClearRecord, CommandSink, CommandWriter, DrawHeader, Opcode, PrimitiveKind, RectRecord,
    RenderStateName, ShadeMode, StateEntry, TargetRecord, TextureStateEntry, TextureStateName,
    PROGRAM_ID_INVALID, RenderTargetKind, SURFACE_ID_INVALID, TEXTURE_TRANSFORM_PROJECTED,
};
use tracing::{debug, trace, warn};

use crate::bits::{bit_select, get4, set4};
use crate::polygon;
use crate::program_cache::ProgramCache;
use crate::state_cache::RenderStateCache;
use crate::tables::{
    translate_address_mode, translate_clear_mask, translate_compare_func, translate_image_filter,
    translate_mip_filter, translate_stencil_op,
};
use crate::vertex::{self, VertexFormat};

/// Capacity of the client-visible fence slot table.
pub const FENCE_SLOT_COUNT: usize = 32;

/// Program-constant register where per-stage texel rescale vectors live;
/// register `base + stage` holds `[1/w, 1/h, 1, 1]` for that stage.
const TEXEL_SCALE_CONST_BASE: u32 = 16;

const TEXTURE_STAGES: usize = 16;

// Shadow groups for the single-word pipeline controls; 0-7 hold the grouped
// immediate-state words.
const GROUP_ANTIALIAS: usize = 8;
const GROUP_BACKFACE_OPS: usize = 9;
const GROUP_BACKFACE_MASKS: usize = 10;
const GROUP_INDEP_ALPHA: usize = 11;
const GROUP_MODES4: usize = 12;
const GROUP_DST_BUF_VARS: usize = 13;

/// Outcome of one `submit` call. Decoding itself never fails; anomalies and
/// sink rejections are tallied here.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SubmitSummary {
    pub words_consumed: usize,
    pub commands_emitted: usize,
    pub commands_rejected: usize,
    pub anomalies: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct ClearParams {
    mask: u32,
    color: u32,
    depth: f32,
    stencil: u32,
}

/// Per-context decoder state: the two caches, the texture-stage shadows, and
/// the staged clear parameters.
pub struct Translator {
    state: RenderStateCache,
    programs: ProgramCache,
    surface_ids: [u32; TEXTURE_STAGES],
    texel_scale: [[f32; 2]; TEXTURE_STAGES],
    /// Nibble per sampler stage: which texture map slot it reads.
    sampler_map: u64,
    /// Bit per sampler stage that addresses with unnormalized coordinates.
    unnormalized_mask: u16,
    clear: ClearParams,
    fence_slots: [u32; FENCE_SLOT_COUNT],
    active_program: u32,
}

impl Default for Translator {
    fn default() -> Self {
        Self::new()
    }
}

fn emit(sink: &mut dyn CommandSink, summary: &mut SubmitSummary, commands: usize, bytes: &[u8]) {
    match sink.submit(bytes) {
        Ok(()) => summary.commands_emitted += commands,
        Err(err) => {
            warn!(%err, "translated command rejected");
            summary.commands_rejected += commands;
        }
    }
}

impl Translator {
    pub fn new() -> Self {
        Self {
            state: RenderStateCache::new(),
            programs: ProgramCache::new(),
            surface_ids: [SURFACE_ID_INVALID; TEXTURE_STAGES],
            texel_scale: [[1.0, 1.0]; TEXTURE_STAGES],
            sampler_map: 0,
            unnormalized_mask: 0,
            clear: ClearParams::default(),
            fence_slots: [0; FENCE_SLOT_COUNT],
            // Sentinel distinct from "no program" so the first select always
            // reaches the device, even when it selects nothing.
            active_program: PROGRAM_ID_INVALID.wrapping_sub(1),
        }
    }

    /// Fence id recorded by the client's store-fence command, `0` when the
    /// slot was never written.
    pub fn fence_slot(&self, slot: usize) -> Option<u32> {
        self.fence_slots.get(slot).copied()
    }

    /// Tear down per-context state: deselect and destroy cached programs,
    /// drop every shadow. `context_alive` is false when the device context
    /// is already gone.
    pub fn reset(&mut self, sink: &mut dyn CommandSink, context_alive: bool) {
        self.programs.purge(sink, context_alive);
        self.state.reset();
        self.surface_ids = [SURFACE_ID_INVALID; TEXTURE_STAGES];
        self.texel_scale = [[1.0, 1.0]; TEXTURE_STAGES];
        self.sampler_map = 0;
        self.unnormalized_mask = 0;
        self.clear = ClearParams::default();
        self.active_program = PROGRAM_ID_INVALID.wrapping_sub(1);
    }

    /// Decode a whole instruction buffer, emitting translated commands
    /// through `sink`.
    pub fn submit(&mut self, words: &[u32], sink: &mut dyn CommandSink) -> SubmitSummary {
        let mut summary = SubmitSummary::default();
        let mut pos = 0usize;
        while pos < words.len() {
            let rest = &words[pos..];
            let cmd = rest[0];
            let mut skip = match cmd >> 29 {
                0 => self.decode_control(rest, cmd, sink, &mut summary),
                2 => Self::decode_blit(cmd),
                3 => self.decode_3d(rest, cmd, sink, &mut summary),
                _ => 0,
            };
            if skip == 0 {
                warn!(cmd = format_args!("{cmd:#010x}"), "unrecognized command word");
                summary.anomalies += 1;
                skip = 1;
            }
            pos += skip;
        }
        summary.words_consumed = pos.min(words.len());
        summary
    }

    // Control class: per-opcode skip table plus the store-fence command.
    fn decode_control(
        &mut self,
        p: &[u32],
        cmd: u32,
        sink: &mut dyn CommandSink,
        summary: &mut SubmitSummary,
    ) -> usize {
        match bit_select(cmd, 23, 6) {
            0 | 2 | 3 | 4 | 7 | 8 | 10 => 1,
            17 | 18 | 19 | 24 | 49 => 2,
            20 | 34 | 36 | 48 => 3,
            32 => (cmd & 0x3F) as usize + 2,
            33 => {
                let skip = (cmd & 0x3F) as usize + 2;
                // Store-to-index targeting the fence word carries the slot
                // the client later polls.
                if p.get(1) == Some(&64) {
                    if let Some(&slot) = p.get(2) {
                        self.store_fence(slot as usize, sink, summary);
                    }
                }
                skip
            }
            _ => 0,
        }
    }

    fn store_fence(&mut self, slot: usize, sink: &mut dyn CommandSink, summary: &mut SubmitSummary) {
        if slot >= FENCE_SLOT_COUNT {
            warn!(slot, "fence slot out of range");
            summary.anomalies += 1;
            return;
        }
        match sink.insert_fence() {
            Ok(id) => {
                trace!(slot, id, "fence stored");
                self.fence_slots[slot] = id;
                summary.commands_emitted += 1;
            }
            Err(err) => {
                warn!(%err, slot, "fence insertion rejected");
                summary.commands_rejected += 1;
            }
        }
    }

    // 2D class: block transfers ride a separate path in the full driver, so
    // recognized blits are length-decoded and dropped.
    fn decode_blit(cmd: u32) -> usize {
        match bit_select(cmd, 22, 7) {
            0x01 | 0x03 | 0x11 | 0x24 | 0x25 | 0x26 | 0x31 | 0x40 | 0x43 | 0x50 | 0x51 | 0x52
            | 0x53 | 0x54 | 0x55 | 0x56 | 0x57 | 0x58 | 0x59 | 0x71 | 0x72 | 0x75 | 0x76
            | 0x77 => (cmd & 0xFF) as usize + 2,
            _ => 0,
        }
    }

    fn decode_3d(
        &mut self,
        p: &[u32],
        cmd: u32,
        sink: &mut dyn CommandSink,
        summary: &mut SubmitSummary,
    ) -> usize {
        match bit_select(cmd, 24, 5) {
            0x06 => {
                self.state.cache_group(GROUP_ANTIALIAS, cmd & 0xFF_FFFF);
                1
            }
            0x07 => 1, // raster rules
            0x08 => {
                if self.state.cache_group(GROUP_BACKFACE_OPS, cmd & 0xFF_FFFF) {
                    self.backface_stencil_ops(cmd, sink, summary);
                }
                1
            }
            0x09 => {
                self.state.cache_group(GROUP_BACKFACE_MASKS, cmd & 0xFF_FFFF);
                1
            }
            0x0B => {
                if self.state.cache_group(GROUP_INDEP_ALPHA, cmd & 0xFF_FFFF) {
                    self.independent_alpha_blend(cmd, sink, summary);
                }
                1
            }
            0x0C => 1, // modes 5
            0x0D => {
                if self.state.cache_group(GROUP_MODES4, cmd & 0xFF_FFFF) {
                    self.stencil_masks(cmd, sink, summary);
                }
                1
            }
            0x15 => 1, // fog color
            0x1C => match bit_select(cmd, 16, 8) {
                0x80 => {
                    let entry = StateEntry::new(
                        RenderStateName::ScissorTestEnable,
                        bit_select(cmd, 0, 1),
                    );
                    self.emit_render_state(&[entry], sink, summary);
                    1
                }
                0x88 => 1, // depth subrect disable
                _ => 0,
            },
            0x1D => self.decode_3d_extended(p, cmd, sink, summary),
            0x1F => self.draw_primitive(p, cmd, sink, summary),
            _ => 0,
        }
    }

    fn decode_3d_extended(
        &mut self,
        p: &[u32],
        cmd: u32,
        sink: &mut dyn CommandSink,
        summary: &mut SubmitSummary,
    ) -> usize {
        let skip = (cmd & 0xFFFF) as usize + 2;
        match bit_select(cmd, 16, 8) {
            0x00 => self.map_state(p, sink, summary),
            0x01 => self.sampler_state(p, sink, summary),
            0x04 => return self.load_immediate(p, cmd, sink, summary),
            0x05 => self.select_program(p, cmd, sink, summary),
            0x06 => self.program_constants(p, sink, summary),
            0x80 => self.draw_rect(p, sink, summary),
            0x81 => self.scissor_rect(p, sink, summary),
            0x83 => {} // stipple pattern
            0x85 => {
                if let Some(&value) = p.get(1) {
                    self.state.cache_group(GROUP_DST_BUF_VARS, value);
                }
            }
            0x88 => {
                if let Some(&color) = p.get(1) {
                    let entry = StateEntry::new(RenderStateName::BlendColor, color);
                    self.emit_render_state(&[entry], sink, summary);
                }
            }
            0x89 => {} // fog mode
            0x8E => self.bind_target(p, sink, summary),
            0x97 => {
                if let Some(&bias) = p.get(1) {
                    // Raw float bits travel unchanged.
                    let entry = StateEntry::new(RenderStateName::SlopeScaleDepthBias, bias);
                    self.emit_render_state(&[entry], sink, summary);
                }
            }
            0x9C => return self.clear_params(p, cmd),
            sub => {
                debug!(sub = format_args!("{sub:#x}"), "unknown extended 3d command");
                summary.anomalies += 1;
            }
        }
        skip
    }

    // Grouped immediate-state load: up to eight words gated by the mask in
    // bits 4..12, with change detection on the four translated groups.
    fn load_immediate(
        &mut self,
        p: &[u32],
        cmd: u32,
        sink: &mut dyn CommandSink,
        summary: &mut SubmitSummary,
    ) -> usize {
        let skip = (cmd & 0xF) as usize + 2;
        let limit = skip.min(p.len());
        let mut at = 1usize;
        for group in 0..8usize {
            if cmd & (1 << (4 + group)) == 0 {
                continue;
            }
            if at >= limit {
                break;
            }
            let value = p[at];
            at += 1;
            let changed = if (4..8).contains(&group) {
                self.state.cache_group(group, value)
            } else {
                self.state.store(group, value);
                true
            };
            if !changed {
                continue;
            }
            match group {
                4 => self.emit_raster_group(value, sink, summary),
                5 => self.emit_stencil_group(value, sink, summary),
                6 => self.emit_blend_group(value, sink, summary),
                7 => self.emit_depth_bias(value, sink, summary),
                _ => {}
            }
        }
        skip
    }

    fn emit_raster_group(
        &mut self,
        s4: u32,
        sink: &mut dyn CommandSink,
        summary: &mut SubmitSummary,
    ) {
        let shade = if vertex::flat_shade(s4) {
            ShadeMode::Flat
        } else {
            ShadeMode::Smooth
        };
        let entries = [
            StateEntry::float(RenderStateName::PointSize, bit_select(s4, 23, 9) as f32),
            StateEntry::new(RenderStateName::ShadeMode, shade as u32),
            StateEntry::new(RenderStateName::CullMode, bit_select(s4, 13, 2)),
            StateEntry::new(RenderStateName::PointSpriteEnable, bit_select(s4, 1, 1)),
            StateEntry::new(RenderStateName::AntialiasedLineEnable, bit_select(s4, 0, 1)),
        ];
        self.emit_render_state(&entries, sink, summary);
    }

    fn emit_stencil_group(
        &mut self,
        s5: u32,
        sink: &mut dyn CommandSink,
        summary: &mut SubmitSummary,
    ) {
        let func = if bit_select(s5, 2, 1) != 0 {
            translate_compare_func(bit_select(s5, 13, 3))
        } else {
            boreal_gpu_protocol::CompareFunc::Always
        };
        let entries = [
            StateEntry::new(RenderStateName::DitherEnable, bit_select(s5, 1, 1)),
            StateEntry::new(RenderStateName::LastPixel, bit_select(s5, 26, 1)),
            StateEntry::new(RenderStateName::FogEnable, bit_select(s5, 24, 1)),
            StateEntry::new(RenderStateName::StencilRef, bit_select(s5, 16, 8)),
            StateEntry::new(RenderStateName::StencilFunc, func as u32),
            StateEntry::new(
                RenderStateName::StencilFail,
                translate_stencil_op(bit_select(s5, 10, 3)) as u32,
            ),
            StateEntry::new(
                RenderStateName::StencilZFail,
                translate_stencil_op(bit_select(s5, 7, 3)) as u32,
            ),
            StateEntry::new(
                RenderStateName::StencilPass,
                translate_stencil_op(bit_select(s5, 4, 3)) as u32,
            ),
            StateEntry::new(RenderStateName::StencilEnable, bit_select(s5, 3, 1)),
        ];
        self.emit_render_state(&entries, sink, summary);
    }

    fn emit_blend_group(
        &mut self,
        s6: u32,
        sink: &mut dyn CommandSink,
        summary: &mut SubmitSummary,
    ) {
        let entries = [
            StateEntry::new(
                RenderStateName::ColorWriteEnable,
                u32::from(self.color_write_mask()),
            ),
            StateEntry::new(RenderStateName::BlendEnable, bit_select(s6, 15, 1)),
            StateEntry::new(RenderStateName::BlendEquation, bit_select(s6, 12, 3) + 1),
            StateEntry::new(RenderStateName::SrcBlend, bit_select(s6, 8, 4)),
            StateEntry::new(RenderStateName::DstBlend, bit_select(s6, 4, 4)),
            StateEntry::new(RenderStateName::AlphaTestEnable, bit_select(s6, 31, 1)),
            StateEntry::new(
                RenderStateName::AlphaFunc,
                translate_compare_func(bit_select(s6, 28, 3)) as u32,
            ),
            StateEntry::new(RenderStateName::AlphaRef, bit_select(s6, 20, 8)),
            StateEntry::new(RenderStateName::DepthEnable, bit_select(s6, 19, 1)),
            StateEntry::new(
                RenderStateName::DepthFunc,
                translate_compare_func(bit_select(s6, 16, 3)) as u32,
            ),
            StateEntry::new(RenderStateName::DepthWriteEnable, bit_select(s6, 3, 1)),
        ];
        self.emit_render_state(&entries, sink, summary);
    }

    fn emit_depth_bias(
        &mut self,
        s7: u32,
        sink: &mut dyn CommandSink,
        summary: &mut SubmitSummary,
    ) {
        // The bias word is a raw float, honored only while the global depth
        // offset enable of the stencil group is set.
        let entry = if self.state.is_valid(5) && bit_select(self.state.get(5), 25, 1) != 0 {
            StateEntry::new(RenderStateName::DepthBias, s7)
        } else {
            StateEntry::float(RenderStateName::DepthBias, 0.0)
        };
        self.emit_render_state(&[entry], sink, summary);
    }

    /// Device color-write mask from the blend group's enable and the stencil
    /// group's inverted per-channel disables, with red and blue swapped.
    fn color_write_mask(&self) -> u8 {
        if bit_select(self.state.get(6), 2, 1) == 0 {
            return 0;
        }
        if !self.state.is_valid(5) {
            return 0xF;
        }
        let disables = (!bit_select(self.state.get(5), 28, 4)) & 0xF;
        let mut mask = (disables & 0b1010) as u8;
        mask |= (bit_select(disables, 2, 1)) as u8;
        mask |= (bit_select(disables, 0, 1) << 2) as u8;
        mask
    }

    fn backface_stencil_ops(
        &mut self,
        cmd: u32,
        sink: &mut dyn CommandSink,
        summary: &mut SubmitSummary,
    ) {
        let mut entries = Vec::with_capacity(5);
        if bit_select(cmd, 1, 1) != 0 {
            entries.push(StateEntry::new(
                RenderStateName::TwoSidedStencilEnable,
                bit_select(cmd, 0, 1),
            ));
        }
        if bit_select(cmd, 14, 1) != 0 {
            entries.push(StateEntry::new(
                RenderStateName::CcwStencilFunc,
                translate_compare_func(bit_select(cmd, 11, 3)) as u32,
            ));
            entries.push(StateEntry::new(
                RenderStateName::CcwStencilFail,
                translate_stencil_op(bit_select(cmd, 8, 3)) as u32,
            ));
            entries.push(StateEntry::new(
                RenderStateName::CcwStencilZFail,
                translate_stencil_op(bit_select(cmd, 5, 3)) as u32,
            ));
            entries.push(StateEntry::new(
                RenderStateName::CcwStencilPass,
                translate_stencil_op(bit_select(cmd, 2, 3)) as u32,
            ));
        }
        self.emit_render_state(&entries, sink, summary);
    }

    fn independent_alpha_blend(
        &mut self,
        cmd: u32,
        sink: &mut dyn CommandSink,
        summary: &mut SubmitSummary,
    ) {
        let mut entries = Vec::with_capacity(4);
        if bit_select(cmd, 23, 1) != 0 {
            entries.push(StateEntry::new(
                RenderStateName::SeparateAlphaBlendEnable,
                bit_select(cmd, 22, 1),
            ));
        }
        if bit_select(cmd, 21, 1) != 0 {
            entries.push(StateEntry::new(
                RenderStateName::BlendEquationAlpha,
                bit_select(cmd, 16, 3) + 1,
            ));
        }
        if bit_select(cmd, 11, 1) != 0 {
            entries.push(StateEntry::new(
                RenderStateName::SrcBlendAlpha,
                bit_select(cmd, 6, 4) + 1,
            ));
        }
        if bit_select(cmd, 5, 1) != 0 {
            entries.push(StateEntry::new(
                RenderStateName::DstBlendAlpha,
                bit_select(cmd, 0, 4) + 1,
            ));
        }
        self.emit_render_state(&entries, sink, summary);
    }

    fn stencil_masks(&mut self, cmd: u32, sink: &mut dyn CommandSink, summary: &mut SubmitSummary) {
        let read = if bit_select(cmd, 17, 1) != 0 {
            bit_select(cmd, 8, 8)
        } else {
            0xFFFF_FFFF
        };
        let write = if bit_select(cmd, 16, 1) != 0 {
            bit_select(cmd, 0, 8)
        } else {
            0xFFFF_FFFF
        };
        let entries = [
            StateEntry::new(RenderStateName::StencilMask, read),
            StateEntry::new(RenderStateName::StencilWriteMask, write),
        ];
        self.emit_render_state(&entries, sink, summary);
    }

    // Per-stage texture map state: surface id and packed dimensions. The
    // reciprocal sizes are retained for unnormalized-coordinate rescale and
    // re-uploaded for any sampler already reading this map slot.
    fn map_state(&mut self, p: &[u32], sink: &mut dyn CommandSink, summary: &mut SubmitSummary) {
        let Some(&mask) = p.get(1) else { return };
        let mut at = 2usize;
        for slot in 0..TEXTURE_STAGES {
            if mask & (1 << slot) == 0 {
                continue;
            }
            let (Some(&sid), Some(&layout)) = (p.get(at), p.get(at + 1)) else {
                warn!(slot, "truncated texture map state");
                summary.anomalies += 1;
                return;
            };
            at += 3;
            let width = bit_select(layout, 10, 11) + 1;
            let height = bit_select(layout, 21, 11) + 1;
            self.surface_ids[slot] = sid;
            self.texel_scale[slot] = [1.0 / width as f32, 1.0 / height as f32];
            trace!(slot, sid, width, height, "texture map bound");
            for stage in 0..TEXTURE_STAGES {
                if self.unnormalized_mask & (1 << stage) != 0
                    && get4(self.sampler_map, stage as u32) == slot as u32
                {
                    self.upload_texel_scale(stage as u32, slot, sink, summary);
                }
            }
        }
    }

    fn sampler_state(&mut self, p: &[u32], sink: &mut dyn CommandSink, summary: &mut SubmitSummary) {
        let Some(&mask) = p.get(1) else { return };
        let mut at = 2usize;
        for stage in 0..TEXTURE_STAGES as u32 {
            if mask & (1 << stage) == 0 {
                continue;
            }
            let (Some(&filters), Some(&coords), Some(&border)) =
                (p.get(at), p.get(at + 1), p.get(at + 2))
            else {
                warn!(stage, "truncated sampler state");
                summary.anomalies += 1;
                return;
            };
            at += 3;
            let map_slot = bit_select(coords, 1, 4) as usize;
            self.sampler_map = set4(self.sampler_map, stage, map_slot as u32);
            let normalized = bit_select(coords, 5, 1) != 0;
            if normalized {
                self.unnormalized_mask &= !(1 << stage);
            } else {
                self.unnormalized_mask |= 1 << stage;
            }
            let aniso = if bit_select(filters, 3, 1) != 0 { 4 } else { 2 };
            let entries = [
                TextureStateEntry::new(
                    stage,
                    TextureStateName::BindTexture,
                    self.surface_ids[map_slot],
                ),
                TextureStateEntry::new(stage, TextureStateName::BorderColor, border),
                TextureStateEntry::new(
                    stage,
                    TextureStateName::AddressU,
                    translate_address_mode(bit_select(coords, 12, 3)) as u32,
                ),
                TextureStateEntry::new(
                    stage,
                    TextureStateName::AddressV,
                    translate_address_mode(bit_select(coords, 9, 3)) as u32,
                ),
                TextureStateEntry::new(
                    stage,
                    TextureStateName::AddressW,
                    translate_address_mode(bit_select(coords, 6, 3)) as u32,
                ),
                TextureStateEntry::new(
                    stage,
                    TextureStateName::MipFilter,
                    translate_mip_filter(bit_select(filters, 20, 2)) as u32,
                ),
                TextureStateEntry::new(
                    stage,
                    TextureStateName::MagFilter,
                    translate_image_filter(bit_select(filters, 17, 3)) as u32,
                ),
                TextureStateEntry::new(
                    stage,
                    TextureStateName::MinFilter,
                    translate_image_filter(bit_select(filters, 14, 3)) as u32,
                ),
                TextureStateEntry::new(stage, TextureStateName::AnisotropyLevel, aniso),
                TextureStateEntry::float(
                    stage,
                    TextureStateName::Gamma,
                    if bit_select(filters, 31, 1) != 0 { 0.0 } else { 1.0 },
                ),
            ];
            self.emit_texture_state(&entries, sink, summary);
            if !normalized {
                self.upload_texel_scale(stage, map_slot, sink, summary);
            }
        }
    }

    /// Programs rescale unnormalized coordinates with a per-stage constant.
    fn upload_texel_scale(
        &self,
        stage: u32,
        map_slot: usize,
        sink: &mut dyn CommandSink,
        summary: &mut SubmitSummary,
    ) {
        let [sx, sy] = self.texel_scale[map_slot];
        let mut w = CommandWriter::new();
        w.begin(Opcode::SetProgramConst)
            .write_u32(TEXEL_SCALE_CONST_BASE + stage)
            .write_f32(sx)
            .write_f32(sy)
            .write_f32(1.0)
            .write_f32(1.0)
            .end();
        emit(sink, summary, 1, &w.finish());
    }

    fn select_program(
        &mut self,
        p: &[u32],
        cmd: u32,
        sink: &mut dyn CommandSink,
        summary: &mut SubmitSummary,
    ) {
        let count = (cmd & 0xFFFF) as usize + 1;
        let source = p
            .get(1..1 + count)
            .unwrap_or_else(|| p.get(1..).unwrap_or(&[]));
        let id = self.programs.resolve(source, sink);
        if id == self.active_program {
            return;
        }
        let mut w = CommandWriter::new();
        w.begin(Opcode::SelectProgram).write_u32(id).end();
        emit(sink, summary, 1, &w.finish());
        self.active_program = id;
        if id == PROGRAM_ID_INVALID {
            // Fixed-function fallback; the client hands down FLOAT4
            // projective coordinates, so say so on stage 0.
            let entry = TextureStateEntry::new(
                0,
                TextureStateName::TransformFlags,
                TEXTURE_TRANSFORM_PROJECTED,
            );
            self.emit_texture_state(&[entry], sink, summary);
        }
    }

    fn program_constants(
        &mut self,
        p: &[u32],
        sink: &mut dyn CommandSink,
        summary: &mut SubmitSummary,
    ) {
        let Some(&mask) = p.get(1) else { return };
        let mask = mask & 0xFFFF;
        let mut at = 2usize;
        for register in 0..16u32 {
            if mask & (1 << register) == 0 {
                continue;
            }
            let Some(values) = p.get(at..at + 4) else {
                warn!(register, "truncated program constants");
                summary.anomalies += 1;
                return;
            };
            at += 4;
            let mut w = CommandWriter::new();
            w.begin(Opcode::SetProgramConst).write_u32(register);
            for &v in values {
                w.write_u32(v);
            }
            w.end();
            emit(sink, summary, 1, &w.finish());
        }
    }

    fn bind_target(&mut self, p: &[u32], sink: &mut dyn CommandSink, summary: &mut SubmitSummary) {
        let (Some(&info), Some(&sid)) = (p.get(1), p.get(2)) else {
            return;
        };
        let kind = match bit_select(info, 24, 3) {
            3 => RenderTargetKind::Color0,
            7 => RenderTargetKind::Depth,
            _ => return,
        };
        let record = TargetRecord {
            kind: kind as u32,
            surface_id: sid,
            face: bit_select(info, 8, 8),
            mip: bit_select(info, 0, 8),
        };
        let mut w = CommandWriter::new();
        w.begin(Opcode::SetRenderTarget).write_record(&record).end();
        emit(sink, summary, 1, &w.finish());
    }

    // Draw-rect establishes the viewport and a unit depth range.
    fn draw_rect(&mut self, p: &[u32], sink: &mut dyn CommandSink, summary: &mut SubmitSummary) {
        let Some(rect) = p.get(1..5) else { return };
        let record = RectRecord {
            x: rect[0],
            y: rect[1],
            w: rect[2],
            h: rect[3],
        };
        let mut w = CommandWriter::new();
        w.begin(Opcode::SetViewport).write_record(&record).end();
        w.begin(Opcode::SetDepthRange).write_f32(0.0).write_f32(1.0).end();
        emit(sink, summary, 2, &w.finish());
    }

    fn scissor_rect(&mut self, p: &[u32], sink: &mut dyn CommandSink, summary: &mut SubmitSummary) {
        let (Some(&min), Some(&max)) = (p.get(1), p.get(2)) else {
            return;
        };
        let x = bit_select(min, 0, 16);
        let y = bit_select(min, 16, 16);
        let record = RectRecord {
            x,
            y,
            w: bit_select(max, 0, 16).wrapping_sub(x).wrapping_add(1),
            h: bit_select(max, 16, 16).wrapping_sub(y).wrapping_add(1),
        };
        let mut w = CommandWriter::new();
        w.begin(Opcode::SetScissorRect).write_record(&record).end();
        emit(sink, summary, 1, &w.finish());
    }

    // Clear parameters are staged; the clear command goes out at the
    // subsequent clear-rect draw, which carries the rectangle.
    fn clear_params(&mut self, p: &[u32], cmd: u32) -> usize {
        let skip = (cmd & 0xFFFF) as usize + 2;
        if skip < 7 {
            return skip;
        }
        let (Some(&mask), Some(&color), Some(&depth), Some(&stencil)) =
            (p.get(1), p.get(4), p.get(5), p.get(6))
        else {
            return skip;
        };
        self.clear = ClearParams {
            mask,
            color,
            depth: f32::from_bits(depth),
            stencil,
        };
        skip
    }

    fn draw_primitive(
        &mut self,
        p: &[u32],
        cmd: u32,
        sink: &mut dyn CommandSink,
        summary: &mut SubmitSummary,
    ) -> usize {
        let mut skip = (cmd & 0xFFFF) as usize + 2;
        if cmd & (1 << 23) != 0 {
            // Indirect form: length-decode only, the vertex data lives in a
            // buffer this layer does not own.
            if cmd & (1 << 17) != 0 {
                let mut halves = (cmd & 0xFFFF) as usize;
                if halves == 0 {
                    halves = Self::scan_indirect_terminator(&p[1.min(p.len())..]);
                }
                skip = (halves + 1) / 2 + 1;
            } else {
                skip = 2;
            }
            debug!("indirect primitive not translated");
            return skip;
        }

        let data_end = skip.min(p.len());
        let data = p.get(1..data_end).unwrap_or(&[]);
        match bit_select(cmd, 18, 5) {
            0 => self.draw_direct(PrimitiveKind::TriangleList, data, sink, summary),
            1 => self.draw_direct(PrimitiveKind::TriangleStrip, data, sink, summary),
            3 => self.draw_direct(PrimitiveKind::TriangleFan, data, sink, summary),
            5 => self.draw_direct(PrimitiveKind::LineList, data, sink, summary),
            6 => self.draw_direct(PrimitiveKind::LineStrip, data, sink, summary),
            8 => self.draw_direct(PrimitiveKind::PointList, data, sink, summary),
            4 => self.draw_polygon(data, sink, summary),
            10 => self.emit_clear_rect(data, sink, summary),
            kind => {
                warn!(kind, "unsupported primitive kind");
                summary.anomalies += 1;
            }
        }
        skip
    }

    // Variable-length indirect draws end at a 0xFFFF index; the skip counts
    // 16-bit entries including the terminator.
    fn scan_indirect_terminator(words: &[u32]) -> usize {
        let mut halves = 0usize;
        for &word in words {
            for half in [word & 0xFFFF, word >> 16] {
                halves += 1;
                if half == 0xFFFF {
                    return halves;
                }
            }
        }
        halves
    }

    fn vertex_format(&self, summary: &mut SubmitSummary) -> Option<VertexFormat> {
        match vertex::analyze(self.state.get(2), self.state.get(4), vertex::MAX_DECLS) {
            Ok(fmt) if !fmt.decls.is_empty() && fmt.stride != 0 => Some(fmt),
            Ok(_) => None,
            Err(err) => {
                warn!(%err, "vertex format analysis failed");
                summary.anomalies += 1;
                None
            }
        }
    }

    fn draw_direct(
        &mut self,
        primitive: PrimitiveKind,
        data: &[u32],
        sink: &mut dyn CommandSink,
        summary: &mut SubmitSummary,
    ) {
        if data.is_empty() {
            return;
        }
        let Some(fmt) = self.vertex_format(summary) else {
            return;
        };
        let vertex_count = data.len() * 4 / fmt.stride as usize;
        let primitive_count = match primitive {
            PrimitiveKind::TriangleList if vertex_count >= 3 => vertex_count / 3,
            PrimitiveKind::TriangleStrip | PrimitiveKind::TriangleFan if vertex_count >= 3 => {
                vertex_count - 2
            }
            PrimitiveKind::LineList if vertex_count >= 2 => vertex_count / 2,
            PrimitiveKind::LineStrip if vertex_count >= 2 => vertex_count - 1,
            PrimitiveKind::PointList if vertex_count >= 1 => vertex_count,
            _ => return, // degenerate batch
        };
        let bytes: &[u8] = bytemuck::cast_slice(data);
        self.emit_draw(
            primitive,
            primitive_count,
            vertex_count,
            &fmt,
            &[],
            &bytes[..vertex_count * fmt.stride as usize],
            sink,
            summary,
        );
    }

    // Convex polygons render as an indexed triangle strip; see
    // `polygon::polygon_index_order` for the fan order.
    fn draw_polygon(&mut self, data: &[u32], sink: &mut dyn CommandSink, summary: &mut SubmitSummary) {
        if data.is_empty() {
            return;
        }
        let Some(fmt) = self.vertex_format(summary) else {
            return;
        };
        let vertex_count = data.len() * 4 / fmt.stride as usize;
        if vertex_count < 3 {
            return;
        }
        let mut bytes =
            bytemuck::cast_slice::<u32, u8>(data)[..vertex_count * fmt.stride as usize].to_vec();
        if vertex::flat_shade(self.state.get(4)) {
            polygon::broadcast_flat_color(&mut bytes, vertex_count, &fmt.decls);
        }
        let indices = polygon::polygon_index_order(0, vertex_count as u16);
        self.emit_draw(
            PrimitiveKind::TriangleStrip,
            vertex_count - 2,
            vertex_count,
            &fmt,
            &indices,
            &bytes,
            sink,
            summary,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_draw(
        &mut self,
        primitive: PrimitiveKind,
        primitive_count: usize,
        vertex_count: usize,
        fmt: &VertexFormat,
        indices: &[u16],
        vertex_bytes: &[u8],
        sink: &mut dyn CommandSink,
        summary: &mut SubmitSummary,
    ) {
        let header = DrawHeader {
            primitive: primitive as u32,
            primitive_count: primitive_count as u32,
            vertex_count: vertex_count as u32,
            decl_count: fmt.decls.len() as u32,
            index_count: indices.len() as u32,
            vertex_stride: fmt.stride,
        };
        let mut w = CommandWriter::new();
        w.begin(Opcode::DrawPrimitive).write_record(&header);
        for decl in &fmt.decls {
            w.write_record(decl);
        }
        w.write_u16_slice(indices);
        w.write_bytes(vertex_bytes);
        w.end();
        emit(sink, summary, 1, &w.finish());
    }

    fn emit_clear_rect(
        &mut self,
        data: &[u32],
        sink: &mut dyn CommandSink,
        summary: &mut SubmitSummary,
    ) {
        let flags = translate_clear_mask(self.clear.mask);
        if flags.is_empty() {
            return;
        }
        let Some(coords) = data.get(..6) else { return };
        let pf: Vec<f32> = coords.iter().map(|&v| f32::from_bits(v)).collect();
        let record = ClearRecord {
            flags: flags.bits(),
            color: self.clear.color,
            depth: self.clear.depth,
            stencil: self.clear.stencil,
            rect: RectRecord {
                x: pf[4] as u32,
                y: pf[5] as u32,
                w: (pf[0] - pf[4]) as u32,
                h: (pf[1] - pf[5]) as u32,
            },
        };
        let mut w = CommandWriter::new();
        w.begin(Opcode::Clear).write_record(&record).end();
        emit(sink, summary, 1, &w.finish());
    }

    fn emit_render_state(
        &mut self,
        entries: &[StateEntry],
        sink: &mut dyn CommandSink,
        summary: &mut SubmitSummary,
    ) {
        if entries.is_empty() {
            return;
        }
        let mut w = CommandWriter::new();
        w.begin(Opcode::SetRenderState);
        for entry in entries {
            w.write_record(entry);
        }
        w.end();
        emit(sink, summary, 1, &w.finish());
    }

    fn emit_texture_state(
        &mut self,
        entries: &[TextureStateEntry],
        sink: &mut dyn CommandSink,
        summary: &mut SubmitSummary,
    ) {
        if entries.is_empty() {
            return;
        }
        let mut w = CommandWriter::new();
        w.begin(Opcode::SetTextureState);
        for entry in entries {
            w.write_record(entry);
        }
        w.end();
        emit(sink, summary, 1, &w.finish());
    }
}
