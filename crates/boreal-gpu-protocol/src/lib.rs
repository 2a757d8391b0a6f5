//! BorealGPU wire protocol.
//!
//! This crate is the shared vocabulary between the guest-side submission
//! engine, the translator, and device models:
//! - I/O port numbers and indexed register ids ([`regs`]),
//! - ring control-word layout constants and capability flags ([`regs`]),
//! - command opcodes, state names, and fixed payload records ([`commands`]),
//! - a command writer/reader pair over the `[opcode, byte length, payload]`
//!   framing ([`writer`], [`reader`]), and
//! - the [`CommandSink`] trait translators emit through ([`sink`]).
//!
//! The one framing exception is [`commands::Opcode::Fence`]: a fence is the
//! raw two-word record `[FENCE, id]` with no length word, so the device can
//! process it without looking past the second word. [`reader::CommandReader`]
//! special-cases it.
//!
//! No device behavior lives here; this crate only describes bytes.
#![forbid(unsafe_code)]

pub mod commands;
pub mod reader;
pub mod regs;
pub mod sink;
pub mod writer;

pub use commands::{
    AddressMode, ClearFlags, ClearRecord, CompareFunc, DeclType, DeclUsage, DrawHeader, FilterMode,
    Opcode, PrimitiveKind, ProgramKind, RectRecord, RenderStateName, RenderTargetKind, ShadeMode,
    StateEntry, StencilOpValue, TargetRecord, TextureStateEntry, TextureStateName,
    VertexDeclRecord, PROGRAM_ID_INVALID, SURFACE_ID_INVALID, TEXTURE_TRANSFORM_PROJECTED,
};
pub use reader::{CommandReader, CommandRecord, StreamError};
pub use regs::{fifo, RegisterIndex, RingCaps, DEVICE_ID_MAGIC, INDEX_PORT, VALUE_PORT};
pub use sink::{CommandSink, SubmitError};
pub use writer::CommandWriter;
