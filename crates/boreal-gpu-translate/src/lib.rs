//! Legacy 3D instruction-stream translator for BorealGPU.
//!
//! Consumes the flat `&[u32]` instruction buffers a legacy fixed-function
//! graphics client produces and re-expresses them as BorealGPU protocol
//! commands through a [`CommandSink`](boreal_gpu_protocol::CommandSink):
//! - [`Translator`] — the streaming decode loop and per-context state,
//! - [`RenderStateCache`] — shadowed state groups suppressing redundant
//!   emission,
//! - [`ProgramCache`] — content-addressed shader cache with a built-in
//!   program table,
//! - [`vertex`] — the pure vertex-format synthesizer,
//! - [`tables`] — the small total translation tables.
//!
//! The decode loop never fails: malformed input and sink rejections are
//! logged, counted, and skipped, and the caller gets a [`SubmitSummary`].
#![forbid(unsafe_code)]

mod bits;
pub mod polygon;
mod program_cache;
mod state_cache;
pub mod tables;
mod translator;
pub mod vertex;

pub use program_cache::{known_programs, ProgramCache};
pub use state_cache::RenderStateCache;
pub use translator::{SubmitSummary, Translator, FENCE_SLOT_COUNT};
pub use vertex::{VertexFormat, VertexFormatError};
