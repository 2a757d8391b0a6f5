//! BorealGPU command-ring submission engine.
//!
//! The producer half of the shared command channel:
//! - [`PortIo`] / [`RegisterPort`] — indexed register access through the
//!   two-port (index, value) protocol,
//! - [`RingWindow`] — the owned, bounds-checked byte window holding the
//!   control words and the circular data region,
//! - [`RingEngine`] — reserve/commit over the window with bounce-buffer
//!   staging for wrapping writes, full/drain signaling, and fence tracking.
//!
//! Every engine operation takes `&mut self`; callers that share a context
//! across threads wrap the engine in their own lock. The engine keeps exactly
//! one outstanding reservation's worth of state.
#![forbid(unsafe_code)]

mod engine;
mod fence;
mod port;
mod window;

pub use engine::{RingEngine, RingError, BOUNCE_CAPACITY};
pub use port::{PortIo, RegisterPort};
pub use window::{RingWindow, RingWindowError};
