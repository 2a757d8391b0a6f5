//! BorealGPU guest-side command submission.
//!
//! The root package carries no library code of its own; it hosts the
//! cross-crate integration tests under `tests/`, wiring the legacy-stream
//! translator ([`boreal_gpu_translate`]) to the ring submission engine
//! ([`boreal_gpu_ring`]) over the shared wire vocabulary
//! ([`boreal_gpu_protocol`]).
#![forbid(unsafe_code)]
