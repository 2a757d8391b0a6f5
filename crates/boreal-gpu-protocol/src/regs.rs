//! Register indices, I/O port numbers, and the ring control-word layout.
//!
//! The BorealGPU device exposes two kinds of state:
//! - a small indexed register file reached through a two-port (index, value)
//!   protocol on [`INDEX_PORT`]/[`VALUE_PORT`], used for identity probing and
//!   full/drain signaling, and
//! - a shared ring window whose first [`fifo::NUM_CONTROL_WORDS`] 32-bit words
//!   are control state (capacity bounds, cursors, capability flags, published
//!   fence), followed by the command data region `[min, max)`.
//!
//! Offsets into the control area are word indices; cursors stored in the
//! control words are byte offsets into the window.

use bitflags::bitflags;

/// I/O port the guest writes a [`RegisterIndex`] to before touching the value
/// port.
pub const INDEX_PORT: u16 = 0x3D60;
/// I/O port carrying the value of the register selected on [`INDEX_PORT`].
pub const VALUE_PORT: u16 = 0x3D64;

/// Value of [`RegisterIndex::Id`] on a present, compatible device ("BGPU").
pub const DEVICE_ID_MAGIC: u32 = u32::from_le_bytes(*b"BGPU");

/// Indexed device control registers.
///
/// Only a handful exist; the submission core touches `Id` at setup and
/// `Sync`/`Busy` for drain signaling. Bulk data never moves through here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum RegisterIndex {
    /// Device identity probe; reads back [`DEVICE_ID_MAGIC`].
    Id = 0,
    /// Master enable written during session setup.
    Enable = 1,
    /// Writing 1 asks the device to start draining the ring.
    Sync = 2,
    /// Reads non-zero while the device is processing ring contents.
    Busy = 3,
}

bitflags! {
    /// Device capability flags published in the [`fifo::CAPS`] control word.
    ///
    /// Snapshot once at engine construction; they do not change mid-session.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RingCaps: u32 {
        /// The device honors the in-band reserved-length word and tolerates
        /// multi-word commands appearing in the ring before the write cursor
        /// is published (segmented commits).
        const RESERVE = 1 << 0;
        /// The device processes fence commands and publishes the highest
        /// completed fence in [`fifo::FENCE`].
        const FENCE = 1 << 1;
    }
}

/// Control-word indices of the shared ring window.
pub mod fifo {
    /// Byte offset of the start of the data region (always
    /// [`CONTROL_BYTES`]).
    pub const MIN: usize = 0;
    /// Byte offset one past the end of the data region.
    pub const MAX: usize = 1;
    /// Producer write cursor (byte offset in `[min, max)`).
    pub const NEXT_CMD: usize = 2;
    /// Device read cursor (byte offset in `[min, max)`); read-only to the
    /// producer.
    pub const STOP: usize = 3;
    /// [`super::RingCaps`] bits.
    pub const CAPS: usize = 4;
    /// In-band reserved-length word; non-zero exactly while a reservation is
    /// outstanding on a [`super::RingCaps::RESERVE`] device.
    pub const RESERVED: usize = 5;
    /// Highest fence id the device has completed.
    pub const FENCE: usize = 6;

    /// Number of control words at the head of the window (one spare).
    pub const NUM_CONTROL_WORDS: usize = 8;
    /// Size of the control area in bytes; equals the `min` bound.
    pub const CONTROL_BYTES: usize = NUM_CONTROL_WORDS * 4;
}
