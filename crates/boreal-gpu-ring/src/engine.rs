//! Reserve/commit submission over the ring window.
//!
//! The placement rules mirror the device contract exactly: a contiguous run
//! between the write cursor and the end of the free space is handed out in
//! place; a run that would wrap is staged in the bounce buffer and split at
//! commit time; a run that cannot fit at all drains the device first. The
//! write cursor is published only at whole-command granularity unless the
//! word-wise fallback is forced by a device without the reserved-register
//! capability.

use boreal_gpu_protocol::{
    Opcode, RegisterIndex, RingCaps, SubmitError, DEVICE_ID_MAGIC,
};
use thiserror::Error;
use tracing::{debug, trace};

use crate::port::{PortIo, RegisterPort};
use crate::window::{RingWindow, RingWindowError};

/// Staging capacity for wrapping reservations. A single command larger than
/// this (or larger than the ring) is rejected outright.
pub const BOUNCE_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingError {
    #[error("device identity register read {found:#x}, expected {expected:#x}")]
    DeviceNotPresent { found: u32, expected: u32 },
    #[error(transparent)]
    Window(#[from] RingWindowError),
    #[error("reservation of {bytes} bytes is empty or not 32-bit aligned")]
    BadLength { bytes: u32 },
    #[error("reservation of {bytes} bytes exceeds staging ({bounce}) or ring ({ring}) capacity")]
    TooLarge { bytes: u32, bounce: usize, ring: u32 },
    #[error("reserve() while {reserved} bytes are already reserved")]
    AlreadyReserved { reserved: u32 },
    #[error("ring cannot fit {bytes} bytes and the device is idle with no progress")]
    Full { bytes: u32 },
    #[error("commit() without an outstanding reservation")]
    NoReservation,
    #[error("commit of {bytes} bytes exceeds the {reserved}-byte reservation")]
    CommitTooLarge { bytes: u32, reserved: u32 },
}

impl RingError {
    fn into_submit(self, capacity: u32) -> SubmitError {
        match self {
            RingError::TooLarge { bytes, .. } => SubmitError::TooLarge {
                bytes: bytes as usize,
                capacity: capacity as usize,
            },
            RingError::Full { .. } => SubmitError::ChannelFull,
            RingError::BadLength { .. } => SubmitError::Protocol("unaligned command length"),
            RingError::AlreadyReserved { .. } => SubmitError::Protocol("reservation already open"),
            RingError::NoReservation => SubmitError::Protocol("commit without reservation"),
            RingError::CommitTooLarge { .. } => SubmitError::Protocol("commit exceeds reservation"),
            RingError::DeviceNotPresent { .. } | RingError::Window(_) => {
                SubmitError::Protocol("channel not initialized")
            }
        }
    }
}

enum Placement {
    InPlace(u32),
    Bounce,
}

/// Producer half of the command channel.
pub struct RingEngine<IO> {
    pub(crate) port: RegisterPort<IO>,
    pub(crate) window: RingWindow,
    pub(crate) caps: RingCaps,
    bounce: Vec<u8>,
    reserved_size: u32,
    using_bounce: bool,
    pub(crate) next_fence: u32,
}

impl<IO: PortIo> RingEngine<IO> {
    /// Probe the device identity, validate the window, and enable the
    /// channel. The capability word is snapshotted here; the device does not
    /// change it while the channel is enabled.
    pub fn new(io: IO, window: RingWindow) -> Result<Self, RingError> {
        let mut port = RegisterPort::new(io);
        let found = port.read(RegisterIndex::Id);
        if found != DEVICE_ID_MAGIC {
            return Err(RingError::DeviceNotPresent {
                found,
                expected: DEVICE_ID_MAGIC,
            });
        }
        window.validate()?;
        let caps = window.caps();
        port.write(RegisterIndex::Enable, 1);
        debug!(?caps, capacity = window.capacity(), "command channel enabled");
        Ok(Self {
            port,
            window,
            caps,
            bounce: vec![0; BOUNCE_CAPACITY],
            reserved_size: 0,
            using_bounce: false,
            next_fence: 1,
        })
    }

    pub fn caps(&self) -> RingCaps {
        self.caps
    }

    /// Device-side view of the window, for device models and tests.
    pub fn window(&self) -> &RingWindow {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut RingWindow {
        &mut self.window
    }

    /// Reserve `bytes` of command space. The returned slice is either the
    /// ring itself (contiguous fit) or the staging buffer (wrapping fit);
    /// callers cannot tell and must not care. At most one reservation may be
    /// outstanding.
    pub fn reserve(&mut self, bytes: u32) -> Result<&mut [u8], RingError> {
        if bytes == 0 || bytes % 4 != 0 {
            return Err(RingError::BadLength { bytes });
        }
        if self.reserved_size != 0 {
            return Err(RingError::AlreadyReserved {
                reserved: self.reserved_size,
            });
        }
        let capacity = self.window.capacity();
        if bytes as usize > BOUNCE_CAPACITY || bytes >= capacity {
            return Err(RingError::TooLarge {
                bytes,
                bounce: BOUNCE_CAPACITY,
                ring: capacity,
            });
        }

        let min = self.window.min();
        let max = self.window.max();
        let placement = loop {
            let next_cmd = self.window.next_cmd();
            let stop = self.window.stop();

            if next_cmd >= stop {
                // Free space wraps around the end of the region.
                if next_cmd + bytes < max || (next_cmd + bytes == max && stop > min) {
                    break Placement::InPlace(next_cmd);
                }
                if (max - next_cmd) + (stop - min) <= bytes {
                    self.wait_for_space(bytes, stop)?;
                    continue;
                }
                break Placement::Bounce;
            }

            // Free space is the single gap below the read cursor.
            if next_cmd + bytes < stop {
                break Placement::InPlace(next_cmd);
            }
            self.wait_for_space(bytes, stop)?;
        };

        self.reserved_size = bytes;
        if self.caps.contains(RingCaps::RESERVE) {
            self.window.set_reserved(bytes);
        }
        match placement {
            Placement::InPlace(at) => {
                self.using_bounce = false;
                trace!(bytes, at, "reserved in place");
                Ok(self.window.data_mut(at, bytes))
            }
            Placement::Bounce => {
                self.using_bounce = true;
                trace!(bytes, "reserved via staging buffer");
                Ok(&mut self.bounce[..bytes as usize])
            }
        }
    }

    /// Drain the device when the ring is full. Errors out instead of
    /// spinning when the device reports idle and the read cursor has not
    /// moved; a stalled consumer would otherwise hang the producer forever.
    fn wait_for_space(&mut self, bytes: u32, stop_before: u32) -> Result<(), RingError> {
        self.port.write(RegisterIndex::Sync, 1);
        let busy = self.port.read(RegisterIndex::Busy);
        if busy == 0 && self.window.stop() == stop_before {
            return Err(RingError::Full { bytes });
        }
        Ok(())
    }

    /// Publish `bytes` of the outstanding reservation. The reservation is
    /// consumed even on error.
    pub fn commit(&mut self, bytes: u32) -> Result<(), RingError> {
        if self.reserved_size == 0 {
            return Err(RingError::NoReservation);
        }
        let reserved = self.reserved_size;
        let using_bounce = self.using_bounce;
        self.reserved_size = 0;
        self.using_bounce = false;

        let done = (|| {
            if bytes > reserved {
                return Err(RingError::CommitTooLarge { bytes, reserved });
            }
            if bytes % 4 != 0 {
                return Err(RingError::BadLength { bytes });
            }
            if bytes == 0 {
                return Ok(());
            }
            if using_bounce {
                self.commit_from_bounce(bytes);
            } else {
                let next = self.advance(self.window.next_cmd(), bytes);
                self.window.set_next_cmd(next);
            }
            Ok(())
        })();

        if self.caps.contains(RingCaps::RESERVE) {
            self.window.set_reserved(0);
        }
        done
    }

    fn commit_from_bounce(&mut self, bytes: u32) {
        let min = self.window.min();
        let max = self.window.max();
        let next_cmd = self.window.next_cmd();

        if self.caps.contains(RingCaps::RESERVE) {
            // The reserved register covers the whole copy, so the split may
            // land as two bulk writes with a single cursor publish.
            let head = (max - next_cmd).min(bytes);
            self.window
                .data_mut(next_cmd, head)
                .copy_from_slice(&self.bounce[..head as usize]);
            if head < bytes {
                self.window
                    .data_mut(min, bytes - head)
                    .copy_from_slice(&self.bounce[head as usize..bytes as usize]);
            }
            self.window.set_next_cmd(self.advance(next_cmd, bytes));
            return;
        }

        // Without the reserved register the consumer may read anything below
        // the cursor, so each word must be in place before the cursor moves
        // past it.
        let mut at = next_cmd;
        for word in self.bounce[..bytes as usize].chunks_exact(4) {
            self.window.data_mut(at, 4).copy_from_slice(word);
            at += 4;
            if at == max {
                at = min;
            }
            self.window.set_next_cmd(at);
        }
    }

    fn advance(&self, at: u32, bytes: u32) -> u32 {
        let max = self.window.max();
        let next = at + bytes;
        if next >= max {
            next - self.window.capacity()
        } else {
            next
        }
    }

    /// Reserve a framed record: writes the `[opcode, size_bytes]` header and
    /// returns the payload slice. Commit with the full framed size.
    pub fn reserve_typed(&mut self, op: Opcode, payload_bytes: u32) -> Result<&mut [u8], RingError> {
        let total = payload_bytes
            .checked_add(8)
            .ok_or(RingError::BadLength { bytes: payload_bytes })?;
        let slice = self.reserve(total)?;
        slice[..4].copy_from_slice(&(op as u32).to_le_bytes());
        slice[4..8].copy_from_slice(&total.to_le_bytes());
        Ok(&mut slice[8..])
    }

    /// Copy one or more complete encoded records into the ring.
    pub fn submit(&mut self, encoded: &[u8]) -> Result<(), RingError> {
        let bytes = encoded.len() as u32;
        let slice = self.reserve(bytes)?;
        slice.copy_from_slice(encoded);
        self.commit(bytes)
    }

    /// Kick the device and report whether it has drained the ring.
    pub fn is_idle(&mut self) -> bool {
        self.port.write(RegisterIndex::Sync, 1);
        self.port.read(RegisterIndex::Busy) == 0
    }
}

impl<IO: PortIo> boreal_gpu_protocol::CommandSink for RingEngine<IO> {
    fn submit(&mut self, encoded: &[u8]) -> Result<(), SubmitError> {
        let capacity = self.window.capacity();
        RingEngine::submit(self, encoded).map_err(|e| e.into_submit(capacity))
    }

    fn insert_fence(&mut self) -> Result<u32, SubmitError> {
        let capacity = self.window.capacity();
        RingEngine::insert_fence(self).map_err(|e| e.into_submit(capacity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boreal_gpu_protocol::{INDEX_PORT, VALUE_PORT};
    use pretty_assertions::assert_eq;

    /// Device model that answers the identity probe and reports idle.
    pub(crate) struct FakePort {
        index: u32,
        pub id: u32,
        pub sync_writes: u32,
    }

    impl Default for FakePort {
        fn default() -> Self {
            Self {
                index: 0,
                id: DEVICE_ID_MAGIC,
                sync_writes: 0,
            }
        }
    }

    impl PortIo for FakePort {
        fn port_read(&mut self, port: u16) -> u32 {
            assert_eq!(port, VALUE_PORT);
            match self.index {
                x if x == RegisterIndex::Id as u32 => self.id,
                x if x == RegisterIndex::Busy as u32 => 0,
                _ => 0,
            }
        }

        fn port_write(&mut self, port: u16, value: u32) {
            if port == INDEX_PORT {
                self.index = value;
            } else if self.index == RegisterIndex::Sync as u32 {
                self.sync_writes += value;
            }
        }
    }

    fn engine(data_bytes: usize, caps: RingCaps) -> RingEngine<FakePort> {
        let window = RingWindow::new(data_bytes, caps).unwrap();
        RingEngine::new(FakePort::default(), window).unwrap()
    }

    #[test]
    fn rejects_wrong_device_identity() {
        let window = RingWindow::new(64, RingCaps::empty()).unwrap();
        let port = FakePort {
            id: 0xBAD,
            ..FakePort::default()
        };
        assert_eq!(
            RingEngine::new(port, window).err(),
            Some(RingError::DeviceNotPresent {
                found: 0xBAD,
                expected: DEVICE_ID_MAGIC,
            })
        );
    }

    #[test]
    fn contiguous_reservation_lands_in_place() {
        let mut e = engine(128, RingCaps::RESERVE);
        let min = e.window().min();

        let slice = e.reserve(16).unwrap();
        slice.copy_from_slice(&[7u8; 16]);
        assert_eq!(e.window().reserved(), 16);
        e.commit(16).unwrap();

        assert_eq!(e.window().next_cmd(), min + 16);
        assert_eq!(e.window().reserved(), 0);
        assert_eq!(e.window().data(min, 16), &[7u8; 16]);
    }

    #[test]
    fn contiguous_fit_is_in_place_even_without_reserve_cap() {
        let mut e = engine(128, RingCaps::empty());
        let min = e.window().min();

        let slice = e.reserve(8).unwrap();
        slice.copy_from_slice(&[3u8; 8]);
        e.commit(8).unwrap();

        assert_eq!(e.window().next_cmd(), min + 8);
        assert_eq!(e.window().data(min, 8), &[3u8; 8]);
    }

    #[test]
    fn wrapping_reservation_splits_across_the_seam() {
        let mut e = engine(100, RingCaps::RESERVE);
        let min = e.window().min();
        let max = e.window().max();
        // Consumer has drained 40 bytes; producer sits 10 bytes from the end.
        e.window_mut().set_next_cmd(min + 90);
        e.window_mut().set_stop(min + 40);

        let pattern: Vec<u8> = (0u8..20).collect();
        let slice = e.reserve(20).unwrap();
        slice.copy_from_slice(&pattern);
        e.commit(20).unwrap();

        assert_eq!(e.window().next_cmd(), min + 10);
        assert_eq!(e.window().data(min + 90, 10), &pattern[..10]);
        assert_eq!(e.window().data(min, 10), &pattern[10..]);
        let _ = max;
    }

    #[test]
    fn wrapping_commit_without_reserve_cap_publishes_word_wise() {
        let mut e = engine(100, RingCaps::empty());
        let min = e.window().min();
        e.window_mut().set_next_cmd(min + 92);
        e.window_mut().set_stop(min + 40);

        let pattern: Vec<u8> = (0u8..16).collect();
        let slice = e.reserve(16).unwrap();
        slice.copy_from_slice(&pattern);
        e.commit(16).unwrap();

        assert_eq!(e.window().next_cmd(), min + 8);
        assert_eq!(e.window().data(min + 92, 8), &pattern[..8]);
        assert_eq!(e.window().data(min, 8), &pattern[8..]);
    }

    #[test]
    fn full_ring_with_idle_device_errors_instead_of_spinning() {
        let mut e = engine(100, RingCaps::RESERVE);
        let min = e.window().min();
        e.window_mut().set_next_cmd(min + 90);
        e.window_mut().set_stop(min);

        assert_eq!(e.reserve(20).err(), Some(RingError::Full { bytes: 20 }));
        // The drain attempt kicked the device at least once.
        assert!(e.port.io.sync_writes >= 1);
    }

    #[test]
    fn double_reservation_is_rejected() {
        let mut e = engine(128, RingCaps::RESERVE);
        e.reserve(8).unwrap();
        assert_eq!(
            e.reserve(8).err(),
            Some(RingError::AlreadyReserved { reserved: 8 })
        );
    }

    #[test]
    fn commit_without_reservation_is_rejected() {
        let mut e = engine(128, RingCaps::RESERVE);
        assert_eq!(e.commit(8).err(), Some(RingError::NoReservation));
    }

    #[test]
    fn commit_larger_than_reservation_consumes_it() {
        let mut e = engine(128, RingCaps::RESERVE);
        e.reserve(8).unwrap();
        assert_eq!(
            e.commit(12).err(),
            Some(RingError::CommitTooLarge {
                bytes: 12,
                reserved: 8
            })
        );
        // The failed commit still released the reservation.
        assert!(e.reserve(8).is_ok());
    }

    #[test]
    fn oversized_reservation_is_rejected_up_front() {
        let mut e = engine(64, RingCaps::RESERVE);
        assert!(matches!(
            e.reserve(64).err(),
            Some(RingError::TooLarge { bytes: 64, .. })
        ));
        assert_eq!(e.reserve(0).err(), Some(RingError::BadLength { bytes: 0 }));
        assert_eq!(e.reserve(6).err(), Some(RingError::BadLength { bytes: 6 }));
    }

    #[test]
    fn reserve_typed_frames_the_record() {
        let mut e = engine(128, RingCaps::RESERVE);
        let min = e.window().min();

        let payload = e.reserve_typed(Opcode::SetViewport, 16).unwrap();
        payload.copy_from_slice(&[0u8; 16]);
        e.commit(24).unwrap();

        assert_eq!(e.window().data_word(min), Opcode::SetViewport as u32);
        assert_eq!(e.window().data_word(min + 4), 24);
    }
}
