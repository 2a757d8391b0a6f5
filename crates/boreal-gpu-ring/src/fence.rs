//! Fence insertion and completion tracking.
//!
//! Fence ids are a wrapping 32-bit sequence that never hands out `0`; the
//! zero id means "no fence" and is always treated as already passed. The
//! device publishes the highest completed id in the window's fence word, and
//! the comparison is wrap-safe so the sequence survives rollover.

use boreal_gpu_protocol::{CommandWriter, RegisterIndex, RingCaps};
use tracing::warn;

use crate::engine::{RingEngine, RingError};
use crate::port::PortIo;

impl<IO: PortIo> RingEngine<IO> {
    /// Submit a fence record and return its id. Devices without fence
    /// support get `0` back, which reads as already satisfied.
    pub fn insert_fence(&mut self) -> Result<u32, RingError> {
        if !self.caps.contains(RingCaps::FENCE) {
            return Ok(0);
        }
        let id = self.next_fence;
        self.next_fence = self.next_fence.wrapping_add(1);
        if self.next_fence == 0 {
            self.next_fence = 1;
        }
        self.submit(&CommandWriter::encode_fence(id))?;
        Ok(id)
    }

    /// Whether the device has retired fence `id`. Uses a wrapping signed
    /// comparison against the published fence word.
    pub fn has_fence_passed(&self, id: u32) -> bool {
        if id == 0 {
            return true;
        }
        if !self.caps.contains(RingCaps::FENCE) {
            return false;
        }
        self.window.fence().wrapping_sub(id) as i32 >= 0
    }

    /// Block until fence `id` retires. `0` returns immediately without
    /// touching the device. Without fence support this degrades to a full
    /// drain of the ring.
    pub fn sync_to_fence(&mut self, id: u32) {
        if id == 0 {
            return;
        }
        if !self.caps.contains(RingCaps::FENCE) {
            self.port.write(RegisterIndex::Sync, 1);
            while self.port.read(RegisterIndex::Busy) != 0 {}
            return;
        }
        if self.has_fence_passed(id) {
            return;
        }
        self.port.write(RegisterIndex::Sync, 1);
        loop {
            if self.has_fence_passed(id) {
                return;
            }
            if self.port.read(RegisterIndex::Busy) == 0 {
                break;
            }
        }
        if !self.has_fence_passed(id) {
            // The device drained everything without publishing the id;
            // treat it as satisfied rather than spinning on a dead fence.
            warn!(fence = id, "device idle without retiring fence");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::RingWindow;
    use boreal_gpu_protocol::{
        CommandReader, Opcode, DEVICE_ID_MAGIC, INDEX_PORT, VALUE_PORT,
    };
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct CountingPort {
        index: u32,
        reads: u32,
        writes: u32,
    }

    impl PortIo for CountingPort {
        fn port_read(&mut self, port: u16) -> u32 {
            assert_eq!(port, VALUE_PORT);
            self.reads += 1;
            if self.index == RegisterIndex::Id as u32 {
                DEVICE_ID_MAGIC
            } else {
                0
            }
        }

        fn port_write(&mut self, port: u16, value: u32) {
            if port == INDEX_PORT {
                self.index = value;
            } else {
                let _ = value;
                self.writes += 1;
            }
        }
    }

    fn engine(caps: RingCaps) -> RingEngine<CountingPort> {
        let window = RingWindow::new(256, caps).unwrap();
        RingEngine::new(CountingPort::default(), window).unwrap()
    }

    #[test]
    fn fence_ids_are_monotonic_and_land_in_the_ring() {
        let mut e = engine(RingCaps::FENCE);
        let a = e.insert_fence().unwrap();
        let b = e.insert_fence().unwrap();
        assert_eq!((a, b), (1, 2));

        let min = e.window().min();
        let bytes = e.window().data(min, 16).to_vec();
        let records: Vec<_> = CommandReader::new(&bytes)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].opcode, Opcode::Fence);
        assert_eq!(records[0].u32_at(0), Some(1));
        assert_eq!(records[1].u32_at(0), Some(2));
    }

    #[test]
    fn without_fence_support_insert_returns_zero_and_writes_nothing() {
        let mut e = engine(RingCaps::empty());
        assert_eq!(e.insert_fence().unwrap(), 0);
        assert_eq!(e.window().next_cmd(), e.window().min());
    }

    #[test]
    fn zero_fence_is_always_passed_and_sync_is_a_no_op() {
        let mut e = engine(RingCaps::FENCE);
        assert!(e.has_fence_passed(0));

        let before = (e.port.io.reads, e.port.io.writes);
        e.sync_to_fence(0);
        assert_eq!((e.port.io.reads, e.port.io.writes), before);
    }

    #[test]
    fn fence_comparison_survives_id_wraparound() {
        let mut e = engine(RingCaps::FENCE);
        e.window_mut().set_fence(5);
        assert!(e.has_fence_passed(3));
        assert!(e.has_fence_passed(5));
        assert!(!e.has_fence_passed(9));

        // Published id just past the wrap still satisfies ids just before it.
        e.window_mut().set_fence(2);
        assert!(e.has_fence_passed(u32::MAX - 1));
        assert!(!e.has_fence_passed(0x7FFF_FFFF));
    }

    #[test]
    fn sync_returns_once_the_fence_is_published() {
        let mut e = engine(RingCaps::FENCE);
        let id = e.insert_fence().unwrap();
        e.window_mut().set_fence(id);
        e.sync_to_fence(id);
        assert!(e.has_fence_passed(id));
    }

    #[test]
    fn id_sequence_skips_zero_on_wrap() {
        let mut e = engine(RingCaps::FENCE);
        e.next_fence = u32::MAX;
        let last = e.insert_fence().unwrap();
        let wrapped = e.insert_fence().unwrap();
        assert_eq!(last, u32::MAX);
        assert_eq!(wrapped, 1);
    }
}
