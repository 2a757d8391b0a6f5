//! The shared ring window: control words plus the circular data region.

use boreal_gpu_protocol::{fifo, RingCaps};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingWindowError {
    #[error("data region of {bytes} bytes is empty or not 32-bit aligned")]
    BadDataSize { bytes: usize },
    #[error("control word {word} holds {value:#x}, outside the window layout")]
    BadControlWord { word: usize, value: u32 },
    #[error("cursor {cursor:#x} is outside the data region [{min:#x}, {max:#x})")]
    CursorOutOfRange { cursor: u32, min: u32, max: u32 },
}

/// Owned byte window over the command channel.
///
/// The first [`fifo::CONTROL_BYTES`] bytes are control words; the data region
/// is `[min, max)` with `min == CONTROL_BYTES`. All cursor values are byte
/// offsets into the window, as the device sees them. Callers never receive
/// raw offsets — data access goes through the bounds-checked slice accessors.
#[derive(Debug, Clone)]
pub struct RingWindow {
    buf: Vec<u8>,
}

impl RingWindow {
    /// Create a window with a zeroed data region of `data_bytes` bytes and
    /// both cursors parked at `min`.
    pub fn new(data_bytes: usize, caps: RingCaps) -> Result<Self, RingWindowError> {
        if data_bytes == 0 || data_bytes % 4 != 0 {
            return Err(RingWindowError::BadDataSize { bytes: data_bytes });
        }
        let min = fifo::CONTROL_BYTES as u32;
        let max = min + data_bytes as u32;
        let mut window = Self {
            buf: vec![0; fifo::CONTROL_BYTES + data_bytes],
        };
        window.set_control(fifo::MIN, min);
        window.set_control(fifo::MAX, max);
        window.set_control(fifo::NEXT_CMD, min);
        window.set_control(fifo::STOP, min);
        window.set_control(fifo::CAPS, caps.bits());
        Ok(window)
    }

    /// Check the control words against the window layout. The engine runs
    /// this once at construction; a failure is a fatal setup error.
    pub fn validate(&self) -> Result<(), RingWindowError> {
        let min = self.min();
        let max = self.max();
        if min != fifo::CONTROL_BYTES as u32 {
            return Err(RingWindowError::BadControlWord {
                word: fifo::MIN,
                value: min,
            });
        }
        if max <= min || max as usize > self.buf.len() || (max - min) % 4 != 0 {
            return Err(RingWindowError::BadControlWord {
                word: fifo::MAX,
                value: max,
            });
        }
        for (word, cursor) in [(fifo::NEXT_CMD, self.next_cmd()), (fifo::STOP, self.stop())] {
            if cursor < min || cursor >= max || cursor % 4 != 0 {
                let _ = word;
                return Err(RingWindowError::CursorOutOfRange { cursor, min, max });
            }
        }
        Ok(())
    }

    fn control(&self, word: usize) -> u32 {
        let at = word * 4;
        u32::from_le_bytes(self.buf[at..at + 4].try_into().expect("control word"))
    }

    fn set_control(&mut self, word: usize, value: u32) {
        let at = word * 4;
        self.buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn min(&self) -> u32 {
        self.control(fifo::MIN)
    }

    pub fn max(&self) -> u32 {
        self.control(fifo::MAX)
    }

    /// Data region capacity in bytes.
    pub fn capacity(&self) -> u32 {
        self.max() - self.min()
    }

    pub fn caps(&self) -> RingCaps {
        RingCaps::from_bits_truncate(self.control(fifo::CAPS))
    }

    pub fn next_cmd(&self) -> u32 {
        self.control(fifo::NEXT_CMD)
    }

    pub fn set_next_cmd(&mut self, offset: u32) {
        debug_assert!(offset >= self.min() && offset < self.max());
        self.set_control(fifo::NEXT_CMD, offset);
    }

    pub fn stop(&self) -> u32 {
        self.control(fifo::STOP)
    }

    /// Device-side: advance the read cursor. Used by device models and tests.
    pub fn set_stop(&mut self, offset: u32) {
        self.set_control(fifo::STOP, offset);
    }

    pub fn reserved(&self) -> u32 {
        self.control(fifo::RESERVED)
    }

    pub fn set_reserved(&mut self, bytes: u32) {
        self.set_control(fifo::RESERVED, bytes);
    }

    pub fn fence(&self) -> u32 {
        self.control(fifo::FENCE)
    }

    /// Device-side: publish the highest completed fence.
    pub fn set_fence(&mut self, id: u32) {
        self.set_control(fifo::FENCE, id);
    }

    /// Mutable slice over `[offset, offset + len)` of the data region.
    /// Panics on out-of-range access; the engine validates every range it
    /// derives from the cursors.
    pub fn data_mut(&mut self, offset: u32, len: u32) -> &mut [u8] {
        let (min, max) = (self.min(), self.max());
        assert!(offset >= min && offset + len <= max, "ring range out of bounds");
        &mut self.buf[offset as usize..(offset + len) as usize]
    }

    /// Shared slice over `[offset, offset + len)` of the data region.
    pub fn data(&self, offset: u32, len: u32) -> &[u8] {
        let (min, max) = (self.min(), self.max());
        assert!(offset >= min && offset + len <= max, "ring range out of bounds");
        &self.buf[offset as usize..(offset + len) as usize]
    }

    /// One data word, for device models that consume the ring word-wise.
    pub fn data_word(&self, offset: u32) -> u32 {
        let bytes = self.data(offset, 4);
        u32::from_le_bytes(bytes.try_into().expect("ring word"))
    }
}
