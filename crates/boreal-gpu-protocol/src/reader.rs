//! Iterator over encoded command records.
//!
//! Device models and tests use this to audit what reached the ring. The
//! reader walks the `[opcode, size_bytes, payload]` framing and special-cases
//! the raw two-word fence record.

use thiserror::Error;

use crate::commands::Opcode;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("command stream length {len} is not a whole number of words")]
    Unaligned { len: usize },
    #[error("truncated command record at byte {at}")]
    Truncated { at: usize },
    #[error("unknown opcode {opcode:#x} at byte {at}")]
    UnknownOpcode { at: usize, opcode: u32 },
    #[error("bad record length {len} at byte {at}")]
    BadLength { at: usize, len: u32 },
}

/// One decoded record; `payload` excludes the framing words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandRecord<'a> {
    pub opcode: Opcode,
    pub payload: &'a [u8],
}

impl<'a> CommandRecord<'a> {
    /// Payload word `index`, little-endian.
    pub fn u32_at(&self, index: usize) -> Option<u32> {
        let start = index.checked_mul(4)?;
        let bytes = self.payload.get(start..start + 4)?;
        Some(u32::from_le_bytes(bytes.try_into().ok()?))
    }
}

#[derive(Debug, Clone)]
pub struct CommandReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> CommandReader<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self, StreamError> {
        if buf.len() % 4 != 0 {
            return Err(StreamError::Unaligned { len: buf.len() });
        }
        Ok(Self { buf, pos: 0 })
    }

    fn word_at(&self, pos: usize) -> Option<u32> {
        let bytes = self.buf.get(pos..pos + 4)?;
        Some(u32::from_le_bytes(bytes.try_into().ok()?))
    }
}

impl<'a> Iterator for CommandReader<'a> {
    type Item = Result<CommandRecord<'a>, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        let at = self.pos;
        if at == self.buf.len() {
            return None;
        }
        let raw = match self.word_at(at) {
            Some(raw) => raw,
            None => return Some(Err(StreamError::Truncated { at })),
        };
        let opcode = match Opcode::from_u32(raw) {
            Some(op) => op,
            None => {
                return Some(Err(StreamError::UnknownOpcode { at, opcode: raw }));
            }
        };

        if opcode == Opcode::Fence {
            let Some(payload) = self.buf.get(at + 4..at + 8) else {
                return Some(Err(StreamError::Truncated { at }));
            };
            self.pos = at + 8;
            return Some(Ok(CommandRecord { opcode, payload }));
        }

        let Some(len) = self.word_at(at + 4) else {
            return Some(Err(StreamError::Truncated { at }));
        };
        if len < 8 || len % 4 != 0 {
            return Some(Err(StreamError::BadLength { at, len }));
        }
        let end = at + len as usize;
        let Some(payload) = self.buf.get(at + 8..end) else {
            return Some(Err(StreamError::Truncated { at }));
        };
        self.pos = end;
        Some(Ok(CommandRecord { opcode, payload }))
    }
}
