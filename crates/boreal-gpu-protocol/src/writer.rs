//! Builder for encoded command records.
//!
//! A [`CommandWriter`] accumulates one or more framed commands into a
//! `Vec<u8>`: `begin` opens a record with its opcode and a length placeholder,
//! the `write_*` methods append payload, and `end` patches the final
//! `size_bytes` and pads the record to a word boundary. Misuse (unbalanced
//! `begin`/`end`) is a programmer error and asserts.

use bytemuck::NoUninit;

use crate::commands::Opcode;

fn align_up(v: usize, a: usize) -> usize {
    debug_assert!(a.is_power_of_two());
    (v + (a - 1)) & !(a - 1)
}

#[derive(Debug, Default, Clone)]
pub struct CommandWriter {
    buf: Vec<u8>,
    open_at: Option<usize>,
}

impl CommandWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode the raw two-word fence record (no length word).
    pub fn encode_fence(id: u32) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[..4].copy_from_slice(&(Opcode::Fence as u32).to_le_bytes());
        out[4..].copy_from_slice(&id.to_le_bytes());
        out
    }

    pub fn begin(&mut self, op: Opcode) -> &mut Self {
        assert!(self.open_at.is_none(), "begin() with an open command");
        assert!(op != Opcode::Fence, "fences use encode_fence()");
        self.open_at = Some(self.buf.len());
        self.write_u32(op as u32);
        self.write_u32(0); // size_bytes, patched by end()
        self
    }

    pub fn write_u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn write_f32(&mut self, v: f32) -> &mut Self {
        self.write_u32(v.to_bits())
    }

    pub fn write_record<T: NoUninit>(&mut self, record: &T) -> &mut Self {
        self.buf.extend_from_slice(bytemuck::bytes_of(record));
        self
    }

    /// Append a `u16` index array; `end()` pads the record back to a word
    /// boundary.
    pub fn write_u16_slice(&mut self, values: &[u16]) -> &mut Self {
        for v in values {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
        self
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn end(&mut self) -> &mut Self {
        let start = self.open_at.take().expect("end() without begin()");
        let padded = align_up(self.buf.len() - start, 4);
        self.buf.resize(start + padded, 0);
        let size = padded as u32;
        self.buf[start + 4..start + 8].copy_from_slice(&size.to_le_bytes());
        self
    }

    pub fn finish(self) -> Vec<u8> {
        assert!(self.open_at.is_none(), "finish() with an open command");
        self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_patches_size_and_pads_to_word() {
        let mut w = CommandWriter::new();
        w.begin(Opcode::SetScissorRect);
        w.write_u32(7);
        w.write_u16_slice(&[1, 2, 3]); // 6 bytes, forces padding
        w.end();
        let bytes = w.finish();

        assert_eq!(bytes.len() % 4, 0);
        assert_eq!(
            u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            Opcode::SetScissorRect as u32
        );
        assert_eq!(
            u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            bytes.len() as u32
        );
    }

    #[test]
    fn fence_is_two_raw_words() {
        let bytes = CommandWriter::encode_fence(41);
        assert_eq!(
            u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            Opcode::Fence as u32
        );
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 41);
    }
}
