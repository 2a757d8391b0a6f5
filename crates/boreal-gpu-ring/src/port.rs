//! Indexed register access over the two-port protocol.

use boreal_gpu_protocol::{RegisterIndex, INDEX_PORT, VALUE_PORT};

/// Raw port I/O, provided by the embedding environment.
pub trait PortIo {
    fn port_read(&mut self, port: u16) -> u32;
    fn port_write(&mut self, port: u16, value: u32);
}

/// Indexed register file access: every call is an index select on
/// [`INDEX_PORT`] followed by a value transfer on [`VALUE_PORT`].
///
/// No error return; the register indices used by this crate are all
/// compile-time [`RegisterIndex`] values.
#[derive(Debug)]
pub struct RegisterPort<IO> {
    pub(crate) io: IO,
}

impl<IO: PortIo> RegisterPort<IO> {
    pub fn new(io: IO) -> Self {
        Self { io }
    }

    pub fn read(&mut self, index: RegisterIndex) -> u32 {
        self.io.port_write(INDEX_PORT, index as u32);
        self.io.port_read(VALUE_PORT)
    }

    pub fn write(&mut self, index: RegisterIndex, value: u32) {
        self.io.port_write(INDEX_PORT, index as u32);
        self.io.port_write(VALUE_PORT, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct LogPort {
        log: Vec<(u16, Option<u32>)>,
    }

    impl PortIo for LogPort {
        fn port_read(&mut self, port: u16) -> u32 {
            self.log.push((port, None));
            0x1234
        }

        fn port_write(&mut self, port: u16, value: u32) {
            self.log.push((port, Some(value)));
        }
    }

    #[test]
    fn each_access_is_index_select_then_value_transfer() {
        let mut rp = RegisterPort::new(LogPort::default());
        rp.write(RegisterIndex::Sync, 1);
        assert_eq!(rp.read(RegisterIndex::Busy), 0x1234);

        let log = &rp.io.log;
        assert_eq!(
            log.as_slice(),
            &[
                (INDEX_PORT, Some(RegisterIndex::Sync as u32)),
                (VALUE_PORT, Some(1)),
                (INDEX_PORT, Some(RegisterIndex::Busy as u32)),
                (VALUE_PORT, None),
            ]
        );
    }
}
