//! I/O port interface.

/// Device side of the Z80's IN/OUT instructions.
///
/// `read_port` sees the full 16-bit address the CPU places on the bus (for
/// `IN r,(C)` that is BC, for `IN A,(n)` it is A in the high byte). Writes are
/// decoded on the low byte only.
pub trait PortHandler: Send {
    /// Read a byte from a port.
    fn read_port(&mut self, port: u16) -> u8;

    /// Write a byte to a port.
    fn write_port(&mut self, port: u8, value: u8);
}

/// Port handler with nothing attached: reads float to 0x00, writes vanish.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPorts;

impl PortHandler for NullPorts {
    fn read_port(&mut self, _port: u16) -> u8 {
        0x00
    }

    fn write_port(&mut self, _port: u8, _value: u8) {}
}
