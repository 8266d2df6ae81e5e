//! A decoded protocol packet: an opcode plus its little-endian body.
//!
//! The teacher crate generates a distinct struct per packet type per
//! protocol version via `protocol_impl!`, because Minecraft's wire format
//! changes release to release. This protocol has exactly one version in
//! play at a time (spec §3), so packets here are a single opaque type:
//! callers build one with [`PacketBuilder`] and read fields back out of it
//! with [`Packet::reader`].

use std::io::Cursor;

use crate::errors::{Error, FieldResult};
use crate::wire::{Readable, Writable};

/// A decoded packet: its opcode and body, with no framing left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    opcode: u16,
    body: Vec<u8>,
}

impl Packet {
    /// Splits a plaintext frame's opcode (first two bytes, little-endian)
    /// from its body. Errors if `data` is shorter than an opcode.
    pub fn from_bytes(data: &[u8]) -> FieldResult<Self> {
        if data.len() < 2 {
            return Err(Error::ShortFrame);
        }
        Ok(Self {
            opcode: u16::from_le_bytes([data[0], data[1]]),
            body: data[2..].to_vec(),
        })
    }

    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// A cursor over the body, for pulling out [`Readable`] fields in order.
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.body)
    }
}

/// Builds an outgoing packet: an opcode followed by fields written in
/// declaration order.
pub struct PacketBuilder {
    buf: Vec<u8>,
}

impl PacketBuilder {
    pub fn new(opcode: u16) -> Self {
        let mut buf = Vec::with_capacity(16);
        buf.extend_from_slice(&opcode.to_le_bytes());
        Self { buf }
    }

    pub fn write<W: Writable>(mut self, field: &W) -> FieldResult<Self> {
        field.write_to(&mut self.buf)?;
        Ok(self)
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_and_from_bytes_round_trip() {
        let raw = PacketBuilder::new(0x1234)
            .write(&7u32)
            .unwrap()
            .write(&true)
            .unwrap()
            .finish();

        let packet = Packet::from_bytes(&raw).unwrap();
        assert_eq!(packet.opcode(), 0x1234);

        let mut reader = packet.reader();
        assert_eq!(u32::read_from(&mut reader).unwrap(), 7);
        assert_eq!(bool::read_from(&mut reader).unwrap(), true);
    }

    #[test]
    fn short_buffer_is_rejected() {
        assert!(Packet::from_bytes(&[0x01]).is_err());
    }
}
