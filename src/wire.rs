//! Primitive types serialized onto the wire.
//!
//! Same `Readable`/`Writable` split the teacher crate uses for its own
//! protocol primitives, just little-endian throughout (per spec §6)
//! instead of big-endian, and with a UTF-16 length-prefixed string instead
//! of a VarInt-prefixed UTF-8 one.

use std::io::{self, prelude::*};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use uuid::Uuid;

use crate::errors::FieldResult;

pub trait Readable: Sized {
    fn read_from<T: io::Read>(buf: &mut T) -> FieldResult<Self>;
}

pub trait Writable: Sized {
    fn write_to<T: io::Write>(&self, buf: &mut T) -> FieldResult<()>;
}

// ---- Bool ---------------

impl Readable for bool {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> FieldResult<Self> {
        Ok(buf.read_u8()? != 0)
    }
}

impl Writable for bool {
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> FieldResult<()> {
        Ok(buf.write_u8(if *self { 1 } else { 0 })?)
    }
}

// ---- Integers ------------

macro_rules! impl_int {
    ($ty:ty, $read:ident, $write:ident) => {
        impl Readable for $ty {
            #[inline]
            fn read_from<T: io::Read>(buf: &mut T) -> FieldResult<Self> {
                Ok(buf.$read::<LittleEndian>()?)
            }
        }

        impl Writable for $ty {
            #[inline]
            fn write_to<T: io::Write>(&self, buf: &mut T) -> FieldResult<()> {
                Ok(buf.$write::<LittleEndian>(*self)?)
            }
        }
    };
}

impl_int!(i16, read_i16, write_i16);
impl_int!(u16, read_u16, write_u16);
impl_int!(i32, read_i32, write_i32);
impl_int!(u32, read_u32, write_u32);
impl_int!(i64, read_i64, write_i64);
impl_int!(u64, read_u64, write_u64);
impl_int!(f32, read_f32, write_f32);
impl_int!(f64, read_f64, write_f64);

impl Readable for i8 {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> FieldResult<Self> {
        Ok(buf.read_i8()?)
    }
}

impl Writable for i8 {
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> FieldResult<()> {
        Ok(buf.write_i8(*self)?)
    }
}

impl Readable for u8 {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> FieldResult<Self> {
        Ok(buf.read_u8()?)
    }
}

impl Writable for u8 {
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> FieldResult<()> {
        Ok(buf.write_u8(*self)?)
    }
}

// ---- Unicode string ------

/// A length-prefixed UTF-16LE string, the `unicode`/`unicodeLenPrefixed`
/// type from spec §6. The prefix is a `u16` count of UTF-16 code units.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Unicode(pub String);

impl Readable for Unicode {
    fn read_from<T: io::Read>(buf: &mut T) -> FieldResult<Self> {
        let len = buf.read_u16::<LittleEndian>()? as usize;
        let mut units = Vec::with_capacity(len);
        for _ in 0..len {
            units.push(buf.read_u16::<LittleEndian>()?);
        }
        Ok(Self(String::from_utf16(&units)?))
    }
}

impl Writable for Unicode {
    fn write_to<T: io::Write>(&self, buf: &mut T) -> FieldResult<()> {
        let units: Vec<u16> = self.0.encode_utf16().collect();
        buf.write_u16::<LittleEndian>(units.len() as u16)?;
        for unit in units {
            buf.write_u16::<LittleEndian>(unit)?;
        }
        Ok(())
    }
}

impl From<&str> for Unicode {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for Unicode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---- Fixed byte arrays ---

/// 128-bit machine identifier, serialized as raw big-endian bytes (matching
/// how the teacher crate already serializes a `Uuid` in its own wire layer).
impl Readable for Uuid {
    #[inline]
    fn read_from<T: io::Read>(buf: &mut T) -> FieldResult<Self> {
        let mut bytes = [0u8; 16];
        buf.read_exact(&mut bytes)?;
        Ok(Uuid::from_bytes(bytes))
    }
}

impl Writable for Uuid {
    #[inline]
    fn write_to<T: io::Write>(&self, buf: &mut T) -> FieldResult<()> {
        Ok(buf.write_all(self.as_bytes())?)
    }
}

// ---- Vec3 ----------------

/// Three packed `f32`s — a world position or direction vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Readable for Vec3 {
    fn read_from<T: io::Read>(buf: &mut T) -> FieldResult<Self> {
        Ok(Self {
            x: f32::read_from(buf)?,
            y: f32::read_from(buf)?,
            z: f32::read_from(buf)?,
        })
    }
}

impl Writable for Vec3 {
    fn write_to<T: io::Write>(&self, buf: &mut T) -> FieldResult<()> {
        self.x.write_to(buf)?;
        self.y.write_to(buf)?;
        self.z.write_to(buf)
    }
}

// ---- Raw tail ------------

/// Reads whatever bytes remain in the buffer, with no length prefix. Used
/// for trailing variable-length sections a packet body doesn't fully model
/// (see spec §9 on character-list parsing fragility).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rest(pub Vec<u8>);

impl Readable for Rest {
    fn read_from<T: io::Read>(buf: &mut T) -> FieldResult<Self> {
        let mut data = Vec::new();
        buf.read_to_end(&mut data)?;
        Ok(Self(data))
    }
}

impl Writable for Rest {
    fn write_to<T: io::Write>(&self, buf: &mut T) -> FieldResult<()> {
        Ok(buf.write_all(&self.0)?)
    }
}
