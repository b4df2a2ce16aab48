//! Network byte order packing primitives.
//!
//! Everything that crosses the host/client boundary is written with a
//! [`Packer`] and read back with an [`Unpacker`]. The format has no framing of
//! its own: fields are laid out back to back, strings are prefixed with a `u32`
//! length, and sequences are prefixed with a `u32` count. Both sides have to
//! agree on the exact field order.

use glam::{Vec3, Vec4};
use thiserror::Error;

pub const U8_SIZE: usize = 1;
pub const U16_SIZE: usize = 2;
pub const U32_SIZE: usize = 4;
pub const F32_SIZE: usize = 4;
pub const VEC3_SIZE: usize = 3 * F32_SIZE;
pub const VEC4_SIZE: usize = 4 * F32_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },
    #[error("unknown obstacle type tag {0}")]
    UnknownObstacleType(u8),
    #[error("unknown transform operation tag {0}")]
    UnknownTransformOp(u8),
    #[error("obstacle of type {found} found in the {expected} list")]
    TypeMismatch { expected: &'static str, found: &'static str },
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("count {count} exceeds the {remaining} bytes remaining")]
    CountTooLarge { count: usize, remaining: usize },
    #[error("{0} trailing bytes after the end of the stream")]
    TrailingBytes(usize),
}

/// Size of a length-prefixed string.
pub const fn string_size(s: &str) -> usize {
    U32_SIZE + s.len()
}

#[derive(Debug, Default, Clone)]
pub struct Packer {
    buf: Vec<u8>,
}

impl Packer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.u8(u8::from(v))
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn vec3(&mut self, v: Vec3) -> &mut Self {
        self.f32(v.x).f32(v.y).f32(v.z)
    }

    pub fn vec4(&mut self, v: Vec4) -> &mut Self {
        self.f32(v.x).f32(v.y).f32(v.z).f32(v.w)
    }

    /// Writes a sequence length.
    ///
    /// Lengths beyond `u32::MAX` cannot be represented on the wire; world data
    /// never gets near that, so this panics rather than silently truncating.
    pub fn count(&mut self, n: usize) -> &mut Self {
        let n = u32::try_from(n).unwrap_or_else(|_| panic!("count {n} does not fit the wire format"));
        self.u32(n)
    }

    pub fn string(&mut self, s: &str) -> &mut Self {
        self.count(s.len());
        self.buf.extend_from_slice(s.as_bytes());
        self
    }
}

#[derive(Debug, Clone)]
pub struct Unpacker<'a> {
    buf: &'a [u8],
}

impl<'a> Unpacker<'a> {
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub const fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Fails with [`DecodeError::TrailingBytes`] if anything is left unread.
    pub fn finish(self) -> Result<(), DecodeError> {
        match self.buf.len() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let Some((head, tail)) = self.buf.split_first_chunk::<N>() else {
            return Err(DecodeError::UnexpectedEof { needed: N, remaining: self.buf.len() });
        };
        self.buf = tail;
        Ok(*head)
    }

    fn take_slice(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if n > self.buf.len() {
            return Err(DecodeError::UnexpectedEof { needed: n, remaining: self.buf.len() });
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.u8()? != 0)
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    pub fn i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.take()?))
    }

    pub fn f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_be_bytes(self.take()?))
    }

    pub fn vec3(&mut self) -> Result<Vec3, DecodeError> {
        Ok(Vec3::new(self.f32()?, self.f32()?, self.f32()?))
    }

    pub fn vec4(&mut self) -> Result<Vec4, DecodeError> {
        Ok(Vec4::new(self.f32()?, self.f32()?, self.f32()?, self.f32()?))
    }

    /// Reads a sequence length, rejecting counts that could not possibly be
    /// backed by the remaining input given `min_item_size` bytes per item.
    pub fn count(&mut self, min_item_size: usize) -> Result<usize, DecodeError> {
        let count = self.u32()? as usize;
        let remaining = self.buf.len();
        if count.saturating_mul(min_item_size.max(1)) > remaining {
            return Err(DecodeError::CountTooLarge { count, remaining });
        }
        Ok(count)
    }

    pub fn string(&mut self) -> Result<String, DecodeError> {
        let len = self.count(1)?;
        let bytes = self.take_slice(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use assertables::assert_matches;

    use super::*;

    #[test]
    fn primitives_are_big_endian() {
        let mut p = Packer::new();
        p.u16(0x0102).u32(0x0304_0506).i32(-1);
        assert_eq!(p.as_bytes(), &[1, 2, 3, 4, 5, 6, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn reads_back_in_order() {
        let mut p = Packer::new();
        p.string("tele").f32(1.5).vec3(Vec3::new(1.0, 2.0, 3.0)).bool(true);
        let bytes = p.into_bytes();

        let mut u = Unpacker::new(&bytes);
        assert_eq!(u.string().unwrap(), "tele");
        assert_eq!(u.f32().unwrap(), 1.5);
        assert_eq!(u.vec3().unwrap(), Vec3::new(1.0, 2.0, 3.0));
        assert!(u.bool().unwrap());
        u.finish().unwrap();
    }

    #[test]
    fn short_input_is_an_error() {
        let mut u = Unpacker::new(&[0, 0, 1]);
        assert_eq!(u.u32(), Err(DecodeError::UnexpectedEof { needed: 4, remaining: 3 }));
    }

    #[test]
    fn oversized_string_length_is_rejected() {
        let mut p = Packer::new();
        p.u32(1000).u8(b'a');
        let bytes = p.into_bytes();
        assert_matches!(Unpacker::new(&bytes).string(), Err(DecodeError::CountTooLarge { .. }));
    }

    #[test]
    fn invalid_utf8() {
        let mut p = Packer::new();
        p.u32(2).u8(0xc3).u8(0x28);
        let bytes = p.into_bytes();
        assert_eq!(Unpacker::new(&bytes).string(), Err(DecodeError::InvalidUtf8));
    }

    #[test]
    fn trailing_bytes() {
        let u = Unpacker::new(&[1, 2]);
        assert_eq!(u.finish(), Err(DecodeError::TrailingBytes(2)));
    }
}
