//! ## driftnet-protocols::cursor
//! Sequential, bounds-checked reader over a byte window.
//!
//! Offsets reported by a cursor are absolute within the packet it was cut
//! from, so errors raised deep inside a set still point at the right byte.

use std::net::{Ipv4Addr, Ipv6Addr};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("buffer underrun at offset {offset}: needed {needed} bytes, {available} available")]
pub struct Underrun {
    pub offset: usize,
    pub needed: usize,
    pub available: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_offset(buf, 0)
    }

    /// Cursor over `buf`, which starts at absolute offset `base`.
    pub fn with_offset(buf: &'a [u8], base: usize) -> Self {
        Self { buf, pos: 0, base }
    }

    /// Absolute offset of the next unread byte.
    #[inline]
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], Underrun> {
        let available = self.remaining();
        if len > available {
            return Err(Underrun {
                offset: self.offset(),
                needed: len,
                available,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Splits off the next `len` bytes as a cursor of their own and advances
    /// past them.
    pub fn sub_cursor(&mut self, len: usize) -> Result<Cursor<'a>, Underrun> {
        let base = self.offset();
        let buf = self.take(len)?;
        Ok(Cursor { buf, pos: 0, base })
    }

    pub fn skip(&mut self, len: usize) -> Result<(), Underrun> {
        self.take(len).map(|_| ())
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Underrun> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, Underrun> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, Underrun> {
        self.read_array().map(u16::from_be_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, Underrun> {
        self.read_array().map(u32::from_be_bytes)
    }

    pub fn read_u64(&mut self) -> Result<u64, Underrun> {
        self.read_array().map(u64::from_be_bytes)
    }

    pub fn read_ipv4(&mut self) -> Result<Ipv4Addr, Underrun> {
        self.read_array::<4>().map(Ipv4Addr::from)
    }

    pub fn read_ipv6(&mut self) -> Result<Ipv6Addr, Underrun> {
        self.read_array::<16>().map(Ipv6Addr::from)
    }

    pub fn read_mac(&mut self) -> Result<[u8; 6], Underrun> {
        self.read_array()
    }

    /// The unread tail, without advancing.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}
