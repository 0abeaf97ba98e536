//! Readers layered on top of a [`ByteSource`].
//!
//! [`Reader`] reads big-endian integers from the source and forwards
//! diagnostics to the sink, [`BitBuffer`] reads packet headers with bit
//! stuffing and [`SliceReader`] parses marker segments and box payloads
//! that were read into memory.

use core::fmt;

use crate::diagnostics::{DiagnosticSink, Severity};
use crate::error::{DecodingError, Result, bail};
use crate::j2c::markers;
use crate::source::ByteSource;

/// The upper bound for the initial allocation when reading a block of bytes
/// whose length comes from the stream.
const MAX_PREALLOCATION: usize = 1 << 16;

pub(crate) struct Reader<'a> {
    source: &'a mut dyn ByteSource,
    sink: &'a mut dyn DiagnosticSink,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(source: &'a mut dyn ByteSource, sink: &'a mut dyn DiagnosticSink) -> Self {
        Self { source, sink }
    }

    #[inline]
    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        match self.source.get_byte() {
            Some(byte) => Ok(byte),
            None => Err(DecodingError::UnexpectedEof.into()),
        }
    }

    #[inline]
    pub(crate) fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes([self.read_u8()?, self.read_u8()?]))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes([
            self.read_u8()?,
            self.read_u8()?,
            self.read_u8()?,
            self.read_u8()?,
        ]))
    }

    /// Read a big-endian number that is `num_bytes` wide, sign-extending it
    /// if `signed` is set.
    pub(crate) fn read_n_bytes(&mut self, num_bytes: u8, signed: bool) -> Result<i32> {
        let mut value = 0_u32;

        for _ in 0..num_bytes {
            value = (value << 8) | self.read_u8()? as u32;
        }

        Ok(sign_extend(value, num_bytes, signed))
    }

    /// Read exactly `len` bytes into a new buffer.
    pub(crate) fn read_bytes(&mut self, len: u64) -> Result<Vec<u8>> {
        let len = usize::try_from(len).map_err(|_| DecodingError::UnexpectedEof)?;
        let mut data = Vec::with_capacity(len.min(MAX_PREALLOCATION));
        let mut chunk = [0_u8; 4096];

        while data.len() < len {
            let wanted = (len - data.len()).min(chunk.len());
            let read = self.source.read_into(&mut chunk[..wanted]);
            data.extend_from_slice(&chunk[..read]);

            if read < wanted {
                bail!(DecodingError::UnexpectedEof);
            }
        }

        Ok(data)
    }

    #[inline]
    pub(crate) fn look(&mut self, offset: usize) -> Option<u8> {
        self.source.look_byte(offset)
    }

    pub(crate) fn discard(&mut self, n: u64) -> u64 {
        self.source.discard(n)
    }

    pub(crate) fn position(&self) -> u64 {
        self.source.position()
    }

    pub(crate) fn report(&mut self, severity: Severity, message: fmt::Arguments<'_>) {
        let position = self.source.position();
        self.sink.report(severity, Some(position), message);
    }

    pub(crate) fn sink(&mut self) -> &mut dyn DiagnosticSink {
        &mut *self.sink
    }
}

fn sign_extend(value: u32, num_bytes: u8, signed: bool) -> i32 {
    let bits = num_bytes as u32 * 8;

    if signed && bits > 0 && bits < 32 && value & (1 << (bits - 1)) != 0 {
        (value | (u32::MAX << bits)) as i32
    } else {
        value as i32
    }
}

/// A bit-level reader for packet headers, described in B.10.1.
///
/// After a 0xFF byte, the most significant bit of the next byte is a stuffed
/// zero bit and is skipped. The buffer also tracks how many bytes of the
/// current tile-part are left.
pub(crate) struct BitBuffer<'r, 'a> {
    reader: &'r mut Reader<'a>,
    buf: u64,
    len: u32,
    skip: bool,
    byte_count: u64,
}

impl<'r, 'a> BitBuffer<'r, 'a> {
    pub(crate) fn new(reader: &'r mut Reader<'a>, byte_count: u64) -> Self {
        Self {
            reader,
            buf: 0,
            len: 0,
            skip: false,
            byte_count,
        }
    }

    /// Read `n` bits, with `n` at most 32.
    pub(crate) fn read_bits(&mut self, n: u32) -> Result<u32> {
        debug_assert!(n <= 32);

        while self.len < n {
            if self.byte_count == 0 {
                bail!(DecodingError::PacketOverrun);
            }

            let byte = self.reader.read_u8()?;
            self.byte_count -= 1;

            if self.skip {
                self.buf = (self.buf << 7) | (byte & 0x7f) as u64;
                self.len += 7;
            } else {
                self.buf = (self.buf << 8) | byte as u64;
                self.len += 8;
            }

            self.skip = byte == 0xff;
        }

        self.len -= n;

        Ok(((self.buf >> self.len) & ((1_u64 << n) - 1)) as u32)
    }

    #[inline]
    pub(crate) fn read_bit(&mut self) -> Result<u32> {
        self.read_bits(1)
    }

    /// Skip an SOP marker segment (A.8.1) at the start of a packet, if there
    /// is one.
    pub(crate) fn skip_sop(&mut self) {
        if self.byte_count >= 6
            && self.reader.look(0) == Some(0xff)
            && self.reader.look(1) == Some(markers::SOP)
        {
            self.byte_count -= self.reader.discard(6);
            self.len = 0;
            self.skip = false;
        }
    }

    /// Skip an EPH marker (A.8.2) at the end of a packet header, if there is
    /// one.
    pub(crate) fn skip_eph(&mut self) {
        let k = self.skip as usize;

        if self.byte_count >= k as u64 + 2
            && self.reader.look(k) == Some(0xff)
            && self.reader.look(k + 1) == Some(markers::EPH)
        {
            self.byte_count -= self.reader.discard(k as u64 + 2);
            self.len = 0;
            self.skip = false;
        }
    }

    /// Finish reading the packet header and return the number of bytes left
    /// in the tile-part.
    pub(crate) fn finish(self) -> u64 {
        let mut byte_count = self.byte_count;

        if self.skip && byte_count > 0 && self.reader.read_u8().is_ok() {
            byte_count -= 1;
        }

        byte_count
    }
}

/// A small reader over an in-memory buffer, used for marker segments and
/// box payloads.
#[derive(Debug, Clone)]
pub(crate) struct SliceReader<'a> {
    data: &'a [u8],
    cur_pos: usize,
}

impl<'a> SliceReader<'a> {
    #[inline]
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, cur_pos: 0 }
    }

    #[inline]
    pub(crate) fn read_u8(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.cur_pos)?;
        self.cur_pos += 1;
        Some(byte)
    }

    #[inline]
    pub(crate) fn read_i8(&mut self) -> Option<i8> {
        self.read_u8().map(|b| b as i8)
    }

    pub(crate) fn read_u16(&mut self) -> Option<u16> {
        Some(u16::from_be_bytes(self.read_array()?))
    }

    pub(crate) fn read_u32(&mut self) -> Option<u32> {
        Some(u32::from_be_bytes(self.read_array()?))
    }

    pub(crate) fn read_n_bytes(&mut self, num_bytes: u8, signed: bool) -> Option<i32> {
        let mut value = 0_u32;

        for _ in 0..num_bytes {
            value = (value << 8) | self.read_u8()? as u32;
        }

        Some(sign_extend(value, num_bytes, signed))
    }

    fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.cur_pos..self.cur_pos + N)?;
        self.cur_pos += N;
        bytes.try_into().ok()
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.cur_pos
    }

    #[inline]
    pub(crate) fn at_end(&self) -> bool {
        self.remaining() == 0
    }
}
