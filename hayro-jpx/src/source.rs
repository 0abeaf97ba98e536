//! Byte sources the decoder pulls its input from.

use std::collections::VecDeque;
use std::io::{self, BufReader, Read, Seek, SeekFrom};

/// A resettable source of bytes with a small lookahead window.
///
/// The decoder always starts reading from the beginning of the source, which
/// is why [`ByteSource::reset`] exists: decoding the image after querying
/// its parameters rewinds the source instead of relying on the caller.
pub trait ByteSource {
    /// Consume the next byte. Returns `None` at the end of the data.
    fn get_byte(&mut self) -> Option<u8>;

    /// Return the byte `offset` positions ahead of the current one without
    /// consuming anything.
    fn look_byte(&mut self, offset: usize) -> Option<u8>;

    /// Skip up to `n` bytes, returning how many were actually skipped.
    fn discard(&mut self, n: u64) -> u64 {
        let mut skipped = 0;

        while skipped < n && self.get_byte().is_some() {
            skipped += 1;
        }

        skipped
    }

    /// Fill `buf` with the next bytes, returning how many were read.
    fn read_into(&mut self, buf: &mut [u8]) -> usize {
        for (i, slot) in buf.iter_mut().enumerate() {
            match self.get_byte() {
                Some(byte) => *slot = byte,
                None => return i,
            }
        }

        buf.len()
    }

    /// Rewind to the first byte.
    fn reset(&mut self);

    /// Release any resources held by the source. The default does nothing.
    fn close(&mut self) {}

    /// The number of bytes consumed since the last reset.
    fn position(&self) -> u64;
}

impl<T: ByteSource + ?Sized> ByteSource for &mut T {
    fn get_byte(&mut self) -> Option<u8> {
        (**self).get_byte()
    }

    fn look_byte(&mut self, offset: usize) -> Option<u8> {
        (**self).look_byte(offset)
    }

    fn discard(&mut self, n: u64) -> u64 {
        (**self).discard(n)
    }

    fn read_into(&mut self, buf: &mut [u8]) -> usize {
        (**self).read_into(buf)
    }

    fn reset(&mut self) {
        (**self).reset();
    }

    fn close(&mut self) {
        (**self).close();
    }

    fn position(&self) -> u64 {
        (**self).position()
    }
}

/// A byte source backed by an in-memory buffer.
#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    /// Create a new source reading from `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl ByteSource for SliceSource<'_> {
    #[inline]
    fn get_byte(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    #[inline]
    fn look_byte(&mut self, offset: usize) -> Option<u8> {
        self.data.get(self.pos.checked_add(offset)?).copied()
    }

    fn discard(&mut self, n: u64) -> u64 {
        let available = self.data.len() - self.pos;
        let skipped = usize::try_from(n).unwrap_or(usize::MAX).min(available);
        self.pos += skipped;
        skipped as u64
    }

    fn read_into(&mut self, buf: &mut [u8]) -> usize {
        let available = &self.data[self.pos..];
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        n
    }

    fn reset(&mut self) {
        self.pos = 0;
    }

    fn position(&self) -> u64 {
        self.pos as u64
    }
}

/// A byte source backed by a seekable reader.
///
/// The source remembers the position of the reader when it was created and
/// rewinds to it on [`ByteSource::reset`]. I/O errors are treated like the
/// end of the data.
#[derive(Debug)]
pub struct ReadSource<R: Read + Seek> {
    inner: BufReader<R>,
    lookahead: VecDeque<u8>,
    start: u64,
    position: u64,
    failed: bool,
}

impl<R: Read + Seek> ReadSource<R> {
    /// Create a new source reading from `reader`, starting at its current
    /// position.
    pub fn new(mut reader: R) -> io::Result<Self> {
        let start = reader.stream_position()?;

        Ok(Self {
            inner: BufReader::new(reader),
            lookahead: VecDeque::new(),
            start,
            position: 0,
            failed: false,
        })
    }

    /// Unwrap the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }

    fn fetch(&mut self) -> Option<u8> {
        if self.failed {
            return None;
        }

        let mut byte = [0_u8; 1];

        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return None,
                Ok(_) => return Some(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => {
                    self.failed = true;
                    return None;
                }
            }
        }
    }
}

impl<R: Read + Seek> ByteSource for ReadSource<R> {
    fn get_byte(&mut self) -> Option<u8> {
        let byte = match self.lookahead.pop_front() {
            Some(byte) => byte,
            None => self.fetch()?,
        };
        self.position += 1;

        Some(byte)
    }

    fn look_byte(&mut self, offset: usize) -> Option<u8> {
        while self.lookahead.len() <= offset {
            let byte = self.fetch()?;
            self.lookahead.push_back(byte);
        }

        self.lookahead.get(offset).copied()
    }

    fn discard(&mut self, n: u64) -> u64 {
        let from_lookahead = usize::try_from(n)
            .unwrap_or(usize::MAX)
            .min(self.lookahead.len());
        self.lookahead.drain(..from_lookahead);
        let mut skipped = from_lookahead as u64;

        if skipped < n && !self.failed {
            match io::copy(&mut (&mut self.inner).take(n - skipped), &mut io::sink()) {
                Ok(copied) => skipped += copied,
                Err(_) => self.failed = true,
            }
        }

        self.position += skipped;
        skipped
    }

    fn reset(&mut self) {
        self.lookahead.clear();
        self.position = 0;
        self.failed = self.inner.seek(SeekFrom::Start(self.start)).is_err();
    }

    fn position(&self) -> u64 {
        self.position
    }
}
