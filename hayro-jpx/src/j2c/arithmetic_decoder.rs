//! The MQ arithmetic decoder, described in Annex C.
//!
//! The register layout follows the software conventions from Annex G of
//! <https://www.itu.int/rec/T-REC-T.88-201808-I>, where the C-register holds
//! the complemented code bytes. This is equivalent to the decoder in C.3,
//! but needs fewer operations per decoded bit.

/// The adaptive state of a single context.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ArithmeticDecoderContext {
    /// Index into the probability estimation table.
    pub(crate) index: u8,
    /// The sense of the more probable symbol.
    pub(crate) mps: u8,
}

impl ArithmeticDecoderContext {
    pub(crate) const fn with_index(index: u8) -> Self {
        Self { index, mps: 0 }
    }
}

pub(crate) struct ArithmeticDecoder<'a> {
    data: &'a [u8],
    /// Position of the byte that was loaded last.
    pos: usize,
    /// The C-register.
    c: u32,
    /// The A-register.
    a: u32,
    /// Number of bits left in the low part of the C-register.
    ct: u32,
}

impl<'a> ArithmeticDecoder<'a> {
    /// Create a new decoder and run the INITDEC procedure on `data`.
    pub(crate) fn new(data: &'a [u8]) -> Self {
        let mut decoder = Self {
            data,
            pos: 0,
            c: 0,
            a: 0,
            ct: 0,
        };

        decoder.c = ((decoder.byte_at(0) ^ 0xff) as u32) << 16;
        decoder.byte_in();
        decoder.c <<= 7;
        decoder.ct -= 7;
        decoder.a = 0x8000;

        decoder
    }

    /// Decode a single decision with the given context (DECODE, C.3.2).
    #[inline(always)]
    pub(crate) fn decode(&mut self, cx: &mut ArithmeticDecoderContext) -> u32 {
        let entry = &QE_TABLE[cx.index as usize];
        let qe = entry.qe as u32;
        self.a -= qe;

        let symbol;

        if (self.c >> 16) < self.a {
            if self.a & 0x8000 != 0 {
                return cx.mps as u32;
            }

            // MPS_EXCHANGE
            if self.a < qe {
                symbol = 1 - cx.mps;
                if entry.switch {
                    cx.mps = 1 - cx.mps;
                }
                cx.index = entry.nlps;
            } else {
                symbol = cx.mps;
                cx.index = entry.nmps;
            }
        } else {
            self.c -= self.a << 16;

            // LPS_EXCHANGE
            if self.a < qe {
                symbol = cx.mps;
                cx.index = entry.nmps;
            } else {
                symbol = 1 - cx.mps;
                if entry.switch {
                    cx.mps = 1 - cx.mps;
                }
                cx.index = entry.nlps;
            }

            self.a = qe;
        }

        self.renormalize();

        symbol as u32
    }

    /// RENORMD, C.3.3.
    #[inline(always)]
    fn renormalize(&mut self) {
        loop {
            if self.ct == 0 {
                self.byte_in();
            }

            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;

            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    /// BYTEIN, C.3.4.
    #[inline(always)]
    fn byte_in(&mut self) {
        if self.byte_at(self.pos) == 0xff {
            if self.byte_at(self.pos + 1) > 0x8f {
                // A marker (or the end of the segment). Feed 1-bits.
                self.ct = 8;
            } else {
                self.pos += 1;
                self.c = self.c + 0xfe00 - ((self.byte_at(self.pos) as u32) << 9);
                self.ct = 7;
            }
        } else {
            self.pos += 1;
            self.c = self.c + 0xff00 - ((self.byte_at(self.pos) as u32) << 8);
            self.ct = 8;
        }
    }

    /// The byte at `pos`. The segment is padded with 0xFF bytes, as required
    /// by C.3.4.
    #[inline(always)]
    fn byte_at(&self, pos: usize) -> u8 {
        self.data.get(pos).copied().unwrap_or(0xff)
    }
}

#[derive(Debug, Clone, Copy)]
struct QeEntry {
    qe: u16,
    nmps: u8,
    nlps: u8,
    switch: bool,
}

const fn qe(qe: u16, nmps: u8, nlps: u8, switch: bool) -> QeEntry {
    QeEntry {
        qe,
        nmps,
        nlps,
        switch,
    }
}

/// Probability estimation table, Table C.2.
#[rustfmt::skip]
static QE_TABLE: [QeEntry; 47] = [
    qe(0x5601, 1, 1, true), qe(0x3401, 2, 6, false), qe(0x1801, 3, 9, false),
    qe(0x0AC1, 4, 12, false), qe(0x0521, 5, 29, false), qe(0x0221, 38, 33, false),
    qe(0x5601, 7, 6, true), qe(0x5401, 8, 14, false), qe(0x4801, 9, 14, false),
    qe(0x3801, 10, 14, false), qe(0x3001, 11, 17, false), qe(0x2401, 12, 18, false),
    qe(0x1C01, 13, 20, false), qe(0x1601, 29, 21, false), qe(0x5601, 15, 14, true),
    qe(0x5401, 16, 14, false), qe(0x5101, 17, 15, false), qe(0x4801, 18, 16, false),
    qe(0x3801, 19, 17, false), qe(0x3401, 20, 18, false), qe(0x3001, 21, 19, false),
    qe(0x2801, 22, 19, false), qe(0x2401, 23, 20, false), qe(0x2201, 24, 21, false),
    qe(0x1C01, 25, 22, false), qe(0x1801, 26, 23, false), qe(0x1601, 27, 24, false),
    qe(0x1401, 28, 25, false), qe(0x1201, 29, 26, false), qe(0x1101, 30, 27, false),
    qe(0x0AC1, 31, 28, false), qe(0x09C1, 32, 29, false), qe(0x08A1, 33, 30, false),
    qe(0x0521, 34, 31, false), qe(0x0441, 35, 32, false), qe(0x02A1, 36, 33, false),
    qe(0x0221, 37, 34, false), qe(0x0141, 38, 35, false), qe(0x0111, 39, 36, false),
    qe(0x0085, 40, 37, false), qe(0x0049, 41, 38, false), qe(0x0025, 42, 39, false),
    qe(0x0015, 43, 40, false), qe(0x0009, 44, 41, false), qe(0x0005, 45, 42, false),
    qe(0x0001, 45, 43, false), qe(0x5601, 46, 46, false),
];
