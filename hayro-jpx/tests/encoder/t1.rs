//! Bit-plane coding of code-blocks (Annex D).
//!
//! The encoder keeps the same state the decoder builds up: the coefficients
//! as far as they are known to the decoder and the flags of coefficients
//! visited in the current bit-plane. Contexts are formed from that state, so
//! both sides always agree on them.

use super::mq::{Context, MqEncoder, RawEncoder};

const RUN_LENGTH_CONTEXT: usize = 17;
const UNIFORM_CONTEXT: usize = 18;

#[rustfmt::skip]
static SIGNIFICANCE_CONTEXT: [[[[u8; 3]; 5]; 3]; 3] = [
    [
        [[0, 0, 0], [1, 1, 3], [2, 2, 6], [2, 2, 8], [2, 2, 8]],
        [[5, 3, 1], [6, 3, 4], [6, 3, 7], [6, 3, 8], [6, 3, 8]],
        [[8, 4, 2], [8, 4, 5], [8, 4, 7], [8, 4, 8], [8, 4, 8]],
    ],
    [
        [[3, 5, 1], [3, 6, 4], [3, 6, 7], [3, 6, 8], [3, 6, 8]],
        [[7, 7, 2], [7, 7, 5], [7, 7, 7], [7, 7, 8], [7, 7, 8]],
        [[8, 7, 2], [8, 7, 5], [8, 7, 7], [8, 7, 8], [8, 7, 8]],
    ],
    [
        [[4, 8, 2], [4, 8, 5], [4, 8, 7], [4, 8, 8], [4, 8, 8]],
        [[7, 8, 2], [7, 8, 5], [7, 8, 7], [7, 8, 8], [7, 8, 8]],
        [[8, 8, 2], [8, 8, 5], [8, 8, 7], [8, 8, 8], [8, 8, 8]],
    ],
];

#[rustfmt::skip]
static SIGN_CONTEXT: [[(u8, u32); 5]; 5] = [
    [(13, 1), (13, 1), (12, 1), (11, 1), (11, 1)],
    [(13, 1), (13, 1), (12, 1), (11, 1), (11, 1)],
    [(10, 1), (10, 1), (9, 0), (10, 0), (10, 0)],
    [(11, 0), (11, 0), (12, 0), (13, 0), (13, 0)],
    [(11, 0), (11, 0), (12, 0), (13, 0), (13, 0)],
];

/// The code-block style flags of the COD marker.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BlockStyle {
    pub(crate) bypass: bool,
    pub(crate) reset: bool,
    pub(crate) terminate_each_pass: bool,
    pub(crate) vertically_causal: bool,
    pub(crate) segmentation_symbols: bool,
}

impl BlockStyle {
    pub(crate) fn to_u8(self) -> u8 {
        self.bypass as u8
            | (self.reset as u8) << 1
            | (self.terminate_each_pass as u8) << 2
            | (self.vertically_causal as u8) << 3
            | (self.segmentation_symbols as u8) << 5
    }

    pub(crate) fn segment_index(self, pass: u32) -> u32 {
        if self.terminate_each_pass {
            pass
        } else if self.bypass && pass >= 10 {
            let offset = pass - 10;
            1 + 2 * (offset / 3) + (offset % 3 == 2) as u32
        } else {
            0
        }
    }

    fn is_raw(self, pass: u32) -> bool {
        self.bypass && pass >= 10 && (pass - 10) % 3 != 2
    }
}

/// A terminated codeword segment.
#[derive(Debug, Clone)]
pub(crate) struct Segment {
    pub(crate) coding_passes: u32,
    pub(crate) data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub(crate) struct CodedBlock {
    pub(crate) missing_bit_planes: u32,
    pub(crate) coding_passes: u32,
    pub(crate) segments: Vec<Segment>,
}

enum Coder {
    Mq(MqEncoder),
    Raw(RawEncoder),
}

impl Coder {
    fn finish(self) -> Vec<u8> {
        match self {
            Self::Mq(e) => e.finish(),
            Self::Raw(e) => e.finish(),
        }
    }
}

struct BlockEncoder {
    magnitudes: Vec<u32>,
    negative: Vec<bool>,
    /// The coefficients as the decoder sees them.
    known: Vec<i32>,
    touched: Vec<bool>,
    width: u32,
    height: u32,
    class: usize,
    style: BlockStyle,
    contexts: [Context; 19],
    coder: Coder,
}

struct Neighbourhood {
    horizontal: usize,
    vertical: usize,
    diagonal: usize,
    horizontal_sign: usize,
    vertical_sign: usize,
}

/// Encode the coefficients of a code-block, given row by row.
///
/// `class` is the significance context column of the sub-band: 0 for HL, 1
/// for LL and LH, 2 for HH. `magnitude_bits` is the number of magnitude
/// bit-planes of the sub-band.
pub(crate) fn encode_block(
    coefficients: &[i32],
    width: u32,
    height: u32,
    class: usize,
    magnitude_bits: u32,
    style: BlockStyle,
) -> CodedBlock {
    let max = coefficients.iter().map(|c| c.unsigned_abs()).max().unwrap_or(0);
    let planes = 32 - max.leading_zeros();
    let mut segments = vec![];

    if planes == 0 {
        return CodedBlock {
            missing_bit_planes: magnitude_bits,
            coding_passes: 0,
            segments,
        };
    }

    let coding_passes = 3 * planes - 2;

    let mut encoder = BlockEncoder {
        magnitudes: coefficients.iter().map(|c| c.unsigned_abs()).collect(),
        negative: coefficients.iter().map(|c| *c < 0).collect(),
        known: vec![0; coefficients.len()],
        touched: vec![false; coefficients.len()],
        width,
        height,
        class,
        style,
        contexts: initial_contexts(),
        coder: Coder::Mq(MqEncoder::new()),
    };

    let mut segment_passes = 0;

    for pass in 0..coding_passes {
        if pass > 0 && style.segment_index(pass) != style.segment_index(pass - 1) {
            let next = if style.is_raw(pass) {
                Coder::Raw(RawEncoder::new())
            } else {
                Coder::Mq(MqEncoder::new())
            };
            let done = core::mem::replace(&mut encoder.coder, next);
            segments.push(Segment {
                coding_passes: segment_passes,
                data: done.finish(),
            });
            segment_passes = 0;
        }

        // Pass 0 is the cleanup pass of the most significant bit-plane.
        let plane = planes - 1 - (pass + 2) / 3;

        match pass % 3 {
            0 => encoder.cleanup(plane),
            1 => encoder.significance_propagation(plane),
            _ => encoder.magnitude_refinement(plane),
        }

        if style.reset {
            encoder.contexts = initial_contexts();
        }

        segment_passes += 1;
    }

    let coder = core::mem::replace(&mut encoder.coder, Coder::Raw(RawEncoder::new()));
    segments.push(Segment {
        coding_passes: segment_passes,
        data: coder.finish(),
    });

    CodedBlock {
        missing_bit_planes: magnitude_bits - planes,
        coding_passes,
        segments,
    }
}

fn initial_contexts() -> [Context; 19] {
    let mut contexts = [Context::default(); 19];
    contexts[0] = Context::with_index(4);
    contexts[RUN_LENGTH_CONTEXT] = Context::with_index(3);
    contexts[UNIFORM_CONTEXT] = Context::with_index(46);
    contexts
}

impl BlockEncoder {
    fn idx(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    fn at(&self, x: u32, y: u32) -> i32 {
        self.known[self.idx(x, y)]
    }

    fn bit(&self, x: u32, y: u32, plane: u32) -> u32 {
        (self.magnitudes[self.idx(x, y)] >> plane) & 1
    }

    fn emit(&mut self, bit: u32, context: usize) {
        match &mut self.coder {
            Coder::Mq(e) => e.encode(bit, &mut self.contexts[context]),
            Coder::Raw(e) => e.encode(bit),
        }
    }

    fn emit_sign(&mut self, x: u32, y: u32, horizontal_sign: usize, vertical_sign: usize) {
        let idx = self.idx(x, y);
        let negative = self.negative[idx] as u32;
        let (context, xor_bit) = SIGN_CONTEXT[horizontal_sign][vertical_sign];

        match &mut self.coder {
            Coder::Mq(e) => e.encode(negative ^ xor_bit, &mut self.contexts[context as usize]),
            Coder::Raw(e) => e.encode(negative),
        }

        self.known[idx] = if negative == 1 { -1 } else { 1 };
    }

    fn below_visible(&self, y: u32) -> bool {
        y + 1 < self.height && !(self.style.vertically_causal && y % 4 == 3)
    }

    fn neighbourhood(&self, x: u32, y: u32) -> Neighbourhood {
        let mut n = Neighbourhood {
            horizontal: 0,
            vertical: 0,
            diagonal: 0,
            horizontal_sign: 2,
            vertical_sign: 2,
        };

        let above = y > 0;
        let below = self.below_visible(y);

        let add = |count: &mut usize, sign: &mut usize, value: i32| {
            if value != 0 {
                *count += 1;
                if value < 0 {
                    *sign -= 1;
                } else {
                    *sign += 1;
                }
            }
        };

        if x > 0 {
            add(&mut n.horizontal, &mut n.horizontal_sign, self.at(x - 1, y));
            n.diagonal += (above && self.at(x - 1, y - 1) != 0) as usize;
            n.diagonal += (below && self.at(x - 1, y + 1) != 0) as usize;
        }

        if x + 1 < self.width {
            add(&mut n.horizontal, &mut n.horizontal_sign, self.at(x + 1, y));
            n.diagonal += (above && self.at(x + 1, y - 1) != 0) as usize;
            n.diagonal += (below && self.at(x + 1, y + 1) != 0) as usize;
        }

        if above {
            add(&mut n.vertical, &mut n.vertical_sign, self.at(x, y - 1));
        }

        if below {
            add(&mut n.vertical, &mut n.vertical_sign, self.at(x, y + 1));
        }

        n
    }

    fn significance_context(&self, n: &Neighbourhood) -> usize {
        SIGNIFICANCE_CONTEXT[n.horizontal][n.vertical][n.diagonal][self.class] as usize
    }

    fn column_is_quiet(&self, x: u32, y0: u32) -> bool {
        let x_start = x.saturating_sub(1);
        let x_end = (x + 1).min(self.width - 1);

        if (0..4).any(|dy| self.touched[self.idx(x, y0 + dy)]) {
            return false;
        }

        if y0 > 0 && (x_start..=x_end).any(|xx| self.at(xx, y0 - 1) != 0) {
            return false;
        }

        for dy in 0..4 {
            if x > 0 && self.at(x - 1, y0 + dy) != 0 {
                return false;
            }

            if x + 1 < self.width && self.at(x + 1, y0 + dy) != 0 {
                return false;
            }
        }

        !(!self.style.vertically_causal
            && y0 + 4 < self.height
            && (x_start..=x_end).any(|xx| self.at(xx, y0 + 4) != 0))
    }

    fn stripe_columns(&self) -> Vec<(u32, u32)> {
        (0..self.height)
            .step_by(4)
            .flat_map(|y0| (0..self.width).map(move |x| (x, y0)))
            .collect()
    }

    fn significance_propagation(&mut self, plane: u32) {
        for (x, y0) in self.stripe_columns() {
            for y in y0..(y0 + 4).min(self.height) {
                if self.at(x, y) != 0 {
                    continue;
                }

                let n = self.neighbourhood(x, y);
                let context = self.significance_context(&n);

                if context != 0 {
                    let bit = self.bit(x, y, plane);
                    self.emit(bit, context);

                    if bit == 1 {
                        self.emit_sign(x, y, n.horizontal_sign, n.vertical_sign);
                    }

                    let idx = self.idx(x, y);
                    self.touched[idx] = true;
                }
            }
        }
    }

    fn magnitude_refinement(&mut self, plane: u32) {
        for (x, y0) in self.stripe_columns() {
            for y in y0..(y0 + 4).min(self.height) {
                let idx = self.idx(x, y);
                let value = self.known[idx];

                if value == 0 || self.touched[idx] {
                    continue;
                }

                let context = if value.abs() == 1 {
                    let n = self.neighbourhood(x, y);
                    if n.horizontal + n.vertical + n.diagonal > 0 {
                        15
                    } else {
                        14
                    }
                } else {
                    16
                };

                let bit = self.bit(x, y, plane);
                self.emit(bit, context);

                let bit = bit as i32;
                self.known[idx] = if value < 0 {
                    (value << 1) - bit
                } else {
                    (value << 1) + bit
                };
                self.touched[idx] = true;
            }
        }
    }

    fn cleanup(&mut self, plane: u32) {
        for (x, y0) in self.stripe_columns() {
            let mut start = y0;

            if y0 + 3 < self.height && self.column_is_quiet(x, y0) {
                let first = (0..4).find(|dy| self.bit(x, y0 + dy, plane) == 1);

                let Some(offset) = first else {
                    self.emit(0, RUN_LENGTH_CONTEXT);
                    continue;
                };

                self.emit(1, RUN_LENGTH_CONTEXT);
                self.emit(offset >> 1, UNIFORM_CONTEXT);
                self.emit(offset & 1, UNIFORM_CONTEXT);
                self.emit_sign(x, y0 + offset, 2, 2);
                start = y0 + offset + 1;
            }

            for y in start..(y0 + 4).min(self.height) {
                let idx = self.idx(x, y);

                if self.touched[idx] {
                    self.touched[idx] = false;
                    continue;
                }

                let n = self.neighbourhood(x, y);
                let context = self.significance_context(&n);
                let bit = self.bit(x, y, plane);
                self.emit(bit, context);

                if bit == 1 {
                    self.emit_sign(x, y, n.horizontal_sign, n.vertical_sign);
                }
            }
        }

        if self.style.segmentation_symbols {
            for bit in [1, 0, 1, 0] {
                self.emit(bit, UNIFORM_CONTEXT);
            }
        }
    }
}
