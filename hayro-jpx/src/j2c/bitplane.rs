//! Bit-plane decoding of code-blocks, described in Annex D.
//!
//! Coefficients are kept as signed integers whose magnitude grows by one bit
//! with every magnitude refinement. A coefficient is significant as soon as
//! it is non-zero. The `touched` flags mark coefficients that were visited by
//! a significance propagation or magnitude refinement pass of the current
//! bit-plane. They are cleared by the cleanup pass, so after decoding they
//! tell which coefficients have one more decoded bit-plane than the rest.

use super::arithmetic_decoder::{ArithmeticDecoder, ArithmeticDecoderContext};
use super::codestream::CodeBlockStyle;
use super::packet::is_raw_pass;
use super::tile::{CodeBlock, SubBandType};
use crate::diagnostics::{DiagnosticSink, Severity};

const RUN_LENGTH_CONTEXT: usize = 17;
const UNIFORM_CONTEXT: usize = 18;

/// Context labels for the significance decision (Table D.1), indexed by the
/// number of significant horizontal, vertical and diagonal neighbours and
/// the context class of the sub-band (HL, LL/LH, HH).
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

/// Context label and XOR bit for sign decoding (Table D.3), indexed by
/// `2 + sum of horizontal signs` and `2 + sum of vertical signs`, where a
/// positive neighbour counts as 1 and a negative one as -1.
#[rustfmt::skip]
static SIGN_CONTEXT: [[(u8, u32); 5]; 5] = [
    [(13, 1), (13, 1), (12, 1), (11, 1), (11, 1)],
    [(13, 1), (13, 1), (12, 1), (11, 1), (11, 1)],
    [(10, 1), (10, 1), (9, 0), (10, 0), (10, 0)],
    [(11, 0), (11, 0), (12, 0), (13, 0), (13, 0)],
    [(11, 0), (11, 0), (12, 0), (13, 0), (13, 0)],
];

/// The source of decisions for a coding pass: either the MQ decoder or raw
/// bits in bypass mode.
pub(crate) trait BitDecoder {
    fn read_bit(&mut self, context: &mut ArithmeticDecoderContext) -> u32;

    /// Decode a sign bit. Returns 1 for negative coefficients.
    fn read_sign(&mut self, context: &mut ArithmeticDecoderContext, xor_bit: u32) -> u32 {
        self.read_bit(context) ^ xor_bit
    }
}

impl BitDecoder for ArithmeticDecoder<'_> {
    #[inline(always)]
    fn read_bit(&mut self, context: &mut ArithmeticDecoderContext) -> u32 {
        self.decode(context)
    }
}

/// Raw (bypass) decoding of significance propagation and magnitude
/// refinement passes (D.6).
///
/// Bits are read from the most significant one down. A byte following 0xFF
/// only contributes its 7 low bits. Past the end of the data, 1-bits are
/// returned.
pub(crate) struct RawDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    c: u8,
    ct: u32,
}

impl<'a> RawDecoder<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            c: 0,
            ct: 0,
        }
    }

    fn next_bit(&mut self) -> u32 {
        if self.ct == 0 {
            let next = self.data.get(self.pos).copied().unwrap_or(0xff);

            if self.c == 0xff && next > 0x8f {
                self.c = 0xff;
                self.ct = 8;
            } else {
                self.ct = if self.c == 0xff { 7 } else { 8 };
                self.c = next;
                self.pos += 1;
            }
        }

        self.ct -= 1;

        ((self.c >> self.ct) & 1) as u32
    }
}

impl BitDecoder for RawDecoder<'_> {
    #[inline]
    fn read_bit(&mut self, _: &mut ArithmeticDecoderContext) -> u32 {
        self.next_bit()
    }

    #[inline]
    fn read_sign(&mut self, _: &mut ArithmeticDecoderContext, _: u32) -> u32 {
        self.next_bit()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PassType {
    SignificancePropagation,
    MagnitudeRefinement,
    Cleanup,
}

impl PassType {
    /// The first pass is a cleanup pass, all following bit-planes consist of
    /// the three passes in this order.
    fn of(pass: u32) -> Self {
        if pass == 0 {
            return Self::Cleanup;
        }

        match (pass - 1) % 3 {
            0 => Self::SignificancePropagation,
            1 => Self::MagnitudeRefinement,
            _ => Self::Cleanup,
        }
    }
}

/// The state of decoding a single code-block. Can be reused for
/// code-blocks of any size.
pub(crate) struct CodeBlockDecodeContext {
    coefficients: Vec<i32>,
    touched: Vec<u8>,
    width: u32,
    height: u32,
    vertically_causal: bool,
    context_class: usize,
    contexts: [ArithmeticDecoderContext; 19],
    /// The number of cleanup passes decoded so far.
    cleanup_passes: u32,
}

impl Default for CodeBlockDecodeContext {
    fn default() -> Self {
        Self {
            coefficients: vec![],
            touched: vec![],
            width: 0,
            height: 0,
            vertically_causal: false,
            context_class: 1,
            contexts: [ArithmeticDecoderContext::default(); 19],
            cleanup_passes: 0,
        }
    }
}

impl CodeBlockDecodeContext {
    fn reset(&mut self, width: u32, height: u32, sub_band_type: SubBandType, style: &CodeBlockStyle) {
        let len = width as usize * height as usize;

        self.coefficients.clear();
        self.coefficients.resize(len, 0);
        self.touched.clear();
        self.touched.resize(len, 0);
        self.width = width;
        self.height = height;
        self.vertically_causal = style.vertically_causal_context;
        self.context_class = sub_band_type.context_class();
        self.cleanup_passes = 0;
        self.reset_contexts();
    }

    /// Reset each context to its initial state (Table D.7).
    fn reset_contexts(&mut self) {
        self.contexts = [ArithmeticDecoderContext::default(); 19];
        self.contexts[0] = ArithmeticDecoderContext::with_index(4);
        self.contexts[RUN_LENGTH_CONTEXT] = ArithmeticDecoderContext::with_index(3);
        self.contexts[UNIFORM_CONTEXT] = ArithmeticDecoderContext::with_index(46);
    }

    /// The decoded coefficients, row by row.
    pub(crate) fn coefficients(&self) -> &[i32] {
        &self.coefficients
    }

    pub(crate) fn touched(&self) -> &[u8] {
        &self.touched
    }

    pub(crate) fn cleanup_passes(&self) -> u32 {
        self.cleanup_passes
    }

    pub(crate) fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    fn idx(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    fn at(&self, x: u32, y: u32) -> i32 {
        self.coefficients[self.idx(x, y)]
    }

    /// Whether the row below `y` may be used for context formation. With
    /// vertically causal contexts, the next stripe is off limits.
    #[inline]
    fn below_visible(&self, y: u32) -> bool {
        y + 1 < self.height && !(self.vertically_causal && y % 4 == 3)
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
        SIGNIFICANCE_CONTEXT[n.horizontal][n.vertical][n.diagonal][self.context_class] as usize
    }

    /// Decode the significance and, if significant, the sign of the
    /// coefficient at (`x`, `y`).
    fn decode_significance(
        &mut self,
        decoder: &mut impl BitDecoder,
        x: u32,
        y: u32,
        n: &Neighbourhood,
        context: usize,
    ) {
        if decoder.read_bit(&mut self.contexts[context]) == 1 {
            self.decode_sign(decoder, x, y, n.horizontal_sign, n.vertical_sign);
        }
    }

    fn decode_sign(
        &mut self,
        decoder: &mut impl BitDecoder,
        x: u32,
        y: u32,
        horizontal_sign: usize,
        vertical_sign: usize,
    ) {
        let (context, xor_bit) = SIGN_CONTEXT[horizontal_sign][vertical_sign];
        let negative = decoder.read_sign(&mut self.contexts[context as usize], xor_bit);
        let idx = self.idx(x, y);
        self.coefficients[idx] = if negative == 1 { -1 } else { 1 };
    }

    /// Whether no coefficient in the neighbourhood of the column of four
    /// coefficients starting at (`x`, `y0`) is significant, which allows
    /// run-length coding (D.3.4).
    fn column_is_quiet(&self, x: u32, y0: u32) -> bool {
        let x_start = x.saturating_sub(1);
        let x_end = (x + 1).min(self.width - 1);

        if (0..4).any(|dy| self.touched[self.idx(x, y0 + dy)] != 0) {
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

        if !self.vertically_causal
            && y0 + 4 < self.height
            && (x_start..=x_end).any(|xx| self.at(xx, y0 + 4) != 0)
        {
            return false;
        }

        true
    }
}

struct Neighbourhood {
    horizontal: usize,
    vertical: usize,
    diagonal: usize,
    horizontal_sign: usize,
    vertical_sign: usize,
}

/// Decode all coding passes of a code-block into `ctx`.
pub(crate) fn decode(
    code_block: &CodeBlock,
    sub_band_type: SubBandType,
    style: &CodeBlockStyle,
    ctx: &mut CodeBlockDecodeContext,
    sink: &mut dyn DiagnosticSink,
) {
    ctx.reset(
        code_block.rect.width(),
        code_block.rect.height(),
        sub_band_type,
        style,
    );

    let mut pass = 0;

    for segment in &code_block.segments {
        let end = (pass + segment.coding_passes).min(code_block.coding_passes);

        if is_raw_pass(pass, *style) {
            let mut decoder = RawDecoder::new(&segment.data);
            decode_passes(ctx, &mut decoder, pass..end, style, sink);
        } else {
            let mut decoder = ArithmeticDecoder::new(&segment.data);
            decode_passes(ctx, &mut decoder, pass..end, style, sink);
        }

        pass = end;
    }
}

fn decode_passes(
    ctx: &mut CodeBlockDecodeContext,
    decoder: &mut impl BitDecoder,
    passes: core::ops::Range<u32>,
    style: &CodeBlockStyle,
    sink: &mut dyn DiagnosticSink,
) {
    for pass in passes {
        match PassType::of(pass) {
            PassType::SignificancePropagation => significance_propagation_pass(ctx, decoder),
            PassType::MagnitudeRefinement => magnitude_refinement_pass(ctx, decoder),
            PassType::Cleanup => {
                cleanup_pass(ctx, decoder);
                ctx.cleanup_passes += 1;

                if style.segmentation_symbols {
                    let mut symbol = 0;
                    for _ in 0..4 {
                        symbol = (symbol << 1)
                            | decoder.read_bit(&mut ctx.contexts[UNIFORM_CONTEXT]);
                    }

                    if symbol != 0b1010 {
                        sink.report(
                            Severity::SyntaxWarning,
                            None,
                            format_args!("missing or invalid segmentation symbol"),
                        );
                    }
                }
            }
        }

        if style.reset_context_probabilities {
            ctx.reset_contexts();
        }
    }
}

/// Visit the coefficients in stripe order: stripes of four rows, column by
/// column within a stripe (D.1).
fn for_each_stripe_column(width: u32, height: u32, mut f: impl FnMut(u32, u32)) {
    for y0 in (0..height).step_by(4) {
        for x in 0..width {
            f(x, y0);
        }
    }
}

/// The significance propagation pass (D.3.1).
fn significance_propagation_pass(ctx: &mut CodeBlockDecodeContext, decoder: &mut impl BitDecoder) {
    let (width, height) = (ctx.width, ctx.height);

    for_each_stripe_column(width, height, |x, y0| {
        for y in y0..(y0 + 4).min(height) {
            if ctx.at(x, y) != 0 {
                continue;
            }

            let n = ctx.neighbourhood(x, y);
            let context = ctx.significance_context(&n);

            // Coefficients without significant neighbours are left for the
            // cleanup pass.
            if context != 0 {
                ctx.decode_significance(decoder, x, y, &n, context);
                let idx = ctx.idx(x, y);
                ctx.touched[idx] = 1;
            }
        }
    });
}

/// The magnitude refinement pass (D.3.3).
fn magnitude_refinement_pass(ctx: &mut CodeBlockDecodeContext, decoder: &mut impl BitDecoder) {
    let (width, height) = (ctx.width, ctx.height);

    for_each_stripe_column(width, height, |x, y0| {
        for y in y0..(y0 + 4).min(height) {
            let idx = ctx.idx(x, y);
            let value = ctx.coefficients[idx];

            if value == 0 || ctx.touched[idx] != 0 {
                continue;
            }

            // Table D.4.
            let context = if value.abs() == 1 {
                let n = ctx.neighbourhood(x, y);
                if n.horizontal + n.vertical + n.diagonal > 0 {
                    15
                } else {
                    14
                }
            } else {
                16
            };

            let bit = decoder.read_bit(&mut ctx.contexts[context]) as i32;
            ctx.coefficients[idx] = if value < 0 {
                (value << 1) - bit
            } else {
                (value << 1) + bit
            };
            ctx.touched[idx] = 1;
        }
    });
}

/// The cleanup pass (D.3.4).
fn cleanup_pass(ctx: &mut CodeBlockDecodeContext, decoder: &mut impl BitDecoder) {
    let (width, height) = (ctx.width, ctx.height);

    for_each_stripe_column(width, height, |x, y0| {
        let mut start = y0;

        if y0 + 3 < height && ctx.column_is_quiet(x, y0) {
            if decoder.read_bit(&mut ctx.contexts[RUN_LENGTH_CONTEXT]) == 0 {
                // All four coefficients stay insignificant.
                return;
            }

            let mut offset = decoder.read_bit(&mut ctx.contexts[UNIFORM_CONTEXT]);
            offset = (offset << 1) | decoder.read_bit(&mut ctx.contexts[UNIFORM_CONTEXT]);

            // The neighbourhood is known to be insignificant.
            ctx.decode_sign(decoder, x, y0 + offset, 2, 2);
            start = y0 + offset + 1;
        }

        for y in start..(y0 + 4).min(height) {
            let idx = ctx.idx(x, y);

            if ctx.touched[idx] != 0 {
                ctx.touched[idx] = 0;
                continue;
            }

            let n = ctx.neighbourhood(x, y);
            let context = ctx.significance_context(&n);
            ctx.decode_significance(decoder, x, y, &n, context);
        }
    });
}
