//! Inverse quantization of decoded code-block coefficients (E.1).
//!
//! The bit-plane decoder produces integer magnitudes that are aligned to the
//! least significant decoded bit-plane. They are shifted up to a common scale
//! here. Samples of the reversible path end up as plain integers, samples of
//! the irreversible path as fixed-point numbers with [`FRACTION_BITS`]
//! fractional bits. Coefficients whose lowest bit-planes are missing are
//! reconstructed at the middle of their quantization interval.

use super::bitplane::CodeBlockDecodeContext;
use super::codestream::{QuantizationInfo, QuantizationStyle, WaveletTransform};
use super::tile::SubBandType;

/// The number of bits the irreversible path keeps below the binary point.
pub(crate) const FRACTION_BITS: u32 = 24;

/// How a shifted coefficient is mapped onto its final value.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Scaling {
    /// Reversible coding: the value is used as is.
    Identity,
    /// Reversible quantization with the 9-7 transform: bits below the
    /// sample precision are cleared.
    Truncate(u32),
    /// Scalar quantization: the value is multiplied by the step size.
    Multiply(f64),
}

/// Dequantization parameters of one sub-band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BandQuantizer {
    /// The bit position the most significant magnitude bit ends up at.
    shift: i64,
    scaling: Scaling,
}

impl BandQuantizer {
    pub(crate) fn new(
        quantization: &QuantizationInfo,
        transform: WaveletTransform,
        precision: u8,
        resolution: u8,
        sub_band_type: SubBandType,
    ) -> Self {
        let guard_bits = quantization.guard_bits as i64;
        let precision = precision as i64;
        let step = quantization.step_size(resolution, sub_band_type);

        let (mut shift, scaling) = match quantization.style {
            QuantizationStyle::NoQuantization => {
                let scaling = match transform {
                    WaveletTransform::Irreversible97 => {
                        Scaling::Truncate(FRACTION_BITS - precision as u32)
                    }
                    WaveletTransform::Reversible53 => Scaling::Identity,
                };

                (guard_bits + step.exponent as i64 - 1, scaling)
            }
            QuantizationStyle::ScalarDerived | QuantizationStyle::ScalarExpounded => {
                // The nominal dynamic range grows by one bit for each
                // high-pass filtering step (E-4).
                let gain = match sub_band_type {
                    SubBandType::LowLow => -1,
                    SubBandType::HighLow | SubBandType::LowHigh => 0,
                    SubBandType::HighHigh => 1,
                };
                let mu = (0x800 + step.mantissa as u32) as f64 / 2048.0;

                (guard_bits + precision + gain, Scaling::Multiply(mu))
            }
        };

        if transform == WaveletTransform::Irreversible97 {
            shift += FRACTION_BITS as i64 - precision;
        }

        Self { shift, scaling }
    }

    /// Dequantize a single coefficient. `decoded_bit_planes` is the number
    /// of bit-planes that are known for it, including the missing most
    /// significant ones.
    pub(crate) fn dequantize(&self, value: i32, decoded_bit_planes: u32) -> i32 {
        if value == 0 {
            return 0;
        }

        let mut value = value as i64;
        let shift = self.shift - decoded_bit_planes as i64;

        if shift > 0 {
            let shift = shift.min(31);
            let half = 1_i64 << (shift - 1);

            value = if value < 0 {
                (value << shift) - half
            } else {
                (value << shift) + half
            };
        } else {
            value >>= (-shift).min(63);
        }

        value = match self.scaling {
            Scaling::Identity => value,
            Scaling::Truncate(bits) => value & (-1_i64 << bits),
            Scaling::Multiply(mu) => (value as f64 * mu) as i64,
        };

        value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }
}

/// Dequantize the coefficients of a decoded code-block and write them into
/// the tile-component buffer, whose rows are `stride` samples wide, with
/// the top-left coefficient at (`x`, `y`).
pub(crate) fn store_code_block(
    data: &mut [i32],
    stride: usize,
    x: usize,
    y: usize,
    ctx: &CodeBlockDecodeContext,
    missing_bit_planes: u8,
    quantizer: &BandQuantizer,
) {
    let width = ctx.width() as usize;

    if width == 0 {
        return;
    }

    let base = missing_bit_planes as u32 + ctx.cleanup_passes();

    for (row, (coefficients, touched)) in ctx
        .coefficients()
        .chunks_exact(width)
        .zip(ctx.touched().chunks_exact(width))
        .enumerate()
    {
        let start = (y + row) * stride + x;
        let Some(out) = data.get_mut(start..start + width) else {
            return;
        };

        for ((out, coefficient), touched) in out.iter_mut().zip(coefficients).zip(touched) {
            *out = quantizer.dequantize(*coefficient, base + *touched as u32);
        }
    }
}
