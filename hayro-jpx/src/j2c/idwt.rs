//! The inverse discrete wavelet transform (Annex F).
//!
//! The transform runs in place on the sample buffer of a tile-component.
//! Before level `r` is synthesized, the buffer holds the LL band of that
//! level in its top-left corner, with HL to its right, LH below it and HH
//! diagonally. After the level is done, the top-left corner holds the LL
//! band of level `r + 1`.
//!
//! Each row and then each column is copied into a scratch buffer, with the
//! low-pass samples on odd and the high-pass samples on even positions,
//! extended symmetrically by four samples on both sides and filtered with
//! the lifting steps of F.3.8.

use super::codestream::WaveletTransform;
use super::tile::TileComponent;

/// Lifting constants of the 9-7 filter (Table F.4).
const ALPHA: f64 = -1.586_134_342_059_924;
const BETA: f64 = -0.052_980_118_572_961;
const GAMMA: f64 = 0.882_911_075_530_934;
const DELTA: f64 = 0.443_506_852_043_971;
const KAPPA: f64 = 1.230_174_104_914_001;
const INV_KAPPA: f64 = 1.0 / KAPPA;

/// The number of extension samples on each side of the scratch buffer.
const PADDING: usize = 4;

/// Synthesize all resolution levels that are reconstructed at the given
/// reduction.
pub(crate) fn inverse_transform(component: &mut TileComponent, reduction: u8) {
    let transform = component.coding_style.transformation;
    let stride = component.width() as usize;
    let max_len = component.width().max(component.height()) as usize;
    let mut buf = vec![0_i32; max_len + 2 * PADDING];

    for r in 1..component.decoded_resolutions(reduction) as usize {
        let resolution = &component.resolutions[r];
        let [high_low, low_high, _] = resolution.sub_band_rects;

        // Widths and heights of the low-pass and of the whole level.
        let low_width = low_high.width() as usize;
        let width = low_width + high_low.width() as usize;
        let low_height = high_low.height() as usize;
        let height = low_height + low_high.height() as usize;

        if width == 0 || height == 0 {
            continue;
        }

        ltrace!(
            "IDWT level {r}: {width}x{height}, low-pass {low_width}x{low_height}"
        );

        let x_odd = resolution.rect.x0 & 1 == 1;
        let y_odd = resolution.rect.y0 & 1 == 1;

        for row in component.data.chunks_exact_mut(stride).take(height) {
            let offset = interleave(&mut buf, x_odd, &row[..low_width], &row[low_width..width]);
            transform_1d(&mut buf, offset, width, transform);
            row[..width].copy_from_slice(&buf[offset..offset + width]);
        }

        let mut column = vec![0_i32; height];

        for x in 0..width {
            for (y, sample) in column.iter_mut().enumerate() {
                *sample = component.data[y * stride + x];
            }

            let (low, high) = column.split_at(low_height);
            let offset = interleave(&mut buf, y_odd, low, high);
            transform_1d(&mut buf, offset, height, transform);

            for (y, sample) in buf[offset..offset + height].iter().enumerate() {
                component.data[y * stride + x] = *sample;
            }
        }
    }
}

/// Copy low-pass and high-pass samples into the scratch buffer, so that
/// the low-pass samples land on the odd positions. Returns the position of
/// the first sample.
fn interleave(buf: &mut [i32], odd_origin: bool, low: &[i32], high: &[i32]) -> usize {
    let offset = PADDING - 1 + odd_origin as usize;
    let (low_start, high_start) = if odd_origin {
        (offset + 1, offset)
    } else {
        (offset, offset + 1)
    };

    for (i, sample) in low.iter().enumerate() {
        buf[low_start + 2 * i] = *sample;
    }

    for (i, sample) in high.iter().enumerate() {
        buf[high_start + 2 * i] = *sample;
    }

    offset
}

/// Extend the signal of length `n` that starts at `offset` symmetrically
/// and run the synthesis filter on it.
fn transform_1d(data: &mut [i32], offset: usize, n: usize, transform: WaveletTransform) {
    if n == 1 {
        // A single sample at an odd position is a high-pass sample (F-7).
        if offset == PADDING {
            data[offset] >>= 1;
        }

        return;
    }

    extend(data, offset, n);

    let end = offset + n;

    match transform {
        WaveletTransform::Irreversible97 => {
            let scale = |data: &mut [i32], range: core::ops::RangeInclusive<usize>, factor: f64| {
                for i in range.step_by(2) {
                    data[i] = (factor * data[i] as f64) as i32;
                }
            };

            let lift = |data: &mut [i32], range: core::ops::RangeInclusive<usize>, factor: f64| {
                for i in range.step_by(2) {
                    let neighbours = data[i - 1] as f64 + data[i + 1] as f64;
                    data[i] = (data[i] as f64 - factor * neighbours) as i32;
                }
            };

            scale(data, 1..=end + 2, KAPPA);
            scale(data, 0..=end + 3, INV_KAPPA);
            lift(data, 1..=end + 2, DELTA);
            lift(data, 2..=end + 1, GAMMA);
            lift(data, 3..=end, BETA);
            lift(data, 4..=end - 1, ALPHA);
        }
        WaveletTransform::Reversible53 => {
            for i in (3..=end).step_by(2) {
                let neighbours = data[i - 1] as i64 + data[i + 1] as i64;
                data[i] = data[i].wrapping_sub(((neighbours + 2) >> 2) as i32);
            }

            for i in (4..end).step_by(2) {
                let neighbours = data[i - 1] as i64 + data[i + 1] as i64;
                data[i] = data[i].wrapping_add((neighbours >> 1) as i32);
            }
        }
    }
}

/// Periodic symmetric extension (F.3.7), for signals of at least two
/// samples.
fn extend(data: &mut [i32], offset: usize, n: usize) {
    let end = offset + n;

    data[end] = data[end - 2];

    if n == 2 {
        data[end + 1] = data[offset + 1];
        data[end + 2] = data[offset];
        data[end + 3] = data[offset + 1];
    } else {
        data[end + 1] = data[end - 3];

        if n == 3 {
            data[end + 2] = data[offset + 1];
            data[end + 3] = data[offset + 2];
        } else {
            data[end + 2] = data[end - 4];
            data[end + 3] = if n == 4 {
                data[offset + 1]
            } else {
                data[end - 5]
            };
        }
    }

    data[offset - 1] = data[offset + 1];
    data[offset - 2] = data[offset + 2];
    data[offset - 3] = data[offset + 3];

    if offset == PADDING {
        data[0] = data[offset + 4];
    }
}
