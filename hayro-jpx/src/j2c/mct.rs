//! The inverse multi-component transforms (Annex G) and the inverse DC
//! level shift.

use super::codestream::WaveletTransform;
use super::dequantize::FRACTION_BITS;
use super::tile::TileComponent;
use crate::error::{ColorError, Result, bail};

/// Apply the inverse multi-component transform to the first three
/// components. The reversible transform (G.2) is used if the first
/// component uses the 5-3 wavelet, the irreversible one (G.3) otherwise.
pub(crate) fn inverse_mct(components: &mut [TileComponent], strict: bool) -> Result<()> {
    let [c0, c1, c2, ..] = components else {
        if strict {
            bail!(ColorError::Mct);
        }

        lwarn!("ignoring multi-component transform with less than 3 components");

        return Ok(());
    };

    if (c0.h_sep, c0.v_sep) != (c1.h_sep, c1.v_sep)
        || (c1.h_sep, c1.v_sep) != (c2.h_sep, c2.v_sep)
        || c0.data.len() != c1.data.len()
        || c1.data.len() != c2.data.len()
    {
        bail!(ColorError::Mct);
    }

    match c0.coding_style.transformation {
        WaveletTransform::Irreversible97 => inverse_ict(&mut c0.data, &mut c1.data, &mut c2.data),
        WaveletTransform::Reversible53 => inverse_rct(&mut c0.data, &mut c1.data, &mut c2.data),
    }

    Ok(())
}

/// The inverse irreversible component transform (G-6), on fixed-point
/// samples.
fn inverse_ict(s0: &mut [i32], s1: &mut [i32], s2: &mut [i32]) {
    for ((y0, y1), y2) in s0.iter_mut().zip(s1.iter_mut()).zip(s2.iter_mut()) {
        let (d0, d1, d2) = (*y0 as f64, *y1 as f64, *y2 as f64);

        *y0 = (d0 + 1.402 * d2 + 0.5) as i32;
        *y1 = (d0 - 0.34413 * d1 - 0.71414 * d2 + 0.5) as i32;
        *y2 = (d0 + 1.772 * d1 + 0.5) as i32;
    }
}

/// The inverse reversible component transform (G-7).
fn inverse_rct(s0: &mut [i32], s1: &mut [i32], s2: &mut [i32]) {
    for ((y0, y1), y2) in s0.iter_mut().zip(s1.iter_mut()).zip(s2.iter_mut()) {
        let (d0, d1, d2) = (*y0, *y1, *y2);
        let g = d0.wrapping_sub(d2.wrapping_add(d1) >> 2);

        *y0 = d2.wrapping_add(g);
        *y1 = g;
        *y2 = d1.wrapping_add(g);
    }
}

/// Convert the reconstructed samples of a component back to integers, undo
/// the DC level shift of unsigned components (G.1.2) and clip the samples
/// to the range of the component precision.
pub(crate) fn dc_level_shift(component: &mut TileComponent) {
    let fraction_bits = match component.coding_style.transformation {
        WaveletTransform::Irreversible97 => FRACTION_BITS - component.precision as u32,
        WaveletTransform::Reversible53 => 0,
    };

    shift_samples(
        &mut component.data,
        component.precision,
        component.signed,
        fraction_bits,
    );
}

fn shift_samples(samples: &mut [i32], precision: u8, signed: bool, fraction_bits: u32) {
    let precision = precision as u32;

    if signed {
        let min = -(1 << (precision - 1));
        let max = (1 << (precision - 1)) - 1;

        for sample in samples {
            *sample = (*sample >> fraction_bits).clamp(min, max);
        }
    } else {
        let max = (1 << precision) - 1;
        let zero = 1 << (precision - 1);

        for sample in samples {
            *sample = (*sample >> fraction_bits).saturating_add(zero).clamp(0, max);
        }
    }
}
