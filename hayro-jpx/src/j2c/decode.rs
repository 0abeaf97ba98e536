//! Reconstructing the samples of a tile once all of its packets were read.
//!
//! The code-blocks of every resolution level that is needed at the requested
//! reduction are decoded and dequantized straight into the sample buffer of
//! their tile-component. Then the wavelet transform is inverted, followed by
//! the multi-component transform and the DC level shift.

use super::bitplane::{self, CodeBlockDecodeContext};
use super::dequantize::{BandQuantizer, store_code_block};
use super::idwt;
use super::mct;
use super::tile::{SubBandType, Tile, TileComponent};
use crate::diagnostics::DiagnosticSink;
use crate::error::Result;

/// Turn the collected packet data of a tile into samples.
pub(crate) fn decode_tile(
    tile: &mut Tile,
    reduction: u8,
    strict: bool,
    sink: &mut dyn DiagnosticSink,
) -> Result<()> {
    ldebug!("decoding tile {}", tile.idx);

    let mut ctx = CodeBlockDecodeContext::default();

    for component in &mut tile.components {
        decode_code_blocks(component, reduction, &mut ctx, sink);
        idwt::inverse_transform(component, reduction);
    }

    if tile.params.mct {
        mct::inverse_mct(&mut tile.components, strict)?;
    }

    for component in &mut tile.components {
        mct::dc_level_shift(component);
    }

    Ok(())
}

fn decode_code_blocks(
    component: &mut TileComponent,
    reduction: u8,
    ctx: &mut CodeBlockDecodeContext,
    sink: &mut dyn DiagnosticSink,
) {
    let num_resolutions = component.decoded_resolutions(reduction) as usize;
    let stride = component.width() as usize;
    let style = component.coding_style.code_block_style;
    let transform = component.coding_style.transformation;

    let TileComponent {
        resolutions,
        data,
        quantization,
        precision,
        ..
    } = component;

    for (r, resolution) in resolutions.iter_mut().enumerate().take(num_resolutions) {
        let [high_low, low_high, _] = resolution.sub_band_rects;

        for precinct in &mut resolution.precincts {
            for band in &mut precinct.sub_bands {
                let sub_band_type = band.sub_band_type;
                let band_rect = resolution.sub_band_rects[sub_band_type.band_index()];

                // Position of the sub-band within the buffer: HL is placed
                // to the right of LL, LH below it.
                let (band_x, band_y) = match sub_band_type {
                    SubBandType::LowLow => (0, 0),
                    SubBandType::HighLow => (low_high.width(), 0),
                    SubBandType::LowHigh => (0, high_low.height()),
                    SubBandType::HighHigh => (low_high.width(), high_low.height()),
                };

                let quantizer =
                    BandQuantizer::new(quantization, transform, *precision, r as u8, sub_band_type);

                for block in &mut band.code_blocks {
                    // Blocks without data keep their zero coefficients.
                    if block.rect.is_empty() || block.coding_passes == 0 {
                        continue;
                    }

                    bitplane::decode(block, sub_band_type, &style, ctx, sink);

                    store_code_block(
                        data,
                        stride,
                        (band_x + block.rect.x0 - band_rect.x0) as usize,
                        (band_y + block.rect.y0 - band_rect.y0) as usize,
                        ctx,
                        block.missing_bit_planes,
                        &quantizer,
                    );

                    // The codeword segments are not needed anymore.
                    block.segments = vec![];
                }
            }
        }
    }
}
