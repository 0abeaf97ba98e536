//! Building the tile hierarchy: tile-components, resolution levels,
//! precincts, sub-bands and code-blocks.
//!
//! All coordinates follow Annex B. Resolution levels and sub-bands live in
//! their own coordinate systems, derived from the tile-component area by
//! repeated halving (B-14 and B-15).

use super::codestream::{CodingStyle, ComponentParameters, ComponentSize, SizeData, TileParameters};
use super::progression::{ProgressionCursor, ProgressionLimits};
use super::rect::{IntRect, ceil_shr, floor_shr};
use super::tag_tree::TagTree;
use super::tile::{
    CodeBlock, Precinct, PrecinctBand, Resolution, SubBandType, Tile, TileComponent,
    packet_exists, sub_band_types,
};
use crate::error::{Result, TileError, ValidationError, bail};

/// Build the complete hierarchy of the tile with the given index.
///
/// Only the lowest `NL - reduction + 1` resolution levels of each component
/// are reconstructed later on, but packets of all resolution levels still
/// need to be parsed, so the hierarchy always covers all of them.
pub(crate) fn build_tile(
    idx: u32,
    size: &SizeData,
    params: TileParameters,
    reduction: u8,
) -> Result<Tile> {
    let rect = size.tile_rect(idx);

    ltrace!(
        "building tile {idx} at [{},{} {}x{}]",
        rect.x0,
        rect.y0,
        rect.width(),
        rect.height()
    );

    let components = size
        .components
        .iter()
        .zip(&params.components)
        .enumerate()
        .map(|(component_idx, (info, component_params))| {
            build_component(component_idx, rect, info, component_params, reduction)
        })
        .collect::<Result<Vec<_>>>()?;

    let max_decomposition_levels = components
        .iter()
        .map(|c| c.coding_style.num_decomposition_levels)
        .max()
        .unwrap_or(0);
    let max_precincts = components
        .iter()
        .flat_map(|c| &c.resolutions)
        .map(|r| r.num_precincts)
        .max()
        .unwrap_or(0);

    let limits = ProgressionLimits {
        num_layers: params.num_layers,
        num_resolutions: max_decomposition_levels + 1,
        num_components: components.len() as u16,
        max_precincts,
    };
    let cursor = ProgressionCursor::new(params.progression_order, limits, |p| {
        packet_exists(&components, p)
    });

    Ok(Tile {
        idx,
        rect,
        params,
        components,
        next_tile_part: 1,
        cursor,
        max_decomposition_levels,
        max_precincts,
    })
}

fn build_component(
    component_idx: usize,
    tile_rect: IntRect,
    info: &ComponentSize,
    params: &ComponentParameters,
    reduction: u8,
) -> Result<TileComponent> {
    let coding_style = params.coding_style.clone();

    if reduction > coding_style.num_decomposition_levels {
        bail!(ValidationError::InvalidDecompositionLevels);
    }

    let rect = tile_rect.subsample(info.h_sep as u32, info.v_sep as u32);
    let reduced_rect = rect.reduce(reduction as u32);

    if reduced_rect.is_empty() {
        bail!(TileError::EmptyComponent);
    }

    let resolutions = (0..coding_style.num_resolution_levels())
        .map(|resolution| build_resolution(component_idx, rect, &coding_style, resolution))
        .collect();

    let num_samples = reduced_rect.width() as usize * reduced_rect.height() as usize;

    Ok(TileComponent {
        rect,
        reduced_rect,
        precision: info.precision,
        signed: info.signed,
        h_sep: info.h_sep,
        v_sep: info.v_sep,
        coding_style,
        quantization: params.quantization.clone(),
        resolutions,
        data: vec![0; num_samples],
    })
}

fn build_resolution(
    component_idx: usize,
    component_rect: IntRect,
    coding_style: &CodingStyle,
    resolution: u8,
) -> Resolution {
    let rect = component_rect.reduce((coding_style.num_decomposition_levels - resolution) as u32);
    let (precinct_width, precinct_height) = coding_style.precinct_exponents[resolution as usize];

    // Precincts of resolution levels above 0 are halved when mapped onto the
    // sub-bands, and code-blocks never exceed the precinct (B-17).
    let (band_precinct_width, band_precinct_height) = if resolution == 0 {
        (precinct_width, precinct_height)
    } else {
        (precinct_width - 1, precinct_height - 1)
    };
    let code_block_width = band_precinct_width.min(coding_style.code_block_width);
    let code_block_height = band_precinct_height.min(coding_style.code_block_height);

    let sub_band_rects = if resolution == 0 {
        [rect, IntRect::default(), IntRect::default()]
    } else {
        SubBandType::DETAIL.map(|sub_band_type| sub_band_rect(rect, sub_band_type))
    };

    let num_bands = sub_band_types(resolution).len();
    let empty = rect.is_empty() && sub_band_rects[..num_bands].iter().all(IntRect::is_empty);

    let col0 = floor_shr(rect.x0, precinct_width as u32);
    let col1 = ceil_shr(rect.x1, precinct_width as u32);
    let row0 = floor_shr(rect.y0, precinct_height as u32);
    let row1 = ceil_shr(rect.y1, precinct_height as u32);
    let num_precincts = (col1 - col0).saturating_mul(row1 - row0);

    ltrace!(
        "component {component_idx} r {resolution}: [{},{} {}x{}], {num_precincts} precincts",
        rect.x0,
        rect.y0,
        rect.width(),
        rect.height()
    );

    let mut precincts = Vec::with_capacity(num_precincts as usize);

    for row in row0..row1 {
        for col in col0..col1 {
            let precinct_rect =
                grid_cell(col, row, band_precinct_width, band_precinct_height);

            let sub_bands = sub_band_types(resolution)
                .iter()
                .map(|&sub_band_type| {
                    let band_rect = sub_band_rects[sub_band_type.band_index()];

                    build_precinct_band(
                        sub_band_type,
                        precinct_rect.intersect(band_rect),
                        code_block_width,
                        code_block_height,
                    )
                })
                .collect();

            precincts.push(Precinct { sub_bands });
        }
    }

    Resolution {
        rect,
        precinct_width,
        precinct_height,
        code_block_width,
        code_block_height,
        sub_band_rects,
        empty,
        num_precincts,
        precincts,
    }
}

/// The area of a sub-band of resolution level `r > 0`, given the area of
/// that resolution level (B-15 with `nb = 1`).
fn sub_band_rect(resolution_rect: IntRect, sub_band_type: SubBandType) -> IntRect {
    // High-pass samples sit at odd positions, so their band starts at
    // `ceil((x - 1) / 2) = floor(x / 2)`.
    let half = |v: u32, high: bool| {
        if high {
            floor_shr(v, 1)
        } else {
            ceil_shr(v, 1)
        }
    };

    let (high_x, high_y) = match sub_band_type {
        SubBandType::LowLow => (false, false),
        SubBandType::HighLow => (true, false),
        SubBandType::LowHigh => (false, true),
        SubBandType::HighHigh => (true, true),
    };

    IntRect::from_ltrb(
        half(resolution_rect.x0, high_x),
        half(resolution_rect.y0, high_y),
        half(resolution_rect.x1, high_x),
        half(resolution_rect.y1, high_y),
    )
}

/// Partition the part of a sub-band that is covered by a precinct into
/// code-blocks (B.7).
fn build_precinct_band(
    sub_band_type: SubBandType,
    area: IntRect,
    code_block_width: u8,
    code_block_height: u8,
) -> PrecinctBand {
    // An empty area has no code-blocks, even if it isn't aligned to the
    // code-block grid.
    let (col0, col1, row0, row1) = if area.is_empty() {
        (0, 0, 0, 0)
    } else {
        (
            floor_shr(area.x0, code_block_width as u32),
            ceil_shr(area.x1, code_block_width as u32),
            floor_shr(area.y0, code_block_height as u32),
            ceil_shr(area.y1, code_block_height as u32),
        )
    };

    let code_blocks_x = col1 - col0;
    let code_blocks_y = row1 - row0;
    let mut code_blocks = Vec::with_capacity((code_blocks_x * code_blocks_y) as usize);

    for row in row0..row1 {
        for col in col0..col1 {
            let rect = grid_cell(col, row, code_block_width, code_block_height).intersect(area);
            code_blocks.push(CodeBlock::new(rect, col - col0, row - row0));
        }
    }

    PrecinctBand {
        sub_band_type,
        code_blocks_x,
        code_blocks_y,
        inclusion_tree: TagTree::new(code_blocks_x, code_blocks_y),
        zero_bitplane_tree: TagTree::new(code_blocks_x, code_blocks_y),
        code_blocks,
    }
}

/// The cell at (`col`, `row`) of a grid with cells of size
/// `2^width_exp x 2^height_exp` anchored at the origin.
fn grid_cell(col: u32, row: u32, width_exp: u8, height_exp: u8) -> IntRect {
    let edge = |idx: u32, exp: u8| ((idx as u64) << exp).min(u32::MAX as u64) as u32;

    IntRect::from_ltrb(
        edge(col, width_exp),
        edge(row, height_exp),
        edge(col + 1, width_exp),
        edge(row + 1, height_exp),
    )
}
