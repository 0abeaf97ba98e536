//! A small lossless JPEG 2000 encoder for generating test codestreams.
//!
//! It supports what is needed to exercise the decoder: any number of
//! decomposition levels with the reversible 5-3 wavelet, the reversible
//! component transform, tiles, image offsets, layers, all progression orders
//! and all code-block styles. Precincts always have the default size, so
//! every resolution level of a tile-component has exactly one precinct.

mod t1;

use std::ops::Range;

pub(crate) use t1::BlockStyle;
use dwt::Rect;
use t2::{BandState, BlockState, PacketOptions};
pub(crate) use writer::SizeParams;

const GUARD_BITS: u8 = 2;

pub(crate) struct EncodeOptions {
    pub(crate) size: SizeParams,
    pub(crate) levels: u8,
    pub(crate) num_layers: u16,
    pub(crate) progression: u8,
    pub(crate) code_block: (u8, u8),
    pub(crate) style: BlockStyle,
    pub(crate) mct: bool,
    pub(crate) sop: bool,
    pub(crate) eph: bool,
    /// Whether to leave out the QCD marker segment.
    pub(crate) omit_qcd: bool,
}

/// The samples of an image, one plane per component, row by row.
pub(crate) struct SourceImage {
    pub(crate) planes: Vec<Vec<u32>>,
}

pub(crate) struct Encoded {
    pub(crate) codestream: Vec<u8>,
    /// The position of the packet data of each tile within the codestream.
    pub(crate) tile_bodies: Vec<Range<usize>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    LowLow,
    HighLow,
    LowHigh,
    HighHigh,
}

impl Band {
    fn context_class(self) -> usize {
        match self {
            Self::HighLow => 0,
            Self::LowLow | Self::LowHigh => 1,
            Self::HighHigh => 2,
        }
    }

    /// The position of the sub-band in the QCD marker segment.
    fn quantization_index(self, resolution: u8) -> usize {
        match self {
            Self::LowLow => 0,
            Self::HighLow => 3 * (resolution as usize - 1) + 1,
            Self::LowHigh => 3 * (resolution as usize - 1) + 2,
            Self::HighHigh => 3 * (resolution as usize - 1) + 3,
        }
    }
}

/// A sub-band of a tile-component: its area and where its coefficients
/// start in the transformed buffer.
struct BandLayout {
    band: Band,
    rect: Rect,
    origin: (u32, u32),
}

struct TransformedComponent {
    rect: Rect,
    data: Vec<i32>,
}

/// The area of the tile with the given index on the reference grid.
pub(crate) fn tile_rect(size: &SizeParams, idx: u32) -> Rect {
    let x_tiles = num_tiles(size).0;
    let (tx, ty) = (idx % x_tiles, idx / x_tiles);

    (
        (tx * size.tile_width).max(size.x_offset),
        (ty * size.tile_height).max(size.y_offset),
        ((tx + 1) * size.tile_width).min(size.x_offset + size.width),
        ((ty + 1) * size.tile_height).min(size.y_offset + size.height),
    )
}

pub(crate) fn num_tiles(size: &SizeParams) -> (u32, u32) {
    (
        (size.x_offset + size.width).div_ceil(size.tile_width),
        (size.y_offset + size.height).div_ceil(size.tile_height),
    )
}

/// The area of a tile-component at the given reduction.
pub(crate) fn reduced_rect(rect: Rect, reduction: u8) -> Rect {
    dwt::resolution_rect(rect, reduction, 0)
}

pub(crate) fn encode(image: &SourceImage, options: &EncodeOptions) -> Result<Encoded, String> {
    let size = &options.size;
    let (x_tiles, y_tiles) = num_tiles(size);
    let num_quantization_bands = 1 + 3 * options.levels as usize;
    let mut magnitude_bits = vec![0_u32; num_quantization_bands];

    let tiles = (0..x_tiles * y_tiles)
        .map(|idx| transform_tile(image, options, tile_rect(size, idx)))
        .collect::<Vec<_>>();

    for component in tiles.iter().flatten() {
        for (r, bands) in band_layouts(component.rect, options.levels).iter().enumerate() {
            for layout in bands {
                let max = band_coefficients(component, layout)
                    .map(|c| c.unsigned_abs())
                    .max()
                    .unwrap_or(0);
                let bits = &mut magnitude_bits[layout.band.quantization_index(r as u8)];
                *bits = (*bits).max(32 - max.leading_zeros());
            }
        }
    }

    // The number of magnitude bit-planes is `guard bits + exponent - 1`.
    let exponents = magnitude_bits
        .iter()
        .map(|bits| {
            let exponent = (*bits + 1).saturating_sub(GUARD_BITS as u32).max(1);
            u8::try_from(exponent)
                .ok()
                .filter(|e| *e < 32)
                .ok_or_else(|| format!("exponent {exponent} is out of range"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut codestream = writer::marker(writer::SOC);
    codestream.extend(writer::siz(size));
    codestream.extend(writer::cod(&writer::CodingParams {
        sop: options.sop,
        eph: options.eph,
        progression: options.progression,
        num_layers: options.num_layers,
        mct: options.mct,
        levels: options.levels,
        code_block: options.code_block,
        block_style: options.style.to_u8(),
    }));

    if !options.omit_qcd {
        codestream.extend(writer::qcd(GUARD_BITS, &exponents));
    }

    let mut tile_bodies = vec![];

    for (idx, components) in tiles.iter().enumerate() {
        let body = encode_tile(components, options, &exponents);
        let tile_part = writer::tile_part(idx as u16, &body);
        let end = codestream.len() + tile_part.len();
        tile_bodies.push(end - body.len()..end);
        codestream.extend(tile_part);
    }

    codestream.extend(writer::marker(writer::EOC));

    Ok(Encoded {
        codestream,
        tile_bodies,
    })
}

/// Wrap a codestream into a JP2 file.
pub(crate) fn jp2_file(codestream: &[u8], size: &SizeParams, colour_space: u32) -> Vec<u8> {
    writer::jp2_file(codestream, size, colour_space)
}

/// The samples of the tile, level shifted, after the component transform
/// and the wavelet transform.
fn transform_tile(image: &SourceImage, options: &EncodeOptions, rect: Rect) -> Vec<TransformedComponent> {
    let size = &options.size;
    let mut components = tile_samples(image, size, rect);

    if options.mct {
        forward_rct(&mut components);
    }

    components
        .into_iter()
        .map(|mut data| {
            dwt::forward_transform(&mut data, dwt::width(rect) as usize, rect, options.levels);
            TransformedComponent { rect, data }
        })
        .collect()
}

/// Cut out the level shifted samples of a tile.
fn tile_samples(image: &SourceImage, size: &SizeParams, rect: Rect) -> Vec<Vec<i32>> {
    let shift = 1_i32 << (size.precision - 1);

    image
        .planes
        .iter()
        .map(|plane| {
            let mut samples = Vec::with_capacity((dwt::width(rect) * dwt::height(rect)) as usize);

            for y in rect.1..rect.3 {
                for x in rect.0..rect.2 {
                    let idx = (y - size.y_offset) * size.width + (x - size.x_offset);
                    samples.push(plane[idx as usize] as i32 - shift);
                }
            }

            samples
        })
        .collect()
}

/// The forward reversible component transform (G-1).
fn forward_rct(components: &mut [Vec<i32>]) {
    let [c0, c1, c2, ..] = components else {
        return;
    };

    for ((r, g), b) in c0.iter_mut().zip(c1.iter_mut()).zip(c2.iter_mut()) {
        let (red, green, blue) = (*r, *g, *b);
        *r = (red + 2 * green + blue) >> 2;
        *g = blue - green;
        *b = red - green;
    }
}

/// The inverse reversible component transform, for computing reference
/// samples.
pub(crate) fn inverse_rct(c0: i32, c1: i32, c2: i32) -> (i32, i32, i32) {
    let green = c0 - ((c2 + c1) >> 2);
    (c2 + green, green, c1 + green)
}

/// The sub-bands of every resolution level of a tile-component.
fn band_layouts(component: Rect, levels: u8) -> Vec<Vec<BandLayout>> {
    (0..=levels)
        .map(|r| {
            let rect = dwt::resolution_rect(component, levels, r);

            if r == 0 {
                return vec![BandLayout {
                    band: Band::LowLow,
                    rect,
                    origin: (0, 0),
                }];
            }

            let high_low = dwt::sub_band_rect(rect, true, false);
            let low_high = dwt::sub_band_rect(rect, false, true);
            let high_high = dwt::sub_band_rect(rect, true, true);
            let low_width = dwt::width(low_high);
            let low_height = dwt::height(high_low);

            vec![
                BandLayout {
                    band: Band::HighLow,
                    rect: high_low,
                    origin: (low_width, 0),
                },
                BandLayout {
                    band: Band::LowHigh,
                    rect: low_high,
                    origin: (0, low_height),
                },
                BandLayout {
                    band: Band::HighHigh,
                    rect: high_high,
                    origin: (low_width, low_height),
                },
            ]
        })
        .collect()
}

fn band_coefficients<'a>(
    component: &'a TransformedComponent,
    layout: &'a BandLayout,
) -> impl Iterator<Item = i32> + 'a {
    let stride = dwt::width(component.rect);

    (0..dwt::height(layout.rect)).flat_map(move |y| {
        (0..dwt::width(layout.rect)).map(move |x| {
            let idx = (layout.origin.1 + y) * stride + layout.origin.0 + x;
            component.data[idx as usize]
        })
    })
}

/// Partition a sub-band into code-blocks and code them.
fn encode_band(
    component: &TransformedComponent,
    layout: &BandLayout,
    options: &EncodeOptions,
    magnitude_bits: u32,
) -> BandState {
    let rect = layout.rect;
    let (cbw, cbh) = (options.code_block.0 as u32, options.code_block.1 as u32);

    if dwt::width(rect) == 0 || dwt::height(rect) == 0 {
        return BandState::new(0, 0, vec![], options.num_layers);
    }

    let (col0, col1) = (rect.0 >> cbw, dwt::ceil_shr(rect.2, cbw));
    let (row0, row1) = (rect.1 >> cbh, dwt::ceil_shr(rect.3, cbh));
    let stride = dwt::width(component.rect);
    let mut blocks = vec![];

    for row in row0..row1 {
        for col in col0..col1 {
            let x0 = (col << cbw).max(rect.0);
            let x1 = ((col + 1) << cbw).min(rect.2);
            let y0 = (row << cbh).max(rect.1);
            let y1 = ((row + 1) << cbh).min(rect.3);

            let mut coefficients = Vec::with_capacity(((x1 - x0) * (y1 - y0)) as usize);

            for y in y0..y1 {
                for x in x0..x1 {
                    let bx = layout.origin.0 + x - rect.0;
                    let by = layout.origin.1 + y - rect.1;
                    coefficients.push(component.data[(by * stride + bx) as usize]);
                }
            }

            let coded = t1::encode_block(
                &coefficients,
                x1 - x0,
                y1 - y0,
                layout.band.context_class(),
                magnitude_bits,
                options.style,
            );

            blocks.push(BlockState::new(
                coded,
                options.num_layers,
                col - col0,
                row - row0,
            ));
        }
    }

    BandState::new(col1 - col0, row1 - row0, blocks, options.num_layers)
}

/// Code all code-blocks of a tile and write its packets in progression
/// order.
fn encode_tile(components: &[TransformedComponent], options: &EncodeOptions, exponents: &[u8]) -> Vec<u8> {
    let levels = options.levels;

    // Indexed by component and resolution level.
    let mut precincts = components
        .iter()
        .map(|component| {
            band_layouts(component.rect, levels)
                .iter()
                .enumerate()
                .map(|(r, bands)| {
                    bands
                        .iter()
                        .map(|layout| {
                            let exponent = exponents[layout.band.quantization_index(r as u8)];
                            let magnitude_bits = GUARD_BITS as u32 + exponent as u32 - 1;
                            encode_band(component, layout, options, magnitude_bits)
                        })
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let packet_options = PacketOptions {
        style: options.style,
        sop: None,
        eph: options.eph,
    };
    let mut body = vec![];
    let mut sequence = 0_u16;

    for (layer, resolution, component) in packet_order(options, components.len()) {
        let rect = components[component].rect;

        // Packets of resolution levels without samples are left out.
        if resolution_is_empty(rect, levels, resolution) {
            continue;
        }

        let packet_options = PacketOptions {
            sop: options.sop.then_some(sequence),
            ..packet_options
        };
        body.extend(t2::write_packet(
            &mut precincts[component][resolution as usize],
            layer,
            &packet_options,
        ));
        sequence = sequence.wrapping_add(1);
    }

    body
}

fn resolution_is_empty(component: Rect, levels: u8, resolution: u8) -> bool {
    let rect = dwt::resolution_rect(component, levels, resolution);
    let empty = |r: Rect| dwt::width(r) == 0 || dwt::height(r) == 0;

    if resolution == 0 {
        return empty(rect);
    }

    empty(rect)
        && empty(dwt::sub_band_rect(rect, true, false))
        && empty(dwt::sub_band_rect(rect, false, true))
        && empty(dwt::sub_band_rect(rect, true, true))
}

/// The packets of a tile as `(layer, resolution, component)`, for a single
/// precinct per resolution level.
fn packet_order(options: &EncodeOptions, num_components: usize) -> Vec<(u16, u8, usize)> {
    let layers = 0..options.num_layers;
    let resolutions = 0..=options.levels;
    let components = 0..num_components;
    let mut order = vec![];

    match options.progression {
        // LRCP
        0 => {
            for l in layers {
                for r in resolutions.clone() {
                    for c in components.clone() {
                        order.push((l, r, c));
                    }
                }
            }
        }
        // RLCP
        1 => {
            for r in resolutions {
                for l in layers.clone() {
                    for c in components.clone() {
                        order.push((l, r, c));
                    }
                }
            }
        }
        // RPCL
        2 => {
            for r in resolutions {
                for c in components.clone() {
                    for l in layers.clone() {
                        order.push((l, r, c));
                    }
                }
            }
        }
        // PCRL and CPRL
        _ => {
            for c in components {
                for r in resolutions.clone() {
                    for l in layers.clone() {
                        order.push((l, r, c));
                    }
                }
            }
        }
    }

    order
}

/// The lowest resolution level of a tile-component at the given reduction,
/// after the component transform, as the decoder reconstructs it. Only the
/// first `reduction` levels of the wavelet transform are applied.
pub(crate) fn reduced_tile(
    image: &SourceImage,
    options: &EncodeOptions,
    tile: u32,
    reduction: u8,
) -> (Rect, Vec<Vec<i32>>) {
    let size = &options.size;
    let rect = tile_rect(size, tile);
    let mut components = tile_samples(image, size, rect);

    if options.mct {
        forward_rct(&mut components);
    }

    let reduced = reduced_rect(rect, reduction);
    let stride = dwt::width(rect) as usize;

    let components = components
        .into_iter()
        .map(|mut data| {
            dwt::forward_levels(&mut data, stride, rect, options.levels, reduction);

            let mut out = Vec::with_capacity((dwt::width(reduced) * dwt::height(reduced)) as usize);

            for row in data.chunks_exact(stride).take(dwt::height(reduced) as usize) {
                out.extend_from_slice(&row[..dwt::width(reduced) as usize]);
            }

            out
        })
        .collect();

    (reduced, components)
}
