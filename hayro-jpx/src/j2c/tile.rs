//! The tile hierarchy: tiles, tile-components, resolution levels,
//! precincts, sub-bands and code-blocks (Annex B).
//!
//! Every level of the hierarchy exclusively owns the level below it. The
//! whole tree of a tile is built by [`super::build`] when the first
//! tile-part of the tile arrives and is dropped together with the tile.

use super::codestream::{CodingStyle, QuantizationInfo, TileParameters};
use super::progression::{ProgressionCursor, ProgressionData};
use super::rect::IntRect;
use super::tag_tree::TagTree;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SubBandType {
    LowLow = 0,
    HighLow = 1,
    LowHigh = 2,
    HighHigh = 3,
}

impl SubBandType {
    /// The sub-bands of a resolution level above 0, in the order they appear
    /// in a packet.
    pub(crate) const DETAIL: [Self; 3] = [Self::HighLow, Self::LowHigh, Self::HighHigh];

    /// The position of the sub-band within its resolution level.
    pub(crate) fn band_index(self) -> usize {
        match self {
            Self::LowLow | Self::HighLow => 0,
            Self::LowHigh => 1,
            Self::HighHigh => 2,
        }
    }

    /// The column of the significance context table (Table D.1) for this
    /// sub-band.
    pub(crate) fn context_class(self) -> usize {
        match self {
            Self::HighLow => 0,
            Self::LowLow | Self::LowHigh => 1,
            Self::HighHigh => 2,
        }
    }
}

/// The sub-bands of the given resolution level.
pub(crate) fn sub_band_types(resolution: u8) -> &'static [SubBandType] {
    if resolution == 0 {
        &[SubBandType::LowLow]
    } else {
        &SubBandType::DETAIL
    }
}

/// One tile of the image, initialized by its first tile-part.
pub(crate) struct Tile {
    pub(crate) idx: u32,
    /// The area of the tile on the reference grid.
    pub(crate) rect: IntRect,
    pub(crate) params: TileParameters,
    pub(crate) components: Vec<TileComponent>,
    /// The index the next tile-part of this tile must have.
    pub(crate) next_tile_part: u16,
    /// The position of the next packet in the progression.
    pub(crate) cursor: ProgressionCursor,
    pub(crate) max_decomposition_levels: u8,
    pub(crate) max_precincts: u32,
}

impl Tile {
    /// Whether the packet at the given position exists in this tile.
    pub(crate) fn has_packet(&self, position: &ProgressionData) -> bool {
        packet_exists(&self.components, position)
    }
}

/// A packet exists if its component has the resolution level and the
/// resolution level has the precinct.
pub(crate) fn packet_exists(components: &[TileComponent], position: &ProgressionData) -> bool {
    components
        .get(position.component as usize)
        .and_then(|c| c.resolutions.get(position.resolution as usize))
        .is_some_and(|r| position.precinct < r.num_precincts)
}

pub(crate) struct TileComponent {
    /// The area of the tile-component on the component's sample grid.
    pub(crate) rect: IntRect,
    /// `rect`, reduced by the requested number of resolution levels.
    pub(crate) reduced_rect: IntRect,
    pub(crate) precision: u8,
    pub(crate) signed: bool,
    pub(crate) h_sep: u8,
    pub(crate) v_sep: u8,
    pub(crate) coding_style: CodingStyle,
    pub(crate) quantization: QuantizationInfo,
    /// Resolution levels, starting with the coarsest one (the (NL)LL band).
    pub(crate) resolutions: Vec<Resolution>,
    /// Samples of the reduced tile-component, row by row. Holds coefficients
    /// until the inverse transforms are done.
    pub(crate) data: Vec<i32>,
}

impl TileComponent {
    /// The number of resolution levels that are actually reconstructed.
    pub(crate) fn decoded_resolutions(&self, reduction: u8) -> u8 {
        self.coding_style.num_resolution_levels() - reduction
    }

    pub(crate) fn width(&self) -> u32 {
        self.reduced_rect.width()
    }

    pub(crate) fn height(&self) -> u32 {
        self.reduced_rect.height()
    }
}

pub(crate) struct Resolution {
    /// The area of the resolution level, in its own coordinate system (B-14).
    pub(crate) rect: IntRect,
    /// Precinct size exponents.
    pub(crate) precinct_width: u8,
    pub(crate) precinct_height: u8,
    /// Code-block size exponents, limited by the precinct size.
    pub(crate) code_block_width: u8,
    pub(crate) code_block_height: u8,
    /// The sub-band rectangles. Resolution 0 only uses the first entry (LL),
    /// all others use HL, LH and HH in this order.
    pub(crate) sub_band_rects: [IntRect; 3],
    /// Whether the resolution level and all of its sub-bands are empty, in
    /// which case encoders omit its packets.
    pub(crate) empty: bool,
    pub(crate) num_precincts: u32,
    pub(crate) precincts: Vec<Precinct>,
}

pub(crate) struct Precinct {
    /// One entry per sub-band of the resolution level.
    pub(crate) sub_bands: Vec<PrecinctBand>,
}

/// The part of a sub-band that belongs to one precinct.
pub(crate) struct PrecinctBand {
    pub(crate) sub_band_type: SubBandType,
    pub(crate) code_blocks_x: u32,
    pub(crate) code_blocks_y: u32,
    pub(crate) inclusion_tree: TagTree,
    pub(crate) zero_bitplane_tree: TagTree,
    /// Code-blocks in raster order.
    pub(crate) code_blocks: Vec<CodeBlock>,
}

/// A codeword segment of a code-block (B.10.7), possibly assembled from the
/// contributions of several layers.
#[derive(Debug, Clone, Default)]
pub(crate) struct CodewordSegment {
    pub(crate) idx: u32,
    pub(crate) coding_passes: u32,
    pub(crate) data: Vec<u8>,
}

/// The contribution of a code-block to the packet that is being read.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingSegment {
    pub(crate) idx: u32,
    pub(crate) coding_passes: u32,
    pub(crate) length: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct CodeBlock {
    /// The area of the code-block, in the coordinate system of its sub-band.
    pub(crate) rect: IntRect,
    pub(crate) x_idx: u32,
    pub(crate) y_idx: u32,
    /// Whether the code-block was included in an earlier packet.
    pub(crate) seen: bool,
    /// Whether the code-block is included in the packet that is being read.
    pub(crate) included: bool,
    pub(crate) l_block: u32,
    pub(crate) missing_bit_planes: u8,
    /// The number of coding passes received so far.
    pub(crate) coding_passes: u32,
    pub(crate) segments: Vec<CodewordSegment>,
    pub(crate) pending: Vec<PendingSegment>,
}

impl CodeBlock {
    pub(crate) fn new(rect: IntRect, x_idx: u32, y_idx: u32) -> Self {
        Self {
            rect,
            x_idx,
            y_idx,
            seen: false,
            included: false,
            l_block: 3,
            missing_bit_planes: 0,
            coding_passes: 0,
            segments: vec![],
            pending: vec![],
        }
    }

    /// Add the data of a codeword segment. Data for a segment that was
    /// started in an earlier layer is appended to it.
    pub(crate) fn push_segment_data(&mut self, idx: u32, coding_passes: u32, data: Vec<u8>) {
        match self.segments.last_mut() {
            Some(last) if last.idx == idx => {
                last.coding_passes += coding_passes;
                last.data.extend_from_slice(&data);
            }
            _ => self.segments.push(CodewordSegment {
                idx,
                coding_passes,
                data,
            }),
        }
    }
}
