//! Reading packets: packet headers (B.10) and the code-block contributions
//! that follow them.
//!
//! Packets are read in the order given by the progression of the tile. The
//! bytes of each code-block are only collected here; they are decoded once
//! all tile-parts of the image have been read.

use super::codestream::{CodeBlockStyle, CodingStyleFlags};
use super::progression::ProgressionData;
use super::tile::{CodeBlock, PendingSegment, PrecinctBand, Tile, TileComponent, packet_exists};
use crate::error::{DecodingError, Result, bail};
use crate::reader::{BitBuffer, Reader};

/// Magnitude bit-planes are stored in 32-bit signed integers.
const MAX_BIT_PLANES: u32 = 31;

/// Read all packets of one tile-part.
///
/// `byte_count` is the number of bytes after the SOD marker, or `None` if the
/// tile-part extends to the EOC marker. Once the last packet of the tile was
/// read, the rest of the tile-part is skipped.
pub(crate) fn read_tile_part_packets(
    reader: &mut Reader<'_>,
    tile: &mut Tile,
    byte_count: Option<u64>,
) -> Result<()> {
    let mut remaining = byte_count.unwrap_or(u64::MAX);

    loop {
        let Some(position) = tile.cursor.current() else {
            if byte_count.is_some() {
                reader.discard(remaining);
            }

            return Ok(());
        };

        match byte_count {
            Some(_) if remaining == 0 => return Ok(()),
            None if reader.look(0) == Some(0xff) && reader.look(1) == Some(0xd9) => return Ok(()),
            _ => {}
        }

        ltrace!(
            "packet l {} r {} c {} p {} of tile {}",
            position.layer_num,
            position.resolution,
            position.component,
            position.precinct,
            tile.idx
        );

        let flags = tile.params.flags;
        let component = &mut tile.components[position.component as usize];

        // Encoders drop the packets of resolution levels without any
        // samples.
        if !component.resolutions[position.resolution as usize].empty {
            remaining = read_packet(reader, component, &position, flags, remaining)?;
        }

        tile.cursor.advance(|p| packet_exists(&tile.components, p));
    }
}

/// Read a single packet and return the number of bytes left in the
/// tile-part.
fn read_packet(
    reader: &mut Reader<'_>,
    component: &mut TileComponent,
    position: &ProgressionData,
    flags: CodingStyleFlags,
    remaining: u64,
) -> Result<u64> {
    let style = component.coding_style.code_block_style;
    let precinct = &mut component.resolutions[position.resolution as usize].precincts
        [position.precinct as usize];

    let mut bits = BitBuffer::new(reader, remaining);

    if flags.may_use_sop_markers() {
        bits.skip_sop();
    }

    if bits.read_bit()? == 0 {
        // Empty packet.
        for block in precinct
            .sub_bands
            .iter_mut()
            .flat_map(|b| &mut b.code_blocks)
        {
            block.included = false;
            block.pending.clear();
        }
    } else {
        for band in &mut precinct.sub_bands {
            read_band_header(&mut bits, band, position.layer_num as u32, style)?;
        }
    }

    if flags.uses_eph_marker() {
        bits.skip_eph();
    }

    let mut remaining = bits.finish();

    for block in precinct
        .sub_bands
        .iter_mut()
        .flat_map(|b| &mut b.code_blocks)
        .filter(|b| b.included)
    {
        for segment in core::mem::take(&mut block.pending) {
            let length = segment.length as u64;

            if length > remaining {
                bail!(DecodingError::PacketOverrun);
            }

            let data = reader.read_bytes(length)?;
            remaining -= length;

            block.push_segment_data(segment.idx, segment.coding_passes, data);
            block.coding_passes += segment.coding_passes;
        }

        block.seen = true;
    }

    Ok(remaining)
}

/// Read the part of a packet header that belongs to one sub-band of the
/// precinct (B.10.4 to B.10.7).
fn read_band_header(
    bits: &mut BitBuffer<'_, '_>,
    band: &mut PrecinctBand,
    layer: u32,
    style: CodeBlockStyle,
) -> Result<()> {
    let PrecinctBand {
        inclusion_tree,
        zero_bitplane_tree,
        code_blocks,
        ..
    } = band;

    for block in code_blocks.iter_mut() {
        block.pending.clear();

        if block.rect.is_empty() {
            block.included = false;
            continue;
        }

        block.included = if block.seen {
            bits.read_bit()? == 1
        } else {
            // The inclusion tag tree stores the first layer a code-block is
            // included in.
            inclusion_tree
                .read(block.x_idx, block.y_idx, layer, bits)?
                .is_some()
        };

        if !block.included {
            continue;
        }

        if !block.seen {
            let missing = zero_bitplane_tree
                .read(block.x_idx, block.y_idx, u32::MAX, bits)?
                .ok_or(DecodingError::InvalidBitplaneCount)?;

            if missing > MAX_BIT_PLANES {
                bail!(DecodingError::InvalidBitplaneCount);
            }

            block.missing_bit_planes = missing as u8;
        }

        let new_passes = read_num_coding_passes(bits)?;

        if block.missing_bit_planes as u32 + (block.coding_passes + new_passes + 2) / 3
            > MAX_BIT_PLANES
        {
            bail!(DecodingError::TooManyCodingPasses);
        }

        // B.10.7.1: Lblock is incremented by the number of leading 1 bits.
        while bits.read_bit()? == 1 {
            block.l_block += 1;
        }

        read_segment_lengths(bits, block, new_passes, style)?;
    }

    Ok(())
}

/// Number of new coding passes (Table B.4).
fn read_num_coding_passes(bits: &mut BitBuffer<'_, '_>) -> Result<u32> {
    if bits.read_bit()? == 0 {
        return Ok(1);
    }

    if bits.read_bit()? == 0 {
        return Ok(2);
    }

    let value = bits.read_bits(2)?;
    if value < 3 {
        return Ok(3 + value);
    }

    let value = bits.read_bits(5)?;
    if value < 31 {
        return Ok(6 + value);
    }

    Ok(37 + bits.read_bits(7)?)
}

/// The index of the codeword segment the given coding pass belongs to.
///
/// Without special code-block styles, all passes form one segment. With
/// termination on each pass, every pass is its own segment. With selective
/// arithmetic coding bypass, the first ten passes form one MQ segment and
/// afterwards each pair of raw passes and each cleanup pass get their own
/// segment (Table D.9).
pub(crate) fn segment_index(pass: u32, style: CodeBlockStyle) -> u32 {
    if style.termination_on_each_pass {
        pass
    } else if style.selective_arithmetic_coding_bypass && pass >= 10 {
        let offset = pass - 10;
        1 + 2 * (offset / 3) + (offset % 3 == 2) as u32
    } else {
        0
    }
}

/// Whether the given coding pass is coded without the MQ coder.
pub(crate) fn is_raw_pass(pass: u32, style: CodeBlockStyle) -> bool {
    style.selective_arithmetic_coding_bypass && pass >= 10 && (pass - 10) % 3 != 2
}

/// Read one length for each codeword segment the new passes contribute to
/// (B.10.7.2).
fn read_segment_lengths(
    bits: &mut BitBuffer<'_, '_>,
    block: &mut CodeBlock,
    new_passes: u32,
    style: CodeBlockStyle,
) -> Result<()> {
    let mut pass = block.coding_passes;
    let end = pass + new_passes;

    while pass < end {
        let idx = segment_index(pass, style);
        let mut run = 1;

        while pass + run < end && segment_index(pass + run, style) == idx {
            run += 1;
        }

        let num_bits = block.l_block + run.ilog2();

        if num_bits > 32 {
            bail!(DecodingError::InvalidSegmentLength);
        }

        let length = bits.read_bits(num_bits)?;

        block.pending.push(PendingSegment {
            idx,
            coding_passes: run,
            length,
        });

        pass += run;
    }

    Ok(())
}
