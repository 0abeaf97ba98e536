//! Decoding a JPEG 2000 codestream, defined in Annex A of the standard.
//!
//! The main header is read first. Then all tile-parts are read, which builds
//! the tile hierarchy and collects the code-block data of every packet. Only
//! after the EOC marker (or the end of the data) are the tiles decoded into
//! samples.

mod arithmetic_decoder;
mod bitplane;
mod build;
mod codestream;
mod decode;
mod dequantize;
mod idwt;
pub(crate) mod markers;
mod mct;
mod packet;
mod progression;
mod rect;
mod tag_tree;
mod tile;

pub(crate) use codestream::SizeData;
pub(crate) use rect::ceil_shr;

use crate::DecodeSettings;
use crate::diagnostics::Severity;
use crate::error::{
    DecodeError, DecodeStatus, MarkerError, Result, TileError, ValidationError, bail,
};
use crate::reader::Reader;
use codestream::{HeaderSegments, TileParameters, size_marker};
use markers::MarkerHeader;
use tile::Tile;

/// A codestream whose tiles were fully reconstructed.
pub(crate) struct DecodedCodestream {
    pub(crate) size: SizeData,
    /// The tiles in raster order, each holding the final samples of its
    /// tile-components.
    pub(crate) tiles: Vec<Tile>,
    /// `Ok`, or `NonFatal` if a part of the codestream was damaged.
    pub(crate) status: DecodeStatus,
}

/// Read and decode a complete codestream.
///
/// `expected_components` is the component count of the image header box, if
/// there is one. An `Err` means that the image can't be decoded at all.
pub(crate) fn read_codestream(
    reader: &mut Reader<'_>,
    settings: &DecodeSettings,
    expected_components: Option<u16>,
) -> Result<DecodedCodestream> {
    let (size, main, first_sot) = read_main_header(reader, expected_components)?;

    ldebug!(
        "image [{},{} {}x{}], {} tiles, {} components",
        size.x_offset,
        size.y_offset,
        size.x_size - size.x_offset,
        size.y_size - size.y_offset,
        size.num_tiles(),
        size.components.len()
    );

    let mut state = TilePartReader {
        size: &size,
        main: &main,
        settings,
        tiles: (0..size.num_tiles()).map(|_| None).collect(),
        status: DecodeStatus::Ok,
    };

    state.read_tile_parts(reader, first_sot)?;

    let TilePartReader { tiles, status, .. } = state;

    let mut tiles = tiles
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or(TileError::Uninitialized)?;

    for tile in &mut tiles {
        decode::decode_tile(tile, settings.reduction, settings.strict, reader.sink())?;
    }

    Ok(DecodedCodestream {
        size,
        tiles,
        status,
    })
}

/// Read the main header, up to and including the first SOT marker, and
/// resolve the default coding parameters.
fn read_main_header(
    reader: &mut Reader<'_>,
    expected_components: Option<u16>,
) -> Result<(SizeData, TileParameters, MarkerHeader)> {
    let mut size: Option<SizeData> = None;
    let mut segments = HeaderSegments::default();

    let sot = loop {
        let header = markers::read_marker_header(reader)?;
        let name = markers::to_string(header.marker);

        ltrace!("main header marker {name} ({} bytes)", header.payload_len);

        match header.marker {
            markers::SOC => {}
            markers::SIZ => {
                if size.is_some() {
                    bail!(MarkerError::Duplicate(name));
                }

                let size_data = size_marker(&read_payload(reader, header)?)?;

                if expected_components
                    .is_some_and(|n| n as usize != size_data.components.len())
                {
                    bail!(ValidationError::ComponentCountMismatch);
                }

                segments = HeaderSegments::new(size_data.components.len());
                size = Some(size_data);
            }
            markers::COD | markers::COC | markers::QCD | markers::QCC => {
                if size.is_none() {
                    bail!(MarkerError::Misplaced(name));
                }

                // Component segments follow the default segment they refine.
                let missing_default = match header.marker {
                    markers::COC => segments.cod.is_none(),
                    markers::QCC => segments.qcd.is_none(),
                    _ => false,
                };

                if missing_default {
                    bail!(MarkerError::Misplaced(name));
                }

                let payload = read_payload(reader, header)?;
                store_segment(&mut segments, header.marker, &payload)?;
            }
            markers::RGN | markers::POC | markers::PPM => {
                reader.report(
                    Severity::Unimplemented,
                    format_args!("{name} marker segment in main header"),
                );
                skip_segment(reader, header)?;
            }
            markers::TLM | markers::PLM | markers::CRG | markers::COM => {
                skip_segment(reader, header)?;
            }
            markers::SOT => break header,
            marker => {
                reader.report(
                    Severity::SyntaxError,
                    format_args!("unknown marker segment {marker:02x} in main header"),
                );
                skip_segment(reader, header)?;
            }
        }
    };

    let size = size.ok_or(MarkerError::Missing("SIZ"))?;
    let main = segments.resolve_main()?;

    Ok((size, main, sot))
}

/// Parse a COD, COC, QCD or QCC marker segment into `segments`.
fn store_segment(segments: &mut HeaderSegments, marker: u8, payload: &[u8]) -> Result<()> {
    let num_components = segments.coc.len();

    match marker {
        markers::COD => segments.cod = Some(codestream::cod_marker(payload)?),
        markers::COC => {
            let (component, style) = codestream::coc_marker(payload, num_components)?;
            segments.coc[component as usize] = Some(style);
        }
        markers::QCD => segments.qcd = Some(codestream::qcd_marker(payload)?),
        markers::QCC => {
            let (component, quantization) = codestream::qcc_marker(payload, num_components)?;
            segments.qcc[component as usize] = Some(quantization);
        }
        _ => unreachable!(),
    }

    Ok(())
}

fn read_payload(reader: &mut Reader<'_>, header: MarkerHeader) -> Result<Vec<u8>> {
    reader.read_bytes(header.payload_len as u64)
}

fn skip_segment(reader: &mut Reader<'_>, header: MarkerHeader) -> Result<()> {
    let len = header.payload_len as u64;

    if reader.discard(len) != len {
        bail!(MarkerError::ParseFailure(markers::to_string(header.marker)));
    }

    Ok(())
}

struct TilePartReader<'a> {
    size: &'a SizeData,
    main: &'a TileParameters,
    settings: &'a DecodeSettings,
    /// Tiles are created when their first tile-part arrives.
    tiles: Vec<Option<Tile>>,
    status: DecodeStatus,
}

impl TilePartReader<'_> {
    /// Read tile-parts until the EOC marker. `sot` is the marker that
    /// ended the main header.
    fn read_tile_parts(&mut self, reader: &mut Reader<'_>, mut sot: MarkerHeader) -> Result<()> {
        loop {
            if let Err(e) = self.read_tile_part(reader, sot) {
                // The position of the next tile-part is unknown.
                return self.damaged(reader, e);
            }

            match markers::read_marker_header(reader) {
                Ok(header) if header.marker == markers::SOT => sot = header,
                Ok(header) if header.marker == markers::EOC => return Ok(()),
                _ => return self.damaged(reader, MarkerError::Missing("EOC").into()),
            }
        }
    }

    /// Read a single tile-part, starting right after the length field of its
    /// SOT marker segment.
    fn read_tile_part(&mut self, reader: &mut Reader<'_>, sot: MarkerHeader) -> Result<()> {
        // Psot counts from the first byte of the SOT marker.
        let start = reader.position().saturating_sub(4);
        let header = codestream::sot_marker(&read_payload(reader, sot)?)?;
        let tile_idx = header.tile_index as usize;
        let part_idx = header.tile_part_index;

        ltrace!(
            "tile-part {part_idx} of tile {tile_idx}, {} bytes",
            header.tile_part_length
        );

        let slot = self.tiles.get(tile_idx).ok_or(TileError::InvalidIndex)?;

        match slot {
            Some(tile) if part_idx != 0 && part_idx as u16 == tile.next_tile_part => {}
            None if part_idx == 0 => {}
            _ => bail!(TileError::InvalidTilePartIndex),
        }

        let mut segments = HeaderSegments::new(self.size.components.len());

        loop {
            let header = markers::read_marker_header(reader)?;
            let name = markers::to_string(header.marker);

            match header.marker {
                markers::SOD => break,
                markers::COD | markers::COC | markers::QCD | markers::QCC => {
                    let payload = read_payload(reader, header)?;

                    if part_idx == 0 {
                        store_segment(&mut segments, header.marker, &payload)?;
                    } else {
                        reader.report(
                            Severity::SyntaxError,
                            format_args!("{name} marker segment in non-first tile-part"),
                        );
                    }
                }
                markers::RGN | markers::POC | markers::PPT => {
                    reader.report(
                        Severity::Unimplemented,
                        format_args!("{name} marker segment in tile-part header"),
                    );
                    skip_segment(reader, header)?;
                }
                markers::PLT | markers::COM => skip_segment(reader, header)?,
                marker => {
                    reader.report(
                        Severity::SyntaxError,
                        format_args!("unknown marker segment {marker:02x} in tile-part header"),
                    );
                    skip_segment(reader, header)?;
                }
            }
        }

        let byte_count = match header.tile_part_length {
            0 => None,
            length => Some(
                (length as u64)
                    .checked_sub(reader.position() - start)
                    .ok_or(TileError::InvalidTilePartLength)?,
            ),
        };

        let tile = match self.tiles[tile_idx].take() {
            Some(mut tile) => {
                tile.next_tile_part += 1;
                tile
            }
            None => {
                let params = segments.resolve_tile(self.main);

                for component in &params.components {
                    component
                        .quantization
                        .validate(component.coding_style.num_decomposition_levels)?;
                }

                build::build_tile(tile_idx as u32, self.size, params, self.settings.reduction)?
            }
        };
        let tile = self.tiles[tile_idx].insert(tile);

        match packet::read_tile_part_packets(reader, tile, byte_count) {
            Ok(()) => Ok(()),
            // Without a length, the end of the tile-part can't be found.
            Err(e) if byte_count.is_none() || self.settings.strict => Err(e),
            Err(e) => {
                reader.report(
                    Severity::SyntaxError,
                    format_args!("damaged packet in tile {tile_idx}: {e}"),
                );
                self.status = self.status.merge(DecodeStatus::NonFatal);

                let end = start + header.tile_part_length as u64;
                let position = reader.position();

                if end > position {
                    reader.discard(end - position);
                }

                Ok(())
            }
        }
    }

    /// Handle a problem that ends the reading of tile-parts. Tiles that were
    /// read so far are still decoded.
    fn damaged(&mut self, reader: &mut Reader<'_>, error: DecodeError) -> Result<()> {
        if self.settings.strict {
            return Err(error);
        }

        reader.report(
            Severity::SyntaxError,
            format_args!("error in codestream: {error}"),
        );
        self.status = self.status.merge(DecodeStatus::NonFatal);

        Ok(())
    }
}
