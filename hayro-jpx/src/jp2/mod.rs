//! Reading a JP2 file, defined in Annex I.
//!
//! The JP2 header box is a superbox, but some writers place its children
//! outside of it, so its contents are simply read as part of the top-level
//! box sequence.

use crate::DecodeSettings;
use crate::diagnostics::Severity;
use crate::error::{DecodeError, DecodeStatus, FormatError, Result, bail};
use crate::j2c::{self, DecodedCodestream, SizeData};
use crate::reader::{Reader, SliceReader};
use cdef::ChannelDefinitionBox;
use cmap::ComponentMappingBox;
use colr::ColourSpecificationBox;
use pclr::PaletteBox;

pub(crate) mod r#box;
pub(crate) mod cdef;
pub(crate) mod cmap;
pub(crate) mod colr;
pub(crate) mod params;
pub(crate) mod pclr;

/// The precision and signedness of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ComponentDepth {
    pub(crate) precision: u8,
    pub(crate) signed: bool,
}

impl ComponentDepth {
    /// Decode a depth byte of the `ihdr` or `bpcc` box, or the `Ssiz` field.
    pub(crate) fn from_raw(value: u8) -> Self {
        Self {
            precision: (value & 0x7f) + 1,
            signed: value & 0x80 != 0,
        }
    }
}

/// The image header box (ihdr), defined in I.5.3.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ImageHeaderBox {
    pub(crate) height: u32,
    pub(crate) width: u32,
    pub(crate) num_components: u16,
    /// `None` if the components differ in depth, which is then given by the
    /// bits per component box.
    pub(crate) depth: Option<ComponentDepth>,
    pub(crate) compression: u8,
}

fn parse_ihdr(data: &[u8]) -> Option<ImageHeaderBox> {
    let mut reader = SliceReader::new(data);

    let height = reader.read_u32()?;
    let width = reader.read_u32()?;
    let num_components = reader.read_u16()?;
    let bpc = reader.read_u8()?;
    let compression = reader.read_u8()?;
    // The colourspace-unknown and intellectual property flags.
    let _ = reader.read_u8()?;
    let _ = reader.read_u8()?;

    Some(ImageHeaderBox {
        height,
        width,
        num_components,
        depth: (bpc != 255).then(|| ComponentDepth::from_raw(bpc)),
        compression,
    })
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ImageBoxes {
    pub(crate) image_header: Option<ImageHeaderBox>,
    /// The depth of each component, from the image header, the bits per
    /// component box or, for naked codestreams, the SIZ marker.
    pub(crate) component_depths: Vec<ComponentDepth>,
    pub(crate) colour_specification: Option<ColourSpecificationBox>,
    pub(crate) palette: Option<PaletteBox>,
    pub(crate) component_mapping: Option<ComponentMappingBox>,
    pub(crate) channel_definition: Option<ChannelDefinitionBox>,
}

impl ImageBoxes {
    fn fill_from_codestream(&mut self, size: &SizeData) {
        if self.component_depths.len() != size.components.len() {
            self.component_depths = size
                .components
                .iter()
                .map(|c| ComponentDepth {
                    precision: c.precision,
                    signed: c.signed,
                })
                .collect();
        }
    }
}

pub(crate) struct DecodedImage {
    pub(crate) boxes: ImageBoxes,
    /// The decoded codestream.
    pub(crate) codestream: DecodedCodestream,
    /// The combined status of the box structure and the codestream.
    pub(crate) status: DecodeStatus,
}

/// Read a JP2/JPX file or a naked codestream and decode its image.
pub(crate) fn read(reader: &mut Reader<'_>, settings: &DecodeSettings) -> Result<DecodedImage> {
    let mut boxes = ImageBoxes::default();

    if reader.look(0) == Some(0xff) {
        reader.report(
            Severity::SyntaxWarning,
            format_args!("naked JPEG 2000 codestream, missing JP2/JPX wrapper"),
        );

        let codestream = j2c::read_codestream(reader, settings, None)?;
        boxes.fill_from_codestream(&codestream.size);

        return Ok(DecodedImage {
            boxes,
            status: codestream.status,
            codestream,
        });
    }

    let mut codestream: Option<DecodedCodestream> = None;
    let mut status = DecodeStatus::Ok;

    loop {
        let header = match r#box::read_header(reader) {
            Ok(Some(header)) => header,
            Ok(None) => break,
            Err(e) if codestream.is_some() => {
                recover(reader, settings, &mut status, e)?;
                break;
            }
            Err(e) => return Err(e),
        };
        let data_len = header.data_len_or_zero();

        match header.box_type {
            r#box::JP2_HEADER => {}
            r#box::IMAGE_HEADER => {
                let ihdr = parse_ihdr(&reader.read_bytes(data_len)?).ok_or(FormatError::InvalidBox)?;

                if ihdr.compression != 7 {
                    bail!(FormatError::UnsupportedCompression);
                }

                boxes.component_depths = match ihdr.depth {
                    Some(depth) => vec![depth; ihdr.num_components as usize],
                    None => vec![],
                };
                boxes.image_header = Some(ihdr);
            }
            r#box::BITS_PER_COMPONENT => {
                let Some(ihdr) = &boxes.image_header else {
                    bail!(FormatError::MissingImageHeader);
                };

                if data_len != ihdr.num_components as u64 {
                    bail!(FormatError::InvalidBitsPerComponent);
                }

                boxes.component_depths = reader
                    .read_bytes(data_len)?
                    .into_iter()
                    .map(ComponentDepth::from_raw)
                    .collect();
            }
            r#box::COLOUR_SPECIFICATION => match colr::parse(&reader.read_bytes(data_len)?) {
                Ok(Some(colr)) => {
                    // The colour specification with the highest precedence wins.
                    if boxes
                        .colour_specification
                        .as_ref()
                        .is_none_or(|c| colr.precedence > c.precedence)
                    {
                        boxes.colour_specification = Some(colr);
                    }
                }
                Ok(None) => {}
                Err(e) => recover(reader, settings, &mut status, e)?,
            },
            r#box::PALETTE => {
                let data = reader.read_bytes(data_len)?;
                boxes.palette = stored(reader, settings, &mut status, pclr::parse(&data), || {
                    FormatError::InvalidPalette
                })?;
            }
            r#box::COMPONENT_MAPPING => {
                let data = reader.read_bytes(data_len)?;
                boxes.component_mapping =
                    stored(reader, settings, &mut status, cmap::parse(&data), || {
                        FormatError::InvalidComponentMapping
                    })?;
            }
            r#box::CHANNEL_DEFINITION => {
                let data = reader.read_bytes(data_len)?;
                boxes.channel_definition =
                    stored(reader, settings, &mut status, cdef::parse(&data), || {
                        FormatError::InvalidChannelDefinition
                    })?;
            }
            r#box::CONTIGUOUS_CODESTREAM if codestream.is_none() => {
                if boxes.image_header.is_none() {
                    reader.report(
                        Severity::SyntaxError,
                        format_args!("JPX stream is missing the image header box"),
                    );
                }

                if boxes.colour_specification.is_none() {
                    reader.report(
                        Severity::SyntaxError,
                        format_args!("JPX stream has no supported colour specification"),
                    );
                }

                let start = reader.position();
                let expected_components = boxes.image_header.map(|h| h.num_components);
                let decoded = j2c::read_codestream(reader, settings, expected_components)?;
                let damaged = decoded.status != DecodeStatus::Ok;

                status = status.merge(decoded.status);
                codestream = Some(decoded);

                // The position of the following boxes can't be trusted.
                if damaged {
                    break;
                }

                // Skip anything between the EOC marker and the end of the box.
                if let Some(len) = header.data_len {
                    let end = start + len;
                    let position = reader.position();

                    if end > position {
                        reader.discard(end - position);
                    }
                }
            }
            box_type => {
                if box_type == r#box::CONTIGUOUS_CODESTREAM {
                    reader.report(
                        Severity::Unimplemented,
                        format_args!("ignoring additional codestream"),
                    );
                } else if !matches!(box_type, r#box::JP2_SIGNATURE | r#box::FILE_TYPE) {
                    ldebug!("ignoring box {}", r#box::tag_to_string(box_type));
                }

                if reader.discard(data_len) != data_len {
                    if codestream.is_none() {
                        bail!(FormatError::TruncatedBox);
                    }

                    recover(reader, settings, &mut status, FormatError::TruncatedBox.into())?;
                    break;
                }
            }
        }
    }

    let codestream = codestream.ok_or(FormatError::MissingCodestream)?;

    if let Some(ihdr) = &boxes.image_header {
        let image = codestream.size.image_rect();

        if (ihdr.width, ihdr.height) != (image.width(), image.height()) {
            reader.report(
                Severity::SyntaxWarning,
                format_args!(
                    "image header declares {}x{}, codestream has {}x{}",
                    ihdr.width,
                    ihdr.height,
                    image.width(),
                    image.height()
                ),
            );
        }
    }

    boxes.fill_from_codestream(&codestream.size);

    Ok(DecodedImage {
        boxes,
        codestream,
        status,
    })
}

/// Keep a parsed box that is only stored, downgrading the status if it is
/// malformed.
fn stored<T>(
    reader: &mut Reader<'_>,
    settings: &DecodeSettings,
    status: &mut DecodeStatus,
    parsed: Option<T>,
    error: impl FnOnce() -> FormatError,
) -> Result<Option<T>> {
    if parsed.is_none() {
        recover(reader, settings, status, error().into())?;
    }

    Ok(parsed)
}

/// Report a problem that doesn't prevent decoding, unless decoding is
/// strict.
fn recover(
    reader: &mut Reader<'_>,
    settings: &DecodeSettings,
    status: &mut DecodeStatus,
    error: DecodeError,
) -> Result<()> {
    if settings.strict {
        return Err(error);
    }

    reader.report(Severity::SyntaxError, format_args!("{error}"));
    *status = status.merge(DecodeStatus::NonFatal);

    Ok(())
}
