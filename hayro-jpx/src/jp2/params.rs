//! Determining the depth and colour space of an image from its headers,
//! without decoding it.

use super::colr::{self, EnumeratedColourSpace};
use super::{ComponentDepth, r#box};
use crate::j2c::markers::{self, MarkerHeader};
use crate::reader::{Reader, SliceReader};

/// The colour space of an image, as far as it can be told from its headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpaceMode {
    /// The colour space is unknown.
    #[default]
    None,
    /// One grey channel.
    DeviceGray,
    /// Red, green and blue channels.
    DeviceRgb,
    /// Cyan, magenta, yellow and black channels.
    DeviceCmyk,
}

/// Parameters of an image that can be queried without decoding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageParams {
    /// The precision of the components, if it could be determined.
    pub bits_per_component: Option<u8>,
    /// The colour space of the image.
    pub color_space_mode: ColorSpaceMode,
}

/// Scan the headers for the image parameters.
///
/// Any problem just ends the scan, keeping what was found so far.
pub(crate) fn read_image_params(reader: &mut Reader<'_>) -> ImageParams {
    let mut params = ImageParams::default();

    if reader.look(0) == Some(0xff) {
        codestream_params(reader, &mut params);

        return params;
    }

    let mut precedence = None;

    while let Ok(Some(header)) = r#box::read_header(reader) {
        let data_len = header.data_len_or_zero();

        match header.box_type {
            r#box::JP2_HEADER => {}
            r#box::IMAGE_HEADER => {
                let Ok(data) = reader.read_bytes(data_len) else {
                    break;
                };

                // The depth is the byte after height, width and component count.
                params.bits_per_component = data
                    .get(10)
                    .filter(|b| **b != 255)
                    .map(|b| ComponentDepth::from_raw(*b).precision);
            }
            r#box::COLOUR_SPECIFICATION => {
                let Ok(data) = reader.read_bytes(data_len) else {
                    break;
                };

                if let Ok(Some(colr)) = colr::parse(&data) {
                    let mode = colour_space_mode(&colr.colour_space);

                    if mode != ColorSpaceMode::None
                        && precedence.is_none_or(|p| colr.precedence > p)
                    {
                        params.color_space_mode = mode;
                        precedence = Some(colr.precedence);
                    }
                }
            }
            r#box::CONTIGUOUS_CODESTREAM => {
                if params.bits_per_component.is_none()
                    || params.color_space_mode == ColorSpaceMode::None
                {
                    codestream_params(reader, &mut params);
                }

                break;
            }
            _ => {
                if reader.discard(data_len) != data_len {
                    break;
                }
            }
        }
    }

    params
}

fn colour_space_mode(colour_space: &EnumeratedColourSpace) -> ColorSpaceMode {
    match colour_space {
        EnumeratedColourSpace::BiLevel | EnumeratedColourSpace::Greyscale => {
            ColorSpaceMode::DeviceGray
        }
        EnumeratedColourSpace::Cmyk => ColorSpaceMode::DeviceCmyk,
        EnumeratedColourSpace::Srgb
        | EnumeratedColourSpace::EsRgb
        | EnumeratedColourSpace::RommRgb => ColorSpaceMode::DeviceRgb,
        _ => ColorSpaceMode::None,
    }
}

/// Take the parameters from the SIZ marker of a codestream. The colour space
/// is guessed from the number of components.
fn codestream_params(reader: &mut Reader<'_>, params: &mut ImageParams) {
    while let Ok(MarkerHeader {
        marker,
        payload_len,
    }) = markers::read_marker_header(reader)
    {
        if marker != markers::SIZ {
            if reader.discard(payload_len as u64) != payload_len as u64 {
                return;
            }

            continue;
        }

        let Ok(data) = reader.read_bytes(payload_len as u64) else {
            return;
        };

        let mut siz = SliceReader::new(&data);
        // Capabilities, then the image and tile geometry.
        let has_geometry = siz.read_u16().is_some() && (0..8).all(|_| siz.read_u32().is_some());

        let (true, Some(num_components), Some(depth)) =
            (has_geometry, siz.read_u16(), siz.read_u8())
        else {
            return;
        };

        params.bits_per_component = Some(ComponentDepth::from_raw(depth).precision);
        params.color_space_mode = match num_components {
            1 => ColorSpaceMode::DeviceGray,
            3 => ColorSpaceMode::DeviceRgb,
            4 => ColorSpaceMode::DeviceCmyk,
            _ => params.color_space_mode,
        };

        return;
    }
}
