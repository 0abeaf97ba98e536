//! Reading JP2 box headers, as specified in I.4.

use crate::error::{FormatError, Result, bail};
use crate::reader::Reader;

/// JP2 signature box - 'jP\040\040'.
pub(crate) const JP2_SIGNATURE: u32 = 0x6A502020;
/// File Type box - 'ftyp'.
pub(crate) const FILE_TYPE: u32 = 0x66747970;
/// JP2 Header box - 'jp2h'.
pub(crate) const JP2_HEADER: u32 = 0x6A703268;
/// Image Header box - 'ihdr'.
pub(crate) const IMAGE_HEADER: u32 = 0x69686472;
/// Bits Per Component box - 'bpcc'.
pub(crate) const BITS_PER_COMPONENT: u32 = 0x62706363;
/// Colour Specification box - 'colr'.
pub(crate) const COLOUR_SPECIFICATION: u32 = 0x636F6C72;
/// Palette box - 'pclr'.
pub(crate) const PALETTE: u32 = 0x70636C72;
/// Component Mapping box - 'cmap'.
pub(crate) const COMPONENT_MAPPING: u32 = 0x636D6170;
/// Channel Definition box - 'cdef'.
pub(crate) const CHANNEL_DEFINITION: u32 = 0x63646566;
/// Contiguous Codestream box - 'jp2c'.
pub(crate) const CONTIGUOUS_CODESTREAM: u32 = 0x6A703263;

/// The header of a box. The payload follows it in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BoxHeader {
    pub(crate) box_type: u32,
    /// The length of the payload in bytes, or `None` if the box extends to
    /// the end of the file.
    pub(crate) data_len: Option<u64>,
}

impl BoxHeader {
    /// The payload length, with boxes of unknown length counting as empty.
    pub(crate) fn data_len_or_zero(&self) -> u64 {
        self.data_len.unwrap_or(0)
    }
}

/// Converts a box tag to its string representation.
///
/// Box tags are stored as 4-byte ASCII codes in big-endian format.
pub(crate) fn tag_to_string(tag: u32) -> String {
    String::from_utf8_lossy(&tag.to_be_bytes()).into_owned()
}

/// Read the next box header. Returns `None` if there are no more boxes.
pub(crate) fn read_header(reader: &mut Reader<'_>) -> Result<Option<BoxHeader>> {
    if reader.look(0).is_none() {
        return Ok(None);
    }

    let l_box = reader.read_u32().map_err(|_| FormatError::InvalidBox)?;
    let box_type = reader.read_u32().map_err(|_| FormatError::InvalidBox)?;

    let data_len = match l_box {
        // The box contains all bytes up to the end of the file.
        0 => None,
        // The XLBox field holds the actual length, including the 16 bytes of
        // the header.
        1 => {
            let high = reader.read_u32().map_err(|_| FormatError::InvalidBox)?;
            let low = reader.read_u32().map_err(|_| FormatError::InvalidBox)?;

            if high != 0 {
                // Boxes larger than 4 GiB are not supported.
                bail!(FormatError::InvalidBox);
            }

            Some(
                (low as u64)
                    .checked_sub(16)
                    .ok_or(FormatError::InvalidBox)?,
            )
        }
        _ => Some((l_box as u64).checked_sub(8).ok_or(FormatError::InvalidBox)?),
    };

    ltrace!(
        "box {} with {} bytes",
        tag_to_string(box_type),
        data_len.map_or(-1, |l| l as i64)
    );

    Ok(Some(BoxHeader { box_type, data_len }))
}
