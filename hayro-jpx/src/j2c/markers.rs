//! Codestream markers, defined in Annex A.

use crate::diagnostics::Severity;
use crate::error::{MarkerError, Result, bail};
use crate::reader::Reader;

/// Start of codestream - 'SOC'.
pub(crate) const SOC: u8 = 0x4F;
/// Start of tile-part - 'SOT'.
pub(crate) const SOT: u8 = 0x90;
/// Start of data - 'SOD'.
pub(crate) const SOD: u8 = 0x93;
/// End of codestream - 'EOC'.
pub(crate) const EOC: u8 = 0xD9;

/// Image and tile size - 'SIZ'.
pub(crate) const SIZ: u8 = 0x51;

/// Coding style default - 'COD'.
pub(crate) const COD: u8 = 0x52;
/// Coding style component - 'COC'.
pub(crate) const COC: u8 = 0x53;
/// Region-of-interest - 'RGN'.
pub(crate) const RGN: u8 = 0x5E;
/// Quantization default - 'QCD'.
pub(crate) const QCD: u8 = 0x5C;
/// Quantization component - 'QCC'.
pub(crate) const QCC: u8 = 0x5D;
/// Progression order change - 'POC'.
pub(crate) const POC: u8 = 0x5F;

/// Tile-part lengths - 'TLM'.
pub(crate) const TLM: u8 = 0x55;
/// Packet length, main header - 'PLM'.
pub(crate) const PLM: u8 = 0x57;
/// Packet length, tile-part header - 'PLT'.
pub(crate) const PLT: u8 = 0x58;
/// Packed packet headers, main header - 'PPM'.
pub(crate) const PPM: u8 = 0x60;
/// Packed packet headers, tile-part header - 'PPT'.
pub(crate) const PPT: u8 = 0x61;

/// Start of packet - 'SOP'.
pub(crate) const SOP: u8 = 0x91;
/// End of packet header - 'EPH'.
pub(crate) const EPH: u8 = 0x92;

/// Component registration - 'CRG'.
pub(crate) const CRG: u8 = 0x63;
/// Comment - 'COM'.
pub(crate) const COM: u8 = 0x64;

pub(crate) fn to_string(marker: u8) -> &'static str {
    match marker {
        SOC => "SOC",
        SOT => "SOT",
        SOD => "SOD",
        EOC => "EOC",
        SIZ => "SIZ",
        COD => "COD",
        COC => "COC",
        RGN => "RGN",
        QCD => "QCD",
        QCC => "QCC",
        POC => "POC",
        TLM => "TLM",
        PLM => "PLM",
        PLT => "PLT",
        PPM => "PPM",
        PPT => "PPT",
        SOP => "SOP",
        EPH => "EPH",
        CRG => "CRG",
        COM => "COM",
        _ => "unknown",
    }
}

/// Whether a marker is followed by a marker segment with a length field.
///
/// The delimiting markers as well as the reserved range 0xFF30-0xFF3F
/// stand alone (A.1.1).
pub(crate) fn has_segment(marker: u8) -> bool {
    !matches!(marker, 0x30..=0x3F | SOC | EPH | SOD | EOC)
}

/// A marker together with the length of its segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MarkerHeader {
    pub(crate) marker: u8,
    /// The number of bytes in the segment after the length field.
    pub(crate) payload_len: u16,
}

/// Read the next marker, skipping any bytes in front of it.
///
/// Fill bytes (repeated 0xFF) are allowed, and an 0xFF followed by 0x00 is
/// not a marker.
pub(crate) fn read_marker_header(reader: &mut Reader<'_>) -> Result<MarkerHeader> {
    let mut skipped = 0_u64;

    let marker = loop {
        let mut byte = reader.read_u8()?;

        while byte != 0xff {
            skipped += 1;
            byte = reader.read_u8()?;
        }

        while byte == 0xff {
            byte = reader.read_u8()?;
        }

        if byte != 0x00 {
            break byte;
        }

        skipped += 2;
    };

    if skipped > 0 {
        reader.report(
            Severity::SyntaxWarning,
            format_args!("skipped {skipped} bytes in front of marker"),
        );
    }

    if !has_segment(marker) {
        return Ok(MarkerHeader {
            marker,
            payload_len: 0,
        });
    }

    let length = reader.read_u16()?;

    if length < 2 {
        bail!(MarkerError::ParseFailure(to_string(marker)));
    }

    Ok(MarkerHeader {
        marker,
        payload_len: length - 2,
    })
}
