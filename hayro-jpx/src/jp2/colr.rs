//! The colour specification box (colr), defined in I.5.3.3 and extended by
//! JPX (M.11.7).

use crate::error::{FormatError, Result};
use crate::reader::SliceReader;

/// A colour specification the decoder understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ColourSpecificationBox {
    pub(crate) colour_space: EnumeratedColourSpace,
    /// Among several colour specifications, the one with the highest
    /// precedence is used.
    pub(crate) precedence: i8,
}

/// Parameters of the CIELab colour space (Table M.27).
#[allow(dead_code, reason = "stored for completeness, samples are passed through unconverted")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CieLab {
    pub(crate) range_l: u32,
    pub(crate) offset_l: u32,
    pub(crate) range_a: u32,
    pub(crate) offset_a: u32,
    pub(crate) range_b: u32,
    pub(crate) offset_b: u32,
    pub(crate) illuminant: u32,
}

impl Default for CieLab {
    /// The defaults for 8-bit samples under illuminant D50.
    fn default() -> Self {
        Self {
            range_l: 100,
            offset_l: 0,
            range_a: 255,
            offset_a: 128,
            range_b: 255,
            offset_b: 96,
            illuminant: 0x00443530,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnumeratedColourSpace {
    BiLevel,
    YCbCr1,
    YCbCr2,
    YCbCr3,
    PhotoYcc,
    Cmy,
    Cmyk,
    Ycck,
    CieLab(CieLab),
    BiLevel2,
    Srgb,
    Greyscale,
    Sycc,
    EsRgb,
    RommRgb,
    YPbPr112560,
    YPbPr125050,
}

impl EnumeratedColourSpace {
    /// The number of colour channels.
    pub(crate) fn num_channels(&self) -> u16 {
        match self {
            Self::BiLevel | Self::BiLevel2 | Self::Greyscale => 1,
            Self::Cmyk | Self::Ycck => 4,
            _ => 3,
        }
    }
}

/// Parse a colour specification box.
///
/// Returns `None` for specifications that are recognized but not used by
/// the decoder, like ICC profiles.
pub(crate) fn parse(data: &[u8]) -> Result<Option<ColourSpecificationBox>> {
    let mut reader = SliceReader::new(data);
    let invalid = || FormatError::InvalidColourSpecification;

    let method = reader.read_u8().ok_or_else(invalid)?;
    let precedence = reader.read_i8().ok_or_else(invalid)?;
    // The approximation accuracy doesn't matter here.
    let _ = reader.read_u8().ok_or_else(invalid)?;

    // Methods 2 to 4 are ICC profiles and vendor colour spaces.
    if method != 1 {
        ltrace!("ignoring colour specification with method {method}");

        return Ok(None);
    }

    let colour_space = match reader.read_u32().ok_or_else(invalid)? {
        0 => EnumeratedColourSpace::BiLevel,
        1 => EnumeratedColourSpace::YCbCr1,
        3 => EnumeratedColourSpace::YCbCr2,
        4 => EnumeratedColourSpace::YCbCr3,
        9 => EnumeratedColourSpace::PhotoYcc,
        11 => EnumeratedColourSpace::Cmy,
        12 => EnumeratedColourSpace::Cmyk,
        13 => EnumeratedColourSpace::Ycck,
        14 => EnumeratedColourSpace::CieLab(cie_lab(&mut reader).ok_or_else(invalid)?),
        15 => EnumeratedColourSpace::BiLevel2,
        16 => EnumeratedColourSpace::Srgb,
        17 => EnumeratedColourSpace::Greyscale,
        18 => EnumeratedColourSpace::Sycc,
        20 => EnumeratedColourSpace::EsRgb,
        21 => EnumeratedColourSpace::RommRgb,
        22 => EnumeratedColourSpace::YPbPr112560,
        23 => EnumeratedColourSpace::YPbPr125050,
        // CIEJab (19) is not allowed in PDF.
        _ => return Err(invalid().into()),
    };

    Ok(Some(ColourSpecificationBox {
        colour_space,
        precedence,
    }))
}

/// The CIELab parameters are either all present or all absent.
fn cie_lab(reader: &mut SliceReader<'_>) -> Option<CieLab> {
    match reader.remaining() {
        0 => Some(CieLab::default()),
        28 => Some(CieLab {
            range_l: reader.read_u32()?,
            offset_l: reader.read_u32()?,
            range_a: reader.read_u32()?,
            offset_a: reader.read_u32()?,
            range_b: reader.read_u32()?,
            offset_b: reader.read_u32()?,
            illuminant: reader.read_u32()?,
        }),
        _ => None,
    }
}
