//! The palette box (pclr), defined in I.5.3.4.

use crate::reader::SliceReader;

/// A palette. It is stored but not applied to the samples.
#[allow(dead_code, reason = "palettes are not applied by the pixel stream")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PaletteBox {
    /// Entries of all columns, row by row.
    pub(crate) entries: Vec<i32>,
    pub(crate) columns: Vec<PaletteColumn>,
}

#[allow(dead_code, reason = "palettes are not applied by the pixel stream")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PaletteColumn {
    pub(crate) bit_depth: u8,
    pub(crate) signed: bool,
}

pub(crate) fn parse(data: &[u8]) -> Option<PaletteBox> {
    let mut reader = SliceReader::new(data);
    let num_entries = reader.read_u16()? as usize;
    let num_columns = reader.read_u8()? as usize;

    let mut columns = Vec::with_capacity(num_columns);

    for _ in 0..num_columns {
        let descriptor = reader.read_u8()?;

        columns.push(PaletteColumn {
            bit_depth: (descriptor & 0x7f) + 1,
            signed: descriptor & 0x80 != 0,
        });
    }

    let mut entries = Vec::with_capacity(num_entries * num_columns);

    for _ in 0..num_entries {
        for column in &columns {
            let num_bytes = column.bit_depth.div_ceil(8);
            entries.push(reader.read_n_bytes(num_bytes, column.signed)?);
        }
    }

    Some(PaletteBox { entries, columns })
}
