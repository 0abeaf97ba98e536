//! The component mapping box (cmap), defined in I.5.3.5.

#![allow(
    dead_code,
    reason = "component mappings are stored, but the pixel stream passes samples through"
)]

use crate::reader::SliceReader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ComponentMappingBox {
    pub(crate) entries: Vec<ComponentMappingEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ComponentMappingEntry {
    pub(crate) component_index: u16,
    pub(crate) mapping_type: ComponentMappingType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ComponentMappingType {
    Direct,
    Palette { column: u8 },
}

pub(crate) fn parse(data: &[u8]) -> Option<ComponentMappingBox> {
    let mut reader = SliceReader::new(data);
    let mut entries = Vec::with_capacity(data.len() / 4);

    // Trailing bytes that don't form a whole entry are ignored.
    for _ in 0..data.len() / 4 {
        let component_index = reader.read_u16()?;
        let mapping_type = reader.read_u8()?;
        let palette_column = reader.read_u8()?;

        let mapping_type = match mapping_type {
            0 => ComponentMappingType::Direct,
            1 => ComponentMappingType::Palette {
                column: palette_column,
            },
            _ => return None,
        };

        entries.push(ComponentMappingEntry {
            component_index,
            mapping_type,
        });
    }

    Some(ComponentMappingBox { entries })
}
