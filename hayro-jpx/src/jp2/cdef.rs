//! The channel definition box (cdef), defined in I.5.3.6.

use crate::reader::SliceReader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChannelDefinitionBox {
    pub(crate) channel_definitions: Vec<ChannelDefinition>,
}

impl ChannelDefinitionBox {
    /// Whether any channel holds opacity values.
    pub(crate) fn has_opacity(&self) -> bool {
        self.channel_definitions
            .iter()
            .any(|d| {
                matches!(
                    d.channel_type,
                    ChannelType::Opacity | ChannelType::PremultipliedOpacity
                )
            })
    }
}

#[allow(dead_code, reason = "only the channel types are evaluated")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChannelDefinition {
    pub(crate) channel_index: u16,
    pub(crate) channel_type: ChannelType,
    pub(crate) association: ChannelAssociation,
}

/// Table I.16.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChannelType {
    Colour,
    Opacity,
    PremultipliedOpacity,
    Unspecified,
}

impl ChannelType {
    fn from_raw(value: u16) -> Self {
        match value {
            0 => Self::Colour,
            1 => Self::Opacity,
            2 => Self::PremultipliedOpacity,
            _ => Self::Unspecified,
        }
    }
}

/// Table I.17.
#[allow(dead_code, reason = "only the channel types are evaluated")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChannelAssociation {
    WholeImage,
    Colour(u16),
    Unassociated,
}

impl ChannelAssociation {
    fn from_raw(value: u16) -> Self {
        match value {
            0 => Self::WholeImage,
            u16::MAX => Self::Unassociated,
            v => Self::Colour(v),
        }
    }
}

pub(crate) fn parse(data: &[u8]) -> Option<ChannelDefinitionBox> {
    let mut reader = SliceReader::new(data);
    let count = reader.read_u16()? as usize;
    let mut channel_definitions = Vec::with_capacity(count.min(data.len() / 6));

    for _ in 0..count {
        channel_definitions.push(ChannelDefinition {
            channel_index: reader.read_u16()?,
            channel_type: ChannelType::from_raw(reader.read_u16()?),
            association: ChannelAssociation::from_raw(reader.read_u16()?),
        });
    }

    Some(ChannelDefinitionBox {
        channel_definitions,
    })
}
