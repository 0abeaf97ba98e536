//! Progression orders, defined in Section B.12.
//!
//! The progression order determines in which order the packets of a tile,
//! identified by (layer, resolution, component, precinct), appear in the
//! codestream. The cursor works like an odometer: the innermost index is
//! incremented first and carries over into the next one when it wraps.
//! Combinations that don't exist for a component (because it has fewer
//! resolution levels or fewer precincts) are skipped.

use super::codestream::ProgressionOrder;

#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ProgressionData {
    pub(crate) layer_num: u16,
    pub(crate) resolution: u8,
    pub(crate) component: u16,
    pub(crate) precinct: u32,
}

/// The bounds of each index.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct ProgressionLimits {
    pub(crate) num_layers: u16,
    /// The largest number of resolution levels of all components.
    pub(crate) num_resolutions: u8,
    pub(crate) num_components: u16,
    /// The largest number of precincts of all resolution levels.
    pub(crate) max_precincts: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Axis {
    Layer,
    Resolution,
    Component,
    Precinct,
}

impl ProgressionOrder {
    /// The axes of the progression, from the innermost to the outermost one.
    fn axes(self) -> [Axis; 4] {
        use Axis::*;

        match self {
            Self::LayerResolutionComponentPosition => [Precinct, Component, Resolution, Layer],
            Self::ResolutionLayerComponentPosition => [Precinct, Component, Layer, Resolution],
            Self::ResolutionPositionComponentLayer => [Layer, Component, Precinct, Resolution],
            Self::PositionComponentResolutionLayer => [Layer, Resolution, Component, Precinct],
            Self::ComponentPositionResolutionLayer => [Layer, Resolution, Precinct, Component],
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct ProgressionCursor {
    order: ProgressionOrder,
    limits: ProgressionLimits,
    position: ProgressionData,
    done: bool,
}

impl ProgressionCursor {
    /// Create a cursor that points to the first existing packet.
    pub(crate) fn new(
        order: ProgressionOrder,
        limits: ProgressionLimits,
        exists: impl Fn(&ProgressionData) -> bool,
    ) -> Self {
        let mut cursor = Self {
            order,
            limits,
            position: ProgressionData::default(),
            done: limits.num_layers == 0
                || limits.num_resolutions == 0
                || limits.num_components == 0
                || limits.max_precincts == 0,
        };

        if !cursor.done && !exists(&cursor.position) {
            cursor.advance(exists);
        }

        cursor
    }

    /// The packet the cursor points to, or `None` once all packets were
    /// visited.
    pub(crate) fn current(&self) -> Option<ProgressionData> {
        (!self.done).then_some(self.position)
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    /// Move to the next existing packet.
    pub(crate) fn advance(&mut self, exists: impl Fn(&ProgressionData) -> bool) {
        while !self.done {
            self.done = self.step();

            if exists(&self.position) {
                break;
            }
        }
    }

    /// Increment the odometer. Returns `true` if all indices wrapped around.
    fn step(&mut self) -> bool {
        for axis in self.order.axes() {
            if self.increment(axis) {
                return false;
            }
        }

        true
    }

    /// Increment the index of one axis. Returns `false` if it wrapped around.
    fn increment(&mut self, axis: Axis) -> bool {
        let p = &mut self.position;
        let l = &self.limits;

        match axis {
            Axis::Layer => wrap(&mut p.layer_num, l.num_layers),
            Axis::Resolution => wrap(&mut p.resolution, l.num_resolutions),
            Axis::Component => wrap(&mut p.component, l.num_components),
            Axis::Precinct => wrap(&mut p.precinct, l.max_precincts),
        }
    }
}

fn wrap<T>(value: &mut T, limit: T) -> bool
where
    T: Copy + PartialEq + Default + core::ops::Add<Output = T> + From<u8>,
{
    *value = *value + T::from(1);

    if *value == limit {
        *value = T::default();
        false
    } else {
        true
    }
}
