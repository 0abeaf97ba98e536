/// A rectangle on the reference grid or on one of the sample grids derived
/// from it. `x1` and `y1` are exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct IntRect {
    pub(crate) x0: u32,
    pub(crate) y0: u32,
    pub(crate) x1: u32,
    pub(crate) y1: u32,
}

impl IntRect {
    pub(crate) fn from_ltrb(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub(crate) fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub(crate) fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub(crate) fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    /// Map the rectangle onto a grid that is subsampled by the given factors
    /// (B-12).
    pub(crate) fn subsample(&self, x_factor: u32, y_factor: u32) -> Self {
        Self {
            x0: self.x0.div_ceil(x_factor),
            y0: self.y0.div_ceil(y_factor),
            x1: self.x1.div_ceil(x_factor),
            y1: self.y1.div_ceil(y_factor),
        }
    }

    /// Map the rectangle onto a grid that is coarser by `2^shift` in both
    /// directions (B-14).
    pub(crate) fn reduce(&self, shift: u32) -> Self {
        Self {
            x0: ceil_shr(self.x0, shift),
            y0: ceil_shr(self.y0, shift),
            x1: ceil_shr(self.x1, shift),
            y1: ceil_shr(self.y1, shift),
        }
    }

    /// Clip the rectangle to `other`. Disjoint rectangles result in an
    /// empty rectangle.
    pub(crate) fn intersect(&self, other: Self) -> Self {
        let x0 = u32::max(self.x0, other.x0);
        let y0 = u32::max(self.y0, other.y0);
        let x1 = u32::min(self.x1, other.x1).max(x0);
        let y1 = u32::min(self.y1, other.y1).max(y0);

        Self { x0, y0, x1, y1 }
    }
}

/// `ceil(value / 2^shift)`.
#[inline]
pub(crate) fn ceil_shr(value: u32, shift: u32) -> u32 {
    if shift >= 32 {
        return (value != 0) as u32;
    }

    ((value as u64 + (1_u64 << shift) - 1) >> shift) as u32
}

/// `floor(value / 2^shift)`.
#[inline]
pub(crate) fn floor_shr(value: u32, shift: u32) -> u32 {
    value.checked_shr(shift).unwrap_or(0)
}
