//! The tag tree, described in Section B.10.2.
//!
//! Tag trees are quad trees where each leaf stores an integer value.
//! Each intermediate node stores the smallest value of all of its children,
//! so the root stores the smallest value across the whole tree.
//!
//! The tree is never stored in full. Each packet header contributes a few
//! bits, and a node's value is only known once its terminating 1-bit has
//! been read. Until then, `value` is a lower bound.

use crate::error::Result;
use crate::reader::BitBuffer;

#[derive(Debug, Clone, Copy, Default)]
struct TagNode {
    value: u32,
    finished: bool,
}

#[derive(Debug, Clone)]
struct Level {
    width: u32,
    nodes: Vec<TagNode>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct TagTree {
    /// The levels of the tree, starting with the leaves.
    levels: Vec<Level>,
}

impl TagTree {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        let mut levels = vec![];

        if width == 0 || height == 0 {
            return Self { levels };
        }

        let (mut w, mut h) = (width, height);

        loop {
            levels.push(Level {
                width: w,
                nodes: vec![TagNode::default(); (w * h) as usize],
            });

            if w == 1 && h == 1 {
                break;
            }

            w = w.div_ceil(2);
            h = h.div_ceil(2);
        }

        Self { levels }
    }

    /// Decode the leaf at (`x`, `y`) as far as `threshold` allows.
    ///
    /// Returns the value of the leaf if it is known and not larger than
    /// `threshold`.
    pub(crate) fn read(
        &mut self,
        x: u32,
        y: u32,
        threshold: u32,
        bits: &mut BitBuffer<'_, '_>,
    ) -> Result<Option<u32>> {
        let mut parent_value = 0;

        for (depth, level) in self.levels.iter_mut().enumerate().rev() {
            let idx = ((y >> depth) * level.width + (x >> depth)) as usize;
            let Some(node) = level.nodes.get_mut(idx) else {
                return Ok(None);
            };

            // A node can never be smaller than its parent, even if it was
            // last visited before the parent was refined.
            node.value = u32::max(node.value, parent_value);

            while !node.finished && node.value <= threshold {
                if bits.read_bit()? == 1 {
                    node.finished = true;
                } else {
                    node.value += 1;
                }
            }

            if !node.finished || node.value > threshold {
                return Ok(None);
            }

            parent_value = node.value;
        }

        Ok(Some(parent_value).filter(|_| !self.levels.is_empty()))
    }
}
