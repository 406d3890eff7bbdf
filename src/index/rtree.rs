//! # R-tree
//!
//! Bulk-loaded R-tree over entry bounds, packed with a sort-tile-recursive
//! (STR) layout: entries are sorted by centroid column, tiled into vertical
//! slices, sorted by centroid row within each slice, and chunked into full
//! leaves; parent levels are packed the same way until a single root
//! remains. The build runs once per `insert` batch - the expected shape is
//! one bulk load immediately after a recording seals - and queries walk the
//! packed levels with an explicit stack.

use smallvec::SmallVec;

use super::{BoundsIndex, EntryMeta, IndexFactory};
use crate::geom::Rect;

// Fanout of the packed tree. Wide and shallow favors the bulk-load-once,
// query-many access pattern.
const MAX_CHILDREN: usize = 11;

#[derive(Clone, Copy, Debug)]
struct Node {
    bounds: Rect,
    /// Offset of the first child into `nodes`, or of the first entry into
    /// `entries` for leaves.
    first: u32,
    count: u32,
    leaf: bool,
}

/// Bulk-loaded, STR-packed R-tree. See the module docs for the layout.
#[derive(Default, Debug)]
pub struct RTree {
    /// All inserted rects, in insertion order. Entry index == slot here.
    slots: Vec<Rect>,
    /// Slot permutation grouped by leaf; leaves reference ranges of this.
    ordered: Vec<u32>,
    /// Packed nodes, root last.
    nodes: Vec<Node>,
    root: Option<u32>,
}

impl RTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn centroid(rect: &Rect) -> (f32, f32) {
        (
            (rect.left + rect.right) * 0.5,
            (rect.top + rect.bottom) * 0.5,
        )
    }
    fn range_bounds_of(ordered: &[u32], slots: &[Rect], first: usize, count: usize) -> Rect {
        ordered[first..first + count]
            .iter()
            .map(|slot| slots[*slot as usize])
            .fold(Rect::EMPTY, |acc, rect| acc.join(&rect))
    }
    fn node_range_bounds(&self, first: usize, count: usize) -> Rect {
        self.nodes[first..first + count]
            .iter()
            .fold(Rect::EMPTY, |acc, node| acc.join(&node.bounds))
    }

    /// Rebuild the packed structure over every slot. Empty rects still get an
    /// entry - they can never satisfy a query, but slot numbering must stay
    /// aligned with insertion order.
    fn build(&mut self) {
        self.nodes.clear();
        self.ordered.clear();
        self.root = None;
        let n = self.slots.len();
        if n == 0 {
            return;
        }
        self.ordered.extend(0..n as u32);

        // Tile slots into leaves: columns by centroid x, rows by centroid y.
        let num_leaves = n.div_ceil(MAX_CHILDREN);
        let columns = (num_leaves as f32).sqrt().ceil() as usize;
        let column_len = n.div_ceil(columns.max(1));
        let slots = &self.slots;
        let sort_key = |axis: usize| {
            move |slot: &u32| {
                let (x, y) = Self::centroid(&slots[*slot as usize]);
                let key = if axis == 0 { x } else { y };
                // NaN sorts last; total order is all the packing needs.
                ordered_float(key)
            }
        };
        self.ordered.sort_by_key(sort_key(0));
        let mut leaf_level: Vec<Node> = Vec::with_capacity(num_leaves);
        let mut first = 0usize;
        // Split borrows: sort the permutation in place per column.
        let mut ordered = std::mem::take(&mut self.ordered);
        for column in ordered.chunks_mut(column_len.max(1)) {
            column.sort_by_key(sort_key(1));
            let mut offset = 0usize;
            while offset < column.len() {
                let count = (column.len() - offset).min(MAX_CHILDREN);
                leaf_level.push(Node {
                    bounds: Rect::EMPTY, // filled below, needs `ordered` back in place
                    first: (first + offset) as u32,
                    count: count as u32,
                    leaf: true,
                });
                offset += count;
            }
            first += column.len();
        }
        self.ordered = ordered;
        for node in &mut leaf_level {
            node.bounds = Self::range_bounds_of(
                &self.ordered,
                &self.slots,
                node.first as usize,
                node.count as usize,
            );
        }

        // Pack parent levels until one node remains. Each level's nodes are
        // appended contiguously, so a parent's children are a plain range.
        let mut level_first = self.nodes.len();
        self.nodes.extend_from_slice(&leaf_level);
        let mut level_len = leaf_level.len();
        while level_len > 1 {
            let parent_first = self.nodes.len();
            let mut offset = 0usize;
            while offset < level_len {
                let count = (level_len - offset).min(MAX_CHILDREN);
                let bounds = self.node_range_bounds(level_first + offset, count);
                self.nodes.push(Node {
                    bounds,
                    first: (level_first + offset) as u32,
                    count: count as u32,
                    leaf: false,
                });
                offset += count;
            }
            level_first = parent_first;
            level_len = self.nodes.len() - parent_first;
        }
        self.root = Some((self.nodes.len() - 1) as u32);
    }
}

// f32 key with a total order, NaN greatest.
fn ordered_float(value: f32) -> u32 {
    let bits = value.to_bits();
    if bits & 0x8000_0000 == 0 {
        bits ^ 0x8000_0000
    } else {
        !bits
    }
}

impl BoundsIndex for RTree {
    fn insert(&mut self, rects: &[Rect], meta: Option<&[EntryMeta]>) {
        if let Some(meta) = meta {
            debug_assert_eq!(meta.len(), rects.len(), "metadata length mismatch");
        }
        // The draw/state metadata does not change what gets indexed; queries
        // answer for every entry and the caller filters.
        if rects.is_empty() {
            return;
        }
        self.slots.extend_from_slice(rects);
        self.build();
    }

    fn search(&self, query: Rect, out: &mut Vec<usize>) {
        let Some(root) = self.root else {
            return;
        };
        if query.is_empty() {
            return;
        }
        let mut stack: SmallVec<[u32; 32]> = SmallVec::new();
        stack.push(root);
        while let Some(node) = stack.pop() {
            let node = self.nodes[node as usize];
            if !node.bounds.intersects(&query) {
                continue;
            }
            let first = node.first as usize;
            let count = node.count as usize;
            if node.leaf {
                for slot in &self.ordered[first..first + count] {
                    if self.slots[*slot as usize].intersects(&query) {
                        out.push(*slot as usize);
                    }
                }
            } else {
                stack.extend((first..first + count).map(|child| child as u32));
            }
        }
    }

    fn bytes_used(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.slots.capacity() * std::mem::size_of::<Rect>()
            + self.ordered.capacity() * std::mem::size_of::<u32>()
            + self.nodes.capacity() * std::mem::size_of::<Node>()
    }
}

/// Factory producing [`RTree`] indices.
#[derive(Clone, Copy, Debug, Default)]
pub struct RTreeFactory;

impl IndexFactory for RTreeFactory {
    fn create(&self) -> Box<dyn BoundsIndex> {
        Box::new(RTree::new())
    }
}
