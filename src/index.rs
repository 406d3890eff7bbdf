//! # Bounds indexing
//!
//! The spatial acceleration contract a picture may carry: bulk-inserted
//! bounding rects, queried by rectangle, answering with *entry indices*
//! (insertion positions), never rects. A query may over-report - the caller
//! re-tests every hit exactly - but it must never omit an intersecting entry.
//!
//! Implementations are interchangeable behind [`BoundsIndex`], selected at
//! recording time through an [`IndexFactory`]. The reference implementation
//! is a bulk-loaded R-tree ([`rtree::RTree`]); [`LinearIndex`] is the
//! explicit no-acceleration form; the default is no index at all.

use crate::geom::Rect;

pub mod rtree;

pub use rtree::RTreeFactory;

/// Optional per-entry metadata supplied alongside bounds at insertion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntryMeta {
    /// The entry corresponds to an operation that draws content, rather than
    /// a state-only operation such as a clip or transform.
    pub is_draw: bool,
}

/// Spatial index over bounding rects.
///
/// Entries are assigned indices `0..n` in insertion order; repeated `insert`
/// calls append. The contract only requires query correctness over the union
/// of everything inserted.
pub trait BoundsIndex: Send + Sync {
    /// Bulk-insert `rects`, with optional parallel `meta` of equal length.
    fn insert(&mut self, rects: &[Rect], meta: Option<&[EntryMeta]>);
    /// Push the index of every entry whose rect intersects `query` onto
    /// `out`. No false negatives; false positives permitted.
    fn search(&self, query: Rect, out: &mut Vec<usize>);
    /// Approximate memory footprint of the index structure.
    fn bytes_used(&self) -> usize;
}

/// Produces fresh, empty [`BoundsIndex`] instances on demand.
///
/// `create` must be idempotent across calls - each call yields an
/// independent, empty index - and side-effect-free beyond allocation.
pub trait IndexFactory {
    fn create(&self) -> Box<dyn BoundsIndex>;
}

/// Factory producing [`LinearIndex`] instances: no spatial acceleration,
/// just a stored-rect scan. The explicit form of "no index" for callers
/// that must pass *some* factory.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinearFactory;

impl IndexFactory for LinearFactory {
    fn create(&self) -> Box<dyn BoundsIndex> {
        Box::new(LinearIndex::default())
    }
}

/// Trivial index: stores every rect and answers queries by scanning all of
/// them. Exact, so never a false positive either.
#[derive(Debug, Default)]
pub struct LinearIndex {
    slots: Vec<Rect>,
}

impl BoundsIndex for LinearIndex {
    fn insert(&mut self, rects: &[Rect], meta: Option<&[EntryMeta]>) {
        if let Some(meta) = meta {
            debug_assert_eq!(meta.len(), rects.len(), "metadata length mismatch");
        }
        self.slots.extend_from_slice(rects);
    }
    fn search(&self, query: Rect, out: &mut Vec<usize>) {
        out.extend(
            self.slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.intersects(&query))
                .map(|(slot, _)| slot),
        );
    }
    fn bytes_used(&self) -> usize {
        std::mem::size_of::<Self>() + self.slots.capacity() * std::mem::size_of::<Rect>()
    }
}

#[cfg(test)]
mod tests {
    use super::{BoundsIndex, EntryMeta, IndexFactory, LinearFactory, RTreeFactory};
    use crate::geom::Rect;

    #[test]
    fn factory_yields_independent_indices() {
        let factory = RTreeFactory;
        let mut a = factory.create();
        let b = factory.create();
        a.insert(&[Rect::from_wh(10.0, 10.0)], None);
        let mut hits = Vec::new();
        b.search(Rect::from_wh(100.0, 100.0), &mut hits);
        assert!(hits.is_empty(), "indices must not share state");
    }
    #[test]
    fn meta_length_matches() {
        let mut index = RTreeFactory.create();
        index.insert(
            &[Rect::from_wh(1.0, 1.0), Rect::from_wh(2.0, 2.0)],
            Some(&[EntryMeta { is_draw: true }, EntryMeta::default()]),
        );
        let mut hits = Vec::new();
        index.search(Rect::from_wh(3.0, 3.0), &mut hits);
        hits.sort_unstable();
        assert_eq!(hits, [0, 1]);
    }
    #[test]
    fn linear_agrees_with_rtree() {
        let rects = [
            Rect::new(10.0, 10.0, 20.0, 20.0),
            Rect::new(50.0, 50.0, 60.0, 60.0),
            Rect::EMPTY,
        ];
        let mut linear = LinearFactory.create();
        let mut rtree = RTreeFactory.create();
        linear.insert(&rects, None);
        rtree.insert(&rects, None);
        for query in [
            Rect::new(0.0, 0.0, 30.0, 30.0),
            Rect::new(0.0, 0.0, 100.0, 100.0),
            Rect::new(30.0, 30.0, 40.0, 40.0),
        ] {
            let (mut a, mut b) = (Vec::new(), Vec::new());
            linear.search(query, &mut a);
            rtree.search(query, &mut b);
            a.sort_unstable();
            b.sort_unstable();
            assert_eq!(a, b, "query {query:?}");
        }
    }
}
