//! # Geometry
//!
//! The one geometric type the crate owns itself: an axis-aligned, f32
//! rectangle in left/top/right/bottom form. Transforms are [`glam::Affine2`]
//! throughout - the crate never interprets them, it only records and
//! replays them.

/// Axis-aligned rectangle, `left <= right` and `top <= bottom` when
/// non-empty. A rect with a non-positive extent on either axis is *empty*:
/// it has no area, intersects nothing, and contains nothing.
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    /// The canonical empty rect at the origin.
    pub const EMPTY: Self = Self {
        left: 0.0,
        top: 0.0,
        right: 0.0,
        bottom: 0.0,
    };
    #[must_use]
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }
    /// Rect anchored at the origin with the given extent.
    #[must_use]
    pub const fn from_wh(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }
    #[must_use]
    pub fn width(&self) -> f32 {
        self.right - self.left
    }
    #[must_use]
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
    /// True when there is no enclosed area. NaN extents count as empty, which
    /// makes them drop out of intersection tests rather than poison them.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.left < self.right && self.top < self.bottom)
    }
    /// Open-interval intersection test: rects that merely share an edge do
    /// not intersect, and empty rects intersect nothing.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }
    /// Overlapping region, or `None` when the rects do not intersect.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        self.intersects(other).then(|| {
            Self::new(
                self.left.max(other.left),
                self.top.max(other.top),
                self.right.min(other.right),
                self.bottom.min(other.bottom),
            )
        })
    }
    /// Smallest rect containing both. Empty operands are ignored; joining two
    /// empty rects is empty.
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }
    #[must_use]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        !self.is_empty() && x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }
    /// Translate by `(dx, dy)`.
    #[must_use]
    pub fn offset(&self, dx: f32, dy: f32) -> Self {
        Self::new(
            self.left + dx,
            self.top + dy,
            self.right + dx,
            self.bottom + dy,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::Rect;

    #[test]
    fn empty_semantics() {
        assert!(Rect::EMPTY.is_empty());
        // Inverted extents are empty too.
        assert!(Rect::new(10.0, 0.0, 0.0, 10.0).is_empty());
        assert!(Rect::new(f32::NAN, 0.0, 10.0, 10.0).is_empty());
        // Empty never intersects, not even itself.
        assert!(!Rect::EMPTY.intersects(&Rect::EMPTY));
        assert!(!Rect::EMPTY.intersects(&Rect::from_wh(100.0, 100.0)));
    }
    #[test]
    fn intersect_join() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 15.0, 15.0);
        assert_eq!(a.intersect(&b), Some(Rect::new(5.0, 5.0, 10.0, 10.0)));
        assert_eq!(a.join(&b), Rect::new(0.0, 0.0, 15.0, 15.0));
        // Edge-adjacent rects do not intersect.
        let c = Rect::new(10.0, 0.0, 20.0, 10.0);
        assert!(!a.intersects(&c));
        // Join with empty is identity.
        assert_eq!(a.join(&Rect::EMPTY), a);
    }
    #[test]
    fn contains_half_open() {
        let r = Rect::from_wh(10.0, 10.0);
        assert!(r.contains(0.0, 0.0));
        assert!(!r.contains(10.0, 10.0));
    }
}
