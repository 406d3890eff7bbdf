//! # Operations
//!
//! One recorded drawing operation. The crate does not know how to rasterize
//! anything - an [`Op::Atom`] is an opaque payload owned by the
//! surface-binding collaborator, carrying only the pieces recording and
//! replay themselves need: a tag, a bounding rect, and whether the operation
//! draws (as opposed to only adjusting state, like a clip or transform).
//!
//! A handful of structural operations *are* known to the crate, because
//! replay and the spatial index need them: save/restore pairs, transform
//! concatenation, rect clips, and nested picture/drawable references.

use std::sync::Arc;

use crate::drawable::DrawableHandle;
use crate::geom::Rect;
use crate::picture::Picture;

/// Four-byte operation tag, in the manner of a RIFF chunk ID. Tags are owned
/// by the collaborator that records atoms; the crate only round-trips them.
#[derive(PartialEq, Eq, Hash, Clone, Copy)]
#[repr(transparent)]
pub struct OpTag(pub [u8; 4]);

impl OpTag {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}
impl std::fmt::Display for OpTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Printable tags as text, anything else as hex.
        if let Some(str) = self.as_str() {
            f.write_str(str)
        } else {
            write!(f, "{:x?}", self.0)
        }
    }
}
impl std::fmt::Debug for OpTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

bitflags::bitflags! {
    /// Per-operation flag byte as it appears on the wire.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OpFlags: u8 {
        /// The operation draws content (index metadata; state-only ops clear it).
        const DRAWS = 1;
        /// A transform accompanies the operation body.
        const HAS_TRANSFORM = 1 << 1;
    }
}

/// One recorded operation.
#[derive(Clone, Debug)]
pub enum Op {
    /// Push the surface's save stack.
    Save,
    /// Pop the surface's save stack.
    Restore,
    /// Concatenate a transform onto the surface's current transform.
    Concat(glam::Affine2),
    /// Intersect the surface's clip with a rect.
    ClipRect(Rect),
    /// Opaque operation owned by the surface-binding collaborator.
    Atom {
        tag: OpTag,
        /// Draws content, as opposed to only changing state.
        draws: bool,
        /// Bounds of whatever the payload draws; [`Rect::EMPTY`] when unknown
        /// or when nothing is drawn.
        bounds: Rect,
        data: Box<[u8]>,
    },
    /// Draw a nested picture. Sent to the surface as a single operation, not
    /// expanded - nesting is the surface's decision.
    Picture {
        picture: Arc<Picture>,
        transform: Option<glam::Affine2>,
    },
    /// Draw a live nested drawable. Only ever present in streams finished as
    /// a drawable; finishing as a picture flattens these to snapshots.
    Drawable {
        drawable: DrawableHandle,
        transform: Option<glam::Affine2>,
    },
}

impl Op {
    /// Whether this operation draws content. Feeds the index's entry metadata.
    #[must_use]
    pub fn draws(&self) -> bool {
        match self {
            Self::Save | Self::Restore | Self::Concat(_) | Self::ClipRect(_) => false,
            Self::Atom { draws, .. } => *draws,
            Self::Picture { .. } | Self::Drawable { .. } => true,
        }
    }
    /// Bounds of this operation in recording coordinates. State-only ops have
    /// no extent of their own, except clips, whose rect is worth indexing.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        match self {
            Self::Save | Self::Restore | Self::Concat(_) => Rect::EMPTY,
            Self::ClipRect(rect) => *rect,
            Self::Atom { bounds, .. } => *bounds,
            Self::Picture { picture, .. } => {
                transformed_bounds(picture.cull_rect(), self.transform())
            }
            Self::Drawable { drawable, .. } => {
                transformed_bounds(drawable.lock().bounds(), self.transform())
            }
        }
    }
    /// The accompanying transform of a nested reference, if any.
    #[must_use]
    pub fn transform(&self) -> Option<glam::Affine2> {
        match self {
            Self::Picture { transform, .. } | Self::Drawable { transform, .. } => *transform,
            _ => None,
        }
    }
    /// Contribution of this operation to [`approximate_bytes_used`]. Heap
    /// payloads count, referenced external objects (nested pictures,
    /// drawables) deliberately do not.
    ///
    /// [`approximate_bytes_used`]: crate::picture::Picture::approximate_bytes_used
    #[must_use]
    pub fn approximate_bytes(&self) -> usize {
        let heap = match self {
            Self::Atom { data, .. } => data.len(),
            _ => 0,
        };
        std::mem::size_of::<Self>() + heap
    }
}

/// Conservative bounds of `rect` once `transform` is applied: the axis-aligned
/// box of the four mapped corners.
fn transformed_bounds(rect: Rect, transform: Option<glam::Affine2>) -> Rect {
    let Some(transform) = transform else {
        return rect;
    };
    if rect.is_empty() {
        return Rect::EMPTY;
    }
    let corners = [
        glam::Vec2::new(rect.left, rect.top),
        glam::Vec2::new(rect.right, rect.top),
        glam::Vec2::new(rect.left, rect.bottom),
        glam::Vec2::new(rect.right, rect.bottom),
    ]
    .map(|corner| transform.transform_point2(corner));
    let mut min = corners[0];
    let mut max = corners[0];
    for corner in &corners[1..] {
        min = min.min(*corner);
        max = max.max(*corner);
    }
    Rect::new(min.x, min.y, max.x, max.y)
}
