//! # Surfaces
//!
//! The sink that operations are issued against, both while recording and
//! while replaying. The replay machinery treats a surface as opaque: it forwards
//! operations one at a time and relies on only two structural facts - the
//! surface keeps a save stack whose depth is observable, and forwarding an
//! operation has no effect on any other operation.
//!
//! The save-stack depth is the verification hook for the balanced-draw
//! guarantee of [`Drawable`](crate::drawable::Drawable).

use crate::op::Op;

/// Receiver of drawing operations.
///
/// `save`/`restore`/`concat` default to forwarding the equivalent [`Op`], so
/// a surface that only inspects the operation stream implements [`Self::op`]
/// and [`Self::save_count`] alone. A surface with a real state stack
/// overrides them.
pub trait Surface {
    /// Receive one operation.
    fn op(&mut self, op: &Op);
    /// Current depth of the save stack.
    fn save_count(&self) -> usize;
    fn save(&mut self) {
        self.op(&Op::Save);
    }
    fn restore(&mut self) {
        self.op(&Op::Restore);
    }
    fn concat(&mut self, transform: glam::Affine2) {
        self.op(&Op::Concat(transform));
    }
}

/// Surface that captures everything it receives, in order. Used by tests and
/// by anything that wants to observe a replay as a flat operation list.
#[derive(Default)]
pub struct CaptureSurface {
    ops: Vec<Op>,
    depth: usize,
}

impl CaptureSurface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl Surface for CaptureSurface {
    fn op(&mut self, op: &Op) {
        match op {
            Op::Save => self.depth += 1,
            Op::Restore => {
                // Excess restores at the base of the stack are ignored, they
                // cannot pop what was never pushed.
                if self.depth == 0 {
                    log::warn!("restore with empty save stack");
                    return;
                }
                self.depth -= 1;
            }
            _ => {}
        }
        self.ops.push(op.clone());
    }
    fn save_count(&self) -> usize {
        self.depth
    }
}

#[cfg(test)]
pub(crate) fn ops_equivalent(a: &[Op], b: &[Op]) -> bool {
    // Structural equivalence for tests: same length, same op shapes in the
    // same order. Atom payloads compare by bytes, nested pictures by their
    // own streams (identifiers intentionally excluded - a deserialized
    // picture is equivalent but not identical).
    fn op_eq(a: &Op, b: &Op) -> bool {
        match (a, b) {
            (Op::Save, Op::Save) | (Op::Restore, Op::Restore) => true,
            (Op::Concat(x), Op::Concat(y)) => x == y,
            (Op::ClipRect(x), Op::ClipRect(y)) => x == y,
            (
                Op::Atom {
                    tag: ta,
                    draws: da,
                    bounds: ba,
                    data: xa,
                },
                Op::Atom {
                    tag: tb,
                    draws: db,
                    bounds: bb,
                    data: xb,
                },
            ) => ta == tb && da == db && ba == bb && xa == xb,
            (
                Op::Picture {
                    picture: pa,
                    transform: xa,
                },
                Op::Picture {
                    picture: pb,
                    transform: xb,
                },
            ) => {
                xa == xb
                    && pa.cull_rect() == pb.cull_rect()
                    && ops_equivalent(pa.stream().ops(), pb.stream().ops())
            }
            _ => false,
        }
    }
    a.len() == b.len() && a.iter().zip(b).all(|(a, b)| op_eq(a, b))
}

#[cfg(test)]
mod tests {
    use super::{CaptureSurface, Surface};
    use crate::op::Op;

    #[test]
    fn tracks_depth() {
        let mut surface = CaptureSurface::new();
        assert_eq!(surface.save_count(), 0);
        surface.save();
        surface.save();
        assert_eq!(surface.save_count(), 2);
        surface.restore();
        assert_eq!(surface.save_count(), 1);
    }
    #[test]
    fn excess_restore_ignored() {
        let mut surface = CaptureSurface::new();
        surface.restore();
        assert_eq!(surface.save_count(), 0);
        assert!(surface.is_empty());
    }
    #[test]
    fn default_methods_forward() {
        let mut surface = CaptureSurface::new();
        surface.concat(glam::Affine2::IDENTITY);
        assert!(matches!(surface.ops()[0], Op::Concat(_)));
    }
}
