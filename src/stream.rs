//! # Command streams
//!
//! The ordered, sealed sequence of operations behind a picture or a recorded
//! drawable. A stream is assembled exactly once, by a
//! [`Recorder`](crate::record::Recorder) session, and never mutated after
//! sealing - playback only reads.

use crate::geom::Rect;
use crate::op::Op;
use crate::surface::Surface;

/// A sealed, append-complete operation sequence plus the cull rect that
/// bounds everything recorded.
#[derive(Clone, Debug)]
pub struct CommandStream {
    ops: Box<[Op]>,
    cull: Rect,
}

impl CommandStream {
    /// Seal `ops` under `cull`. Internal: only recorder finish and the codec
    /// construct streams.
    pub(crate) fn seal(ops: Vec<Op>, cull: Rect) -> Self {
        Self {
            ops: ops.into_boxed_slice(),
            cull,
        }
    }
    /// An empty stream, as used by placeholder pictures.
    pub(crate) fn empty(cull: Rect) -> Self {
        Self {
            ops: Box::new([]),
            cull,
        }
    }
    #[must_use]
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }
    #[must_use]
    pub fn cull_rect(&self) -> Rect {
        self.cull
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }
    /// Operation count, recursing into nested pictures when `nested`.
    ///
    /// Explicitly approximate: a consumer may fold or elide operations, so the
    /// value is a scale hint, not an exact replay length.
    #[must_use]
    pub fn approximate_op_count(&self, nested: bool) -> usize {
        let mut count = self.ops.len();
        if nested {
            for op in self.ops.iter() {
                if let Op::Picture { picture, .. } = op {
                    count += picture.approximate_op_count(true);
                }
            }
        }
        count
    }
    /// Heap footprint of the stream structure itself. Referenced external
    /// objects are excluded on purpose, keeping the call cheap; this is a
    /// deliberate under-estimate.
    #[must_use]
    pub fn approximate_bytes_used(&self) -> usize {
        std::mem::size_of::<Self>() + self.ops.iter().map(Op::approximate_bytes).sum::<usize>()
    }
}

/// Replay `ops` in order against `surface`, routing structural operations
/// through the surface's save/restore/concat entry points and drawing live
/// drawables balanced. Returns the number of operations executed.
///
/// `abort` is polled *between* operations; cancellation is cooperative, never
/// preemptive, and stopping early is a successful outcome. Whatever prefix
/// ran, the surface is left balanced: saves the prefix opened are closed
/// before returning.
pub(crate) fn replay(
    ops: &[Op],
    surface: &mut dyn Surface,
    abort: Option<&mut dyn FnMut() -> bool>,
) -> usize {
    replay_filtered(ops, surface, abort, |_, _| true)
}

/// [`replay`] executing only the operations `keep` approves. State operations
/// should always be kept - skipping a draw is sound, skipping a save or
/// transform is not - which is the caller's responsibility.
pub(crate) fn replay_filtered(
    ops: &[Op],
    surface: &mut dyn Surface,
    mut abort: Option<&mut dyn FnMut() -> bool>,
    mut keep: impl FnMut(usize, &Op) -> bool,
) -> usize {
    let mut executed = 0;
    let mut open = 0usize;
    for (position, op) in ops.iter().enumerate() {
        if abort.as_mut().is_some_and(|abort| abort()) {
            log::trace!("playback aborted after {executed} of {} ops", ops.len());
            break;
        }
        if !keep(position, op) {
            continue;
        }
        match op {
            Op::Save => {
                surface.save();
                open += 1;
            }
            Op::Restore => {
                surface.restore();
                open = open.saturating_sub(1);
            }
            Op::Concat(transform) => surface.concat(*transform),
            Op::Drawable {
                drawable,
                transform,
            } => drawable.lock().draw_transformed(surface, *transform),
            other => surface.op(other),
        }
        executed += 1;
    }
    // Balance the prefix.
    for _ in 0..open {
        surface.restore();
    }
    executed
}

#[cfg(test)]
mod tests {
    use super::CommandStream;
    use crate::geom::Rect;
    use crate::op::{Op, OpTag};

    fn atom(len: usize) -> Op {
        Op::Atom {
            tag: OpTag(*b"blob"),
            draws: true,
            bounds: Rect::from_wh(1.0, 1.0),
            data: vec![0u8; len].into_boxed_slice(),
        }
    }

    #[test]
    fn bytes_used_counts_payloads() {
        let small = CommandStream::seal(vec![atom(0)], Rect::EMPTY);
        let big = CommandStream::seal(vec![atom(4096)], Rect::EMPTY);
        assert!(big.approximate_bytes_used() >= small.approximate_bytes_used() + 4096);
    }
    #[test]
    fn op_count_flat() {
        let stream = CommandStream::seal(vec![Op::Save, atom(0), Op::Restore], Rect::EMPTY);
        assert_eq!(stream.approximate_op_count(false), 3);
        // No nested pictures: nested count equals flat count.
        assert_eq!(stream.approximate_op_count(true), 3);
    }
}
