//! # Recording
//!
//! A [`Recorder`] hosts at most one recording session at a time. `begin`
//! hands out the session's [`RecordingSurface`] - the sink drawing calls are
//! issued against - and one of the `finish_*` operations seals what was
//! recorded into an immutable [`Picture`] or a live [`Drawable`].
//!
//! Session misuse (`begin` while active, `finish` while idle) is a contract
//! violation by the caller and panics. Using a surface after its session
//! finished is ruled out statically: the surface is only reachable as a
//! borrow of the recorder, which every `finish_*` call ends.
//!
//! Recorders are not internally synchronized; a recorder belongs to one
//! thread at a time.

use std::sync::Arc;

use crate::drawable::{DrawContent, Drawable, DrawableHandle};
use crate::geom::Rect;
use crate::index::{BoundsIndex, EntryMeta, IndexFactory};
use crate::op::{Op, OpTag};
use crate::picture::Picture;
use crate::stream::{self, CommandStream};
use crate::surface::Surface;

/// Single-use session host. See the module docs for the lifecycle.
#[derive(Default, Debug)]
pub struct Recorder {
    session: Option<RecordingSurface>,
}

impl Recorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    /// Begin a recording session bounded by `cull`, without spatial indexing.
    ///
    /// Drawing outside `cull` is permitted, but whether it appears during
    /// playback is unspecified - consumers may cull against it aggressively.
    ///
    /// # Panics
    /// If a session is already active.
    pub fn begin(&mut self, cull: Rect) -> &mut RecordingSurface {
        self.begin_inner(cull, None)
    }
    /// [`Self::begin`], additionally requesting a spatial index built by
    /// `factory` when the session is finished as a picture.
    pub fn begin_with_index(
        &mut self,
        cull: Rect,
        factory: &dyn IndexFactory,
    ) -> &mut RecordingSurface {
        self.begin_inner(cull, Some(factory.create()))
    }
    fn begin_inner(
        &mut self,
        cull: Rect,
        index: Option<Box<dyn BoundsIndex>>,
    ) -> &mut RecordingSurface {
        assert!(
            self.session.is_none(),
            "recording session already active - finish it before calling begin"
        );
        log::trace!("begin recording, cull {cull:?}");
        self.session
            .insert(RecordingSurface {
                ops: Vec::new(),
                cull,
                depth: 0,
                index,
            })
    }
    /// The active session's surface, or `None` when idle.
    pub fn surface(&mut self) -> Option<&mut RecordingSurface> {
        self.session.as_mut()
    }
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Seal the session into an immutable picture.
    ///
    /// Any drawables referenced during recording are flattened: each is
    /// replaced by a snapshot of its state *as of this call*, so the picture
    /// never changes afterwards. Unbalanced saves are closed.
    ///
    /// # Panics
    /// If no session is active (including a second finish without an
    /// intervening `begin`).
    pub fn finish_as_picture(&mut self) -> Arc<Picture> {
        self.finish_picture_inner(None)
    }
    /// [`Self::finish_as_picture`] with `cull` substituted for the rect given
    /// at `begin` - for bounds only discovered after recording. Index entries
    /// keep each operation's own bounds; only the stream's cull changes.
    pub fn finish_as_picture_with_cull(&mut self, cull: Rect) -> Arc<Picture> {
        self.finish_picture_inner(Some(cull))
    }
    fn finish_picture_inner(&mut self, cull_override: Option<Rect>) -> Arc<Picture> {
        let session = self.take_session();
        let cull = cull_override.unwrap_or(session.cull);
        let mut ops = session.ops;
        // Freeze live drawables at their current state.
        for op in &mut ops {
            if let Op::Drawable {
                drawable,
                transform,
            } = op
            {
                let snapshot = drawable.lock().snapshot();
                *op = Op::Picture {
                    picture: snapshot,
                    transform: *transform,
                };
            }
        }
        let index = session.index.map(|mut index| {
            let rects: Vec<Rect> = ops.iter().map(Op::bounds).collect();
            let meta: Vec<EntryMeta> = ops
                .iter()
                .map(|op| EntryMeta { is_draw: op.draws() })
                .collect();
            index.insert(&rects, Some(&meta));
            index
        });
        log::trace!("finish recording as picture, {} ops", ops.len());
        Picture::from_parts(CommandStream::seal(ops, cull), index)
    }

    /// Seal the session into a [`Drawable`] instead of an immutable picture.
    ///
    /// Unlike [`Self::finish_as_picture`], nested drawables referenced during
    /// recording stay *live*: drawing or snapshotting the result later
    /// reflects their then-current state. A requested spatial index is
    /// discarded - a mutable composition cannot carry a frozen index.
    ///
    /// # Panics
    /// If no session is active.
    pub fn finish_as_drawable(&mut self) -> Drawable {
        let session = self.take_session();
        if session.index.is_some() {
            log::warn!("spatial index requested but session finished as drawable; dropping it");
        }
        log::trace!("finish recording as drawable, {} ops", session.ops.len());
        Drawable::from_boxed(Box::new(RecordedContent {
            stream: CommandStream::seal(session.ops, session.cull),
        }))
    }

    fn take_session(&mut self) -> RecordingSurface {
        let mut session = self
            .session
            .take()
            .expect("no active recording session to finish");
        // Close saves left open so sealed streams replay balanced.
        while session.depth > 0 {
            session.push(Op::Restore);
        }
        session
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            log::debug!(
                "recorder dropped with an active session; discarding {} ops",
                session.ops.len()
            );
        }
    }
}

/// The sink of an active recording session. Implements [`Surface`], so a
/// recording can itself be a playback target (that is how snapshots and
/// re-recording work).
pub struct RecordingSurface {
    ops: Vec<Op>,
    cull: Rect,
    depth: usize,
    index: Option<Box<dyn BoundsIndex>>,
}

impl std::fmt::Debug for RecordingSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSurface")
            .field("ops", &self.ops.len())
            .field("cull", &self.cull)
            .field("depth", &self.depth)
            .field("indexed", &self.index.is_some())
            .finish()
    }
}

impl RecordingSurface {
    fn push(&mut self, op: Op) {
        match op {
            Op::Save => self.depth += 1,
            Op::Restore => {
                if self.depth == 0 {
                    log::warn!("restore recorded with empty save stack; ignored");
                    return;
                }
                self.depth -= 1;
            }
            _ => {}
        }
        self.ops.push(op);
    }
    /// The cull rect this session was begun with.
    #[must_use]
    pub fn cull_rect(&self) -> Rect {
        self.cull
    }
    /// Record an opaque operation.
    pub fn atom(&mut self, tag: OpTag, draws: bool, bounds: Rect, data: impl Into<Box<[u8]>>) {
        self.push(Op::Atom {
            tag,
            draws,
            bounds,
            data: data.into(),
        });
    }
    /// Record an intersecting rect clip.
    pub fn clip_rect(&mut self, rect: Rect) {
        self.push(Op::ClipRect(rect));
    }
    /// Record drawing a nested picture as a single operation.
    pub fn draw_picture(&mut self, picture: &Arc<Picture>, transform: Option<glam::Affine2>) {
        self.push(Op::Picture {
            picture: picture.clone(),
            transform,
        });
    }
    /// Record drawing a drawable. Whether the reference stays live depends on
    /// how the session is finished; see [`Recorder::finish_as_drawable`].
    pub fn draw_drawable(&mut self, drawable: &DrawableHandle, transform: Option<glam::Affine2>) {
        self.push(Op::Drawable {
            drawable: drawable.clone(),
            transform,
        });
    }
}

impl Surface for RecordingSurface {
    fn op(&mut self, op: &Op) {
        self.push(op.clone());
    }
    fn save_count(&self) -> usize {
        self.depth
    }
    fn save(&mut self) {
        self.push(Op::Save);
    }
    fn restore(&mut self) {
        self.push(Op::Restore);
    }
    fn concat(&mut self, transform: glam::Affine2) {
        self.push(Op::Concat(transform));
    }
}

/// Content of a drawable produced by [`Recorder::finish_as_drawable`]:
/// replays the recorded stream, drawing nested drawables live.
struct RecordedContent {
    stream: CommandStream,
}

impl DrawContent for RecordedContent {
    fn draw(&mut self, surface: &mut dyn Surface) {
        stream::replay(self.stream.ops(), surface, None);
    }
    fn bounds(&self) -> Rect {
        self.stream.cull_rect()
    }
}

#[cfg(test)]
mod tests {
    use super::Recorder;
    use crate::drawable::{DrawContent, Drawable, DrawableHandle};
    use crate::geom::Rect;
    use crate::index::RTreeFactory;
    use crate::op::{Op, OpTag};
    use crate::surface::{CaptureSurface, Surface};

    fn draw_rect(surface: &mut dyn Surface, bounds: Rect) {
        surface.op(&Op::Atom {
            tag: OpTag(*b"rect"),
            draws: true,
            bounds,
            data: Box::new([]),
        });
    }

    #[test]
    #[should_panic(expected = "already active")]
    fn double_begin_panics() {
        let mut recorder = Recorder::new();
        let _ = recorder.begin(Rect::from_wh(10.0, 10.0));
        let _ = recorder.begin(Rect::from_wh(10.0, 10.0));
    }
    #[test]
    #[should_panic(expected = "no active recording session")]
    fn finish_twice_panics() {
        let mut recorder = Recorder::new();
        let _ = recorder.begin(Rect::from_wh(10.0, 10.0));
        let _ = recorder.finish_as_picture();
        let _ = recorder.finish_as_picture();
    }
    #[test]
    #[should_panic(expected = "no active recording session")]
    fn finish_without_begin_panics() {
        let mut recorder = Recorder::new();
        let _ = recorder.finish_as_drawable();
    }
    #[test]
    fn surface_none_when_idle() {
        let mut recorder = Recorder::new();
        assert!(recorder.surface().is_none());
        let _ = recorder.begin(Rect::from_wh(10.0, 10.0));
        assert!(recorder.surface().is_some());
        let _ = recorder.finish_as_picture();
        assert!(recorder.surface().is_none());
    }
    #[test]
    fn reusable_after_finish() {
        let mut recorder = Recorder::new();
        let _ = recorder.begin(Rect::from_wh(10.0, 10.0));
        let _ = recorder.finish_as_picture();
        let _ = recorder.begin(Rect::from_wh(20.0, 20.0));
        let picture = recorder.finish_as_picture();
        assert_eq!(picture.cull_rect(), Rect::from_wh(20.0, 20.0));
    }
    #[test]
    fn open_saves_closed_at_finish() {
        let mut recorder = Recorder::new();
        let surface = recorder.begin(Rect::from_wh(10.0, 10.0));
        surface.save();
        surface.save();
        draw_rect(surface, Rect::from_wh(1.0, 1.0));
        let picture = recorder.finish_as_picture();
        let mut replayed = CaptureSurface::new();
        picture.playback(&mut replayed);
        assert_eq!(replayed.save_count(), 0);
    }
    #[test]
    fn cull_override() {
        let mut recorder = Recorder::new();
        let _ = recorder.begin(Rect::from_wh(10.0, 10.0));
        let tightened = Rect::from_wh(4.0, 4.0);
        let picture = recorder.finish_as_picture_with_cull(tightened);
        assert_eq!(picture.cull_rect(), tightened);
    }
    #[test]
    fn indexed_picture_answers_region_queries() {
        let mut recorder = Recorder::new();
        let surface = recorder.begin_with_index(Rect::from_wh(100.0, 100.0), &RTreeFactory);
        draw_rect(surface, Rect::new(10.0, 10.0, 20.0, 20.0));
        draw_rect(surface, Rect::new(50.0, 50.0, 60.0, 60.0));
        let picture = recorder.finish_as_picture();
        let index = picture.index().unwrap();
        let mut hits = Vec::new();
        index.search(Rect::new(0.0, 0.0, 30.0, 30.0), &mut hits);
        assert_eq!(hits, [0]);
        hits.clear();
        index.search(Rect::new(0.0, 0.0, 100.0, 100.0), &mut hits);
        hits.sort_unstable();
        assert_eq!(hits, [0, 1]);
    }

    // A drawable whose output follows a shared counter.
    struct Counter(std::sync::Arc<std::sync::atomic::AtomicU32>);
    impl DrawContent for Counter {
        fn draw(&mut self, surface: &mut dyn Surface) {
            let value = self.0.load(std::sync::atomic::Ordering::Relaxed) as f32;
            draw_rect(surface, Rect::new(value, 0.0, value + 1.0, 1.0));
        }
        fn bounds(&self) -> Rect {
            Rect::from_wh(1000.0, 1.0)
        }
    }

    fn counter_drawable() -> (DrawableHandle, std::sync::Arc<std::sync::atomic::AtomicU32>) {
        let knob = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(1));
        let handle = DrawableHandle::new(Drawable::new(Counter(knob.clone())));
        (handle, knob)
    }

    fn first_atom_left(surface: &CaptureSurface) -> f32 {
        surface
            .ops()
            .iter()
            .find_map(|op| match op {
                Op::Atom { bounds, .. } => Some(bounds.left),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn picture_finish_flattens_drawables() {
        let (handle, knob) = counter_drawable();
        let mut recorder = Recorder::new();
        let surface = recorder.begin(Rect::from_wh(100.0, 100.0));
        surface.draw_drawable(&handle, None);
        let picture = recorder.finish_as_picture();
        // Mutate after finishing; the picture must not care.
        knob.store(7, std::sync::atomic::Ordering::Relaxed);
        handle.lock().invalidate();
        let mut replayed = CaptureSurface::new();
        picture.playback(&mut replayed);
        // The nested drawable became a nested picture, frozen at value 1.
        let nested = replayed
            .ops()
            .iter()
            .find_map(|op| match op {
                Op::Picture { picture, .. } => Some(picture.clone()),
                _ => None,
            })
            .expect("flattened snapshot expected");
        let mut inner = CaptureSurface::new();
        nested.playback(&mut inner);
        assert_eq!(first_atom_left(&inner), 1.0);
    }
    #[test]
    fn drawable_finish_stays_live() {
        let (handle, knob) = counter_drawable();
        let mut recorder = Recorder::new();
        let surface = recorder.begin(Rect::from_wh(100.0, 100.0));
        surface.draw_drawable(&handle, None);
        let mut recorded = recorder.finish_as_drawable();

        let mut before = CaptureSurface::new();
        recorded.draw(&mut before);
        assert_eq!(first_atom_left(&before), 1.0);

        knob.store(7, std::sync::atomic::Ordering::Relaxed);
        handle.lock().invalidate();

        let mut after = CaptureSurface::new();
        recorded.draw(&mut after);
        assert_eq!(first_atom_left(&after), 7.0);

        // Snapshots of the recorded drawable also observe the current state.
        let snapshot = recorded.snapshot();
        let mut snap = CaptureSurface::new();
        snapshot.playback(&mut snap);
        assert_eq!(first_atom_left(&snap), 7.0);
    }
}
