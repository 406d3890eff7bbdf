//! # Drawables
//!
//! A live drawing source whose output may change between draws. The content
//! itself is caller-defined through [`DrawContent`]; the base [`Drawable`]
//! owns only the bookkeeping that makes caching possible: a generation
//! identifier that is invalidated explicitly and recomputed lazily.
//!
//! Two calls to [`Drawable::generation_id`] returning the same value license
//! a consumer to reuse a cached rendering. Anything that mutates drawing
//! state must invalidate - forgetting to is a stale-cache bug, not a crash.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::geom::Rect;
use crate::id::GenerationId;
use crate::picture::Picture;
use crate::record::Recorder;
use crate::surface::Surface;

/// Caller-defined drawable content.
///
/// `bounds` must over-approximate every extent the content could ever draw,
/// across all future states (animation included), not just the current one.
pub trait DrawContent: Send {
    /// Issue the current state's operations against `surface`.
    fn draw(&mut self, surface: &mut dyn Surface);
    /// Conservative bounds, valid for all possible states.
    fn bounds(&self) -> Rect;
}

/// Drawing source with generation-based cache invalidation.
pub struct Drawable {
    content: Box<dyn DrawContent>,
    /// Current generation, or zero when stale. Lazily replaced with a fresh
    /// [`GenerationId`] on the next read.
    generation: AtomicU64,
}

impl Drawable {
    #[must_use]
    pub fn new(content: impl DrawContent + 'static) -> Self {
        Self {
            content: Box::new(content),
            generation: AtomicU64::new(0),
        }
    }
    pub(crate) fn from_boxed(content: Box<dyn DrawContent>) -> Self {
        Self {
            content,
            generation: AtomicU64::new(0),
        }
    }

    /// Draw the current state onto `surface`.
    ///
    /// Balanced: the surface's save depth and current transform/clip are
    /// exactly as found, no matter what the content does internally.
    pub fn draw(&mut self, surface: &mut dyn Surface) {
        self.draw_transformed(surface, None);
    }
    /// [`Self::draw`] translated by `(x, y)`.
    pub fn draw_at(&mut self, surface: &mut dyn Surface, x: f32, y: f32) {
        self.draw_transformed(
            surface,
            Some(glam::Affine2::from_translation(glam::Vec2::new(x, y))),
        );
    }
    /// [`Self::draw`] with a transform concatenated for the duration.
    pub fn draw_transformed(&mut self, surface: &mut dyn Surface, transform: Option<glam::Affine2>) {
        let depth = surface.save_count();
        surface.save();
        if let Some(transform) = transform {
            surface.concat(transform);
        }
        self.content.draw(surface);
        // Rewind anything the content left open, our own save included.
        while surface.save_count() > depth {
            surface.restore();
        }
        debug_assert_eq!(surface.save_count(), depth, "unbalanced drawable draw");
    }

    /// Capture the *current* state as an immutable picture. The result is
    /// frozen - later mutations of this drawable do not affect it.
    pub fn snapshot(&mut self) -> Arc<Picture> {
        let bounds = self.content.bounds();
        let mut recorder = Recorder::new();
        let surface = recorder.begin(bounds);
        self.content.draw(surface);
        recorder.finish_as_picture()
    }

    /// Current generation. Stable across calls until invalidated; a changed
    /// value means cached renderings of this drawable must be discarded.
    pub fn generation_id(&self) -> GenerationId {
        loop {
            let current = self.generation.load(Ordering::Acquire);
            if let Some(current) = std::num::NonZeroU64::new(current) {
                return GenerationId::from_nonzero(current);
            }
            let fresh = GenerationId::next();
            if self
                .generation
                .compare_exchange(0, fresh.get(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return fresh;
            }
            // Raced with another reader; take whatever won.
        }
    }
    /// Mark the current generation stale. The next [`Self::generation_id`]
    /// returns a different value.
    pub fn invalidate(&self) {
        self.generation.store(0, Ordering::Release);
    }

    /// Conservative bounds of everything this drawable could ever draw.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        self.content.bounds()
    }

    #[must_use]
    pub fn content(&self) -> &dyn DrawContent {
        &*self.content
    }
    /// Mutable content access. Invalidates, since the caller may change
    /// drawing state through the returned reference.
    pub fn content_mut(&mut self) -> &mut dyn DrawContent {
        self.invalidate();
        &mut *self.content
    }
}

impl std::fmt::Debug for Drawable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drawable")
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .field("bounds", &self.bounds())
            .finish_non_exhaustive()
    }
}

/// Shared handle to a drawable, as referenced from recorded streams.
///
/// Cloning is cheap. The lock serializes access, but ordering between state
/// mutation and concurrent draws is the caller's responsibility.
#[derive(Clone)]
pub struct DrawableHandle(Arc<parking_lot::Mutex<Drawable>>);

impl DrawableHandle {
    #[must_use]
    pub fn new(drawable: Drawable) -> Self {
        Self(Arc::new(parking_lot::Mutex::new(drawable)))
    }
    pub fn lock(&self) -> parking_lot::MutexGuard<'_, Drawable> {
        self.0.lock()
    }
}
impl std::fmt::Debug for DrawableHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.try_lock() {
            Some(drawable) => std::fmt::Debug::fmt(&*drawable, f),
            None => f.write_str("DrawableHandle(<locked>)"),
        }
    }
}
impl From<Drawable> for DrawableHandle {
    fn from(drawable: Drawable) -> Self {
        Self::new(drawable)
    }
}
