//! Deferred drawing command streams.
//!
//! A [`record::Recorder`] captures drawing operations into a command stream
//! instead of executing them. Sealing the stream yields an immutable,
//! shareable [`picture::Picture`] that can be replayed onto any
//! [`surface::Surface`] any number of times, optionally culled to a region
//! through a spatial [`index::BoundsIndex`], serialized to bytes, or nested
//! inside further recordings. [`drawable::Drawable`] is the mutable
//! counterpart: re-recorded content with generation-based invalidation.

pub mod codec;
pub mod drawable;
pub mod geom;
pub mod id;
pub mod index;
pub mod op;
pub mod picture;
pub mod record;
pub mod stream;
pub mod surface;

pub use codec::DecodeError;
pub use drawable::{DrawContent, Drawable, DrawableHandle};
pub use geom::Rect;
pub use id::{GenerationId, PictureId};
pub use index::{BoundsIndex, EntryMeta, IndexFactory, LinearFactory, LinearIndex, RTreeFactory};
pub use op::{Op, OpFlags, OpTag};
pub use picture::{FilterMode, Picture, PictureShader, TileMode};
pub use record::{Recorder, RecordingSurface};
pub use stream::CommandStream;
pub use surface::{CaptureSurface, Surface};
