//! # Pictures
//!
//! The immutable, replayable artifact of a recording: a sealed command
//! stream, a cull rect, an optional spatial index over the operations'
//! bounds, and a process-unique identifier. Nothing about a picture changes
//! after construction, which is what makes concurrent playback and
//! serialization safe without any locking - pictures are shared as
//! [`Arc<Picture>`] and live as long as any holder does.
//!
//! Pictures come from four places: a [`Recorder`](crate::record::Recorder)
//! finish, [`Picture::from_stream`], [`Picture::from_bytes`], and
//! [`Picture::placeholder`].

use std::sync::Arc;

use crate::codec::{self, DecodeError};
use crate::geom::Rect;
use crate::id::PictureId;
use crate::index::BoundsIndex;
use crate::stream::{self, CommandStream};
use crate::surface::Surface;

/// Immutable recorded command stream. See the module docs.
pub struct Picture {
    stream: CommandStream,
    index: Option<Box<dyn BoundsIndex>>,
    id: PictureId,
}

impl Picture {
    pub(crate) fn from_parts(
        stream: CommandStream,
        index: Option<Box<dyn BoundsIndex>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            stream,
            index,
            id: PictureId::next(),
        })
    }

    /// A picture that draws nothing: an empty stream under `cull`, no index,
    /// and a fresh identifier.
    ///
    /// The identifier is the point - a placeholder reserves an addressable
    /// slot whose identity a custom playback surface can recognize and
    /// substitute, before real content exists.
    #[must_use]
    pub fn placeholder(cull: Rect) -> Arc<Self> {
        Self::from_parts(CommandStream::empty(cull), None)
    }

    /// Reconstruct a picture serialized with [`Self::serialize`], reading
    /// `stream` to exhaustion.
    ///
    /// Returns `None` when the data is malformed - a recoverable outcome with
    /// no side effects. For the error-carrying variant over an in-memory
    /// buffer, see [`Self::from_bytes`]; the two signal failure differently
    /// on purpose.
    #[must_use]
    pub fn from_stream(stream: impl std::io::Read) -> Option<Arc<Self>> {
        match codec::decode_stream(stream) {
            Ok(picture) => Some(picture),
            Err(error) => {
                log::debug!("picture stream rejected: {error}");
                None
            }
        }
    }
    /// Reconstruct a picture from an in-memory encoding.
    ///
    /// # Errors
    /// [`DecodeError`] describing why the bytes do not encode a valid
    /// picture. Stricter counterpart of [`Self::from_stream`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Arc<Self>, DecodeError> {
        codec::decode_bytes(bytes)
    }

    /// Replay every stored operation, in recorded order, against `surface`.
    pub fn playback(&self, surface: &mut dyn Surface) {
        stream::replay(self.stream.ops(), surface, None);
    }
    /// [`Self::playback`] with a cooperative abort predicate, polled between
    /// operations. Stopping early is not an error; whatever prefix ran, the
    /// surface is left balanced.
    pub fn playback_with(&self, surface: &mut dyn Surface, mut abort: impl FnMut() -> bool) {
        stream::replay(self.stream.ops(), surface, Some(&mut abort));
    }
    /// Replay only what could affect `region`: every state operation, plus
    /// the draw operations whose bounds intersect it. Uses the spatial index
    /// when one was built at record time, re-testing its answers exactly;
    /// falls back to a linear bounds scan otherwise.
    pub fn playback_region(&self, surface: &mut dyn Surface, region: Rect) {
        let ops = self.stream.ops();
        let hits: Vec<usize> = match &self.index {
            Some(index) => {
                let mut hits = Vec::new();
                index.search(region, &mut hits);
                // The index may over-report; the exact test is ours.
                hits.retain(|&position| ops[position].bounds().intersects(&region));
                hits.sort_unstable();
                hits
            }
            None => ops
                .iter()
                .enumerate()
                .filter(|(_, op)| op.draws() && op.bounds().intersects(&region))
                .map(|(position, _)| position)
                .collect(),
        };
        stream::replay_filtered(ops, surface, None, |position, op| {
            !op.draws() || hits.binary_search(&position).is_ok()
        });
    }

    /// The bound supplied at creation. A hint for culling, not an enforced
    /// clip - content outside it may or may not draw.
    #[must_use]
    pub fn cull_rect(&self) -> Rect {
        self.stream.cull_rect()
    }
    /// Non-zero identifier, unique among every picture created in this
    /// process, placeholders included.
    #[must_use]
    pub fn unique_id(&self) -> PictureId {
        self.id
    }
    /// Approximate operation count; see
    /// [`CommandStream::approximate_op_count`].
    #[must_use]
    pub fn approximate_op_count(&self, nested: bool) -> usize {
        self.stream.approximate_op_count(nested)
    }
    /// Approximate memory footprint of the picture structure, index included,
    /// referenced external objects excluded. A deliberate under-estimate;
    /// [`Self::serialize`] is the structurally complete encoding.
    #[must_use]
    pub fn approximate_bytes_used(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.stream.approximate_bytes_used()
            + self.index.as_ref().map_or(0, |index| index.bytes_used())
    }
    #[must_use]
    pub fn stream(&self) -> &CommandStream {
        &self.stream
    }
    /// The spatial index built at record time, if one was requested.
    #[must_use]
    pub fn index(&self) -> Option<&dyn BoundsIndex> {
        self.index.as_deref()
    }

    /// Deterministic byte encoding, sufficient for exact reconstruction via
    /// [`Self::from_bytes`] / [`Self::from_stream`]. The reconstruction
    /// replays identically but carries a fresh identifier.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        codec::encode(self)
    }
    /// Write [`Self::serialize`] to `writer`.
    ///
    /// # Errors
    /// Forwarded from `writer`.
    pub fn serialize_to(&self, mut writer: impl std::io::Write) -> std::io::Result<()> {
        writer.write_all(&codec::encode(self))
    }

    /// A tiling shader that replays this picture per tile. Never fails.
    ///
    /// `tile_rect` is the tile window in picture coordinates - translation
    /// and cropping only, never scaling - defaulting to the cull rect.
    #[must_use]
    pub fn make_shader(
        self: &Arc<Self>,
        tile_x: TileMode,
        tile_y: TileMode,
        filter: FilterMode,
        local_matrix: Option<glam::Affine2>,
        tile_rect: Option<Rect>,
    ) -> PictureShader {
        PictureShader {
            picture: self.clone(),
            tile_x,
            tile_y,
            filter,
            local_matrix,
            tile_rect: tile_rect.unwrap_or_else(|| self.cull_rect()),
        }
    }
}

impl std::fmt::Debug for Picture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Picture")
            .field("id", &self.id)
            .field("ops", &self.stream.len())
            .field("cull", &self.cull_rect())
            .field("indexed", &self.index.is_some())
            .finish()
    }
}

/// How a shader samples outside its tile on one axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileMode {
    /// Extend the edge color.
    Clamp,
    /// Repeat the tile.
    Repeat,
    /// Repeat, mirrored every other tile.
    Mirror,
    /// Transparent black outside the tile.
    Decal,
}

/// Sampling filter applied when a tile is resampled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Tiling-pattern parameters wrapping a picture, consumed by the rendering
/// paint subsystem. This crate does not evaluate shaders; it only carries
/// the parameters (and keeps the picture alive).
#[derive(Clone, Debug)]
pub struct PictureShader {
    picture: Arc<Picture>,
    pub tile_x: TileMode,
    pub tile_y: TileMode,
    pub filter: FilterMode,
    pub local_matrix: Option<glam::Affine2>,
    /// Tile window in picture coordinates.
    pub tile_rect: Rect,
}

impl PictureShader {
    #[must_use]
    pub fn picture(&self) -> &Arc<Picture> {
        &self.picture
    }
}

#[cfg(test)]
mod tests {
    use super::{FilterMode, Picture, TileMode};
    use crate::geom::Rect;
    use crate::index::RTreeFactory;
    use crate::op::{Op, OpTag};
    use crate::record::Recorder;
    use crate::surface::{CaptureSurface, Surface};

    fn draw_rect(surface: &mut dyn Surface, bounds: Rect) {
        surface.op(&Op::Atom {
            tag: OpTag(*b"rect"),
            draws: true,
            bounds,
            data: Box::new([]),
        });
    }
    fn two_op_picture(indexed: bool) -> std::sync::Arc<Picture> {
        let mut recorder = Recorder::new();
        let surface = if indexed {
            recorder.begin_with_index(Rect::from_wh(100.0, 100.0), &RTreeFactory)
        } else {
            recorder.begin(Rect::from_wh(100.0, 100.0))
        };
        draw_rect(surface, Rect::new(10.0, 10.0, 20.0, 20.0));
        draw_rect(surface, Rect::new(50.0, 50.0, 60.0, 60.0));
        recorder.finish_as_picture()
    }

    const _: fn() = || {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Picture>();
    };

    #[test]
    fn unique_ids_across_sources() {
        let a = two_op_picture(false);
        let b = two_op_picture(false);
        let placeholder = Picture::placeholder(Rect::from_wh(1.0, 1.0));
        let decoded = Picture::from_bytes(&a.serialize()).unwrap();
        let ids = [
            a.unique_id(),
            b.unique_id(),
            placeholder.unique_id(),
            decoded.unique_id(),
        ];
        for (i, left) in ids.iter().enumerate() {
            for right in &ids[i + 1..] {
                assert_ne!(left, right);
            }
        }
    }
    #[test]
    fn placeholder_draws_nothing() {
        let cull = Rect::new(2.0, 3.0, 40.0, 50.0);
        let placeholder = Picture::placeholder(cull);
        assert_eq!(placeholder.cull_rect(), cull);
        assert_eq!(placeholder.approximate_op_count(true), 0);
        let mut surface = CaptureSurface::new();
        placeholder.playback(&mut surface);
        assert!(surface.is_empty());
    }
    #[test]
    fn playback_in_order() {
        let picture = two_op_picture(false);
        let mut surface = CaptureSurface::new();
        picture.playback(&mut surface);
        let lefts: Vec<f32> = surface
            .ops()
            .iter()
            .map(|op| match op {
                Op::Atom { bounds, .. } => bounds.left,
                _ => unreachable!("only atoms were recorded"),
            })
            .collect();
        assert_eq!(lefts, [10.0, 50.0]);
    }
    #[test]
    fn abort_between_ops() {
        let picture = two_op_picture(false);
        let mut surface = CaptureSurface::new();
        let mut seen = 0u32;
        picture.playback_with(&mut surface, || {
            seen += 1;
            seen > 1
        });
        // Aborted before the second op; a partial replay is a success.
        assert_eq!(surface.len(), 1);
        assert_eq!(surface.save_count(), 0);
    }
    #[test]
    fn abort_leaves_surface_balanced() {
        let mut recorder = Recorder::new();
        let surface = recorder.begin(Rect::from_wh(10.0, 10.0));
        surface.save();
        surface.save();
        draw_rect(surface, Rect::from_wh(1.0, 1.0));
        surface.restore();
        surface.restore();
        let picture = recorder.finish_as_picture();

        for stop_after in 0..picture.approximate_op_count(false) {
            let mut capture = CaptureSurface::new();
            let mut polled = 0;
            picture.playback_with(&mut capture, || {
                polled += 1;
                polled > stop_after
            });
            assert_eq!(capture.save_count(), 0, "prefix of {stop_after} unbalanced");
        }
    }
    #[test]
    fn region_playback_culls() {
        for indexed in [false, true] {
            let picture = two_op_picture(indexed);
            let mut surface = CaptureSurface::new();
            picture.playback_region(&mut surface, Rect::new(0.0, 0.0, 30.0, 30.0));
            let atoms: Vec<f32> = surface
                .ops()
                .iter()
                .filter_map(|op| match op {
                    Op::Atom { bounds, .. } => Some(bounds.left),
                    _ => None,
                })
                .collect();
            assert_eq!(atoms, [10.0], "indexed = {indexed}");
        }
    }
    #[test]
    fn bytes_used_includes_index() {
        let plain = two_op_picture(false);
        let indexed = two_op_picture(true);
        assert!(indexed.approximate_bytes_used() > plain.approximate_bytes_used());
    }
    #[test]
    fn nested_op_count() {
        let inner = two_op_picture(false);
        let mut recorder = Recorder::new();
        let surface = recorder.begin(Rect::from_wh(100.0, 100.0));
        surface.draw_picture(&inner, None);
        let outer = recorder.finish_as_picture();
        assert_eq!(outer.approximate_op_count(false), 1);
        assert_eq!(outer.approximate_op_count(true), 3);
    }
    #[test]
    fn shader_defaults_tile_to_cull() {
        let picture = two_op_picture(false);
        let shader = picture.make_shader(
            TileMode::Repeat,
            TileMode::Clamp,
            FilterMode::Linear,
            None,
            None,
        );
        assert_eq!(shader.tile_rect, picture.cull_rect());
        let cropped = picture.make_shader(
            TileMode::Decal,
            TileMode::Mirror,
            FilterMode::Nearest,
            Some(glam::Affine2::IDENTITY),
            Some(Rect::from_wh(10.0, 10.0)),
        );
        assert_eq!(cropped.tile_rect, Rect::from_wh(10.0, 10.0));
        // The shader keeps its picture alive.
        drop(picture);
        assert_eq!(cropped.picture().approximate_op_count(false), 2);
    }
}
