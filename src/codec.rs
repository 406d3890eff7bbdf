//! # Picture codec
//!
//! The versioned byte encoding behind [`Picture::serialize`] and its two
//! decoding entry points. The container is chunked: every chunk is a 4-byte
//! tag followed by a little-endian u32 payload length, so readers can skip
//! what they do not understand. A picture is one `PICT` root chunk holding a
//! format version and three subchunks - the cull rect, the operation records
//! in order, and a CRC-32 over the operation payload.
//!
//! Guaranteed here is round-trip fidelity only: decoding a serialized
//! picture yields one that replays identically. Identity does not survive -
//! decoded pictures carry a fresh identifier - and the spatial index is not
//! encoded; it exists only on pictures indexed at record time.

use az::CheckedAs;
use std::io::{Error as IOError, Read};
use std::sync::Arc;

use crate::geom::Rect;
use crate::op::{Op, OpFlags, OpTag};
use crate::picture::Picture;
use crate::stream::CommandStream;

const TAG_ROOT: [u8; 4] = *b"PICT";
const TAG_CULL: [u8; 4] = *b"CULL";
const TAG_OPS: [u8; 4] = *b"OPS ";
const TAG_CSUM: [u8; 4] = *b"CSUM";

const VERSION: u16 = 1;
/// Nesting bound while decoding. Encoded input is untrusted; construction
/// keeps real pictures acyclic, but bytes can claim anything.
const MAX_DEPTH: u8 = 64;

const CRC32: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

mod kind {
    pub const SAVE: u8 = 0;
    pub const RESTORE: u8 = 1;
    pub const CONCAT: u8 = 2;
    pub const CLIP: u8 = 3;
    pub const ATOM: u8 = 4;
    pub const PICTURE: u8 = 5;
}

/// Why a byte sequence failed to decode into a picture.
///
/// [`Picture::from_bytes`] surfaces these directly; the streaming path
/// ([`Picture::from_stream`]) folds them all into `None`.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("not a picture encoding")]
    BadMagic,
    #[error("unsupported picture format version {0}")]
    UnsupportedVersion(u16),
    #[error("encoding truncated")]
    Truncated,
    #[error("operation payload checksum mismatch")]
    BadChecksum,
    #[error("unknown operation kind {0}")]
    UnknownOpKind(u8),
    #[error("missing required chunk {0:?}")]
    MissingChunk(&'static str),
    #[error("picture nesting exceeds decode limit")]
    TooDeep,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// Fixed-size head of an atom record as laid out on the wire. Repr(C) for
// file layout; fields pass through endianness conversion on both sides.
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable, Debug)]
#[repr(C)]
struct AtomRecord {
    tag: [u8; 4],
    flags: u8,
    _reserved: [u8; 3],
    bounds: [f32; 4],
    len: u32,
}
impl AtomRecord {
    const SIZE: usize = std::mem::size_of::<Self>();
    // Native <-> little-endian, applied symmetrically.
    fn swap_endian(&mut self) {
        for value in &mut self.bounds {
            *value = f32::from_ne_bytes(value.to_le_bytes());
        }
        self.len = u32::from_ne_bytes(self.len.to_le_bytes());
    }
}

// ---- encoding ----

pub(crate) fn encode(picture: &Picture) -> Vec<u8> {
    let mut out = Vec::new();
    match write_picture(picture, &mut out) {
        Ok(()) => out,
        // Only reachable through a >4 GiB chunk or a live drawable in a
        // sealed stream, both caller contract violations.
        Err(error) => panic!("picture serialization failed: {error}"),
    }
}

/// Reserve a little-endian u32 length field, returning its offset for
/// [`patch_len`]. The field always directly precedes its payload.
fn begin_len(out: &mut Vec<u8>) -> usize {
    let at = out.len();
    out.extend_from_slice(&[0; 4]);
    at
}
fn patch_len(out: &mut [u8], at: usize) -> std::io::Result<()> {
    let len: u32 = (out.len() - (at + 4))
        .checked_as()
        .ok_or_else(|| IOError::other(anyhow::anyhow!("picture chunk exceeded 4 GiB")))?;
    out[at..at + 4].copy_from_slice(&len.to_le_bytes());
    Ok(())
}
fn write_rect(rect: Rect, out: &mut Vec<u8>) {
    for value in [rect.left, rect.top, rect.right, rect.bottom] {
        out.extend_from_slice(&value.to_le_bytes());
    }
}
fn write_affine(transform: glam::Affine2, out: &mut Vec<u8>) {
    for value in transform.to_cols_array() {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

fn write_picture(picture: &Picture, out: &mut Vec<u8>) -> std::io::Result<()> {
    out.extend_from_slice(&TAG_ROOT);
    let root = begin_len(out);
    out.extend_from_slice(&VERSION.to_le_bytes());

    out.extend_from_slice(&TAG_CULL);
    let cull = begin_len(out);
    write_rect(picture.cull_rect(), out);
    patch_len(out, cull)?;

    out.extend_from_slice(&TAG_OPS);
    let ops = begin_len(out);
    for op in picture.stream().ops() {
        write_op(op, out)?;
    }
    let checksum = CRC32.checksum(&out[ops + 4..]);
    patch_len(out, ops)?;

    out.extend_from_slice(&TAG_CSUM);
    let csum = begin_len(out);
    out.extend_from_slice(&checksum.to_le_bytes());
    patch_len(out, csum)?;

    patch_len(out, root)
}

fn write_op(op: &Op, out: &mut Vec<u8>) -> std::io::Result<()> {
    match op {
        Op::Save => out.push(kind::SAVE),
        Op::Restore => out.push(kind::RESTORE),
        Op::Concat(transform) => {
            out.push(kind::CONCAT);
            write_affine(*transform, out);
        }
        Op::ClipRect(rect) => {
            out.push(kind::CLIP);
            write_rect(*rect, out);
        }
        Op::Atom {
            tag,
            draws,
            bounds,
            data,
        } => {
            out.push(kind::ATOM);
            let len: u32 = data.len().checked_as().ok_or_else(|| {
                IOError::other(anyhow::anyhow!("atom {tag} payload exceeded 4 GiB"))
            })?;
            let mut record = AtomRecord {
                tag: tag.0,
                flags: if *draws {
                    OpFlags::DRAWS.bits()
                } else {
                    OpFlags::empty().bits()
                },
                _reserved: [0; 3],
                bounds: [bounds.left, bounds.top, bounds.right, bounds.bottom],
                len,
            };
            record.swap_endian();
            out.extend_from_slice(bytemuck::bytes_of(&record));
            out.extend_from_slice(data);
        }
        Op::Picture { picture, transform } => {
            out.push(kind::PICTURE);
            let flags = if transform.is_some() {
                OpFlags::HAS_TRANSFORM
            } else {
                OpFlags::empty()
            };
            out.push(flags.bits());
            if let Some(transform) = transform {
                write_affine(*transform, out);
            }
            let embedded = begin_len(out);
            write_picture(picture, out)?;
            patch_len(out, embedded)?;
        }
        Op::Drawable { .. } => {
            // Sealed picture streams never hold live drawables; finishing as
            // a picture flattens them.
            return Err(IOError::other(anyhow::anyhow!(
                "live drawable in a sealed picture stream"
            )));
        }
    }
    Ok(())
}

// ---- decoding ----

pub(crate) fn decode_stream(mut stream: impl Read) -> Result<Arc<Picture>, DecodeError> {
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes)?;
    decode_bytes(&bytes)
}

pub(crate) fn decode_bytes(bytes: &[u8]) -> Result<Arc<Picture>, DecodeError> {
    let mut reader = Reader { buf: bytes };
    let picture = read_picture(&mut reader, 0)?;
    if !reader.is_empty() {
        // The root chunk is self-delimiting; whatever follows is not ours.
        log::debug!("{} bytes trailing picture encoding ignored", reader.len());
    }
    Ok(picture)
}

/// Borrowing byte cursor. Every read is bounds-checked; running out is
/// [`DecodeError::Truncated`].
struct Reader<'a> {
    buf: &'a [u8],
}
impl<'a> Reader<'a> {
    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
    fn len(&self) -> usize {
        self.buf.len()
    }
    fn remaining(&self) -> &'a [u8] {
        self.buf
    }
    fn take(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        if self.buf.len() < count {
            return Err(DecodeError::Truncated);
        }
        let (head, tail) = self.buf.split_at(count);
        self.buf = tail;
        Ok(head)
    }
    /// Split off a sub-reader over the next `count` bytes.
    fn sub(&mut self, count: usize) -> Result<Self, DecodeError> {
        Ok(Self {
            buf: self.take(count)?,
        })
    }
    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }
    fn u16(&mut self) -> Result<u16, DecodeError> {
        // take(2) upholds the length; try_into cannot fail.
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }
    fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }
    fn f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }
    fn rect(&mut self) -> Result<Rect, DecodeError> {
        Ok(Rect::new(self.f32()?, self.f32()?, self.f32()?, self.f32()?))
    }
    fn affine(&mut self) -> Result<glam::Affine2, DecodeError> {
        let mut cols = [0.0; 6];
        for value in &mut cols {
            *value = self.f32()?;
        }
        Ok(glam::Affine2::from_cols_array(&cols))
    }
    /// Chunk header: tag plus payload length.
    fn chunk(&mut self) -> Result<([u8; 4], usize), DecodeError> {
        let tag = self.take(4)?.try_into().unwrap();
        let len = self.u32()? as usize;
        Ok((tag, len))
    }
}

fn read_picture(reader: &mut Reader<'_>, depth: u8) -> Result<Arc<Picture>, DecodeError> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::TooDeep);
    }
    let (tag, len) = reader.chunk()?;
    if tag != TAG_ROOT {
        return Err(DecodeError::BadMagic);
    }
    let mut root = reader.sub(len)?;
    let version = root.u16()?;
    if version > VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let mut cull = None;
    let mut ops: Option<(Vec<Op>, u32)> = None;
    let mut checksum = None;
    while !root.is_empty() {
        let (tag, len) = root.chunk()?;
        let mut payload = root.sub(len)?;
        match tag {
            TAG_CULL => cull = Some(payload.rect()?),
            TAG_OPS => {
                let computed = CRC32.checksum(payload.remaining());
                let mut list = Vec::new();
                while !payload.is_empty() {
                    list.push(read_op(&mut payload, depth)?);
                }
                ops = Some((list, computed));
            }
            TAG_CSUM => checksum = Some(payload.u32()?),
            unknown => {
                // Skippable by construction; a future writer may add chunks.
                log::debug!("skipping unknown picture chunk {}", OpTag(unknown));
            }
        }
    }

    let cull = cull.ok_or(DecodeError::MissingChunk("CULL"))?;
    let (ops, computed) = ops.ok_or(DecodeError::MissingChunk("OPS "))?;
    let expected = checksum.ok_or(DecodeError::MissingChunk("CSUM"))?;
    if computed != expected {
        return Err(DecodeError::BadChecksum);
    }
    Ok(Picture::from_parts(CommandStream::seal(ops, cull), None))
}

fn read_op(payload: &mut Reader<'_>, depth: u8) -> Result<Op, DecodeError> {
    Ok(match payload.u8()? {
        kind::SAVE => Op::Save,
        kind::RESTORE => Op::Restore,
        kind::CONCAT => Op::Concat(payload.affine()?),
        kind::CLIP => Op::ClipRect(payload.rect()?),
        kind::ATOM => {
            let mut record: AtomRecord =
                bytemuck::pod_read_unaligned(payload.take(AtomRecord::SIZE)?);
            record.swap_endian();
            let data: Box<[u8]> = payload.take(record.len as usize)?.into();
            // Unknown flag bits are tolerated; a future writer may add some.
            let flags = OpFlags::from_bits_truncate(record.flags);
            Op::Atom {
                tag: OpTag(record.tag),
                draws: flags.contains(OpFlags::DRAWS),
                bounds: Rect::new(
                    record.bounds[0],
                    record.bounds[1],
                    record.bounds[2],
                    record.bounds[3],
                ),
                data,
            }
        }
        kind::PICTURE => {
            let flags = OpFlags::from_bits_truncate(payload.u8()?);
            let transform = flags
                .contains(OpFlags::HAS_TRANSFORM)
                .then(|| payload.affine())
                .transpose()?;
            let len = payload.u32()? as usize;
            let mut embedded = payload.sub(len)?;
            let picture = read_picture(&mut embedded, depth + 1)?;
            Op::Picture { picture, transform }
        }
        unknown => return Err(DecodeError::UnknownOpKind(unknown)),
    })
}
