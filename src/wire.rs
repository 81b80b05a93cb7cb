// Bit-exact wire encoding of deltas and bare snapshots.
//
// All integers are big-endian two's-complement. Every variable-size section
// is prefixed by an `i32` length; `-1` marks the section as absent and any
// value >= 0 is the byte count that follows.
//
//   Snapshot  : version:i64, payload_len:i32, [payload]
//   Dense     : version:i64, target_length:i32, payload_len:i32, [payload]
//   Hashed    : Dense + digest_len:i32, [digest]
//   Sparse    : Hashed + bitmap_len:i32, [bitmap]
//
// The layouts carry no tag of their own; the reader must know which one to
// expect. `Frame` adds a small self-describing header for files.

use std::io::{self, Read, Write};

use crate::delta::{ChangeBitmap, Delta, DeltaBody, DeltaFlags, bitmap};
use crate::integrity::Integrity;
use crate::snapshot::Snapshot;

/// Length value marking an absent section.
pub const ABSENT: i32 = -1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("stream truncated while reading {section}")]
    Truncated { section: &'static str },
    #[error("malformed stream: {0}")]
    Malformed(String),
    #[error("{count} trailing bytes after decoded value")]
    TrailingBytes { count: usize },
    #[error("{section} is {len} bytes, exceeds the i32 length prefix")]
    SectionTooLarge { section: &'static str, len: usize },
}

impl WireError {
    /// True for every error caused by the bytes themselves rather than the
    /// underlying reader/writer.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::SectionTooLarge { .. })
    }
}

// ---------------------------------------------------------------------------
// Layouts
// ---------------------------------------------------------------------------

/// Which delta layout a stream uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireLayout {
    Dense,
    Hashed,
    Sparse,
}

impl WireLayout {
    /// Smallest layout able to carry a delta with `flags`.
    pub fn for_flags(flags: DeltaFlags) -> Self {
        if flags.contains(DeltaFlags::SPARSE) {
            Self::Sparse
        } else if flags.contains(DeltaFlags::HASHED) {
            Self::Hashed
        } else {
            Self::Dense
        }
    }

    #[inline]
    fn has_digest(self) -> bool {
        !matches!(self, Self::Dense)
    }

    #[inline]
    fn has_bitmap(self) -> bool {
        matches!(self, Self::Sparse)
    }
}

// ---------------------------------------------------------------------------
// Primitive readers / writers
// ---------------------------------------------------------------------------

fn read_exact_or_truncated<R: Read>(
    r: &mut R,
    buf: &mut [u8],
    section: &'static str,
) -> Result<(), WireError> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => WireError::Truncated { section },
        _ => WireError::Io(e),
    })
}

fn read_i64<R: Read>(r: &mut R, section: &'static str) -> Result<i64, WireError> {
    let mut buf = [0u8; 8];
    read_exact_or_truncated(r, &mut buf, section)?;
    Ok(i64::from_be_bytes(buf))
}

fn read_i32<R: Read>(r: &mut R, section: &'static str) -> Result<i32, WireError> {
    let mut buf = [0u8; 4];
    read_exact_or_truncated(r, &mut buf, section)?;
    Ok(i32::from_be_bytes(buf))
}

/// Read an `i32` length that may be `-1` (absent).
fn read_len<R: Read>(r: &mut R, section: &'static str) -> Result<Option<usize>, WireError> {
    match read_i32(r, section)? {
        ABSENT => Ok(None),
        n if n < 0 => Err(WireError::Malformed(format!(
            "negative length {n} for {section}"
        ))),
        n => Ok(Some(n as usize)),
    }
}

/// Read a length-prefixed section.
///
/// Reads through `take` so a bogus length cannot force a huge allocation
/// before the stream runs dry.
fn read_section<R: Read>(r: &mut R, section: &'static str) -> Result<Option<Vec<u8>>, WireError> {
    let Some(len) = read_len(r, section)? else {
        return Ok(None);
    };
    let mut data = Vec::with_capacity(len.min(64 * 1024));
    r.by_ref().take(len as u64).read_to_end(&mut data)?;
    if data.len() != len {
        return Err(WireError::Truncated { section });
    }
    Ok(Some(data))
}

fn encode_len(len: Option<usize>, section: &'static str) -> Result<i32, WireError> {
    match len {
        None => Ok(ABSENT),
        Some(len) => i32::try_from(len).map_err(|_| WireError::SectionTooLarge { section, len }),
    }
}

fn write_section<W: Write>(
    w: &mut W,
    data: Option<&[u8]>,
    section: &'static str,
) -> Result<(), WireError> {
    let len = encode_len(data.map(<[u8]>::len), section)?;
    w.write_all(&len.to_be_bytes())?;
    if let Some(data) = data {
        w.write_all(data)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Delta
// ---------------------------------------------------------------------------

impl Delta {
    /// Layout this delta is written with.
    pub fn layout(&self) -> WireLayout {
        WireLayout::for_flags(self.flags())
    }

    /// Write the delta in `self.layout()`.
    pub fn encode<W: Write>(&self, w: &mut W) -> Result<(), WireError> {
        let layout = self.layout();

        w.write_all(&self.version().to_be_bytes())?;
        let target_length = encode_len(self.target_length(), "target length")?;
        w.write_all(&target_length.to_be_bytes())?;
        write_section(w, self.payload(), "payload")?;

        if layout.has_digest() {
            write_section(w, self.integrity().map(Integrity::digest), "digest")?;
        }
        if layout.has_bitmap() {
            write_section(w, self.bitmap().map(ChangeBitmap::as_bytes), "bitmap")?;
        }
        Ok(())
    }

    /// Read a delta written in `layout`.
    pub fn decode<R: Read>(r: &mut R, layout: WireLayout) -> Result<Self, WireError> {
        let version = read_i64(r, "version")?;
        let target_length = read_len(r, "target length")?;
        let payload = read_section(r, "payload")?;
        let digest = if layout.has_digest() {
            read_section(r, "digest")?
        } else {
            None
        };
        let bits = if layout.has_bitmap() {
            read_section(r, "bitmap")?
        } else {
            None
        };

        let body = match bits {
            None => {
                if let (Some(p), Some(len)) = (&payload, target_length)
                    && p.len() != len
                {
                    return Err(WireError::Malformed(format!(
                        "dense payload is {} bytes but target length is {len}",
                        p.len()
                    )));
                }
                DeltaBody::Dense { payload }
            }
            Some(bits) => {
                let Some(changed) = payload else {
                    return Err(WireError::Malformed(
                        "sparse delta carries a bitmap but no payload".into(),
                    ));
                };
                if let Some(len) = target_length
                    && bits.len() != bitmap::byte_length(len)
                {
                    return Err(WireError::Malformed(format!(
                        "bitmap is {} bytes, expected {} for target length {len}",
                        bits.len(),
                        bitmap::byte_length(len)
                    )));
                }
                let bitmap = ChangeBitmap::from_bytes(bits);
                if bitmap.count_ones() != changed.len() {
                    return Err(WireError::Malformed(format!(
                        "bitmap marks {} bytes but payload holds {}",
                        bitmap.count_ones(),
                        changed.len()
                    )));
                }
                DeltaBody::Sparse { changed, bitmap }
            }
        };

        Ok(Delta::from_parts(
            version,
            target_length,
            body,
            digest.map(Integrity::from_digest),
        ))
    }
}

/// Encode a delta into a fresh buffer.
pub fn to_wire(delta: &Delta) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::new();
    delta.encode(&mut out)?;
    Ok(out)
}

/// Decode a delta from exactly `bytes`.
pub fn from_wire(bytes: &[u8], layout: WireLayout) -> Result<Delta, WireError> {
    let mut r = bytes;
    let delta = Delta::decode(&mut r, layout)?;
    ensure_consumed(r)?;
    Ok(delta)
}

fn ensure_consumed(rest: &[u8]) -> Result<(), WireError> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(WireError::TrailingBytes { count: rest.len() })
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

impl Snapshot {
    /// Write `version:i64, payload_len:i32, [payload]`.
    pub fn encode<W: Write>(&self, w: &mut W) -> Result<(), WireError> {
        w.write_all(&self.version().to_be_bytes())?;
        write_section(w, self.data(), "payload")
    }

    pub fn decode<R: Read>(r: &mut R) -> Result<Self, WireError> {
        let version = read_i64(r, "version")?;
        let data = read_section(r, "payload")?;
        Ok(Snapshot::with_version(data, version))
    }

    pub fn to_wire(&self) -> Result<Vec<u8>, WireError> {
        let mut out = Vec::new();
        self.encode(&mut out)?;
        Ok(out)
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = bytes;
        let snapshot = Self::decode(&mut r)?;
        ensure_consumed(r)?;
        Ok(snapshot)
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

pub const FRAME_MAGIC: [u8; 4] = *b"VDLT";
pub const FRAME_VERSION: u8 = 0x01;

const KIND_SNAPSHOT: u8 = 0;
const KIND_DELTA: u8 = 1;

/// Self-describing container for a snapshot or a delta.
///
/// Header: magic (4 bytes), format version (1), kind (1), flags (1),
/// followed by the body in the layout the flags select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Snapshot(Snapshot),
    Delta(Delta),
}

impl Frame {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "snapshot",
            Self::Delta(_) => "delta",
        }
    }

    pub fn encode<W: Write>(&self, w: &mut W) -> Result<(), WireError> {
        w.write_all(&FRAME_MAGIC)?;
        match self {
            Self::Snapshot(s) => {
                w.write_all(&[FRAME_VERSION, KIND_SNAPSHOT, 0])?;
                s.encode(w)
            }
            Self::Delta(d) => {
                w.write_all(&[FRAME_VERSION, KIND_DELTA, d.flags().bits()])?;
                d.encode(w)
            }
        }
    }

    pub fn decode<R: Read>(r: &mut R) -> Result<Self, WireError> {
        let mut header = [0u8; 7];
        read_exact_or_truncated(r, &mut header, "frame header")?;

        if header[..4] != FRAME_MAGIC {
            return Err(WireError::Malformed(format!(
                "invalid frame magic: {:02X} {:02X} {:02X} {:02X}",
                header[0], header[1], header[2], header[3]
            )));
        }
        if header[4] != FRAME_VERSION {
            return Err(WireError::Malformed(format!(
                "unsupported frame version: {:#04X}",
                header[4]
            )));
        }

        let raw_flags = header[6];
        match header[5] {
            KIND_SNAPSHOT => {
                if raw_flags != 0 {
                    return Err(WireError::Malformed(format!(
                        "snapshot frame with flags {raw_flags:#04X}"
                    )));
                }
                Ok(Self::Snapshot(Snapshot::decode(r)?))
            }
            KIND_DELTA => {
                let flags = DeltaFlags::from_bits(raw_flags).ok_or_else(|| {
                    WireError::Malformed(format!("invalid delta flags: {raw_flags:#04X}"))
                })?;
                let delta = Delta::decode(r, WireLayout::for_flags(flags))?;
                if delta.flags() != flags {
                    return Err(WireError::Malformed(format!(
                        "frame flags {:?} disagree with decoded delta {:?}",
                        flags,
                        delta.flags()
                    )));
                }
                Ok(Self::Delta(delta))
            }
            other => Err(WireError::Malformed(format!("unknown frame kind {other}"))),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        let mut out = Vec::new();
        self.encode(&mut out)?;
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = bytes;
        let frame = Self::decode(&mut r)?;
        ensure_consumed(r)?;
        Ok(frame)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
