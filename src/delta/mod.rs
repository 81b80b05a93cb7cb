// Delta model: a transition into a target version.
//
// A delta is one tagged body (dense or sparse) plus an optional integrity
// digest. The two capabilities are orthogonal and reported as `DeltaFlags`.
//
// - `bitmap`: ChangeBitmap locating changed bytes
// - `codec`:  `diff_*` producers and the `apply` patcher

pub mod bitmap;
pub mod codec;

use bitflags::bitflags;

use crate::integrity::{HashAlgorithm, Integrity};

pub use bitmap::ChangeBitmap;
pub use codec::{DiffMode, apply, diff, diff_dense, diff_sparse};

/// Version value of a snapshot (or a delta) that has never been stamped.
pub const UNVERSIONED: i64 = i64::MIN;

bitflags! {
    /// Capabilities carried by a delta.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DeltaFlags: u8 {
        /// Body holds only changed bytes plus a bitmap.
        const SPARSE = 1 << 0;
        /// An integrity digest is attached.
        const HASHED = 1 << 1;
    }
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

/// The payload half of a delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaBody {
    /// Entire target buffer, or `None` when the target is absent/deleted.
    Dense { payload: Option<Vec<u8>> },
    /// Changed bytes in left-to-right order and the positions they go to.
    Sparse {
        changed: Vec<u8>,
        bitmap: ChangeBitmap,
    },
}

// ---------------------------------------------------------------------------
// Delta
// ---------------------------------------------------------------------------

/// Immutable description of a transition into `version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    version: i64,
    target_length: Option<usize>,
    body: DeltaBody,
    integrity: Option<Integrity>,
}

impl Delta {
    /// Dense delta carrying the whole target.
    ///
    /// The target length is taken from the payload; an absent payload has
    /// an unknown length.
    pub fn dense(payload: Option<Vec<u8>>) -> Self {
        Self {
            version: UNVERSIONED,
            target_length: payload.as_ref().map(Vec::len),
            body: DeltaBody::Dense { payload },
            integrity: None,
        }
    }

    /// Sparse delta producing a buffer of `target_length` bytes.
    pub fn sparse(target_length: Option<usize>, changed: Vec<u8>, bitmap: ChangeBitmap) -> Self {
        Self {
            version: UNVERSIONED,
            target_length,
            body: DeltaBody::Sparse { changed, bitmap },
            integrity: None,
        }
    }

    /// Assemble a delta from raw parts without checking the invariants.
    ///
    /// Used by the wire decoder and by tests that need malformed deltas.
    pub fn from_parts(
        version: i64,
        target_length: Option<usize>,
        body: DeltaBody,
        integrity: Option<Integrity>,
    ) -> Self {
        Self {
            version,
            target_length,
            body,
            integrity,
        }
    }

    /// Stamp the version this delta moves its receiver to.
    #[must_use]
    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    /// Attach (or replace) the integrity digest.
    #[must_use]
    pub fn with_integrity(mut self, integrity: Option<Integrity>) -> Self {
        self.integrity = integrity;
        self
    }

    #[must_use]
    pub fn with_target_length(mut self, target_length: Option<usize>) -> Self {
        self.target_length = target_length;
        self
    }

    #[inline]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Length of the buffer this delta produces, `None` if unknown.
    #[inline]
    pub fn target_length(&self) -> Option<usize> {
        self.target_length
    }

    #[inline]
    pub fn body(&self) -> &DeltaBody {
        &self.body
    }

    #[inline]
    pub fn integrity(&self) -> Option<&Integrity> {
        self.integrity.as_ref()
    }

    /// Algorithm implied by the attached digest, if recognised.
    pub fn hash_algorithm(&self) -> Option<HashAlgorithm> {
        self.integrity.as_ref().and_then(Integrity::algorithm)
    }

    /// The payload bytes: full target for dense, changed bytes for sparse.
    pub fn payload(&self) -> Option<&[u8]> {
        match &self.body {
            DeltaBody::Dense { payload } => payload.as_deref(),
            DeltaBody::Sparse { changed, .. } => Some(changed),
        }
    }

    pub fn bitmap(&self) -> Option<&ChangeBitmap> {
        match &self.body {
            DeltaBody::Dense { .. } => None,
            DeltaBody::Sparse { bitmap, .. } => Some(bitmap),
        }
    }

    #[inline]
    pub fn is_sparse(&self) -> bool {
        matches!(self.body, DeltaBody::Sparse { .. })
    }

    pub fn flags(&self) -> DeltaFlags {
        let mut flags = DeltaFlags::empty();
        if self.is_sparse() {
            flags |= DeltaFlags::SPARSE;
        }
        if self.integrity.is_some() {
            flags |= DeltaFlags::HASHED;
        }
        flags
    }

    /// Check the structural invariants of the body.
    ///
    /// Sparse: set bits == changed bytes, and the bitmap covers exactly
    /// `target_length` positions when the length is known.
    /// Dense: payload length equals `target_length` when both are known.
    pub fn is_well_formed(&self) -> bool {
        match &self.body {
            DeltaBody::Dense { payload } => match (payload, self.target_length) {
                (Some(p), Some(len)) => p.len() == len,
                _ => true,
            },
            DeltaBody::Sparse { changed, bitmap } => {
                let covers = self
                    .target_length
                    .is_none_or(|len| bitmap.len_bytes() == bitmap::byte_length(len));
                covers && bitmap.count_ones() == changed.len()
            }
        }
    }

    /// Size summary for diagnostics.
    pub fn stats(&self) -> DeltaStats {
        let payload_len = self.payload().map_or(0, <[u8]>::len);
        let bitmap_len = self.bitmap().map_or(0, ChangeBitmap::len_bytes);
        let digest_len = self.integrity.as_ref().map_or(0, |i| i.digest().len());
        DeltaStats {
            target_len: self.target_length,
            changed_bytes: payload_len,
            bitmap_len,
            digest_len,
        }
    }
}

/// Size summary of a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaStats {
    pub target_len: Option<usize>,
    /// Bytes the delta writes into the target (all of them for dense).
    pub changed_bytes: usize,
    pub bitmap_len: usize,
    pub digest_len: usize,
}
