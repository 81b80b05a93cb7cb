// Snapshot tuning knobs.

use crate::delta::DiffMode;
use crate::integrity::HashAlgorithm;

/// What to do with a digest whose length matches no supported algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownDigestPolicy {
    /// Accept the delta without verification.
    #[default]
    Skip,
    /// Reject the delta with `PatchError::UnsupportedAlgorithm`.
    Reject,
}

/// Which version offsets a non-forced increment accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Contiguity {
    /// `delta.version` may be one above or one below the current version.
    #[default]
    Bidirectional,
    /// `delta.version` must be exactly one above the current version.
    ForwardOnly,
}

impl Contiguity {
    /// Whether a step of `received - current` is acceptable.
    pub(crate) fn accepts(self, step: Option<i64>) -> bool {
        match (self, step) {
            (_, Some(1)) => true,
            (Self::Bidirectional, Some(-1)) => true,
            _ => false,
        }
    }
}

/// Configuration for a `Snapshot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotOptions {
    /// Body produced by `change_data`.
    pub diff_mode: DiffMode,
    /// Digest attached by `change_data`; `None` leaves deltas unguarded.
    pub hash: Option<HashAlgorithm>,
    pub unknown_digest: UnknownDigestPolicy,
    pub contiguity: Contiguity,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            diff_mode: DiffMode::Sparse,
            hash: Some(HashAlgorithm::Sha256),
            unknown_digest: UnknownDigestPolicy::Skip,
            contiguity: Contiguity::Bidirectional,
        }
    }
}
