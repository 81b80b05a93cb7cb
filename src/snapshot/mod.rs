// Versioned snapshot: a payload plus a monotonic version number.
//
// `change_data` diffs a new payload against the current one, stamps the
// next version and a digest, commits, and hands back the delta for other
// holders. `increment_data` is the receiving side: contiguity check, apply,
// digest check, then commit. A rejected delta leaves the snapshot untouched.
//
// - `options`: SnapshotOptions and the policies it selects
// - `shared`:  SharedSnapshot, a thread-safe wrapper with an atomic version

pub mod options;
pub mod shared;

use crate::delta::{self, Delta, UNVERSIONED};
use crate::integrity::{self, Verification};

pub use options::{Contiguity, SnapshotOptions, UnknownDigestPolicy};
pub use shared::SharedSnapshot;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons `increment_data` refuses a delta.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("version mismatch: snapshot is at {current}, delta targets {received}")]
    VersionMismatch { current: i64, received: i64 },
    #[error("integrity violation: digest of reconstructed version {version} does not match")]
    IntegrityViolation { version: i64 },
    #[error("unsupported digest algorithm ({digest_len}-byte digest)")]
    UnsupportedAlgorithm { digest_len: usize },
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// A byte buffer under version control.
#[derive(Debug, Clone)]
pub struct Snapshot {
    data: Option<Vec<u8>>,
    version: i64,
    options: SnapshotOptions,
}

// Options are local policy, so equality only looks at the state.
impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.data == other.data
    }
}

impl Eq for Snapshot {}

impl Snapshot {
    /// Unversioned snapshot holding `data`.
    pub fn new(data: Option<Vec<u8>>) -> Self {
        Self::with_version(data, UNVERSIONED)
    }

    pub fn with_version(data: Option<Vec<u8>>, version: i64) -> Self {
        Self {
            data,
            version,
            options: SnapshotOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: SnapshotOptions) -> Self {
        self.options = options;
        self
    }

    #[inline]
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    #[inline]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// False until the first delta is committed.
    #[inline]
    pub fn is_versioned(&self) -> bool {
        self.version != UNVERSIONED
    }

    #[inline]
    pub fn options(&self) -> &SnapshotOptions {
        &self.options
    }

    pub fn into_parts(self) -> (Option<Vec<u8>>, i64) {
        (self.data, self.version)
    }

    #[inline]
    fn next_version(&self) -> i64 {
        self.version.wrapping_add(1)
    }

    /// Replace the payload with `new`, returning the delta that describes
    /// the change.
    pub fn change_data(&mut self, new: &[u8]) -> Delta {
        let next = self.next_version();
        let mut delta = delta::diff(self.data(), new, self.options.diff_mode).with_version(next);
        if let Some(algorithm) = self.options.hash {
            delta = integrity::attach_hash(delta, new, algorithm);
        }

        log::debug!(
            "change_data: version {} -> {next}, {} of {} bytes carried",
            self.version,
            delta.stats().changed_bytes,
            new.len()
        );

        self.data = Some(new.to_vec());
        self.version = next;
        delta
    }

    /// Drop the payload, returning a dense delta with an absent target.
    pub fn clear_data(&mut self) -> Delta {
        let next = self.next_version();
        let delta = delta::diff_dense(None).with_version(next);
        log::debug!("clear_data: version {} -> {next}", self.version);
        self.data = None;
        self.version = next;
        delta
    }

    /// Apply a delta received from another holder.
    ///
    /// Unless `forced`, the delta must be exactly one version away and its
    /// digest (if any) must match the reconstructed payload. `forced`
    /// bypasses both checks.
    pub fn increment_data(&mut self, delta: &Delta, forced: bool) -> Result<(), PatchError> {
        let received = delta.version();

        if !forced {
            let step = received.checked_sub(self.version);
            if !self.options.contiguity.accepts(step) {
                log::warn!(
                    "increment_data: rejecting version {received} at version {}",
                    self.version
                );
                return Err(PatchError::VersionMismatch {
                    current: self.version,
                    received,
                });
            }
        }

        let candidate = delta::apply(self.data(), delta);

        if !forced {
            match integrity::check(delta, candidate.as_deref()) {
                Verification::Unguarded | Verification::Verified(_) => {}
                Verification::Mismatch(algorithm) => {
                    log::warn!(
                        "increment_data: {algorithm} digest mismatch for version {received}"
                    );
                    return Err(PatchError::IntegrityViolation { version: received });
                }
                Verification::Unrecognized { digest_len } => match self.options.unknown_digest {
                    UnknownDigestPolicy::Skip => {
                        log::warn!(
                            "increment_data: skipping verification of {digest_len}-byte digest"
                        );
                    }
                    UnknownDigestPolicy::Reject => {
                        return Err(PatchError::UnsupportedAlgorithm { digest_len });
                    }
                },
            }
        }

        log::debug!(
            "increment_data: version {} -> {received}{}",
            self.version,
            if forced { " (forced)" } else { "" }
        );

        self.data = candidate;
        self.version = received;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{DiffMode, diff_sparse};
    use crate::integrity::{HashAlgorithm, Integrity};

    fn holders() -> (Snapshot, Snapshot) {
        (
            Snapshot::new(Some(b"Test".to_vec())),
            Snapshot::new(Some(b"Test".to_vec())),
        )
    }

    #[test]
    fn change_then_increment() {
        let (mut writer, mut reader) = holders();
        assert!(!writer.is_versioned());

        let delta = writer.change_data(b"tEST");
        assert_eq!(writer.version(), UNVERSIONED + 1);
        assert_eq!(writer.data(), Some(&b"tEST"[..]));
        assert_eq!(delta.version(), UNVERSIONED + 1);
        assert_eq!(delta.payload(), Some(&[116u8, 69, 83, 84][..]));
        assert_eq!(delta.hash_algorithm(), Some(HashAlgorithm::Sha256));

        reader.increment_data(&delta, false).unwrap();
        assert_eq!(reader.data(), Some(&b"tEST"[..]));
        assert_eq!(reader.version(), UNVERSIONED + 1);
        assert!(reader.is_versioned());
    }

    #[test]
    fn successive_changes_chain() {
        let (mut writer, mut reader) = holders();
        for text in [&b"Tent"[..], b"Tents", b"T", b""] {
            let delta = writer.change_data(text);
            reader.increment_data(&delta, false).unwrap();
            assert_eq!(reader, writer);
        }
        assert_eq!(reader.version(), UNVERSIONED + 4);
    }

    #[test]
    fn same_version_rejected() {
        let (mut writer, mut reader) = holders();
        let delta = writer.change_data(b"tEST");
        reader.increment_data(&delta, false).unwrap();
        assert_eq!(
            reader.increment_data(&delta, false),
            Err(PatchError::VersionMismatch {
                current: UNVERSIONED + 1,
                received: UNVERSIONED + 1,
            })
        );
    }

    #[test]
    fn gap_rejected_unless_forced() {
        let (mut writer, mut reader) = holders();
        writer.change_data(b"one!");
        let second = writer.change_data(b"two!");

        let err = reader.increment_data(&second, false).unwrap_err();
        assert!(matches!(err, PatchError::VersionMismatch { .. }));
        assert_eq!(reader.data(), Some(&b"Test"[..]));
        assert_eq!(reader.version(), UNVERSIONED);

        // Forcing skips the checks but still merges position by position
        // onto the reader's own baseline: byte 3 is unchanged in `second`,
        // so it keeps the reader's 't'.
        reader.increment_data(&second, true).unwrap();
        assert_eq!(reader.version(), UNVERSIONED + 2);
        assert_eq!(reader.data(), Some(&b"twot"[..]));
    }

    #[test]
    fn backward_step_is_accepted_by_default() {
        let mut s = Snapshot::with_version(Some(b"new".to_vec()), 10);
        let undo = diff_sparse(Some(b"new"), b"old").with_version(9);
        s.increment_data(&undo, false).unwrap();
        assert_eq!(s.version(), 9);
        assert_eq!(s.data(), Some(&b"old"[..]));
    }

    #[test]
    fn forward_only_rejects_backward_step() {
        let mut s = Snapshot::with_version(Some(b"new".to_vec()), 10).with_options(
            SnapshotOptions {
                contiguity: Contiguity::ForwardOnly,
                ..Default::default()
            },
        );
        let undo = diff_sparse(Some(b"new"), b"old").with_version(9);
        assert!(matches!(
            s.increment_data(&undo, false),
            Err(PatchError::VersionMismatch { current: 10, received: 9 })
        ));
    }

    #[test]
    fn extreme_versions_do_not_overflow() {
        let mut s = Snapshot::new(Some(vec![1]));
        let far = diff_sparse(Some(&[1u8][..]), &[2u8]).with_version(i64::MAX);
        assert!(matches!(
            s.increment_data(&far, false),
            Err(PatchError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn corrupted_payload_violates_integrity() {
        let (mut writer, mut reader) = holders();
        let delta = writer.change_data(b"tEST");

        let mut changed = delta.payload().unwrap().to_vec();
        changed[0] ^= 0x01;
        let corrupted = Delta::from_parts(
            delta.version(),
            delta.target_length(),
            crate::delta::DeltaBody::Sparse {
                changed,
                bitmap: delta.bitmap().unwrap().clone(),
            },
            delta.integrity().cloned(),
        );

        assert_eq!(
            reader.increment_data(&corrupted, false),
            Err(PatchError::IntegrityViolation {
                version: UNVERSIONED + 1
            })
        );
        assert_eq!(reader.data(), Some(&b"Test"[..]));
        assert_eq!(reader.version(), UNVERSIONED);

        reader.increment_data(&delta, false).unwrap();
        assert_eq!(reader.data(), Some(&b"tEST"[..]));
    }

    #[test]
    fn forced_skips_integrity() {
        let mut s = Snapshot::new(Some(b"a".to_vec()));
        let bogus = diff_sparse(Some(b"a"), b"b")
            .with_version(UNVERSIONED + 1)
            .with_integrity(Some(Integrity::compute(HashAlgorithm::Sha256, b"zzz")));
        assert!(s.increment_data(&bogus, false).is_err());
        s.increment_data(&bogus, true).unwrap();
        assert_eq!(s.data(), Some(&b"b"[..]));
    }

    #[test]
    fn unknown_digest_policy() {
        let delta = diff_sparse(Some(b"a"), b"b")
            .with_version(UNVERSIONED + 1)
            .with_integrity(Some(Integrity::from_digest(vec![0; 20])));

        let mut lenient = Snapshot::new(Some(b"a".to_vec()));
        lenient.increment_data(&delta, false).unwrap();
        assert_eq!(lenient.data(), Some(&b"b"[..]));

        let mut strict = Snapshot::new(Some(b"a".to_vec())).with_options(SnapshotOptions {
            unknown_digest: UnknownDigestPolicy::Reject,
            ..Default::default()
        });
        assert_eq!(
            strict.increment_data(&delta, false),
            Err(PatchError::UnsupportedAlgorithm { digest_len: 20 })
        );
        assert_eq!(strict.version(), UNVERSIONED);
    }

    #[test]
    fn options_shape_emitted_deltas() {
        let mut s = Snapshot::new(Some(b"abc".to_vec())).with_options(SnapshotOptions {
            diff_mode: DiffMode::Dense,
            hash: Some(HashAlgorithm::Sha512),
            ..Default::default()
        });
        let d = s.change_data(b"abd");
        assert!(!d.is_sparse());
        assert_eq!(d.hash_algorithm(), Some(HashAlgorithm::Sha512));

        let mut bare = Snapshot::new(None).with_options(SnapshotOptions {
            hash: None,
            ..Default::default()
        });
        let d = bare.change_data(b"x");
        assert!(d.integrity().is_none());
        assert!(!d.is_sparse());
    }

    #[test]
    fn clear_then_restore() {
        let (mut writer, mut reader) = holders();
        let cleared = writer.clear_data();
        assert_eq!(writer.data(), None);
        reader.increment_data(&cleared, false).unwrap();
        assert_eq!(reader.data(), None);

        // No baseline on either side: the next delta is dense.
        let restored = writer.change_data(b"back");
        assert!(!restored.is_sparse());
        reader.increment_data(&restored, false).unwrap();
        assert_eq!(reader.data(), Some(&b"back"[..]));
        assert_eq!(reader.version(), UNVERSIONED + 2);
    }

    #[test]
    fn receiver_without_baseline_takes_payload() {
        // Sparse delta hitting a receiver with no data: payload verbatim.
        // Every byte changed here, so the digest still matches.
        let mut writer = Snapshot::new(Some(b"Test".to_vec()));
        let delta = writer.change_data(b"tEST");

        let mut empty = Snapshot::new(None);
        empty.increment_data(&delta, false).unwrap();
        assert_eq!(empty.data(), Some(&b"tEST"[..]));
    }
}
