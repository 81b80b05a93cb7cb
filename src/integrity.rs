// Integrity guard: optional SHA-2 digest over a delta's target bytes.
//
// The algorithm is never stored separately; it is implied by the digest
// length (32 bytes => SHA-256, 64 bytes => SHA-512). Digests of any other
// length are carried through untouched but cannot be verified.

use sha2::{Digest, Sha256, Sha512};

use crate::delta::Delta;

// ---------------------------------------------------------------------------
// Hasher seam
// ---------------------------------------------------------------------------

/// Incremental hash function with a fixed output length.
pub trait IntegrityHasher {
    fn update(&mut self, data: &[u8]);
    fn finish(self) -> Vec<u8>;
    fn digest_length(&self) -> usize;
}

impl<D: Digest> IntegrityHasher for D {
    fn update(&mut self, data: &[u8]) {
        Digest::update(self, data);
    }

    fn finish(self) -> Vec<u8> {
        self.finalize().to_vec()
    }

    fn digest_length(&self) -> usize {
        <D as Digest>::output_size()
    }
}

// ---------------------------------------------------------------------------
// Algorithms
// ---------------------------------------------------------------------------

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub const fn digest_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }

    /// Recognise an algorithm from its output length.
    pub const fn from_digest_len(len: usize) -> Option<Self> {
        match len {
            32 => Some(Self::Sha256),
            64 => Some(Self::Sha512),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// One-shot digest of `data`.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Integrity record
// ---------------------------------------------------------------------------

/// Digest attached to a delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Integrity {
    digest: Vec<u8>,
}

impl Integrity {
    pub fn compute(algorithm: HashAlgorithm, target: &[u8]) -> Self {
        Self {
            digest: algorithm.digest(target),
        }
    }

    /// Wrap digest bytes of any length.
    pub fn from_digest(digest: Vec<u8>) -> Self {
        Self { digest }
    }

    #[inline]
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// `None` when the digest length matches no supported algorithm.
    #[inline]
    pub fn algorithm(&self) -> Option<HashAlgorithm> {
        HashAlgorithm::from_digest_len(self.digest.len())
    }
}

// ---------------------------------------------------------------------------
// Attach / verify
// ---------------------------------------------------------------------------

/// Digest `target` with `algorithm` and attach the result to `delta`.
pub fn attach_hash(delta: Delta, target: &[u8], algorithm: HashAlgorithm) -> Delta {
    delta.with_integrity(Some(Integrity::compute(algorithm, target)))
}

/// Digest `target` with a caller-supplied hasher and attach the result.
pub fn attach_hash_with<H: IntegrityHasher>(delta: Delta, target: &[u8], mut hasher: H) -> Delta {
    hasher.update(target);
    delta.with_integrity(Some(Integrity::from_digest(hasher.finish())))
}

/// Outcome of checking a reconstructed buffer against a delta's digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// The delta carries no digest.
    Unguarded,
    /// Recomputed digest matches.
    Verified(HashAlgorithm),
    /// Recomputed digest differs.
    Mismatch(HashAlgorithm),
    /// Digest length matches no supported algorithm.
    Unrecognized { digest_len: usize },
}

/// Recompute the digest of `reconstructed` and compare it to the delta's.
///
/// An absent target is hashed as the empty byte string.
pub fn check(delta: &Delta, reconstructed: Option<&[u8]>) -> Verification {
    let Some(integrity) = delta.integrity() else {
        return Verification::Unguarded;
    };
    let Some(algorithm) = integrity.algorithm() else {
        return Verification::Unrecognized {
            digest_len: integrity.digest().len(),
        };
    };

    let actual = algorithm.digest(reconstructed.unwrap_or_default());
    if actual == integrity.digest() {
        Verification::Verified(algorithm)
    } else {
        Verification::Mismatch(algorithm)
    }
}

/// Permissive verification: only a recognised, mismatching digest fails.
pub fn verify(delta: &Delta, reconstructed: Option<&[u8]>) -> bool {
    !matches!(check(delta, reconstructed), Verification::Mismatch(_))
}
