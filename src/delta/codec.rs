// Fixed-position byte-wise diff and patch.
//
// `diff_sparse` compares `new` against `old` position by position and keeps
// only the bytes that differ, plus a bitmap locating them. `apply` replays a
// delta over a baseline. Neither function fails: malformed deltas produce
// best-effort output and validation is left to the caller.

use super::bitmap::byte_length;
use super::{ChangeBitmap, Delta, DeltaBody};

/// Which delta body `diff` should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffMode {
    /// Full target payload.
    Dense,
    /// Changed bytes plus a bitmap (falls back to dense without a baseline).
    #[default]
    Sparse,
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Diff `old -> new` with the caller's choice of body.
pub fn diff(old: Option<&[u8]>, new: &[u8], mode: DiffMode) -> Delta {
    match mode {
        DiffMode::Dense => diff_dense(Some(new)),
        DiffMode::Sparse => diff_sparse(old, new),
    }
}

/// Dense delta carrying all of `new`. `None` describes a deleted target.
pub fn diff_dense(new: Option<&[u8]>) -> Delta {
    Delta::dense(new.map(<[u8]>::to_vec))
}

/// Sparse delta holding only the bytes of `new` that differ from `old`.
///
/// A byte at position `i` is changed iff `i >= old.len()` or
/// `new[i] != old[i]`. Without a baseline the result is dense, since
/// positions mean nothing without something to patch.
pub fn diff_sparse(old: Option<&[u8]>, new: &[u8]) -> Delta {
    let Some(old) = old else {
        log::trace!("diff_sparse: no baseline, emitting dense ({} bytes)", new.len());
        return diff_dense(Some(new));
    };

    let mut bitmap = ChangeBitmap::new(new.len());
    let mut changed = Vec::with_capacity(new.len());

    for (i, &byte) in new.iter().enumerate() {
        if old.get(i) != Some(&byte) {
            changed.push(byte);
            bitmap.set(i);
        }
    }
    changed.shrink_to_fit();

    log::trace!(
        "diff_sparse: {} of {} bytes changed (baseline {} bytes)",
        changed.len(),
        new.len(),
        old.len()
    );

    Delta::sparse(Some(new.len()), changed, bitmap)
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

/// Rebuild a target from `old` and `delta`.
///
/// Dense bodies return their payload verbatim. Sparse bodies with an
/// unknown target length, or applied without a baseline, also return their
/// payload verbatim, as do sparse bodies whose bitmap does not cover
/// exactly the target length. Otherwise set bits take the next payload
/// byte, unset bits copy `old[i]`, and positions past the end of `old`
/// stay `0`.
pub fn apply(old: Option<&[u8]>, delta: &Delta) -> Option<Vec<u8>> {
    match delta.body() {
        DeltaBody::Dense { payload } => payload.clone(),
        DeltaBody::Sparse { changed, bitmap } => match (old, delta.target_length()) {
            (Some(old), Some(target_len))
                if bitmap.len_bytes() == byte_length(target_len) =>
            {
                Some(merge(old, changed, bitmap, target_len))
            }
            (Some(_), Some(target_len)) => {
                log::debug!(
                    "apply: {}-byte bitmap cannot cover target length {target_len}, \
                     returning payload verbatim",
                    bitmap.len_bytes()
                );
                Some(changed.clone())
            }
            _ => Some(changed.clone()),
        },
    }
}

fn merge(old: &[u8], changed: &[u8], bitmap: &ChangeBitmap, target_len: usize) -> Vec<u8> {
    let mut out = vec![0u8; target_len];
    let mut cursor = changed.iter();

    for (i, slot) in out.iter_mut().enumerate() {
        if bitmap.test(i) {
            // A short payload leaves the remaining changed slots zeroed.
            if let Some(&byte) = cursor.next() {
                *slot = byte;
            }
        } else if let Some(&byte) = old.get(i) {
            *slot = byte;
        }
    }

    out
}
