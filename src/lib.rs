//! Verdelta: versioned byte buffers with sparse bitmap deltas.
//!
//! The crate provides:
//! - A fixed-position byte-wise delta codec (`delta`)
//! - Optional SHA-2 integrity digests on deltas (`integrity`)
//! - A bit-exact, length-prefixed wire format (`wire`)
//! - Versioned snapshots with contiguity and digest checks (`snapshot`)
//! - File-oriented helpers (`io`, `file-io` feature)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use verdelta::snapshot::Snapshot;
//!
//! let mut writer = Snapshot::new(Some(b"Test".to_vec()));
//! let mut reader = writer.clone();
//!
//! let delta = writer.change_data(b"tEST");
//! reader.increment_data(&delta, false).unwrap();
//! assert_eq!(reader.data(), Some(&b"tEST"[..]));
//! assert_eq!(reader.version(), writer.version());
//! ```

pub mod delta;
pub mod integrity;
pub mod snapshot;
pub mod wire;

#[cfg(feature = "file-io")]
pub mod io;

#[cfg(feature = "cli")]
pub mod cli;

pub use delta::{ChangeBitmap, Delta, DeltaBody, DeltaFlags, DiffMode, UNVERSIONED};
pub use delta::{apply, diff, diff_dense, diff_sparse};
pub use integrity::{HashAlgorithm, Integrity, IntegrityHasher};
pub use snapshot::{PatchError, SharedSnapshot, Snapshot, SnapshotOptions};
pub use wire::{Frame, WireError, WireLayout, from_wire, to_wire};
