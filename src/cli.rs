// Command-line front end for verdelta.
//
// Snapshot files are rewritten in place by `commit` and `apply`; every
// other output refuses to overwrite an existing file unless `--force` is
// given.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};

use crate::delta::{self, Delta, DeltaBody, DiffMode, UNVERSIONED};
use crate::integrity::{self, HashAlgorithm, Verification};
use crate::io::{self as vio, IoError};
use crate::snapshot::{Contiguity, SnapshotOptions, UnknownDigestPolicy};
use crate::wire::{FRAME_VERSION, Frame};

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Versioned byte-buffer snapshots with sparse deltas.
#[derive(Parser, Debug)]
#[command(
    name = "verdelta",
    version,
    about = "Versioned snapshot delta tool",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Create an unversioned snapshot file from a data file.
    Init(InitArgs),
    /// Commit new data to a snapshot and write the resulting delta.
    Commit(CommitArgs),
    /// Apply a delta to a snapshot file.
    Apply(ApplyArgs),
    /// Diff two plain files into a delta (no snapshot involved).
    Diff(DiffArgs),
    /// Apply a delta to a plain file.
    Patch(PatchArgs),
    /// Print the contents of a snapshot or delta file.
    Inspect(InspectArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum HashArg {
    None,
    Sha256,
    Sha512,
}

impl HashArg {
    fn algorithm(self) -> Option<HashAlgorithm> {
        match self {
            Self::None => None,
            Self::Sha256 => Some(HashAlgorithm::Sha256),
            Self::Sha512 => Some(HashAlgorithm::Sha512),
        }
    }
}

#[derive(Args, Debug)]
struct DiffTuningArgs {
    /// Emit the whole target instead of changed bytes only.
    #[arg(long)]
    dense: bool,

    /// Digest attached to the delta.
    #[arg(long, value_enum, default_value_t = HashArg::Sha256)]
    hash: HashArg,
}

#[derive(Args, Debug)]
struct AcceptArgs {
    /// Reject deltas that step back one version.
    #[arg(long = "forward-only")]
    forward_only: bool,

    /// Reject digests of unrecognised length instead of skipping them.
    #[arg(long = "strict-digest")]
    strict_digest: bool,
}

#[derive(Args, Debug)]
struct InitArgs {
    /// Initial payload.
    #[arg(value_hint = ValueHint::FilePath)]
    data: PathBuf,

    /// Snapshot file to create.
    #[arg(value_hint = ValueHint::FilePath)]
    snapshot: PathBuf,
}

#[derive(Args, Debug)]
struct CommitArgs {
    /// Snapshot file (rewritten in place).
    #[arg(value_hint = ValueHint::FilePath)]
    snapshot: PathBuf,

    /// New payload.
    #[arg(value_hint = ValueHint::FilePath)]
    data: PathBuf,

    /// Delta output file.
    #[arg(value_hint = ValueHint::FilePath)]
    delta: PathBuf,

    #[command(flatten)]
    tuning: DiffTuningArgs,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Snapshot file (rewritten in place).
    #[arg(value_hint = ValueHint::FilePath)]
    snapshot: PathBuf,

    /// Delta file.
    #[arg(value_hint = ValueHint::FilePath)]
    delta: PathBuf,

    /// Skip the version and digest checks.
    #[arg(long)]
    forced: bool,

    #[command(flatten)]
    accept: AcceptArgs,
}

#[derive(Args, Debug)]
struct DiffArgs {
    /// Baseline file (omit for a dense delta).
    #[arg(long, value_hint = ValueHint::FilePath)]
    old: Option<PathBuf>,

    /// Target file.
    #[arg(value_hint = ValueHint::FilePath)]
    new: PathBuf,

    /// Delta output file.
    #[arg(value_hint = ValueHint::FilePath)]
    delta: PathBuf,

    /// Version stamped on the delta.
    #[arg(long = "at-version", allow_hyphen_values = true)]
    at_version: Option<i64>,

    #[command(flatten)]
    tuning: DiffTuningArgs,
}

#[derive(Args, Debug)]
struct PatchArgs {
    /// Baseline file (omit when the delta is dense).
    #[arg(long, value_hint = ValueHint::FilePath)]
    old: Option<PathBuf>,

    /// Delta file.
    #[arg(value_hint = ValueHint::FilePath)]
    delta: PathBuf,

    /// Output file.
    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Do not verify the attached digest.
    #[arg(long = "no-verify")]
    no_verify: bool,

    /// Reject digests of unrecognised length instead of skipping them.
    #[arg(long = "strict-digest")]
    strict_digest: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Snapshot or delta file.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,
}

// ---------------------------------------------------------------------------
// Global output settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Output {
    force: bool,
    quiet: bool,
    verbose: u8,
    json: bool,
}

impl Output {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            force: cli.force,
            quiet: cli.quiet,
            verbose: cli.verbose.min(2),
            json: cli.json_output,
        }
    }

    fn log_filter(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "info",
            _ => "debug",
        }
    }

    fn emit_json(&self, value: serde_json::Value) {
        if self.json {
            match serde_json::to_string_pretty(&value) {
                Ok(s) => eprintln!("{s}"),
                Err(e) => eprintln!("verdelta: json error: {e}"),
            }
        }
    }

    /// Refuse to clobber `path` unless `--force` was given.
    fn check_overwrite(&self, path: &Path) -> Result<(), String> {
        if path.exists() && !self.force {
            Err(format!(
                "output file exists, use -f to overwrite: {}",
                path.display()
            ))
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Option mapping
// ---------------------------------------------------------------------------

fn diff_mode(tuning: &DiffTuningArgs) -> DiffMode {
    if tuning.dense {
        DiffMode::Dense
    } else {
        DiffMode::Sparse
    }
}

fn build_commit_options(tuning: &DiffTuningArgs) -> SnapshotOptions {
    SnapshotOptions {
        diff_mode: diff_mode(tuning),
        hash: tuning.hash.algorithm(),
        ..Default::default()
    }
}

fn build_accept_options(accept: &AcceptArgs) -> SnapshotOptions {
    SnapshotOptions {
        contiguity: if accept.forward_only {
            Contiguity::ForwardOnly
        } else {
            Contiguity::Bidirectional
        },
        unknown_digest: if accept.strict_digest {
            UnknownDigestPolicy::Reject
        } else {
            UnknownDigestPolicy::Skip
        },
        ..Default::default()
    }
}

fn version_label(version: i64) -> String {
    if version == UNVERSIONED {
        "unversioned".to_string()
    } else {
        version.to_string()
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn read_optional(path: Option<&PathBuf>) -> Result<Option<Vec<u8>>, String> {
    path.map(|p| fs::read(p).map_err(|e| format!("{}: {e}", p.display())))
        .transpose()
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

type CmdResult = Result<(), String>;

fn io_err(e: IoError) -> String {
    e.to_string()
}

fn cmd_init(args: &InitArgs, out: Output) -> CmdResult {
    out.check_overwrite(&args.snapshot)?;
    let written = vio::init_file(&args.data, &args.snapshot).map_err(io_err)?;
    if out.verbose > 0 && !out.quiet {
        eprintln!(
            "verdelta: init: {} ({written} bytes)",
            args.snapshot.display()
        );
    }
    out.emit_json(serde_json::json!({
        "command": "init",
        "snapshot_size": written,
    }));
    Ok(())
}

fn cmd_commit(args: &CommitArgs, out: Output) -> CmdResult {
    out.check_overwrite(&args.delta)?;
    let stats = vio::commit_file(
        &args.snapshot,
        &args.data,
        &args.delta,
        build_commit_options(&args.tuning),
    )
    .map_err(io_err)?;

    if !out.quiet {
        eprintln!(
            "verdelta: commit: version {} -> {}, {} of {} bytes carried{}",
            version_label(stats.previous_version),
            version_label(stats.version),
            stats.changed_bytes,
            stats.target_size,
            if stats.sparse { "" } else { " (dense)" }
        );
    }
    out.emit_json(serde_json::json!({
        "command": "commit",
        "previous_version": stats.previous_version,
        "version": stats.version,
        "target_size": stats.target_size,
        "delta_size": stats.delta_size,
        "changed_bytes": stats.changed_bytes,
        "sparse": stats.sparse,
        "target_sha256": hex(&stats.target_sha256),
    }));
    Ok(())
}

fn cmd_apply(args: &ApplyArgs, out: Output) -> CmdResult {
    let stats = vio::apply_file(
        &args.snapshot,
        &args.delta,
        args.forced,
        build_accept_options(&args.accept),
    )
    .map_err(io_err)?;

    if !out.quiet {
        eprintln!(
            "verdelta: apply: version {} -> {}{}",
            version_label(stats.previous_version),
            version_label(stats.version),
            if args.forced { " (forced)" } else { "" }
        );
    }
    out.emit_json(serde_json::json!({
        "command": "apply",
        "previous_version": stats.previous_version,
        "version": stats.version,
        "delta_size": stats.delta_size,
        "output_size": stats.output_size,
        "output_sha256": stats.output_sha256.as_ref().map(|d| hex(d)),
    }));
    Ok(())
}

fn cmd_diff(args: &DiffArgs, out: Output) -> CmdResult {
    out.check_overwrite(&args.delta)?;
    let old = read_optional(args.old.as_ref())?;
    let new = fs::read(&args.new).map_err(|e| format!("{}: {e}", args.new.display()))?;

    let mut d = delta::diff(old.as_deref(), &new, diff_mode(&args.tuning));
    if let Some(version) = args.at_version {
        d = d.with_version(version);
    }
    if let Some(algorithm) = args.tuning.hash.algorithm() {
        d = integrity::attach_hash(d, &new, algorithm);
    }

    let stats = d.stats();
    let sparse = d.is_sparse();
    let written = vio::write_frame(&args.delta, &Frame::Delta(d)).map_err(io_err)?;

    if out.verbose > 0 && !out.quiet {
        eprintln!(
            "verdelta: diff: {} of {} bytes changed, delta size: {written}",
            stats.changed_bytes,
            new.len()
        );
    }
    out.emit_json(serde_json::json!({
        "command": "diff",
        "target_size": new.len(),
        "changed_bytes": stats.changed_bytes,
        "sparse": sparse,
        "delta_size": written,
    }));
    Ok(())
}

fn cmd_patch(args: &PatchArgs, out: Output) -> CmdResult {
    out.check_overwrite(&args.output)?;
    let old = read_optional(args.old.as_ref())?;
    let d = vio::read_delta(&args.delta).map_err(io_err)?;

    let Some(patched) = delta::apply(old.as_deref(), &d) else {
        return Err("delta describes an absent target, nothing to write".into());
    };

    if !args.no_verify {
        match integrity::check(&d, Some(patched.as_slice())) {
            Verification::Unguarded | Verification::Verified(_) => {}
            Verification::Mismatch(algorithm) => {
                return Err(format!("{algorithm} digest mismatch on patched output"));
            }
            Verification::Unrecognized { digest_len } if args.strict_digest => {
                return Err(format!("unsupported {digest_len}-byte digest"));
            }
            Verification::Unrecognized { digest_len } => {
                log::warn!("skipping verification of {digest_len}-byte digest");
            }
        }
    }

    fs::write(&args.output, &patched).map_err(|e| format!("{}: {e}", args.output.display()))?;

    if out.verbose > 0 && !out.quiet {
        eprintln!("verdelta: patch: output size: {}", patched.len());
    }
    out.emit_json(serde_json::json!({
        "command": "patch",
        "output_size": patched.len(),
    }));
    Ok(())
}

fn describe_delta(d: &Delta) -> serde_json::Value {
    let stats = d.stats();
    let body = match d.body() {
        DeltaBody::Dense { payload: None } => "dense (absent target)",
        DeltaBody::Dense { .. } => "dense",
        DeltaBody::Sparse { .. } => "sparse",
    };
    serde_json::json!({
        "kind": "delta",
        "version": d.version(),
        "flags": d.flags().bits(),
        "body": body,
        "target_length": stats.target_len,
        "payload_len": stats.changed_bytes,
        "bitmap_len": stats.bitmap_len,
        "digest_algorithm": d.hash_algorithm().map(HashAlgorithm::name),
        "digest": d.integrity().map(|i| hex(i.digest())),
        "well_formed": d.is_well_formed(),
    })
}

fn cmd_inspect(args: &InspectArgs, out: Output) -> CmdResult {
    let frame = vio::read_frame(&args.input).map_err(io_err)?;

    let value = match &frame {
        Frame::Snapshot(s) => serde_json::json!({
            "kind": "snapshot",
            "version": s.version(),
            "payload_len": s.data().map(<[u8]>::len),
        }),
        Frame::Delta(d) => describe_delta(d),
    };

    if out.json {
        out.emit_json(value);
        return Ok(());
    }

    println!("VDLT frame version:  {FRAME_VERSION}");
    println!("Kind:                {}", frame.kind_name());
    match &frame {
        Frame::Snapshot(s) => {
            println!("Version:             {}", version_label(s.version()));
            match s.data() {
                Some(data) => println!("Payload length:      {}", data.len()),
                None => println!("Payload length:      (absent)"),
            }
        }
        Frame::Delta(d) => {
            let stats = d.stats();
            println!("Version:             {}", version_label(d.version()));
            println!("Flags:               {:?}", d.flags());
            match stats.target_len {
                Some(len) => println!("Target length:       {len}"),
                None => println!("Target length:       (unknown)"),
            }
            println!("Payload length:      {}", stats.changed_bytes);
            if d.is_sparse() {
                println!("Bitmap length:       {}", stats.bitmap_len);
            }
            if let Some(i) = d.integrity() {
                let name = i.algorithm().map_or("unrecognised", HashAlgorithm::name);
                println!("Digest ({name}):    {}", hex(i.digest()));
            }
            if !d.is_well_formed() {
                println!("WARNING: delta body is internally inconsistent");
            }
        }
    }
    Ok(())
}

fn cmd_config() -> CmdResult {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("verdelta version {version} (Rust)");

    let file_io = cfg!(feature = "file-io") as u8;
    let ptr_size = std::mem::size_of::<*const ()>();

    eprintln!("FILE_IO={file_io}");
    eprintln!("FRAME_VERSION={FRAME_VERSION}");
    eprintln!("DEFAULT_HASH={}", HashAlgorithm::default());
    eprintln!("DIGEST_SHA256={}", HashAlgorithm::Sha256.digest_len());
    eprintln!("DIGEST_SHA512={}", HashAlgorithm::Sha512.digest_len());
    eprintln!("UNVERSIONED={UNVERSIONED}");
    eprintln!("sizeof(usize)={ptr_size}");
    Ok(())
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("verdelta".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = Output::from_cli(&cli);
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();
    let out = Output::from_cli(&cli);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(out.log_filter()))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let result = match &cli.command {
        Cmd::Init(args) => cmd_init(args, out),
        Cmd::Commit(args) => cmd_commit(args, out),
        Cmd::Apply(args) => cmd_apply(args, out),
        Cmd::Diff(args) => cmd_diff(args, out),
        Cmd::Patch(args) => cmd_patch(args, out),
        Cmd::Inspect(args) => cmd_inspect(args, out),
        Cmd::Config => cmd_config(),
    };

    match result {
        Ok(()) => process::exit(0),
        Err(msg) => {
            eprintln!("verdelta: {msg}");
            process::exit(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
