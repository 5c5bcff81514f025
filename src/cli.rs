// Command-line front end for oxipack.
//
// Each subcommand is a thin wrapper over the library: delta diff/patch,
// object hashing, pack inspection, unpacking and pack building. Errors are
// reported as `oxipack: <context>: <error>` and turn into exit status 1.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};

use crate::compress::ZlibBackend;
use crate::delta::{self, MatcherConfig};
use crate::hash::ObjectId;
use crate::object::{self, Blob, ObjectGraph, ObjectKind, RawObject, loose};
use crate::pack::{self, DeltaBase, PackOptions, PackWriter};

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Git object, delta and pack toolkit.
#[derive(Parser, Debug)]
#[command(
    name = "oxipack",
    version,
    about = "Git object, delta and pack toolkit",
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
    /// Encode TARGET as a git delta against BASE.
    Diff(DiffArgs),
    /// Apply a git delta to BASE.
    Patch(PatchArgs),
    /// Compute the object id of a file, optionally writing a loose object.
    HashObject(HashObjectArgs),
    /// Check a pack's trailer and list its entries.
    VerifyPack(PackFileArgs),
    /// Decode a pack and list (or store) the objects it contains.
    Unpack(UnpackArgs),
    /// Build a pack from files, each stored as a blob.
    Pack(PackArgs),
}

#[derive(Args, Debug)]
struct DiffArgs {
    /// Base (source) file.
    #[arg(value_hint = ValueHint::FilePath)]
    base: PathBuf,

    /// Target file.
    #[arg(value_hint = ValueHint::FilePath)]
    target: PathBuf,

    /// Delta output (stdout if omitted).
    #[arg(value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Shortest match emitted as a copy.
    #[arg(long, default_value_t = delta::config::MIN_MATCH)]
    min_match: usize,

    /// Longest block the inputs are split into.
    #[arg(long, default_value_t = delta::config::MAX_BLOCK)]
    max_block: usize,
}

#[derive(Args, Debug)]
struct PatchArgs {
    /// Base (source) file.
    #[arg(value_hint = ValueHint::FilePath)]
    base: PathBuf,

    /// Delta file.
    #[arg(value_hint = ValueHint::FilePath)]
    delta: PathBuf,

    /// Patched output (stdout if omitted).
    #[arg(value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl From<KindArg> for ObjectKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Blob => ObjectKind::Blob,
            KindArg::Tree => ObjectKind::Tree,
            KindArg::Commit => ObjectKind::Commit,
            KindArg::Tag => ObjectKind::Tag,
        }
    }
}

#[derive(Args, Debug)]
struct HashObjectArgs {
    /// Object type of the input payload.
    #[arg(short = 't', long = "type", value_enum, default_value = "blob")]
    kind: KindArg,

    /// Skip parsing the payload as the given type.
    #[arg(long)]
    literally: bool,

    /// Write the loose object under this objects directory.
    #[arg(short = 'w', long = "write", value_name = "DIR", value_hint = ValueHint::DirPath)]
    objects_dir: Option<PathBuf>,

    /// Input payload (stdin if omitted).
    #[arg(value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PackFileArgs {
    /// Pack file.
    #[arg(value_hint = ValueHint::FilePath)]
    pack: PathBuf,
}

#[derive(Args, Debug)]
struct UnpackArgs {
    /// Pack file.
    #[arg(value_hint = ValueHint::FilePath)]
    pack: PathBuf,

    /// Write every object as a loose object under this directory.
    #[arg(short = 'o', long = "objects", value_name = "DIR", value_hint = ValueHint::DirPath)]
    objects_dir: Option<PathBuf>,

    /// Loose objects directory consulted for thin-pack bases.
    #[arg(long = "bases", value_name = "DIR", value_hint = ValueHint::DirPath)]
    bases_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PackArgs {
    /// Pack output file.
    #[arg(short = 'o', long, value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Files to store, in order.
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Zlib level for entry payloads (0-9).
    #[arg(short = 'l', long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(0..=9))]
    level: u32,

    /// Number of preceding blobs each file is diffed against.
    #[arg(long, default_value_t = 0)]
    window: usize,

    /// Longest delta chain the window search may build.
    #[arg(long, default_value_t = 16)]
    depth: usize,

    /// Store every delta as a reference-delta.
    #[arg(long)]
    no_offset_deltas: bool,
}

#[derive(Debug, Clone, Copy)]
struct Globals {
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
}

fn split_cli(cli: Cli) -> (Globals, Cmd) {
    let globals = Globals {
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_output: cli.json_output,
    };
    (globals, cli.command)
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("oxipack".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = split_cli(cli);
    }
}

// ---------------------------------------------------------------------------
// I/O helpers
// ---------------------------------------------------------------------------

fn read_input(path: Option<&Path>) -> io::Result<Vec<u8>> {
    match path {
        Some(path) => fs::read(path),
        None => {
            let mut data = Vec::new();
            io::stdin().lock().read_to_end(&mut data)?;
            Ok(data)
        }
    }
}

/// Open `path` for writing, or stdout. Existing files need `--force`.
fn open_output(path: Option<&Path>, force: bool) -> io::Result<Box<dyn Write>> {
    match path {
        None => Ok(Box::new(BufWriter::with_capacity(BUF_SIZE, io::stdout().lock()))),
        Some(path) => {
            if path.exists() && !force {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "output file exists, use -f to overwrite",
                ));
            }
            Ok(Box::new(BufWriter::with_capacity(BUF_SIZE, File::create(path)?)))
        }
    }
}

/// Write `path` through a sibling `.tmp` file that is renamed into place
/// only once `write` succeeds. On failure the temporary file is removed and
/// any existing `path` is left untouched.
fn replace_file<T, E: std::fmt::Display>(
    path: &Path,
    force: bool,
    write: impl FnOnce(&mut BufWriter<File>) -> Result<T, E>,
) -> Result<T, String> {
    if path.exists() && !force {
        return Err(format!("{}: output file exists, use -f to overwrite", path.display()));
    }
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let file = File::create(&temp_path).map_err(|e| format!("{}: {e}", temp_path.display()))?;
    let mut out = BufWriter::with_capacity(BUF_SIZE, file);
    let result = write(&mut out)
        .map_err(|e| e.to_string())
        .and_then(|value| {
            out.flush().map_err(|e| format!("{}: {e}", temp_path.display()))?;
            Ok(value)
        });
    drop(out);
    let result = result.and_then(|value| {
        fs::rename(&temp_path, path).map_err(|e| format!("{}: {e}", path.display()))?;
        Ok(value)
    });
    if result.is_err() {
        if let Err(e) = fs::remove_file(&temp_path) {
            log::debug!("{}: {e}", temp_path.display());
        }
    }
    result
}

fn write_output(path: Option<&Path>, force: bool, data: &[u8]) -> io::Result<()> {
    let mut out = open_output(path, force)?;
    out.write_all(data)?;
    out.flush()
}

fn display(path: Option<&Path>) -> String {
    path.map_or_else(|| "-".to_string(), |p| p.display().to_string())
}

/// `<dir>/<first two hex digits>/<remaining 38>`.
fn loose_path(dir: &Path, id: &ObjectId) -> PathBuf {
    let hex = id.to_hex();
    dir.join(&hex[..2]).join(&hex[2..])
}

/// Store `raw` as a loose object. Existing objects are left alone.
fn write_loose(dir: &Path, raw: &RawObject, backend: &ZlibBackend) -> Result<bool, String> {
    let path = loose_path(dir, &raw.id());
    if path.exists() {
        return Ok(false);
    }
    let bytes = loose::encode(raw, backend).map_err(|e| e.to_string())?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("{}: {e}", parent.display()))?;
    }
    fs::write(&path, bytes).map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(true)
}

fn read_loose(dir: &Path, id: &ObjectId, backend: &ZlibBackend) -> Option<RawObject> {
    let path = loose_path(dir, id);
    let bytes = fs::read(&path).ok()?;
    match loose::decode(&bytes, backend) {
        Ok((raw, _)) => Some(raw),
        Err(e) => {
            log::warn!("{}: {e}", path.display());
            None
        }
    }
}

fn print_json(json: &serde_json::Value) {
    match serde_json::to_string_pretty(json) {
        Ok(text) => eprintln!("{text}"),
        Err(e) => eprintln!("oxipack: json: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Diff / patch commands
// ---------------------------------------------------------------------------

fn cmd_diff(globals: Globals, args: &DiffArgs) -> i32 {
    let base = match fs::read(&args.base) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("oxipack: base file: {}: {e}", args.base.display());
            return 1;
        }
    };
    let target = match fs::read(&args.target) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("oxipack: target file: {}: {e}", args.target.display());
            return 1;
        }
    };

    let config = MatcherConfig {
        min_match: args.min_match,
        max_block: args.max_block.max(1),
        ..MatcherConfig::default()
    };
    let instructions = delta::diff_with_config(&base, &target, &config);

    let output = args.output.as_deref();
    if let Err(e) = write_output(output, globals.force, &instructions) {
        eprintln!("oxipack: output file: {}: {e}", display(output));
        return 1;
    }

    if globals.verbose > 0 && !globals.quiet {
        eprintln!(
            "oxipack: diff: base size: {}, target size: {}, delta size: {}",
            base.len(),
            target.len(),
            instructions.len()
        );
    }
    if globals.json_output {
        print_json(&serde_json::json!({
            "command": "diff",
            "base_size": base.len(),
            "target_size": target.len(),
            "delta_size": instructions.len(),
            "min_match": config.min_match,
            "max_block": config.max_block,
        }));
    }
    0
}

fn cmd_patch(globals: Globals, args: &PatchArgs) -> i32 {
    let base = match fs::read(&args.base) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("oxipack: base file: {}: {e}", args.base.display());
            return 1;
        }
    };
    let instructions = match fs::read(&args.delta) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("oxipack: delta file: {}: {e}", args.delta.display());
            return 1;
        }
    };

    let result = match delta::patch(&base, &instructions) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("oxipack: patch: {e}");
            return 1;
        }
    };

    let output = args.output.as_deref();
    if let Err(e) = write_output(output, globals.force, &result) {
        eprintln!("oxipack: output file: {}: {e}", display(output));
        return 1;
    }

    if globals.verbose > 0 && !globals.quiet {
        eprintln!(
            "oxipack: patch: base size: {}, delta size: {}, output size: {}",
            base.len(),
            instructions.len(),
            result.len()
        );
    }
    if globals.json_output {
        let instruction_count = delta::instructions(&instructions)
            .map(|(_, iter)| iter.count())
            .unwrap_or(0);
        print_json(&serde_json::json!({
            "command": "patch",
            "base_size": base.len(),
            "delta_size": instructions.len(),
            "output_size": result.len(),
            "instructions": instruction_count,
        }));
    }
    0
}

// ---------------------------------------------------------------------------
// Object commands
// ---------------------------------------------------------------------------

fn cmd_hash_object(globals: Globals, args: &HashObjectArgs) -> i32 {
    let input = args.input.as_deref();
    let data = match read_input(input) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("oxipack: input file: {}: {e}", display(input));
            return 1;
        }
    };

    let kind = ObjectKind::from(args.kind);
    if !args.literally {
        if let Err(e) = object::decode(kind, &data) {
            eprintln!("oxipack: {}: not a valid {kind}: {e}", display(input));
            return 1;
        }
    }
    let raw = RawObject::new(kind, data);
    let id = raw.id();

    let mut written = false;
    if let Some(dir) = &args.objects_dir {
        match write_loose(dir, &raw, &ZlibBackend::default()) {
            Ok(fresh) => written = fresh,
            Err(e) => {
                eprintln!("oxipack: write object {id}: {e}");
                return 1;
            }
        }
    }

    if !globals.quiet {
        println!("{id}");
    }
    if globals.json_output {
        print_json(&serde_json::json!({
            "command": "hash-object",
            "id": id.to_hex(),
            "type": kind.as_str(),
            "size": raw.data.len(),
            "written": written,
        }));
    }
    0
}

// ---------------------------------------------------------------------------
// Pack commands
// ---------------------------------------------------------------------------

fn cmd_verify_pack(globals: Globals, args: &PackFileArgs) -> i32 {
    let bytes = match fs::read(&args.pack) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("oxipack: pack file: {}: {e}", args.pack.display());
            return 1;
        }
    };
    let entries = match pack::inspect(&bytes) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("oxipack: {}: {e}", args.pack.display());
            return 1;
        }
    };

    let mut deltas = 0usize;
    for entry in &entries {
        if entry.base.is_some() {
            deltas += 1;
        }
        if globals.quiet {
            continue;
        }
        let base = match entry.base {
            Some(DeltaBase::Offset(distance)) => format!(" base {}", entry.offset - distance.min(entry.offset)),
            Some(DeltaBase::Id(id)) => format!(" base {id}"),
            None => String::new(),
        };
        println!(
            "{:>10} {:<9} {:>10} {:>10}{base}",
            entry.offset,
            entry.entry_type.name(),
            entry.size,
            entry.stored_len
        );
    }

    if !globals.quiet {
        println!("{}: ok", args.pack.display());
    }
    if globals.json_output {
        print_json(&serde_json::json!({
            "command": "verify-pack",
            "entries": entries.len(),
            "deltas": deltas,
            "size": bytes.len(),
        }));
    }
    0
}

fn cmd_unpack(globals: Globals, args: &UnpackArgs) -> i32 {
    let bytes = match fs::read(&args.pack) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("oxipack: pack file: {}: {e}", args.pack.display());
            return 1;
        }
    };

    let backend = ZlibBackend::default();
    let decoded = match &args.bases_dir {
        Some(dir) => pack::decode_with_resolver(&bytes, |id: &ObjectId| read_loose(dir, id, &backend)),
        None => pack::decode(&bytes),
    };
    let unpacked = match decoded {
        Ok(unpacked) => unpacked,
        Err(e) => {
            eprintln!("oxipack: {}: {e}", args.pack.display());
            return 1;
        }
    };

    let graph = unpacked.graph();
    let mut written = 0usize;
    let mut max_depth = 0usize;
    for packed in unpacked.objects() {
        max_depth = max_depth.max(packed.depth);
        let serialized = match graph.serialize(packed.handle) {
            Ok(serialized) => serialized,
            Err(e) => {
                eprintln!("oxipack: object {}: {e}", packed.id);
                return 1;
            }
        };
        if !globals.quiet {
            let size = serialized.pack_payload().len();
            if globals.verbose > 0 {
                println!("{} {:<6} {size} {} {}", packed.id, packed.kind.as_str(), packed.offset, packed.depth);
            } else {
                println!("{} {:<6} {size}", packed.id, packed.kind.as_str());
            }
        }
        if let Some(dir) = &args.objects_dir {
            match write_loose(dir, &serialized.to_raw(), &backend) {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => {
                    eprintln!("oxipack: write object {}: {e}", packed.id);
                    return 1;
                }
            }
        }
    }

    if globals.verbose > 0 && !globals.quiet {
        eprintln!(
            "oxipack: unpack: {} objects, {written} written, checksum {}",
            unpacked.len(),
            unpacked.checksum()
        );
    }
    if globals.json_output {
        print_json(&serde_json::json!({
            "command": "unpack",
            "objects": unpacked.len(),
            "written": written,
            "max_depth": max_depth,
            "checksum": unpacked.checksum().to_hex(),
        }));
    }
    0
}

fn cmd_pack(globals: Globals, args: &PackArgs) -> i32 {
    let mut graph = ObjectGraph::new();
    let mut handles = Vec::with_capacity(args.inputs.len());
    for path in &args.inputs {
        match fs::read(path) {
            Ok(data) => handles.push(graph.insert(Blob::new(data))),
            Err(e) => {
                eprintln!("oxipack: input file: {}: {e}", path.display());
                return 1;
            }
        }
    }

    let options = PackOptions {
        compression_level: args.level,
        offset_deltas: !args.no_offset_deltas,
        delta_window: args.window,
        max_delta_depth: args.depth,
    };
    let mut writer = PackWriter::with_options(&graph, options);
    for &handle in &handles {
        if let Err(e) = writer.add(handle) {
            eprintln!("oxipack: pack: {e}");
            return 1;
        }
    }

    let summary = match replace_file(&args.output, globals.force, |out| writer.write_to(out)) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("oxipack: pack: {e}");
            return 1;
        }
    };

    if !globals.quiet {
        println!("{}", summary.checksum);
    }
    if globals.verbose > 0 && !globals.quiet {
        eprintln!(
            "oxipack: pack: {} entries ({} ofs-delta, {} ref-delta), {} bytes",
            summary.entries, summary.offset_deltas, summary.ref_deltas, summary.bytes
        );
    }
    if globals.json_output {
        print_json(&serde_json::json!({
            "command": "pack",
            "entries": summary.entries,
            "offset_deltas": summary.offset_deltas,
            "ref_deltas": summary.ref_deltas,
            "bytes": summary.bytes,
            "checksum": summary.checksum.to_hex(),
            "level": options.compression_level,
        }));
    }
    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let (globals, command) = split_cli(Cli::parse());
    let exit_code = match &command {
        Cmd::Diff(args) => cmd_diff(globals, args),
        Cmd::Patch(args) => cmd_patch(globals, args),
        Cmd::HashObject(args) => cmd_hash_object(globals, args),
        Cmd::VerifyPack(args) => cmd_verify_pack(globals, args),
        Cmd::Unpack(args) => cmd_unpack(globals, args),
        Cmd::Pack(args) => cmd_pack(globals, args),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
