//! hashdb command-line tool
//!
//! Thin front end over the library: one subcommand per database operation.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use hashdb::codec::{self, parse_digest, HashRange};
use hashdb::logger::OperationLog;
use hashdb::ops::{self, CountRange, OrdinalRange};
use hashdb::scan::{scan_list, ScanManager};
use hashdb::{Changes, HashDb, OpenMode, Result, ScanMode, Settings};

/// Block-hash database tool
#[derive(Parser, Debug)]
#[command(name = "hashdb")]
#[command(about = "Block-hash database for forensic content matching")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new database
    Create {
        db: PathBuf,

        #[arg(long, default_value = "512")]
        byte_alignment: u64,

        #[arg(long, default_value = "512")]
        block_size: u64,

        /// Per-hash occurrence cap (0 = unlimited)
        #[arg(long, default_value = "0")]
        max_duplicates: u64,

        #[arg(long, default_value = "100000")]
        max_id_offset_pairs: u64,

        /// Digest bytes forming the index key (0 = whole digest)
        #[arg(long, default_value = "0")]
        hash_truncation: usize,

        #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
        bloom: bool,

        #[arg(long, default_value = "28")]
        bloom_m: u32,

        #[arg(long, default_value = "3")]
        bloom_k: u32,
    },

    /// Import line-delimited JSON
    Import { db: PathBuf, json_file: PathBuf },

    /// Import a tab file of file hash, block hash and block index
    ImportTab {
        db: PathBuf,
        tab_file: PathBuf,

        /// Repository name (defaults to the tab file name)
        #[arg(short, long)]
        repository: Option<String>,

        /// Label hashes found in this database as whitelisted
        #[arg(short, long)]
        whitelist: Option<PathBuf>,
    },

    /// Import a DFXML file
    ImportDfxml {
        db: PathBuf,
        dfxml_file: PathBuf,

        #[arg(short, long, default_value = "")]
        repository: String,
    },

    /// Export as line-delimited JSON, or as DFXML with --dfxml
    Export {
        db: PathBuf,
        out_file: PathBuf,

        /// Hex digest range `lo:hi`
        #[arg(long)]
        range: Option<String>,

        #[arg(long)]
        dfxml: bool,
    },

    /// Union A into B
    Add { a: PathBuf, b: PathBuf },

    /// Union A1 .. An into OUT
    AddMultiple {
        #[arg(required = true, num_args = 2..)]
        dbs: Vec<PathBuf>,
    },

    /// Copy sources in a repository
    AddRepository {
        a: PathBuf,
        out: PathBuf,
        repository: String,
    },

    /// Copy sources by ordinal `lo:hi`
    AddRange { a: PathBuf, out: PathBuf, range: String },

    /// Copy hashes whose count is in `m:n`
    AddCountRange { a: PathBuf, out: PathBuf, range: String },

    /// Occurrences in both A and B
    Intersect { a: PathBuf, b: PathBuf, out: PathBuf },

    /// Block hashes in both A and B
    IntersectHash { a: PathBuf, b: PathBuf, out: PathBuf },

    /// Occurrences of A not in B
    Subtract { a: PathBuf, b: PathBuf, out: PathBuf },

    /// Block hashes of A not in B
    SubtractHash { a: PathBuf, b: PathBuf, out: PathBuf },

    /// Copy sources outside a repository
    SubtractRepository {
        a: PathBuf,
        out: PathBuf,
        repository: String,
    },

    /// Keep one name per source
    Deduplicate { a: PathBuf, out: PathBuf },

    /// Copy hashes occurring exactly once
    Unique { a: PathBuf, out: PathBuf },

    /// Rebuild (or disable) the Bloom filter
    RebuildBloom {
        db: PathBuf,

        #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
        bloom: bool,

        #[arg(long, default_value = "28")]
        bloom_m: u32,

        #[arg(long, default_value = "3")]
        bloom_k: u32,
    },

    /// Scan one hex digest
    ScanHash {
        db: PathBuf,
        hex_digest: String,

        /// e, o, c or a
        #[arg(short, long, default_value = "e")]
        mode: String,
    },

    /// Scan `label<TAB>hex` lines
    ScanList {
        db: PathBuf,
        list_file: PathBuf,

        #[arg(short, long, default_value = "o")]
        mode: String,
    },

    /// Store sizes
    Size { db: PathBuf },

    /// Source records as JSON lines
    Sources { db: PathBuf },

    /// Distribution of occurrence counts
    Histogram { db: PathBuf },

    /// Hashes with exactly `count` occurrences
    Duplicates { db: PathBuf, count: u64 },

    /// Hashes of one source
    HashTable { db: PathBuf, file_hash: String },

    /// Read bytes at a forensic path such as `600-zip-3`
    ReadBytes {
        media: PathBuf,
        forensic_path: String,
        count: u64,
    },
}

fn main() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,hashdb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let command_line = std::env::args().collect::<Vec<_>>().join(" ");

    if let Err(e) = run(args.command, &command_line) {
        tracing::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands, command_line: &str) -> Result<()> {
    match command {
        Commands::Create {
            db,
            byte_alignment,
            block_size,
            max_duplicates,
            max_id_offset_pairs,
            hash_truncation,
            bloom,
            bloom_m,
            bloom_k,
        } => {
            let settings = Settings::builder()
                .byte_alignment(byte_alignment)
                .block_size(block_size)
                .max_duplicates(max_duplicates)
                .max_id_offset_pairs(max_id_offset_pairs)
                .hash_truncation(hash_truncation)
                .bloom_used(bloom)
                .bloom(bloom_m, bloom_k)
                .build()?;
            HashDb::create(&db, &settings)?;
            let mut log = OperationLog::open(&db, command_line)?;
            log.add_timestamp("create")?;
            log.close()?;
            println!("New database created.");
        }

        Commands::Import { db, json_file } => {
            let reader = BufReader::new(File::open(&json_file)?);
            mutate(&db, command_line, "import", |db, changes| {
                codec::json::import_json(db, reader, changes)
            })?;
        }

        Commands::ImportTab {
            db,
            tab_file,
            repository,
            whitelist,
        } => {
            let whitelist = whitelist
                .map(|w| HashDb::open(&w, OpenMode::ReadOnly))
                .transpose()?;
            mutate(&db, command_line, "import_tab", |db, changes| {
                codec::tab::import_tab(
                    db,
                    &tab_file,
                    repository.as_deref(),
                    whitelist.as_ref(),
                    changes,
                )
            })?;
        }

        Commands::ImportDfxml {
            db,
            dfxml_file,
            repository,
        } => {
            let reader = BufReader::new(File::open(&dfxml_file)?);
            mutate(&db, command_line, "import_dfxml", |db, changes| {
                codec::dfxml::import_dfxml(db, reader, &repository, changes)
            })?;
        }

        Commands::Export {
            db,
            out_file,
            range,
            dfxml,
        } => {
            let handle = HashDb::open(&db, OpenMode::ReadOnly)?;
            let mut out = BufWriter::new(File::create(&out_file)?);
            if dfxml {
                let fileobjects = codec::dfxml::export_dfxml(&handle, &mut out)?;
                println!("# exported {} fileobjects", fileobjects);
            } else {
                let range = range.as_deref().map(HashRange::parse).transpose()?;
                let summary =
                    codec::export::export_json(&handle, &mut out, range.as_ref(), command_line)?;
                println!(
                    "# exported {} hashes and {} sources",
                    summary.hashes, summary.sources
                );
            }
        }

        Commands::Add { a, b } => print_changes(&ops::add(&a, &b)?),
        Commands::AddMultiple { mut dbs } => {
            let out = dbs.pop().unwrap_or_default();
            let inputs: Vec<&Path> = dbs.iter().map(PathBuf::as_path).collect();
            print_changes(&ops::add_multiple(&inputs, &out)?);
        }
        Commands::AddRepository { a, out, repository } => {
            print_changes(&ops::add_repository(&a, &out, &repository)?)
        }
        Commands::AddRange { a, out, range } => {
            print_changes(&ops::add_range(&a, &out, OrdinalRange::parse(&range)?)?)
        }
        Commands::AddCountRange { a, out, range } => {
            print_changes(&ops::add_count_range(&a, &out, CountRange::parse(&range)?)?)
        }
        Commands::Intersect { a, b, out } => print_changes(&ops::intersect(&a, &b, &out)?),
        Commands::IntersectHash { a, b, out } => {
            print_changes(&ops::intersect_hash(&a, &b, &out)?)
        }
        Commands::Subtract { a, b, out } => print_changes(&ops::subtract(&a, &b, &out)?),
        Commands::SubtractHash { a, b, out } => {
            print_changes(&ops::subtract_hash(&a, &b, &out)?)
        }
        Commands::SubtractRepository { a, out, repository } => {
            print_changes(&ops::subtract_repository(&a, &out, &repository)?)
        }
        Commands::Deduplicate { a, out } => print_changes(&ops::deduplicate(&a, &out)?),
        Commands::Unique { a, out } => print_changes(&ops::unique(&a, &out)?),

        Commands::RebuildBloom {
            db,
            bloom,
            bloom_m,
            bloom_k,
        } => {
            let handle = HashDb::open(&db, OpenMode::ReadWrite)?;
            handle.rebuild_bloom(bloom, bloom_m, bloom_k)?;
            let mut log = OperationLog::open(&db, command_line)?;
            log.add_timestamp("rebuild_bloom")?;
            log.close()?;
            println!("Bloom filter rebuilt.");
        }

        Commands::ScanHash {
            db,
            hex_digest,
            mode,
        } => {
            let mode: ScanMode = mode.parse()?;
            let manager = ScanManager::new(Arc::new(HashDb::open(&db, OpenMode::ReadOnly)?));
            match manager.scan_hex(&hex_digest, mode)?.to_json()? {
                Some(json) => println!("{}", json),
                None => println!("Hash not found for '{}'", hex_digest),
            }
        }

        Commands::ScanList {
            db,
            list_file,
            mode,
        } => {
            let mode: ScanMode = mode.parse()?;
            let manager = ScanManager::new(Arc::new(HashDb::open(&db, OpenMode::ReadOnly)?));
            let reader = BufReader::new(File::open(&list_file)?);
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            writeln!(out, "# command: {}", command_line)?;
            writeln!(out, "# hashdb-Version: {}", hashdb::VERSION)?;
            let summary = scan_list(&manager, reader, &mut out, mode)?;
            writeln!(
                out,
                "# scanned {} hashes: {} matches, {} errors",
                summary.queries, summary.matches, summary.errors
            )?;
            out.flush()?;
        }

        Commands::Size { db } => {
            let handle = HashDb::open(&db, OpenMode::ReadOnly)?;
            println!("{}", serde_json::to_string(&handle.size())?);
        }

        Commands::Sources { db } => {
            let handle = HashDb::open(&db, OpenMode::ReadOnly)?;
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            ops::sources(&handle, &mut out)?;
            out.flush()?;
        }

        Commands::Histogram { db } => {
            let handle = HashDb::open(&db, OpenMode::ReadOnly)?;
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            ops::histogram(&handle).write_to(&mut out)?;
            out.flush()?;
        }

        Commands::Duplicates { db, count } => {
            let handle = HashDb::open(&db, OpenMode::ReadOnly)?;
            let entries = ops::duplicates(&handle, count);
            if entries.is_empty() {
                println!("No hashes with count {}.", count);
            }
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            ops::write_entries(&entries, &mut out)?;
            out.flush()?;
        }

        Commands::HashTable { db, file_hash } => {
            let handle = HashDb::open(&db, OpenMode::ReadOnly)?;
            let file_hash = parse_digest(&file_hash)?;
            for row in ops::hash_table(&handle, &file_hash) {
                println!("{}", serde_json::to_string(&row)?);
            }
        }

        Commands::ReadBytes {
            media,
            forensic_path,
            count,
        } => {
            let bytes = hashdb::media::read_bytes(&media, &forensic_path, count)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            out.write_all(&bytes)?;
            out.flush()?;
        }
    }
    Ok(())
}

/// Run one mutation against `dir` with logging, then commit
fn mutate(
    dir: &Path,
    command_line: &str,
    name: &str,
    f: impl FnOnce(&HashDb, &mut Changes) -> Result<()>,
) -> Result<()> {
    let db = HashDb::open(dir, OpenMode::ReadWrite)?;
    let mut log = OperationLog::open(dir, command_line)?;
    log.add_timestamp(&format!("begin {}", name))?;

    let mut changes = Changes::default();
    f(&db, &mut changes)?;
    db.commit()?;

    log.add_timestamp(&format!("end {}", name))?;
    log.add_changes(&changes)?;
    log.close()?;
    print_changes(&changes);
    Ok(())
}

fn print_changes(changes: &Changes) {
    print!("{}", changes);
}
