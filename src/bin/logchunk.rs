//! `logchunk` — CLI for building, inspecting, and dumping serialized log
//! chunks (§4.6, §6). One subcommand per operation, `clap::Parser`-driven,
//! grounded on the teacher's `sixcy` CLI shape (one `match` arm per
//! `Commands` variant, table-style `println!` output).

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use logchunk::{
    encode, load, Chunk, ChunkConfig, Direction, Encoding, Filter, EntryIterator,
};

#[derive(Parser)]
#[command(name = "logchunk", version = "0.1.0", about = "Inspect and build compressed log chunks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a chunk from a plain-text log file (one line per entry,
    /// timestamps assigned sequentially in nanoseconds from 0) and write
    /// its serialized form to `output`.
    Build {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Encoding: none, gzip, snappy, lz4, zstd (default)
        #[arg(short, long, default_value = "zstd")]
        encoding: String,
        /// Block size in bytes before a cut is triggered
        #[arg(long, default_value_t = logchunk::DEFAULT_BLOCK_SIZE_BYTES)]
        block_size: usize,
    },
    /// Print header, block, and size accounting for a serialized chunk
    Inspect {
        input: PathBuf,
        /// Emit machine-readable JSON instead of the table
        #[arg(long)]
        json: bool,
    },
    /// Iterate a serialized chunk's entries over a time range
    Dump {
        input: PathBuf,
        #[arg(long, default_value_t = i64::MIN)]
        from: i64,
        #[arg(long, default_value_t = i64::MAX)]
        to: i64,
        /// Emit entries newest-first instead of oldest-first
        #[arg(long)]
        reverse: bool,
        /// Only print lines containing this substring
        #[arg(long)]
        grep: Option<String>,
        /// Emit one JSON object per entry instead of tab-separated text
        #[arg(long)]
        json: bool,
    },
    /// Measure append/compress/iterate throughput for a plain-text log file
    /// across every supported encoding
    Bench {
        input: PathBuf,
        #[arg(long, default_value_t = logchunk::DEFAULT_BLOCK_SIZE_BYTES)]
        block_size: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    match Cli::parse().command {
        Commands::Build {
            input,
            output,
            encoding,
            block_size,
        } => build(&input, &output, &encoding, block_size)?,
        Commands::Inspect { input, json } => inspect(&input, json)?,
        Commands::Dump {
            input,
            from,
            to,
            reverse,
            grep,
            json,
        } => dump(&input, from, to, reverse, grep, json)?,
        Commands::Bench { input, block_size } => bench(&input, block_size)?,
    }

    Ok(())
}

fn parse_encoding(s: &str) -> Encoding {
    match s.to_ascii_lowercase().as_str() {
        "none" => Encoding::None,
        "gzip" => Encoding::Gzip,
        "snappy" => Encoding::Snappy,
        "lz4" => Encoding::Lz4,
        encoding_name if encoding_name == "zstd" => Encoding::Zstd,
        _ => {
            eprintln!("unknown encoding '{s}', defaulting to zstd");
            Encoding::Zstd
        }
    }
}

fn build(
    input: &PathBuf,
    output: &PathBuf,
    encoding: &str,
    block_size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::open(input)?;
    let mut chunk = Chunk::new(ChunkConfig {
        encoding: parse_encoding(encoding),
        block_size_bytes: block_size,
        target_size_bytes: 0,
    });

    let mut count = 0u64;
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        chunk.append(i as i64, line.into_bytes())?;
        count += 1;
    }

    let bytes = encode(&mut chunk)?;
    File::create(output)?.write_all(&bytes)?;
    println!(
        "Built {} entries across {} block(s) → {} ({} B on disk)",
        count,
        chunk.blocks_len(),
        output.display(),
        bytes.len()
    );
    Ok(())
}

#[derive(Serialize)]
struct InspectReport {
    path: String,
    file_size: usize,
    format: String,
    encoding: String,
    entries: u64,
    sealed_blocks: usize,
    bounds: (i64, i64),
    uncompressed_size: u64,
    compressed_size: u64,
    utilization: f64,
}

fn inspect(input: &PathBuf, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(input)?;
    let file_size = bytes.len();
    let chunk = load(&bytes)?;
    let bounds = chunk.bounds();

    let report = InspectReport {
        path: input.display().to_string(),
        file_size,
        format: format!("{:?}", chunk.format()),
        encoding: chunk.encoding().name().to_string(),
        entries: chunk.size(),
        sealed_blocks: chunk.blocks_len(),
        bounds,
        uncompressed_size: chunk.uncompressed_size(),
        compressed_size: chunk.compressed_size(),
        utilization: chunk.utilization(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("── logchunk ──────────────────────────────────────────");
    println!("  Path               {}", report.path);
    println!("  File size          {} B", report.file_size);
    println!("  Format             {}", report.format);
    println!("  Encoding           {}", report.encoding);
    println!("  Entries            {}", report.entries);
    println!("  Sealed blocks      {}", report.sealed_blocks);
    println!("  Bounds             [{}, {}]", bounds.0, bounds.1);
    println!("  Uncompressed size  {} B", report.uncompressed_size);
    println!("  Compressed size    {} B", report.compressed_size);
    println!("  Utilization        {:.4}", report.utilization);
    Ok(())
}

#[derive(Serialize)]
struct DumpedEntry {
    timestamp: i64,
    line: String,
}

fn dump(
    input: &PathBuf,
    from: i64,
    to: i64,
    reverse: bool,
    grep: Option<String>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(input)?;
    let chunk = load(&bytes)?;

    let filter: Option<Arc<Filter>> = grep.map(|needle| {
        let f: Arc<Filter> = Arc::new(move |line: &[u8]| {
            line.windows(needle.len().max(1))
                .any(|w| w == needle.as_bytes())
        });
        f
    });

    let direction = if reverse { Direction::Backward } else { Direction::Forward };

    let stats = logchunk::new_stats_sink();
    let mut it = chunk.iterator(from, to, direction, filter, stats.clone());
    let mut count = 0u64;
    while it.next() {
        let entry = it.current().expect("next returned true");
        if json {
            let dumped = DumpedEntry {
                timestamp: entry.timestamp,
                line: String::from_utf8_lossy(&entry.line).into_owned(),
            };
            println!("{}", serde_json::to_string(&dumped)?);
        } else {
            println!("{}\t{}", entry.timestamp, String::from_utf8_lossy(&entry.line));
        }
        count += 1;
    }
    if let Some(err) = it.error() {
        return Err(format!("iteration stopped early: {err}").into());
    }
    let stats = stats.lock().unwrap();
    eprintln!(
        "-- {count} entries, {} B decompressed, {} B compressed --",
        stats.bytes_decompressed, stats.bytes_compressed
    );
    Ok(())
}

fn bench(input: &PathBuf, block_size: usize) -> Result<(), Box<dyn std::error::Error>> {
    let lines: Vec<String> = BufReader::new(File::open(input)?)
        .lines()
        .collect::<Result<_, _>>()?;

    println!("── logchunk encoding benchmark ({} lines) ──────────────", lines.len());
    println!(
        "{:<8} {:>14} {:>14} {:>10} {:>12}",
        "encoding", "uncompressed", "compressed", "ratio", "append ms"
    );
    for encoding in [
        Encoding::None,
        Encoding::Gzip,
        Encoding::Snappy,
        Encoding::Lz4,
        Encoding::Zstd,
    ] {
        let mut chunk = Chunk::new(ChunkConfig {
            encoding,
            block_size_bytes: block_size,
            target_size_bytes: 0,
        });
        let t0 = std::time::Instant::now();
        for (i, line) in lines.iter().enumerate() {
            chunk.append(i as i64, line.clone().into_bytes())?;
        }
        let bytes = encode(&mut chunk)?;
        let elapsed_ms = t0.elapsed().as_millis();
        let uncompressed = chunk.uncompressed_size().max(1);
        println!(
            "{:<8} {:>14} {:>14} {:>9.1}% {:>12}",
            encoding.name(),
            uncompressed,
            bytes.len(),
            bytes.len() as f64 / uncompressed as f64 * 100.0,
            elapsed_ms
        );
    }
    Ok(())
}
