//! AtlasLog Inspect Binary
//!
//! Opens a data directory and prints what the engine recovers from it.
//!
//! This is not a read-only tool: opening runs recovery and closing
//! checkpoints, so the directory is left as a clean shutdown would leave it.

use atlaslog::{Config, Engine};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// AtlasLog Inspector
#[derive(Parser, Debug)]
#[command(name = "atlaslog-inspect")]
#[command(about = "Inspect an AtlasLog data directory")]
#[command(long_about = "Inspect an AtlasLog data directory.\n\n\
The directory is opened like a normal engine start: recovery deletes torn or \
corrupt segments and repairs interrupted reclamations. On exit the engine is \
closed cleanly, which may seal the open segment, checkpoint and flush the \
index. Run it on a copy to leave the original untouched.")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./atlaslog_data")]
    data_dir: String,

    /// Segment capacity in bytes (only used when new segments are created)
    #[arg(short = 'c', long, default_value = "67108864")]
    segment_capacity: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the segments of the log
    Segments,

    /// Show the recovered checkpoint and engine counters
    Checkpoint,

    /// Print every live record
    Scan {
        /// Stop after this many records
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print the value stored for a key
    Get {
        /// Key to look up
        key: String,
    },
}

fn main() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,atlaslog=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("AtlasLog Inspect v{}", atlaslog::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .segment_capacity(args.segment_capacity)
        .build();

    let engine = match Engine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&engine, args.command) {
        tracing::error!("Command failed: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = engine.close() {
        tracing::error!("Failed to close engine: {}", e);
        std::process::exit(1);
    }
}

fn run(engine: &Engine, command: Command) -> atlaslog::Result<()> {
    match command {
        Command::Segments => {
            println!("{:>14} {:>14} {:>12}  sealed", "begin", "end", "length");
            for info in engine.segments().iter() {
                println!(
                    "{:>14} {:>14} {:>12}  {}",
                    info.begin.offset(),
                    info.end().offset(),
                    info.length,
                    info.sealed
                );
            }
        }
        Command::Checkpoint => {
            let stats = engine.stats();
            println!("checkpoint number: {}", stats.checkpoint_number);
            println!("checkpoint cursor: {}", stats.checkpoint_cursor.offset());
            println!("tail:              {}", stats.tail.offset());
            println!("live bytes:        {}", stats.live_bytes);
            println!("keys:              {}", stats.keys);
        }
        Command::Scan { limit } => {
            let limit = limit.unwrap_or(usize::MAX);
            for entry in engine.iterate().take(limit) {
                let entry = entry?;
                println!(
                    "{} = {}",
                    String::from_utf8_lossy(&entry.key),
                    String::from_utf8_lossy(&entry.value)
                );
            }
        }
        Command::Get { key } => match engine.load(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
    }
    Ok(())
}
