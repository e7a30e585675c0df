//! shardkv CLI Client
//!
//! Command-line interface for talking to any shardkv node.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use shardkv::cluster::Consistency;
use shardkv::network::Client;
use shardkv::ShardError;

/// shardkv CLI
#[derive(Parser, Debug)]
#[command(name = "shardkv-cli")]
#[command(about = "CLI for the shardkv key-value store")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:7400")]
    server: String,

    /// Consistency as r/w/n (cluster default if omitted)
    #[arg(short, long)]
    consistency: Option<Consistency>,

    /// Socket timeout in milliseconds
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// List the live records stored on the contacted node
    Scan {
        /// First key (inclusive)
        #[arg(long)]
        start: Option<String>,

        /// Last key (exclusive)
        #[arg(long)]
        end: Option<String>,

        /// Records per page
        #[arg(long, default_value = "100")]
        page: u32,
    },

    /// Ping the server
    Ping,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("(error) {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), ShardError> {
    let timeout = std::time::Duration::from_millis(args.timeout_ms);
    let mut client = Client::connect(&args.server, Some(timeout))?;
    let consistency = args.consistency;

    match args.command {
        Commands::Get { key } => match client.get(key.as_bytes(), consistency)? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Set { key, value } => {
            client.put(key.as_bytes(), value.as_bytes(), consistency)?;
            println!("OK");
        }
        Commands::Del { key } => {
            client.delete(key.as_bytes(), consistency)?;
            println!("OK");
        }
        Commands::Scan { start, end, page } => {
            let mut after: Option<Vec<u8>> = None;
            loop {
                let result = client.scan(
                    start.as_deref().map(str::as_bytes),
                    end.as_deref().map(str::as_bytes),
                    after.as_deref(),
                    Some(page),
                )?;
                for (key, value) in &result.entries {
                    println!(
                        "{} = {}",
                        String::from_utf8_lossy(key),
                        String::from_utf8_lossy(value)
                    );
                }
                match result.bookmark {
                    Some(bookmark) => after = Some(bookmark),
                    None => break,
                }
            }
        }
        Commands::Ping => {
            client.ping()?;
            println!("PONG");
        }
    }
    Ok(())
}
