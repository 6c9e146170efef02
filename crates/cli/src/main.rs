//! # CLI - CinderKV Administrative Shell
//!
//! A REPL-style command-line interface over the CinderKV engine. Reads
//! commands from stdin, executes them against the engine, and prints results
//! to stdout. Usable interactively or scripted (pipe commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! SET key value      Insert or update a key-value pair
//! GET key            Look up a key (prints value or "(nil)")
//! DEL key            Delete a key (writes a tombstone)
//! KEYS               List all live keys in order
//! SCAN prefix        List key -> value for keys with the given prefix
//! STAT               Print engine statistics
//! MERGE              Compact the data files
//! SYNC               Flush the active file
//! EXIT / QUIT        Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! All settings are controlled via environment variables:
//!
//! ```text
//! CINDER_DIR           Data directory              (default: "data/cinderkv")
//! CINDER_FILE_SIZE_MB  Data file size in MiB       (default: 256)
//! CINDER_SYNC          fsync every append          (default: "false")
//! CINDER_INDEX         btree | radix | persistent  (default: "btree")
//! CINDER_MERGE_RATIO   Merge admission ratio       (default: 0.5)
//! ```
//!
//! Logging follows `RUST_LOG` (e.g. `RUST_LOG=engine=debug`).

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

use engine::{Engine, IndexType, IteratorOptions, Options};

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn options_from_env() -> Result<Options> {
    let dir = env_or("CINDER_DIR", "data/cinderkv");
    let file_size_mb: u64 = env_or("CINDER_FILE_SIZE_MB", "256")
        .parse()
        .context("CINDER_FILE_SIZE_MB must be a number")?;
    let sync_writes: bool = env_or("CINDER_SYNC", "false")
        .parse()
        .context("CINDER_SYNC must be true or false")?;
    let merge_ratio: f32 = env_or("CINDER_MERGE_RATIO", "0.5")
        .parse()
        .context("CINDER_MERGE_RATIO must be a number")?;
    let index_type = match env_or("CINDER_INDEX", "btree").as_str() {
        "btree" => IndexType::BTree,
        "radix" => IndexType::Radix,
        "persistent" => IndexType::Persistent,
        other => anyhow::bail!("unknown CINDER_INDEX '{other}'"),
    };

    Ok(Options {
        dir_path: dir.into(),
        data_file_size: file_size_mb * 1024 * 1024,
        sync_writes,
        bytes_per_sync: 0,
        index_type,
        mmap_at_startup: true,
        data_file_merge_ratio: merge_ratio,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let options = options_from_env()?;
    let dir = options.dir_path.clone();
    let engine = Engine::open(options).context("failed to open database")?;

    println!("cinderkv started (dir={})", dir.display());
    println!("Commands: SET key value | GET key | DEL key | KEYS | SCAN prefix");
    println!("          STAT | MERGE | SYNC | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "SET" => {
                    let key = parts.next();
                    let value: String = parts.collect::<Vec<&str>>().join(" ");
                    match key {
                        Some(k) if !value.is_empty() => {
                            match engine.put(k.as_bytes(), value.as_bytes()) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR set failed: {e}"),
                            }
                        }
                        _ => println!("ERR usage: SET key value"),
                    }
                }
                "GET" => match parts.next() {
                    Some(k) => match engine.get(k.as_bytes()) {
                        Ok(v) => println!("{}", String::from_utf8_lossy(&v)),
                        Err(engine::Error::KeyNotFound) => println!("(nil)"),
                        Err(e) => println!("ERR read failed: {e}"),
                    },
                    None => println!("ERR usage: GET key"),
                },
                "DEL" => match parts.next() {
                    Some(k) => match engine.delete(k.as_bytes()) {
                        Ok(()) => println!("OK"),
                        Err(e) => println!("ERR delete failed: {e}"),
                    },
                    None => println!("ERR usage: DEL key"),
                },
                "KEYS" => {
                    let keys = engine.list_keys();
                    for key in &keys {
                        println!("{}", String::from_utf8_lossy(key));
                    }
                    println!("({} keys)", keys.len());
                }
                "SCAN" => {
                    let prefix = parts.next().unwrap_or("").as_bytes().to_vec();
                    let mut iter = engine.iterator(IteratorOptions {
                        prefix,
                        reverse: false,
                    });
                    let mut count = 0usize;
                    iter.rewind();
                    while iter.valid() {
                        match iter.value() {
                            Ok(value) => println!(
                                "{} -> {}",
                                String::from_utf8_lossy(iter.key()),
                                String::from_utf8_lossy(&value)
                            ),
                            Err(e) => println!("ERR scan failed: {e}"),
                        }
                        count += 1;
                        iter.next();
                    }
                    println!("({count} entries)");
                }
                "STAT" => match engine.stat() {
                    Ok(stat) => println!(
                        "keys={} files={} reclaimable={} disk={}",
                        stat.key_num, stat.data_file_num, stat.reclaimable_size, stat.disk_size
                    ),
                    Err(e) => println!("ERR stat failed: {e}"),
                },
                "MERGE" => match engine.merge() {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR merge failed: {e}"),
                },
                "SYNC" => match engine.sync() {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR sync failed: {e}"),
                },
                "EXIT" | "QUIT" => break,
                other => println!("ERR unknown command '{other}'"),
            }
        }
        print!("> ");
        io::stdout().flush().ok();
    }

    engine.close().context("failed to close database")?;
    println!("bye");
    Ok(())
}
