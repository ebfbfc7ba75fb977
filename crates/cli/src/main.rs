//! # CLI — operator shell for the storage engine
//!
//! A REPL over [`engine::Engine`]. Reads commands from stdin, executes them,
//! and prints results to stdout — useful both interactively and piped for
//! scripted testing. Not a product surface: no scans, no admin API, just
//! enough to poke at an engine by hand.
//!
//! ## Commands
//!
//! ```text
//! PUT key value      Insert or update a key-value pair
//! GET key            Look up a key (prints value or "(nil)")
//! DEL key            Delete a key (writes a tombstone)
//! HAS key            Print "true"/"false"
//! INCR key           Add 1 to a counter (starts at 0)
//! DECR key           Subtract 1 from a counter
//! INCRBY key n       Add n (integer or float) to a counter
//! DECRBY key n       Subtract n from a counter
//! STATS              Print engine debug info
//! EXIT / QUIT        Close the engine and shut down
//! ```
//!
//! ## Configuration
//!
//! ```text
//! ENGINE_DATA_DIR              Data directory            (default: "data")
//! ENGINE_MAX_MEMTABLE_MB       Flush threshold in MiB     (default: 64)
//! ENGINE_CACHE_CAPACITY        Cache entries total        (default: 10000)
//! ENGINE_CACHE_SHARDS          Cache shard count (pow2)   (default: 256)
//! ENGINE_COMPACTION_TRIGGER    Runs before compaction     (default: 4)
//! ```

use anyhow::{Context, Result};
use engine::{Engine, EngineOptions, Step};
use std::io::{self, BufRead, Write};
use tracing::error;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn options_from_env() -> EngineOptions {
    let defaults = EngineOptions::default();
    EngineOptions {
        max_memtable_bytes: env_parsed("ENGINE_MAX_MEMTABLE_MB", 64) * 1024 * 1024,
        cache_capacity: env_parsed("ENGINE_CACHE_CAPACITY", defaults.cache_capacity),
        cache_shards: env_parsed("ENGINE_CACHE_SHARDS", defaults.cache_shards),
        compaction_trigger_run_count: env_parsed(
            "ENGINE_COMPACTION_TRIGGER",
            defaults.compaction_trigger_run_count,
        ),
        ..defaults
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let data_dir = env_or("ENGINE_DATA_DIR", "data");
    let options = options_from_env();

    let engine = Engine::open(&data_dir, options).context("failed to open engine")?;

    println!("engine started (dir={data_dir})");
    println!("Commands: PUT key value | GET key | DEL key | HAS key");
    println!("          INCR key | DECR key | INCRBY key n | DECRBY key n | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "PUT" => match parts.next() {
                    Some(k) => {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        if v.is_empty() {
                            println!("ERR usage: PUT key value");
                        } else {
                            match engine.put(k.as_bytes().to_vec(), v.as_bytes().to_vec()) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR put failed: {e}"),
                            }
                        }
                    }
                    None => println!("ERR usage: PUT key value"),
                },
                "GET" => match parts.next() {
                    Some(k) => match engine.get(k.as_bytes()) {
                        Ok(Some(v)) => println!("{}", String::from_utf8_lossy(&v)),
                        Ok(None) => println!("(nil)"),
                        Err(e) => println!("ERR get failed: {e}"),
                    },
                    None => println!("ERR usage: GET key"),
                },
                "DEL" => match parts.next() {
                    Some(k) => match engine.delete(k.as_bytes().to_vec()) {
                        Ok(()) => println!("OK"),
                        Err(e) => println!("ERR del failed: {e}"),
                    },
                    None => println!("ERR usage: DEL key"),
                },
                "HAS" => match parts.next() {
                    Some(k) => match engine.has(k.as_bytes()) {
                        Ok(b) => println!("{b}"),
                        Err(e) => println!("ERR has failed: {e}"),
                    },
                    None => println!("ERR usage: HAS key"),
                },
                "INCR" => match parts.next() {
                    Some(k) => print_step(engine.incr(k.as_bytes().to_vec())),
                    None => println!("ERR usage: INCR key"),
                },
                "DECR" => match parts.next() {
                    Some(k) => print_step(engine.decr(k.as_bytes().to_vec())),
                    None => println!("ERR usage: DECR key"),
                },
                "INCRBY" => match (parts.next(), parts.next()) {
                    (Some(k), Some(n)) => match parse_step_arg(n) {
                        Some(step) => print_step(engine.incr_by(k.as_bytes().to_vec(), step)),
                        None => println!("ERR usage: INCRBY key n"),
                    },
                    _ => println!("ERR usage: INCRBY key n"),
                },
                "DECRBY" => match (parts.next(), parts.next()) {
                    (Some(k), Some(n)) => match parse_step_arg(n) {
                        Some(step) => print_step(engine.decr_by(k.as_bytes().to_vec(), step)),
                        None => println!("ERR usage: DECRBY key n"),
                    },
                    _ => println!("ERR usage: DECRBY key n"),
                },
                "STATS" => println!("{engine:?}"),
                "EXIT" | "QUIT" => {
                    if let Err(e) = engine.close() {
                        error!(error = %e, "error while closing engine");
                    }
                    println!("bye");
                    break;
                }
                other => println!("unknown command: {other}"),
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}

fn parse_step_arg(s: &str) -> Option<Step> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Step::Int(i));
    }
    s.parse::<f64>().ok().map(Step::Real)
}

fn print_step(result: Result<Step, engine::EngineError>) {
    match result {
        Ok(Step::Int(i)) => println!("{i}"),
        Ok(Step::Real(r)) => println!("{r}"),
        Err(e) => println!("ERR counter op failed: {e}"),
    }
}
