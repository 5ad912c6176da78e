// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

use store_server::arena::MmapArena;
use store_server::error::fatal;
use store_server::{server, signals};

#[derive(Parser)]
struct Cli {
    /// Path of the Unix-domain socket clients connect to.
    #[arg(short = 's', long)]
    socket: PathBuf,

    /// Raise log verbosity to debug (repeat for trace).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Back every allocation with an `O_TMPFILE` under this directory
    /// instead of an anonymous `memfd`.
    #[arg(long)]
    arena_file: Option<PathBuf>,
}

fn main() {
    let args = Cli::parse();

    let level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();

    if let Err(e) = signals::install() {
        fatal(format!("failed to install SIGTERM handler: {e}"));
    }

    let arena = match args.arena_file {
        Some(dir) => MmapArena::with_backing_dir(dir),
        None => MmapArena::new(),
    };

    server::run(&args.socket, arena);
}
