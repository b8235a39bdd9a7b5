use std::{process, str::FromStr};

use clap::Parser;
use log::{debug, error, LevelFilter};

use mermaid_snap::cli::{self, Args};

fn main() {
    let args = Args::parse();

    let log_level = LevelFilter::from_str(&args.log_level).unwrap_or_else(|_| {
        eprintln!("Invalid log level: {}. Using 'warn' instead.", args.log_level);
        LevelFilter::Warn
    });

    // stdout carries the result; logs go to stderr. RUST_LOG wins over --log-level.
    env_logger::Builder::new()
        .filter_level(log_level)
        .parse_default_env()
        .init();

    // Any panic, on either thread, ends the job with no output.
    std::panic::set_hook(Box::new(|info| {
        error!("[Process: panic]");
        error!("{}", info);
        process::exit(1);
    }));

    debug!("{:?}", args);

    if let Err(err) = cli::run(&args) {
        error!("[{}]", err.category());
        error!("{}", err);
        process::exit(1);
    }
}
