//! Command-line front end: stdin job in, JSON captures out

use crate::cdp::{CdpHost, CdpOptions, MermaidSource};
use crate::{RenderOptions, Result, Session, WaitPolicy};
use clap::Parser;
use log::info;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable that turns on diagnostic mode
pub const DEV_ENV: &str = "APP_DEV";

#[derive(Parser, Debug)]
#[command(
    name = "mermaid-snap",
    version,
    about = "Render mermaid diagrams from a JSON job on stdin to base64 PNGs on stdout"
)]
pub struct Args {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Visible window with devtools; keeps running after output (also APP_DEV=true)
    #[arg(long)]
    pub dev: bool,

    /// Surface height in pixels
    #[arg(long, default_value_t = 600)]
    pub height: u32,

    /// Interval between layout completion checks
    #[arg(long, default_value_t = 100)]
    pub poll_interval_ms: u64,

    /// Give up on any single wait after this long; 0 waits forever
    #[arg(long, default_value_t = 0)]
    pub timeout_ms: u64,

    /// Mermaid bundle: an http(s)/file URL or a local path
    #[arg(long)]
    pub mermaid: Option<String>,

    /// Chrome/Chromium executable
    #[arg(long)]
    pub chrome: Option<PathBuf>,
}

/// `true` only for a value that trims to exactly `true`.
pub fn is_dev_value(value: &str) -> bool {
    value.trim() == "true"
}

impl Args {
    pub fn diagnostic(&self) -> bool {
        self.dev || std::env::var(DEV_ENV).map(|v| is_dev_value(&v)).unwrap_or(false)
    }

    pub fn render_options(&self) -> RenderOptions {
        let timeout = (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms));
        RenderOptions {
            surface_height: self.height,
            diagnostic: self.diagnostic(),
            wait: WaitPolicy {
                poll_interval: Duration::from_millis(self.poll_interval_ms),
                timeout,
            },
        }
    }

    pub fn cdp_options(&self) -> CdpOptions {
        CdpOptions {
            mermaid: self
                .mermaid
                .as_deref()
                .map(MermaidSource::parse)
                .unwrap_or_default(),
            chrome_path: self.chrome.clone(),
        }
    }
}

/// Read the job from stdin, render it, print the captures.
pub fn run(args: &Args) -> Result<()> {
    let options = args.render_options();
    info!(
        "diagnostic: {}, poll every {:?}, timeout {:?}",
        options.diagnostic, options.wait.poll_interval, options.wait.timeout
    );
    let host = CdpHost::new(args.cdp_options());

    let mut session = Session::prepare(&host, io::stdin().lock(), &options)?;
    let captures = session.run()?;

    let mut out = io::stdout().lock();
    writeln!(out, "{}", captures.to_json()?)?;
    out.flush()?;

    session.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_value_must_trim_to_true() {
        assert!(is_dev_value("true"));
        assert!(is_dev_value("  true\n"));
        assert!(!is_dev_value("TRUE"));
        assert!(!is_dev_value("1"));
        assert!(!is_dev_value(""));
    }

    #[test]
    fn zero_timeout_waits_forever() {
        let args = Args::parse_from(["mermaid-snap"]);
        let opts = args.render_options();
        assert_eq!(opts.wait.timeout, None);
        assert_eq!(opts.wait.poll_interval, Duration::from_millis(100));
        assert_eq!(opts.surface_height, 600);
    }

    #[test]
    fn flags_map_onto_options() {
        let args = Args::parse_from([
            "mermaid-snap",
            "--dev",
            "--timeout-ms",
            "2500",
            "--poll-interval-ms",
            "20",
            "--mermaid",
            "./mermaid.min.js",
        ]);
        let opts = args.render_options();
        assert!(opts.diagnostic);
        assert_eq!(opts.wait.timeout, Some(Duration::from_millis(2500)));
        assert_eq!(opts.wait.poll_interval, Duration::from_millis(20));
        assert_eq!(args.cdp_options().mermaid, MermaidSource::File(PathBuf::from("./mermaid.min.js")));
    }
}
