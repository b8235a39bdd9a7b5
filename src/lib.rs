//! mermaid-snap
//!
//! Renders a batch of mermaid diagrams to PNG snapshots by driving a
//! browser surface. A job descriptor arrives as JSON, every diagram is drawn
//! and captured in order, and the captures come back as base64 strings.
//!
//! # Architecture
//!
//! - **Controller** ([`Session`]): reads the job, creates the surface,
//!   captures pixels on request and collects the results.
//! - **Renderer** ([`renderer::Renderer`]): runs on its own thread, injects
//!   each diagram into the document, waits for the library and asks for a
//!   capture.
//!
//! The two halves share nothing but the surface and talk through the typed
//! signals in [`protocol`].
//!
//! # Example
//!
//! ```no_run
//! use mermaid_snap::{cdp::CdpHost, RenderOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let input = br#"{"config":{"width":800,"max_width":-1,"zoom":1},
//!                  "mmd_config":{"theme":"default"},
//!                  "mmd":[{"code":"graph TD; A-->B;"}]}"#;
//! let host = CdpHost::new(Default::default());
//! let captures = mermaid_snap::render(&host, &input[..], &RenderOptions::default())?;
//! println!("{}", captures.to_json()?);
//! # Ok(())
//! # }
//! ```

use std::io::Read;

pub mod error;
pub use error::{Error, Result};

pub mod controller;
pub mod job;
pub mod protocol;
pub mod renderer;
pub mod surface;
pub mod wait;

// Chrome DevTools Protocol backend
#[cfg(feature = "cdp")]
pub mod cdp;

// Command-line front end (stdin job, stdout captures)
#[cfg(feature = "cdp")]
pub mod cli;

// Async-friendly facade (worker-thread backed)
pub mod async_api;

pub use async_api::render_async;
pub use controller::{CaptureBuffer, Session};
pub use job::{DiagramJob, JobConfig, JobDescriptor, Settings};
pub use surface::{Document, Host, Surface, SurfaceOptions};
pub use wait::WaitPolicy;

/// Options that are not part of the job itself
///
/// # Examples
///
/// ```
/// let opts = mermaid_snap::RenderOptions::default();
/// assert_eq!(opts.surface_height, 600);
/// assert!(opts.wait.timeout.is_none());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// Surface height in pixels; the job only decides the width
    pub surface_height: u32,
    /// Visible surface with devtools and no automatic exit
    pub diagnostic: bool,
    /// Poll interval and deadline for every wait point
    pub wait: WaitPolicy,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            surface_height: 600,
            diagnostic: false,
            wait: WaitPolicy::default(),
        }
    }
}

/// Read a job from `input` and render it on a surface created by `host`.
pub fn render<H: Host, R: Read>(host: &H, input: R, options: &RenderOptions) -> Result<CaptureBuffer> {
    Session::prepare(host, input, options)?.run()
}
