//! Rendering surface abstraction
//!
//! The controller sees a [`Surface`]: something it can measure and capture.
//! The renderer sees a [`Document`]: the DOM of that same surface, where the
//! diagramming library runs. A [`Host`] creates surfaces once the job is
//! known. Backends implement all three; the pipeline never touches a
//! concrete browser type.

pub mod noop;

pub use noop::{DomEvent, NoopHost, NoopOptions, NoopSurface};

use crate::job::Settings;
use crate::Result;

/// Handle to one diagram container inside a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(pub u64);

impl ContainerId {
    /// DOM id attribute used for this container
    pub fn dom_id(&self) -> String {
        format!("mmd-{}", self.0)
    }
}

/// Parameters for creating a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceOptions {
    pub width: u32,
    pub height: u32,
    /// Visible window with a debugging panel instead of headless
    pub diagnostic: bool,
}

/// Creates rendering surfaces
pub trait Host {
    type Surface: Surface;

    fn create_surface(&self, options: &SurfaceOptions) -> Result<Self::Surface>;
}

/// Controller-side view of a surface
pub trait Surface {
    type Document: Document + 'static;

    /// Width of the content area in CSS pixels, as laid out right now
    fn content_width(&self) -> Result<u32>;

    /// Renderer-side handle onto the same page
    fn document(&self) -> Result<Self::Document>;

    /// Current pixels encoded as PNG
    fn capture_png(&self) -> Result<Vec<u8>>;

    /// Block until the surface is closed by the user (diagnostic mode).
    fn linger(&self) -> Result<()> {
        Ok(())
    }
}

/// Renderer-side DOM operations on the surface
pub trait Document: Send {
    fn set_zoom(&mut self, zoom: f64) -> Result<()>;

    /// Append a fresh container holding `code` as text.
    fn inject(&mut self, code: &str) -> Result<ContainerId>;

    /// Initialize the library with the given settings.
    fn configure(&mut self, settings: &Settings) -> Result<()>;

    /// Start the library on a container. Synchronous failures are returned
    /// here; asynchronous ones surface through `is_processed`.
    fn run_layout(&mut self, id: ContainerId) -> Result<()>;

    /// Whether the library has finished with the container.
    fn is_processed(&mut self, id: ContainerId) -> Result<bool>;

    fn apply_max_width(&mut self, id: ContainerId, max_width: u32) -> Result<()>;

    fn remove(&mut self, id: ContainerId) -> Result<()>;
}
