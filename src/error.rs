//! Error types for the snapshot pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering a job
///
/// Every variant is terminal: the controller never retries and never emits
/// partial output. The binary logs `category()` followed by the message.
#[derive(Error, Debug)]
pub enum Error {
    /// Standard input could not be read, parsed or validated
    #[error("Invalid job input: {0}")]
    InputError(String),

    /// The rendering surface could not be created
    #[error("Surface initialization failed: {0}")]
    InitializationError(String),

    /// The diagramming library failed inside the document
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// The renderer reported a failure through its `error` signal
    ///
    /// `category` is the label of the error raised on the renderer thread.
    #[error("Renderer failed on diagram {index}: {message}")]
    RendererError {
        index: usize,
        category: &'static str,
        message: String,
    },

    /// The surface crashed, stopped responding or failed a capture
    #[error("Surface fault: {0}")]
    SurfaceError(String),

    /// A wait point exceeded its configured deadline
    #[error("Timed out after {after_ms}ms waiting for {waiting_for}")]
    Timeout { waiting_for: &'static str, after_ms: u64 },

    /// A signal arrived out of order, twice, or the peer went away
    #[error("Protocol violation: {0}")]
    ProtocolError(String),

    /// Stream error outside input acquisition (e.g. writing stdout)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),
}

impl Error {
    /// Category label logged by the terminal failure handler
    pub fn category(&self) -> &'static str {
        match self {
            Error::InputError(_) => "Input",
            Error::RenderError(_) => "Renderer: error",
            Error::RendererError { category, .. } => *category,
            Error::InitializationError(_) | Error::SurfaceError(_) => "Surface",
            #[cfg(feature = "cdp")]
            Error::CdpError(_) => "Surface",
            Error::Timeout { .. } => "Timeout",
            Error::ProtocolError(_) => "Channel",
            Error::Io(_) => "Process",
        }
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}
