//! Controller: the host side of the pipeline
//!
//! A [`Session`] is the job context. It is built only after standard input
//! has been read in full, owns the surface, and runs one job: it spawns the
//! renderer on its own thread, answers its signals and collects captures
//! into a [`CaptureBuffer`].

use crate::job::JobDescriptor;
use crate::protocol::{channel, ControllerEndpoint, ToController, ToRenderer};
use crate::renderer::Renderer;
use crate::surface::{Host, Surface, SurfaceOptions};
use crate::wait::WaitPolicy;
use crate::{Error, RenderOptions, Result};
use base64::Engine as Base64Engine;
use log::{debug, info};
use std::io::Read;

/// Ordered, append-only list of base64 PNG captures
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureBuffer {
    images: Vec<String>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_png(&mut self, png: &[u8]) {
        self.images
            .push(base64::engine::general_purpose::STANDARD.encode(png));
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }

    pub fn into_images(self) -> Vec<String> {
        self.images
    }

    /// JSON array of the captures, in diagram order
    pub fn to_json(&self) -> Result<String> {
        let json = serde_json::to_string(&self.images).map_err(std::io::Error::from)?;
        Ok(json)
    }
}

/// Drives one job against a surface through the controller endpoint
pub struct Controller<'a, S: Surface> {
    surface: &'a S,
    endpoint: ControllerEndpoint,
    wait: WaitPolicy,
}

impl<'a, S: Surface> Controller<'a, S> {
    pub fn new(surface: &'a S, endpoint: ControllerEndpoint, wait: WaitPolicy) -> Self {
        Self { surface, endpoint, wait }
    }

    /// Answer renderer signals until `done` or the first failure.
    pub fn drive(mut self, job: JobDescriptor) -> Result<CaptureBuffer> {
        let mut pending = Some(job);
        let mut captures = CaptureBuffer::new();
        loop {
            match self.endpoint.recv("renderer signal", &self.wait)? {
                ToController::Ready => {
                    let job = pending
                        .take()
                        .ok_or_else(|| Error::ProtocolError("job already relayed".into()))?;
                    self.endpoint.send(ToRenderer::Mermaid(Box::new(job)))?;
                }
                ToController::Screenshot { index } => {
                    if index != captures.len() {
                        return Err(Error::ProtocolError(format!(
                            "screenshot for diagram {} requested after {} capture(s)",
                            index,
                            captures.len()
                        )));
                    }
                    let png = self.surface.capture_png()?;
                    captures.push_png(&png);
                    debug!("captured diagram {} ({} bytes)", index, png.len());
                    self.endpoint.send(ToRenderer::Continue)?;
                }
                ToController::Done => return Ok(captures),
                ToController::Error(failure) => {
                    return Err(Error::RendererError {
                        index: failure.index,
                        category: failure.category,
                        message: failure.message,
                    })
                }
            }
        }
    }
}

/// One rendering run: parsed job plus the surface created for it
pub struct Session<S: Surface> {
    surface: S,
    job: Option<JobDescriptor>,
    wait: WaitPolicy,
    diagnostic: bool,
}

impl<S: Surface> Session<S> {
    /// Read the whole job from `input`, then create and measure the surface.
    ///
    /// No surface exists if the input is unreadable or malformed.
    pub fn prepare<H, R>(host: &H, input: R, options: &RenderOptions) -> Result<Self>
    where
        H: Host<Surface = S>,
        R: Read,
    {
        let mut job = JobDescriptor::from_reader(input)?;
        info!("job read: {} diagram(s)", job.mmd.len());

        let surface = host.create_surface(&SurfaceOptions {
            width: job.surface_width(),
            height: options.surface_height,
            diagnostic: options.diagnostic,
        })?;

        let measured = surface.content_width()?;
        job.resolve_max_width(measured);
        debug!("surface content width {}px, max_width {:?}", measured, job.max_width());

        Ok(Self {
            surface,
            job: Some(job),
            wait: options.wait,
            diagnostic: options.diagnostic,
        })
    }

    /// The job as it will be relayed (max_width already resolved)
    pub fn job(&self) -> Option<&JobDescriptor> {
        self.job.as_ref()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Render every diagram and return the captures in input order.
    pub fn run(&mut self) -> Result<CaptureBuffer> {
        let job = self
            .job
            .take()
            .ok_or_else(|| Error::ProtocolError("session already ran".into()))?;

        let (controller_end, renderer_end) = channel();
        let document = self.surface.document()?;
        let wait = self.wait;
        let handle = std::thread::Builder::new()
            .name("renderer".into())
            .spawn(move || Renderer::new(document, renderer_end, wait).run())?;

        let result = Controller::new(&self.surface, controller_end, self.wait).drive(job);
        match result {
            Ok(captures) => {
                handle
                    .join()
                    .map_err(|_| Error::ProtocolError("renderer thread panicked".into()))?;
                info!("rendered {} diagram(s)", captures.len());
                Ok(captures)
            }
            Err(err) => {
                // The renderer may be parked on a wait; it is not joined.
                debug!("abandoning renderer thread after failure");
                Err(err)
            }
        }
    }

    /// End the session after output has been written.
    ///
    /// In diagnostic mode the surface stays open until the user closes it;
    /// otherwise this returns immediately.
    pub fn finish(&self) -> Result<()> {
        if self.diagnostic {
            self.surface.linger()?;
        }
        Ok(())
    }
}
