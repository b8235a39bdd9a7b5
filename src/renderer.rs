//! Renderer: the content side of the pipeline
//!
//! Owns the document handle and walks the diagram list one at a time:
//!
//! ```text
//! INJECT → CONFIGURE → RUN_LAYOUT → AWAIT_PROCESSED → APPLY_STYLE
//!        → REQUEST_CAPTURE → AWAIT_CAPTURE_ACK → CLEANUP → next | done
//! ```
//!
//! It talks to the controller only through its [`RendererEndpoint`]. Any
//! failure is reported as an `error` signal and ends the job.

use crate::job::{DiagramJob, JobDescriptor};
use crate::protocol::{RenderFailure, RendererEndpoint, ToController, ToRenderer};
use crate::surface::Document;
use crate::wait::WaitPolicy;
use crate::{Error, Result};
use log::{debug, info, warn};

pub struct Renderer<D: Document> {
    document: D,
    endpoint: RendererEndpoint,
    wait: WaitPolicy,
}

impl<D: Document> Renderer<D> {
    pub fn new(document: D, endpoint: RendererEndpoint, wait: WaitPolicy) -> Self {
        Self { document, endpoint, wait }
    }

    /// Announce readiness, receive the job and render it.
    ///
    /// Returns once `done` or `error` has been sent. If the controller is
    /// already gone the failure is only logged.
    pub fn run(mut self) {
        let job = match self.handshake() {
            Ok(job) => job,
            Err(err) => {
                self.report(RenderFailure::new(0, &err));
                return;
            }
        };

        if let Err(err) = self.document.set_zoom(job.config.zoom) {
            self.report(RenderFailure::new(0, &err));
            return;
        }

        info!("rendering {} diagram(s)", job.mmd.len());
        for (index, diagram) in job.mmd.iter().enumerate() {
            if let Err(err) = self.render_one(&job, index, diagram) {
                self.report(RenderFailure::new(index, &err));
                return;
            }
        }

        if let Err(err) = self.endpoint.send(ToController::Done) {
            warn!("could not signal completion: {}", err);
        }
    }

    fn handshake(&mut self) -> Result<JobDescriptor> {
        self.endpoint.send(ToController::Ready)?;
        match self.endpoint.recv("mermaid", &self.wait)? {
            ToRenderer::Mermaid(job) => Ok(*job),
            ToRenderer::Continue => Err(Error::ProtocolError("`continue` received before `mermaid`".into())),
        }
    }

    fn render_one(&mut self, job: &JobDescriptor, index: usize, diagram: &DiagramJob) -> Result<()> {
        let id = self.document.inject(&diagram.code)?;
        debug!("diagram {}: injected #{}", index, id.dom_id());

        self.document.configure(&job.effective_settings(diagram))?;
        self.document.run_layout(id)?;

        let document = &mut self.document;
        self.wait.poll_until("processed", || document.is_processed(id))?;
        debug!("diagram {}: processed", index);

        let max_width = job
            .max_width()
            .ok_or_else(|| Error::ProtocolError("max_width was not resolved before relay".into()))?;
        self.document.apply_max_width(id, max_width)?;

        self.endpoint.send(ToController::Screenshot { index })?;
        match self.endpoint.recv("continue", &self.wait)? {
            ToRenderer::Continue => {}
            ToRenderer::Mermaid(_) => {
                return Err(Error::ProtocolError("`mermaid` received while awaiting `continue`".into()))
            }
        }

        self.document.remove(id)?;
        debug!("diagram {}: cleaned up", index);
        Ok(())
    }

    fn report(&mut self, failure: RenderFailure) {
        warn!("diagram {} failed [{}]: {}", failure.index, failure.category, failure.message);
        if let Err(err) = self.endpoint.send(ToController::Error(failure)) {
            warn!("could not report failure: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{channel, ControllerEndpoint};
    use crate::surface::{DomEvent, Host, NoopHost, NoopOptions, Surface, SurfaceOptions};
    use serde_json::json;
    use std::time::Duration;

    fn fast() -> WaitPolicy {
        WaitPolicy {
            poll_interval: Duration::from_millis(1),
            timeout: Some(Duration::from_secs(5)),
        }
    }

    fn job(value: serde_json::Value) -> JobDescriptor {
        let mut job = JobDescriptor::from_slice(value.to_string().as_bytes()).unwrap();
        job.resolve_max_width(700);
        job
    }

    fn spawn(options: NoopOptions) -> (ControllerEndpoint, crate::surface::NoopSurface, std::thread::JoinHandle<()>) {
        let surface = NoopHost::new(options)
            .create_surface(&SurfaceOptions { width: 700, height: 600, diagnostic: false })
            .unwrap();
        let (controller, renderer) = channel();
        let doc = surface.document().unwrap();
        let handle = std::thread::spawn(move || Renderer::new(doc, renderer, fast()).run());
        (controller, surface, handle)
    }

    #[test]
    fn walks_each_state_in_order() {
        let (mut ctl, surface, handle) = spawn(NoopOptions { polls_until_processed: 2, ..Default::default() });
        let policy = fast();
        assert_eq!(ctl.recv("ready", &policy).unwrap(), ToController::Ready);
        ctl.send(ToRenderer::Mermaid(Box::new(job(json!({"mmd": [{"code": "graph TD; A-->B;"}]})))))
            .unwrap();
        assert_eq!(ctl.recv("screenshot", &policy).unwrap(), ToController::Screenshot { index: 0 });
        // Cleanup waits for the acknowledgement.
        assert_eq!(surface.attached(), 1);
        ctl.send(ToRenderer::Continue).unwrap();
        assert_eq!(ctl.recv("done", &policy).unwrap(), ToController::Done);
        handle.join().unwrap();

        let id = crate::surface::ContainerId(0);
        assert_eq!(
            surface.events(),
            vec![
                DomEvent::Zoom(1.0),
                DomEvent::Injected { id, code: "graph TD; A-->B;".into() },
                DomEvent::Configured(Default::default()),
                DomEvent::LayoutStarted { id },
                DomEvent::Styled { id, max_width: 700 },
                DomEvent::Removed { id },
            ]
        );
    }

    #[test]
    fn layout_failure_is_reported_and_stops_the_job() {
        let (mut ctl, surface, handle) = spawn(NoopOptions { fail_layout_at: Some(1), ..Default::default() });
        let policy = fast();
        ctl.recv("ready", &policy).unwrap();
        ctl.send(ToRenderer::Mermaid(Box::new(job(json!({
            "mmd": [{"code": "a"}, {"code": "b"}, {"code": "c"}]
        })))))
        .unwrap();
        assert_eq!(ctl.recv("screenshot", &policy).unwrap(), ToController::Screenshot { index: 0 });
        ctl.send(ToRenderer::Continue).unwrap();
        match ctl.recv("done", &policy).unwrap() {
            ToController::Error(failure) => {
                assert_eq!(failure.index, 1);
                assert_eq!(failure.category, "Renderer: error");
            }
            other => panic!("expected error, got {other:?}"),
        }
        handle.join().unwrap();
        let injected = surface
            .events()
            .iter()
            .filter(|e| matches!(e, DomEvent::Injected { .. }))
            .count();
        assert_eq!(injected, 2);
    }

    #[test]
    fn stalled_layout_times_out() {
        let (mut ctl, _surface, handle) = spawn(NoopOptions { never_process: true, ..Default::default() });
        let policy = fast();
        ctl.recv("ready", &policy).unwrap();
        ctl.send(ToRenderer::Mermaid(Box::new(job(json!({"mmd": [{"code": "a"}]})))))
            .unwrap();
        let short = WaitPolicy { timeout: Some(Duration::from_secs(30)), ..policy };
        match ctl.recv("error", &short).unwrap() {
            ToController::Error(failure) => {
                assert_eq!(failure.category, "Timeout");
                assert!(failure.message.contains("processed"), "{}", failure.message);
            }
            other => panic!("expected error, got {other:?}"),
        }
        handle.join().unwrap();
    }

    #[test]
    fn stops_quietly_when_controller_hangs_up() {
        let (mut ctl, _surface, handle) = spawn(NoopOptions::default());
        ctl.recv("ready", &fast()).unwrap();
        ctl.send(ToRenderer::Mermaid(Box::new(job(json!({"mmd": [{"code": "a"}]})))))
            .unwrap();
        drop(ctl);
        handle.join().unwrap();
    }
}
