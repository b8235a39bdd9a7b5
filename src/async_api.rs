use crate::surface::Host;
use crate::{CaptureBuffer, Error, RenderOptions, Result};
use std::thread;
use tokio::sync::oneshot;

/// Render a job from an async context.
///
/// The whole job (surface creation, renderer thread, captures) runs on a
/// dedicated worker thread that owns the host, so callers can await the
/// result without the surface types having to be `Send`.
///
/// ```no_run
/// # async fn demo() -> mermaid_snap::Result<()> {
/// use mermaid_snap::surface::NoopHost;
/// let input = br#"{"mmd":[{"code":"graph TD; A-->B;"}]}"#.to_vec();
/// let captures = mermaid_snap::render_async(NoopHost::default(), input, Default::default()).await?;
/// assert_eq!(captures.len(), 1);
/// # Ok(())
/// # }
/// ```
pub async fn render_async<H>(host: H, input: Vec<u8>, options: RenderOptions) -> Result<CaptureBuffer>
where
    H: Host + Send + 'static,
{
    let (tx, rx): (oneshot::Sender<Result<CaptureBuffer>>, oneshot::Receiver<Result<CaptureBuffer>>) =
        oneshot::channel();

    thread::Builder::new()
        .name("render-job".into())
        .spawn(move || {
            let res = crate::render(&host, &input[..], &options);
            // Receiver may have been dropped if the caller gave up.
            let _ = tx.send(res);
        })?;

    rx.await
        .map_err(|e| Error::ProtocolError(format!("Render worker canceled: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{NoopHost, NoopOptions};
    use crate::wait::WaitPolicy;
    use std::time::Duration;

    fn options() -> RenderOptions {
        RenderOptions {
            wait: WaitPolicy { poll_interval: Duration::from_millis(1), timeout: Some(Duration::from_secs(5)) },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn renders_on_worker_thread() {
        let input = br#"{"mmd": [{"code": "a"}, {"code": "b"}]}"#.to_vec();
        let captures = render_async(NoopHost::default(), input, options()).await.unwrap();
        assert_eq!(captures.len(), 2);
    }

    #[tokio::test]
    async fn propagates_renderer_failure() {
        let host = NoopHost::new(NoopOptions { fail_layout_at: Some(0), ..Default::default() });
        let input = br#"{"mmd": [{"code": "a"}]}"#.to_vec();
        let err = render_async(host, input, options()).await.unwrap_err();
        assert!(matches!(err, Error::RendererError { index: 0, .. }));
    }
}
