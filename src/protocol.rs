//! Typed signals exchanged between the controller and the renderer
//!
//! Each direction has its own message enum. Every signal kind declares
//! whether it may occur once per job or repeatedly, and the [`Endpoint`]
//! enforces that on both send and receive so a double-fired `done` or a
//! second `mermaid` surfaces as a protocol fault instead of silently
//! restarting work.

use crate::job::JobDescriptor;
use crate::wait::WaitPolicy;
use crate::{Error, Result};
use log::debug;
use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};

/// Name of every signal on the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Ready,
    Mermaid,
    Screenshot,
    Continue,
    Done,
    Error,
}

/// How often a signal may occur within one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    OneShot,
    Repeatable,
}

impl SignalKind {
    pub fn name(self) -> &'static str {
        match self {
            SignalKind::Ready => "ready",
            SignalKind::Mermaid => "mermaid",
            SignalKind::Screenshot => "screenshot",
            SignalKind::Continue => "continue",
            SignalKind::Done => "done",
            SignalKind::Error => "error",
        }
    }

    pub fn delivery(self) -> Delivery {
        match self {
            SignalKind::Screenshot | SignalKind::Continue => Delivery::Repeatable,
            _ => Delivery::OneShot,
        }
    }
}

/// Failure detail carried by the `error` signal
#[derive(Debug, Clone, PartialEq)]
pub struct RenderFailure {
    /// Zero-based position of the failing diagram in `mmd`
    pub index: usize,
    /// [`Error::category`] of the failure on the renderer side
    pub category: &'static str,
    pub message: String,
}

impl RenderFailure {
    pub fn new(index: usize, err: &Error) -> Self {
        Self {
            index,
            category: err.category(),
            message: err.to_string(),
        }
    }
}

/// Renderer → controller
#[derive(Debug, Clone, PartialEq)]
pub enum ToController {
    Ready,
    Screenshot { index: usize },
    Done,
    Error(RenderFailure),
}

/// Controller → renderer
#[derive(Debug, Clone, PartialEq)]
pub enum ToRenderer {
    Mermaid(Box<JobDescriptor>),
    Continue,
}

pub trait Signal {
    fn kind(&self) -> SignalKind;
}

impl Signal for ToController {
    fn kind(&self) -> SignalKind {
        match self {
            ToController::Ready => SignalKind::Ready,
            ToController::Screenshot { .. } => SignalKind::Screenshot,
            ToController::Done => SignalKind::Done,
            ToController::Error(_) => SignalKind::Error,
        }
    }
}

impl Signal for ToRenderer {
    fn kind(&self) -> SignalKind {
        match self {
            ToRenderer::Mermaid(_) => SignalKind::Mermaid,
            ToRenderer::Continue => SignalKind::Continue,
        }
    }
}

/// One side of the channel: sends `Out`, receives `In`.
pub struct Endpoint<Out, In> {
    side: &'static str,
    tx: Sender<Out>,
    rx: Receiver<In>,
    sent: HashSet<SignalKind>,
    received: HashSet<SignalKind>,
}

pub type ControllerEndpoint = Endpoint<ToRenderer, ToController>;
pub type RendererEndpoint = Endpoint<ToController, ToRenderer>;

/// Create a connected controller/renderer pair.
pub fn channel() -> (ControllerEndpoint, RendererEndpoint) {
    let (to_renderer_tx, to_renderer_rx) = mpsc::channel();
    let (to_controller_tx, to_controller_rx) = mpsc::channel();
    (
        Endpoint::new("controller", to_renderer_tx, to_controller_rx),
        Endpoint::new("renderer", to_controller_tx, to_renderer_rx),
    )
}

impl<Out: Signal, In: Signal> Endpoint<Out, In> {
    fn new(side: &'static str, tx: Sender<Out>, rx: Receiver<In>) -> Self {
        Self {
            side,
            tx,
            rx,
            sent: HashSet::new(),
            received: HashSet::new(),
        }
    }

    pub fn send(&mut self, msg: Out) -> Result<()> {
        let kind = msg.kind();
        if kind.delivery() == Delivery::OneShot && !self.sent.insert(kind) {
            return Err(Error::ProtocolError(format!(
                "{} tried to send one-shot `{}` twice",
                self.side,
                kind.name()
            )));
        }
        debug!("{} sends `{}`", self.side, kind.name());
        self.tx.send(msg).map_err(|_| {
            Error::ProtocolError(format!("peer of {} hung up before `{}`", self.side, kind.name()))
        })
    }

    /// Block until the next signal arrives, honoring the policy deadline.
    pub fn recv(&mut self, waiting_for: &'static str, policy: &WaitPolicy) -> Result<In> {
        let msg = match policy.timeout {
            None => self.rx.recv().map_err(|_| self.hung_up(waiting_for))?,
            Some(limit) => self.rx.recv_timeout(limit).map_err(|e| match e {
                RecvTimeoutError::Timeout => policy.timed_out(waiting_for),
                RecvTimeoutError::Disconnected => self.hung_up(waiting_for),
            })?,
        };
        let kind = msg.kind();
        if kind.delivery() == Delivery::OneShot && !self.received.insert(kind) {
            return Err(Error::ProtocolError(format!(
                "{} received one-shot `{}` twice",
                self.side,
                kind.name()
            )));
        }
        debug!("{} received `{}`", self.side, kind.name());
        Ok(msg)
    }

    fn hung_up(&self, waiting_for: &'static str) -> Error {
        Error::ProtocolError(format!("peer of {} hung up while waiting for {}", self.side, waiting_for))
    }
}
