//! Deterministic in-memory surface for tests and benchmarks
//!
//! The document keeps containers in a list and records every DOM operation
//! as a [`DomEvent`]. Captures are content-addressed: a PNG signature
//! followed by the SHA-256 of the visible scene, so two captures are equal
//! exactly when the same diagrams were drawn with the same settings.

use super::{ContainerId, Document, Host, Surface, SurfaceOptions};
use crate::job::Settings;
use crate::{Error, Result};
use log::debug;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// Knobs for simulating library and host behavior
#[derive(Debug, Clone, Default)]
pub struct NoopOptions {
    /// Content width reported by surfaces; defaults to the requested width
    pub content_width: Option<u32>,
    /// `is_processed` answers `false` this many times before `true`
    pub polls_until_processed: u32,
    /// Zero-based diagram whose layout fails
    pub fail_layout_at: Option<usize>,
    /// Report the layout failure through `is_processed` instead of `run_layout`
    pub fail_async: bool,
    /// Containers are never marked processed
    pub never_process: bool,
    /// Every capture fails as if the surface crashed
    pub fail_capture: bool,
    /// Zero-based diagram whose injection fails as if the surface crashed
    pub crash_at: Option<usize>,
}

/// A DOM operation observed by the noop document
#[derive(Debug, Clone, PartialEq)]
pub enum DomEvent {
    Zoom(f64),
    Injected { id: ContainerId, code: String },
    Configured(Settings),
    LayoutStarted { id: ContainerId },
    Styled { id: ContainerId, max_width: u32 },
    Captured { visible: Vec<ContainerId> },
    Removed { id: ContainerId },
}

#[derive(Debug)]
struct Container {
    id: ContainerId,
    code: String,
    settings: Option<Settings>,
    max_width: Option<u32>,
    polls_left: u32,
    failure: Option<String>,
}

#[derive(Debug)]
struct DomState {
    width: u32,
    zoom: f64,
    next_id: u64,
    layouts: usize,
    settings: Settings,
    containers: Vec<Container>,
    events: Vec<DomEvent>,
    lingered: usize,
}

type SharedDom = Arc<Mutex<DomState>>;

fn lock(dom: &SharedDom) -> Result<MutexGuard<'_, DomState>> {
    dom.lock()
        .map_err(|_| Error::SurfaceError("noop document state poisoned".into()))
}

/// Host that hands out [`NoopSurface`]s
#[derive(Debug, Clone, Default)]
pub struct NoopHost {
    options: NoopOptions,
    created: Arc<AtomicUsize>,
}

impl NoopHost {
    pub fn new(options: NoopOptions) -> Self {
        Self {
            options,
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of surfaces created so far
    pub fn surfaces_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl Host for NoopHost {
    type Surface = NoopSurface;

    fn create_surface(&self, options: &SurfaceOptions) -> Result<NoopSurface> {
        self.created.fetch_add(1, Ordering::SeqCst);
        debug!("noop surface {}x{} (diagnostic: {})", options.width, options.height, options.diagnostic);
        let dom = DomState {
            width: options.width,
            zoom: 1.0,
            next_id: 0,
            layouts: 0,
            settings: Settings::new(),
            containers: Vec::new(),
            events: Vec::new(),
            lingered: 0,
        };
        Ok(NoopSurface {
            options: self.options.clone(),
            width: options.width,
            dom: Arc::new(Mutex::new(dom)),
        })
    }
}

pub struct NoopSurface {
    options: NoopOptions,
    width: u32,
    dom: SharedDom,
}

impl NoopSurface {
    /// Every DOM operation performed so far, in order
    pub fn events(&self) -> Vec<DomEvent> {
        lock(&self.dom).map(|d| d.events.clone()).unwrap_or_default()
    }

    /// Containers still attached to the document
    pub fn attached(&self) -> usize {
        lock(&self.dom).map(|d| d.containers.len()).unwrap_or_default()
    }

    /// How many times the surface was kept open after output
    pub fn lingered(&self) -> usize {
        lock(&self.dom).map(|d| d.lingered).unwrap_or_default()
    }

    /// The capture this surface produces when exactly one processed diagram
    /// is visible.
    pub fn expected_png(width: u32, zoom: f64, code: &str, settings: &Settings, max_width: Option<u32>) -> Vec<u8> {
        let mut scene = scene_header(width, zoom);
        scene.push_str(&scene_layer(code, settings, max_width));
        scene_png(&scene)
    }
}

fn scene_header(width: u32, zoom: f64) -> String {
    format!("width={};zoom={}\n", width, zoom)
}

fn scene_layer(code: &str, settings: &Settings, max_width: Option<u32>) -> String {
    let settings = serde_json::Value::Object(settings.clone()).to_string();
    match max_width {
        Some(px) => format!("{}|{}|{}\n", code, settings, px),
        None => format!("{}|{}|none\n", code, settings),
    }
}

fn scene_png(scene: &str) -> Vec<u8> {
    let digest = Sha256::digest(scene.as_bytes());
    let mut png = PNG_SIGNATURE.to_vec();
    png.extend_from_slice(&digest);
    png
}

impl Surface for NoopSurface {
    type Document = NoopDocument;

    fn content_width(&self) -> Result<u32> {
        Ok(self.options.content_width.unwrap_or(self.width))
    }

    fn document(&self) -> Result<NoopDocument> {
        Ok(NoopDocument {
            options: self.options.clone(),
            dom: self.dom.clone(),
        })
    }

    fn capture_png(&self) -> Result<Vec<u8>> {
        if self.options.fail_capture {
            return Err(Error::SurfaceError("render process gone".into()));
        }
        let mut dom = lock(&self.dom)?;
        let mut scene = scene_header(dom.width, dom.zoom);
        let mut visible = Vec::new();
        for c in &dom.containers {
            // Unprocessed containers still show their raw source text.
            let settings = c.settings.clone().unwrap_or_default();
            scene.push_str(&scene_layer(&c.code, &settings, c.max_width));
            visible.push(c.id);
        }
        dom.events.push(DomEvent::Captured { visible });
        let png = scene_png(&scene);
        debug!("noop capture {}", hex::encode(&png[PNG_SIGNATURE.len()..PNG_SIGNATURE.len() + 8]));
        Ok(png)
    }

    // Nobody can close an in-memory surface, so this returns right away.
    fn linger(&self) -> Result<()> {
        lock(&self.dom)?.lingered += 1;
        Ok(())
    }
}

/// Renderer-side handle onto a [`NoopSurface`]
pub struct NoopDocument {
    options: NoopOptions,
    dom: SharedDom,
}

impl NoopDocument {
    fn with_container<T>(&self, id: ContainerId, f: impl FnOnce(&mut Container) -> Result<T>) -> Result<T> {
        let mut dom = lock(&self.dom)?;
        let container = dom
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::SurfaceError(format!("no container #{}", id.dom_id())))?;
        f(container)
    }
}

impl Document for NoopDocument {
    fn set_zoom(&mut self, zoom: f64) -> Result<()> {
        let mut dom = lock(&self.dom)?;
        dom.zoom = zoom;
        dom.events.push(DomEvent::Zoom(zoom));
        Ok(())
    }

    fn inject(&mut self, code: &str) -> Result<ContainerId> {
        let mut dom = lock(&self.dom)?;
        if self.options.crash_at == Some(dom.next_id as usize) {
            return Err(Error::SurfaceError("render process gone".into()));
        }
        let id = ContainerId(dom.next_id);
        dom.next_id += 1;
        dom.containers.push(Container {
            id,
            code: code.to_string(),
            settings: None,
            max_width: None,
            polls_left: self.options.polls_until_processed,
            failure: None,
        });
        dom.events.push(DomEvent::Injected { id, code: code.to_string() });
        Ok(id)
    }

    fn configure(&mut self, settings: &Settings) -> Result<()> {
        let mut dom = lock(&self.dom)?;
        dom.settings = settings.clone();
        dom.events.push(DomEvent::Configured(settings.clone()));
        Ok(())
    }

    fn run_layout(&mut self, id: ContainerId) -> Result<()> {
        let mut dom = lock(&self.dom)?;
        let index = dom.layouts;
        dom.layouts += 1;
        dom.events.push(DomEvent::LayoutStarted { id });

        let fails = self.options.fail_layout_at == Some(index);
        if fails && !self.options.fail_async {
            return Err(Error::RenderError(format!("Parse error in diagram {}", index)));
        }
        let settings = dom.settings.clone();
        let container = dom
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::SurfaceError(format!("no container #{}", id.dom_id())))?;
        container.settings = Some(settings);
        if fails {
            container.failure = Some(format!("Parse error in diagram {}", index));
        }
        Ok(())
    }

    fn is_processed(&mut self, id: ContainerId) -> Result<bool> {
        let never = self.options.never_process;
        self.with_container(id, |c| {
            if let Some(message) = &c.failure {
                return Err(Error::RenderError(message.clone()));
            }
            if c.settings.is_none() || never {
                return Ok(false);
            }
            if c.polls_left > 0 {
                c.polls_left -= 1;
                return Ok(false);
            }
            Ok(true)
        })
    }

    fn apply_max_width(&mut self, id: ContainerId, max_width: u32) -> Result<()> {
        self.with_container(id, |c| {
            c.max_width = Some(max_width);
            Ok(())
        })?;
        lock(&self.dom)?.events.push(DomEvent::Styled { id, max_width });
        Ok(())
    }

    fn remove(&mut self, id: ContainerId) -> Result<()> {
        let mut dom = lock(&self.dom)?;
        let before = dom.containers.len();
        dom.containers.retain(|c| c.id != id);
        if dom.containers.len() == before {
            return Err(Error::SurfaceError(format!("no container #{}", id.dom_id())));
        }
        dom.events.push(DomEvent::Removed { id });
        Ok(())
    }
}
