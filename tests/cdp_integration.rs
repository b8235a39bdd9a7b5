//! Integration tests against a real Chromium (run with `--ignored`)
//!
//! A tiny HTTP server stands in for the mermaid CDN with a stub library
//! that draws a fixed SVG, so these tests only need Chrome, not network.

#![cfg(feature = "cdp")]

use base64::Engine as _;
use mermaid_snap::cdp::{CdpHost, CdpOptions, MermaidSource};
use mermaid_snap::{Error, RenderOptions, WaitPolicy};
use std::time::Duration;
use tiny_http::{Response, Server};

const STUB_MERMAID: &str = r#"
window.mermaid = {
    config: {},
    initialize: function (c) { this.config = c; },
    run: function (opts) {
        var self = this;
        return new Promise(function (resolve, reject) {
            setTimeout(function () {
                var failed = null;
                opts.nodes.forEach(function (el) {
                    el.setAttribute('data-processed', 'true');
                    if (el.textContent.indexOf('FAIL') >= 0) { failed = new Error('Parse error on line 1'); return; }
                    var fill = self.config.theme === 'dark' ? 'black' : 'steelblue';
                    el.innerHTML = '<svg xmlns="http://www.w3.org/2000/svg" width="120" height="40">'
                        + '<rect width="120" height="40" fill="' + fill + '"/></svg>';
                });
                if (failed) { reject(failed); } else { resolve(); }
            }, 30);
        });
    }
};
"#;

/// Start a stub library server and return its script URL
fn start_stub_server() -> String {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr();
    std::thread::spawn(move || {
        for request in server.incoming_requests() {
            let response = Response::from_string(STUB_MERMAID).with_header(
                "Content-Type: application/javascript"
                    .parse::<tiny_http::Header>()
                    .unwrap(),
            );
            let _ = request.respond(response);
        }
    });
    format!("http://{}/mermaid.js", addr)
}

fn host() -> CdpHost {
    CdpHost::new(CdpOptions {
        mermaid: MermaidSource::Url(start_stub_server()),
        chrome_path: None,
    })
}

fn options() -> RenderOptions {
    RenderOptions {
        wait: WaitPolicy {
            poll_interval: Duration::from_millis(20),
            timeout: Some(Duration::from_secs(20)),
        },
        ..Default::default()
    }
}

#[test]
#[ignore] // Requires Chrome to be installed
fn renders_each_diagram_to_png() {
    let input = r#"{"config":{"width":400,"max_width":-1,"zoom":1},
                    "mmd_config":{"theme":"default"},
                    "mmd":[{"code":"graph TD; A-->B;"},{"code":"graph TD; C-->D;","config":{"theme":"dark"}}]}"#;
    let captures = mermaid_snap::render(&host(), input.as_bytes(), &options()).expect("render");
    assert_eq!(captures.len(), 2);

    for image in captures.images() {
        let png = base64::engine::general_purpose::STANDARD.decode(image).unwrap();
        assert!(png.len() > 100, "PNG data seems too small");
        assert_eq!(&png[0..8], b"\x89PNG\r\n\x1a\n");
    }
    assert_ne!(captures.images()[0], captures.images()[1]);
}

#[test]
#[ignore] // Requires Chrome to be installed
fn library_rejection_aborts_job() {
    let input = r#"{"mmd":[{"code":"graph TD; A-->B;"},{"code":"FAIL"}]}"#;
    let err = mermaid_snap::render(&host(), input.as_bytes(), &options()).unwrap_err();
    match err {
        Error::RendererError { index, category, message } => {
            assert_eq!(category, "Renderer: error");
            assert_eq!(index, 1);
            assert!(message.contains("Parse error"), "{message}");
        }
        other => panic!("expected renderer error, got {other}"),
    }
}

#[test]
#[ignore] // Requires Chrome to be installed
fn sentinel_max_width_matches_surface_width() {
    use mermaid_snap::{Session, Surface};
    let input = r#"{"config":{"width":800,"max_width":-1},"mmd":[]}"#;
    let session = Session::prepare(&host(), input.as_bytes(), &options()).expect("prepare");
    let measured = session.surface().content_width().unwrap();
    assert_eq!(session.job().unwrap().max_width(), Some(measured));
}
