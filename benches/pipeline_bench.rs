use criterion::{criterion_group, criterion_main, Criterion};
use mermaid_snap::surface::{NoopHost, NoopOptions};
use mermaid_snap::{RenderOptions, WaitPolicy};
use std::time::Duration;

fn fast_options() -> RenderOptions {
    RenderOptions {
        wait: WaitPolicy {
            poll_interval: Duration::ZERO,
            timeout: None,
        },
        ..Default::default()
    }
}

fn job(count: usize) -> Vec<u8> {
    let mmd: Vec<_> = (0..count)
        .map(|i| serde_json::json!({ "code": format!("graph TD; A{i}-->B{i};") }))
        .collect();
    serde_json::json!({
        "config": { "width": 800, "max_width": -1, "zoom": 1 },
        "mmd_config": { "theme": "default" },
        "mmd": mmd,
    })
    .to_string()
    .into_bytes()
}

// Handshake and signal overhead of the two-thread pipeline, no browser involved.
fn bench_noop_pipeline(c: &mut Criterion) {
    let options = fast_options();
    for count in [1usize, 16] {
        let input = job(count);
        let host = NoopHost::new(NoopOptions {
            polls_until_processed: 2,
            ..Default::default()
        });
        c.bench_function(&format!("noop_pipeline_{}_diagrams", count), |b| {
            b.iter(|| {
                let captures = mermaid_snap::render(&host, &input[..], &options).expect("render failed");
                assert_eq!(captures.len(), count);
            })
        });
    }
}

fn bench_job_parse(c: &mut Criterion) {
    let input = job(64);
    c.bench_function("parse_job_64_diagrams", |b| {
        b.iter(|| mermaid_snap::JobDescriptor::from_slice(&input).expect("parse failed"))
    });
}

criterion_group!(benches, bench_noop_pipeline, bench_job_parse);
criterion_main!(benches);
