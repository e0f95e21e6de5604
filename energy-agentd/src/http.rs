//! HTTP scrape surface (§6): `/metrics` renders the current node snapshot
//! through `TextExporter`, `/healthz` is a liveness probe, `/` is a static
//! index pointing at the other two. Scrapes take the same mutex a tick
//! holds while writing, so a scrape never observes a half-written tick.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use energy_core::exporter::{NodeSnapshot, TextExporter};

use crate::AgentState;

const INDEX_BODY: &str = "energy-agentd\n\nGET /metrics  - Prometheus-style scrape\nGET /healthz  - liveness probe\n";

pub fn router(state: Arc<AgentState>, metrics_path: &str) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route(metrics_path, get(metrics))
        .with_state(state)
}

async fn index() -> &'static str {
    INDEX_BODY
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<Arc<AgentState>>) -> impl IntoResponse {
    let exporter = TextExporter::new();
    let mgr = state.manager.lock().expect("manager mutex poisoned");
    let snapshot = NodeSnapshot {
        hostname: &state.hostname,
        node: mgr.node(),
        processes: mgr.processes(),
        containers: mgr.containers(),
        vms: mgr.vms(),
    };
    let rendered = exporter.render(&snapshot);
    drop(mgr);

    if state.gzip_enabled(&rendered) {
        match gzip(&rendered) {
            Ok(body) => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/plain; version=0.0.4".to_string()),
                    (header::CONTENT_ENCODING, "gzip".to_string()),
                ],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::warn!(error = %e, "gzip compression failed, serving uncompressed");
                (StatusCode::OK, rendered).into_response()
            }
        }
    } else {
        (StatusCode::OK, rendered).into_response()
    }
}

fn gzip(body: &str) -> std::io::Result<Vec<u8>> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body.as_bytes())?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_roundtrips_through_flate2() {
        use std::io::Read;
        let compressed = gzip("hello world").unwrap();
        let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
        let mut out = String::new();
        decoder.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
    }
}
