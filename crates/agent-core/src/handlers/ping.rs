//! `GET /api/ping` — liveness probe and capability disclosure. Always
//! open, unlike every other endpoint.

use std::sync::Arc;

use serde::Serialize;

use crate::error::AgentError;
use crate::http::request::ParsedRequest;
use crate::http::response::HttpResponse;
use crate::state::AppState;

#[derive(Serialize)]
struct PingResponse {
    status: &'static str,
    version: &'static str,
    platform: &'static str,
    device_id: String,
    paired_device_count: usize,
}

pub async fn handle(_request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let response = PingResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        platform: std::env::consts::OS,
        device_id: state.pairing_store.device_id(),
        paired_device_count: state.pairing_store.list().len(),
    };
    Ok(HttpResponse::ok(&response))
}
