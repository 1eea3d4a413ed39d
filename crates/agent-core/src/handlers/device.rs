//! `device/*` — read-only introspection, backed by a [`DeviceProvider`].

use std::sync::Arc;

use crate::error::AgentError;
use crate::http::request::ParsedRequest;
use crate::http::response::HttpResponse;
use crate::router::RoutedPath;
use crate::state::AppState;

pub async fn handle(
    request: &ParsedRequest,
    routed: &RoutedPath,
    state: &Arc<AppState>,
) -> Result<HttpResponse, AgentError> {
    let provider = &state.device_provider;

    match routed.action.as_str() {
        "info" => Ok(HttpResponse::ok(&provider.info())),
        "battery" => Ok(HttpResponse::ok(&provider.battery())),
        "network" => Ok(HttpResponse::ok(&provider.network())),
        "storage" => {
            let path = request
                .query_param("path")
                .unwrap_or_else(|| state.files_root.display().to_string());
            let storage = provider.storage(std::path::Path::new(&path))?;
            Ok(HttpResponse::ok(&storage))
        }
        "props" => Ok(HttpResponse::ok(&provider.props())),
        "permissions" => Ok(HttpResponse::ok(&provider.permissions())),
        "screen" => match provider.screen() {
            Some(png) => Ok(HttpResponse::binary(200, "image/png", png)),
            None => Err(AgentError::NotFound("no screen snapshot available on this platform".to_string())),
        },
        other => Err(AgentError::NotFound(format!("unknown device action {other}"))),
    }
}
