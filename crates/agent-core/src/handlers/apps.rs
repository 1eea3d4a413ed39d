//! `apps/*` — installed-package introspection, backed by an [`AppsProvider`].

use std::sync::Arc;

use crate::error::AgentError;
use crate::http::request::{ParsedRequest, RequestBody};
use crate::http::response::HttpResponse;
use crate::router::RoutedPath;
use crate::state::AppState;

pub async fn handle(
    request: &ParsedRequest,
    routed: &RoutedPath,
    state: &Arc<AppState>,
) -> Result<HttpResponse, AgentError> {
    let provider = &state.apps_provider;

    match routed.action.as_str() {
        "list" => Ok(HttpResponse::ok(&provider.list())),
        "info" => {
            let package = package_param(request, routed)?;
            match provider.info(&package) {
                Some(detail) => Ok(HttpResponse::ok(&detail)),
                None => Err(AgentError::NotFound(format!("unknown package {package}"))),
            }
        }
        "apk" => {
            let package = package_param(request, routed)?;
            let detail = provider
                .info(&package)
                .ok_or_else(|| AgentError::NotFound(format!("unknown package {package}")))?;
            let data = tokio::fs::read(&detail.apk_path).await.map_err(AgentError::Io)?;
            Ok(HttpResponse::binary(200, "application/vnd.android.package-archive", data)
                .with_header("Content-Disposition", format!("attachment; filename=\"{package}.apk\"")))
        }
        "data-paths" => Ok(HttpResponse::ok(&provider.data_paths())),
        "install" => {
            let apk_path = match &request.body {
                RequestBody::TempFile(path) => path.clone(),
                RequestBody::Memory(bytes) => {
                    let path = state.spool_dir().join(format!("install-{}.apk", uuid::Uuid::new_v4()));
                    tokio::fs::create_dir_all(state.spool_dir()).await.map_err(AgentError::Io)?;
                    tokio::fs::write(&path, bytes).await.map_err(AgentError::Io)?;
                    path
                }
            };
            provider.install(&apk_path)?;
            Ok(HttpResponse::ok(&serde_json::json!({"status": "ok"})))
        }
        "uninstall" => {
            let package = package_param(request, routed)?;
            provider.uninstall(&package)?;
            Ok(HttpResponse::ok(&serde_json::json!({"status": "ok"})))
        }
        other => Err(AgentError::NotFound(format!("unknown apps action {other}"))),
    }
}

fn package_param(request: &ParsedRequest, routed: &RoutedPath) -> Result<String, AgentError> {
    routed
        .param
        .clone()
        .or_else(|| request.query_param("package"))
        .ok_or_else(|| AgentError::ClientInput("missing package name".to_string()))
}
