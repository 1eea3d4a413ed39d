//! `sms/*` — message listing and import, backed by an [`SmsProvider`].

use std::sync::Arc;

use crate::error::AgentError;
use crate::handlers::body_json;
use crate::http::request::ParsedRequest;
use crate::http::response::HttpResponse;
use crate::providers::SmsMessage;
use crate::router::RoutedPath;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(serde::Deserialize, Default)]
struct ImportRequest {
    messages: Vec<SmsMessage>,
}

pub async fn handle(
    request: &ParsedRequest,
    routed: &RoutedPath,
    state: &Arc<AppState>,
) -> Result<HttpResponse, AgentError> {
    let provider = &state.sms_provider;

    match routed.action.as_str() {
        "list" => {
            let page = request.query_param("page").and_then(|v| v.parse().ok()).unwrap_or(0);
            let page_size = request
                .query_param("page_size")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PAGE_SIZE);
            Ok(HttpResponse::ok(&provider.list(page, page_size)))
        }
        "export" => Ok(HttpResponse::ok(&provider.all())),
        "count" => Ok(HttpResponse::ok(&serde_json::json!({"count": provider.count()}))),
        "conversations" => Ok(HttpResponse::ok(&provider.conversations())),
        "import" => {
            let body = request.body_bytes().await?;
            let parsed: ImportRequest = body_json(&body)?;
            let result = provider.import(parsed.messages);
            Ok(HttpResponse::ok(&result))
        }
        other => Err(AgentError::NotFound(format!("unknown sms action {other}"))),
    }
}
