//! Writing HTTP/1.1 responses: status line, `Content-Length`,
//! `Connection: close`, `Content-Type`, `Server`, and any handler-supplied
//! extra headers.

use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

use crate::error::AgentError;

pub const WRITE_TIMEOUT: Duration = Duration::from_secs(30);
const SERVER_HEADER: &str = concat!("agent-core/", env!("CARGO_PKG_VERSION"));

pub enum ResponseBody {
    Json(Vec<u8>),
    Binary { content_type: String, data: Vec<u8>, extra_headers: Vec<(String, String)> },
}

pub struct HttpResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl HttpResponse {
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
        Self { status, body: ResponseBody::Json(body) }
    }

    pub fn ok<T: Serialize>(value: &T) -> Self {
        Self::json(200, value)
    }

    pub fn from_error(err: &AgentError) -> Self {
        let (status, envelope) = err.status_and_body();
        Self::json(status, &envelope)
    }

    pub fn binary(status: u16, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            status,
            body: ResponseBody::Binary { content_type: content_type.into(), data, extra_headers: Vec::new() },
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let ResponseBody::Binary { extra_headers, .. } = &mut self.body {
            extra_headers.push((name.into(), value.into()));
        }
        self
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

pub async fn write_response(
    stream: &mut BufWriter<TcpStream>,
    response: HttpResponse,
) -> Result<(), AgentError> {
    let write = async {
        let status_line = format!("HTTP/1.1 {} {}\r\n", response.status, reason_phrase(response.status));
        stream.write_all(status_line.as_bytes()).await?;
        stream.write_all(format!("Server: {SERVER_HEADER}\r\n").as_bytes()).await?;
        stream.write_all(b"Connection: close\r\n").await?;

        match &response.body {
            ResponseBody::Json(bytes) => {
                stream
                    .write_all(format!("Content-Type: application/json\r\nContent-Length: {}\r\n", bytes.len()).as_bytes())
                    .await?;
                stream.write_all(b"\r\n").await?;
                stream.write_all(bytes).await?;
            }
            ResponseBody::Binary { content_type, data, extra_headers } => {
                stream
                    .write_all(format!("Content-Type: {content_type}\r\nContent-Length: {}\r\n", data.len()).as_bytes())
                    .await?;
                for (name, value) in extra_headers {
                    stream.write_all(format!("{name}: {value}\r\n").as_bytes()).await?;
                }
                stream.write_all(b"\r\n").await?;
                stream.write_all(data).await?;
            }
        }
        stream.flush().await
    };

    tokio::time::timeout(WRITE_TIMEOUT, write)
        .await
        .map_err(|_| AgentError::Internal("response write timed out".to_string()))?
        .map_err(AgentError::Io)
}
