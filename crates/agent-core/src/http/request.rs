//! Parsing the HTTP/1.1 subset HTTPService accepts: request line, headers
//! until the blank line, and a body of `Content-Length` bytes. Header names
//! are case-folded to lowercase for lookup. Bodies past
//! [`MAX_IN_MEMORY_BODY`] are streamed straight to a temporary file so a
//! large upload never sits fully in memory.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::AgentError;

/// Bodies at or under this size are buffered in memory; larger bodies are
/// spooled to a temp file under the agent's data directory.
pub const MAX_IN_MEMORY_BODY: usize = 1024 * 1024;

/// How long a single read (request line, one header line, or a body chunk)
/// may block before the connection is dropped as idle.
pub const IDLE_READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub enum RequestBody {
    Memory(Vec<u8>),
    TempFile(PathBuf),
}

impl RequestBody {
    pub fn len_hint(&self) -> Option<u64> {
        match self {
            RequestBody::Memory(b) => Some(b.len() as u64),
            RequestBody::TempFile(_) => None,
        }
    }
}

#[derive(Debug)]
pub struct ParsedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: HashMap<String, String>,
    pub body: RequestBody,
    pub peer_addr: SocketAddr,
}

impl ParsedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn query_param(&self, key: &str) -> Option<String> {
        self.query.split('&').find_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let k = parts.next()?;
            let v = parts.next().unwrap_or("");
            (k == key).then(|| urldecode(v))
        })
    }

    /// The exact path-and-query as received, used as the `uri` component of
    /// the peer HMAC canonical message.
    pub fn uri(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }

    /// The full request body as a byte vector, reading it off disk first if
    /// it was spooled to a temp file. Handlers that want to stream large
    /// bodies directly (`files/write`, `apps/install`) should match on
    /// [`RequestBody`] themselves instead of calling this.
    pub async fn body_bytes(&self) -> Result<Vec<u8>, AgentError> {
        match &self.body {
            RequestBody::Memory(bytes) => Ok(bytes.clone()),
            RequestBody::TempFile(path) => tokio::fs::read(path).await.map_err(AgentError::Io),
        }
    }
}

/// Read and parse one HTTP request from `stream`. `spool_dir` is where
/// oversized bodies are written.
pub async fn read_request(
    stream: &mut BufReader<TcpStream>,
    peer_addr: SocketAddr,
    spool_dir: &std::path::Path,
) -> Result<ParsedRequest, AgentError> {
    let line = read_line(stream).await?;
    let (method, path, query) = parse_request_line(&line)?;

    let mut headers = HashMap::new();
    loop {
        let line = read_line(stream).await?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| AgentError::ClientInput(format!("malformed header line: {line}")))?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    let content_length: usize = headers
        .get("content-length")
        .map(|v| v.parse())
        .transpose()
        .map_err(|_| AgentError::ClientInput("invalid Content-Length".to_string()))?
        .unwrap_or(0);

    let body = read_body(stream, content_length, spool_dir).await?;

    Ok(ParsedRequest {
        method,
        path,
        query,
        headers,
        body,
        peer_addr,
    })
}

async fn read_line(stream: &mut BufReader<TcpStream>) -> Result<String, AgentError> {
    let mut line = String::new();
    let n = tokio::time::timeout(IDLE_READ_TIMEOUT, stream.read_line(&mut line))
        .await
        .map_err(|_| AgentError::ClientInput("idle timeout waiting for request".to_string()))?
        .map_err(AgentError::Io)?;
    if n == 0 {
        return Err(AgentError::ClientInput("connection closed before request completed".to_string()));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn parse_request_line(line: &str) -> Result<(String, String, String), AgentError> {
    let mut parts = line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| AgentError::ClientInput("empty request line".to_string()))?
        .to_string();
    let target = parts
        .next()
        .ok_or_else(|| AgentError::ClientInput("missing request target".to_string()))?;
    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p.to_string(), q.to_string()),
        None => (target.to_string(), String::new()),
    };
    Ok((method, path, query))
}

async fn read_body(
    stream: &mut BufReader<TcpStream>,
    content_length: usize,
    spool_dir: &std::path::Path,
) -> Result<RequestBody, AgentError> {
    if content_length == 0 {
        return Ok(RequestBody::Memory(Vec::new()));
    }

    if content_length <= MAX_IN_MEMORY_BODY {
        let mut buf = vec![0u8; content_length];
        tokio::time::timeout(IDLE_READ_TIMEOUT, stream.read_exact(&mut buf))
            .await
            .map_err(|_| AgentError::ClientInput("idle timeout reading body".to_string()))?
            .map_err(AgentError::Io)?;
        return Ok(RequestBody::Memory(buf));
    }

    tokio::fs::create_dir_all(spool_dir).await?;
    let temp_path = spool_dir.join(format!("upload-{}.tmp", uuid::Uuid::new_v4()));
    let mut file = tokio::fs::File::create(&temp_path).await?;

    let mut remaining = content_length;
    let mut chunk = vec![0u8; 64 * 1024];
    while remaining > 0 {
        let take = remaining.min(chunk.len());
        tokio::time::timeout(IDLE_READ_TIMEOUT, stream.read_exact(&mut chunk[..take]))
            .await
            .map_err(|_| AgentError::ClientInput("idle timeout reading body".to_string()))?
            .map_err(AgentError::Io)?;
        file.write_all(&chunk[..take]).await?;
        remaining -= take;
    }
    file.flush().await?;

    Ok(RequestBody::TempFile(temp_path))
}

fn urldecode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                    out.push(byte);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_line_with_query() {
        let (method, path, query) = parse_request_line("GET /api/files/list?path=/sdcard HTTP/1.1").unwrap();
        assert_eq!(method, "GET");
        assert_eq!(path, "/api/files/list");
        assert_eq!(query, "path=/sdcard");
    }

    #[test]
    fn parses_request_line_without_query() {
        let (method, path, query) = parse_request_line("GET /api/ping HTTP/1.1").unwrap();
        assert_eq!(method, "GET");
        assert_eq!(path, "/api/ping");
        assert_eq!(query, "");
    }

    #[test]
    fn rejects_empty_request_line() {
        assert!(parse_request_line("").is_err());
    }

    #[test]
    fn urldecode_handles_percent_and_plus() {
        assert_eq!(urldecode("hello%20world"), "hello world");
        assert_eq!(urldecode("a+b"), "a b");
    }
}
