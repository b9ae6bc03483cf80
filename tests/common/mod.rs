//! Throwaway HTTP/1.1 server for transport tests: one request per
//! connection, canned responses, every request recorded.

#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use voice_chat_client::config::{ClientConfig, UiState};
use voice_chat_client::error::Result as ChatResult;
use voice_chat_client::playback::AudioPlayer;
use voice_chat_client::transcript::MemoryTranscript;
use voice_chat_client::ChatClient;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Value of a text field in a multipart body.
    pub fn form_field(&self, name: &str) -> Option<String> {
        let body = self.body_text();
        let marker = format!("name=\"{name}\"");
        let start = body.find(&marker)?;
        let rest = &body[start..];
        let value_start = rest.find("\r\n\r\n")? + 4;
        let value_end = rest[value_start..].find("\r\n")?;
        Some(rest[value_start..value_start + value_end].to_string())
    }
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    /// When non-empty, sent with chunked encoding, one write per entry with a
    /// pause in between so the client sees separate reads.
    pub chunks: Vec<String>,
}

impl MockResponse {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
            chunks: Vec::new(),
        }
    }

    pub fn streamed(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ..Self::text("")
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: value.to_string(),
            chunks: Vec::new(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: "{}".to_string(),
            chunks: Vec::new(),
        }
    }
}

pub struct MockServer {
    pub url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServer {
    pub async fn start<F>(route: F) -> Self
    where
        F: Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let route = Arc::new(route);

        let recorded = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let recorded = recorded.clone();
                let route = route.clone();
                tokio::spawn(async move {
                    let _ = handle(stream, recorded, route).await;
                });
            }
        });

        Self { url, requests }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            server_url: self.url.clone(),
            smoothness_ms: 1,
            ..ClientConfig::default()
        }
    }
}

async fn handle<F>(
    mut stream: TcpStream,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
    route: Arc<F>,
) -> io::Result<()>
where
    F: Fn(&RecordedRequest) -> MockResponse,
{
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];

    let (head_len, method, path, headers) = loop {
        let n = stream.read(&mut tmp).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&tmp[..n]);
        let mut slots = [httparse::EMPTY_HEADER; 32];
        let mut req = httparse::Request::new(&mut slots);
        if let httparse::Status::Complete(len) = req.parse(&buf).map_err(io::Error::other)? {
            let headers: Vec<(String, String)> = req
                .headers
                .iter()
                .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
                .collect();
            break (
                len,
                req.method.unwrap_or_default().to_string(),
                req.path.unwrap_or_default().to_string(),
                headers,
            );
        }
    };

    let header = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    };
    let body = if let Some(len) = header("content-length").and_then(|v| v.trim().parse::<usize>().ok()) {
        while buf.len() < head_len + len {
            let n = stream.read(&mut tmp).await?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&tmp[..n]);
        }
        buf[head_len..(head_len + len).min(buf.len())].to_vec()
    } else if header("transfer-encoding").is_some_and(|v| v.contains("chunked")) {
        while !buf[head_len..].ends_with(b"0\r\n\r\n") {
            let n = stream.read(&mut tmp).await?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&tmp[..n]);
        }
        dechunk(&buf[head_len..])
    } else {
        Vec::new()
    };

    let request = RecordedRequest {
        method,
        path,
        headers,
        body,
    };
    let response = route(&request);
    recorded.lock().unwrap().push(request);

    if response.chunks.is_empty() {
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            response.status,
            reason(response.status),
            response.content_type,
            response.body.len()
        );
        stream.write_all(head.as_bytes()).await?;
        stream.write_all(response.body.as_bytes()).await?;
    } else {
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
            response.status,
            reason(response.status),
            response.content_type
        );
        stream.write_all(head.as_bytes()).await?;
        for chunk in &response.chunks {
            let frame = format!("{:x}\r\n{}\r\n", chunk.len(), chunk);
            stream.write_all(frame.as_bytes()).await?;
            stream.flush().await?;
            tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        }
        stream.write_all(b"0\r\n\r\n").await?;
    }
    stream.shutdown().await?;
    Ok(())
}

fn dechunk(mut data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let Some(line_end) = data.windows(2).position(|w| w == b"\r\n") else {
            break;
        };
        let size_line = String::from_utf8_lossy(&data[..line_end]);
        let size_hex = size_line.split(';').next().unwrap_or("0").trim().to_string();
        let Ok(size) = usize::from_str_radix(&size_hex, 16) else {
            break;
        };
        if size == 0 {
            break;
        }
        let start = line_end + 2;
        let end = (start + size).min(data.len());
        out.extend_from_slice(&data[start..end]);
        data = &data[(end + 2).min(data.len())..];
    }
    out
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Status",
    }
}

// ---------------------------------------------------------------------------
// Client fixtures
// ---------------------------------------------------------------------------

/// Player that records what it was asked to play.
#[derive(Debug, Default)]
pub struct RecordingPlayer {
    pub played: Vec<String>,
    pub stops: usize,
    /// Report playback as ongoing after `play`.
    pub keeps_playing: bool,
    playing: bool,
}

impl RecordingPlayer {
    /// A player whose audio stays audible until stopped.
    pub fn keeping_playing() -> Self {
        Self {
            keeps_playing: true,
            ..Self::default()
        }
    }
}

impl AudioPlayer for RecordingPlayer {
    fn play(&mut self, url: &str) -> ChatResult<()> {
        self.played.push(url.to_string());
        self.playing = self.keeps_playing;
        Ok(())
    }

    fn is_playing(&mut self) -> bool {
        self.playing
    }

    fn stop(&mut self) {
        self.stops += 1;
        self.playing = false;
    }
}

pub type TestClient = ChatClient<MemoryTranscript, RecordingPlayer>;

pub fn client_for(server: &MockServer) -> TestClient {
    client_with_player(server, RecordingPlayer::default())
}

pub fn client_with_player(server: &MockServer, player: RecordingPlayer) -> TestClient {
    let state = UiState {
        session_id: "test-session".to_string(),
        selected_model: None,
    };
    ChatClient::new(server.config(), state, None, MemoryTranscript::new(), player).unwrap()
}

pub fn init_data(channels: &[(&str, &str)], models: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "channels": channels
            .iter()
            .map(|(id, name)| serde_json::json!({ "id": id, "name": name }))
            .collect::<Vec<_>>(),
        "models": models
            .iter()
            .map(|name| serde_json::json!({ "name": name, "size": 1 }))
            .collect::<Vec<_>>(),
    })
}
