//! Status toggle service.
//!
//! A tiny HTTP/1.1 server on its own thread exposing one boolean run flag:
//!
//! - `GET /` reports that the service is online
//! - `POST /start` and `POST /stop` flip the flag
//! - `GET /status` reports the flag
//!
//! The flag lives in a [`RunState`] handed in by the caller. The server never
//! drives the detection loop itself.

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const MAX_REQUEST_BYTES: usize = 8192;
const ACCEPT_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct StatusConfig {
    pub addr: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Shared run flag. Clones observe the same value.
#[derive(Clone, Debug, Default)]
pub struct RunState {
    running: Arc<AtomicBool>,
}

impl RunState {
    pub fn new(running: bool) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(running)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Store `running`, returning the previous value.
    pub fn set(&self, running: bool) -> bool {
        self.running.swap(running, Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct StatusHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl StatusHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("status server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct StatusServer {
    cfg: StatusConfig,
    state: RunState,
}

impl StatusServer {
    pub fn new(cfg: StatusConfig, state: RunState) -> Self {
        Self { cfg, state }
    }

    pub fn spawn(self) -> Result<StatusHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .with_context(|| format!("invalid status address '{}'", self.cfg.addr))?;
        let listener = TcpListener::bind(configured_addr)
            .with_context(|| format!("failed to bind status api on {}", configured_addr))?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "status api configured for loopback address '{}', but bound to '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let state = self.state;
        let join = std::thread::Builder::new()
            .name("status-api".to_string())
            .spawn(move || {
                if let Err(err) = run_server(listener, state, shutdown_thread) {
                    log::error!("status api stopped: {:#}", err);
                }
            })
            .context("spawn status api thread")?;

        Ok(StatusHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_server(listener: TcpListener, state: RunState, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &state) {
                    log::warn!("status api request rejected: {:#}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, state: &RunState) -> Result<()> {
    // Accepted sockets inherit the listener's non-blocking mode on some platforms.
    stream.set_nonblocking(false)?;
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_json_response(&mut stream, 403, &json!({"detail": "Forbidden"}))?;
        return Ok(());
    }

    let request = read_request(&mut stream)?;
    let (status, body) = route(&request, state);
    if status != 200 {
        log::warn!(
            "status api: {} {} from {} -> {}",
            request.method,
            request.path,
            peer,
            status
        );
    }
    write_json_response(&mut stream, status, &body)
}

fn route(request: &HttpRequest, state: &RunState) -> (u16, Value) {
    let expected = match request.path.as_str() {
        "/" | "/status" => "GET",
        "/start" | "/stop" => "POST",
        _ => return (404, json!({"detail": "Not Found"})),
    };
    if request.method != expected {
        return (405, json!({"detail": "Method Not Allowed"}));
    }

    match request.path.as_str() {
        "/" => (200, json!({"status": "online"})),
        "/status" => (200, json!({"running": state.is_running()})),
        "/start" => {
            if !state.set(true) {
                log::info!("detection started");
            }
            (200, json!({"message": "Detection started"}))
        }
        _ => {
            if state.set(false) {
                log::info!("detection stopped");
            }
            (200, json!({"message": "Detection stopped"}))
        }
    }
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let request_line = text
        .split("\r\n")
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let path = raw_path.split('?').next().unwrap_or(raw_path);
    Ok(HttpRequest {
        method: method.to_ascii_uppercase(),
        path: path.to_string(),
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &Value) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, status, "application/json", &payload)
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, path: &str) -> HttpRequest {
        HttpRequest {
            method: method.to_string(),
            path: path.to_string(),
        }
    }

    #[test]
    fn start_and_stop_toggle_the_flag() {
        let state = RunState::default();
        assert_eq!(
            route(&request("POST", "/start"), &state),
            (200, json!({"message": "Detection started"}))
        );
        assert!(state.is_running());
        assert_eq!(
            route(&request("GET", "/status"), &state),
            (200, json!({"running": true}))
        );
        assert_eq!(
            route(&request("POST", "/stop"), &state),
            (200, json!({"message": "Detection stopped"}))
        );
        assert_eq!(
            route(&request("GET", "/status"), &state),
            (200, json!({"running": false}))
        );
    }

    #[test]
    fn repeated_start_is_idempotent() {
        let state = RunState::new(true);
        let (status, _) = route(&request("POST", "/start"), &state);
        assert_eq!(status, 200);
        assert!(state.is_running());
    }

    #[test]
    fn unknown_path_and_wrong_method() {
        let state = RunState::default();
        assert_eq!(route(&request("GET", "/nope"), &state).0, 404);
        assert_eq!(route(&request("GET", "/start"), &state).0, 405);
        assert_eq!(route(&request("POST", "/status"), &state).0, 405);
        assert!(!state.is_running());
    }

    #[test]
    fn root_reports_online() {
        let (status, body) = route(&request("GET", "/"), &RunState::default());
        assert_eq!(status, 200);
        assert_eq!(body, json!({"status": "online"}));
    }

    #[test]
    fn clones_share_the_flag() {
        let state = RunState::default();
        let other = state.clone();
        assert!(!other.set(true));
        assert!(state.is_running());
    }

    #[test]
    fn rejects_bad_address() {
        let server = StatusServer::new(
            StatusConfig {
                addr: "not-an-addr".to_string(),
            },
            RunState::default(),
        );
        assert!(server.spawn().is_err());
    }
}
