//! Minimal HTTP/1.1 server that supports HEAD and Range GET for integration tests.
//!
//! Serves a single body that tests can swap, throttle or make fail, and records
//! every request so tests can assert on the Range headers a job sent.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, HEAD returns 405 (simulates servers that block HEAD).
    pub head_allowed: bool,
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
        }
    }
}

/// One request as seen by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    pub method: String,
    /// Raw `Range` header value, e.g. `bytes=250-499`.
    pub range: Option<String>,
}

#[derive(Default)]
struct Behaviour {
    /// Answer every GET whose range starts at or after `.0` with status `.1`.
    fail_from: Option<(u64, u16)>,
    /// Pause between 1 KiB body pieces.
    throttle: Option<Duration>,
}

struct ServerState {
    body: RwLock<Arc<Vec<u8>>>,
    opts: RangeServerOptions,
    behaviour: Mutex<Behaviour>,
    requests: Mutex<Vec<RequestRecord>>,
    served: AtomicU64,
    /// Bumped by `clear_requests`; connections from an older generation stop counting.
    generation: AtomicU64,
}

/// Handle to a running server. The server thread lives until the process exits.
pub struct RangeServer {
    pub url: String,
    state: Arc<ServerState>,
}

impl RangeServer {
    pub fn start(body: Vec<u8>) -> Self {
        Self::start_with_options(body, RangeServerOptions::default())
    }

    pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(ServerState {
            body: RwLock::new(Arc::new(body)),
            opts,
            behaviour: Mutex::new(Behaviour::default()),
            requests: Mutex::new(Vec::new()),
            served: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        });
        let accept_state = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let state = Arc::clone(&accept_state);
                let generation = state.generation.load(Ordering::SeqCst);
                thread::spawn(move || handle(stream, &state, generation));
            }
        });
        RangeServer {
            url: format!("http://127.0.0.1:{}/pack.zip", port),
            state,
        }
    }

    /// Replace the served body (simulates the remote file changing).
    pub fn set_body(&self, body: Vec<u8>) {
        *self.state.body.write().unwrap() = Arc::new(body);
    }

    pub fn fail_from(&self, offset: u64, status: u16) {
        self.state.behaviour.lock().unwrap().fail_from = Some((offset, status));
    }

    pub fn fail_all(&self, status: u16) {
        self.fail_from(0, status);
    }

    pub fn stop_failing(&self) {
        self.state.behaviour.lock().unwrap().fail_from = None;
    }

    pub fn throttle(&self, per_kib: Option<Duration>) {
        self.state.behaviour.lock().unwrap().throttle = per_kib;
    }

    pub fn requests(&self) -> Vec<RequestRecord> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Range headers of all GETs, in arrival order.
    pub fn get_ranges(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == "GET")
            .filter_map(|r| r.range)
            .collect()
    }

    /// Forget logged requests and served bytes. Responses still being written by
    /// earlier connections no longer count.
    pub fn clear_requests(&self) {
        self.state.generation.fetch_add(1, Ordering::SeqCst);
        self.state.requests.lock().unwrap().clear();
        self.state.served.store(0, Ordering::SeqCst);
    }

    /// Body bytes written to sockets by 2xx GET responses since the last `clear_requests`.
    pub fn served_bytes(&self) -> u64 {
        self.state.served.load(Ordering::SeqCst)
    }
}

fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > 64 * 1024 {
            return None;
        }
    }
    String::from_utf8(buf).ok()
}

fn handle(mut stream: TcpStream, state: &ServerState, generation: u64) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Some(request) = read_request(&mut stream) else {
        return;
    };
    let (method, range_raw, range) = parse_request(&request);
    if state.generation.load(Ordering::SeqCst) == generation {
        state.requests.lock().unwrap().push(RequestRecord {
            method: method.to_string(),
            range: range_raw.clone(),
        });
    }

    let body = Arc::clone(&state.body.read().unwrap());
    let total = body.len() as u64;
    let (fail_from, throttle) = {
        let b = state.behaviour.lock().unwrap();
        (b.fail_from, b.throttle)
    };

    if method.eq_ignore_ascii_case("HEAD") {
        if !state.opts.head_allowed {
            let _ = stream.write_all(
                b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            );
            return;
        }
        let accept_ranges = if state.opts.support_ranges {
            "Accept-Ranges: bytes\r\n"
        } else {
            ""
        };
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
            total, accept_ranges
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(
            b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        return;
    }

    let requested_start = range.map(|(s, _)| s).unwrap_or(0);
    if let Some((offset, status)) = fail_from {
        if requested_start >= offset {
            let response = format!(
                "HTTP/1.1 {} Forced Failure\r\nContent-Length: 6\r\nConnection: close\r\n\r\nforced",
                status
            );
            let _ = stream.write_all(response.as_bytes());
            return;
        }
    }

    let (status, content_range, slice) = match range {
        Some((start, end_incl)) if state.opts.support_ranges => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if total == 0 || start > end_incl {
                let response = format!(
                    "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    total
                );
                let _ = stream.write_all(response.as_bytes());
                return;
            }
            (
                "206 Partial Content",
                Some(format!("bytes {}-{}/{}", start, end_incl, total)),
                &body[start as usize..=end_incl as usize],
            )
        }
        _ => ("200 OK", None, &body[..]),
    };

    let mut head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\nConnection: close\r\n",
        status,
        slice.len()
    );
    if let Some(cr) = content_range {
        head.push_str(&format!("Content-Range: {}\r\n", cr));
    }
    head.push_str("\r\n");
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }
    for piece in slice.chunks(1024) {
        if let Some(delay) = throttle {
            thread::sleep(delay);
        }
        if stream.write_all(piece).is_err() {
            return;
        }
        if state.generation.load(Ordering::SeqCst) == generation {
            state.served.fetch_add(piece.len() as u64, Ordering::SeqCst);
        }
    }
}

/// Returns (method, raw Range value, parsed (start, end_inclusive) for `bytes=X-Y`).
fn parse_request(request: &str) -> (&str, Option<String>, Option<(u64, u64)>) {
    let mut method = "";
    let mut raw = None;
    let mut range = None;
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if method.is_empty() {
            method = line.split_whitespace().next().unwrap_or("");
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim();
                raw = Some(value.to_string());
                if let Some(part) = value.strip_prefix("bytes=") {
                    if let Some((a, b)) = part.split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end = b.trim();
                        let end_incl = if end.is_empty() {
                            u64::MAX
                        } else {
                            end.parse::<u64>().unwrap_or(0)
                        };
                        range = Some((start, end_incl));
                    }
                }
            }
        }
    }
    (method, raw, range)
}
