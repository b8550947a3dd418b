//! Minimal HTTP/1.1 server for integration tests.
//!
//! Each request is parsed (headers plus a `Content-Length` body), recorded,
//! and answered by a test-supplied handler. One request per connection; the
//! server closes after every response.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// A request as the server saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Earlier requests with the same method and path.
    pub nth: usize,
    /// `http://127.0.0.1:<port>` of this server.
    pub base: String,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Canned response.
#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    /// Send this many body bytes, then hang for this long without closing.
    stall: Option<(usize, Duration)>,
    /// HEAD replies advertise this length without sending a body.
    head_length: Option<u64>,
}

impl Reply {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            stall: None,
            head_length: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn json(self, body: &str) -> Self {
        self.header("Content-Type", "application/json").body(body.as_bytes().to_vec())
    }

    pub fn stall_after(mut self, bytes: usize, hang: Duration) -> Self {
        self.stall = Some((bytes, hang));
        self
    }

    pub fn head_length(mut self, len: u64) -> Self {
        self.head_length = Some(len);
        self
    }
}

type Handler = dyn Fn(&Recorded) -> Reply + Send + Sync;

pub struct ScriptServer {
    base: String,
    log: Arc<Mutex<Vec<Recorded>>>,
}

impl ScriptServer {
    /// Starts a server in a background thread; it runs until the process exits.
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&Recorded) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let base = format!("http://127.0.0.1:{}", port);
        let log: Arc<Mutex<Vec<Recorded>>> = Arc::new(Mutex::new(Vec::new()));
        let counts: Arc<Mutex<HashMap<String, usize>>> = Arc::new(Mutex::new(HashMap::new()));
        let handler: Arc<Handler> = Arc::new(handler);
        {
            let base = base.clone();
            let log = Arc::clone(&log);
            thread::spawn(move || {
                for stream in listener.incoming().flatten() {
                    let base = base.clone();
                    let log = Arc::clone(&log);
                    let counts = Arc::clone(&counts);
                    let handler = Arc::clone(&handler);
                    thread::spawn(move || serve(stream, &base, &log, &counts, handler.as_ref()));
                }
            });
        }
        ScriptServer { base, log }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    /// Recorded requests for `method path`.
    pub fn hits(&self, method: &str, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }
}

fn serve(
    stream: TcpStream,
    base: &str,
    log: &Mutex<Vec<Recorded>>,
    counts: &Mutex<HashMap<String, usize>>,
    handler: &Handler,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Ok(write_half) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(stream);
    let Some(mut req) = read_request(&mut reader, base) else {
        return;
    };
    {
        let mut counts = counts.lock().unwrap();
        let n = counts.entry(format!("{} {}", req.method, req.path)).or_insert(0);
        req.nth = *n;
        *n += 1;
    }
    log.lock().unwrap().push(req.clone());
    let reply = handler(&req);
    write_reply(write_half, &req.method, &reply);
}

fn read_request(reader: &mut BufReader<TcpStream>, base: &str) -> Option<Recorded> {
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();
    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p.to_string(), q.to_string()),
        None => (target, String::new()),
    };

    let mut headers = Vec::new();
    loop {
        let mut h = String::new();
        if reader.read_line(&mut h).ok()? == 0 {
            break;
        }
        let h = h.trim_end();
        if h.is_empty() {
            break;
        }
        if let Some((k, v)) = h.split_once(':') {
            headers.push((k.trim().to_string(), v.trim().to_string()));
        }
    }
    let len = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).ok()?;

    Some(Recorded {
        method,
        path,
        query,
        headers,
        body,
        nth: 0,
        base: base.to_string(),
    })
}

fn write_reply(mut stream: TcpStream, method: &str, reply: &Reply) {
    let advertised = match (method, reply.head_length) {
        ("HEAD", Some(n)) => n,
        _ => reply.body.len() as u64,
    };
    let mut head = format!("HTTP/1.1 {} {}\r\n", reply.status, reason(reply.status));
    for (k, v) in &reply.headers {
        head.push_str(&format!("{}: {}\r\n", k, v));
    }
    head.push_str(&format!("Content-Length: {}\r\nConnection: close\r\n\r\n", advertised));
    if stream.write_all(head.as_bytes()).is_err() || method == "HEAD" {
        return;
    }
    match reply.stall {
        Some((bytes, hang)) => {
            let n = bytes.min(reply.body.len());
            let _ = stream.write_all(&reply.body[..n]);
            let _ = stream.flush();
            thread::sleep(hang);
        }
        None => {
            let _ = stream.write_all(&reply.body);
        }
    }
    let _ = stream.flush();
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        408 => "Request Timeout",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}
