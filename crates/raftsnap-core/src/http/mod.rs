//! HTTP exchange over libcurl.
//!
//! One request per call, executed on the blocking pool. Redirects are never
//! followed here: callers see the 3xx and decide. A cancellation token is
//! polled from curl's progress callback, so a cancelled transfer stops within
//! about a second even when the peer has gone quiet.
//!
//! Responses go either to memory (small control-plane bodies) or to a file
//! sink. The file sink only accepts a 200 body, writes it through
//! [`PartFile`], and renames it into place once the transfer has completed.

mod classify;
mod error;
mod headers;

pub use classify::{classify_http_status, classify_transport, ErrorKind};
pub use error::TransportError;
pub use headers::{parse_retry_after, parse_status_line, Headers};

use std::cell::{Cell, RefCell};
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::str;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use crate::storage::PartFile;

/// Upper bound on connection setup, independent of the whole-request timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Largest in-memory response body accepted (leader status, token, listings).
pub const MAX_MEMORY_BODY: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// Request payload.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Bytes(Vec<u8>),
    /// Streamed from disk with an exact `Content-Length`.
    File(PathBuf),
    /// `len` bytes of a file starting at `offset` (one upload block).
    FileRange { path: PathBuf, offset: u64, len: u64 },
}

/// Where a response body goes.
#[derive(Debug, Clone)]
pub enum ResponseSink {
    Memory,
    /// Written to `<path>.part` and renamed onto `path`, only for status 200.
    File(PathBuf),
}

/// TLS trust settings applied to a request.
#[derive(Debug, Clone, Default)]
pub struct TlsSettings {
    pub ca_cert: Option<PathBuf>,
    pub ca_path: Option<PathBuf>,
    pub skip_verify: bool,
}

/// A single HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub sink: ResponseSink,
    pub timeout: Duration,
    pub tls: TlsSettings,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            sink: ResponseSink::Memory,
            timeout: Duration::from_secs(120),
            tls: TlsSettings::default(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn sink(mut self, sink: ResponseSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn tls(mut self, tls: TlsSettings) -> Self {
        self.tls = tls;
        self
    }
}

/// Final response of an exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u32,
    pub headers: Headers,
    /// In-memory body; for a file sink this holds only non-200 bodies.
    pub body: Vec<u8>,
    /// Bytes written to the file sink's final path, when it accepted the body.
    pub file_bytes: Option<u64>,
}

impl HttpResponse {
    /// First KiB of the body, lossily decoded, for error messages.
    pub fn body_snippet(&self) -> String {
        let end = self.body.len().min(1024);
        String::from_utf8_lossy(&self.body[..end]).trim().to_string()
    }
}

/// Performs `req` on the blocking pool, aborting if `cancel` fires.
pub async fn send(req: HttpRequest, cancel: &CancellationToken) -> Result<HttpResponse, TransportError> {
    if cancel.is_cancelled() {
        return Err(TransportError::Cancelled);
    }
    let cancel = cancel.clone();
    tokio::task::spawn_blocking(move || perform_blocking(&req, &cancel))
        .await
        .map_err(|e| TransportError::Join(e.to_string()))?
}

/// Runs in the current thread; call from `spawn_blocking` in async code.
fn perform_blocking(req: &HttpRequest, cancel: &CancellationToken) -> Result<HttpResponse, TransportError> {
    let mut easy = curl::easy::Easy::new();
    easy.url(&req.url)?;
    easy.follow_location(false)?;
    easy.connect_timeout(req.timeout.min(CONNECT_TIMEOUT))?;
    easy.timeout(req.timeout)?;
    easy.progress(true)?;
    apply_tls(&mut easy, &req.tls)?;

    let mut source = open_body(&req.body)?;
    let body_len = source.as_ref().map(|(_, len)| *len).unwrap_or(0);
    match req.method {
        Method::Get => easy.get(true)?,
        Method::Head => easy.nobody(true)?,
        Method::Post => {
            easy.post(true)?;
            easy.post_field_size(body_len)?;
        }
        Method::Put => {
            easy.upload(true)?;
            easy.in_filesize(body_len)?;
        }
    }

    let mut list = curl::easy::List::new();
    for (k, v) in &req.headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    if matches!(req.method, Method::Post | Method::Put) {
        // No 100-continue round trip before the body.
        list.append("Expect:")?;
    }
    easy.http_headers(list)?;

    let sink_path: Option<&Path> = match &req.sink {
        ResponseSink::File(p) => Some(p.as_path()),
        ResponseSink::Memory => None,
    };
    let status = Cell::new(0u32);
    let header_lines: RefCell<Vec<String>> = RefCell::new(Vec::new());
    let body: RefCell<Vec<u8>> = RefCell::new(Vec::new());
    let part: RefCell<Option<PartFile>> = RefCell::new(None);
    let write_failure: RefCell<Option<TransportError>> = RefCell::new(None);

    let performed = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                let line = s.trim_end();
                if let Some(code) = parse_status_line(line) {
                    // A new status line starts a new header block (e.g. after 100 Continue).
                    status.set(code);
                    header_lines.borrow_mut().clear();
                } else if !line.is_empty() {
                    header_lines.borrow_mut().push(line.to_string());
                }
            }
            true
        })?;
        transfer.write_function(|data| {
            if let (Some(path), 200) = (sink_path, status.get()) {
                let mut slot = part.borrow_mut();
                if slot.is_none() {
                    match PartFile::create(path) {
                        Ok(p) => *slot = Some(p),
                        Err(e) => {
                            write_failure.replace(Some(TransportError::Storage(e)));
                            return Ok(0);
                        }
                    }
                }
                if let Some(p) = slot.as_mut() {
                    if let Err(e) = p.write_chunk(data) {
                        write_failure.replace(Some(TransportError::Storage(e)));
                        return Ok(0);
                    }
                }
                return Ok(data.len());
            }
            let mut buf = body.borrow_mut();
            if buf.len() + data.len() > MAX_MEMORY_BODY {
                write_failure.replace(Some(TransportError::BodyTooLarge(MAX_MEMORY_BODY)));
                return Ok(0);
            }
            buf.extend_from_slice(data);
            Ok(data.len())
        })?;
        if let Some((reader, _)) = source.as_mut() {
            transfer.read_function(move |buf| {
                reader
                    .read(buf)
                    .map_err(|_| curl::easy::ReadError::Abort)
            })?;
        }
        transfer.progress_function(|_, _, _, _| !cancel.is_cancelled())?;
        transfer.perform()
    };

    if let Err(e) = performed {
        if let Some(p) = part.borrow_mut().take() {
            p.discard();
        }
        if e.is_write_error() {
            if let Some(failure) = write_failure.borrow_mut().take() {
                return Err(failure);
            }
        }
        return Err(TransportError::from(e));
    }

    let mut code = status.get();
    if code == 0 {
        code = easy.response_code()?;
    }

    let mut file_bytes = None;
    if let (Some(path), 200) = (sink_path, code) {
        let finished = match part.borrow_mut().take() {
            Some(p) => p.finalize(),
            // 200 with an empty body still produces an (empty) file.
            None => PartFile::create(path).and_then(PartFile::finalize),
        };
        file_bytes = Some(finished.map_err(TransportError::Storage)?);
    }

    let headers = Headers::from_lines(&header_lines.borrow());
    Ok(HttpResponse {
        status: code,
        headers,
        body: body.into_inner(),
        file_bytes,
    })
}

type BodySource = (Box<dyn Read>, u64);

fn open_body(body: &RequestBody) -> Result<Option<BodySource>, TransportError> {
    match body {
        RequestBody::Empty => Ok(None),
        RequestBody::Bytes(b) => Ok(Some((Box::new(Cursor::new(b.clone())), b.len() as u64))),
        RequestBody::File(path) => {
            let f = File::open(path)
                .with_context(|| format!("open {}", path.display()))
                .map_err(TransportError::Storage)?;
            let len = f
                .metadata()
                .with_context(|| format!("stat {}", path.display()))
                .map_err(TransportError::Storage)?
                .len();
            Ok(Some((Box::new(f), len)))
        }
        RequestBody::FileRange { path, offset, len } => {
            let mut f = File::open(path)
                .with_context(|| format!("open {}", path.display()))
                .map_err(TransportError::Storage)?;
            f.seek(SeekFrom::Start(*offset))
                .with_context(|| format!("seek {} to {}", path.display(), offset))
                .map_err(TransportError::Storage)?;
            Ok(Some((Box::new(f.take(*len)), *len)))
        }
    }
}

fn apply_tls(easy: &mut curl::easy::Easy, tls: &TlsSettings) -> Result<(), curl::Error> {
    if let Some(ca) = &tls.ca_cert {
        easy.cainfo(ca)?;
    }
    if let Some(dir) = &tls.ca_path {
        easy.capath(dir)?;
    }
    if tls.skip_verify {
        easy.ssl_verify_peer(false)?;
        easy.ssl_verify_host(false)?;
    }
    Ok(())
}
