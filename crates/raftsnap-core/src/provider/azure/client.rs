//! Blob service REST calls: list, put (whole or in blocks), head, get.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::credential::{Credential, TokenSource};
use super::error::BlobError;
use super::list::{parse_list, ListPage};
use crate::http::{self, HttpRequest, HttpResponse, Method, RequestBody, ResponseSink};

pub const API_VERSION: &str = "2021-08-06";
const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);
const HEAD_TIMEOUT: Duration = Duration::from_secs(15);
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Size and digest metadata of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobProperties {
    pub size: u64,
    pub sha256: Option<String>,
}

pub struct BlobClient {
    endpoint: Url,
    container: String,
    tokens: TokenSource,
}

impl BlobClient {
    pub fn new(endpoint: &str, container: &str, credential: Credential) -> Result<Self, BlobError> {
        let mut base = endpoint.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base).map_err(|_| BlobError::Endpoint(endpoint.to_string()))?;
        if endpoint.cannot_be_a_base() {
            return Err(BlobError::Endpoint(base));
        }
        Ok(Self {
            endpoint,
            container: container.to_string(),
            tokens: TokenSource::new(credential),
        })
    }

    pub fn credential(&self) -> &Credential {
        self.tokens.credential()
    }

    /// `<endpoint>/<container>[/<key segments>]?<query>[&<sas>]`.
    fn url(&self, key: Option<&str>, query: &[(&str, &str)]) -> Result<String, BlobError> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| BlobError::Endpoint(self.endpoint.to_string()))?;
            segments.pop_if_empty().push(&self.container);
            if let Some(key) = key {
                segments.extend(key.split('/'));
            }
        }
        let mut q = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in query {
            q.append_pair(k, v);
        }
        let mut q = q.finish();
        if let Credential::Sas(sas) = self.credential() {
            if !q.is_empty() {
                q.push('&');
            }
            q.push_str(sas.expose());
        }
        url.set_query(if q.is_empty() { None } else { Some(q.as_str()) });
        Ok(url.to_string())
    }

    async fn send(&self, cancel: &CancellationToken, req: HttpRequest) -> Result<HttpResponse, BlobError> {
        let mut req = req
            .header("x-ms-version", API_VERSION)
            .header("x-ms-date", Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string());
        if let Some(token) = self.tokens.bearer(cancel).await? {
            req = req.header("Authorization", format!("Bearer {}", token.expose()));
        }
        Ok(http::send(req, cancel).await?)
    }

    /// One page of the container listing.
    pub async fn list(
        &self,
        cancel: &CancellationToken,
        prefix: Option<&str>,
        max_results: u32,
        marker: Option<&str>,
    ) -> Result<ListPage, BlobError> {
        let max = max_results.to_string();
        let mut query = vec![("restype", "container"), ("comp", "list"), ("maxresults", max.as_str())];
        if let Some(p) = prefix {
            query.push(("prefix", p));
        }
        if let Some(m) = marker {
            query.push(("marker", m));
        }
        let url = self.url(None, &query)?;
        let resp = self
            .send(cancel, HttpRequest::new(Method::Get, url).timeout(CONTROL_TIMEOUT))
            .await?;
        if resp.status != 200 {
            return Err(BlobError::from_response("list blobs", &resp));
        }
        parse_list(&String::from_utf8_lossy(&resp.body))
    }

    /// Put Blob from a local file, tagging it with its digest.
    pub async fn put_blob(
        &self,
        cancel: &CancellationToken,
        key: &str,
        source: &Path,
        sha256: &str,
    ) -> Result<(), BlobError> {
        let url = self.url(Some(key), &[])?;
        let req = HttpRequest::new(Method::Put, url)
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-meta-sha256", sha256)
            .header("Content-Type", "application/octet-stream")
            .body(RequestBody::File(source.to_path_buf()))
            .timeout(TRANSFER_TIMEOUT);
        let resp = self.send(cancel, req).await?;
        match resp.status {
            200 | 201 => Ok(()),
            _ => Err(BlobError::from_response("put blob", &resp)),
        }
    }

    /// Put Block: stage `len` bytes of `source` from `offset` as `block_id`.
    pub async fn put_block(
        &self,
        cancel: &CancellationToken,
        key: &str,
        block_id: &str,
        source: &Path,
        offset: u64,
        len: u64,
    ) -> Result<(), BlobError> {
        let url = self.url(Some(key), &[("comp", "block"), ("blockid", block_id)])?;
        let req = HttpRequest::new(Method::Put, url)
            .header("Content-Type", "application/octet-stream")
            .body(RequestBody::FileRange {
                path: source.to_path_buf(),
                offset,
                len,
            })
            .timeout(TRANSFER_TIMEOUT);
        let resp = self.send(cancel, req).await?;
        match resp.status {
            200 | 201 => Ok(()),
            _ => Err(BlobError::from_response("put block", &resp)),
        }
    }

    /// Put Block List: commit staged blocks in order and tag the blob with its digest.
    pub async fn put_block_list(
        &self,
        cancel: &CancellationToken,
        key: &str,
        block_ids: &[String],
        sha256: &str,
    ) -> Result<(), BlobError> {
        let url = self.url(Some(key), &[("comp", "blocklist")])?;
        let req = HttpRequest::new(Method::Put, url)
            .header("x-ms-meta-sha256", sha256)
            .header("x-ms-blob-content-type", "application/octet-stream")
            .header("Content-Type", "application/xml")
            .body(RequestBody::Bytes(block_list_xml(block_ids).into_bytes()))
            .timeout(CONTROL_TIMEOUT);
        let resp = self.send(cancel, req).await?;
        match resp.status {
            200 | 201 => Ok(()),
            _ => Err(BlobError::from_response("put block list", &resp)),
        }
    }

    pub async fn head(&self, cancel: &CancellationToken, key: &str) -> Result<BlobProperties, BlobError> {
        let url = self.url(Some(key), &[])?;
        let resp = self
            .send(cancel, HttpRequest::new(Method::Head, url).timeout(HEAD_TIMEOUT))
            .await?;
        if resp.status != 200 {
            return Err(BlobError::from_response("head blob", &resp));
        }
        let size = resp.headers.content_length().ok_or(BlobError::MissingLength)?;
        let sha256 = resp
            .headers
            .get("x-ms-meta-sha256")
            .map(str::to_string)
            .filter(|s| !s.is_empty());
        Ok(BlobProperties { size, sha256 })
    }

    /// Get Blob into `target` through the part-file sink; returns bytes written.
    pub async fn download(&self, cancel: &CancellationToken, key: &str, target: &Path) -> Result<u64, BlobError> {
        let url = self.url(Some(key), &[])?;
        let req = HttpRequest::new(Method::Get, url)
            .sink(ResponseSink::File(target.to_path_buf()))
            .timeout(TRANSFER_TIMEOUT);
        let resp = self.send(cancel, req).await?;
        match (resp.status, resp.file_bytes) {
            (200, Some(n)) => Ok(n),
            _ => Err(BlobError::from_response("get blob", &resp)),
        }
    }
}

/// Block IDs must be base64 and equal in length within a blob. Fixed-width
/// hex digits satisfy both.
pub fn block_id(index: u64) -> String {
    format!("{:032x}", index)
}

fn block_list_xml(block_ids: &[String]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?><BlockList>"#);
    for id in block_ids {
        xml.push_str("<Latest>");
        xml.push_str(id);
        xml.push_str("</Latest>");
    }
    xml.push_str("</BlockList>");
    xml
}
