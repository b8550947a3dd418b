//! Minimal reader for the List Blobs XML response.
//!
//! Only the fields the validator needs are extracted: each blob's `Name` and
//! `Content-Length`, plus `NextMarker` for paging. Names the service sends
//! with `Encoded="true"` are percent-decoded.

use percent_encoding::percent_decode_str;

use super::error::BlobError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobItem {
    pub name: String,
    pub content_length: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub blobs: Vec<BlobItem>,
    pub next_marker: Option<String>,
}

pub fn parse_list(xml: &str) -> Result<ListPage, BlobError> {
    if !xml.contains("<EnumerationResults") {
        return Err(BlobError::Decode {
            what: "blob listing",
            message: "missing EnumerationResults".into(),
        });
    }
    let mut blobs = Vec::new();
    let mut rest = xml;
    while let Some((blob, after)) = next_element(rest, "Blob") {
        let name = next_element(blob.text, "Name")
            .map(|(name, _)| blob_name(&name))
            .transpose()?
            .ok_or_else(|| BlobError::Decode {
                what: "blob listing",
                message: "blob without Name".into(),
            })?;
        let content_length = element_text(blob.text, "Content-Length").and_then(|v| v.trim().parse().ok());
        blobs.push(BlobItem { name, content_length });
        rest = after;
    }
    let next_marker = element_text(xml, "NextMarker")
        .map(unescape)
        .filter(|m| !m.is_empty());
    Ok(ListPage { blobs, next_marker })
}

fn blob_name(el: &Element<'_>) -> Result<String, BlobError> {
    let name = unescape(el.text);
    if !el.attrs.contains(r#"Encoded="true""#) {
        return Ok(name);
    }
    percent_decode_str(&name)
        .decode_utf8()
        .map(|n| n.into_owned())
        .map_err(|e| BlobError::Decode {
            what: "blob listing",
            message: format!("encoded name {:?}: {}", name, e),
        })
}

struct Element<'a> {
    attrs: &'a str,
    text: &'a str,
}

/// First `<tag ...>...</tag>` (or `<tag/>`) in `s`, and the text after it.
fn next_element<'a>(s: &'a str, tag: &str) -> Option<(Element<'a>, &'a str)> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut from = 0;
    loop {
        let name_end = from + s[from..].find(&open)? + open.len();
        let head_len = s[name_end..].find('>')?;
        let head = &s[name_end..name_end + head_len];
        let body = name_end + head_len + 1;
        // `<Blob` also prefixes `<Blobs>`.
        if head.starts_with(|c: char| !c.is_whitespace() && c != '/') {
            from = name_end;
            continue;
        }
        if let Some(attrs) = head.strip_suffix('/') {
            let el = Element {
                attrs: attrs.trim(),
                text: "",
            };
            return Some((el, &s[body..]));
        }
        let len = s[body..].find(&close)?;
        let el = Element {
            attrs: head.trim(),
            text: &s[body..body + len],
        };
        return Some((el, &s[body + len + close.len()..]));
    }
}

fn element_text<'a>(s: &'a str, tag: &str) -> Option<&'a str> {
    next_element(s, tag).map(|(el, _)| el.text)
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
