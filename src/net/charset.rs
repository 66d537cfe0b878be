//! Charset detection for responses from mainland quote hosts.
//!
//! The old portals answer in a mix of UTF-8, GBK and GB2312, often with no
//! charset header at all. Detection priority: Content-Type header charset,
//! HTML `<meta>` charset, then a byte heuristic (valid UTF-8 wins; otherwise
//! enough GBK lead/trail pairs classify the buffer as GBK).

use encoding_rs::{GBK, UTF_8};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Gbk,
}

/// Minimum number of GBK byte pairs before the heuristic trusts GBK.
const GBK_PAIR_THRESHOLD: usize = 10;

/// How far into the body we look for an HTML meta charset.
const META_SCAN_LIMIT: usize = 1024;

/// Classify a label from a header or meta tag. GB2312 and GB18030 are decoded
/// as GBK; the printable ranges coincide for the content these feeds carry.
fn charset_from_label(label: &str) -> Option<Charset> {
    let label = label.trim().trim_matches('"').trim_matches('\'').to_ascii_lowercase();
    match label.as_str() {
        "utf-8" | "utf8" => Some(Charset::Utf8),
        "gbk" | "gb2312" | "gb18030" | "gb-2312" => Some(Charset::Gbk),
        _ => None,
    }
}

/// Extract `charset=...` from a Content-Type header value.
fn charset_from_content_type(content_type: &str) -> Option<Charset> {
    let lower = content_type.to_ascii_lowercase();
    let idx = lower.find("charset=")?;
    let rest = &content_type[idx + "charset=".len()..];
    let end = rest.find(|c: char| c == ';' || c.is_whitespace()).unwrap_or(rest.len());
    charset_from_label(&rest[..end])
}

/// Look for `<meta charset=...>` or the http-equiv form near the top of an
/// HTML body. The scan is ASCII-only and never touches multi-byte content.
fn charset_from_meta(body: &[u8]) -> Option<Charset> {
    let head = &body[..body.len().min(META_SCAN_LIMIT)];
    let lower: Vec<u8> = head.iter().map(|b| b.to_ascii_lowercase()).collect();
    let needle = b"charset=";
    let mut i = 0;
    while i + needle.len() <= lower.len() {
        if &lower[i..i + needle.len()] == needle {
            let rest = &head[i + needle.len()..];
            let end = rest
                .iter()
                .position(|&b| matches!(b, b'"' | b'\'' | b'>' | b';' | b' ' | b'/'))
                .unwrap_or(rest.len().min(16));
            if let Ok(label) = std::str::from_utf8(&rest[..end]) {
                if let Some(cs) = charset_from_label(label) {
                    return Some(cs);
                }
            }
        }
        i += 1;
    }
    None
}

/// Count GBK two-byte sequences: lead 0x81–0xFE followed by trail 0x40–0xFE.
fn gbk_pair_count(body: &[u8]) -> usize {
    let mut count = 0;
    let mut i = 0;
    while i + 1 < body.len() {
        let b = body[i];
        if b < 0x80 {
            i += 1;
            continue;
        }
        let next = body[i + 1];
        if (0x81..=0xFE).contains(&b) && (0x40..=0xFE).contains(&next) {
            count += 1;
            i += 2;
        } else {
            i += 1;
        }
    }
    count
}

/// Detect the charset of a response body.
pub fn detect(content_type: Option<&str>, body: &[u8]) -> Charset {
    if let Some(ct) = content_type {
        if let Some(cs) = charset_from_content_type(ct) {
            return cs;
        }
    }
    if let Some(cs) = charset_from_meta(body) {
        return cs;
    }
    if std::str::from_utf8(body).is_ok() {
        return Charset::Utf8;
    }
    if gbk_pair_count(body) >= GBK_PAIR_THRESHOLD {
        return Charset::Gbk;
    }
    Charset::Utf8
}

/// Decode `body` under `charset`, replacing malformed sequences.
pub fn decode(body: &[u8], charset: Charset) -> String {
    let encoding = match charset {
        Charset::Utf8 => UTF_8,
        Charset::Gbk => GBK,
    };
    let (text, _, _) = encoding.decode(body);
    text.into_owned()
}

/// Detect and decode in one step.
pub fn decode_auto(content_type: Option<&str>, body: &[u8]) -> String {
    decode(body, detect(content_type, body))
}
