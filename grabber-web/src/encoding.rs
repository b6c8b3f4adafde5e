//! Character encoding detection for the first block of a response body.
//!
//! Detection runs once per response. Sources are consulted in order of
//! trust: byte order mark, the `charset` parameter of the `Content-Type`
//! header, `<meta charset>` / `<meta http-equiv>` declarations, and finally a
//! UTF-8 validity probe with a windows-1252 fallback.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use regex::Regex;
use std::sync::LazyLock;

/// Match `<meta charset="...">`
#[allow(clippy::expect_used)]
static CHARSET_META_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([^"'\s>;/]+)"#).expect("valid regex")
});

/// Match `<meta http-equiv="Content-Type" content="...; charset=...">`
#[allow(clippy::expect_used)]
static CONTENT_TYPE_CHARSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+http-equiv\s*=\s*["']?content-type["']?[^>]+content\s*=\s*["']?[^"'>]*;\s*charset\s*=\s*([^"'\s>;]+)"#).expect("valid regex")
});

/// Meta declarations are only honoured near the start of the document.
const META_SCAN_BYTES: usize = 1024;

/// Where a detected encoding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionSource {
    Bom,
    Header,
    Meta,
    Utf8Probe,
    Fallback,
}

/// Result of encoding detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub encoding: &'static Encoding,
    /// Rough trust in the result, 0..=100.
    pub confidence: u8,
    pub source: DetectionSource,
}

impl Detection {
    fn new(encoding: &'static Encoding, source: DetectionSource) -> Self {
        let confidence = match source {
            DetectionSource::Bom => 100,
            DetectionSource::Header => 90,
            DetectionSource::Meta => 80,
            DetectionSource::Utf8Probe => 60,
            DetectionSource::Fallback => 10,
        };
        Self {
            encoding,
            confidence,
            source,
        }
    }
}

/// Detect the encoding of a document from its first block.
///
/// ```
/// use grabber_web::encoding::{detect, DetectionSource};
///
/// let found = detect(b"<meta charset=\"iso-8859-2\"><title>x</title>", None);
/// assert_eq!(found.encoding.name(), "ISO-8859-2");
/// assert_eq!(found.source, DetectionSource::Meta);
/// ```
pub fn detect(first_block: &[u8], header_charset: Option<&str>) -> Detection {
    if let Some((encoding, _bom_len)) = Encoding::for_bom(first_block) {
        return Detection::new(encoding, DetectionSource::Bom);
    }

    if let Some(encoding) = header_charset.and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        return Detection::new(encoding, DetectionSource::Header);
    }

    if let Some(encoding) = meta_charset(first_block) {
        return Detection::new(encoding, DetectionSource::Meta);
    }

    if looks_like_utf8(first_block) {
        Detection::new(UTF_8, DetectionSource::Utf8Probe)
    } else {
        Detection::new(WINDOWS_1252, DetectionSource::Fallback)
    }
}

/// Pull the `charset` parameter out of a `Content-Type` header value.
///
/// ```
/// use grabber_web::encoding::charset_from_content_type;
///
/// assert_eq!(
///     charset_from_content_type("text/html; Charset=\"Shift_JIS\""),
///     Some("Shift_JIS")
/// );
/// assert_eq!(charset_from_content_type("text/html"), None);
/// ```
pub fn charset_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        (!value.is_empty()).then_some(value)
    })
}

fn meta_charset(block: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&block[..block.len().min(META_SCAN_BYTES)]);
    [&*CHARSET_META_RE, &*CONTENT_TYPE_CHARSET_RE]
        .into_iter()
        .filter_map(|re| re.captures(&head))
        .filter_map(|c| c.get(1))
        .find_map(|m| Encoding::for_label(m.as_str().as_bytes()))
        // A page cannot really be UTF-16 if its meta tag parsed as ASCII.
        .map(|enc| {
            if enc == encoding_rs::UTF_16LE || enc == encoding_rs::UTF_16BE {
                UTF_8
            } else {
                enc
            }
        })
}

/// Valid UTF-8, tolerating a multi-byte sequence cut off at the block end.
fn looks_like_utf8(block: &[u8]) -> bool {
    match std::str::from_utf8(block) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}
