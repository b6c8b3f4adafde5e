use crate::decode::StreamingDecoder;
use crate::encoding::charset_from_content_type;
use crate::error::GrabError;
use crate::tokenize::{Step, TokenizerTask};
use grabber_common::FetchConfig;
use grabber_http::HttpClient;
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use std::sync::LazyLock;
use url::Url;

/// Media types worth tokenizing: any `text/*`, XML and XHTML.
#[allow(clippy::expect_used)]
static ALLOWED_CONTENT_TYPES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\A(?:text/|application/(?:xml|xhtml\+xml)\s*(?:;|\z))").expect("valid regex")
});

/// Fetches a page and returns the text of the first complete `<tag>` element.
///
/// The body is streamed: decoding and tokenizing stop, and the connection is
/// dropped, as soon as the element closes or `read_limit_bytes` is exceeded.
/// Tokenizing runs on tokio's blocking pool, so fetches must be awaited
/// inside a tokio runtime; the returned futures are `Send`.
#[derive(Clone, Debug)]
pub struct ElementGrabber {
    tag: String,
    http: HttpClient,
    config: FetchConfig,
}

impl ElementGrabber {
    /// Build a grabber with its own HTTP client.
    ///
    /// ```
    /// use grabber_common::FetchConfig;
    /// use grabber_web::ElementGrabber;
    ///
    /// let grabber = ElementGrabber::new("h1", FetchConfig::default()).unwrap();
    /// assert_eq!(grabber.tag(), "h1");
    /// assert_eq!(grabber.read_limit(), 131072);
    /// ```
    pub fn new(tag: impl Into<String>, config: FetchConfig) -> Result<Self, GrabError> {
        config.validate()?;
        let http = HttpClient::from_config(&config)?;
        Ok(Self::with_client(tag, http, config))
    }

    /// Build a grabber on top of an existing (shared) client.
    pub fn with_client(tag: impl Into<String>, http: HttpClient, config: FetchConfig) -> Self {
        Self {
            tag: tag.into(),
            http,
            config,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn read_limit(&self) -> u64 {
        self.config.read_limit_bytes
    }

    /// Text of the element, or `None` for any failure.
    ///
    /// Failures are logged: transport problems at `warn`, pages without a
    /// usable element at `debug`.
    pub async fn from_url(&self, url: &str) -> Option<String> {
        match self.extract(url).await {
            Ok(text) => Some(text),
            Err(err) if err.is_transport() => {
                tracing::warn!(url, tag = %self.tag, error = %err, "grab.failed");
                None
            }
            Err(err) => {
                tracing::debug!(url, tag = %self.tag, error = %err, "grab.no_element");
                None
            }
        }
    }

    /// Text of the element, or the reason it could not be obtained.
    pub async fn extract(&self, url: &str) -> Result<String, GrabError> {
        let url = parse_http_url(url)?;
        tracing::debug!(url = %url, tag = %self.tag, "grab.start");

        let response = self
            .http
            .get_following_redirects(&url, self.config.redirect_limit)
            .await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_owned();
        if !ALLOWED_CONTENT_TYPES.is_match(&content_type) {
            // Dropping the response closes it without reading the body.
            return Err(GrabError::UnsupportedContentType(content_type));
        }

        let body = Box::pin(response.bytes_stream());
        let mut decoder = StreamingDecoder::new(body, self.config.read_limit_bytes)
            .with_header_charset(charset_from_content_type(&content_type));
        let mut tokenizer = TokenizerTask::spawn(&self.tag);

        while let Some(text) = decoder.next_chunk().await? {
            if let Step::Found(found) = tokenizer.feed(text).await {
                decoder.close();
                tracing::debug!(
                    url = %url,
                    tag = %self.tag,
                    bytes_read = decoder.bytes_read(),
                    len = found.len(),
                    "grab.element.found"
                );
                return Ok(found);
            }
        }
        decoder.close();

        if decoder.limit_reached() {
            tracing::debug!(
                url = %url,
                tag = %self.tag,
                bytes_read = decoder.bytes_read(),
                "grab.limit_reached"
            );
            return Err(GrabError::LimitExceeded {
                tag: self.tag.clone(),
                limit: self.config.read_limit_bytes,
            });
        }

        tokenizer
            .finish()
            .await
            .ok_or_else(|| GrabError::ElementNotFound {
                tag: self.tag.clone(),
            })
    }
}

/// Parse an absolute http(s) URL.
///
/// ```
/// use grabber_web::parse_http_url;
///
/// assert!(parse_http_url("https://example.com/a").is_ok());
/// assert!(parse_http_url("ftp://example.com/a").is_err());
/// assert!(parse_http_url("example.com").is_err());
/// ```
pub fn parse_http_url(raw: &str) -> Result<Url, GrabError> {
    let invalid = |reason: String| GrabError::InvalidUrl {
        url: raw.to_owned(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        "http" | "https" => Err(invalid("missing host".into())),
        other => Err(invalid(format!("unsupported scheme {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_allow_list() {
        for ok in [
            "text/html",
            "text/html; charset=utf-8",
            "TEXT/PLAIN",
            "application/xml",
            "application/xhtml+xml; charset=utf-8",
        ] {
            assert!(ALLOWED_CONTENT_TYPES.is_match(ok), "{ok}");
        }
        for bad in [
            "",
            "application/pdf",
            "application/json",
            "image/png",
            "application/xml-dtd",
            "x-text/html",
        ] {
            assert!(!ALLOWED_CONTENT_TYPES.is_match(bad), "{bad}");
        }
    }

    #[test]
    fn url_validation() {
        assert!(matches!(
            parse_http_url("mailto:someone@example.com"),
            Err(GrabError::InvalidUrl { .. })
        ));
        assert!(matches!(
            parse_http_url("not a url"),
            Err(GrabError::InvalidUrl { .. })
        ));
        assert_eq!(
            parse_http_url(" http://example.com ").unwrap().as_str(),
            "http://example.com/"
        );
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn fetch_futures_are_send() {
        let grabber = ElementGrabber::new("title", FetchConfig::default()).unwrap();
        let extract = grabber.extract("http://example.com/");
        assert_send(&extract);
        let from_url = grabber.from_url("http://example.com/");
        assert_send(&from_url);
    }

    #[test]
    fn invalid_fetch_config_is_rejected() {
        let cfg = FetchConfig {
            read_limit_bytes: 0,
            ..FetchConfig::default()
        };
        assert!(matches!(
            ElementGrabber::new("title", cfg),
            Err(GrabError::Config(_))
        ));
    }
}
