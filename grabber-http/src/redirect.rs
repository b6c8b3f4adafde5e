use crate::HttpError;
use reqwest::StatusCode;
use std::collections::HashSet;
use url::Url;

/// Statuses that carry a `Location` we are willing to follow.
pub fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// Resolve a `Location` header value against the URL that produced it.
///
/// Absolute-path locations (`/next`) keep the current scheme, host and port.
///
/// ```
/// use grabber_http::resolve_location;
/// use url::Url;
///
/// let base = Url::parse("http://example.com:8080/a/b").unwrap();
/// let next = resolve_location(&base, "/c").unwrap();
/// assert_eq!(next.as_str(), "http://example.com:8080/c");
/// ```
pub fn resolve_location(current: &Url, location: &str) -> Result<Url, HttpError> {
    let target = current.join(location).map_err(|e| HttpError::Url {
        url: location.to_owned(),
        reason: e.to_string(),
    })?;
    match target.scheme() {
        "http" | "https" => Ok(target),
        other => Err(HttpError::Url {
            reason: format!("redirect to unsupported scheme {other}"),
            url: target.into(),
        }),
    }
}

/// Redirect targets visited during one logical fetch.
#[derive(Debug)]
pub struct RedirectChain {
    start: Url,
    visited: HashSet<Url>,
    limit: usize,
}

impl RedirectChain {
    pub fn new(start: Url, limit: usize) -> Self {
        Self {
            start,
            visited: HashSet::new(),
            limit,
        }
    }

    /// Record the next hop.
    ///
    /// Fails on a repeated target (or a hop back to the start) and once more
    /// than `limit` distinct targets have been recorded.
    pub fn record(&mut self, target: &Url) -> Result<(), HttpError> {
        if *target == self.start || !self.visited.insert(target.clone()) {
            return Err(HttpError::RedirectLoop(target.clone()));
        }
        if self.visited.len() > self.limit {
            return Err(HttpError::TooManyRedirects { limit: self.limit });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }
}
