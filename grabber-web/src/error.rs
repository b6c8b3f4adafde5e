use grabber_common::SettingsError;
use grabber_http::HttpError;

/// Why an element could not be grabbed.
///
/// Only [`crate::ElementGrabber::extract`] exposes these; the `Option`
/// returning entry points fold every variant into `None`.
#[derive(thiserror::Error, Debug)]
pub enum GrabError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("transport error: {0}")]
    Transport(HttpError),

    #[error("more than {limit} redirects")]
    TooManyRedirects { limit: usize },

    #[error("redirect loop at {0}")]
    RedirectLoop(String),

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("<{tag}> not found before end of document")]
    ElementNotFound { tag: String },

    #[error("<{tag}> not closed within {limit} bytes")]
    LimitExceeded { tag: String, limit: u64 },

    #[error("configuration error: {0}")]
    Config(#[from] SettingsError),
}

impl GrabError {
    /// Failures of the network or the remote server, as opposed to pages
    /// that simply have no usable element.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<HttpError> for GrabError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::TooManyRedirects { limit } => Self::TooManyRedirects { limit },
            HttpError::RedirectLoop(url) => Self::RedirectLoop(url.to_string()),
            HttpError::Url { url, reason } => Self::InvalidUrl { url, reason },
            other => Self::Transport(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_errors_keep_their_kind() {
        let err: GrabError = HttpError::TooManyRedirects { limit: 6 }.into();
        assert!(matches!(err, GrabError::TooManyRedirects { limit: 6 }));
        assert!(!err.is_transport());
    }

    #[test]
    fn network_errors_are_transport() {
        let err: GrabError = HttpError::Network("connection refused".into()).into();
        assert!(err.is_transport());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn bad_redirect_target_keeps_its_url() {
        let err: GrabError = HttpError::Url {
            url: "gopher://example.com/".into(),
            reason: "redirect to unsupported scheme gopher".into(),
        }
        .into();
        assert!(matches!(err, GrabError::InvalidUrl { ref url, .. } if url == "gopher://example.com/"));
        assert_eq!(
            err.to_string(),
            "invalid URL gopher://example.com/: redirect to unsupported scheme gopher"
        );
        assert!(!err.is_transport());
    }
}
