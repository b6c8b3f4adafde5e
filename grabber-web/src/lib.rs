//! Bounded page fetching and element extraction.
//!
//! - [`ElementGrabber`]: fetch a URL (following redirects), stream the body
//!   through an incremental decoder and the html5ever tokenizer, and stop as
//!   soon as the target element closes or the byte budget runs out
//! - [`TitleFetcher`]: `<title>` on top of the grabber, sanitized and
//!   shortened for display
//! - [`decode`], [`encoding`], [`mojibake`], [`extract`]: the streaming
//!   building blocks
//!
//! Public entry points return `Option`; [`ElementGrabber::extract`] keeps the
//! [`GrabError`] for callers that want to know why nothing was found.
//!
//! The tokenizer runs on tokio's blocking pool, so fetches need a tokio
//! runtime; the futures are `Send` and can be handed to `tokio::spawn`.

pub mod decode;
pub mod encoding;
mod error;
pub mod extract;
mod grabber;
pub mod mojibake;
pub mod title;
mod tokenize;

pub use error::GrabError;
pub use grabber::{ElementGrabber, parse_http_url};
pub use title::TitleFetcher;
