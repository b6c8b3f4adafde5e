//! Page titles for display: fetched, cleaned up, and bounded in length.

use crate::error::GrabError;
use crate::grabber::ElementGrabber;
use grabber_common::{FetchConfig, TitleConfig};
use regex::Regex;
use std::collections::VecDeque;
use std::sync::LazyLock;

/// Joins the sampled front and back of a shortened title.
pub const ELLIPSIS_SEPARATOR: &str = " \u{2026} ";

/// Word/non-word runs longer than this are cut into [`SUB_CHUNK`] pieces.
const LONG_CHUNK: usize = 20;
const SUB_CHUNK: usize = 10;
/// Front chunks taken per back chunk while sampling.
const FRONT_PER_BACK: usize = 3;

#[allow(clippy::expect_used)]
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("valid regex"));

/// Fetches `<title>` and turns it into a bounded display string.
#[derive(Clone, Debug)]
pub struct TitleFetcher {
    grabber: ElementGrabber,
    config: TitleConfig,
}

impl TitleFetcher {
    pub fn new(fetch: FetchConfig, config: TitleConfig) -> Result<Self, GrabError> {
        Self::with_grabber(ElementGrabber::new("title", fetch)?, config)
    }

    /// Use a preconfigured grabber; its tag should be `title`.
    pub fn with_grabber(grabber: ElementGrabber, config: TitleConfig) -> Result<Self, GrabError> {
        config.validate()?;
        Ok(Self { grabber, config })
    }

    pub fn config(&self) -> &TitleConfig {
        &self.config
    }

    /// Display title for `url`, or `None` when there is no useful one.
    pub async fn fetch(&self, url: &str) -> Option<String> {
        let raw = self.grabber.from_url(url).await?;
        let title = self.sanitize_and_shorten(&raw);

        if title.is_empty() {
            tracing::debug!(url, "title.empty");
            return None;
        }
        if self.config.reject_if_derivable_from_url && is_derivable_from_url(&title, url) {
            tracing::debug!(url, title = %title, "title.rejected.derivable_from_url");
            return None;
        }
        Some(title)
    }

    /// ```
    /// use grabber_common::{FetchConfig, TitleConfig};
    /// use grabber_web::TitleFetcher;
    ///
    /// let fetcher = TitleFetcher::new(FetchConfig::default(), TitleConfig::default()).unwrap();
    /// assert_eq!(fetcher.sanitize_and_shorten("  Hello\n\tworld  "), "Hello world");
    /// ```
    pub fn sanitize_and_shorten(&self, text: &str) -> String {
        shorten(&sanitize(text), self.config.target, self.config.max)
    }
}

/// Single-line form of `text`: newlines and tabs become spaces, other
/// control characters are dropped, whitespace runs collapse, ends trimmed.
pub fn sanitize(text: &str) -> String {
    let flattened: String = text
        .chars()
        .filter_map(|c| match c {
            '\n' | '\t' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();
    WHITESPACE_RUN
        .replace_all(&flattened, " ")
        .trim()
        .to_string()
}

/// Shorten `text` to at most `max` characters.
///
/// Text shorter than `max` is returned unchanged. Otherwise chunks are
/// sampled three from the front for every one from the back until `target`
/// characters have been collected, and the two halves are joined with
/// [`ELLIPSIS_SEPARATOR`].
///
/// ```
/// use grabber_web::title::shorten;
///
/// let long = "A".repeat(200);
/// let short = shorten(&long, 80, 120);
/// assert_eq!(short, format!("{} \u{2026} {}", "A".repeat(60), "A".repeat(20)));
/// ```
pub fn shorten(text: &str, target: usize, max: usize) -> String {
    if text.chars().count() < max {
        return text.to_owned();
    }

    let mut chunks = split_chunks(text);
    let mut front: Vec<&str> = Vec::new();
    let mut back: VecDeque<&str> = VecDeque::new();
    let mut len = 0;

    while len < target && !chunks.is_empty() {
        for _ in 0..FRONT_PER_BACK {
            let Some(chunk) = chunks.pop_front() else {
                break;
            };
            len += chunk.chars().count();
            front.push(chunk);
        }
        if let Some(chunk) = chunks.pop_back() {
            len += chunk.chars().count();
            back.push_front(chunk);
        }
    }

    let front = front.concat();
    let back: String = back.into_iter().collect();
    let joined = format!(
        "{}{ELLIPSIS_SEPARATOR}{}",
        front.trim_end(),
        back.trim_start()
    );
    let bounded: String = joined.chars().take(max).collect();
    bounded.trim_end().to_string()
}

/// Whether every word of `title` already appears in `url`.
///
/// ```
/// use grabber_web::title::is_derivable_from_url;
///
/// assert!(is_derivable_from_url("Example.com", "http://example.com"));
/// assert!(!is_derivable_from_url("Example Domain", "http://example.com"));
/// ```
pub fn is_derivable_from_url(title: &str, url: &str) -> bool {
    let title = title.to_lowercase();
    let url = url.to_lowercase();
    if title == url {
        return true;
    }
    let mut words = title
        .split(|c: char| !is_word_char(c))
        .filter(|w| !w.is_empty())
        .peekable();
    words.peek().is_some() && words.all(|w| url.contains(w))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Split at word boundaries, cutting overlong runs into fixed pieces.
fn split_chunks(text: &str) -> VecDeque<&str> {
    let mut out = VecDeque::new();
    let mut start = 0;
    let mut prev: Option<bool> = None;
    for (i, c) in text.char_indices() {
        let word = is_word_char(c);
        if prev.is_some_and(|p| p != word) {
            push_chunk(&mut out, &text[start..i]);
            start = i;
        }
        prev = Some(word);
    }
    if start < text.len() {
        push_chunk(&mut out, &text[start..]);
    }
    out
}

fn push_chunk<'a>(out: &mut VecDeque<&'a str>, chunk: &'a str) {
    if chunk.chars().count() <= LONG_CHUNK {
        out.push_back(chunk);
        return;
    }
    let mut rest = chunk;
    while !rest.is_empty() {
        let cut = rest
            .char_indices()
            .nth(SUB_CHUNK)
            .map_or(rest.len(), |(i, _)| i);
        let (head, tail) = rest.split_at(cut);
        out.push_back(head);
        rest = tail;
    }
}
