//! Incremental body decoding with a byte budget.
//!
//! [`StreamingDecoder`] pulls raw blocks from a response body, fixes the
//! character encoding from the first non-empty block, and yields UTF-8 text
//! one block at a time. Malformed input is replaced, never reported, and
//! double-encoded sequences are repaired with [`mojibake::recover`]. A
//! sequence cut at a block edge is held back until the next block.
//!
//! The byte budget is checked after each block has been decoded and
//! handed out: the block that crosses the limit is still yielded, then the
//! body is dropped and the sequence ends. At most `read_limit` plus one
//! block is ever pulled off the network.

use crate::encoding::{self, Detection};
use crate::mojibake;
use bytes::Bytes;
use encoding_rs::{CoderResult, Decoder};
use futures::{Stream, StreamExt};
use grabber_http::HttpError;

/// Largest block handed to the decoder in one step (32 KiB).
pub const BLOCK_SIZE: usize = 32 * 1024;

pub struct StreamingDecoder<S> {
    body: Option<S>,
    /// Tail of a transport chunk larger than [`BLOCK_SIZE`].
    pending: Bytes,
    read_limit: u64,
    bytes_read: u64,
    header_charset: Option<String>,
    detection: Option<Detection>,
    decoder: Option<Decoder>,
    /// Start of a possibly double-encoded sequence cut at the block edge.
    carry: String,
    replaced: bool,
    limit_reached: bool,
    done: bool,
}

impl<S, E> StreamingDecoder<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<HttpError>,
{
    pub fn new(body: S, read_limit: u64) -> Self {
        Self {
            body: Some(body),
            pending: Bytes::new(),
            read_limit,
            bytes_read: 0,
            header_charset: None,
            detection: None,
            decoder: None,
            carry: String::new(),
            replaced: false,
            limit_reached: false,
            done: false,
        }
    }

    /// Charset announced by the response headers; used as a detection hint.
    pub fn with_header_charset(mut self, charset: Option<&str>) -> Self {
        self.header_charset = charset.map(str::to_owned);
        self
    }

    /// Next decoded chunk, or `None` once the body ended or the budget ran out.
    ///
    /// Transport errors while reading the body are returned as-is and also
    /// close the body.
    pub async fn next_chunk(&mut self) -> Result<Option<String>, HttpError> {
        if self.done {
            return Ok(None);
        }

        loop {
            let Some(block) = self.next_block().await? else {
                return Ok(self.finish());
            };
            if block.is_empty() {
                continue;
            }

            self.bytes_read += block.len() as u64;
            let detection = *self.detection.get_or_insert_with(|| {
                let found = encoding::detect(&block, self.header_charset.as_deref());
                tracing::debug!(
                    encoding = found.encoding.name(),
                    confidence = found.confidence,
                    source = ?found.source,
                    "decode.encoding.detected"
                );
                found
            });
            let decoder = self
                .decoder
                .get_or_insert_with(|| detection.encoding.new_decoder());
            let (decoded, replaced) = decode_block(decoder, &block, false);
            self.note_replacements(replaced);

            let mut text = std::mem::take(&mut self.carry);
            text.push_str(&decoded);

            if self.bytes_read > self.read_limit {
                tracing::debug!(
                    bytes_read = self.bytes_read,
                    read_limit = self.read_limit,
                    "decode.limit_reached"
                );
                self.limit_reached = true;
                self.done = true;
                self.close();
                let text = mojibake::recover(&text).into_owned();
                return Ok((!text.is_empty()).then_some(text));
            }

            if let Some(at) = mojibake::incomplete_tail(&text) {
                self.carry = text.split_off(at);
            }
            if text.is_empty() {
                continue;
            }
            return Ok(Some(mojibake::recover(&text).into_owned()));
        }
    }

    async fn next_block(&mut self) -> Result<Option<Bytes>, HttpError> {
        if !self.pending.is_empty() {
            let rest = self.pending.split_off(self.pending.len().min(BLOCK_SIZE));
            return Ok(Some(std::mem::replace(&mut self.pending, rest)));
        }

        let Some(body) = self.body.as_mut() else {
            return Ok(None);
        };
        match body.next().await {
            Some(Ok(mut chunk)) => {
                if chunk.len() > BLOCK_SIZE {
                    self.pending = chunk.split_off(BLOCK_SIZE);
                }
                Ok(Some(chunk))
            }
            Some(Err(err)) => {
                self.done = true;
                self.close();
                Err(err.into())
            }
            None => {
                self.close();
                Ok(None)
            }
        }
    }

    /// Flush whatever the decoder still buffers once the body ended.
    fn finish(&mut self) -> Option<String> {
        self.done = true;
        let decoder = self.decoder.as_mut()?;
        let (flushed, replaced) = decode_block(decoder, &[], true);
        self.note_replacements(replaced);
        let mut tail = std::mem::take(&mut self.carry);
        tail.push_str(&flushed);
        let tail = mojibake::recover(&tail).into_owned();
        (!tail.is_empty()).then_some(tail)
    }
}

impl<S> StreamingDecoder<S> {
    /// Drop the body, releasing the underlying connection.
    pub fn close(&mut self) {
        self.body = None;
        self.pending = Bytes::new();
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn limit_reached(&self) -> bool {
        self.limit_reached
    }

    pub fn detection(&self) -> Option<Detection> {
        self.detection
    }

    pub fn is_closed(&self) -> bool {
        self.body.is_none()
    }

    fn note_replacements(&mut self, replaced: bool) {
        if replaced && !self.replaced {
            self.replaced = true;
            tracing::debug!(
                encoding = self.detection.map(|d| d.encoding.name()),
                "decode.malformed_input_replaced"
            );
        }
    }
}

fn decode_block(decoder: &mut Decoder, mut input: &[u8], last: bool) -> (String, bool) {
    let mut out = String::with_capacity(
        decoder
            .max_utf8_buffer_length(input.len())
            .unwrap_or(input.len()),
    );
    let mut any_replaced = false;
    loop {
        let (result, read, replaced) = decoder.decode_to_string(input, &mut out, last);
        any_replaced |= replaced;
        input = &input[read..];
        match result {
            CoderResult::InputEmpty => return (out, any_replaced),
            CoderResult::OutputFull => {
                let extra = decoder
                    .max_utf8_buffer_length(input.len())
                    .unwrap_or(input.len() * 3);
                out.reserve(extra.max(16));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::DetectionSource;
    use futures::stream;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn body(blocks: Vec<&'static [u8]>) -> impl Stream<Item = Result<Bytes, HttpError>> + Unpin {
        stream::iter(blocks.into_iter().map(|b| Ok(Bytes::from_static(b))))
    }

    async fn collect<S>(decoder: &mut StreamingDecoder<S>) -> String
    where
        S: Stream<Item = Result<Bytes, HttpError>> + Unpin,
    {
        let mut all = String::new();
        while let Some(chunk) = decoder.next_chunk().await.unwrap() {
            all.push_str(&chunk);
        }
        all
    }

    #[tokio::test]
    async fn utf8_sequence_split_across_blocks() {
        let mut decoder =
            StreamingDecoder::new(body(vec![b"<title>caf\xC3", b"\xA9</title>"]), 1024);
        assert_eq!(collect(&mut decoder).await, "<title>café</title>");
        assert!(!decoder.limit_reached());
        assert!(decoder.is_closed());
    }

    #[tokio::test]
    async fn encoding_is_fixed_by_first_block() {
        // Second block is windows-1252 on its own; it must still be decoded
        // as the UTF-8 the first block settled on.
        let mut decoder = StreamingDecoder::new(body(vec![b"plain ", b"caf\xE9"]), 1024);
        assert_eq!(collect(&mut decoder).await, "plain caf\u{FFFD}");
        assert_eq!(
            decoder.detection().unwrap().source,
            DetectionSource::Utf8Probe
        );
    }

    #[tokio::test]
    async fn double_encoded_text_is_recovered() {
        let mut decoder = StreamingDecoder::new(
            body(vec![b"<title>Caf\xC3\x83\xC2\xA9 cr\xC3\x83\xC2\xA8me</title>"]),
            1024,
        );
        assert_eq!(collect(&mut decoder).await, "<title>Café crème</title>");
    }

    #[tokio::test]
    async fn utf8_read_as_windows_1252_is_recovered() {
        let mut decoder = StreamingDecoder::new(body(vec![b"na\xC3\xAFve"]), 1024)
            .with_header_charset(Some("iso-8859-1"));
        assert_eq!(collect(&mut decoder).await, "naïve");
    }

    #[tokio::test]
    async fn recovery_spans_block_edges() {
        let mut decoder =
            StreamingDecoder::new(body(vec![b"caf\xC3\x83", b"\xC2\xA9!"]), 1024);
        assert_eq!(decoder.next_chunk().await.unwrap().as_deref(), Some("caf"));
        assert_eq!(decoder.next_chunk().await.unwrap().as_deref(), Some("é!"));
        assert_eq!(decoder.next_chunk().await.unwrap(), None);
    }

    #[tokio::test]
    async fn held_back_tail_is_flushed_at_the_end() {
        let mut decoder = StreamingDecoder::new(body(vec![b"caf\xC3\xA9"]), 1024);
        assert_eq!(collect(&mut decoder).await, "café");
    }

    #[tokio::test]
    async fn header_charset_is_used_as_hint() {
        let mut decoder = StreamingDecoder::new(body(vec![b"\xCF\xF0\xE8\xE2\xE5\xF2"]), 1024)
            .with_header_charset(Some("windows-1251"));
        assert_eq!(collect(&mut decoder).await, "Привет");
    }

    #[tokio::test]
    async fn bom_is_stripped() {
        let mut decoder = StreamingDecoder::new(body(vec![b"\xEF\xBB\xBFhi"]), 1024);
        assert_eq!(collect(&mut decoder).await, "hi");
    }

    #[tokio::test]
    async fn malformed_bytes_are_replaced() {
        let mut decoder =
            StreamingDecoder::new(body(vec![b"<meta charset=utf-8>ok\xFF\xFEok"]), 1024);
        let text = collect(&mut decoder).await;
        assert!(text.ends_with("ok\u{FFFD}\u{FFFD}ok"));
    }

    #[tokio::test]
    async fn empty_blocks_are_skipped() {
        let mut decoder = StreamingDecoder::new(body(vec![b"", b"abc", b""]), 1024);
        assert_eq!(decoder.next_chunk().await.unwrap().as_deref(), Some("abc"));
        assert_eq!(decoder.next_chunk().await.unwrap(), None);
        assert_eq!(decoder.bytes_read(), 3);
    }

    #[tokio::test]
    async fn stops_one_block_past_the_limit() {
        const BLOCK: &[u8] = &[b'x'; 1000];
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let source = stream::iter((0..100).map(|_| Ok::<_, HttpError>(Bytes::from_static(BLOCK))))
            .inspect(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        let mut decoder = StreamingDecoder::new(source, 4500);
        let text = collect(&mut decoder).await;

        assert!(decoder.limit_reached());
        assert!(decoder.is_closed());
        assert_eq!(pulled.load(Ordering::SeqCst), 5);
        assert_eq!(decoder.bytes_read(), 5000);
        assert_eq!(text.len(), 5000);
        assert_eq!(decoder.next_chunk().await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_chunks_are_split_into_blocks() {
        let big = Bytes::from(vec![b'a'; BLOCK_SIZE * 2 + 10]);
        let source = stream::iter(vec![Ok::<_, HttpError>(big)]);
        let mut decoder = StreamingDecoder::new(source, u64::MAX);

        let mut sizes = Vec::new();
        while let Some(chunk) = decoder.next_chunk().await.unwrap() {
            sizes.push(chunk.len());
        }
        assert_eq!(sizes, vec![BLOCK_SIZE, BLOCK_SIZE, 10]);
    }

    #[tokio::test]
    async fn limit_applies_to_split_blocks() {
        let big = Bytes::from(vec![b'a'; BLOCK_SIZE * 4]);
        let source = stream::iter(vec![Ok::<_, HttpError>(big)]);
        let mut decoder = StreamingDecoder::new(source, BLOCK_SIZE as u64);

        collect(&mut decoder).await;
        assert!(decoder.limit_reached());
        assert_eq!(decoder.bytes_read(), 2 * BLOCK_SIZE as u64);
    }

    #[tokio::test]
    async fn body_error_is_reported_and_closes() {
        let source = stream::iter(vec![
            Ok(Bytes::from_static(b"<title>")),
            Err(HttpError::Network("reset by peer".into())),
        ]);
        let mut decoder = StreamingDecoder::new(source, 1024);
        assert!(decoder.next_chunk().await.unwrap().is_some());
        assert!(matches!(
            decoder.next_chunk().await,
            Err(HttpError::Network(_))
        ));
        assert!(decoder.is_closed());
        assert_eq!(decoder.next_chunk().await.unwrap(), None);
    }
}
