//! Flat, streaming element extraction on top of the html5ever tokenizer.
//!
//! No tree is built. [`TokenDriver`] forwards start tags, end tags and text
//! to an [`ElementHandler`] and remembers the first value a handler breaks
//! with; every token after that is ignored.

use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{TagKind, Token, TokenSink, TokenSinkResult};
use std::ops::ControlFlow;

/// Callbacks driven by the tokenizer, in document order.
///
/// Returning `ControlFlow::Break` ends the extraction with that value.
pub trait ElementHandler {
    type Output;

    fn on_open_tag(&mut self, name: &str) -> ControlFlow<Self::Output> {
        let _ = name;
        ControlFlow::Continue(())
    }

    fn on_close_tag(&mut self, name: &str) -> ControlFlow<Self::Output> {
        let _ = name;
        ControlFlow::Continue(())
    }

    fn on_text(&mut self, text: &str) -> ControlFlow<Self::Output> {
        let _ = text;
        ControlFlow::Continue(())
    }
}

/// Collects the text inside the first complete instance of one tag.
///
/// ```
/// use grabber_web::extract::{ElementExtractor, ElementHandler};
/// use std::ops::ControlFlow;
///
/// let mut ex = ElementExtractor::new("title");
/// let _ = ex.on_open_tag("TITLE");
/// let _ = ex.on_text("Hello");
/// assert_eq!(ex.on_close_tag("title"), ControlFlow::Break("Hello".to_string()));
/// ```
#[derive(Debug, Clone)]
pub struct ElementExtractor {
    target: String,
    depth: usize,
    buffer: Vec<String>,
}

impl ElementExtractor {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            depth: 0,
            buffer: Vec::new(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_inside(&self) -> bool {
        self.depth > 0
    }

    fn matches(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(&self.target)
    }
}

impl ElementHandler for ElementExtractor {
    type Output = String;

    fn on_open_tag(&mut self, name: &str) -> ControlFlow<String> {
        if self.matches(name) {
            self.depth += 1;
        }
        ControlFlow::Continue(())
    }

    fn on_close_tag(&mut self, name: &str) -> ControlFlow<String> {
        if !self.is_inside() || !self.matches(name) {
            return ControlFlow::Continue(());
        }
        let text = self.buffer.concat();
        self.depth -= 1;
        ControlFlow::Break(text)
    }

    fn on_text(&mut self, text: &str) -> ControlFlow<String> {
        if self.is_inside() {
            self.buffer.push(text.to_owned());
        }
        ControlFlow::Continue(())
    }
}

/// html5ever sink that feeds an [`ElementHandler`].
///
/// Besides forwarding tokens it performs the one piece of tree-builder work a
/// flat scan needs: switching the tokenizer into RCDATA/RAWTEXT/script states
/// after elements such as `<title>` and `<script>`, so that markup-looking
/// text inside them is not mistaken for tags.
pub struct TokenDriver<H: ElementHandler> {
    handler: H,
    outcome: Option<H::Output>,
}

impl<H: ElementHandler> TokenDriver<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            outcome: None,
        }
    }

    /// Whether the handler has broken out; the caller should stop feeding.
    pub fn is_done(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn take_outcome(&mut self) -> Option<H::Output> {
        self.outcome.take()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    fn record(&mut self, flow: ControlFlow<H::Output>) {
        if let ControlFlow::Break(value) = flow {
            self.outcome = Some(value);
        }
    }
}

impl<H: ElementHandler> TokenSink for TokenDriver<H> {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        if self.is_done() {
            return TokenSinkResult::Continue;
        }

        match token {
            Token::TagToken(tag) => match tag.kind {
                TagKind::StartTag => {
                    let flow = self.handler.on_open_tag(&tag.name);
                    self.record(flow);
                    if !tag.self_closing {
                        return text_state_after(&tag.name);
                    }
                }
                TagKind::EndTag => {
                    let flow = self.handler.on_close_tag(&tag.name);
                    self.record(flow);
                }
            },
            Token::CharacterTokens(text) => {
                let flow = self.handler.on_text(&text);
                self.record(flow);
            }
            Token::ParseError(err) => {
                tracing::trace!(error = %err, "extract.tokenizer.parse_error");
            }
            _ => {}
        }
        TokenSinkResult::Continue
    }
}

/// Tokenizer state the HTML tree builder would select after a start tag.
fn text_state_after(name: &str) -> TokenSinkResult<()> {
    match name {
        "title" | "textarea" => TokenSinkResult::RawData(RawKind::Rcdata),
        "style" | "xmp" | "iframe" | "noembed" | "noframes" => {
            TokenSinkResult::RawData(RawKind::Rawtext)
        }
        "script" => TokenSinkResult::RawData(RawKind::ScriptData),
        "plaintext" => TokenSinkResult::Plaintext,
        _ => TokenSinkResult::Continue,
    }
}
