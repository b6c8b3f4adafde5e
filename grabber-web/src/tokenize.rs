//! Runs the html5ever tokenizer on the blocking pool.
//!
//! The tokenizer is built on non-atomic tendrils and cannot cross threads,
//! so it lives on a `spawn_blocking` task and the async side talks to it
//! over channels. Feeding is lock-step: every chunk is answered before the
//! next one is read off the network, so the body can still be dropped the
//! moment the element closes.

use crate::extract::{ElementExtractor, TokenDriver};
use html5ever::tendril::StrTendril;
use html5ever::tokenizer::{BufferQueue, Tokenizer, TokenizerOpts};
use tokio::sync::mpsc;

/// Answer to one fed chunk, or to the end of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    Pending,
    Found(String),
    Missing,
}

/// Handle to a tokenizer searching for one tag. Must be created inside a
/// tokio runtime.
pub(crate) struct TokenizerTask {
    chunks: Option<mpsc::Sender<String>>,
    steps: mpsc::Receiver<Step>,
}

impl TokenizerTask {
    pub(crate) fn spawn(tag: &str) -> Self {
        let (chunks, mut input) = mpsc::channel::<String>(1);
        let (output, steps) = mpsc::channel::<Step>(1);
        let tag = tag.to_owned();
        // Detached: dropping the handle closes both channels and the task ends.
        drop(tokio::task::spawn_blocking(move || {
            run(tag, &mut input, &output)
        }));
        Self {
            chunks: Some(chunks),
            steps,
        }
    }

    /// Feed one decoded chunk and wait for the tokenizer to consume it.
    pub(crate) async fn feed(&mut self, chunk: String) -> Step {
        let Some(chunks) = self.chunks.as_ref() else {
            return Step::Missing;
        };
        if chunks.send(chunk).await.is_err() {
            return Step::Missing;
        }
        self.steps.recv().await.unwrap_or(Step::Missing)
    }

    /// Signal end of input and collect the final answer.
    pub(crate) async fn finish(mut self) -> Option<String> {
        self.chunks = None;
        match self.steps.recv().await {
            Some(Step::Found(text)) => Some(text),
            _ => None,
        }
    }
}

fn run(tag: String, input: &mut mpsc::Receiver<String>, output: &mpsc::Sender<Step>) {
    let mut tokenizer = Tokenizer::new(
        TokenDriver::new(ElementExtractor::new(tag)),
        TokenizerOpts::default(),
    );
    let mut queue = BufferQueue::default();

    while let Some(chunk) = input.blocking_recv() {
        queue.push_back(StrTendril::from(chunk));
        let _ = tokenizer.feed(&mut queue);
        if let Some(found) = tokenizer.sink.take_outcome() {
            let _ = output.blocking_send(Step::Found(found));
            return;
        }
        if output.blocking_send(Step::Pending).is_err() {
            return;
        }
    }

    // Let the tokenizer flush a close tag that arrived in the final bytes.
    tokenizer.end();
    let last = tokenizer
        .sink
        .take_outcome()
        .map_or(Step::Missing, Step::Found);
    let _ = output.blocking_send(last);
}
