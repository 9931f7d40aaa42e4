//! Chunked delivery of a finished turn

use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::Stream;
use tokio::sync::mpsc;

/// One item of a turn's output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnChunk {
    Text(String),
    /// Completion marker for a persisted turn
    Done { turn_id: String, created_at: DateTime<Utc> },
    /// The turn could not be persisted
    Failed { message: String },
}

impl TurnChunk {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Text(_))
    }
}

/// Finite, single-reader sequence of chunks for one turn
///
/// Dropping the stream stops delivery only; the turn itself still completes
/// and is persisted.
pub struct TurnStream {
    rx: mpsc::Receiver<TurnChunk>,
}

impl TurnStream {
    pub(crate) fn new(rx: mpsc::Receiver<TurnChunk>) -> Self {
        Self { rx }
    }

    pub async fn next_chunk(&mut self) -> Option<TurnChunk> {
        self.rx.recv().await
    }

    /// Drain the stream, returning the full text and the terminal chunk
    pub async fn collect_text(mut self) -> (String, Option<TurnChunk>) {
        let mut text = String::new();
        while let Some(chunk) = self.rx.recv().await {
            match chunk {
                TurnChunk::Text(part) => text.push_str(&part),
                terminal => return (text, Some(terminal)),
            }
        }
        (text, None)
    }
}

impl Stream for TurnStream {
    type Item = TurnChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Split text into chunks of `words` words, keeping all whitespace
///
/// Concatenating the chunks gives back the input exactly.
pub fn chunk_words(text: &str, words: usize) -> Vec<String> {
    let words = words.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for piece in text.split_inclusive(char::is_whitespace) {
        let is_word = !piece.trim().is_empty();
        if is_word && count == words {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push_str(piece);
        if is_word {
            count += 1;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
