//! Streaming chunk contracts and in-memory stream utilities.
//!
//! ```rust
//! use sbprovider::{BoxedChunkStream, StreamChunk, VecChunkStream};
//!
//! let stream = VecChunkStream::new(vec![StreamChunk::text("hello")]);
//! let _boxed: BoxedChunkStream<'static> = Box::pin(stream);
//! ```

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;

use crate::StreamChunk;

/// Provider stream contract.
///
/// Invariants for consumers:
/// - Chunks are delivered in backend wire order.
/// - The stream is finite and non-restartable.
/// - The last delivered chunk carries a finish reason or is error-kind;
///   after it the stream yields `None` and must not yield further items.
pub trait ChunkStream: Stream<Item = StreamChunk> + Send {}

impl<T> ChunkStream for T where T: Stream<Item = StreamChunk> + Send {}

pub type BoxedChunkStream<'a> = Pin<Box<dyn ChunkStream + 'a>>;

#[derive(Debug)]
pub struct VecChunkStream {
    chunks: VecDeque<StreamChunk>,
}

impl VecChunkStream {
    pub fn new(chunks: Vec<StreamChunk>) -> Self {
        Self {
            chunks: chunks.into(),
        }
    }

    /// Single-chunk stream, the usual shape for terminal failures.
    pub fn single(chunk: StreamChunk) -> Self {
        Self::new(vec![chunk])
    }
}

impl Stream for VecChunkStream {
    type Item = StreamChunk;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<StreamChunk>> {
        Poll::Ready(self.chunks.pop_front())
    }
}
