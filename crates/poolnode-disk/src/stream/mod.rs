//! Queue-backed adapters between in-process `write`/`read` calls and chunked network streams.
//!
//! Frames travel strictly in FIFO order; payload boundaries are not marked on the wire, so
//! reordering would corrupt the data.

mod reader;
mod writer;

pub use reader::DiskReader;
pub use writer::DiskWriter;

use futures::{StreamExt, stream};
use tokio::sync::mpsc;

use poolnode_rpc::FrameStream;

/// Largest frame handed to the network layer (15 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 15 * 1024 * 1024;

/// Pending writes (or received frames) held before the producer suspends.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    pub chunk_size: usize,
    pub queue_capacity: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl StreamOptions {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

/// Splits one queued payload into frames of at most `chunk_size` bytes. Empty payloads vanish.
pub fn split_frames(payload: Vec<u8>, chunk_size: usize) -> Vec<Vec<u8>> {
    let chunk_size = chunk_size.max(1);
    if payload.is_empty() {
        return Vec::new();
    }
    if payload.len() <= chunk_size {
        return vec![payload];
    }
    payload.chunks(chunk_size).map(<[u8]>::to_vec).collect()
}

/// Frames of a payload that is already fully in memory.
///
/// Never empty: the request header travels inside each frame, so an empty payload is
/// sent as one empty frame.
pub fn frames_of(payload: Vec<u8>, chunk_size: usize) -> FrameStream {
    let mut frames = split_frames(payload, chunk_size);
    if frames.is_empty() {
        frames.push(Vec::new());
    }
    stream::iter(frames).boxed()
}

struct Framing {
    queue: mpsc::Receiver<Vec<u8>>,
    pending: std::vec::IntoIter<Vec<u8>>,
    emitted: bool,
    drained: bool,
}

/// Drains `queue` lazily into frames; the stream ends once every sender is gone.
/// A stream that carried no bytes at all still yields one empty frame.
fn queue_frames(queue: mpsc::Receiver<Vec<u8>>, chunk_size: usize) -> FrameStream {
    let state = Framing {
        queue,
        pending: Vec::new().into_iter(),
        emitted: false,
        drained: false,
    };
    stream::unfold(state, move |mut state| async move {
        loop {
            if let Some(frame) = state.pending.next() {
                state.emitted = true;
                return Some((frame, state));
            }
            if state.drained {
                return None;
            }
            match state.queue.recv().await {
                Some(payload) => state.pending = split_frames(payload, chunk_size).into_iter(),
                None => {
                    state.drained = true;
                    if !state.emitted {
                        state.emitted = true;
                        return Some((Vec::new(), state));
                    }
                }
            }
        }
    })
    .boxed()
}
