//! Remote disks: chunked streaming reads and writes plus a fixed-width big-endian codec.

mod error;
pub use error::DiskError;

mod stream;
pub use stream::{
    DEFAULT_CHUNK_SIZE, DEFAULT_QUEUE_CAPACITY, DiskReader, DiskWriter, StreamOptions, frames_of,
    split_frames,
};

mod codec;
pub use codec::{ByteSink, ByteSource, TypedRead, TypedWrite};

mod disk;
pub use disk::Disk;
