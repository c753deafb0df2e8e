pub mod proto {
    tonic::include_proto!("pool.v1");
}

mod config;
pub use config::PoolConfig;

mod errors;
pub use errors::RpcError;

mod pool;
pub use pool::{
    CacheChunk, CacheChunkStream, CacheEntryHeader, ChunkStream, CreateDisk, FrameStream, Pool,
    PendingJobsQuery, TemplateAnnouncement,
};

mod convert;

mod metadata;
pub use metadata::CallMetadata;

mod grpc;
pub use grpc::GrpcPool;

#[cfg(feature = "testing")]
pub mod testing;
