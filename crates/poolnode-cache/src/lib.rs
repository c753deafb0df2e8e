//! Two-tier key/value cache: local files with a json sidecar, or the coordinator's cache.
//!
//! Both tiers store opaque bytes and share one validity rule: an entry is visible when its
//! version matches the requested one (any version when `0` is requested) and it has not
//! expired (`expire_at == 0` never expires).

mod error;
pub use error::CacheError;

mod meta;
pub use meta::CacheMeta;

mod local;
pub use local::LocalCache;

mod remote;
pub use remote::RemoteCache;

mod cache;
pub use cache::{Cache, now_ms};
