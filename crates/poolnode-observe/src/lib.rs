mod logger;
pub use logger::*;

mod sink;
pub use sink::{RemoteSinkLayer, SinkAuth, SinkConfig};
