//! Streams: the single-producer, single-consumer links between stages.

mod channel;

pub use channel::{channel, Stream, StreamSender};
