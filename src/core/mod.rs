//! Core engine modules - index, cache, decoder, show, commander
//!
//! These modules form the playback engine, independent of any display or transport.

pub mod chunk_index;
pub mod codec;
pub mod commander;
pub mod context;
pub mod decoder;
pub mod frame_cache;
pub mod loader;
pub mod preload;
pub mod segment;
pub mod show;
pub mod speed;
pub mod timing;
pub mod workers;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use chunk_index::{ChunkEntry, ChunkIndex, Direction, FrameKey};
pub use codec::{Codec, CodecError, CodecSession, DecodedFrame, FrameDescriptor, PlaneLayout};
pub use commander::Commander;
pub use context::{CancelToken, PlaybackContext, PlayerHandle, PlayerStatus};
pub use frame_cache::{CacheStats, FrameCache};
pub use segment::{SegmentSource, SegmentStore, StreamId};
pub use speed::Speed;
pub use workers::{Services, StreamTrio};
