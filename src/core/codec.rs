//! Codec collaborator boundary.
//!
//! A [`Codec`] opens a session over the bytes of one mapped segment and yields
//! hardware-referenced frames in decode order. Frames are move-only: whoever holds the
//! `Box<dyn DecodedFrame>` owns the hardware reference, and dropping it unrefs it.

use std::fmt;
use std::sync::Arc;

use super::segment::SegmentMap;

/// Plane layout inside a hardware buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaneLayout {
    pub offset: u32,
    pub pitch: u32,
}

/// Everything the display sink needs to scan out a frame.
///
/// Copied out of the cache under the pipeline lock so that presenting never
/// holds the lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameDescriptor {
    /// DRM PRIME file descriptor of the backing buffer, when hardware-backed
    pub prime_fd: Option<i32>,
    /// Fourcc pixel format code
    pub format: u32,
    pub width: u32,
    pub height: u32,
    pub planes: Vec<PlaneLayout>,
}

impl FrameDescriptor {
    /// Same format, size and plane layout (sink reconfiguration not needed)
    pub fn same_layout(&self, other: &FrameDescriptor) -> bool {
        self.format == other.format
            && self.width == other.width
            && self.height == other.height
            && self.planes == other.planes
    }
}

/// Decoded picture owned by whoever holds the box
pub trait DecodedFrame: Send {
    fn descriptor(&self) -> FrameDescriptor;
}

/// One open decode pass over a single segment. Forward-only.
pub trait CodecSession: Send {
    /// Next frame in decode order; `Ok(None)` at end of segment.
    fn next_frame(&mut self) -> Result<Option<Box<dyn DecodedFrame>>, CodecError>;
}

pub trait Codec: Send + Sync {
    fn open(&self, data: Arc<SegmentMap>) -> Result<Box<dyn CodecSession>, CodecError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Segment bytes could not be parsed or no video stream found
    Open(String),
    /// Corrupt packet or decoder failure mid-segment
    Decode(String),
    /// Codec broke its contract (e.g. software frame where hardware frame was required)
    Protocol(String),
}

impl CodecError {
    /// Open/decode failures are treated like missing data: retried later.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CodecError::Protocol(_))
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Open(msg) => write!(f, "codec open failed: {}", msg),
            CodecError::Decode(msg) => write!(f, "decode failed: {}", msg),
            CodecError::Protocol(msg) => write!(f, "codec protocol violation: {}", msg),
        }
    }
}

impl std::error::Error for CodecError {}
