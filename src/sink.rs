//! Display sink collaborator.
//!
//! The engine calls the sink synchronously: `present` from the Show thread, `release`
//! wherever frames leave the cache, `hide` when no stream can be shown. Implementations
//! are shared across threads and synchronize internally.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::{debug, trace};

use crate::core::codec::{DecodedFrame, FrameDescriptor};
use crate::core::frame_cache::CachedFrame;

/// Z position of the video plane under the overlay
pub const VIDEO_Z_ORDER: u32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Whole-frame rectangle
    pub fn of(frame: &FrameDescriptor) -> Self {
        Self::new(0, 0, frame.width, frame.height)
    }
}

pub trait DisplaySink: Send + Sync {
    /// Set up the plane for a frame layout (format, size, planes) at `z_order`.
    fn configure(&self, layout: &FrameDescriptor, z_order: u32);

    fn set_viewport(&self, src: Rect, dst: Rect);

    /// Target rectangle on screen
    fn screen(&self) -> Rect;

    fn present(&self, frame: &FrameDescriptor);

    /// Take back a frame leaving the cache. Called exactly once per cached frame.
    fn release(&self, frame: Box<dyn DecodedFrame>);

    fn hide(&self);
}

/// Hand evicted cache entries back to the sink. Call without holding the pipeline lock.
pub fn release_frames(sink: &dyn DisplaySink, frames: Vec<CachedFrame>) {
    if !frames.is_empty() {
        trace!("Releasing {} frames", frames.len());
    }
    for cached in frames {
        sink.release(cached.frame);
    }
}

/// Headless sink: logs and counts, drops released frames.
#[derive(Debug, Default)]
pub struct NullSink {
    presented: AtomicU64,
    released: AtomicU64,
    hidden: AtomicBool,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> u64 {
        self.presented.load(Ordering::Relaxed)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden.load(Ordering::Relaxed)
    }
}

impl DisplaySink for NullSink {
    fn configure(&self, layout: &FrameDescriptor, z_order: u32) {
        debug!(
            "Sink configure {}x{} fourcc {:#010x} planes {} z {}",
            layout.width,
            layout.height,
            layout.format,
            layout.planes.len(),
            z_order
        );
    }

    fn set_viewport(&self, src: Rect, dst: Rect) {
        debug!("Sink viewport {:?} -> {:?}", src, dst);
    }

    fn screen(&self) -> Rect {
        Rect::new(0, 0, 1920, 1080)
    }

    fn present(&self, frame: &FrameDescriptor) {
        self.hidden.store(false, Ordering::Relaxed);
        self.presented.fetch_add(1, Ordering::Relaxed);
        trace!("Sink present fd {:?}", frame.prime_fd);
    }

    fn release(&self, frame: Box<dyn DecodedFrame>) {
        self.released.fetch_add(1, Ordering::Relaxed);
        drop(frame);
    }

    fn hide(&self) {
        if !self.hidden.swap(true, Ordering::Relaxed) {
            debug!("Sink hide");
        }
    }
}
