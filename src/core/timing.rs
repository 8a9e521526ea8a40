//! Stream timing constants and wall-clock helpers.
//!
//! Recordings are cut into fixed segments of `FRAMES_PER_SEGMENT` frames at `FPS`,
//! so every frame has a fixed absolute time: `segment_start_ms + frame_id * FRAME_PERIOD_MS`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Frames per second of every recorded segment
pub const FPS: u32 = 25;

/// Frames in one segment (segment duration = 4 s)
pub const FRAMES_PER_SEGMENT: u32 = 100;

/// Milliseconds per frame
pub const FRAME_PERIOD_MS: u64 = 1000 / FPS as u64;

/// One frame period as a Duration (40 ms)
pub const FRAME_PERIOD: Duration = Duration::from_millis(FRAME_PERIOD_MS);

/// Segment duration in milliseconds
pub const SEGMENT_MS: u64 = FRAMES_PER_SEGMENT as u64 * FRAME_PERIOD_MS;

/// Stride-aligned frames the decoder tops up per pass
pub const FRAMES_PRELOAD: u32 = 20;

/// Minimum contiguous frames ahead before a top-up is skipped
pub const FRAMES_THRESHOLD: u32 = 26;

/// Hardware picture handles available to the cache
pub const CACHE_CAPACITY: usize = 64;

/// Fast-scan initial inter-frame wait
pub const SKIP_START: Duration = Duration::from_millis(500);

/// Fast-scan wait decrement per commander cycle
pub const SKIP_SPEEDUP: Duration = Duration::from_millis(40);

/// Lag beyond which the pacer resynchronizes its deadline
pub const DRIFT_TOLERANCE: Duration = Duration::from_millis(2 * FRAME_PERIOD_MS);

/// Default distance behind "now" when starting without a known position
pub const START_LEAD_MS: u64 = 5000;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Rounds `id` down to a multiple of `skip`.
pub fn align_down(id: u32, skip: u32) -> u32 {
    id / skip.max(1) * skip.max(1)
}

/// Rounds `id` up to a multiple of `skip`.
pub fn align_up(id: u32, skip: u32) -> u32 {
    id.div_ceil(skip.max(1)) * skip.max(1)
}
