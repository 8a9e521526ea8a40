//! Windowing policy for the frame cache.
//!
//! Given the show position, decides which cached frames are stale and which
//! stride-aligned ids must be decoded next. Runs under the pipeline lock and does no I/O:
//! the decoder executes the returned windows after releasing the lock.

use log::debug;

use super::chunk_index::{ChunkEntry, ChunkIndex, Direction, FrameKey};
use super::frame_cache::{CachedFrame, FrameCache};
use super::timing::{FRAMES_PER_SEGMENT, FRAMES_PRELOAD, FRAMES_THRESHOLD};

/// Aligned frames kept on the already-played side of the position
pub const KEEP_BEHIND: usize = (FRAMES_THRESHOLD / 2) as usize;

/// Half-open id range `[from, to)` of one segment to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeWindow {
    pub entry: ChunkEntry,
    pub from: u32,
    pub to: u32,
}

#[derive(Debug, Default)]
pub struct WindowPlan {
    /// Frames removed from the cache; the caller releases them outside the lock
    pub evicted: Vec<CachedFrame>,
    pub windows: Vec<DecodeWindow>,
    /// Contiguous aligned frames found cached from the position onward
    pub contiguous: usize,
    /// Position was missing and the cache was flushed
    pub caught_up: bool,
}

/// Plan the next decode pass around `position`.
pub fn plan(
    index: &ChunkIndex,
    cache: &mut FrameCache,
    position: FrameKey,
    skip: u32,
    direction: Direction,
) -> WindowPlan {
    let skip = skip.max(1);
    // the window is laid out in playback order; a paused player preloads forward
    let dir = match direction {
        Direction::Backward => Direction::Backward,
        _ => Direction::Forward,
    };
    let mut plan = WindowPlan::default();

    let (start, ids) = if cache.contains(position) {
        let (run, next) = contiguous_run(index, cache, position, skip, dir);
        plan.contiguous = run.len();
        // ahead side: anything not part of the contiguous run is stale
        let ahead = |k: FrameKey| match dir {
            Direction::Backward => k < position,
            _ => k > position,
        };
        plan.evicted = cache.evict_where(|k| ahead(k) && run.binary_search(&k).is_err());

        if plan.contiguous < FRAMES_THRESHOLD as usize {
            (next, FRAMES_PRELOAD * skip)
        } else {
            (None, 0)
        }
    } else {
        debug!("Cache miss at {}, flushing", position);
        plan.evicted = cache.flush();
        plan.caught_up = true;
        (index.contains(position.segment_ms).then_some(position), FRAMES_THRESHOLD * skip)
    };

    plan.evicted.extend(trim_behind(cache, position, skip, dir));

    if let Some(start) = start {
        plan.windows = split_windows(index, start, ids.min(FRAMES_PER_SEGMENT), dir);
    }
    plan
}

/// Walk from `position` while each expected key is cached. Returns the run (sorted) and the
/// first expected key that is missing, or `None` when the walk ran off the index.
fn contiguous_run(
    index: &ChunkIndex,
    cache: &FrameCache,
    position: FrameKey,
    skip: u32,
    dir: Direction,
) -> (Vec<FrameKey>, Option<FrameKey>) {
    let mut run = Vec::new();
    let mut expected = Some(position);
    while let Some(key) = expected {
        if !cache.contains(key) || run.len() >= cache.capacity() {
            break;
        }
        run.push(key);
        expected = index.step(key, skip, dir);
    }
    run.sort_unstable();
    (run, expected)
}

/// Evict misaligned frames and all but the nearest `KEEP_BEHIND` aligned frames on the
/// played side of the position.
fn trim_behind(cache: &mut FrameCache, position: FrameKey, skip: u32, dir: Direction) -> Vec<CachedFrame> {
    let mut behind: Vec<FrameKey> = cache
        .keys()
        .filter(|&k| match dir {
            Direction::Backward => k > position,
            _ => k < position,
        })
        .collect();
    // nearest first
    if dir != Direction::Backward {
        behind.reverse();
    }
    let mut kept = 0usize;
    let mut stale = Vec::new();
    for key in behind {
        if key.frame_id % skip != 0 || kept >= KEEP_BEHIND {
            stale.push(key);
        } else {
            kept += 1;
        }
    }
    stale.sort_unstable();
    cache.evict_where(|k| stale.binary_search(&k).is_ok())
}

/// Lay `count` ids out from `start` in playback order, crossing into neighbouring segments.
fn split_windows(index: &ChunkIndex, start: FrameKey, mut count: u32, dir: Direction) -> Vec<DecodeWindow> {
    let mut windows = Vec::new();
    let Some(mut entry) = index.get(start.segment_ms) else {
        return windows;
    };
    let mut id = start.frame_id;
    match dir {
        Direction::Backward => loop {
            if id < count {
                windows.push(DecodeWindow { entry, from: 0, to: id + 1 });
                count -= id + 1;
                if count < FRAMES_PRELOAD {
                    break;
                }
                id = FRAMES_PER_SEGMENT - 1;
                match index.prev(entry.start_ms) {
                    Some(prev) => entry = prev,
                    None => break,
                }
            } else {
                windows.push(DecodeWindow { entry, from: id + 1 - count, to: id + 1 });
                break;
            }
        },
        _ => loop {
            if id + count > FRAMES_PER_SEGMENT {
                windows.push(DecodeWindow { entry, from: id, to: FRAMES_PER_SEGMENT });
                count -= FRAMES_PER_SEGMENT - id;
                id = 0;
                match index.next(entry.start_ms) {
                    Some(next) => entry = next,
                    None => break,
                }
            } else {
                windows.push(DecodeWindow { entry, from: id, to: id + count });
                break;
            }
        },
    }
    windows
}
