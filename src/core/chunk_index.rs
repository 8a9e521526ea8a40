//! Time index of recorded segments (chunks) for the active camera and day.
//!
//! The index is rebuilt wholesale on every loader refresh and is always sorted
//! strictly ascending by `start_ms`. All position arithmetic that crosses a segment
//! boundary goes through it: stride stepping in both directions and seek resolution.

use std::fmt;

use super::timing::{FRAME_PERIOD_MS, FRAMES_PER_SEGMENT, SEGMENT_MS, align_down};

/// Upper bound on indexed segments (a full day at 4 s per segment is 21600)
pub const INDEX_CAPACITY: usize = 24000;

/// One recorded segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkEntry {
    pub start_ms: u64,
    pub server_id: u8,
}

impl ChunkEntry {
    pub fn new(start_ms: u64, server_id: u8) -> Self {
        Self { start_ms, server_id }
    }
}

/// Frame position: segment start plus intra-segment frame id.
///
/// Ordering is (segment_start_ms, frame_id), i.e. playback order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameKey {
    pub segment_ms: u64,
    pub frame_id: u32,
}

impl FrameKey {
    pub fn new(segment_ms: u64, frame_id: u32) -> Self {
        Self { segment_ms, frame_id }
    }

    /// Absolute wall-clock time of this frame in epoch milliseconds
    pub fn wall_ms(&self) -> u64 {
        self.segment_ms + self.frame_id as u64 * FRAME_PERIOD_MS
    }
}

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.segment_ms, self.frame_id)
    }
}

/// Playback direction derived from the sign of the speed level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    CapacityExceeded { len: usize, capacity: usize },
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexError::CapacityExceeded { len, capacity } => {
                write!(f, "chunk index capacity exceeded: {} > {}", len, capacity)
            }
        }
    }
}

impl std::error::Error for IndexError {}

/// Sorted, capacity-bounded table of segments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkIndex {
    entries: Vec<ChunkEntry>,
}

impl ChunkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from unordered catalog entries.
    ///
    /// Entries are sorted by start time; a repeated start time keeps its first entry.
    pub fn from_entries(mut entries: Vec<ChunkEntry>) -> Result<Self, IndexError> {
        entries.sort_by_key(|e| e.start_ms);
        entries.dedup_by_key(|e| e.start_ms);
        if entries.len() > INDEX_CAPACITY {
            return Err(IndexError::CapacityExceeded {
                len: entries.len(),
                capacity: INDEX_CAPACITY,
            });
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ChunkEntry] {
        &self.entries
    }

    pub fn first(&self) -> Option<ChunkEntry> {
        self.entries.first().copied()
    }

    pub fn last(&self) -> Option<ChunkEntry> {
        self.entries.last().copied()
    }

    /// Index of the segment starting exactly at `start_ms`
    pub fn position(&self, start_ms: u64) -> Option<usize> {
        self.entries.binary_search_by_key(&start_ms, |e| e.start_ms).ok()
    }

    pub fn get(&self, start_ms: u64) -> Option<ChunkEntry> {
        self.position(start_ms).map(|i| self.entries[i])
    }

    pub fn contains(&self, start_ms: u64) -> bool {
        self.position(start_ms).is_some()
    }

    /// Last entry with `start_ms <= ms`, clamped to the first entry when `ms`
    /// precedes the whole index. `None` only for an empty index.
    pub fn lookup_floor(&self, ms: u64) -> Option<ChunkEntry> {
        let upper = self.entries.partition_point(|e| e.start_ms <= ms);
        match upper {
            0 => self.first(),
            n => Some(self.entries[n - 1]),
        }
    }

    pub fn next(&self, start_ms: u64) -> Option<ChunkEntry> {
        let i = self.position(start_ms)?;
        self.entries.get(i + 1).copied()
    }

    pub fn prev(&self, start_ms: u64) -> Option<ChunkEntry> {
        let i = self.position(start_ms)?;
        i.checked_sub(1).map(|p| self.entries[p])
    }

    /// Entry `delta` positions away from `start_ms`, clamped to the index bounds.
    pub fn offset(&self, start_ms: u64, delta: isize) -> Option<ChunkEntry> {
        let i = self.position(start_ms)? as isize;
        let target = (i + delta).clamp(0, self.entries.len() as isize - 1);
        Some(self.entries[target as usize])
    }

    /// True when `other` keeps every entry of `self` unchanged (it may append more).
    pub fn is_prefix_of(&self, other: &ChunkIndex) -> bool {
        other.entries.starts_with(&self.entries)
    }

    /// Next position from `key` at stride `skip` in `direction`.
    ///
    /// Crosses segment boundaries through the index. Returns `None` when the
    /// boundary has no neighbouring segment (playback stalls at the edge) or
    /// when `key` is not indexed.
    pub fn step(&self, key: FrameKey, skip: u32, direction: Direction) -> Option<FrameKey> {
        let skip = skip.max(1);
        match direction {
            Direction::Paused => Some(key),
            Direction::Forward => {
                if key.frame_id + skip >= FRAMES_PER_SEGMENT {
                    self.next(key.segment_ms).map(|e| FrameKey::new(e.start_ms, 0))
                } else if self.contains(key.segment_ms) {
                    Some(FrameKey::new(key.segment_ms, key.frame_id + skip))
                } else {
                    None
                }
            }
            Direction::Backward => {
                if key.frame_id < skip {
                    self.prev(key.segment_ms).map(|e| {
                        let id = (key.frame_id + FRAMES_PER_SEGMENT - skip) / skip * skip;
                        FrameKey::new(e.start_ms, id)
                    })
                } else if self.contains(key.segment_ms) {
                    Some(FrameKey::new(key.segment_ms, key.frame_id - skip))
                } else {
                    None
                }
            }
        }
    }

    /// Resolve an absolute wall-clock target to a stride-aligned frame position.
    ///
    /// Targets before the first segment clamp to its start; targets more than a
    /// segment past the floor segment (a recording gap) snap to its first frame.
    pub fn resolve(&self, target_ms: u64, skip: u32) -> Option<FrameKey> {
        let entry = self.lookup_floor(target_ms)?;
        let frame_id = if target_ms < entry.start_ms || target_ms - entry.start_ms > SEGMENT_MS {
            0
        } else {
            let id = ((target_ms - entry.start_ms) / FRAME_PERIOD_MS) as u32;
            align_down(id.min(FRAMES_PER_SEGMENT - 1), skip)
        };
        Some(FrameKey::new(entry.start_ms, frame_id))
    }
}
