//! Speed levels and their stride/wait parameters.
//!
//! Levels run from `-SKIP` (fast reverse scan) through `PAUSE` (0) to `SKIP` (fast forward
//! scan). The sign gives the direction, the magnitude indexes [`SPEED_TABLE`].

use std::time::Duration;

use super::chunk_index::Direction;
use super::timing::{FRAME_PERIOD, FRAMES_PER_SEGMENT, SKIP_START};

pub const PAUSE: i32 = 0;
pub const SLOW_5: i32 = 1;
pub const SLOW_4: i32 = 2;
pub const SLOW_3: i32 = 3;
pub const SLOW_2: i32 = 4;
pub const PLAY: i32 = 5;
pub const X2: i32 = 6;
pub const X4: i32 = 7;
pub const X8: i32 = 8;
pub const SKIP: i32 = 9;

/// Stride and inter-frame wait of one speed magnitude
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedParams {
    pub skip: u32,
    pub wait: Duration,
}

const fn params(skip: u32, wait: Duration) -> SpeedParams {
    SpeedParams { skip, wait }
}

pub const SPEED_TABLE: [SpeedParams; 10] = [
    params(1, FRAME_PERIOD),
    params(1, Duration::from_millis(200)),
    params(1, Duration::from_millis(160)),
    params(1, Duration::from_millis(120)),
    params(1, Duration::from_millis(80)),
    params(1, FRAME_PERIOD),
    params(2, FRAME_PERIOD),
    params(4, FRAME_PERIOD),
    params(8, FRAME_PERIOD),
    params(FRAMES_PER_SEGMENT, SKIP_START),
];

/// Signed speed level, always within `-SKIP..=SKIP`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Speed(i32);

impl Speed {
    pub const PLAY: Speed = Speed(PLAY);
    pub const PAUSE: Speed = Speed(PAUSE);

    /// Out-of-range levels clamp to the fast-scan extremes.
    pub fn new(level: i32) -> Self {
        Speed(level.clamp(-SKIP, SKIP))
    }

    pub fn level(self) -> i32 {
        self.0
    }

    pub fn params(self) -> SpeedParams {
        SPEED_TABLE[self.0.unsigned_abs() as usize]
    }

    pub fn skip(self) -> u32 {
        self.params().skip
    }

    pub fn direction(self) -> Direction {
        match self.0 {
            0 => Direction::Paused,
            l if l > 0 => Direction::Forward,
            _ => Direction::Backward,
        }
    }

    /// Accelerating fast scan in either direction
    pub fn is_scan(self) -> bool {
        self.0.abs() == SKIP
    }

    /// Faster than real-time play
    pub fn is_fast(self) -> bool {
        self.0.abs() > PLAY
    }

    /// Short label for overlays and status output
    pub fn label(self) -> String {
        let mag = match self.0.abs() {
            PAUSE => return "pause".to_string(),
            SLOW_5 => "1/5",
            SLOW_4 => "1/4",
            SLOW_3 => "1/3",
            SLOW_2 => "1/2",
            PLAY => "x1",
            X2 => "x2",
            X4 => "x4",
            X8 => "x8",
            _ => "scan",
        };
        if self.0 < 0 { format!("-{}", mag) } else { mag.to_string() }
    }
}

impl Default for Speed {
    fn default() -> Self {
        Speed::PLAY
    }
}
