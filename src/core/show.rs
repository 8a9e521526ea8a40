//! Show: the real-time consumer of the frame cache.
//!
//! Each cycle resolves any pending seek, looks the show position up in the cache and,
//! on a hit, advances the position before presenting, so the decoder can work ahead
//! while Show sleeps out the frame deadline. Presenting happens outside the pipeline lock;
//! the frame stays in the cache, protected as "shown", until a later eviction.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, trace};

use super::chunk_index::{Direction, FrameKey};
use super::codec::FrameDescriptor;
use super::context::{CancelToken, PipelineState, PlaybackContext};
use super::segment::StreamId;
use super::timing::{DRIFT_TOLERANCE, FRAME_PERIOD, START_LEAD_MS, now_ms};
use crate::sink::{DisplaySink, Rect, VIDEO_Z_ORDER};

/// Drift-correcting frame clock.
///
/// Deadlines accumulate one frame period per frame so that short scheduling hiccups are
/// absorbed by shorter sleeps later. A lag beyond the tolerance resynchronizes to now.
#[derive(Debug, Clone)]
pub struct Pacer {
    deadline: Instant,
    period: Duration,
    tolerance: Duration,
}

impl Pacer {
    pub fn new(start: Instant) -> Self {
        Self {
            deadline: start,
            period: FRAME_PERIOD,
            tolerance: DRIFT_TOLERANCE,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Advance by one frame period and return the new deadline
    pub fn frame_deadline(&mut self) -> Instant {
        self.deadline += self.period;
        self.deadline
    }

    /// Push the deadline out by the slow-motion surplus
    pub fn extend(&mut self, extra: Duration) -> Instant {
        self.deadline += extra;
        self.deadline
    }

    /// Resync when `now` lags the deadline by more than the tolerance. Returns true on resync.
    pub fn correct_drift(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.deadline) > self.tolerance {
            self.deadline = now;
            true
        } else {
            false
        }
    }
}

enum Step {
    /// Present this frame
    Frame {
        key: FrameKey,
        desc: FrameDescriptor,
        wait: Duration,
    },
    /// Position already on screen (paused or stalled at an edge)
    Hold,
    /// Frame not cached yet
    Miss,
    /// Position re-resolved, look again
    Again,
}

pub struct Show {
    stream: StreamId,
    layout: Option<FrameDescriptor>,
    last: Option<FrameKey>,
}

impl Show {
    pub fn new(stream: StreamId) -> Self {
        Self {
            stream,
            layout: None,
            last: None,
        }
    }

    /// Position after `pos`; `pos` itself when paused or at the edge of the index.
    fn next_of(p: &PipelineState, pos: FrameKey) -> FrameKey {
        match p.speed.direction() {
            Direction::Paused => pos,
            dir => p.index.step(pos, p.skip, dir).unwrap_or(pos),
        }
    }

    /// One state machine step under the pipeline lock.
    fn locate(&mut self, p: &mut PipelineState) -> Step {
        if let Some(target) = p.seek_target.take() {
            p.show_ms = target;
            p.position = p.index.resolve(target, p.skip);
            p.bump();
            trace!("Seek {} -> {:?}", target, p.position);
        }
        let Some(pos) = p.position else {
            return Step::Miss;
        };
        if !p.index.contains(pos.segment_ms) {
            // index replaced under us
            p.seek_target = Some(if p.show_ms != 0 { p.show_ms } else { pos.wall_ms() });
            return Step::Again;
        }
        if self.last == Some(pos) && p.cache.shown() == Some(pos) {
            // already on screen: move on once unpaused or once the index grew
            let next = Self::next_of(p, pos);
            if next == pos {
                return Step::Hold;
            }
            p.position = Some(next);
            p.bump();
            return Step::Again;
        }
        let Some(desc) = p.cache.lookup(pos) else {
            return Step::Miss;
        };

        p.cache.mark_shown(pos);
        p.position = Some(Self::next_of(p, pos));
        p.show_ms = pos.wall_ms();
        p.bump();
        self.last = Some(pos);
        Step::Frame { key: pos, desc, wait: p.wait }
    }

    fn present(&mut self, sink: &dyn DisplaySink, desc: &FrameDescriptor) {
        if !self.layout.as_ref().is_some_and(|l| l.same_layout(desc)) {
            debug!("Configuring sink for {}x{}", desc.width, desc.height);
            sink.configure(desc, VIDEO_Z_ORDER);
            sink.set_viewport(Rect::of(desc), sink.screen());
            self.layout = Some(desc.clone());
        }
        sink.present(desc);
    }

    /// Block until the index has entries, then queue the initial seek.
    fn start(&self, ctx: &PlaybackContext, cancel: &CancelToken) -> bool {
        let p = ctx.pipeline.lock();
        let mut p = ctx
            .pipeline
            .wait_while(p, Duration::from_secs(1), |s| !cancel.is_cancelled() && s.index.is_empty());
        while p.index.is_empty() {
            if cancel.is_cancelled() {
                return false;
            }
            p = ctx
                .pipeline
                .wait_while(p, Duration::from_secs(1), |s| !cancel.is_cancelled() && s.index.is_empty());
        }
        if p.seek_target.is_none() {
            let target = if p.show_ms != 0 {
                p.show_ms
            } else {
                now_ms().saturating_sub(START_LEAD_MS)
            };
            debug!("Show of {} starts at {}", self.stream, target);
            p.seek_target = Some(target);
        }
        p.bump();
        drop(p);
        ctx.pipeline.notify();
        true
    }

    /// Show thread body. Returns when `cancel` fires.
    pub fn run(mut self, ctx: Arc<PlaybackContext>, sink: Arc<dyn DisplaySink>, cancel: CancelToken) {
        info!("Show started for {}", self.stream);
        if self.start(&ctx, &cancel) {
            let mut pacer = Pacer::new(Instant::now());
            while !cancel.is_cancelled() {
                let step = self.locate(&mut ctx.pipeline.lock());
                ctx.pipeline.notify();
                match step {
                    Step::Again => continue,
                    Step::Miss => {
                        let p = ctx.pipeline.lock();
                        drop(ctx.pipeline.wait_timeout(p, FRAME_PERIOD));
                    }
                    Step::Hold => {
                        cancel.sleep(FRAME_PERIOD);
                    }
                    Step::Frame { key, desc, wait } => {
                        ctx.overlay.lock().shown_ms = Some(key.wall_ms());
                        ctx.overlay.notify();

                        if !cancel.sleep_until(pacer.frame_deadline()) {
                            break;
                        }
                        trace!("Present {}", key);
                        self.present(sink.as_ref(), &desc);

                        let extra = wait.saturating_sub(FRAME_PERIOD);
                        if !extra.is_zero() && !cancel.sleep_until(pacer.extend(extra)) {
                            break;
                        }
                        if pacer.correct_drift(Instant::now()) {
                            debug!("Show of {} resynced", self.stream);
                        }
                    }
                }
            }
        }
        ctx.pipeline.notify();
        info!("Show stopped for {}", self.stream);
    }
}
