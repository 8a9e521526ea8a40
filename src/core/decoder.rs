//! Decoder: fills the frame cache around the show position.
//!
//! Decoding is forward-only within a codec session. A session continues only when the
//! next request targets the same segment at or after the codec's current frame id;
//! anything else (another segment, a reverse request) reopens it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, trace, warn};

use super::chunk_index::{ChunkEntry, FrameKey};
use super::codec::{Codec, CodecError, CodecSession, DecodedFrame};
use super::context::{CancelToken, PlaybackContext};
use super::preload::{self, DecodeWindow};
use super::segment::{SegmentError, SegmentMap, SegmentSource, StreamId};
use super::timing::{FRAMES_PER_SEGMENT, align_up};
use crate::sink::{DisplaySink, release_frames};

/// Idle wait when nothing changed
const IDLE_WAIT: Duration = Duration::from_secs(1);

/// Back-off after a segment could not be decoded
const RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub enum DecodeError {
    Segment(SegmentError),
    Codec(CodecError),
}

impl DecodeError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, DecodeError::Codec(e) if e.is_fatal())
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Segment(e) => write!(f, "{}", e),
            DecodeError::Codec(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<SegmentError> for DecodeError {
    fn from(e: SegmentError) -> Self {
        DecodeError::Segment(e)
    }
}

impl From<CodecError> for DecodeError {
    fn from(e: CodecError) -> Self {
        DecodeError::Codec(e)
    }
}

/// Outcome of offering a decoded frame to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keep {
    Inserted,
    Duplicate,
    /// The window went stale; end it
    Stop,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WindowStats {
    pub kept: usize,
    pub skipped: usize,
}

struct StreamSession {
    segment_ms: u64,
    codec: Box<dyn CodecSession>,
    /// Id of the next frame the codec will yield
    next_id: u32,
}

pub struct Decoder {
    codec: Arc<dyn Codec>,
    segments: Arc<dyn SegmentSource>,
    stream: StreamId,
    mapped: Option<(u64, Arc<SegmentMap>)>,
    session: Option<StreamSession>,
}

impl Decoder {
    pub fn new(codec: Arc<dyn Codec>, segments: Arc<dyn SegmentSource>, stream: StreamId) -> Self {
        Self {
            codec,
            segments,
            stream,
            mapped: None,
            session: None,
        }
    }

    fn map(&mut self, entry: ChunkEntry) -> Result<Arc<SegmentMap>, SegmentError> {
        if let Some((ms, data)) = &self.mapped {
            if *ms == entry.start_ms {
                return Ok(Arc::clone(data));
            }
        }
        self.mapped = None;
        let data = Arc::new(self.segments.map(&self.stream, entry)?);
        debug!("Mapped segment {:x} of {}", entry.start_ms, self.stream);
        self.mapped = Some((entry.start_ms, Arc::clone(&data)));
        Ok(data)
    }

    /// Session positioned at or before `from` on `entry`, reopening when needed.
    fn session_for(&mut self, entry: ChunkEntry, from: u32) -> Result<&mut StreamSession, DecodeError> {
        let reuse = matches!(&self.session, Some(s) if s.segment_ms == entry.start_ms && s.next_id <= from);
        if !reuse {
            self.session = None;
            let data = self.map(entry)?;
            let codec = self.codec.open(data)?;
            trace!("Codec session opened on {:x}", entry.start_ms);
            self.session = Some(StreamSession {
                segment_ms: entry.start_ms,
                codec,
                next_id: 0,
            });
        }
        match self.session.as_mut() {
            Some(s) => Ok(s),
            None => unreachable!("session set above"),
        }
    }

    /// Decode ids `[from, to)` of one segment at stride `skip`, offering each kept frame to `keep`.
    ///
    /// `from` is rounded up and `to` down to the stride. Frames outside the window or off
    /// the stride are dropped as soon as the codec yields them.
    pub fn decode_window(
        &mut self,
        entry: ChunkEntry,
        from: u32,
        to: u32,
        skip: u32,
        cancel: &CancelToken,
        mut keep: impl FnMut(FrameKey, Box<dyn DecodedFrame>) -> Keep,
    ) -> Result<WindowStats, DecodeError> {
        let skip = skip.max(1);
        let to = to.min(FRAMES_PER_SEGMENT);
        let from = align_up(from, skip);
        if to == 0 || from >= to {
            return Ok(WindowStats::default());
        }
        let to = (to - 1) / skip * skip + 1;
        trace!("Decode {:x} [{}, {}) skip {}", entry.start_ms, from, to, skip);

        let mut stats = WindowStats::default();
        let session = self.session_for(entry, from)?;
        while session.next_id < to && !cancel.is_cancelled() {
            let frame = match session.codec.next_frame() {
                Ok(Some(f)) => f,
                Ok(None) => break,
                Err(e) => {
                    self.session = None;
                    return Err(e.into());
                }
            };
            let id = session.next_id;
            session.next_id += 1;
            if id >= from && id % skip == 0 {
                match keep(FrameKey::new(entry.start_ms, id), frame) {
                    Keep::Inserted => stats.kept += 1,
                    Keep::Duplicate => stats.skipped += 1,
                    Keep::Stop => break,
                }
            } else {
                stats.skipped += 1;
            }
        }
        Ok(stats)
    }

    /// Run one window against the shared cache.
    fn fill(&mut self, ctx: &PlaybackContext, w: DecodeWindow, skip: u32, cancel: &CancelToken) -> Result<WindowStats, DecodeError> {
        self.decode_window(w.entry, w.from, w.to, skip, cancel, |key, frame| {
            let inserted = {
                let mut p = ctx.pipeline.lock();
                if p.seek_target.is_some() || p.skip != skip {
                    return Keep::Stop;
                }
                p.cache.insert(key, frame)
            };
            if inserted {
                ctx.pipeline.notify();
                Keep::Inserted
            } else {
                Keep::Duplicate
            }
        })
    }

    /// Decoder thread body. Returns when `cancel` fires.
    pub fn run(mut self, ctx: Arc<PlaybackContext>, sink: Arc<dyn DisplaySink>, cancel: CancelToken) {
        info!("Decoder started for {}", self.stream);
        let mut seen: Option<u64> = None;

        while !cancel.is_cancelled() {
            let (plan, skip) = {
                let p = ctx.pipeline.lock();
                let mut p = ctx.pipeline.wait_while(p, IDLE_WAIT, |s| {
                    !cancel.is_cancelled() && (Some(s.epoch) == seen || s.position.is_none() || s.index.is_empty())
                });
                if cancel.is_cancelled() {
                    break;
                }
                let Some(position) = p.position else { continue };
                if p.index.is_empty() || Some(p.epoch) == seen {
                    continue;
                }
                seen = Some(p.epoch);
                let skip = p.skip;
                let direction = p.speed.direction();
                let state = &mut *p;
                (preload::plan(&state.index, &mut state.cache, position, skip, direction), skip)
            };

            release_frames(sink.as_ref(), plan.evicted);
            if plan.caught_up {
                debug!("Catch-up decode for {}: {:?}", self.stream, plan.windows);
            }

            for window in plan.windows {
                match self.fill(&ctx, window, skip, &cancel) {
                    Ok(stats) => trace!("Window {:?}: {:?}", window, stats),
                    Err(e) if e.is_fatal() => {
                        error!("Decoder for {}: {}", self.stream, e);
                        panic!("decoder contract violated: {}", e);
                    }
                    Err(e) => {
                        warn!("Decoder for {}: {}", self.stream, e);
                        if matches!(e, DecodeError::Segment(_)) {
                            sink.hide();
                        }
                        // retry the same position after a pause
                        seen = None;
                        cancel.sleep(RETRY_DELAY);
                        break;
                    }
                }
            }
        }

        let leftover = ctx.pipeline.lock().cache.flush();
        release_frames(sink.as_ref(), leftover);
        ctx.pipeline.notify();
        info!("Decoder stopped for {}", self.stream);
    }
}
