//! Shared playback state: three lock domains and the command surface.
//!
//! Each domain is a mutex plus condvar. Nothing holds a domain across blocking I/O,
//! and when more than one is needed they are taken one at a time, never nested.
//!
//! - **Command**: requested speed, camera, day and seek; read by the Commander.
//! - **Pipeline**: chunk index, frame cache, show position, applied stride/wait; shared
//!   by Loader, Decoder and Show. `epoch` bumps on every change the Decoder must react to.
//! - **Overlay**: displayed timestamp and mat annotations, read by the overlay renderer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info};
use serde::Serialize;

use super::chunk_index::{ChunkIndex, FrameKey};
use super::frame_cache::{CacheStats, CachedFrame, FrameCache};
use super::speed::Speed;
use super::timing::{CACHE_CAPACITY, START_LEAD_MS, now_ms};
use crate::catalog::types::{CameraConfigs, MatInfo};

/// Mutex + condvar pair. Poisoned locks are recovered, not propagated.
#[derive(Debug, Default)]
pub struct Domain<T> {
    state: Mutex<T>,
    cond: Condvar,
}

impl<T> Domain<T> {
    pub fn new(state: T) -> Self {
        Self {
            state: Mutex::new(state),
            cond: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wake every waiter of this domain
    pub fn notify(&self) {
        self.cond.notify_all();
    }

    pub fn wait_timeout<'a>(&self, guard: MutexGuard<'a, T>, timeout: Duration) -> MutexGuard<'a, T> {
        match self.cond.wait_timeout(guard, timeout) {
            Ok((g, _)) => g,
            Err(e) => e.into_inner().0,
        }
    }

    /// Wait while `pred` holds, at most `timeout`.
    pub fn wait_while<'a>(
        &self,
        guard: MutexGuard<'a, T>,
        timeout: Duration,
        pred: impl FnMut(&mut T) -> bool,
    ) -> MutexGuard<'a, T> {
        match self.cond.wait_timeout_while(guard, timeout, pred) {
            Ok((g, _)) => g,
            Err(e) => e.into_inner().0,
        }
    }
}

/// Cooperative cancellation flag, optionally chained to a parent.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled by itself or by `self`
    pub fn child(&self) -> CancelToken {
        CancelToken {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::clone(&self.flag)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.parent.as_ref().is_some_and(|p| p.load(Ordering::SeqCst))
    }

    /// Sleep until `deadline` in short slices. Returns false if cancelled first.
    pub fn sleep_until(&self, deadline: Instant) -> bool {
        const SLICE: Duration = Duration::from_millis(10);
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLICE));
        }
    }

    pub fn sleep(&self, dur: Duration) -> bool {
        self.sleep_until(Instant::now() + dur)
    }
}

#[derive(Debug, Clone)]
pub struct CommandState {
    pub speed: Speed,
    /// Pending absolute seek (epoch ms)
    pub seek: Option<u64>,
    pub day: String,
    pub requested: Option<u32>,
    /// Camera the running trio streams; written by the Commander only
    pub active: Option<u32>,
    /// Restart the stream even if the camera did not change (day switch)
    pub restart: bool,
    pub cams: CameraConfigs,
    pub switching: bool,
    pub stopping: bool,
    pub generation: u64,
}

impl CommandState {
    pub fn new(day: String) -> Self {
        Self {
            speed: Speed::PLAY,
            seek: None,
            day,
            requested: None,
            active: None,
            restart: false,
            cams: CameraConfigs::new(),
            switching: false,
            stopping: false,
            generation: 0,
        }
    }

    /// A switch is outstanding
    pub fn switch_pending(&self) -> bool {
        self.restart || self.requested != self.active
    }

    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

pub struct PipelineState {
    pub index: ChunkIndex,
    pub cache: FrameCache,
    /// Next frame Show wants on screen; `None` until the first seek resolves
    pub position: Option<FrameKey>,
    /// Wall-clock of the last displayed frame (0 = nothing shown yet)
    pub show_ms: u64,
    pub seek_target: Option<u64>,
    pub speed: Speed,
    pub skip: u32,
    pub wait: Duration,
    pub epoch: u64,
}

impl PipelineState {
    pub fn new(capacity: usize) -> Self {
        let speed = Speed::PLAY;
        Self {
            index: ChunkIndex::new(),
            cache: FrameCache::new(capacity),
            position: None,
            show_ms: 0,
            seek_target: None,
            speed,
            skip: speed.skip(),
            wait: speed.params().wait,
            epoch: 0,
        }
    }

    pub fn bump(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Apply a speed level; a stride change realigns the position down to the new stride.
    pub fn apply_speed(&mut self, speed: Speed) {
        let params = speed.params();
        if params.skip != self.skip {
            if let Some(pos) = self.position.as_mut() {
                pos.frame_id = pos.frame_id / params.skip * params.skip;
            }
        }
        self.speed = speed;
        self.skip = params.skip;
        self.wait = params.wait;
        self.bump();
    }

    /// Forget the stream: empty index, unresolved position, every cached frame returned.
    pub fn reset_stream(&mut self) -> Vec<CachedFrame> {
        self.index = ChunkIndex::new();
        self.position = None;
        self.seek_target = None;
        self.bump();
        self.cache.drain_all()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OverlayState {
    /// Wall-clock of the frame on screen, `None` when nothing is shown
    pub shown_ms: Option<u64>,
    pub loaded_mat: Option<u32>,
    pub mat: MatInfo,
    pub recording: bool,
}

impl OverlayState {
    /// Displayed second, as used for annotations
    pub fn shown_sec(&self) -> Option<i64> {
        self.shown_ms.map(|ms| (ms / 1000) as i64)
    }
}

pub struct PlaybackContext {
    pub command: Domain<CommandState>,
    pub pipeline: Domain<PipelineState>,
    pub overlay: Domain<OverlayState>,
    stop: CancelToken,
    stats: Arc<CacheStats>,
}

impl PlaybackContext {
    pub fn new(day: impl Into<String>) -> Arc<Self> {
        Self::with_capacity(day, CACHE_CAPACITY)
    }

    pub fn with_capacity(day: impl Into<String>, capacity: usize) -> Arc<Self> {
        let pipeline = PipelineState::new(capacity);
        let stats = pipeline.cache.stats();
        Arc::new(Self {
            command: Domain::new(CommandState::new(day.into())),
            pipeline: Domain::new(pipeline),
            overlay: Domain::new(OverlayState::default()),
            stop: CancelToken::new(),
            stats,
        })
    }

    /// Process-wide stop token; stream tokens are its children
    pub fn stop_token(&self) -> &CancelToken {
        &self.stop
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn cache_stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Wake all waiters in every domain
    pub fn notify_all(&self) {
        self.command.notify();
        self.pipeline.notify();
        self.overlay.notify();
    }
}

/// Snapshot for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct PlayerStatus {
    pub speed: i32,
    pub speed_label: String,
    pub day: String,
    pub camera: Option<u32>,
    pub requested_camera: Option<u32>,
    pub mat: Option<u32>,
    pub switching: bool,
    pub shown_ms: Option<u64>,
    pub chunks: usize,
    pub cached_frames: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub cache_evictions: u64,
    pub recording: bool,
}

/// Command surface of the engine. Cheap to clone; every call is a short write into the
/// command domain followed by a signal.
#[derive(Clone)]
pub struct PlayerHandle {
    ctx: Arc<PlaybackContext>,
}

impl PlayerHandle {
    pub fn new(ctx: Arc<PlaybackContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<PlaybackContext> {
        &self.ctx
    }

    fn command(&self, f: impl FnOnce(&mut CommandState)) {
        {
            let mut cmd = self.ctx.command.lock();
            f(&mut cmd);
            cmd.touch();
        }
        self.ctx.command.notify();
    }

    pub fn set_speed(&self, level: i32) {
        let speed = Speed::new(level);
        debug!("Speed request {}", speed.label());
        self.command(|c| c.speed = speed);
    }

    pub fn seek(&self, ms: u64) {
        debug!("Seek request {}", ms);
        self.command(|c| c.seek = Some(ms));
    }

    pub fn switch_camera(&self, camera: Option<u32>) {
        info!("Camera request {:?}", camera);
        self.command(|c| c.requested = camera);
    }

    /// Back to live: real-time play from a few seconds ago
    pub fn restore(&self) {
        self.command(|c| {
            c.speed = Speed::PLAY;
            c.seek = Some(now_ms().saturating_sub(START_LEAD_MS));
        });
    }

    /// Change the recording day; the active camera stream restarts on the new day.
    pub fn select_day(&self, day: &str) {
        info!("Day request {}", day);
        let day = day.to_string();
        self.command(|c| {
            if c.day != day {
                c.day = day;
                c.restart = true;
            }
        });
    }

    /// First camera of the next mat; returns the camera selected.
    pub fn next_mat(&self) -> Option<u32> {
        let mut selected = None;
        self.command(|c| {
            if let Some(cam) = c.cams.next_mat_camera(c.requested) {
                c.requested = Some(cam);
                c.speed = Speed::PLAY;
                selected = Some(cam);
            }
        });
        selected
    }

    /// Camera at `slot` (0-based) on the current camera's mat; returns the camera selected.
    pub fn select_position(&self, slot: usize) -> Option<u32> {
        let mut selected = None;
        self.command(|c| {
            let cam = c
                .requested
                .and_then(|cur| c.cams.mat_of(cur))
                .and_then(|mat| c.cams.camera_at(mat, slot));
            if let Some(cam) = cam {
                c.requested = Some(cam);
                selected = Some(cam);
            }
        });
        selected
    }

    pub fn set_cams(&self, cams: CameraConfigs) {
        self.command(|c| c.cams = cams);
    }

    /// Stop everything; the Commander tears the stream down and exits.
    pub fn stop(&self) {
        info!("Stop requested");
        self.command(|c| c.stopping = true);
        self.ctx.stop.cancel();
        self.ctx.notify_all();
    }

    pub fn day(&self) -> String {
        self.ctx.command.lock().day.clone()
    }

    pub fn status(&self) -> PlayerStatus {
        let (speed, day, camera, requested, mat, switching) = {
            let c = self.ctx.command.lock();
            let mat = c.active.and_then(|cam| c.cams.mat_of(cam));
            (c.speed, c.day.clone(), c.active, c.requested, mat, c.switching)
        };
        let (chunks, cached_frames) = {
            let p = self.ctx.pipeline.lock();
            (p.index.len(), p.cache.len())
        };
        let (shown_ms, recording) = {
            let o = self.ctx.overlay.lock();
            (o.shown_ms, o.recording)
        };
        let stats = self.ctx.cache_stats();
        PlayerStatus {
            speed: speed.level(),
            speed_label: speed.label(),
            day,
            camera,
            requested_camera: requested,
            mat,
            switching,
            shown_ms,
            chunks,
            cached_frames,
            cache_hits: stats.hits(),
            cache_misses: stats.misses(),
            cache_hit_rate: stats.hit_rate(),
            cache_evictions: stats.evictions(),
            recording,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::CameraConfig;
    use crate::core::speed;
    use crate::core::testing::{FrameCounter, counted_frame};

    #[test]
    fn test_cancel_token_chain() {
        let root = CancelToken::new();
        let child = root.child();
        assert!(!child.is_cancelled());
        root.cancel();
        assert!(child.is_cancelled());

        let other = CancelToken::new().child();
        other.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_cancelled_sleep_returns_early() {
        let token = CancelToken::new();
        let t = token.clone();
        let h = std::thread::spawn(move || t.sleep(Duration::from_secs(10)));
        std::thread::sleep(Duration::from_millis(30));
        token.cancel();
        assert!(!h.join().unwrap());
        assert!(CancelToken::new().sleep(Duration::from_millis(1)));
    }

    #[test]
    fn test_speed_change_realigns_scenario_b() {
        let mut p = PipelineState::new(8);
        p.position = Some(FrameKey::new(1000, 7));
        p.apply_speed(Speed::new(speed::X4));
        assert_eq!(p.position, Some(FrameKey::new(1000, 4)));
        assert_eq!(p.skip, 4);

        // same stride: no realignment
        p.position = Some(FrameKey::new(1000, 6));
        p.apply_speed(Speed::new(-speed::X4));
        assert_eq!(p.position.unwrap().frame_id, 6);
    }

    #[test]
    fn test_handle_commands() {
        let ctx = PlaybackContext::with_capacity("2024-05-01", 8);
        let handle = PlayerHandle::new(Arc::clone(&ctx));
        let mut cams = CameraConfigs::new();
        cams.insert(1, CameraConfig { mat: 1, position: 1 });
        cams.insert(2, CameraConfig { mat: 1, position: 2 });
        cams.insert(5, CameraConfig { mat: 2, position: 1 });
        handle.set_cams(cams);

        handle.switch_camera(Some(1));
        assert_eq!(handle.select_position(1), Some(2));
        assert_eq!(handle.select_position(3), None);
        assert_eq!(handle.next_mat(), Some(5));
        handle.set_speed(99);
        handle.seek(1234);
        handle.select_day("2024-05-02");

        let c = ctx.command.lock();
        assert_eq!(c.requested, Some(5));
        assert_eq!(c.speed.level(), speed::SKIP);
        assert_eq!(c.seek, Some(1234));
        assert!(c.restart);
        assert!(c.switch_pending());
        assert!(c.generation >= 7);
    }

    #[test]
    fn test_status_reports_cache_stats() {
        let counter = FrameCounter::new();
        let ctx = PlaybackContext::with_capacity("d", 8);
        let evicted = {
            let mut p = ctx.pipeline.lock();
            for id in 0..3 {
                p.cache.insert(FrameKey::new(0, id), counted_frame(&counter));
            }
            p.cache.evict_where(|k| k.frame_id < 2)
        };
        drop(evicted);
        for _ in 0..3 {
            ctx.cache_stats().record_hit();
        }
        ctx.cache_stats().record_miss();

        let status = PlayerHandle::new(Arc::clone(&ctx)).status();
        assert_eq!(status.cached_frames, 1);
        assert_eq!(status.cache_evictions, 2);
        assert_eq!((status.cache_hits, status.cache_misses), (3, 1));
        assert!((status.cache_hit_rate - 0.75).abs() < 1e-9);
        assert_eq!(counter.live(), 1);
    }

    #[test]
    fn test_stop_cancels_children() {
        let ctx = PlaybackContext::with_capacity("d", 4);
        let child = ctx.stop_token().child();
        PlayerHandle::new(Arc::clone(&ctx)).stop();
        assert!(child.is_cancelled());
        assert!(ctx.command.lock().stopping);
    }
}
