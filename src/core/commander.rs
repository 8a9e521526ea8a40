//! Commander: applies command-domain requests to the running stream.
//!
//! Speed changes and seeks are handed to the pipeline domain. Camera and day changes
//! tear the current stream trio down completely before the next one starts, so the
//! frame cache never sees two generations at once. The two scan levels accelerate
//! by shortening the frame wait each cycle, then by jumping whole segments.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, trace, warn};

use super::context::PlaybackContext;
use super::segment::StreamId;
use super::speed::Speed;
use super::timing::{FRAME_PERIOD, SKIP_SPEEDUP};
use super::workers::{Services, StreamTrio};
use crate::catalog::types::{CameraConfigs, MatInfo};
use crate::sink::release_frames;

/// Initial segment jump distance of a scan (halved when applied)
const BIG_SKIP_START: usize = 4;

/// Wake interval when nothing is scanning
const IDLE_WAIT: Duration = Duration::from_secs(1);

/// Snapshot of one command-domain pass
#[derive(Debug)]
struct Requests {
    speed: Speed,
    seek: Option<u64>,
    switch: Option<SwitchRequest>,
    stopping: bool,
}

#[derive(Debug)]
struct SwitchRequest {
    camera: Option<u32>,
    day: String,
    cams: CameraConfigs,
}

pub struct Commander {
    ctx: Arc<PlaybackContext>,
    services: Services,
    trio: Option<StreamTrio>,
    applied: Option<Speed>,
    day: Option<String>,
    big_skip: usize,
    seen: u64,
}

impl Commander {
    pub fn new(ctx: Arc<PlaybackContext>, services: Services) -> Self {
        Self {
            ctx,
            services,
            trio: None,
            applied: None,
            day: None,
            big_skip: BIG_SKIP_START,
            seen: 0,
        }
    }

    /// Stream currently playing
    pub fn stream(&self) -> Option<&StreamId> {
        self.trio.as_ref().map(|t| t.stream())
    }

    fn take_requests(&mut self) -> Requests {
        let mut c = self.ctx.command.lock();
        self.seen = c.generation;
        let switch = if c.switch_pending() && !c.stopping {
            c.switching = true;
            c.restart = false;
            Some(SwitchRequest {
                camera: c.requested,
                day: c.day.clone(),
                cams: c.cams.clone(),
            })
        } else {
            None
        };
        Requests {
            speed: c.speed,
            seek: c.seek.take(),
            switch,
            stopping: c.stopping,
        }
    }

    /// Apply a speed level if it differs from the one in effect.
    pub fn apply_speed(&mut self, speed: Speed) -> bool {
        if self.applied == Some(speed) {
            return false;
        }
        {
            let mut p = self.ctx.pipeline.lock();
            p.apply_speed(speed);
            debug!("Speed {} (skip {}, wait {:?}, at {:?})", speed.label(), p.skip, p.wait, p.position);
        }
        self.ctx.pipeline.notify();
        self.applied = Some(speed);
        self.big_skip = BIG_SKIP_START;
        true
    }

    /// Queue an absolute seek for Show to resolve
    pub fn hand_off_seek(&self, ms: u64) {
        {
            let mut p = self.ctx.pipeline.lock();
            p.seek_target = Some(ms);
            p.bump();
        }
        self.ctx.pipeline.notify();
    }

    /// One acceleration step of a scan. Returns how long to wait before the next one.
    pub fn scan_tick(&mut self) -> Duration {
        let Some(speed) = self.applied.filter(|s| s.is_scan()) else {
            return IDLE_WAIT;
        };
        let timeout = {
            let mut p = self.ctx.pipeline.lock();
            if p.wait > FRAME_PERIOD {
                p.wait = p.wait.saturating_sub(SKIP_SPEEDUP);
                trace!("Scan boost {:?}", p.wait);
                p.wait + FRAME_PERIOD
            } else {
                self.big_skip += 1;
                p.wait = FRAME_PERIOD * 2;
                let jump = (self.big_skip / 2) as isize;
                let delta = if speed.level() < 0 { -jump } else { jump };
                let target = if p.show_ms != 0 {
                    p.index
                        .lookup_floor(p.show_ms)
                        .and_then(|e| p.index.offset(e.start_ms, delta))
                } else {
                    None
                };
                if let Some(entry) = target {
                    trace!("Scan jump {} -> {}", p.show_ms, entry.start_ms);
                    p.seek_target = Some(entry.start_ms);
                    p.bump();
                }
                p.wait
            }
        };
        self.ctx.pipeline.notify();
        timeout
    }

    fn load_mat(&self, day: &str, mat: u32) {
        let needs_load = self.ctx.overlay.lock().loaded_mat != Some(mat);
        if !needs_load {
            return;
        }
        {
            let mut o = self.ctx.overlay.lock();
            o.loaded_mat = None;
            o.mat = MatInfo::default();
        }
        match self.services.catalog.mat(day, mat) {
            Ok(info) => {
                let mut o = self.ctx.overlay.lock();
                o.loaded_mat = Some(mat);
                o.mat = info;
            }
            Err(e) => warn!("Mat {} of {}: {}", mat, day, e),
        }
        self.ctx.overlay.notify();
    }

    fn stop_stream(&mut self) {
        if let Some(trio) = self.trio.take() {
            trio.stop();
        }
        let frames = self.ctx.pipeline.lock().reset_stream();
        let count = frames.len();
        release_frames(self.services.sink.as_ref(), frames);
        self.ctx.pipeline.notify();
        debug!("Stream drained, {} frames released", count);
    }

    fn switch(&mut self, req: SwitchRequest) {
        self.stop_stream();

        let day_changed = self.day.as_deref() != Some(req.day.as_str());
        self.day = Some(req.day.clone());
        if req.camera.is_none() || day_changed {
            self.ctx.pipeline.lock().show_ms = 0;
        }

        let config = req.camera.and_then(|cam| req.cams.get(cam).map(|cfg| (cam, cfg)));
        match config {
            Some((cam, cfg)) => {
                info!("Switch to mat {} cam {} day {}", cfg.mat, cfg.position, req.day);
                self.load_mat(&req.day, cfg.mat);
                let stream = StreamId::new(&req.day, cam);
                match StreamTrio::spawn(&self.ctx, &self.services, stream) {
                    Ok(trio) => self.trio = Some(trio),
                    Err(e) => error!("Failed to spawn stream threads: {}", e),
                }
            }
            None => {
                info!("No camera to show ({:?})", req.camera);
                self.services.sink.hide();
            }
        }

        {
            let mut c = self.ctx.command.lock();
            c.active = req.camera;
            c.switching = false;
        }
        self.ctx.command.notify();
    }

    /// One pass over the command domain. Returns the wait before the next pass, or `None`
    /// once stopping.
    pub fn cycle(&mut self) -> Option<Duration> {
        let req = self.take_requests();
        if req.stopping {
            return None;
        }
        if let Some(switch) = req.switch {
            self.switch(switch);
        }
        self.apply_speed(req.speed);
        if let Some(ms) = req.seek {
            debug!("Seek {}", ms);
            self.hand_off_seek(ms);
        }
        Some(self.scan_tick())
    }

    /// Commander thread body. Returns after the stream is torn down on stop.
    pub fn run(mut self) {
        info!("Commander started");
        while let Some(timeout) = self.cycle() {
            let seen = self.seen;
            let c = self.ctx.command.lock();
            drop(
                self.ctx
                    .command
                    .wait_while(c, timeout, |c| c.generation == seen && !c.stopping),
            );
        }
        self.stop_stream();
        info!("Commander stopped");
    }
}

impl Drop for Commander {
    fn drop(&mut self) {
        if let Some(trio) = self.trio.take() {
            trio.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::CameraConfig;
    use crate::core::chunk_index::{ChunkEntry, ChunkIndex, FrameKey};
    use crate::core::context::PlayerHandle;
    use crate::core::speed::{self, SPEED_TABLE};
    use crate::core::testing::{FakeCatalog, FakeCodec, FrameCounter, MemorySegments, RecordingSink, counted_frame};
    use crate::core::timing::now_ms;
    use std::time::Instant;

    struct Rig {
        ctx: Arc<PlaybackContext>,
        catalog: Arc<FakeCatalog>,
        sink: Arc<RecordingSink>,
        counter: FrameCounter,
        services: Services,
    }

    fn rig() -> Rig {
        let counter = FrameCounter::new();
        let catalog = Arc::new(FakeCatalog::new());
        let sink = Arc::new(RecordingSink::new());
        let services = Services {
            catalog: catalog.clone(),
            codec: Arc::new(FakeCodec::new(counter.clone())),
            segments: Arc::new(MemorySegments::new()),
            sink: sink.clone(),
        };
        Rig {
            ctx: PlaybackContext::with_capacity("d", 64),
            catalog,
            sink,
            counter,
            services,
        }
    }

    fn index(starts: &[u64]) -> ChunkIndex {
        ChunkIndex::from_entries(starts.iter().map(|&ms| ChunkEntry::new(ms, 0)).collect()).unwrap()
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_speed_change_resets_scan() {
        let r = rig();
        let mut cmd = Commander::new(Arc::clone(&r.ctx), r.services.clone());
        r.ctx.pipeline.lock().position = Some(FrameKey::new(1000, 7));

        assert!(cmd.apply_speed(Speed::new(speed::X4)));
        assert!(!cmd.apply_speed(Speed::new(speed::X4)));
        let p = r.ctx.pipeline.lock();
        assert_eq!(p.position, Some(FrameKey::new(1000, 4)));
        assert_eq!(p.wait, SPEED_TABLE[speed::X4 as usize].wait);
    }

    #[test]
    fn test_scan_accelerates_then_jumps() {
        let r = rig();
        let mut cmd = Commander::new(Arc::clone(&r.ctx), r.services.clone());
        {
            let mut p = r.ctx.pipeline.lock();
            p.index = index(&(0..40).map(|i| i * 4000).collect::<Vec<_>>());
            p.show_ms = 40_100;
        }
        cmd.apply_speed(Speed::new(speed::SKIP));

        // 500ms shrinks by 40ms per tick until it drops to the frame period
        let first = cmd.scan_tick();
        assert_eq!(first, Duration::from_millis(460) + FRAME_PERIOD);
        let mut ticks = 1;
        while r.ctx.pipeline.lock().wait > FRAME_PERIOD {
            cmd.scan_tick();
            ticks += 1;
        }
        assert_eq!(ticks, 12);
        assert_eq!(r.ctx.pipeline.lock().seek_target, None);

        // then whole segments: big_skip 5 -> jump 2 entries
        assert_eq!(cmd.scan_tick(), FRAME_PERIOD * 2);
        assert_eq!(r.ctx.pipeline.lock().seek_target, Some(48_000));
    }

    #[test]
    fn test_reverse_scan_jump_clamps_at_first_entry() {
        let r = rig();
        let mut cmd = Commander::new(Arc::clone(&r.ctx), r.services.clone());
        {
            let mut p = r.ctx.pipeline.lock();
            p.index = index(&[0, 4000, 8000]);
            p.show_ms = 4100;
        }
        cmd.apply_speed(Speed::new(-speed::SKIP));
        for _ in 0..6 {
            r.ctx.pipeline.lock().wait = FRAME_PERIOD;
            cmd.scan_tick();
        }
        assert_eq!(r.ctx.pipeline.lock().seek_target, Some(0));
    }

    #[test]
    fn test_non_scan_waits_idle() {
        let r = rig();
        let mut cmd = Commander::new(Arc::clone(&r.ctx), r.services.clone());
        cmd.apply_speed(Speed::PLAY);
        assert_eq!(cmd.scan_tick(), IDLE_WAIT);
    }

    #[test]
    fn test_seek_hand_off() {
        let r = rig();
        let handle = PlayerHandle::new(Arc::clone(&r.ctx));
        let mut cmd = Commander::new(Arc::clone(&r.ctx), r.services.clone());
        handle.seek(1050);
        assert!(cmd.cycle().is_some());
        assert_eq!(r.ctx.pipeline.lock().seek_target, Some(1050));
        assert_eq!(r.ctx.command.lock().seek, None);
    }

    #[test]
    fn test_switch_drains_cache_scenario_c() {
        let r = rig();
        let mut cmd = Commander::new(Arc::clone(&r.ctx), r.services.clone());
        {
            let mut p = r.ctx.pipeline.lock();
            p.index = index(&[1000]);
            for id in (0..20).step_by(2) {
                assert!(p.cache.insert(FrameKey::new(1000, id), counted_frame(&r.counter)));
            }
            p.cache.mark_shown(FrameKey::new(1000, 4));
        }
        assert_eq!(r.counter.live(), 10);

        // no camera configured: the stream is emptied and hidden
        PlayerHandle::new(Arc::clone(&r.ctx)).switch_camera(Some(2));
        cmd.cycle();

        assert_eq!(r.counter.live(), 0);
        assert_eq!(r.sink.released(), 10);
        assert!(r.sink.hides() >= 1);
        let p = r.ctx.pipeline.lock();
        assert!(p.cache.is_empty());
        assert!(p.index.is_empty());
        assert_eq!(p.position, None);
        drop(p);
        let c = r.ctx.command.lock();
        assert_eq!(c.active, Some(2));
        assert!(!c.switching);
    }

    #[test]
    fn test_switch_starts_stream_and_loads_mat() {
        let r = rig();
        let start = now_ms().saturating_sub(20_000) / 4000 * 4000;
        r.catalog.set_chunks("d", 1, start, 10);
        r.catalog.set_chunks("d", 2, start, 10);
        r.catalog.set_camera("d", 1, 7, 1);
        r.catalog.set_camera("d", 2, 7, 2);
        r.catalog.mats.lock().unwrap().insert(
            7,
            MatInfo {
                bookmarks: vec![100],
                medicals: vec![],
            },
        );

        let handle = PlayerHandle::new(Arc::clone(&r.ctx));
        handle.set_cams(r.catalog.cams.lock().unwrap()["d"].clone());
        handle.switch_camera(Some(1));

        let mut cmd = Commander::new(Arc::clone(&r.ctx), r.services.clone());
        cmd.cycle();
        assert_eq!(cmd.stream(), Some(&StreamId::new("d", 1)));
        assert_eq!(r.ctx.overlay.lock().loaded_mat, Some(7));
        assert_eq!(r.ctx.overlay.lock().mat.bookmarks, vec![100]);
        assert!(wait_for(|| r.sink.present_count() >= 3));

        // second camera of the same mat, playback continues at the same wall time
        handle.switch_camera(Some(2));
        cmd.cycle();
        assert_eq!(cmd.stream(), Some(&StreamId::new("d", 2)));
        assert!(wait_for(|| r.ctx.overlay.lock().shown_ms.is_some()));

        handle.stop();
        assert!(cmd.cycle().is_none());
        cmd.stop_stream();
        assert_eq!(r.counter.live(), 0);
        assert_eq!(r.ctx.pipeline.lock().cache.len(), 0);
    }

    #[test]
    fn test_day_change_restarts_stream() {
        let r = rig();
        r.catalog.set_chunks("d", 1, 0, 2);
        r.catalog.set_chunks("e", 1, 0, 2);
        let mut cams = CameraConfigs::new();
        cams.insert(1, CameraConfig { mat: 1, position: 1 });

        let handle = PlayerHandle::new(Arc::clone(&r.ctx));
        handle.set_cams(cams);
        handle.switch_camera(Some(1));
        let mut cmd = Commander::new(Arc::clone(&r.ctx), r.services.clone());
        cmd.cycle();
        assert_eq!(cmd.stream(), Some(&StreamId::new("d", 1)));

        handle.select_day("e");
        cmd.cycle();
        assert_eq!(cmd.stream(), Some(&StreamId::new("e", 1)));
        assert!(!r.ctx.command.lock().switch_pending());
        handle.stop();
        drop(cmd);
    }

    #[test]
    fn test_run_exits_on_stop() {
        let r = rig();
        let handle = PlayerHandle::new(Arc::clone(&r.ctx));
        let cmd = Commander::new(Arc::clone(&r.ctx), r.services.clone());
        let h = std::thread::spawn(move || cmd.run());
        handle.set_speed(speed::X2);
        assert!(wait_for(|| r.ctx.pipeline.lock().skip == 2));
        handle.stop();
        h.join().unwrap();
    }
}
