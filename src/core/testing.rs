//! Test doubles for the engine's collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::chunk_index::ChunkEntry;
use super::codec::{Codec, CodecError, CodecSession, DecodedFrame, FrameDescriptor, PlaneLayout};
use super::segment::{SegmentError, SegmentMap, SegmentSource, StreamId};
use super::timing::FRAMES_PER_SEGMENT;
use crate::catalog::types::{CameraConfig, CameraConfigs, MatInfo, MatPatch};
use crate::catalog::{Catalog, CatalogError};
use crate::sink::{DisplaySink, Rect};

/// Tracks frame handles alive across the test
#[derive(Debug, Clone, Default)]
pub struct FrameCounter {
    live: Arc<AtomicUsize>,
    created: Arc<AtomicUsize>,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

pub struct CountedFrame {
    counter: FrameCounter,
    fd: i32,
}

impl DecodedFrame for CountedFrame {
    fn descriptor(&self) -> FrameDescriptor {
        FrameDescriptor {
            prime_fd: Some(self.fd),
            format: 0x3231_564e, // NV12
            width: 64,
            height: 48,
            planes: vec![PlaneLayout { offset: 0, pitch: 64 }, PlaneLayout { offset: 64 * 48, pitch: 64 }],
        }
    }
}

impl Drop for CountedFrame {
    fn drop(&mut self) {
        self.counter.live.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn counted_frame(counter: &FrameCounter) -> Box<dyn DecodedFrame> {
    let fd = counter.created.fetch_add(1, Ordering::SeqCst) as i32;
    counter.live.fetch_add(1, Ordering::SeqCst);
    Box::new(CountedFrame {
        counter: counter.clone(),
        fd,
    })
}

/// Codec yielding `frames` counted frames per session
pub struct FakeCodec {
    counter: FrameCounter,
    frames: u32,
    opens: AtomicUsize,
}

impl FakeCodec {
    pub fn new(counter: FrameCounter) -> Self {
        Self {
            counter,
            frames: FRAMES_PER_SEGMENT,
            opens: AtomicUsize::new(0),
        }
    }

    pub fn with_frames(mut self, frames: u32) -> Self {
        self.frames = frames;
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

struct FakeSession {
    counter: FrameCounter,
    left: u32,
}

impl CodecSession for FakeSession {
    fn next_frame(&mut self) -> Result<Option<Box<dyn DecodedFrame>>, CodecError> {
        if self.left == 0 {
            return Ok(None);
        }
        self.left -= 1;
        Ok(Some(counted_frame(&self.counter)))
    }
}

impl Codec for FakeCodec {
    fn open(&self, data: Arc<SegmentMap>) -> Result<Box<dyn CodecSession>, CodecError> {
        if data.is_empty() {
            return Err(CodecError::Open("empty input".into()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            counter: self.counter.clone(),
            left: self.frames,
        }))
    }
}

/// In-memory segments; every indexed segment exists unless marked missing
#[derive(Default)]
pub struct MemorySegments {
    missing: Mutex<HashSet<u64>>,
}

impl MemorySegments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_missing(&self, start_ms: u64) {
        self.missing.lock().unwrap().insert(start_ms);
    }
}

impl SegmentSource for MemorySegments {
    fn map(&self, stream: &StreamId, entry: ChunkEntry) -> Result<SegmentMap, SegmentError> {
        if self.missing.lock().unwrap().contains(&entry.start_ms) {
            return Err(SegmentError::Missing(format!("{}/{:x}", stream, entry.start_ms).into()));
        }
        Ok(SegmentMap::Owned(entry.start_ms.to_le_bytes().to_vec()))
    }
}

/// Sink recording every call
#[derive(Default)]
pub struct RecordingSink {
    pub presents: Mutex<Vec<(Instant, Option<i32>)>>,
    pub configures: AtomicUsize,
    pub released: AtomicUsize,
    pub hides: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn present_count(&self) -> usize {
        self.presents.lock().unwrap().len()
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn hides(&self) -> usize {
        self.hides.load(Ordering::SeqCst)
    }
}

impl DisplaySink for RecordingSink {
    fn configure(&self, _layout: &FrameDescriptor, _z_order: u32) {
        self.configures.fetch_add(1, Ordering::SeqCst);
    }

    fn set_viewport(&self, _src: Rect, _dst: Rect) {}

    fn screen(&self) -> Rect {
        Rect::new(0, 0, 640, 480)
    }

    fn present(&self, frame: &FrameDescriptor) {
        self.presents.lock().unwrap().push((Instant::now(), frame.prime_fd));
    }

    fn release(&self, frame: Box<dyn DecodedFrame>) {
        self.released.fetch_add(1, Ordering::SeqCst);
        drop(frame);
    }

    fn hide(&self) {
        self.hides.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory catalog
#[derive(Default)]
pub struct FakeCatalog {
    pub chunks: Mutex<HashMap<(String, u32), Vec<ChunkEntry>>>,
    pub cams: Mutex<HashMap<String, CameraConfigs>>,
    pub mats: Mutex<HashMap<u32, MatInfo>>,
    pub patches: Mutex<Vec<(u32, MatPatch)>>,
    pub player: Mutex<Option<u32>>,
    pub offline: AtomicBool,
    /// Recording is on unless paused
    pub paused: AtomicBool,
    pub chunk_calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// `count` consecutive segments starting at `first_ms`
    pub fn set_chunks(&self, day: &str, camera: u32, first_ms: u64, count: u64) {
        let entries = (0..count).map(|i| ChunkEntry::new(first_ms + i * 4000, 0)).collect();
        self.chunks.lock().unwrap().insert((day.to_string(), camera), entries);
    }

    pub fn set_camera(&self, day: &str, camera: u32, mat: u32, position: u32) {
        self.cams
            .lock()
            .unwrap()
            .entry(day.to_string())
            .or_default()
            .insert(camera, CameraConfig { mat, position });
    }

    fn check(&self) -> Result<(), CatalogError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(CatalogError::Http("offline".into()))
        } else {
            Ok(())
        }
    }
}

impl Catalog for FakeCatalog {
    fn chunks(&self, day: &str, camera: u32) -> Result<Vec<ChunkEntry>, CatalogError> {
        self.chunk_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self
            .chunks
            .lock()
            .unwrap()
            .get(&(day.to_string(), camera))
            .cloned()
            .unwrap_or_default())
    }

    fn cams(&self, day: &str) -> Result<CameraConfigs, CatalogError> {
        self.check()?;
        Ok(self.cams.lock().unwrap().get(day).cloned().unwrap_or_default())
    }

    fn days(&self) -> Result<Vec<String>, CatalogError> {
        self.check()?;
        let mut days: Vec<String> = self.cams.lock().unwrap().keys().cloned().collect();
        days.sort();
        Ok(days)
    }

    fn assign_camera(&self, day: &str, camera: u32, config: CameraConfig) -> Result<(), CatalogError> {
        self.check()?;
        self.set_camera(day, camera, config.mat, config.position);
        Ok(())
    }

    fn delete_day(&self, day: &str) -> Result<(), CatalogError> {
        self.check()?;
        self.cams.lock().unwrap().remove(day);
        Ok(())
    }

    fn mat(&self, _day: &str, mat: u32) -> Result<MatInfo, CatalogError> {
        self.check()?;
        Ok(self.mats.lock().unwrap().get(&mat).cloned().unwrap_or_default())
    }

    fn patch_mat(&self, _day: &str, mat: u32, patch: &MatPatch) -> Result<(), CatalogError> {
        self.check()?;
        self.patches.lock().unwrap().push((mat, patch.clone()));
        Ok(())
    }

    fn player_camera(&self, _player: &str) -> Result<Option<u32>, CatalogError> {
        self.check()?;
        Ok(*self.player.lock().unwrap())
    }

    fn set_player_camera(&self, _player: &str, camera: Option<u32>) -> Result<(), CatalogError> {
        self.check()?;
        *self.player.lock().unwrap() = camera;
        Ok(())
    }

    fn recording(&self) -> Result<bool, CatalogError> {
        self.check()?;
        Ok(!self.paused.load(Ordering::SeqCst))
    }

    fn set_recording(&self, on: bool) -> Result<(), CatalogError> {
        self.check()?;
        self.paused.store(!on, Ordering::SeqCst);
        Ok(())
    }
}
