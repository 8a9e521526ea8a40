//! Loader: keeps the chunk index of the active stream fresh.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use super::chunk_index::ChunkIndex;
use super::context::{CancelToken, PlaybackContext};
use super::segment::StreamId;
use crate::catalog::Catalog;
use crate::sink::DisplaySink;

/// Interval between successful refreshes
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Delay before retrying a not-ready catalog
pub const RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Result of one catalog fetch
#[derive(Debug)]
pub enum Refresh {
    Ready(ChunkIndex),
    NotReady,
}

pub struct Loader {
    catalog: Arc<dyn Catalog>,
    stream: StreamId,
    retry: Duration,
}

impl Loader {
    pub fn new(catalog: Arc<dyn Catalog>, stream: StreamId) -> Self {
        Self {
            catalog,
            stream,
            retry: RETRY_INTERVAL,
        }
    }

    pub fn with_retry(mut self, retry: Duration) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch the segment list. Errors and empty lists both mean "not ready".
    pub fn refresh(&self) -> Refresh {
        let entries = match self.catalog.chunks(&self.stream.day, self.stream.camera) {
            Ok(e) => e,
            Err(e) => {
                warn!("Chunks for {}: {}", self.stream, e);
                return Refresh::NotReady;
            }
        };
        if entries.is_empty() {
            debug!("Chunks for {} not ready", self.stream);
            return Refresh::NotReady;
        }
        match ChunkIndex::from_entries(entries) {
            Ok(index) => Refresh::Ready(index),
            Err(e) => {
                error!("Chunks for {}: {}", self.stream, e);
                Refresh::NotReady
            }
        }
    }

    /// Replace the shared index. When existing entries changed (not a pure append),
    /// the displayed wall-clock position is re-resolved. Returns whether a re-seek was queued.
    pub fn install(ctx: &PlaybackContext, index: ChunkIndex) -> bool {
        let reseek = {
            let mut p = ctx.pipeline.lock();
            let reseek = !p.index.is_prefix_of(&index) && p.show_ms != 0 && p.seek_target.is_none();
            if reseek {
                p.seek_target = Some(p.show_ms);
            }
            p.index = index;
            p.bump();
            reseek
        };
        ctx.pipeline.notify();
        reseek
    }

    /// Loader thread body. Returns when `cancel` fires.
    pub fn run(self, ctx: Arc<PlaybackContext>, sink: Arc<dyn DisplaySink>, cancel: CancelToken) {
        info!("Loader started for {}", self.stream);
        while !cancel.is_cancelled() {
            match self.refresh() {
                Refresh::NotReady => {
                    sink.hide();
                    cancel.sleep(self.retry);
                }
                Refresh::Ready(index) => {
                    let len = index.len();
                    if Self::install(&ctx, index) {
                        info!("Chunk index of {} changed, re-seeking", self.stream);
                    }
                    debug!("Refreshed {}: {} chunks", self.stream, len);
                    let p = ctx.pipeline.lock();
                    drop(ctx.pipeline.wait_while(p, REFRESH_INTERVAL, |_| !cancel.is_cancelled()));
                }
            }
        }
        info!("Loader stopped for {}", self.stream);
    }
}
