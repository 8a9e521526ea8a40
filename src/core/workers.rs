//! Stream threads: one Loader, Decoder and Show per active camera stream.
//!
//! The trio shares a cancel token that is a child of the process stop token. Stopping
//! cancels, wakes every pipeline waiter and joins all three threads, so two generations
//! never touch the frame cache at the same time.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{error, trace};

use super::codec::Codec;
use super::context::{CancelToken, PlaybackContext};
use super::decoder::Decoder;
use super::loader::Loader;
use super::segment::{SegmentSource, StreamId};
use super::show::Show;
use crate::catalog::Catalog;
use crate::sink::DisplaySink;

/// Collaborators the stream threads are built from
#[derive(Clone)]
pub struct Services {
    pub catalog: Arc<dyn Catalog>,
    pub codec: Arc<dyn Codec>,
    pub segments: Arc<dyn SegmentSource>,
    pub sink: Arc<dyn DisplaySink>,
}

pub struct StreamTrio {
    stream: StreamId,
    cancel: CancelToken,
    ctx: Arc<PlaybackContext>,
    show: Option<JoinHandle<()>>,
    decoder: Option<JoinHandle<()>>,
    loader: Option<JoinHandle<()>>,
}

fn spawn_named<F>(name: &str, f: F) -> std::io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name.to_string()).spawn(f)
}

impl StreamTrio {
    /// Spawn Loader, Decoder and Show for `stream`.
    pub fn spawn(ctx: &Arc<PlaybackContext>, services: &Services, stream: StreamId) -> std::io::Result<Self> {
        let cancel = ctx.stop_token().child();
        let mut trio = StreamTrio {
            stream: stream.clone(),
            cancel: cancel.clone(),
            ctx: Arc::clone(ctx),
            show: None,
            decoder: None,
            loader: None,
        };

        let loader = Loader::new(Arc::clone(&services.catalog), stream.clone());
        let (c, s, k) = (Arc::clone(ctx), Arc::clone(&services.sink), cancel.clone());
        trio.loader = Some(spawn_named("segplay-loader", move || loader.run(c, s, k))?);

        let decoder = Decoder::new(Arc::clone(&services.codec), Arc::clone(&services.segments), stream.clone());
        let (c, s, k) = (Arc::clone(ctx), Arc::clone(&services.sink), cancel.clone());
        trio.decoder = Some(spawn_named("segplay-decoder", move || decoder.run(c, s, k))?);

        let show = Show::new(stream);
        let (c, s, k) = (Arc::clone(ctx), Arc::clone(&services.sink), cancel);
        trio.show = Some(spawn_named("segplay-show", move || show.run(c, s, k))?);

        trace!("Stream threads spawned for {}", trio.stream);
        Ok(trio)
    }

    pub fn stream(&self) -> &StreamId {
        &self.stream
    }

    /// Cancel and join Show first, then clear the overlay time, then Decoder and Loader.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn join(&self, name: &str, handle: Option<JoinHandle<()>>) {
        if let Some(h) = handle {
            if h.join().is_err() {
                error!("{} thread of {} panicked", name, self.stream);
            }
        }
    }

    fn shutdown(&mut self) {
        if self.show.is_none() && self.decoder.is_none() && self.loader.is_none() {
            return;
        }
        trace!("Stopping stream threads for {}", self.stream);
        self.cancel.cancel();
        self.ctx.pipeline.notify();

        let show = self.show.take();
        self.join("Show", show);
        self.ctx.overlay.lock().shown_ms = None;
        self.ctx.overlay.notify();

        let decoder = self.decoder.take();
        self.join("Decoder", decoder);
        let loader = self.loader.take();
        self.join("Loader", loader);
        trace!("Stream threads stopped for {}", self.stream);
    }
}

impl Drop for StreamTrio {
    fn drop(&mut self) {
        self.shutdown();
    }
}
