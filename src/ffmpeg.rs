//! FFmpeg codec backend over an in-memory AVIO context.
//!
//! Segments are already mapped, so the demuxer reads from the mapping through a custom
//! read callback instead of opening the file a second time.

use std::ffi::{c_int, c_void};
use std::ptr;
use std::sync::{Arc, Once};

use log::{debug, trace};
use playa_ffmpeg as ffmpeg;

use ffmpeg::ffi;
use ffmpeg::format::Pixel;

use crate::core::codec::{Codec, CodecError, CodecSession, DecodedFrame, FrameDescriptor, PlaneLayout};
use crate::core::segment::SegmentMap;

const AVIO_BUFFER: usize = 32 * 1024;

static FFMPEG_INIT: Once = Once::new();

fn init_ffmpeg() {
    FFMPEG_INIT.call_once(|| {
        if let Err(e) = ffmpeg::init() {
            log::error!("FFmpeg init failed: {}", e);
        }
        unsafe {
            ffi::av_log_set_level(ffi::AV_LOG_QUIET);
        }
    });
}

fn fourcc(tag: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*tag)
}

fn pixel_fourcc(format: Pixel) -> u32 {
    match format {
        Pixel::NV12 => fourcc(b"NV12"),
        Pixel::YUV420P => fourcc(b"YU12"),
        Pixel::YUYV422 => fourcc(b"YUYV"),
        _ => 0,
    }
}

/// Decoded software frame
pub struct FfmpegFrame {
    frame: ffmpeg::util::frame::video::Video,
}

impl DecodedFrame for FfmpegFrame {
    fn descriptor(&self) -> FrameDescriptor {
        let f = &self.frame;
        let planes = (0..f.planes())
            .map(|i| PlaneLayout {
                offset: 0,
                pitch: f.stride(i) as u32,
            })
            .collect();
        FrameDescriptor {
            prime_fd: None,
            format: pixel_fourcc(f.format()),
            width: f.width(),
            height: f.height(),
            planes,
        }
    }
}

struct Reader {
    data: Arc<SegmentMap>,
    pos: usize,
}

unsafe extern "C" fn read_packet(opaque: *mut c_void, buf: *mut u8, size: c_int) -> c_int {
    // SAFETY: `opaque` is the boxed Reader owned by the session for the AVIO context's lifetime.
    let reader = unsafe { &mut *(opaque as *mut Reader) };
    let left = reader.data.len() - reader.pos;
    if left == 0 || size <= 0 {
        return ffi::AVERROR_EOF;
    }
    let n = left.min(size as usize);
    // SAFETY: FFmpeg hands us `size` writable bytes at `buf`; `n <= size`.
    unsafe { ptr::copy_nonoverlapping(reader.data.as_ptr().add(reader.pos), buf, n) };
    reader.pos += n;
    n as c_int
}

struct Avio(*mut ffi::AVIOContext);

// The AVIO context is only touched by the owning session.
unsafe impl Send for Avio {}

impl Drop for Avio {
    fn drop(&mut self) {
        if self.0.is_null() {
            return;
        }
        unsafe {
            // the buffer may have been replaced by FFmpeg; free whatever it holds now
            ffi::av_freep(&mut (*self.0).buffer as *mut *mut u8 as *mut c_void);
            ffi::avio_context_free(&mut self.0);
        }
    }
}

/// One demux + decode session over a mapped segment
pub struct FfmpegSession {
    decoder: ffmpeg::decoder::Video,
    // field order: input closes before the AVIO context and reader are freed
    input: ffmpeg::format::context::Input,
    _avio: Avio,
    _reader: Box<Reader>,
    stream_index: usize,
    eof: bool,
}

impl FfmpegSession {
    fn open(data: Arc<SegmentMap>) -> Result<Self, CodecError> {
        let mut reader = Box::new(Reader { data, pos: 0 });
        unsafe {
            let buffer = ffi::av_malloc(AVIO_BUFFER) as *mut u8;
            if buffer.is_null() {
                return Err(CodecError::Open("av_malloc failed".into()));
            }
            let opaque = reader.as_mut() as *mut Reader as *mut c_void;
            let avio = Avio(ffi::avio_alloc_context(
                buffer,
                AVIO_BUFFER as c_int,
                0,
                opaque,
                Some(read_packet),
                None,
                None,
            ));
            if avio.0.is_null() {
                ffi::av_free(buffer as *mut c_void);
                return Err(CodecError::Open("avio_alloc_context failed".into()));
            }

            let mut fmt = ffi::avformat_alloc_context();
            if fmt.is_null() {
                return Err(CodecError::Open("avformat_alloc_context failed".into()));
            }
            (*fmt).pb = avio.0;
            (*fmt).flags |= ffi::AVFMT_FLAG_CUSTOM_IO as c_int;
            // frees `fmt` on failure
            let ret = ffi::avformat_open_input(&mut fmt, ptr::null(), ptr::null(), ptr::null_mut());
            if ret < 0 {
                return Err(CodecError::Open(ffmpeg::Error::from(ret).to_string()));
            }
            let input = ffmpeg::format::context::Input::wrap(fmt);
            let ret = ffi::avformat_find_stream_info(fmt, ptr::null_mut());
            if ret < 0 {
                return Err(CodecError::Open(ffmpeg::Error::from(ret).to_string()));
            }

            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| CodecError::Open("No video stream found".to_string()))?;
            let stream_index = stream.index();
            let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                .and_then(|ctx| ctx.decoder().video())
                .map_err(|e| CodecError::Open(format!("Failed to create video decoder: {}", e)))?;
            debug!("FFmpeg session {}x{} {:?}", decoder.width(), decoder.height(), decoder.format());

            Ok(Self {
                decoder,
                input,
                _avio: avio,
                _reader: reader,
                stream_index,
                eof: false,
            })
        }
    }
}

impl CodecSession for FfmpegSession {
    fn next_frame(&mut self) -> Result<Option<Box<dyn DecodedFrame>>, CodecError> {
        loop {
            let mut frame = ffmpeg::util::frame::video::Video::empty();
            match self.decoder.receive_frame(&mut frame) {
                Ok(()) => return Ok(Some(Box::new(FfmpegFrame { frame }))),
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {}
                Err(e) => return Err(CodecError::Decode(e.to_string())),
            }
            if self.eof {
                return Ok(None);
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    self.decoder
                        .send_packet(&packet)
                        .map_err(|e| CodecError::Decode(format!("Failed to send packet: {}", e)))?;
                }
                Err(ffmpeg::Error::Eof) => {
                    trace!("Segment input exhausted");
                    self.eof = true;
                    self.decoder
                        .send_eof()
                        .map_err(|e| CodecError::Decode(format!("Failed to flush decoder: {}", e)))?;
                }
                Err(e) => return Err(CodecError::Decode(e.to_string())),
            }
        }
    }
}

/// FFmpeg-backed [`Codec`]
#[derive(Debug, Default)]
pub struct FfmpegCodec;

impl FfmpegCodec {
    pub fn new() -> Self {
        init_ffmpeg();
        Self
    }
}

impl Codec for FfmpegCodec {
    fn open(&self, data: Arc<SegmentMap>) -> Result<Box<dyn CodecSession>, CodecError> {
        Ok(Box::new(FfmpegSession::open(data)?))
    }
}
