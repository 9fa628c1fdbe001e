//! libavformat/libavcodec backend for RTSP and other network inputs

use std::collections::VecDeque;

use ffmpeg_next as ffmpeg;

use ffmpeg::codec::context::Context as CodecContext;
use ffmpeg::codec::decoder;
use ffmpeg::format::context::Input;
use ffmpeg::format::Pixel;
use ffmpeg::media::Type;
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg::Packet;
use tracing::{debug, info};

use crate::error::CaptureError;
use crate::pipeline::StopToken;
use crate::utils::{redact_locator, rescale_to_us};

use super::backend::{MediaBackend, MediaKind, StreamInfo, StreamPacket};
use super::frame::{PixelFormat, PlanarFrame};

impl StreamPacket for Packet {
    fn stream_index(&self) -> usize {
        self.stream()
    }
}

pub struct FfmpegBackend {
    input: Input,
    decoder: Option<decoder::Video>,
    /// Packets the decoder refused with EAGAIN, oldest first
    pending: VecDeque<Packet>,
    /// Reused for every decoded picture
    frame: VideoFrame,
    has_frame: bool,
    time_base: (i32, i32),
}

impl FfmpegBackend {
    fn pixel_format(pixel: Pixel) -> PixelFormat {
        match pixel {
            Pixel::YUV420P => PixelFormat::Yuv420p,
            Pixel::YUVJ420P => PixelFormat::Yuvj420p,
            Pixel::NV12 => PixelFormat::Nv12,
            Pixel::RGB24 => PixelFormat::Rgb24,
            other => PixelFormat::Other(ffmpeg::ffi::AVPixelFormat::from(other) as i32),
        }
    }

    fn media_kind(medium: Type) -> MediaKind {
        match medium {
            Type::Video => MediaKind::Video,
            Type::Audio => MediaKind::Audio,
            Type::Subtitle => MediaKind::Subtitle,
            Type::Data => MediaKind::Data,
            _ => MediaKind::Unknown,
        }
    }

    fn is_again(err: &ffmpeg::Error) -> bool {
        matches!(err, ffmpeg::Error::Other { errno } if *errno == libc::EAGAIN)
    }

    /// Submit queued packets until the decoder pushes back.
    fn send_pending(&mut self) -> Result<(), CaptureError> {
        let decoder = self.decoder.as_mut().ok_or(CaptureError::NotInitialized)?;
        while let Some(packet) = self.pending.front() {
            match decoder.send_packet(packet) {
                Ok(()) => {
                    self.pending.pop_front();
                }
                Err(e) if Self::is_again(&e) => break,
                Err(e) => {
                    self.pending.pop_front();
                    return Err(CaptureError::Decoder(e.to_string()));
                }
            }
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<bool, CaptureError> {
        let decoder = self.decoder.as_mut().ok_or(CaptureError::NotInitialized)?;
        match decoder.receive_frame(&mut self.frame) {
            Ok(()) => {
                self.has_frame = true;
                Ok(true)
            }
            Err(ffmpeg::Error::Eof) => Ok(false),
            Err(e) if Self::is_again(&e) => Ok(false),
            Err(e) => Err(CaptureError::Decoder(e.to_string())),
        }
    }
}

impl MediaBackend for FfmpegBackend {
    type Packet = Packet;

    fn open(locator: &str, stop: StopToken) -> Result<Self, CaptureError> {
        let open_error = |reason: String| CaptureError::Open {
            locator: redact_locator(locator),
            reason,
        };

        ffmpeg::init().map_err(|e| open_error(format!("failed to initialize FFmpeg: {e}")))?;
        ffmpeg::format::network::init();

        // The interrupt callback aborts blocking network I/O once capture stops.
        let input = ffmpeg::format::input_with_interrupt(locator, move || stop.is_stopped())
            .map_err(|e| open_error(e.to_string()))?;

        info!(
            "opened {} ({} streams)",
            redact_locator(locator),
            input.streams().count()
        );
        ffmpeg::format::context::input::dump(&input, 0, Some(&redact_locator(locator)));

        Ok(Self {
            input,
            decoder: None,
            pending: VecDeque::new(),
            frame: VideoFrame::empty(),
            has_frame: false,
            time_base: (0, 1),
        })
    }

    fn probe(&mut self) -> Result<Vec<StreamInfo>, CaptureError> {
        // Stream info is probed by libavformat while opening the input.
        let streams: Vec<StreamInfo> = self
            .input
            .streams()
            .map(|stream| {
                let params = stream.parameters();
                // Frame size is taken from the first decoded picture.
                StreamInfo {
                    index: stream.index(),
                    kind: Self::media_kind(params.medium()),
                    codec: format!("{:?}", params.id()),
                    width: 0,
                    height: 0,
                }
            })
            .collect();

        if streams.is_empty() {
            return Err(CaptureError::Probe("container reports no streams".into()));
        }
        Ok(streams)
    }

    fn open_decoder(&mut self, info: &StreamInfo) -> Result<(), CaptureError> {
        let stream = self
            .input
            .stream(info.index)
            .ok_or_else(|| CaptureError::Decoder(format!("stream {} vanished", info.index)))?;

        let context = CodecContext::from_parameters(stream.parameters())
            .map_err(|e| CaptureError::Decoder(e.to_string()))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| CaptureError::Decoder(e.to_string()))?;

        let time_base = stream.time_base();
        self.time_base = (time_base.numerator(), time_base.denominator());
        debug!(
            codec = %info.codec,
            width = decoder.width(),
            height = decoder.height(),
            time_base = ?self.time_base,
            "video codec opened"
        );

        self.decoder = Some(decoder);
        Ok(())
    }

    fn read_packet(&mut self) -> Option<Result<Packet, CaptureError>> {
        let mut packet = Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => Some(Ok(packet)),
            Err(ffmpeg::Error::Eof) => None,
            Err(e) => Some(Err(CaptureError::Read(e.to_string()))),
        }
    }

    fn decode(&mut self, packet: &Packet) -> Result<bool, CaptureError> {
        if self.decoder.is_none() {
            return Err(CaptureError::NotInitialized);
        }
        self.pending.push_back(packet.clone());
        self.send_pending()?;
        self.receive()
    }

    fn drain_frame(&mut self) -> Result<bool, CaptureError> {
        if self.decoder.is_none() {
            return Ok(false);
        }
        if self.receive()? {
            return Ok(true);
        }
        if self.pending.is_empty() {
            return Ok(false);
        }
        // Output is drained, so refused packets fit again.
        self.send_pending()?;
        self.receive()
    }

    fn frame(&self) -> Option<PlanarFrame<'_>> {
        if !self.has_frame {
            return None;
        }

        let format = Self::pixel_format(self.frame.format());
        // Plane accessors panic past the format's plane count.
        let (planes, strides) = if format.is_planar_yuv420() {
            (
                [self.frame.data(0), self.frame.data(1), self.frame.data(2)],
                [self.frame.stride(0), self.frame.stride(1), self.frame.stride(2)],
            )
        } else {
            ([&[][..]; 3], [0; 3])
        };

        let (num, den) = self.time_base;
        Some(PlanarFrame {
            width: self.frame.width() as usize,
            height: self.frame.height() as usize,
            format,
            planes,
            strides,
            pts_us: self
                .frame
                .timestamp()
                .and_then(|ts| rescale_to_us(ts, num, den)),
        })
    }
}
