//! In-process media backend that produces synthetic 4:2:0 frames.
//!
//! Used for tests and for `synthetic://WxH[@fps]` locators, where it emits an
//! endless moving gradient paced at the requested frame rate.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::info;

use crate::error::CaptureError;
use crate::pipeline::StopToken;

use super::backend::{MediaBackend, MediaKind, StreamInfo, StreamPacket};
use super::frame::{PixelFormat, PlanarFrame};

pub const SCHEME: &str = "synthetic://";

/// Stream index carrying video; index 1 carries audio.
pub const VIDEO_STREAM: usize = 0;
pub const AUDIO_STREAM: usize = 1;

/// Scripted input, one per packet read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntheticEvent {
    /// Video packet that completes a frame of uniform Y, U and V.
    Frame { y: u8, u: u8, v: u8 },
    /// Video packet that completes a uniform frame of a different size.
    Resized { width: usize, height: usize, y: u8 },
    /// Video packet that completes a frame in a non-convertible format.
    Unsupported(PixelFormat),
    /// Video packet the decoder needs more data after.
    Partial,
    /// Video packet the decoder rejects.
    Corrupt,
    /// Packet of the audio stream.
    Audio,
    /// Failed container read.
    ReadError,
    /// End of stream for this read.
    End,
    /// Moving gradient frame.
    Gradient { phase: u8 },
    /// Video packet that completes two gray frames; the second stays
    /// buffered in the decoder until drained.
    Pair { first: u8, second: u8 },
}

impl SyntheticEvent {
    pub fn gray(y: u8) -> Self {
        SyntheticEvent::Frame { y, u: 128, v: 128 }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticPacket {
    stream_index: usize,
    event: SyntheticEvent,
}

impl StreamPacket for SyntheticPacket {
    fn stream_index(&self) -> usize {
        self.stream_index
    }
}

enum Mode {
    Scripted(VecDeque<SyntheticEvent>),
    Live { interval: Duration, phase: u8 },
}

/// Mock stream source for testing that produces synthetic frames.
pub struct SyntheticBackend {
    width: usize,
    height: usize,
    streams: Vec<StreamInfo>,
    mode: Mode,
    stop: StopToken,
    decoder_open: bool,
    fail_decoder: bool,
    frame_interval_us: u64,
    // Reusable decode frame
    planes: [Vec<u8>; 3],
    strides: [usize; 3],
    frame_size: (usize, usize),
    format: PixelFormat,
    frames_decoded: u64,
    /// Luma of a decoded frame not handed out yet
    buffered: Option<u8>,
}

impl SyntheticBackend {
    /// Backend that plays `events` once, then reports end of stream.
    pub fn scripted(width: usize, height: usize, events: impl IntoIterator<Item = SyntheticEvent>) -> Self {
        Self::with_mode(width, height, Mode::Scripted(events.into_iter().collect()))
    }

    /// Endless gradient at `fps` frames per second.
    pub fn live(width: usize, height: usize, fps: u32) -> Self {
        let interval = Duration::from_secs(1) / fps.max(1);
        let mut backend = Self::with_mode(width, height, Mode::Live { interval, phase: 0 });
        backend.frame_interval_us = interval.as_micros() as u64;
        backend
    }

    fn with_mode(width: usize, height: usize, mode: Mode) -> Self {
        let streams = vec![
            StreamInfo {
                index: VIDEO_STREAM,
                kind: MediaKind::Video,
                codec: "rawvideo".into(),
                width,
                height,
            },
            StreamInfo {
                index: AUDIO_STREAM,
                kind: MediaKind::Audio,
                codec: "pcm_s16le".into(),
                width: 0,
                height: 0,
            },
        ];

        Self {
            width,
            height,
            streams,
            mode,
            stop: StopToken::new(),
            decoder_open: false,
            fail_decoder: false,
            frame_interval_us: 40_000,
            planes: [Vec::new(), Vec::new(), Vec::new()],
            strides: [0; 3],
            frame_size: (0, 0),
            format: PixelFormat::Yuv420p,
            frames_decoded: 0,
            buffered: None,
        }
    }

    /// Replace the probed stream list.
    pub fn with_streams(mut self, streams: Vec<StreamInfo>) -> Self {
        self.streams = streams;
        self
    }

    /// Make `open_decoder` fail.
    pub fn with_decoder_failure(mut self) -> Self {
        self.fail_decoder = true;
        self
    }

    pub fn with_stop_token(mut self, stop: StopToken) -> Self {
        self.stop = stop;
        self
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Parse `synthetic://WxH[@fps]`.
    fn parse_locator(locator: &str) -> Option<(usize, usize, u32)> {
        let rest = locator.strip_prefix(SCHEME)?;
        let (size, fps) = match rest.split_once('@') {
            Some((size, fps)) => (size, fps.parse().ok()?),
            None => (rest, 25),
        };
        let (w, h) = size.split_once('x')?;
        let (w, h) = (w.parse().ok()?, h.parse().ok()?);
        if w == 0 || h == 0 || fps == 0 {
            return None;
        }
        Some((w, h, fps))
    }

    fn fill(&mut self, width: usize, height: usize, format: PixelFormat, pixel: impl Fn(usize, usize) -> (u8, u8, u8)) {
        let cw = width.div_ceil(2);
        let ch = height.div_ceil(2);
        self.strides = [width, cw, cw];
        self.planes[0].resize(width * height, 0);
        self.planes[1].resize(cw * ch, 0);
        self.planes[2].resize(cw * ch, 0);

        for i in 0..height {
            for j in 0..width {
                let (y, u, v) = pixel(i, j);
                self.planes[0][i * width + j] = y;
                if i % 2 == 0 && j % 2 == 0 {
                    self.planes[1][(i / 2) * cw + j / 2] = u;
                    self.planes[2][(i / 2) * cw + j / 2] = v;
                }
            }
        }

        self.frame_size = (width, height);
        self.format = format;
        self.frames_decoded += 1;
    }
}

impl MediaBackend for SyntheticBackend {
    type Packet = SyntheticPacket;

    fn open(locator: &str, stop: StopToken) -> Result<Self, CaptureError> {
        let (width, height, fps) =
            Self::parse_locator(locator).ok_or_else(|| CaptureError::Open {
                locator: locator.to_string(),
                reason: "expected synthetic://WIDTHxHEIGHT[@FPS]".into(),
            })?;
        info!(width, height, fps, "opened synthetic source");
        Ok(Self::live(width, height, fps).with_stop_token(stop))
    }

    fn probe(&mut self) -> Result<Vec<StreamInfo>, CaptureError> {
        Ok(self.streams.clone())
    }

    fn open_decoder(&mut self, stream: &StreamInfo) -> Result<(), CaptureError> {
        if self.fail_decoder || stream.kind != MediaKind::Video {
            return Err(CaptureError::Decoder(format!(
                "no decoder for stream {} ({})",
                stream.index, stream.codec
            )));
        }
        self.decoder_open = true;
        Ok(())
    }

    fn read_packet(&mut self) -> Option<Result<SyntheticPacket, CaptureError>> {
        if self.stop.is_stopped() {
            return None;
        }

        let event = match &mut self.mode {
            Mode::Scripted(events) => events.pop_front()?,
            Mode::Live { interval, phase } => {
                std::thread::sleep(*interval);
                *phase = phase.wrapping_add(1);
                SyntheticEvent::Gradient { phase: *phase }
            }
        };

        let stream_index = match event {
            SyntheticEvent::End => return None,
            SyntheticEvent::ReadError => {
                return Some(Err(CaptureError::Read("synthetic read error".into())))
            }
            SyntheticEvent::Audio => AUDIO_STREAM,
            _ => VIDEO_STREAM,
        };
        Some(Ok(SyntheticPacket {
            stream_index,
            event,
        }))
    }

    fn decode(&mut self, packet: &SyntheticPacket) -> Result<bool, CaptureError> {
        if !self.decoder_open {
            return Err(CaptureError::Decoder("decoder not opened".into()));
        }

        let (width, height) = (self.width, self.height);
        match packet.event {
            SyntheticEvent::Frame { y, u, v } => {
                self.fill(width, height, PixelFormat::Yuv420p, |_, _| (y, u, v));
            }
            SyntheticEvent::Resized { width, height, y } => {
                self.fill(width, height, PixelFormat::Yuv420p, |_, _| (y, 128, 128));
            }
            SyntheticEvent::Unsupported(format) => {
                self.fill(width, height, format, |_, _| (0, 128, 128));
            }
            SyntheticEvent::Gradient { phase } => {
                self.fill(width, height, PixelFormat::Yuvj420p, |i, j| {
                    let y = (i + j + usize::from(phase)) as u8;
                    (y, phase, 255 - phase)
                });
            }
            SyntheticEvent::Pair { first, second } => {
                self.fill(width, height, PixelFormat::Yuv420p, |_, _| (first, 128, 128));
                self.buffered = Some(second);
            }
            SyntheticEvent::Corrupt => {
                return Err(CaptureError::Decoder("invalid data in packet".into()))
            }
            SyntheticEvent::Partial
            | SyntheticEvent::Audio
            | SyntheticEvent::ReadError
            | SyntheticEvent::End => return Ok(false),
        }
        Ok(true)
    }

    fn drain_frame(&mut self) -> Result<bool, CaptureError> {
        let Some(y) = self.buffered.take() else {
            return Ok(false);
        };
        let (width, height) = (self.width, self.height);
        self.fill(width, height, PixelFormat::Yuv420p, |_, _| (y, 128, 128));
        Ok(true)
    }

    fn frame(&self) -> Option<PlanarFrame<'_>> {
        if self.frames_decoded == 0 {
            return None;
        }
        Some(PlanarFrame {
            width: self.frame_size.0,
            height: self.frame_size.1,
            format: self.format,
            planes: [&self.planes[0], &self.planes[1], &self.planes[2]],
            strides: self.strides,
            pts_us: Some((self.frames_decoded - 1) * self.frame_interval_us),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_locator() {
        assert_eq!(
            SyntheticBackend::parse_locator("synthetic://320x240@30"),
            Some((320, 240, 30))
        );
        assert_eq!(
            SyntheticBackend::parse_locator("synthetic://64x48"),
            Some((64, 48, 25))
        );
        assert_eq!(SyntheticBackend::parse_locator("synthetic://0x48"), None);
        assert_eq!(SyntheticBackend::parse_locator("rtsp://host/x"), None);
    }

    #[test]
    fn test_open_rejects_bad_locator() {
        let result = SyntheticBackend::open("synthetic://wide", StopToken::new());
        assert!(matches!(result, Err(CaptureError::Open { .. })));
    }

    #[test]
    fn test_scripted_packets() {
        let mut backend = SyntheticBackend::scripted(
            4,
            2,
            [SyntheticEvent::Audio, SyntheticEvent::gray(50), SyntheticEvent::End],
        );
        let streams = backend.probe().unwrap();
        backend.open_decoder(&streams[0]).unwrap();
        assert!(backend.frame().is_none());

        let audio = backend.read_packet().unwrap().unwrap();
        assert_eq!(audio.stream_index(), AUDIO_STREAM);

        let video = backend.read_packet().unwrap().unwrap();
        assert!(backend.decode(&video).unwrap());
        let frame = backend.frame().unwrap();
        assert_eq!((frame.width, frame.height), (4, 2));
        assert!(frame.planes[0].iter().all(|&y| y == 50));
        assert_eq!(frame.pts_us, Some(0));

        assert!(backend.read_packet().is_none());
    }

    #[test]
    fn test_decoder_must_be_video() {
        let mut backend = SyntheticBackend::scripted(2, 2, []);
        let streams = backend.probe().unwrap();
        assert!(backend.open_decoder(&streams[1]).is_err());
    }

    #[test]
    fn test_stopped_source_ends() {
        let stop = StopToken::new();
        let mut backend = SyntheticBackend::live(2, 2, 1000).with_stop_token(stop.clone());
        assert!(backend.read_packet().is_some());
        stop.stop();
        assert!(backend.read_packet().is_none());
    }
}
