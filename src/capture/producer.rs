//! Read/decode/convert loop that feeds the frame queue

use std::sync::Arc;

use tracing::{debug, info, instrument, trace, warn};

use crate::error::CaptureError;
use crate::pipeline::{FrameQueue, StopToken};
use crate::utils::wall_clock_us;
use crate::{CaptureConfig, TimestampSource};

use super::backend::{MediaBackend, StreamPacket};
use super::convert::yuv420_to_buffers;
use super::frame::{FramePair, PixelFormat};

/// Outcome of one producer iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A frame pair was handed to the queue.
    Enqueued { timestamp: u64 },
    /// The session's first frame, converted and dropped.
    WarmUpDiscarded,
    UnsupportedFormat(PixelFormat),
    GeometryChanged { width: usize, height: usize },
    /// Read failed or the stream ended before a frame completed.
    NoFrame,
}

pub struct Producer<B: MediaBackend> {
    backend: B,
    video_stream: usize,
    /// Session size; fixed from the probe or the first decoded frame
    geometry: Option<(usize, usize)>,
    queue: Arc<FrameQueue<FramePair>>,
    stop: StopToken,
    config: CaptureConfig,
    warm_up_pending: bool,
}

impl<B: MediaBackend> Producer<B> {
    pub fn new(
        backend: B,
        video_stream: usize,
        geometry: Option<(usize, usize)>,
        queue: Arc<FrameQueue<FramePair>>,
        stop: StopToken,
        config: CaptureConfig,
    ) -> Self {
        Self {
            backend,
            video_stream,
            geometry,
            queue,
            stop,
            config,
            warm_up_pending: true,
        }
    }

    pub fn video_stream(&self) -> usize {
        self.video_stream
    }

    /// Run until stopped or the queue closes.
    #[instrument(skip(self), fields(stream = self.video_stream))]
    pub fn run(mut self) {
        info!("producer starting");
        let backoff = self.config.end_of_stream_backoff();

        while !self.stop.is_stopped() {
            match self.step() {
                Ok(Step::Enqueued { timestamp }) => {
                    trace!(timestamp, "frame enqueued");
                    metrics::counter!("capture_frames_enqueued_total").increment(1);
                }
                Ok(Step::WarmUpDiscarded) => debug!("dropped warm-up frame"),
                Ok(Step::UnsupportedFormat(format)) => {
                    warn!(?format, "not supported format, frame skipped");
                    metrics::counter!("capture_frames_skipped_total").increment(1);
                }
                Ok(Step::GeometryChanged { width, height }) => {
                    warn!(width, height, expected = ?self.geometry, "frame size changed, frame skipped");
                    metrics::counter!("capture_frames_skipped_total").increment(1);
                }
                Ok(Step::NoFrame) => {
                    if !backoff.is_zero() {
                        std::thread::sleep(backoff);
                    }
                }
                Err(CaptureError::Closed) => break,
                Err(e) => {
                    warn!("frame dropped: {}", e);
                    metrics::counter!("capture_frames_skipped_total").increment(1);
                }
            }
        }

        info!("producer stopped");
    }

    /// Read and decode until one frame completes, then convert and enqueue it.
    pub fn step(&mut self) -> Result<Step, CaptureError> {
        if !self.decode_next()? {
            return Ok(Step::NoFrame);
        }

        let Some(frame) = self.backend.frame() else {
            return Ok(Step::NoFrame);
        };
        if !frame.format.is_planar_yuv420() {
            return Ok(Step::UnsupportedFormat(frame.format));
        }

        let size = (frame.width, frame.height);
        match self.geometry {
            Some(expected) if expected != size => {
                return Ok(Step::GeometryChanged {
                    width: size.0,
                    height: size.1,
                });
            }
            Some(_) => {}
            None => {
                info!(width = size.0, height = size.1, "session frame size fixed");
                self.geometry = Some(size);
            }
        }

        let image = yuv420_to_buffers(&frame)?;
        let timestamp = match self.config.timestamp_source {
            TimestampSource::WallClock => wall_clock_us(),
            TimestampSource::Presentation => frame.pts_us.unwrap_or_else(wall_clock_us),
        };

        if self.warm_up_pending {
            self.warm_up_pending = false;
            return Ok(Step::WarmUpDiscarded);
        }

        self.queue.enqueue(FramePair::mono(image, timestamp))?;
        Ok(Step::Enqueued { timestamp })
    }

    /// Take a frame the decoder still holds, or feed video packets until it
    /// reports a complete one. Returns `Ok(false)` when reading stops first.
    fn decode_next(&mut self) -> Result<bool, CaptureError> {
        loop {
            if self.stop.is_stopped() {
                return Err(CaptureError::Closed);
            }

            match self.backend.drain_frame() {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => debug!("decode failed: {}", e),
            }

            let packet = match self.backend.read_packet() {
                Some(Ok(packet)) => packet,
                Some(Err(e)) => {
                    debug!("read failed: {}", e);
                    return Ok(false);
                }
                None => {
                    trace!("end of stream");
                    return Ok(false);
                }
            };

            if packet.stream_index() != self.video_stream {
                continue;
            }

            match self.backend.decode(&packet) {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => debug!("decode failed: {}", e),
            }
        }
    }
}
