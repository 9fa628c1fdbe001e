//! Contract with the external demux/decode library.
//!
//! A backend owns the open stream handle and the single reusable decode
//! frame. It is moved onto the producer thread and never shared.

use crate::error::CaptureError;
use crate::pipeline::StopToken;

use super::frame::PlanarFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Subtitle,
    Data,
    Unknown,
}

/// Probed description of one elementary stream in the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: MediaKind,
    pub codec: String,
    /// Zero when the container does not report a size up front
    pub width: usize,
    pub height: usize,
}

pub trait StreamPacket {
    /// Index of the stream this packet belongs to.
    fn stream_index(&self) -> usize;
}

pub trait MediaBackend: Send + Sized + 'static {
    type Packet: StreamPacket;

    /// Open `locator`. Long blocking operations should give up once `stop`
    /// is triggered.
    fn open(locator: &str, stop: StopToken) -> Result<Self, CaptureError>;

    /// Stream metadata of the opened container.
    fn probe(&mut self) -> Result<Vec<StreamInfo>, CaptureError>;

    /// Open a decoder for `stream` and allocate the reusable frame.
    fn open_decoder(&mut self, stream: &StreamInfo) -> Result<(), CaptureError>;

    /// Next container packet, `None` at end of stream.
    fn read_packet(&mut self) -> Option<Result<Self::Packet, CaptureError>>;

    /// Feed one packet; `Ok(true)` once a frame is fully reconstructed.
    ///
    /// A packet the decoder cannot take yet stays with the backend and is
    /// resubmitted ahead of later input.
    fn decode(&mut self, packet: &Self::Packet) -> Result<bool, CaptureError>;

    /// Hand out a frame the decoder already holds from earlier packets,
    /// without new input. Called before every packet read.
    fn drain_frame(&mut self) -> Result<bool, CaptureError> {
        Ok(false)
    }

    /// The most recently reconstructed frame.
    fn frame(&self) -> Option<PlanarFrame<'_>>;
}

/// First video stream among `streams`.
pub fn find_video_stream(streams: &[StreamInfo]) -> Option<&StreamInfo> {
    streams.iter().find(|s| s.kind == MediaKind::Video)
}
