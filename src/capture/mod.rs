pub mod backend;
pub mod convert;
pub mod events;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod frame;
pub mod producer;
pub mod rtsp;
pub mod synthetic;

pub use backend::{MediaBackend, MediaKind, StreamInfo};
pub use events::{CaptureEvent, CaptureStatistics, FrameNotice};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegBackend;
pub use frame::{FramePair, G12Buffer, ImageBuffers, PixelFormat, PlanarFrame, Rgb, Rgb24Buffer};
pub use producer::{Producer, Step};
pub use rtsp::{CaptureState, RtspCapture, ShutdownHandle, EVENT_BACKLOG};
pub use synthetic::{SyntheticBackend, SyntheticEvent};
