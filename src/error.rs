use thiserror::Error;

use crate::capture::convert::ConvertError;
use crate::pipeline::{QueueClosed, QueueError};
use crate::ConfigError;

/// Failure outcome of the capture entry points.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open {locator}: {reason}")]
    Open { locator: String, reason: String },

    #[error("unable to find stream info: {0}")]
    Probe(String),

    #[error("unable to find video stream among {streams} streams")]
    NoVideoStream { streams: usize },

    #[error("unable to open codec: {0}")]
    Decoder(String),

    #[error("failed to read packet: {0}")]
    Read(String),

    #[error("capture is not initialized")]
    NotInitialized,

    #[error("capture already started")]
    AlreadyStarted,

    #[error("{0} is not supported by this source")]
    Unsupported(&'static str),

    #[error("capture session closed")]
    Closed,

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn producer thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl From<QueueClosed> for CaptureError {
    fn from(_: QueueClosed) -> Self {
        CaptureError::Closed
    }
}

pub type Result<T, E = CaptureError> = std::result::Result<T, E>;
