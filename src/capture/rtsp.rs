//! Network stream capture driven by a [`MediaBackend`]
//!
//! `RtspCapture` is the consumer-facing half: it opens the stream, starts the
//! producer thread, and hands out frame pairs from the shared queue while
//! announcing upcoming frames through [`CaptureEvent`]s.

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};

use crate::error::CaptureError;
use crate::pipeline::{FrameQueue, StopToken};
use crate::utils::redact_locator;
use crate::CaptureConfig;

use super::backend::{find_video_stream, MediaBackend};
use super::events::{CaptureEvent, CaptureStatistics, FrameNotice};
use super::frame::FramePair;
use super::producer::Producer;

/// Events kept for a slow or absent listener; older ones are dropped first.
pub const EVENT_BACKLOG: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Created, stream not opened yet
    Idle,
    /// Stream and decoder open, producer not running
    Ready,
    Running,
    Stopped,
}

/// Cancels a capture session and releases anyone blocked on its queue.
#[derive(Clone)]
pub struct ShutdownHandle {
    stop: StopToken,
    queue: Arc<FrameQueue<FramePair>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.stop.stop();
        self.queue.close();
    }
}

pub struct RtspCapture<B: MediaBackend> {
    config: CaptureConfig,
    queue: Arc<FrameQueue<FramePair>>,
    stop: StopToken,
    state: CaptureState,
    producer: Option<Producer<B>>,
    handle: Option<JoinHandle<()>>,
    events_tx: flume::Sender<CaptureEvent>,
    events_rx: flume::Receiver<CaptureEvent>,
    last_frame_time: Option<Instant>,
}

impl<B: MediaBackend> RtspCapture<B> {
    pub fn new(config: CaptureConfig) -> Result<Self, CaptureError> {
        config.validate()?;
        let queue = Arc::new(FrameQueue::new(config.queue_capacity)?);
        let (events_tx, events_rx) = flume::bounded(EVENT_BACKLOG);

        debug!(
            "RtspCapture::new({}): queue capacity {}",
            redact_locator(&config.url),
            config.queue_capacity
        );

        Ok(Self {
            config,
            queue,
            stop: StopToken::new(),
            state: CaptureState::Idle,
            producer: None,
            handle: None,
            events_tx,
            events_rx,
            last_frame_time: None,
        })
    }

    /// Open the configured locator through the backend and prepare decoding.
    #[instrument(skip(self), fields(url = %redact_locator(&self.config.url)))]
    pub fn initialize(&mut self) -> Result<(), CaptureError> {
        let backend = B::open(&self.config.url, self.stop.clone()).inspect_err(|e| {
            error!("failed to open stream: {}", e);
        })?;
        self.initialize_with(backend)
    }

    /// Prepare decoding on an already opened backend.
    pub fn initialize_with(&mut self, mut backend: B) -> Result<(), CaptureError> {
        if self.state != CaptureState::Idle {
            return Err(CaptureError::AlreadyStarted);
        }

        let streams = backend.probe().inspect_err(|e| error!("{}", e))?;
        info!("stream seems to have {} streams", streams.len());
        for stream in &streams {
            debug!(
                index = stream.index,
                kind = ?stream.kind,
                codec = %stream.codec,
                width = stream.width,
                height = stream.height,
                "stream"
            );
        }

        let video = find_video_stream(&streams).cloned().ok_or_else(|| {
            let err = CaptureError::NoVideoStream {
                streams: streams.len(),
            };
            error!("{}", err);
            err
        })?;
        info!(index = video.index, codec = %video.codec, "video stream found");

        backend
            .open_decoder(&video)
            .inspect_err(|e| error!("{}", e))?;
        info!("video codec opened");

        let geometry = (video.width > 0 && video.height > 0).then_some((video.width, video.height));
        self.producer = Some(Producer::new(
            backend,
            video.index,
            geometry,
            self.queue.clone(),
            self.stop.clone(),
            self.config.clone(),
        ));
        self.state = CaptureState::Ready;
        Ok(())
    }

    /// Start the producer thread, then announce capture.
    pub fn start_capture(&mut self) -> Result<(), CaptureError> {
        match self.state {
            CaptureState::Idle => return Err(CaptureError::NotInitialized),
            CaptureState::Running | CaptureState::Stopped => {
                return Err(CaptureError::AlreadyStarted)
            }
            CaptureState::Ready => {}
        }
        let name = self.config.thread_name.clone();
        self.launch(|producer| {
            std::thread::Builder::new()
                .name(name)
                .spawn(move || producer.run())
        })
    }

    fn launch(
        &mut self,
        spawn: impl FnOnce(Producer<B>) -> io::Result<JoinHandle<()>>,
    ) -> Result<(), CaptureError> {
        let producer = self.producer.take().ok_or(CaptureError::NotInitialized)?;

        let handle = match spawn(producer) {
            Ok(handle) => handle,
            Err(e) => {
                // The producer went down with the thread; release any waiter.
                error!("failed to spawn producer thread: {}", e);
                self.shutdown_handle().shutdown();
                self.state = CaptureState::Stopped;
                return Err(CaptureError::Spawn(e));
            }
        };
        self.handle = Some(handle);
        self.state = CaptureState::Running;
        self.notify(0);

        info!("capture started");
        Ok(())
    }

    /// Live network streams cannot be paused.
    pub fn pause_capture(&mut self) -> Result<(), CaptureError> {
        Err(CaptureError::Unsupported("pause"))
    }

    pub fn support_pause(&self) -> bool {
        false
    }

    /// Announce the frame at the head of the queue, waiting for one to arrive.
    pub fn next_frame(&self) -> Result<(), CaptureError> {
        let timestamp = self.queue.peek_first()?;
        debug!(timestamp, "next frame");
        self.notify(timestamp);
        Ok(())
    }

    /// Take the next frame pair, blocking until the producer delivers one.
    ///
    /// Emits a statistics event and, while running, a notice carrying the
    /// timestamp of the frame after the next one.
    pub fn get_frame(&mut self) -> Result<FramePair, CaptureError> {
        let start = Instant::now();
        let result = self.queue.dequeue()?;
        let now = Instant::now();

        let stats = CaptureStatistics {
            decoding_time: now.duration_since(start),
            interframe_delay: self.last_frame_time.map(|last| now.duration_since(last)),
            data_size: 0,
        };
        self.last_frame_time = Some(now);
        stats.record_metrics();
        self.emit(CaptureEvent::Statistics(stats));

        if self.state == CaptureState::Running {
            match self.queue.peek_second() {
                Ok(timestamp) => self.notify(timestamp),
                Err(_) => debug!("queue closed before the following frame arrived"),
            }
        } else {
            debug!(state = ?self.state, "not running, no notification");
        }

        Ok(result)
    }

    /// Stop the producer, wake every blocked caller and wait for the thread.
    pub fn stop_capture(&mut self) {
        if self.state == CaptureState::Stopped {
            return;
        }
        self.shutdown_handle().shutdown();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("producer thread panicked");
            }
        }
        self.producer = None;
        self.state = CaptureState::Stopped;
        info!("capture stopped");
    }

    /// Receiver for frame notices and statistics.
    ///
    /// Receivers share one channel: each event goes to a single receiver.
    /// At most [`EVENT_BACKLOG`] events wait; the oldest give way to new ones.
    pub fn events(&self) -> flume::Receiver<CaptureEvent> {
        self.events_rx.clone()
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn queue(&self) -> &Arc<FrameQueue<FramePair>> {
        &self.queue
    }

    /// Handle that aborts the capture from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            stop: self.stop.clone(),
            queue: self.queue.clone(),
        }
    }

    fn notify(&self, timestamp: u64) {
        self.emit(CaptureEvent::NewFrame(FrameNotice { timestamp }));
    }

    fn emit(&self, mut event: CaptureEvent) {
        loop {
            match self.events_tx.try_send(event) {
                Ok(()) => return,
                Err(flume::TrySendError::Full(rejected)) => {
                    let _ = self.events_rx.try_recv();
                    metrics::counter!("capture_events_dropped_total").increment(1);
                    event = rejected;
                }
                // We hold a receiver ourselves, so this cannot happen.
                Err(flume::TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

impl<B: MediaBackend> Drop for RtspCapture<B> {
    fn drop(&mut self) {
        self.stop_capture();
    }
}
