use std::time::Duration;

/// Advance notice that a frame with this timestamp is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameNotice {
    /// Microseconds; 0 when capture has just started
    pub timestamp: u64,
}

/// Measurements taken around one `get_frame` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureStatistics {
    /// Time spent waiting for the queue to hand out a frame
    pub decoding_time: Duration,
    /// Time since the previous `get_frame`, absent on the first call
    pub interframe_delay: Option<Duration>,
    pub data_size: u64,
}

impl CaptureStatistics {
    /// Named values in microseconds (bytes for `data_size`).
    pub fn values(&self) -> Vec<(&'static str, u64)> {
        let mut values = vec![("decoding_time_us", as_micros(self.decoding_time))];
        if let Some(delay) = self.interframe_delay {
            values.push(("interframe_delay_us", as_micros(delay)));
        }
        values.push(("data_size", self.data_size));
        values
    }

    pub(crate) fn record_metrics(&self) {
        metrics::histogram!("capture_decoding_time_us").record(self.decoding_time.as_micros() as f64);
        if let Some(delay) = self.interframe_delay {
            metrics::histogram!("capture_interframe_delay_us").record(delay.as_micros() as f64);
        }
    }
}

fn as_micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// Everything the capture reports to its observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    NewFrame(FrameNotice),
    Statistics(CaptureStatistics),
}
