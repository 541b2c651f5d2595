//! Render-frame clock source.

use perf::{Clock, MonotonicClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const FRAME_CHANNEL_CAPACITY: usize = 256;

/// Broadcasts one timestamp per rendered frame.
///
/// The host's render loop calls [`frame`](Self::frame) after presenting each
/// frame. Monitors built with a ticker subscribe while monitoring and forward
/// each timestamp to `on_frame_boundary`. Timestamps never decrease.
#[derive(Debug, Clone)]
pub struct FrameTicker {
    clock: Arc<dyn Clock>,
    sender: broadcast::Sender<Duration>,
}

impl FrameTicker {
    /// Ticker stamping frames with a monotonic clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    /// Ticker stamping frames with `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (sender, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        Self { clock, sender }
    }

    /// Signal a frame boundary now. Returns the timestamp sent.
    pub fn frame(&self) -> Duration {
        let timestamp = self.clock.now();
        self.frame_at(timestamp);
        timestamp
    }

    /// Signal a frame boundary with an explicit timestamp.
    ///
    /// Returns the number of subscribers that will see it.
    pub fn frame_at(&self, timestamp: Duration) -> usize {
        self.sender.send(timestamp).unwrap_or(0)
    }

    /// Receive frame timestamps.
    pub fn subscribe(&self) -> broadcast::Receiver<Duration> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for FrameTicker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perf::ManualClock;

    #[tokio::test]
    async fn test_ticker_fans_out() {
        let clock = Arc::new(ManualClock::new());
        let ticker = FrameTicker::with_clock(clock.clone());
        let mut a = ticker.subscribe();
        let mut b = ticker.subscribe();
        assert_eq!(ticker.subscriber_count(), 2);

        clock.advance(Duration::from_millis(16));
        let sent = ticker.frame();

        assert_eq!(sent, Duration::from_millis(16));
        assert_eq!(a.recv().await.unwrap(), sent);
        assert_eq!(b.recv().await.unwrap(), sent);
    }

    #[test]
    fn test_frame_without_subscribers() {
        let ticker = FrameTicker::new();
        assert_eq!(ticker.frame_at(Duration::from_millis(5)), 0);
    }
}
