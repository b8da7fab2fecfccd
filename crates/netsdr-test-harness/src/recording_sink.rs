//! A [`SampleSink`] that keeps everything it is given.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;

use netsdr_core::sink::{IqBuffer, SampleSink};

/// Records every delivered [`IqBuffer`] for later inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    buffers: Mutex<Vec<IqBuffer>>,
    notify: Notify,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All buffers delivered so far.
    pub fn buffers(&self) -> Vec<IqBuffer> {
        self.buffers
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default()
    }

    /// All samples delivered so far, concatenated.
    pub fn samples(&self) -> Vec<i32> {
        self.buffers()
            .into_iter()
            .flat_map(|b| b.samples)
            .collect()
    }

    /// Number of buffers delivered so far.
    pub fn len(&self) -> usize {
        self.buffers.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// Whether nothing has been delivered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `count` buffers have arrived.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

impl SampleSink for RecordingSink {
    fn deliver(&self, buffer: IqBuffer) {
        if let Ok(mut buffers) = self.buffers.lock() {
            buffers.push(buffer);
        }
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsdr_core::MessageType;
    use std::sync::Arc;

    #[tokio::test]
    async fn wait_for_sees_later_delivery() {
        let sink = Arc::new(RecordingSink::new());
        let writer = Arc::clone(&sink);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.deliver(IqBuffer {
                msg_type: MessageType::DataItem1,
                sample_width: 16,
                samples: vec![7, 8],
            });
        });

        assert!(sink.wait_for(1, Duration::from_secs(2)).await);
        assert_eq!(sink.samples(), vec![7, 8]);
    }

    #[tokio::test]
    async fn wait_for_times_out() {
        let sink = RecordingSink::new();
        assert!(!sink.wait_for(1, Duration::from_millis(20)).await);
        assert!(sink.is_empty());
    }
}
