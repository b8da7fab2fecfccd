//! Sample delivery.
//!
//! The client's data router hands each decoded data item to a
//! [`SampleSink`]. The sink is called from the router task, so it must not
//! block; anything slow belongs on the other side of a queue.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::types::MessageType;

/// Samples extracted from one data-item frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IqBuffer {
    /// Data-item type of the frame the samples came from.
    pub msg_type: MessageType,
    /// Width of each sample on the wire, in bits.
    pub sample_width: u16,
    /// Sign-extended samples, interleaved I/Q in arrival order.
    pub samples: Vec<i32>,
}

impl IqBuffer {
    /// Number of samples in the buffer.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Consumer of extracted IQ samples.
pub trait SampleSink: Send + Sync {
    /// Accept one buffer. Must return without blocking.
    fn deliver(&self, buffer: IqBuffer);
}

impl SampleSink for mpsc::Sender<IqBuffer> {
    fn deliver(&self, buffer: IqBuffer) {
        match self.try_send(buffer) {
            Ok(()) => {}
            Err(TrySendError::Full(buffer)) => {
                tracing::trace!(samples = buffer.len(), "Sample queue full, dropping buffer");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::trace!("Sample receiver dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(samples: Vec<i32>) -> IqBuffer {
        IqBuffer {
            msg_type: MessageType::DataItem1,
            sample_width: 16,
            samples,
        }
    }

    #[tokio::test]
    async fn mpsc_sender_delivers() {
        let (tx, mut rx) = mpsc::channel(4);
        tx.deliver(buffer(vec![1, -2, 3]));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.samples, vec![1, -2, 3]);
        assert_eq!(received.len(), 3);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        tx.deliver(buffer(vec![1]));
        tx.deliver(buffer(vec![2]));

        assert_eq!(rx.recv().await.unwrap().samples, vec![1]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_receiver_is_ignored() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        tx.deliver(buffer(Vec::new()));
    }
}
