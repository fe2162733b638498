use crate::consumer::normalize_properties;
use crate::queries::read_messages::{ReadLimit, StreamMessage};
use crate::session::Delivery;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Collects deliveries pushed by a subscription up to a fixed limit.
pub(crate) struct MessageAccumulator {
    limit: usize,
    messages: Mutex<Vec<StreamMessage>>,
    completed: mpsc::Sender<()>,
}

impl MessageAccumulator {
    /// The receiver gets one signal once the limit is reached.
    pub fn new(limit: ReadLimit) -> (Self, mpsc::Receiver<()>) {
        let (completed, completed_rx) = mpsc::channel(1);
        let accumulator = Self {
            limit: limit.get(),
            messages: Mutex::new(Vec::with_capacity(limit.get())),
            completed,
        };

        (accumulator, completed_rx)
    }

    pub fn push(&self, delivery: Delivery) {
        let mut messages = self.messages.lock();
        if messages.len() >= self.limit {
            return;
        }

        let properties = normalize_properties(&delivery.message);
        messages.push(StreamMessage {
            offset: delivery.offset,
            timestamp: Utc::now(),
            data: delivery.message.data,
            properties,
        });

        if messages.len() >= self.limit {
            // a pending signal already says the same thing
            let _ = self.completed.try_send(());
        }
    }

    pub fn take(&self) -> Vec<StreamMessage> {
        std::mem::take(&mut *self.messages.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::RawMessage;

    fn delivery(offset: u64) -> Delivery {
        Delivery {
            offset,
            message: RawMessage::default(),
        }
    }

    #[test]
    fn drops_deliveries_past_the_limit() {
        let (accumulator, mut completed) = MessageAccumulator::new(ReadLimit::from_requested(2));

        for offset in 0..5 {
            accumulator.push(delivery(offset));
        }

        let offsets = accumulator.take().iter().map(|m| m.offset).collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 1]);
        assert!(completed.try_recv().is_ok());
        assert!(completed.try_recv().is_err());
    }

    #[test]
    fn no_signal_below_the_limit() {
        let (accumulator, mut completed) = MessageAccumulator::new(ReadLimit::from_requested(3));

        accumulator.push(delivery(7));

        assert!(completed.try_recv().is_err());
        assert_eq!(accumulator.take().len(), 1);
    }
}
