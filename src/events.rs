//! Fan-out of `TouchEvent`s to observers (GUIs, loggers, test harnesses)
//! decoupled from the pipeline's own threads.

use std::sync::Mutex;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::warn;

use crate::types::TouchEvent;

/// A single-producer, multi-consumer broadcast of `TouchEvent`s. Each
/// subscriber gets its own bounded queue; a slow subscriber drops its oldest
/// pending event rather than blocking the tracker thread (same backpressure
/// policy as the sensor-to-pipeline queues). Shareable across worker
/// threads via `Arc<EventBus>`: subscribing and publishing both take
/// `&self`.
pub struct EventBus {
    subscribers: Mutex<Vec<(Sender<TouchEvent>, Receiver<TouchEvent>)>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        EventBus {
            subscribers: Mutex::new(Vec::new()),
            capacity,
        }
    }

    pub fn subscribe(&self) -> Receiver<TouchEvent> {
        let (tx, rx) = crossbeam_channel::bounded(self.capacity);
        self.subscribers.lock().unwrap().push((tx, rx.clone()));
        rx
    }

    /// Publish one event to every subscriber, dropping the oldest queued
    /// event for any subscriber whose queue is full.
    pub fn publish(&self, event: TouchEvent) {
        for (sender, drain) in self.subscribers.lock().unwrap().iter() {
            if let Err(TrySendError::Full(event)) = sender.try_send(event.clone()) {
                warn!(
                    "event subscriber queue full, dropping oldest before session {}",
                    event.session_id
                );
                let _ = drain.try_recv();
                let _ = sender.try_send(event);
            }
        }
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = TouchEvent>) {
        for event in events {
            self.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TouchEventKind;

    fn event(session_id: u32) -> TouchEvent {
        TouchEvent {
            kind: TouchEventKind::Update,
            session_id,
            screen_id: 0,
            u: 0.0,
            v: 0.0,
            du: 0.0,
            dv: 0.0,
            timestamp_ns: 0,
        }
    }

    #[test]
    fn each_subscriber_receives_published_events() {
        let bus = EventBus::new(4);
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();
        bus.publish(event(1));
        assert_eq!(rx1.try_recv().unwrap().session_id, 1);
        assert_eq!(rx2.try_recv().unwrap().session_id, 1);
    }

    #[test]
    fn full_queue_drops_oldest_not_the_new_event() {
        let bus = EventBus::new(1);
        let rx = bus.subscribe();
        bus.publish(event(1));
        bus.publish(event(2));
        assert_eq!(rx.try_recv().unwrap().session_id, 2);
    }

    #[test]
    fn no_subscribers_is_a_harmless_no_op() {
        let bus = EventBus::new(4);
        bus.publish(event(1));
    }
}
