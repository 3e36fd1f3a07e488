use std::mem;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::events::{ChangeEvent, decode_notification};

/// FIFO buffer between the notification stream and the maintainer.
///
/// Producers append, the maintainer swaps the whole buffer out in one step,
/// so an event lands in exactly one batch.
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: Mutex<Vec<ChangeEvent>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: ChangeEvent) {
        self.pending.lock().push(event);
    }

    /// Take every queued event, oldest first, leaving the queue empty.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        mem::take(&mut *self.pending.lock())
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Decode a raw notification payload and queue it. Malformed or unknown
    /// payloads are logged and dropped. Returns whether an event was queued.
    pub fn ingest_raw(&self, payload: &str) -> bool {
        match decode_notification(payload) {
            Ok(event) => {
                debug!(kind = event.kind(), "change event queued");
                self.push(event);
                true
            }
            Err(e) => {
                warn!(error = %e, payload_len = payload.len(), "dropping undecodable notification");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::identity::CompactId;
    use std::sync::Arc;

    fn role_event(n: u8, granted: bool) -> ChangeEvent {
        ChangeEvent::UserRole {
            user_id: CompactId::from_bytes([n; 16]),
            role_id: CompactId::from_bytes([1; 16]),
            granted,
        }
    }

    #[test]
    fn test_drain_preserves_arrival_order() {
        let queue = EventQueue::new();
        queue.push(role_event(1, true));
        queue.push(role_event(1, false));
        queue.push(role_event(2, true));
        assert_eq!(queue.len(), 3);

        let batch = queue.drain();
        assert_eq!(batch, vec![role_event(1, true), role_event(1, false), role_event(2, true)]);
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_ingest_raw_queues_valid_payload() {
        let queue = EventQueue::new();
        let payload = r#"{"type":"userrolechange","userId":"2b4f0d7e-1a3c-4e5b-8f6a-9c0d1e2f3a4b","roleId":"7c8d9e0f-1a2b-4c3d-9e4f-5a6b7c8d9e0f","hasRole":true}"#;
        assert!(queue.ingest_raw(payload));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_ingest_raw_drops_garbage() {
        let queue = EventQueue::new();
        assert!(!queue.ingest_raw("not json"));
        assert!(!queue.ingest_raw(r#"{"type":"somethingelse"}"#));
        assert!(!queue.ingest_raw(r#"{"type":"userrolechange","userId":"nope","roleId":"x","hasRole":true}"#));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let queue = Arc::new(EventQueue::new());
        let handles: Vec<_> = (0..4u8)
            .map(|n| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        queue.push(role_event(n, true));
                    }
                })
            })
            .collect();

        let mut drained = 0;
        for handle in handles {
            handle.join().unwrap();
            drained += queue.drain().len();
        }
        drained += queue.drain().len();
        assert_eq!(drained, 1000);
    }
}
