//! Bounded in-memory ring buffer backing the audit log's query API.

use std::collections::VecDeque;

use parking_lot::Mutex;

use super::AuditEvent;

pub struct RingBuffer {
    capacity: usize,
    events: Mutex<VecDeque<AuditEvent>>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, event: AuditEvent) {
        let mut events = self.events.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn snapshot(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn iter_recent_first(&self) -> impl Iterator<Item = AuditEvent> {
        let mut events: Vec<AuditEvent> = self.events.lock().iter().cloned().collect();
        events.reverse();
        events.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::EventType;

    #[test]
    fn evicts_oldest_when_at_capacity() {
        let ring = RingBuffer::new(2);
        ring.push(AuditEvent::new(EventType::ExecuteEnd, "one"));
        ring.push(AuditEvent::new(EventType::ExecuteEnd, "two"));
        ring.push(AuditEvent::new(EventType::ExecuteEnd, "three"));

        let snapshot = ring.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].message, "two");
        assert_eq!(snapshot[1].message, "three");
    }

    #[test]
    fn recent_first_reverses_insertion_order() {
        let ring = RingBuffer::new(10);
        ring.push(AuditEvent::new(EventType::ExecuteEnd, "one"));
        ring.push(AuditEvent::new(EventType::ExecuteEnd, "two"));

        let recent: Vec<_> = ring.iter_recent_first().collect();
        assert_eq!(recent[0].message, "two");
        assert_eq!(recent[1].message, "one");
    }
}
