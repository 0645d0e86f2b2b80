//! Scheduling of due ECM requests across all channels.

use parking_lot::{Condvar, Mutex};
use std::time::Instant;
use tracing::debug;

struct Event {
    due: Instant,
    terminate: bool,
    channel_id: u16,
    stream_id: u16,
}

struct Inner {
    /// Ordered by due time, most distant first; the soonest event sits at
    /// the back.
    events: Vec<Event>,
    request_count: u64,
}

/// A due-time ordered event queue driving the scheduler thread.
///
/// Requests are posted by the per-channel receiver threads when an
/// ECM_response arrives; the scheduler pops them as they come due. A
/// termination event or the request budget ends the run.
pub struct EventQueue {
    inner: Mutex<Inner>,
    condvar: Condvar,
    max_ecm: Option<u64>,
}

impl EventQueue {
    pub fn new(max_ecm: Option<u64>) -> Self {
        EventQueue {
            inner: Mutex::new(Inner { events: Vec::new(), request_count: 0 }),
            condvar: Condvar::new(),
            max_ecm,
        }
    }

    /// Post a termination request at the due date.
    pub fn post_termination(&self, due: Instant) {
        self.enqueue(Event { due, terminate: true, channel_id: 0, stream_id: 0 });
    }

    /// Post an ECM request at the due date.
    pub fn post_request(&self, due: Instant, channel_id: u16, stream_id: u16) {
        self.enqueue(Event { due, terminate: false, channel_id, stream_id });
    }

    fn enqueue(&self, event: Event) {
        let mut inner = self.inner.lock();
        let position = inner
            .events
            .iter()
            .position(|queued| queued.due <= event.due)
            .unwrap_or(inner.events.len());
        let at_end = position == inner.events.len();
        inner.events.insert(position, event);

        // Only a new soonest event can move the wake-up time forward.
        if at_end {
            self.condvar.notify_one();
        }
    }

    /// Wait until the next request is due. `None` on termination.
    pub fn wait_event(&self) -> Option<(u16, u16)> {
        let mut inner = self.inner.lock();

        if let Some(max) = self.max_ecm {
            inner.request_count += 1;
            if inner.request_count > max {
                debug!("reached maximum number of requests");
                return None;
            }
        }

        loop {
            let now = Instant::now();
            let next_due = inner.events.last().map(|event| event.due);
            match next_due {
                None => {
                    self.condvar.wait(&mut inner);
                }
                Some(due) if due <= now => {
                    if let Some(event) = inner.events.pop() {
                        if event.terminate {
                            return None;
                        }
                        return Some((event.channel_id, event.stream_id));
                    }
                }
                Some(due) => {
                    self.condvar.wait_until(&mut inner, due);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn events_pop_in_due_order() {
        let queue = EventQueue::new(None);
        let now = Instant::now();
        queue.post_request(now + Duration::from_millis(30), 1, 10);
        queue.post_request(now, 2, 20);
        queue.post_request(now + Duration::from_millis(15), 3, 30);

        assert_eq!(queue.wait_event(), Some((2, 20)));
        assert_eq!(queue.wait_event(), Some((3, 30)));
        assert_eq!(queue.wait_event(), Some((1, 10)));
    }

    #[test]
    fn termination_event_stops_the_loop() {
        let queue = EventQueue::new(None);
        queue.post_termination(Instant::now());
        assert_eq!(queue.wait_event(), None);
    }

    #[test]
    fn request_budget_is_enforced() {
        let queue = EventQueue::new(Some(2));
        let now = Instant::now();
        queue.post_request(now, 1, 1);
        queue.post_request(now, 1, 2);
        queue.post_request(now, 1, 3);
        assert!(queue.wait_event().is_some());
        assert!(queue.wait_event().is_some());
        assert_eq!(queue.wait_event(), None);
    }
}
