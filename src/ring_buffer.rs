use crate::events::Event;
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Bounded newest-first buffer of recent events.
///
/// Order is arrival order, not timestamp order: the most recently pushed
/// event is always at the front, and the oldest arrival is evicted once the
/// buffer is full.
#[derive(Debug, Clone)]
pub struct EventRingBuffer {
    events: VecDeque<Event>,
    capacity: usize,
    stats: RingBufferStats,
}

/// Counters for feed buffer activity
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RingBufferStats {
    /// Total events pushed
    pub events_pushed: u64,
    /// Events dropped off the tail
    pub events_evicted: u64,
}

impl EventRingBuffer {
    /// Create a new buffer holding at most `capacity` events
    ///
    /// # Example
    /// ```
    /// use cia_dashboard::ring_buffer::EventRingBuffer;
    ///
    /// let buffer = EventRingBuffer::new(10);
    /// assert!(buffer.is_empty());
    /// ```
    pub fn new(capacity: usize) -> Self {
        if capacity == 0 {
            panic!("Event buffer capacity must be greater than 0");
        }

        debug!("Created event buffer with capacity {}", capacity);

        Self {
            events: VecDeque::with_capacity(capacity + 1),
            capacity,
            stats: RingBufferStats::default(),
        }
    }

    /// Prepend an event, returning the evicted event if the buffer overflowed
    pub fn push(&mut self, event: Event) -> Option<Event> {
        trace!("Pushing event {} to feed buffer", event.id);

        self.events.push_front(event);
        self.stats.events_pushed += 1;

        if self.events.len() > self.capacity {
            self.stats.events_evicted += 1;
            return self.events.pop_back();
        }

        None
    }

    /// Replace the contents with an already newest-first sequence
    pub fn seed(&mut self, events: impl IntoIterator<Item = Event>) {
        self.events.clear();
        self.events.extend(events.into_iter().take(self.capacity));
        debug!("Seeded event buffer with {} events", self.events.len());
    }

    /// Events newest-first
    pub fn events(&self) -> Vec<Event> {
        self.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn stats(&self) -> RingBufferStats {
        self.stats.clone()
    }
}
