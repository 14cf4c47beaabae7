use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::Identifier;

/// A run of pending identifiers. Ranges are walked lazily.
#[derive(Debug)]
enum Segment {
    Range(RangeInclusive<Identifier>),
    List(VecDeque<Identifier>),
}

impl Segment {
    fn next(&mut self) -> Option<Identifier> {
        match self {
            Segment::Range(range) => range.next(),
            Segment::List(ids) => ids.pop_front(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Segment::Range(range) if range.is_empty() => 0,
            Segment::Range(range) => ((range.end() - range.start()) as usize).saturating_add(1),
            Segment::List(ids) => ids.len(),
        }
    }
}

fn total(queue: &VecDeque<Segment>) -> usize {
    queue
        .iter()
        .fold(0, |sum, segment| sum.saturating_add(segment.len()))
}

/// Shared FIFO of identifiers waiting to be fetched.
///
/// Seeded once, drained monotonically. [`try_next`](Self::try_next) never
/// blocks: `None` means the work is gone for good. A seeded range costs the
/// same memory whatever its width.
#[derive(Clone, Default)]
pub struct TaskSource {
    queue: Arc<Mutex<VecDeque<Segment>>>,
}

impl TaskSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue every identifier in `[start, end]`, in order.
    pub fn from_range(start: Identifier, end: Identifier) -> Self {
        let source = Self::new();
        source.seed_range(start, end);
        source
    }

    pub fn from_ids(ids: impl IntoIterator<Item = Identifier>) -> Self {
        let source = Self::new();
        source.seed(ids);
        source
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Segment>> {
        self.queue.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned task queue");
            poisoned.into_inner()
        })
    }

    /// Append `[start, end]` to the back of the queue. Returns how many were added.
    pub fn seed_range(&self, start: Identifier, end: Identifier) -> usize {
        let segment = Segment::Range(start..=end);
        let added = segment.len();
        if added > 0 {
            self.lock().push_back(segment);
        }
        added
    }

    /// Append identifiers to the back of the queue. Returns how many were added.
    pub fn seed(&self, ids: impl IntoIterator<Item = Identifier>) -> usize {
        let ids: VecDeque<_> = ids.into_iter().collect();
        let added = ids.len();
        if added > 0 {
            self.lock().push_back(Segment::List(ids));
        }
        added
    }

    /// Atomically take the next identifier, or `None` if the source is exhausted.
    pub fn try_next(&self) -> Option<Identifier> {
        let mut queue = self.lock();
        while let Some(segment) = queue.front_mut() {
            if let Some(id) = segment.next() {
                return Some(id);
            }
            queue.pop_front();
        }
        None
    }

    /// Throw away everything still queued. Returns the number discarded.
    pub fn drain(&self) -> usize {
        let mut queue = self.lock();
        let discarded = total(&queue);
        queue.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        total(&self.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
