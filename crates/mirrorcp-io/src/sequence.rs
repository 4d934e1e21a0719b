//! Lazy, thread-safe, memoizing sequence
//!
//! A [`CachedSequence`] wraps one expensive producer (typically a directory
//! listing) so that any number of consumers can iterate it, repeatedly and
//! concurrently, while the producer itself is driven at most once per item.
//!
//! Items live in geometrically growing segments that are never reallocated, so
//! a slot that has been published can be handed out as `&T` for the lifetime of
//! the sequence. Reads below the published length never take the lock; only
//! the reader that needs a not-yet-produced item locks the producer, re-checks
//! the length and pulls.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

/// Capacity of the first segment; segment `k` holds `FIRST_SEGMENT << k` items
const FIRST_SEGMENT: usize = 32;
const FIRST_SEGMENT_BITS: u32 = FIRST_SEGMENT.trailing_zeros();
const SEGMENT_COUNT: usize = (usize::BITS - FIRST_SEGMENT_BITS) as usize;

type Producer<T> = Box<dyn Iterator<Item = T> + Send>;

/// Memoizing wrapper over a single producer
pub struct CachedSequence<T> {
    segments: Box<[OnceLock<Box<[OnceLock<T>]>>]>,
    len: AtomicUsize,
    exhausted: AtomicBool,
    producer: Mutex<Option<Producer<T>>>,
}

impl<T> CachedSequence<T> {
    /// Wrap a producer; nothing is pulled until the first read
    pub fn new<I>(producer: I) -> Self
    where
        I: Iterator<Item = T> + Send + 'static,
    {
        Self::with_producer(Some(Box::new(producer)))
    }

    /// A sequence that is already exhausted
    pub fn empty() -> Self {
        let sequence = Self::with_producer(None);
        sequence.exhausted.store(true, Ordering::Release);
        sequence
    }

    fn with_producer(producer: Option<Producer<T>>) -> Self {
        Self {
            segments: (0..SEGMENT_COUNT).map(|_| OnceLock::new()).collect(),
            len: AtomicUsize::new(0),
            exhausted: AtomicBool::new(false),
            producer: Mutex::new(producer),
        }
    }

    /// Item at `index`, pulling from the producer if it has not been cached yet
    pub fn get(&self, index: usize) -> Option<&T> {
        if index < self.len.load(Ordering::Acquire) {
            return self.slot(index);
        }
        if self.exhausted.load(Ordering::Acquire) {
            return None;
        }

        let mut producer = self.producer.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            // Another reader may have filled the slot while we waited
            let len = self.len.load(Ordering::Acquire);
            if index < len {
                return self.slot(index);
            }

            let Some(source) = producer.as_mut() else {
                return None;
            };
            match source.next() {
                Some(item) => {
                    self.store(len, item);
                    self.len.store(len + 1, Ordering::Release);
                }
                None => {
                    *producer = None;
                    self.exhausted.store(true, Ordering::Release);
                    return None;
                }
            }
        }
    }

    /// Iterate from the start; cached items are served without the producer
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            sequence: self,
            index: 0,
        }
    }

    /// Number of items produced so far
    pub fn cached_len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Whether the producer has reported its end
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Acquire)
    }

    /// Drain the whole sequence into a vector
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.iter().cloned().collect()
    }

    fn slot(&self, index: usize) -> Option<&T> {
        let (segment, offset) = locate(index)?;
        self.segments[segment].get()?.get(offset)?.get()
    }

    fn store(&self, index: usize, item: T) {
        let Some((segment, offset)) = locate(index) else {
            return;
        };
        let slots = self.segments[segment].get_or_init(|| {
            (0..FIRST_SEGMENT << segment)
                .map(|_| OnceLock::new())
                .collect()
        });
        // Only the lock holder writes, and each index is written once
        let _ = slots[offset].set(item);
    }
}

/// Segment and offset for a flat index
fn locate(index: usize) -> Option<(usize, usize)> {
    let n = index.checked_add(FIRST_SEGMENT)?;
    let bit = usize::BITS - 1 - n.leading_zeros();
    let segment = (bit - FIRST_SEGMENT_BITS) as usize;
    Some((segment, n - (1usize << bit)))
}

impl<T> fmt::Debug for CachedSequence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedSequence")
            .field("cached_len", &self.cached_len())
            .field("exhausted", &self.is_exhausted())
            .finish()
    }
}

/// Iterator over a [`CachedSequence`]
#[derive(Debug)]
pub struct Iter<'a, T> {
    sequence: &'a CachedSequence<T>,
    index: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.sequence.get(self.index)?;
        self.index += 1;
        Some(item)
    }
}

impl<'a, T> IntoIterator for &'a CachedSequence<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
