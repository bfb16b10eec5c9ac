//! Fixed-Capacity Ring Buffer Implementation

use std::iter::FusedIterator;

/// Fixed-capacity FIFO ring buffer
///
/// Storage is allocated once. Pushing into a full buffer overwrites the
/// oldest element and hands it back to the caller, which lets running
/// aggregates subtract it without rescanning the window.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    /// Pre-allocated storage
    storage: Vec<Option<T>>,
    /// Index of the oldest element
    head: usize,
    /// Number of live elements
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer with given capacity
    pub fn new(capacity: usize) -> Result<Self, crate::RingBufferError> {
        if capacity == 0 {
            return Err(crate::RingBufferError::ZeroCapacity);
        }
        let mut storage = Vec::with_capacity(capacity);
        storage.resize_with(capacity, || None);
        Ok(Self {
            storage,
            head: 0,
            len: 0,
        })
    }

    /// Push an element, returning the evicted oldest element if the buffer was full
    pub fn push(&mut self, item: T) -> Option<T> {
        let capacity = self.capacity();

        if self.len < capacity {
            let tail = (self.head + self.len) % capacity;
            self.storage[tail] = Some(item);
            self.len += 1;
            None
        } else {
            let evicted = self.storage[self.head].replace(item);
            self.head = (self.head + 1) % capacity;
            evicted
        }
    }

    /// Get the number of elements currently in the buffer
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Element at logical position `index` (0 = oldest)
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        self.storage[(self.head + index) % self.capacity()].as_ref()
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            buffer: self,
            front: 0,
            back: self.len,
        }
    }

    /// Clear the buffer, keeping its allocation
    pub fn clear(&mut self) {
        for slot in &mut self.storage {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

/// Oldest-to-newest iterator over a [`RingBuffer`]
pub struct Iter<'a, T> {
    buffer: &'a RingBuffer<T>,
    front: usize,
    back: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let item = self.buffer.get(self.front);
        self.front += 1;
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        self.buffer.get(self.back)
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}

impl<'a, T> IntoIterator for &'a RingBuffer<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_push_and_read() {
        let mut buffer = RingBuffer::new(10).unwrap();

        for i in 0..5 {
            assert!(buffer.push(i * 100).is_none());
        }

        assert_eq!(buffer.len(), 5);

        let recent: Vec<_> = buffer.iter().rev().take(3).copied().collect();
        assert_eq!(recent, vec![400, 300, 200]);
        assert_eq!(buffer.get(0), Some(&0));
        assert_eq!(buffer.get(5), None);
    }

    #[test]
    fn test_overwrite_oldest() {
        let mut buffer = RingBuffer::new(5).unwrap();

        let evicted: Vec<_> = (0..10).filter_map(|i| buffer.push(i)).collect();

        assert_eq!(buffer.len(), 5);
        assert_eq!(evicted, vec![0, 1, 2, 3, 4]);
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![5, 6, 7, 8, 9]);
        assert_eq!(buffer.get(0), Some(&5));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(RingBuffer::<u8>::new(0).is_err());
    }

    #[test]
    fn test_capacity_one_is_passthrough() {
        let mut buffer = RingBuffer::new(1).unwrap();
        assert_eq!(buffer.push('a'), None);
        assert_eq!(buffer.push('b'), Some('a'));
        assert_eq!(buffer.get(0), Some(&'b'));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut buffer = RingBuffer::new(100).unwrap();
        for i in 0..50 {
            buffer.push(i);
        }

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.iter().count(), 0);
        assert_eq!(buffer.capacity(), 100);
        assert_eq!(buffer.push(7), None);
    }

    proptest! {
        #[test]
        fn prop_keeps_exactly_last_capacity(
            capacity in 1usize..32,
            items in proptest::collection::vec(any::<i32>(), 0..200),
        ) {
            let mut buffer = RingBuffer::new(capacity).unwrap();
            for &item in &items {
                buffer.push(item);
            }
            let start = items.len().saturating_sub(capacity);
            let held: Vec<i32> = buffer.iter().copied().collect();
            prop_assert_eq!(held, items[start..].to_vec());
        }
    }
}
