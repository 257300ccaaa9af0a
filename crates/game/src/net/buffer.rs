use super::sequence::Sequence;

/// Fixed-size ring indexed by a wrapping sequence number.
///
/// Each slot remembers which sequence it holds, so a lookup for a sequence
/// that has been overwritten (or never inserted) misses instead of returning
/// another packet's data.
#[derive(Debug)]
pub struct SequenceBuffer<S: Sequence, T> {
    head: S,
    tags: Vec<Option<S>>,
    entries: Vec<T>,
}

impl<S: Sequence, T: Default> SequenceBuffer<S, T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            head: S::default(),
            tags: vec![None; capacity],
            entries: (0..capacity).map(|_| T::default()).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// One past the most recently inserted sequence.
    pub fn head(&self) -> S {
        self.head
    }

    pub fn reset(&mut self) {
        self.head = S::default();
        for tag in &mut self.tags {
            *tag = None;
        }
    }

    /// True when `sequence` is too old to be stored.
    pub fn is_stale(&self, sequence: S) -> bool {
        sequence.less_than(self.head.back(self.capacity() as u32))
    }

    /// Claims the slot for `sequence`, resetting it to `T::default()`.
    ///
    /// Returns `None` when the sequence has already fallen out of the window.
    pub fn insert(&mut self, sequence: S) -> Option<&mut T> {
        if sequence.next().greater_than(self.head) {
            self.remove_range(self.head, sequence);
            self.head = sequence.next();
        } else if self.is_stale(sequence) {
            return None;
        }

        let index = sequence.slot(self.capacity());
        self.tags[index] = Some(sequence);
        self.entries[index] = T::default();
        Some(&mut self.entries[index])
    }

    pub fn insert_with(&mut self, sequence: S, value: T) -> bool {
        match self.insert(sequence) {
            Some(entry) => {
                *entry = value;
                true
            }
            None => false,
        }
    }

    fn remove_range(&mut self, start: S, finish: S) {
        let count = finish.distance(start) as usize + 1;
        if count >= self.capacity() {
            for tag in &mut self.tags {
                *tag = None;
            }
            return;
        }

        let mut sequence = start;
        for _ in 0..count {
            let index = sequence.slot(self.capacity());
            self.tags[index] = None;
            sequence = sequence.next();
        }
    }

    pub fn remove(&mut self, sequence: S) -> Option<T> {
        let index = sequence.slot(self.capacity());
        if self.tags[index] == Some(sequence) {
            self.tags[index] = None;
            Some(std::mem::take(&mut self.entries[index]))
        } else {
            None
        }
    }

    pub fn exists(&self, sequence: S) -> bool {
        self.tags[sequence.slot(self.capacity())] == Some(sequence)
    }

    pub fn find(&self, sequence: S) -> Option<&T> {
        let index = sequence.slot(self.capacity());
        if self.tags[index] == Some(sequence) {
            Some(&self.entries[index])
        } else {
            None
        }
    }

    pub fn find_mut(&mut self, sequence: S) -> Option<&mut T> {
        let index = sequence.slot(self.capacity());
        if self.tags[index] == Some(sequence) {
            Some(&mut self.entries[index])
        } else {
            None
        }
    }

    /// Latest received sequence plus a bitfield where bit `i` marks
    /// `ack - (i + 1)` as received.
    pub fn ack_bits(&self) -> (S, u32) {
        let ack = self.head.prev();
        let mut ack_bitfield = 0u32;
        for i in 0..32u32 {
            if self.exists(ack.back(i + 1)) {
                ack_bitfield |= 1 << i;
            }
        }
        (ack, ack_bitfield)
    }

    /// Stored entries ordered oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = (S, &T)> {
        let capacity = self.capacity() as u32;
        let oldest = self.head.back(capacity);
        (0..capacity).filter_map(move |offset| {
            let mut sequence = oldest;
            for _ in 0..offset {
                sequence = sequence.next();
            }
            self.find(sequence).map(|entry| (sequence, entry))
        })
    }
}
