use super::errors::MapError;

/// One input item tagged with its original position.
#[derive(Debug)]
pub(crate) struct Task<I> {
    pub index: usize,
    pub value: I,
}

/// What a lane emits for a task: the output value or the failure.
#[derive(Debug)]
pub(crate) struct Outcome<O, E> {
    pub index: usize,
    pub result: Result<O, MapError<E>>,
}

/// Index-addressed output slots, written only by the collector.
pub(crate) struct ResultBuffer<O> {
    slots: Vec<Option<O>>,
    completed: usize,
}

impl<O> ResultBuffer<O> {
    pub fn new(len: usize) -> Self {
        let mut slots = Vec::with_capacity(len);
        slots.resize_with(len, || None);
        Self { slots, completed: 0 }
    }

    /// Stores `value` at `index`. Returns false for an out-of-range or already filled slot.
    pub fn write(&mut self, index: usize, value: O) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) if slot.is_none() => {
                *slot = Some(value);
                self.completed += 1;
                true
            }
            _ => false,
        }
    }

    #[inline]
    pub fn completed(&self) -> usize {
        self.completed
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.completed == self.slots.len()
    }

    /// Returns the outputs in input order, or `None` if any slot is still empty.
    pub fn into_ordered(self) -> Option<Vec<O>> {
        self.slots.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_index_addressed() {
        let mut buf = ResultBuffer::new(3);
        assert!(buf.write(2, "c"));
        assert!(buf.write(0, "a"));
        assert!(!buf.is_full());
        assert!(buf.write(1, "b"));
        assert!(buf.is_full());
        assert_eq!(buf.into_ordered(), Some(vec!["a", "b", "c"]));
    }

    #[test]
    fn slot_written_at_most_once() {
        let mut buf = ResultBuffer::new(2);
        assert!(buf.write(0, 1));
        assert!(!buf.write(0, 99));
        assert!(!buf.write(5, 99));
        assert_eq!(buf.completed(), 1);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.into_ordered(), None);
    }
}
