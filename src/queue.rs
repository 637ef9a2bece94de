//! Fixed-capacity scan queue.
//!
//! The queue is an ordered array of channel-id slots defining visitation
//! order. Repeats are allowed and meaningful: a channel that appears twice
//! is visited twice per rotation, so its value updates twice as often.
//! Empty slots are `None` and are skipped when advancing.

/// Ordered, fixed-capacity sequence of channel ids.
#[derive(Clone, Debug)]
pub struct ScanQueue<const DEPTH: usize> {
    slots: [Option<u8>; DEPTH],
}

impl<const DEPTH: usize> ScanQueue<DEPTH> {
    /// An empty queue.
    pub const fn new() -> Self {
        Self {
            slots: [None; DEPTH],
        }
    }

    /// Append a channel id into the first empty slot.
    ///
    /// On a full queue nothing is mutated and the rejected id is handed
    /// back.
    pub fn push(&mut self, channel: u8) -> Result<(), u8> {
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(channel);
                Ok(())
            }
            None => Err(channel),
        }
    }

    /// Index of the next occupied slot strictly after `from`, wrapping
    /// circularly.
    ///
    /// If no *other* slot is occupied, `from` is returned unchanged: a
    /// single-entry (or fully empty) queue is a stable fixed point.
    pub fn advance(&self, from: usize) -> usize {
        for offset in 1..DEPTH {
            let index = (from + offset) % DEPTH;
            if self.slots[index].is_some() {
                return index;
            }
        }
        from
    }

    /// Mark a slot empty, returning the channel id that occupied it.
    pub fn vacate(&mut self, index: usize) -> Option<u8> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    /// Channel id at `index`, if the slot is occupied.
    pub fn get(&self, index: usize) -> Option<u8> {
        self.slots.get(index).copied().flatten()
    }

    /// Number of occupied slots (counting repeats).
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Total number of slots.
    pub const fn capacity(&self) -> usize {
        DEPTH
    }
}

impl<const DEPTH: usize> Default for ScanQueue<DEPTH> {
    fn default() -> Self {
        Self::new()
    }
}
