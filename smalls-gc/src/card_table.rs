/// Card granularity in bytes. Matches the managed heap's reserved range
/// divided into fixed spans; a set bit conservatively means "something in
/// this span may have been written since the card was last cleared".
pub const CARD_SIZE: u64 = 512;

/// Bitset over the reserved heap range, one bit per `CARD_SIZE`-byte span.
/// Deliberately conservative (P7): a write into a card always sets it, but
/// a set card does not guarantee every word in it changed.
#[derive(Debug)]
pub struct CardTable {
    cards: Vec<bool>,
}

impl CardTable {
    pub fn new(heap_capacity: u64) -> Self {
        let card_count = (heap_capacity / CARD_SIZE).max(1) as usize;
        Self {
            cards: vec![false; card_count],
        }
    }

    fn card_index(&self, offset: u32) -> usize {
        ((offset as u64 / CARD_SIZE) as usize).min(self.cards.len().saturating_sub(1))
    }

    pub fn mark_dirty(&mut self, offset: u32) {
        let index = self.card_index(offset);
        self.cards[index] = true;
    }

    pub fn is_dirty(&self, offset: u32) -> bool {
        self.cards[self.card_index(offset)]
    }

    pub fn clear(&mut self) {
        self.cards.iter_mut().for_each(|c| *c = false);
    }

    pub fn dirty_count(&self) -> usize {
        self.cards.iter().filter(|c| **c).count()
    }
}
