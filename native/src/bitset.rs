// bitset.rs - Append-only bit vector over an ordinal domain
//
// Storage grows in blocks of BLOCK_WORDS words and at least doubles on each
// reallocation. Bits are never cleared.

/// Words added per growth block (512 bits).
pub const BLOCK_WORDS: usize = 8;

const WORD_BITS: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrowableBitset {
    words: Vec<u64>,
}

impl GrowableBitset {
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Create a bitset able to hold bits `0..bits` without reallocating.
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            words: vec![0; block_aligned_words(bits)],
        }
    }

    /// Number of addressable bits before the next reallocation.
    pub fn capacity(&self) -> usize {
        self.words.len() * WORD_BITS
    }

    pub fn heap_bytes(&self) -> usize {
        self.words.capacity() * std::mem::size_of::<u64>()
    }

    /// Heap held once `set(bit)` has run. Nothing is allocated.
    pub fn heap_bytes_after_set(&self, bit: u32) -> usize {
        self.projected_heap_bytes(bit as usize + 1)
    }

    /// Heap held once `union_with(other)` has run. Nothing is allocated.
    pub fn heap_bytes_after_union(&self, other: &GrowableBitset) -> usize {
        self.projected_heap_bytes(other.used_words() * WORD_BITS)
    }

    /// Set `bit`, growing storage when needed. Returns true if the bit was previously unset.
    #[inline]
    pub fn set(&mut self, bit: u32) -> bool {
        let bit = bit as usize;
        let word = bit / WORD_BITS;
        if word >= self.words.len() {
            self.grow_to(bit + 1);
        }
        let mask = 1u64 << (bit % WORD_BITS);
        let was_unset = self.words[word] & mask == 0;
        self.words[word] |= mask;
        was_unset
    }

    #[inline]
    pub fn test(&self, bit: u32) -> bool {
        let bit = bit as usize;
        match self.words.get(bit / WORD_BITS) {
            Some(word) => word & (1u64 << (bit % WORD_BITS)) != 0,
            None => false,
        }
    }

    pub fn cardinality(&self) -> u64 {
        self.words.iter().map(|w| u64::from(w.count_ones())).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// OR every bit of `other` into this bitset.
    pub fn union_with(&mut self, other: &GrowableBitset) {
        // Trailing zero words in `other` need no room here.
        let used = other.used_words();
        if used > self.words.len() {
            self.grow_to(used * WORD_BITS);
        }
        for (dst, src) in self.words.iter_mut().zip(&other.words[..used]) {
            *dst |= *src;
        }
    }

    /// First set bit at or after `from`.
    pub fn next_set_bit(&self, from: u32) -> Option<u32> {
        let from = from as usize;
        let mut word_idx = from / WORD_BITS;
        if word_idx >= self.words.len() {
            return None;
        }
        let mut word = self.words[word_idx] & (u64::MAX << (from % WORD_BITS));
        loop {
            if word != 0 {
                return Some((word_idx * WORD_BITS + word.trailing_zeros() as usize) as u32);
            }
            word_idx += 1;
            if word_idx >= self.words.len() {
                return None;
            }
            word = self.words[word_idx];
        }
    }

    /// Highest set bit, if any.
    pub fn max_set_bit(&self) -> Option<u32> {
        let word_idx = self.words.iter().rposition(|w| *w != 0)?;
        let word = self.words[word_idx];
        Some((word_idx * WORD_BITS + (WORD_BITS - 1 - word.leading_zeros() as usize)) as u32)
    }

    pub fn iter(&self) -> SetBits<'_> {
        SetBits {
            words: &self.words,
            word_idx: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    fn used_words(&self) -> usize {
        self.words.iter().rposition(|w| *w != 0).map_or(0, |last| last + 1)
    }

    fn grown_len(&self, min_bits: usize) -> usize {
        block_aligned_words(min_bits).max(self.words.len() * 2)
    }

    fn projected_heap_bytes(&self, min_bits: usize) -> usize {
        if min_bits <= self.capacity() {
            self.heap_bytes()
        } else {
            self.grown_len(min_bits) * std::mem::size_of::<u64>()
        }
    }

    fn grow_to(&mut self, min_bits: usize) {
        let new_len = self.grown_len(min_bits);
        self.words.reserve_exact(new_len - self.words.len());
        self.words.resize(new_len, 0);
    }
}

fn block_aligned_words(bits: usize) -> usize {
    let words = bits.div_ceil(WORD_BITS);
    words.div_ceil(BLOCK_WORDS) * BLOCK_WORDS
}

/// Iterator over the set bits of a `GrowableBitset`, ascending.
pub struct SetBits<'a> {
    words: &'a [u64],
    word_idx: usize,
    current: u64,
}

impl Iterator for SetBits<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        while self.current == 0 {
            self.word_idx += 1;
            if self.word_idx >= self.words.len() {
                return None;
            }
            self.current = self.words[self.word_idx];
        }
        let bit = self.current.trailing_zeros() as usize;
        // Clear lowest set bit
        self.current &= self.current - 1;
        Some((self.word_idx * WORD_BITS + bit) as u32)
    }
}

impl<'a> IntoIterator for &'a GrowableBitset {
    type Item = u32;
    type IntoIter = SetBits<'a>;

    fn into_iter(self) -> SetBits<'a> {
        self.iter()
    }
}

impl FromIterator<u32> for GrowableBitset {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut bits = GrowableBitset::new();
        for bit in iter {
            bits.set(bit);
        }
        bits
    }
}
