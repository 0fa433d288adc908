/// A packed boolean mask used for alignment keep-masks and predicate results.
///
/// Bits are stored little-endian within each `u64` word:
/// - bit 0 is the LSB of word 0
/// - bit 63 is the MSB of word 0
///
/// The population count is cached so `count_ones` is O(1); the join engine calls it on every
/// mask it receives.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Mask {
    words: Vec<u64>,
    len: usize,
    ones: usize,
}

impl Mask {
    pub fn with_capacity_bits(bits: usize) -> Self {
        Self {
            words: Vec::with_capacity(bits.div_ceil(64)),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, value: bool) {
        let (word, bit) = (self.len / 64, self.len % 64);
        if bit == 0 {
            self.words.push(0);
        }
        self.words[word] |= u64::from(value) << bit;
        self.ones += usize::from(value);
        self.len += 1;
    }

    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "Mask index out of bounds");
        (self.words[index / 64] >> (index % 64)) & 1 == 1
    }

    pub fn count_ones(&self) -> usize {
        self.ones
    }

    pub fn all_true(&self) -> bool {
        self.ones == self.len
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |idx| self.get(idx))
    }

    /// Positions of set bits, ascending.
    pub fn ones(&self) -> Ones<'_> {
        Ones {
            words: &self.words,
            word_idx: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    /// Exclusive prefix sum: `scan[i]` is the number of set bits strictly before `i`.
    pub fn exclusive_scan(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.len);
        let mut running = 0usize;
        for bit in self.iter() {
            out.push(running);
            running += usize::from(bit);
        }
        out
    }

    /// Keep the elements of `values` whose bit is set.
    pub fn compress<T: Clone>(&self, values: &[T]) -> Vec<T> {
        debug_assert_eq!(values.len(), self.len, "Mask length mismatch");
        if self.all_true() {
            return values.to_vec();
        }
        self.ones().map(|idx| values[idx].clone()).collect()
    }
}

impl FromIterator<bool> for Mask {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut mask = Mask::with_capacity_bits(iter.size_hint().0);
        for value in iter {
            mask.push(value);
        }
        mask
    }
}

impl From<Vec<bool>> for Mask {
    fn from(values: Vec<bool>) -> Self {
        values.into_iter().collect()
    }
}

pub struct Ones<'a> {
    words: &'a [u64],
    word_idx: usize,
    current: u64,
}

impl Iterator for Ones<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        // Bits past `len` are never set, so no bounds check against the logical length.
        while self.current == 0 {
            self.word_idx += 1;
            self.current = *self.words.get(self.word_idx)?;
        }
        let bit = self.current.trailing_zeros() as usize;
        self.current &= self.current - 1;
        Some(self.word_idx * 64 + bit)
    }
}
