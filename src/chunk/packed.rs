//! Fixed-width integer arrays packed into 64-bit words.
//!
//! Two layouts exist in the wild. Before 1.16 values are laid out as one
//! continuous bit stream and may straddle two words ([`PackedArrayAccess`]).
//! From 1.16 on each word holds `64 / bits` whole values and the leftover
//! high bits are padding ([`AlignedPackedArray`]).

/// Number of bits needed to address `count` distinct values.
pub fn bits_for(count: usize) -> u32 {
    if count <= 1 {
        0
    } else {
        usize::BITS - (count - 1).leading_zeros()
    }
}

/// Continuous bit-stream layout.
#[derive(Debug, Clone, Copy)]
pub struct PackedArrayAccess<'a> {
    data: &'a [i64],
    element_bits: u32,
    mask: u64,
}

impl<'a> PackedArrayAccess<'a> {
    /// `element_bits` is clamped to 32.
    pub fn new(data: &'a [i64], element_bits: u32) -> Self {
        let element_bits = element_bits.min(32);
        PackedArrayAccess {
            data,
            element_bits,
            mask: (1u64 << element_bits) - 1,
        }
    }

    pub fn element_bits(&self) -> u32 {
        self.element_bits
    }

    /// Value at `index`; 0 for zero-width arrays and for reads past the backing data.
    pub fn get(&self, index: usize) -> u32 {
        if self.element_bits == 0 {
            return 0;
        }
        let bit = index as u64 * self.element_bits as u64;
        let word = (bit >> 6) as usize;
        let shift = (bit & 63) as u32;
        let Some(&low) = self.data.get(word) else {
            return 0;
        };
        let mut value = (low as u64) >> shift;
        if shift + self.element_bits > 64 {
            if let Some(&high) = self.data.get(word + 1) {
                value |= (high as u64) << (64 - shift);
            }
        }
        (value & self.mask) as u32
    }

    pub fn is_correct_size(&self, expected_count: usize) -> bool {
        let words = (expected_count as u64 * self.element_bits as u64).div_ceil(64);
        self.data.len() as u64 >= words
    }
}

/// Word-aligned layout: values never straddle a word.
#[derive(Debug, Clone, Copy)]
pub struct AlignedPackedArray<'a> {
    data: &'a [i64],
    element_bits: u32,
    per_word: usize,
    mask: u64,
}

impl<'a> AlignedPackedArray<'a> {
    pub fn new(data: &'a [i64], element_bits: u32) -> Self {
        let element_bits = element_bits.min(32);
        AlignedPackedArray {
            data,
            element_bits,
            per_word: if element_bits == 0 {
                0
            } else {
                (64 / element_bits) as usize
            },
            mask: (1u64 << element_bits) - 1,
        }
    }

    pub fn element_bits(&self) -> u32 {
        self.element_bits
    }

    pub fn get(&self, index: usize) -> u32 {
        if self.element_bits == 0 {
            return 0;
        }
        let word = index / self.per_word;
        let shift = (index % self.per_word) as u32 * self.element_bits;
        match self.data.get(word) {
            Some(&w) => (((w as u64) >> shift) & self.mask) as u32,
            None => 0,
        }
    }

    pub fn is_correct_size(&self, expected_count: usize) -> bool {
        if self.element_bits == 0 {
            return true;
        }
        self.data.len() >= expected_count.div_ceil(self.per_word)
    }

    /// Exact word count this layout needs for `count` values.
    pub fn word_count(element_bits: u32, count: usize) -> usize {
        if element_bits == 0 {
            0
        } else {
            count.div_ceil((64 / element_bits.min(32)) as usize)
        }
    }
}

/// Packs values with the continuous layout. Used to build fixtures and benches.
pub fn pack_continuous(values: &[u32], element_bits: u32) -> Vec<i64> {
    if element_bits == 0 {
        return Vec::new();
    }
    let total_bits = values.len() as u64 * element_bits as u64;
    let mut words = vec![0u64; total_bits.div_ceil(64) as usize];
    let mask = (1u64 << element_bits) - 1;
    for (i, &v) in values.iter().enumerate() {
        let bit = i as u64 * element_bits as u64;
        let word = (bit >> 6) as usize;
        let shift = (bit & 63) as u32;
        let v = v as u64 & mask;
        words[word] |= v << shift;
        if shift + element_bits > 64 {
            words[word + 1] |= v >> (64 - shift);
        }
    }
    words.into_iter().map(|w| w as i64).collect()
}

/// Packs values with the aligned layout.
pub fn pack_aligned(values: &[u32], element_bits: u32) -> Vec<i64> {
    if element_bits == 0 {
        return Vec::new();
    }
    let per_word = (64 / element_bits) as usize;
    let mask = (1u64 << element_bits) - 1;
    let mut words = vec![0u64; values.len().div_ceil(per_word)];
    for (i, &v) in values.iter().enumerate() {
        let shift = (i % per_word) as u32 * element_bits;
        words[i / per_word] |= (v as u64 & mask) << shift;
    }
    words.into_iter().map(|w| w as i64).collect()
}
