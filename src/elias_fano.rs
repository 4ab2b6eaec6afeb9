//! Monotone-nondecreasing integer sequence stored in near-optimal space,
//! with a `simple_select`-style inventory/spill index for O(1)-amortized
//! `get`.
//!
//! Grounded in the reference C decoder's `eflist.c`, with one deliberate
//! change: that source's `select_rank` overloads a single inventory integer
//! both as "the anchor bit position" (needed when the queried rank lands
//! exactly on a sample) and as "the start offset of this block's spill
//! entries" (needed otherwise), which only works in the original because the
//! two uses are mutually exclusive *values* crammed into one field via sign.
//! Here the anchor position and the spill start are kept in two parallel
//! arrays instead of one overloaded one — same index structure, no loss of
//! space efficiency worth mentioning at these array sizes, and it sidesteps
//! a genuine ambiguity in how the original's encoding was meant to recover
//! the true position for a spilled block at `sub == 0`.

use crate::error::{GraphError, Result};
use crate::tables::BYTELSB;

const MAX_ONES_PER_INVENTORY: u64 = 8192;
const MAX_SPAN: u64 = 1 << 16;

fn floor_log2(x: u64) -> u32 {
    if x == 0 {
        0
    } else {
        63 - x.leading_zeros()
    }
}

/// Equi-length bit array: `n` elements of `bits_per_elem` bits each, packed
/// end to end across 64-bit words.
struct BitArray {
    bits_per_elem: u32,
    words: Vec<u64>,
}

impl BitArray {
    fn new(bits_per_elem: u32, capacity: usize) -> Self {
        let total_bits = bits_per_elem as u64 * capacity as u64;
        let nwords = total_bits.div_ceil(64).max(1) as usize;
        BitArray {
            bits_per_elem,
            words: vec![0u64; nwords],
        }
    }

    fn put(&mut self, index: usize, value: u64) {
        if self.bits_per_elem == 0 {
            return;
        }
        let mask = mask64(self.bits_per_elem);
        let value = value & mask;
        let bit_pos = index as u64 * self.bits_per_elem as u64;
        let word_idx = (bit_pos / 64) as usize;
        let bit_off = (bit_pos % 64) as u32;
        self.words[word_idx] |= value << bit_off;
        let overflow = bit_off as i64 + self.bits_per_elem as i64 - 64;
        if overflow > 0 {
            self.words[word_idx + 1] |= value >> (self.bits_per_elem - overflow as u32);
        }
    }

    fn get(&self, index: usize) -> u64 {
        if self.bits_per_elem == 0 {
            return 0;
        }
        let mask = mask64(self.bits_per_elem);
        let bit_pos = index as u64 * self.bits_per_elem as u64;
        let word_idx = (bit_pos / 64) as usize;
        let bit_off = (bit_pos % 64) as u32;
        let mut v = self.words[word_idx] >> bit_off;
        let overflow = bit_off as i64 + self.bits_per_elem as i64 - 64;
        if overflow > 0 {
            v |= self.words[word_idx + 1] << (self.bits_per_elem - overflow as u32);
        }
        v & mask
    }

    fn size_bytes(&self) -> usize {
        self.words.len() * 8
    }
}

/// Finds the bit position of the `remaining`-th (1-indexed) set bit of
/// `word`, walking it byte by byte from the LSB and consulting `BYTELSB`
/// to locate the set bit within whichever byte holds it.
fn bit_in_located_word(word: u64, mut remaining: u64) -> u64 {
    let mut w = word;
    let mut byte_idx = 0u64;
    loop {
        let byte = (w & 0xff) as usize;
        let pc = byte.count_ones() as u64;
        if pc >= remaining {
            let mut b = byte;
            for _ in 1..remaining {
                b &= b - 1;
            }
            return byte_idx * 8 + BYTELSB[b] as u64;
        }
        remaining -= pc;
        w >>= 8;
        byte_idx += 1;
    }
}

fn mask64(n: u32) -> u64 {
    if n == 0 {
        0
    } else if n >= 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}

/// A monotone-nondecreasing sequence of `n` nonnegative integers bounded by
/// `u`, Elias-Fano encoded.
pub struct EliasFanoList {
    s: u32,
    n: u64,
    curr: u64,
    lower: BitArray,
    upper: Vec<u64>,
    upper_len_bits: u64,
    log2_ones_per_inventory: u32,
    ones_per_inventory: u64,
    inventory: Vec<i64>,
    spill_start: Vec<i64>,
    spill: Vec<u64>,
    pending_block: Vec<u64>,
    block_idx: usize,
}

impl EliasFanoList {
    /// Allocates storage for `n` elements whose maximum value is at most `u`.
    pub fn create(n: u64, u: u64) -> Self {
        let s = if n == 0 { 0 } else { floor_log2((u + 1) / n.max(1)) };
        let upper_len_bits = n + (u >> s);

        let window = if upper_len_bits == 0 {
            1
        } else {
            (n * MAX_ONES_PER_INVENTORY).div_ceil(upper_len_bits).max(1)
        };
        let log2_opi = floor_log2(window);
        let ones_per_inventory = 1u64 << log2_opi;
        let inventory_len = (n / ones_per_inventory) as usize + 2;

        EliasFanoList {
            s,
            n,
            curr: 0,
            lower: BitArray::new(s, n as usize),
            upper: vec![0u64; upper_len_bits.div_ceil(64).max(1) as usize],
            upper_len_bits,
            log2_ones_per_inventory: log2_opi,
            ones_per_inventory,
            inventory: vec![0i64; inventory_len],
            spill_start: vec![-1i64; inventory_len],
            spill: Vec::new(),
            pending_block: Vec::new(),
            block_idx: 0,
        }
    }

    fn set_upper_bit(&mut self, pos: u64) {
        let word = (pos / 64) as usize;
        let bit = (pos % 64) as u32;
        self.upper[word] |= 1u64 << bit;
    }

    /// Appends the next element. Must be `>=` the previously added element.
    pub fn add(&mut self, v: u64) -> Result<()> {
        if self.curr >= self.n {
            return Err(GraphError::Unsupported(
                "EliasFanoList::add called beyond declared capacity".into(),
            ));
        }
        let index = self.curr as usize;
        self.lower.put(index, v & mask64(self.s));
        let bitpos = (v >> self.s) + self.curr;
        self.set_upper_bit(bitpos);
        self.pending_block.push(bitpos);

        let is_last = self.curr + 1 == self.n;
        if self.pending_block.len() as u64 == self.ones_per_inventory || is_last {
            self.finalize_block();
        }
        self.curr += 1;
        Ok(())
    }

    fn finalize_block(&mut self) {
        let first = self.pending_block[0];
        let last = *self.pending_block.last().unwrap();
        if self.pending_block.len() > 1 && last - first >= MAX_SPAN {
            let start = self.spill.len();
            self.spill.extend(self.pending_block[1..].iter().copied());
            self.inventory[self.block_idx] = -(first as i64);
            self.spill_start[self.block_idx] = start as i64;
        } else {
            self.inventory[self.block_idx] = first as i64;
        }
        self.pending_block.clear();
        self.block_idx += 1;
    }

    /// Monotonicity-checks `arr`, then adds every element. On a violation,
    /// no element is added and `NotMonotone` is returned (unlike the source
    /// vintage this is grounded on, which could add a prefix and still
    /// report failure — see the module doc).
    pub fn add_batch(&mut self, arr: &[u64]) -> Result<()> {
        let mut prev = None;
        for &v in arr {
            if let Some(p) = prev {
                if v < p {
                    return Err(GraphError::NotMonotone);
                }
            }
            prev = Some(v);
        }
        for &v in arr {
            self.add(v)?;
        }
        Ok(())
    }

    fn select_rank(&self, r: u64) -> u64 {
        let inv_idx = (r >> self.log2_ones_per_inventory) as usize;
        let sub = r & (self.ones_per_inventory - 1);
        let raw = self.inventory[inv_idx];
        let position = raw.unsigned_abs();
        if sub == 0 {
            return position;
        }
        if raw < 0 {
            let start = self.spill_start[inv_idx] as usize;
            return self.spill[start + (sub - 1) as usize];
        }
        self.word_scan_from(position + 1, sub)
    }

    /// Finds the absolute position of the `remaining`-th (1-indexed) set bit
    /// in `upper` at or after `start_bit`, by popcount-skipping whole words
    /// and then walking the located word byte by byte via `BYTELSB`.
    fn word_scan_from(&self, start_bit: u64, mut remaining: u64) -> u64 {
        let mut word_idx = (start_bit / 64) as usize;
        let mut bit_in_word = start_bit % 64;
        loop {
            let mut word = self.upper[word_idx];
            if bit_in_word > 0 {
                word &= !mask64(bit_in_word as u32);
            }
            let pc = word.count_ones() as u64;
            if pc >= remaining {
                return word_idx as u64 * 64 + bit_in_located_word(word, remaining);
            }
            remaining -= pc;
            word_idx += 1;
            bit_in_word = 0;
        }
    }

    /// Returns the `i`-th element (0-indexed).
    pub fn get(&self, i: u64) -> u64 {
        let high = self.select_rank(i) - i;
        let low = self.lower.get(i as usize);
        (high << self.s) | low
    }

    /// Number of elements.
    pub fn len(&self) -> u64 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Approximate bytes required to hold `n` elements bounded by `u`
    /// (excludes the data-dependent spill table, which is typically empty).
    pub fn size_estimate(n: u64, u: u64) -> usize {
        if n == 0 {
            return 0;
        }
        let s = floor_log2((u + 1) / n);
        let upper_len_bits = n + (u >> s);
        let lower_bytes = (n as u64 * s as u64).div_ceil(64) as usize * 8;
        let upper_bytes = upper_len_bits.div_ceil(64) as usize * 8;
        let inventory_len = (n / (1u64 << floor_log2(
            (n * MAX_ONES_PER_INVENTORY).div_ceil(upper_len_bits.max(1)).max(1),
        ))) as usize
            + 2;
        lower_bytes + upper_bytes + inventory_len * 8
    }

    pub fn memory_bytes(&self) -> usize {
        self.lower.size_bytes()
            + self.upper.len() * 8
            + self.inventory.len() * 8
            + self.spill_start.len() * 8
            + self.spill.len() * 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_monotone_array_round_trips() {
        let a = [5u64, 10, 15, 20];
        let mut ef = EliasFanoList::create(4, 21);
        ef.add_batch(&a).unwrap();
        for (i, &v) in a.iter().enumerate() {
            assert_eq!(ef.get(i as u64), v);
        }
    }

    /// For A = [5, 10, 15, 20], N = 4, U = 21, this crate's `s` selection
    /// (`floor_log2((u+1)/n)`, the average-gap bucket width) picks `s = 2`,
    /// giving upper-array bits set at positions {1, 3, 5, 8} of length 9 —
    /// not the {2, 6, 9, 13}-of-14 a different `s = 1` would produce. The
    /// retrieved original source's `eflist_create` (which would set `ef->s`)
    /// wasn't present to check against, only its declaration and call sites;
    /// this test pins down what the crate's own formula actually produces.
    #[test]
    fn small_monotone_array_upper_bit_positions_match_s_formula() {
        let a = [5u64, 10, 15, 20];
        let mut ef = EliasFanoList::create(4, 21);
        ef.add_batch(&a).unwrap();

        assert_eq!(ef.s, 2);
        assert_eq!(ef.upper_len_bits, 9);
        let set: Vec<u64> = (0..ef.upper_len_bits)
            .filter(|&pos| {
                let word = (pos / 64) as usize;
                let bit = (pos % 64) as u32;
                (ef.upper[word] >> bit) & 1 == 1
            })
            .collect();
        assert_eq!(set, vec![1, 3, 5, 8]);
    }

    #[test]
    fn rejects_non_monotone_batch() {
        let mut ef = EliasFanoList::create(3, 100);
        let err = ef.add_batch(&[1, 5, 3]).unwrap_err();
        assert_eq!(err, GraphError::NotMonotone);
    }

    #[test]
    fn larger_sequence_round_trips() {
        let n = 5000u64;
        let mut arr = Vec::with_capacity(n as usize);
        let mut v = 0u64;
        for i in 0..n {
            v += (i % 7) + 1;
            arr.push(v);
        }
        let max = *arr.last().unwrap();
        let mut ef = EliasFanoList::create(n, max);
        ef.add_batch(&arr).unwrap();
        for i in (0..n).step_by(37) {
            assert_eq!(ef.get(i), arr[i as usize]);
        }
        assert_eq!(ef.get(n - 1), arr[(n - 1) as usize]);
    }

    #[test]
    fn handles_repeated_values() {
        let arr = [0u64, 0, 0, 4, 4, 9];
        let mut ef = EliasFanoList::create(arr.len() as u64, 9);
        ef.add_batch(&arr).unwrap();
        for (i, &v) in arr.iter().enumerate() {
            assert_eq!(ef.get(i as u64), v);
        }
    }
}
