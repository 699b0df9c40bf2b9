// bucket_table.rs - Sparse key -> GrowableBitset table holding one level's state
//
// The same structure serves both orientations: bucket -> ordinals during
// collection and materialization, ordinal -> buckets between level scans.
// Heap usage is checked against a per-table limit on every accounted mutation.

use anyhow::Result;

use crate::bitset::GrowableBitset;
use crate::error::growth_error;

/// Minimum number of key slots allocated on first use.
const MIN_KEY_SLOTS: usize = 16;

#[derive(Debug, Clone)]
pub struct BucketBitsetTable {
    rows: Vec<Option<GrowableBitset>>,
    populated: usize,
    bitset_bytes: usize,
    memory_limit: usize,
}

impl BucketBitsetTable {
    pub fn new(memory_limit: usize) -> Self {
        Self {
            rows: Vec::new(),
            populated: 0,
            bitset_bytes: 0,
            memory_limit,
        }
    }

    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    /// Heap held by the key dimension and every populated bitset.
    pub fn heap_bytes(&self) -> usize {
        self.rows.capacity() * std::mem::size_of::<Option<GrowableBitset>>() + self.bitset_bytes
    }

    /// Number of populated keys.
    pub fn len(&self) -> usize {
        self.populated
    }

    pub fn is_empty(&self) -> bool {
        self.populated == 0
    }

    pub fn get(&self, key: u32) -> Option<&GrowableBitset> {
        self.rows.get(key as usize).and_then(|row| row.as_ref())
    }

    /// Bitset for `key`, created empty on first access.
    ///
    /// Bits written through the returned reference are not charged against the
    /// memory limit; `set` and `union_into` are the accounted mutation paths.
    pub fn get_or_create(&mut self, key: u32) -> Result<&mut GrowableBitset> {
        let slot = key as usize;
        if slot >= self.rows.len() {
            self.grow_keys(slot + 1)?;
        }
        let row = &mut self.rows[slot];
        if row.is_none() {
            self.populated += 1;
        }
        Ok(row.get_or_insert_with(GrowableBitset::new))
    }

    /// Set bit `bit` in the row for `key`. Returns true if it was previously unset.
    pub fn set(&mut self, key: u32, bit: u32) -> Result<bool> {
        self.check_row_growth(key, |row| row.heap_bytes_after_set(bit))?;
        let row = self.get_or_create(key)?;
        let before = row.heap_bytes();
        let newly_set = row.set(bit);
        let after = row.heap_bytes();
        self.charge(before, after)?;
        Ok(newly_set)
    }

    /// OR `bits` into the row for `key`.
    pub fn union_into(&mut self, key: u32, bits: &GrowableBitset) -> Result<()> {
        self.check_row_growth(key, |row| row.heap_bytes_after_union(bits))?;
        let row = self.get_or_create(key)?;
        let before = row.heap_bytes();
        row.union_with(bits);
        let after = row.heap_bytes();
        self.charge(before, after)
    }

    /// Pre-size the key dimension so keys `0..slots` need no reallocation.
    pub fn reserve_keys(&mut self, slots: usize) -> Result<()> {
        if slots > self.rows.len() {
            self.grow_keys(slots)?;
        }
        Ok(())
    }

    /// Populated rows in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &GrowableBitset)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .filter_map(|(key, row)| row.as_ref().map(|bits| (key as u32, bits)))
    }

    pub fn for_each(&self, mut f: impl FnMut(u32, &GrowableBitset)) {
        for (key, bits) in self.iter() {
            f(key, bits);
        }
    }

    /// Highest populated key.
    pub fn max_bucket(&self) -> Option<u32> {
        self.rows
            .iter()
            .rposition(|row| row.is_some())
            .map(|key| key as u32)
    }

    /// Highest bit set in any row.
    pub fn max_ordinal_across_all(&self) -> Option<u32> {
        self.iter().filter_map(|(_, bits)| bits.max_set_bit()).max()
    }

    /// Total set bits across all rows.
    pub fn total_set_bits(&self) -> u64 {
        self.iter().map(|(_, bits)| bits.cardinality()).sum()
    }

    /// OR every row of `other` into this table.
    pub fn merge(&mut self, other: &BucketBitsetTable) -> Result<()> {
        if let Some(max) = other.max_bucket() {
            self.reserve_keys(max as usize + 1)?;
        }
        for (key, bits) in other.iter() {
            self.union_into(key, bits)?;
        }
        Ok(())
    }

    fn grow_keys(&mut self, min_slots: usize) -> Result<()> {
        let new_len = min_slots.max(self.rows.len() * 2).max(MIN_KEY_SLOTS);
        let projected = new_len * std::mem::size_of::<Option<GrowableBitset>>() + self.bitset_bytes;
        if projected > self.memory_limit {
            return Err(growth_error(format!(
                "growing table to {} keys needs {} bytes, limit is {} bytes",
                min_slots, projected, self.memory_limit
            )));
        }
        self.rows.resize_with(new_len, || None);
        Ok(())
    }

    /// Fail before touching the row for `key` when its projected size would
    /// push the table past the limit.
    fn check_row_growth(&self, key: u32, projected: impl FnOnce(&GrowableBitset) -> usize) -> Result<()> {
        let empty = GrowableBitset::new();
        let row = self.get(key).unwrap_or(&empty);
        let after = projected(row);
        if after <= row.heap_bytes() {
            return Ok(());
        }
        let total = self.heap_bytes() - row.heap_bytes() + after;
        if total > self.memory_limit {
            return Err(growth_error(format!(
                "growing row {} to {} bytes needs {} bytes in total, limit is {} bytes",
                key, after, total, self.memory_limit
            )));
        }
        Ok(())
    }

    fn charge(&mut self, before: usize, after: usize) -> Result<()> {
        self.bitset_bytes = self.bitset_bytes + after - before;
        if self.heap_bytes() > self.memory_limit {
            return Err(growth_error(format!(
                "level table holds {} bytes, limit is {} bytes",
                self.heap_bytes(),
                self.memory_limit
            )));
        }
        Ok(())
    }
}
