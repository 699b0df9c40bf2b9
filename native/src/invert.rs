// invert.rs - Transpose a level table between bucket and ordinal orientation

use anyhow::Result;

use crate::bucket_table::BucketBitsetTable;

/// For every set bit (row r, bit c) of `table`, set bit r in row c of the result.
///
/// Each set bit is visited exactly once. The output's key dimension is sized
/// from the input's highest bit up front.
pub fn invert(table: &BucketBitsetTable) -> Result<BucketBitsetTable> {
    let mut inverted = BucketBitsetTable::new(table.memory_limit());
    let Some(max_bit) = table.max_ordinal_across_all() else {
        return Ok(inverted);
    };

    inverted.reserve_keys(max_bit as usize + 1)?;
    for (row, bits) in table.iter() {
        for bit in bits.iter() {
            inverted.set(bit, row)?;
        }
    }
    Ok(inverted)
}
