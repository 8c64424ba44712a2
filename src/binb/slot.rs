//! `SlotSelector` — derives which of a key table's 8 slots applies to a
//! given scrambled filename.

/// The `(c_index, p_index)` pair selected for one filename.
///
/// Both indices are in `0..8` and select into the same [`super::keytable::KeyTable`];
/// `c_index` picks the `SlotKey` whose Grid `s_str`/Tile `c_pieces` side
/// drives the rectangle source geometry, `p_index` the paired destination
/// side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotIndices {
    pub c_index: usize,
    pub p_index: usize,
}

/// Compute the `(c_index, p_index)` pair for `filename`.
///
/// Sums the byte value of each character at an odd position into `c`, each
/// character at an even position into `p`, then reduces both mod 8. The
/// filename is BinB's own name for the scrambled tile, not a path on disk.
pub fn select(filename: &str) -> SlotIndices {
    let mut c: u32 = 0;
    let mut p: u32 = 0;
    for (i, ch) in filename.chars().enumerate() {
        if i % 2 == 0 {
            p = p.wrapping_add(ch as u32);
        } else {
            c = c.wrapping_add(ch as u32);
        }
    }
    SlotIndices {
        c_index: (c % 8) as usize,
        p_index: (p % 8) as usize,
    }
}
