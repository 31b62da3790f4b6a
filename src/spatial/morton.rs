//! Cell codes.
//!
//! A cell code packs an in-range cell coordinate into a single `u32` that
//! indexes the dense `cell_start`/`cell_end` tables of the sort-based grid.
//! With `b` bits per axis every code is below `1 << 3b`, so both codings share
//! the same table size.

use glam::UVec3;
use serde::{Deserialize, Serialize};

/// Largest supported bits per axis (30-bit codes).
pub const MAX_BITS_PER_AXIS: u32 = 10;

/// How cell coordinates are packed into a code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellCoding {
    /// Z-order bit interleaving. Neighboring cells get nearby codes.
    #[default]
    Morton,
    /// `x | y | z` laid end to end. Unique per cell but only locality
    /// preserving along z.
    Concatenation,
}

impl CellCoding {
    pub fn encode(self, cell: UVec3, bits: u32) -> u32 {
        match self {
            CellCoding::Morton => morton_encode(cell.x, cell.y, cell.z),
            CellCoding::Concatenation => concat_encode(cell, bits),
        }
    }

    pub fn decode(self, code: u32, bits: u32) -> UVec3 {
        match self {
            CellCoding::Morton => morton_decode(code),
            CellCoding::Concatenation => concat_decode(code, bits),
        }
    }
}

/// Bits needed per axis to address `resolution` cells.
pub fn bits_per_axis(resolution: u32) -> u32 {
    if resolution <= 1 {
        0
    } else {
        32 - (resolution - 1).leading_zeros()
    }
}

/// Largest dense code table a configuration may ask for (256 cells per axis).
pub const MAX_TABLE_LEN: usize = 1 << 24;

/// Number of entries in a dense code table for the given resolution.
pub fn table_len(resolution: u32) -> usize {
    1usize << (3 * bits_per_axis(resolution))
}

// Expand a 10-bit integer to 30 bits by inserting 2 zeros between each bit
#[inline]
pub fn expand_bits(v: u32) -> u32 {
    let mut x = v & 0x0000_03FF;
    x = (x | (x << 16)) & 0x0300_00FF;
    x = (x | (x << 8)) & 0x0300_F00F;
    x = (x | (x << 4)) & 0x030C_30C3;
    x = (x | (x << 2)) & 0x0924_9249;
    x
}

// Inverse of expand_bits: keep every third bit
#[inline]
pub fn compact_bits(v: u32) -> u32 {
    let mut x = v & 0x0924_9249;
    x = (x | (x >> 2)) & 0x030C_30C3;
    x = (x | (x >> 4)) & 0x0300_F00F;
    x = (x | (x >> 8)) & 0x0300_00FF;
    x = (x | (x >> 16)) & 0x0000_03FF;
    x
}

#[inline]
pub fn morton_encode(x: u32, y: u32, z: u32) -> u32 {
    expand_bits(x) | (expand_bits(y) << 1) | (expand_bits(z) << 2)
}

pub fn morton_decode(code: u32) -> UVec3 {
    UVec3::new(
        compact_bits(code),
        compact_bits(code >> 1),
        compact_bits(code >> 2),
    )
}

#[inline]
fn concat_encode(cell: UVec3, bits: u32) -> u32 {
    (cell.x << (2 * bits)) | (cell.y << bits) | cell.z
}

fn concat_decode(code: u32, bits: u32) -> UVec3 {
    let mask = (1u32 << bits) - 1;
    UVec3::new(code >> (2 * bits), (code >> bits) & mask, code & mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_per_axis() {
        assert_eq!(bits_per_axis(1), 0);
        assert_eq!(bits_per_axis(2), 1);
        assert_eq!(bits_per_axis(64), 6);
        assert_eq!(bits_per_axis(70), 7);
        assert_eq!(bits_per_axis(1024), 10);
        assert_eq!(table_len(70), 1 << 21);
    }

    #[test]
    fn test_morton_known_values() {
        assert_eq!(morton_encode(0, 0, 0), 0);
        assert_eq!(morton_encode(1, 0, 0), 0b001);
        assert_eq!(morton_encode(0, 1, 0), 0b010);
        assert_eq!(morton_encode(0, 0, 1), 0b100);
        assert_eq!(morton_encode(1023, 1023, 1023), (1 << 30) - 1);
    }

    #[test]
    fn test_codes_unique_and_in_table() {
        let res = 12;
        let bits = bits_per_axis(res);
        for coding in [CellCoding::Morton, CellCoding::Concatenation] {
            let mut seen = std::collections::HashSet::new();
            for x in 0..res {
                for y in 0..res {
                    for z in 0..res {
                        let cell = UVec3::new(x, y, z);
                        let code = coding.encode(cell, bits);
                        assert!((code as usize) < table_len(res));
                        assert!(seen.insert(code), "{coding:?} collision at {cell}");
                        assert_eq!(coding.decode(code, bits), cell);
                    }
                }
            }
        }
    }

    #[test]
    fn test_concatenation_uses_all_axes() {
        let bits = bits_per_axis(16);
        let a = CellCoding::Concatenation.encode(UVec3::new(1, 2, 3), bits);
        let b = CellCoding::Concatenation.encode(UVec3::new(1, 3, 2), bits);
        assert_ne!(a, b);
    }
}
