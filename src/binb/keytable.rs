//! `KeyParser` — parses slot strings into typed `Grid`/`Tile` variants and
//! validates their internal consistency.
//!
//! Table entries are never a "bare" string outside this module: the moment
//! a key table is decrypted, every slot is parsed into a [`SlotKey`] so the
//! rest of the crate works with structured data.

use regex::Regex;
use std::sync::OnceLock;

use crate::{BinbError, BinbResult};

fn grid_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^=([0-9]+)-([0-9]+)([-+])([0-9]+)-([-_0-9A-Za-z]+)$").unwrap())
}

/// One parsed Grid-variant slot half (either the `c`-side or the `p`-side).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridHalf {
    pub h: u32,
    pub v: u32,
    pub padding: u32,
    pub sign: char,
    pub body: String,
}

/// One piece of a Tile-variant slot: its grid coordinate and quadrant size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePiece {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A parsed slot key, in one of the two scrambling scheme variants.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotKey {
    /// Fixed-grid scrambling: `h` columns by `v` rows of padded rectangles.
    Grid {
        h: u32,
        v: u32,
        padding: u32,
        /// Permutation string from the `c`-slot's body.
        s_str: String,
        /// Permutation string from the paired `p`-slot's body.
        d_str: String,
    },
    /// Variable-tile scrambling: `ndx` by `ndy` pieces of non-uniform size.
    Tile {
        ndx: u32,
        ndy: u32,
        /// Pieces from the `c`-slot, in key order.
        c_pieces: Vec<TilePiece>,
        /// Pieces from the paired `p`-slot, in key order.
        d_pieces: Vec<TilePiece>,
    },
}

/// A book's full table of 8 parsed slot keys.
pub type KeyTable = [SlotKey; 8];

fn parse_grid_half(slot: &str) -> BinbResult<GridHalf> {
    let caps = grid_pattern()
        .captures(slot)
        .ok_or_else(|| BinbError::KeyParse(format!("malformed grid slot: {slot:?}")))?;
    let h: u32 = caps[1]
        .parse()
        .map_err(|_| BinbError::KeyParse(format!("bad h in {slot:?}")))?;
    let v: u32 = caps[2]
        .parse()
        .map_err(|_| BinbError::KeyParse(format!("bad v in {slot:?}")))?;
    let sign = caps[3].chars().next().unwrap();
    let padding: u32 = caps[4]
        .parse()
        .map_err(|_| BinbError::KeyParse(format!("bad padding in {slot:?}")))?;
    let body = caps[5].to_string();

    Ok(GridHalf {
        h,
        v,
        padding,
        sign,
        body,
    })
}

/// Decode one two-character Tile index (`x` or `y`) per §4.2:
/// `2*position_in_uppercase + 1` for upper-case, `2*position_in_lowercase`
/// for lower-case.
fn decode_tile_index_char(c: char) -> BinbResult<u32> {
    if c.is_ascii_uppercase() {
        Ok((c as u32 - 'A' as u32) * 2 + 1)
    } else if c.is_ascii_lowercase() {
        Ok((c as u32 - 'a' as u32) * 2)
    } else {
        Err(BinbError::KeyParse(format!(
            "tile index character not alphabetic: {c:?}"
        )))
    }
}

fn parse_tile_half(slot: &str) -> BinbResult<(u32, u32, Vec<TilePiece>)> {
    let mut parts = slot.splitn(3, '-');
    let ndx: u32 = parts
        .next()
        .ok_or_else(|| BinbError::KeyParse(format!("missing ndx in {slot:?}")))?
        .parse()
        .map_err(|_| BinbError::KeyParse(format!("bad ndx in {slot:?}")))?;
    let ndy: u32 = parts
        .next()
        .ok_or_else(|| BinbError::KeyParse(format!("missing ndy in {slot:?}")))?
        .parse()
        .map_err(|_| BinbError::KeyParse(format!("bad ndy in {slot:?}")))?;
    let data = parts
        .next()
        .ok_or_else(|| BinbError::KeyParse(format!("missing tile data in {slot:?}")))?;

    let expected_len = (2 * ndx * ndy) as usize;
    let chars: Vec<char> = data.chars().collect();
    if chars.len() != expected_len {
        return Err(BinbError::KeyParse(format!(
            "tile data length {} does not match 2*ndx*ndy={}",
            chars.len(),
            expected_len
        )));
    }

    // f, g, h, j are the piece-count boundaries from §4.2's quadrant rule.
    let f = (ndx as i64 - 1) * (ndy as i64 - 1) - 1;
    let g = f + (ndx as i64 - 1);
    let hh = g + (ndy as i64 - 1);
    let j = hh + 1;

    let count = (ndx * ndy) as usize;
    let mut pieces = Vec::with_capacity(count);
    for i in 0..count {
        let x = decode_tile_index_char(chars[i * 2])?;
        let y = decode_tile_index_char(chars[i * 2 + 1])?;
        let idx = i as i64;
        let (width, height) = if idx <= f {
            (2, 2)
        } else if idx <= g {
            (2, 1)
        } else if idx <= hh {
            (1, 2)
        } else if idx <= j {
            (1, 1)
        } else {
            return Err(BinbError::KeyParse(format!(
                "piece index {i} exceeds expected range for ndx={ndx}, ndy={ndy}"
            )));
        };
        pieces.push(TilePiece {
            x,
            y,
            width,
            height,
        });
    }

    Ok((ndx, ndy, pieces))
}

/// Parse one `(c_slot, p_slot)` pair into a [`SlotKey`].
///
/// The variant is selected by the first character: `=` for Grid, a digit for
/// Tile. Mismatched variants between `c` and `p`, or disagreement on shared
/// structural fields (`h`, `v`, `padding`, `ndx`, `ndy`), are a
/// [`BinbError::KeyParse`].
pub fn parse_slot_pair(c_slot: &str, p_slot: &str) -> BinbResult<SlotKey> {
    let c_is_grid = c_slot.starts_with('=');
    let p_is_grid = p_slot.starts_with('=');
    let c_is_tile = c_slot.chars().next().is_some_and(|ch| ch.is_ascii_digit());
    let p_is_tile = p_slot.chars().next().is_some_and(|ch| ch.is_ascii_digit());

    if c_is_grid && p_is_grid {
        let c = parse_grid_half(c_slot)?;
        let p = parse_grid_half(p_slot)?;
        if c.sign != '+' || p.sign != '-' {
            return Err(BinbError::KeyParse(
                "grid pair must have c-slot sign '+' and p-slot sign '-'".into(),
            ));
        }
        if c.h != p.h || c.v != p.v || c.padding != p.padding {
            return Err(BinbError::KeyParse(
                "grid pair disagrees on h/v/padding".into(),
            ));
        }
        if c.h > 8 || c.v > 8 || c.h * c.v > 64 {
            return Err(BinbError::KeyParse(format!(
                "invalid grid dimensions h={} v={}",
                c.h, c.v
            )));
        }
        let target_len = (c.h + c.v + c.h * c.v) as usize;
        if c.body.chars().count() != target_len || p.body.chars().count() != target_len {
            return Err(BinbError::KeyParse(format!(
                "grid body length does not match h+v+h*v={target_len}"
            )));
        }
        Ok(SlotKey::Grid {
            h: c.h,
            v: c.v,
            padding: c.padding,
            s_str: c.body,
            d_str: p.body,
        })
    } else if c_is_tile && p_is_tile {
        let (c_ndx, c_ndy, c_pieces) = parse_tile_half(c_slot)?;
        let (p_ndx, p_ndy, d_pieces) = parse_tile_half(p_slot)?;
        if c_ndx != p_ndx || c_ndy != p_ndy {
            return Err(BinbError::KeyParse(
                "tile pair disagrees on ndx/ndy".into(),
            ));
        }
        Ok(SlotKey::Tile {
            ndx: c_ndx,
            ndy: c_ndy,
            c_pieces,
            d_pieces,
        })
    } else {
        Err(BinbError::KeyParse(format!(
            "unknown or mismatched slot key variant: {c_slot:?} / {p_slot:?}"
        )))
    }
}

/// Parse a decrypted `(ctbl, ptbl)` pair of 8-string arrays into a
/// [`KeyTable`] of 8 [`SlotKey`]s.
pub fn parse_key_table(ctbl: &[String; 8], ptbl: &[String; 8]) -> BinbResult<KeyTable> {
    let mut slots = Vec::with_capacity(8);
    for i in 0..8 {
        slots.push(parse_slot_pair(&ctbl[i], &ptbl[i])?);
    }
    slots
        .try_into()
        .map_err(|_| BinbError::KeyParse("internal error building key table".into()))
}
