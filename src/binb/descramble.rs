//! `Descrambler` — turns a slot key pair and a scrambled image into the
//! list of source/destination rectangles that reassemble the page, and
//! applies that list to actual pixels.
//!
//! Two independent scrambling schemes are supported, matched to the
//! [`SlotKey`] variant selected by [`super::slot::select`]: a fixed `h x v`
//! grid of padded rectangles, and a variable-sized tile scheme that also
//! produces two residue strips along the right and bottom edges.

use image::{DynamicImage, GenericImage, GenericImageView, Rgba};

use crate::binb::keytable::{KeyTable, SlotKey};
use crate::binb::slot;
use crate::{BinbError, BinbResult};

/// Lookup table mapping an ASCII character code to the `t`/`n`/`p` value
/// used while unwinding a Grid-variant slot's permutation string.
///
/// Indices outside `0..TNP_ARRAY.len()` (non-ASCII slot bytes) never occur
/// for valid key tables; [`tnp`] treats them as -1 the same as a listed gap.
const TNP_ARRAY: [i32; 128] = [
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, 62,
    -1, -1, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, -1, -1, -1, -1, -1, -1, -1, 0, 1, 2, 3, 4, 5,
    6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, -1, -1, -1, -1, 63,
    -1, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47,
    48, 49, 50, 51, -1, -1, -1, -1, -1,
];

fn tnp_lookup(byte: u8) -> i32 {
    TNP_ARRAY.get(byte as usize).copied().unwrap_or(-1)
}

/// Split a permutation string into its `t` (length `h`), `n` (length `v`),
/// and `p` (length `h*v`) segments, decoded through [`TNP_ARRAY`].
fn tnp(data: &str, h: u32, v: u32) -> (Vec<i32>, Vec<i32>, Vec<i32>) {
    let bytes: Vec<u8> = data.bytes().collect();
    let h = h as usize;
    let v = v as usize;
    let t = bytes[..h].iter().map(|&b| tnp_lookup(b)).collect();
    let n = bytes[h..h + v].iter().map(|&b| tnp_lookup(b)).collect();
    let p = bytes[h + v..h + v + h * v]
        .iter()
        .map(|&b| tnp_lookup(b))
        .collect();
    (t, n, p)
}

/// One source-to-destination copy region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub dst_x: u32,
    pub dst_y: u32,
    pub src_x: u32,
    pub src_y: u32,
    pub width: u32,
    pub height: u32,
}

/// Ties a decrypted, parsed [`KeyTable`] to the descrambling operations
/// that consume it.
pub struct Descrambler<'a> {
    table: &'a KeyTable,
}

impl<'a> Descrambler<'a> {
    pub fn new(table: &'a KeyTable) -> Self {
        Self { table }
    }

    /// Compute the descrambled canvas size and copy rectangles for `filename`
    /// at `(img_width, img_height)`.
    pub fn rectangles(
        &self,
        filename: &str,
        img_width: u32,
        img_height: u32,
    ) -> BinbResult<(u32, u32, Vec<Rect>)> {
        let idx = slot::select(filename);
        match (&self.table[idx.c_index], &self.table[idx.p_index]) {
            (SlotKey::Grid { .. }, SlotKey::Grid { .. }) => {
                self.grid_rectangles(idx.c_index, idx.p_index, img_width, img_height)
            }
            (SlotKey::Tile { .. }, SlotKey::Tile { .. }) => {
                self.tile_rectangles(idx.c_index, idx.p_index, img_width, img_height)
            }
            _ => Err(BinbError::KeyParse(format!(
                "slot {} and {} are different scrambling variants",
                idx.c_index, idx.p_index
            ))),
        }
    }

    fn grid_rectangles(
        &self,
        c_index: usize,
        p_index: usize,
        img_width: u32,
        img_height: u32,
    ) -> BinbResult<(u32, u32, Vec<Rect>)> {
        let (c_h, c_padding, s_str) = match &self.table[c_index] {
            SlotKey::Grid { h, padding, s_str, .. } => (*h, *padding, s_str.as_str()),
            _ => unreachable!("checked by rectangles()"),
        };
        let (p_v, d_str) = match &self.table[p_index] {
            SlotKey::Grid { v, d_str, .. } => (*v, d_str.as_str()),
            _ => unreachable!("checked by rectangles()"),
        };

        // Everything below is signed: the JS this mirrors freely produces
        // negative intermediate offsets that cancel out once summed.
        let h = c_h as i64;
        let v = p_v as i64;
        let padding = c_padding as i64;
        let img_width = img_width as i64;
        let img_height = img_height as i64;

        let x_margin = h * 2 * padding;
        let y_margin = v * 2 * padding;
        let (width, height) = if img_width >= 64 + x_margin
            && img_height >= 64 + y_margin
            && img_height * img_width >= (320 + x_margin) * (320 + y_margin)
        {
            (img_width - x_margin, img_height - y_margin)
        } else {
            (img_width, img_height)
        };

        let (src_t, src_n, src_p) = tnp(s_str, c_h, p_v);
        let (dst_t, dst_n, dst_p) = tnp(d_str, c_h, p_v);

        let count = (h * v) as usize;
        let mut p = Vec::with_capacity(count);
        for i in 0..count {
            let dst_p_i = dst_p[i];
            if dst_p_i < 0 || dst_p_i as usize >= count {
                return Err(BinbError::KeyParse(format!(
                    "grid permutation index {dst_p_i} out of range"
                )));
            }
            p.push(src_p[dst_p_i as usize]);
        }

        let slice_width = (width + h - 1) / h;
        let slice_height = (height + v - 1) / v;
        let last_slice_width = width - (h - 1) * slice_width;
        let last_slice_height = height - (v - 1) * slice_height;

        let to_u32 = |v: i64, what: &str| -> BinbResult<u32> {
            u32::try_from(v).map_err(|_| BinbError::KeyParse(format!("negative grid {what}: {v}")))
        };

        let mut res = Vec::with_capacity(count);
        for i in 0..count {
            let dst_column = (i as i64) % h;
            let dst_row = (i as i64) / h;
            let dst_x = padding
                + dst_column * (slice_width + 2 * padding)
                + if (dst_n[dst_row as usize] as i64) < dst_column {
                    last_slice_width - slice_width
                } else {
                    0
                };
            let dst_y = padding
                + dst_row * (slice_height + 2 * padding)
                + if (dst_t[dst_column as usize] as i64) < dst_row {
                    last_slice_height - slice_height
                } else {
                    0
                };

            let p_i = p[i];
            if p_i < 0 || p_i as usize >= count {
                return Err(BinbError::KeyParse(format!(
                    "grid source index {p_i} out of range"
                )));
            }
            let src_column = (p_i as i64) % h;
            let src_row = (p_i as i64) / h;
            let src_x = src_column * slice_width
                + if (src_n[src_row as usize] as i64) < src_column {
                    last_slice_width - slice_width
                } else {
                    0
                };
            let src_y = src_row * slice_height
                + if (src_t[src_column as usize] as i64) < src_row {
                    last_slice_height - slice_height
                } else {
                    0
                };

            let piece_width = if dst_n[dst_row as usize] as i64 == dst_column {
                last_slice_width
            } else {
                slice_width
            };
            let piece_height = if dst_t[dst_column as usize] as i64 == dst_row {
                last_slice_height
            } else {
                slice_height
            };

            // dst and src swap places here relative to how they were just
            // computed; this mirrors the upstream JS exactly.
            res.push(Rect {
                dst_x: to_u32(src_x, "dst_x")?,
                dst_y: to_u32(src_y, "dst_y")?,
                src_x: to_u32(dst_x, "src_x")?,
                src_y: to_u32(dst_y, "src_y")?,
                width: to_u32(piece_width, "width")?,
                height: to_u32(piece_height, "height")?,
            });
        }

        Ok((to_u32(width, "width")?, to_u32(height, "height")?, res))
    }

    fn tile_rectangles(
        &self,
        c_index: usize,
        p_index: usize,
        img_width: u32,
        img_height: u32,
    ) -> BinbResult<(u32, u32, Vec<Rect>)> {
        if !(img_width >= 64 && img_height >= 64 && img_width as u64 * img_height as u64 >= 320 * 320)
        {
            return Err(BinbError::ImageTooSmall(img_width, img_height));
        }

        let (c_ndx, c_ndy, c_pieces) = match &self.table[c_index] {
            SlotKey::Tile { ndx, ndy, c_pieces, .. } => (*ndx, *ndy, c_pieces),
            _ => unreachable!("checked by rectangles()"),
        };
        let d_pieces = match &self.table[p_index] {
            SlotKey::Tile { d_pieces, .. } => d_pieces,
            _ => unreachable!("checked by rectangles()"),
        };

        let e0 = img_width - (img_width % 8);
        let f = (e0 - 1) / 7 - (e0 - 1) / 7 % 8;
        let g = e0 - f * 7;
        let h0 = img_height - (img_height % 8);
        let j = (h0 - 1) / 7 - (h0 - 1) / 7 % 8;
        let k = h0 - j * 7;

        let quad = |v: u32| -> u32 { (v / 2) * f + (v % 2) * g };
        let quad_y = |v: u32| -> u32 { (v / 2) * j + (v % 2) * k };

        let mut res = Vec::with_capacity(c_pieces.len() + 2);
        for (c_piece, p_piece) in c_pieces.iter().zip(d_pieces.iter()) {
            let src_x = quad(c_piece.x);
            let src_y = quad_y(c_piece.y);
            let dst_x = quad(p_piece.x);
            let dst_y = quad_y(p_piece.y);
            let width = quad(c_piece.width);
            let height = quad_y(c_piece.height);
            res.push(Rect {
                src_x,
                src_y,
                dst_x,
                dst_y,
                width,
                height,
            });
        }

        let e = f * (c_ndx - 1) + g;
        let h_total = j * (c_ndy - 1) + k;
        if e < img_width {
            res.push(Rect {
                src_x: e,
                src_y: 0,
                dst_x: e,
                dst_y: 0,
                width: img_width - e,
                height: h_total,
            });
        }
        if h_total < img_height {
            res.push(Rect {
                src_x: 0,
                src_y: h_total,
                dst_x: 0,
                dst_y: h_total,
                width: img_width,
                height: img_height - h_total,
            });
        }

        Ok((img_width, img_height, res))
    }

    /// Descramble `img`, the scrambled tile named `filename` by BinB,
    /// returning the reassembled page.
    pub fn descramble(&self, filename: &str, img: &DynamicImage) -> BinbResult<DynamicImage> {
        let (width, height, rects) = self.rectangles(filename, img.width(), img.height())?;

        let mut out = DynamicImage::new_rgba8(width, height);
        for px in out.as_mut_rgba8().expect("just allocated as rgba8").pixels_mut() {
            *px = Rgba([255, 255, 255, 255]);
        }

        for rect in &rects {
            for dy in 0..rect.height {
                for dx in 0..rect.width {
                    let src = img.get_pixel(rect.src_x + dx, rect.src_y + dy);
                    out.put_pixel(rect.dst_x + dx, rect.dst_y + dy, src);
                }
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binb::keytable::parse_slot_pair;
    use image::Rgba;

    fn identity_grid_table() -> KeyTable {
        // h=2,v=2,padding=0; t/n segments both "AA" (TNP value 0,0), p segment
        // "ABCD" (TNP values 0,1,2,3) i.e. the identity permutation. s_str and
        // d_str identical so src and dst sides agree exactly.
        let slot = parse_slot_pair("=2-2+0-AAAAABCD", "=2-2-0-AAAAABCD").unwrap();
        std::array::from_fn(|_| slot.clone())
    }

    #[test]
    fn grid_identity_permutation_round_trips_8x8() {
        let table = identity_grid_table();
        let d = Descrambler::new(&table);
        let mut img = DynamicImage::new_rgba8(8, 8);
        for y in 0..8 {
            for x in 0..8 {
                img.put_pixel(x, y, Rgba([x as u8, y as u8, 0, 255]));
            }
        }
        let out = d.descramble("p0.jpg", &img).unwrap();
        assert_eq!((out.width(), out.height()), (8, 8));
        for y in 0..8 {
            for x in 0..8 {
                assert_eq!(out.get_pixel(x, y), img.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn tile_rejects_image_below_threshold() {
        let slot = parse_slot_pair("2-2-AaBbCcDd", "2-2-AaBbCcDd").unwrap();
        let table: KeyTable = std::array::from_fn(|_| slot.clone());
        let d = Descrambler::new(&table);
        let img = DynamicImage::new_rgba8(100, 100);
        let err = d.rectangles("p0.jpg", img.width(), img.height()).unwrap_err();
        assert!(matches!(err, BinbError::ImageTooSmall(100, 100)));
    }

    #[test]
    fn tile_rectangles_cover_residue_strips_on_321() {
        let slot = parse_slot_pair("2-2-AaBbCcDd", "2-2-AaBbCcDd").unwrap();
        let table: KeyTable = std::array::from_fn(|_| slot.clone());
        let d = Descrambler::new(&table);
        let (w, h, rects) = d.rectangles("p0.jpg", 321, 321).unwrap();
        assert_eq!((w, h), (321, 321));
        // 4 piece rectangles plus up to 2 residue strips.
        assert!(rects.len() >= 4);
        assert!(rects.len() <= 6);
    }
}
