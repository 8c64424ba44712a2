//! Integration tests for key-table parsing: a full 8-slot table combining
//! both scrambling variants, and the invariants `parse_key_table` enforces.

use binb::binb::keytable::{parse_key_table, parse_slot_pair, SlotKey};

fn grid_slot(h: u32, v: u32) -> (String, String) {
    let body = "A".repeat((h + v + h * v) as usize);
    (format!("={h}-{v}+0-{body}"), format!("={h}-{v}-0-{body}"))
}

fn tile_slot(ndx: u32, ndy: u32) -> String {
    let data: String = (0..ndx * ndy).map(|_| "Aa").collect::<Vec<_>>().concat();
    format!("{ndx}-{ndy}-{data}")
}

#[test]
fn parses_a_full_table_mixing_grid_and_tile_slots() {
    let (c0, p0) = grid_slot(2, 2);
    let tile0 = tile_slot(2, 2);

    let ctbl: [String; 8] = std::array::from_fn(|i| if i % 2 == 0 { c0.clone() } else { tile0.clone() });
    let ptbl: [String; 8] = std::array::from_fn(|i| if i % 2 == 0 { p0.clone() } else { tile0.clone() });

    let table = parse_key_table(&ctbl, &ptbl).unwrap();
    assert!(matches!(table[0], SlotKey::Grid { .. }));
    assert!(matches!(table[1], SlotKey::Tile { .. }));
    assert!(matches!(table[6], SlotKey::Grid { .. }));
    assert!(matches!(table[7], SlotKey::Tile { .. }));
}

#[test]
fn every_slot_is_addressed_by_its_own_absolute_index() {
    // Each of the 8 slots parses and is stored at its own index, regardless
    // of how the Grid/Tile variants interleave — unlike an approach that only
    // appends matching-variant slots to a shared list, which would misalign
    // indices across slot 0 and slot 1 here.
    let (gc, gp) = grid_slot(1, 1);
    let tc = tile_slot(1, 1);

    let ctbl: [String; 8] = std::array::from_fn(|i| if i == 0 { gc.clone() } else { tc.clone() });
    let ptbl: [String; 8] = std::array::from_fn(|i| if i == 0 { gp.clone() } else { tc.clone() });

    let table = parse_key_table(&ctbl, &ptbl).unwrap();
    assert!(matches!(table[0], SlotKey::Grid { .. }));
    for slot in &table[1..] {
        assert!(matches!(slot, SlotKey::Tile { .. }));
    }
}

#[test]
fn rejects_a_table_with_one_malformed_slot() {
    let (gc, gp) = grid_slot(2, 2);
    let mut ctbl: [String; 8] = std::array::from_fn(|_| gc.clone());
    let ptbl: [String; 8] = std::array::from_fn(|_| gp.clone());
    ctbl[3] = "garbage".to_string();

    assert!(parse_key_table(&ctbl, &ptbl).is_err());
}

#[test]
fn grid_and_tile_slot_pairs_round_trip_through_the_same_parser() {
    let (gc, gp) = grid_slot(3, 2);
    let grid = parse_slot_pair(&gc, &gp).unwrap();
    match grid {
        SlotKey::Grid { h, v, padding, .. } => assert_eq!((h, v, padding), (3, 2, 0)),
        _ => panic!("expected Grid"),
    }

    let tc = tile_slot(3, 3);
    let tile = parse_slot_pair(&tc, &tc).unwrap();
    match tile {
        SlotKey::Tile { ndx, ndy, c_pieces, d_pieces } => {
            assert_eq!((ndx, ndy), (3, 3));
            assert_eq!(c_pieces.len(), 9);
            assert_eq!(d_pieces.len(), 9);
        }
        _ => panic!("expected Tile"),
    }
}
