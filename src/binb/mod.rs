//! The descrambling engine: key-table decryption, slot parsing, slot
//! selection, and pixel reassembly.
//!
//! Start with [`cipher::decrypt_key_table`] to turn a book's encrypted
//! `ctbl`/`ptbl` strings into [`keytable::KeyTable`]s, then hand a page's
//! bare filename and decoded image to [`descramble::Descrambler`].

pub mod cipher;
pub mod descramble;
pub mod keytable;
pub mod slot;
