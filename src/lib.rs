//! Descrambling engine and fetch pipeline for BinB Reader HTML5 e-books.
//!
//! BinB Reader serves e-book pages as JPEG tiles that have been geometrically
//! permuted, plus a per-book descrambling table encrypted with a key derived
//! from the content identifier and a client nonce. This crate recovers the
//! descrambling table, fetches page tiles over HTTP, and reassembles each
//! page.
//!
//! # CLI Reference
//!
//! The `fetch` binary drives a whole book download: nonce generation,
//! content-info lookup, key-table decryption, and a bounded worker pool
//! that downloads and descrambles every page.
//!
//! ## Global options
//!
//! See [`cli::app::Cli`] for the full option list (`--bib`, `--cid`,
//! `--threads`, `--lossless`, `--page-start`/`--page-end`, `--output`).
//!
//! # Library API
//!
//! ```no_run
//! use binb::session::BookSession;
//! use binb::config::FetchConfig;
//!
//! let config = FetchConfig::default();
//! let mut session = BookSession::new("http://example.com/bib/", "378252_001", config).unwrap();
//! let page = session.get_and_descramble(0).unwrap();
//! # let _ = page;
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`binb::cipher`] | `KeyTableCodec` — decrypts the two encrypted key-table strings |
//! | [`binb::keytable`] | `KeyParser` — parses slot strings into `Grid`/`Tile` variants |
//! | [`binb::slot`] | `SlotSelector` — filename-derived `(c_index, p_index)` pair |
//! | [`binb::descramble`] | `Descrambler` — rectangle computation and pixel reassembly |
//! | [`api::client`] | `ApiClient` — BIB/SBC HTTP surface |
//! | [`api::nonce`] | Client nonce (`k`) generation |
//! | [`worker`] | Bounded concurrent downloader/descrambler pool |
//! | [`session`] | `BookSession` façade tying the above together |

pub mod api;
pub mod binb;
pub mod config;
pub mod session;
pub mod util;
pub mod worker;

#[cfg(feature = "cli")]
pub mod cli;

use thiserror::Error;

/// Errors returned by `binb` operations.
#[derive(Error, Debug)]
pub enum BinbError {
    /// A caller-supplied option was invalid (e.g. non-integer thread count).
    #[error("configuration error: {0}")]
    Config(String),

    /// The server returned a JSON envelope with `result != 1`.
    #[error("API call {method} returned result={result}")]
    Api {
        /// The API method that failed (e.g. `get_content_info`).
        method: String,
        /// The non-1 `result` code the server returned.
        result: i64,
    },

    /// A transport-level HTTP failure (non-2xx status, or a `reqwest` error).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The stream cipher produced output that was not valid JSON, or not an
    /// array of exactly 8 strings.
    #[error("failed to decode key table: {0}")]
    KeyDecode(String),

    /// A slot string did not match the Grid or Tile syntax, or a `c`/`p` pair
    /// disagreed on shared structural fields.
    #[error("failed to parse slot key: {0}")]
    KeyParse(String),

    /// Tile-variant descrambling was attempted on an image below the
    /// 320x320-pixel, 64x64-dimension threshold.
    #[error("image too small to descramble: {0}x{1}")]
    ImageTooSmall(u32, u32),

    /// The worker pool's error budget (`MAX_ERRORS`) was exhausted. Carries
    /// every page successfully fetched before the budget tripped, so a
    /// caller can still persist what succeeded.
    #[error("too many failures: {0} pages failed to download")]
    TooManyFailures(usize, Vec<crate::worker::PageResult>),

    /// The worker pool's threads all exited before delivering the expected
    /// number of pages, for a reason other than the caller's own
    /// cancellation or the error budget. Carries every page successfully
    /// fetched before the run gave up.
    #[error("incomplete: expected {expected} pages, got {got}")]
    Incomplete {
        /// Number of pages the caller expected.
        expected: usize,
        /// Number of pages actually delivered before workers died.
        got: usize,
        /// Pages that were successfully fetched and descrambled before the
        /// run gave up.
        partial: Vec<crate::worker::PageResult>,
    },

    /// The run stopped because the caller's own cancel flag was set, not
    /// because of a download failure. Callers that requested cancellation
    /// (e.g. via Ctrl-C) should treat this as expected, not as an error to
    /// report.
    #[error("cancelled")]
    Cancelled,

    /// An image codec (decode or encode) failure.
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    /// An I/O error occurred while writing output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for BinbError {
    fn from(e: reqwest::Error) -> Self {
        BinbError::Http(e.to_string())
    }
}

/// A specialized `Result` type for `binb` operations.
pub type BinbResult<T> = Result<T, BinbError>;
