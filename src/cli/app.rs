//! `clap` argument definitions for the `fetch` binary.

use clap::Parser;

/// Fetch and descramble every page of a BinB Reader e-book.
#[derive(Parser, Debug)]
#[command(name = "fetch", version, about)]
pub struct Cli {
    /// Base URL of the book's BIB API (e.g. `https://example.com/bib/`).
    #[arg(long)]
    pub bib: String,

    /// Content id of the book to fetch.
    #[arg(long)]
    pub cid: String,

    /// First page to fetch, 1-indexed.
    #[arg(long, default_value_t = 1)]
    pub page_start: u32,

    /// Last page to fetch, 1-indexed and inclusive. Defaults to the book's
    /// last page.
    #[arg(long)]
    pub page_end: Option<u32>,

    /// Encode pages losslessly as PNG instead of the server's own JPEG
    /// quality.
    #[arg(long)]
    pub lossless: bool,

    /// Number of worker threads used to fetch and descramble pages.
    #[arg(long, default_value_t = 10)]
    pub threads: usize,

    /// Directory to write fetched pages into.
    #[arg(long, default_value = "./output")]
    pub output: String,

    /// Extra `key=value` query parameters forwarded on every API call
    /// (some deployments require a vendor-specific token).
    #[arg(long = "param", value_parser = parse_key_value)]
    pub extra_params: Vec<(String, String)>,

    /// Allow SBC-proxied fetches even when the content server reports
    /// `Static`, provided a `p` token is available.
    #[arg(long)]
    pub allow_sbc_on_static: bool,

    /// Username for a caller-supplied site login step. Unused by this
    /// binary; carried through to [`crate::config::FetchConfig`] for an
    /// external login hook layered on top.
    #[arg(long)]
    pub username: Option<String>,

    /// Password counterpart to `--username`.
    #[arg(long)]
    pub password: Option<String>,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) => Ok((k.to_string(), v.to_string())),
        None => Err(format!("expected key=value, got {s:?}")),
    }
}
