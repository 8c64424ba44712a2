//! Caller-facing configuration for a book fetch.

/// Which page to stop at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEnd {
    /// Fetch through the last page BinB reports.
    All,
    /// Fetch through this page number, inclusive (1-indexed, matching the
    /// book's own page numbering).
    Page(u32),
}

/// Output raster format for reassembled pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

/// Options governing one [`crate::session::BookSession`] run.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// First page to fetch, 1-indexed.
    pub page_start: u32,
    /// Last page to fetch.
    pub page_end: PageEnd,
    /// Encode losslessly (PNG) instead of the server's own JPEG quality.
    pub lossless: bool,
    /// Worker pool size.
    pub threads: usize,
    /// Extra query-string parameters forwarded on every API call, for
    /// deployments that require a vendor-specific token alongside
    /// `cid`/`k`/`p`.
    pub extra_params: Vec<(String, String)>,
    /// Allow SBC-proxied fetches even when the content server reports
    /// `Static`, provided a `p` token is available.
    pub allow_sbc_on_static: bool,
    /// Pass-through credentials for a caller-supplied login hook. The crate
    /// never uses these itself; it only carries them for callers that layer
    /// their own site login on top of a [`crate::session::BookSession`].
    pub username: Option<String>,
    pub password: Option<String>,
}

impl FetchConfig {
    pub fn output_format(&self) -> OutputFormat {
        if self.lossless {
            OutputFormat::Png
        } else {
            OutputFormat::Jpeg
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_start: 1,
            page_end: PageEnd::All,
            lossless: false,
            threads: 10,
            extra_params: Vec::new(),
            allow_sbc_on_static: false,
            username: None,
            password: None,
        }
    }
}
