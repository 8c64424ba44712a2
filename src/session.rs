//! `BookSession` — the façade tying content-info lookup, the descrambling
//! engine, and the worker pool together into "download this book".

use std::io::Cursor;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;
use serde_json::Value;

use crate::api::ApiClient;
use crate::binb::descramble::Descrambler;
use crate::config::{FetchConfig, OutputFormat, PageEnd};
use crate::worker::{PageResult, WorkerPool};
use crate::{BinbError, BinbResult};

const JPEG_QUALITY: u8 = 95;

/// Bibliographic fields pulled out of a content-info response, matching
/// what's useful for naming and cataloguing a downloaded book.
#[derive(Debug, Clone, Default)]
pub struct BookMetadata {
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    pub publisher_ruby: Option<String>,
    pub title: Option<String>,
    pub title_ruby: Option<String>,
    pub categories: Vec<String>,
    pub abstract_text: Option<String>,
}

impl BookMetadata {
    fn from_content_info(info: &Value) -> Self {
        let string_field = |name: &str| info[name].as_str().map(str::to_string);
        let string_list = |name: &str| {
            info[name]
                .as_array()
                .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default()
        };
        let authors = info["Authors"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|a| a["Name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            authors,
            publisher: string_field("Publisher"),
            publisher_ruby: string_field("PublisherRuby"),
            title: string_field("Title"),
            title_ruby: string_field("TitleRuby"),
            categories: string_list("Categories"),
            abstract_text: string_field("Abstract"),
        }
    }
}

/// A fetched and reassembled page, named the way it should be written to
/// disk: `"{page:04}.{ext}"`.
pub struct FetchedPage {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// One book's fetch session: owns the [`ApiClient`] connection, the book's
/// metadata, and the configuration driving which pages to fetch and how.
pub struct BookSession {
    client: Arc<ApiClient>,
    config: FetchConfig,
    metadata: BookMetadata,
}

impl BookSession {
    /// Open a session against `cid` at `bib_url`, fetching content info and
    /// the page list up front.
    pub fn new(bib_url: &str, cid: &str, config: FetchConfig) -> BinbResult<Self> {
        let mut client = ApiClient::new(bib_url, cid, config.extra_params.clone())?;
        client.allow_sbc_on_static = config.allow_sbc_on_static;
        let info = client.get_content_info()?;
        let metadata = BookMetadata::from_content_info(&info);
        client.get_small_image_list()?;

        Ok(Self {
            client: Arc::new(client),
            config,
            metadata,
        })
    }

    pub fn metadata(&self) -> &BookMetadata {
        &self.metadata
    }

    pub fn page_count(&self) -> usize {
        self.client.pages().len()
    }

    /// The last page to fetch (1-indexed, inclusive), resolving
    /// [`PageEnd::All`] against the book's actual page count.
    pub fn end_page(&self) -> u32 {
        match self.config.page_end {
            PageEnd::All => self.page_count() as u32,
            PageEnd::Page(p) => p,
        }
    }

    /// Fetch and descramble a single page by its 0-indexed position.
    pub fn get_and_descramble(&self, page_number: usize) -> BinbResult<image::DynamicImage> {
        let filename = self
            .client
            .pages()
            .get(page_number)
            .ok_or_else(|| BinbError::Config(format!("page {page_number} out of range")))?;
        let bytes = self.client.get_image(page_number)?;
        let img = image::load_from_memory(&bytes)?;
        let table = self
            .client
            .key_table()
            .ok_or_else(|| BinbError::Config("key table not available; get_content_info was not called".into()))?;
        Descrambler::new(table).descramble(filename, &img)
    }

    /// Descramble already-fetched page bytes and encode the result,
    /// selecting the scrambling variant from the parsed slot for the page's
    /// bare filename. Unlike [`BookSession::get_and_descramble`], this does
    /// not perform any HTTP call itself, so callers that source page bytes
    /// some other way (a disk cache, a proxy) can still use the
    /// descrambling engine directly.
    pub fn descramble(&self, page_number: usize, raw_bytes: &[u8], output_format: OutputFormat) -> BinbResult<Vec<u8>> {
        let filename = self
            .client
            .pages()
            .get(page_number)
            .ok_or_else(|| BinbError::Config(format!("page {page_number} out of range")))?;
        let img = image::load_from_memory(raw_bytes)?;
        let table = self
            .client
            .key_table()
            .ok_or_else(|| BinbError::Config("key table not available; get_content_info was not called".into()))?;
        let out_img = Descrambler::new(table).descramble(filename, &img)?;
        encode(&out_img, output_format)
    }

    /// Fetch and descramble every page in `[page_start, end_page]` using a
    /// bounded worker pool, honoring `cancel`.
    pub fn fetch_all(&self, cancel: Arc<AtomicBool>) -> BinbResult<Vec<FetchedPage>> {
        self.fetch_all_with_progress(cancel, |_| {})
    }

    /// Like [`BookSession::fetch_all`], but calls `on_page` once per page
    /// that arrives (success or failure), for driving a progress indicator.
    pub fn fetch_all_with_progress<P>(&self, cancel: Arc<AtomicBool>, on_page: P) -> BinbResult<Vec<FetchedPage>>
    where
        P: Fn(usize) + Send + Sync + 'static,
    {
        let start = (self.config.page_start.saturating_sub(1)) as usize;
        let end = self.end_page() as usize;
        let pages: Vec<usize> = (start..end).collect();

        let pool = WorkerPool::new(self.config.threads);
        let client = Arc::clone(&self.client);
        let format = self.config.output_format();

        let results = pool.run_with_progress(pages, cancel, move |page| {
            let filename = client
                .pages()
                .get(page)
                .cloned()
                .ok_or_else(|| BinbError::Config(format!("page {page} out of range")))?;
            let bytes = client.get_image(page)?;
            let img = image::load_from_memory(&bytes)?;
            let table = client
                .key_table()
                .ok_or_else(|| BinbError::Config("key table not available".into()))?;
            let out_img = Descrambler::new(table).descramble(&filename, &img)?;
            encode(&out_img, format)
        }, on_page)?;

        Ok(self.to_fetched_pages(results))
    }

    /// Name raw worker-pool results using this session's configured output
    /// format, turning them into pages ready to write to disk.
    ///
    /// Used both for a fully successful run and to recover the pages a
    /// caller can still persist out of a [`BinbError::Incomplete`] or
    /// [`BinbError::TooManyFailures`]'s partial results.
    pub fn to_fetched_pages(&self, results: Vec<PageResult>) -> Vec<FetchedPage> {
        let format = self.config.output_format();
        results
            .into_iter()
            .map(|r| FetchedPage {
                filename: format!("{:04}.{}", r.page + 1, format.extension()),
                bytes: r.bytes,
            })
            .collect()
    }
}

fn encode(img: &image::DynamicImage, format: OutputFormat) -> BinbResult<Vec<u8>> {
    let mut buf = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            let mut cursor = Cursor::new(&mut buf);
            let mut encoder = JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
            encoder.encode_image(img)?;
        }
        OutputFormat::Png => {
            let mut cursor = Cursor::new(&mut buf);
            img.write_to(&mut cursor, ImageFormat::Png)?;
        }
    }
    Ok(buf)
}
