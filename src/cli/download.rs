//! The `fetch` binary's single operation: open a book session, drive the
//! worker pool to completion, and write pages to disk.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cli::app::Cli;
use crate::cli::{create_progress_bar, wprintln};
use crate::config::{FetchConfig, PageEnd};
use crate::session::{BookSession, FetchedPage};
use crate::util::fs::write_pages;
use crate::{BinbError, BinbResult};

/// Write `pages` to `output`, returning how many were written.
fn write_fetched_pages(output: &str, pages: Vec<FetchedPage>) -> BinbResult<usize> {
    let out_dir = std::path::Path::new(output);
    let to_write: Vec<(String, Vec<u8>)> = pages.into_iter().map(|p| (p.filename, p.bytes)).collect();
    let count = to_write.len();
    write_pages(out_dir, &to_write)?;
    Ok(count)
}

/// Run the whole download described by `cli`, writing progress to `writer`.
pub fn execute(cli: &Cli, writer: &mut dyn Write) -> BinbResult<()> {
    let config = FetchConfig {
        page_start: cli.page_start,
        page_end: match cli.page_end {
            Some(p) => PageEnd::Page(p),
            None => PageEnd::All,
        },
        lossless: cli.lossless,
        threads: cli.threads.max(1),
        extra_params: cli.extra_params.clone(),
        allow_sbc_on_static: cli.allow_sbc_on_static,
        username: cli.username.clone(),
        password: cli.password.clone(),
    };

    wprintln!(writer, "Fetching content info for cid={}...", cli.cid)?;
    let session = BookSession::new(&cli.bib, &cli.cid, config)?;

    if let Some(title) = &session.metadata().title {
        wprintln!(writer, "Title: {title}")?;
    }
    wprintln!(writer, "{} pages total, fetching through page {}.", session.page_count(), session.end_page())?;

    let running = Arc::new(AtomicBool::new(false));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(true, Ordering::SeqCst);
    })
    .ok();

    let total_pages = (session.end_page() as u64).saturating_sub((cli.page_start as u64).saturating_sub(1));
    let pb = create_progress_bar(total_pages, "pages");
    let pb_for_progress = pb.clone();
    let pages = match session.fetch_all_with_progress(running, move |_| {
        pb_for_progress.inc(1);
    }) {
        Ok(pages) => pages,
        Err(BinbError::Cancelled) => {
            pb.finish_with_message("cancelled");
            wprintln!(writer, "Cancelled; no pages written.")?;
            return Ok(());
        }
        Err(BinbError::Incomplete { expected, got, partial }) => {
            pb.finish_with_message("incomplete");
            let written = write_fetched_pages(&cli.output, session.to_fetched_pages(partial))?;
            wprintln!(writer, "Wrote {written} of {expected} pages before giving up ({got} fetched, the rest failed).")?;
            return Err(BinbError::Incomplete { expected, got, partial: Vec::new() });
        }
        Err(BinbError::TooManyFailures(n, partial)) => {
            pb.finish_with_message("too many failures");
            let written = write_fetched_pages(&cli.output, session.to_fetched_pages(partial))?;
            wprintln!(writer, "Wrote {written} pages before the error budget ({n} failures) was exhausted.")?;
            return Err(BinbError::TooManyFailures(n, Vec::new()));
        }
        Err(e) => return Err(e),
    };
    pb.finish_with_message("done");

    let written = write_fetched_pages(&cli.output, pages)?;
    wprintln!(writer, "Wrote {written} pages to {}.", cli.output)?;
    Ok(())
}
