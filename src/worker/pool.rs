//! `WorkerPool` — a bounded pool of OS threads that fetch and descramble
//! pages concurrently, with cooperative cancellation and an error budget.
//!
//! Work is split round-robin ahead of time rather than pulled from a shared
//! queue: each worker owns its bucket for the whole run, which keeps the
//! scheduling as simple as the blocking-I/O model this pool assumes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::{BinbError, BinbResult};

/// Number of failed fetches tolerated before the pool gives up and signals
/// every worker to stop.
pub const MAX_ERRORS: usize = 20;

const POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// One page's fetched-and-processed output, tagged with its page index.
#[derive(Debug)]
pub struct PageResult {
    pub page: usize,
    pub bytes: Vec<u8>,
}

/// Split `items` into `bucket_count` buckets by round-robin assignment.
///
/// Matches the distribution a single-pass `item_index % bucket_count`
/// split produces: buckets differ in size by at most one item.
pub fn distribute<T>(items: Vec<T>, bucket_count: usize) -> Vec<Vec<T>> {
    let mut buckets: Vec<Vec<T>> = (0..bucket_count).map(|_| Vec::new()).collect();
    for (i, item) in items.into_iter().enumerate() {
        buckets[i % bucket_count].push(item);
    }
    buckets
}

/// A bounded pool of `thread_count` worker threads.
pub struct WorkerPool {
    thread_count: usize,
}

impl WorkerPool {
    pub fn new(thread_count: usize) -> Self {
        Self {
            thread_count: thread_count.max(1),
        }
    }

    /// Run `fetch` over every item in `pages`, delivering results as they
    /// arrive (not in page order) and honoring `cancel`.
    ///
    /// Returns [`BinbError::TooManyFailures`] if the error budget
    /// ([`MAX_ERRORS`]) is exhausted, or [`BinbError::Incomplete`] if the
    /// pool wound down (e.g. via `cancel`) before every page arrived. Both
    /// error variants carry every page successfully fetched before the run
    /// gave up, so a caller can still persist what it has.
    pub fn run<F>(&self, pages: Vec<usize>, cancel: Arc<AtomicBool>, fetch: F) -> BinbResult<Vec<PageResult>>
    where
        F: Fn(usize) -> BinbResult<Vec<u8>> + Send + Sync + 'static,
    {
        self.run_with_progress(pages, cancel, fetch, |_| {})
    }

    /// Like [`WorkerPool::run`], but calls `on_result` once for every page
    /// that arrives (success or failure), for driving a progress indicator.
    pub fn run_with_progress<F, P>(
        &self,
        pages: Vec<usize>,
        cancel: Arc<AtomicBool>,
        fetch: F,
        on_result: P,
    ) -> BinbResult<Vec<PageResult>>
    where
        F: Fn(usize) -> BinbResult<Vec<u8>> + Send + Sync + 'static,
        P: Fn(usize) + Send + Sync + 'static,
    {
        let expected = pages.len();
        let buckets = distribute(pages, self.thread_count);
        let fetch = Arc::new(fetch);
        let on_result = Arc::new(on_result);
        let errors = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();

        let mut handles = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            let tx = tx.clone();
            let cancel = Arc::clone(&cancel);
            let errors = Arc::clone(&errors);
            let fetch = Arc::clone(&fetch);
            let on_result = Arc::clone(&on_result);
            handles.push(thread::spawn(move || {
                for page in bucket {
                    if cancel.load(Ordering::SeqCst) {
                        return;
                    }
                    match fetch(page) {
                        Ok(bytes) => {
                            on_result(page);
                            if tx.send(PageResult { page, bytes }).is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            log::warn!("page {page} failed: {e}");
                            on_result(page);
                            let failed_so_far = errors.fetch_add(1, Ordering::SeqCst) + 1;
                            if failed_so_far >= MAX_ERRORS {
                                log::error!("error budget exhausted after {failed_so_far} failures, cancelling");
                                cancel.store(true, Ordering::SeqCst);
                                return;
                            }
                        }
                    }
                }
            }));
        }
        drop(tx);

        let mut results = Vec::with_capacity(expected);
        loop {
            match rx.recv_timeout(POLL_TIMEOUT) {
                Ok(item) => results.push(item),
                Err(RecvTimeoutError::Timeout) => {
                    if handles.iter().all(|h| h.is_finished()) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        for handle in handles {
            let _ = handle.join();
        }

        let failures = errors.load(Ordering::SeqCst);
        if failures >= MAX_ERRORS {
            return Err(BinbError::TooManyFailures(failures, results));
        }
        if results.len() != expected {
            if cancel.load(Ordering::SeqCst) {
                return Err(BinbError::Cancelled);
            }
            return Err(BinbError::Incomplete {
                expected,
                got: results.len(),
                partial: results,
            });
        }
        Ok(results)
    }
}
