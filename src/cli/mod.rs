//! CLI support for the `fetch` binary: argument parsing and the download
//! driver that turns a [`app::Cli`] into a running [`crate::session::BookSession`].

pub mod app;
pub mod download;

use indicatif::{ProgressBar, ProgressStyle};

/// Write a line to the given writer, converting io::Error to BinbError.
macro_rules! wprintln {
    ($w:expr) => {
        writeln!($w).map_err(|e| $crate::BinbError::Io(e))
    };
    ($w:expr, $($arg:tt)*) => {
        writeln!($w, $($arg)*).map_err(|e| $crate::BinbError::Io(e))
    };
}

pub(crate) use wprintln;

/// Create a styled progress bar for iterating over pages.
pub(crate) fn create_progress_bar(count: u64, unit: &str) -> ProgressBar {
    let pb = ProgressBar::new(count);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{eta}})",
                unit
            ))
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}
