#[cfg(not(feature = "cli"))]
compile_error!("The `fetch` binary requires the `cli` feature. Build with `--features cli`.");

use std::process;

use clap::Parser;

use binb::cli::app::Cli;
use binb::cli::download;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut writer = std::io::stdout();

    if let Err(e) = download::execute(&cli, &mut writer) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
