//! Thin process entry point; the actual server lives in the `nanod` library.

use clap::Parser;
use nanod::{arbiter, config};

fn main() {
    env_logger::Builder::new()
        .parse_filters(&std::env::var("NANOD_LOG").unwrap_or_else(|_| "info".to_owned()))
        .init();

    let cli = config::CliLayer::parse();
    let config = match config::load(cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build the tokio runtime");

    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, arbiter::run(config));

    log::info!("nanod has shut down");
}
