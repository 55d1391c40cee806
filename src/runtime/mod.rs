use std::env;

use tracing::warn;
use tracksync::logging;

mod event_loop;
mod settings;
mod startup;

/// Command line: `tracksync [--once] [PATH|LIBRARY]...`
///
/// Every argument is added as a source on top of the configured ones.
/// `--once` exits after the first completed pass.
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let (settings, problem) = settings::load_settings();
    logging::init(&settings.logging);
    if let Some(msg) = problem {
        warn!("{msg}");
    }

    let mut once = false;
    let mut extra = Vec::new();
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--once" => once = true,
            _ => extra.push(arg),
        }
    }

    let files = startup::start_files(&settings, &extra)?;
    let events = files.subscribe();
    files.scan_sources(None)?;
    let result = event_loop::run(&files, events, once);
    files.shutdown();
    result
}
